//! Static model descriptions and the object-safe record interface.
//!
//! `#[derive(Model)]` produces one `static` [`ModelDef`] per type plus the
//! [`Record`] accessors; everything else here works off those two.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use heck::ToSnakeCase;

use crate::columns::Columns;
use crate::context::Context;
use crate::error::{KilnError, Result};
use crate::store::Row;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany,
}

impl AssociationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelongsTo => "belongs_to",
            Self::HasOne => "has_one",
            Self::HasMany => "has_many",
            Self::ManyToMany => "many_to_many",
        }
    }
}

/// How the association field stores what was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `T`: a missing target becomes `T::default()`.
    One,
    /// `Option<T>` or `Option<Box<T>>`: a missing target stays `None`.
    Optional,
    /// `Box<T>`
    Boxed,
    /// `Vec<T>`
    Many,
}

/// A mapped column of a model.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub field: &'static str,
    pub column: &'static str,
    /// Replaces `alias.column` in SELECT lists, e.g. `name as full_name`.
    pub select: Option<&'static str>,
    pub primary: bool,
    pub readable: bool,
    pub writeable: bool,
    /// Produces a key when inserting a record whose primary key is zero.
    pub generate: Option<fn() -> Value>,
}

/// A declared relation from one model to another.
#[derive(Clone, Copy)]
pub struct AssociationDef {
    pub field: &'static str,
    pub kind: AssociationKind,
    pub shape: Shape,
    pub target: fn() -> &'static ModelDef,
    pub foreign_key: Option<&'static str>,
    /// Column of the join table pointing at the target (many-to-many).
    pub target_key: Option<&'static str>,
    /// Join table (many-to-many).
    pub through: Option<&'static str>,
    /// Column the foreign key points at, when it is not the primary key.
    pub references: Option<&'static str>,
    pub order_by: Option<&'static str>,
}

impl fmt::Debug for AssociationDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationDef")
            .field("field", &self.field)
            .field("kind", &self.kind)
            .field("shape", &self.shape)
            .field("target", &(self.target)().name)
            .field("foreign_key", &self.foreign_key)
            .field("through", &self.through)
            .finish()
    }
}

impl AssociationDef {
    pub fn target_def(&self) -> &'static ModelDef {
        (self.target)()
    }

    /// The foreign key column.
    ///
    /// Belongs-to: a column of the owner, `<field>_id` by default.
    /// Has-one / has-many: a column of the target, `<owner>_id` by default.
    /// Many-to-many: a column of the join table, `<owner>_id` by default.
    pub fn foreign_key(&self, owner: &ModelDef) -> Cow<'static, str> {
        if let Some(fk) = self.foreign_key {
            return Cow::Borrowed(fk);
        }
        match self.kind {
            AssociationKind::BelongsTo => Cow::Owned(format!("{}_id", self.field)),
            _ => Cow::Owned(format!("{}_id", owner.singular)),
        }
    }

    /// Join table column pointing at the target, `<target>_id` by default.
    pub fn target_key(&self) -> Cow<'static, str> {
        match self.target_key {
            Some(k) => Cow::Borrowed(k),
            None => Cow::Owned(format!("{}_id", self.target_def().singular)),
        }
    }

    /// The column matched against the foreign key.
    ///
    /// Belongs-to: a target column. Every other kind: an owner column.
    pub fn references(&self, owner: &'static ModelDef) -> Result<&'static str> {
        if let Some(r) = self.references {
            return Ok(r);
        }
        match self.kind {
            AssociationKind::BelongsTo => Ok(self.target_def().primary_key()?.column),
            _ => Ok(owner.primary_key()?.column),
        }
    }
}

/// Compile-time description of a model type.
pub struct ModelDef {
    /// Type name, used in error messages.
    pub name: &'static str,
    /// snake_case singular, the base of default foreign key names.
    pub singular: &'static str,
    pub table: &'static str,
    pub table_fn: Option<fn(&Context) -> Result<String>>,
    pub fields: &'static [FieldDef],
    pub associations: &'static [AssociationDef],
    pub new_record: fn() -> Box<dyn Record>,
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("associations", &self.associations)
            .finish()
    }
}

impl ModelDef {
    pub fn primary_key(&self) -> Result<&'static FieldDef> {
        self.fields
            .iter()
            .find(|f| f.primary)
            .ok_or_else(|| KilnError::MissingPrimaryKey {
                model: self.name.to_owned(),
                field: "id".to_owned(),
            })
    }

    pub fn field(&self, column: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.field(column).is_some()
    }

    /// Looks up an association by field name; PascalCase names are accepted.
    pub fn association(&self, field: &str) -> Result<&'static AssociationDef> {
        let wanted = field.to_snake_case();
        self.associations
            .iter()
            .find(|a| a.field == wanted)
            .ok_or_else(|| KilnError::UnknownAssociation {
                field: field.to_owned(),
                model: self.name.to_owned(),
            })
    }

    pub fn table_name(&self, ctx: &Context) -> Result<String> {
        match self.table_fn {
            Some(f) => f(ctx),
            None => Ok(self.table.to_owned()),
        }
    }

    /// Checks the declaration for combinations the engine cannot run.
    pub fn validate(&self) -> Result<()> {
        for assoc in self.associations {
            let through_ok = (assoc.kind == AssociationKind::ManyToMany) == assoc.through.is_some();
            let shape_ok = match assoc.kind {
                AssociationKind::HasMany | AssociationKind::ManyToMany => assoc.shape == Shape::Many,
                _ => assoc.shape != Shape::Many,
            };
            if !through_ok || !shape_ok {
                return Err(KilnError::MalformedPath {
                    path: format!("{}.{}", self.name, assoc.field),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn id(&self) -> usize {
        self as *const ModelDef as usize
    }
}

/// Object-safe access to a model instance.
///
/// Generated by `#[derive(Model)]`; the preload engine only ever sees this.
pub trait Record: Any {
    fn def(&self) -> &'static ModelDef;

    /// Reads a mapped column; `None` when the model has no such column.
    fn get(&self, column: &str) -> Option<Value>;

    /// Writes a mapped column. Returns `Ok(false)` for unknown columns.
    fn set(&mut self, column: &str, value: Value) -> Result<bool>;

    /// Stores loaded association targets on `field`.
    fn assign(&mut self, field: &str, loaded: Loaded) -> Result<()>;

    fn boxed_clone(&self) -> Box<dyn Record>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl fmt::Debug for dyn Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let def = self.def();
        let mut s = f.debug_struct(def.name);
        for field in def.fields {
            s.field(field.field, &self.get(field.column).unwrap_or_default());
        }
        s.finish()
    }
}

/// A concrete model type.
pub trait Model: Record + Clone + Default + Sized {
    fn model_def() -> &'static ModelDef;
}

/// Boxed default instance, the `new_record` hook of every derived model.
pub fn new_record<T: Model>() -> Box<dyn Record> {
    Box::new(T::default())
}

/// Fills a fresh record of `def` from a row, skipping unmapped columns.
pub fn hydrate(def: &ModelDef, row: Row) -> Result<Box<dyn Record>> {
    let mut record = (def.new_record)();
    for (column, value) in row {
        record.set(&column, value)?;
    }
    Ok(record)
}

/// Typed counterpart of [`hydrate`].
pub fn hydrate_as<T: Model>(row: Row) -> Result<T> {
    let mut record = T::default();
    for (column, value) in row {
        record.set(&column, value)?;
    }
    Ok(record)
}

/// Association targets handed to [`Record::assign`].
pub enum Loaded {
    One(Option<Box<dyn Record>>),
    Many(Vec<Box<dyn Record>>),
}

fn downcast<T: Model>(record: Box<dyn Record>) -> Result<T> {
    let name = record.def().name;
    record
        .into_any()
        .downcast::<T>()
        .map(|b| *b)
        .map_err(|_| KilnError::Mapping(format!("loaded {name} does not match the field type")))
}

impl Loaded {
    pub fn into_optional<T: Model>(self) -> Result<Option<T>> {
        match self {
            Loaded::One(Some(r)) => downcast(r).map(Some),
            Loaded::One(None) => Ok(None),
            Loaded::Many(mut all) => match all.drain(..).next() {
                Some(r) => downcast(r).map(Some),
                None => Ok(None),
            },
        }
    }

    pub fn into_one<T: Model>(self) -> Result<T> {
        Ok(self.into_optional()?.unwrap_or_default())
    }

    pub fn into_many<T: Model>(self) -> Result<Vec<T>> {
        match self {
            Loaded::Many(all) => all.into_iter().map(downcast).collect(),
            Loaded::One(one) => one.into_iter().map(downcast).collect(),
        }
    }
}

/// A model description resolved against a context.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub def: &'static ModelDef,
    pub table_name: String,
    pub alias: String,
}

impl Metadata {
    /// Resolves the table name (running the context hook, if any) and alias.
    pub fn new(def: &'static ModelDef, ctx: &Context) -> Result<Self> {
        def.validate()?;
        let table_name = def.table_name(ctx)?;
        let alias = table_name.replace('.', "_");
        Ok(Self {
            def,
            table_name,
            alias,
        })
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Default column set, cached per model type and alias.
    pub fn columns(&self) -> Arc<Columns> {
        Columns::for_model(self.def, &self.alias)
    }

    pub fn primary_key(&self) -> Result<&'static FieldDef> {
        self.def.primary_key()
    }

    pub fn association(&self, field: &str) -> Result<&'static AssociationDef> {
        self.def.association(field)
    }

    /// Primary key value of `record`; zero keys are an error.
    pub fn key_of(&self, record: &dyn Record) -> Result<Value> {
        let pk = self.primary_key()?;
        match record.get(pk.column) {
            Some(v) if !v.is_zero() => Ok(v),
            _ => Err(KilnError::ZeroPrimaryKey {
                model: self.def.name.to_owned(),
                field: pk.column.to_owned(),
            }),
        }
    }
}

/// Describes `T` under `ctx`.
pub fn describe<T: Model>(ctx: &Context) -> Result<Metadata> {
    describe_def(T::model_def(), ctx)
}

pub fn describe_def(def: &'static ModelDef, ctx: &Context) -> Result<Metadata> {
    Metadata::new(def, ctx)
}
