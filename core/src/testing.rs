//! Hand-written models, a scripted store and a minimal dialect for unit tests.

use std::any::Any;
use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use crate::context::Context;
use crate::details::{ConnectionDetails, DialectKind};
use crate::dialect::Dialect;
use crate::error::{KilnError, Result};
use crate::model::{
    AssociationDef, AssociationKind, FieldDef, Loaded, Model, ModelDef, Record, Shape, new_record,
};
use crate::store::{Row, Store};
use crate::value::{FromValue, ToValue, Value};

const fn column(name: &'static str) -> FieldDef {
    FieldDef {
        field: name,
        column: name,
        select: None,
        primary: false,
        readable: true,
        writeable: true,
        generate: None,
    }
}

const fn primary(name: &'static str) -> FieldDef {
    FieldDef {
        primary: true,
        ..column(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub posts: Vec<Post>,
}

static AUTHOR_FIELDS: [FieldDef; 3] = [
    primary("id"),
    column("name"),
    FieldDef {
        select: Some("name as display_name"),
        writeable: false,
        ..column("display_name")
    },
];

static AUTHOR_ASSOCIATIONS: [AssociationDef; 1] = [AssociationDef {
    field: "posts",
    kind: AssociationKind::HasMany,
    shape: Shape::Many,
    target: <Post as Model>::model_def,
    foreign_key: None,
    target_key: None,
    through: None,
    references: None,
    order_by: None,
}];

static AUTHOR: ModelDef = ModelDef {
    name: "Author",
    singular: "author",
    table: "authors",
    table_fn: None,
    fields: &AUTHOR_FIELDS,
    associations: &AUTHOR_ASSOCIATIONS,
    new_record: new_record::<Author>,
};

impl Record for Author {
    fn def(&self) -> &'static ModelDef {
        &AUTHOR
    }

    fn get(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(self.id.to_value()),
            "name" => Some(self.name.to_value()),
            "display_name" => Some(self.display_name.to_value()),
            _ => None,
        }
    }

    fn set(&mut self, column: &str, value: Value) -> Result<bool> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "name" => self.name = FromValue::from_value(value)?,
            "display_name" => self.display_name = FromValue::from_value(value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn assign(&mut self, field: &str, loaded: Loaded) -> Result<()> {
        match field {
            "posts" => self.posts = loaded.into_many()?,
            _ => {
                return Err(KilnError::UnknownAssociation {
                    field: field.to_owned(),
                    model: "Author".to_owned(),
                });
            }
        }
        Ok(())
    }

    fn boxed_clone(&self) -> Box<dyn Record> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl Model for Author {
    fn model_def() -> &'static ModelDef {
        &AUTHOR
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub author_id: Option<i64>,
    pub author: Option<Author>,
}

static POST_FIELDS: [FieldDef; 3] = [primary("id"), column("title"), column("author_id")];

static POST_ASSOCIATIONS: [AssociationDef; 1] = [AssociationDef {
    field: "author",
    kind: AssociationKind::BelongsTo,
    shape: Shape::Optional,
    target: <Author as Model>::model_def,
    foreign_key: None,
    target_key: None,
    through: None,
    references: None,
    order_by: None,
}];

static POST: ModelDef = ModelDef {
    name: "Post",
    singular: "post",
    table: "posts",
    table_fn: None,
    fields: &POST_FIELDS,
    associations: &POST_ASSOCIATIONS,
    new_record: new_record::<Post>,
};

impl Record for Post {
    fn def(&self) -> &'static ModelDef {
        &POST
    }

    fn get(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(self.id.to_value()),
            "title" => Some(self.title.to_value()),
            "author_id" => Some(self.author_id.to_value()),
            _ => None,
        }
    }

    fn set(&mut self, column: &str, value: Value) -> Result<bool> {
        match column {
            "id" => self.id = FromValue::from_value(value)?,
            "title" => self.title = FromValue::from_value(value)?,
            "author_id" => self.author_id = FromValue::from_value(value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn assign(&mut self, field: &str, loaded: Loaded) -> Result<()> {
        match field {
            "author" => self.author = loaded.into_optional()?,
            _ => {
                return Err(KilnError::UnknownAssociation {
                    field: field.to_owned(),
                    model: "Post".to_owned(),
                });
            }
        }
        Ok(())
    }

    fn boxed_clone(&self) -> Box<dyn Record> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl Model for Post {
    fn model_def() -> &'static ModelDef {
        &POST
    }
}

static MEMBER_FIELDS: [FieldDef; 1] = [primary("id")];

static MEMBERS: ModelDef = ModelDef {
    name: "Member",
    singular: "member",
    table: "family.members",
    table_fn: None,
    fields: &MEMBER_FIELDS,
    associations: &[],
    new_record: new_record::<Author>,
};

/// A model stored in a schema-qualified table.
pub fn prefixed_def() -> &'static ModelDef {
    &MEMBERS
}

fn tenant_table(ctx: &Context) -> Result<String> {
    match ctx.require("prefix")? {
        Value::Text(prefix) => Ok(format!("{prefix}_tenants")),
        other => Err(KilnError::TableName(format!(
            "prefix must be text, got {}",
            other.type_name()
        ))),
    }
}

static TENANTS: ModelDef = ModelDef {
    name: "Tenant",
    singular: "tenant",
    table: "tenants",
    table_fn: Some(tenant_table),
    fields: &MEMBER_FIELDS,
    associations: &[],
    new_record: new_record::<Author>,
};

/// A model whose table name comes from the context.
pub fn tenant_def() -> &'static ModelDef {
    &TENANTS
}

/// Records every statement and answers queries from scripted rows.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub queries: Vec<(String, Vec<Value>)>,
    pub executed: Vec<(String, Vec<Value>)>,
    responses: Vec<(String, Vec<Row>)>,
    next_id: i64,
}

impl MemoryStore {
    /// Queries whose SQL contains `needle` return `rows`; later scripts win.
    pub fn respond(&mut self, needle: &str, rows: Vec<Row>) {
        self.responses.push((needle.to_owned(), rows));
    }

    pub fn row(pairs: &[(&str, Value)]) -> Row {
        let mut row = Row::new();
        for (column, value) in pairs {
            row.push(*column, value.clone());
        }
        row
    }
}

impl Store for MemoryStore {
    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.queries.push((sql.to_owned(), args.to_vec()));
        Ok(self
            .responses
            .iter()
            .rev()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64> {
        self.executed.push((sql.to_owned(), args.to_vec()));
        Ok(1)
    }

    fn last_insert_id(&mut self) -> Result<Value> {
        self.next_id += 1;
        Ok(Value::Int(self.next_id))
    }
}

/// A [`MemoryStore`] that stays inspectable after moving into a connection.
#[derive(Debug, Clone, Default)]
pub struct SharedStore(Arc<Mutex<MemoryStore>>);

impl SharedStore {
    pub fn with<R>(&self, f: impl FnOnce(&mut MemoryStore) -> R) -> R {
        f(&mut self.0.lock().unwrap())
    }
}

impl Store for SharedStore {
    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        self.with(|s| s.query(sql, args))
    }

    fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64> {
        self.with(|s| s.execute(sql, args))
    }

    fn last_insert_id(&mut self) -> Result<Value> {
        self.with(|s| s.last_insert_id())
    }
}

/// `?` placeholders by default; `numbered()` renders `$n` and uses RETURNING.
#[derive(Debug, Default)]
pub struct TestDialect {
    details: ConnectionDetails,
    numbered: bool,
}

impl TestDialect {
    pub fn numbered() -> Self {
        Self {
            numbered: true,
            ..Self::default()
        }
    }
}

impl Dialect for TestDialect {
    fn name(&self) -> &'static str {
        "test"
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn details(&self) -> &ConnectionDetails {
        &self.details
    }

    fn url(&self) -> String {
        "test://".to_owned()
    }

    fn translate_sql<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        if !self.numbered {
            return Cow::Borrowed(sql);
        }
        let mut out = String::with_capacity(sql.len() + 8);
        let mut n = 0;
        for ch in sql.chars() {
            if ch == '?' {
                n += 1;
                out.push_str(&format!("${n}"));
            } else {
                out.push(ch);
            }
        }
        Cow::Owned(out)
    }

    fn supports_returning(&self) -> bool {
        self.numbered
    }
}
