//! Parsing of `#[model]`, `#[column]` and association attributes.

use proc_macro2::Span;
use syn::{Attribute, DeriveInput, Error, Field, LitStr, Meta, Path, Result};

#[derive(Default)]
pub(crate) struct ModelAttrs {
    pub table: Option<String>,
    pub table_fn: Option<Path>,
}

#[derive(Default)]
pub(crate) struct ColumnAttrs {
    pub primary: bool,
    pub name: Option<String>,
    pub select: Option<String>,
    pub readonly: bool,
    pub writeonly: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany,
}

impl Kind {
    fn from_attr(attr: &Attribute) -> Option<Self> {
        let path = attr.path();
        if path.is_ident("belongs_to") {
            Some(Self::BelongsTo)
        } else if path.is_ident("has_one") {
            Some(Self::HasOne)
        } else if path.is_ident("has_many") {
            Some(Self::HasMany)
        } else if path.is_ident("many_to_many") {
            Some(Self::ManyToMany)
        } else {
            None
        }
    }
}

pub(crate) struct AssociationAttrs {
    pub kind: Kind,
    pub foreign_key: Option<String>,
    pub target_key: Option<String>,
    pub through: Option<String>,
    pub references: Option<String>,
    pub order_by: Option<String>,
    pub span: Span,
}

pub(crate) enum FieldRole {
    Column(ColumnAttrs),
    Association(AssociationAttrs),
    Skip,
}

pub(crate) fn parse_model(input: &DeriveInput) -> Result<ModelAttrs> {
    let mut attrs = ModelAttrs::default();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("model")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let table: LitStr = meta.value()?.parse()?;
                if table.value().trim().is_empty() {
                    return Err(meta.error("table name cannot be empty"));
                }
                attrs.table = Some(table.value());
                Ok(())
            } else if meta.path.is_ident("table_fn") {
                attrs.table_fn = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `table` or `table_fn`"))
            }
        })?;
    }
    Ok(attrs)
}

pub(crate) fn parse_field(field: &Field) -> Result<FieldRole> {
    let mut column: Option<ColumnAttrs> = None;
    let mut association: Option<AssociationAttrs> = None;
    let mut skip = false;

    for attr in &field.attrs {
        if attr.path().is_ident("column") {
            let parsed = column.get_or_insert_with(ColumnAttrs::default);
            if matches!(attr.meta, Meta::Path(_)) {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("primary") {
                    parsed.primary = true;
                } else if meta.path.is_ident("readonly") {
                    parsed.readonly = true;
                } else if meta.path.is_ident("writeonly") {
                    parsed.writeonly = true;
                } else if meta.path.is_ident("skip") {
                    skip = true;
                } else if meta.path.is_ident("name") {
                    parsed.name = Some(meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("select") {
                    parsed.select = Some(meta.value()?.parse::<LitStr>()?.value());
                } else {
                    return Err(meta.error(
                        "expected one of `primary`, `name`, `select`, `readonly`, `writeonly`, `skip`",
                    ));
                }
                Ok(())
            })?;
        } else if let Some(kind) = Kind::from_attr(attr) {
            if association.is_some() {
                return Err(Error::new_spanned(attr, "a field can declare only one association"));
            }
            association = Some(parse_association(attr, kind)?);
        }
    }

    if skip {
        return Ok(FieldRole::Skip);
    }
    match (column, association) {
        (Some(_), Some(assoc)) => Err(Error::new(
            assoc.span,
            "association fields are not columns; drop the `#[column]` attribute",
        )),
        (_, Some(assoc)) => Ok(FieldRole::Association(assoc)),
        (column, None) => Ok(FieldRole::Column(column.unwrap_or_default())),
    }
}

fn parse_association(attr: &Attribute, kind: Kind) -> Result<AssociationAttrs> {
    let mut parsed = AssociationAttrs {
        kind,
        foreign_key: None,
        target_key: None,
        through: None,
        references: None,
        order_by: None,
        span: attr.pound_token.spans[0],
    };
    if !matches!(attr.meta, Meta::Path(_)) {
        attr.parse_nested_meta(|meta| {
            let slot = if meta.path.is_ident("foreign_key") {
                &mut parsed.foreign_key
            } else if meta.path.is_ident("target_key") {
                &mut parsed.target_key
            } else if meta.path.is_ident("through") {
                &mut parsed.through
            } else if meta.path.is_ident("references") {
                &mut parsed.references
            } else if meta.path.is_ident("order_by") {
                &mut parsed.order_by
            } else {
                return Err(meta.error(
                    "expected one of `foreign_key`, `target_key`, `through`, `references`, `order_by`",
                ));
            };
            *slot = Some(meta.value()?.parse::<LitStr>()?.value());
            Ok(())
        })?;
    }

    match (kind == Kind::ManyToMany, parsed.through.is_some()) {
        (true, false) => Err(Error::new_spanned(
            attr,
            "many_to_many requires `through = \"join_table\"`",
        )),
        (false, true) => Err(Error::new_spanned(attr, "`through` is only valid on many_to_many")),
        _ => Ok(parsed),
    }
}
