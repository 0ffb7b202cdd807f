//! CRUD statements shared by every dialect.

use crate::dialect::{Dialect, push_placeholders};
use crate::error::{KilnError, Result};
use crate::model::{Metadata, ModelDef, Record};
use crate::query::Query;
use crate::store::{Row, Store};
use crate::value::Value;

const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";

fn touch_timestamps(def: &ModelDef, record: &mut dyn Record, creating: bool) -> Result<()> {
    let now = Value::now();
    if creating
        && def.has_column(CREATED_AT)
        && record.get(CREATED_AT).is_none_or(|v| v.is_zero())
    {
        record.set(CREATED_AT, now.clone())?;
    }
    if def.has_column(UPDATED_AT) {
        record.set(UPDATED_AT, now)?;
    }
    Ok(())
}

/// Inserts `record`, writing a generated key back onto it.
///
/// A zero primary key is left to the database (or the field's key generator);
/// a non-zero one is inserted as given.
pub fn create<D: Dialect + ?Sized>(
    dialect: &D,
    store: &mut dyn Store,
    meta: &Metadata,
    record: &mut dyn Record,
) -> Result<()> {
    let pk = meta.primary_key()?;
    touch_timestamps(meta.def, record, true)?;

    let mut database_key = record.get(pk.column).is_none_or(|v| v.is_zero());
    if database_key && let Some(generate) = pk.generate {
        record.set(pk.column, generate())?;
        database_key = false;
    }

    let columns = meta.columns();
    let mut names = Vec::new();
    let mut args = Vec::new();
    for name in columns.writeable_names() {
        if database_key && name == pk.column {
            continue;
        }
        names.push(dialect.quote(name));
        args.push(record.get(name).unwrap_or_default());
    }

    let mut sql = format!("INSERT INTO {}", dialect.quote(&meta.table_name));
    if names.is_empty() {
        sql.push_str(" DEFAULT VALUES");
    } else {
        sql.push_str(" (");
        sql.push_str(&names.join(", "));
        sql.push_str(") VALUES (");
        push_placeholders(&mut sql, names.len());
        sql.push(')');
    }

    if database_key && dialect.supports_returning() {
        sql.push_str(" RETURNING ");
        sql.push_str(&dialect.quote(pk.column));
        let rows = store.query(&dialect.translate_sql(&sql), &args)?;
        let id = rows
            .first()
            .and_then(Row::first)
            .cloned()
            .ok_or(KilnError::NotFound)?;
        record.set(pk.column, id)?;
    } else {
        store.execute(&dialect.translate_sql(&sql), &args)?;
        if database_key {
            let id = store.last_insert_id()?;
            record.set(pk.column, id)?;
        }
    }
    Ok(())
}

/// Writes every writeable column of a persisted record.
pub fn update<D: Dialect + ?Sized>(
    dialect: &D,
    store: &mut dyn Store,
    meta: &Metadata,
    record: &mut dyn Record,
) -> Result<()> {
    let pk = meta.primary_key()?;
    let key = meta.key_of(record)?;
    touch_timestamps(meta.def, record, false)?;

    let columns = meta.columns();
    let mut sets = Vec::new();
    let mut args = Vec::new();
    for name in columns.writeable_names() {
        if name == pk.column || name == CREATED_AT {
            continue;
        }
        sets.push(format!("{} = ?", dialect.quote(name)));
        args.push(record.get(name).unwrap_or_default());
    }
    if sets.is_empty() {
        return Ok(());
    }
    args.push(key);

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        dialect.quote(&meta.table_name),
        sets.join(", "),
        dialect.quote(pk.column)
    );
    store.execute(&dialect.translate_sql(&sql), &args)?;
    Ok(())
}

pub fn update_query<D: Dialect + ?Sized>(
    dialect: &D,
    store: &mut dyn Store,
    meta: &Metadata,
    query: &Query,
    values: &[(&str, Value)],
) -> Result<u64> {
    if query.is_raw() {
        return Err(KilnError::InvalidQuery(
            "raw queries cannot select rows to update".to_owned(),
        ));
    }
    if values.is_empty() {
        return Ok(0);
    }
    let mut args: Vec<Value> = values.iter().map(|(_, v)| v.clone()).collect();
    let sets: Vec<String> = values
        .iter()
        .map(|(column, _)| format!("{} = ?", dialect.quote(column)))
        .collect();
    let (where_sql, where_args) = query.where_sql();
    args.extend(where_args);

    let sql = format!(
        "UPDATE {} AS {} SET {}{}",
        dialect.quote(&meta.table_name),
        meta.alias,
        sets.join(", "),
        where_sql
    );
    store.execute(&dialect.translate_sql(&sql), &args)
}

pub fn destroy<D: Dialect + ?Sized>(
    dialect: &D,
    store: &mut dyn Store,
    meta: &Metadata,
    record: &dyn Record,
) -> Result<()> {
    let pk = meta.primary_key()?;
    let key = meta.key_of(record)?;
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?",
        dialect.quote(&meta.table_name),
        dialect.quote(pk.column)
    );
    store.execute(&dialect.translate_sql(&sql), &[key])?;
    Ok(())
}

pub fn delete<D: Dialect + ?Sized>(
    dialect: &D,
    store: &mut dyn Store,
    meta: &Metadata,
    query: &Query,
) -> Result<u64> {
    if query.is_raw() {
        return Err(KilnError::InvalidQuery(
            "raw queries cannot select rows to delete".to_owned(),
        ));
    }
    let (where_sql, args) = query.where_sql();
    let sql = format!(
        "DELETE FROM {} AS {}{}",
        dialect.quote(&meta.table_name),
        meta.alias,
        where_sql
    );
    store.execute(&dialect.translate_sql(&sql), &args)
}

pub fn select_one<D: Dialect + ?Sized>(
    dialect: &D,
    store: &mut dyn Store,
    meta: &Metadata,
    query: &Query,
) -> Result<Row> {
    select_many(dialect, store, meta, query)?
        .into_iter()
        .next()
        .ok_or(KilnError::NotFound)
}

pub fn select_many<D: Dialect + ?Sized>(
    dialect: &D,
    store: &mut dyn Store,
    meta: &Metadata,
    query: &Query,
) -> Result<Vec<Row>> {
    let (sql, args) = query.to_sql(meta, dialect)?;
    store.query(&sql, &args)
}
