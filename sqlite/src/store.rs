use std::path::Path;

use ::rusqlite::types::{ToSqlOutput, ValueRef};
use ::rusqlite::{Connection, ToSql, params_from_iter};
use kiln_core::error::Result;
use kiln_core::store::{Row, Store};
use kiln_core::value::Value;

/// A [`Store`] over a `rusqlite` connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_inner(self) -> Connection {
        self.conn
    }
}

/// Binds a [`Value`]; timestamps are stored as text so they sort and compare.
struct Arg<'a>(&'a Value);

impl ToSql for Arg<'_> {
    fn to_sql(&self) -> ::rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(::rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::Owned(::rusqlite::types::Value::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(::rusqlite::types::Value::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(::rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Timestamp(ts) => {
                ToSqlOutput::Owned(::rusqlite::types::Value::Text(Value::timestamp_text(ts)))
            }
            Value::List(_) => {
                return Err(::rusqlite::Error::ToSqlConversionFailure(
                    "list arguments must be expanded before binding".into(),
                ));
            }
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

impl Store for SqliteStore {
    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
        let mut rows = stmt.query(params_from_iter(args.iter().map(Arg)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut mapped = Row::new();
            for (i, name) in names.iter().enumerate() {
                mapped.push(name.as_str(), from_value_ref(row.get_ref(i)?));
            }
            out.push(mapped);
        }
        Ok(out)
    }

    fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let changed = stmt.execute(params_from_iter(args.iter().map(Arg)))?;
        Ok(changed as u64)
    }

    fn last_insert_id(&mut self) -> Result<Value> {
        Ok(Value::Int(self.conn.last_insert_rowid()))
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        Ok(self.conn.execute_batch(sql)?)
    }
}
