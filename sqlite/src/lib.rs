//! SQLite dialect for kiln.
//!
//! Enable the `rusqlite` feature for [`SqliteStore`], a [`Store`] over a
//! `rusqlite::Connection`.

#[cfg(feature = "rusqlite")]
mod store;

#[cfg(feature = "rusqlite")]
pub use store::SqliteStore;

use std::sync::{Mutex, PoisonError};

use kiln_core::dialect::Dialect;
use kiln_core::error::Result;
use kiln_core::store::Store;
use kiln_core::value::Value;
use kiln_core::{ConnectionDetails, DialectKind, KilnError};

/// Serializes schema dumps and loads across every SQLite connection in the
/// process. A database file has no server to arbitrate for it.
static SCHEMA_LOCK: Mutex<()> = Mutex::new(());

const USER_TABLES: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

const SCHEMA_SQL: &str = "SELECT sql FROM sqlite_master \
     WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite_%' \
     ORDER BY CASE type WHEN 'table' THEN 0 WHEN 'index' THEN 1 ELSE 2 END, name";

#[derive(Debug, Clone)]
pub struct SqliteDialect {
    details: ConnectionDetails,
}

impl SqliteDialect {
    pub fn new(details: ConnectionDetails) -> Self {
        Self { details }
    }

    /// An in-memory database, mostly for tests.
    pub fn memory() -> Self {
        Self::new(ConnectionDetails {
            dialect: "sqlite3".to_owned(),
            database: ":memory:".to_owned(),
            ..ConnectionDetails::default()
        })
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        DialectKind::Sqlite.name()
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn details(&self) -> &ConnectionDetails {
        &self.details
    }

    /// The database path followed by its options, e.g. `app.db?_busy_timeout=5000`.
    fn url(&self) -> String {
        let mut url = self.details.database.clone();
        let mut options: Vec<_> = self.details.options.iter().collect();
        options.sort();
        for (i, (key, value)) in options.into_iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(value);
        }
        url
    }

    fn migration_url(&self) -> String {
        format!("sqlite3://{}", self.url())
    }

    fn lock(&self, critical: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let _guard = SCHEMA_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        critical()
    }

    fn truncate_all(&self, store: &mut dyn Store) -> Result<()> {
        let tables = table_names(store)?;
        store.execute("PRAGMA foreign_keys = OFF", &[])?;
        let mut outcome = Ok(());
        for table in &tables {
            outcome = store
                .execute(&format!("DELETE FROM {}", self.quote(table)), &[])
                .map(drop);
            if outcome.is_err() {
                break;
            }
        }
        store.execute("PRAGMA foreign_keys = ON", &[])?;
        outcome
    }

    fn dump_schema(&self, store: &mut dyn Store) -> Result<String> {
        let mut schema = String::new();
        self.lock(&mut || {
            schema.clear();
            for row in store.query(SCHEMA_SQL, &[])? {
                if let Some(Value::Text(sql)) = row.first() {
                    schema.push_str(sql);
                    schema.push_str(";\n");
                }
            }
            Ok(())
        })?;
        Ok(schema)
    }

    fn load_schema(&self, store: &mut dyn Store, schema: &str) -> Result<()> {
        if schema.trim().is_empty() {
            return Ok(());
        }
        self.lock(&mut || store.execute_batch(schema))
    }
}

fn table_names(store: &mut dyn Store) -> Result<Vec<String>> {
    store
        .query(USER_TABLES, &[])?
        .into_iter()
        .map(|row| match row.first() {
            Some(Value::Text(name)) => Ok(name.clone()),
            other => Err(KilnError::Mapping(format!(
                "unexpected table name {:?}",
                other
            ))),
        })
        .collect()
}
