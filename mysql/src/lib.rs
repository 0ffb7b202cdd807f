//! MySQL dialect for kiln.
//!
//! `?` placeholders are native and identifiers are quoted with backticks.
//! Generated keys come from the store's `last_insert_id`.

use kiln_core::dialect::{Dialect, quote_parts};
use kiln_core::error::Result;
use kiln_core::store::Store;
use kiln_core::value::Value;
use kiln_core::{ConnectionDetails, DialectKind, KilnError};

#[derive(Debug, Clone)]
pub struct MysqlDialect {
    details: ConnectionDetails,
}

impl MysqlDialect {
    pub fn new(details: ConnectionDetails) -> Self {
        Self { details }
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        DialectKind::Mysql.name()
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn details(&self) -> &ConnectionDetails {
        &self.details
    }

    fn url(&self) -> String {
        self.details.server_url("mysql")
    }

    fn quote(&self, ident: &str) -> String {
        quote_parts(ident, '`', '`')
    }

    fn truncate_all(&self, store: &mut dyn Store) -> Result<()> {
        let tables: Vec<String> = store
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
                 AND table_name NOT IN ('schema_migration', 'schema_migrations') ORDER BY table_name",
                &[],
            )?
            .into_iter()
            .map(|row| match row.first() {
                Some(Value::Text(name)) => Ok(name.clone()),
                other => Err(KilnError::Mapping(format!("unexpected table name {other:?}"))),
            })
            .collect::<Result<_>>()?;

        store.execute("SET FOREIGN_KEY_CHECKS = 0", &[])?;
        let mut outcome = Ok(());
        for table in &tables {
            outcome = store
                .execute(&format!("TRUNCATE TABLE {}", self.quote(table)), &[])
                .map(drop);
            if outcome.is_err() {
                break;
            }
        }
        store.execute("SET FOREIGN_KEY_CHECKS = 1", &[])?;
        outcome
    }
}
