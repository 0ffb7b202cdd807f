//! PostgreSQL and CockroachDB dialects for kiln.
//!
//! Both render `$n` placeholders and read generated keys back with
//! `RETURNING`. Enable `postgres-sync` for [`PostgresStore`], a [`Store`]
//! over the synchronous `postgres` client.

#[cfg(feature = "postgres-sync")]
mod store;

#[cfg(feature = "postgres-sync")]
pub use store::PostgresStore;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use kiln_core::cache::ShardedCache;
use kiln_core::dialect::Dialect;
use kiln_core::error::Result;
use kiln_core::store::Store;
use kiln_core::value::Value;
use kiln_core::{ConnectionDetails, DialectKind, KilnError};

/// Memoized `?` to `$n` rewrites, keyed by the exact input.
#[derive(Default)]
struct Placeholders {
    cache: ShardedCache<String, Arc<str>>,
}

impl Placeholders {
    fn translate<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        if !sql.contains('?') {
            return Cow::Borrowed(sql);
        }
        let translated = match self.cache.get(sql) {
            Some(hit) => hit,
            None => self
                .cache
                .get_or_insert_with(sql.to_owned(), || Arc::from(number(sql))),
        };
        Cow::Owned(translated.to_string())
    }
}

/// Rewrites every `?` as `$1`, `$2`, ... in order of appearance.
///
/// Question marks inside string literals are rewritten as well.
fn number(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0usize;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}

fn column_text(store: &mut dyn Store, sql: &str) -> Result<Vec<String>> {
    store
        .query(sql, &[])?
        .into_iter()
        .map(|row| match row.first() {
            Some(Value::Text(name)) => Ok(name.clone()),
            other => Err(KilnError::Mapping(format!("unexpected table name {other:?}"))),
        })
        .collect()
}

pub struct PostgresDialect {
    details: ConnectionDetails,
    placeholders: Placeholders,
}

impl PostgresDialect {
    pub fn new(details: ConnectionDetails) -> Self {
        Self {
            details,
            placeholders: Placeholders::default(),
        }
    }
}

impl fmt::Debug for PostgresDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresDialect")
            .field("details", &self.details)
            .finish_non_exhaustive()
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        DialectKind::Postgres.name()
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn details(&self) -> &ConnectionDetails {
        &self.details
    }

    fn url(&self) -> String {
        self.details.server_url("postgres")
    }

    fn translate_sql<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        self.placeholders.translate(sql)
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn truncate_all(&self, store: &mut dyn Store) -> Result<()> {
        let tables = column_text(
            store,
            "SELECT tablename FROM pg_catalog.pg_tables WHERE schemaname = current_schema() \
             AND tablename NOT IN ('schema_migration', 'schema_migrations') ORDER BY tablename",
        )?;
        if tables.is_empty() {
            return Ok(());
        }
        let list: Vec<String> = tables.iter().map(|t| self.quote(t)).collect();
        store.execute(
            &format!("TRUNCATE TABLE {} RESTART IDENTITY CASCADE", list.join(", ")),
            &[],
        )?;
        Ok(())
    }
}

pub struct CockroachDialect {
    details: ConnectionDetails,
    placeholders: Placeholders,
}

impl CockroachDialect {
    pub fn new(details: ConnectionDetails) -> Self {
        Self {
            details,
            placeholders: Placeholders::default(),
        }
    }
}

impl fmt::Debug for CockroachDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CockroachDialect")
            .field("details", &self.details)
            .finish_non_exhaustive()
    }
}

impl Dialect for CockroachDialect {
    fn name(&self) -> &'static str {
        DialectKind::Cockroach.name()
    }

    fn kind(&self) -> DialectKind {
        DialectKind::Cockroach
    }

    fn details(&self) -> &ConnectionDetails {
        &self.details
    }

    /// Cockroach speaks the Postgres wire protocol, so the URL uses that scheme.
    fn url(&self) -> String {
        self.details.server_url("postgres")
    }

    fn migration_url(&self) -> String {
        self.details.server_url("cockroach")
    }

    fn translate_sql<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        self.placeholders.translate(sql)
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn truncate_all(&self, store: &mut dyn Store) -> Result<()> {
        let tables = column_text(
            store,
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
             AND table_name NOT IN ('schema_migration', 'schema_migrations') ORDER BY table_name",
        )?;
        for table in &tables {
            store.execute(&format!("TRUNCATE TABLE {} CASCADE", self.quote(table)), &[])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> ConnectionDetails {
        ConnectionDetails::from_url("postgres://app:secret@db:5433/shop").unwrap()
    }

    #[test]
    fn numbers_placeholders_in_order() {
        let dialect = PostgresDialect::new(details());
        assert_eq!(
            dialect.translate_sql("a = ? AND b IN (?, ?) LIMIT 1"),
            "a = $1 AND b IN ($2, $3) LIMIT 1"
        );
        assert!(matches!(dialect.translate_sql("SELECT 1"), Cow::Borrowed(_)));
    }

    #[test]
    fn translation_is_idempotent_and_cached() {
        let dialect = CockroachDialect::new(details());
        let once = dialect.translate_sql("x = ?").into_owned();
        assert_eq!(dialect.translate_sql(&once), once);
        assert_eq!(dialect.translate_sql("x = ?"), "x = $1");
        assert_eq!(dialect.placeholders.cache.len(), 1);
    }

    #[test]
    fn question_marks_in_literals_are_rewritten() {
        let dialect = PostgresDialect::new(details());
        assert_eq!(
            dialect.translate_sql("name = 'who?' AND id = ?"),
            "name = 'who$1' AND id = $2"
        );
    }

    #[test]
    fn urls_and_capabilities() {
        let pg = PostgresDialect::new(details());
        assert_eq!(pg.url(), "postgres://app:secret@db:5433/shop");
        assert!(pg.supports_returning());
        assert_eq!(pg.quote("public.users"), r#""public"."users""#);
        let err = pg.dump_schema(&mut NoStore).unwrap_err();
        assert_eq!(err.to_string(), "dump_schema is not supported by the postgres dialect");

        let crdb = CockroachDialect::new(ConnectionDetails::from_url("cockroach://root@node/app").unwrap());
        assert_eq!(crdb.default_port(), Some(26257));
        assert_eq!(crdb.migration_url(), "cockroach://root@node:26257/app");
    }

    struct NoStore;

    impl Store for NoStore {
        fn query(&mut self, _sql: &str, _args: &[Value]) -> Result<Vec<kiln_core::Row>> {
            Ok(Vec::new())
        }

        fn execute(&mut self, _sql: &str, _args: &[Value]) -> Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn truncate_without_tables_is_a_no_op() {
        let pg = PostgresDialect::new(details());
        pg.truncate_all(&mut NoStore).unwrap();
    }
}
