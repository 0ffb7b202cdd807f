//! The dialect capability set.
//!
//! Each database family implements [`Dialect`]. CRUD has shared default
//! implementations in [`generic`]; a dialect overrides only what differs
//! (placeholder style, quoting, key retrieval, schema tooling).

pub mod generic;

use std::borrow::Cow;
use std::fmt;

use crate::details::{ConnectionDetails, DialectKind};
use crate::error::{KilnError, Result};
use crate::model::{Metadata, Record};
use crate::query::Query;
use crate::store::{Row, Store};
use crate::value::Value;

pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn kind(&self) -> DialectKind;

    fn details(&self) -> &ConnectionDetails;

    fn url(&self) -> String;

    /// URL handed to migration tooling.
    fn migration_url(&self) -> String {
        self.url()
    }

    fn default_port(&self) -> Option<u16> {
        self.kind().default_port()
    }

    /// Rewrites `?` placeholders into the native style.
    ///
    /// Must be idempotent: translating already translated SQL is a no-op.
    fn translate_sql<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(sql)
    }

    /// Quotes an identifier; dotted names are quoted per part.
    fn quote(&self, ident: &str) -> String {
        quote_parts(ident, '"', '"')
    }

    /// Whether INSERT can hand back generated keys with `RETURNING`.
    fn supports_returning(&self) -> bool {
        false
    }

    fn create(&self, store: &mut dyn Store, meta: &Metadata, record: &mut dyn Record) -> Result<()> {
        generic::create(self, store, meta, record)
    }

    fn update(&self, store: &mut dyn Store, meta: &Metadata, record: &mut dyn Record) -> Result<()> {
        generic::update(self, store, meta, record)
    }

    /// Updates the given columns on every row the query matches.
    fn update_query(
        &self,
        store: &mut dyn Store,
        meta: &Metadata,
        query: &Query,
        values: &[(&str, Value)],
    ) -> Result<u64> {
        generic::update_query(self, store, meta, query, values)
    }

    fn destroy(&self, store: &mut dyn Store, meta: &Metadata, record: &dyn Record) -> Result<()> {
        generic::destroy(self, store, meta, record)
    }

    /// Deletes every row the query matches.
    fn delete(&self, store: &mut dyn Store, meta: &Metadata, query: &Query) -> Result<u64> {
        generic::delete(self, store, meta, query)
    }

    fn select_one(&self, store: &mut dyn Store, meta: &Metadata, query: &Query) -> Result<Row> {
        generic::select_one(self, store, meta, query)
    }

    fn select_many(&self, store: &mut dyn Store, meta: &Metadata, query: &Query) -> Result<Vec<Row>> {
        generic::select_many(self, store, meta, query)
    }

    /// Runs `critical` under the dialect's schema lock.
    ///
    /// Only file-backed engines need one; the default just runs the closure.
    fn lock(&self, critical: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        critical()
    }

    /// Removes every row from every table.
    fn truncate_all(&self, _store: &mut dyn Store) -> Result<()> {
        Err(unsupported(self.name(), "truncate_all"))
    }

    fn dump_schema(&self, _store: &mut dyn Store) -> Result<String> {
        Err(unsupported(self.name(), "dump_schema"))
    }

    fn load_schema(&self, _store: &mut dyn Store, _schema: &str) -> Result<()> {
        Err(unsupported(self.name(), "load_schema"))
    }
}

pub fn unsupported(dialect: &'static str, operation: &'static str) -> KilnError {
    KilnError::Unsupported { dialect, operation }
}

/// Quotes each dot-separated part of `ident`, dropping quotes already present.
pub fn quote_parts(ident: &str, open: char, close: char) -> String {
    let bare: String = ident.chars().filter(|c| *c != open && *c != close).collect();
    let mut out = String::with_capacity(bare.len() + 4);
    for (i, part) in bare.split('.').enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push(open);
        out.push_str(part);
        out.push(close);
    }
    out
}

/// Appends `n` comma-separated `?` placeholders.
pub fn push_placeholders(sql: &mut String, n: usize) {
    for i in 0..n {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
    }
}
