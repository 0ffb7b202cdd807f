//! # Kiln
//!
//! Model-driven SQL mapping with batched association preloading, for
//! SQLite, PostgreSQL, CockroachDB and MySQL.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kiln::prelude::*;
//!
//! #[derive(Debug, Clone, Default, Model)]
//! struct User {
//!     id: i64,
//!     name: String,
//!     #[has_many(order_by = "books.title asc")]
//!     books: Vec<Book>,
//! }
//!
//! #[derive(Debug, Clone, Default, Model)]
//! struct Book {
//!     id: i64,
//!     title: String,
//!     user_id: Option<i64>,
//! }
//!
//! # fn main() -> kiln::Result<()> {
//! let details = ConnectionDetails::from_url("sqlite3://:memory:")?;
//! let mut conn = kiln::open(&details, kiln::sqlite::SqliteStore::open_in_memory()?)?;
//!
//! let users: Vec<User> = conn.all(&conn.eager_preload(&["books"]).r#where("name like ?", args!["a%"]))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Database Support
//!
//! | Database    | Dialect crate   | Store            | Feature Flag    |
//! |-------------|-----------------|------------------|-----------------|
//! | SQLite      | `kiln-sqlite`   | `SqliteStore`    | `rusqlite`      |
//! | PostgreSQL  | `kiln-postgres` | `PostgresStore`  | `postgres-sync` |
//! | CockroachDB | `kiln-postgres` | `PostgresStore`  | `postgres-sync` |
//! | MySQL       | `kiln-mysql`    | bring your own   | `mysql`         |

extern crate self as kiln;

use std::sync::Arc;

/// Result type for kiln operations
pub use kiln_core::error::Result;

/// Error types
pub mod error {
    pub use kiln_core::error::{ErrorKind, KilnError};
}

/// The core crate, also the path root of `#[derive(Model)]` output.
pub use kiln_core as core;

pub use kiln_core::{
    Config, Connection, ConnectionDetails, Context, Dialect, DialectKind, EagerMode, Model,
    Paginator, Query, Row, Store, Value, args,
};

/// Derives `Model` and `Record`; see the macro docs for attributes.
pub use kiln_macros::Model;

#[cfg(feature = "sqlite")]
pub use kiln_sqlite as sqlite;

#[cfg(feature = "postgres")]
pub use kiln_postgres as postgres;

#[cfg(feature = "mysql")]
pub use kiln_mysql as mysql;

/// Picks the dialect named by `details`.
///
/// Fails with `UnknownDialect` for unrecognized names and with
/// `Unsupported` when the dialect's crate was compiled out.
pub fn dialect_for(details: &ConnectionDetails) -> Result<Arc<dyn Dialect>> {
    let mut details = details.clone();
    details.finalize()?;
    match details.dialect_kind()? {
        #[cfg(feature = "sqlite")]
        DialectKind::Sqlite => Ok(Arc::new(sqlite::SqliteDialect::new(details))),
        #[cfg(feature = "postgres")]
        DialectKind::Postgres => Ok(Arc::new(postgres::PostgresDialect::new(details))),
        #[cfg(feature = "postgres")]
        DialectKind::Cockroach => Ok(Arc::new(postgres::CockroachDialect::new(details))),
        #[cfg(feature = "mysql")]
        DialectKind::Mysql => Ok(Arc::new(mysql::MysqlDialect::new(details))),
        #[allow(unreachable_patterns)]
        other => Err(kiln_core::dialect::unsupported(other.name(), "connect")),
    }
}

/// A connection over `store`, speaking the dialect named by `details`.
pub fn open(details: &ConnectionDetails, store: impl Store + 'static) -> Result<Connection> {
    Ok(Connection::new(store, dialect_for(details)?))
}

/// Common imports.
pub mod prelude {
    pub use crate::{
        Config, Connection, ConnectionDetails, Context, EagerMode, Model, Paginator, Query, Value,
        args,
    };
    pub use kiln_core::{FromValue, Record, ToValue};
}
