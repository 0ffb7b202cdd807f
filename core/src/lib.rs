//! Core of kiln: model metadata, the dialect capability set, the query
//! builder and the association preload engine.
//!
//! Nothing here talks to a database directly. Statements go through a
//! [`Store`], and dialect crates (`kiln-sqlite`, `kiln-postgres`,
//! `kiln-mysql`) supply [`Dialect`] implementations.

pub mod cache;
pub mod columns;
pub mod connection;
pub mod context;
pub mod details;
pub mod dialect;
pub mod error;
pub mod model;
pub mod preload;
pub mod query;
pub mod store;
pub mod tracing;
pub mod value;

#[cfg(test)]
mod testing;

pub use columns::{Column, Columns};
pub use connection::{Config, Connection};
pub use context::Context;
pub use details::{ConnectionDetails, DialectKind};
pub use dialect::Dialect;
pub use error::{ErrorKind, KilnError, Result};
pub use model::{
    AssociationDef, AssociationKind, FieldDef, Loaded, Metadata, Model, ModelDef, Record, Shape,
    describe, describe_def, hydrate, hydrate_as, new_record,
};
pub use preload::{EagerMode, PathNode, Preloader, plan};
pub use query::{Clause, EagerRequest, JoinKind, Paginator, Query, RawSql};
pub use store::{Row, Store};
pub use value::{FromValue, Key, ToValue, Value};

#[cfg(feature = "uuid")]
pub use value::generate_uuid;
