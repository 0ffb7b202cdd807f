use thiserror::Error;

/// Coarse grouping of [`KilnError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The model description is incomplete or does not match the request.
    Metadata,
    /// The dialect cannot perform the operation or could not be selected.
    Dialect,
    /// The query could not be rendered.
    Query,
    /// The store rejected or failed a statement.
    Execution,
}

#[derive(Debug, Error)]
pub enum KilnError {
    /// A primary key column is not declared on the model
    #[error("model {model} is missing required field {field}")]
    MissingPrimaryKey { model: String, field: String },

    /// An operation needed a persisted record but its key is still zero
    #[error("model {model} has no value for primary key {field}")]
    ZeroPrimaryKey { model: String, field: String },

    /// Association path names a field the model does not declare
    #[error("could not retrieve associations: field {field} does not exist in model {model}")]
    UnknownAssociation { field: String, model: String },

    /// Association path has an empty or wildcard segment
    #[error("association '{path}' is not a valid path")]
    MalformedPath { path: String },

    /// An association refers to a column the model does not map
    #[error("model {model} has no column {column}")]
    MissingColumn { model: String, column: String },

    /// A context-derived table name needed a value that was not provided
    #[error("context value '{key}' is missing")]
    MissingContextValue { key: String },

    /// A context-derived table name could not be produced
    #[error("table name error: {0}")]
    TableName(String),

    /// The dialect does not implement the requested operation
    #[error("{operation} is not supported by the {dialect} dialect")]
    Unsupported {
        dialect: &'static str,
        operation: &'static str,
    },

    /// No dialect matches the configured name
    #[error("could not find a dialect for '{0}'")]
    UnknownDialect(String),

    /// A connection URL could not be parsed
    #[error("invalid connection url: {0}")]
    InvalidUrl(String),

    /// The query has no SQL to run
    #[error("empty query")]
    EmptyQuery,

    /// The query cannot be used for the requested operation
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// No rows returned when at least one was expected
    #[error("No rows found")]
    NotFound,

    /// Error mapping a stored value onto a field
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Error reported by a store implementation
    #[error("Execution error: {0}")]
    Store(String),

    /// Rusqlite specific errors
    #[cfg(feature = "rusqlite")]
    #[error("{0}")]
    Rusqlite(#[from] rusqlite::Error),

    /// Postgres specific errors
    #[cfg(feature = "postgres-sync")]
    #[error("{0}")]
    Postgres(#[from] postgres::Error),
}

impl KilnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingPrimaryKey { .. }
            | Self::ZeroPrimaryKey { .. }
            | Self::UnknownAssociation { .. }
            | Self::MalformedPath { .. }
            | Self::MissingColumn { .. }
            | Self::MissingContextValue { .. }
            | Self::TableName(_) => ErrorKind::Metadata,
            Self::Unsupported { .. } | Self::UnknownDialect(_) | Self::InvalidUrl(_) => {
                ErrorKind::Dialect
            }
            Self::EmptyQuery | Self::InvalidQuery(_) => ErrorKind::Query,
            Self::NotFound | Self::Mapping(_) | Self::Store(_) => ErrorKind::Execution,
            #[cfg(feature = "rusqlite")]
            Self::Rusqlite(_) => ErrorKind::Execution,
            #[cfg(feature = "postgres-sync")]
            Self::Postgres(_) => ErrorKind::Execution,
        }
    }

    /// Whether the error means the query matched no rows.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound => true,
            #[cfg(feature = "rusqlite")]
            Self::Rusqlite(rusqlite::Error::QueryReturnedNoRows) => true,
            _ => false,
        }
    }
}

/// Result type for database operations
pub type Result<T> = std::result::Result<T, KilnError>;
