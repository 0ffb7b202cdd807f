//! Tracing utilities for statement and preload observability.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]` boilerplate
//! at every call site.

/// Emit a tracing event with the SQL text and parameter count.
///
/// The first argument promotes the event from `debug` to `info`.
///
/// ```ignore
/// kiln_trace_query!(config.log_queries, &sql, args.len());
/// ```
#[macro_export]
macro_rules! kiln_trace_query {
    ($loud:expr, $sql:expr, $param_count:expr) => {
        #[cfg(feature = "tracing")]
        {
            if $loud {
                ::tracing::info!(sql = %$sql, params = $param_count, "kiln.query");
            } else {
                ::tracing::debug!(sql = %$sql, params = $param_count, "kiln.query");
            }
        }
        #[cfg(not(feature = "tracing"))]
        {
            let _ = (&$loud, &$sql, &$param_count);
        }
    };
}

/// Emit a debug-level event for one batched association edge.
///
/// ```ignore
/// kiln_trace_preload!("User", "books", keys.len());
/// ```
#[macro_export]
macro_rules! kiln_trace_preload {
    ($model:expr, $field:expr, $key_count:expr) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!(model = %$model, field = %$field, keys = $key_count, "kiln.preload");
        #[cfg(not(feature = "tracing"))]
        {
            let _ = (&$model, &$field, &$key_count);
        }
    };
}

/// Emit a warning-level diagnostic.
///
/// ```ignore
/// kiln_warn!("ignoring clause on a raw query: {}", fragment);
/// ```
#[macro_export]
macro_rules! kiln_warn {
    ($($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        ::tracing::warn!($($arg)+);
    };
}
