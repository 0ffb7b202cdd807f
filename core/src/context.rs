use std::sync::Arc;

use compact_str::CompactString;
use hashbrown::HashMap;

use crate::error::{KilnError, Result};
use crate::value::Value;

/// Request-scoped values, passed unchanged through every call a connection makes.
///
/// Cloning is cheap; adding a value copies the map on write.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: Arc<HashMap<CompactString, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new context with `key` set, leaving `self` untouched.
    pub fn with_value(&self, key: &str, value: impl Into<Value>) -> Self {
        let mut values = (*self.values).clone();
        values.insert(CompactString::from(key), value.into());
        Self {
            values: Arc::new(values),
        }
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Like [`Context::value`], but a missing key is an error.
    pub fn require(&self, key: &str) -> Result<&Value> {
        self.value(key).ok_or_else(|| KilnError::MissingContextValue {
            key: key.to_owned(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
