//! The execution boundary: whatever actually talks to a database.

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::error::{KilnError, Result};
use crate::value::Value;

/// One result row as ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: SmallVec<[(CompactString, Value); 16]>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<CompactString>, value: Value) {
        self.columns.push((column.into(), value));
    }

    pub fn with(mut self, column: impl Into<CompactString>, value: impl Into<Value>) -> Self {
        self.push(column, value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Removes and returns a column, used for bookkeeping columns.
    pub fn take(&mut self, column: &str) -> Option<Value> {
        let index = self.columns.iter().position(|(name, _)| name == column)?;
        Some(self.columns.remove(index).1)
    }

    /// Value of the first column, for scalar queries.
    pub fn first(&self) -> Option<&Value> {
        self.columns.first().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl IntoIterator for Row {
    type Item = (CompactString, Value);
    type IntoIter = smallvec::IntoIter<[(CompactString, Value); 16]>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl FromIterator<(CompactString, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (CompactString, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// Executes dialect-ready SQL.
///
/// Arguments never contain [`Value::List`]; lists are expanded into
/// placeholders before SQL reaches a store.
pub trait Store: Send {
    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>>;

    /// Runs a statement and returns the number of affected rows.
    fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64>;

    /// Key generated by the last insert, for dialects without RETURNING.
    fn last_insert_id(&mut self) -> Result<Value> {
        Err(KilnError::Store(
            "this store does not report generated keys".to_owned(),
        ))
    }

    /// Runs several `;`-separated statements without arguments.
    ///
    /// The default splits naively; stores with a native batch API override it.
    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            self.execute(statement, &[])?;
        }
        Ok(())
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, args)
    }

    fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64> {
        (**self).execute(sql, args)
    }

    fn last_insert_id(&mut self) -> Result<Value> {
        (**self).last_insert_id()
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        (**self).execute_batch(sql)
    }
}
