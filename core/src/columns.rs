//! Column sets used to render SELECT lists and INSERT/UPDATE targets.

use std::sync::{Arc, LazyLock};

use crate::cache::ShardedCache;
use crate::model::ModelDef;

static MODEL_COLUMNS: LazyLock<ShardedCache<(usize, String), Arc<Columns>>> =
    LazyLock::new(ShardedCache::new);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub select_sql: String,
    pub readable: bool,
    pub writeable: bool,
}

/// An ordered, de-duplicated set of columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Columns {
    alias: Option<String>,
    cols: Vec<Column>,
}

impl Columns {
    /// Empty set; names added later are prefixed with `alias` when given.
    pub fn new(alias: Option<&str>) -> Self {
        Self {
            alias: alias.map(str::to_owned),
            cols: Vec::new(),
        }
    }

    /// Columns declared on `def`, as seen through `alias`.
    pub fn for_model(def: &'static ModelDef, alias: &str) -> Arc<Columns> {
        MODEL_COLUMNS.get_or_insert_with((def.id(), alias.to_owned()), || {
            let mut columns = Columns::new(Some(alias));
            for field in def.fields {
                let select_sql = match field.select {
                    Some(sql) => sql.to_owned(),
                    None => format!("{}.{}", alias, field.column),
                };
                columns.push(Column {
                    name: field.column.to_owned(),
                    select_sql,
                    readable: field.readable,
                    writeable: field.writeable,
                });
            }
            Arc::new(columns)
        })
    }

    /// Columns named explicitly by a query, kept verbatim.
    pub fn explicit<S: AsRef<str>>(specs: &[S]) -> Columns {
        let mut columns = Columns::new(None);
        for spec in specs {
            columns.add(spec.as_ref());
        }
        columns
    }

    /// Adds a column from its textual form.
    ///
    /// A trailing `,r` marks it read-only and `,w` write-only. Anything with
    /// an `AS` or a space is used verbatim as select SQL, its last word being
    /// the column name. Blank specs are ignored.
    pub fn add(&mut self, spec: &str) {
        let (body, marker) = match spec.strip_suffix(",r") {
            Some(body) => (body, Some('r')),
            None => match spec.strip_suffix(",w") {
                Some(body) => (body, Some('w')),
                None => (spec, None),
            },
        };
        let body = body.trim();
        if body.is_empty() {
            return;
        }

        let upper = body.to_ascii_uppercase();
        let (name, verbatim) = if let Some(i) = upper.rfind(" AS ") {
            (body[i + 4..].trim(), true)
        } else if body.contains(char::is_whitespace) {
            (body.rsplit(char::is_whitespace).next().unwrap_or(body), true)
        } else {
            (body, false)
        };

        let select_sql = match (&self.alias, verbatim) {
            (Some(alias), false) if !name.contains('.') => format!("{alias}.{name}"),
            _ => body.to_owned(),
        };

        let mut column = Column {
            name: name.to_owned(),
            select_sql,
            readable: true,
            writeable: true,
        };
        match marker {
            Some('r') => column.writeable = false,
            Some(_) => column.readable = false,
            None if column.name == "id" => column.writeable = false,
            None => {}
        }
        self.push(column);
    }

    fn push(&mut self, column: Column) {
        let duplicate = self.cols.iter().any(|c| c.select_sql == column.select_sql);
        if !duplicate {
            self.cols.push(column);
        }
    }

    /// Merges `other` into this set, skipping duplicates.
    pub fn extend(&mut self, other: &Columns) {
        for column in &other.cols {
            self.push(column.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.cols.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.cols.iter()
    }

    pub fn len(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    pub fn readable(&self) -> impl Iterator<Item = &Column> {
        self.cols.iter().filter(|c| c.readable)
    }

    pub fn writeable(&self) -> impl Iterator<Item = &Column> {
        self.cols.iter().filter(|c| c.writeable)
    }

    /// Comma-separated readable select SQL, alphabetically sorted.
    pub fn select_string(&self) -> String {
        let mut parts: Vec<&str> = self.readable().map(|c| c.select_sql.as_str()).collect();
        parts.sort_unstable();
        parts.dedup();
        parts.join(", ")
    }

    /// Alphabetically sorted writeable column names.
    pub fn writeable_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.writeable().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        names
    }
}
