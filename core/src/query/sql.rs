use std::sync::LazyLock;

use regex::Regex;

use super::{Clause, Query, RawSql};
use crate::columns::Columns;
use crate::dialect::{Dialect, push_placeholders};
use crate::error::{KilnError, Result};
use crate::model::Metadata;
use crate::value::Value;

static IN_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bin\s*\(\s*\?\s*\)").expect("valid regex"));
static LIMIT_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\s+limit\s+\d+(?:\s*,\s*\d+)?\s*;?\s*$").expect("valid regex")
});
static OFFSET_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\s+offset\s+\d+(?:\s+rows?)?\s*;?\s*$").expect("valid regex"));
static FETCH_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\s+fetch\s+(?:first|next)\s+\d+\s+rows?\s+only\s*;?\s*$").expect("valid regex")
});

/// Expands list arguments into one placeholder per element.
///
/// `id IN (?)` with several scalar arguments spreads all of them into the
/// parentheses. An empty list renders `NULL`, so `IN (NULL)` matches nothing.
/// Arguments beyond the last placeholder are passed through in order.
pub fn expand_placeholders(fragment: &str, args: &[Value]) -> (String, Vec<Value>) {
    let placeholders = fragment.matches('?').count();
    if placeholders == 1 && args.len() > 1 && IN_PLACEHOLDER.is_match(fragment) {
        let flat: Vec<Value> = args.iter().flat_map(flatten).collect();
        let mut list = String::new();
        push_placeholders(&mut list, flat.len());
        let sql = IN_PLACEHOLDER
            .replace(fragment, |caps: &regex::Captures<'_>| caps[0].replacen('?', &list, 1))
            .into_owned();
        return (sql, flat);
    }

    let mut sql = String::with_capacity(fragment.len());
    let mut out = Vec::with_capacity(args.len());
    let mut rest = args.iter();
    for ch in fragment.chars() {
        if ch != '?' {
            sql.push(ch);
            continue;
        }
        match rest.next() {
            Some(Value::List(items)) if items.is_empty() => sql.push_str("NULL"),
            Some(Value::List(items)) => {
                push_placeholders(&mut sql, items.len());
                out.extend(items.iter().cloned());
            }
            Some(value) => {
                sql.push('?');
                out.push(value.clone());
            }
            None => sql.push('?'),
        }
    }
    out.extend(rest.flat_map(flatten));
    (sql, out)
}

fn flatten(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// Whether hand-written SQL already ends with a row limit.
pub(crate) fn has_row_limit(sql: &str) -> bool {
    let trimmed = OFFSET_TAIL.replace(sql, "");
    LIMIT_TAIL.is_match(&trimmed) || FETCH_TAIL.is_match(&trimmed)
}

/// Removes any trailing `LIMIT`, `OFFSET` and `FETCH FIRST` clauses.
pub(crate) fn strip_row_limit(sql: &str) -> String {
    let mut out = sql.trim_end().to_owned();
    loop {
        let before = out.len();
        for tail in [&*FETCH_TAIL, &*LIMIT_TAIL, &*OFFSET_TAIL] {
            out = tail.replace(&out, "").into_owned();
        }
        if out.len() == before {
            return out;
        }
    }
}

struct Parts {
    sql: String,
    args: Vec<Value>,
}

impl Parts {
    fn push_fragment(&mut self, fragment: &str, args: &[Value]) {
        let (sql, args) = expand_placeholders(fragment, args);
        self.sql.push_str(&sql);
        self.args.extend(args);
    }

    fn push_list<'a>(
        &mut self,
        keyword: &str,
        separator: &str,
        items: impl Iterator<Item = (&'a str, &'a [Value])>,
    ) {
        let mut first = true;
        for (fragment, args) in items {
            self.sql.push_str(if first { keyword } else { separator });
            first = false;
            self.push_fragment(fragment, args);
        }
    }
}

impl Query {
    /// Renders the query for `meta` in `dialect`'s placeholder style.
    pub fn to_sql<D: Dialect + ?Sized>(&self, meta: &Metadata, dialect: &D) -> Result<(String, Vec<Value>)> {
        self.to_sql_with(meta, dialect, &[])
    }

    /// Like [`Query::to_sql`], selecting `extra` columns as well.
    pub fn to_sql_with<D: Dialect + ?Sized>(
        &self,
        meta: &Metadata,
        dialect: &D,
        extra: &[&str],
    ) -> Result<(String, Vec<Value>)> {
        let (sql, args) = match &self.raw {
            Some(raw) => self.render_raw(raw)?,
            None => self.render_select(meta, dialect, extra, true)?,
        };
        Ok((dialect.translate_sql(&sql).into_owned(), args))
    }

    /// `SELECT COUNT(<field>) AS row_count` over the query, ignoring order,
    /// limit and pagination.
    pub fn count_sql<D: Dialect + ?Sized>(
        &self,
        meta: &Metadata,
        dialect: &D,
        field: &str,
    ) -> Result<(String, Vec<Value>)> {
        let (inner, args) = match &self.raw {
            Some(raw) => {
                let (sql, args) = raw_parts(raw)?;
                (strip_row_limit(&sql), args)
            }
            None => self.render_select(meta, dialect, &[], false)?,
        };
        let sql = format!("SELECT COUNT({field}) AS row_count FROM ({inner}) a");
        Ok((dialect.translate_sql(&sql).into_owned(), args))
    }

    /// `SELECT EXISTS (<query>)`.
    pub fn exists_sql<D: Dialect + ?Sized>(&self, meta: &Metadata, dialect: &D) -> Result<(String, Vec<Value>)> {
        let (inner, args) = match &self.raw {
            Some(raw) => raw_parts(raw)?,
            None => self.render_select(meta, dialect, &[], true)?,
        };
        let sql = format!("SELECT EXISTS ({inner}) AS row_exists");
        Ok((dialect.translate_sql(&sql).into_owned(), args))
    }

    /// ` WHERE ...` for statements that operate on the query's rows.
    ///
    /// Untranslated; callers translate the whole statement.
    pub(crate) fn where_sql(&self) -> (String, Vec<Value>) {
        let mut parts = Parts {
            sql: String::new(),
            args: Vec::new(),
        };
        parts.push_list(" WHERE ", " AND ", self.wheres());
        (parts.sql, parts.args)
    }

    fn wheres(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.clauses.iter().filter_map(|c| match c {
            Clause::Where { fragment, args } => Some((fragment.as_str(), args.as_slice())),
            _ => None,
        })
    }

    fn render_raw(&self, raw: &RawSql) -> Result<(String, Vec<Value>)> {
        let (mut sql, args) = raw_parts(raw)?;
        if let Some(p) = &self.paginator
            && !has_row_limit(&sql)
        {
            let trimmed_len = sql.trim_end().trim_end_matches(';').len();
            sql.truncate(trimmed_len);
            sql.push_str(&format!(" LIMIT {} OFFSET {}", p.per_page, p.offset));
        }
        Ok((sql, args))
    }

    fn render_select<D: Dialect + ?Sized>(
        &self,
        meta: &Metadata,
        dialect: &D,
        extra: &[&str],
        paged: bool,
    ) -> Result<(String, Vec<Value>)> {
        if meta.table_name.trim().is_empty() {
            return Err(KilnError::EmptyQuery);
        }
        let alias = self.alias.as_deref().unwrap_or(&meta.alias);

        let mut columns = if self.columns.is_empty() {
            (*Columns::for_model(meta.def, alias)).clone()
        } else {
            Columns::explicit(self.columns.as_slice())
        };
        columns.extend(&Columns::explicit(self.extra_columns.as_slice()));
        columns.extend(&Columns::explicit(extra));
        let mut select = columns.select_string();
        if select.is_empty() {
            select.push('*');
        }

        let mut parts = Parts {
            sql: format!(
                "SELECT {} FROM {} AS {}",
                select,
                dialect.quote(&meta.table_name),
                alias
            ),
            args: Vec::new(),
        };

        for clause in &self.clauses {
            if let Clause::Join {
                kind,
                table,
                on,
                args,
            } = clause
            {
                parts.sql.push(' ');
                parts.sql.push_str(kind.keyword());
                parts.sql.push(' ');
                parts.sql.push_str(table);
                parts.sql.push_str(" ON ");
                parts.push_fragment(on, args);
            }
        }

        parts.push_list(" WHERE ", " AND ", self.wheres());

        let groups: Vec<&str> = self
            .clauses
            .iter()
            .filter_map(|c| match c {
                Clause::Group(field) => Some(field.as_str()),
                _ => None,
            })
            .collect();
        if !groups.is_empty() {
            parts.sql.push_str(" GROUP BY ");
            parts.sql.push_str(&groups.join(", "));
        }

        parts.push_list(
            " HAVING ",
            " AND ",
            self.clauses.iter().filter_map(|c| match c {
                Clause::Having { condition, args } => Some((condition.as_str(), args.as_slice())),
                _ => None,
            }),
        );

        if !paged {
            return Ok((parts.sql, parts.args));
        }

        parts.push_list(
            " ORDER BY ",
            ", ",
            self.clauses.iter().filter_map(|c| match c {
                Clause::Order { fragment, args } => Some((fragment.as_str(), args.as_slice())),
                _ => None,
            }),
        );

        match &self.paginator {
            Some(p) => parts
                .sql
                .push_str(&format!(" LIMIT {} OFFSET {}", p.per_page, p.offset)),
            None => {
                if let Some(limit) = self.limit {
                    parts.sql.push_str(&format!(" LIMIT {limit}"));
                }
                if let Some(offset) = self.offset {
                    parts.sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
        }
        Ok((parts.sql, parts.args))
    }
}

fn raw_parts(raw: &RawSql) -> Result<(String, Vec<Value>)> {
    if raw.sql.trim().is_empty() {
        return Err(KilnError::EmptyQuery);
    }
    Ok(expand_placeholders(&raw.sql, &raw.args))
}
