//! Composable, connection-free query descriptions.
//!
//! A [`Query`] is an ordered list of clause fragments with `?` placeholders.
//! Rendering (see [`Query::to_sql`]) turns it into dialect SQL against a
//! model's [`Metadata`](crate::model::Metadata).

mod paginator;
mod sql;

pub use paginator::Paginator;
pub use sql::expand_placeholders;

use crate::kiln_warn;
use crate::preload::EagerMode;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Join,
    Inner,
    Left,
    LeftOuter,
    Right,
    RightOuter,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Join => "JOIN",
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::LeftOuter => "LEFT OUTER JOIN",
            Self::Right => "RIGHT JOIN",
            Self::RightOuter => "RIGHT OUTER JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Where { fragment: String, args: Vec<Value> },
    Order { fragment: String, args: Vec<Value> },
    Group(String),
    Having { condition: String, args: Vec<Value> },
    Join {
        kind: JoinKind,
        table: String,
        on: String,
        args: Vec<Value>,
    },
}

/// Hand-written SQL that bypasses structured rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSql {
    pub sql: String,
    pub args: Vec<Value>,
}

/// Association paths to load alongside the query's records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EagerRequest {
    /// `None` defers to the connection's configured mode.
    pub mode: Option<EagerMode>,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    clauses: Vec<Clause>,
    limit: Option<u64>,
    offset: Option<u64>,
    raw: Option<RawSql>,
    columns: Vec<String>,
    extra_columns: Vec<String>,
    eager: Option<EagerRequest>,
    paginator: Option<Paginator>,
    alias: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// A query that runs `sql` as written.
    ///
    /// Structured clause methods called afterwards are ignored with a warning.
    pub fn raw(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            raw: Some(RawSql {
                sql: sql.into(),
                args,
            }),
            ..Self::default()
        }
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }

    pub fn raw_sql(&self) -> Option<&RawSql> {
        self.raw.as_ref()
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn accepts(&self, method: &str) -> bool {
        if self.raw.is_some() {
            kiln_warn!(method = %method, "query is set up to use raw SQL; ignoring clause");
            return false;
        }
        true
    }

    fn push(mut self, method: &str, clause: Clause) -> Self {
        if self.accepts(method) {
            self.clauses.push(clause);
        }
        self
    }

    /// Adds a condition; conditions are joined with `AND`.
    ///
    /// A list argument, or several arguments for a single `IN (?)`, expands
    /// into one placeholder per element.
    pub fn r#where(self, fragment: impl Into<String>, args: Vec<Value>) -> Self {
        let fragment = fragment.into();
        self.push("where", Clause::Where { fragment, args })
    }

    pub fn order(self, fragment: impl Into<String>) -> Self {
        self.order_with(fragment, Vec::new())
    }

    /// Order fragment with bound arguments, e.g. `title > ? DESC`.
    pub fn order_with(self, fragment: impl Into<String>, args: Vec<Value>) -> Self {
        let fragment = fragment.into();
        self.push("order", Clause::Order { fragment, args })
    }

    pub fn group_by(mut self, fields: &[&str]) -> Self {
        if self.accepts("group_by") {
            self.clauses
                .extend(fields.iter().map(|f| Clause::Group((*f).to_owned())));
        }
        self
    }

    pub fn having(self, condition: impl Into<String>, args: Vec<Value>) -> Self {
        let condition = condition.into();
        self.push("having", Clause::Having { condition, args })
    }

    pub fn join_with(
        self,
        kind: JoinKind,
        table: impl Into<String>,
        on: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        let (table, on) = (table.into(), on.into());
        self.push(
            "join",
            Clause::Join {
                kind,
                table,
                on,
                args,
            },
        )
    }

    pub fn join(self, table: impl Into<String>, on: impl Into<String>, args: Vec<Value>) -> Self {
        self.join_with(JoinKind::Join, table, on, args)
    }

    pub fn inner_join(self, table: impl Into<String>, on: impl Into<String>, args: Vec<Value>) -> Self {
        self.join_with(JoinKind::Inner, table, on, args)
    }

    pub fn left_join(self, table: impl Into<String>, on: impl Into<String>, args: Vec<Value>) -> Self {
        self.join_with(JoinKind::Left, table, on, args)
    }

    pub fn left_outer_join(
        self,
        table: impl Into<String>,
        on: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        self.join_with(JoinKind::LeftOuter, table, on, args)
    }

    pub fn right_join(self, table: impl Into<String>, on: impl Into<String>, args: Vec<Value>) -> Self {
        self.join_with(JoinKind::Right, table, on, args)
    }

    pub fn right_outer_join(
        self,
        table: impl Into<String>,
        on: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        self.join_with(JoinKind::RightOuter, table, on, args)
    }

    pub fn limit(mut self, n: u64) -> Self {
        if self.accepts("limit") {
            self.limit = Some(n);
        }
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        if self.accepts("offset") {
            self.offset = Some(n);
        }
        self
    }

    /// Replaces the default column list.
    ///
    /// Entries may carry `,r`/`,w` markers or be expressions such as
    /// `name as full_name`; blank entries are ignored.
    pub fn select(mut self, columns: &[&str]) -> Self {
        if self.accepts("select") {
            self.columns.extend(columns.iter().map(|c| (*c).to_owned()));
        }
        self
    }

    /// Overrides the table alias used in `FROM <table> AS <alias>`.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Limits results to one page and requests a total count.
    ///
    /// Works on raw queries too: `LIMIT/OFFSET` is appended unless the SQL
    /// already ends with a row limit.
    pub fn paginate(mut self, page: i64, per_page: i64) -> Self {
        self.paginator = Some(Paginator::new(page, per_page));
        self
    }

    /// Reads `page` and `per_page` from request parameters.
    pub fn paginate_from_params<'a>(self, params: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let (mut page, mut per_page) = (1, 20);
        for (key, value) in params {
            match key {
                "page" => page = value.trim().parse().unwrap_or(1),
                "per_page" => per_page = value.trim().parse().unwrap_or(20),
                _ => {}
            }
        }
        self.paginate(page, per_page)
    }

    /// Loads the given association paths with the connection's default mode.
    /// No paths loads every association one level deep.
    pub fn eager(self, paths: &[&str]) -> Self {
        self.eager_with(None, paths)
    }

    /// Loads the given association paths with batched post-fetch queries.
    pub fn eager_preload(self, paths: &[&str]) -> Self {
        self.eager_with(Some(EagerMode::Preload), paths)
    }

    fn eager_with(mut self, mode: Option<EagerMode>, paths: &[&str]) -> Self {
        let request = self.eager.get_or_insert_with(EagerRequest::default);
        if mode.is_some() {
            request.mode = mode;
        }
        request
            .paths
            .extend(paths.iter().map(|p| p.trim().to_owned()).filter(|p| !p.is_empty()));
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn paginator(&self) -> Option<&Paginator> {
        self.paginator.as_ref()
    }

    pub fn eager_request(&self) -> Option<&EagerRequest> {
        self.eager.as_ref()
    }

    pub fn has_order(&self) -> bool {
        self.clauses.iter().any(|c| matches!(c, Clause::Order { .. }))
    }

    pub(crate) fn alias_override(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Columns selected on top of whatever the query selects.
    pub(crate) fn with_extra_columns(mut self, columns: impl IntoIterator<Item = String>) -> Self {
        self.extra_columns.extend(columns);
        self
    }

    /// The same query without pagination, for fetching after a count.
    pub(crate) fn without_paginator(&self) -> Query {
        Query {
            paginator: None,
            ..self.clone()
        }
    }
}
