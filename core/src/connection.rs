//! The user-facing handle: a store, the dialect that talks to it, a request
//! context and runtime configuration.

use std::sync::Arc;

use crate::context::Context;
use crate::dialect::Dialect;
use crate::error::{KilnError, Result};
use crate::kiln_trace_query;
use crate::model::{Metadata, Model, Record, describe, hydrate_as};
use crate::preload::{EagerMode, PathNode, Preloader, plan};
use crate::query::{EagerRequest, Paginator, Query, expand_placeholders};
use crate::store::{Row, Store};
use crate::value::{FromValue, Value};

/// Runtime switches, fixed per connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    /// Strategy for paths requested with [`Query::eager`].
    pub eager_mode: EagerMode,
    /// Emit statements at `info` instead of `debug`.
    pub log_queries: bool,
}

/// Traces every statement on its way to the wrapped store.
struct LoggedStore<'a> {
    inner: &'a mut dyn Store,
    loud: bool,
}

impl Store for LoggedStore<'_> {
    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        kiln_trace_query!(self.loud, sql, args.len());
        self.inner.query(sql, args)
    }

    fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64> {
        kiln_trace_query!(self.loud, sql, args.len());
        self.inner.execute(sql, args)
    }

    fn last_insert_id(&mut self) -> Result<Value> {
        self.inner.last_insert_id()
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        kiln_trace_query!(self.loud, sql, 0);
        self.inner.execute_batch(sql)
    }
}

pub struct Connection {
    store: Box<dyn Store>,
    dialect: Arc<dyn Dialect>,
    context: Context,
    config: Config,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("dialect", &self.dialect.name())
            .field("context", &self.context)
            .field("config", &self.config)
            .finish()
    }
}

impl Connection {
    pub fn new(store: impl Store + 'static, dialect: Arc<dyn Dialect>) -> Self {
        Self {
            store: Box::new(store),
            dialect,
            context: Context::new(),
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Every later call resolves table names against `context`.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn set_context(&mut self, context: Context) {
        self.context = context;
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn config(&self) -> Config {
        self.config
    }

    fn parts(&mut self) -> (LoggedStore<'_>, &dyn Dialect) {
        (
            LoggedStore {
                inner: self.store.as_mut(),
                loud: self.config.log_queries,
            },
            self.dialect.as_ref(),
        )
    }

    fn metadata<T: Model>(&self, query: &Query) -> Result<Metadata> {
        let meta = describe::<T>(&self.context)?;
        Ok(match query.alias_override() {
            Some(alias) => meta.with_alias(alias),
            None => meta,
        })
    }

    pub fn q(&self) -> Query {
        Query::new()
    }

    pub fn r#where(&self, fragment: impl Into<String>, args: Vec<Value>) -> Query {
        Query::new().r#where(fragment, args)
    }

    pub fn raw_query(&self, sql: impl Into<String>, args: Vec<Value>) -> Query {
        Query::raw(sql, args)
    }

    pub fn eager(&self, paths: &[&str]) -> Query {
        Query::new().eager(paths)
    }

    pub fn eager_preload(&self, paths: &[&str]) -> Query {
        Query::new().eager_preload(paths)
    }

    pub fn paginate(&self, page: i64, per_page: i64) -> Query {
        Query::new().paginate(page, per_page)
    }

    pub fn select(&self, columns: &[&str]) -> Query {
        Query::new().select(columns)
    }

    /// Loads the record with primary key `id`.
    pub fn find<T: Model>(&mut self, id: impl Into<Value>) -> Result<T> {
        self.find_by(&Query::new(), id)
    }

    /// Like [`Connection::find`], keeping the clauses and eager paths of `query`.
    pub fn find_by<T: Model>(&mut self, query: &Query, id: impl Into<Value>) -> Result<T> {
        let meta = self.metadata::<T>(query)?;
        let pk = meta.primary_key()?;
        let query = query
            .clone()
            .r#where(format!("{}.{} = ?", meta.alias, pk.column), vec![id.into()]);
        self.first(&query)
    }

    /// First row by primary key unless the query orders otherwise.
    pub fn first<T: Model>(&mut self, query: &Query) -> Result<T> {
        self.one(query, "ASC")
    }

    /// Last row by primary key unless the query orders otherwise.
    pub fn last<T: Model>(&mut self, query: &Query) -> Result<T> {
        self.one(query, "DESC")
    }

    fn one<T: Model>(&mut self, query: &Query, direction: &str) -> Result<T> {
        let meta = self.metadata::<T>(query)?;
        let mut query = query.clone();
        if !query.is_raw() {
            if !query.has_order() {
                let pk = meta.primary_key()?;
                query = query.order(format!("{}.{} {}", meta.alias, pk.column, direction));
            }
            query = query.limit(1);
        }

        let planned = self.plan_eager::<T>(query.eager_request())?;
        let (mut store, dialect) = self.parts();
        let row = dialect.select_one(&mut store, &meta, &query)?;
        let mut record = hydrate_as::<T>(row)?;
        self.load_planned(std::slice::from_mut(&mut record), planned)?;
        Ok(record)
    }

    pub fn all<T: Model>(&mut self, query: &Query) -> Result<Vec<T>> {
        let meta = self.metadata::<T>(query)?;
        let planned = self.plan_eager::<T>(query.eager_request())?;
        let (mut store, dialect) = self.parts();
        let rows = dialect.select_many(&mut store, &meta, query)?;
        let mut records = rows
            .into_iter()
            .map(hydrate_as::<T>)
            .collect::<Result<Vec<T>>>()?;
        self.load_planned(&mut records, planned)?;
        Ok(records)
    }

    /// One page of records plus the totals of the unpaged query.
    ///
    /// Queries without a paginator get the first page at the default size.
    pub fn paginate_all<T: Model>(&mut self, query: &Query) -> Result<(Vec<T>, Paginator)> {
        let query = match query.paginator() {
            Some(_) => query.clone(),
            None => query
                .clone()
                .paginate(1, Paginator::DEFAULT_PER_PAGE as i64),
        };
        let mut paginator = query.paginator().copied().unwrap_or_default();
        let records = self.all::<T>(&query)?;
        let total = self.count::<T>(&query.without_paginator())?;
        paginator.finish(total, records.len() as u64);
        Ok((records, paginator))
    }

    pub fn count<T: Model>(&mut self, query: &Query) -> Result<u64> {
        self.count_by_field::<T>(query, "*")
    }

    pub fn count_by_field<T: Model>(&mut self, query: &Query, field: &str) -> Result<u64> {
        let meta = self.metadata::<T>(query)?;
        let (mut store, dialect) = self.parts();
        let (sql, args) = query.count_sql(&meta, dialect, field)?;
        let rows = store.query(&sql, &args)?;
        match rows.first().and_then(|r| r.get("row_count").or_else(|| r.first())) {
            Some(value) => u64::from_value(value.clone()),
            None => Ok(0),
        }
    }

    pub fn exists<T: Model>(&mut self, query: &Query) -> Result<bool> {
        let meta = self.metadata::<T>(query)?;
        let (mut store, dialect) = self.parts();
        let (sql, args) = query.exists_sql(&meta, dialect)?;
        let rows = store.query(&sql, &args)?;
        match rows.first().and_then(|r| r.get("row_exists").or_else(|| r.first())) {
            Some(value) if !value.is_null() => bool::from_value(value.clone()),
            _ => Ok(false),
        }
    }

    /// Runs a raw statement and returns the affected row count.
    pub fn exec(&mut self, query: &Query) -> Result<u64> {
        let raw = query.raw_sql().ok_or(KilnError::EmptyQuery)?;
        if raw.sql.trim().is_empty() {
            return Err(KilnError::EmptyQuery);
        }
        let (sql, args) = expand_placeholders(&raw.sql, &raw.args);
        let (mut store, dialect) = self.parts();
        store.execute(&dialect.translate_sql(&sql), &args)
    }

    /// Inserts `record`; a database-generated key is written back.
    pub fn create<T: Model>(&mut self, record: &mut T) -> Result<()> {
        let meta = describe::<T>(&self.context)?;
        let (mut store, dialect) = self.parts();
        dialect.create(&mut store, &meta, record)
    }

    pub fn update<T: Model>(&mut self, record: &mut T) -> Result<()> {
        let meta = describe::<T>(&self.context)?;
        let (mut store, dialect) = self.parts();
        dialect.update(&mut store, &meta, record)
    }

    pub fn destroy<T: Model>(&mut self, record: &T) -> Result<()> {
        let meta = describe::<T>(&self.context)?;
        let (mut store, dialect) = self.parts();
        dialect.destroy(&mut store, &meta, record)
    }

    /// Deletes every `T` row the query matches.
    pub fn delete<T: Model>(&mut self, query: &Query) -> Result<u64> {
        let meta = self.metadata::<T>(query)?;
        let (mut store, dialect) = self.parts();
        dialect.delete(&mut store, &meta, query)
    }

    /// Sets `values` on every `T` row the query matches.
    pub fn update_columns<T: Model>(&mut self, query: &Query, values: &[(&str, Value)]) -> Result<u64> {
        let meta = self.metadata::<T>(query)?;
        let (mut store, dialect) = self.parts();
        dialect.update_query(&mut store, &meta, query, values)
    }

    /// Loads associations onto an already fetched record.
    ///
    /// No paths loads every association one level deep.
    pub fn load<T: Model>(&mut self, record: &mut T, paths: &[&str]) -> Result<()> {
        self.load_all(std::slice::from_mut(record), paths)
    }

    /// Batched [`Connection::load`] over several records.
    pub fn load_all<T: Model>(&mut self, records: &mut [T], paths: &[&str]) -> Result<()> {
        let request = Query::new().eager_preload(paths);
        let planned = self.plan_eager::<T>(request.eager_request())?;
        self.load_planned(records, planned)
    }

    /// Validates requested paths up front, so bad paths fail before any query.
    fn plan_eager<T: Model>(&self, request: Option<&EagerRequest>) -> Result<Option<(Vec<PathNode>, EagerMode)>> {
        let Some(request) = request else {
            return Ok(None);
        };
        let forest = plan(T::model_def(), request.paths.as_slice())?;
        if forest.is_empty() {
            return Ok(None);
        }
        Ok(Some((forest, request.mode.unwrap_or(self.config.eager_mode))))
    }

    fn load_planned<T: Model>(
        &mut self,
        records: &mut [T],
        planned: Option<(Vec<PathNode>, EagerMode)>,
    ) -> Result<()> {
        let Some((forest, mode)) = planned else {
            return Ok(());
        };
        if records.is_empty() {
            return Ok(());
        }

        let context = self.context.clone();
        let (mut store, dialect) = self.parts();
        let mut preloader = Preloader::new(&mut store, dialect, &context);
        match mode {
            EagerMode::Preload => {
                let mut roots: Vec<&mut dyn Record> =
                    records.iter_mut().map(|r| r as &mut dyn Record).collect();
                preloader.run(T::model_def(), &mut roots, &forest)
            }
            EagerMode::Eager => {
                for record in records.iter_mut() {
                    preloader.run(T::model_def(), &mut [record as &mut dyn Record], &forest)?;
                }
                Ok(())
            }
        }
    }

    pub fn truncate_all(&mut self) -> Result<()> {
        let (mut store, dialect) = self.parts();
        dialect.truncate_all(&mut store)
    }

    pub fn dump_schema(&mut self) -> Result<String> {
        let (mut store, dialect) = self.parts();
        dialect.dump_schema(&mut store)
    }

    pub fn load_schema(&mut self, schema: &str) -> Result<()> {
        let (mut store, dialect) = self.parts();
        dialect.load_schema(&mut store, schema)
    }
}
