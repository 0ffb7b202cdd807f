#![cfg(feature = "rusqlite")]
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use kiln::core::store::{Row, Store};
use kiln::prelude::*;
use kiln::sqlite::{SqliteDialect, SqliteStore};

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub house_id: Option<i64>,
    #[belongs_to]
    pub house: Option<Address>,
    #[has_many(order_by = "books.title asc")]
    pub books: Vec<Book>,
    #[has_one(foreign_key = "driver_id")]
    pub taxi: Option<Taxi>,
    #[many_to_many(through = "users_songs")]
    pub songs: Vec<Song>,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub isbn: String,
    pub user_id: Option<i64>,
    #[belongs_to]
    pub user: Option<Box<User>>,
    #[has_many(order_by = "writers.name asc")]
    pub writers: Vec<Writer>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Writer {
    pub id: i64,
    pub name: String,
    pub book_id: Option<i64>,
    #[belongs_to]
    pub book: Option<Box<Book>>,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Address {
    pub id: i64,
    pub street: String,
    pub house_number: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Song {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Taxi {
    pub id: i64,
    pub model: String,
    pub driver_id: Option<i64>,
    #[belongs_to(foreign_key = "driver_id")]
    pub driver: Option<Box<User>>,
}

/// Text-keyed model; keys are compared verbatim.
#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[has_many(order_by = "tags.name asc")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub label_id: String,
}

/// Per-tenant table, `<tenant>_ledgers`.
#[derive(Debug, Clone, Default, PartialEq, Model)]
#[model(table_fn = tenant_table)]
pub struct Ledger {
    pub id: i64,
    pub amount: i64,
}

pub fn tenant_table(ctx: &Context) -> kiln::Result<String> {
    let tenant = String::from_value(ctx.require("tenant")?.clone())?;
    Ok(format!("{tenant}_ledgers"))
}

pub const SCHEMA: &str = "
CREATE TABLE addresses (id INTEGER PRIMARY KEY AUTOINCREMENT, street TEXT NOT NULL DEFAULT '', house_number INTEGER NOT NULL DEFAULT 0);
CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL DEFAULT '', house_id INTEGER);
CREATE TABLE books (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL DEFAULT '', isbn TEXT NOT NULL DEFAULT '', user_id INTEGER, created_at TEXT, updated_at TEXT);
CREATE TABLE writers (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL DEFAULT '', book_id INTEGER);
CREATE TABLE songs (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL DEFAULT '');
CREATE TABLE users_songs (id INTEGER PRIMARY KEY AUTOINCREMENT, user_id INTEGER NOT NULL, song_id INTEGER NOT NULL);
CREATE TABLE taxis (id INTEGER PRIMARY KEY AUTOINCREMENT, model TEXT NOT NULL DEFAULT '', driver_id INTEGER);
CREATE TABLE labels (id TEXT PRIMARY KEY, name TEXT NOT NULL DEFAULT '');
CREATE TABLE tags (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL DEFAULT '', label_id TEXT NOT NULL DEFAULT '');
CREATE TABLE acme_ledgers (id INTEGER PRIMARY KEY AUTOINCREMENT, amount INTEGER NOT NULL DEFAULT 0);
";

/// SELECT statements seen by the store, in order.
#[derive(Debug, Clone, Default)]
pub struct QueryLog(Arc<Mutex<Vec<String>>>);

impl QueryLog {
    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn statements(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// [`SqliteStore`] that records every query it runs.
pub struct CountingStore {
    inner: SqliteStore,
    log: QueryLog,
}

impl Store for CountingStore {
    fn query(&mut self, sql: &str, args: &[Value]) -> kiln::Result<Vec<Row>> {
        self.log.0.lock().unwrap().push(sql.to_owned());
        self.inner.query(sql, args)
    }

    fn execute(&mut self, sql: &str, args: &[Value]) -> kiln::Result<u64> {
        self.inner.execute(sql, args)
    }

    fn last_insert_id(&mut self) -> kiln::Result<Value> {
        self.inner.last_insert_id()
    }

    fn execute_batch(&mut self, sql: &str) -> kiln::Result<()> {
        self.inner.execute_batch(sql)
    }
}

pub fn setup_db() -> (Connection, QueryLog) {
    let mut store = SqliteStore::open_in_memory().expect("Failed to create in-memory database");
    store.execute_batch(SCHEMA).expect("Failed to create tables");
    let log = QueryLog::default();
    let conn = Connection::new(
        CountingStore {
            inner: store,
            log: log.clone(),
        },
        Arc::new(SqliteDialect::memory()),
    );
    (conn, log)
}

pub fn user(conn: &mut Connection, name: &str) -> User {
    let mut user = User {
        name: name.to_owned(),
        ..User::default()
    };
    conn.create(&mut user).expect("create user");
    user
}

pub fn book(conn: &mut Connection, owner: &User, title: &str) -> Book {
    let mut book = Book {
        title: title.to_owned(),
        isbn: format!("isbn-{title}"),
        user_id: Some(owner.id),
        ..Book::default()
    };
    conn.create(&mut book).expect("create book");
    book
}

pub fn writer(conn: &mut Connection, book: &Book, name: &str) -> Writer {
    let mut writer = Writer {
        name: name.to_owned(),
        book_id: Some(book.id),
        ..Writer::default()
    };
    conn.create(&mut writer).expect("create writer");
    writer
}

/// Three users with two books each, each book with two writers.
pub fn seed_library(conn: &mut Connection) -> Vec<User> {
    let mut users = Vec::new();
    for name in ["Mark", "Joe", "Jane"] {
        let owner = user(conn, name);
        for n in ["b", "a"] {
            let book = book(conn, &owner, &format!("{name} {n}"));
            writer(conn, &book, &format!("{name} {n} second"));
            writer(conn, &book, &format!("{name} {n} first"));
        }
        users.push(owner);
    }
    users
}
