#![cfg(feature = "rusqlite")]

mod common;

use common::{
    Address, Book, Label, Song, Tag, Taxi, User, Writer, book, seed_library, setup_db, user, writer,
};
use kiln::error::KilnError;
use kiln::prelude::*;

fn titles(user: &User) -> Vec<&str> {
    user.books.iter().map(|b| b.title.as_str()).collect()
}

#[test]
fn nested_paths_issue_one_query_per_edge() {
    let (mut conn, log) = setup_db();
    seed_library(&mut conn);
    log.clear();

    let users: Vec<User> = conn
        .all(&conn.eager_preload(&["Books.Writers"]).order("users.id"))
        .unwrap();
    assert_eq!(log.count(), 3, "{:#?}", log.statements());

    assert_eq!(users.len(), 3);
    assert_eq!(titles(&users[0]), ["Mark a", "Mark b"]);
    assert_eq!(titles(&users[2]), ["Jane a", "Jane b"]);
    for user in &users {
        for book in &user.books {
            assert_eq!(book.user_id, Some(user.id));
            let names: Vec<&str> = book.writers.iter().map(|w| w.name.as_str()).collect();
            assert_eq!(names, [format!("{} first", book.title), format!("{} second", book.title)]);
        }
    }
}

#[test]
fn nested_children_stay_with_their_parent() {
    let (mut conn, log) = setup_db();
    let mark = user(&mut conn, "Mark");
    let first = book(&mut conn, &mark, "A");
    book(&mut conn, &mark, "B");
    writer(&mut conn, &first, "Ann");
    log.clear();

    let users: Vec<User> = conn.all(&conn.eager_preload(&["Books.Writers"])).unwrap();
    assert_eq!(log.count(), 3, "{:#?}", log.statements());
    assert_eq!(users.len(), 1);
    assert_eq!(titles(&users[0]), ["A", "B"]);
    let a = &users[0].books[0];
    let b = &users[0].books[1];
    assert_eq!(a.writers.len(), 1);
    assert_eq!(a.writers[0].name, "Ann");
    assert!(b.writers.is_empty());
}

#[test]
fn zero_padded_text_keys_group_separately() {
    let (mut conn, log) = setup_db();
    for id in ["01", "001"] {
        let mut label = Label {
            id: id.to_owned(),
            name: format!("label {id}"),
            ..Label::default()
        };
        conn.create(&mut label).unwrap();
    }
    let mut tag = Tag {
        name: "only-001".to_owned(),
        label_id: "001".to_owned(),
        ..Tag::default()
    };
    conn.create(&mut tag).unwrap();
    log.clear();

    let labels: Vec<Label> = conn
        .all(&conn.eager_preload(&["tags"]).order("labels.id"))
        .unwrap();
    assert_eq!(log.count(), 2);
    assert_eq!(labels.len(), 2);
    for label in &labels {
        let names: Vec<&str> = label.tags.iter().map(|t| t.name.as_str()).collect();
        match label.id.as_str() {
            "001" => assert_eq!(names, ["only-001"]),
            "01" => assert!(names.is_empty(), "label 01 got {names:?}"),
            other => panic!("unexpected label {other}"),
        }
    }

    let found: Label = conn.find("01").unwrap();
    assert_eq!(found.name, "label 01");
}

#[test]
fn eager_and_preload_build_the_same_graph() {
    let (mut conn, log) = setup_db();
    seed_library(&mut conn);

    log.clear();
    let eager: Vec<User> = conn
        .all(&conn.eager(&["books.writers"]).order("users.id"))
        .unwrap();
    let eager_queries = log.count();

    log.clear();
    let preloaded: Vec<User> = conn
        .all(&conn.eager_preload(&["books.writers"]).order("users.id"))
        .unwrap();
    let preload_queries = log.count();

    assert_eq!(eager, preloaded);
    assert_eq!(eager_queries, 1 + 3 * 2);
    assert_eq!(preload_queries, 3);
}

#[test]
fn connection_default_mode_applies_to_eager() {
    let (conn, log) = setup_db();
    let mut conn = conn.with_config(Config {
        eager_mode: EagerMode::Preload,
        ..Config::default()
    });
    seed_library(&mut conn);
    log.clear();

    let users: Vec<User> = conn.all(&conn.eager(&["books"])).unwrap();
    assert_eq!(log.count(), 2);
    assert!(users.iter().all(|u| u.books.len() == 2));
}

#[test]
fn duplicate_paths_are_merged() {
    let (mut conn, log) = setup_db();
    seed_library(&mut conn);
    log.clear();

    let users: Vec<User> = conn
        .all(&conn.eager_preload(&["books", "Books", "books.writers", " "]))
        .unwrap();
    assert_eq!(log.count(), 3);
    assert!(users.iter().all(|u| u.books.iter().all(|b| b.writers.len() == 2)));
}

#[test]
fn belongs_to_leaves_missing_targets_empty() {
    let (mut conn, log) = setup_db();
    let mut home = Address {
        street: "Main".to_owned(),
        house_number: 7,
        ..Address::default()
    };
    conn.create(&mut home).unwrap();

    let mut mark = user(&mut conn, "Mark");
    mark.house_id = Some(home.id);
    conn.update(&mut mark).unwrap();
    user(&mut conn, "Nobody");
    log.clear();

    let users: Vec<User> = conn
        .all(&conn.eager_preload(&["house"]).order("users.id"))
        .unwrap();
    assert_eq!(log.count(), 2);
    assert_eq!(users[0].house.as_ref(), Some(&home));
    assert_eq!(users[1].house, None);
}

#[test]
fn null_foreign_keys_skip_the_query() {
    let (mut conn, log) = setup_db();
    user(&mut conn, "a");
    user(&mut conn, "b");
    log.clear();

    let users: Vec<User> = conn.all(&conn.eager_preload(&["house"])).unwrap();
    assert_eq!(log.count(), 1);
    assert!(users.iter().all(|u| u.house.is_none()));
}

#[test]
fn empty_results_load_nothing() {
    let (mut conn, log) = setup_db();
    let users: Vec<User> = conn.all(&conn.eager_preload(&["books.writers"])).unwrap();
    assert!(users.is_empty());
    assert_eq!(log.count(), 1);
}

#[test]
fn has_one_and_boxed_belongs_to() {
    let (mut conn, _) = setup_db();
    let mark = user(&mut conn, "Mark");
    let joe = user(&mut conn, "Joe");
    let mut taxi = Taxi {
        model: "Ford".to_owned(),
        driver_id: Some(mark.id),
        ..Taxi::default()
    };
    conn.create(&mut taxi).unwrap();

    let users: Vec<User> = conn
        .all(&conn.eager_preload(&["taxi.driver"]).order("users.id"))
        .unwrap();
    let loaded = users[0].taxi.as_ref().unwrap();
    assert_eq!(loaded.model, "Ford");
    let driver = loaded.driver.as_deref().unwrap();
    assert_eq!(driver.name, "Mark");
    assert!(driver.taxi.is_none());
    assert_eq!(users[1].id, joe.id);
    assert!(users[1].taxi.is_none());
}

#[test]
fn many_to_many_through_join_table() {
    let (mut conn, log) = setup_db();
    let mark = user(&mut conn, "Mark");
    let joe = user(&mut conn, "Joe");
    user(&mut conn, "Jane");

    let mut songs = Vec::new();
    for title in ["one", "two", "three"] {
        let mut song = Song {
            title: title.to_owned(),
            ..Song::default()
        };
        conn.create(&mut song).unwrap();
        songs.push(song);
    }
    for (owner, song) in [(&mark, &songs[0]), (&mark, &songs[1]), (&joe, &songs[1])] {
        conn.exec(&conn.raw_query(
            "INSERT INTO users_songs (user_id, song_id) VALUES (?, ?)",
            args![owner.id, song.id],
        ))
        .unwrap();
    }
    log.clear();

    let mut users: Vec<User> = conn.all(&conn.eager_preload(&["songs"]).order("users.id")).unwrap();
    assert_eq!(log.count(), 2);
    assert!(log.statements()[1].contains("JOIN users_songs"), "{}", log.statements()[1]);

    users[0].songs.sort_by_key(|s| s.id);
    assert_eq!(users[0].songs, [songs[0].clone(), songs[1].clone()]);
    assert_eq!(users[1].songs, [songs[1].clone()]);
    assert!(users[2].songs.is_empty());
}

#[test]
fn reverse_belongs_to_paths() {
    let (mut conn, log) = setup_db();
    seed_library(&mut conn);
    log.clear();

    let writers: Vec<Writer> = conn
        .all(&conn.eager_preload(&["book.user"]).order("writers.id"))
        .unwrap();
    assert_eq!(log.count(), 3);
    assert_eq!(writers.len(), 12);
    for writer in &writers {
        let book = writer.book.as_deref().unwrap();
        assert_eq!(Some(book.id), writer.book_id);
        let owner = book.user.as_deref().unwrap();
        assert!(book.title.starts_with(&owner.name));
    }
}

#[test]
fn load_fills_existing_records() {
    let (mut conn, log) = setup_db();
    seed_library(&mut conn);

    let mut users: Vec<User> = conn.all(&Query::new().order("users.id")).unwrap();
    assert!(users.iter().all(|u| u.books.is_empty()));
    log.clear();

    conn.load_all(&mut users, &["books"]).unwrap();
    assert_eq!(log.count(), 1);
    assert!(users.iter().all(|u| u.books.len() == 2));

    let mut mark: User = conn.find(1).unwrap();
    log.clear();
    conn.load(&mut mark, &[]).unwrap();
    // house is skipped: no house_id
    assert_eq!(log.count(), 3);
    assert_eq!(titles(&mark), ["Mark a", "Mark b"]);
    assert!(mark.books[0].writers.is_empty());
}

#[test]
fn malformed_paths_are_rejected() {
    let (mut conn, _) = setup_db();
    let mut mark = user(&mut conn, "Mark");
    for bad in ["Books.", "Books.*", ".*", ".", "books..writers"] {
        let err = conn.load(&mut mark, &[bad]).unwrap_err();
        assert!(matches!(err, KilnError::MalformedPath { .. }), "{bad}: {err}");
    }
}

#[test]
fn bad_paths_fail_before_querying() {
    let (mut conn, log) = setup_db();
    seed_library(&mut conn);
    log.clear();

    let err = conn
        .all::<User>(&conn.eager_preload(&["books.FieldNotFound"]))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "could not retrieve associations: field FieldNotFound does not exist in model Book"
    );
    assert_eq!(log.count(), 0);

    let err = conn.all::<User>(&conn.eager(&["Books.*"])).unwrap_err();
    assert!(matches!(err, KilnError::MalformedPath { .. }));
    assert_eq!(log.count(), 0);
}

#[test]
fn failed_edges_keep_earlier_assignments() {
    let (mut conn, _) = setup_db();
    seed_library(&mut conn);
    conn.exec(&conn.raw_query("DROP TABLE users_songs", args![]))
        .unwrap();

    let mut mark: User = conn.find(1).unwrap();
    let err = conn.load(&mut mark, &["books", "songs"]).unwrap_err();
    assert!(err.to_string().contains("no such table"), "{err}");
    assert_eq!(mark.books.len(), 2);
}

#[test]
fn preloaded_owners_keep_their_own_columns() {
    let (mut conn, _) = setup_db();
    seed_library(&mut conn);

    let books: Vec<Book> = conn
        .all(&conn.eager_preload(&["user"]).order("books.id"))
        .unwrap();
    assert_eq!(books.len(), 6);
    for book in &books {
        let owner = book.user.as_deref().unwrap();
        assert_eq!(Some(owner.id), book.user_id);
        assert!(owner.books.is_empty());
    }
}
