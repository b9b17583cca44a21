use bookshelf_core::db::migrations::latest_version;
use bookshelf_core::db::open_db_in_memory;
use bookshelf_core::{
    Book, BookRepository, BookValidationError, RequestContext, SharedConnection,
    SqliteBookRepository, StoreError,
};
use rusqlite::Connection;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

fn repo() -> (SharedConnection, SqliteBookRepository) {
    let conn = SharedConnection::new(open_db_in_memory().unwrap());
    let repo = SqliteBookRepository::try_new(conn.clone()).unwrap();
    (conn, repo)
}

fn dune() -> Book {
    Book {
        isbn: "978-0441013593".to_string(),
        description: "Desert planet politics".to_string(),
        publisher: "Ace".to_string(),
        publish_date: Some(-141_004_800_000),
        pages: Some(896),
        language: "en".to_string(),
        ..Book::new("Dune", "Frank Herbert")
    }
}

#[test]
fn create_assigns_identity_and_timestamps() {
    let (_conn, repo) = repo();
    let ctx = RequestContext::background();

    let mut book = dune();
    let id = repo.create_book(&ctx, &mut book).unwrap();

    assert_eq!(book.id, Some(id));
    let created_at = book.created_at.expect("created_at should be set");
    assert_eq!(book.updated_at, Some(created_at));
}

#[test]
fn create_and_get_roundtrip_preserves_all_fields() {
    let (_conn, repo) = repo();
    let ctx = RequestContext::background();

    let mut book = dune();
    let id = repo.create_book(&ctx, &mut book).unwrap();

    let loaded = repo.get_book(&ctx, &id.to_string()).unwrap();
    assert_eq!(loaded, book);
    assert_eq!(loaded.pages, Some(896));
    assert_eq!(loaded.publish_date, Some(-141_004_800_000));
}

#[test]
fn create_keeps_caller_supplied_identity_and_timestamps() {
    let (_conn, repo) = repo();
    let ctx = RequestContext::background();

    let fixed = Uuid::parse_str("00000000-0000-4000-8000-000000000001").unwrap();
    let mut book = Book {
        id: Some(fixed),
        created_at: Some(1_000),
        updated_at: Some(2_000),
        ..dune()
    };
    let id = repo.create_book(&ctx, &mut book).unwrap();

    assert_eq!(id, fixed);
    let loaded = repo.get_book(&ctx, &fixed.to_string()).unwrap();
    assert_eq!(loaded.created_at, Some(1_000));
    assert_eq!(loaded.updated_at, Some(2_000));
}

#[test]
fn duplicate_identity_is_write_conflict() {
    let (_conn, repo) = repo();
    let ctx = RequestContext::background();

    let mut first = dune();
    let id = repo.create_book(&ctx, &mut first).unwrap();

    let mut second = Book {
        id: Some(id),
        ..Book::new("Dune Messiah", "Frank Herbert")
    };
    let err = repo.create_book(&ctx, &mut second).unwrap_err();
    assert!(matches!(err, StoreError::WriteConflict(_)), "got {err}");

    let kept = repo.get_book(&ctx, &id.to_string()).unwrap();
    assert_eq!(kept.title, "Dune");
}

#[test]
fn validation_failure_blocks_create_and_leaves_book_uncommitted() {
    let (_conn, repo) = repo();
    let ctx = RequestContext::background();

    let mut book = Book::new("Dune", "   ");
    let err = repo.create_book(&ctx, &mut book).unwrap_err();

    assert!(matches!(
        err,
        StoreError::Validation(BookValidationError::BlankAuthor)
    ));
    assert!(book.id.is_none());
    assert!(book.created_at.is_none());
    assert!(repo.list_books(&ctx).unwrap().is_empty());
}

#[test]
fn malformed_identity_is_invalid_identifier() {
    let (_conn, repo) = repo();
    let ctx = RequestContext::background();

    let err = repo.get_book(&ctx, "not-a-valid-id").unwrap_err();
    assert!(matches!(err, StoreError::InvalidIdentifier(raw) if raw == "not-a-valid-id"));
}

#[test]
fn absent_identity_is_not_found() {
    let (_conn, repo) = repo();
    let ctx = RequestContext::background();

    let missing = Uuid::new_v4();
    let err = repo.get_book(&ctx, &missing.to_string()).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == missing));
}

#[test]
fn list_returns_every_book_in_creation_order() {
    let (_conn, repo) = repo();
    let ctx = RequestContext::background();

    let mut ids = Vec::new();
    for (offset, title) in ["Dune", "Dune Messiah", "Children of Dune"]
        .into_iter()
        .enumerate()
    {
        let mut book = Book {
            created_at: Some(10_000 - offset as i64),
            ..Book::new(title, "Frank Herbert")
        };
        ids.push(repo.create_book(&ctx, &mut book).unwrap());
    }

    let listed = repo.list_books(&ctx).unwrap();
    let titles: Vec<_> = listed.iter().map(|book| book.title.as_str()).collect();
    assert_eq!(titles, vec!["Children of Dune", "Dune Messiah", "Dune"]);

    let listed_ids: HashSet<_> = listed.iter().filter_map(|book| book.id).collect();
    assert_eq!(listed_ids, ids.into_iter().collect());
}

#[test]
fn fired_context_aborts_create_without_commit() {
    let (_conn, repo) = repo();
    let ctx = RequestContext::background();
    ctx.cancel();

    let mut book = dune();
    let err = repo.create_book(&ctx, &mut book).unwrap_err();
    assert!(matches!(err, StoreError::DeadlineExceeded));
    assert!(book.id.is_none());

    let fresh = RequestContext::background();
    assert!(repo.list_books(&fresh).unwrap().is_empty());
}

#[test]
fn fired_context_aborts_reads() {
    let (_conn, repo) = repo();
    let ctx = RequestContext::background();
    ctx.cancel();

    assert!(matches!(
        repo.list_books(&ctx),
        Err(StoreError::DeadlineExceeded)
    ));
    assert!(matches!(
        repo.get_book(&ctx, &Uuid::new_v4().to_string()),
        Err(StoreError::DeadlineExceeded)
    ));
}

#[test]
fn deadline_firing_mid_listing_interrupts_the_scan() {
    let (conn, repo) = repo();
    conn.lock()
        .unwrap()
        .execute_batch(
            "WITH RECURSIVE seq(n) AS (
                SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 100000
            )
            INSERT INTO books (uuid, title, author, created_at, updated_at)
            SELECT printf('00000000-0000-4000-8000-%012d', n), 'Volume ' || n, 'Serial Author', n, n
            FROM seq;",
        )
        .unwrap();

    let ctx = RequestContext::with_timeout(Duration::from_millis(2));
    let err = repo.list_books(&ctx).unwrap_err();
    assert!(matches!(err, StoreError::DeadlineExceeded), "got {err}");

    let fresh = RequestContext::background();
    assert_eq!(repo.list_books(&fresh).unwrap().len(), 100_000);
}

#[test]
fn corrupt_persisted_row_is_reported_not_masked() {
    let (conn, repo) = repo();
    let ctx = RequestContext::background();

    let id = Uuid::new_v4();
    conn.lock()
        .unwrap()
        .execute(
            "INSERT INTO books (uuid, title, author, created_at, updated_at)
             VALUES (?1, '', 'Nobody', 1, 1);",
            [id.to_string()],
        )
        .unwrap();

    let err = repo.get_book(&ctx, &id.to_string()).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(repo.list_books(&ctx).is_err());
}

#[test]
fn repository_rejects_uninitialized_connection() {
    let conn = SharedConnection::new(Connection::open_in_memory().unwrap());

    match SqliteBookRepository::try_new(conn) {
        Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert!(expected_version > 0),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn repository_rejects_connection_without_books_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteBookRepository::try_new(SharedConnection::new(conn));
    assert!(matches!(
        result,
        Err(StoreError::MissingRequiredTable("books"))
    ));
}

#[test]
fn repository_rejects_connection_missing_books_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE books (
            uuid TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            author TEXT NOT NULL
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteBookRepository::try_new(SharedConnection::new(conn));
    assert!(matches!(
        result,
        Err(StoreError::MissingRequiredColumn {
            table: "books",
            column: "isbn"
        })
    ));
}
