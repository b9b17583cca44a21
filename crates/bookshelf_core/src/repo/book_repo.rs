//! Book repository contract and SQLite implementation (primary store).
//!
//! # Responsibility
//! - Provide identity-addressed, durable storage of books.
//! - Assign identity and creation timestamps on create.
//! - Keep SQL details inside the primary store boundary.
//!
//! # Invariants
//! - Write paths call `Book::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Failures are surfaced to the caller and never retried here.
//! - The caller's book is only mutated after the insert committed.

use crate::context::RequestContext;
use crate::db::migrations::latest_version;
use crate::db::{
    failure_message, is_interrupted, run_guarded, table_exists, table_has_column, DbError,
    SharedConnection,
};
use crate::model::book::{now_epoch_ms, Book, BookId, BookValidationError};
use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const BOOKS_TABLE: &str = "books";

const BOOK_COLUMNS: [&str; 11] = [
    "uuid",
    "title",
    "author",
    "isbn",
    "description",
    "publisher",
    "publish_date",
    "pages",
    "language",
    "created_at",
    "updated_at",
];

const BOOK_SELECT_SQL: &str = "SELECT
    uuid,
    title,
    author,
    isbn,
    description,
    publisher,
    publish_date,
    pages,
    language,
    created_at,
    updated_at
FROM books";

pub type StoreResult<T> = Result<T, StoreError>;

/// Primary store error taxonomy.
#[derive(Debug)]
pub enum StoreError {
    /// Lookup identity is not a well-formed book id.
    InvalidIdentifier(String),
    NotFound(BookId),
    /// Transport or backend failure; nothing is known to be written.
    Unavailable(DbError),
    /// Backend refused the write, e.g. the identity is already taken.
    WriteConflict(String),
    Validation(BookValidationError),
    InvalidData(String),
    /// The request context fired; the statement in flight was rolled back.
    DeadlineExceeded,
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(raw) => write!(f, "invalid book id `{raw}`"),
            Self::NotFound(id) => write!(f, "book not found: {id}"),
            Self::Unavailable(err) => write!(f, "primary store unavailable: {err}"),
            Self::WriteConflict(message) => write!(f, "primary store write conflict: {message}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted book data: {message}"),
            Self::DeadlineExceeded => write!(f, "primary store call exceeded request deadline"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{table}.{column}` is missing")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BookValidationError> for StoreError {
    fn from(value: BookValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Unavailable(other),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        if is_interrupted(&value) {
            return Self::DeadlineExceeded;
        }
        if value.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
            let message = failure_message(&value)
                .unwrap_or("constraint violation")
                .to_string();
            return Self::WriteConflict(message);
        }
        Self::Unavailable(DbError::Sqlite(value))
    }
}

/// Repository interface for the authoritative book store.
pub trait BookRepository {
    /// Persists `book`, assigning `id` and timestamps when absent.
    fn create_book(&self, ctx: &RequestContext, book: &mut Book) -> StoreResult<BookId>;
    /// Looks up one book by its textual identity.
    fn get_book(&self, ctx: &RequestContext, id: &str) -> StoreResult<Book>;
    /// Returns every book; order is stable within a single call.
    fn list_books(&self, ctx: &RequestContext) -> StoreResult<Vec<Book>>;
}

/// SQLite-backed book repository.
#[derive(Clone)]
pub struct SqliteBookRepository {
    conn: SharedConnection,
}

impl SqliteBookRepository {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: SharedConnection) -> StoreResult<Self> {
        {
            let guard = conn.lock()?;
            ensure_book_connection_ready(&guard)?;
        }
        Ok(Self { conn })
    }
}

impl BookRepository for SqliteBookRepository {
    fn create_book(&self, ctx: &RequestContext, book: &mut Book) -> StoreResult<BookId> {
        book.validate()?;

        let id = book.id.unwrap_or_else(Uuid::new_v4);
        let now = now_epoch_ms();
        let created_at = book.created_at.unwrap_or(now);
        let updated_at = book.updated_at.unwrap_or(now);

        let conn = self.conn.lock()?;
        ctx.check().map_err(|_| StoreError::DeadlineExceeded)?;
        run_guarded(&conn, ctx, |conn| {
            conn.execute(
                "INSERT INTO books (
                    uuid,
                    title,
                    author,
                    isbn,
                    description,
                    publisher,
                    publish_date,
                    pages,
                    language,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
                params![
                    id.to_string(),
                    book.title.as_str(),
                    book.author.as_str(),
                    book.isbn.as_str(),
                    book.description.as_str(),
                    book.publisher.as_str(),
                    book.publish_date,
                    book.pages,
                    book.language.as_str(),
                    created_at,
                    updated_at,
                ],
            )
        })?;

        book.id = Some(id);
        book.created_at = Some(created_at);
        book.updated_at = Some(updated_at);
        Ok(id)
    }

    fn get_book(&self, ctx: &RequestContext, id: &str) -> StoreResult<Book> {
        let book_id =
            Uuid::parse_str(id).map_err(|_| StoreError::InvalidIdentifier(id.to_string()))?;

        let conn = self.conn.lock()?;
        ctx.check().map_err(|_| StoreError::DeadlineExceeded)?;
        let found = run_guarded(&conn, ctx, |conn| {
            conn.query_row(
                &format!("{BOOK_SELECT_SQL} WHERE uuid = ?1;"),
                [book_id.to_string()],
                |row| Ok(parse_book_row(row)),
            )
            .optional()
        })?;

        match found {
            Some(book) => book,
            None => Err(StoreError::NotFound(book_id)),
        }
    }

    fn list_books(&self, ctx: &RequestContext) -> StoreResult<Vec<Book>> {
        let conn = self.conn.lock()?;
        ctx.check().map_err(|_| StoreError::DeadlineExceeded)?;
        let rows = run_guarded(&conn, ctx, |conn| {
            let mut stmt =
                conn.prepare(&format!("{BOOK_SELECT_SQL} ORDER BY created_at ASC, uuid ASC;"))?;
            let mapped = stmt.query_map([], |row| Ok(parse_book_row(row)))?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        rows.into_iter().collect()
    }
}

fn parse_book_row(row: &Row<'_>) -> StoreResult<Book> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid uuid value `{uuid_text}` in books.uuid"))
    })?;

    let pages = match row.get::<_, Option<i64>>("pages")? {
        Some(value) => Some(u32::try_from(value).map_err(|_| {
            StoreError::InvalidData(format!("invalid pages value `{value}` in books.pages"))
        })?),
        None => None,
    };

    let book = Book {
        id: Some(id),
        title: row.get("title")?,
        author: row.get("author")?,
        isbn: row.get("isbn")?,
        description: row.get("description")?,
        publisher: row.get("publisher")?,
        publish_date: row.get("publish_date")?,
        pages,
        language: row.get("language")?,
        created_at: Some(row.get("created_at")?),
        updated_at: Some(row.get("updated_at")?),
    };
    book.validate()?;
    Ok(book)
}

fn ensure_book_connection_ready(conn: &rusqlite::Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, BOOKS_TABLE)? {
        return Err(StoreError::MissingRequiredTable(BOOKS_TABLE));
    }

    for column in BOOK_COLUMNS {
        if !table_has_column(conn, BOOKS_TABLE, column)? {
            return Err(StoreError::MissingRequiredColumn {
                table: BOOKS_TABLE,
                column,
            });
        }
    }

    Ok(())
}
