//! SQLite storage bootstrap, shared handles and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure the primary store and search index connections.
//! - Apply primary-store schema migrations in deterministic order.
//! - Bind request contexts to in-flight SQLite statements.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write books before migrations succeed.
//! - A connection never keeps a request watcher installed after the call
//!   that installed it returns.

use crate::context::RequestContext;
use rusqlite::{Connection, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::os::raw::c_int;
use std::sync::{Arc, Mutex, MutexGuard};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_index_db, open_index_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Number of SQLite VM instructions between request watcher polls.
const WATCHER_POLL_OPS: c_int = 1_000;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// A previous holder panicked while the connection was locked.
    ConnectionPoisoned,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::ConnectionPoisoned => write!(f, "shared connection lock is poisoned"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::ConnectionPoisoned => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Long-lived connection handle shared by every request.
///
/// SQLite connections are not `Sync`; callers serialize access through the
/// inner lock. Cloning is cheap and yields the same underlying connection.
#[derive(Clone)]
pub struct SharedConnection {
    inner: Arc<Mutex<Connection>>,
}

impl SharedConnection {
    pub fn new(conn: Connection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    /// Locks the connection for exclusive use by the current caller.
    pub fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.inner.lock().map_err(|_| DbError::ConnectionPoisoned)
    }
}

impl From<Connection> for SharedConnection {
    fn from(value: Connection) -> Self {
        Self::new(value)
    }
}

/// Runs `op` with `ctx` watching the connection.
///
/// When the context fires while a statement is executing, SQLite aborts that
/// statement with `SQLITE_INTERRUPT` and rolls back its implicit transaction.
pub(crate) fn run_guarded<T>(
    conn: &Connection,
    ctx: &RequestContext,
    op: impl FnOnce(&Connection) -> rusqlite::Result<T>,
) -> rusqlite::Result<T> {
    let watcher = ctx.clone();
    conn.progress_handler(WATCHER_POLL_OPS, Some(move || watcher.is_done()));
    let result = op(conn);
    conn.progress_handler(0, None::<fn() -> bool>);
    result
}

/// Returns whether `err` is SQLite aborting a statement on request.
pub(crate) fn is_interrupted(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::OperationInterrupted
    )
}

/// Returns the SQLite error message when one is attached.
pub(crate) fn failure_message(err: &rusqlite::Error) -> Option<&str> {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => Some(message.as_str()),
        _ => None,
    }
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn table_has_column(
    conn: &Connection,
    table: &str,
    column: &str,
) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::{is_interrupted, run_guarded};
    use crate::context::RequestContext;
    use rusqlite::Connection;

    const BULK_INSERT_SQL: &str = "WITH RECURSIVE seq(n) AS (
            SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 50000
        )
        INSERT INTO numbers (n) SELECT n FROM seq;";

    fn numbers_table() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE numbers (n INTEGER NOT NULL);")
            .unwrap();
        conn
    }

    fn row_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM numbers;", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn fired_context_interrupts_running_statement_and_rolls_it_back() {
        let conn = numbers_table();
        let ctx = RequestContext::background();
        ctx.cancel();

        let err = run_guarded(&conn, &ctx, |conn| conn.execute(BULK_INSERT_SQL, []))
            .unwrap_err();

        assert!(is_interrupted(&err), "got {err}");
        assert_eq!(row_count(&conn), 0);
    }

    #[test]
    fn watcher_is_removed_after_guarded_call() {
        let conn = numbers_table();
        let ctx = RequestContext::background();

        let inserted = run_guarded(&conn, &ctx, |conn| conn.execute(BULK_INSERT_SQL, [])).unwrap();
        assert_eq!(inserted, 50_000);

        ctx.cancel();
        conn.execute("DELETE FROM numbers;", []).unwrap();
        conn.execute(BULK_INSERT_SQL, []).unwrap();
        assert_eq!(row_count(&conn), 50_000);
    }
}
