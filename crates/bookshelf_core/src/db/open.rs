//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory connections for the primary store and the index.
//! - Configure connection pragmas required by core behavior.
//! - Trigger primary-store migrations before returning a usable connection.
//!
//! # Invariants
//! - Primary connections have migrations fully applied.
//! - Index connections carry no migrations; index tables are owned by
//!   `SearchIndex::ensure_index`.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
enum Store {
    Primary,
    Index,
}

impl Store {
    fn event(self) -> &'static str {
        match self {
            Self::Primary => "db_open",
            Self::Index => "index_db_open",
        }
    }
}

/// Opens the primary store database file and applies all pending migrations.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_logged(Store::Primary, "file", || Connection::open(path))
}

/// Opens an in-memory primary store and applies all pending migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_logged(Store::Primary, "memory", Connection::open_in_memory)
}

/// Opens the search index database file.
///
/// # Side effects
/// - Emits `index_db_open` logging events with duration and status.
pub fn open_index_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_logged(Store::Index, "file", || Connection::open(path))
}

/// Opens an in-memory search index database.
pub fn open_index_db_in_memory() -> DbResult<Connection> {
    open_logged(Store::Index, "memory", Connection::open_in_memory)
}

fn open_logged(
    store: Store,
    mode: &str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    let event = store.event();
    info!("event={event} module=db status=start mode={mode}");

    let mut conn = match connect() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event={event} module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, store) {
        Ok(()) => {
            info!(
                "event={event} module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event={event} module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, store: Store) -> DbResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    match store {
        Store::Primary => apply_migrations(conn),
        Store::Index => Ok(()),
    }
}
