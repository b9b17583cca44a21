//! Core domain logic for the Bookshelf catalogue.
//!
//! Keeps the authoritative book store and the full-text search index in
//! agreement, and routes reads to whichever store can answer them.

pub mod config;
pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use context::{DeadlineExceeded, RequestContext};
pub use db::SharedConnection;
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::book::{Book, BookId, BookValidationError};
pub use repo::book_repo::{BookRepository, SqliteBookRepository, StoreError, StoreResult};
pub use search::index::{IndexError, IndexResult, SearchIndex, SqliteSearchIndex};
pub use search::query::{MatchQuery, SearchField, MATCH_PAGE_SIZE};
pub use search::schema::{FieldKind, IndexField, IndexSchema, SchemaError};
pub use service::book_sync::{
    BookSyncService, CreateOutcome, ErrorKind, ReconcileReport, SyncError, SyncResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
