//! Book synchronization service over the primary store and the search index.
//!
//! # Responsibility
//! - Order every create as primary commit first, index propagation second.
//! - Route identity lookups and listings to the primary store and free-text
//!   queries to the search index.
//! - Report index propagation failure as a qualified success.
//!
//! # Invariants
//! - The index never receives a book the primary store has not committed.
//! - A propagation failure never rolls back or hides the primary commit.
//! - The service holds no mutable state between calls.

use crate::context::RequestContext;
use crate::model::book::{Book, BookId};
use crate::repo::book_repo::{BookRepository, StoreError};
use crate::search::index::{IndexError, SearchIndex};
use crate::search::query::{MatchQuery, SearchField};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type SyncResult<T> = Result<T, SyncError>;

/// Closed error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidIdentifier,
    NotFound,
    StoreUnavailable,
    IndexUnavailable,
    WriteConflict,
    IndexRejected,
    DeadlineExceeded,
    /// Validation, corrupt data or misconfiguration.
    Invalid,
}

/// Hard failure of a synchronizer operation.
///
/// Adapter errors pass through unmodified; use [`SyncError::kind`] to branch.
#[derive(Debug)]
pub enum SyncError {
    Store(StoreError),
    Index(IndexError),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(err) => match err {
                StoreError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
                StoreError::NotFound(_) => ErrorKind::NotFound,
                StoreError::Unavailable(_) => ErrorKind::StoreUnavailable,
                StoreError::WriteConflict(_) => ErrorKind::WriteConflict,
                StoreError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
                StoreError::Validation(_)
                | StoreError::InvalidData(_)
                | StoreError::UninitializedConnection { .. }
                | StoreError::MissingRequiredTable(_)
                | StoreError::MissingRequiredColumn { .. } => ErrorKind::Invalid,
            },
            Self::Index(err) => index_error_kind(err),
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Index(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Index(err) => Some(err),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<IndexError> for SyncError {
    fn from(value: IndexError) -> Self {
        Self::Index(value)
    }
}

fn index_error_kind(err: &IndexError) -> ErrorKind {
    match err {
        IndexError::Unavailable(_) => ErrorKind::IndexUnavailable,
        IndexError::Rejected(_) => ErrorKind::IndexRejected,
        IndexError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
        IndexError::Schema(_) | IndexError::InvalidData(_) => ErrorKind::Invalid,
    }
}

/// Result of a create whose primary commit succeeded.
#[derive(Debug)]
pub enum CreateOutcome {
    /// Committed and mirrored into the search index.
    Indexed(Book),
    /// Committed, but the index copy is missing or stale.
    IndexPropagationFailed { book: Book, cause: IndexError },
}

impl CreateOutcome {
    pub fn book(&self) -> &Book {
        match self {
            Self::Indexed(book) => book,
            Self::IndexPropagationFailed { book, .. } => book,
        }
    }

    pub fn into_book(self) -> Book {
        match self {
            Self::Indexed(book) => book,
            Self::IndexPropagationFailed { book, .. } => book,
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Indexed(_))
    }

    /// Why propagation failed; `None` when the book is indexed.
    pub fn propagation_error(&self) -> Option<&IndexError> {
        match self {
            Self::Indexed(_) => None,
            Self::IndexPropagationFailed { cause, .. } => Some(cause),
        }
    }

    /// Identity assigned by the primary store.
    pub fn id(&self) -> Option<BookId> {
        self.book().id
    }
}

/// Summary of one reconciliation sweep.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Books with an outcome: `already_indexed + repaired + failed.len()`.
    pub scanned: usize,
    pub already_indexed: usize,
    pub repaired: usize,
    pub failed: Vec<(BookId, IndexError)>,
    /// The request context fired before every book was checked.
    pub interrupted: bool,
}

/// Synchronizer over an authoritative repository and a search index.
pub struct BookSyncService<R: BookRepository, I: SearchIndex> {
    repo: R,
    index: I,
}

impl<R: BookRepository, I: SearchIndex> BookSyncService<R, I> {
    /// Creates a synchronizer from long-lived, shared store handles.
    pub fn new(repo: R, index: I) -> Self {
        Self { repo, index }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Commits `book` to the primary store, then propagates it to the index.
    ///
    /// # Contract
    /// - Primary failure aborts with `SyncError` and nothing is written.
    /// - Index failure (including the context firing after the commit)
    ///   yields `CreateOutcome::IndexPropagationFailed` carrying the committed
    ///   book.
    pub fn create_book(&self, ctx: &RequestContext, mut book: Book) -> SyncResult<CreateOutcome> {
        let started_at = Instant::now();

        let id = match self.repo.create_book(ctx, &mut book) {
            Ok(id) => id,
            Err(err) => {
                error!(
                    "event=book_create module=sync status=error stage=primary duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        match self.index.upsert(ctx, id, &book) {
            Ok(()) => {
                info!(
                    "event=book_create module=sync status=ok book_id={id} index_state=indexed duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(CreateOutcome::Indexed(book))
            }
            Err(cause) => {
                warn!(
                    "event=index_propagate module=sync status=error book_id={id} index_state=pending duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    cause
                );
                Ok(CreateOutcome::IndexPropagationFailed { book, cause })
            }
        }
    }

    /// Looks up one book in the primary store; the index is never consulted.
    pub fn get_book(&self, ctx: &RequestContext, id: &str) -> SyncResult<Book> {
        Ok(self.repo.get_book(ctx, id)?)
    }

    pub fn list_books(&self, ctx: &RequestContext) -> SyncResult<Vec<Book>> {
        Ok(self.repo.list_books(ctx)?)
    }

    /// Searches by free text on `selector`.
    ///
    /// Selectors other than `title` and `author`, including the empty string,
    /// fall back to [`Self::list_books`].
    pub fn search_books(
        &self,
        ctx: &RequestContext,
        selector: &str,
        text: &str,
    ) -> SyncResult<Vec<Book>> {
        let Some(field) = SearchField::parse(selector) else {
            debug!("event=book_search module=sync status=fallback route=primary");
            return self.list_books(ctx);
        };

        let started_at = Instant::now();
        let hits = self.index.match_query(ctx, &MatchQuery::new(field, text))?;
        debug!(
            "event=book_search module=sync status=ok route=index field={} hits={} duration_ms={}",
            field.as_str(),
            hits.len(),
            started_at.elapsed().as_millis()
        );
        Ok(hits)
    }

    /// Re-propagates every committed book missing from the index.
    ///
    /// Per-book index failures are collected and do not stop the sweep; a
    /// fired context stops it and sets `interrupted`.
    pub fn reconcile_index(&self, ctx: &RequestContext) -> SyncResult<ReconcileReport> {
        let started_at = Instant::now();
        let books = self.repo.list_books(ctx)?;
        let mut report = ReconcileReport::default();

        for book in books {
            if ctx.is_done() {
                report.interrupted = true;
                break;
            }
            let Some(id) = book.id else {
                continue;
            };

            let repaired = self
                .index
                .contains(ctx, id)
                .and_then(|present| {
                    if present {
                        return Ok(false);
                    }
                    self.index.upsert(ctx, id, &book).map(|()| true)
                });
            match repaired {
                Ok(true) => report.repaired += 1,
                Ok(false) => report.already_indexed += 1,
                Err(IndexError::DeadlineExceeded) => {
                    report.interrupted = true;
                    break;
                }
                Err(err) => report.failed.push((id, err)),
            }
            report.scanned += 1;
        }

        let status = if report.failed.is_empty() && !report.interrupted {
            "ok"
        } else {
            "partial"
        };
        info!(
            "event=index_reconcile module=sync status={status} scanned={} repaired={} failed={} interrupted={} duration_ms={}",
            report.scanned,
            report.repaired,
            report.failed.len(),
            report.interrupted,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }
}
