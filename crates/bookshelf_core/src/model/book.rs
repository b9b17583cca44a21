//! Book domain model.
//!
//! # Responsibility
//! - Define the canonical record shared by the primary store and the search
//!   index.
//! - Validate required fields before any store accepts the record.
//!
//! # Invariants
//! - `id` is assigned once by the primary store and never changes afterwards.
//! - `title` and `author` are never blank for a persisted book.
//! - Timestamps are Unix epoch milliseconds.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable identifier shared by the primary store and the search index.
pub type BookId = Uuid;

/// Canonical book record.
///
/// A book without `id` is uncommitted: no store has seen it yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Assigned by the primary store on create when absent.
    pub id: Option<BookId>,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub description: String,
    pub publisher: String,
    /// Unix epoch milliseconds.
    pub publish_date: Option<i64>,
    pub pages: Option<u32>,
    pub language: String,
    /// Set at creation when absent.
    pub created_at: Option<i64>,
    /// Set at creation when absent.
    pub updated_at: Option<i64>,
}

/// Validation failures for [`Book::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookValidationError {
    BlankTitle,
    BlankAuthor,
}

impl Display for BookValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "book title must not be blank"),
            Self::BlankAuthor => write!(f, "book author must not be blank"),
        }
    }
}

impl Error for BookValidationError {}

impl Book {
    /// Creates an uncommitted book with the two required fields set.
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            ..Self::default()
        }
    }

    /// Checks the fields every persisted book must carry.
    ///
    /// # Errors
    /// - `BlankTitle` when `title` is empty or whitespace.
    /// - `BlankAuthor` when `author` is empty or whitespace.
    pub fn validate(&self) -> Result<(), BookValidationError> {
        if self.title.trim().is_empty() {
            return Err(BookValidationError::BlankTitle);
        }
        if self.author.trim().is_empty() {
            return Err(BookValidationError::BlankAuthor);
        }
        Ok(())
    }

    /// Returns whether the primary store has assigned an identity.
    pub fn is_committed(&self) -> bool {
        self.id.is_some()
    }
}

/// Current wall clock time in epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
