//! Typed match queries.
//!
//! # Invariants
//! - Only fields named by [`SearchField`] can be queried.
//! - User text is always escaped into quoted FTS5 terms; raw FTS5 syntax is
//!   never passed through.
//! - Result pages never exceed [`MATCH_PAGE_SIZE`].

/// Upper bound on hits returned by one match query.
pub const MATCH_PAGE_SIZE: u32 = 100;

/// Closed set of free-text search dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchField {
    Title,
    Author,
}

impl SearchField {
    /// Parses a caller-facing selector; anything unknown yields `None`.
    pub fn parse(selector: &str) -> Option<Self> {
        match selector {
            "title" => Some(Self::Title),
            "author" => Some(Self::Author),
            _ => None,
        }
    }

    /// Index field this dimension queries.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Author => "author",
        }
    }
}

/// Relevance-ranked match of free text against one indexed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchQuery {
    pub field: SearchField,
    pub text: String,
    /// Clamped to [`MATCH_PAGE_SIZE`].
    pub limit: u32,
}

impl MatchQuery {
    pub fn new(field: SearchField, text: impl Into<String>) -> Self {
        Self {
            field,
            text: text.into(),
            limit: MATCH_PAGE_SIZE,
        }
    }

    pub fn effective_limit(&self) -> u32 {
        self.limit.min(MATCH_PAGE_SIZE)
    }

    /// Builds the FTS5 expression: any term matching in the target column.
    ///
    /// Returns `None` when the text contains no terms.
    pub(crate) fn match_expression(&self) -> Option<String> {
        let terms = self
            .text
            .split_whitespace()
            .map(escape_fts_term)
            .collect::<Vec<_>>();

        if terms.is_empty() {
            return None;
        }

        Some(format!("{} : ({})", self.field.as_str(), terms.join(" OR ")))
    }
}

fn escape_fts_term(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}
