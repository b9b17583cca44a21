//! Declared field schema of a search index.
//!
//! # Invariants
//! - Index and field names are lowercase SQL-safe identifiers; they are
//!   interpolated into DDL/DML and must never come from request input.
//! - `doc_id` and `source` are reserved for the document key and payload.
//! - FTS5 hidden column names (`rank`, `rowid`) are never used as index or
//!   field names, and no field shares the index name.

use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,47}$").expect("valid identifier regex"));

/// Column reserved for the shared primary/index identity.
pub(crate) const DOC_ID_COLUMN: &str = "doc_id";
/// Column reserved for the serialized document payload.
pub(crate) const SOURCE_COLUMN: &str = "source";

/// Hidden columns every FTS5 table exposes.
const FTS5_HIDDEN_COLUMNS: [&str; 2] = ["rank", "rowid"];

/// How the index treats one document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Tokenized and searchable with match queries.
    Text,
    /// Stored verbatim, not tokenized.
    Keyword,
    /// Epoch milliseconds.
    Date,
    Integer,
}

impl FieldKind {
    pub fn is_searchable(self) -> bool {
        matches!(self, Self::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexField {
    pub name: String,
    pub kind: FieldKind,
}

/// Index name plus its ordered field declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    name: String,
    fields: Vec<IndexField>,
}

/// Reasons a schema cannot be materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidName(String),
    ReservedField(String),
    DuplicateField(String),
    /// Name collides with a hidden FTS5 column.
    ReservedName(String),
    /// Column name equal to the index name; FTS5 cannot create the table.
    ShadowsIndexName(String),
    NoTextField,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(
                f,
                "`{name}` is not a valid index identifier; expected [a-z][a-z0-9_]*"
            ),
            Self::ReservedField(name) => write!(f, "field name `{name}` is reserved"),
            Self::DuplicateField(name) => write!(f, "field `{name}` is declared twice"),
            Self::ReservedName(name) => write!(f, "`{name}` is reserved by fts5"),
            Self::ShadowsIndexName(name) => {
                write!(f, "column `{name}` has the same name as its index")
            }
            Self::NoTextField => write!(f, "index schema declares no text field"),
        }
    }
}

impl std::error::Error for SchemaError {}

impl IndexSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends one field declaration.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(IndexField {
            name: name.into(),
            kind,
        });
        self
    }

    /// Schema used for book documents.
    pub fn books(name: impl Into<String>) -> Self {
        Self::new(name)
            .field("title", FieldKind::Text)
            .field("author", FieldKind::Text)
            .field("isbn", FieldKind::Keyword)
            .field("description", FieldKind::Text)
            .field("publisher", FieldKind::Text)
            .field("publish_date", FieldKind::Date)
            .field("pages", FieldKind::Integer)
            .field("language", FieldKind::Keyword)
            .field("created_at", FieldKind::Date)
            .field("updated_at", FieldKind::Date)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }

    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.kind)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if !IDENTIFIER_RE.is_match(&self.name) {
            return Err(SchemaError::InvalidName(self.name.clone()));
        }
        if FTS5_HIDDEN_COLUMNS.contains(&self.name.as_str()) {
            return Err(SchemaError::ReservedName(self.name.clone()));
        }
        if self.name == DOC_ID_COLUMN || self.name == SOURCE_COLUMN {
            return Err(SchemaError::ShadowsIndexName(self.name.clone()));
        }

        let mut seen = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if !IDENTIFIER_RE.is_match(&field.name) {
                return Err(SchemaError::InvalidName(field.name.clone()));
            }
            if field.name == DOC_ID_COLUMN || field.name == SOURCE_COLUMN {
                return Err(SchemaError::ReservedField(field.name.clone()));
            }
            if FTS5_HIDDEN_COLUMNS.contains(&field.name.as_str()) {
                return Err(SchemaError::ReservedName(field.name.clone()));
            }
            if field.name == self.name {
                return Err(SchemaError::ShadowsIndexName(field.name.clone()));
            }
            if seen.contains(&field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
            seen.push(field.name.as_str());
        }

        if !self.fields.iter().any(|field| field.kind.is_searchable()) {
            return Err(SchemaError::NoTextField);
        }
        Ok(())
    }

    /// Column list for `CREATE VIRTUAL TABLE ... USING fts5(...)`.
    pub(crate) fn fts5_columns(&self) -> String {
        let mut columns = vec![format!("{DOC_ID_COLUMN} UNINDEXED")];
        columns.extend(self.fields.iter().map(|field| {
            if field.kind.is_searchable() {
                field.name.clone()
            } else {
                format!("{} UNINDEXED", field.name)
            }
        }));
        columns.push(format!("{SOURCE_COLUMN} UNINDEXED"));
        columns.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldKind, IndexSchema, SchemaError};

    #[test]
    fn book_schema_is_valid_and_marks_text_fields() {
        let schema = IndexSchema::books("books");
        assert_eq!(schema.validate(), Ok(()));
        assert_eq!(schema.field_kind("title"), Some(FieldKind::Text));
        assert_eq!(schema.field_kind("isbn"), Some(FieldKind::Keyword));
        assert_eq!(schema.field_kind("pages"), Some(FieldKind::Integer));
        assert_eq!(schema.field_kind("missing"), None);
    }

    #[test]
    fn validate_rejects_unsafe_names() {
        let err = IndexSchema::books("books; DROP TABLE books")
            .validate()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidName(_)));

        let err = IndexSchema::new("docs")
            .field("source", FieldKind::Text)
            .validate()
            .unwrap_err();
        assert_eq!(err, SchemaError::ReservedField("source".to_string()));
    }

    #[test]
    fn validate_requires_a_text_field_and_unique_names() {
        let err = IndexSchema::new("docs")
            .field("pages", FieldKind::Integer)
            .validate()
            .unwrap_err();
        assert_eq!(err, SchemaError::NoTextField);

        let err = IndexSchema::new("docs")
            .field("title", FieldKind::Text)
            .field("title", FieldKind::Keyword)
            .validate()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateField("title".to_string()));
    }

    #[test]
    fn validate_rejects_names_fts5_cannot_create() {
        let err = IndexSchema::books("title").validate().unwrap_err();
        assert_eq!(err, SchemaError::ShadowsIndexName("title".to_string()));

        let err = IndexSchema::books("pages").validate().unwrap_err();
        assert_eq!(err, SchemaError::ShadowsIndexName("pages".to_string()));

        let err = IndexSchema::books("source").validate().unwrap_err();
        assert_eq!(err, SchemaError::ShadowsIndexName("source".to_string()));

        let err = IndexSchema::new("docs")
            .field("rank", FieldKind::Text)
            .validate()
            .unwrap_err();
        assert_eq!(err, SchemaError::ReservedName("rank".to_string()));

        let err = IndexSchema::books("rank").validate().unwrap_err();
        assert_eq!(err, SchemaError::ReservedName("rank".to_string()));
    }

    #[test]
    fn fts5_columns_unindex_non_text_fields() {
        let columns = IndexSchema::new("docs")
            .field("title", FieldKind::Text)
            .field("pages", FieldKind::Integer)
            .fts5_columns();
        assert_eq!(
            columns,
            "doc_id UNINDEXED, title, pages UNINDEXED, source UNINDEXED"
        );
    }
}
