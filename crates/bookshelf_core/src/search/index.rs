//! Search index contract and SQLite FTS5 implementation.
//!
//! # Responsibility
//! - Create the index on startup when it does not exist yet.
//! - Mirror committed books into the index keyed by their primary identity.
//! - Answer relevance-ranked match queries over text fields.
//!
//! # Invariants
//! - One document per `doc_id`; upsert replaces atomically.
//! - The stored `source` payload always carries the document key as `id`.
//! - Match results are ordered by bm25 relevance, then `doc_id`.

use crate::context::RequestContext;
use crate::db::{
    failure_message, is_interrupted, run_guarded, table_exists, table_has_column, DbError,
    SharedConnection,
};
use crate::model::book::{Book, BookId};
use crate::search::query::MatchQuery;
use crate::search::schema::{
    FieldKind, IndexField, IndexSchema, SchemaError, DOC_ID_COLUMN, SOURCE_COLUMN,
};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};

const FTS5_TOKENIZER: &str = "unicode61 remove_diacritics 2";

pub type IndexResult<T> = Result<T, IndexError>;

/// Search index error taxonomy.
#[derive(Debug)]
pub enum IndexError {
    /// Transport or backend failure.
    Unavailable(DbError),
    /// Backend refused a document or query, e.g. schema mismatch.
    Rejected(String),
    Schema(SchemaError),
    /// Stored payload cannot be decoded into a book.
    InvalidData(String),
    DeadlineExceeded,
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(err) => write!(f, "search index unavailable: {err}"),
            Self::Rejected(message) => write!(f, "search index rejected request: {message}"),
            Self::Schema(err) => write!(f, "invalid index schema: {err}"),
            Self::InvalidData(message) => write!(f, "invalid indexed document: {message}"),
            Self::DeadlineExceeded => write!(f, "search index call exceeded request deadline"),
        }
    }
}

impl Error for IndexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable(err) => Some(err),
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SchemaError> for IndexError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<DbError> for IndexError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Unavailable(other),
        }
    }
}

impl From<rusqlite::Error> for IndexError {
    fn from(value: rusqlite::Error) -> Self {
        if is_interrupted(&value) {
            return Self::DeadlineExceeded;
        }
        if is_document_rejection(&value) {
            let message = failure_message(&value)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            return Self::Rejected(message);
        }
        Self::Unavailable(DbError::Sqlite(value))
    }
}

/// Secondary, best-effort, query-optimized copy of books.
pub trait SearchIndex {
    /// Creates the bound index when absent; no-op otherwise.
    fn ensure_index(&self) -> IndexResult<()>;
    /// Writes or overwrites the document keyed by `id`.
    fn upsert(&self, ctx: &RequestContext, id: BookId, book: &Book) -> IndexResult<()>;
    /// Returns up to one page of books ranked by relevance.
    ///
    /// No hits is an empty vector, not an error.
    fn match_query(&self, ctx: &RequestContext, query: &MatchQuery) -> IndexResult<Vec<Book>>;
    /// Whether a document keyed by `id` exists.
    fn contains(&self, ctx: &RequestContext, id: BookId) -> IndexResult<bool>;
}

/// FTS5-backed search index bound to one [`IndexSchema`].
#[derive(Clone)]
pub struct SqliteSearchIndex {
    conn: SharedConnection,
    schema: IndexSchema,
}

impl SqliteSearchIndex {
    /// Binds an index connection to `schema`.
    ///
    /// The schema is validated here because its names become SQL identifiers.
    pub fn try_new(conn: SharedConnection, schema: IndexSchema) -> IndexResult<Self> {
        schema.validate()?;
        Ok(Self { conn, schema })
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// Number of documents currently held by the index.
    pub fn document_count(&self, ctx: &RequestContext) -> IndexResult<u64> {
        let conn = self.conn.lock()?;
        ctx.check().map_err(|_| IndexError::DeadlineExceeded)?;
        let count: i64 = run_guarded(&conn, ctx, |conn| {
            conn.query_row(
                &format!("SELECT COUNT(*) FROM {};", self.schema.name()),
                [],
                |row| row.get(0),
            )
        })?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn insert_sql(&self) -> String {
        let fields = self.schema.fields();
        let mut columns = Vec::with_capacity(fields.len() + 2);
        columns.push(DOC_ID_COLUMN.to_string());
        columns.extend(fields.iter().map(|field| field.name.clone()));
        columns.push(SOURCE_COLUMN.to_string());

        let placeholders = (1..=columns.len())
            .map(|position| format!("?{position}"))
            .collect::<Vec<_>>();

        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            self.schema.name(),
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    fn document_values(&self, id: BookId, book: &Book) -> IndexResult<Vec<Value>> {
        let mut document = book.clone();
        document.id = Some(id);

        let source = serde_json::to_value(&document)
            .map_err(|err| IndexError::Rejected(format!("document is not serializable: {err}")))?;
        let object = source.as_object().ok_or_else(|| {
            IndexError::Rejected("document does not serialize to an object".to_string())
        })?;

        let mut values = Vec::with_capacity(self.schema.fields().len() + 2);
        values.push(Value::Text(id.to_string()));
        for field in self.schema.fields() {
            values.push(field_value(field, object.get(&field.name))?);
        }
        values.push(Value::Text(source.to_string()));
        Ok(values)
    }
}

impl SearchIndex for SqliteSearchIndex {
    fn ensure_index(&self) -> IndexResult<()> {
        let name = self.schema.name();
        let conn = self.conn.lock()?;

        if table_exists(&conn, name)? {
            if !is_fts5_table(&conn, name)? {
                return Err(IndexError::Rejected(format!(
                    "existing table `{name}` is not an fts5 index"
                )));
            }
            let columns = [DOC_ID_COLUMN, SOURCE_COLUMN]
                .into_iter()
                .chain(self.schema.fields().iter().map(|field| field.name.as_str()));
            for column in columns {
                if !table_has_column(&conn, name, column)? {
                    return Err(IndexError::Rejected(format!(
                        "existing index `{name}` has no column `{column}`"
                    )));
                }
            }
            info!("event=index_ensure module=search status=ok index={name} created=false");
            return Ok(());
        }

        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {name} USING fts5({}, tokenize = '{FTS5_TOKENIZER}');",
            self.schema.fts5_columns()
        ))?;
        info!("event=index_ensure module=search status=ok index={name} created=true");
        Ok(())
    }

    fn upsert(&self, ctx: &RequestContext, id: BookId, book: &Book) -> IndexResult<()> {
        let values = self.document_values(id, book)?;
        let delete_sql = format!(
            "DELETE FROM {} WHERE {DOC_ID_COLUMN} = ?1;",
            self.schema.name()
        );
        let insert_sql = self.insert_sql();

        let conn = self.conn.lock()?;
        ctx.check().map_err(|_| IndexError::DeadlineExceeded)?;
        run_guarded(&conn, ctx, |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(&delete_sql, params![id.to_string()])?;
            tx.execute(&insert_sql, params_from_iter(values))?;
            tx.commit()
        })?;
        Ok(())
    }

    fn match_query(&self, ctx: &RequestContext, query: &MatchQuery) -> IndexResult<Vec<Book>> {
        let field = query.field.as_str();
        if self.schema.field_kind(field) != Some(FieldKind::Text) {
            return Err(IndexError::Rejected(format!(
                "field `{field}` is not a text field of index `{}`",
                self.schema.name()
            )));
        }

        let Some(match_expr) = query.match_expression() else {
            return Ok(Vec::new());
        };
        let limit = query.effective_limit();
        if limit == 0 {
            return Ok(Vec::new());
        }

        let name = self.schema.name();
        let sql = format!(
            "SELECT {SOURCE_COLUMN}
             FROM {name}
             WHERE {name} MATCH ?1
             ORDER BY bm25({name}) ASC, {DOC_ID_COLUMN} ASC
             LIMIT ?2;"
        );

        let conn = self.conn.lock()?;
        ctx.check().map_err(|_| IndexError::DeadlineExceeded)?;
        let sources = run_guarded(&conn, ctx, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![match_expr, i64::from(limit)], |row| {
                row.get::<_, String>(0)
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;
        drop(conn);

        sources
            .iter()
            .map(|source| {
                serde_json::from_str::<Book>(source)
                    .map_err(|err| IndexError::InvalidData(format!("undecodable source: {err}")))
            })
            .collect()
    }

    fn contains(&self, ctx: &RequestContext, id: BookId) -> IndexResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {DOC_ID_COLUMN} = ?1);",
            self.schema.name()
        );

        let conn = self.conn.lock()?;
        ctx.check().map_err(|_| IndexError::DeadlineExceeded)?;
        let exists: i64 = run_guarded(&conn, ctx, |conn| {
            conn.query_row(&sql, params![id.to_string()], |row| row.get(0))
        })?;
        Ok(exists == 1)
    }
}

fn field_value(field: &IndexField, value: Option<&serde_json::Value>) -> IndexResult<Value> {
    let Some(value) = value else {
        return Err(IndexError::Rejected(format!(
            "document has no field `{}`",
            field.name
        )));
    };

    match (field.kind, value) {
        (_, serde_json::Value::Null) => Ok(Value::Null),
        (FieldKind::Text | FieldKind::Keyword, serde_json::Value::String(text)) => {
            Ok(Value::Text(text.clone()))
        }
        (FieldKind::Date | FieldKind::Integer, serde_json::Value::Number(number)) => number
            .as_i64()
            .map(Value::Integer)
            .ok_or_else(|| {
                IndexError::Rejected(format!("field `{}` expects an integer", field.name))
            }),
        (kind, _) => Err(IndexError::Rejected(format!(
            "field `{}` does not match declared kind {kind:?}",
            field.name
        ))),
    }
}

fn is_fts5_table(conn: &rusqlite::Connection, name: &str) -> rusqlite::Result<bool> {
    let sql: Option<String> = conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1;",
        [name],
        |row| row.get(0),
    )?;
    Ok(sql.is_some_and(|sql| {
        sql.to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .windows(2)
            .any(|pair| pair[0] == "using" && pair[1].starts_with("fts5"))
    }))
}

fn is_document_rejection(err: &rusqlite::Error) -> bool {
    if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
        return true;
    }
    let Some(message) = failure_message(err) else {
        return false;
    };
    let msg = message.to_lowercase();
    msg.contains("no such table")
        || msg.contains("no such column")
        || msg.contains("has no column")
        || (msg.contains("fts5") && msg.contains("syntax"))
        || msg.contains("malformed match expression")
}
