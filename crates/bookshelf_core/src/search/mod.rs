//! Secondary full-text search index.
//!
//! # Responsibility
//! - Expose index management, propagation and match-query APIs backed by
//!   SQLite FTS5.
//! - Keep query construction typed; no free-form query bodies.
//!
//! # Invariants
//! - The index is never authoritative; it mirrors the primary store.

pub mod index;
pub mod query;
pub mod schema;
