//! Primary store abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the identity-addressed data access contract for books.
//! - Isolate SQLite query details from synchronization logic.
//!
//! # Invariants
//! - Repository writes enforce `Book::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `InvalidIdentifier`)
//!   in addition to backend transport errors.

pub mod book_repo;
