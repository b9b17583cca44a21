//! Domain model for the book catalogue.
//!
//! # Responsibility
//! - Define the record shape flowing through stores, index and services.
//!
//! # Invariants
//! - Every committed book is identified by a stable `BookId`.
//! - The same `BookId` keys the book in the primary store and in the index.

pub mod book;
