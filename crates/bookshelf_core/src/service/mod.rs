//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate primary store and search index calls into use-case APIs.
//! - Keep callers decoupled from storage details and consistency policy.

pub mod book_sync;
