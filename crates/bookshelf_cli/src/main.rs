//! CLI smoke entry point.
//!
//! # Responsibility
//! - Own the process lifecycle of the shared store and index handles.
//! - Verify `bookshelf_core` wiring end to end: open stores, ensure the
//!   index, repair pending propagation and print a short status.

use bookshelf_core::db::{open_db, open_index_db};
use bookshelf_core::{
    core_version, init_logging_from_config, BookSyncService, CoreConfig, IndexSchema,
    SearchIndex, SharedConnection, SqliteBookRepository, SqliteSearchIndex,
};
use log::error;
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_exit module=cli status=error error={err}");
            eprintln!("bookshelf: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::from_env()?;
    init_logging_from_config(&config)?;

    let repo = SqliteBookRepository::try_new(SharedConnection::new(open_db(&config.db_path)?))?;
    let index = SqliteSearchIndex::try_new(
        SharedConnection::new(open_index_db(&config.index_path)?),
        IndexSchema::books(config.index_name.as_str()),
    )?;
    index.ensure_index()?;

    let service = BookSyncService::new(repo, index);
    let report = service.reconcile_index(&config.request_context())?;
    let indexed = service
        .index()
        .document_count(&config.request_context())?;

    println!("bookshelf_core version={}", core_version());
    println!(
        "books={} indexed={} repaired={} failed={}",
        report.scanned,
        indexed,
        report.repaired,
        report.failed.len()
    );
    Ok(())
}
