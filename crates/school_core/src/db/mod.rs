//! SQLite storage bootstrap, row codec and unit of work.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the persistence core.
//! - Apply schema migrations in deterministic order.
//! - Encode entities into the generic `entities` table and back.
//! - Stage and commit changes as one transaction per unit of work.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.
//! - SQL stays inside this module; repositories see typed entities only.

use thiserror::Error;

pub mod migrations;
mod open;
pub(crate) mod rows;
pub mod session;
pub mod tracker;

pub use open::{open_db, open_db_in_memory, open_db_with, DbOptions};
pub use rows::Visibility;
pub use session::Session;
pub use tracker::{Audit, EntryState, InsertedKey, SaveOutcome};

pub type DbResult<T> = Result<T, DbError>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Bootstrap and schema errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    #[error(
        "connection is not initialized: expected schema version {expected_version}, found {actual_version}"
    )]
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    #[error("required table `{0}` is missing")]
    MissingRequiredTable(&'static str),
}

/// Errors raised while reading or writing entity rows.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to encode or decode `{kind}` payload: {source}")]
    Codec {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("key sequence for `{kind}` is exhausted")]
    KeyExhausted { kind: &'static str },
    #[error("`{kind}` requires a caller-assigned key")]
    MissingKey { kind: &'static str },
    #[error("connection lock poisoned")]
    Poisoned,
    #[error("store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
