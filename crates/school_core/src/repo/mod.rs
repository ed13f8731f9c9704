//! Repository layer: generic data access over any entity type.
//!
//! # Responsibility
//! - Turn predicate lists into store reads.
//! - Stage inserts, updates and soft deletes on the session unit of work.
//!
//! # Invariants
//! - Default reads never return soft-deleted rows.
//! - Repository APIs return semantic errors (`NotFound`) in addition to store
//!   transport errors.
//! - A concurrency conflict is reported as `save_changes() == false`, never as
//!   an error.

pub mod entity_repo;

pub use entity_repo::{Commit, RepoError, RepoResult, Repository, SqliteRepository};
