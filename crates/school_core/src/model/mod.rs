//! Generic entity model shared by every persisted type.
//!
//! # Responsibility
//! - Define the entity contract (identity, audit, tombstone, concurrency).
//! - Define key types and statically declared relationship tables.
//!
//! # Invariants
//! - Every entity kind has a unique `Entity::KIND` discriminator.
//! - Deletion is represented by soft-delete tombstones, not hard delete.

pub mod entity;
pub mod key;
pub mod relation;
