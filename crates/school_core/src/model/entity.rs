//! Base entity contract shared by every persisted type.
//!
//! # Responsibility
//! - Expose identity, audit stamps, tombstone flag and concurrency token
//!   uniformly so repositories and services need no per-type code.
//! - Provide the type-erased view used by the change tracker cascade.
//!
//! # Invariants
//! - `is_new` is derived from the key, never stored.
//! - `is_deleted` only moves from `false` to `true`.
//! - Audit stamps are written by the persistence boundary only.

use crate::model::key::EntityKey;
use crate::model::relation::Relation;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use uuid::Uuid;

/// Row filter evaluated against decoded entities.
pub type Predicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Wraps a closure into a [`Predicate`].
pub fn predicate<E, F>(filter: F) -> Predicate<E>
where
    F: Fn(&E) -> bool + Send + Sync + 'static,
{
    Arc::new(filter)
}

/// Who assigns identity for new rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGeneration {
    /// The store draws the key on insert.
    Store,
    /// The caller supplies the key (static reference data).
    Caller,
}

/// Opaque row version compared on every update.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcurrencyToken(Vec<u8>);

impl ConcurrencyToken {
    pub(crate) fn fresh() -> Self {
        Self(Uuid::new_v4().as_bytes().to_vec())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// State of a row as it was last read from or written to the store.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub(crate) payload: Arc<str>,
    pub(crate) is_deleted: bool,
}

/// Identity and bookkeeping fields embedded in every entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Record<K> {
    #[serde(default)]
    pub id: K,
    #[serde(default)]
    pub created_by: Option<String>,
    /// Unix epoch milliseconds.
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub edited_by: Option<String>,
    /// Unix epoch milliseconds.
    #[serde(default)]
    pub edited_at: Option<i64>,
    #[serde(skip)]
    pub is_deleted: bool,
    #[serde(skip)]
    pub concurrency_token: Option<ConcurrencyToken>,
    #[serde(skip)]
    pub(crate) snapshot: Option<Snapshot>,
}

impl<K: EntityKey> Record<K> {
    /// Record for a row with a known (caller-assigned or persisted) key.
    pub fn with_id(id: K) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_zero()
    }
}

impl<K: PartialEq> PartialEq for Record<K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.created_by == other.created_by
            && self.created_at == other.created_at
            && self.edited_by == other.edited_by
            && self.edited_at == other.edited_at
            && self.is_deleted == other.is_deleted
            && self.concurrency_token == other.concurrency_token
    }
}

impl<K: Eq> Eq for Record<K> {}

/// Contract implemented by every persisted type.
///
/// Navigation fields (the ones referenced from [`Entity::relations`]) must be
/// `#[serde(skip)]`: related rows are stored under their own kind.
pub trait Entity:
    Clone + Default + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Key: EntityKey;

    /// Storage discriminator, unique per entity type.
    const KIND: &'static str;

    const KEY_GENERATION: KeyGeneration = KeyGeneration::Store;

    fn record(&self) -> &Record<Self::Key>;

    fn record_mut(&mut self) -> &mut Record<Self::Key>;

    /// Relationship table of this type, built once per process.
    fn relations() -> &'static [Relation<Self>] {
        &[]
    }

    fn id(&self) -> &Self::Key {
        &self.record().id
    }

    fn is_new(&self) -> bool {
        self.record().is_new()
    }

    fn is_deleted(&self) -> bool {
        self.record().is_deleted
    }
}

/// Reference/lookup entity with a caller-assigned integer key.
///
/// Implementors set `KEY_GENERATION = KeyGeneration::Caller`.
pub trait StaticEntity: Entity<Key = i32> {}

/// Object-safe view over any entity, used to walk loaded relationship graphs.
pub trait TrackedEntity: Send {
    fn entity_kind(&self) -> &'static str;

    fn deleted(&self) -> bool;

    fn mark_deleted(&mut self);

    /// Marks every loaded entity owned through principal relations, at any
    /// depth. Returns how many entities were newly marked.
    fn cascade_delete(&mut self) -> usize;

    /// Finds deleted entities anywhere in the loaded graph and cascades from
    /// each of them.
    fn cascade_pending(&mut self) -> usize;
}

impl<E: Entity> TrackedEntity for E {
    fn entity_kind(&self) -> &'static str {
        E::KIND
    }

    fn deleted(&self) -> bool {
        self.record().is_deleted
    }

    fn mark_deleted(&mut self) {
        self.record_mut().is_deleted = true;
    }

    fn cascade_delete(&mut self) -> usize {
        let mut marked = 0;
        for relation in E::relations().iter().filter(|relation| relation.is_principal()) {
            relation.for_each_loaded(self, &mut |related: &mut dyn TrackedEntity| {
                if !related.deleted() {
                    related.mark_deleted();
                    marked += 1;
                }
                marked += related.cascade_delete();
            });
        }
        marked
    }

    fn cascade_pending(&mut self) -> usize {
        if self.deleted() {
            return self.cascade_delete();
        }

        let mut marked = 0;
        for relation in E::relations().iter().filter(|relation| relation.is_principal()) {
            relation.for_each_loaded(self, &mut |related: &mut dyn TrackedEntity| {
                marked += related.cascade_pending();
            });
        }
        marked
    }
}
