//! Change tracker: staged entries committed as one transaction.
//!
//! # Responsibility
//! - Hold staged inserts and updates until `save_changes`.
//! - Cascade soft deletes across loaded owned graphs before commit.
//! - Roll the whole unit back on the first concurrency conflict.
//!
//! # Invariants
//! - Staged work is consumed by every commit attempt, successful or not.
//! - Staging the same row twice keeps the latest value and the first state.

use crate::db::rows::{self, WriteOutcome};
use crate::db::{StoreError, StoreResult};
use crate::model::entity::{Entity, TrackedEntity};
use crate::model::key::EntityKey;
use rusqlite::Connection;
use std::time::{SystemTime, UNIX_EPOCH};

/// Caller identity and timestamp stamped onto written rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audit {
    pub user_id: String,
    /// Unix epoch milliseconds.
    pub at_ms: i64,
}

impl Audit {
    pub fn now(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            at_ms: now_epoch_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Added,
    Modified,
}

/// Root row inserted by a commit, with the key it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedKey {
    pub kind: &'static str,
    pub id: String,
}

/// Result of committing a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Keys are assigned inside the transaction, so `inserted` is the only
    /// place a caller learns them.
    Committed {
        affected: usize,
        inserted: Vec<InsertedKey>,
    },
    /// An update matched no row at its expected version; nothing was written.
    Conflict { kind: &'static str, id: String },
}

impl SaveOutcome {
    /// True iff the commit went through and touched at least one row.
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Committed { affected, .. } if *affected > 0)
    }

    /// Keys of the inserted `E` roots, in staging order. Empty on conflict.
    pub fn inserted_keys<E: Entity>(&self) -> StoreResult<Vec<E::Key>> {
        let Self::Committed { inserted, .. } = self else {
            return Ok(Vec::new());
        };
        inserted
            .iter()
            .filter(|key| key.kind == E::KIND)
            .map(|key| {
                E::Key::parse_column(&key.id).ok_or_else(|| {
                    StoreError::InvalidData(format!(
                        "invalid inserted key `{}` for kind `{}`",
                        key.id,
                        E::KIND
                    ))
                })
            })
            .collect()
    }

    pub(crate) fn nothing() -> Self {
        Self::Committed {
            affected: 0,
            inserted: Vec::new(),
        }
    }
}

pub(crate) trait StagedEntry: Send {
    fn kind(&self) -> &'static str;

    fn key(&self) -> String;

    fn state(&self) -> EntryState;

    fn cascade(&mut self) -> usize;

    fn write(&mut self, conn: &Connection, audit: &Audit) -> StoreResult<WriteOutcome>;
}

struct Staged<E> {
    entity: E,
    state: EntryState,
}

impl<E: Entity> StagedEntry for Staged<E> {
    fn kind(&self) -> &'static str {
        E::KIND
    }

    fn key(&self) -> String {
        self.entity.id().to_column()
    }

    fn state(&self) -> EntryState {
        self.state
    }

    fn cascade(&mut self) -> usize {
        self.entity.cascade_pending()
    }

    fn write(&mut self, conn: &Connection, audit: &Audit) -> StoreResult<WriteOutcome> {
        rows::write_root(conn, audit, &mut self.entity, self.state)
    }
}

/// Pending work of one session.
#[derive(Default)]
pub(crate) struct ChangeTracker {
    entries: Vec<Box<dyn StagedEntry>>,
}

impl ChangeTracker {
    pub(crate) fn stage<E: Entity>(&mut self, entity: E, state: EntryState) {
        if !entity.is_new() {
            let key = entity.id().to_column();
            let existing = self
                .entries
                .iter_mut()
                .find(|entry| entry.kind() == E::KIND && entry.key() == key);
            if let Some(existing) = existing {
                let state = match existing.state() {
                    EntryState::Added => EntryState::Added,
                    EntryState::Modified => state,
                };
                *existing = Box::new(Staged { entity, state });
                return;
            }
        }

        self.entries.push(Box::new(Staged { entity, state }));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<Box<dyn StagedEntry>> {
        std::mem::take(&mut self.entries)
    }
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Propagates soft deletes through every staged graph. Returns how many
/// related entities were newly marked.
pub(crate) fn cascade_deletes(entries: &mut [Box<dyn StagedEntry>]) -> usize {
    entries.iter_mut().map(|entry| entry.cascade()).sum()
}

/// Writes all entries inside one transaction.
pub(crate) fn commit(
    conn: &mut Connection,
    audit: &Audit,
    entries: &mut [Box<dyn StagedEntry>],
) -> StoreResult<SaveOutcome> {
    let tx = conn.transaction()?;
    let mut affected = 0;
    let mut inserted = Vec::new();
    for entry in entries.iter_mut() {
        let outcome = entry.write(&tx, audit)?;
        affected += outcome.affected;
        if let Some(conflict) = outcome.conflict {
            tx.rollback()?;
            return Ok(SaveOutcome::Conflict {
                kind: conflict.kind,
                id: conflict.id,
            });
        }
        if entry.state() == EntryState::Added {
            inserted.push(InsertedKey {
                kind: entry.kind(),
                id: entry.key(),
            });
        }
    }
    tx.commit()?;

    Ok(SaveOutcome::Committed { affected, inserted })
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
