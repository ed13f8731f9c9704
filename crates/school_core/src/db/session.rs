//! Unit of work bound to one SQLite connection.
//!
//! # Responsibility
//! - Run blocking SQLite work on the tokio blocking pool.
//! - Expose typed reads and the staged-change lifecycle to repositories.
//!
//! # Invariants
//! - A session only wraps connections bootstrapped by `open_db*`.
//! - Locks are never held across an `.await`.

use crate::db::migrations::ensure_connection_ready;
use crate::db::rows::{self, Graph, Visibility};
use crate::db::tracker::{self, Audit, ChangeTracker, EntryState, SaveOutcome};
use crate::db::{DbResult, StoreError, StoreResult};
use crate::model::entity::{Entity, Predicate};
use crate::model::key::EntityKey;
use log::{debug, info, warn};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

pub struct Session {
    conn: Arc<Mutex<Connection>>,
    tracker: Mutex<ChangeTracker>,
}

impl Session {
    /// Wraps an initialized connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    /// - `MissingRequiredTable` when the schema is incomplete.
    pub fn try_new(conn: Connection) -> DbResult<Self> {
        ensure_connection_ready(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            tracker: Mutex::new(ChangeTracker::default()),
        })
    }

    /// Runs `op` against the connection on the blocking pool.
    pub(crate) async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            op(&mut *guard)
        })
        .await?
    }

    /// Reads rows of `E` matching every predicate.
    ///
    /// With `Graph::Loaded` predicates see navigations; with `Graph::Scalars`
    /// no related row is read.
    pub(crate) async fn read<E: Entity>(
        &self,
        predicates: Vec<Predicate<E>>,
        visibility: Visibility,
        graph: Graph,
        limit: Option<usize>,
    ) -> StoreResult<Vec<E>> {
        self.run(move |conn| {
            let mut matched = Vec::new();
            for mut entity in rows::select_entities::<E>(conn, visibility)? {
                if graph == Graph::Loaded {
                    rows::load_relations(conn, &mut entity)?;
                }
                if !predicates.iter().all(|predicate| predicate(&entity)) {
                    continue;
                }
                matched.push(entity);
                if limit.is_some_and(|limit| matched.len() >= limit) {
                    break;
                }
            }
            debug!(
                "event=read module=db status=ok kind={} rows={}",
                E::KIND,
                matched.len()
            );
            Ok(matched)
        })
        .await
    }

    /// Reads one row of `E` by identity, with relationships loaded.
    pub(crate) async fn find<E: Entity>(
        &self,
        id: E::Key,
        visibility: Visibility,
    ) -> StoreResult<Option<E>> {
        self.run(move |conn| {
            let mut found = rows::find_entity::<E>(conn, &id, visibility)?;
            if let Some(entity) = found.as_mut() {
                rows::load_relations(conn, entity)?;
            }
            Ok(found)
        })
        .await
    }

    /// Whether an active row of `kind` with the given key exists.
    pub async fn exists<K: EntityKey>(&self, kind: &'static str, id: K) -> StoreResult<bool> {
        self.key_exists(kind, id.to_column()).await
    }

    pub(crate) async fn key_exists(&self, kind: &'static str, id: String) -> StoreResult<bool> {
        self.run(move |conn| rows::key_exists(conn, kind, &id)).await
    }

    pub(crate) fn stage<E: Entity>(&self, entity: E, state: EntryState) -> StoreResult<()> {
        let mut tracker = self.tracker.lock().map_err(|_| StoreError::Poisoned)?;
        tracker.stage(entity, state);
        Ok(())
    }

    /// Number of staged entries awaiting `save_changes`.
    pub fn pending_changes(&self) -> usize {
        self.tracker
            .lock()
            .map(|tracker| tracker.len())
            .unwrap_or_default()
    }

    /// Cascades soft deletes and commits all staged work in one transaction.
    ///
    /// Staged work is discarded whether the commit succeeds or conflicts.
    /// Store-generated root keys are assigned here and reported in
    /// `SaveOutcome::Committed`; staged values never flow back to callers.
    ///
    /// Once handed to the blocking pool the commit runs to the end even if
    /// this future is dropped. It is never partial, and never aborted.
    pub async fn save_changes(&self, audit: Audit) -> StoreResult<SaveOutcome> {
        let mut entries = {
            let mut tracker = self.tracker.lock().map_err(|_| StoreError::Poisoned)?;
            tracker.take()
        };
        if entries.is_empty() {
            return Ok(SaveOutcome::nothing());
        }

        self.run(move |conn| {
            let staged = entries.len();
            let cascaded = tracker::cascade_deletes(&mut entries);
            let outcome = tracker::commit(conn, &audit, &mut entries)?;
            match &outcome {
                SaveOutcome::Committed { affected, inserted } => info!(
                    "event=save_changes module=db status=ok entries={} cascaded={} affected={} inserted={}",
                    staged,
                    cascaded,
                    affected,
                    inserted.len()
                ),
                SaveOutcome::Conflict { kind, id } => warn!(
                    "event=save_changes module=db status=conflict entries={} kind={} id={}",
                    staged, kind, id
                ),
            }
            Ok(outcome)
        })
        .await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("pending_changes", &self.pending_changes())
            .finish_non_exhaustive()
    }
}
