//! Generic repository contract and its session-backed implementation.
//!
//! # Responsibility
//! - Provide the same read/write surface for every entity type.
//! - Delegate SQL and transactions to the session.
//!
//! # Invariants
//! - `insert` never touches the caller's identity; store-generated keys
//!   exist only once `commit` reports them.
//! - `delete` loads the full owned graph so cascades reach loaded children.

use crate::db::rows::Graph;
use crate::db::{EntryState, SaveOutcome, StoreError, Visibility};
use crate::model::entity::{Entity, KeyGeneration, Predicate, StaticEntity};
use crate::scope::RequestScope;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("`{kind}` with id `{id}` not found")]
    NotFound { kind: &'static str, id: String },
    #[error("no `{kind}` matches the given predicates")]
    NoMatch { kind: &'static str },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a successful commit wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit<K> {
    /// Rows written across every kind in the unit of work.
    pub affected: usize,
    /// Keys of the inserted roots of the repository's kind, in staging order.
    pub inserted: Vec<K>,
}

/// Data access contract for entity type `E`.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// All non-deleted rows.
    async fn get(&self) -> RepoResult<Vec<E>>;

    /// Non-deleted rows matching every predicate.
    async fn get_where(&self, predicates: &[Predicate<E>]) -> RepoResult<Vec<E>>;

    /// First non-deleted row matching every predicate.
    async fn get_one_where(&self, predicates: &[Predicate<E>]) -> RepoResult<E>;

    async fn get_one(&self, id: E::Key) -> RepoResult<E>;

    /// Rows matching every predicate, tombstones included.
    async fn get_including_deleted(&self, predicates: &[Predicate<E>]) -> RepoResult<Vec<E>>;

    async fn count(&self, predicates: &[Predicate<E>]) -> RepoResult<usize>;

    async fn any(&self, predicates: &[Predicate<E>]) -> RepoResult<bool>;

    async fn any_id(&self, id: E::Key) -> RepoResult<bool>;

    /// Stages an insert. Store-generated keys are assigned at commit, so
    /// `entity` stays new; read the key from `commit`.
    async fn insert(&self, entity: &mut E) -> RepoResult<bool>;

    /// Stages a full replace of row `id`.
    async fn update(&self, id: E::Key, entity: E) -> RepoResult<bool>;

    /// Marks row `id` deleted and stages the update.
    async fn delete(&self, id: E::Key) -> RepoResult<bool>;

    /// Commits staged work. `None` when a conflict rolled everything back.
    async fn commit(&self) -> RepoResult<Option<Commit<E::Key>>>;

    /// Commits staged work; true iff at least one row was written.
    async fn save_changes(&self) -> RepoResult<bool> {
        Ok(self
            .commit()
            .await?
            .is_some_and(|commit| commit.affected > 0))
    }
}

/// Repository over the session of a request scope.
pub struct SqliteRepository<E> {
    scope: Arc<RequestScope>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> SqliteRepository<E> {
    pub fn new(scope: Arc<RequestScope>) -> Self {
        Self {
            scope,
            _entity: PhantomData,
        }
    }

    pub fn scope(&self) -> &RequestScope {
        &self.scope
    }

    async fn read(
        &self,
        predicates: &[Predicate<E>],
        visibility: Visibility,
        limit: Option<usize>,
    ) -> RepoResult<Vec<E>> {
        let rows = self
            .scope
            .session()
            .read(predicates.to_vec(), visibility, Graph::Loaded, limit)
            .await
            .inspect_err(|err| {
                error!(
                    "event=read module=repo status=error kind={} error={}",
                    E::KIND,
                    err
                )
            })?;
        Ok(rows)
    }
}

impl<E: StaticEntity> SqliteRepository<E> {
    /// Inserts the static rows whose keys are not present yet and commits.
    ///
    /// The commit also carries anything else already staged in the session.
    /// Returns how many `E` rows it inserted, zero when a conflict rolled it
    /// back. Running it again is a no-op.
    pub async fn seed_static(&self, rows: Vec<E>) -> RepoResult<usize> {
        let session = self.scope.session();
        let mut staged = 0;
        for row in rows {
            let known = session
                .find::<E>(*row.id(), Visibility::IncludeDeleted)
                .await?
                .is_some();
            if known {
                continue;
            }
            session.stage(row, EntryState::Added)?;
            staged += 1;
        }

        if staged == 0 {
            info!(
                "event=seed_static module=repo status=ok kind={} inserted=0",
                E::KIND
            );
            return Ok(0);
        }

        let outcome = session.save_changes(self.scope.audit()).await?;
        let inserted = outcome.inserted_keys::<E>()?.len();
        match &outcome {
            SaveOutcome::Committed { .. } => info!(
                "event=seed_static module=repo status=ok kind={} staged={} inserted={}",
                E::KIND,
                staged,
                inserted
            ),
            SaveOutcome::Conflict { kind, id } => warn!(
                "event=seed_static module=repo status=conflict kind={} staged={} conflict_kind={} conflict_id={}",
                E::KIND,
                staged,
                kind,
                id
            ),
        }
        Ok(inserted)
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for SqliteRepository<E> {
    async fn get(&self) -> RepoResult<Vec<E>> {
        self.read(&[], Visibility::Active, None).await
    }

    async fn get_where(&self, predicates: &[Predicate<E>]) -> RepoResult<Vec<E>> {
        self.read(predicates, Visibility::Active, None).await
    }

    async fn get_one_where(&self, predicates: &[Predicate<E>]) -> RepoResult<E> {
        self.read(predicates, Visibility::Active, Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or(RepoError::NoMatch { kind: E::KIND })
    }

    async fn get_one(&self, id: E::Key) -> RepoResult<E> {
        let label = id.to_string();
        self.scope
            .session()
            .find::<E>(id, Visibility::Active)
            .await?
            .ok_or(RepoError::NotFound {
                kind: E::KIND,
                id: label,
            })
    }

    async fn get_including_deleted(&self, predicates: &[Predicate<E>]) -> RepoResult<Vec<E>> {
        self.read(predicates, Visibility::IncludeDeleted, None).await
    }

    async fn count(&self, predicates: &[Predicate<E>]) -> RepoResult<usize> {
        Ok(self.read(predicates, Visibility::Active, None).await?.len())
    }

    async fn any(&self, predicates: &[Predicate<E>]) -> RepoResult<bool> {
        Ok(!self
            .read(predicates, Visibility::Active, Some(1))
            .await?
            .is_empty())
    }

    async fn any_id(&self, id: E::Key) -> RepoResult<bool> {
        Ok(self.scope.session().exists(E::KIND, id).await?)
    }

    async fn insert(&self, entity: &mut E) -> RepoResult<bool> {
        if entity.is_new() && E::KEY_GENERATION == KeyGeneration::Caller {
            return Err(StoreError::MissingKey { kind: E::KIND }.into());
        }
        self.scope
            .session()
            .stage(entity.clone(), EntryState::Added)?;
        debug!(
            "event=stage module=repo status=ok op=insert kind={} id={}",
            E::KIND,
            entity.id()
        );
        Ok(true)
    }

    async fn update(&self, id: E::Key, mut entity: E) -> RepoResult<bool> {
        debug!(
            "event=stage module=repo status=ok op=update kind={} id={}",
            E::KIND,
            id
        );
        entity.record_mut().id = id;
        self.scope.session().stage(entity, EntryState::Modified)?;
        Ok(true)
    }

    async fn delete(&self, id: E::Key) -> RepoResult<bool> {
        let mut entity = self.get_one(id.clone()).await?;
        entity.record_mut().is_deleted = true;
        debug!(
            "event=stage module=repo status=ok op=delete kind={} id={}",
            E::KIND,
            id
        );
        self.update(id, entity).await
    }

    async fn commit(&self) -> RepoResult<Option<Commit<E::Key>>> {
        let outcome = self
            .scope
            .session()
            .save_changes(self.scope.audit())
            .await
            .inspect_err(|err| {
                error!(
                    "event=save_changes module=repo status=error kind={} error={}",
                    E::KIND,
                    err
                )
            })?;
        match &outcome {
            SaveOutcome::Committed { affected, .. } => Ok(Some(Commit {
                affected: *affected,
                inserted: outcome.inserted_keys::<E>()?,
            })),
            SaveOutcome::Conflict { .. } => Ok(None),
        }
    }
}
