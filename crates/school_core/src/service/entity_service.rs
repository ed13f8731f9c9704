//! Generic entity service.
//!
//! # Responsibility
//! - Map candidates onto fresh or persisted entities.
//! - Reconcile declared child collections by identity.
//! - Validate before anything is staged, then delegate to the repository.
//!
//! # Invariants
//! - Mapping completes before validation; validation completes before any
//!   repository mutation.
//! - A validation failure leaves the store and the candidate untouched.

use crate::mapping::{map_onto, MapError};
use crate::model::entity::{Entity, Predicate};
use crate::model::relation::Relation;
use crate::repo::{Repository, SqliteRepository};
use crate::scope::RequestScope;
use crate::service::error::{ServiceResult, ValidationFailure};
use crate::validation::{RuleRegistry, RuleSet};
use log::{info, warn};
use std::sync::Arc;

/// CRUD orchestration for entity type `E` over repository `R`.
pub struct EntityService<E: Entity, R = SqliteRepository<E>> {
    scope: Arc<RequestScope>,
    repository: R,
    rules: Arc<RuleSet<E>>,
    children: Vec<&'static Relation<E>>,
}

impl<E: Entity> EntityService<E> {
    /// Service over the session-backed repository of `scope`.
    pub fn new(scope: Arc<RequestScope>, registry: &RuleRegistry) -> Self {
        let repository = SqliteRepository::new(Arc::clone(&scope));
        Self::with_repository(scope, repository, registry)
    }
}

impl<E: Entity, R: Repository<E>> EntityService<E, R> {
    pub fn with_repository(scope: Arc<RequestScope>, repository: R, registry: &RuleRegistry) -> Self {
        Self {
            scope,
            repository,
            rules: registry.rules_for::<E>(),
            children: Vec::new(),
        }
    }

    /// Declares to-many relationships reconciled on insert and update.
    ///
    /// # Errors
    /// - `Mapping(UnknownChildCollection)` when `E` has no to-many relationship
    ///   with one of the given names.
    pub fn with_children(mut self, names: &[&str]) -> ServiceResult<Self> {
        for name in names {
            let relation = E::relations()
                .iter()
                .find(|relation| relation.is_collection() && relation.name() == *name)
                .ok_or_else(|| MapError::UnknownChildCollection {
                    kind: E::KIND,
                    name: (*name).to_string(),
                })?;
            self.children.push(relation);
        }
        Ok(self)
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub async fn get(&self) -> ServiceResult<Vec<E>> {
        Ok(self.repository.get().await?)
    }

    pub async fn get_where(&self, predicates: &[Predicate<E>]) -> ServiceResult<Vec<E>> {
        Ok(self.repository.get_where(predicates).await?)
    }

    pub async fn get_one_where(&self, predicates: &[Predicate<E>]) -> ServiceResult<E> {
        Ok(self.repository.get_one_where(predicates).await?)
    }

    /// Creates a row from `candidate`.
    ///
    /// Returns the reloaded row, or `None` when nothing was written. The key
    /// comes from the commit, so a failed insert assigns no identity.
    ///
    /// # Errors
    /// - `Validation` with every failure message; nothing is staged.
    pub async fn insert(&self, candidate: &E) -> ServiceResult<Option<E>> {
        let mut target = E::default();
        self.map(candidate, &mut target)?;
        self.validate(&target).await?;

        let staged = self.repository.insert(&mut target).await?;
        let committed = self.repository.commit().await?;
        let id = match committed {
            Some(commit) if staged && commit.affected > 0 => commit.inserted.into_iter().last(),
            _ => None,
        };
        let Some(id) = id else {
            warn!(
                "event=insert module=service status=not_saved kind={}",
                E::KIND
            );
            return Ok(None);
        };

        info!(
            "event=insert module=service status=ok kind={} id={}",
            E::KIND,
            id
        );
        Ok(Some(self.repository.get_one(id).await?))
    }

    /// Applies `candidate` onto row `id`.
    ///
    /// Returns the reloaded row, or `None` when the write lost a concurrency
    /// race or touched nothing.
    ///
    /// # Errors
    /// - `NotFound` when row `id` does not exist.
    /// - `Validation` with every failure message; nothing is staged.
    pub async fn update(&self, id: E::Key, candidate: &E) -> ServiceResult<Option<E>> {
        let mut target = self.repository.get_one(id.clone()).await?;
        self.map(candidate, &mut target)?;
        self.validate(&target).await?;

        let staged = self.repository.update(id.clone(), target).await?;
        let saved = self.repository.save_changes().await?;
        if !(staged && saved) {
            warn!(
                "event=update module=service status=not_saved kind={} id={}",
                E::KIND,
                id
            );
            return Ok(None);
        }

        info!(
            "event=update module=service status=ok kind={} id={}",
            E::KIND,
            id
        );
        Ok(Some(self.repository.get_one(id).await?))
    }

    /// Soft-deletes row `id` and its loaded owned graph.
    pub async fn delete(&self, id: E::Key) -> ServiceResult<bool> {
        let staged = self.repository.delete(id.clone()).await?;
        let saved = self.repository.save_changes().await?;
        info!(
            "event=delete module=service status={} kind={} id={}",
            if staged && saved { "ok" } else { "not_saved" },
            E::KIND,
            id
        );
        Ok(staged && saved)
    }

    fn map(&self, candidate: &E, target: &mut E) -> ServiceResult<()> {
        let mapper = self.scope.mapper();
        map_onto(mapper, candidate, target)?;
        for relation in &self.children {
            relation.reconcile(mapper, candidate, target)?;
        }
        Ok(())
    }

    async fn validate(&self, target: &E) -> ServiceResult<()> {
        let messages = self.rules.validate(target, self.scope.session()).await?;
        if messages.is_empty() {
            return Ok(());
        }

        warn!(
            "event=validate module=service status=rejected kind={} failures={}",
            E::KIND,
            messages.len()
        );
        Err(ValidationFailure::new(messages).into())
    }
}
