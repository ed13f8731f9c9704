//! Validation rule variants and their evaluation.

use crate::db::rows::Graph;
use crate::db::{Session, StoreResult, Visibility};
use crate::model::entity::{predicate, Entity, Predicate};
use futures::future::BoxFuture;
use std::sync::Arc;

/// Builds a failure message from the candidate entity.
pub type MessageFn<E> = Arc<dyn Fn(&E) -> String + Send + Sync>;

/// Predicate resolved asynchronously.
pub type AsyncPredicate<E> = Arc<dyn Fn(&E) -> BoxFuture<'static, bool> + Send + Sync>;

/// Compares the accessed property of two entities.
pub type SameValueFn<E> = Arc<dyn Fn(&E, &E) -> bool + Send + Sync>;

/// Text form of a referenced key, `None` when nothing is referenced.
pub type KeyFn<E> = Arc<dyn Fn(&E) -> Option<String> + Send + Sync>;

/// One rule of a property chain.
pub enum Rule<E> {
    Mandatory {
        missing: Predicate<E>,
        condition: Option<Predicate<E>>,
        message: Option<MessageFn<E>>,
    },
    Duplicate {
        missing: Predicate<E>,
        same_value: SameValueFn<E>,
        filter: Option<Predicate<E>>,
        message: Option<MessageFn<E>>,
    },
    Custom {
        check: Predicate<E>,
        message: MessageFn<E>,
    },
    CustomAsync {
        check: AsyncPredicate<E>,
        message: MessageFn<E>,
    },
    ForeignKey {
        kind: &'static str,
        key: KeyFn<E>,
        message: Option<MessageFn<E>>,
    },
}

impl<E: Entity> Rule<E> {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mandatory { .. } => "mandatory",
            Self::Duplicate { .. } => "duplicate",
            Self::Custom { .. } => "custom",
            Self::CustomAsync { .. } => "custom_async",
            Self::ForeignKey { .. } => "foreign_key",
        }
    }

    pub(crate) fn set_message(&mut self, producer: MessageFn<E>) {
        match self {
            Self::Mandatory { message, .. }
            | Self::Duplicate { message, .. }
            | Self::ForeignKey { message, .. } => *message = Some(producer),
            Self::Custom { message, .. } | Self::CustomAsync { message, .. } => *message = producer,
        }
    }

    /// Evaluates the rule; returns the failure message when it does not hold.
    pub async fn check(
        &self,
        caption: &str,
        entity: &E,
        session: &Session,
    ) -> StoreResult<Option<String>> {
        let failed = match self {
            Self::Mandatory {
                missing, condition, ..
            } => condition.as_ref().map_or(true, |applies| applies(entity)) && missing(entity),
            Self::Duplicate {
                missing,
                same_value,
                filter,
                ..
            } => !missing(entity) && has_duplicate(entity, same_value, filter, session).await?,
            Self::Custom { check, .. } => !check(entity),
            Self::CustomAsync { check, .. } => !check(entity).await,
            Self::ForeignKey { kind, key, .. } => match key(entity) {
                Some(id) => !session.key_exists(*kind, id).await?,
                None => true,
            },
        };

        Ok(failed.then(|| self.message(caption, entity)))
    }

    fn message(&self, caption: &str, entity: &E) -> String {
        match self {
            Self::Mandatory { message, .. } => message
                .as_ref()
                .map_or_else(|| format!("{caption} is required."), |produce| produce(entity)),
            Self::Duplicate { message, .. } => message.as_ref().map_or_else(
                || format!("{caption} can not be duplicate."),
                |produce| produce(entity),
            ),
            Self::Custom { message, .. } | Self::CustomAsync { message, .. } => message(entity),
            Self::ForeignKey { message, .. } => message.as_ref().map_or_else(
                || format!("Foreign key for {caption} does not exist."),
                |produce| produce(entity),
            ),
        }
    }
}

async fn has_duplicate<E: Entity>(
    entity: &E,
    same_value: &SameValueFn<E>,
    filter: &Option<Predicate<E>>,
    session: &Session,
) -> StoreResult<bool> {
    let candidate = entity.clone();
    let same_value = Arc::clone(same_value);
    let mut predicates = vec![predicate(move |other: &E| {
        other.id() != candidate.id() && same_value(&candidate, other)
    })];
    if let Some(filter) = filter {
        predicates.push(Arc::clone(filter));
    }

    let collisions = session
        .read::<E>(predicates, Visibility::Active, Graph::Scalars, Some(1))
        .await?;
    Ok(!collisions.is_empty())
}

impl<E> std::fmt::Debug for Rule<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Mandatory { .. } => "Mandatory",
            Self::Duplicate { .. } => "Duplicate",
            Self::Custom { .. } => "Custom",
            Self::CustomAsync { .. } => "CustomAsync",
            Self::ForeignKey { .. } => "ForeignKey",
        };
        f.write_str(name)
    }
}
