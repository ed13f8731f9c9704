//! Property chains, rule sets and the fluent declaration builder.

use crate::db::{Session, StoreResult};
use crate::model::entity::{Entity, Predicate};
use crate::model::key::EntityKey;
use crate::validation::rule::{MessageFn, Rule};
use crate::validation::value::{KeyOf, Presence};
use futures::future::join_all;
use futures::FutureExt;
use log::debug;
use std::future::Future;
use std::sync::Arc;

/// Ordered rules bound to one property.
pub struct PropertyChain<E> {
    name: &'static str,
    caption: String,
    rules: Vec<Rule<E>>,
}

impl<E: Entity> PropertyChain<E> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            caption: humanize(name),
            rules: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn rules(&self) -> &[Rule<E>] {
        &self.rules
    }

    /// Runs the rules in declaration order and stops at the first failure.
    pub async fn validate(&self, entity: &E, session: &Session) -> StoreResult<Option<String>> {
        for rule in &self.rules {
            if let Some(message) = rule.check(&self.caption, entity, session).await? {
                debug!(
                    "event=rule_failed module=validation kind={} property={} rule={}",
                    E::KIND,
                    self.name,
                    rule.label()
                );
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}

/// All property chains declared for one entity type.
pub struct RuleSet<E> {
    chains: Vec<PropertyChain<E>>,
}

impl<E> Default for RuleSet<E> {
    fn default() -> Self {
        Self { chains: Vec::new() }
    }
}

impl<E: Entity> RuleSet<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts or continues the chain of property `name`.
    ///
    /// `accessor` reads the property from a candidate. Calling this twice with
    /// the same name appends to the existing chain.
    pub fn property<V>(
        &mut self,
        name: &'static str,
        accessor: fn(&E) -> &V,
    ) -> PropertyRules<'_, E, V>
    where
        V: 'static,
    {
        let index = match self.chains.iter().position(|chain| chain.name == name) {
            Some(index) => index,
            None => {
                self.chains.push(PropertyChain::new(name));
                self.chains.len() - 1
            }
        };
        PropertyRules {
            chain: &mut self.chains[index],
            accessor,
        }
    }

    pub fn chains(&self) -> &[PropertyChain<E>] {
        &self.chains
    }

    pub fn is_empty(&self) -> bool {
        self.chains.iter().all(|chain| chain.rules.is_empty())
    }

    /// Runs every chain concurrently and collects all failure messages.
    ///
    /// An empty result means the candidate is valid. Message order across
    /// properties is not defined.
    pub async fn validate(&self, entity: &E, session: &Session) -> StoreResult<Vec<String>> {
        let outcomes = join_all(
            self.chains
                .iter()
                .map(|chain| chain.validate(entity, session)),
        )
        .await;

        let mut messages = Vec::new();
        for outcome in outcomes {
            messages.extend(outcome?);
        }
        Ok(messages)
    }
}

/// Builder handle for one property chain.
pub struct PropertyRules<'a, E, V> {
    chain: &'a mut PropertyChain<E>,
    accessor: fn(&E) -> &V,
}

impl<E: Entity, V: 'static> PropertyRules<'_, E, V> {
    /// Overrides the caption used in default messages.
    pub fn caption(self, caption: impl Into<String>) -> Self {
        self.chain.caption = caption.into();
        self
    }

    /// Fails when the property is missing.
    pub fn mandatory(self) -> Self
    where
        V: Presence,
    {
        self.push_mandatory(None)
    }

    /// Fails when the property is missing and `condition` holds.
    pub fn mandatory_when<F>(self, condition: F) -> Self
    where
        V: Presence,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.push_mandatory(Some(Arc::new(condition)))
    }

    /// Fails when another active row holds the same value.
    pub fn duplicate(self) -> Self
    where
        V: PartialEq + Presence,
    {
        self.push_duplicate(None)
    }

    /// Fails when another active row matching `filter` holds the same value.
    /// Rows reach `filter` without their navigations loaded.
    pub fn duplicate_within<F>(self, filter: F) -> Self
    where
        V: PartialEq + Presence,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.push_duplicate(Some(Arc::new(filter)))
    }

    /// Fails unless `check` holds over the whole candidate.
    pub fn custom<F, M>(self, check: F, message: M) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
        M: Fn(&E) -> String + Send + Sync + 'static,
    {
        self.push(Rule::Custom {
            check: Arc::new(check),
            message: Arc::new(message),
        })
    }

    /// Fails unless the future returned by `check` resolves to `true`.
    pub fn custom_async<F, Fut, M>(self, check: F, message: M) -> Self
    where
        F: Fn(&E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
        M: Fn(&E) -> String + Send + Sync + 'static,
    {
        self.push(Rule::CustomAsync {
            check: Arc::new(move |entity: &E| check(entity).boxed()),
            message: Arc::new(message),
        })
    }

    /// Fails unless an active `R` row keyed by the property value exists.
    pub fn foreign_key<R>(self) -> Self
    where
        R: Entity,
        V: KeyOf<R::Key>,
    {
        let accessor = self.accessor;
        self.push(Rule::ForeignKey {
            kind: R::KIND,
            key: Arc::new(move |entity: &E| {
                accessor(entity)
                    .referenced_key()
                    .map(|key| key.to_column())
            }),
            message: None,
        })
    }

    /// Replaces the message of the rule declared last.
    pub fn with_message<M>(self, message: M) -> Self
    where
        M: Fn(&E) -> String + Send + Sync + 'static,
    {
        if let Some(rule) = self.chain.rules.last_mut() {
            rule.set_message(Arc::new(message) as MessageFn<E>);
        }
        self
    }

    fn push_mandatory(self, condition: Option<Predicate<E>>) -> Self
    where
        V: Presence,
    {
        let accessor = self.accessor;
        self.push(Rule::Mandatory {
            missing: Arc::new(move |entity: &E| accessor(entity).is_missing()),
            condition,
            message: None,
        })
    }

    fn push_duplicate(self, filter: Option<Predicate<E>>) -> Self
    where
        V: PartialEq + Presence,
    {
        let accessor = self.accessor;
        self.push(Rule::Duplicate {
            missing: Arc::new(move |entity: &E| accessor(entity).is_missing()),
            same_value: Arc::new(move |left: &E, right: &E| accessor(left) == accessor(right)),
            filter,
            message: None,
        })
    }

    fn push(self, rule: Rule<E>) -> Self {
        self.chain.rules.push(rule);
        self
    }
}

/// `teacher_id` -> `Teacher id`.
fn humanize(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
