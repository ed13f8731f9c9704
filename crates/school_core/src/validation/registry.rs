//! Startup-populated registry of rule sets, one per entity type.

use crate::model::entity::Entity;
use crate::validation::chain::RuleSet;
use log::{info, warn};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Rule sets keyed by entity type.
///
/// Populate it once at startup, then share it; services resolve their rule
/// set on construction.
#[derive(Default)]
pub struct RuleRegistry {
    sets: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the rules of `E`, replacing any earlier declaration.
    pub fn register<E: Entity>(&mut self, declare: impl FnOnce(&mut RuleSet<E>)) -> &mut Self {
        let mut rules = RuleSet::new();
        declare(&mut rules);
        info!(
            "event=rules_register module=validation status=ok kind={} chains={}",
            E::KIND,
            rules.chains().len()
        );

        if self
            .sets
            .insert(TypeId::of::<E>(), Arc::new(rules))
            .is_some()
        {
            warn!(
                "event=rules_register module=validation status=replaced kind={}",
                E::KIND
            );
        }
        self
    }

    /// Rule set of `E`; an empty set when nothing was registered.
    pub fn rules_for<E: Entity>(&self) -> Arc<RuleSet<E>> {
        self.sets
            .get(&TypeId::of::<E>())
            .cloned()
            .and_then(|rules| rules.downcast::<RuleSet<E>>().ok())
            .unwrap_or_default()
    }

    pub fn contains<E: Entity>(&self) -> bool {
        self.sets.contains_key(&TypeId::of::<E>())
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("entity_types", &self.sets.len())
            .finish()
    }
}
