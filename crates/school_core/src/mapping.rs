//! Scalar field mapping between candidate and persisted entities.
//!
//! # Responsibility
//! - Copy caller-supplied fields onto a target entity.
//! - Keep the target's record; keep its navigations unless it is new, in
//!   which case the source's graph comes along.
//!
//! # Invariants
//! - Identity, audit stamps, tombstone flag and concurrency token of the
//!   target are never taken from the source.

use crate::model::entity::Entity;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to map `{kind}`: {source}")]
    Codec {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{kind}` does not serialize to a JSON object")]
    NotAnObject { kind: &'static str },
    #[error("`{kind}` declares no child collection named `{name}`")]
    UnknownChildCollection { kind: &'static str, name: String },
}

/// Copies fields from a serialized source onto a serialized target.
pub trait Mapper: Send + Sync {
    fn map_fields(&self, source: &Map<String, Value>, target: &mut Map<String, Value>);
}

/// Field-by-field JSON merge skipping a configurable set of names.
#[derive(Debug, Clone, Default)]
pub struct JsonMapper {
    ignored: BTreeSet<String>,
}

impl JsonMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves `field` untouched on the target.
    pub fn ignore(mut self, field: impl Into<String>) -> Self {
        self.ignored.insert(field.into());
        self
    }
}

impl Mapper for JsonMapper {
    fn map_fields(&self, source: &Map<String, Value>, target: &mut Map<String, Value>) {
        for (name, value) in source {
            if self.ignored.contains(name) {
                continue;
            }
            target.insert(name.clone(), value.clone());
        }
    }
}

/// Maps the scalar fields of `source` onto `target`.
///
/// A persisted target keeps its loaded navigations. A new target receives a
/// copy of the source's, so a candidate graph can be inserted in one go.
pub fn map_onto<E: Entity>(mapper: &dyn Mapper, source: &E, target: &mut E) -> Result<(), MapError> {
    let source_fields = to_object(source)?;
    let mut target_fields = to_object(&*target)?;
    mapper.map_fields(&source_fields, &mut target_fields);

    let mut mapped: E =
        serde_json::from_value(Value::Object(target_fields)).map_err(|source| MapError::Codec {
            kind: E::KIND,
            source,
        })?;
    let fresh = target.is_new();
    std::mem::swap(mapped.record_mut(), target.record_mut());
    let mut donor = if fresh {
        source.clone()
    } else {
        std::mem::take(target)
    };
    for relation in E::relations() {
        relation.transplant(&mut donor, &mut mapped);
    }
    *target = mapped;

    Ok(())
}

fn to_object<E: Entity>(entity: &E) -> Result<Map<String, Value>, MapError> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(MapError::NotAnObject { kind: E::KIND }),
        Err(source) => Err(MapError::Codec {
            kind: E::KIND,
            source,
        }),
    }
}
