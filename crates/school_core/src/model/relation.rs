//! Statically declared relationship tables.
//!
//! # Responsibility
//! - Describe how an entity reaches its related rows without reflection.
//! - Drive graph loading, graph persistence, cascade and child
//!   reconciliation from one typed declaration per relationship.
//!
//! # Invariants
//! - Navigation fields are `#[serde(skip)]`; related rows live under their own
//!   kind.
//! - `reference` relationships are never written nor cascaded through.

use crate::db::rows::{self, Visibility, WriteOutcome};
use crate::db::tracker::Audit;
use crate::db::StoreResult;
use crate::mapping::{map_onto, MapError, Mapper};
use crate::model::entity::{Entity, TrackedEntity};
use crate::model::key::EntityKey;
use rusqlite::Connection;

/// Which side of the relationship the declaring entity is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// The declaring entity owns the related rows.
    Principal,
    /// The declaring entity holds a foreign key to the related row.
    Dependent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Many,
    One,
}

/// One entry of an entity's relationship table.
pub struct Relation<E> {
    name: &'static str,
    kind: RelationKind,
    cardinality: Cardinality,
    ops: Box<dyn RelationOps<E> + Send + Sync>,
}

impl<E: Entity> Relation<E> {
    /// Principal side of a to-many relationship.
    ///
    /// `foreign_key` names the top-level payload field of `C` holding the
    /// parent key; loads filter on it in SQL.
    pub fn many<C: Entity>(
        name: &'static str,
        foreign_key: &'static str,
        get: fn(&E) -> &Vec<C>,
        get_mut: fn(&mut E) -> &mut Vec<C>,
        set_foreign_key: fn(&mut C, E::Key),
    ) -> Self {
        Self {
            name,
            kind: RelationKind::Principal,
            cardinality: Cardinality::Many,
            ops: Box::new(ManyOps {
                get,
                get_mut,
                foreign_key,
                set_foreign_key,
            }),
        }
    }

    /// Principal side of a to-one relationship.
    pub fn one<C: Entity>(
        name: &'static str,
        foreign_key: &'static str,
        get_mut: fn(&mut E) -> &mut Option<C>,
        set_foreign_key: fn(&mut C, E::Key),
    ) -> Self {
        Self {
            name,
            kind: RelationKind::Principal,
            cardinality: Cardinality::One,
            ops: Box::new(OneOps {
                get_mut,
                foreign_key,
                set_foreign_key,
            }),
        }
    }

    /// Dependent side: `E` points at a principal `P`.
    pub fn reference<P: Entity>(
        name: &'static str,
        foreign_key: fn(&E) -> Option<P::Key>,
        get_mut: fn(&mut E) -> &mut Option<P>,
    ) -> Self {
        Self {
            name,
            kind: RelationKind::Dependent,
            cardinality: Cardinality::One,
            ops: Box::new(ReferenceOps {
                foreign_key,
                get_mut,
            }),
        }
    }
}

impl<E> Relation<E> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_principal(&self) -> bool {
        self.kind == RelationKind::Principal
    }

    /// Whether this relationship can be declared as a reconciled child collection.
    pub fn is_collection(&self) -> bool {
        self.is_principal() && self.cardinality == Cardinality::Many
    }

    pub(crate) fn for_each_loaded(
        &self,
        parent: &mut E,
        visit: &mut dyn FnMut(&mut dyn TrackedEntity),
    ) {
        self.ops.for_each_loaded(parent, visit);
    }

    pub(crate) fn transplant(&self, from: &mut E, to: &mut E) {
        self.ops.transplant(from, to);
    }

    pub(crate) fn load(&self, conn: &Connection, parent: &mut E) -> StoreResult<()> {
        self.ops.load(conn, parent)
    }

    pub(crate) fn persist(
        &self,
        conn: &Connection,
        audit: &Audit,
        parent: &mut E,
    ) -> StoreResult<WriteOutcome> {
        self.ops.persist(conn, audit, parent)
    }

    pub(crate) fn reconcile(
        &self,
        mapper: &dyn Mapper,
        source: &E,
        target: &mut E,
    ) -> Result<(), MapError> {
        self.ops.reconcile(mapper, source, target)
    }
}

impl<E> std::fmt::Debug for Relation<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

trait RelationOps<E> {
    fn for_each_loaded(&self, parent: &mut E, visit: &mut dyn FnMut(&mut dyn TrackedEntity));

    fn transplant(&self, from: &mut E, to: &mut E);

    fn load(&self, conn: &Connection, parent: &mut E) -> StoreResult<()>;

    fn persist(&self, conn: &Connection, audit: &Audit, parent: &mut E)
        -> StoreResult<WriteOutcome>;

    fn reconcile(&self, mapper: &dyn Mapper, source: &E, target: &mut E) -> Result<(), MapError>;
}

struct ManyOps<E: Entity, C> {
    get: fn(&E) -> &Vec<C>,
    get_mut: fn(&mut E) -> &mut Vec<C>,
    foreign_key: &'static str,
    set_foreign_key: fn(&mut C, E::Key),
}

impl<E: Entity, C: Entity> RelationOps<E> for ManyOps<E, C> {
    fn for_each_loaded(&self, parent: &mut E, visit: &mut dyn FnMut(&mut dyn TrackedEntity)) {
        for child in (self.get_mut)(parent).iter_mut() {
            visit(child);
        }
    }

    fn transplant(&self, from: &mut E, to: &mut E) {
        std::mem::swap((self.get_mut)(from), (self.get_mut)(to));
    }

    fn load(&self, conn: &Connection, parent: &mut E) -> StoreResult<()> {
        let mut children = rows::select_owned::<C, E::Key>(conn, self.foreign_key, parent.id())?;
        for child in &mut children {
            rows::load_relations(conn, child)?;
        }
        *(self.get_mut)(parent) = children;
        Ok(())
    }

    fn persist(
        &self,
        conn: &Connection,
        audit: &Audit,
        parent: &mut E,
    ) -> StoreResult<WriteOutcome> {
        let parent_id = parent.id().clone();
        let mut outcome = WriteOutcome::default();
        for child in (self.get_mut)(parent).iter_mut() {
            (self.set_foreign_key)(child, parent_id.clone());
            outcome.merge(rows::write_owned(conn, audit, child)?);
            if outcome.conflict.is_some() {
                break;
            }
        }
        Ok(outcome)
    }

    fn reconcile(&self, mapper: &dyn Mapper, source: &E, target: &mut E) -> Result<(), MapError> {
        let candidates = (self.get)(source);
        let children = (self.get_mut)(target);
        children.retain(|child| !child.is_new());

        for child in children.iter_mut() {
            let kept = candidates
                .iter()
                .any(|candidate| !candidate.is_new() && candidate.id() == child.id());
            if !kept {
                child.record_mut().is_deleted = true;
            }
        }

        for candidate in candidates {
            let matched = if candidate.is_new() {
                None
            } else {
                children
                    .iter()
                    .position(|child| !child.is_new() && child.id() == candidate.id())
            };
            let index = match matched {
                Some(index) => index,
                None => {
                    children.push(C::default());
                    children.len() - 1
                }
            };
            map_onto(mapper, candidate, &mut children[index])?;
        }

        Ok(())
    }
}

struct OneOps<E: Entity, C> {
    get_mut: fn(&mut E) -> &mut Option<C>,
    foreign_key: &'static str,
    set_foreign_key: fn(&mut C, E::Key),
}

impl<E: Entity, C: Entity> RelationOps<E> for OneOps<E, C> {
    fn for_each_loaded(&self, parent: &mut E, visit: &mut dyn FnMut(&mut dyn TrackedEntity)) {
        if let Some(child) = (self.get_mut)(parent).as_mut() {
            visit(child);
        }
    }

    fn transplant(&self, from: &mut E, to: &mut E) {
        std::mem::swap((self.get_mut)(from), (self.get_mut)(to));
    }

    fn load(&self, conn: &Connection, parent: &mut E) -> StoreResult<()> {
        let mut child = rows::select_owned::<C, E::Key>(conn, self.foreign_key, parent.id())?
            .into_iter()
            .next();
        if let Some(child) = child.as_mut() {
            rows::load_relations(conn, child)?;
        }
        *(self.get_mut)(parent) = child;
        Ok(())
    }

    fn persist(
        &self,
        conn: &Connection,
        audit: &Audit,
        parent: &mut E,
    ) -> StoreResult<WriteOutcome> {
        let parent_id = parent.id().clone();
        match (self.get_mut)(parent).as_mut() {
            Some(child) => {
                (self.set_foreign_key)(child, parent_id);
                rows::write_owned(conn, audit, child)
            }
            None => Ok(WriteOutcome::default()),
        }
    }

    fn reconcile(
        &self,
        _mapper: &dyn Mapper,
        _source: &E,
        _target: &mut E,
    ) -> Result<(), MapError> {
        Ok(())
    }
}

struct ReferenceOps<E, P: Entity> {
    foreign_key: fn(&E) -> Option<P::Key>,
    get_mut: fn(&mut E) -> &mut Option<P>,
}

impl<E: Entity, P: Entity> RelationOps<E> for ReferenceOps<E, P> {
    fn for_each_loaded(&self, parent: &mut E, visit: &mut dyn FnMut(&mut dyn TrackedEntity)) {
        if let Some(principal) = (self.get_mut)(parent).as_mut() {
            visit(principal);
        }
    }

    fn transplant(&self, from: &mut E, to: &mut E) {
        std::mem::swap((self.get_mut)(from), (self.get_mut)(to));
    }

    fn load(&self, conn: &Connection, parent: &mut E) -> StoreResult<()> {
        let principal = match (self.foreign_key)(parent) {
            Some(key) if !key.is_zero() => rows::find_entity::<P>(conn, &key, Visibility::Active)?,
            _ => None,
        };
        *(self.get_mut)(parent) = principal;
        Ok(())
    }

    fn persist(
        &self,
        _conn: &Connection,
        _audit: &Audit,
        _parent: &mut E,
    ) -> StoreResult<WriteOutcome> {
        Ok(WriteOutcome::default())
    }

    fn reconcile(
        &self,
        _mapper: &dyn Mapper,
        _source: &E,
        _target: &mut E,
    ) -> Result<(), MapError> {
        Ok(())
    }
}
