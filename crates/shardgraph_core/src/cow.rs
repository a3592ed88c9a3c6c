//! Copy-on-write shard members.
//!
//! A shard is a plain struct of [`CowCollection`]s and [`CowRelation`]s.
//! Cloning a shard only clones their `Arc`s, so forking a shard for a
//! command is cheap and every structure the command does not mutate stays
//! shared with the published model.

use crate::collection::{Collection, CollectionRead, CollectionWrite};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::properties::Properties;
use crate::relation::{Relation, RelationRead, RelationWrite};
use shardgraph_storage::RelationKind;
use std::sync::Arc;
use tracing::trace;

/// A named collection shared until first mutation.
#[derive(Debug, PartialEq)]
pub struct CowCollection<E, P> {
    name: &'static str,
    inner: Arc<Collection<E, P>>,
}

impl<E: Entity, P: Properties> CowCollection<E, P> {
    /// Creates an empty collection.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Collection::new()),
        }
    }

    /// Collection name within its shard.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The shared structure.
    pub fn storage(&self) -> &Arc<Collection<E, P>> {
        &self.inner
    }

    /// Returns true if both wrappers share the same structure.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn make_mut(&mut self) -> &mut Collection<E, P> {
        if Arc::strong_count(&self.inner) > 1 {
            trace!(collection = self.name, "forking collection");
        }
        Arc::make_mut(&mut self.inner)
    }
}

impl<E, P> Clone for CowCollection<E, P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity, P: Properties> CollectionRead<E, P> for CowCollection<E, P> {
    fn try_get(&self, entity: E) -> Option<&P> {
        self.inner.try_get(entity)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn pairs(&self) -> Box<dyn Iterator<Item = (E, &P)> + '_> {
        self.inner.pairs()
    }
}

// Preconditions are checked on the shared structure so a failing call
// never forks.
impl<E: Entity, P: Properties> CollectionWrite<E, P> for CowCollection<E, P> {
    fn insert(&mut self, entity: E, props: P) -> CoreResult<()> {
        if self.contains(entity) {
            return Err(CoreError::duplicate_key(E::TYPE_NAME, entity.id()));
        }
        self.make_mut().insert(entity, props)
    }

    fn replace(&mut self, entity: E, props: P) -> CoreResult<P> {
        self.get(entity)?;
        self.make_mut().replace(entity, props)
    }

    fn remove(&mut self, entity: E) -> CoreResult<P> {
        self.get(entity)?;
        self.make_mut().remove(entity)
    }

    fn copy(&self) -> CoreResult<Collection<E, P>> {
        self.inner.copy()
    }
}

/// A named relation shared until first mutation.
#[derive(Debug, PartialEq)]
pub struct CowRelation<PE, CE> {
    name: &'static str,
    inner: Arc<Relation<PE, CE>>,
}

impl<PE: Entity, CE: Entity> CowRelation<PE, CE> {
    /// Creates an empty relation.
    pub fn new(name: &'static str, kind: RelationKind) -> Self {
        Self {
            name,
            inner: Arc::new(Relation::new(kind)),
        }
    }

    /// Relation name within its shard.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The shared structure.
    pub fn storage(&self) -> &Arc<Relation<PE, CE>> {
        &self.inner
    }

    /// Returns true if both wrappers share the same structure.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn make_mut(&mut self) -> &mut Relation<PE, CE> {
        if Arc::strong_count(&self.inner) > 1 {
            trace!(relation = self.name, "forking relation");
        }
        Arc::make_mut(&mut self.inner)
    }
}

impl<PE, CE> Clone for CowRelation<PE, CE> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<PE: Entity, CE: Entity> RelationRead<PE, CE> for CowRelation<PE, CE> {
    fn kind(&self) -> RelationKind {
        self.inner.kind()
    }

    fn are_linked(&self, parent: PE, child: CE) -> bool {
        self.inner.are_linked(parent, child)
    }

    fn children(&self, parent: PE) -> Box<dyn Iterator<Item = CE> + '_> {
        self.inner.children(parent)
    }

    fn parents(&self, child: CE) -> Box<dyn Iterator<Item = PE> + '_> {
        self.inner.parents(child)
    }

    fn contains_parent(&self, parent: PE) -> bool {
        self.inner.contains_parent(parent)
    }

    fn contains_child(&self, child: CE) -> bool {
        self.inner.contains_child(child)
    }

    fn pairs(&self) -> Box<dyn Iterator<Item = (PE, CE)> + '_> {
        self.inner.pairs()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<PE: Entity, CE: Entity> RelationWrite<PE, CE> for CowRelation<PE, CE> {
    fn add(&mut self, parent: PE, child: CE) -> CoreResult<()> {
        let taken = self.kind() == RelationKind::OneToOne && self.contains_parent(parent);
        if taken || self.are_linked(parent, child) {
            return Err(CoreError::duplicated_relation(parent.id(), child.id()));
        }
        self.make_mut().add(parent, child)
    }

    fn remove(&mut self, parent: PE, child: CE) -> CoreResult<()> {
        if !self.are_linked(parent, child) {
            return Err(CoreError::missing_relation(parent.id(), child.id()));
        }
        self.make_mut().remove(parent, child)
    }

    fn copy(&self) -> CoreResult<Relation<PE, CE>> {
        self.inner.copy()
    }
}
