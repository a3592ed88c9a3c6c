//! Keyed entity collections.
//!
//! A collection maps each entity to exactly one properties record. The
//! contract is split in two traits so the plain map, the copy-on-write
//! wrapper and the tracking decorator can be used interchangeably:
//! - [`CollectionRead`] for lookups and iteration
//! - [`CollectionWrite`] for mutations

use crate::entity::{Entity, EntityId};
use crate::error::{CoreError, CoreResult};
use crate::properties::Properties;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read access to a collection.
pub trait CollectionRead<E: Entity, P: Properties> {
    /// Returns the properties of `entity`, if present.
    fn try_get(&self, entity: E) -> Option<&P>;

    /// Number of entities.
    fn len(&self) -> usize;

    /// Iterates over `(entity, properties)` in id order.
    ///
    /// The iterator is finite and a new one can be created at any time.
    fn pairs(&self) -> Box<dyn Iterator<Item = (E, &P)> + '_>;

    /// Returns the properties of `entity`.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the entity is absent.
    fn get(&self, entity: E) -> CoreResult<&P> {
        self.try_get(entity)
            .ok_or_else(|| CoreError::key_not_found(E::TYPE_NAME, entity.id()))
    }

    /// Returns true if `entity` is present.
    fn contains(&self, entity: E) -> bool {
        self.try_get(entity).is_some()
    }

    /// Returns true if the collection is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entities in id order.
    fn entities(&self) -> Vec<E> {
        self.pairs().map(|(entity, _)| entity).collect()
    }
}

/// Write access to a collection.
pub trait CollectionWrite<E: Entity, P: Properties>: CollectionRead<E, P> {
    /// Inserts a new entity.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the entity is already present.
    fn insert(&mut self, entity: E, props: P) -> CoreResult<()>;

    /// Replaces the properties of an entity, returning the old ones.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the entity is absent.
    fn replace(&mut self, entity: E, props: P) -> CoreResult<P>;

    /// Removes an entity, returning its properties.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the entity is absent.
    fn remove(&mut self, entity: E) -> CoreResult<P>;

    /// Returns an independent copy of the key map.
    ///
    /// # Errors
    ///
    /// Returns `TrackedCopy` on tracked collections.
    fn copy(&self) -> CoreResult<Collection<E, P>>;

    /// Adds a new entity with a generated id.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` on an id collision.
    fn add(&mut self, props: P) -> CoreResult<E> {
        let entity = E::generate();
        self.insert(entity, props)?;
        Ok(entity)
    }

    /// Adds an entity with a known id, as done when loading.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the id is already present.
    fn add_with_id(&mut self, id: EntityId, props: P) -> CoreResult<E> {
        let entity = E::from_id(id);
        self.insert(entity, props)?;
        Ok(entity)
    }

    /// Replaces the properties of `entity` with the updater's result.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the entity is absent.
    fn modify<F>(&mut self, entity: E, updater: F) -> CoreResult<()>
    where
        Self: Sized,
        F: FnOnce(&P) -> P,
    {
        self.try_modify(entity, |current| Ok(updater(current)))
    }

    /// Like [`modify`](Self::modify) with a fallible updater.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the entity is absent, or the updater's error.
    fn try_modify<F>(&mut self, entity: E, updater: F) -> CoreResult<()>
    where
        Self: Sized,
        F: FnOnce(&P) -> CoreResult<P>,
    {
        let props = updater(self.get(entity)?)?;
        self.replace(entity, props)?;
        Ok(())
    }
}

/// The plain keyed store.
///
/// Properties are held behind `Arc`, so [`copy`](CollectionWrite::copy)
/// duplicates the key map without cloning any record.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<E, P> {
    entries: BTreeMap<E, Arc<P>>,
}

impl<E, P> Default for Collection<E, P> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<E: Entity, P: Properties> Collection<E, P> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every entity.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn unwrap_shared<P: Clone>(props: Arc<P>) -> P {
    Arc::try_unwrap(props).unwrap_or_else(|shared| (*shared).clone())
}

impl<E: Entity, P: Properties> CollectionRead<E, P> for Collection<E, P> {
    fn try_get(&self, entity: E) -> Option<&P> {
        self.entries.get(&entity).map(Arc::as_ref)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn pairs(&self) -> Box<dyn Iterator<Item = (E, &P)> + '_> {
        Box::new(self.entries.iter().map(|(entity, props)| (*entity, props.as_ref())))
    }
}

impl<E: Entity, P: Properties> CollectionWrite<E, P> for Collection<E, P> {
    fn insert(&mut self, entity: E, props: P) -> CoreResult<()> {
        if self.entries.contains_key(&entity) {
            return Err(CoreError::duplicate_key(E::TYPE_NAME, entity.id()));
        }
        self.entries.insert(entity, Arc::new(props));
        Ok(())
    }

    fn replace(&mut self, entity: E, props: P) -> CoreResult<P> {
        let slot = self
            .entries
            .get_mut(&entity)
            .ok_or_else(|| CoreError::key_not_found(E::TYPE_NAME, entity.id()))?;
        let old = std::mem::replace(slot, Arc::new(props));
        Ok(unwrap_shared(old))
    }

    fn remove(&mut self, entity: E) -> CoreResult<P> {
        self.entries
            .remove(&entity)
            .map(unwrap_shared)
            .ok_or_else(|| CoreError::key_not_found(E::TYPE_NAME, entity.id()))
    }

    fn copy(&self) -> CoreResult<Collection<E, P>> {
        Ok(self.clone())
    }
}

impl<E: Entity, P: Properties> FromIterator<(E, P)> for Collection<E, P> {
    fn from_iter<I: IntoIterator<Item = (E, P)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(entity, props)| (entity, Arc::new(props)))
                .collect(),
        }
    }
}
