//! Collection change sets.

use super::record::CollectionChange;
use super::AnyChangeSet;
use crate::collection::CollectionWrite;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::properties::Properties;
use shardgraph_storage::{CollectionDelta, EntityKey, FrameImage, RowChange, ShardSchema};
use std::any::Any;
use std::collections::BTreeMap;

pub(super) enum Coalesced<R> {
    Keep(R),
    Drop,
}

/// Ordered net changes of one collection.
///
/// The set holds at most one record per entity. Pushing a second record for
/// the same entity coalesces both into their net effect:
///
/// | pending | incoming | result |
/// |---|---|---|
/// | Add | Modify | Add(new) |
/// | Modify | Modify | Modify(old, new), dropped if `old == new` |
/// | Add | Remove | dropped |
/// | Modify | Remove | Remove(old) |
/// | Remove | Add | Modify(old, new), dropped if `old == new` |
/// | Add or Modify | Add | `InvalidChangeSequence` |
/// | Remove | Modify or Remove | `InvalidChangeSequence` |
///
/// A coalesced record keeps the position of the pending one.
///
/// Results are net effects against the state before the set, not the last
/// operation. A `Modify` means the entity existed before, so a later
/// `Remove` must still remove it on replay; dropping the record would leave
/// it in place. Identity modifications are dropped so that a set which
/// returns an entity to where it started records nothing, as a tracked
/// `modify` with an equal value does. Both rules keep `invert` followed by
/// `apply` restoring the original collection.
#[derive(Debug, Clone)]
pub struct CollectionChangeSet<E, P> {
    name: &'static str,
    records: BTreeMap<u64, CollectionChange<E, P>>,
    index: BTreeMap<E, u64>,
    next_seq: u64,
}

impl<E: Entity, P: Properties> CollectionChangeSet<E, P> {
    /// Creates an empty set for the collection `name`.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            records: BTreeMap::new(),
            index: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Collection name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns true if the set carries at least one record.
    pub fn has_changes(&self) -> bool {
        !self.is_empty()
    }

    /// Records in order.
    pub fn iter(&self) -> impl Iterator<Item = &CollectionChange<E, P>> {
        self.records.values()
    }

    /// The pending record for `entity`.
    pub fn record_for(&self, entity: E) -> Option<&CollectionChange<E, P>> {
        self.index
            .get(&entity)
            .and_then(|seq| self.records.get(seq))
    }

    /// Appends a record, coalescing it with the pending record of the same
    /// entity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChangeSequence` carrying both records if they cannot
    /// follow each other.
    pub fn push(&mut self, record: CollectionChange<E, P>) -> CoreResult<()> {
        let entity = record.entity();
        let pending = self
            .index
            .get(&entity)
            .and_then(|seq| self.records.get(seq).map(|prior| (*seq, prior)));
        match pending {
            None => self.append(record),
            Some((seq, prior)) => match coalesce(prior, record)? {
                Coalesced::Keep(merged) => {
                    self.records.insert(seq, merged);
                }
                Coalesced::Drop => {
                    self.records.remove(&seq);
                    self.index.remove(&entity);
                }
            },
        }
        Ok(())
    }

    fn append(&mut self, record: CollectionChange<E, P>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(record.entity(), seq);
        self.records.insert(seq, record);
    }

    /// The set that undoes this one: records reversed, each inverted.
    #[must_use]
    pub fn invert(&self) -> Self {
        let mut inverted = Self::new(self.name);
        for record in self.records.values().rev() {
            inverted.append(record.inverted());
        }
        inverted
    }

    /// Folds every record of `later` into a copy of this set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChangeSequence` if a record of `later` cannot follow
    /// the pending one.
    pub fn merge(&self, later: &Self) -> CoreResult<Self> {
        let mut merged = self.clone();
        for record in later.iter() {
            merged.push(record.clone())?;
        }
        Ok(merged)
    }

    /// Replays the records against `target`.
    ///
    /// A `Modify` only overwrites the properties that differ between its old
    /// and new values, so fields changed on the target since the record was
    /// taken are kept.
    ///
    /// # Errors
    ///
    /// Propagates the first failing mutation.
    pub fn apply<C: CollectionWrite<E, P>>(&self, target: &mut C) -> CoreResult<()> {
        for record in self.records.values() {
            match record {
                CollectionChange::Add { entity, new } => target.insert(*entity, new.clone())?,
                CollectionChange::Modify { entity, old, new } => {
                    let patch = old.to_bag().diff(&new.to_bag());
                    target.try_modify(*entity, |current| Ok(current.patched(&patch)?))?;
                }
                CollectionChange::Remove { entity, .. } => {
                    target.remove(*entity)?;
                }
            }
        }
        Ok(())
    }

    /// Erased records in order.
    pub fn to_row_changes(&self) -> Vec<RowChange> {
        self.records
            .values()
            .map(CollectionChange::to_row_change)
            .collect()
    }

    /// Rebuilds a set from erased records.
    ///
    /// # Errors
    ///
    /// Returns a codec error for bags that do not fit `P` and
    /// `InvalidChangeSequence` if the records do not coalesce.
    pub fn from_row_changes(name: &'static str, changes: &[RowChange]) -> CoreResult<Self> {
        let mut set = Self::new(name);
        for change in changes {
            set.push(CollectionChange::from_row_change(change)?)?;
        }
        Ok(set)
    }
}

impl<E: Entity, P: Properties> PartialEq for CollectionChangeSet<E, P> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.records.values().eq(other.records.values())
    }
}

fn coalesce<E: Entity, P: Properties>(
    prior: &CollectionChange<E, P>,
    incoming: CollectionChange<E, P>,
) -> CoreResult<Coalesced<CollectionChange<E, P>>> {
    use CollectionChange::{Add, Modify, Remove};

    match (prior, incoming) {
        (Add { entity, .. }, Modify { new, .. }) => Ok(Coalesced::Keep(Add {
            entity: *entity,
            new,
        })),
        (Modify { entity, old, .. }, Modify { new, .. })
        | (Remove { entity, old }, Add { new, .. }) => {
            if *old == new {
                Ok(Coalesced::Drop)
            } else {
                Ok(Coalesced::Keep(Modify {
                    entity: *entity,
                    old: old.clone(),
                    new,
                }))
            }
        }
        (Add { .. }, Remove { .. }) => Ok(Coalesced::Drop),
        (Modify { entity, old, .. }, Remove { .. }) => Ok(Coalesced::Keep(Remove {
            entity: *entity,
            old: old.clone(),
        })),
        (Add { .. } | Modify { .. }, incoming @ Add { .. }) => Err(
            CoreError::invalid_change_sequence(
                "entity already added",
                prior.to_image(),
                incoming.to_image(),
            ),
        ),
        (Remove { .. }, incoming @ (Modify { .. } | Remove { .. })) => Err(
            CoreError::invalid_change_sequence(
                "entity already removed",
                prior.to_image(),
                incoming.to_image(),
            ),
        ),
    }
}

impl<E: Entity, P: Properties> AnyChangeSet for CollectionChangeSet<E, P> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn touches(&self, key: &EntityKey) -> bool {
        self.index.contains_key(&E::from_key(*key))
    }

    fn boxed_clone(&self) -> Box<dyn AnyChangeSet> {
        Box::new(self.clone())
    }

    fn inverted(&self) -> Box<dyn AnyChangeSet> {
        Box::new(self.invert())
    }

    fn merged(&self, later: &dyn AnyChangeSet) -> CoreResult<Box<dyn AnyChangeSet>> {
        let later = later.as_any().downcast_ref::<Self>().ok_or_else(|| {
            CoreError::type_mismatch(self.name, "merged change sets hold different types")
        })?;
        Ok(Box::new(self.merge(later)?))
    }

    fn eq_dyn(&self, other: &dyn AnyChangeSet) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }

    fn write_image(&self, schema: &ShardSchema, image: &mut FrameImage) -> CoreResult<()> {
        let info = schema
            .collection(self.name)
            .ok_or_else(|| CoreError::unknown_set(format!("{}.{}", schema.name, self.name)))?;
        image.collections.push(CollectionDelta {
            info: *info,
            changes: self.to_row_changes(),
        });
        Ok(())
    }
}
