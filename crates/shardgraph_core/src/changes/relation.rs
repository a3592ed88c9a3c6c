//! Relation change sets.

use super::collection::Coalesced;
use super::record::RelationChange;
use super::AnyChangeSet;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::relation::RelationWrite;
use shardgraph_storage::{EntityKey, FrameImage, LinkChange, RelationDelta, ShardSchema};
use std::any::Any;
use std::collections::BTreeMap;

/// Ordered net changes of one relation.
///
/// At most one record is kept per pair. `Link` after `Unlink` (or the
/// reverse) cancels out; a repeated `Link` or `Unlink` is an
/// `InvalidChangeSequence`.
///
/// A pair that was unlinked and relinked is linked exactly as before the
/// set, so no record is kept. Keeping the `Link` would make replay fail
/// with a duplicate link on the unchanged relation, and its inverse would
/// remove a pair the set never removed.
#[derive(Debug, Clone)]
pub struct RelationChangeSet<PE, CE> {
    name: &'static str,
    records: BTreeMap<u64, RelationChange<PE, CE>>,
    index: BTreeMap<(PE, CE), u64>,
    next_seq: u64,
}

impl<PE: Entity, CE: Entity> RelationChangeSet<PE, CE> {
    /// Creates an empty set for the relation `name`.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            records: BTreeMap::new(),
            index: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Relation name.
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
    pub fn iter(&self) -> impl Iterator<Item = &RelationChange<PE, CE>> {
        self.records.values()
    }

    /// The pending record for a pair.
    pub fn record_for(&self, parent: PE, child: CE) -> Option<&RelationChange<PE, CE>> {
        self.index
            .get(&(parent, child))
            .and_then(|seq| self.records.get(seq))
    }

    /// Appends a record, coalescing it with the pending record of the same
    /// pair.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChangeSequence` for a repeated link or unlink.
    pub fn push(&mut self, record: RelationChange<PE, CE>) -> CoreResult<()> {
        let pair = record.pair();
        let pending = self
            .index
            .get(&pair)
            .and_then(|seq| self.records.get(seq).map(|prior| (*seq, *prior)));
        match pending {
            None => self.append(record),
            Some((seq, prior)) => match coalesce(prior, record)? {
                Coalesced::Keep(merged) => {
                    self.records.insert(seq, merged);
                }
                Coalesced::Drop => {
                    self.records.remove(&seq);
                    self.index.remove(&pair);
                }
            },
        }
        Ok(())
    }

    fn append(&mut self, record: RelationChange<PE, CE>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(record.pair(), seq);
        self.records.insert(seq, record);
    }

    /// The set that undoes this one.
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
    /// Returns `InvalidChangeSequence` on a repeated link or unlink.
    pub fn merge(&self, later: &Self) -> CoreResult<Self> {
        let mut merged = self.clone();
        for record in later.iter() {
            merged.push(*record)?;
        }
        Ok(merged)
    }

    /// Replays the records against `target`.
    ///
    /// # Errors
    ///
    /// Propagates the first failing link or unlink.
    pub fn apply<R: RelationWrite<PE, CE>>(&self, target: &mut R) -> CoreResult<()> {
        for record in self.records.values() {
            match *record {
                RelationChange::Link { parent, child } => target.add(parent, child)?,
                RelationChange::Unlink { parent, child } => target.remove(parent, child)?,
            }
        }
        Ok(())
    }

    /// Erased records in order.
    pub fn to_link_changes(&self) -> Vec<LinkChange> {
        self.records
            .values()
            .map(RelationChange::to_link_change)
            .collect()
    }

    /// Rebuilds a set from erased records.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChangeSequence` if the records do not coalesce.
    pub fn from_link_changes(name: &'static str, changes: &[LinkChange]) -> CoreResult<Self> {
        let mut set = Self::new(name);
        for change in changes {
            set.push(RelationChange::from_link_change(change))?;
        }
        Ok(set)
    }
}

impl<PE: Entity, CE: Entity> PartialEq for RelationChangeSet<PE, CE> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.records.values().eq(other.records.values())
    }
}

fn coalesce<PE: Entity, CE: Entity>(
    prior: RelationChange<PE, CE>,
    incoming: RelationChange<PE, CE>,
) -> CoreResult<Coalesced<RelationChange<PE, CE>>> {
    match (prior, incoming) {
        (RelationChange::Link { .. }, RelationChange::Link { .. }) => Err(
            CoreError::invalid_change_sequence(
                "pair already linked",
                prior.to_image(),
                incoming.to_image(),
            ),
        ),
        (RelationChange::Unlink { .. }, RelationChange::Unlink { .. }) => Err(
            CoreError::invalid_change_sequence(
                "pair already unlinked",
                prior.to_image(),
                incoming.to_image(),
            ),
        ),
        _ => Ok(Coalesced::Drop),
    }
}

impl<PE: Entity, CE: Entity> AnyChangeSet for RelationChangeSet<PE, CE> {
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
        self.index
            .keys()
            .any(|(parent, child)| parent.key() == *key || child.key() == *key)
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
            .relation(self.name)
            .ok_or_else(|| CoreError::unknown_set(format!("{}.{}", schema.name, self.name)))?;
        image.relations.push(RelationDelta {
            info: *info,
            changes: self.to_link_changes(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{Relation, RelationRead};
    use crate::test_support::Item;
    use shardgraph_storage::RelationKind;

    fn link(parent: Item, child: Item) -> RelationChange<Item, Item> {
        RelationChange::Link { parent, child }
    }

    fn unlink(parent: Item, child: Item) -> RelationChange<Item, Item> {
        RelationChange::Unlink { parent, child }
    }

    #[test]
    fn link_then_unlink_cancels() {
        let (p, c) = (Item::generate(), Item::generate());
        let mut set = RelationChangeSet::new("links");
        set.push(link(p, c)).unwrap();
        set.push(unlink(p, c)).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn unlink_then_link_cancels() {
        let (p, c) = (Item::generate(), Item::generate());
        let mut set = RelationChangeSet::new("links");
        set.push(unlink(p, c)).unwrap();
        set.push(link(p, c)).unwrap();
        assert!(set.record_for(p, c).is_none());
    }

    #[test]
    fn repeated_records_fail() {
        let (p, c) = (Item::generate(), Item::generate());
        let mut set = RelationChangeSet::new("links");
        set.push(link(p, c)).unwrap();
        assert!(matches!(
            set.push(link(p, c)),
            Err(CoreError::InvalidChangeSequence { .. })
        ));

        let mut set = RelationChangeSet::new("links");
        set.push(unlink(p, c)).unwrap();
        assert!(set.push(unlink(p, c)).is_err());
    }

    #[test]
    fn invert_twice_is_identity() {
        let (p, a, b) = (Item::generate(), Item::generate(), Item::generate());
        let mut set = RelationChangeSet::new("links");
        set.push(link(p, a)).unwrap();
        set.push(unlink(p, b)).unwrap();
        assert_eq!(
            set.invert().iter().copied().collect::<Vec<_>>(),
            vec![link(p, b), unlink(p, a)]
        );
        assert_eq!(set.invert().invert(), set);
    }

    #[test]
    fn apply_and_restore() {
        let (p, a, b) = (Item::generate(), Item::generate(), Item::generate());
        let mut relation = Relation::<Item, Item>::new(RelationKind::OneToOne);
        relation.add(p, a).unwrap();
        let before = relation.clone();

        let mut set = RelationChangeSet::new("links");
        set.push(unlink(p, a)).unwrap();
        set.push(link(p, b)).unwrap();
        set.apply(&mut relation).unwrap();
        assert!(relation.are_linked(p, b));

        set.invert().apply(&mut relation).unwrap();
        assert_eq!(relation, before);
    }
}
