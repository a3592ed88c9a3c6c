//! Per-shard change frames.

use super::{AnyChangeSet, CollectionChangeSet, RelationChangeSet};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::properties::Properties;
use shardgraph_storage::{EntityKey, FrameImage, ShardSchema};

/// The change sets of one shard, one per touched collection or relation.
///
/// Sets are created on first access through
/// [`collection_entry`](Self::collection_entry) or
/// [`relation_entry`](Self::relation_entry) and keep their creation order.
#[derive(Debug)]
pub struct ChangesFrame {
    shard: &'static str,
    sets: Vec<Box<dyn AnyChangeSet>>,
}

impl ChangesFrame {
    /// Creates an empty frame for `shard`.
    pub fn new(shard: &'static str) -> Self {
        Self {
            shard,
            sets: Vec::new(),
        }
    }

    /// Shard name.
    pub fn shard(&self) -> &'static str {
        self.shard
    }

    /// Returns true if any set carries a record.
    pub fn has_changes(&self) -> bool {
        self.sets.iter().any(|set| set.has_changes())
    }

    /// Total number of records.
    pub fn record_count(&self) -> usize {
        self.sets.iter().map(|set| set.len()).sum()
    }

    /// Names of the sets that carry records.
    pub fn changed_sets(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.sets
            .iter()
            .filter(|set| set.has_changes())
            .map(|set| set.name())
    }

    /// Returns true if the named set carries records.
    pub fn set_has_changes(&self, name: &str) -> bool {
        self.find(name).is_some_and(|set| set.has_changes())
    }

    /// Returns true if the named set has a record mentioning `key`.
    pub fn touches(&self, name: &str, key: &EntityKey) -> bool {
        self.find(name).is_some_and(|set| set.touches(key))
    }

    fn find(&self, name: &str) -> Option<&dyn AnyChangeSet> {
        self.sets
            .iter()
            .find(|set| set.name() == name)
            .map(|set| &**set)
    }

    /// The change set of a collection, if it was touched.
    ///
    /// Returns `None` as well when a set of that name holds other types.
    pub fn collection<E: Entity, P: Properties>(
        &self,
        name: &str,
    ) -> Option<&CollectionChangeSet<E, P>> {
        self.find(name)?.as_any().downcast_ref()
    }

    /// The change set of a relation, if it was touched.
    pub fn relation<PE: Entity, CE: Entity>(
        &self,
        name: &str,
    ) -> Option<&RelationChangeSet<PE, CE>> {
        self.find(name)?.as_any().downcast_ref()
    }

    fn entry_index(
        &mut self,
        name: &'static str,
        create: impl FnOnce() -> Box<dyn AnyChangeSet>,
    ) -> usize {
        match self.sets.iter().position(|set| set.name() == name) {
            Some(index) => index,
            None => {
                self.sets.push(create());
                self.sets.len() - 1
            }
        }
    }

    /// The change set of a collection, created if absent.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the set exists with other types.
    pub fn collection_entry<E: Entity, P: Properties>(
        &mut self,
        name: &'static str,
    ) -> CoreResult<&mut CollectionChangeSet<E, P>> {
        let index = self.entry_index(name, || Box::new(CollectionChangeSet::<E, P>::new(name)));
        self.sets[index]
            .as_any_mut()
            .downcast_mut()
            .ok_or_else(|| CoreError::type_mismatch(name, "not a collection of these types"))
    }

    /// The change set of a relation, created if absent.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the set exists with other types.
    pub fn relation_entry<PE: Entity, CE: Entity>(
        &mut self,
        name: &'static str,
    ) -> CoreResult<&mut RelationChangeSet<PE, CE>> {
        let index = self.entry_index(name, || Box::new(RelationChangeSet::<PE, CE>::new(name)));
        self.sets[index]
            .as_any_mut()
            .downcast_mut()
            .ok_or_else(|| CoreError::type_mismatch(name, "not a relation of these types"))
    }

    pub(crate) fn push_set(&mut self, set: Box<dyn AnyChangeSet>) {
        self.sets.push(set);
    }

    /// Drops sets without records.
    pub(crate) fn compact(&mut self) {
        self.sets.retain(|set| set.has_changes());
    }

    /// The frame that undoes this one.
    #[must_use]
    pub fn invert(&self) -> Self {
        Self {
            shard: self.shard,
            sets: self.sets.iter().rev().map(|set| set.inverted()).collect(),
        }
    }

    /// Folds `later` into a copy of this frame, set by set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChangeSequence` if records do not coalesce and
    /// `TypeMismatch` if two sets of the same name hold different types.
    pub fn merge(&self, later: &ChangesFrame) -> CoreResult<Self> {
        let mut merged = self.clone();
        for set in &later.sets {
            match merged.sets.iter().position(|own| own.name() == set.name()) {
                Some(index) => merged.sets[index] = merged.sets[index].merged(&**set)?,
                None => merged.sets.push(set.boxed_clone()),
            }
        }
        Ok(merged)
    }

    /// Erased form for persistence.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSet` if a set is missing from `schema`.
    pub fn to_image(&self, schema: &ShardSchema) -> CoreResult<FrameImage> {
        let mut image = FrameImage::new(schema.name);
        for set in self.sets.iter().filter(|set| set.has_changes()) {
            set.write_image(schema, &mut image)?;
        }
        Ok(image)
    }
}

impl Clone for ChangesFrame {
    fn clone(&self) -> Self {
        Self {
            shard: self.shard,
            sets: self.sets.iter().map(|set| set.boxed_clone()).collect(),
        }
    }
}

/// Frames are equal when they carry the same non-empty sets with the same
/// records, regardless of set order.
impl PartialEq for ChangesFrame {
    fn eq(&self, other: &Self) -> bool {
        let changed = |frame: &ChangesFrame| frame.sets.iter().filter(|s| s.has_changes()).count();
        self.shard == other.shard
            && changed(self) == changed(other)
            && self
                .sets
                .iter()
                .filter(|set| set.has_changes())
                .all(|set| other.find(set.name()).is_some_and(|o| set.eq_dyn(o)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{CollectionChange, RelationChange};
    use crate::test_support::{Item, ItemProps};

    fn add(entity: Item) -> CollectionChange<Item, ItemProps> {
        CollectionChange::Add {
            entity,
            new: ItemProps {
                label: "x".to_string(),
            },
        }
    }

    #[test]
    fn entries_are_created_once() {
        let mut frame = ChangesFrame::new("shop");
        let x = Item::generate();
        frame
            .collection_entry::<Item, ItemProps>("items")
            .unwrap()
            .push(add(x))
            .unwrap();
        assert_eq!(
            frame.collection_entry::<Item, ItemProps>("items").unwrap().len(),
            1
        );
        assert!(frame.set_has_changes("items"));
        assert_eq!(frame.changed_sets().collect::<Vec<_>>(), vec!["items"]);
    }

    #[test]
    fn wrong_types_are_rejected() {
        let mut frame = ChangesFrame::new("shop");
        frame.collection_entry::<Item, ItemProps>("items").unwrap();
        assert!(matches!(
            frame.relation_entry::<Item, Item>("items"),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(frame.relation::<Item, Item>("items").is_none());
    }

    #[test]
    fn merge_and_invert() {
        let (x, p) = (Item::generate(), Item::generate());
        let mut first = ChangesFrame::new("shop");
        first
            .collection_entry::<Item, ItemProps>("items")
            .unwrap()
            .push(add(x))
            .unwrap();
        let mut second = ChangesFrame::new("shop");
        second
            .relation_entry::<Item, Item>("links")
            .unwrap()
            .push(RelationChange::Link { parent: p, child: x })
            .unwrap();

        let merged = first.merge(&second).unwrap();
        assert_eq!(merged.record_count(), 2);
        assert_eq!(merged.invert().invert(), merged);

        let undone = merged.merge(&merged.invert()).unwrap();
        assert!(!undone.has_changes());
    }

    #[test]
    fn equality_ignores_empty_sets() {
        let mut a = ChangesFrame::new("shop");
        a.collection_entry::<Item, ItemProps>("items").unwrap();
        let b = ChangesFrame::new("shop");
        assert_eq!(a, b);
        a.compact();
        assert_eq!(a.changed_sets().count(), 0);
    }

    #[test]
    fn touches_by_key() {
        let x = Item::generate();
        let mut frame = ChangesFrame::new("shop");
        frame
            .collection_entry::<Item, ItemProps>("items")
            .unwrap()
            .push(add(x))
            .unwrap();
        assert!(frame.touches("items", &x.key()));
        assert!(!frame.touches("items", &Item::generate().key()));
    }
}
