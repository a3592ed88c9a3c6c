//! Parent/child relations between entities.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use shardgraph_storage::RelationKind;
use std::collections::{BTreeMap, BTreeSet};

/// A directed multimap.
///
/// With `unique` set, each key maps to at most one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping<K, V> {
    entries: BTreeMap<K, BTreeSet<V>>,
    unique: bool,
    len: usize,
}

impl<K: Ord + Copy, V: Ord + Copy> Mapping<K, V> {
    /// Creates an empty mapping.
    pub fn new(unique: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            unique,
            len: 0,
        }
    }

    /// Whether a key may hold more than one value.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Inserts a pair.
    ///
    /// Returns false, leaving the mapping unchanged, if the pair exists or
    /// the mapping is unique and `key` already has a value.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let values = self.entries.entry(key).or_default();
        if values.contains(&value) || (self.unique && !values.is_empty()) {
            return false;
        }
        values.insert(value);
        self.len += 1;
        true
    }

    /// Removes a pair. Returns false if it was absent.
    pub fn remove(&mut self, key: K, value: V) -> bool {
        let Some(values) = self.entries.get_mut(&key) else {
            return false;
        };
        if !values.remove(&value) {
            return false;
        }
        if values.is_empty() {
            self.entries.remove(&key);
        }
        self.len -= 1;
        true
    }

    /// Returns true if the pair is present.
    pub fn contains(&self, key: K, value: V) -> bool {
        self.entries
            .get(&key)
            .is_some_and(|values| values.contains(&value))
    }

    /// Returns true if `key` has at least one value.
    pub fn contains_key(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    /// Values of `key` in order.
    pub fn values(&self, key: K) -> impl Iterator<Item = V> + '_ {
        self.entries.get(&key).into_iter().flatten().copied()
    }

    /// All pairs in `(key, value)` order.
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.entries
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| (*key, *value)))
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Read access to a relation.
pub trait RelationRead<PE: Entity, CE: Entity> {
    /// Multiplicity of the relation.
    fn kind(&self) -> RelationKind;

    /// Returns true if `parent` is linked to `child`.
    fn are_linked(&self, parent: PE, child: CE) -> bool;

    /// Children of `parent`, in id order.
    fn children(&self, parent: PE) -> Box<dyn Iterator<Item = CE> + '_>;

    /// Parents of `child`, in id order.
    fn parents(&self, child: CE) -> Box<dyn Iterator<Item = PE> + '_>;

    /// Returns true if `parent` has at least one child.
    fn contains_parent(&self, parent: PE) -> bool;

    /// Returns true if `child` has at least one parent.
    fn contains_child(&self, child: CE) -> bool;

    /// All pairs in `(parent, child)` order.
    fn pairs(&self) -> Box<dyn Iterator<Item = (PE, CE)> + '_>;

    /// Number of pairs.
    fn len(&self) -> usize;

    /// Returns true if there are no pairs.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write access to a relation.
pub trait RelationWrite<PE: Entity, CE: Entity>: RelationRead<PE, CE> {
    /// Links `parent` to `child`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicatedRelation` if the pair is already linked, or if the
    /// relation is one-to-one and `parent` already has a child.
    fn add(&mut self, parent: PE, child: CE) -> CoreResult<()>;

    /// Unlinks `parent` from `child`.
    ///
    /// # Errors
    ///
    /// Returns `MissingRelation` if the pair is not linked.
    fn remove(&mut self, parent: PE, child: CE) -> CoreResult<()>;

    /// Returns an independent copy.
    ///
    /// # Errors
    ///
    /// Returns `TrackedCopy` on tracked relations.
    fn copy(&self) -> CoreResult<Relation<PE, CE>>;
}

/// Forward and reverse mappings kept in lock-step.
///
/// `(p, c)` is in the forward mapping if and only if `(c, p)` is in the
/// reverse one. The reverse mapping is never unique: in a one-to-one
/// relation a child may still have several parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation<PE, CE> {
    kind: RelationKind,
    forward: Mapping<PE, CE>,
    reverse: Mapping<CE, PE>,
}

impl<PE: Entity, CE: Entity> Relation<PE, CE> {
    /// Creates an empty relation.
    pub fn new(kind: RelationKind) -> Self {
        Self {
            kind,
            forward: Mapping::new(kind == RelationKind::OneToOne),
            reverse: Mapping::new(false),
        }
    }

    /// Removes every pair.
    pub fn clear(&mut self) {
        *self = Self::new(self.kind);
    }
}

impl<PE: Entity, CE: Entity> RelationRead<PE, CE> for Relation<PE, CE> {
    fn kind(&self) -> RelationKind {
        self.kind
    }

    fn are_linked(&self, parent: PE, child: CE) -> bool {
        self.forward.contains(parent, child)
    }

    fn children(&self, parent: PE) -> Box<dyn Iterator<Item = CE> + '_> {
        Box::new(self.forward.values(parent))
    }

    fn parents(&self, child: CE) -> Box<dyn Iterator<Item = PE> + '_> {
        Box::new(self.reverse.values(child))
    }

    fn contains_parent(&self, parent: PE) -> bool {
        self.forward.contains_key(parent)
    }

    fn contains_child(&self, child: CE) -> bool {
        self.reverse.contains_key(child)
    }

    fn pairs(&self) -> Box<dyn Iterator<Item = (PE, CE)> + '_> {
        Box::new(self.forward.iter())
    }

    fn len(&self) -> usize {
        self.forward.len()
    }
}

impl<PE: Entity, CE: Entity> RelationWrite<PE, CE> for Relation<PE, CE> {
    fn add(&mut self, parent: PE, child: CE) -> CoreResult<()> {
        if !self.forward.insert(parent, child) {
            return Err(CoreError::duplicated_relation(parent.id(), child.id()));
        }
        self.reverse.insert(child, parent);
        Ok(())
    }

    fn remove(&mut self, parent: PE, child: CE) -> CoreResult<()> {
        if !self.forward.remove(parent, child) {
            return Err(CoreError::missing_relation(parent.id(), child.id()));
        }
        self.reverse.remove(child, parent);
        Ok(())
    }

    fn copy(&self) -> CoreResult<Relation<PE, CE>> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Item;

    fn items() -> (Item, Item, Item) {
        (Item::generate(), Item::generate(), Item::generate())
    }

    #[test]
    fn one_to_one_rejects_second_child() {
        let (parent, a, b) = items();
        let mut relation = Relation::<Item, Item>::new(RelationKind::OneToOne);
        relation.add(parent, a).unwrap();
        let err = relation.add(parent, b).unwrap_err();
        assert!(matches!(err, CoreError::DuplicatedRelation { .. }));
        assert_eq!(relation.children(parent).collect::<Vec<_>>(), vec![a]);
        assert!(!relation.contains_child(b));
    }

    #[test]
    fn one_to_one_child_may_have_many_parents() {
        let (p1, p2, child) = items();
        let mut relation = Relation::<Item, Item>::new(RelationKind::OneToOne);
        relation.add(p1, child).unwrap();
        relation.add(p2, child).unwrap();
        assert_eq!(relation.parents(child).count(), 2);
    }

    #[test]
    fn duplicate_pair_rejected_for_both_kinds() {
        let (parent, child, _) = items();
        for kind in [RelationKind::OneToOne, RelationKind::OneToMany] {
            let mut relation = Relation::<Item, Item>::new(kind);
            relation.add(parent, child).unwrap();
            assert!(matches!(
                relation.add(parent, child),
                Err(CoreError::DuplicatedRelation { .. })
            ));
            assert_eq!(relation.len(), 1);
        }
    }

    #[test]
    fn remove_missing_pair_fails() {
        let (parent, child, _) = items();
        let mut relation = Relation::<Item, Item>::new(RelationKind::OneToMany);
        assert!(matches!(
            relation.remove(parent, child),
            Err(CoreError::MissingRelation { .. })
        ));
    }

    #[test]
    fn forward_and_reverse_stay_in_step() {
        let (parent, a, b) = items();
        let mut relation = Relation::<Item, Item>::new(RelationKind::OneToMany);
        relation.add(parent, a).unwrap();
        relation.add(parent, b).unwrap();
        relation.remove(parent, a).unwrap();
        assert!(!relation.contains_child(a));
        assert!(relation.contains_child(b));
        assert_eq!(relation.parents(b).collect::<Vec<_>>(), vec![parent]);
        assert_eq!(relation.pairs().collect::<Vec<_>>(), vec![(parent, b)]);

        relation.remove(parent, b).unwrap();
        assert!(!relation.contains_parent(parent));
        assert!(relation.is_empty());
    }

    #[test]
    fn mapping_counts_pairs() {
        let mut mapping = Mapping::<u8, u8>::new(false);
        assert!(mapping.insert(1, 2));
        assert!(mapping.insert(1, 3));
        assert!(!mapping.insert(1, 3));
        assert_eq!(mapping.len(), 2);
        assert!(mapping.remove(1, 2));
        assert!(!mapping.remove(1, 2));
        assert_eq!(mapping.values(1).collect::<Vec<_>>(), vec![3]);
    }
}
