//! Change-recording decorators.
//!
//! A tracked structure forwards every call to the wrapped structure and,
//! once the mutation succeeded, appends the equivalent record to a change
//! set. Commands only ever see tracked structures, so the change set of a
//! command is exactly what it did.

use crate::changes::{CollectionChange, CollectionChangeSet, RelationChange, RelationChangeSet};
use crate::collection::{Collection, CollectionRead, CollectionWrite};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::properties::Properties;
use crate::relation::{Relation, RelationRead, RelationWrite};
use shardgraph_storage::RelationKind;

/// A collection that records its mutations.
///
/// # Example
///
/// ```rust,ignore
/// let mut changes = CollectionChangeSet::new("persons");
/// let mut persons = TrackedCollection::new(&mut collection, &mut changes);
/// let ada = persons.add(PersonProps::new("Ada", 36))?;
/// assert_eq!(changes.len(), 1);
/// ```
pub struct TrackedCollection<'a, E, P, C> {
    inner: &'a mut C,
    changes: &'a mut CollectionChangeSet<E, P>,
}

impl<'a, E: Entity, P: Properties, C: CollectionWrite<E, P>> TrackedCollection<'a, E, P, C> {
    /// Wraps `inner`, recording into `changes`.
    pub fn new(inner: &'a mut C, changes: &'a mut CollectionChangeSet<E, P>) -> Self {
        Self { inner, changes }
    }

    /// The change set being recorded into.
    pub fn changes(&self) -> &CollectionChangeSet<E, P> {
        self.changes
    }
}

impl<E: Entity, P: Properties, C: CollectionWrite<E, P>> CollectionRead<E, P>
    for TrackedCollection<'_, E, P, C>
{
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

impl<E: Entity, P: Properties, C: CollectionWrite<E, P>> CollectionWrite<E, P>
    for TrackedCollection<'_, E, P, C>
{
    fn insert(&mut self, entity: E, props: P) -> CoreResult<()> {
        self.inner.insert(entity, props.clone())?;
        self.changes.push(CollectionChange::Add { entity, new: props })
    }

    fn replace(&mut self, entity: E, props: P) -> CoreResult<P> {
        let old = self.inner.get(entity)?.clone();
        if old == props {
            return Ok(old);
        }
        self.inner.replace(entity, props.clone())?;
        self.changes.push(CollectionChange::Modify {
            entity,
            old: old.clone(),
            new: props,
        })?;
        Ok(old)
    }

    fn remove(&mut self, entity: E) -> CoreResult<P> {
        let old = self.inner.remove(entity)?;
        self.changes.push(CollectionChange::Remove {
            entity,
            old: old.clone(),
        })?;
        Ok(old)
    }

    fn copy(&self) -> CoreResult<Collection<E, P>> {
        Err(CoreError::TrackedCopy)
    }
}

/// A relation that records its mutations.
pub struct TrackedRelation<'a, PE, CE, R> {
    inner: &'a mut R,
    changes: &'a mut RelationChangeSet<PE, CE>,
}

impl<'a, PE: Entity, CE: Entity, R: RelationWrite<PE, CE>> TrackedRelation<'a, PE, CE, R> {
    /// Wraps `inner`, recording into `changes`.
    pub fn new(inner: &'a mut R, changes: &'a mut RelationChangeSet<PE, CE>) -> Self {
        Self { inner, changes }
    }

    /// The change set being recorded into.
    pub fn changes(&self) -> &RelationChangeSet<PE, CE> {
        self.changes
    }
}

impl<PE: Entity, CE: Entity, R: RelationWrite<PE, CE>> RelationRead<PE, CE>
    for TrackedRelation<'_, PE, CE, R>
{
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

impl<PE: Entity, CE: Entity, R: RelationWrite<PE, CE>> RelationWrite<PE, CE>
    for TrackedRelation<'_, PE, CE, R>
{
    fn add(&mut self, parent: PE, child: CE) -> CoreResult<()> {
        self.inner.add(parent, child)?;
        self.changes.push(RelationChange::Link { parent, child })
    }

    fn remove(&mut self, parent: PE, child: CE) -> CoreResult<()> {
        self.inner.remove(parent, child)?;
        self.changes.push(RelationChange::Unlink { parent, child })
    }

    fn copy(&self) -> CoreResult<Relation<PE, CE>> {
        Err(CoreError::TrackedCopy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Item, ItemProps};

    fn props(label: &str) -> ItemProps {
        ItemProps {
            label: label.to_string(),
        }
    }

    #[test]
    fn mutations_are_recorded() {
        let mut items = Collection::<Item, ItemProps>::new();
        let mut changes = CollectionChangeSet::new("items");
        let mut tracked = TrackedCollection::new(&mut items, &mut changes);
        let a = tracked.add(props("a")).unwrap();
        let b = tracked.add(props("b")).unwrap();
        tracked.modify(a, |_| props("a2")).unwrap();
        tracked.remove(b).unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes.record_for(a),
            Some(&CollectionChange::Add {
                entity: a,
                new: props("a2")
            })
        );
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn equal_modify_records_nothing() {
        let mut items = Collection::<Item, ItemProps>::new();
        let a = items.add(props("a")).unwrap();
        let mut changes = CollectionChangeSet::new("items");
        let mut tracked = TrackedCollection::new(&mut items, &mut changes);
        tracked.modify(a, |p| p.clone()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn failed_mutation_records_nothing() {
        let mut items = Collection::<Item, ItemProps>::new();
        let mut changes = CollectionChangeSet::new("items");
        let mut tracked = TrackedCollection::new(&mut items, &mut changes);
        assert!(tracked.remove(Item::generate()).is_err());
        assert!(changes.is_empty());
    }

    #[test]
    fn copy_is_refused() {
        let mut items = Collection::<Item, ItemProps>::new();
        let mut changes = CollectionChangeSet::new("items");
        let tracked = TrackedCollection::new(&mut items, &mut changes);
        assert!(matches!(tracked.copy(), Err(CoreError::TrackedCopy)));

        let mut relation = Relation::<Item, Item>::new(RelationKind::OneToMany);
        let mut links = RelationChangeSet::new("links");
        let tracked = TrackedRelation::new(&mut relation, &mut links);
        assert!(matches!(tracked.copy(), Err(CoreError::TrackedCopy)));
    }

    #[test]
    fn relation_changes_are_recorded() {
        let (p, c) = (Item::generate(), Item::generate());
        let mut relation = Relation::<Item, Item>::new(RelationKind::OneToOne);
        let mut links = RelationChangeSet::new("links");
        let mut tracked = TrackedRelation::new(&mut relation, &mut links);
        tracked.add(p, c).unwrap();
        assert!(tracked.are_linked(p, c));
        assert!(tracked.add(p, Item::generate()).is_err());
        assert_eq!(links.len(), 1);
    }
}
