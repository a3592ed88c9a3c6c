//! Property-based test generators using proptest.
//!
//! Operations address a small fixed pool of entities by slot so that
//! generated sequences hit the same keys often enough to exercise
//! coalescing. Replaying skips operations that do not fit the current
//! state, so every recorded change set is valid.

use crate::fixtures::{Person, PersonProps};
use proptest::prelude::*;
use shardgraph_core::{
    Collection, CollectionChangeSet, CollectionRead, CollectionWrite, CoreResult, Entity, EntityId,
    Relation, RelationChangeSet, RelationKind, RelationRead, RelationWrite, TrackedCollection,
    TrackedRelation,
};

/// Strategy for generating entity ids.
pub fn entity_id_strategy() -> impl Strategy<Value = EntityId> {
    prop::array::uniform16(any::<u8>()).prop_map(EntityId::from_bytes)
}

/// A pool of `size` distinct persons with stable ids.
pub fn person_pool(size: usize) -> Vec<Person> {
    (0..size)
        .map(|slot| {
            let mut bytes = [0u8; 16];
            bytes[..8].copy_from_slice(&(slot as u64).to_be_bytes());
            Person::from_id(EntityId::from_bytes(bytes))
        })
        .collect()
}

/// Strategy for person records.
pub fn person_props_strategy() -> impl Strategy<Value = PersonProps> {
    (
        "[A-Z][a-z]{0,7}",
        0i64..120,
        prop::option::of("[a-z]{1,6}"),
    )
        .prop_map(|(name, age, nickname)| PersonProps {
            name,
            age,
            nickname,
        })
}

/// One collection operation on a pool slot.
#[derive(Debug, Clone)]
pub enum PersonOp {
    /// Add the slot's person if absent.
    Add {
        /// Pool slot.
        slot: usize,
        /// Initial record.
        props: PersonProps,
    },
    /// Replace the slot's record if present.
    Modify {
        /// Pool slot.
        slot: usize,
        /// New record.
        props: PersonProps,
    },
    /// Remove the slot's person if present.
    Remove {
        /// Pool slot.
        slot: usize,
    },
}

/// Strategy for operations over `slots` pool slots.
pub fn person_op_strategy(slots: usize) -> impl Strategy<Value = PersonOp> {
    prop_oneof![
        3 => (0..slots, person_props_strategy())
            .prop_map(|(slot, props)| PersonOp::Add { slot, props }),
        2 => (0..slots, person_props_strategy())
            .prop_map(|(slot, props)| PersonOp::Modify { slot, props }),
        2 => (0..slots).prop_map(|slot| PersonOp::Remove { slot }),
    ]
}

/// Strategy for a sequence of collection operations.
pub fn person_ops_strategy(
    slots: usize,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<PersonOp>> {
    prop::collection::vec(person_op_strategy(slots), min_ops..max_ops)
}

/// Replays `ops` on `target` and returns the recorded net changes.
///
/// # Errors
///
/// Propagates coalescing failures, which indicate an engine bug.
pub fn replay_person_ops(
    ops: &[PersonOp],
    pool: &[Person],
    target: &mut Collection<Person, PersonProps>,
) -> CoreResult<CollectionChangeSet<Person, PersonProps>> {
    let mut changes = CollectionChangeSet::new("persons");
    let mut tracked = TrackedCollection::new(target, &mut changes);
    for op in ops {
        match op {
            PersonOp::Add { slot, props } => {
                let Some(&person) = pool.get(*slot) else { continue };
                if !tracked.contains(person) {
                    tracked.insert(person, props.clone())?;
                }
            }
            PersonOp::Modify { slot, props } => {
                let Some(&person) = pool.get(*slot) else { continue };
                if tracked.contains(person) {
                    tracked.replace(person, props.clone())?;
                }
            }
            PersonOp::Remove { slot } => {
                let Some(&person) = pool.get(*slot) else { continue };
                if tracked.contains(person) {
                    tracked.remove(person)?;
                }
            }
        }
    }
    Ok(changes)
}

/// One relation operation on a pair of pool slots.
#[derive(Debug, Clone, Copy)]
pub enum FriendOp {
    /// Link the pair if unlinked.
    Link(usize, usize),
    /// Unlink the pair if linked.
    Unlink(usize, usize),
}

/// Strategy for relation operations over `slots` pool slots.
pub fn friend_op_strategy(slots: usize) -> impl Strategy<Value = FriendOp> {
    prop_oneof![
        (0..slots, 0..slots).prop_map(|(p, c)| FriendOp::Link(p, c)),
        (0..slots, 0..slots).prop_map(|(p, c)| FriendOp::Unlink(p, c)),
    ]
}

/// Strategy for a sequence of relation operations.
pub fn friend_ops_strategy(
    slots: usize,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<FriendOp>> {
    prop::collection::vec(friend_op_strategy(slots), min_ops..max_ops)
}

/// An empty one-to-many friendship relation.
pub fn empty_friends() -> Relation<Person, Person> {
    Relation::new(RelationKind::OneToMany)
}

/// Replays `ops` on `target` and returns the recorded net changes.
///
/// # Errors
///
/// Propagates coalescing failures, which indicate an engine bug.
pub fn replay_friend_ops(
    ops: &[FriendOp],
    pool: &[Person],
    target: &mut Relation<Person, Person>,
) -> CoreResult<RelationChangeSet<Person, Person>> {
    let mut changes = RelationChangeSet::new("friends");
    let mut tracked = TrackedRelation::new(target, &mut changes);
    for op in ops {
        let (FriendOp::Link(p, c) | FriendOp::Unlink(p, c)) = *op;
        let (Some(&parent), Some(&child)) = (pool.get(p), pool.get(c)) else {
            continue;
        };
        let linked = tracked.are_linked(parent, child);
        match op {
            FriendOp::Link(..) if !linked => tracked.add(parent, child)?,
            FriendOp::Unlink(..) if linked => tracked.remove(parent, child)?,
            _ => {}
        }
    }
    Ok(changes)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
