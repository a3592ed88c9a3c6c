//! Change notification.
//!
//! Subscribers are called synchronously after every published commit, in
//! subscription order, with the old and new models and the committed
//! changes. A subscription is scoped to all changes, one shard, one
//! collection or relation, or one entity within a collection.

use crate::changes::ModelChanges;
use crate::entity::Entity;
use crate::error::{CommandError, CoreError, CoreResult};
use crate::model::Model;
use crate::properties::Properties;
use crate::shard::Shard;
use parking_lot::RwLock;
use shardgraph_storage::EntityKey;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Payload delivered to subscribers.
#[derive(Debug, Clone)]
pub struct ModelChangedEvent {
    /// Model before the commit.
    pub old: Arc<Model>,
    /// Model after the commit.
    pub new: Arc<Model>,
    /// Net changes of the commit.
    pub changes: Arc<ModelChanges>,
}

/// A subscriber callback.
///
/// Identity is the `Arc` pointer: subscribing a clone of the same `Arc` to
/// the same scope twice is rejected.
pub type Handler = Arc<dyn Fn(&ModelChangedEvent) -> Result<(), CommandError> + Send + Sync>;

/// Wraps a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&ModelChangedEvent) -> Result<(), CommandError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Which commits a subscriber sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionScope {
    /// Every commit.
    All,
    /// Commits touching the named shard.
    Shard(&'static str),
    /// Commits touching one collection or relation.
    Set {
        /// Shard name.
        shard: &'static str,
        /// Collection or relation name.
        name: &'static str,
    },
    /// Commits touching one entity of a collection.
    Entity {
        /// Shard name.
        shard: &'static str,
        /// Collection name.
        set: &'static str,
        /// Entity key.
        key: EntityKey,
    },
}

impl SubscriptionScope {
    /// Returns true if `changes` fall within this scope.
    pub fn matches(&self, changes: &ModelChanges) -> bool {
        match *self {
            Self::All => changes.has_changes(),
            Self::Shard(shard) => changes
                .frame_named(shard)
                .is_some_and(|frame| frame.has_changes()),
            Self::Set { shard, name } => changes
                .frame_named(shard)
                .is_some_and(|frame| frame.set_has_changes(name)),
            Self::Entity { shard, set, key } => changes
                .frame_named(shard)
                .is_some_and(|frame| frame.touches(set, &key)),
        }
    }

    /// Scope of one collection, checked against the model's schema.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPropertySubscription` if shard `S` has no collection
    /// of that name holding `E` with properties `P`.
    pub fn collection<S: Shard, E: Entity, P: Properties>(
        model: &Model,
        name: &'static str,
    ) -> CoreResult<Self> {
        let schema = model
            .shard_schema(S::NAME)
            .ok_or_else(|| CoreError::invalid_subscription(S::NAME, name, "shard not registered"))?;
        let info = schema
            .collection(name)
            .ok_or_else(|| CoreError::invalid_subscription(S::NAME, name, "no such collection"))?;
        if info.entity != E::TYPE_NAME {
            return Err(CoreError::invalid_subscription(
                S::NAME,
                name,
                format!("collection holds {}, not {}", info.entity, E::TYPE_NAME),
            ));
        }
        if info.properties != P::PROPERTIES {
            return Err(CoreError::invalid_subscription(
                S::NAME,
                name,
                "properties do not match the collection",
            ));
        }
        Ok(Self::Set {
            shard: S::NAME,
            name,
        })
    }

    /// Scope of one relation, checked against the model's schema.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPropertySubscription` if shard `S` has no relation of
    /// that name between `PE` and `CE`.
    pub fn relation<S: Shard, PE: Entity, CE: Entity>(
        model: &Model,
        name: &'static str,
    ) -> CoreResult<Self> {
        let schema = model
            .shard_schema(S::NAME)
            .ok_or_else(|| CoreError::invalid_subscription(S::NAME, name, "shard not registered"))?;
        let info = schema
            .relation(name)
            .ok_or_else(|| CoreError::invalid_subscription(S::NAME, name, "no such relation"))?;
        if (info.parent, info.child) != (PE::TYPE_NAME, CE::TYPE_NAME) {
            return Err(CoreError::invalid_subscription(
                S::NAME,
                name,
                format!(
                    "relation links {} to {}, not {} to {}",
                    info.parent,
                    info.child,
                    PE::TYPE_NAME,
                    CE::TYPE_NAME
                ),
            ));
        }
        Ok(Self::Set {
            shard: S::NAME,
            name,
        })
    }

    /// Scope of one entity within a collection.
    ///
    /// # Errors
    ///
    /// Same as [`collection`](Self::collection).
    pub fn entity<S: Shard, E: Entity, P: Properties>(
        model: &Model,
        name: &'static str,
        entity: E,
    ) -> CoreResult<Self> {
        Self::collection::<S, E, P>(model, name)?;
        Ok(Self::Entity {
            shard: S::NAME,
            set: name,
            key: entity.key(),
        })
    }
}

/// Handle returned by a subscribe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    scope: SubscriptionScope,
    handler: Handler,
}

/// Registry of subscribers.
#[derive(Default)]
pub(crate) struct Subscriptions {
    entries: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl Subscriptions {
    pub(crate) fn add(&self, scope: SubscriptionScope, handler: Handler) -> CoreResult<SubscriptionId> {
        let mut entries = self.entries.write();
        let duplicate = entries.iter().any(|entry| {
            entry.scope == scope
                && Arc::as_ptr(&entry.handler).cast::<()>() == Arc::as_ptr(&handler).cast::<()>()
        });
        if duplicate {
            return Err(CoreError::SubscriptionAlreadyExists);
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.push(Subscription { id, scope, handler });
        Ok(id)
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Calls every matching handler; returns the first failure.
    ///
    /// Handlers run without the registry lock held, so they may subscribe
    /// or unsubscribe.
    pub(crate) fn notify(&self, event: &ModelChangedEvent) -> CoreResult<()> {
        let handlers: Vec<Handler> = self
            .entries
            .read()
            .iter()
            .filter(|entry| entry.scope.matches(&event.changes))
            .map(|entry| Arc::clone(&entry.handler))
            .collect();
        let mut first_error = None;
        for callback in handlers {
            if let Err(source) = callback(event) {
                first_error.get_or_insert(CoreError::Notification { source });
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("count", &self.len())
            .finish()
    }
}
