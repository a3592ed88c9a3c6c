//! # ShardGraph Core
//!
//! Embedded, in-process object-graph engine.
//!
//! A [`Model`] is a set of independently typed shards. Each shard owns named
//! collections (entity id to property record) and relations (parent/child
//! links). Commands run against a copy-on-write [`Snapshot`], every mutation
//! is recorded as a change record, and a successful command publishes a new
//! model with a single pointer swap.
//!
//! This crate provides:
//! - Typed collections and relations with copy-on-write sharing
//! - A change algebra that coalesces, inverts and merges mutations
//! - [`DomainModel`] for serialized command execution and notification
//! - [`UndoRedoDomainModel`] for bounded undo/redo history
//! - Persistence through the [`shardgraph_storage`] ports
//!
//! ## Design Principles
//!
//! - Readers never block: the published model is immutable
//! - Writers are serialized by one gate per domain model
//! - A snapshot forks only the shards and sets it actually writes
//! - Change sets hold net effects, so a command that cancels itself out
//!   publishes nothing
//!
//! ## Example
//!
//! ```rust,ignore
//! use shardgraph_core::{entity, properties, shard, CollectionWrite, DomainModel, Model};
//!
//! entity! { pub struct Person; }
//! properties! { pub struct PersonProps { pub name: String } }
//! shard! {
//!     pub struct People : "people" {
//!         collections { persons: Person => PersonProps, }
//!         relations { friends: Person => Person = OneToMany, }
//!     }
//! }
//!
//! let domain = DomainModel::new(Model::builder().shard::<People>().build());
//! let ada = domain.execute(|snapshot| {
//!     let mut people = snapshot.shard_mut::<People>()?;
//!     Ok(people.collection(|s| &mut s.persons)?.add(PersonProps { name: "Ada".into() })?)
//! })?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changes;
mod collection;
mod config;
mod cow;
mod domain;
mod entity;
mod error;
mod history;
mod model;
mod persist;
mod properties;
mod relation;
mod scheduler;
mod shard;
mod snapshot;
mod subscription;
mod tracked;
mod view;

#[cfg(test)]
mod test_support;

pub use changes::{
    ChangeAction, ChangesFrame, CollectionChange, CollectionChangeSet, ModelChanges,
    RelationChange, RelationChangeSet,
};
pub use collection::{Collection, CollectionRead, CollectionWrite};
pub use config::EngineConfig;
pub use cow::{CowCollection, CowRelation};
pub use domain::{CommitOutcome, CommitReport, DomainModel, DomainModelBuilder};
pub use entity::{Entity, EntityId};
pub use error::{CommandError, CoreError, CoreResult};
pub use history::{HistoryItem, UndoRedoDomainModel};
pub use model::{Model, ModelBuilder};
pub use properties::{Properties, PropertyType};
pub use relation::{Mapping, Relation, RelationRead, RelationWrite};
pub use scheduler::{
    CancellationToken, CommandTicket, InlineScheduler, Job, Scheduler, WorkerScheduler,
};
pub use shard::{Shard, ShardVisitor, ShardVisitorMut};
pub use snapshot::{ShardWriter, Snapshot};
pub use subscription::{handler, Handler, ModelChangedEvent, SubscriptionId, SubscriptionScope};
pub use tracked::{TrackedCollection, TrackedRelation};
pub use view::View;

pub use shardgraph_codec::{CodecError, CodecResult, PropertyBag, Value, ValueKind};
pub use shardgraph_storage::{
    EntityKey, MemoryRepository, PropertyInfo, RelationKind, RepositoryStorage, Storage,
};
