//! Change tracking algebra.
//!
//! Every mutation made through a tracked structure is recorded as a change
//! record. Records are grouped:
//! - per collection or relation in a change set
//! - per shard in a [`ChangesFrame`]
//! - per command in a [`ModelChanges`]
//!
//! All three levels support inversion (for undo) and merging (for batching
//! history into one storage update).

mod collection;
mod frame;
mod model;
mod record;
mod relation;

pub use collection::CollectionChangeSet;
pub use frame::ChangesFrame;
pub use model::ModelChanges;
pub use record::{ChangeAction, CollectionChange, RelationChange};
pub use relation::RelationChangeSet;

use crate::error::CoreResult;
use shardgraph_storage::{EntityKey, FrameImage, ShardSchema};
use std::any::Any;
use std::fmt;

/// Type-erased change set, stored inside a [`ChangesFrame`].
pub(crate) trait AnyChangeSet: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn len(&self) -> usize;
    /// True if a record mentions the entity with this key.
    fn touches(&self, key: &EntityKey) -> bool;
    fn boxed_clone(&self) -> Box<dyn AnyChangeSet>;
    fn inverted(&self) -> Box<dyn AnyChangeSet>;
    fn merged(&self, later: &dyn AnyChangeSet) -> CoreResult<Box<dyn AnyChangeSet>>;
    fn eq_dyn(&self, other: &dyn AnyChangeSet) -> bool;
    fn write_image(&self, schema: &ShardSchema, image: &mut FrameImage) -> CoreResult<()>;

    fn has_changes(&self) -> bool {
        self.len() > 0
    }
}
