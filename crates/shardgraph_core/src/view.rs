//! The published model pointer.

use crate::model::Model;
use crate::scheduler::CancellationToken;
use crate::snapshot::Snapshot;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Holds the currently published [`Model`].
///
/// Readers load the pointer without locking; the domain model replaces it
/// with one atomic swap per commit.
#[derive(Debug)]
pub struct View {
    current: ArcSwap<Model>,
}

impl View {
    /// Creates a view publishing `model`.
    pub fn new(model: Model) -> Self {
        Self {
            current: ArcSwap::from_pointee(model),
        }
    }

    /// The published model.
    pub fn model(&self) -> Arc<Model> {
        self.current.load_full()
    }

    /// Starts a snapshot over the published model.
    pub fn create_snapshot(&self, cancel: CancellationToken) -> Snapshot {
        Snapshot::new(self.model(), cancel)
    }

    /// Publishes `model`, returning the one it replaced.
    pub fn publish(&self, model: Arc<Model>) -> Arc<Model> {
        self.current.swap(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ShopShard;

    #[test]
    fn publish_swaps_pointer() {
        let view = View::new(Model::builder().shard::<ShopShard>().build());
        let first = view.model();
        let next = Arc::new(Model::clone(&first));
        let old = view.publish(Arc::clone(&next));
        assert!(Arc::ptr_eq(&old, &first));
        assert!(Arc::ptr_eq(&view.model(), &next));
        assert!(next.same_shard::<ShopShard>(&first));
    }

    #[test]
    fn snapshot_starts_from_published_model() {
        let view = View::new(Model::builder().shard::<ShopShard>().build());
        let snapshot = view.create_snapshot(CancellationToken::new());
        assert!(Arc::ptr_eq(snapshot.base(), &view.model()));
        assert!(!snapshot.has_changes());
    }
}
