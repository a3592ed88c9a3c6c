//! Command-private views of the model.

use crate::changes::{ChangesFrame, ModelChanges};
use crate::cow::{CowCollection, CowRelation};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::model::Model;
use crate::properties::Properties;
use crate::scheduler::CancellationToken;
use crate::shard::{AnyShard, Shard};
use crate::tracked::{TrackedCollection, TrackedRelation};
use shardgraph_storage::{CollectionRows, ShardImage};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A copy-on-write view of a published [`Model`] owned by one command.
///
/// Reads fall through to the published shards until a shard is requested
/// mutably; that shard is then forked once and cached by name. Every
/// mutation goes through tracked members, so [`changes`](Self::changes)
/// always holds the exact delta against the base model.
///
/// # Example
///
/// ```rust,ignore
/// domain.execute(|snapshot| {
///     let mut people = snapshot.shard_mut::<PeopleShard>()?;
///     let mut persons = people.collection(|s| &mut s.persons)?;
///     Ok(persons.add(PersonProps::new("Ada", 36))?)
/// })?;
/// ```
#[derive(Debug)]
pub struct Snapshot {
    base: Arc<Model>,
    forks: BTreeMap<&'static str, Box<dyn AnyShard>>,
    changes: ModelChanges,
    cancel: CancellationToken,
}

impl Snapshot {
    /// Creates a snapshot over `base`.
    pub fn new(base: Arc<Model>, cancel: CancellationToken) -> Self {
        Self {
            base,
            forks: BTreeMap::new(),
            changes: ModelChanges::new(),
            cancel,
        }
    }

    /// The model this snapshot was taken from.
    pub fn base(&self) -> &Arc<Model> {
        &self.base
    }

    /// Reads shard `S`, preferring this snapshot's fork.
    ///
    /// # Errors
    ///
    /// Returns `ShardNotRegistered` if the model has no such shard.
    pub fn shard<S: Shard>(&self) -> CoreResult<&S> {
        match self.forks.get(S::NAME) {
            Some(fork) => fork
                .as_any()
                .downcast_ref()
                .ok_or_else(|| CoreError::type_mismatch(S::NAME, "registered under another type")),
            None => self.base.shard::<S>(),
        }
    }

    /// Opens shard `S` for writing, forking it on first use.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` once the command was cancelled and
    /// `ShardNotRegistered` if the model has no such shard.
    pub fn shard_mut<S: Shard>(&mut self) -> CoreResult<ShardWriter<'_, S>> {
        self.check_cancelled()?;
        let fork = fork_entry(&mut self.forks, &self.base, S::NAME)?;
        let shard = fork
            .as_any_mut()
            .downcast_mut()
            .ok_or_else(|| CoreError::type_mismatch(S::NAME, "registered under another type"))?;
        Ok(ShardWriter {
            shard,
            frame: self.changes.frame_entry(S::NAME),
        })
    }

    /// Changes recorded so far.
    pub fn changes(&self) -> &ModelChanges {
        &self.changes
    }

    /// Returns true if any net change was recorded.
    pub fn has_changes(&self) -> bool {
        self.changes.has_changes()
    }

    /// Returns `Cancelled` if the command was cancelled.
    ///
    /// Commands call this between steps; returning the error aborts the
    /// whole snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` when the token was triggered.
    pub fn check_cancelled(&self) -> CoreResult<()> {
        if self.cancel.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Replays prepared changes through tracked members.
    pub(crate) fn apply(&mut self, changes: &ModelChanges) -> CoreResult<()> {
        for frame in changes.frames().filter(|frame| frame.has_changes()) {
            let fork = fork_entry(&mut self.forks, &self.base, frame.shard())?;
            let name = fork.name();
            fork.apply_frame(frame, self.changes.frame_entry(name))?;
        }
        Ok(())
    }

    pub(crate) fn load_shard(&mut self, image: &ShardImage, force: bool) -> CoreResult<()> {
        let fork = fork_entry(&mut self.forks, &self.base, image.shard)?;
        fork.load_image(image, force, self.changes.frame_entry(image.shard))
    }

    pub(crate) fn load_collection(&mut self, rows: &CollectionRows, force: bool) -> CoreResult<()> {
        let fork = fork_entry(&mut self.forks, &self.base, rows.info.shard)?;
        fork.load_collection(rows, force, self.changes.frame_entry(rows.info.shard))
    }

    /// Consumes the snapshot, overlaying changed forks onto the base.
    ///
    /// Forks without net changes are dropped, so their shards stay the
    /// published instances.
    pub fn into_model(self) -> (Model, ModelChanges) {
        let mut changes = self.changes;
        changes.compact();
        let mut model = Model::clone(&self.base);
        for (name, fork) in self.forks {
            if changes.frame_named(name).is_some() {
                model.replace(name, Arc::from(fork));
            }
        }
        (model, changes)
    }
}

fn fork_entry<'a>(
    forks: &'a mut BTreeMap<&'static str, Box<dyn AnyShard>>,
    base: &Model,
    name: &str,
) -> CoreResult<&'a mut Box<dyn AnyShard>> {
    let shard = base
        .shard_dyn(name)
        .ok_or_else(|| CoreError::shard_not_registered(name))?;
    Ok(forks.entry(shard.name()).or_insert_with(|| shard.fork()))
}

/// Write access to one forked shard.
///
/// Hands out tracked members, one at a time.
pub struct ShardWriter<'a, S> {
    shard: &'a mut S,
    frame: &'a mut ChangesFrame,
}

impl<S: Shard> ShardWriter<'_, S> {
    /// Current state of the fork.
    pub fn shard(&self) -> &S {
        &*self.shard
    }

    /// A tracked handle on the collection picked by `select`.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the frame already holds a set of that name
    /// with other types.
    pub fn collection<E, P, F>(
        &mut self,
        select: F,
    ) -> CoreResult<TrackedCollection<'_, E, P, CowCollection<E, P>>>
    where
        E: Entity,
        P: Properties,
        F: FnOnce(&mut S) -> &mut CowCollection<E, P>,
    {
        let collection = select(&mut *self.shard);
        let changes = self.frame.collection_entry::<E, P>(collection.name())?;
        Ok(TrackedCollection::new(collection, changes))
    }

    /// A tracked handle on the relation picked by `select`.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the frame already holds a set of that name
    /// with other types.
    pub fn relation<PE, CE, F>(
        &mut self,
        select: F,
    ) -> CoreResult<TrackedRelation<'_, PE, CE, CowRelation<PE, CE>>>
    where
        PE: Entity,
        CE: Entity,
        F: FnOnce(&mut S) -> &mut CowRelation<PE, CE>,
    {
        let relation = select(&mut *self.shard);
        let changes = self.frame.relation_entry::<PE, CE>(relation.name())?;
        Ok(TrackedRelation::new(relation, changes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionRead, CollectionWrite};
    use crate::relation::{RelationRead, RelationWrite};
    use crate::test_support::{DepotShard, ItemProps, ShopShard};

    fn model() -> Arc<Model> {
        Arc::new(
            Model::builder()
                .shard::<ShopShard>()
                .shard::<DepotShard>()
                .build(),
        )
    }

    fn props(label: &str) -> ItemProps {
        ItemProps {
            label: label.to_string(),
        }
    }

    #[test]
    fn reads_fall_through_until_forked() {
        let base = model();
        let mut snapshot = Snapshot::new(Arc::clone(&base), CancellationToken::new());
        let before: *const ShopShard = snapshot.shard::<ShopShard>().unwrap();
        assert!(std::ptr::eq(before, base.shard::<ShopShard>().unwrap()));

        let mut shop = snapshot.shard_mut::<ShopShard>().unwrap();
        let mut items = shop.collection(|s| &mut s.items).unwrap();
        let lamp = items.add(props("lamp")).unwrap();

        assert!(snapshot.shard::<ShopShard>().unwrap().items.contains(lamp));
        assert!(base.shard::<ShopShard>().unwrap().items.is_empty());
        assert_eq!(snapshot.changes().record_count(), 1);
    }

    #[test]
    fn into_model_keeps_untouched_shards() {
        let base = model();
        let mut snapshot = Snapshot::new(Arc::clone(&base), CancellationToken::new());
        let mut shop = snapshot.shard_mut::<ShopShard>().unwrap();
        let lamp = shop
            .collection(|s| &mut s.items)
            .unwrap()
            .add(props("lamp"))
            .unwrap();
        shop.relation(|s| &mut s.links).unwrap().add(lamp, lamp).unwrap();
        snapshot.shard_mut::<DepotShard>().unwrap();

        let (next, changes) = snapshot.into_model();
        assert!(!next.same_shard::<ShopShard>(&base));
        assert!(next.same_shard::<DepotShard>(&base));
        assert_eq!(changes.changed_shards().collect::<Vec<_>>(), vec!["shop"]);
        assert!(next.shard::<ShopShard>().unwrap().links.are_linked(lamp, lamp));
    }

    #[test]
    fn net_noop_publishes_base_shards() {
        let base = model();
        let mut snapshot = Snapshot::new(Arc::clone(&base), CancellationToken::new());
        let mut shop = snapshot.shard_mut::<ShopShard>().unwrap();
        let mut items = shop.collection(|s| &mut s.items).unwrap();
        let lamp = items.add(props("lamp")).unwrap();
        items.remove(lamp).unwrap();

        assert!(!snapshot.has_changes());
        let (next, _) = snapshot.into_model();
        assert!(next.same_shard::<ShopShard>(&base));
    }

    #[test]
    fn cancelled_snapshot_refuses_writes() {
        let cancel = CancellationToken::new();
        let mut snapshot = Snapshot::new(model(), cancel.clone());
        cancel.cancel();
        assert!(matches!(
            snapshot.shard_mut::<ShopShard>(),
            Err(CoreError::Cancelled)
        ));
        assert!(matches!(snapshot.check_cancelled(), Err(CoreError::Cancelled)));
    }

    #[test]
    fn apply_records_like_a_command() {
        let base = model();
        let mut first = Snapshot::new(Arc::clone(&base), CancellationToken::new());
        first
            .shard_mut::<ShopShard>()
            .unwrap()
            .collection(|s| &mut s.items)
            .unwrap()
            .add(props("lamp"))
            .unwrap();
        let (_, changes) = first.into_model();

        let mut second = Snapshot::new(Arc::clone(&base), CancellationToken::new());
        second.apply(&changes).unwrap();
        assert_eq!(second.changes(), &changes);
        assert_eq!(second.shard::<ShopShard>().unwrap().items.len(), 1);
    }
}
