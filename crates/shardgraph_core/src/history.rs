//! Undo/redo history on top of the domain model.
//!
//! Every committed change set is pushed onto the undo stack. Undo replays
//! the inverse of the top entry through the normal commit pipeline, so
//! subscribers see undo and redo like any other commit.
//!
//! Lock order is always write lock first, then the stacks.

use crate::changes::ModelChanges;
use crate::domain::{CommitReport, DomainModel};
use crate::error::{CommandError, CoreError, CoreResult};
use crate::model::Model;
use crate::scheduler::{CancellationToken, CommandTicket};
use crate::shard::Shard;
use crate::snapshot::Snapshot;
use parking_lot::Mutex;
use shardgraph_storage::HistoryEntry;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use uuid::Uuid;

/// One undoable commit.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItem {
    /// Unique id of the entry.
    pub change_id: Uuid,
    /// Milliseconds since the Unix epoch at commit time.
    pub timestamp_ms: u64,
    /// The committed changes.
    pub changes: Arc<ModelChanges>,
}

impl HistoryItem {
    fn new(changes: Arc<ModelChanges>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        Self {
            change_id: Uuid::new_v4(),
            timestamp_ms,
            changes,
        }
    }
}

#[derive(Debug, Default)]
struct Stacks {
    undo: VecDeque<HistoryItem>,
    redo: Vec<HistoryItem>,
    /// Entries were dropped since the last save, so the undo stack no
    /// longer covers everything storage is missing.
    trimmed: bool,
}

impl Stacks {
    fn push_undo(&mut self, item: HistoryItem, limit: Option<usize>) {
        self.undo.push_back(item);
        let Some(limit) = limit else {
            return;
        };
        let excess = self.undo.len().saturating_sub(limit);
        if excess > 0 {
            self.undo.drain(..excess);
            self.trimmed = true;
            warn!(dropped = excess, limit, "undo history trimmed");
        }
    }
}

/// A [`DomainModel`] that records undo and redo stacks.
///
/// # Example
///
/// ```rust,ignore
/// let history = UndoRedoDomainModel::new(DomainModel::new(model));
/// history.execute(|snapshot| { /* add a person */ Ok(()) })?;
/// assert!(history.undo()?);
/// assert!(history.redo()?);
/// ```
#[derive(Clone)]
pub struct UndoRedoDomainModel {
    domain: DomainModel,
    stacks: Arc<Mutex<Stacks>>,
}

impl UndoRedoDomainModel {
    /// Wraps `domain` with empty stacks.
    pub fn new(domain: DomainModel) -> Self {
        Self {
            domain,
            stacks: Arc::new(Mutex::new(Stacks::default())),
        }
    }

    /// The wrapped domain model.
    ///
    /// Commands run directly on it are not recorded.
    pub fn domain(&self) -> &DomainModel {
        &self.domain
    }

    /// The published model.
    pub fn model(&self) -> Arc<Model> {
        self.domain.model()
    }

    /// Number of undo entries.
    pub fn undo_len(&self) -> usize {
        self.stacks.lock().undo.len()
    }

    /// Number of redo entries.
    pub fn redo_len(&self) -> usize {
        self.stacks.lock().redo.len()
    }

    /// Returns true if there is something to undo.
    pub fn can_undo(&self) -> bool {
        self.undo_len() > 0
    }

    /// Returns true if there is something to redo.
    pub fn can_redo(&self) -> bool {
        self.redo_len() > 0
    }

    /// Undo entries, oldest first.
    pub fn undo_items(&self) -> Vec<HistoryItem> {
        self.stacks.lock().undo.iter().cloned().collect()
    }

    /// Drops both stacks.
    pub fn clear_history(&self) {
        let _gate = self.domain.gate();
        let mut stacks = self.stacks.lock();
        stacks.undo.clear();
        stacks.redo.clear();
    }

    fn record(&self, changes: &Arc<ModelChanges>) {
        let limit = self.domain.config().history_limit;
        let mut stacks = self.stacks.lock();
        stacks.redo.clear();
        stacks.push_undo(HistoryItem::new(Arc::clone(changes)), limit);
    }

    /// Runs a recorded command and returns its value.
    ///
    /// # Errors
    ///
    /// Same as [`DomainModel::execute`].
    pub fn execute<T, F>(&self, command: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Snapshot) -> Result<T, CommandError>,
    {
        self.run(command).map(|(value, _)| value)
    }

    /// Runs a recorded command and returns its value with the commit report.
    ///
    /// # Errors
    ///
    /// Same as [`DomainModel::execute`].
    pub fn run<T, F>(&self, command: F) -> CoreResult<(T, CommitReport)>
    where
        F: FnOnce(&mut Snapshot) -> Result<T, CommandError>,
    {
        let _gate = self.domain.gate();
        self.domain
            .run_locked(CancellationToken::new(), command, &mut |changes| {
                self.record(changes);
            })
    }

    /// Queues a recorded command on the scheduler.
    ///
    /// # Errors
    ///
    /// Returns `QueueClosed` if the scheduler no longer accepts work.
    pub fn submit<T, F>(&self, command: F) -> CoreResult<CommandTicket<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Snapshot) -> Result<T, CommandError> + Send + 'static,
    {
        let history = self.clone();
        self.domain
            .submit_job(CancellationToken::new(), move |cancel| {
                let _gate = history.domain.gate();
                history
                    .domain
                    .run_locked(cancel, command, &mut |changes| history.record(changes))
                    .map(|(value, _)| value)
            })
    }

    /// Applies prepared changes as a recorded commit.
    ///
    /// # Errors
    ///
    /// Same as [`DomainModel::apply_changes`].
    pub fn apply_changes(&self, changes: &ModelChanges) -> CoreResult<CommitReport> {
        let _gate = self.domain.gate();
        self.domain
            .apply_locked(changes, &mut |changes| self.record(changes))
    }

    /// Reverts the most recent entry. Returns false if there was none.
    ///
    /// # Errors
    ///
    /// Returns `ApplyModelChanges` if the inverse no longer applies (the
    /// entry stays on the undo stack), or `Notification` if a subscriber
    /// failed after the undo was published.
    pub fn undo(&self) -> CoreResult<bool> {
        let _gate = self.domain.gate();
        let Some(item) = self.stacks.lock().undo.pop_back() else {
            return Ok(false);
        };
        let mut committed = false;
        let result = self
            .domain
            .apply_locked(&item.changes.invert(), &mut |_| committed = true);
        debug!(
            records = item.changes.record_count(),
            committed, "undo"
        );
        let mut stacks = self.stacks.lock();
        if committed {
            stacks.redo.push(item);
        } else {
            stacks.undo.push_back(item);
        }
        result.map(|_| true)
    }

    /// Re-applies the most recently undone entry. Returns false if there
    /// was none.
    ///
    /// # Errors
    ///
    /// Same as [`undo`](Self::undo).
    pub fn redo(&self) -> CoreResult<bool> {
        let _gate = self.domain.gate();
        let Some(item) = self.stacks.lock().redo.pop() else {
            return Ok(false);
        };
        let mut committed = false;
        let result = self
            .domain
            .apply_locked(&item.changes, &mut |_| committed = true);
        debug!(
            records = item.changes.record_count(),
            committed, "redo"
        );
        let limit = self.domain.config().history_limit;
        let mut stacks = self.stacks.lock();
        if committed {
            stacks.push_undo(item, limit);
        } else {
            stacks.redo.push(item);
        }
        result.map(|_| true)
    }

    fn clear_after_save(&self) {
        let clear_redo = self.domain.config().clear_redo_on_save;
        let mut stacks = self.stacks.lock();
        stacks.undo.clear();
        stacks.trimmed = false;
        if clear_redo {
            stacks.redo.clear();
        }
    }

    /// Writes the full model and clears the undo stack.
    ///
    /// The redo stack is kept unless
    /// [`EngineConfig::clear_redo_on_save`](crate::EngineConfig) is set.
    ///
    /// # Errors
    ///
    /// Same as [`DomainModel::save`].
    pub fn save(&self) -> CoreResult<()> {
        let _gate = self.domain.gate();
        self.domain.save_locked()?;
        self.clear_after_save();
        Ok(())
    }

    /// Writes the undo stack, merged oldest to newest, as one update and
    /// clears it.
    ///
    /// Falls back to a full save when entries were trimmed since the last
    /// save. With [`EngineConfig::write_through`](crate::EngineConfig) set,
    /// storage already holds every commit and only the stacks are cleared.
    ///
    /// # Errors
    ///
    /// Same as [`DomainModel::update`].
    pub fn update(&self) -> CoreResult<()> {
        let _gate = self.domain.gate();
        if self.domain.config().write_through {
            debug!("write-through storage is current, clearing history");
            self.clear_after_save();
            return Ok(());
        }
        let (merged, trimmed) = {
            let stacks = self.stacks.lock();
            let merged = stacks
                .undo
                .iter()
                .try_fold(ModelChanges::new(), |merged, item| merged.merge(&item.changes));
            (merged, stacks.trimmed)
        };
        if trimmed {
            debug!("history was trimmed, saving full model");
            self.domain.save_locked()?;
        } else {
            let merged = merged.map_err(CoreError::model_save)?;
            if merged.has_changes() {
                self.domain.update_locked(&merged)?;
            }
        }
        self.clear_after_save();
        Ok(())
    }

    /// Loads every shard from storage without touching the stacks.
    ///
    /// # Errors
    ///
    /// Same as [`DomainModel::load`].
    pub fn load(&self, force: bool) -> CoreResult<CommitReport> {
        self.domain.load(force)
    }

    /// Loads one collection from storage without touching the stacks.
    ///
    /// # Errors
    ///
    /// Same as [`DomainModel::load_collection`].
    pub fn load_collection<S: Shard>(&self, name: &str, force: bool) -> CoreResult<CommitReport> {
        self.domain.load_collection::<S>(name, force)
    }

    /// Persists the undo stack, replacing any stored history.
    ///
    /// # Errors
    ///
    /// Returns `StorageNotConfigured` or `ModelSave`.
    pub fn save_history(&self) -> CoreResult<()> {
        let _gate = self.domain.gate();
        let storage = self.domain.storage()?;
        let model = self.domain.model();
        let entries = self
            .stacks
            .lock()
            .undo
            .iter()
            .map(|item| {
                Ok(HistoryEntry {
                    change_id: *item.change_id.as_bytes(),
                    timestamp_ms: item.timestamp_ms,
                    frames: item.changes.to_images(&model)?,
                })
            })
            .collect::<CoreResult<Vec<_>>>()
            .map_err(CoreError::model_save)?;
        storage
            .save_history(&entries)
            .map_err(|err| CoreError::model_save(err.into()))?;
        debug!(entries = entries.len(), "history saved");
        Ok(())
    }

    /// Replaces the undo stack with the stored history and clears redo.
    ///
    /// # Errors
    ///
    /// Returns `StorageNotConfigured` or `ModelLoading`.
    pub fn load_history(&self) -> CoreResult<()> {
        let _gate = self.domain.gate();
        let storage = self.domain.storage()?;
        let model = self.domain.model();
        let items = model
            .schemas()
            .and_then(|schemas| Ok(storage.load_history(&schemas)?))
            .and_then(|entries| {
                entries
                    .iter()
                    .map(|entry| {
                        Ok(HistoryItem {
                            change_id: Uuid::from_bytes(entry.change_id),
                            timestamp_ms: entry.timestamp_ms,
                            changes: Arc::new(model.decode_changes(&entry.frames)?),
                        })
                    })
                    .collect::<CoreResult<VecDeque<_>>>()
            })
            .map_err(CoreError::model_loading)?;
        debug!(entries = items.len(), "history loaded");
        let mut stacks = self.stacks.lock();
        stacks.undo = items;
        stacks.redo.clear();
        stacks.trimmed = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionRead, CollectionWrite};
    use crate::config::EngineConfig;
    use crate::entity::Entity;
    use crate::properties::Properties;
    use crate::test_support::{Item, ItemProps, ShopShard};
    use shardgraph_storage::{MemoryRepository, RepositoryStorage, Storage};

    fn props(label: &str) -> ItemProps {
        ItemProps {
            label: label.to_string(),
        }
    }

    fn model() -> Model {
        Model::builder().shard::<ShopShard>().build()
    }

    fn add_item(snapshot: &mut Snapshot, label: &str) -> Result<Item, CommandError> {
        let mut shop = snapshot.shard_mut::<ShopShard>()?;
        Ok(shop.collection(|s| &mut s.items)?.add(props(label))?)
    }

    fn items(history: &UndoRedoDomainModel) -> usize {
        history.model().shard::<ShopShard>().unwrap().items.len()
    }

    #[test]
    fn undo_redo_roundtrip() {
        let history = UndoRedoDomainModel::new(DomainModel::new(model()));
        let lamp = history.execute(|s| add_item(s, "lamp")).unwrap();
        assert_eq!(history.undo_len(), 1);

        assert!(history.undo().unwrap());
        assert!(!history
            .model()
            .shard::<ShopShard>()
            .unwrap()
            .items
            .contains(lamp));
        assert_eq!(history.redo_len(), 1);

        assert!(history.redo().unwrap());
        assert!(history
            .model()
            .shard::<ShopShard>()
            .unwrap()
            .items
            .contains(lamp));
        assert_eq!(history.redo_len(), 0);
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn empty_stacks_report_false() {
        let history = UndoRedoDomainModel::new(DomainModel::new(model()));
        assert!(!history.undo().unwrap());
        assert!(!history.redo().unwrap());
    }

    #[test]
    fn new_commit_clears_redo() {
        let history = UndoRedoDomainModel::new(DomainModel::new(model()));
        history.execute(|s| add_item(s, "lamp")).unwrap();
        history.undo().unwrap();
        assert!(history.can_redo());
        history.execute(|s| add_item(s, "desk")).unwrap();
        assert!(!history.can_redo());
    }

    #[test]
    fn noop_and_failed_commands_are_not_recorded() {
        let history = UndoRedoDomainModel::new(DomainModel::new(model()));
        history.execute(|_| Ok(())).unwrap();
        assert!(history
            .execute(|s| {
                add_item(s, "lamp")?;
                Err::<(), CommandError>("abort".into())
            })
            .is_err());
        assert_eq!(history.undo_len(), 0);
    }

    #[test]
    fn limit_drops_oldest() {
        let domain = DomainModel::builder(model())
            .config(EngineConfig::new().history_limit(Some(2)))
            .build();
        let history = UndoRedoDomainModel::new(domain);
        for label in ["a", "b", "c"] {
            history.execute(|s| add_item(s, label)).unwrap();
        }
        assert_eq!(history.undo_len(), 2);
        history.undo().unwrap();
        history.undo().unwrap();
        assert!(!history.undo().unwrap());
        assert_eq!(items(&history), 1);
    }

    #[test]
    fn undo_of_stale_entry_keeps_it() {
        let history = UndoRedoDomainModel::new(DomainModel::new(model()));
        let lamp = history.execute(|s| add_item(s, "lamp")).unwrap();
        // Remove the item behind the history's back.
        history
            .domain()
            .execute(|s| {
                let mut shop = s.shard_mut::<ShopShard>()?;
                shop.collection(|s| &mut s.items)?.remove(lamp)?;
                Ok(())
            })
            .unwrap();

        let err = history.undo().unwrap_err();
        assert!(matches!(err, CoreError::ApplyModelChanges(_)));
        assert_eq!(history.undo_len(), 1);
        assert_eq!(history.redo_len(), 0);
    }

    fn with_storage(config: EngineConfig) -> (UndoRedoDomainModel, Arc<RepositoryStorage<MemoryRepository>>) {
        let storage = Arc::new(RepositoryStorage::new(MemoryRepository::new()));
        let domain = DomainModel::builder(model())
            .storage(storage.clone())
            .config(config)
            .build();
        (UndoRedoDomainModel::new(domain), storage)
    }

    #[test]
    fn save_clears_undo_and_keeps_redo_by_default() {
        let (history, _) = with_storage(EngineConfig::new());
        history.execute(|s| add_item(s, "lamp")).unwrap();
        history.execute(|s| add_item(s, "desk")).unwrap();
        history.undo().unwrap();

        history.save().unwrap();
        assert_eq!(history.undo_len(), 0);
        assert_eq!(history.redo_len(), 1);

        let (history, _) = with_storage(EngineConfig::new().clear_redo_on_save(true));
        history.execute(|s| add_item(s, "lamp")).unwrap();
        history.undo().unwrap();
        history.save().unwrap();
        assert_eq!(history.redo_len(), 0);
    }

    #[test]
    fn update_writes_merged_history() {
        let (history, storage) = with_storage(EngineConfig::new());
        let lamp = history.execute(|s| add_item(s, "lamp")).unwrap();
        history
            .execute(|s| {
                let mut shop = s.shard_mut::<ShopShard>()?;
                shop.collection(|s| &mut s.items)?
                    .modify(lamp, |_| props("bright lamp"))?;
                Ok(())
            })
            .unwrap();
        history.execute(|s| add_item(s, "desk")).unwrap();

        history.update().unwrap();
        assert_eq!(history.undo_len(), 0);

        let schema = history.model().shard_schema("shop").unwrap();
        let rows = storage
            .load_collection(schema.collection("items").unwrap())
            .unwrap();
        assert_eq!(rows.rows.len(), 2);
        let stored = rows.rows.iter().find(|row| row.entity == lamp.key()).unwrap();
        assert_eq!(stored.props, props("bright lamp").to_bag());
    }

    #[test]
    fn load_leaves_stacks_alone() {
        let (history, _) = with_storage(EngineConfig::new());
        history.execute(|s| add_item(s, "lamp")).unwrap();
        history.domain().save().unwrap();
        history.execute(|s| add_item(s, "desk")).unwrap();
        history.undo().unwrap();

        history.load(true).unwrap();
        assert_eq!(history.undo_len(), 1);
        assert_eq!(history.redo_len(), 1);
    }

    #[test]
    fn history_survives_storage() {
        let (history, storage) = with_storage(EngineConfig::new());
        history.execute(|s| add_item(s, "lamp")).unwrap();
        history.execute(|s| add_item(s, "desk")).unwrap();
        let saved = history.undo_items();
        history.save_history().unwrap();

        let restored = UndoRedoDomainModel::new(
            DomainModel::builder(history.model().as_ref().clone())
                .storage(storage)
                .build(),
        );
        restored.load_history().unwrap();
        assert_eq!(restored.undo_items(), saved);

        assert!(restored.undo().unwrap());
        assert!(restored.undo().unwrap());
        assert_eq!(items(&restored), 0);
    }
}
