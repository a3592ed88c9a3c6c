//! The domain model: command runner and commit pipeline.
//!
//! Every write goes through the same pipeline:
//!
//! 1. take the write lock (one writer at a time)
//! 2. build a [`Snapshot`] over the published model
//! 3. run the command body against it
//! 4. discard the snapshot if the body failed or changed nothing
//! 5. otherwise publish the new model with one atomic swap
//! 6. notify subscribers, then write through to storage if configured
//!
//! Reads never take the write lock: [`DomainModel::model`] is a lock-free
//! load of the published pointer.

use crate::changes::ModelChanges;
use crate::config::EngineConfig;
use crate::entity::Entity;
use crate::error::{CommandError, CoreError, CoreResult};
use crate::model::Model;
use crate::properties::Properties;
use crate::scheduler::{CancellationToken, CommandTicket, InlineScheduler, Scheduler, WorkerScheduler};
use crate::shard::Shard;
use crate::snapshot::Snapshot;
use crate::subscription::{Handler, ModelChangedEvent, SubscriptionId, SubscriptionScope, Subscriptions};
use crate::view::View;
use parking_lot::{Mutex, MutexGuard};
use shardgraph_storage::Storage;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// What happened to a snapshot at the end of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new model was published.
    Committed,
    /// Nothing changed; the published model was kept.
    Discarded,
}

/// Result of one pass through the commit pipeline.
#[derive(Debug, Clone)]
pub struct CommitReport {
    /// Whether a model was published.
    pub outcome: CommitOutcome,
    /// The published changes (empty when discarded).
    pub changes: Arc<ModelChanges>,
}

impl CommitReport {
    fn discarded() -> Self {
        Self {
            outcome: CommitOutcome::Discarded,
            changes: Arc::new(ModelChanges::new()),
        }
    }

    /// Returns true if a model was published.
    pub fn is_committed(&self) -> bool {
        self.outcome == CommitOutcome::Committed
    }
}

/// Callback invoked right after a publish, before subscribers run.
pub(crate) type CommitHook<'a> = &'a mut dyn FnMut(&Arc<ModelChanges>);

struct DomainInner {
    view: View,
    write_lock: Mutex<()>,
    subscriptions: Subscriptions,
    storage: Option<Arc<dyn Storage>>,
    scheduler: Arc<dyn Scheduler>,
    config: EngineConfig,
}

/// Single-writer command runner over a published [`Model`].
///
/// Cloning is cheap; clones share the same model, subscribers and storage.
///
/// Command bodies and subscription handlers run while the write lock is
/// held, so they must not run commands on the same domain model
/// synchronously.
///
/// # Example
///
/// ```rust,ignore
/// use shardgraph_core::{DomainModel, Model};
///
/// let domain = DomainModel::new(Model::builder().shard::<PeopleShard>().build());
/// let ada = domain.execute(|snapshot| {
///     let mut people = snapshot.shard_mut::<PeopleShard>()?;
///     Ok(people.collection(|s| &mut s.persons)?.add(PersonProps::new("Ada", 36))?)
/// })?;
/// ```
#[derive(Clone)]
pub struct DomainModel {
    inner: Arc<DomainInner>,
}

impl DomainModel {
    /// Creates a domain model with an inline scheduler and no storage.
    pub fn new(model: Model) -> Self {
        Self::builder(model).build()
    }

    /// Returns a builder.
    pub fn builder(model: Model) -> DomainModelBuilder {
        DomainModelBuilder::new(model)
    }

    /// The published model.
    pub fn model(&self) -> Arc<Model> {
        self.inner.view.model()
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The configured storage.
    ///
    /// # Errors
    ///
    /// Returns `StorageNotConfigured` if the model was built without one.
    pub fn storage(&self) -> CoreResult<&Arc<dyn Storage>> {
        self.inner
            .storage
            .as_ref()
            .ok_or(CoreError::StorageNotConfigured)
    }

    /// Runs a command and returns its value.
    ///
    /// # Errors
    ///
    /// Returns `CommandInvocation` if the body failed, `Cancelled` if it
    /// gave up on cancellation, and `Notification` if a subscriber failed
    /// after the model was published.
    pub fn execute<T, F>(&self, command: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Snapshot) -> Result<T, CommandError>,
    {
        self.run(command).map(|(value, _)| value)
    }

    /// Runs a command and returns its value with the commit report.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub fn run<T, F>(&self, command: F) -> CoreResult<(T, CommitReport)>
    where
        F: FnOnce(&mut Snapshot) -> Result<T, CommandError>,
    {
        let _gate = self.gate();
        self.run_locked(CancellationToken::new(), command, &mut |_| {})
    }

    /// Queues a command on the scheduler.
    ///
    /// A panic inside the body is reported as `CommandInvocation`.
    ///
    /// # Errors
    ///
    /// Returns `QueueClosed` if the scheduler no longer accepts work.
    pub fn submit<T, F>(&self, command: F) -> CoreResult<CommandTicket<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut Snapshot) -> Result<T, CommandError> + Send + 'static,
    {
        let domain = self.clone();
        self.submit_job(CancellationToken::new(), move |cancel| {
            let _gate = domain.gate();
            domain
                .run_locked(cancel, command, &mut |_| {})
                .map(|(value, _)| value)
        })
    }

    /// Replays prepared changes through the commit pipeline.
    ///
    /// # Errors
    ///
    /// Returns `ApplyModelChanges` if the changes do not apply to the
    /// published model, and `Notification` if a subscriber failed.
    pub fn apply_changes(&self, changes: &ModelChanges) -> CoreResult<CommitReport> {
        let _gate = self.gate();
        self.apply_locked(changes, &mut |_| {})
    }

    /// Writes the full published model to storage.
    ///
    /// # Errors
    ///
    /// Returns `StorageNotConfigured` or `ModelSave`.
    pub fn save(&self) -> CoreResult<()> {
        let _gate = self.gate();
        self.save_locked()
    }

    /// Writes `changes` to storage as an incremental update.
    ///
    /// # Errors
    ///
    /// Returns `StorageNotConfigured` or `ModelSave`.
    pub fn update(&self, changes: &ModelChanges) -> CoreResult<()> {
        let _gate = self.gate();
        self.update_locked(changes)
    }

    /// Loads every shard from storage.
    ///
    /// Without `force`, loading into a shard that already holds data fails.
    /// A load that changes nothing publishes nothing.
    ///
    /// # Errors
    ///
    /// Returns `StorageNotConfigured` or `ModelLoading`.
    pub fn load(&self, force: bool) -> CoreResult<CommitReport> {
        let _gate = self.gate();
        self.load_locked(force)
    }

    /// Loads a single collection of shard `S` from storage.
    ///
    /// # Errors
    ///
    /// Returns `StorageNotConfigured` or `ModelLoading`.
    pub fn load_collection<S: Shard>(&self, name: &str, force: bool) -> CoreResult<CommitReport> {
        let _gate = self.gate();
        let storage = Arc::clone(self.storage()?);
        let mut snapshot = self.inner.view.create_snapshot(CancellationToken::new());
        load_one_collection::<S>(&mut snapshot, storage.as_ref(), name, force)
            .map_err(CoreError::model_loading)?;
        debug!(
            shard = S::NAME,
            collection = name,
            records = snapshot.changes().record_count(),
            "collection loaded"
        );
        self.commit(snapshot, &mut |_| {}, false)
    }

    /// Subscribes to every commit.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionAlreadyExists` for a repeated handler.
    pub fn subscribe(&self, handler: Handler) -> CoreResult<SubscriptionId> {
        self.subscribe_scope(SubscriptionScope::All, handler)
    }

    /// Subscribes to commits touching shard `S`.
    ///
    /// # Errors
    ///
    /// Returns `ShardNotRegistered` or `SubscriptionAlreadyExists`.
    pub fn subscribe_shard<S: Shard>(&self, handler: Handler) -> CoreResult<SubscriptionId> {
        if !self.model().contains_shard(S::NAME) {
            return Err(CoreError::shard_not_registered(S::NAME));
        }
        self.subscribe_scope(SubscriptionScope::Shard(S::NAME), handler)
    }

    /// Subscribes to commits touching one collection.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPropertySubscription` if the collection does not exist
    /// with these types, or `SubscriptionAlreadyExists`.
    pub fn subscribe_collection<S: Shard, E: Entity, P: Properties>(
        &self,
        name: &'static str,
        handler: Handler,
    ) -> CoreResult<SubscriptionId> {
        let scope = SubscriptionScope::collection::<S, E, P>(&self.model(), name)?;
        self.subscribe_scope(scope, handler)
    }

    /// Subscribes to commits touching one relation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPropertySubscription` if the relation does not exist
    /// with these types, or `SubscriptionAlreadyExists`.
    pub fn subscribe_relation<S: Shard, PE: Entity, CE: Entity>(
        &self,
        name: &'static str,
        handler: Handler,
    ) -> CoreResult<SubscriptionId> {
        let scope = SubscriptionScope::relation::<S, PE, CE>(&self.model(), name)?;
        self.subscribe_scope(scope, handler)
    }

    /// Subscribes to commits touching one entity of a collection.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe_collection`](Self::subscribe_collection).
    pub fn subscribe_entity<S: Shard, E: Entity, P: Properties>(
        &self,
        name: &'static str,
        entity: E,
        handler: Handler,
    ) -> CoreResult<SubscriptionId> {
        let scope = SubscriptionScope::entity::<S, E, P>(&self.model(), name, entity)?;
        self.subscribe_scope(scope, handler)
    }

    /// Subscribes with an explicit scope.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionAlreadyExists` for a repeated handler.
    pub fn subscribe_scope(
        &self,
        scope: SubscriptionScope,
        handler: Handler,
    ) -> CoreResult<SubscriptionId> {
        self.inner.subscriptions.add(scope, handler)
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscriptions.remove(id)
    }

    pub(crate) fn gate(&self) -> MutexGuard<'_, ()> {
        self.inner.write_lock.lock()
    }

    /// Runs `job` on the scheduler, catching panics, and returns its ticket.
    pub(crate) fn submit_job<T, J>(&self, cancel: CancellationToken, job: J) -> CoreResult<CommandTicket<T>>
    where
        T: Send + 'static,
        J: FnOnce(CancellationToken) -> CoreResult<T> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let token = cancel.clone();
        self.inner.scheduler.schedule(Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| job(token)))
                .unwrap_or_else(|payload| {
                    Err(CoreError::command_invocation(panic_message(payload).into()))
                });
            // The caller may have dropped the ticket.
            let _ = sender.send(result);
        }))?;
        Ok(CommandTicket::new(receiver, cancel))
    }

    pub(crate) fn run_locked<T, F>(
        &self,
        cancel: CancellationToken,
        command: F,
        on_commit: CommitHook<'_>,
    ) -> CoreResult<(T, CommitReport)>
    where
        F: FnOnce(&mut Snapshot) -> Result<T, CommandError>,
    {
        let mut snapshot = self.inner.view.create_snapshot(cancel);
        let value = command(&mut snapshot).map_err(CoreError::command_invocation)?;
        let report = self.commit(snapshot, on_commit, true)?;
        Ok((value, report))
    }

    pub(crate) fn apply_locked(
        &self,
        changes: &ModelChanges,
        on_commit: CommitHook<'_>,
    ) -> CoreResult<CommitReport> {
        let mut snapshot = self.inner.view.create_snapshot(CancellationToken::new());
        snapshot
            .apply(changes)
            .map_err(CoreError::apply_model_changes)?;
        self.commit(snapshot, on_commit, true)
    }

    pub(crate) fn save_locked(&self) -> CoreResult<()> {
        let storage = self.storage()?;
        let model = self.model();
        let images = model.images().map_err(CoreError::model_save)?;
        storage
            .save(&images)
            .map_err(|err| CoreError::model_save(err.into()))?;
        debug!(shards = model.shard_names().count(), "model saved");
        Ok(())
    }

    pub(crate) fn update_locked(&self, changes: &ModelChanges) -> CoreResult<()> {
        let storage = self.storage()?;
        let frames = changes
            .to_images(&self.model())
            .map_err(CoreError::model_save)?;
        storage
            .update(&frames)
            .map_err(|err| CoreError::model_save(err.into()))?;
        debug!(records = changes.record_count(), "model updated");
        Ok(())
    }

    pub(crate) fn load_locked(&self, force: bool) -> CoreResult<CommitReport> {
        let storage = Arc::clone(self.storage()?);
        let mut snapshot = self.inner.view.create_snapshot(CancellationToken::new());
        load_shards(&mut snapshot, storage.as_ref(), force).map_err(CoreError::model_loading)?;
        debug!(
            records = snapshot.changes().record_count(),
            force, "model loaded"
        );
        self.commit(snapshot, &mut |_| {}, false)
    }

    /// Publishes the snapshot if it changed anything.
    ///
    /// Subscribers and write-through run after the swap; their failures are
    /// returned but the new model stays published.
    fn commit(
        &self,
        snapshot: Snapshot,
        on_commit: CommitHook<'_>,
        write_through: bool,
    ) -> CoreResult<CommitReport> {
        if !snapshot.has_changes() {
            debug!("no changes, snapshot discarded");
            return Ok(CommitReport::discarded());
        }
        let (model, changes) = snapshot.into_model();
        let changes = Arc::new(changes);
        let new = Arc::new(model);
        let old = self.inner.view.publish(Arc::clone(&new));
        debug!(
            shards = changes.changed_shards().count(),
            records = changes.record_count(),
            "committed"
        );
        on_commit(&changes);

        let notified = self.inner.subscriptions.notify(&ModelChangedEvent {
            old,
            new,
            changes: Arc::clone(&changes),
        });
        if write_through && self.inner.config.write_through {
            self.update_locked(&changes)?;
        }
        notified?;
        Ok(CommitReport {
            outcome: CommitOutcome::Committed,
            changes,
        })
    }
}

fn load_shards(snapshot: &mut Snapshot, storage: &dyn Storage, force: bool) -> CoreResult<()> {
    for schema in snapshot.base().schemas()? {
        let image = storage.load(&schema)?;
        snapshot.load_shard(&image, force)?;
    }
    Ok(())
}

fn load_one_collection<S: Shard>(
    snapshot: &mut Snapshot,
    storage: &dyn Storage,
    name: &str,
    force: bool,
) -> CoreResult<()> {
    let schema = snapshot
        .base()
        .shard_schema(S::NAME)
        .ok_or_else(|| CoreError::shard_not_registered(S::NAME))?;
    let info = schema
        .collection(name)
        .ok_or_else(|| CoreError::unknown_set(format!("{}.{name}", S::NAME)))?;
    let rows = storage.load_collection(info)?;
    snapshot.load_collection(&rows, force)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "command panicked".to_string(),
        },
    }
}

/// Builder for [`DomainModel`].
pub struct DomainModelBuilder {
    model: Model,
    storage: Option<Arc<dyn Storage>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    config: EngineConfig,
}

impl DomainModelBuilder {
    /// Starts from the initial model.
    pub fn new(model: Model) -> Self {
        Self {
            model,
            storage: None,
            scheduler: None,
            config: EngineConfig::default(),
        }
    }

    /// Sets the storage used by save, update, load and write-through.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the scheduler used by `submit` (default: inline).
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the domain model.
    pub fn build(self) -> DomainModel {
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(InlineScheduler));
        DomainModel {
            inner: Arc::new(DomainInner {
                view: View::new(self.model),
                write_lock: Mutex::new(()),
                subscriptions: Subscriptions::default(),
                storage: self.storage,
                scheduler,
                config: self.config,
            }),
        }
    }

    /// Builds the domain model with a dedicated worker thread named after
    /// [`EngineConfig::worker_name`].
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn build_with_worker(mut self) -> CoreResult<DomainModel> {
        let worker = WorkerScheduler::new(self.config.worker_name.clone())?;
        self.scheduler = Some(Arc::new(worker));
        Ok(self.build())
    }
}
