//! Shard-level storage port and its repository adapter.

use crate::error::StorageResult;
use crate::image::{CollectionRows, FrameImage, HistoryEntry, RelationLinks, ShardImage};
use crate::repository::Repository;
use crate::schema::{CollectionInfo, ShardSchema};

/// Shard-level persistence used by the domain model.
///
/// Where a [`Repository`] deals in single tables, a `Storage` deals in whole
/// shard images and change frames.
pub trait Storage: Send + Sync {
    /// Writes the full content of every given shard.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn save(&self, shards: &[ShardImage]) -> StorageResult<()>;

    /// Applies change frames to the stored state.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn update(&self, frames: &[FrameImage]) -> StorageResult<()>;

    /// Reads the full content of one shard.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn load(&self, schema: &ShardSchema) -> StorageResult<ShardImage>;

    /// Reads one collection on demand.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn load_collection(&self, info: &CollectionInfo) -> StorageResult<CollectionRows>;

    /// Replaces the persisted history with `entries`.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn save_history(&self, entries: &[HistoryEntry]) -> StorageResult<()>;

    /// Reads the persisted history, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn load_history(&self, schemas: &[ShardSchema]) -> StorageResult<Vec<HistoryEntry>>;
}

/// Adapts any [`Repository`] to the [`Storage`] port.
///
/// # Example
///
/// ```rust,ignore
/// use shardgraph_storage::{MemoryRepository, RepositoryStorage};
///
/// let storage = RepositoryStorage::new(MemoryRepository::new());
/// storage.save(&images)?;
/// ```
#[derive(Debug, Default)]
pub struct RepositoryStorage<R> {
    repository: R,
}

impl<R: Repository> RepositoryStorage<R> {
    /// Wraps a repository.
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Returns the wrapped repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }
}

impl<R: Repository> Storage for RepositoryStorage<R> {
    fn save(&self, shards: &[ShardImage]) -> StorageResult<()> {
        for shard in shards {
            for collection in &shard.collections {
                self.repository
                    .save_collection(&collection.info, &collection.rows)?;
            }
            for relation in &shard.relations {
                self.repository
                    .save_relation(&relation.info, &relation.links)?;
            }
        }
        Ok(())
    }

    fn update(&self, frames: &[FrameImage]) -> StorageResult<()> {
        for frame in frames {
            for delta in frame.collections.iter().filter(|d| !d.changes.is_empty()) {
                self.repository.update_collection(&delta.info, &delta.changes)?;
            }
            for delta in frame.relations.iter().filter(|d| !d.changes.is_empty()) {
                self.repository.update_relation(&delta.info, &delta.changes)?;
            }
        }
        Ok(())
    }

    fn load(&self, schema: &ShardSchema) -> StorageResult<ShardImage> {
        let mut image = ShardImage::new(schema.name);
        for info in &schema.collections {
            image.collections.push(self.load_collection(info)?);
        }
        for info in &schema.relations {
            image.relations.push(RelationLinks {
                info: *info,
                links: self.repository.load_relation(info)?,
            });
        }
        Ok(image)
    }

    fn load_collection(&self, info: &CollectionInfo) -> StorageResult<CollectionRows> {
        Ok(CollectionRows {
            info: *info,
            rows: self.repository.load_collection(info)?,
        })
    }

    fn save_history(&self, entries: &[HistoryEntry]) -> StorageResult<()> {
        self.repository.clear_changes()?;
        for entry in entries {
            self.repository
                .save_change(entry.change_id, entry.timestamp_ms, &entry.frames)?;
        }
        Ok(())
    }

    fn load_history(&self, schemas: &[ShardSchema]) -> StorageResult<Vec<HistoryEntry>> {
        self.repository.load_changes(schemas)
    }
}
