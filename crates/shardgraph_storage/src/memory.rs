//! In-memory repository for testing.

use crate::error::{StorageError, StorageResult};
use crate::image::{
    decode_frames, encode_frames, ChangeId, EntityKey, FrameImage, HistoryEntry, Link, LinkChange,
    Row, RowChange,
};
use crate::repository::Repository;
use crate::schema::{CollectionInfo, RelationInfo, ShardSchema};
use parking_lot::RwLock;
use shardgraph_codec::PropertyBag;
use std::collections::{BTreeMap, BTreeSet, HashMap};

type Table = BTreeMap<EntityKey, PropertyBag>;

#[derive(Debug, Clone)]
struct StoredChange {
    change_id: ChangeId,
    timestamp_ms: u64,
    payload: Vec<u8>,
}

/// An in-memory [`Repository`].
///
/// Tables are keyed by the qualified set name (`shard.set`). Rows are
/// validated against their descriptor on every write, and history entries
/// are kept as CBOR payloads so reads exercise the same decoding path a
/// durable backend would.
///
/// # Thread Safety
///
/// This repository is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust,ignore
/// use shardgraph_storage::{MemoryRepository, Repository};
///
/// let repo = MemoryRepository::new();
/// repo.save_collection(&info, &rows)?;
/// assert_eq!(repo.load_collection(&info)?, rows);
/// ```
#[derive(Debug, Default)]
pub struct MemoryRepository {
    collections: RwLock<HashMap<String, Table>>,
    relations: RwLock<HashMap<String, BTreeSet<Link>>>,
    changes: RwLock<Vec<StoredChange>>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows in a collection.
    #[must_use]
    pub fn row_count(&self, info: &CollectionInfo) -> usize {
        self.collections
            .read()
            .get(&info.qualified_name())
            .map_or(0, BTreeMap::len)
    }

    /// Number of stored pairs in a relation.
    #[must_use]
    pub fn link_count(&self, info: &RelationInfo) -> usize {
        self.relations
            .read()
            .get(&info.qualified_name())
            .map_or(0, BTreeSet::len)
    }

    /// Number of stored history entries.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.changes.read().len()
    }
}

fn apply_row_changes(
    info: &CollectionInfo,
    table: &mut Table,
    changes: &[RowChange],
) -> StorageResult<()> {
    for change in changes {
        match change {
            RowChange::Add { entity, new } => {
                info.validate(new)?;
                if table.insert(*entity, new.clone()).is_some() {
                    return Err(StorageError::conflict(
                        info.qualified_name(),
                        "add of a stored row",
                    ));
                }
            }
            RowChange::Modify { entity, new, .. } => {
                info.validate(new)?;
                match table.get_mut(entity) {
                    Some(row) => *row = new.clone(),
                    None => {
                        return Err(StorageError::conflict(
                            info.qualified_name(),
                            "modify of a missing row",
                        ))
                    }
                }
            }
            RowChange::Remove { entity, .. } => {
                if table.remove(entity).is_none() {
                    return Err(StorageError::conflict(
                        info.qualified_name(),
                        "remove of a missing row",
                    ));
                }
            }
        }
    }
    Ok(())
}

fn apply_link_changes(
    info: &RelationInfo,
    links: &mut BTreeSet<Link>,
    changes: &[LinkChange],
) -> StorageResult<()> {
    for change in changes {
        let applied = match change {
            LinkChange::Link(link) => links.insert(*link),
            LinkChange::Unlink(link) => links.remove(link),
        };
        if !applied {
            return Err(StorageError::conflict(
                info.qualified_name(),
                format!("{change:?} does not fit the stored pairs"),
            ));
        }
    }
    Ok(())
}

impl Repository for MemoryRepository {
    fn save_collection(&self, info: &CollectionInfo, rows: &[Row]) -> StorageResult<()> {
        let mut table = Table::new();
        for row in rows {
            info.validate(&row.props)?;
            table.insert(row.entity, row.props.clone());
        }
        self.collections.write().insert(info.qualified_name(), table);
        Ok(())
    }

    fn save_relation(&self, info: &RelationInfo, links: &[Link]) -> StorageResult<()> {
        self.relations
            .write()
            .insert(info.qualified_name(), links.iter().copied().collect());
        Ok(())
    }

    fn update_collection(
        &self,
        info: &CollectionInfo,
        changes: &[RowChange],
    ) -> StorageResult<()> {
        let mut collections = self.collections.write();
        let name = info.qualified_name();
        // Work on a copy so a failing record leaves the table untouched.
        let mut table = collections.get(&name).cloned().unwrap_or_default();
        apply_row_changes(info, &mut table, changes)?;
        collections.insert(name, table);
        Ok(())
    }

    fn update_relation(&self, info: &RelationInfo, changes: &[LinkChange]) -> StorageResult<()> {
        let mut relations = self.relations.write();
        let name = info.qualified_name();
        let mut links = relations.get(&name).cloned().unwrap_or_default();
        apply_link_changes(info, &mut links, changes)?;
        relations.insert(name, links);
        Ok(())
    }

    fn load_collection(&self, info: &CollectionInfo) -> StorageResult<Vec<Row>> {
        Ok(self
            .collections
            .read()
            .get(&info.qualified_name())
            .map(|table| {
                table
                    .iter()
                    .map(|(entity, props)| Row::new(*entity, props.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn load_relation(&self, info: &RelationInfo) -> StorageResult<Vec<Link>> {
        Ok(self
            .relations
            .read()
            .get(&info.qualified_name())
            .map(|links| links.iter().copied().collect())
            .unwrap_or_default())
    }

    fn save_change(
        &self,
        change_id: ChangeId,
        timestamp_ms: u64,
        frames: &[FrameImage],
    ) -> StorageResult<()> {
        let payload = encode_frames(frames)?;
        self.changes.write().push(StoredChange {
            change_id,
            timestamp_ms,
            payload,
        });
        Ok(())
    }

    fn load_changes(&self, schemas: &[ShardSchema]) -> StorageResult<Vec<HistoryEntry>> {
        self.changes
            .read()
            .iter()
            .map(|stored| {
                Ok(HistoryEntry {
                    change_id: stored.change_id,
                    timestamp_ms: stored.timestamp_ms,
                    frames: decode_frames(&stored.payload, schemas)?,
                })
            })
            .collect()
    }

    fn clear_changes(&self) -> StorageResult<()> {
        self.changes.write().clear();
        Ok(())
    }
}
