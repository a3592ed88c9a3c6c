//! Repository port.

use crate::error::StorageResult;
use crate::image::{ChangeId, FrameImage, HistoryEntry, Link, LinkChange, Row, RowChange};
use crate::schema::{CollectionInfo, RelationInfo, ShardSchema};

/// A table-level persistence backend.
///
/// A repository stores collections as rows and relations as pairs, and
/// keeps an append-only list of history entries. It knows nothing about
/// shards or Rust entity types: everything arrives as erased images
/// described by static schema descriptors.
///
/// # Invariants
///
/// - `save_*` replaces the whole content of a set
/// - `update_*` applies the records in order and fails without partial
///   effects if one of them does not fit the stored state
/// - `load_*` of a set that was never saved returns an empty list
/// - implementations are `Send + Sync`; all methods take `&self`
///
/// # Implementors
///
/// - [`super::MemoryRepository`] - in-memory reference backend
pub trait Repository: Send + Sync {
    /// Replaces the content of a collection.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolation` if a row does not match `info`.
    fn save_collection(&self, info: &CollectionInfo, rows: &[Row]) -> StorageResult<()>;

    /// Replaces the content of a relation.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the write fails.
    fn save_relation(&self, info: &RelationInfo, links: &[Link]) -> StorageResult<()>;

    /// Applies collection records in order.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if a record does not fit the stored rows and
    /// `SchemaViolation` if a new row is invalid.
    fn update_collection(&self, info: &CollectionInfo, changes: &[RowChange])
        -> StorageResult<()>;

    /// Applies relation records in order.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if a record does not fit the stored pairs.
    fn update_relation(&self, info: &RelationInfo, changes: &[LinkChange]) -> StorageResult<()>;

    /// Reads every row of a collection, ordered by entity key.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    fn load_collection(&self, info: &CollectionInfo) -> StorageResult<Vec<Row>>;

    /// Reads every pair of a relation, ordered by (parent, child).
    ///
    /// # Errors
    ///
    /// Returns a backend error if the read fails.
    fn load_relation(&self, info: &RelationInfo) -> StorageResult<Vec<Link>>;

    /// Appends one history entry.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the frames cannot be encoded.
    fn save_change(
        &self,
        change_id: ChangeId,
        timestamp_ms: u64,
        frames: &[FrameImage],
    ) -> StorageResult<()>;

    /// Reads all history entries in insertion order, resolving set names
    /// against `schemas`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSet` if an entry names a set missing from `schemas`.
    fn load_changes(&self, schemas: &[ShardSchema]) -> StorageResult<Vec<HistoryEntry>>;

    /// Drops all history entries.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the write fails.
    fn clear_changes(&self) -> StorageResult<()>;
}
