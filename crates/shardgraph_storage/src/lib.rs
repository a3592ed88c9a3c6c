//! # ShardGraph Storage
//!
//! Persistence ports and the in-memory reference backend for ShardGraph.
//!
//! The engine never talks to a database directly. It converts shards and
//! change frames to erased images and hands them to a [`Storage`]. Most
//! backends only need to implement the table-level [`Repository`] port and
//! wrap it in a [`RepositoryStorage`].
//!
//! ## Design Principles
//!
//! - Backends see keys and property bags, never Rust entity types
//! - Set descriptors are static and carry the expected column kinds
//! - History entries are stored as canonical CBOR payloads
//! - Must be `Send + Sync` so a storage can be shared with a worker thread
//!
//! ## Available Backends
//!
//! - [`MemoryRepository`] - For testing and ephemeral models

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod image;
mod memory;
mod repository;
mod schema;
mod storage;

pub use error::{StorageError, StorageResult};
pub use image::{
    decode_frames, encode_frames, ChangeId, CollectionDelta, CollectionRows, EntityKey,
    FrameImage, HistoryEntry, Link, LinkChange, RecordImage, RelationDelta, RelationLinks, Row,
    RowChange, ShardImage,
};
pub use memory::MemoryRepository;
pub use repository::Repository;
pub use schema::{CollectionInfo, PropertyInfo, RelationInfo, RelationKind, ShardSchema};
pub use storage::{RepositoryStorage, Storage};

#[cfg(test)]
mod tests {
    use super::*;
    use shardgraph_codec::{PropertyBag, ValueKind};

    const TITLED: &[PropertyInfo] = &[PropertyInfo::new("title", ValueKind::Text)];

    fn schema() -> ShardSchema {
        let mut schema = ShardSchema::new("library");
        schema.collections.push(CollectionInfo {
            shard: "library",
            name: "books",
            entity: "Book",
            properties: TITLED,
        });
        schema.relations.push(RelationInfo {
            shard: "library",
            name: "written_by",
            parent: "Book",
            child: "Author",
            kind: RelationKind::OneToOne,
        });
        schema
    }

    fn image(schema: &ShardSchema) -> ShardImage {
        let mut image = ShardImage::new("library");
        image.collections.push(CollectionRows {
            info: schema.collections[0],
            rows: vec![Row::new([1; 16], PropertyBag::new().with("title", "Dune"))],
        });
        image.relations.push(RelationLinks {
            info: schema.relations[0],
            links: vec![Link::new([1; 16], [5; 16])],
        });
        image
    }

    #[test]
    fn save_then_load_shard() {
        let schema = schema();
        let storage = RepositoryStorage::new(MemoryRepository::new());
        storage.save(&[image(&schema)]).unwrap();
        assert_eq!(storage.load(&schema).unwrap(), image(&schema));
    }

    #[test]
    fn lazy_collection_load() {
        let schema = schema();
        let storage = RepositoryStorage::new(MemoryRepository::new());
        storage.save(&[image(&schema)]).unwrap();
        let rows = storage.load_collection(&schema.collections[0]).unwrap();
        assert_eq!(rows.rows.len(), 1);
    }

    #[test]
    fn update_routes_deltas() {
        let schema = schema();
        let storage = RepositoryStorage::new(MemoryRepository::new());
        storage.save(&[image(&schema)]).unwrap();

        let mut frame = FrameImage::new("library");
        frame.relations.push(RelationDelta {
            info: schema.relations[0],
            changes: vec![LinkChange::Unlink(Link::new([1; 16], [5; 16]))],
        });
        storage.update(&[frame]).unwrap();
        assert_eq!(storage.repository().link_count(&schema.relations[0]), 0);
        assert_eq!(storage.repository().row_count(&schema.collections[0]), 1);
    }

    #[test]
    fn save_history_replaces_entries() {
        let schema = schema();
        let storage = RepositoryStorage::new(MemoryRepository::new());
        let entry = |n: u8| HistoryEntry {
            change_id: [n; 16],
            timestamp_ms: u64::from(n),
            frames: vec![FrameImage::new("library")],
        };
        storage.save_history(&[entry(1), entry(2)]).unwrap();
        storage.save_history(&[entry(3)]).unwrap();
        let loaded = storage.load_history(&[schema]).unwrap();
        assert_eq!(loaded, vec![entry(3)]);
    }
}
