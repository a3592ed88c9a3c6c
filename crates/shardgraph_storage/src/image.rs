//! Erased persistence images.
//!
//! The core crate is generic over entity and properties types; backends are
//! not. Everything that crosses the storage boundary is converted to one of
//! the images below, which only carry entity keys and [`PropertyBag`]s.

use crate::error::{StorageError, StorageResult};
use crate::schema::{CollectionInfo, RelationInfo, ShardSchema};
use serde::{Deserialize, Serialize};
use shardgraph_codec::{from_cbor, to_cbor, PropertyBag};
use std::fmt;

/// Raw 16-byte entity identifier.
pub type EntityKey = [u8; 16];

/// Raw 16-byte identifier of a history entry.
pub type ChangeId = [u8; 16];

/// One stored collection row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Entity key.
    pub entity: EntityKey,
    /// Properties of the entity.
    pub props: PropertyBag,
}

impl Row {
    /// Creates a row.
    pub fn new(entity: EntityKey, props: PropertyBag) -> Self {
        Self { entity, props }
    }
}

/// One stored relation pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Parent entity key.
    pub parent: EntityKey,
    /// Child entity key.
    pub child: EntityKey,
}

impl Link {
    /// Creates a link.
    pub const fn new(parent: EntityKey, child: EntityKey) -> Self {
        Self { parent, child }
    }
}

/// Erased collection change record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowChange {
    /// The entity was added.
    Add {
        /// Entity key.
        entity: EntityKey,
        /// Added properties.
        new: PropertyBag,
    },
    /// The entity's properties were replaced.
    Modify {
        /// Entity key.
        entity: EntityKey,
        /// Properties before.
        old: PropertyBag,
        /// Properties after.
        new: PropertyBag,
    },
    /// The entity was removed.
    Remove {
        /// Entity key.
        entity: EntityKey,
        /// Removed properties.
        old: PropertyBag,
    },
}

impl RowChange {
    /// Key of the changed entity.
    pub fn entity(&self) -> EntityKey {
        match self {
            RowChange::Add { entity, .. }
            | RowChange::Modify { entity, .. }
            | RowChange::Remove { entity, .. } => *entity,
        }
    }
}

/// Erased relation change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkChange {
    /// The pair was linked.
    Link(Link),
    /// The pair was unlinked.
    Unlink(Link),
}

impl LinkChange {
    /// The affected pair.
    pub fn link(&self) -> Link {
        match self {
            LinkChange::Link(link) | LinkChange::Unlink(link) => *link,
        }
    }
}

/// Either kind of erased record.
///
/// Used where a record has to be reported without knowing its type, most
/// notably in change-sequence errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordImage {
    /// Collection record.
    Row(RowChange),
    /// Relation record.
    Link(LinkChange),
}

impl fmt::Display for RecordImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = |key: &EntityKey| -> String { key.iter().map(|b| format!("{b:02x}")).collect() };
        match self {
            RecordImage::Row(RowChange::Add { entity, .. }) => write!(f, "Add({})", hex(entity)),
            RecordImage::Row(RowChange::Modify { entity, .. }) => {
                write!(f, "Modify({})", hex(entity))
            }
            RecordImage::Row(RowChange::Remove { entity, .. }) => {
                write!(f, "Remove({})", hex(entity))
            }
            RecordImage::Link(LinkChange::Link(l)) => {
                write!(f, "Link({}, {})", hex(&l.parent), hex(&l.child))
            }
            RecordImage::Link(LinkChange::Unlink(l)) => {
                write!(f, "Unlink({}, {})", hex(&l.parent), hex(&l.child))
            }
        }
    }
}

/// Ordered changes of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDelta {
    /// Target collection.
    pub info: CollectionInfo,
    /// Records in order.
    pub changes: Vec<RowChange>,
}

/// Ordered changes of one relation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDelta {
    /// Target relation.
    pub info: RelationInfo,
    /// Records in order.
    pub changes: Vec<LinkChange>,
}

/// All changes of one shard produced by one command (or merged batch).
#[derive(Debug, Clone, PartialEq)]
pub struct FrameImage {
    /// Shard name.
    pub shard: &'static str,
    /// Touched collections.
    pub collections: Vec<CollectionDelta>,
    /// Touched relations.
    pub relations: Vec<RelationDelta>,
}

impl FrameImage {
    /// Creates an empty frame image.
    pub fn new(shard: &'static str) -> Self {
        Self {
            shard,
            collections: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Returns true if no set in the frame carries a record.
    pub fn is_empty(&self) -> bool {
        self.collections.iter().all(|c| c.changes.is_empty())
            && self.relations.iter().all(|r| r.changes.is_empty())
    }
}

/// Full content of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRows {
    /// Source collection.
    pub info: CollectionInfo,
    /// Rows ordered by entity key.
    pub rows: Vec<Row>,
}

/// Full content of one relation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationLinks {
    /// Source relation.
    pub info: RelationInfo,
    /// Pairs ordered by (parent, child).
    pub links: Vec<Link>,
}

/// Full content of one shard.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardImage {
    /// Shard name.
    pub shard: &'static str,
    /// Collections in declaration order.
    pub collections: Vec<CollectionRows>,
    /// Relations in declaration order.
    pub relations: Vec<RelationLinks>,
}

impl ShardImage {
    /// Creates an empty image.
    pub fn new(shard: &'static str) -> Self {
        Self {
            shard,
            collections: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Finds a collection by name.
    pub fn collection(&self, name: &str) -> Option<&CollectionRows> {
        self.collections.iter().find(|c| c.info.name == name)
    }

    /// Finds a relation by name.
    pub fn relation(&self, name: &str) -> Option<&RelationLinks> {
        self.relations.iter().find(|r| r.info.name == name)
    }
}

/// One persisted undo entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Unique id of the entry.
    pub change_id: ChangeId,
    /// Milliseconds since the Unix epoch at commit time.
    pub timestamp_ms: u64,
    /// Changes, one frame per touched shard.
    pub frames: Vec<FrameImage>,
}

/// Name-addressed form of a [`FrameImage`] used for history payloads.
///
/// Descriptors are static, so a stored frame refers to its sets by name and
/// is resolved against the caller's schemas when read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredFrame {
    shard: String,
    collections: Vec<(String, Vec<RowChange>)>,
    relations: Vec<(String, Vec<LinkChange>)>,
}

impl StoredFrame {
    fn from_image(frame: &FrameImage) -> Self {
        Self {
            shard: frame.shard.to_string(),
            collections: frame
                .collections
                .iter()
                .map(|c| (c.info.name.to_string(), c.changes.clone()))
                .collect(),
            relations: frame
                .relations
                .iter()
                .map(|r| (r.info.name.to_string(), r.changes.clone()))
                .collect(),
        }
    }

    fn resolve(self, schemas: &[ShardSchema]) -> StorageResult<FrameImage> {
        let schema = schemas
            .iter()
            .find(|s| s.name == self.shard)
            .ok_or_else(|| StorageError::unknown_set(self.shard.clone()))?;
        let mut image = FrameImage::new(schema.name);
        for (name, changes) in self.collections {
            let info = schema
                .collection(&name)
                .ok_or_else(|| StorageError::unknown_set(format!("{}.{name}", schema.name)))?;
            image.collections.push(CollectionDelta {
                info: *info,
                changes,
            });
        }
        for (name, changes) in self.relations {
            let info = schema
                .relation(&name)
                .ok_or_else(|| StorageError::unknown_set(format!("{}.{name}", schema.name)))?;
            image.relations.push(RelationDelta {
                info: *info,
                changes,
            });
        }
        Ok(image)
    }
}

/// Encodes the frames of a history entry as canonical CBOR.
///
/// # Errors
///
/// Returns a codec error if encoding fails.
pub fn encode_frames(frames: &[FrameImage]) -> StorageResult<Vec<u8>> {
    let stored: Vec<StoredFrame> = frames.iter().map(StoredFrame::from_image).collect();
    Ok(to_cbor(&stored)?)
}

/// Decodes history frames and resolves them against `schemas`.
///
/// # Errors
///
/// Returns a codec error for malformed bytes and `UnknownSet` when a frame
/// names a shard or set missing from `schemas`.
pub fn decode_frames(bytes: &[u8], schemas: &[ShardSchema]) -> StorageResult<Vec<FrameImage>> {
    let stored: Vec<StoredFrame> = from_cbor(bytes)?;
    stored.into_iter().map(|f| f.resolve(schemas)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PropertyInfo, RelationKind};
    use shardgraph_codec::ValueKind;

    const NAMED: &[PropertyInfo] = &[PropertyInfo::new("name", ValueKind::Text)];

    fn schema() -> ShardSchema {
        let mut schema = ShardSchema::new("people");
        schema.collections.push(CollectionInfo {
            shard: "people",
            name: "persons",
            entity: "Person",
            properties: NAMED,
        });
        schema.relations.push(RelationInfo {
            shard: "people",
            name: "friends",
            parent: "Person",
            child: "Person",
            kind: RelationKind::OneToMany,
        });
        schema
    }

    fn frame(schema: &ShardSchema) -> FrameImage {
        let mut frame = FrameImage::new("people");
        frame.collections.push(CollectionDelta {
            info: schema.collections[0],
            changes: vec![RowChange::Add {
                entity: [1; 16],
                new: PropertyBag::new().with("name", "Ada"),
            }],
        });
        frame.relations.push(RelationDelta {
            info: schema.relations[0],
            changes: vec![LinkChange::Link(Link::new([1; 16], [2; 16]))],
        });
        frame
    }

    #[test]
    fn frames_survive_encoding() {
        let schema = schema();
        let frames = vec![frame(&schema)];
        let bytes = encode_frames(&frames).unwrap();
        let decoded = decode_frames(&bytes, &[schema]).unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn unknown_shard_is_rejected() {
        let schema = schema();
        let bytes = encode_frames(&[frame(&schema)]).unwrap();
        let err = decode_frames(&bytes, &[ShardSchema::new("library")]).unwrap_err();
        assert!(matches!(err, StorageError::UnknownSet { ref name } if name == "people"));
    }

    #[test]
    fn unknown_collection_is_rejected() {
        let schema = schema();
        let bytes = encode_frames(&[frame(&schema)]).unwrap();
        let mut other = ShardSchema::new("people");
        other.relations = schema.relations.clone();
        let err = decode_frames(&bytes, &[other]).unwrap_err();
        assert!(matches!(err, StorageError::UnknownSet { ref name } if name == "people.persons"));
    }

    #[test]
    fn frame_emptiness() {
        let schema = schema();
        assert!(FrameImage::new("people").is_empty());
        assert!(!frame(&schema).is_empty());
    }

    #[test]
    fn record_display() {
        let record = RecordImage::Link(LinkChange::Unlink(Link::new([0; 16], [255; 16])));
        let text = record.to_string();
        assert!(text.starts_with("Unlink(0000"));
        assert!(text.ends_with("ffff)"));
    }
}
