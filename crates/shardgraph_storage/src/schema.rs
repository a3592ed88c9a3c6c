//! Static schema descriptors.
//!
//! Descriptors are produced once per properties/relation type and handed to
//! backends for schema creation and row validation.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use shardgraph_codec::{PropertyBag, ValueKind};

/// One column of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyInfo {
    /// Property name.
    pub name: &'static str,
    /// Declared kind.
    pub kind: ValueKind,
    /// Whether null is allowed.
    pub nullable: bool,
}

impl PropertyInfo {
    /// Creates a required property.
    #[must_use]
    pub const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
        }
    }

    /// Creates a nullable property.
    #[must_use]
    pub const fn nullable(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
        }
    }
}

/// Multiplicity of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Each parent has at most one child.
    OneToOne,
    /// A parent may have any number of children.
    OneToMany,
}

/// Descriptor of a collection inside a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Owning shard name.
    pub shard: &'static str,
    /// Collection name, unique within the shard.
    pub name: &'static str,
    /// Entity type name.
    pub entity: &'static str,
    /// Ordered property descriptors.
    pub properties: &'static [PropertyInfo],
}

impl CollectionInfo {
    /// Returns `shard.name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.shard, self.name)
    }

    /// Looks up a property descriptor.
    pub fn property(&self, name: &str) -> Option<&PropertyInfo> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Checks a row against the descriptor.
    ///
    /// Every declared property must be present (or nullable) with the
    /// declared kind. Undeclared properties are rejected.
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolation` naming the first offending property.
    pub fn validate(&self, bag: &PropertyBag) -> StorageResult<()> {
        for info in self.properties {
            match bag.value(info.name).and_then(|v| v.kind()) {
                Some(kind) if kind == info.kind => {}
                Some(kind) => {
                    return Err(StorageError::schema_violation(
                        self.qualified_name(),
                        format!("{} is {kind}, expected {}", info.name, info.kind),
                    ));
                }
                None if info.nullable => {}
                None => {
                    return Err(StorageError::schema_violation(
                        self.qualified_name(),
                        format!("{} is required", info.name),
                    ));
                }
            }
        }
        if let Some(extra) = bag.names().find(|name| self.property(name).is_none()) {
            return Err(StorageError::schema_violation(
                self.qualified_name(),
                format!("undeclared property {extra}"),
            ));
        }
        Ok(())
    }
}

/// Descriptor of a relation inside a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationInfo {
    /// Owning shard name.
    pub shard: &'static str,
    /// Relation name, unique within the shard.
    pub name: &'static str,
    /// Parent entity type name.
    pub parent: &'static str,
    /// Child entity type name.
    pub child: &'static str,
    /// Multiplicity.
    pub kind: RelationKind,
}

impl RelationInfo {
    /// Returns `shard.name`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.shard, self.name)
    }
}

/// All descriptors of one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSchema {
    /// Shard name.
    pub name: &'static str,
    /// Collections in declaration order.
    pub collections: Vec<CollectionInfo>,
    /// Relations in declaration order.
    pub relations: Vec<RelationInfo>,
}

impl ShardSchema {
    /// Creates an empty schema.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            collections: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Finds a collection descriptor by name.
    pub fn collection(&self, name: &str) -> Option<&CollectionInfo> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Finds a relation descriptor by name.
    pub fn relation(&self, name: &str) -> Option<&RelationInfo> {
        self.relations.iter().find(|r| r.name == name)
    }
}
