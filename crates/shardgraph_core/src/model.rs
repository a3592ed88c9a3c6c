//! The immutable model: one instance per registered shard.

use crate::changes::ModelChanges;
use crate::error::{CoreError, CoreResult};
use crate::shard::{AnyShard, Shard};
use shardgraph_storage::{FrameImage, ShardImage, ShardSchema};
use std::collections::BTreeMap;
use std::sync::Arc;

/// An immutable set of shards.
///
/// Models are published through a [`View`](crate::View) and never change
/// afterwards. Cloning a model clones one `Arc` per shard.
#[derive(Debug, Clone, Default)]
pub struct Model {
    shards: BTreeMap<&'static str, Arc<dyn AnyShard>>,
}

impl Model {
    /// Returns a builder.
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    /// Returns the shard of type `S`.
    ///
    /// # Errors
    ///
    /// Returns `ShardNotRegistered` if the model has no such shard.
    pub fn shard<S: Shard>(&self) -> CoreResult<&S> {
        let shard = self
            .shards
            .get(S::NAME)
            .ok_or_else(|| CoreError::shard_not_registered(S::NAME))?;
        shard
            .as_any()
            .downcast_ref()
            .ok_or_else(|| CoreError::type_mismatch(S::NAME, "registered under another type"))
    }

    pub(crate) fn shard_dyn(&self, name: &str) -> Option<&Arc<dyn AnyShard>> {
        self.shards.get(name)
    }

    /// Returns true if a shard with this name is registered.
    pub fn contains_shard(&self, name: &str) -> bool {
        self.shards.contains_key(name)
    }

    /// Registered shard names, sorted.
    pub fn shard_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.shards.keys().copied()
    }

    /// Schema of the named shard.
    pub fn shard_schema(&self, name: &str) -> Option<ShardSchema> {
        self.shards.get(name).and_then(|shard| shard.schema().ok())
    }

    /// Schemas of all shards.
    ///
    /// # Errors
    ///
    /// Propagates visitor failures.
    pub fn schemas(&self) -> CoreResult<Vec<ShardSchema>> {
        self.shards.values().map(|shard| shard.schema()).collect()
    }

    /// Full images of all shards.
    ///
    /// # Errors
    ///
    /// Propagates visitor failures.
    pub fn images(&self) -> CoreResult<Vec<ShardImage>> {
        self.shards.values().map(|shard| shard.image()).collect()
    }

    /// Returns true if both models hold the very same instance of `S`.
    pub fn same_shard<S: Shard>(&self, other: &Model) -> bool {
        match (self.shards.get(S::NAME), other.shards.get(S::NAME)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Rebuilds typed changes from persisted frames.
    ///
    /// # Errors
    ///
    /// Returns `ShardNotRegistered` or `UnknownSet` for frames that do not
    /// fit this model, and decoding errors for malformed rows.
    pub fn decode_changes(&self, frames: &[FrameImage]) -> CoreResult<ModelChanges> {
        let mut changes = ModelChanges::new();
        for image in frames {
            let shard = self
                .shards
                .get(image.shard)
                .ok_or_else(|| CoreError::shard_not_registered(image.shard))?;
            changes.absorb(shard.decode_frame(image)?)?;
        }
        Ok(changes)
    }

    pub(crate) fn replace(&mut self, name: &'static str, shard: Arc<dyn AnyShard>) {
        self.shards.insert(name, shard);
    }
}

/// Builder for [`Model`].
///
/// # Example
///
/// ```rust,ignore
/// let model = Model::builder()
///     .shard::<PeopleShard>()
///     .shard::<LibraryShard>()
///     .build();
/// ```
#[derive(Default)]
pub struct ModelBuilder {
    shards: BTreeMap<&'static str, Arc<dyn AnyShard>>,
}

impl ModelBuilder {
    /// Registers an empty shard of type `S`.
    #[must_use]
    pub fn shard<S: Shard>(self) -> Self {
        self.with(S::default())
    }

    /// Registers a prepared shard, replacing any shard of the same name.
    #[must_use]
    pub fn with<S: Shard>(mut self, shard: S) -> Self {
        self.shards.insert(S::NAME, Arc::new(shard));
        self
    }

    /// Builds the model.
    pub fn build(self) -> Model {
        Model {
            shards: self.shards,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionRead, CollectionWrite};
    use crate::test_support::{DepotShard, ItemProps, ShopShard};

    #[test]
    fn lookup_by_type() {
        let model = Model::builder().shard::<ShopShard>().build();
        assert!(model.shard::<ShopShard>().unwrap().items.is_empty());
        assert!(matches!(
            model.shard::<DepotShard>(),
            Err(CoreError::ShardNotRegistered { .. })
        ));
        assert_eq!(model.shard_names().collect::<Vec<_>>(), vec!["shop"]);
    }

    #[test]
    fn clones_share_shards() {
        let model = Model::builder()
            .shard::<ShopShard>()
            .shard::<DepotShard>()
            .build();
        let copy = model.clone();
        assert!(model.same_shard::<ShopShard>(&copy));
        assert!(model.same_shard::<DepotShard>(&copy));
    }

    #[test]
    fn images_and_schemas_cover_every_shard() {
        let mut shop = ShopShard::default();
        shop.items
            .add(ItemProps {
                label: "lamp".into(),
            })
            .unwrap();
        let model = Model::builder()
            .with(shop)
            .shard::<DepotShard>()
            .build();

        let schemas = model.schemas().unwrap();
        assert_eq!(schemas.len(), 2);
        assert!(model.shard_schema("shop").is_some());
        assert!(model.shard_schema("warehouse").is_none());

        let images = model.images().unwrap();
        let shop = images.iter().find(|image| image.shard == "shop").unwrap();
        assert_eq!(shop.collection("items").unwrap().rows.len(), 1);
    }

    #[test]
    fn unknown_frames_are_rejected() {
        let model = Model::builder().shard::<ShopShard>().build();
        let frame = FrameImage::new("warehouse");
        assert!(matches!(
            model.decode_changes(&[frame]),
            Err(CoreError::ShardNotRegistered { .. })
        ));
    }
}
