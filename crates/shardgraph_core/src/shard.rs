//! Shards and the visitor protocol.
//!
//! A shard is a plain struct of [`CowCollection`]s and [`CowRelation`]s
//! declared with [`shard!`](crate::shard!). The engine never looks at the
//! fields directly; it walks them through [`Shard::visit`] and
//! [`Shard::visit_mut`], which is enough to build schemas, images, apply
//! change frames and load from storage.

use crate::changes::ChangesFrame;
use crate::cow::{CowCollection, CowRelation};
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::persist::{
    CollectionLoader, FrameApplier, FrameDecoder, ImageCollector, ImageLoader, SchemaCollector,
};
use crate::properties::Properties;
use shardgraph_storage::{CollectionRows, FrameImage, ShardImage, ShardSchema};
use std::any::Any;
use std::fmt;
use tracing::trace;

/// A named aggregate of collections and relations.
///
/// Implement it with [`shard!`](crate::shard!) rather than by hand.
pub trait Shard: Clone + Default + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Registry tag, unique within a model.
    const NAME: &'static str;

    /// Visits every collection, then every relation, in declaration order.
    ///
    /// # Errors
    ///
    /// Propagates the first visitor error.
    fn visit<V: ShardVisitor>(&self, visitor: &mut V) -> CoreResult<()>;

    /// Mutable counterpart of [`visit`](Self::visit).
    ///
    /// # Errors
    ///
    /// Propagates the first visitor error.
    fn visit_mut<V: ShardVisitorMut>(&mut self, visitor: &mut V) -> CoreResult<()>;
}

/// Read-only walk over the members of a shard.
pub trait ShardVisitor {
    /// Called once per collection.
    ///
    /// # Errors
    ///
    /// Any error stops the walk.
    fn collection<E: Entity, P: Properties>(
        &mut self,
        collection: &CowCollection<E, P>,
    ) -> CoreResult<()>;

    /// Called once per relation.
    ///
    /// # Errors
    ///
    /// Any error stops the walk.
    fn relation<PE: Entity, CE: Entity>(&mut self, relation: &CowRelation<PE, CE>)
        -> CoreResult<()>;
}

/// Mutable walk over the members of a shard.
pub trait ShardVisitorMut {
    /// Called once per collection.
    ///
    /// # Errors
    ///
    /// Any error stops the walk.
    fn collection<E: Entity, P: Properties>(
        &mut self,
        collection: &mut CowCollection<E, P>,
    ) -> CoreResult<()>;

    /// Called once per relation.
    ///
    /// # Errors
    ///
    /// Any error stops the walk.
    fn relation<PE: Entity, CE: Entity>(
        &mut self,
        relation: &mut CowRelation<PE, CE>,
    ) -> CoreResult<()>;
}

/// Object-safe face of a [`Shard`], used by the model registry.
pub(crate) trait AnyShard: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn fork(&self) -> Box<dyn AnyShard>;
    fn schema(&self) -> CoreResult<ShardSchema>;
    fn image(&self) -> CoreResult<ShardImage>;
    /// Replays `source` through tracked members, recording into `target`.
    fn apply_frame(&mut self, source: &ChangesFrame, target: &mut ChangesFrame)
        -> CoreResult<()>;
    fn decode_frame(&self, image: &FrameImage) -> CoreResult<ChangesFrame>;
    fn load_image(
        &mut self,
        image: &ShardImage,
        force: bool,
        target: &mut ChangesFrame,
    ) -> CoreResult<()>;
    fn load_collection(
        &mut self,
        rows: &CollectionRows,
        force: bool,
        target: &mut ChangesFrame,
    ) -> CoreResult<()>;
}

impl<S: Shard> AnyShard for S {
    fn name(&self) -> &'static str {
        S::NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn fork(&self) -> Box<dyn AnyShard> {
        trace!(shard = S::NAME, "forking shard");
        Box::new(self.clone())
    }

    fn schema(&self) -> CoreResult<ShardSchema> {
        let mut collector = SchemaCollector::new(S::NAME);
        self.visit(&mut collector)?;
        Ok(collector.finish())
    }

    fn image(&self) -> CoreResult<ShardImage> {
        let mut collector = ImageCollector::new(S::NAME);
        self.visit(&mut collector)?;
        Ok(collector.finish())
    }

    fn apply_frame(
        &mut self,
        source: &ChangesFrame,
        target: &mut ChangesFrame,
    ) -> CoreResult<()> {
        let mut applier = FrameApplier::new(source, target);
        self.visit_mut(&mut applier)?;
        applier.finish()
    }

    fn decode_frame(&self, image: &FrameImage) -> CoreResult<ChangesFrame> {
        let mut decoder = FrameDecoder::new(image);
        self.visit(&mut decoder)?;
        decoder.finish()
    }

    fn load_image(
        &mut self,
        image: &ShardImage,
        force: bool,
        target: &mut ChangesFrame,
    ) -> CoreResult<()> {
        let mut loader = ImageLoader::new(image, force, target);
        self.visit_mut(&mut loader)
    }

    fn load_collection(
        &mut self,
        rows: &CollectionRows,
        force: bool,
        target: &mut ChangesFrame,
    ) -> CoreResult<()> {
        let mut loader = CollectionLoader::new(rows, force, target);
        self.visit_mut(&mut loader)?;
        loader.finish()
    }
}

/// Declares a shard struct and its [`Shard`] implementation.
///
/// Member names double as collection and relation names in schemas,
/// change frames and storage. Each generated field gets a one-line doc
/// naming its member; doc comments on a member are appended to it.
///
/// # Example
///
/// ```rust,ignore
/// shardgraph_core::shard! {
///     /// People and who knows whom.
///     pub struct PeopleShard: "people" {
///         collections {
///             persons: Person => PersonProps,
///         }
///         relations {
///             friends: Person => Person = OneToMany,
///         }
///     }
/// }
/// ```
#[macro_export]
macro_rules! shard {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $tag:literal {
            collections {
                $($(#[$cmeta:meta])* $cfield:ident : $entity:ty => $props:ty),* $(,)?
            }
            relations {
                $($(#[$rmeta:meta])* $rfield:ident : $parent:ty => $child:ty = $kind:ident),* $(,)?
            }
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis struct $name {
            $(
                #[doc = concat!("The `", stringify!($cfield), "` collection.")]
                $(#[$cmeta])*
                pub $cfield: $crate::CowCollection<$entity, $props>,
            )*
            $(
                #[doc = concat!("The `", stringify!($rfield), "` relation.")]
                $(#[$rmeta])*
                pub $rfield: $crate::CowRelation<$parent, $child>,
            )*
        }

        impl ::std::default::Default for $name {
            fn default() -> Self {
                Self {
                    $($cfield: $crate::CowCollection::new(stringify!($cfield)),)*
                    $($rfield: $crate::CowRelation::new(
                        stringify!($rfield),
                        $crate::RelationKind::$kind,
                    ),)*
                }
            }
        }

        impl $crate::Shard for $name {
            const NAME: &'static str = $tag;

            #[allow(unused_variables)]
            fn visit<V: $crate::ShardVisitor>(&self, visitor: &mut V) -> $crate::CoreResult<()> {
                $(visitor.collection(&self.$cfield)?;)*
                $(visitor.relation(&self.$rfield)?;)*
                Ok(())
            }

            #[allow(unused_variables)]
            fn visit_mut<V: $crate::ShardVisitorMut>(
                &mut self,
                visitor: &mut V,
            ) -> $crate::CoreResult<()> {
                $(visitor.collection(&mut self.$cfield)?;)*
                $(visitor.relation(&mut self.$rfield)?;)*
                Ok(())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionWrite;
    use crate::relation::RelationWrite;
    use crate::test_support::{Item, ItemProps, ShopShard};
    use shardgraph_storage::RelationKind;

    #[test]
    fn schema_follows_declaration() {
        let schema = ShopShard::default().schema().unwrap();
        assert_eq!(schema.name, "shop");
        let items = schema.collection("items").unwrap();
        assert_eq!(items.entity, "Item");
        assert_eq!(items.properties, ItemProps::PROPERTIES);
        let links = schema.relation("links").unwrap();
        assert_eq!(links.kind, RelationKind::OneToMany);
        assert_eq!((links.parent, links.child), ("Item", "Item"));
    }

    crate::shard! {
        /// Members carry their own docs.
        struct NotedShard : "noted" {
            collections {
                /// Stock on hand.
                stock: Item => ItemProps,
            }
            relations {
                /// Bundled items.
                bundles: Item => Item = OneToOne,
            }
        }
    }

    #[test]
    fn documented_members_keep_their_names() {
        let schema = NotedShard::default().schema().unwrap();
        assert_eq!(schema.name, "noted");
        assert!(schema.collection("stock").is_some());
        assert_eq!(
            schema.relation("bundles").unwrap().kind,
            RelationKind::OneToOne
        );
    }

    #[test]
    fn fork_shares_members() {
        let mut shard = ShopShard::default();
        let a = shard
            .items
            .add(ItemProps {
                label: "a".into(),
            })
            .unwrap();
        shard.links.add(a, a).unwrap();

        let fork = AnyShard::fork(&shard);
        let fork = fork.as_any().downcast_ref::<ShopShard>().unwrap();
        assert!(fork.items.ptr_eq(&shard.items));
        assert!(fork.links.ptr_eq(&shard.links));
        assert_eq!(fork, &shard);
    }

    #[test]
    fn image_lists_rows_and_links() {
        let mut shard = ShopShard::default();
        let a = shard
            .items
            .add(ItemProps {
                label: "a".into(),
            })
            .unwrap();
        shard.links.add(a, a).unwrap();

        let image = shard.image().unwrap();
        let rows = &image.collection("items").unwrap().rows;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity, a.key());
        assert_eq!(image.relation("links").unwrap().links.len(), 1);
        assert_eq!(Item::TYPE_NAME, "Item");
    }
}
