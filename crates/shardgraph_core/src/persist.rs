//! Shard visitors bridging typed shards and erased persistence images.

use crate::changes::{ChangesFrame, CollectionChangeSet, RelationChangeSet};
use crate::collection::{CollectionRead, CollectionWrite};
use crate::cow::{CowCollection, CowRelation};
use crate::entity::{Entity, EntityId};
use crate::error::{CoreError, CoreResult};
use crate::properties::Properties;
use crate::relation::{RelationRead, RelationWrite};
use crate::shard::{ShardVisitor, ShardVisitorMut};
use crate::tracked::{TrackedCollection, TrackedRelation};
use shardgraph_storage::{
    CollectionInfo, CollectionRows, EntityKey, FrameImage, Link, RelationInfo, RelationKind,
    RelationLinks, Row, ShardImage, ShardSchema,
};
use std::collections::{HashMap, HashSet};

fn collection_info<E: Entity, P: Properties>(shard: &'static str, name: &'static str) -> CollectionInfo {
    CollectionInfo {
        shard,
        name,
        entity: E::TYPE_NAME,
        properties: P::PROPERTIES,
    }
}

fn relation_info<PE: Entity, CE: Entity>(
    shard: &'static str,
    name: &'static str,
    kind: RelationKind,
) -> RelationInfo {
    RelationInfo {
        shard,
        name,
        parent: PE::TYPE_NAME,
        child: CE::TYPE_NAME,
        kind,
    }
}

fn qualified(shard: &str, name: &str) -> String {
    format!("{shard}.{name}")
}

/// Builds the [`ShardSchema`] of a shard.
pub(crate) struct SchemaCollector {
    schema: ShardSchema,
}

impl SchemaCollector {
    pub(crate) fn new(shard: &'static str) -> Self {
        Self {
            schema: ShardSchema::new(shard),
        }
    }

    pub(crate) fn finish(self) -> ShardSchema {
        self.schema
    }
}

impl ShardVisitor for SchemaCollector {
    fn collection<E: Entity, P: Properties>(
        &mut self,
        collection: &CowCollection<E, P>,
    ) -> CoreResult<()> {
        let info = collection_info::<E, P>(self.schema.name, collection.name());
        self.schema.collections.push(info);
        Ok(())
    }

    fn relation<PE: Entity, CE: Entity>(
        &mut self,
        relation: &CowRelation<PE, CE>,
    ) -> CoreResult<()> {
        let info = relation_info::<PE, CE>(self.schema.name, relation.name(), relation.kind());
        self.schema.relations.push(info);
        Ok(())
    }
}

/// Builds the full [`ShardImage`] of a shard.
pub(crate) struct ImageCollector {
    image: ShardImage,
}

impl ImageCollector {
    pub(crate) fn new(shard: &'static str) -> Self {
        Self {
            image: ShardImage::new(shard),
        }
    }

    pub(crate) fn finish(self) -> ShardImage {
        self.image
    }
}

impl ShardVisitor for ImageCollector {
    fn collection<E: Entity, P: Properties>(
        &mut self,
        collection: &CowCollection<E, P>,
    ) -> CoreResult<()> {
        let rows = collection
            .pairs()
            .map(|(entity, props)| Row::new(entity.key(), props.to_bag()))
            .collect();
        self.image.collections.push(CollectionRows {
            info: collection_info::<E, P>(self.image.shard, collection.name()),
            rows,
        });
        Ok(())
    }

    fn relation<PE: Entity, CE: Entity>(
        &mut self,
        relation: &CowRelation<PE, CE>,
    ) -> CoreResult<()> {
        let links = relation
            .pairs()
            .map(|(parent, child)| Link::new(parent.key(), child.key()))
            .collect();
        self.image.relations.push(RelationLinks {
            info: relation_info::<PE, CE>(self.image.shard, relation.name(), relation.kind()),
            links,
        });
        Ok(())
    }
}

/// Replays a typed frame against a fork, recording into another frame.
pub(crate) struct FrameApplier<'a> {
    source: &'a ChangesFrame,
    target: &'a mut ChangesFrame,
    visited: Vec<&'static str>,
}

impl<'a> FrameApplier<'a> {
    pub(crate) fn new(source: &'a ChangesFrame, target: &'a mut ChangesFrame) -> Self {
        Self {
            source,
            target,
            visited: Vec::new(),
        }
    }

    /// Fails if the source frame names a set the shard does not have.
    pub(crate) fn finish(self) -> CoreResult<()> {
        match self
            .source
            .changed_sets()
            .find(|name| !self.visited.contains(name))
        {
            Some(name) => Err(CoreError::unknown_set(qualified(self.source.shard(), name))),
            None => Ok(()),
        }
    }
}

impl ShardVisitorMut for FrameApplier<'_> {
    fn collection<E: Entity, P: Properties>(
        &mut self,
        collection: &mut CowCollection<E, P>,
    ) -> CoreResult<()> {
        let name = collection.name();
        self.visited.push(name);
        if !self.source.set_has_changes(name) {
            return Ok(());
        }
        let changes = self.source.collection::<E, P>(name).ok_or_else(|| {
            CoreError::type_mismatch(name, "change set does not match the collection types")
        })?;
        let recorded = self.target.collection_entry::<E, P>(name)?;
        changes.apply(&mut TrackedCollection::new(collection, recorded))
    }

    fn relation<PE: Entity, CE: Entity>(
        &mut self,
        relation: &mut CowRelation<PE, CE>,
    ) -> CoreResult<()> {
        let name = relation.name();
        self.visited.push(name);
        if !self.source.set_has_changes(name) {
            return Ok(());
        }
        let changes = self.source.relation::<PE, CE>(name).ok_or_else(|| {
            CoreError::type_mismatch(name, "change set does not match the relation types")
        })?;
        let recorded = self.target.relation_entry::<PE, CE>(name)?;
        changes.apply(&mut TrackedRelation::new(relation, recorded))
    }
}

/// Rebuilds a typed frame from its persisted image.
pub(crate) struct FrameDecoder<'a> {
    image: &'a FrameImage,
    frame: ChangesFrame,
    visited: Vec<&'static str>,
}

impl<'a> FrameDecoder<'a> {
    pub(crate) fn new(image: &'a FrameImage) -> Self {
        Self {
            image,
            frame: ChangesFrame::new(image.shard),
            visited: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> CoreResult<ChangesFrame> {
        let unknown = self
            .image
            .collections
            .iter()
            .map(|delta| delta.info.name)
            .chain(self.image.relations.iter().map(|delta| delta.info.name))
            .find(|name| !self.visited.contains(name));
        match unknown {
            Some(name) => Err(CoreError::unknown_set(qualified(self.image.shard, name))),
            None => Ok(self.frame),
        }
    }
}

impl ShardVisitor for FrameDecoder<'_> {
    fn collection<E: Entity, P: Properties>(
        &mut self,
        collection: &CowCollection<E, P>,
    ) -> CoreResult<()> {
        let name = collection.name();
        self.visited.push(name);
        let image = self.image;
        for delta in image.collections.iter().filter(|d| d.info.name == name) {
            let set = CollectionChangeSet::<E, P>::from_row_changes(name, &delta.changes)?;
            self.frame.push_set(Box::new(set));
        }
        Ok(())
    }

    fn relation<PE: Entity, CE: Entity>(
        &mut self,
        relation: &CowRelation<PE, CE>,
    ) -> CoreResult<()> {
        let name = relation.name();
        self.visited.push(name);
        let image = self.image;
        for delta in image.relations.iter().filter(|d| d.info.name == name) {
            let set = RelationChangeSet::<PE, CE>::from_link_changes(name, &delta.changes)?;
            self.frame.push_set(Box::new(set));
        }
        Ok(())
    }
}

/// Loads rows into one collection through a tracked wrapper.
///
/// With `force`, existing entries are removed first; entries that come back
/// unchanged coalesce away, so reloading identical content records nothing.
fn load_rows<E: Entity, P: Properties>(
    collection: &mut CowCollection<E, P>,
    shard: &str,
    rows: &[Row],
    force: bool,
    target: &mut ChangesFrame,
) -> CoreResult<()> {
    let name = collection.name();
    if !force && !collection.is_empty() {
        return Err(CoreError::non_empty_model(qualified(shard, name)));
    }
    let recorded = target.collection_entry::<E, P>(name)?;
    let mut tracked = TrackedCollection::new(collection, recorded);
    for entity in tracked.entities() {
        tracked.remove(entity)?;
    }
    for row in rows {
        tracked.insert(E::from_key(row.entity), P::from_bag(&row.props)?)?;
    }
    Ok(())
}

/// Loads a full [`ShardImage`] into a fork.
pub(crate) struct ImageLoader<'a> {
    image: &'a ShardImage,
    force: bool,
    target: &'a mut ChangesFrame,
    known: HashMap<&'static str, HashSet<EntityKey>>,
}

impl<'a> ImageLoader<'a> {
    pub(crate) fn new(image: &'a ShardImage, force: bool, target: &'a mut ChangesFrame) -> Self {
        Self {
            image,
            force,
            target,
            known: HashMap::new(),
        }
    }

    /// Rejects an endpoint missing from the collections of its type.
    ///
    /// Entity types without a collection in this shard are not checked.
    fn check_known(&self, entity_type: &'static str, key: EntityKey) -> CoreResult<()> {
        match self.known.get(entity_type) {
            Some(keys) if !keys.contains(&key) => Err(CoreError::key_not_found(
                entity_type,
                EntityId::from_bytes(key),
            )),
            _ => Ok(()),
        }
    }
}

impl ShardVisitorMut for ImageLoader<'_> {
    fn collection<E: Entity, P: Properties>(
        &mut self,
        collection: &mut CowCollection<E, P>,
    ) -> CoreResult<()> {
        if let Some(loaded) = self.image.collection(collection.name()) {
            load_rows(collection, self.image.shard, &loaded.rows, self.force, self.target)?;
        }
        self.known
            .entry(E::TYPE_NAME)
            .or_default()
            .extend(collection.pairs().map(|(entity, _)| entity.key()));
        Ok(())
    }

    fn relation<PE: Entity, CE: Entity>(
        &mut self,
        relation: &mut CowRelation<PE, CE>,
    ) -> CoreResult<()> {
        let name = relation.name();
        let Some(loaded) = self.image.relation(name) else {
            return Ok(());
        };
        if !self.force && !relation.is_empty() {
            return Err(CoreError::non_empty_model(qualified(self.image.shard, name)));
        }
        for link in &loaded.links {
            self.check_known(PE::TYPE_NAME, link.parent)?;
            self.check_known(CE::TYPE_NAME, link.child)?;
        }
        let recorded = self.target.relation_entry::<PE, CE>(name)?;
        let mut tracked = TrackedRelation::new(relation, recorded);
        let existing: Vec<_> = tracked.pairs().collect();
        for (parent, child) in existing {
            tracked.remove(parent, child)?;
        }
        for link in &loaded.links {
            tracked.add(PE::from_key(link.parent), CE::from_key(link.child))?;
        }
        Ok(())
    }
}

/// Loads the rows of a single collection, leaving the rest of the shard.
pub(crate) struct CollectionLoader<'a> {
    rows: &'a CollectionRows,
    force: bool,
    target: &'a mut ChangesFrame,
    found: bool,
}

impl<'a> CollectionLoader<'a> {
    pub(crate) fn new(rows: &'a CollectionRows, force: bool, target: &'a mut ChangesFrame) -> Self {
        Self {
            rows,
            force,
            target,
            found: false,
        }
    }

    pub(crate) fn finish(self) -> CoreResult<()> {
        if self.found {
            Ok(())
        } else {
            Err(CoreError::unknown_set(self.rows.info.qualified_name()))
        }
    }
}

impl ShardVisitorMut for CollectionLoader<'_> {
    fn collection<E: Entity, P: Properties>(
        &mut self,
        collection: &mut CowCollection<E, P>,
    ) -> CoreResult<()> {
        if collection.name() != self.rows.info.name {
            return Ok(());
        }
        if self.rows.info.entity != E::TYPE_NAME {
            return Err(CoreError::type_mismatch(
                self.rows.info.qualified_name(),
                format!("rows hold {}, collection holds {}", self.rows.info.entity, E::TYPE_NAME),
            ));
        }
        self.found = true;
        load_rows(
            collection,
            self.rows.info.shard,
            &self.rows.rows,
            self.force,
            self.target,
        )
    }

    fn relation<PE: Entity, CE: Entity>(
        &mut self,
        _relation: &mut CowRelation<PE, CE>,
    ) -> CoreResult<()> {
        Ok(())
    }
}
