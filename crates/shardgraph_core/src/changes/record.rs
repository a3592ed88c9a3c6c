//! Change records.

use crate::entity::Entity;
use crate::error::CoreResult;
use crate::properties::Properties;
use shardgraph_storage::{Link, LinkChange, RecordImage, RowChange};

/// Kind of a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// Entity added to a collection.
    Add,
    /// Entity properties replaced.
    Modify,
    /// Entity removed from a collection.
    Remove,
    /// Pair linked in a relation.
    Link,
    /// Pair unlinked in a relation.
    Unlink,
}

/// One collection mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange<E, P> {
    /// `entity` was added with `new`.
    Add {
        /// Added entity.
        entity: E,
        /// Its properties.
        new: P,
    },
    /// `entity` went from `old` to `new`.
    Modify {
        /// Modified entity.
        entity: E,
        /// Properties before.
        old: P,
        /// Properties after.
        new: P,
    },
    /// `entity` was removed while holding `old`.
    Remove {
        /// Removed entity.
        entity: E,
        /// Its last properties.
        old: P,
    },
}

impl<E: Entity, P: Properties> CollectionChange<E, P> {
    /// The affected entity.
    pub fn entity(&self) -> E {
        match self {
            Self::Add { entity, .. } | Self::Modify { entity, .. } | Self::Remove { entity, .. } => {
                *entity
            }
        }
    }

    /// The record kind.
    pub fn action(&self) -> ChangeAction {
        match self {
            Self::Add { .. } => ChangeAction::Add,
            Self::Modify { .. } => ChangeAction::Modify,
            Self::Remove { .. } => ChangeAction::Remove,
        }
    }

    /// The record that undoes this one.
    #[must_use]
    pub fn inverted(&self) -> Self {
        match self {
            Self::Add { entity, new } => Self::Remove {
                entity: *entity,
                old: new.clone(),
            },
            Self::Modify { entity, old, new } => Self::Modify {
                entity: *entity,
                old: new.clone(),
                new: old.clone(),
            },
            Self::Remove { entity, old } => Self::Add {
                entity: *entity,
                new: old.clone(),
            },
        }
    }

    /// Erased form for persistence.
    pub fn to_row_change(&self) -> RowChange {
        match self {
            Self::Add { entity, new } => RowChange::Add {
                entity: entity.key(),
                new: new.to_bag(),
            },
            Self::Modify { entity, old, new } => RowChange::Modify {
                entity: entity.key(),
                old: old.to_bag(),
                new: new.to_bag(),
            },
            Self::Remove { entity, old } => RowChange::Remove {
                entity: entity.key(),
                old: old.to_bag(),
            },
        }
    }

    /// Rebuilds a typed record from its erased form.
    ///
    /// # Errors
    ///
    /// Returns a codec error if a bag does not fit `P`.
    pub fn from_row_change(change: &RowChange) -> CoreResult<Self> {
        Ok(match change {
            RowChange::Add { entity, new } => Self::Add {
                entity: E::from_key(*entity),
                new: P::from_bag(new)?,
            },
            RowChange::Modify { entity, old, new } => Self::Modify {
                entity: E::from_key(*entity),
                old: P::from_bag(old)?,
                new: P::from_bag(new)?,
            },
            RowChange::Remove { entity, old } => Self::Remove {
                entity: E::from_key(*entity),
                old: P::from_bag(old)?,
            },
        })
    }

    pub(crate) fn to_image(&self) -> RecordImage {
        RecordImage::Row(self.to_row_change())
    }
}

/// One relation mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationChange<PE, CE> {
    /// The pair was linked.
    Link {
        /// Parent entity.
        parent: PE,
        /// Child entity.
        child: CE,
    },
    /// The pair was unlinked.
    Unlink {
        /// Parent entity.
        parent: PE,
        /// Child entity.
        child: CE,
    },
}

impl<PE: Entity, CE: Entity> RelationChange<PE, CE> {
    /// The affected pair.
    pub fn pair(&self) -> (PE, CE) {
        match *self {
            Self::Link { parent, child } | Self::Unlink { parent, child } => (parent, child),
        }
    }

    /// The record kind.
    pub fn action(&self) -> ChangeAction {
        match self {
            Self::Link { .. } => ChangeAction::Link,
            Self::Unlink { .. } => ChangeAction::Unlink,
        }
    }

    /// The record that undoes this one.
    #[must_use]
    pub fn inverted(&self) -> Self {
        match *self {
            Self::Link { parent, child } => Self::Unlink { parent, child },
            Self::Unlink { parent, child } => Self::Link { parent, child },
        }
    }

    /// Erased form for persistence.
    pub fn to_link_change(&self) -> LinkChange {
        match *self {
            Self::Link { parent, child } => LinkChange::Link(Link::new(parent.key(), child.key())),
            Self::Unlink { parent, child } => {
                LinkChange::Unlink(Link::new(parent.key(), child.key()))
            }
        }
    }

    /// Rebuilds a typed record from its erased form.
    pub fn from_link_change(change: &LinkChange) -> Self {
        match *change {
            LinkChange::Link(link) => Self::Link {
                parent: PE::from_key(link.parent),
                child: CE::from_key(link.child),
            },
            LinkChange::Unlink(link) => Self::Unlink {
                parent: PE::from_key(link.parent),
                child: CE::from_key(link.child),
            },
        }
    }

    pub(crate) fn to_image(&self) -> RecordImage {
        RecordImage::Link(self.to_link_change())
    }
}
