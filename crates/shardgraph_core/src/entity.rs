//! Entity identifiers and the [`Entity`] trait.

use shardgraph_storage::EntityKey;
use std::fmt;
use std::hash::Hash;
use uuid::Uuid;

/// Unique identifier for an entity.
///
/// Entity IDs are 128-bit UUIDs that are:
/// - Globally unique within a model
/// - Immutable once assigned
/// - Never reused
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId([u8; 16]);

impl EntityId {
    /// Creates an entity ID from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.to_uuid())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }
}

impl From<[u8; 16]> for EntityId {
    fn from(bytes: [u8; 16]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<EntityId> for [u8; 16] {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// A typed entity handle.
///
/// An entity is an id tagged with its type. Two entities of different types
/// never compare equal because they are different Rust types. Use the
/// [`entity!`](crate::entity!) macro to declare one.
pub trait Entity: Copy + Ord + Hash + fmt::Debug + Send + Sync + 'static {
    /// Type tag, used in schema descriptors and error messages.
    const TYPE_NAME: &'static str;

    /// Wraps an id.
    fn from_id(id: EntityId) -> Self;

    /// Returns the id.
    fn id(&self) -> EntityId;

    /// Creates an entity with a fresh random id.
    fn generate() -> Self {
        Self::from_id(EntityId::new())
    }

    /// Raw key used by persistence images.
    fn key(&self) -> EntityKey {
        *self.id().as_bytes()
    }

    /// Rebuilds an entity from a raw key.
    fn from_key(key: EntityKey) -> Self {
        Self::from_id(EntityId::from_bytes(key))
    }
}

/// Declares an entity newtype over [`EntityId`].
///
/// # Example
///
/// ```rust,ignore
/// shardgraph_core::entity! {
///     /// A person.
///     pub struct Person;
/// }
///
/// let ada = Person::generate();
/// ```
#[macro_export]
macro_rules! entity {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        $vis struct $name($crate::EntityId);

        impl $crate::Entity for $name {
            const TYPE_NAME: &'static str = stringify!($name);

            fn from_id(id: $crate::EntityId) -> Self {
                Self(id)
            }

            fn id(&self) -> $crate::EntityId {
                self.0
            }
        }
    };
}
