//! Entity properties.

use shardgraph_codec::{CodecResult, PropertyBag, ValueKind};
use shardgraph_storage::PropertyInfo;
use std::fmt;

/// An immutable properties record attached to an entity.
///
/// Properties are replaced wholesale on modify and compared structurally.
/// Every record converts to and from a [`PropertyBag`], which is what
/// persistence backends store and what the change algebra diffs.
pub trait Properties: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Ordered column descriptors.
    const PROPERTIES: &'static [PropertyInfo];

    /// Converts to a property bag with one entry per descriptor.
    fn to_bag(&self) -> PropertyBag;

    /// Builds a record from a bag.
    ///
    /// # Errors
    ///
    /// Returns a codec error if a required property is missing or has the
    /// wrong kind.
    fn from_bag(bag: &PropertyBag) -> CodecResult<Self>;

    /// Returns a copy with the properties named in `patch` overwritten.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the patched bag no longer fits `Self`.
    fn patched(&self, patch: &PropertyBag) -> CodecResult<Self> {
        Self::from_bag(&self.to_bag().patched(patch))
    }
}

/// Column kind of a Rust property type.
///
/// Used by [`properties!`](crate::properties!) to derive descriptors.
pub trait PropertyType {
    /// Stored kind.
    const KIND: ValueKind;
    /// Whether null is allowed.
    const NULLABLE: bool = false;
}

macro_rules! property_type {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl PropertyType for $ty {
                const KIND: ValueKind = ValueKind::$kind;
            }
        )*
    };
}

property_type! {
    bool => Bool,
    i64 => Integer,
    i32 => Integer,
    u32 => Integer,
    f64 => Float,
    String => Text,
    Vec<u8> => Bytes,
    [u8; 16] => Id,
}

impl<T: PropertyType> PropertyType for Option<T> {
    const KIND: ValueKind = T::KIND;
    const NULLABLE: bool = true;
}

/// Declares a properties struct and implements [`Properties`] for it.
///
/// Field types must implement [`PropertyType`], `Into<Value>` and
/// `FromValue`.
///
/// # Example
///
/// ```rust,ignore
/// shardgraph_core::properties! {
///     /// Person record.
///     pub struct PersonProps {
///         pub name: String,
///         pub age: i64,
///         pub nickname: Option<String>,
///     }
/// }
/// ```
#[macro_export]
macro_rules! properties {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis struct $name {
            $($(#[$fmeta])* $fvis $field: $ty,)*
        }

        impl $crate::Properties for $name {
            const PROPERTIES: &'static [$crate::PropertyInfo] = &[
                $($crate::PropertyInfo {
                    name: stringify!($field),
                    kind: <$ty as $crate::PropertyType>::KIND,
                    nullable: <$ty as $crate::PropertyType>::NULLABLE,
                },)*
            ];

            fn to_bag(&self) -> $crate::PropertyBag {
                $crate::PropertyBag::new()
                    $(.with(stringify!($field), self.$field.clone()))*
            }

            fn from_bag(bag: &$crate::PropertyBag) -> $crate::CodecResult<Self> {
                Ok(Self {
                    $($field: bag.get(stringify!($field))?,)*
                })
            }
        }
    };
}
