//! # ShardGraph Codec
//!
//! Property bags and CBOR encoding for ShardGraph.
//!
//! Every properties record in a ShardGraph model can be viewed as a
//! [`PropertyBag`]: an ordered map from property name to a scalar
//! [`Value`]. Bags are used for:
//! - persistence (backends store bags, not Rust types)
//! - diffing (a modification is replayed as the changed fields only)
//! - history records (bags inside change records are CBOR encoded)
//!
//! ## Usage
//!
//! ```
//! use shardgraph_codec::{from_cbor, to_cbor, PropertyBag};
//!
//! let bag = PropertyBag::new().with("title", "Dune").with("pages", 412i64);
//! let bytes = to_cbor(&bag).unwrap();
//! let decoded: PropertyBag = from_cbor(&bytes).unwrap();
//! assert_eq!(bag, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bag;
mod cbor;
mod error;
mod value;

pub use bag::PropertyBag;
pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use value::{FromValue, Value, ValueKind};
