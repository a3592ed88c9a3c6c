//! Error types for the codec crate.

use crate::value::ValueKind;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while converting properties or encoding bytes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Failed to encode a value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// A required property is absent from a bag.
    #[error("missing property: {name}")]
    MissingProperty {
        /// Name of the missing property.
        name: String,
    },

    /// A value does not have the kind the reader expected.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Kind the reader asked for.
        expected: ValueKind,
        /// Variant name of the stored value.
        found: &'static str,
    },

    /// A property exists but could not be read.
    #[error("invalid property {name}: {reason}")]
    InvalidProperty {
        /// Name of the property.
        name: String,
        /// Why it could not be read.
        reason: String,
    },

    /// An integer does not fit the requested width.
    #[error("integer overflow")]
    IntegerOverflow,
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create a missing property error.
    pub fn missing_property(name: impl Into<String>) -> Self {
        Self::MissingProperty { name: name.into() }
    }

    /// Create an invalid property error.
    pub fn invalid_property(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProperty {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
