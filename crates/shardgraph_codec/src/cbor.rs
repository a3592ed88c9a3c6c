//! CBOR encoding via `ciborium`.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes any serializable value to CBOR bytes.
///
/// Bags and records only contain ordered maps, so identical inputs produce
/// identical bytes.
///
/// # Errors
///
/// Returns `EncodingFailed` if serialization fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a value from CBOR bytes.
///
/// # Errors
///
/// Returns `DecodingFailed` if the bytes are not valid CBOR for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PropertyBag, Value};

    #[test]
    fn bag_roundtrip() {
        let bag = PropertyBag::new()
            .with("name", "Grace")
            .with("age", 85i64)
            .with("score", 9.5f64)
            .with("ref", [3u8; 16])
            .with("nick", Value::Null);
        let bytes = to_cbor(&bag).unwrap();
        let decoded: PropertyBag = from_cbor(&bytes).unwrap();
        assert_eq!(decoded, bag);
    }

    #[test]
    fn deterministic_encoding() {
        let a = PropertyBag::new().with("b", 1i64).with("a", 2i64);
        let b = PropertyBag::new().with("a", 2i64).with("b", 1i64);
        assert_eq!(to_cbor(&a).unwrap(), to_cbor(&b).unwrap());
    }

    #[test]
    fn garbage_fails() {
        let result: CodecResult<PropertyBag> = from_cbor(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }
}
