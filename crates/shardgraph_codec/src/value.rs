//! Dynamic property value type.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single property value.
///
/// Values are the scalar vocabulary shared by properties, persistence
/// backends and change records. Composite values are intentionally not
/// supported: a property is one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value (absent optional property).
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// IEEE-754 double.
    Float(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// 128-bit identifier, typically a reference to another entity.
    Id([u8; 16]),
}

/// The kind of a non-null [`Value`].
///
/// Used by schema descriptors to declare column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// [`Value::Bool`].
    Bool,
    /// [`Value::Integer`].
    Integer,
    /// [`Value::Float`].
    Float,
    /// [`Value::Text`].
    Text,
    /// [`Value::Bytes`].
    Bytes,
    /// [`Value::Id`].
    Id,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Text => "text",
            ValueKind::Bytes => "bytes",
            ValueKind::Id => "id",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Returns the kind of this value, or `None` for null.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Integer(_) => Some(ValueKind::Integer),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Text(_) => Some(ValueKind::Text),
            Value::Bytes(_) => Some(ValueKind::Bytes),
            Value::Id(_) => Some(ValueKind::Id),
        }
    }

    /// Variant name, for diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Id(_) => "id",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float. Integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            #[allow(clippy::cast_precision_loss)]
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as an identifier, if it is one.
    pub fn as_id(&self) -> Option<[u8; 16]> {
        match self {
            Value::Id(id) => Some(*id),
            _ => None,
        }
    }

    fn mismatch(&self, expected: ValueKind) -> CodecError {
        CodecError::TypeMismatch {
            expected,
            found: self.variant_name(),
        }
    }
}

/// Typed read access to a [`Value`].
///
/// Implemented for the Rust types that properties are usually made of.
/// `Option<T>` maps [`Value::Null`] to `None`.
pub trait FromValue: Sized {
    /// Converts a value, failing on a kind mismatch.
    fn from_value(value: &Value) -> CodecResult<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> CodecResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> CodecResult<Self> {
        value.as_bool().ok_or_else(|| value.mismatch(ValueKind::Bool))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> CodecResult<Self> {
        value
            .as_integer()
            .ok_or_else(|| value.mismatch(ValueKind::Integer))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> CodecResult<Self> {
        let n = i64::from_value(value)?;
        i32::try_from(n).map_err(|_| CodecError::IntegerOverflow)
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> CodecResult<Self> {
        let n = i64::from_value(value)?;
        u32::try_from(n).map_err(|_| CodecError::IntegerOverflow)
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> CodecResult<Self> {
        let n = i64::from_value(value)?;
        u64::try_from(n).map_err(|_| CodecError::IntegerOverflow)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> CodecResult<Self> {
        value.as_float().ok_or_else(|| value.mismatch(ValueKind::Float))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> CodecResult<Self> {
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| value.mismatch(ValueKind::Text))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> CodecResult<Self> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| value.mismatch(ValueKind::Bytes))
    }
}

impl FromValue for [u8; 16] {
    fn from_value(value: &Value) -> CodecResult<Self> {
        value.as_id().ok_or_else(|| value.mismatch(ValueKind::Id))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> CodecResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<[u8; 16]> for Value {
    fn from(id: [u8; 16]) -> Self {
        Value::Id(id)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(Value::Null.kind(), None);
        assert_eq!(Value::from(3i64).kind(), Some(ValueKind::Integer));
        assert_eq!(Value::from("x").kind(), Some(ValueKind::Text));
        assert_eq!(Value::from([7u8; 16]).kind(), Some(ValueKind::Id));
    }

    #[test]
    fn typed_reads() {
        assert_eq!(i64::from_value(&Value::Integer(5)).unwrap(), 5);
        assert_eq!(
            String::from_value(&Value::Text("a".into())).unwrap(),
            "a".to_string()
        );
        assert_eq!(f64::from_value(&Value::Integer(2)).unwrap(), 2.0);
    }

    #[test]
    fn mismatch_reports_both_sides() {
        let err = bool::from_value(&Value::Text("yes".into())).unwrap_err();
        assert_eq!(
            err,
            CodecError::TypeMismatch {
                expected: ValueKind::Bool,
                found: "text"
            }
        );
    }

    #[test]
    fn option_maps_null() {
        assert_eq!(Option::<String>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_value(&Value::Integer(1)).unwrap(),
            Some(1)
        );
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn narrowing_overflow() {
        let big = Value::Integer(i64::from(i32::MAX) + 1);
        assert_eq!(i32::from_value(&big), Err(CodecError::IntegerOverflow));
        assert_eq!(u32::from_value(&Value::Integer(-1)), Err(CodecError::IntegerOverflow));
    }
}
