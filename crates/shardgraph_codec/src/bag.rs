//! Name to value property bags.

use crate::error::{CodecError, CodecResult};
use crate::value::{FromValue, Value};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// An ordered name → [`Value`] map.
///
/// Property bags are the generic shape of a properties record. They are
/// what persistence backends store and what the change algebra diffs when
/// replaying a modification onto a structure whose properties carry more
/// than the tracked fields.
///
/// Keys are kept sorted so the CBOR encoding of a bag is deterministic.
///
/// # Example
///
/// ```
/// use shardgraph_codec::PropertyBag;
///
/// let bag = PropertyBag::new().with("name", "Ada").with("age", 36i64);
/// let name: String = bag.get("name").unwrap();
/// let nick: Option<String> = bag.get("nick").unwrap();
/// assert_eq!(name, "Ada");
/// assert_eq!(nick, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyBag {
    fields: BTreeMap<String, Value>,
}

impl PropertyBag {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a property, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Removes a property.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Returns the raw value of a property.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Reads a typed property.
    ///
    /// A missing property reads as [`Value::Null`], so `Option<T>` targets
    /// yield `None` while required targets fail with `MissingProperty`.
    pub fn get<T: FromValue>(&self, name: &str) -> CodecResult<T> {
        match self.fields.get(name) {
            Some(value) => T::from_value(value)
                .map_err(|e| CodecError::invalid_property(name, e.to_string())),
            None => T::from_value(&Value::Null).map_err(|_| CodecError::missing_property(name)),
        }
    }

    /// Returns true if the bag has a property with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the bag has no properties.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over `(name, value)` in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Property names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the properties of `newer` that differ from `self`.
    ///
    /// Properties present in `self` but absent from `newer` appear as
    /// [`Value::Null`] so the patch clears them.
    #[must_use]
    pub fn diff(&self, newer: &PropertyBag) -> PropertyBag {
        let mut patch = PropertyBag::new();
        for (name, value) in &newer.fields {
            if self.fields.get(name) != Some(value) {
                patch.fields.insert(name.clone(), value.clone());
            }
        }
        for name in self.fields.keys() {
            if !newer.fields.contains_key(name) {
                patch.fields.insert(name.clone(), Value::Null);
            }
        }
        patch
    }

    /// Overwrites every property named in `patch`.
    pub fn patch(&mut self, patch: &PropertyBag) {
        for (name, value) in &patch.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    /// Returns a copy with `patch` applied.
    #[must_use]
    pub fn patched(&self, patch: &PropertyBag) -> PropertyBag {
        let mut bag = self.clone();
        bag.patch(patch);
        bag
    }
}

impl<'a> IntoIterator for &'a PropertyBag {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(name: &str, age: i64) -> PropertyBag {
        PropertyBag::new().with("name", name).with("age", age)
    }

    #[test]
    fn typed_get() {
        let bag = person("Ada", 36);
        assert_eq!(bag.get::<String>("name").unwrap(), "Ada");
        assert_eq!(bag.get::<i64>("age").unwrap(), 36);
    }

    #[test]
    fn missing_required_property() {
        let bag = PropertyBag::new();
        assert_eq!(
            bag.get::<String>("name"),
            Err(CodecError::missing_property("name"))
        );
    }

    #[test]
    fn wrong_kind_names_property() {
        let bag = person("Ada", 36);
        let err = bag.get::<bool>("age").unwrap_err();
        assert!(matches!(err, CodecError::InvalidProperty { ref name, .. } if name == "age"));
    }

    #[test]
    fn diff_only_changed_fields() {
        let old = person("Ada", 36);
        let new = person("Ada", 37);
        let patch = old.diff(&new);
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.value("age"), Some(&Value::Integer(37)));
    }

    #[test]
    fn diff_clears_dropped_fields() {
        let old = person("Ada", 36).with("nick", "countess");
        let new = person("Ada", 36);
        let patch = old.diff(&new);
        assert_eq!(patch.value("nick"), Some(&Value::Null));
    }

    #[test]
    fn patch_keeps_untracked_fields() {
        let current = person("Ada", 36).with("notes", "extra");
        let patch = person("Ada", 36).diff(&person("Ada", 40));
        let next = current.patched(&patch);
        assert_eq!(next.get::<i64>("age").unwrap(), 40);
        assert_eq!(next.get::<String>("notes").unwrap(), "extra");
    }

    #[test]
    fn identical_bags_have_empty_diff() {
        assert!(person("A", 1).diff(&person("A", 1)).is_empty());
    }
}
