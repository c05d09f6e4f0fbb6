//! Structured field values.
//!
//! Log lines, monitor tags and events all carry an ordered list of
//! key/value [`Fields`]. Values belong to the closed [`FieldValue`]
//! enumeration, so every sink can render them deterministically without
//! runtime type inspection.
//!
//! # Key/value lists
//!
//! Callers frequently pass a flat list of alternating keys and values.
//! [`Fields::from_values`] (and the [`fields!`](crate::fields!) macro) accept
//! such lists. A list of odd length treats its lone trailing value as the
//! `msg` field:
//!
//! ```
//! use aegis_core::{fields, FieldValue};
//!
//! let f = fields!("foo", "bar", "uh oh");
//! assert_eq!(f.get("foo"), Some(&FieldValue::from("bar")));
//! assert_eq!(f.get("msg"), Some(&FieldValue::from("uh oh")));
//!
//! let single = fields!("just a message");
//! assert_eq!(single.get("msg"), Some(&FieldValue::from("just a message")));
//! ```

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// The key used for the free-text message of a log line or event.
pub const MSG_KEY: &str = "msg";

/// A single structured value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Str(String),
    /// Ordered list of values.
    List(Vec<FieldValue>),
    /// Map of values, rendered in key order.
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Captures anything implementing `Display` as text.
    pub fn display(value: impl fmt::Display) -> Self {
        Self::Str(value.to_string())
    }

    /// Captures an error through its `Display` output.
    pub fn error(err: &(dyn std::error::Error + '_)) -> Self {
        Self::Str(err.to_string())
    }

    /// Renders the value as plain text.
    ///
    /// Compound values use a bracketed form: lists render as `[a b]` and
    /// maps as `map[k:v]`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        use std::fmt::Write;

        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            Self::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Self::UInt(u) => {
                let _ = write!(out, "{u}");
            }
            Self::Float(f) => {
                let _ = write!(out, "{f}");
            }
            Self::Str(s) => out.push_str(s),
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    item.render_into(out);
                }
                out.push(']');
            }
            Self::Map(entries) => {
                out.push_str("map[");
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push_str(key);
                    out.push(':');
                    value.render_into(out);
                }
                out.push(']');
            }
        }
    }

    /// Returns the text if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::UInt(u) => serializer.serialize_u64(*u),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Str(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty, $($t:ty),+) => {
        $(
            impl From<$t> for FieldValue {
                fn from(value: $t) -> Self {
                    Self::$variant(<$target>::from(value))
                }
            }
        )+
    };
}

impl_from_int!(Int, i64, i8, i16, i32, i64);
impl_from_int!(UInt, u64, u8, u16, u32, u64);

impl From<isize> for FieldValue {
    fn from(value: isize) -> Self {
        i64::try_from(value).map_or_else(|_| Self::display(value), Self::Int)
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        u64::try_from(value).map_or_else(|_| Self::display(value), Self::UInt)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        // Widen through the shortest decimal form so 7.6f32 stays 7.6.
        value
            .to_string()
            .parse::<f64>()
            .map_or(Self::Float(f64::from(value)), Self::Float)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<crate::RequestId> for FieldValue {
    fn from(value: crate::RequestId) -> Self {
        Self::display(value)
    }
}

impl From<http::StatusCode> for FieldValue {
    fn from(value: http::StatusCode) -> Self {
        Self::UInt(u64::from(value.as_u16()))
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, V: Into<FieldValue>> From<BTreeMap<K, V>> for FieldValue {
    fn from(value: BTreeMap<K, V>) -> Self {
        Self::Map(
            value
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A single key/value pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name.
    pub key: String,
    /// Field value.
    pub value: FieldValue,
}

impl Field {
    /// Creates a new field.
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An ordered list of structured fields.
///
/// Order is preserved exactly as fields were added; sinks render them in
/// that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<Field>,
}

impl Fields {
    /// Creates an empty field list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds fields from a flat list of alternating keys and values.
    ///
    /// Keys are rendered as text. If the list has odd length, the trailing
    /// value becomes the `msg` field.
    #[must_use]
    pub fn from_values(values: Vec<FieldValue>) -> Self {
        let mut entries = Vec::with_capacity(values.len() / 2 + 1);
        let mut iter = values.into_iter();
        while let Some(key) = iter.next() {
            match iter.next() {
                Some(value) => entries.push(Field {
                    key: key.render(),
                    value,
                }),
                None => entries.push(Field {
                    key: MSG_KEY.to_string(),
                    value: key,
                }),
            }
        }
        Self { entries }
    }

    /// Appends a field, returning the list for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.push(key, value);
        self
    }

    /// Appends a field in place.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.entries.push(Field::new(key, value));
    }

    /// Appends all fields of `other` after the existing ones.
    pub fn extend(&mut self, other: Fields) {
        self.entries.extend(other.entries);
    }

    /// Returns a new list with `self` followed by `other`.
    #[must_use]
    pub fn merged(&self, other: &Fields) -> Fields {
        let mut entries = Vec::with_capacity(self.entries.len() + other.entries.len());
        entries.extend(self.entries.iter().cloned());
        entries.extend(other.entries.iter().cloned());
        Self { entries }
    }

    /// Returns the first value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|field| field.key == key)
            .map(|field| &field.value)
    }

    /// Returns true if any field uses `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over fields in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.entries.iter()
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Fields {
    type Item = Field;
    type IntoIter = std::vec::IntoIter<Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<Field> for Fields {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().map(|(k, v)| Field::new(k, v)).collect()
    }
}

/// Builds [`Fields`] from a flat list of alternating keys and values.
///
/// A trailing unpaired value becomes the `msg` field.
///
/// ```
/// use aegis_core::fields;
///
/// let f = fields!("status", 500, "requestID", "abc");
/// assert_eq!(f.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::Fields::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Fields::from_values(vec![$($crate::FieldValue::from($value)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_even_list_pairs_up() {
        let f = fields!("foo", "bar", "key", 4);
        let keys: Vec<&str> = f.iter().map(|field| field.key.as_str()).collect();
        assert_eq!(keys, vec!["foo", "key"]);
        assert_eq!(f.get("key"), Some(&FieldValue::Int(4)));
    }

    #[test]
    fn test_odd_list_trailing_value_is_msg() {
        let f = fields!("foo", "bar", "uh oh");
        assert_eq!(f.len(), 2);
        assert_eq!(f.get("msg").and_then(FieldValue::as_str), Some("uh oh"));
    }

    #[test]
    fn test_single_value_is_msg() {
        let f = fields!("foo");
        assert_eq!(f.len(), 1);
        assert_eq!(f.get("msg").and_then(FieldValue::as_str), Some("foo"));
    }

    #[test]
    fn test_non_string_keys_render_as_text() {
        let f = Fields::from_values(vec![FieldValue::Int(1), FieldValue::Bool(true)]);
        assert_eq!(f.get("1"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_render_compound_values() {
        let list = FieldValue::from(vec!["foo", "bar"]);
        assert_eq!(list.render(), "[foo bar]");

        let mut map = BTreeMap::new();
        map.insert("another", 12);
        assert_eq!(FieldValue::from(map).render(), "map[another:12]");
    }

    #[test]
    fn test_render_numbers() {
        assert_eq!(FieldValue::from(7.6_f32).render(), "7.6");
        assert_eq!(FieldValue::from(4.0_f64).render(), "4");
        assert_eq!(FieldValue::from(-3_i32).render(), "-3");
        assert_eq!(FieldValue::from(None::<i32>).render(), "null");
    }

    #[test]
    fn test_json_serialization() {
        let mut map = BTreeMap::new();
        map.insert("a", FieldValue::from(vec![1, 2]));
        let value = FieldValue::from(map);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_merged_keeps_order() {
        let standard = fields!("requestID", "abc");
        let call = fields!("status", 200);
        let merged = standard.merged(&call);
        let keys: Vec<&str> = merged.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["requestID", "status"]);
        assert_eq!(standard.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_from_values_never_drops_values(values in proptest::collection::vec(any::<i64>(), 0..20)) {
            let n = values.len();
            let f = Fields::from_values(values.into_iter().map(FieldValue::from).collect());
            prop_assert_eq!(f.len(), n / 2 + n % 2);
            prop_assert_eq!(f.contains_key(MSG_KEY), n % 2 == 1);
        }

        #[test]
        fn prop_render_is_deterministic(items in proptest::collection::vec("[a-z]{0,8}", 0..8)) {
            let value = FieldValue::from(items.clone());
            prop_assert_eq!(value.render(), value.clone().render());
            prop_assert_eq!(value.render(), format!("[{}]", items.join(" ")));
        }
    }
}
