use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use telemark::{Array, KeyValue, Value};

use crate::metrics::error::MetricError;

/// A canonical, immutable set of attributes identifying one series.
///
/// Construction normalizes the input: entries are sorted by key, duplicate
/// keys collapse to the last written value, and entries with empty values
/// are removed. The 64-bit fingerprint is computed once and reused as the
/// hash; equality stays structural so fingerprint collisions only cost a
/// comparison, never a wrong series.
#[derive(Clone, Debug)]
pub struct AttributeSet {
    entries: Arc<[KeyValue]>,
    fingerprint: u64,
}

impl Default for AttributeSet {
    fn default() -> Self {
        AttributeSet::from_normalized(Vec::new())
    }
}

impl AttributeSet {
    /// Normalize `attributes` into a canonical set.
    ///
    /// Returns [`MetricError::InvalidAttribute`] when any key is empty.
    pub fn new(attributes: &[KeyValue]) -> Result<Self, MetricError> {
        if attributes.iter().any(|kv| kv.key.as_str().is_empty()) {
            return Err(MetricError::InvalidAttribute(
                "attribute keys must be non-empty",
            ));
        }

        let mut entries: Vec<KeyValue> = attributes
            .iter()
            .filter(|kv| !is_empty_value(&kv.value))
            .cloned()
            .collect();
        // Stable sort keeps insertion order within equal keys, so the last
        // write for a key is the last element of its run.
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let mut deduped: Vec<KeyValue> = Vec::with_capacity(entries.len());
        for entry in entries {
            match deduped.last_mut() {
                Some(last) if last.key == entry.key => *last = entry,
                _ => deduped.push(entry),
            }
        }

        Ok(Self::from_normalized(deduped))
    }

    pub(crate) fn from_normalized(entries: Vec<KeyValue>) -> Self {
        let mut hasher = DefaultHasher::new();
        for entry in &entries {
            entry.key.as_str().hash(&mut hasher);
            hash_value(&entry.value, &mut hasher);
        }
        AttributeSet {
            fingerprint: hasher.finish(),
            entries: entries.into(),
        }
    }

    /// The cached 64-bit fingerprint. Stable for the lifetime of the
    /// process.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Number of entries after normalization.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key-sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.entries.iter()
    }

    /// Copy the entries out in key-sorted order.
    pub fn to_vec(&self) -> Vec<KeyValue> {
        self.entries.to_vec()
    }
}

impl PartialEq for AttributeSet {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|(a, b)| a.key == b.key && values_equal(&a.value, &b.value))
    }
}

// Equality is total: floats compare by bit pattern, matching the
// fingerprint, so NaN-valued attributes still identify one series.
impl Eq for AttributeSet {}

impl Hash for AttributeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint);
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::String(s) => s.as_str().is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::F64(x), Value::F64(y)) => x.to_bits() == y.to_bits(),
        (Value::Array(Array::F64(x)), Value::Array(Array::F64(y))) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|(x, y)| x.to_bits() == y.to_bits())
        }
        _ => a == b,
    }
}

fn hash_value(value: &Value, hasher: &mut impl Hasher) {
    match value {
        Value::Bool(v) => {
            hasher.write_u8(1);
            v.hash(hasher);
        }
        Value::I64(v) => {
            hasher.write_u8(2);
            v.hash(hasher);
        }
        Value::F64(v) => {
            hasher.write_u8(3);
            v.to_bits().hash(hasher);
        }
        Value::String(v) => {
            hasher.write_u8(4);
            v.as_str().hash(hasher);
        }
        Value::Array(array) => {
            hasher.write_u8(5);
            match array {
                Array::Bool(items) => items.hash(hasher),
                Array::I64(items) => items.hash(hasher),
                Array::F64(items) => {
                    for item in items {
                        item.to_bits().hash(hasher);
                    }
                }
                Array::String(items) => {
                    for item in items {
                        item.as_str().hash(hasher);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_order_does_not_matter() {
        let a = AttributeSet::new(&[KeyValue::new("x", 1i64), KeyValue::new("y", 2i64)]).unwrap();
        let b = AttributeSet::new(&[KeyValue::new("y", 2i64), KeyValue::new("x", 1i64)]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn duplicate_keys_keep_the_last_write() {
        let set = AttributeSet::new(&[
            KeyValue::new("k", "first"),
            KeyValue::new("other", 1i64),
            KeyValue::new("k", "last"),
        ])
        .unwrap();
        assert_eq!(set.len(), 2);
        let k = set.iter().find(|kv| kv.key.as_str() == "k").unwrap();
        assert_eq!(k.value, Value::String("last".into()));
    }

    #[test]
    fn empty_values_remove_the_entry() {
        let set = AttributeSet::new(&[
            KeyValue::new("keep", "v"),
            KeyValue::new("drop", ""),
            KeyValue::new("drop_array", Array::I64(vec![])),
        ])
        .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().key.as_str(), "keep");
    }

    #[test]
    fn empty_keys_are_rejected() {
        let err = AttributeSet::new(&[KeyValue::new("", "v")]).unwrap_err();
        assert!(matches!(err, MetricError::InvalidAttribute(_)));
    }

    #[test]
    fn iteration_is_key_sorted() {
        let set = AttributeSet::new(&[
            KeyValue::new("zebra", 1i64),
            KeyValue::new("alpha", 2i64),
            KeyValue::new("mango", 3i64),
        ])
        .unwrap();
        let keys: Vec<_> = set.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, ["alpha", "mango", "zebra"]);
    }

    #[test]
    fn distinct_sets_have_distinct_fingerprints() {
        let a = AttributeSet::new(&[KeyValue::new("k", "a")]).unwrap();
        let b = AttributeSet::new(&[KeyValue::new("k", "b")]).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn nan_attribute_values_still_identify_one_series() {
        let a = AttributeSet::new(&[KeyValue::new("k", f64::NAN)]).unwrap();
        let b = AttributeSet::new(&[KeyValue::new("k", f64::NAN)]).unwrap();
        assert_eq!(a, b);
    }
}
