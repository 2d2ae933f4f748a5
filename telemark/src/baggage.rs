//! Name/value annotations carried in the ambient [`Context`].
//!
//! [`Baggage`] is an immutable, ordered map of user-defined properties that
//! rides along with the execution context. Every modification produces a new
//! `Baggage`; snapshots captured earlier are never affected, so concurrent
//! readers need no synchronization.
//!
//! Names are compared case-insensitively. Limits follow the W3C baggage
//! recommendation: at most 64 entries and at most 8192 bytes of combined
//! name/value content.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;

use crate::{tele_warn, Context, StringValue};

const MAX_ENTRIES: usize = 64;
const MAX_BYTES: usize = 8192;

// https://datatracker.ietf.org/doc/html/rfc7230#section-3.2.6
const INVALID_KEY_CHARS: [u8; 17] = [
    b'(', b')', b',', b'/', b':', b';', b'<', b'=', b'>', b'?', b'@', b'[', b'\\', b']', b'{',
    b'}', b'"',
];

static EMPTY_BAGGAGE: OnceLock<Baggage> = OnceLock::new();

fn empty_baggage() -> &'static Baggage {
    EMPTY_BAGGAGE.get_or_init(Baggage::new)
}

/// An immutable set of name/value properties.
///
/// ```
/// use telemark::baggage::Baggage;
///
/// let a = Baggage::new().with_entry("user.id", "42");
/// let b = a.with_entry("User.Id", "43");
///
/// // `a` is unaffected by the update that produced `b`.
/// assert_eq!(a.get("user.id").map(|v| v.as_str()), Some("42"));
/// assert_eq!(b.get("USER.ID").map(|v| v.as_str()), Some("43"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Baggage {
    // Keyed by the lower-cased name; ordered so iteration is deterministic.
    entries: Arc<BTreeMap<String, StringValue>>,
    content_len: usize,
}

impl Baggage {
    /// Creates an empty `Baggage`.
    pub fn new() -> Self {
        Baggage::default()
    }

    /// Looks up a value by name, ignoring ASCII case.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&StringValue> {
        self.entries.get(&name.as_ref().to_ascii_lowercase())
    }

    /// Returns a new `Baggage` with the entry added or replaced.
    ///
    /// Invalid names and entries that would exceed the baggage limits are
    /// rejected; the returned baggage is then an unchanged copy.
    pub fn with_entry<K, V>(&self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<StringValue>,
    {
        let name = name.into().to_ascii_lowercase();
        let value = value.into();
        if !is_valid_name(name.as_bytes()) {
            tele_warn!(
                name: "Baggage.InvalidName",
                message = "baggage entry dropped: names must be non-empty ASCII tokens"
            );
            return self.clone();
        }

        let added_len = name.len() + value.as_str().len();
        let replaced_len = self
            .entries
            .get(&name)
            .map(|prev| name.len() + prev.as_str().len())
            .unwrap_or(0);
        let new_content_len = self.content_len + added_len - replaced_len;
        if new_content_len > MAX_BYTES
            || (replaced_len == 0 && self.entries.len() == MAX_ENTRIES)
        {
            tele_warn!(
                name: "Baggage.LimitExceeded",
                message = "baggage entry dropped: entry count or byte limit exceeded"
            );
            return self.clone();
        }

        let mut entries = (*self.entries).clone();
        entries.insert(name, value);
        Baggage {
            entries: Arc::new(entries),
            content_len: new_content_len,
        }
    }

    /// Returns a new `Baggage` with the named entry removed.
    pub fn without_entry(&self, name: impl AsRef<str>) -> Self {
        let name = name.as_ref().to_ascii_lowercase();
        if !self.entries.contains_key(&name) {
            return self.clone();
        }
        let mut entries = (*self.entries).clone();
        let removed = entries.remove(&name);
        Baggage {
            content_len: self.content_len
                - removed.map(|v| name.len() + v.as_str().len()).unwrap_or(0),
            entries: Arc::new(entries),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the baggage holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in name order.
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.entries.iter())
    }
}

impl fmt::Display for Baggage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

fn is_valid_name(name: &[u8]) -> bool {
    !name.is_empty()
        && name
            .iter()
            .all(|b| b.is_ascii_graphic() && !INVALID_KEY_CHARS.contains(b))
}

/// Iterator over baggage entries in name order.
#[derive(Debug)]
pub struct Iter<'a>(btree_map::Iter<'a, String, StringValue>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a String, &'a StringValue);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

impl<'a> IntoIterator for &'a Baggage {
    type Item = (&'a String, &'a StringValue);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<(String, StringValue)> for Baggage {
    fn from_iter<I: IntoIterator<Item = (String, StringValue)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Baggage::new(), |baggage, (name, value)| {
                baggage.with_entry(name, value)
            })
    }
}

/// Methods for storing and retrieving [`Baggage`] in a [`Context`].
pub trait BaggageExt {
    /// Returns a copy of this context with the given baggage.
    fn with_baggage(&self, baggage: Baggage) -> Self;

    /// The baggage in this context, or an empty one if none was set.
    fn baggage(&self) -> &Baggage;
}

impl BaggageExt for Context {
    fn with_baggage(&self, baggage: Baggage) -> Self {
        self.with_value(baggage)
    }

    fn baggage(&self) -> &Baggage {
        self.get::<Baggage>().unwrap_or_else(|| empty_baggage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_case_insensitive() {
        let baggage = Baggage::new().with_entry("Region", "eu-1");
        assert_eq!(baggage.get("region").map(|v| v.as_str()), Some("eu-1"));
        assert_eq!(baggage.get("REGION").map(|v| v.as_str()), Some("eu-1"));
    }

    #[test]
    fn snapshots_are_immutable() {
        let before = Baggage::new().with_entry("k", "v1");
        let after = before.with_entry("k", "v2");

        assert_eq!(before.get("k").map(|v| v.as_str()), Some("v1"));
        assert_eq!(after.get("k").map(|v| v.as_str()), Some("v2"));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let baggage = Baggage::new().with_entry("", "v").with_entry("a=b", "v");
        assert!(baggage.is_empty());
    }

    #[test]
    fn entry_count_limit_is_enforced() {
        let mut baggage = Baggage::new();
        for i in 0..super::MAX_ENTRIES {
            baggage = baggage.with_entry(format!("key-{i}"), "v");
        }
        let over = baggage.with_entry("one-too-many", "v");
        assert_eq!(over.len(), super::MAX_ENTRIES);
        assert!(over.get("one-too-many").is_none());

        // Replacing an existing entry is still allowed at the limit.
        let replaced = baggage.with_entry("key-0", "v2");
        assert_eq!(replaced.get("key-0").map(|v| v.as_str()), Some("v2"));
    }

    #[test]
    fn removal_produces_new_value() {
        let with = Baggage::new().with_entry("a", "1").with_entry("b", "2");
        let without = with.without_entry("A");
        assert_eq!(with.len(), 2);
        assert_eq!(without.len(), 1);
        assert!(without.get("a").is_none());
    }

    #[test]
    fn context_round_trip() {
        let cx = Context::new().with_baggage(Baggage::new().with_entry("k", "v"));
        assert_eq!(cx.baggage().get("k").map(|v| v.as_str()), Some("v"));
        assert!(Context::new().baggage().is_empty());
    }

    #[test]
    fn iteration_is_name_ordered() {
        let baggage = Baggage::new()
            .with_entry("zed", "3")
            .with_entry("alpha", "1")
            .with_entry("mid", "2");
        let names: Vec<_> = baggage.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["alpha", "mid", "zed"]);
    }
}
