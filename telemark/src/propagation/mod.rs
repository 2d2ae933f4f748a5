//! Carrier-agnostic context propagation traits.
//!
//! Propagators read and write [`Context`] data to the messages an
//! application exchanges: HTTP headers, message-queue metadata, and so on.
//! Telemark defines the *interfaces* here; concrete wire formats are the
//! business of exporter/instrumentation crates.

use std::collections::HashMap;
use std::fmt::Debug;
use std::slice;

use crate::Context;

mod composite;

pub use composite::CompositePropagator;

/// Writes propagation fields into a carrier, e.g. an outgoing header map.
pub trait Injector {
    /// Set the named field on the carrier.
    fn set(&mut self, key: &str, value: String);
}

/// Reads propagation fields from a carrier, e.g. an incoming header map.
pub trait Extractor {
    /// Get the value of the named field, if present.
    fn get(&self, key: &str) -> Option<&str>;

    /// All field names present on the carrier.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect()
    }
}

/// Injects and extracts [`Context`] data as string key/value pairs.
pub trait TextMapPropagator: Debug {
    /// Write the relevant parts of `cx` into the carrier.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector);

    /// Read carrier fields into a child of `cx`.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context;

    /// The carrier field names this propagator reads and writes.
    fn fields(&self) -> FieldIter<'_>;

    /// Write the current context into the carrier.
    fn inject(&self, injector: &mut dyn Injector) {
        Context::map_current(|cx| self.inject_context(cx, injector));
    }

    /// Read carrier fields into a child of the current context.
    fn extract(&self, extractor: &dyn Extractor) -> Context {
        Context::map_current(|cx| self.extract_with_context(cx, extractor))
    }
}

/// Iterator over a propagator's field names.
#[derive(Debug)]
pub struct FieldIter<'a>(slice::Iter<'a, String>);

impl<'a> FieldIter<'a> {
    /// Construct from a slice of field names.
    pub fn new(fields: &'a [String]) -> Self {
        FieldIter(fields.iter())
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_injector_lowercases() {
        let mut carrier = HashMap::new();
        carrier.set("X-Request-Id", "abc".to_string());
        assert_eq!(Extractor::get(&carrier, "x-request-id"), Some("abc"));
        assert_eq!(Extractor::get(&carrier, "X-REQUEST-ID"), Some("abc"));
    }

    #[test]
    fn hash_map_extractor_keys() {
        let mut carrier = HashMap::new();
        carrier.set("a", "1".to_string());
        carrier.set("b", "2".to_string());
        let mut keys = Extractor::keys(&carrier);
        keys.sort_unstable();
        assert_eq!(keys, ["a", "b"]);
    }
}
