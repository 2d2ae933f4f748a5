//! Identity types for distributed traces.
//!
//! These types describe *which* trace and span an operation belongs to and
//! travel through the [`Context`]. Recording spans (timers, attributes,
//! events) live in the SDK; this module only defines the immutable identity
//! portion that instrumentation and propagators exchange.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::num::ParseIntError;

use thiserror::Error;

use crate::Context;

/// A 16-byte trace identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    /// The invalid (all zero) trace id.
    pub const INVALID: TraceId = TraceId(0);

    /// Construct from a raw `u128`.
    pub const fn from_u128(value: u128) -> Self {
        TraceId(value)
    }

    /// Construct from big-endian bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// The id as big-endian bytes.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Parse a 32-character lowercase hex string.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u128::from_str_radix(hex, 16).map(TraceId)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({:032x})", self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// An 8-byte span identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    /// The invalid (all zero) span id.
    pub const INVALID: SpanId = SpanId(0);

    /// Construct from a raw `u64`.
    pub const fn from_u64(value: u64) -> Self {
        SpanId(value)
    }

    /// Construct from big-endian bytes.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// The id as big-endian bytes.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Parse a 16-character lowercase hex string.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({:016x})", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Per-trace option flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// No flags set.
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);
    /// The trace is sampled.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// Construct from the raw flag byte.
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Whether the sampled flag is set.
    pub const fn is_sampled(&self) -> bool {
        self.0 & TraceFlags::SAMPLED.0 != 0
    }

    /// Returns a copy with the sampled flag set or cleared.
    pub const fn with_sampled(&self, sampled: bool) -> Self {
        if sampled {
            TraceFlags(self.0 | TraceFlags::SAMPLED.0)
        } else {
            TraceFlags(self.0 & !TraceFlags::SAMPLED.0)
        }
    }

    /// The raw flag byte.
    pub const fn to_u8(self) -> u8 {
        self.0
    }
}

/// Vendor-specific trace configuration, carried as an ordered list of
/// key/value pairs.
///
/// `TraceState` is immutable: `insert` and `delete` return a modified copy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceState(Option<VecDeque<(String, String)>>);

impl TraceState {
    /// The empty trace state.
    pub const NONE: TraceState = TraceState(None);

    /// Build from key/value pairs, validating each key.
    pub fn from_key_value<T, K, V>(entries: T) -> Result<Self, TraceStateError>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let mut inner = VecDeque::new();
        for (key, value) in entries {
            let (key, value) = (key.to_string(), value.to_string());
            if !TraceState::valid_key(&key) {
                return Err(TraceStateError::InvalidKey(key));
            }
            if !TraceState::valid_value(&value) {
                return Err(TraceStateError::InvalidValue(value));
            }
            inner.push_back((key, value));
        }
        Ok(TraceState(Some(inner)))
    }

    /// Look up the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.as_ref().and_then(|entries| {
            entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        })
    }

    /// Returns a copy with `key` set to `value`, positioned at the front.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<TraceState, TraceStateError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if !TraceState::valid_key(&key) {
            return Err(TraceStateError::InvalidKey(key));
        }
        if !TraceState::valid_value(&value) {
            return Err(TraceStateError::InvalidValue(value));
        }

        let mut entries = self.0.clone().unwrap_or_default();
        entries.retain(|(k, _)| k != &key);
        entries.push_front((key, value));
        Ok(TraceState(Some(entries)))
    }

    /// Returns a copy with `key` removed.
    pub fn delete(&self, key: impl AsRef<str>) -> TraceState {
        let mut entries = self.0.clone().unwrap_or_default();
        entries.retain(|(k, _)| k != key.as_ref());
        TraceState(Some(entries))
    }

    /// Serialize as a `key1=value1,key2=value2` header value.
    pub fn header(&self) -> String {
        match &self.0 {
            Some(entries) => entries
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
            None => String::new(),
        }
    }

    // Keys: lowercase alphanumeric plus `_ - * /` and at most one `@`.
    fn valid_key(key: &str) -> bool {
        if key.is_empty() || key.len() > 256 {
            return false;
        }
        let mut at_signs = 0;
        key.bytes().enumerate().all(|(i, b)| match b {
            b'a'..=b'z' | b'0'..=b'9' => true,
            b'_' | b'-' | b'*' | b'/' => i > 0,
            b'@' => {
                at_signs += 1;
                i > 0 && at_signs < 2
            }
            _ => false,
        })
    }

    fn valid_value(value: &str) -> bool {
        value.len() <= 256
            && value
                .bytes()
                .all(|b| (0x20..=0x7e).contains(&b) && b != b',' && b != b'=')
    }
}

/// Errors returned by [`TraceState`] operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceStateError {
    /// The key contains characters outside the allowed set.
    #[error("trace state key is invalid: {0}")]
    InvalidKey(String),
    /// The value contains characters outside the allowed set.
    #[error("trace state value is invalid: {0}")]
    InvalidValue(String),
}

/// The immutable identity portion of a span.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// A context with invalid ids, used where no span is active.
    pub fn empty_context() -> Self {
        SpanContext::new(
            TraceId::INVALID,
            SpanId::INVALID,
            TraceFlags::default(),
            false,
            TraceState::default(),
        )
    }

    /// Construct a span context from parts.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
        trace_state: TraceState,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// This span's id.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The trace option flags.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Whether both ids are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Whether this context was received from a remote peer.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Whether the trace is sampled.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// The vendor trace state.
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }
}

/// The relationship between a span and its enclosing operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// Outgoing synchronous remote call.
    Client,
    /// Incoming synchronous remote call.
    Server,
    /// Message sent to a broker.
    Producer,
    /// Message received from a broker.
    Consumer,
    /// Operation internal to the application.
    Internal,
}

/// The outcome recorded on a finished span.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Status {
    /// No status was set; the default.
    #[default]
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation failed.
    Error {
        /// A developer-facing description of the failure.
        description: Cow<'static, str>,
    },
}

impl Status {
    /// Convenience constructor for [`Status::Error`].
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// Methods for storing and retrieving the active [`SpanContext`] in a
/// [`Context`].
pub trait TraceContextExt {
    /// Returns a copy of this context with the given span context.
    fn with_span_context(&self, span_context: SpanContext) -> Self;

    /// The active span context, if any.
    fn span_context(&self) -> Option<&SpanContext>;

    /// Whether this context carries a valid span context.
    fn has_active_span(&self) -> bool {
        self.span_context().is_some_and(SpanContext::is_valid)
    }
}

impl TraceContextExt for Context {
    fn with_span_context(&self, span_context: SpanContext) -> Self {
        self.with_value(span_context)
    }

    fn span_context(&self) -> Option<&SpanContext> {
        self.get::<SpanContext>()
    }
}
