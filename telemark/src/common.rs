use std::borrow::Cow;
use std::sync::Arc;
use std::{fmt, hash};

/// The key half of a [`KeyValue`] pair.
///
/// Keys are cheap to clone: static strings are carried by reference and
/// owned strings are boxed once.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(TelStr);

impl Key {
    /// Create a new `Key` from anything string-like.
    pub fn new(value: impl Into<Key>) -> Self {
        value.into()
    }

    /// Create a `Key` from a static string in const position.
    pub const fn from_static_str(value: &'static str) -> Self {
        Key(TelStr::Static(value))
    }

    /// The key name as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&'static str> for Key {
    fn from(value: &'static str) -> Self {
        Key(TelStr::Static(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key(TelStr::Owned(value.into_boxed_str()))
    }
}

impl From<Arc<str>> for Key {
    fn from(value: Arc<str>) -> Self {
        Key(TelStr::Shared(value))
    }
}

impl From<Cow<'static, str>> for Key {
    fn from(value: Cow<'static, str>) -> Self {
        match value {
            Cow::Borrowed(s) => Key(TelStr::Static(s)),
            Cow::Owned(s) => Key(TelStr::Owned(s.into_boxed_str())),
        }
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0.as_str().to_string()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Backing storage shared by [`Key`] and [`StringValue`].
#[derive(Clone, Debug, Eq)]
enum TelStr {
    Static(&'static str),
    Owned(Box<str>),
    Shared(Arc<str>),
}

impl TelStr {
    fn as_str(&self) -> &str {
        match self {
            TelStr::Static(s) => s,
            TelStr::Owned(s) => s,
            TelStr::Shared(s) => s,
        }
    }
}

impl PartialEq for TelStr {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl PartialOrd for TelStr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TelStr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl hash::Hash for TelStr {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state)
    }
}

/// Wrapper for string-like attribute values.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringValue(TelStr);

impl StringValue {
    /// Returns a string slice to this value.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for StringValue {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for StringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for StringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&'static str> for StringValue {
    fn from(value: &'static str) -> Self {
        StringValue(TelStr::Static(value))
    }
}

impl From<String> for StringValue {
    fn from(value: String) -> Self {
        StringValue(TelStr::Owned(value.into_boxed_str()))
    }
}

impl From<Arc<str>> for StringValue {
    fn from(value: Arc<str>) -> Self {
        StringValue(TelStr::Shared(value))
    }
}

impl From<Cow<'static, str>> for StringValue {
    fn from(value: Cow<'static, str>) -> Self {
        match value {
            Cow::Borrowed(s) => StringValue(TelStr::Static(s)),
            Cow::Owned(s) => StringValue(TelStr::Owned(s.into_boxed_str())),
        }
    }
}

impl From<StringValue> for String {
    fn from(value: StringValue) -> Self {
        value.0.as_str().to_string()
    }
}

/// A homogeneous array of primitive attribute values.
#[derive(Clone, Debug, PartialEq)]
pub enum Array {
    /// Array of bools.
    Bool(Vec<bool>),
    /// Array of 64-bit signed integers.
    I64(Vec<i64>),
    /// Array of 64-bit floats.
    F64(Vec<f64>),
    /// Array of strings.
    String(Vec<StringValue>),
}

impl Array {
    /// Number of elements in the array.
    pub fn len(&self) -> usize {
        match self {
            Array::Bool(v) => v.len(),
            Array::I64(v) => v.len(),
            Array::F64(v) => v.len(),
            Array::String(v) => v.len(),
        }
    }

    /// Whether the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(items: &[T], f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{item}")?;
            }
            write!(f, "]")
        }
        match self {
            Array::Bool(v) => join(v, f),
            Array::I64(v) => join(v, f),
            Array::F64(v) => join(v, f),
            Array::String(v) => {
                write!(f, "[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "\"{item}\"")?;
                }
                write!(f, "]")
            }
        }
    }
}

macro_rules! into_array {
    ($(($t:ty, $variant:expr),)+) => {
        $(
            impl From<$t> for Array {
                fn from(value: $t) -> Self {
                    $variant(value)
                }
            }
        )+
    };
}

into_array!(
    (Vec<bool>, Array::Bool),
    (Vec<i64>, Array::I64),
    (Vec<f64>, Array::F64),
    (Vec<StringValue>, Array::String),
);

/// The value half of a [`KeyValue`] pair.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Boolean values.
    Bool(bool),
    /// 64-bit signed integer values.
    I64(i64),
    /// 64-bit floating point values.
    F64(f64),
    /// String values.
    String(StringValue),
    /// Homogeneous arrays of the primitive variants.
    Array(Array),
}

impl Value {
    /// String representation of the value.
    ///
    /// Allocates unless the underlying value already is a string.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Value::Bool(v) => format!("{v}").into(),
            Value::I64(v) => format!("{v}").into(),
            Value::F64(v) => format!("{v}").into(),
            Value::String(v) => Cow::Borrowed(v.as_str()),
            Value::Array(v) => format!("{v}").into(),
        }
    }
}

macro_rules! from_values {
    ($(($t:ty, $variant:expr),)+) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    $variant(value)
                }
            }
        )+
    };
}

from_values!(
    (bool, Value::Bool),
    (i64, Value::I64),
    (f64, Value::F64),
    (StringValue, Value::String),
    (Array, Value::Array),
);

impl From<&'static str> for Value {
    fn from(value: &'static str) -> Self {
        Value::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(value: Arc<str>) -> Self {
        Value::String(value.into())
    }
}

impl From<Cow<'static, str>> for Value {
    fn from(value: Cow<'static, str>) -> Self {
        Value::String(value.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => v.fmt(f),
            Value::I64(v) => v.fmt(f),
            Value::F64(v) => v.fmt(f),
            Value::String(v) => f.write_str(v.as_str()),
            Value::Array(v) => v.fmt(f),
        }
    }
}

/// A key-value pair describing one dimension of a measurement, span, or log
/// record.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    /// The attribute name.
    pub key: Key,
    /// The attribute value.
    pub value: Value,
}

impl KeyValue {
    /// Create a new `KeyValue` pair.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Describes the library or module that produced a stream of telemetry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstrumentationScope {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
    attributes: Vec<KeyValue>,
}

impl InstrumentationScope {
    /// Start building a scope with the given name.
    pub fn builder(name: impl Into<Cow<'static, str>>) -> InstrumentationScopeBuilder {
        InstrumentationScopeBuilder {
            name: name.into(),
            version: None,
            attributes: Vec::new(),
        }
    }

    /// The scope name, typically the instrumented crate or module.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version of the instrumented crate, if provided.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Scope-level attributes.
    pub fn attributes(&self) -> impl Iterator<Item = &KeyValue> {
        self.attributes.iter()
    }
}

/// Builder for [`InstrumentationScope`].
#[derive(Debug)]
pub struct InstrumentationScopeBuilder {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
    attributes: Vec<KeyValue>,
}

impl InstrumentationScopeBuilder {
    /// Set the scope version.
    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the scope-level attributes.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes = attributes.into_iter().collect();
        self
    }

    /// Finish the scope.
    pub fn build(self) -> InstrumentationScope {
        InstrumentationScope {
            name: self.name,
            version: self.version,
            attributes: self.attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_equality_is_storage_independent() {
        let a = Key::from_static_str("http.method");
        let b = Key::new(String::from("http.method"));
        let c = Key::new(Arc::<str>::from("http.method"));
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn value_display() {
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from(42i64).to_string(), "42");
        assert_eq!(Value::from("x").to_string(), "x");
        assert_eq!(
            Value::Array(vec![1i64, 2, 3].into()).to_string(),
            "[1,2,3]"
        );
        assert_eq!(
            Value::Array(Array::String(vec!["a".into(), "b".into()])).to_string(),
            "[\"a\",\"b\"]"
        );
    }

    #[test]
    fn scope_builder() {
        let scope = InstrumentationScope::builder("payments")
            .with_version("1.2.0")
            .with_attributes([KeyValue::new("region", "eu-1")])
            .build();
        assert_eq!(scope.name(), "payments");
        assert_eq!(scope.version(), Some("1.2.0"));
        assert_eq!(scope.attributes().count(), 1);
    }
}
