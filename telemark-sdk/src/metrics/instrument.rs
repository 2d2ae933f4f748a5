use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use telemark::KeyValue;

use crate::metrics::internal::Number;
use crate::metrics::pipeline::InstrumentStream;

/// The shapes an instrument can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// Monotonic, synchronous sum.
    Counter,
    /// Non-monotonic, synchronous sum.
    UpDownCounter,
    /// Synchronous value distribution.
    Histogram,
    /// Synchronous last-value.
    Gauge,
    /// Monotonic sum reported by callback as a running total.
    ObservableCounter,
    /// Non-monotonic sum reported by callback as a running total.
    ObservableUpDownCounter,
    /// Last-value reported by callback.
    ObservableGauge,
}

impl InstrumentKind {
    pub(crate) fn is_observable(&self) -> bool {
        matches!(
            self,
            InstrumentKind::ObservableCounter
                | InstrumentKind::ObservableUpDownCounter
                | InstrumentKind::ObservableGauge
        )
    }
}

/// The identity of one instrument within its meter.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct InstrumentDescriptor {
    pub(crate) name: Cow<'static, str>,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) kind: InstrumentKind,
}

impl InstrumentDescriptor {
    /// True when `other` collides with this identity: names equal ignoring
    /// ASCII case while any part of the identity differs.
    pub(crate) fn conflicts_with(&self, other: &InstrumentDescriptor) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self != other
    }
}

pub(crate) struct InstrumentInner<T: Number> {
    pub(crate) streams: Vec<Arc<InstrumentStream<T>>>,
}

impl<T: Number> InstrumentInner<T> {
    pub(crate) fn record(&self, value: T, attributes: &[KeyValue]) {
        for stream in &self.streams {
            stream.measure(value, attributes);
        }
    }
}

macro_rules! sync_instrument {
    ($(#[$docs:meta])* $name:ident, $method:ident, $(#[$method_docs:meta])*) => {
        $(#[$docs])*
        #[derive(Clone)]
        pub struct $name<T: Number> {
            pub(crate) inner: Arc<InstrumentInner<T>>,
        }

        impl<T: Number> $name<T> {
            $(#[$method_docs])*
            pub fn $method(&self, value: T, attributes: &[KeyValue]) {
                self.inner.record(value, attributes);
            }
        }

        impl<T: Number> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("streams", &self.inner.streams.len())
                    .finish()
            }
        }
    };
}

sync_instrument!(
    /// A monotonically increasing sum.
    Counter,
    add,
    /// Add `value` (must be non-negative) to the series identified by
    /// `attributes`.
);

sync_instrument!(
    /// A sum that can go up and down.
    UpDownCounter,
    add,
    /// Add `value` (positive or negative) to the series identified by
    /// `attributes`.
);

sync_instrument!(
    /// A distribution of recorded values.
    Histogram,
    record,
    /// Record one measured value into the series identified by
    /// `attributes`.
);

sync_instrument!(
    /// The most recently written value per series.
    Gauge,
    record,
    /// Overwrite the series identified by `attributes` with `value`.
);

macro_rules! observable_instrument {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        #[derive(Debug)]
        pub struct $name<T: Number> {
            pub(crate) _marker: std::marker::PhantomData<T>,
        }
    };
}

observable_instrument!(
    /// Handle for a callback-driven monotonic counter. Observations flow
    /// through the callback's [`Observer`]; the handle itself only keeps
    /// the registration alive in user code.
    ObservableCounter
);

observable_instrument!(
    /// Handle for a callback-driven up-down counter.
    ObservableUpDownCounter
);

observable_instrument!(
    /// Handle for a callback-driven gauge.
    ObservableGauge
);

/// Handed to observable callbacks during collection to report the current
/// values.
pub struct Observer<T: Number> {
    pub(crate) streams: Vec<Arc<InstrumentStream<T>>>,
}

impl<T: Number> Observer<T> {
    /// Report the current value for the series identified by `attributes`.
    ///
    /// Observable counters report running totals, not increments.
    pub fn observe(&self, value: T, attributes: &[KeyValue]) {
        for stream in &self.streams {
            stream.measure(value, attributes);
        }
    }
}

impl<T: Number> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("streams", &self.streams.len())
            .finish()
    }
}

/// Instrument names: up to 255 characters, starting with a letter,
/// containing only alphanumerics and `_ . - /`.
pub(crate) fn valid_instrument_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(valid_instrument_name("requests"));
        assert!(valid_instrument_name("http.server.duration"));
        assert!(valid_instrument_name("a_b-c/d0"));
        assert!(!valid_instrument_name(""));
        assert!(!valid_instrument_name("0leading-digit"));
        assert!(!valid_instrument_name("has space"));
        assert!(!valid_instrument_name(&"x".repeat(256)));
    }

    #[test]
    fn identity_conflicts_are_case_insensitive() {
        let base = InstrumentDescriptor {
            name: "requests".into(),
            unit: "{request}".into(),
            description: "".into(),
            kind: InstrumentKind::Counter,
        };
        let same = base.clone();
        assert!(!base.conflicts_with(&same));

        let recased = InstrumentDescriptor {
            name: "Requests".into(),
            ..base.clone()
        };
        assert!(base.conflicts_with(&recased));

        let other_unit = InstrumentDescriptor {
            unit: "ms".into(),
            ..base.clone()
        };
        assert!(base.conflicts_with(&other_unit));

        let unrelated = InstrumentDescriptor {
            name: "errors".into(),
            ..base.clone()
        };
        assert!(!base.conflicts_with(&unrelated));
    }
}
