use std::borrow::Cow;

use crate::metrics::internal::{EXPO_MAX_SCALE, EXPO_MIN_SCALE};

/// The aggregation applied to a stream, either by default per instrument
/// kind or forced by a [`View`].
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Aggregation {
    /// Arithmetic sum.
    Sum,
    /// Last written value.
    LastValue,
    /// Histogram over explicit bucket bounds.
    ExplicitBucketHistogram {
        /// Upper bucket bounds. Non-finite entries are dropped and the
        /// rest sorted and deduplicated at stream creation.
        boundaries: Vec<f64>,
        /// Whether min and max are tracked per series.
        record_min_max: bool,
    },
    /// Base-2 exponential histogram.
    Base2ExponentialHistogram {
        /// Maximum number of active buckets per sign before downscaling.
        max_size: u32,
        /// Starting scale; clamped to `-10..=20`.
        max_scale: i8,
        /// Whether min and max are tracked per series.
        record_min_max: bool,
    },
}

impl Aggregation {
    pub(crate) fn sanitized(self) -> Aggregation {
        match self {
            Aggregation::ExplicitBucketHistogram {
                mut boundaries,
                record_min_max,
            } => {
                boundaries.retain(|bound| bound.is_finite());
                boundaries.sort_by(|a, b| a.partial_cmp(b).expect("finite bounds compare"));
                boundaries.dedup();
                Aggregation::ExplicitBucketHistogram {
                    boundaries,
                    record_min_max,
                }
            }
            Aggregation::Base2ExponentialHistogram {
                max_size,
                max_scale,
                record_min_max,
            } => Aggregation::Base2ExponentialHistogram {
                max_size: max_size.max(1),
                max_scale: max_scale.clamp(EXPO_MIN_SCALE, EXPO_MAX_SCALE),
                record_min_max,
            },
            other => other,
        }
    }
}

/// Overrides applied to the streams of instruments matching by name.
///
/// The first matching view wins; unmatched instruments get the default
/// stream for their kind.
///
/// ```
/// use telemark_sdk::metrics::{Aggregation, View};
///
/// let view = View::new("request.latency")
///     .with_aggregation(Aggregation::ExplicitBucketHistogram {
///         boundaries: vec![0.01, 0.1, 1.0, 10.0],
///         record_min_max: true,
///     })
///     .with_cardinality_limit(500);
/// # drop(view);
/// ```
#[derive(Clone, Debug)]
pub struct View {
    pub(crate) instrument_name: Cow<'static, str>,
    pub(crate) rename: Option<Cow<'static, str>>,
    pub(crate) description: Option<Cow<'static, str>>,
    pub(crate) aggregation: Option<Aggregation>,
    pub(crate) cardinality_limit: Option<usize>,
}

impl View {
    /// A view selecting instruments whose name equals `instrument_name`.
    pub fn new(instrument_name: impl Into<Cow<'static, str>>) -> Self {
        View {
            instrument_name: instrument_name.into(),
            rename: None,
            description: None,
            aggregation: None,
            cardinality_limit: None,
        }
    }

    /// Rename the resulting stream.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.rename = Some(name.into());
        self
    }

    /// Replace the stream description.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Force an aggregation, overriding the instrument-kind default.
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation.sanitized());
        self
    }

    /// Cap the stream's attribute-set cardinality, overriding the
    /// provider default.
    pub fn with_cardinality_limit(mut self, limit: usize) -> Self {
        self.cardinality_limit = Some(limit.max(1));
        self
    }

    pub(crate) fn matches(&self, instrument_name: &str) -> bool {
        self.instrument_name == instrument_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_boundaries_are_sanitized() {
        let aggregation = Aggregation::ExplicitBucketHistogram {
            boundaries: vec![10.0, f64::NAN, 1.0, 10.0, f64::INFINITY, 5.0],
            record_min_max: true,
        }
        .sanitized();
        match aggregation {
            Aggregation::ExplicitBucketHistogram { boundaries, .. } => {
                assert_eq!(boundaries, vec![1.0, 5.0, 10.0]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn exponential_config_is_clamped() {
        let aggregation = Aggregation::Base2ExponentialHistogram {
            max_size: 0,
            max_scale: 99,
            record_min_max: false,
        }
        .sanitized();
        match aggregation {
            Aggregation::Base2ExponentialHistogram {
                max_size,
                max_scale,
                ..
            } => {
                assert_eq!(max_size, 1);
                assert_eq!(max_scale, 20);
            }
            _ => unreachable!(),
        }
    }
}
