//! Exemplar sampling.
//!
//! Kernels offer each recorded value to the owning point's reservoir after
//! the aggregation update; the reservoir decides what to keep. Reservoir
//! failures never reach the record path: offers are wrapped in
//! `catch_unwind` by the store.

use std::sync::Mutex;
use std::time::SystemTime;

use rand::Rng;
use telemark::trace::{SpanContext, TraceContextExt};
use telemark::Context;

use crate::metrics::data::Exemplar;
use crate::metrics::internal::Number;

/// Which measurements are offered to reservoirs at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExemplarFilter {
    /// Never offer; reservoirs are not even allocated.
    #[default]
    AlwaysOff,
    /// Offer every measurement.
    AlwaysOn,
    /// Offer only measurements recorded inside a sampled span.
    TraceBased,
}

impl ExemplarFilter {
    pub(crate) fn reservoirs_enabled(&self) -> bool {
        !matches!(self, ExemplarFilter::AlwaysOff)
    }

    pub(crate) fn should_offer(&self, span: Option<&SpanContext>) -> bool {
        match self {
            ExemplarFilter::AlwaysOff => false,
            ExemplarFilter::AlwaysOn => true,
            ExemplarFilter::TraceBased => span.is_some_and(SpanContext::is_sampled),
        }
    }
}

/// One measurement offered to a reservoir.
#[derive(Clone, Debug)]
pub struct ExemplarMeasurement<T> {
    /// The recorded value.
    pub value: T,
    /// When it was recorded.
    pub time: SystemTime,
    /// For explicit-bucket histograms, the bucket the value landed in.
    pub bucket_index: Option<usize>,
    /// The span active at record time.
    pub span: Option<SpanContext>,
}

impl<T: Number> ExemplarMeasurement<T> {
    pub(crate) fn capture(value: T, bucket_index: Option<usize>) -> Self {
        ExemplarMeasurement {
            value,
            time: telemark::time::now(),
            bucket_index,
            span: Context::map_current(|cx| cx.span_context().cloned()),
        }
    }

    fn into_exemplar(self) -> Exemplar<T> {
        let (trace_id, span_id) = match &self.span {
            Some(span) if span.is_valid() => {
                (span.trace_id().to_bytes(), span.span_id().to_bytes())
            }
            _ => ([0; 16], [0; 8]),
        };
        Exemplar {
            filtered_attributes: Vec::new(),
            time: self.time,
            value: self.value,
            span_id,
            trace_id,
        }
    }
}

/// Owns the sampling discipline for one metric point.
pub trait ExemplarReservoir<T>: Send + Sync {
    /// Consider one measurement.
    fn offer(&self, measurement: ExemplarMeasurement<T>);

    /// Return the sampled exemplars; `reset` clears the reservoir for the
    /// next delta interval.
    fn collect(&self, reset: bool) -> Vec<Exemplar<T>>;
}

/// Uniform reservoir sampling over a fixed number of slots.
#[derive(Debug)]
pub struct SimpleFixedSizeReservoir<T> {
    state: Mutex<FixedSizeState<T>>,
}

#[derive(Debug)]
struct FixedSizeState<T> {
    slots: Vec<Option<ExemplarMeasurement<T>>>,
    seen: usize,
}

impl<T> SimpleFixedSizeReservoir<T> {
    /// Create a reservoir with `size` slots.
    pub fn new(size: usize) -> Self {
        SimpleFixedSizeReservoir {
            state: Mutex::new(FixedSizeState {
                slots: (0..size.max(1)).map(|_| None).collect(),
                seen: 0,
            }),
        }
    }
}

impl<T: Number> ExemplarReservoir<T> for SimpleFixedSizeReservoir<T> {
    fn offer(&self, measurement: ExemplarMeasurement<T>) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let size = state.slots.len();
        let seen = state.seen;
        state.seen += 1;
        if seen < size {
            state.slots[seen] = Some(measurement);
            return;
        }
        // Classic reservoir sampling keeps each measurement with
        // probability size / seen.
        let candidate = rand::rng().random_range(0..=seen);
        if candidate < size {
            state.slots[candidate] = Some(measurement);
        }
    }

    fn collect(&self, reset: bool) -> Vec<Exemplar<T>> {
        let Ok(mut state) = self.state.lock() else {
            return Vec::new();
        };
        let exemplars = state
            .slots
            .iter()
            .flatten()
            .cloned()
            .map(ExemplarMeasurement::into_exemplar)
            .collect();
        if reset {
            state.seen = 0;
            for slot in &mut state.slots {
                *slot = None;
            }
        }
        exemplars
    }
}

/// Keeps the most recent measurement per histogram bucket.
#[derive(Debug)]
pub struct AlignedHistogramReservoir<T> {
    slots: Mutex<Vec<Option<ExemplarMeasurement<T>>>>,
}

impl<T> AlignedHistogramReservoir<T> {
    /// Create a reservoir with one slot per bucket.
    pub fn new(bucket_count: usize) -> Self {
        AlignedHistogramReservoir {
            slots: Mutex::new((0..bucket_count.max(1)).map(|_| None).collect()),
        }
    }
}

impl<T: Number> ExemplarReservoir<T> for AlignedHistogramReservoir<T> {
    fn offer(&self, measurement: ExemplarMeasurement<T>) {
        let Some(bucket) = measurement.bucket_index else {
            return;
        };
        let Ok(mut slots) = self.slots.lock() else {
            return;
        };
        if bucket < slots.len() {
            slots[bucket] = Some(measurement);
        }
    }

    fn collect(&self, reset: bool) -> Vec<Exemplar<T>> {
        let Ok(mut slots) = self.slots.lock() else {
            return Vec::new();
        };
        let exemplars = slots
            .iter()
            .flatten()
            .cloned()
            .map(ExemplarMeasurement::into_exemplar)
            .collect();
        if reset {
            for slot in slots.iter_mut() {
                *slot = None;
            }
        }
        exemplars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(value: f64, bucket_index: Option<usize>) -> ExemplarMeasurement<f64> {
        ExemplarMeasurement {
            value,
            time: telemark::time::now(),
            bucket_index,
            span: None,
        }
    }

    #[test]
    fn fixed_size_keeps_at_most_size() {
        let reservoir = SimpleFixedSizeReservoir::new(2);
        for i in 0..100 {
            reservoir.offer(measurement(i as f64, None));
        }
        assert_eq!(reservoir.collect(false).len(), 2);
    }

    #[test]
    fn fixed_size_reset_clears() {
        let reservoir = SimpleFixedSizeReservoir::new(2);
        reservoir.offer(measurement(1.0, None));
        assert_eq!(reservoir.collect(true).len(), 1);
        assert!(reservoir.collect(false).is_empty());
    }

    #[test]
    fn aligned_reservoir_keeps_last_per_bucket() {
        let reservoir = AlignedHistogramReservoir::new(3);
        reservoir.offer(measurement(1.0, Some(0)));
        reservoir.offer(measurement(2.0, Some(0)));
        reservoir.offer(measurement(9.0, Some(2)));
        let exemplars = reservoir.collect(false);
        let values: Vec<f64> = exemplars.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![2.0, 9.0]);
    }

    #[test]
    fn sampled_span_ids_are_attached() {
        use telemark::trace::{SpanId, TraceFlags, TraceId, TraceState};

        let reservoir = SimpleFixedSizeReservoir::new(1);
        reservoir.offer(ExemplarMeasurement {
            value: 5.0,
            time: telemark::time::now(),
            bucket_index: None,
            span: Some(SpanContext::new(
                TraceId::from_u128(0xabcd),
                SpanId::from_u64(0x1234),
                TraceFlags::SAMPLED,
                false,
                TraceState::default(),
            )),
        });
        let exemplar = reservoir.collect(false).pop().unwrap();
        assert_eq!(exemplar.trace_id, TraceId::from_u128(0xabcd).to_bytes());
        assert_eq!(exemplar.span_id, SpanId::from_u64(0x1234).to_bytes());
    }
}
