//! The metric aggregation engine.
//!
//! Instruments created through a [`Meter`] route measurements into
//! per-stream aggregator stores: bounded-cardinality maps from attribute
//! set to a running aggregation cell. Readers snapshot the stores, on
//! demand ([`ManualReader`]) or on a schedule ([`PeriodicReader`]), and
//! hand immutable [`data`] batches to a [`PushMetricExporter`].
//!
//! ```
//! use telemark::KeyValue;
//! use telemark_sdk::metrics::{ManualReader, MetricReader, SdkMeterProvider};
//!
//! let reader = ManualReader::builder().build();
//! let provider = SdkMeterProvider::builder()
//!     .with_reader(reader.clone())
//!     .build();
//!
//! let meter = provider.meter("checkout");
//! let requests = meter.i64_counter("requests").with_unit("{request}").build();
//! requests.add(1, &[KeyValue::new("result", "ok")]);
//!
//! let mut data = telemark_sdk::metrics::data::MetricsData::default();
//! reader.collect(&mut data).unwrap();
//! assert_eq!(data.scope_metrics.len(), 1);
//! ```

pub mod data;

mod attribute_set;
mod error;
mod exporter;
mod in_memory_exporter;
mod instrument;
mod internal;
mod meter;
mod meter_provider;
mod periodic_reader;
mod pipeline;
mod reader;
mod view;

pub use attribute_set::AttributeSet;
pub use error::MetricError;
pub use exporter::PushMetricExporter;
pub use in_memory_exporter::InMemoryMetricExporter;
pub use instrument::{
    Counter, Gauge, Histogram, InstrumentKind, ObservableCounter, ObservableGauge,
    ObservableUpDownCounter, Observer, UpDownCounter,
};
pub use internal::{
    AlignedHistogramReservoir, ExemplarFilter, ExemplarMeasurement, ExemplarReservoir, Number,
    SimpleFixedSizeReservoir,
};
pub use meter::{InstrumentBuilder, Meter, ObservableInstrumentBuilder};
pub use meter_provider::{MeterProviderBuilder, SdkMeterProvider};
pub use periodic_reader::{PeriodicReader, PeriodicReaderBuilder};
pub use pipeline::MetricPipeline;
pub use reader::{ManualReader, ManualReaderBuilder, MetricReader};
pub use view::{Aggregation, View};

/// Whether aggregated values report per-interval changes or running
/// totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Temporality {
    /// Running totals since the stream started.
    Cumulative,
    /// Changes since the previous collection.
    Delta,
}

/// An exporter's preferred temporality, mapped per instrument kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TemporalityPreference {
    /// Everything cumulative; the default.
    #[default]
    Cumulative,
    /// Delta wherever the data model allows it; up-down counters stay
    /// cumulative so their sums remain meaningful.
    Delta,
    /// Delta only for synchronous counters and histograms, minimizing
    /// SDK-side memory without forcing exporters to remember observable
    /// state.
    LowMemory,
}

impl TemporalityPreference {
    pub(crate) fn resolve(&self, kind: InstrumentKind) -> Temporality {
        match self {
            TemporalityPreference::Cumulative => Temporality::Cumulative,
            TemporalityPreference::Delta => match kind {
                InstrumentKind::UpDownCounter | InstrumentKind::ObservableUpDownCounter => {
                    Temporality::Cumulative
                }
                _ => Temporality::Delta,
            },
            TemporalityPreference::LowMemory => match kind {
                InstrumentKind::Counter | InstrumentKind::Histogram => Temporality::Delta,
                _ => Temporality::Cumulative,
            },
        }
    }
}

/// Default cardinality limit per stream: at most this many attribute sets
/// aggregate individually before the overflow series takes over.
pub const DEFAULT_CARDINALITY_LIMIT: usize = 2000;

/// Default explicit histogram bounds, used when neither the instrument nor
/// a view provides any.
pub(crate) const DEFAULT_HISTOGRAM_BOUNDS: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporality_mapping() {
        let pref = TemporalityPreference::Delta;
        assert_eq!(pref.resolve(InstrumentKind::Counter), Temporality::Delta);
        assert_eq!(pref.resolve(InstrumentKind::Histogram), Temporality::Delta);
        assert_eq!(
            pref.resolve(InstrumentKind::UpDownCounter),
            Temporality::Cumulative
        );

        let pref = TemporalityPreference::LowMemory;
        assert_eq!(pref.resolve(InstrumentKind::Counter), Temporality::Delta);
        assert_eq!(
            pref.resolve(InstrumentKind::ObservableCounter),
            Temporality::Cumulative
        );

        let pref = TemporalityPreference::Cumulative;
        assert_eq!(pref.resolve(InstrumentKind::Gauge), Temporality::Cumulative);
    }
}
