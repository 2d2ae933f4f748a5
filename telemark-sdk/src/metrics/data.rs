//! Read-only snapshots produced by `collect`.
//!
//! Exporters receive these types. Fields are public: the structs are plain
//! data handed across the exporter boundary, already detached from the
//! live aggregation state.

use std::borrow::Cow;
use std::time::SystemTime;

use telemark::{InstrumentationScope, KeyValue};

use crate::metrics::Temporality;

/// Everything one collection produced, grouped by instrumentation scope.
#[derive(Clone, Debug, Default)]
pub struct MetricsData {
    /// Metrics per meter scope.
    pub scope_metrics: Vec<ScopeMetrics>,
}

/// The metrics one meter produced.
#[derive(Clone, Debug, Default)]
pub struct ScopeMetrics {
    /// The scope the owning meter was created with.
    pub scope: InstrumentationScope,
    /// One entry per instrument stream.
    pub metrics: Vec<Metric>,
}

/// The aggregated time series of one instrument stream.
#[derive(Clone, Debug)]
pub struct Metric {
    /// Stream name (instrument name unless renamed by a view).
    pub name: Cow<'static, str>,
    /// Instrument description.
    pub description: Cow<'static, str>,
    /// Unit the instrument reports in.
    pub unit: Cow<'static, str>,
    /// The aggregated points.
    pub data: AggregatedData,
}

/// Aggregated data, tagged by measurement value type.
#[derive(Clone, Debug)]
pub enum AggregatedData {
    /// Streams recorded through `i64` instruments.
    I64(MetricData<i64>),
    /// Streams recorded through `f64` instruments.
    F64(MetricData<f64>),
}

/// Aggregated data, tagged by aggregation shape.
#[derive(Clone, Debug)]
pub enum MetricData<T> {
    /// Last-value aggregation.
    Gauge(GaugeData<T>),
    /// Arithmetic sum aggregation.
    Sum(SumData<T>),
    /// Explicit-bucket histogram aggregation.
    Histogram(HistogramData<T>),
    /// Base-2 exponential histogram aggregation.
    ExponentialHistogram(ExponentialHistogramData<T>),
}

impl<T> From<GaugeData<T>> for MetricData<T> {
    fn from(value: GaugeData<T>) -> Self {
        MetricData::Gauge(value)
    }
}

impl<T> From<SumData<T>> for MetricData<T> {
    fn from(value: SumData<T>) -> Self {
        MetricData::Sum(value)
    }
}

impl<T> From<HistogramData<T>> for MetricData<T> {
    fn from(value: HistogramData<T>) -> Self {
        MetricData::Histogram(value)
    }
}

impl<T> From<ExponentialHistogramData<T>> for MetricData<T> {
    fn from(value: ExponentialHistogramData<T>) -> Self {
        MetricData::ExponentialHistogram(value)
    }
}

/// A measurement of the most recent value per series.
#[derive(Clone, Debug)]
pub struct GaugeData<T> {
    /// One point per live attribute set.
    pub data_points: Vec<GaugeDataPoint<T>>,
    /// Start of the aggregation interval, when known.
    pub start_time: Option<SystemTime>,
    /// When the collection was taken.
    pub time: SystemTime,
}

/// One gauge series.
#[derive(Clone, Debug, PartialEq)]
pub struct GaugeDataPoint<T> {
    /// The attribute set identifying the series.
    pub attributes: Vec<KeyValue>,
    /// The last value written.
    pub value: T,
    /// Sampled raw measurements.
    pub exemplars: Vec<Exemplar<T>>,
}

/// The arithmetic sum per series.
#[derive(Clone, Debug)]
pub struct SumData<T> {
    /// One point per live attribute set.
    pub data_points: Vec<SumDataPoint<T>>,
    /// Start of the aggregation interval.
    pub start_time: SystemTime,
    /// When the collection was taken.
    pub time: SystemTime,
    /// Whether points report per-interval deltas or running cumulatives.
    pub temporality: Temporality,
    /// Whether the sum only ever increases.
    pub is_monotonic: bool,
}

/// One sum series.
#[derive(Clone, Debug, PartialEq)]
pub struct SumDataPoint<T> {
    /// The attribute set identifying the series.
    pub attributes: Vec<KeyValue>,
    /// The summed value.
    pub value: T,
    /// Sampled raw measurements.
    pub exemplars: Vec<Exemplar<T>>,
}

/// Explicit-bucket histograms per series.
#[derive(Clone, Debug)]
pub struct HistogramData<T> {
    /// One point per live attribute set.
    pub data_points: Vec<HistogramDataPoint<T>>,
    /// Start of the aggregation interval.
    pub start_time: SystemTime,
    /// When the collection was taken.
    pub time: SystemTime,
    /// Whether points report per-interval deltas or running cumulatives.
    pub temporality: Temporality,
}

/// One explicit-bucket histogram series.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramDataPoint<T> {
    /// The attribute set identifying the series.
    pub attributes: Vec<KeyValue>,
    /// Number of recorded measurements, including those outside every
    /// bucket (non-finite values).
    pub count: u64,
    /// Upper bucket bounds; the final `+inf` bound is implied.
    pub bounds: Vec<f64>,
    /// Count per bucket; always `bounds.len() + 1` entries.
    pub bucket_counts: Vec<u64>,
    /// Smallest recorded value, when min/max recording is on.
    pub min: Option<T>,
    /// Largest recorded value, when min/max recording is on.
    pub max: Option<T>,
    /// Sum of recorded values.
    pub sum: T,
    /// Sampled raw measurements.
    pub exemplars: Vec<Exemplar<T>>,
}

/// Base-2 exponential histograms per series.
#[derive(Clone, Debug)]
pub struct ExponentialHistogramData<T> {
    /// One point per live attribute set.
    pub data_points: Vec<ExponentialHistogramDataPoint<T>>,
    /// Start of the aggregation interval.
    pub start_time: SystemTime,
    /// When the collection was taken.
    pub time: SystemTime,
    /// Whether points report per-interval deltas or running cumulatives.
    pub temporality: Temporality,
}

/// One exponential histogram series.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialHistogramDataPoint<T> {
    /// The attribute set identifying the series.
    pub attributes: Vec<KeyValue>,
    /// Number of recorded measurements.
    pub count: u64,
    /// Smallest recorded value, when min/max recording is on.
    pub min: Option<T>,
    /// Largest recorded value, when min/max recording is on.
    pub max: Option<T>,
    /// Sum of recorded values.
    pub sum: T,
    /// Bucket resolution; boundaries sit at powers of `2^(2^-scale)`.
    pub scale: i8,
    /// Measurements recorded as zero magnitude.
    pub zero_count: u64,
    /// Bucket counts for positive magnitudes.
    pub positive_bucket: ExponentialBucket,
    /// Bucket counts for negative magnitudes.
    pub negative_bucket: ExponentialBucket,
    /// Sampled raw measurements.
    pub exemplars: Vec<Exemplar<T>>,
}

/// A contiguous run of exponential bucket counts.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialBucket {
    /// Bucket index of `counts[0]`.
    pub offset: i32,
    /// `counts[i]` is the count of bucket `offset + i`.
    pub counts: Vec<u64>,
}

/// A raw measurement sampled from a series for diagnostic linkage.
#[derive(Clone, Debug, PartialEq)]
pub struct Exemplar<T> {
    /// Attributes recorded with the measurement but not part of the series
    /// identity.
    pub filtered_attributes: Vec<KeyValue>,
    /// When the measurement was recorded.
    pub time: SystemTime,
    /// The measured value.
    pub value: T,
    /// Id of the span active at record time; zero when none was.
    pub span_id: [u8; 8],
    /// Trace of the span active at record time; zero when none was.
    pub trace_id: [u8; 16],
}
