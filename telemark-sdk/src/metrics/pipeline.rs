use std::borrow::Cow;
use std::mem::replace;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use telemark::{InstrumentationScope, KeyValue};

use crate::metrics::data::{
    ExponentialBucket, ExponentialHistogramData, ExponentialHistogramDataPoint, GaugeData,
    GaugeDataPoint, HistogramData, HistogramDataPoint, Metric, MetricsData, ScopeMetrics, SumData,
    SumDataPoint,
};
use crate::metrics::instrument::{InstrumentDescriptor, InstrumentKind};
use crate::metrics::internal::{
    AggregateKind, AggregatorStore, CollectedPoint, ExemplarFilter, Number, PointValue,
    StoreConfig,
};
use crate::metrics::view::{Aggregation, View};
use crate::metrics::{Temporality, TemporalityPreference, DEFAULT_HISTOGRAM_BOUNDS};
use crate::{TelSdkError, TelSdkResult};

/// Provider-level defaults every stream starts from; views override per
/// instrument.
#[derive(Clone, Debug)]
pub(crate) struct PipelineDefaults {
    pub(crate) cardinality_limit: usize,
    pub(crate) emit_overflow_attribute: bool,
    pub(crate) reclaim_unused_metric_points: bool,
    pub(crate) exemplar_filter: ExemplarFilter,
}

/// One reader's worth of instrument streams.
///
/// A pipeline owns every stream resolved for its reader and the observable
/// callbacks feeding them. Readers hold the pipeline weakly so that
/// provider teardown stays deterministic.
pub struct MetricPipeline {
    temporality: TemporalityPreference,
    views: Arc<[View]>,
    defaults: PipelineDefaults,
    state: Mutex<PipelineState>,
    is_shutdown: Arc<AtomicBool>,
}

#[allow(clippy::type_complexity)]
struct PipelineState {
    scopes: Vec<ScopeStreams>,
    callbacks: Vec<Box<dyn Fn() + Send + Sync>>,
}

struct ScopeStreams {
    scope: InstrumentationScope,
    streams: Vec<Arc<dyn AnyStream>>,
}

impl MetricPipeline {
    pub(crate) fn new(
        temporality: TemporalityPreference,
        views: Arc<[View]>,
        defaults: PipelineDefaults,
        is_shutdown: Arc<AtomicBool>,
    ) -> Self {
        MetricPipeline {
            temporality,
            views,
            defaults,
            state: Mutex::new(PipelineState {
                scopes: Vec::new(),
                callbacks: Vec::new(),
            }),
            is_shutdown,
        }
    }

    /// Resolve one instrument into a stream of this pipeline, applying the
    /// first matching view.
    pub(crate) fn create_stream<T: Number>(
        &self,
        scope: &InstrumentationScope,
        descriptor: &InstrumentDescriptor,
        bounds_hint: Option<Vec<f64>>,
    ) -> Arc<InstrumentStream<T>> {
        let view = self.views.iter().find(|view| view.matches(&descriptor.name));

        let name = view
            .and_then(|view| view.rename.clone())
            .unwrap_or_else(|| descriptor.name.clone());
        let description = view
            .and_then(|view| view.description.clone())
            .unwrap_or_else(|| descriptor.description.clone());
        let aggregation = view
            .and_then(|view| view.aggregation.clone())
            .unwrap_or_else(|| default_aggregation(descriptor.kind, bounds_hint));
        let kind = aggregate_kind(descriptor.kind, aggregation);

        let temporality = self.temporality.resolve(descriptor.kind);
        let config = StoreConfig {
            cardinality_limit: view
                .and_then(|view| view.cardinality_limit)
                .unwrap_or(self.defaults.cardinality_limit),
            emit_overflow_attribute: self.defaults.emit_overflow_attribute,
            reclaim_unused_points: self.defaults.reclaim_unused_metric_points
                && temporality == Temporality::Delta,
            exemplar_filter: self.defaults.exemplar_filter,
        };

        let stream = Arc::new(InstrumentStream {
            name,
            description,
            unit: descriptor.unit.clone(),
            store: AggregatorStore::new(kind, config),
            temporality,
            start: Mutex::new(telemark::time::now()),
            is_shutdown: self.is_shutdown.clone(),
        });

        if let Ok(mut state) = self.state.lock() {
            match state.scopes.iter_mut().find(|entry| entry.scope == *scope) {
                Some(entry) => entry.streams.push(stream.clone()),
                None => state.scopes.push(ScopeStreams {
                    scope: scope.clone(),
                    streams: vec![stream.clone()],
                }),
            }
        }
        stream
    }

    /// Register an erased observable callback, run at the start of every
    /// collection.
    pub(crate) fn register_callback(&self, callback: Box<dyn Fn() + Send + Sync>) {
        if let Ok(mut state) = self.state.lock() {
            state.callbacks.push(callback);
        }
    }

    /// Run callbacks, snapshot every stream, and append the result to
    /// `dest`.
    pub(crate) fn produce(&self, dest: &mut MetricsData) -> TelSdkResult {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TelSdkError::AlreadyShutdown);
        }
        let state = self
            .state
            .lock()
            .map_err(|_| TelSdkError::InternalFailure("pipeline lock poisoned".into()))?;

        for callback in &state.callbacks {
            callback();
        }

        for entry in &state.scopes {
            let metrics: Vec<Metric> = entry
                .streams
                .iter()
                .filter_map(|stream| stream.collect())
                .collect();
            if !metrics.is_empty() {
                dest.scope_metrics.push(ScopeMetrics {
                    scope: entry.scope.clone(),
                    metrics,
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MetricPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricPipeline")
            .field("temporality", &self.temporality)
            .finish()
    }
}

fn default_aggregation(kind: InstrumentKind, bounds_hint: Option<Vec<f64>>) -> Aggregation {
    match kind {
        InstrumentKind::Counter
        | InstrumentKind::UpDownCounter
        | InstrumentKind::ObservableCounter
        | InstrumentKind::ObservableUpDownCounter => Aggregation::Sum,
        InstrumentKind::Gauge | InstrumentKind::ObservableGauge => Aggregation::LastValue,
        InstrumentKind::Histogram => Aggregation::ExplicitBucketHistogram {
            boundaries: bounds_hint.unwrap_or_else(|| DEFAULT_HISTOGRAM_BOUNDS.to_vec()),
            record_min_max: true,
        }
        .sanitized(),
    }
}

fn aggregate_kind(kind: InstrumentKind, aggregation: Aggregation) -> AggregateKind {
    let monotonic = matches!(
        kind,
        InstrumentKind::Counter | InstrumentKind::ObservableCounter
    );
    match aggregation {
        Aggregation::Sum if kind.is_observable() => AggregateKind::PrecomputedSum { monotonic },
        Aggregation::Sum => AggregateKind::Sum { monotonic },
        Aggregation::LastValue => AggregateKind::LastValue,
        Aggregation::ExplicitBucketHistogram {
            boundaries,
            record_min_max,
        } => AggregateKind::Histogram {
            bounds: boundaries,
            record_min_max,
        },
        Aggregation::Base2ExponentialHistogram {
            max_size,
            max_scale,
            record_min_max,
        } => AggregateKind::ExpoHistogram {
            max_size,
            max_scale,
            record_min_max,
        },
    }
}

/// Type-erased view of a stream, for pipeline-level collection.
trait AnyStream: Send + Sync {
    fn collect(&self) -> Option<Metric>;
}

/// One instrument bound to one aggregator store under a view
/// configuration.
pub(crate) struct InstrumentStream<T: Number> {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    store: AggregatorStore<T>,
    temporality: Temporality,
    start: Mutex<SystemTime>,
    is_shutdown: Arc<AtomicBool>,
}

impl<T: Number> InstrumentStream<T> {
    /// The record-time entry point: route one measurement into the store.
    pub(crate) fn measure(&self, value: T, attributes: &[KeyValue]) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }
        self.store.measure(value, attributes);
    }
}

impl<T: Number> AnyStream for InstrumentStream<T> {
    fn collect(&self) -> Option<Metric> {
        let output_delta = self.temporality == Temporality::Delta;
        let now = telemark::time::now();
        let start = {
            let mut start = self.start.lock().ok()?;
            if output_delta {
                replace(&mut *start, now)
            } else {
                *start
            }
        };

        let points = self.store.collect(output_delta);
        if points.is_empty() {
            return None;
        }

        let data = match self.store.kind() {
            AggregateKind::Sum { monotonic } | AggregateKind::PrecomputedSum { monotonic } => {
                SumData {
                    data_points: points.into_iter().map(sum_point).collect(),
                    start_time: start,
                    time: now,
                    temporality: self.temporality,
                    is_monotonic: *monotonic,
                }
                .into()
            }
            AggregateKind::LastValue => GaugeData {
                data_points: points.into_iter().map(gauge_point).collect(),
                start_time: Some(start),
                time: now,
            }
            .into(),
            AggregateKind::Histogram {
                bounds,
                record_min_max,
            } => HistogramData {
                data_points: points
                    .into_iter()
                    .map(|point| histogram_point(point, bounds, *record_min_max))
                    .collect(),
                start_time: start,
                time: now,
                temporality: self.temporality,
            }
            .into(),
            AggregateKind::ExpoHistogram { record_min_max, .. } => ExponentialHistogramData {
                data_points: points
                    .into_iter()
                    .map(|point| expo_point(point, *record_min_max))
                    .collect(),
                start_time: start,
                time: now,
                temporality: self.temporality,
            }
            .into(),
        };

        Some(Metric {
            name: self.name.clone(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            data: T::wrap_data(data),
        })
    }
}

fn sum_point<T: Number>(point: CollectedPoint<T>) -> SumDataPoint<T> {
    let value = match point.value {
        PointValue::Sum(value) | PointValue::LastValue(value) => value,
        _ => {
            debug_assert!(false, "sum stream produced a non-sum point");
            T::default()
        }
    };
    SumDataPoint {
        attributes: point.attributes,
        value,
        exemplars: point.exemplars,
    }
}

fn gauge_point<T: Number>(point: CollectedPoint<T>) -> GaugeDataPoint<T> {
    let value = match point.value {
        PointValue::LastValue(value) | PointValue::Sum(value) => value,
        _ => {
            debug_assert!(false, "gauge stream produced a non-gauge point");
            T::default()
        }
    };
    GaugeDataPoint {
        attributes: point.attributes,
        value,
        exemplars: point.exemplars,
    }
}

fn histogram_point<T: Number>(
    point: CollectedPoint<T>,
    bounds: &[f64],
    record_min_max: bool,
) -> HistogramDataPoint<T> {
    let snapshot = match point.value {
        PointValue::Histogram(snapshot) => snapshot,
        _ => {
            debug_assert!(false, "histogram stream produced a non-histogram point");
            return HistogramDataPoint {
                attributes: point.attributes,
                count: 0,
                bounds: bounds.to_vec(),
                bucket_counts: vec![0; bounds.len() + 1],
                min: None,
                max: None,
                sum: T::default(),
                exemplars: point.exemplars,
            };
        }
    };
    let have_extremes = record_min_max && snapshot.min <= snapshot.max;
    HistogramDataPoint {
        attributes: point.attributes,
        count: snapshot.count,
        bounds: bounds.to_vec(),
        bucket_counts: snapshot.bucket_counts,
        min: have_extremes.then_some(snapshot.min),
        max: have_extremes.then_some(snapshot.max),
        sum: snapshot.sum,
        exemplars: point.exemplars,
    }
}

fn expo_point<T: Number>(
    point: CollectedPoint<T>,
    record_min_max: bool,
) -> ExponentialHistogramDataPoint<T> {
    let snapshot = match point.value {
        PointValue::ExpoHistogram(snapshot) => snapshot,
        _ => {
            debug_assert!(false, "exponential stream produced a mismatched point");
            return ExponentialHistogramDataPoint {
                attributes: point.attributes,
                count: 0,
                min: None,
                max: None,
                sum: T::default(),
                scale: 0,
                zero_count: 0,
                positive_bucket: ExponentialBucket {
                    offset: 0,
                    counts: Vec::new(),
                },
                negative_bucket: ExponentialBucket {
                    offset: 0,
                    counts: Vec::new(),
                },
                exemplars: point.exemplars,
            };
        }
    };
    let have_extremes = record_min_max && snapshot.min <= snapshot.max;
    ExponentialHistogramDataPoint {
        attributes: point.attributes,
        count: snapshot.count,
        min: have_extremes.then_some(snapshot.min),
        max: have_extremes.then_some(snapshot.max),
        sum: snapshot.sum,
        scale: snapshot.scale,
        zero_count: snapshot.zero_count,
        positive_bucket: ExponentialBucket {
            offset: snapshot.positive_offset,
            counts: snapshot.positive_counts,
        },
        negative_bucket: ExponentialBucket {
            offset: snapshot.negative_offset,
            counts: snapshot.negative_counts,
        },
        exemplars: point.exemplars,
    }
}
