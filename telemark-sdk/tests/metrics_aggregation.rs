//! End-to-end aggregation behavior through the public metrics surface.

use telemark::KeyValue;
use telemark_sdk::metrics::data::{
    AggregatedData, HistogramDataPoint, MetricData, MetricsData, SumDataPoint,
};
use telemark_sdk::metrics::{
    Aggregation, ExemplarFilter, ManualReader, MetricReader, SdkMeterProvider,
    TemporalityPreference, View,
};

const OVERFLOW_KEY: &str = "otel.metric.overflow";

fn collect(reader: &ManualReader) -> MetricsData {
    let mut data = MetricsData::default();
    reader.collect(&mut data).expect("collect succeeds");
    data
}

fn i64_sum_points(data: &MetricsData, metric_name: &str) -> Vec<SumDataPoint<i64>> {
    data.scope_metrics
        .iter()
        .flat_map(|scope| scope.metrics.iter())
        .filter(|metric| metric.name == metric_name)
        .filter_map(|metric| match &metric.data {
            AggregatedData::I64(MetricData::Sum(sum)) => Some(sum.data_points.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn f64_histogram_points(data: &MetricsData, metric_name: &str) -> Vec<HistogramDataPoint<f64>> {
    data.scope_metrics
        .iter()
        .flat_map(|scope| scope.metrics.iter())
        .filter(|metric| metric.name == metric_name)
        .filter_map(|metric| match &metric.data {
            AggregatedData::F64(MetricData::Histogram(histogram)) => {
                Some(histogram.data_points.clone())
            }
            _ => None,
        })
        .flatten()
        .collect()
}

fn is_overflow(point_attrs: &[KeyValue]) -> bool {
    point_attrs.iter().any(|kv| kv.key.as_str() == OVERFLOW_KEY)
}

#[test]
fn cardinality_cap_holds_and_overflow_absorbs_the_excess() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .with_cardinality_limit(5)
        .build();
    let counter = provider.meter("app").i64_counter("hits").build();

    for i in 0..20 {
        counter.add(1, &[KeyValue::new("series", format!("s{i}"))]);
    }

    let points = i64_sum_points(&collect(&reader), "hits");
    let non_overflow: Vec<_> = points.iter().filter(|p| !is_overflow(&p.attributes)).collect();
    let overflow: Vec<_> = points.iter().filter(|p| is_overflow(&p.attributes)).collect();

    assert_eq!(non_overflow.len(), 5);
    assert_eq!(overflow.len(), 1);
    assert_eq!(overflow[0].value, 15);
    assert_eq!(points.iter().map(|p| p.value).sum::<i64>(), 20);
}

#[test]
fn overflow_at_limit_two_keeps_first_two_series() {
    // Scenario: limit 2, three distinct attribute sets of one
    // measurement each.
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .with_cardinality_limit(2)
        .build();
    let counter = provider.meter("app").i64_counter("hits").build();

    counter.add(1, &[KeyValue::new("k", "a")]);
    counter.add(1, &[KeyValue::new("k", "b")]);
    counter.add(1, &[KeyValue::new("k", "c")]);

    let points = i64_sum_points(&collect(&reader), "hits");
    assert_eq!(points.len(), 3);
    assert!(points.iter().all(|p| p.value == 1));
    assert_eq!(points.iter().filter(|p| is_overflow(&p.attributes)).count(), 1);
}

#[test]
fn cumulative_difference_equals_delta() {
    // Two readers over the same instrument: one cumulative, one delta.
    let cumulative_reader = ManualReader::builder().build();
    let delta_reader = ManualReader::builder()
        .with_temporality(TemporalityPreference::Delta)
        .build();
    let provider = SdkMeterProvider::builder()
        .with_reader(cumulative_reader.clone())
        .with_reader(delta_reader.clone())
        .build();
    let counter = provider.meter("app").i64_counter("bytes").build();
    let attrs = [KeyValue::new("host", "a")];

    counter.add(10, &attrs);
    let c1 = i64_sum_points(&collect(&cumulative_reader), "bytes")[0].value;
    let d1 = i64_sum_points(&collect(&delta_reader), "bytes")[0].value;

    counter.add(5, &attrs);
    let c2 = i64_sum_points(&collect(&cumulative_reader), "bytes")[0].value;
    let d2 = i64_sum_points(&collect(&delta_reader), "bytes")[0].value;

    assert_eq!(c1, 10);
    assert_eq!(c2, 15);
    assert_eq!(d1, 10);
    assert_eq!(d2, 5);
    assert_eq!(c2 - c1, d2);
}

#[test]
fn default_bounds_bucket_every_pair_exactly_twice() {
    let inputs: [f64; 32] = [
        -1.0, 0.0, 2.0, 5.0, 8.0, 10.0, 11.0, 25.0, 40.0, 50.0, 70.0, 75.0, 99.0, 100.0, 246.0,
        250.0, 499.0, 500.0, 501.0, 750.0, 751.0, 1000.0, 1001.0, 2500.0, 2501.0, 5000.0, 5001.0,
        7500.0, 7501.0, 10000.0, 10001.0, 10000000.0,
    ];

    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    let histogram = provider.meter("app").f64_histogram("latency").build();
    for input in inputs {
        histogram.record(input, &[]);
    }

    let points = f64_histogram_points(&collect(&reader), "latency");
    assert_eq!(points.len(), 1);
    let point = &points[0];

    assert_eq!(point.count, 32);
    assert_eq!(point.bounds.len(), 15);
    assert_eq!(point.bucket_counts.len(), 16);
    assert!(
        point.bucket_counts.iter().all(|&count| count == 2),
        "bucket counts {:?}",
        point.bucket_counts
    );
    let expected_sum: f64 = inputs.iter().sum();
    assert!((point.sum - expected_sum).abs() < 1e-9);
    assert_eq!(point.min, Some(-1.0));
    assert_eq!(point.max, Some(10000000.0));
}

#[test]
fn empty_bounds_histogram_still_counts_and_sums() {
    // Scenario: no boundaries at all; one catch-all bucket.
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .with_view(View::new("latency").with_aggregation(
            Aggregation::ExplicitBucketHistogram {
                boundaries: vec![],
                record_min_max: true,
            },
        ))
        .build();
    let histogram = provider.meter("app").f64_histogram("latency").build();
    for value in [-10.0, 0.0, 1.0, 9.0, 10.0, 11.0, 19.0] {
        histogram.record(value, &[]);
    }

    let points = f64_histogram_points(&collect(&reader), "latency");
    let point = &points[0];
    assert_eq!(point.count, 7);
    assert_eq!(point.sum, 40.0);
    assert!(point.bounds.is_empty());
    assert_eq!(point.bucket_counts, vec![7]);
}

#[test]
fn non_finite_values_count_into_sum_but_no_bucket() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    let histogram = provider.meter("app").f64_histogram("latency").build();
    histogram.record(1.0, &[]);
    histogram.record(f64::INFINITY, &[]);
    histogram.record(f64::NAN, &[]);

    let points = f64_histogram_points(&collect(&reader), "latency");
    let point = &points[0];
    assert_eq!(point.count, 3);
    assert!(point.sum.is_nan());
    assert_eq!(point.bucket_counts.iter().sum::<u64>(), 1);
}

#[test]
fn exponential_histogram_settles_at_the_smallest_fitting_scale() {
    fn expo_point(
        reader: &ManualReader,
        values: &[f64],
    ) -> telemark_sdk::metrics::data::ExponentialHistogramDataPoint<f64> {
        let data = collect(reader);
        let metric = &data.scope_metrics[0].metrics[0];
        match &metric.data {
            AggregatedData::F64(MetricData::ExponentialHistogram(histogram)) => {
                let point = histogram.data_points[0].clone();
                assert_eq!(point.count, values.len() as u64);
                point
            }
            other => panic!("expected exponential histogram, got {other:?}"),
        }
    }

    // Four powers of two fit max_size = 4 exactly at scale 0.
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .with_view(View::new("sizes").with_aggregation(
            Aggregation::Base2ExponentialHistogram {
                max_size: 4,
                max_scale: 20,
                record_min_max: true,
            },
        ))
        .build();
    let histogram = provider.meter("app").f64_histogram("sizes").build();
    let values = [1.0, 2.0, 4.0, 8.0];
    for value in values {
        histogram.record(value, &[]);
    }
    let point = expo_point(&reader, &values);
    assert_eq!(point.scale, 0);
    assert_eq!(point.positive_bucket.counts, vec![1, 1, 1, 1]);
    assert_eq!(point.zero_count, 0);

    // Six powers of two cannot fit four buckets at scale 0; one more
    // halving is the smallest scale that fits.
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .with_view(View::new("sizes").with_aggregation(
            Aggregation::Base2ExponentialHistogram {
                max_size: 4,
                max_scale: 20,
                record_min_max: true,
            },
        ))
        .build();
    let histogram = provider.meter("app").f64_histogram("sizes").build();
    let values = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0];
    for value in values {
        histogram.record(value, &[]);
    }
    let point = expo_point(&reader, &values);
    assert_eq!(point.scale, -1);
    assert_eq!(point.positive_bucket.counts.iter().sum::<u64>(), 6);
}

#[test]
fn reclaimed_slots_accept_new_series_without_overflow() {
    // Scenario: reclaim on, delta temporality, cardinality limit 1.
    let reader = ManualReader::builder()
        .with_temporality(TemporalityPreference::Delta)
        .build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .with_cardinality_limit(1)
        .with_metric_point_reclaim(true)
        .build();
    let counter = provider.meter("app").i64_counter("hits").build();

    counter.add(1, &[KeyValue::new("k", "a")]);
    let first = i64_sum_points(&collect(&reader), "hits");
    assert_eq!(first.len(), 1);
    assert!(!is_overflow(&first[0].attributes));

    // One full idle cycle; the series slot is reclaimed.
    let idle = collect(&reader);
    assert!(idle.scope_metrics.is_empty());

    counter.add(1, &[KeyValue::new("k", "b")]);
    let second = i64_sum_points(&collect(&reader), "hits");
    assert_eq!(second.len(), 1);
    assert!(
        !is_overflow(&second[0].attributes),
        "the new series should land in the reclaimed slot, not in overflow"
    );
    assert_eq!(second[0].value, 1);
}

#[test]
fn observable_counters_convert_running_totals_to_deltas() {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    let total = Arc::new(AtomicI64::new(10));
    let reader = ManualReader::builder()
        .with_temporality(TemporalityPreference::Delta)
        .build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();

    let observed = total.clone();
    let _handle = provider
        .meter("app")
        .i64_observable_counter("connections.total")
        .with_callback(move |observer| {
            observer.observe(observed.load(Ordering::Relaxed), &[]);
        })
        .build();

    let first = i64_sum_points(&collect(&reader), "connections.total");
    assert_eq!(first[0].value, 10);

    total.store(15, Ordering::Relaxed);
    let second = i64_sum_points(&collect(&reader), "connections.total");
    assert_eq!(second[0].value, 5);
}

#[test]
fn negative_values_into_monotonic_counters_are_dropped() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    let counter = provider.meter("app").i64_counter("hits").build();
    counter.add(7, &[]);
    counter.add(-5, &[]);

    let points = i64_sum_points(&collect(&reader), "hits");
    assert_eq!(points[0].value, 7);

    // Up-down counters accept the same value.
    let up_down = provider.meter("app").i64_up_down_counter("in_flight").build();
    up_down.add(7, &[]);
    up_down.add(-5, &[]);
    let points = i64_sum_points(&collect(&reader), "in_flight");
    assert_eq!(points[0].value, 2);
}

#[test]
fn duplicate_identities_both_export() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    let meter = provider.meter("app");
    // Same case-insensitive name, different unit: flagged as a duplicate
    // but both streams live on.
    let first = meter.i64_counter("requests").with_unit("{request}").build();
    let second = meter.i64_counter("Requests").with_unit("ms").build();
    first.add(1, &[]);
    second.add(2, &[]);

    let data = collect(&reader);
    let names: Vec<_> = data.scope_metrics[0]
        .metrics
        .iter()
        .map(|m| m.name.as_ref())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"requests"));
    assert!(names.contains(&"Requests"));
}

#[test]
fn sampled_spans_leave_exemplars_when_enabled() {
    use telemark::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };
    use telemark::Context;

    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .with_exemplar_filter(ExemplarFilter::TraceBased)
        .build();
    let histogram = provider.meter("app").f64_histogram("latency").build();

    // Not inside a sampled span: nothing is offered.
    histogram.record(5.0, &[]);

    let span_context = SpanContext::new(
        TraceId::from_u128(0xfeed),
        SpanId::from_u64(0xbeef),
        TraceFlags::SAMPLED,
        false,
        TraceState::default(),
    );
    {
        let _guard = Context::new().with_span_context(span_context).attach();
        histogram.record(42.0, &[]);
    }

    let points = f64_histogram_points(&collect(&reader), "latency");
    let exemplars = &points[0].exemplars;
    assert_eq!(exemplars.len(), 1);
    assert_eq!(exemplars[0].value, 42.0);
    assert_eq!(exemplars[0].trace_id, TraceId::from_u128(0xfeed).to_bytes());
}
