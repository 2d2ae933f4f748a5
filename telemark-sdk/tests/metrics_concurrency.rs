//! Recorder/collector races: no update may ever be lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use telemark::KeyValue;
use telemark_sdk::metrics::data::{AggregatedData, MetricData, MetricsData};
use telemark_sdk::metrics::{
    ManualReader, MetricReader, SdkMeterProvider, TemporalityPreference,
};

fn collect(reader: &ManualReader) -> MetricsData {
    let mut data = MetricsData::default();
    reader.collect(&mut data).expect("collect succeeds");
    data
}

fn i64_sum_total(data: &MetricsData) -> i64 {
    data.scope_metrics
        .iter()
        .flat_map(|scope| scope.metrics.iter())
        .filter_map(|metric| match &metric.data {
            AggregatedData::I64(MetricData::Sum(sum)) => Some(sum),
            _ => None,
        })
        .flat_map(|sum| sum.data_points.iter())
        .map(|point| point.value)
        .sum()
}

fn f64_histogram_totals(data: &MetricsData) -> (u64, f64) {
    data.scope_metrics
        .iter()
        .flat_map(|scope| scope.metrics.iter())
        .filter_map(|metric| match &metric.data {
            AggregatedData::F64(MetricData::Histogram(histogram)) => Some(histogram),
            _ => None,
        })
        .flat_map(|histogram| histogram.data_points.iter())
        .fold((0, 0.0), |(count, sum), point| {
            (count + point.count, sum + point.sum)
        })
}

#[test]
fn concurrent_delta_collections_observe_every_counter_update() {
    const RECORDERS: usize = 4;
    const UPDATES: i64 = 2_000;

    let reader = ManualReader::builder()
        .with_temporality(TemporalityPreference::Delta)
        .build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    let counter = provider.meter("app").i64_counter("ops").build();

    let done = Arc::new(AtomicBool::new(false));
    let collector = {
        let reader = reader.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut observed = 0i64;
            while !done.load(Ordering::Acquire) {
                observed += i64_sum_total(&collect(&reader));
            }
            observed
        })
    };

    let recorders: Vec<_> = (0..RECORDERS)
        .map(|i| {
            let counter = counter.clone();
            thread::spawn(move || {
                let attrs = [KeyValue::new("recorder", i as i64)];
                for _ in 0..UPDATES {
                    counter.add(1, &attrs);
                }
            })
        })
        .collect();
    for recorder in recorders {
        recorder.join().unwrap();
    }
    done.store(true, Ordering::Release);
    let observed_during = collector.join().unwrap();

    // Whatever the interleaving, deltas collected during the run plus the
    // final delta account for every update exactly once.
    let observed_after = i64_sum_total(&collect(&reader));
    assert_eq!(
        observed_during + observed_after,
        RECORDERS as i64 * UPDATES,
        "no update may be lost or double-counted"
    );
}

#[test]
fn cumulative_total_reflects_every_update_after_the_run() {
    const RECORDERS: usize = 4;
    const UPDATES: i64 = 2_000;

    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    let counter = provider.meter("app").i64_counter("ops").build();

    let recorders: Vec<_> = (0..RECORDERS)
        .map(|_| {
            let counter = counter.clone();
            let reader = reader.clone();
            thread::spawn(move || {
                for i in 0..UPDATES {
                    counter.add(1, &[]);
                    if i % 500 == 0 {
                        // Interleave collections with the updates.
                        let _ = collect(&reader);
                    }
                }
            })
        })
        .collect();
    for recorder in recorders {
        recorder.join().unwrap();
    }

    assert_eq!(i64_sum_total(&collect(&reader)), RECORDERS as i64 * UPDATES);
}

#[test]
fn histogram_deltas_sum_up_under_a_concurrent_collector() {
    // Two recorders, ten updates of value ten, against a busy collector.
    const RECORDERS: usize = 2;
    const UPDATES: usize = 10;
    const VALUE: f64 = 10.0;

    let reader = ManualReader::builder()
        .with_temporality(TemporalityPreference::Delta)
        .build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    let histogram = provider.meter("app").f64_histogram("work").build();

    let done = Arc::new(AtomicBool::new(false));
    let collector = {
        let reader = reader.clone();
        let done = done.clone();
        thread::spawn(move || {
            let (mut count, mut sum) = (0u64, 0.0f64);
            while !done.load(Ordering::Acquire) {
                let (c, s) = f64_histogram_totals(&collect(&reader));
                count += c;
                sum += s;
            }
            (count, sum)
        })
    };

    let recorders: Vec<_> = (0..RECORDERS)
        .map(|_| {
            let histogram = histogram.clone();
            thread::spawn(move || {
                for _ in 0..UPDATES {
                    histogram.record(VALUE, &[KeyValue::new("queue", "q1")]);
                }
            })
        })
        .collect();
    for recorder in recorders {
        recorder.join().unwrap();
    }
    done.store(true, Ordering::Release);
    let (count_during, sum_during) = collector.join().unwrap();

    let (count_after, sum_after) = f64_histogram_totals(&collect(&reader));
    assert_eq!(count_during + count_after, (RECORDERS * UPDATES) as u64);
    assert_eq!(
        sum_during + sum_after,
        RECORDERS as f64 * UPDATES as f64 * VALUE
    );
}
