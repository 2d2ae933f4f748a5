use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use telemark::{tele_warn, KeyValue};

use super::exemplar::{
    AlignedHistogramReservoir, ExemplarFilter, ExemplarMeasurement, ExemplarReservoir,
    SimpleFixedSizeReservoir,
};
use super::point::{
    CollectedPoint, ExpoSnapshot, HistogramCell, LastValueCell, MetricPoint, PointState,
    PointValue, SumCell, COLLECT_PENDING, NO_COLLECT_PENDING, RECLAIMED,
};
use super::{AtomicCell, ExpoHistogramState, Number};
use crate::metrics::attribute_set::AttributeSet;

/// Index of the pre-allocated point for measurements with no attributes.
const ZERO_TAG_INDEX: usize = 0;
/// Index of the pre-allocated overflow point.
const OVERFLOW_INDEX: usize = 1;

/// Series key attached to every measurement beyond the cardinality limit.
pub(crate) const OVERFLOW_ATTRIBUTE_KEY: &str = "otel.metric.overflow";

/// Boundary count at and below which bucket lookup scans linearly; above
/// it, binary search wins.
const LINEAR_SCAN_MAX_BOUNDS: usize = 49;

/// Slots in a non-histogram exemplar reservoir.
const FIXED_RESERVOIR_SIZE: usize = 4;

/// The aggregation a store applies, fixed at stream resolution.
#[derive(Clone, Debug)]
pub(crate) enum AggregateKind {
    /// Delta-input sum.
    Sum { monotonic: bool },
    /// Cumulative-input sum fed by observable callbacks.
    PrecomputedSum { monotonic: bool },
    /// Last-write-wins.
    LastValue,
    /// Explicit-bucket histogram. `bounds` are sorted, deduplicated, and
    /// finite.
    Histogram {
        bounds: Vec<f64>,
        record_min_max: bool,
    },
    /// Base-2 exponential histogram.
    ExpoHistogram {
        max_size: u32,
        max_scale: i8,
        record_min_max: bool,
    },
}

impl AggregateKind {
    fn is_monotonic(&self) -> bool {
        matches!(
            self,
            AggregateKind::Sum { monotonic: true } | AggregateKind::PrecomputedSum { monotonic: true }
        )
    }
}

/// Store-level knobs, resolved from provider config and views.
#[derive(Clone, Debug)]
pub(crate) struct StoreConfig {
    pub(crate) cardinality_limit: usize,
    pub(crate) emit_overflow_attribute: bool,
    /// Only honored at delta temporality; the stream clears it otherwise.
    pub(crate) reclaim_unused_points: bool,
    pub(crate) exemplar_filter: ExemplarFilter,
}

/// Bounded map from attribute set to metric point.
///
/// Points live in a dense slab of `cardinality_limit + 2` slots: slot 0 is
/// the zero-tag point, slot 1 the overflow point, and the rest are handed
/// out through a free list as new attribute sets arrive. A fingerprint-
/// hashed map resolves attribute sets to slots; the map is read-locked on
/// the hot path and write-locked only to claim or reclaim a slot.
pub(crate) struct AggregatorStore<T: Number> {
    points: Box<[MetricPoint<T>]>,
    lookup: RwLock<HashMap<AttributeSet, usize>>,
    free_list: Mutex<Vec<usize>>,
    kind: AggregateKind,
    config: StoreConfig,
    dropped: AtomicUsize,
    rejected: AtomicUsize,
    overflow_warned: AtomicBool,
    invalid_warned: AtomicBool,
    negative_warned: AtomicBool,
    reservoir_warned: AtomicBool,
}

impl<T: Number> AggregatorStore<T> {
    pub(crate) fn new(kind: AggregateKind, config: StoreConfig) -> Self {
        let capacity = config.cardinality_limit.max(1) + 2;
        let points: Box<[MetricPoint<T>]> = (0..capacity)
            .map(|_| {
                MetricPoint::new(
                    new_state(&kind),
                    new_reservoir(&kind, config.exemplar_filter),
                )
            })
            .collect();

        points[ZERO_TAG_INDEX].activate(Some(AttributeSet::default()));
        points[OVERFLOW_INDEX].activate(Some(overflow_attribute_set()));

        AggregatorStore {
            free_list: Mutex::new((2..capacity).rev().collect()),
            lookup: RwLock::new(HashMap::with_capacity(capacity)),
            points,
            kind,
            config,
            dropped: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
            overflow_warned: AtomicBool::new(false),
            invalid_warned: AtomicBool::new(false),
            negative_warned: AtomicBool::new(false),
            reservoir_warned: AtomicBool::new(false),
        }
    }

    pub(crate) fn kind(&self) -> &AggregateKind {
        &self.kind
    }

    /// Measurements discarded for invalid attributes or a full store with
    /// the overflow attribute disabled.
    pub(crate) fn dropped_measurements(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Negative measurements rejected by a monotonic sum.
    pub(crate) fn rejected_measurements(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Route one measurement to its point.
    pub(crate) fn measure(&self, value: T, attributes: &[KeyValue]) {
        if self.kind.is_monotonic() && value < T::default() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            if !self.negative_warned.swap(true, Ordering::Relaxed) {
                tele_warn!(
                    name: "AggregatorStore.NegativeMonotonicValue",
                    message = "negative value dropped by a monotonic sum; further rejections are counted silently"
                );
            }
            return;
        }
        if matches!(self.kind, AggregateKind::ExpoHistogram { .. })
            && !value.into_f64().is_finite()
        {
            return;
        }

        if attributes.is_empty() {
            self.update_at(ZERO_TAG_INDEX, value);
            return;
        }

        let attr_set = match AttributeSet::new(attributes) {
            Ok(attr_set) => attr_set,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                if !self.invalid_warned.swap(true, Ordering::Relaxed) {
                    tele_warn!(
                        name: "AggregatorStore.InvalidAttributes",
                        message = "measurement dropped: attribute keys must be non-empty"
                    );
                }
                return;
            }
        };

        loop {
            let known = self
                .lookup
                .read()
                .ok()
                .and_then(|map| map.get(&attr_set).copied());
            if let Some(index) = known {
                if self.update_claimed(index, &attr_set, value) {
                    return;
                }
                // Lost a race with reclamation; probe again.
                continue;
            }

            let Ok(mut map) = self.lookup.write() else {
                return;
            };
            if map.contains_key(&attr_set) {
                continue;
            }
            let free = self.free_list.lock().ok().and_then(|mut list| list.pop());
            match free {
                Some(index) => {
                    self.points[index].activate(Some(attr_set.clone()));
                    map.insert(attr_set.clone(), index);
                    drop(map);
                    if self.update_claimed(index, &attr_set, value) {
                        return;
                    }
                }
                None => {
                    drop(map);
                    if self.config.emit_overflow_attribute {
                        if !self.overflow_warned.swap(true, Ordering::Relaxed) {
                            tele_warn!(
                                name: "AggregatorStore.CardinalityLimitReached",
                                limit = self.config.cardinality_limit,
                                message = "maximum unique attribute sets reached; excess measurements aggregate into the overflow series"
                            );
                        }
                        self.update_at(OVERFLOW_INDEX, value);
                    } else {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        if !self.overflow_warned.swap(true, Ordering::Relaxed) {
                            tele_warn!(
                                name: "AggregatorStore.CardinalityLimitReached",
                                limit = self.config.cardinality_limit,
                                message = "maximum unique attribute sets reached; excess measurements are dropped"
                            );
                        }
                    }
                    return;
                }
            }
        }
    }

    /// Snapshot every live point. `output_delta` selects per-interval
    /// deltas (and resets) over running cumulatives.
    pub(crate) fn collect(&self, output_delta: bool) -> Vec<CollectedPoint<T>> {
        // Reclaim first: candidates are points untouched since the
        // previous collection, judged before this cycle snapshots them.
        if output_delta && self.config.reclaim_unused_points {
            self.reclaim_idle_points();
        }

        let mut out = Vec::new();
        for index in [ZERO_TAG_INDEX, OVERFLOW_INDEX] {
            let point = &self.points[index];
            if !point.used.load(Ordering::Acquire) {
                continue;
            }
            self.collect_point(point, index, output_delta, &mut out);
        }

        let entries: Vec<(AttributeSet, usize)> = match self.lookup.read() {
            Ok(map) => map.iter().map(|(attrs, &index)| (attrs.clone(), index)).collect(),
            Err(_) => return out,
        };
        for (_, index) in entries {
            self.collect_point(&self.points[index], index, output_delta, &mut out);
        }
        out
    }

    fn collect_point(
        &self,
        point: &MetricPoint<T>,
        index: usize,
        output_delta: bool,
        out: &mut Vec<CollectedPoint<T>>,
    ) {
        debug_assert!(index < self.points.len());
        let Some(value) = self.snapshot_point(point, output_delta) else {
            return;
        };
        let attributes = point
            .attrs
            .read()
            .ok()
            .and_then(|attrs| attrs.as_ref().map(AttributeSet::to_vec))
            .unwrap_or_default();
        out.push(CollectedPoint {
            attributes,
            value,
            exemplars: point.collect_exemplars(output_delta),
        });
    }

    /// The per-point snapshot dance: snapshot, clear the collect status,
    /// then re-check the running state and re-arm the status if an update
    /// slipped in between. The straggler is never lost; at worst the next
    /// collection emits one zero-delta point.
    fn snapshot_point(&self, point: &MetricPoint<T>, output_delta: bool) -> Option<PointValue<T>> {
        if output_delta && point.status.load(Ordering::Acquire) != COLLECT_PENDING {
            return None;
        }

        match (&point.state, &self.kind) {
            (PointState::Sum(cell), _) => {
                let snapshot = cell.running.load();
                if output_delta {
                    let previous = cell.delta_last.swap(snapshot);
                    point.status.store(NO_COLLECT_PENDING, Ordering::Release);
                    if !cell.running.load().same_bits(snapshot) {
                        point.status.store(COLLECT_PENDING, Ordering::Release);
                    }
                    Some(PointValue::Sum(snapshot - previous))
                } else {
                    Some(PointValue::Sum(snapshot))
                }
            }
            (PointState::LastValue(cell), AggregateKind::PrecomputedSum { .. }) => {
                let snapshot = cell.value.load();
                if output_delta {
                    let previous = cell.delta_last.swap(snapshot);
                    point.status.store(NO_COLLECT_PENDING, Ordering::Release);
                    if !cell.value.load().same_bits(snapshot) {
                        point.status.store(COLLECT_PENDING, Ordering::Release);
                    }
                    Some(PointValue::Sum(snapshot - previous))
                } else {
                    Some(PointValue::Sum(snapshot))
                }
            }
            (PointState::LastValue(cell), _) => {
                let snapshot = cell.value.load();
                if output_delta {
                    point.status.store(NO_COLLECT_PENDING, Ordering::Release);
                    if !cell.value.load().same_bits(snapshot) {
                        point.status.store(COLLECT_PENDING, Ordering::Release);
                    }
                }
                Some(PointValue::LastValue(snapshot))
            }
            (PointState::Histogram(cell), _) => {
                let snapshot = cell.snapshot(output_delta);
                if output_delta {
                    point.status.store(NO_COLLECT_PENDING, Ordering::Release);
                    if cell.has_data() {
                        point.status.store(COLLECT_PENDING, Ordering::Release);
                    }
                }
                Some(PointValue::Histogram(snapshot))
            }
            (PointState::ExpoHistogram(state), _) => {
                let snapshot = {
                    let mut state = state.lock().ok()?;
                    let snapshot = ExpoSnapshot {
                        count: state.count,
                        sum: state.sum,
                        min: state.min,
                        max: state.max,
                        scale: state.scale,
                        zero_count: state.zero_count,
                        positive_offset: state.positive.start_bin,
                        positive_counts: state.positive.counts.clone(),
                        negative_offset: state.negative.start_bin,
                        negative_counts: state.negative.counts.clone(),
                    };
                    if output_delta {
                        state.reset();
                    }
                    snapshot
                };
                if output_delta {
                    point.status.store(NO_COLLECT_PENDING, Ordering::Release);
                    let rearm = state.lock().map(|state| state.count != 0).unwrap_or(false);
                    if rearm {
                        point.status.store(COLLECT_PENDING, Ordering::Release);
                    }
                }
                Some(PointValue::ExpoHistogram(snapshot))
            }
        }
    }

    /// Return every slot that saw no update across the last full cycle to
    /// the free list. A slot is only taken when its reference count CASes
    /// from zero to the reclaimed sentinel, so in-flight recorders keep
    /// their point alive.
    fn reclaim_idle_points(&self) {
        let Ok(mut map) = self.lookup.write() else {
            return;
        };
        let mut freed = Vec::new();
        map.retain(|_, index| {
            let point = &self.points[*index];
            let idle = point.status.load(Ordering::Acquire) == NO_COLLECT_PENDING;
            if idle
                && point
                    .ref_count
                    .compare_exchange(0, RECLAIMED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                if let Ok(mut attrs) = point.attrs.write() {
                    *attrs = None;
                }
                freed.push(*index);
                false
            } else {
                true
            }
        });
        if freed.is_empty() {
            return;
        }
        if let Ok(mut free_list) = self.free_list.lock() {
            free_list.extend(freed);
        }
    }

    /// Update a point found through the lookup map, guarding against a
    /// concurrent reclaim. Returns false when the slot was lost and the
    /// caller must re-probe.
    fn update_claimed(&self, index: usize, attr_set: &AttributeSet, value: T) -> bool {
        let point = &self.points[index];
        if !self.config.reclaim_unused_points {
            self.update_at(index, value);
            return true;
        }

        let previous = point.ref_count.fetch_add(1, Ordering::Acquire);
        if previous < 0 {
            point.ref_count.fetch_sub(1, Ordering::Release);
            return false;
        }
        // The slot might have been reclaimed and re-issued to another
        // attribute set between the probe and the count increment.
        let still_ours = self
            .lookup
            .read()
            .map(|map| map.get(attr_set) == Some(&index))
            .unwrap_or(false);
        if !still_ours {
            point.ref_count.fetch_sub(1, Ordering::Release);
            return false;
        }
        self.update_at(index, value);
        point.ref_count.fetch_sub(1, Ordering::Release);
        true
    }

    fn update_at(&self, index: usize, value: T) {
        let point = &self.points[index];
        let bucket = self.kernel_update(point, value);
        point.mark_updated();
        self.maybe_offer_exemplar(point, value, bucket);
    }

    /// Apply the store's kernel to one point; returns the explicit bucket
    /// index when there is one, for exemplar alignment.
    fn kernel_update(&self, point: &MetricPoint<T>, value: T) -> Option<usize> {
        match (&point.state, &self.kind) {
            (PointState::Sum(cell), _) => {
                cell.running.add(value);
                None
            }
            (PointState::LastValue(cell), _) => {
                cell.value.store(value);
                None
            }
            (PointState::Histogram(cell), AggregateKind::Histogram { bounds, record_min_max }) => {
                let bucket = bucket_index(bounds, value.into_f64());
                cell.record(value, bucket, *record_min_max);
                bucket
            }
            (
                PointState::ExpoHistogram(state),
                AggregateKind::ExpoHistogram { record_min_max, .. },
            ) => {
                if let Ok(mut state) = state.lock() {
                    state.record(value, *record_min_max);
                }
                None
            }
            _ => {
                debug_assert!(false, "point state does not match store kind");
                None
            }
        }
    }

    fn maybe_offer_exemplar(&self, point: &MetricPoint<T>, value: T, bucket: Option<usize>) {
        let Some(reservoir) = point.reservoir.as_ref() else {
            return;
        };
        let measurement = ExemplarMeasurement::capture(value, bucket);
        if !self
            .config
            .exemplar_filter
            .should_offer(measurement.span.as_ref())
        {
            return;
        }
        if catch_unwind(AssertUnwindSafe(|| reservoir.offer(measurement))).is_err()
            && !self.reservoir_warned.swap(true, Ordering::Relaxed)
        {
            tele_warn!(
                name: "AggregatorStore.ReservoirPanicked",
                message = "exemplar reservoir panicked; the measurement was still aggregated"
            );
        }
    }
}

/// The bucket a finite value lands in: index `i` covers
/// `(bounds[i-1], bounds[i]]`, with the final bucket open to the right.
/// `None` for non-finite values, which stay outside every bucket.
fn bucket_index(bounds: &[f64], value: f64) -> Option<usize> {
    if !value.is_finite() {
        return None;
    }
    if bounds.len() <= LINEAR_SCAN_MAX_BOUNDS {
        for (index, bound) in bounds.iter().enumerate() {
            if value <= *bound {
                return Some(index);
            }
        }
        Some(bounds.len())
    } else {
        Some(bounds.partition_point(|bound| *bound < value))
    }
}

fn overflow_attribute_set() -> AttributeSet {
    AttributeSet::new(&[KeyValue::new(OVERFLOW_ATTRIBUTE_KEY, "true")])
        .expect("overflow attribute key is valid")
}

fn new_state<T: Number>(kind: &AggregateKind) -> PointState<T> {
    match kind {
        AggregateKind::Sum { .. } => PointState::Sum(SumCell::new()),
        AggregateKind::PrecomputedSum { .. } | AggregateKind::LastValue => {
            PointState::LastValue(LastValueCell::new())
        }
        AggregateKind::Histogram { bounds, .. } => {
            PointState::Histogram(HistogramCell::new(bounds.len() + 1))
        }
        AggregateKind::ExpoHistogram {
            max_size, max_scale, ..
        } => PointState::ExpoHistogram(Mutex::new(ExpoHistogramState::new(*max_size, *max_scale))),
    }
}

fn new_reservoir<T: Number>(
    kind: &AggregateKind,
    filter: ExemplarFilter,
) -> Option<Box<dyn ExemplarReservoir<T>>> {
    if !filter.reservoirs_enabled() {
        return None;
    }
    match kind {
        AggregateKind::Histogram { bounds, .. } => {
            Some(Box::new(AlignedHistogramReservoir::new(bounds.len() + 1)))
        }
        _ => Some(Box::new(SimpleFixedSizeReservoir::new(FIXED_RESERVOIR_SIZE))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_config(limit: usize) -> StoreConfig {
        StoreConfig {
            cardinality_limit: limit,
            emit_overflow_attribute: true,
            reclaim_unused_points: false,
            exemplar_filter: ExemplarFilter::AlwaysOff,
        }
    }

    fn sum_store(limit: usize) -> AggregatorStore<i64> {
        AggregatorStore::new(AggregateKind::Sum { monotonic: true }, store_config(limit))
    }

    fn sum_value(point: &CollectedPoint<i64>) -> i64 {
        match point.value {
            PointValue::Sum(value) => value,
            _ => panic!("expected a sum point"),
        }
    }

    fn attr_of(point: &CollectedPoint<i64>) -> String {
        point
            .attributes
            .iter()
            .map(|kv| format!("{}={}", kv.key, kv.value))
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn zero_tag_measurements_use_the_reserved_slot() {
        let store = sum_store(10);
        store.measure(3, &[]);
        store.measure(4, &[]);

        let points = store.collect(false);
        assert_eq!(points.len(), 1);
        assert!(points[0].attributes.is_empty());
        assert_eq!(sum_value(&points[0]), 7);
    }

    #[test]
    fn excess_series_aggregate_into_overflow() {
        let store = sum_store(2);
        store.measure(1, &[KeyValue::new("k", "a")]);
        store.measure(1, &[KeyValue::new("k", "b")]);
        store.measure(1, &[KeyValue::new("k", "c")]);

        let points = store.collect(false);
        assert_eq!(points.len(), 3);
        let overflow = points
            .iter()
            .find(|p| attr_of(p).contains(OVERFLOW_ATTRIBUTE_KEY))
            .expect("overflow point present");
        assert_eq!(sum_value(overflow), 1);
        let non_overflow = points
            .iter()
            .filter(|p| !attr_of(p).contains(OVERFLOW_ATTRIBUTE_KEY))
            .count();
        assert_eq!(non_overflow, 2);
    }

    #[test]
    fn disabled_overflow_counts_drops() {
        let mut config = store_config(1);
        config.emit_overflow_attribute = false;
        let store: AggregatorStore<i64> =
            AggregatorStore::new(AggregateKind::Sum { monotonic: true }, config);

        store.measure(1, &[KeyValue::new("k", "a")]);
        store.measure(1, &[KeyValue::new("k", "b")]);
        store.measure(1, &[KeyValue::new("k", "c")]);

        assert_eq!(store.dropped_measurements(), 2);
        assert_eq!(store.collect(false).len(), 1);
    }

    #[test]
    fn monotonic_sums_reject_negative_values() {
        let store = sum_store(4);
        store.measure(5, &[]);
        store.measure(-3, &[]);
        assert_eq!(store.rejected_measurements(), 1);
        assert_eq!(sum_value(&store.collect(false)[0]), 5);
    }

    #[test]
    fn empty_attribute_keys_drop_the_measurement() {
        let store = sum_store(4);
        store.measure(5, &[KeyValue::new("", "v")]);
        assert_eq!(store.dropped_measurements(), 1);
        assert!(store.collect(false).is_empty());
    }

    #[test]
    fn delta_collection_resets_and_skips_idle_points() {
        let store = sum_store(4);
        store.measure(10, &[KeyValue::new("k", "a")]);

        let first = store.collect(true);
        assert_eq!(first.len(), 1);
        assert_eq!(sum_value(&first[0]), 10);

        // Nothing recorded since: the point is skipped entirely.
        assert!(store.collect(true).is_empty());

        store.measure(2, &[KeyValue::new("k", "a")]);
        let third = store.collect(true);
        assert_eq!(third.len(), 1);
        assert_eq!(sum_value(&third[0]), 2);
    }

    #[test]
    fn cumulative_collection_keeps_running_totals() {
        let store = sum_store(4);
        store.measure(10, &[KeyValue::new("k", "a")]);
        assert_eq!(sum_value(&store.collect(false)[0]), 10);
        store.measure(5, &[KeyValue::new("k", "a")]);
        assert_eq!(sum_value(&store.collect(false)[0]), 15);
        // Idle cumulative points keep reporting their total.
        assert_eq!(sum_value(&store.collect(false)[0]), 15);
    }

    #[test]
    fn reclaim_frees_idle_slots_for_new_series() {
        let mut config = store_config(1);
        config.reclaim_unused_points = true;
        let store: AggregatorStore<i64> =
            AggregatorStore::new(AggregateKind::Sum { monotonic: true }, config);

        store.measure(1, &[KeyValue::new("k", "a")]);
        assert_eq!(store.collect(true).len(), 1);
        // One full idle cycle; the slot is reclaimed at the next collect.
        assert!(store.collect(true).is_empty());

        store.measure(1, &[KeyValue::new("k", "b")]);
        let points = store.collect(true);
        assert_eq!(points.len(), 1);
        assert_eq!(attr_of(&points[0]), "k=b");
    }

    #[test]
    fn reclaim_spares_points_updated_this_cycle() {
        let mut config = store_config(1);
        config.reclaim_unused_points = true;
        let store: AggregatorStore<i64> =
            AggregatorStore::new(AggregateKind::Sum { monotonic: true }, config);

        store.measure(1, &[KeyValue::new("k", "a")]);
        assert_eq!(store.collect(true).len(), 1);
        store.measure(2, &[KeyValue::new("k", "a")]);
        // Updated since the last cycle: still the same series, not
        // reclaimed.
        let points = store.collect(true);
        assert_eq!(points.len(), 1);
        assert_eq!(sum_value(&points[0]), 2);
    }

    #[test]
    fn histogram_bucket_index_is_upper_inclusive() {
        let bounds = vec![0.0, 5.0, 10.0];
        assert_eq!(bucket_index(&bounds, -1.0), Some(0));
        assert_eq!(bucket_index(&bounds, 0.0), Some(0));
        assert_eq!(bucket_index(&bounds, 0.1), Some(1));
        assert_eq!(bucket_index(&bounds, 5.0), Some(1));
        assert_eq!(bucket_index(&bounds, 10.0), Some(2));
        assert_eq!(bucket_index(&bounds, 10.5), Some(3));
        assert_eq!(bucket_index(&bounds, f64::NAN), None);
        assert_eq!(bucket_index(&bounds, f64::INFINITY), None);
    }

    #[test]
    fn binary_and_linear_bucket_search_agree() {
        let bounds: Vec<f64> = (0..120).map(|i| i as f64).collect();
        for value in [-0.5, 0.0, 3.3, 59.0, 119.0, 119.5, 200.0] {
            let binary = bounds.partition_point(|bound| *bound < value);
            let linear = bounds
                .iter()
                .position(|bound| value <= *bound)
                .unwrap_or(bounds.len());
            assert_eq!(binary, linear, "value {value}");
            assert_eq!(bucket_index(&bounds, value), Some(binary));
        }
    }
}
