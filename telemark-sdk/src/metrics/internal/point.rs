use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, RwLock};

use telemark::KeyValue;

use super::exemplar::ExemplarReservoir;
use super::{AtomicCell, ExpoHistogramState, Number, SpinLock};
use crate::metrics::attribute_set::AttributeSet;
use crate::metrics::data::Exemplar;

/// The point has been snapshotted since its last update.
pub(crate) const NO_COLLECT_PENDING: u8 = 0;
/// The point carries updates the next collection must include.
pub(crate) const COLLECT_PENDING: u8 = 1;

/// Reference count sentinel marking a reclaimed point. Recorders observing
/// a negative count abandon the slot and re-probe the lookup map.
pub(crate) const RECLAIMED: i32 = i32::MIN;

fn new_cell<T: Number>(value: T) -> T::Atomic {
    <T::Atomic as AtomicCell<T>>::new(value)
}

/// One live aggregation cell: running state plus the bookkeeping that lets
/// recorders, the collector, and the reclaimer coexist without a lock on
/// the update path.
pub(crate) struct MetricPoint<T: Number> {
    /// The owning attribute set; `None` while the slot sits on the free
    /// list.
    pub(crate) attrs: RwLock<Option<AttributeSet>>,
    pub(crate) state: PointState<T>,
    pub(crate) status: AtomicU8,
    pub(crate) ref_count: AtomicI32,
    /// Whether the point has ever recorded, for the two pre-allocated
    /// slots that never appear in the lookup map.
    pub(crate) used: AtomicBool,
    pub(crate) reservoir: Option<Box<dyn ExemplarReservoir<T>>>,
}

impl<T: Number> MetricPoint<T> {
    pub(crate) fn new(state: PointState<T>, reservoir: Option<Box<dyn ExemplarReservoir<T>>>) -> Self {
        MetricPoint {
            attrs: RwLock::new(None),
            state,
            status: AtomicU8::new(NO_COLLECT_PENDING),
            ref_count: AtomicI32::new(RECLAIMED),
            used: AtomicBool::new(false),
            reservoir,
        }
    }

    /// Claim a free slot for `attrs`, zeroing all aggregation state.
    /// Caller holds the store's write lock, so nothing races this.
    pub(crate) fn activate(&self, attrs: Option<AttributeSet>) {
        self.state.reset();
        self.status.store(NO_COLLECT_PENDING, Ordering::Relaxed);
        self.used.store(false, Ordering::Relaxed);
        if let Ok(mut slot) = self.attrs.write() {
            *slot = attrs;
        }
        self.ref_count.store(0, Ordering::Release);
    }

    /// Mark the point dirty after a kernel update.
    pub(crate) fn mark_updated(&self) {
        self.used.store(true, Ordering::Release);
        self.status.store(COLLECT_PENDING, Ordering::Release);
    }

    pub(crate) fn collect_exemplars(&self, reset: bool) -> Vec<Exemplar<T>> {
        self.reservoir
            .as_ref()
            .map(|reservoir| reservoir.collect(reset))
            .unwrap_or_default()
    }
}

/// Kernel-specific running state. The variant is fixed per store; every
/// point in a store carries the same one.
pub(crate) enum PointState<T: Number> {
    /// Delta-input arithmetic sum, also used for up-down counters.
    Sum(SumCell<T>),
    /// Last-write-wins value, also backing precomputed (observable) sums.
    LastValue(LastValueCell<T>),
    /// Explicit-bucket histogram under a per-point spinlock.
    Histogram(HistogramCell<T>),
    /// Base-2 exponential histogram; growable, so mutex-guarded.
    ExpoHistogram(Mutex<ExpoHistogramState<T>>),
}

impl<T: Number> PointState<T> {
    fn reset(&self) {
        match self {
            PointState::Sum(cell) => {
                cell.running.store(T::default());
                cell.delta_last.store(T::default());
            }
            PointState::LastValue(cell) => {
                cell.value.store(T::default());
                cell.delta_last.store(T::default());
            }
            PointState::Histogram(cell) => {
                cell.snapshot(true);
            }
            PointState::ExpoHistogram(state) => {
                if let Ok(mut state) = state.lock() {
                    state.reset();
                }
            }
        }
    }
}

/// Running state for sums: a cumulative total plus the value reported at
/// the previous delta snapshot.
pub(crate) struct SumCell<T: Number> {
    pub(crate) running: T::Atomic,
    pub(crate) delta_last: T::Atomic,
}

impl<T: Number> SumCell<T> {
    pub(crate) fn new() -> Self {
        SumCell {
            running: new_cell(T::default()),
            delta_last: new_cell(T::default()),
        }
    }
}

/// Running state for gauges and precomputed sums.
pub(crate) struct LastValueCell<T: Number> {
    pub(crate) value: T::Atomic,
    pub(crate) delta_last: T::Atomic,
}

impl<T: Number> LastValueCell<T> {
    pub(crate) fn new() -> Self {
        LastValueCell {
            value: new_cell(T::default()),
            delta_last: new_cell(T::default()),
        }
    }
}

/// Explicit-bucket histogram cell.
///
/// All fields are atomics, but a snapshot must see them move together, so
/// both updates and snapshots run under the single-byte spinlock. The
/// atomics exist to make the shared mutation safe, not to be raced.
pub(crate) struct HistogramCell<T: Number> {
    lock: SpinLock,
    pub(crate) count: AtomicU64,
    pub(crate) sum: T::Atomic,
    pub(crate) min: T::Atomic,
    pub(crate) max: T::Atomic,
    pub(crate) bucket_counts: Box<[AtomicU64]>,
}

impl<T: Number> HistogramCell<T> {
    pub(crate) fn new(bucket_count: usize) -> Self {
        HistogramCell {
            lock: SpinLock::new(),
            count: AtomicU64::new(0),
            sum: new_cell(T::default()),
            min: new_cell(T::MAXIMUM),
            max: new_cell(T::MINIMUM),
            bucket_counts: (0..bucket_count).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Record one measurement. `bucket` is `None` for non-finite values,
    /// which count into `count` and `sum` but land in no bucket.
    pub(crate) fn record(&self, value: T, bucket: Option<usize>, record_min_max: bool) {
        let _guard = self.lock.lock();
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.add(value);
        if let Some(index) = bucket {
            self.bucket_counts[index].fetch_add(1, Ordering::Relaxed);
        }
        if record_min_max && value.into_f64().is_finite() {
            if value < self.min.load() {
                self.min.store(value);
            }
            if value > self.max.load() {
                self.max.store(value);
            }
        }
    }

    /// Copy the cell out consistently; `reset` additionally clears it for
    /// the next delta interval.
    pub(crate) fn snapshot(&self, reset: bool) -> HistogramSnapshot<T> {
        let _guard = self.lock.lock();
        let snapshot = HistogramSnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum: self.sum.load(),
            min: self.min.load(),
            max: self.max.load(),
            bucket_counts: self
                .bucket_counts
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
        };
        if reset {
            self.count.store(0, Ordering::Relaxed);
            self.sum.store(T::default());
            self.min.store(T::MAXIMUM);
            self.max.store(T::MINIMUM);
            for bucket in self.bucket_counts.iter() {
                bucket.store(0, Ordering::Relaxed);
            }
        }
        snapshot
    }

    /// Whether updates landed since the last reset; the straggler check
    /// after a delta snapshot.
    pub(crate) fn has_data(&self) -> bool {
        self.count.load(Ordering::Relaxed) != 0
    }
}

/// A consistent copy of one explicit-bucket histogram cell.
#[derive(Clone, Debug)]
pub(crate) struct HistogramSnapshot<T> {
    pub(crate) count: u64,
    pub(crate) sum: T,
    pub(crate) min: T,
    pub(crate) max: T,
    pub(crate) bucket_counts: Vec<u64>,
}

/// The value part of one collected point, handed from the store to the
/// owning stream for assembly into exporter-facing data.
pub(crate) struct CollectedPoint<T: Number> {
    pub(crate) attributes: Vec<KeyValue>,
    pub(crate) value: PointValue<T>,
    pub(crate) exemplars: Vec<Exemplar<T>>,
}

pub(crate) enum PointValue<T: Number> {
    Sum(T),
    LastValue(T),
    Histogram(HistogramSnapshot<T>),
    ExpoHistogram(ExpoSnapshot<T>),
}

/// A consistent copy of one exponential histogram cell.
#[derive(Clone, Debug)]
pub(crate) struct ExpoSnapshot<T> {
    pub(crate) count: u64,
    pub(crate) sum: T,
    pub(crate) min: T,
    pub(crate) max: T,
    pub(crate) scale: i8,
    pub(crate) zero_count: u64,
    pub(crate) positive_offset: i32,
    pub(crate) positive_counts: Vec<u64>,
    pub(crate) negative_offset: i32,
    pub(crate) negative_counts: Vec<u64>,
}
