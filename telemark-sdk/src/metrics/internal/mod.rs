//! Lock-light primitives shared by the aggregation kernels.

use std::fmt;
use std::hint;
use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

mod exemplar;
mod exponential;
mod point;
mod store;

pub use exemplar::{
    AlignedHistogramReservoir, ExemplarFilter, ExemplarMeasurement, ExemplarReservoir,
    SimpleFixedSizeReservoir,
};
pub(crate) use exponential::{ExpoHistogramState, EXPO_MAX_SCALE, EXPO_MIN_SCALE};
pub(crate) use point::{CollectedPoint, PointValue};
pub(crate) use store::{AggregateKind, AggregatorStore, StoreConfig};

/// A value that can back a lock-free running aggregate.
#[doc(hidden)]
pub trait AtomicCell<T>: Send + Sync + 'static {
    fn new(value: T) -> Self;
    fn add(&self, value: T);
    fn store(&self, value: T);
    fn load(&self) -> T;
    /// Atomically replace the value, returning the previous one.
    fn swap(&self, value: T) -> T;
}

impl AtomicCell<i64> for AtomicI64 {
    fn new(value: i64) -> Self {
        AtomicI64::new(value)
    }

    fn add(&self, value: i64) {
        self.fetch_add(value, Ordering::Relaxed);
    }

    fn store(&self, value: i64) {
        AtomicI64::store(self, value, Ordering::Relaxed);
    }

    fn load(&self) -> i64 {
        AtomicI64::load(self, Ordering::Relaxed)
    }

    fn swap(&self, value: i64) -> i64 {
        AtomicI64::swap(self, value, Ordering::Relaxed)
    }
}

/// `f64` cell layered over the bit pattern of an `AtomicU64`.
///
/// Floats have no native atomic add, so addition runs a compare-exchange
/// loop over the raw bits.
#[doc(hidden)]
pub struct AtomicF64(AtomicU64);

impl AtomicCell<f64> for AtomicF64 {
    fn new(value: f64) -> Self {
        AtomicF64(AtomicU64::new(value.to_bits()))
    }

    fn add(&self, value: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                // Lost the race; retry against the value that beat us.
                Err(actual) => current = actual,
            }
        }
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn swap(&self, value: f64) -> f64 {
        f64::from_bits(self.0.swap(value.to_bits(), Ordering::Relaxed))
    }
}

/// The measurement value types instruments accept.
pub trait Number:
    Add<Output = Self>
    + Sub<Output = Self>
    + PartialOrd
    + PartialEq
    + Copy
    + Default
    + fmt::Debug
    + Send
    + Sync
    + 'static
    + sealed::Sealed
{
    #[doc(hidden)]
    type Atomic: AtomicCell<Self>;

    /// The smallest representable value, used to seed running maxima.
    #[doc(hidden)]
    const MINIMUM: Self;
    /// The largest representable value, used to seed running minima.
    #[doc(hidden)]
    const MAXIMUM: Self;

    /// Lossy promotion to `f64` for histogram bucketing.
    #[doc(hidden)]
    fn into_f64(self) -> f64;

    /// Bit-exact equality; unlike `==` this is total for floats, so NaN
    /// running values do not re-arm collection forever.
    #[doc(hidden)]
    fn same_bits(self, other: Self) -> bool;

    #[doc(hidden)]
    fn wrap_data(data: crate::metrics::data::MetricData<Self>) -> crate::metrics::data::AggregatedData;
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for i64 {}
    impl Sealed for f64 {}
}

impl Number for i64 {
    type Atomic = AtomicI64;
    const MINIMUM: i64 = i64::MIN;
    const MAXIMUM: i64 = i64::MAX;

    fn into_f64(self) -> f64 {
        // Precision loss above 2^53 is accepted.
        self as f64
    }

    fn same_bits(self, other: Self) -> bool {
        self == other
    }

    fn wrap_data(
        data: crate::metrics::data::MetricData<Self>,
    ) -> crate::metrics::data::AggregatedData {
        crate::metrics::data::AggregatedData::I64(data)
    }
}

impl Number for f64 {
    type Atomic = AtomicF64;
    const MINIMUM: f64 = f64::MIN;
    const MAXIMUM: f64 = f64::MAX;

    fn into_f64(self) -> f64 {
        self
    }

    fn same_bits(self, other: Self) -> bool {
        self.to_bits() == other.to_bits()
    }

    fn wrap_data(
        data: crate::metrics::data::MetricData<Self>,
    ) -> crate::metrics::data::AggregatedData {
        crate::metrics::data::AggregatedData::F64(data)
    }
}

/// A single-byte spinlock guarding the multi-field histogram cells.
///
/// Histogram updates touch several fields that must land in one snapshot.
/// Contention is a single attribute set being hammered from many threads,
/// which is rare, so a compare-exchange spin beats a full mutex on the hot
/// path.
pub(crate) struct SpinLock(AtomicBool);

impl SpinLock {
    pub(crate) fn new() -> Self {
        SpinLock(AtomicBool::new(false))
    }

    pub(crate) fn lock(&self) -> SpinGuard<'_> {
        while self
            .0
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
        SpinGuard(self)
    }
}

pub(crate) struct SpinGuard<'a>(&'a SpinLock);

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        (self.0).0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn f64_cell_add_is_atomic() {
        let cell = Arc::new(AtomicF64::new(0.0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cell = cell.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        cell.add(0.5);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cell.load(), 2_000.0);
    }

    #[test]
    fn i64_cell_swap_returns_previous() {
        let cell = AtomicI64::new(0);
        AtomicCell::add(&cell, 41);
        assert_eq!(AtomicCell::swap(&cell, 7), 41);
        assert_eq!(AtomicCell::load(&cell), 7);
    }

    #[test]
    fn spin_lock_serializes_writers() {
        struct Shared {
            lock: SpinLock,
            counter: std::cell::UnsafeCell<u64>,
        }
        // Access to `counter` is confined to the critical section.
        unsafe impl Sync for Shared {}

        let shared = Arc::new(Shared {
            lock: SpinLock::new(),
            counter: std::cell::UnsafeCell::new(0),
        });
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        let _guard = shared.lock.lock();
                        unsafe { *shared.counter.get() += 1 };
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let _guard = shared.lock.lock();
        assert_eq!(unsafe { *shared.counter.get() }, 40_000);
    }
}
