use std::fmt;

use rand::Rng;
use telemark::trace::{SpanId, TraceId};

/// Mints trace and span ids for new root spans.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// A new, non-zero trace id.
    fn new_trace_id(&self) -> TraceId;

    /// A new, non-zero span id.
    fn new_span_id(&self) -> SpanId;
}

/// Ids from the thread-local CSPRNG.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        let mut rng = rand::rng();
        loop {
            let id = rng.random::<u128>();
            if id != 0 {
                return TraceId::from_u128(id);
            }
        }
    }

    fn new_span_id(&self) -> SpanId {
        let mut rng = rand::rng();
        loop {
            let id = rng.random::<u64>();
            if id != 0 {
                return SpanId::from_u64(id);
            }
        }
    }
}
