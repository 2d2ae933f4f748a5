//! Timestamp helpers shared by all signals.

use std::time::SystemTime;

/// The current wall-clock time.
///
/// Indirection point so that every component stamps telemetry through one
/// function.
pub fn now() -> SystemTime {
    SystemTime::now()
}
