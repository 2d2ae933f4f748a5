use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use crate::metrics::data::MetricsData;
use crate::metrics::{PushMetricExporter, TemporalityPreference};
use crate::{TelSdkError, TelSdkResult};

/// A [`PushMetricExporter`] that buffers collections in memory, for tests.
///
/// Clones share the buffer, so a clone handed to a reader can be inspected
/// from the test body.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetricExporter {
    exported: Arc<Mutex<Vec<MetricsData>>>,
    temporality: TemporalityPreference,
    shutdown_called: Arc<AtomicBool>,
}

impl InMemoryMetricExporter {
    /// An exporter preferring the given temporality.
    pub fn with_temporality(temporality: TemporalityPreference) -> Self {
        InMemoryMetricExporter {
            temporality,
            ..Default::default()
        }
    }

    /// Every collection exported so far.
    pub fn get_finished_metrics(&self) -> Vec<MetricsData> {
        self.exported
            .lock()
            .map(|exported| exported.clone())
            .unwrap_or_default()
    }

    /// Drop everything recorded so far.
    pub fn reset(&self) {
        if let Ok(mut exported) = self.exported.lock() {
            exported.clear();
        }
    }

    /// Whether `shutdown` has been called.
    pub fn is_shutdown_called(&self) -> bool {
        self.shutdown_called.load(Ordering::Relaxed)
    }
}

impl PushMetricExporter for InMemoryMetricExporter {
    fn export<'a>(&'a self, metrics: &'a MetricsData) -> BoxFuture<'a, TelSdkResult> {
        Box::pin(async move {
            self.exported
                .lock()
                .map(|mut exported| exported.push(metrics.clone()))
                .map_err(|_| TelSdkError::InternalFailure("exporter buffer poisoned".into()))
        })
    }

    fn shutdown(&self) -> TelSdkResult {
        self.shutdown_called.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn temporality(&self) -> TemporalityPreference {
        self.temporality
    }
}
