use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::metrics::data::MetricsData;
use crate::metrics::pipeline::MetricPipeline;
use crate::metrics::TemporalityPreference;
use crate::{TelSdkError, TelSdkResult};

/// Pulls aggregated metrics out of the pipeline a provider registered it
/// with.
///
/// Readers receive the pipeline weakly: dropping the provider tears the
/// pipeline down even while a reader (and its worker thread) is still
/// alive.
pub trait MetricReader: Send + Sync + 'static {
    /// Called once by the provider the reader is attached to.
    fn register_pipeline(&self, pipeline: Weak<MetricPipeline>);

    /// Snapshot every stream into `dest`.
    fn collect(&self, dest: &mut MetricsData) -> TelSdkResult;

    /// Push pending data to the exporter, if the reader has one.
    fn force_flush(&self, timeout: Duration) -> TelSdkResult;

    /// Final flush and teardown.
    fn shutdown(&self, timeout: Duration) -> TelSdkResult;

    /// The temporality this reader aggregates at.
    fn temporality(&self) -> TemporalityPreference;
}

/// A reader that only collects when asked, for tests and pull-style
/// bridges.
///
/// ```
/// use telemark_sdk::metrics::{ManualReader, SdkMeterProvider};
///
/// let reader = ManualReader::builder().build();
/// let provider = SdkMeterProvider::builder().with_reader(reader.clone()).build();
/// # drop(provider);
/// ```
#[derive(Clone)]
pub struct ManualReader {
    inner: Arc<ManualReaderInner>,
}

struct ManualReaderInner {
    pipeline: Mutex<Option<Weak<MetricPipeline>>>,
    temporality: TemporalityPreference,
    is_shutdown: AtomicBool,
}

impl ManualReader {
    /// Configuration entry point.
    pub fn builder() -> ManualReaderBuilder {
        ManualReaderBuilder::default()
    }

    fn pipeline(&self) -> Result<Arc<MetricPipeline>, TelSdkError> {
        self.inner
            .pipeline
            .lock()
            .map_err(|_| TelSdkError::InternalFailure("reader lock poisoned".into()))?
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                TelSdkError::InternalFailure(
                    "reader is not registered with a meter provider, or the provider is gone"
                        .into(),
                )
            })
    }
}

impl MetricReader for ManualReader {
    fn register_pipeline(&self, pipeline: Weak<MetricPipeline>) {
        if let Ok(mut slot) = self.inner.pipeline.lock() {
            *slot = Some(pipeline);
        }
    }

    fn collect(&self, dest: &mut MetricsData) -> TelSdkResult {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Err(TelSdkError::AlreadyShutdown);
        }
        self.pipeline()?.produce(dest)
    }

    fn force_flush(&self, _timeout: Duration) -> TelSdkResult {
        // Nothing is buffered; collection happens on demand.
        Ok(())
    }

    fn shutdown(&self, _timeout: Duration) -> TelSdkResult {
        if self.inner.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TelSdkError::AlreadyShutdown);
        }
        Ok(())
    }

    fn temporality(&self) -> TemporalityPreference {
        self.inner.temporality
    }
}

impl fmt::Debug for ManualReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualReader")
            .field("temporality", &self.inner.temporality)
            .finish()
    }
}

/// Builder for [`ManualReader`].
#[derive(Debug, Default)]
pub struct ManualReaderBuilder {
    temporality: TemporalityPreference,
}

impl ManualReaderBuilder {
    /// Set the temporality preference; cumulative by default.
    pub fn with_temporality(mut self, temporality: TemporalityPreference) -> Self {
        self.temporality = temporality;
        self
    }

    /// Finish the reader.
    pub fn build(self) -> ManualReader {
        ManualReader {
            inner: Arc::new(ManualReaderInner {
                pipeline: Mutex::new(None),
                temporality: self.temporality,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}
