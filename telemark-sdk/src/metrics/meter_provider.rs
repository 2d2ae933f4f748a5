use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use telemark::{tele_debug, InstrumentationScope};

use crate::metrics::instrument::InstrumentDescriptor;
use crate::metrics::internal::ExemplarFilter;
use crate::metrics::meter::Meter;
use crate::metrics::pipeline::{MetricPipeline, PipelineDefaults};
use crate::metrics::reader::MetricReader;
use crate::metrics::view::View;
use crate::metrics::DEFAULT_CARDINALITY_LIMIT;
use crate::{TelSdkError, TelSdkResult};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The entry point of the metrics engine: owns one pipeline per reader and
/// hands out [`Meter`]s.
///
/// Cheap to clone. The last clone to drop shuts the readers down if nobody
/// did explicitly.
#[derive(Clone)]
pub struct SdkMeterProvider {
    inner: Arc<MeterProviderInner>,
}

struct MeterProviderInner {
    pipelines: Arc<[Arc<MetricPipeline>]>,
    readers: Vec<Box<dyn MetricReader>>,
    registry: Arc<Mutex<Vec<InstrumentDescriptor>>>,
    shutdown_flag: Arc<AtomicBool>,
    shutdown_invoked: AtomicBool,
}

impl SdkMeterProvider {
    /// Configuration entry point.
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder::default()
    }

    /// A meter scoped by library name only.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Meter {
        self.meter_with_scope(InstrumentationScope::builder(name).build())
    }

    /// A meter with a full instrumentation scope.
    pub fn meter_with_scope(&self, scope: InstrumentationScope) -> Meter {
        Meter {
            scope,
            pipelines: self.inner.pipelines.clone(),
            registry: self.inner.registry.clone(),
        }
    }

    /// Flush every reader, bounded by `timeout` per reader.
    pub fn force_flush(&self, timeout: Duration) -> TelSdkResult {
        let mut result = Ok(());
        for reader in &self.inner.readers {
            if let Err(err) = reader.force_flush(timeout) {
                result = Err(err);
            }
        }
        result
    }

    /// Perform a final collection, stop all readers, and turn subsequent
    /// measurements into silent no-ops.
    pub fn shutdown(&self, timeout: Duration) -> TelSdkResult {
        self.inner.shutdown(timeout)
    }
}

impl MeterProviderInner {
    fn shutdown(&self, timeout: Duration) -> TelSdkResult {
        if self.shutdown_invoked.swap(true, Ordering::SeqCst) {
            return Err(TelSdkError::AlreadyShutdown);
        }
        tele_debug!(name: "MeterProvider.ShutdownInvoked");

        let mut result = Ok(());
        // Readers flush first, while their pipelines still accept
        // `produce`; only then do measurements become no-ops.
        for reader in &self.readers {
            if let Err(err) = reader.shutdown(timeout) {
                result = Err(err);
            }
        }
        self.shutdown_flag.store(true, Ordering::SeqCst);
        result
    }
}

impl Drop for MeterProviderInner {
    fn drop(&mut self) {
        if !self.shutdown_invoked.load(Ordering::SeqCst) {
            let _ = self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
        }
    }
}

impl fmt::Debug for SdkMeterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkMeterProvider")
            .field("pipelines", &self.inner.pipelines.len())
            .finish()
    }
}

/// Builder for [`SdkMeterProvider`].
pub struct MeterProviderBuilder {
    readers: Vec<Box<dyn MetricReader>>,
    views: Vec<View>,
    cardinality_limit: usize,
    emit_overflow_attribute: bool,
    reclaim_unused_metric_points: bool,
    exemplar_filter: ExemplarFilter,
}

impl Default for MeterProviderBuilder {
    fn default() -> Self {
        MeterProviderBuilder {
            readers: Vec::new(),
            views: Vec::new(),
            cardinality_limit: DEFAULT_CARDINALITY_LIMIT,
            emit_overflow_attribute: true,
            reclaim_unused_metric_points: false,
            exemplar_filter: ExemplarFilter::AlwaysOff,
        }
    }
}

impl MeterProviderBuilder {
    /// Attach a reader; each reader gets its own pipeline and temporality.
    pub fn with_reader(mut self, reader: impl MetricReader) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    /// Add a view overriding the streams of matching instruments.
    pub fn with_view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    /// Default per-stream cardinality limit; 2000 unless a view overrides
    /// it. Values below 1 are raised to 1.
    pub fn with_cardinality_limit(mut self, limit: usize) -> Self {
        self.cardinality_limit = limit.max(1);
        self
    }

    /// Whether measurements beyond the cardinality limit aggregate into
    /// the `otel.metric.overflow` series (default) or are dropped.
    pub fn with_overflow_attribute(mut self, enabled: bool) -> Self {
        self.emit_overflow_attribute = enabled;
        self
    }

    /// Return idle delta-temporality series slots to the store for reuse.
    /// Off by default.
    pub fn with_metric_point_reclaim(mut self, enabled: bool) -> Self {
        self.reclaim_unused_metric_points = enabled;
        self
    }

    /// Which measurements are offered to exemplar reservoirs. Off by
    /// default.
    pub fn with_exemplar_filter(mut self, filter: ExemplarFilter) -> Self {
        self.exemplar_filter = filter;
        self
    }

    /// Wire the pipelines and finish the provider.
    pub fn build(self) -> SdkMeterProvider {
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let views: Arc<[View]> = self.views.into();
        let defaults = PipelineDefaults {
            cardinality_limit: self.cardinality_limit,
            emit_overflow_attribute: self.emit_overflow_attribute,
            reclaim_unused_metric_points: self.reclaim_unused_metric_points,
            exemplar_filter: self.exemplar_filter,
        };

        let pipelines: Vec<Arc<MetricPipeline>> = self
            .readers
            .iter()
            .map(|reader| {
                let pipeline = Arc::new(MetricPipeline::new(
                    reader.temporality(),
                    views.clone(),
                    defaults.clone(),
                    shutdown_flag.clone(),
                ));
                reader.register_pipeline(Arc::downgrade(&pipeline));
                pipeline
            })
            .collect();

        tele_debug!(
            name: "MeterProvider.Built",
            pipeline_count = pipelines.len()
        );

        SdkMeterProvider {
            inner: Arc::new(MeterProviderInner {
                pipelines: pipelines.into(),
                readers: self.readers,
                registry: Arc::new(Mutex::new(Vec::new())),
                shutdown_flag,
                shutdown_invoked: AtomicBool::new(false),
            }),
        }
    }
}

impl fmt::Debug for MeterProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProviderBuilder")
            .field("readers", &self.readers.len())
            .field("views", &self.views.len())
            .field("cardinality_limit", &self.cardinality_limit)
            .finish()
    }
}
