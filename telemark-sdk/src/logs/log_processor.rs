use std::fmt;
use std::time::Duration;

use telemark::InstrumentationScope;

use crate::export::{
    BatchConfig, BatchExportProcessor, Exporter, ExportFilter, SimpleExportProcessor,
};
use crate::logs::record::SdkLogRecord;
use crate::TelSdkResult;

/// A finished log record boxed together with its emitting scope, as queued
/// for export.
pub type LogEnvelope = Box<(SdkLogRecord, InstrumentationScope)>;

/// Hooks into the log record lifecycle.
///
/// Processors see every emitted record synchronously and may still mutate
/// it; export happens on the processor's own terms afterwards.
pub trait LogProcessor: Send + Sync + fmt::Debug {
    /// Called on the emitting thread for every record. Must not block.
    fn on_emit(&self, record: &mut SdkLogRecord, scope: &InstrumentationScope);

    /// Export everything buffered, bounded by `timeout`.
    fn force_flush(&self, timeout: Duration) -> TelSdkResult;

    /// Final flush and teardown.
    fn shutdown(&self, timeout: Duration) -> TelSdkResult;
}

/// Exports each record synchronously as it is emitted. For tests and dev
/// loops.
pub struct SimpleLogProcessor {
    inner: SimpleExportProcessor<LogEnvelope>,
}

impl SimpleLogProcessor {
    /// Wrap an exporter.
    pub fn new<E>(exporter: E) -> Self
    where
        E: Exporter<LogEnvelope>,
    {
        SimpleLogProcessor {
            inner: SimpleExportProcessor::new(exporter),
        }
    }
}

impl LogProcessor for SimpleLogProcessor {
    fn on_emit(&self, record: &mut SdkLogRecord, scope: &InstrumentationScope) {
        self.inner.on_end(Box::new((record.clone(), scope.clone())));
    }

    fn force_flush(&self, timeout: Duration) -> TelSdkResult {
        self.inner.force_flush(timeout)
    }

    fn shutdown(&self, timeout: Duration) -> TelSdkResult {
        self.inner.shutdown(timeout)
    }
}

impl fmt::Debug for SimpleLogProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleLogProcessor").finish()
    }
}

/// Buffers records on a bounded queue and exports them in batches from a
/// dedicated worker thread.
pub struct BatchLogProcessor {
    inner: BatchExportProcessor<LogEnvelope>,
}

impl BatchLogProcessor {
    /// Configuration entry point.
    pub fn builder<E>(exporter: E) -> BatchLogProcessorBuilder<E>
    where
        E: Exporter<LogEnvelope>,
    {
        BatchLogProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
            filter: None,
        }
    }

    /// Records dropped because the queue was full.
    pub fn dropped_count(&self) -> usize {
        self.inner.dropped_count()
    }

    /// Records ignored by the export filter.
    pub fn filtered_count(&self) -> usize {
        self.inner.filtered_count()
    }
}

impl LogProcessor for BatchLogProcessor {
    fn on_emit(&self, record: &mut SdkLogRecord, scope: &InstrumentationScope) {
        self.inner.on_end(Box::new((record.clone(), scope.clone())));
    }

    fn force_flush(&self, timeout: Duration) -> TelSdkResult {
        self.inner.force_flush(timeout)
    }

    fn shutdown(&self, timeout: Duration) -> TelSdkResult {
        self.inner.shutdown(timeout)
    }
}

impl fmt::Debug for BatchLogProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLogProcessor")
            .field("inner", &self.inner)
            .finish()
    }
}

/// Builder for [`BatchLogProcessor`].
pub struct BatchLogProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
    filter: Option<ExportFilter<LogEnvelope>>,
}

impl<E> BatchLogProcessorBuilder<E>
where
    E: Exporter<LogEnvelope>,
{
    /// Replace the queue/batch/delay/timeout configuration.
    pub fn with_batch_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Decide per record whether it is exported at all. A panicking filter
    /// fails open.
    pub fn with_filter(mut self, filter: ExportFilter<LogEnvelope>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Spawn the worker and finish the processor.
    pub fn build(self) -> BatchLogProcessor {
        BatchLogProcessor {
            inner: BatchExportProcessor::with_filter(
                "telemark-log-processor",
                self.exporter,
                self.config,
                self.filter,
            ),
        }
    }
}

impl<E> fmt::Debug for BatchLogProcessorBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLogProcessorBuilder").finish()
    }
}
