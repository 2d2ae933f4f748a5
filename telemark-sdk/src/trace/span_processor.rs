use std::fmt;
use std::time::Duration;

use telemark::Context;

use crate::export::{
    BatchConfig, BatchExportProcessor, Exporter, ExportFilter, SimpleExportProcessor,
};
use crate::trace::span::{Span, SpanData};
use crate::TelSdkResult;

/// Hooks into the span lifecycle.
///
/// Processors registered on a provider see every recording span start and
/// end, in registration order. `on_end` receives spans whose sampled flag
/// is set; record-only spans stay in process.
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    /// Called when a recording span starts, synchronously on the starting
    /// thread. Must not block.
    fn on_start(&self, span: &mut Span, parent_context: &Context);

    /// Called when a recording span ends. Must not block.
    fn on_end(&self, span: SpanData);

    /// Export everything buffered, bounded by `timeout`.
    fn force_flush(&self, timeout: Duration) -> TelSdkResult;

    /// Final flush and teardown.
    fn shutdown(&self, timeout: Duration) -> TelSdkResult;
}

/// Exports each sampled span synchronously when it ends. For tests and dev
/// loops.
pub struct SimpleSpanProcessor {
    inner: SimpleExportProcessor<SpanData>,
}

impl SimpleSpanProcessor {
    /// Wrap an exporter.
    pub fn new<E>(exporter: E) -> Self
    where
        E: Exporter<SpanData>,
    {
        SimpleSpanProcessor {
            inner: SimpleExportProcessor::new(exporter),
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_start(&self, _span: &mut Span, _parent_context: &Context) {}

    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }
        self.inner.on_end(span);
    }

    fn force_flush(&self, timeout: Duration) -> TelSdkResult {
        self.inner.force_flush(timeout)
    }

    fn shutdown(&self, timeout: Duration) -> TelSdkResult {
        self.inner.shutdown(timeout)
    }
}

impl fmt::Debug for SimpleSpanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleSpanProcessor").finish()
    }
}

/// Buffers sampled spans on a bounded queue and exports them in batches
/// from a dedicated worker thread.
pub struct BatchSpanProcessor {
    inner: BatchExportProcessor<SpanData>,
}

impl BatchSpanProcessor {
    /// Configuration entry point.
    pub fn builder<E>(exporter: E) -> BatchSpanProcessorBuilder<E>
    where
        E: Exporter<SpanData>,
    {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
            filter: None,
        }
    }

    /// Spans dropped because the queue was full.
    pub fn dropped_count(&self) -> usize {
        self.inner.dropped_count()
    }

    /// Spans ignored by the export filter.
    pub fn filtered_count(&self) -> usize {
        self.inner.filtered_count()
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_start(&self, _span: &mut Span, _parent_context: &Context) {}

    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }
        self.inner.on_end(span);
    }

    fn force_flush(&self, timeout: Duration) -> TelSdkResult {
        self.inner.force_flush(timeout)
    }

    fn shutdown(&self, timeout: Duration) -> TelSdkResult {
        self.inner.shutdown(timeout)
    }
}

impl fmt::Debug for BatchSpanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSpanProcessor")
            .field("inner", &self.inner)
            .finish()
    }
}

/// Builder for [`BatchSpanProcessor`].
pub struct BatchSpanProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
    filter: Option<ExportFilter<SpanData>>,
}

impl<E> BatchSpanProcessorBuilder<E>
where
    E: Exporter<SpanData>,
{
    /// Replace the queue/batch/delay/timeout configuration.
    pub fn with_batch_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Decide per span whether it is exported at all. A panicking filter
    /// fails open.
    pub fn with_filter(mut self, filter: ExportFilter<SpanData>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Spawn the worker and finish the processor.
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor {
            inner: BatchExportProcessor::with_filter(
                "telemark-span-processor",
                self.exporter,
                self.config,
                self.filter,
            ),
        }
    }
}

impl<E> fmt::Debug for BatchSpanProcessorBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSpanProcessorBuilder").finish()
    }
}
