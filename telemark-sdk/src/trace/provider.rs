use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use telemark::{tele_debug, Context, InstrumentationScope};

use crate::trace::id_generator::{IdGenerator, RandomIdGenerator};
use crate::trace::sampler::{Sampler, ShouldSample};
use crate::trace::span::{Span, SpanData};
use crate::trace::span_processor::SpanProcessor;
use crate::trace::tracer::SdkTracer;
use crate::{TelSdkError, TelSdkResult};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the span processors and the sampling/id policy; hands out
/// [`SdkTracer`]s.
///
/// Cheap to clone; spans keep their provider alive until they end. The
/// last clone to drop shuts the processors down if nobody did explicitly.
#[derive(Clone)]
pub struct SdkTracerProvider {
    inner: Arc<TracerProviderInner>,
}

pub(crate) struct TracerProviderConfig {
    pub(crate) sampler: Box<dyn ShouldSample>,
    pub(crate) id_generator: Box<dyn IdGenerator>,
}

struct TracerProviderInner {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: TracerProviderConfig,
    shutdown_invoked: AtomicBool,
}

impl SdkTracerProvider {
    /// Configuration entry point.
    pub fn builder() -> TracerProviderBuilder {
        TracerProviderBuilder::default()
    }

    /// A tracer scoped by library name only.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> SdkTracer {
        self.tracer_with_scope(InstrumentationScope::builder(name).build())
    }

    /// A tracer with a full instrumentation scope.
    pub fn tracer_with_scope(&self, scope: InstrumentationScope) -> SdkTracer {
        SdkTracer {
            scope,
            provider: self.clone(),
        }
    }

    /// Flush every processor, bounded by `timeout` per processor.
    pub fn force_flush(&self, timeout: Duration) -> TelSdkResult {
        let mut result = Ok(());
        for processor in &self.inner.processors {
            if let Err(err) = processor.force_flush(timeout) {
                result = Err(err);
            }
        }
        result
    }

    /// Drain and stop every processor. Spans ended afterwards go nowhere.
    pub fn shutdown(&self, timeout: Duration) -> TelSdkResult {
        self.inner.shutdown(timeout)
    }

    pub(crate) fn config(&self) -> &TracerProviderConfig {
        &self.inner.config
    }

    pub(crate) fn on_span_start(&self, span: &mut Span, parent_context: &Context) {
        for processor in &self.inner.processors {
            processor.on_start(span, parent_context);
        }
    }

    pub(crate) fn on_span_end(&self, span: SpanData) {
        if self.inner.shutdown_invoked.load(Ordering::Relaxed) {
            return;
        }
        match self.inner.processors.split_last() {
            Some((last, rest)) => {
                for processor in rest {
                    processor.on_end(span.clone());
                }
                last.on_end(span);
            }
            None => {}
        }
    }
}

impl TracerProviderInner {
    fn shutdown(&self, timeout: Duration) -> TelSdkResult {
        if self.shutdown_invoked.swap(true, Ordering::SeqCst) {
            return Err(TelSdkError::AlreadyShutdown);
        }
        tele_debug!(name: "TracerProvider.ShutdownInvoked");
        let mut result = Ok(());
        for processor in &self.processors {
            if let Err(err) = processor.shutdown(timeout) {
                result = Err(err);
            }
        }
        result
    }
}

impl Drop for TracerProviderInner {
    fn drop(&mut self) {
        if !self.shutdown_invoked.load(Ordering::SeqCst) {
            let _ = self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
        }
    }
}

impl fmt::Debug for SdkTracerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkTracerProvider")
            .field("processors", &self.inner.processors.len())
            .finish()
    }
}

/// Builder for [`SdkTracerProvider`].
pub struct TracerProviderBuilder {
    processors: Vec<Box<dyn SpanProcessor>>,
    sampler: Box<dyn ShouldSample>,
    id_generator: Box<dyn IdGenerator>,
}

impl Default for TracerProviderBuilder {
    fn default() -> Self {
        TracerProviderBuilder {
            processors: Vec::new(),
            sampler: Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn))),
            id_generator: Box::new(RandomIdGenerator),
        }
    }
}

impl TracerProviderBuilder {
    /// Register a processor; processors run in registration order.
    pub fn with_span_processor(mut self, processor: impl SpanProcessor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Replace the sampler; parent-based always-on by default.
    pub fn with_sampler(mut self, sampler: impl ShouldSample + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Replace the id generator; random by default.
    pub fn with_id_generator(mut self, id_generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// Finish the provider.
    pub fn build(self) -> SdkTracerProvider {
        SdkTracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors: self.processors,
                config: TracerProviderConfig {
                    sampler: self.sampler,
                    id_generator: self.id_generator,
                },
                shutdown_invoked: AtomicBool::new(false),
            }),
        }
    }
}

impl fmt::Debug for TracerProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerProviderBuilder")
            .field("processors", &self.processors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::in_memory_exporter::InMemorySpanExporter;
    use crate::trace::span_processor::SimpleSpanProcessor;
    use telemark::trace::{Status, TraceContextExt};
    use telemark::KeyValue;

    fn provider_with(exporter: &InMemorySpanExporter) -> SdkTracerProvider {
        SdkTracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
            .build()
    }

    #[test]
    fn ended_spans_reach_the_exporter_once() {
        let exporter = InMemorySpanExporter::default();
        let provider = provider_with(&exporter);
        let tracer = provider.tracer("test");

        let mut span = tracer.start("op");
        span.set_attribute(KeyValue::new("k", "v"));
        span.set_status(Status::Ok);
        span.end();
        // A second end is a no-op.
        span.end();

        let spans = exporter.get_finished_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "op");
        assert_eq!(spans[0].status, Status::Ok);
        assert_eq!(spans[0].attributes, vec![KeyValue::new("k", "v")]);
    }

    #[test]
    fn dropping_a_span_ends_it() {
        let exporter = InMemorySpanExporter::default();
        let provider = provider_with(&exporter);
        {
            let _span = provider.tracer("test").start("implicit");
        }
        assert_eq!(exporter.get_finished_spans().len(), 1);
    }

    #[test]
    fn child_spans_inherit_the_parent_trace() {
        let exporter = InMemorySpanExporter::default();
        let provider = provider_with(&exporter);
        let tracer = provider.tracer("test");

        let mut parent = tracer.start("parent");
        let parent_context = parent.span_context().clone();
        let cx = Context::new().with_span_context(parent_context.clone());

        let mut child = tracer.start_with_context("child", &cx);
        child.end();
        parent.end();

        let spans = exporter.get_finished_spans();
        assert_eq!(spans.len(), 2);
        let child_data = spans.iter().find(|s| s.name == "child").unwrap();
        assert_eq!(
            child_data.span_context.trace_id(),
            parent_context.trace_id()
        );
        assert_eq!(child_data.parent_span_id, parent_context.span_id());
    }

    #[test]
    fn dropped_spans_keep_a_valid_context_but_do_not_export() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
            .with_sampler(Sampler::AlwaysOff)
            .build();
        let tracer = provider.tracer("test");

        let mut span = tracer.start("invisible");
        assert!(!span.is_recording());
        assert!(span.span_context().is_valid());
        assert!(!span.span_context().is_sampled());
        span.end();
        assert!(exporter.get_finished_spans().is_empty());
    }

    #[test]
    fn spans_ended_after_shutdown_go_nowhere() {
        let exporter = InMemorySpanExporter::default();
        let provider = provider_with(&exporter);
        let tracer = provider.tracer("test");

        let mut open = tracer.start("late");
        provider.shutdown(Duration::from_secs(5)).unwrap();
        open.end();
        assert!(exporter.get_finished_spans().is_empty());
        assert!(matches!(
            provider.shutdown(Duration::from_secs(5)),
            Err(TelSdkError::AlreadyShutdown)
        ));
    }
}
