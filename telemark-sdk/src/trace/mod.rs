//! The span pipeline: recording spans, sampling, and export.
//!
//! [`SdkTracerProvider`] owns the processors; [`SdkTracer`]s mint spans
//! (sampling first, then id generation), and finished spans fan out to
//! every registered [`SpanProcessor`]. The batching processor hands them
//! to an [`Exporter`](crate::export::Exporter) on a worker thread.
//!
//! ```
//! use telemark_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SimpleSpanProcessor};
//!
//! let exporter = InMemorySpanExporter::default();
//! let provider = SdkTracerProvider::builder()
//!     .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
//!     .build();
//!
//! let tracer = provider.tracer("worker");
//! tracer.start("job").end();
//! assert_eq!(exporter.get_finished_spans().len(), 1);
//! ```

mod id_generator;
mod in_memory_exporter;
mod provider;
mod sampler;
mod span;
mod span_processor;
mod tracer;

pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use in_memory_exporter::InMemorySpanExporter;
pub use provider::{SdkTracerProvider, TracerProviderBuilder};
pub use sampler::{Sampler, SamplingDecision, SamplingResult, ShouldSample};
pub use span::{Event, Link, Span, SpanData};
pub use span_processor::{BatchSpanProcessor, BatchSpanProcessorBuilder, SimpleSpanProcessor, SpanProcessor};
pub use tracer::{SdkTracer, SpanBuilder};
