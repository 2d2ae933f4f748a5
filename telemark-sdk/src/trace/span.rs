use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;

use telemark::trace::{SpanContext, SpanId, SpanKind, Status};
use telemark::{InstrumentationScope, KeyValue};

use crate::trace::provider::SdkTracerProvider;

/// An immutable, finished span as handed to processors and exporters.
#[derive(Clone, Debug)]
pub struct SpanData {
    /// The span's identity.
    pub span_context: SpanContext,
    /// Id of the parent span; invalid for roots.
    pub parent_span_id: SpanId,
    /// The relationship of this span to its surroundings.
    pub span_kind: SpanKind,
    /// Operation name.
    pub name: Cow<'static, str>,
    /// When the operation started.
    pub start_time: SystemTime,
    /// When the operation finished.
    pub end_time: SystemTime,
    /// Span attributes, in recording order.
    pub attributes: Vec<KeyValue>,
    /// Timestamped events recorded on the span.
    pub events: Vec<Event>,
    /// Links to other spans.
    pub links: Vec<Link>,
    /// The recorded outcome.
    pub status: Status,
    /// The scope of the tracer that created the span.
    pub instrumentation_scope: InstrumentationScope,
}

/// A timestamped annotation on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Event name.
    pub name: Cow<'static, str>,
    /// When the event happened.
    pub timestamp: SystemTime,
    /// Event attributes.
    pub attributes: Vec<KeyValue>,
}

impl Event {
    /// An event stamped with the current time.
    pub fn new(name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) -> Self {
        Event {
            name: name.into(),
            timestamp: telemark::time::now(),
            attributes,
        }
    }
}

/// A causal reference to a span elsewhere.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    /// The linked span.
    pub span_context: SpanContext,
    /// Link attributes.
    pub attributes: Vec<KeyValue>,
}

impl Link {
    /// Link to `span_context` with the given attributes.
    pub fn new(span_context: SpanContext, attributes: Vec<KeyValue>) -> Self {
        Link {
            span_context,
            attributes,
        }
    }
}

/// A live span handle.
///
/// Recording spans buffer their state until [`end`](Span::end), which
/// stamps the end time and hands the finished [`SpanData`] to every
/// processor exactly once. Dropping an unended recording span ends it
/// implicitly. Non-recording spans (sampler said
/// [`Drop`](crate::trace::SamplingDecision::Drop)) still carry a valid
/// [`SpanContext`] for propagation but ignore all mutation.
pub struct Span {
    span_context: SpanContext,
    data: Option<SpanData>,
    provider: SdkTracerProvider,
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        data: Option<SpanData>,
        provider: SdkTracerProvider,
    ) -> Self {
        Span {
            span_context,
            data,
            provider,
        }
    }

    /// The span's identity, valid whether or not it records.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Whether this span buffers state for export.
    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Set one attribute. Later writes with the same key are appended;
    /// exporters see recording order.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if let Some(data) = self.data.as_mut() {
            data.attributes.push(attribute);
        }
    }

    /// Set several attributes at once.
    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        if let Some(data) = self.data.as_mut() {
            data.attributes.extend(attributes);
        }
    }

    /// Record the span outcome. Later calls overwrite earlier ones.
    pub fn set_status(&mut self, status: Status) {
        if let Some(data) = self.data.as_mut() {
            data.status = status;
        }
    }

    /// Rename the operation.
    pub fn update_name(&mut self, name: impl Into<Cow<'static, str>>) {
        if let Some(data) = self.data.as_mut() {
            data.name = name.into();
        }
    }

    /// Add a timestamped event.
    pub fn add_event(&mut self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        if let Some(data) = self.data.as_mut() {
            data.events.push(Event::new(name, attributes));
        }
    }

    /// Add an event with an explicit timestamp.
    pub fn add_event_with_timestamp(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) {
        if let Some(data) = self.data.as_mut() {
            data.events.push(Event {
                name: name.into(),
                timestamp,
                attributes,
            });
        }
    }

    /// Finish the span now.
    pub fn end(&mut self) {
        self.end_with_timestamp(telemark::time::now());
    }

    /// Finish the span at an explicit time. Only the first call delivers
    /// the span to processors.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        if let Some(mut data) = self.data.take() {
            data.end_time = timestamp;
            self.provider.on_span_end(data);
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if self.data.is_some() {
            self.end();
        }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("span_context", &self.span_context)
            .field("is_recording", &self.is_recording())
            .finish()
    }
}
