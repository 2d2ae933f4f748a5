use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;

use telemark::trace::{SpanContext, SpanId, SpanKind, Status, TraceContextExt};
use telemark::{Context, InstrumentationScope, KeyValue};

use crate::trace::provider::SdkTracerProvider;
use crate::trace::sampler::SamplingDecision;
use crate::trace::span::{Link, Span, SpanData};

/// Creates spans scoped to one instrumentation library.
#[derive(Clone)]
pub struct SdkTracer {
    pub(crate) scope: InstrumentationScope,
    pub(crate) provider: SdkTracerProvider,
}

impl SdkTracer {
    /// Start configuring a span.
    pub fn span_builder(&self, name: impl Into<Cow<'static, str>>) -> SpanBuilder {
        SpanBuilder::new(name.into())
    }

    /// Start a span with defaults, parented to the current context.
    pub fn start(&self, name: impl Into<Cow<'static, str>>) -> Span {
        self.span_builder(name).start(self)
    }

    /// Start a span with defaults, parented to `parent_context`.
    pub fn start_with_context(
        &self,
        name: impl Into<Cow<'static, str>>,
        parent_context: &Context,
    ) -> Span {
        self.span_builder(name).start_with_context(self, parent_context)
    }

    fn build_span(&self, builder: SpanBuilder, parent_context: &Context) -> Span {
        let parent = parent_context
            .span_context()
            .filter(|parent| parent.is_valid())
            .cloned();

        let config = self.provider.config();
        let trace_id = parent
            .as_ref()
            .map(|parent| parent.trace_id())
            .unwrap_or_else(|| config.id_generator.new_trace_id());
        let span_id = config.id_generator.new_span_id();

        let sampling = config.sampler.should_sample(
            Some(parent_context),
            trace_id,
            &builder.name,
            &builder.span_kind,
            &builder.attributes,
            &builder.links,
        );

        let trace_state = sampling
            .trace_state
            .or_else(|| parent.as_ref().map(|parent| parent.trace_state().clone()))
            .unwrap_or_default();
        let trace_flags = parent
            .as_ref()
            .map(|parent| parent.trace_flags())
            .unwrap_or_default()
            .with_sampled(sampling.decision == SamplingDecision::RecordAndSample);
        let span_context = SpanContext::new(trace_id, span_id, trace_flags, false, trace_state);

        if sampling.decision == SamplingDecision::Drop {
            return Span::new(span_context, None, self.provider.clone());
        }

        let mut attributes = builder.attributes;
        attributes.extend(sampling.attributes);

        let data = SpanData {
            span_context: span_context.clone(),
            parent_span_id: parent
                .as_ref()
                .map(|parent| parent.span_id())
                .unwrap_or(SpanId::INVALID),
            span_kind: builder.span_kind,
            name: builder.name,
            start_time: builder.start_time.unwrap_or_else(telemark::time::now),
            end_time: SystemTime::UNIX_EPOCH,
            attributes,
            events: Vec::new(),
            links: builder.links,
            status: Status::Unset,
            instrumentation_scope: self.scope.clone(),
        };

        let mut span = Span::new(span_context, Some(data), self.provider.clone());
        self.provider.on_span_start(&mut span, parent_context);
        span
    }
}

impl fmt::Debug for SdkTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkTracer")
            .field("scope", &self.scope)
            .finish()
    }
}

/// Everything configurable about a span before it starts.
#[derive(Clone, Debug)]
pub struct SpanBuilder {
    name: Cow<'static, str>,
    span_kind: SpanKind,
    attributes: Vec<KeyValue>,
    links: Vec<Link>,
    start_time: Option<SystemTime>,
}

impl SpanBuilder {
    fn new(name: Cow<'static, str>) -> Self {
        SpanBuilder {
            name,
            span_kind: SpanKind::Internal,
            attributes: Vec::new(),
            links: Vec::new(),
            start_time: None,
        }
    }

    /// Set the span kind; `Internal` by default.
    pub fn with_kind(mut self, span_kind: SpanKind) -> Self {
        self.span_kind = span_kind;
        self
    }

    /// Attributes present from the start, visible to the sampler.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes = attributes.into_iter().collect();
        self
    }

    /// Links present from the start, visible to the sampler.
    pub fn with_links(mut self, links: Vec<Link>) -> Self {
        self.links = links;
        self
    }

    /// Backdate the span start.
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Start the span, parented to the current context.
    pub fn start(self, tracer: &SdkTracer) -> Span {
        Context::map_current(|cx| tracer.build_span(self, cx))
    }

    /// Start the span, parented to `parent_context`.
    pub fn start_with_context(self, tracer: &SdkTracer, parent_context: &Context) -> Span {
        tracer.build_span(self, parent_context)
    }
}
