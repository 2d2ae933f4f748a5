use std::borrow::Cow;
use std::time::SystemTime;

use telemark::logs::{AnyValue, Severity};
use telemark::trace::{SpanContext, SpanId, TraceFlags, TraceId};
use telemark::Key;

/// The trace linkage carried on a log record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogTraceContext {
    /// The trace active when the record was emitted.
    pub trace_id: TraceId,
    /// The span active when the record was emitted.
    pub span_id: SpanId,
    /// The active trace flags, when known.
    pub trace_flags: Option<TraceFlags>,
}

impl From<&SpanContext> for LogTraceContext {
    fn from(span_context: &SpanContext) -> Self {
        LogTraceContext {
            trace_id: span_context.trace_id(),
            span_id: span_context.span_id(),
            trace_flags: Some(span_context.trace_flags()),
        }
    }
}

/// One structured log record.
///
/// Create through [`SdkLogger::create_log_record`], fill with the setters,
/// and hand back via [`SdkLogger::emit`]. The emitter stamps the observed
/// timestamp and trace context if the producer did not.
///
/// [`SdkLogger::create_log_record`]: crate::logs::SdkLogger::create_log_record
/// [`SdkLogger::emit`]: crate::logs::SdkLogger::emit
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SdkLogRecord {
    timestamp: Option<SystemTime>,
    observed_timestamp: Option<SystemTime>,
    severity_number: Option<Severity>,
    severity_text: Option<Cow<'static, str>>,
    body: Option<AnyValue>,
    attributes: Vec<(Key, AnyValue)>,
    trace_context: Option<LogTraceContext>,
}

impl SdkLogRecord {
    pub(crate) fn new() -> Self {
        SdkLogRecord::default()
    }

    /// When the event the record describes occurred.
    pub fn set_timestamp(&mut self, timestamp: SystemTime) {
        self.timestamp = Some(timestamp);
    }

    /// When the record was seen by the telemetry pipeline.
    pub fn set_observed_timestamp(&mut self, timestamp: SystemTime) {
        self.observed_timestamp = Some(timestamp);
    }

    /// The numeric severity.
    pub fn set_severity_number(&mut self, severity: Severity) {
        self.severity_number = Some(severity);
    }

    /// The producer's severity wording.
    pub fn set_severity_text(&mut self, text: impl Into<Cow<'static, str>>) {
        self.severity_text = Some(text.into());
    }

    /// The record payload.
    pub fn set_body(&mut self, body: AnyValue) {
        self.body = Some(body);
    }

    /// Append one attribute.
    pub fn add_attribute(&mut self, key: impl Into<Key>, value: impl Into<AnyValue>) {
        self.attributes.push((key.into(), value.into()));
    }

    /// Explicitly link the record to a span, overriding the ambient
    /// context capture.
    pub fn set_trace_context(&mut self, trace_context: LogTraceContext) {
        self.trace_context = Some(trace_context);
    }

    /// When the described event occurred.
    pub fn timestamp(&self) -> Option<SystemTime> {
        self.timestamp
    }

    /// When the pipeline saw the record.
    pub fn observed_timestamp(&self) -> Option<SystemTime> {
        self.observed_timestamp
    }

    /// The numeric severity.
    pub fn severity_number(&self) -> Option<Severity> {
        self.severity_number
    }

    /// The producer's severity wording.
    pub fn severity_text(&self) -> Option<&str> {
        self.severity_text.as_deref()
    }

    /// The record payload.
    pub fn body(&self) -> Option<&AnyValue> {
        self.body.as_ref()
    }

    /// Attributes in insertion order.
    pub fn attributes(&self) -> impl Iterator<Item = &(Key, AnyValue)> {
        self.attributes.iter()
    }

    /// The linked trace context, if any.
    pub fn trace_context(&self) -> Option<&LogTraceContext> {
        self.trace_context.as_ref()
    }

    pub(crate) fn trace_context_is_set(&self) -> bool {
        self.trace_context.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_round_trip() {
        let mut record = SdkLogRecord::new();
        let now = telemark::time::now();
        record.set_timestamp(now);
        record.set_severity_number(Severity::Warn);
        record.set_severity_text("warning");
        record.set_body("disk low".into());
        record.add_attribute("disk", "/dev/sda1");

        assert_eq!(record.timestamp(), Some(now));
        assert_eq!(record.severity_number(), Some(Severity::Warn));
        assert_eq!(record.severity_text(), Some("warning"));
        assert_eq!(record.body(), Some(&AnyValue::String("disk low".into())));
        assert_eq!(record.attributes().count(), 1);
    }
}
