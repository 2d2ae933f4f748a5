use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use telemark::{tele_debug, InstrumentationScope};

use crate::logs::log_processor::LogProcessor;
use crate::logs::logger::SdkLogger;
use crate::logs::record::SdkLogRecord;
use crate::{TelSdkError, TelSdkResult};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the log processors; hands out [`SdkLogger`]s.
///
/// Cheap to clone. The last clone to drop shuts the processors down if
/// nobody did explicitly.
#[derive(Clone)]
pub struct SdkLoggerProvider {
    inner: Arc<LoggerProviderInner>,
}

struct LoggerProviderInner {
    processors: Vec<Box<dyn LogProcessor>>,
    shutdown_invoked: AtomicBool,
}

impl SdkLoggerProvider {
    /// Configuration entry point.
    pub fn builder() -> LoggerProviderBuilder {
        LoggerProviderBuilder::default()
    }

    /// A logger scoped by library name only.
    pub fn logger(&self, name: impl Into<Cow<'static, str>>) -> SdkLogger {
        self.logger_with_scope(InstrumentationScope::builder(name).build())
    }

    /// A logger with a full instrumentation scope.
    pub fn logger_with_scope(&self, scope: InstrumentationScope) -> SdkLogger {
        SdkLogger {
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

    /// Drain and stop every processor. Records emitted afterwards go
    /// nowhere.
    pub fn shutdown(&self, timeout: Duration) -> TelSdkResult {
        self.inner.shutdown(timeout)
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.shutdown_invoked.load(Ordering::Relaxed)
    }

    pub(crate) fn on_emit(&self, record: &mut SdkLogRecord, scope: &InstrumentationScope) {
        for processor in &self.inner.processors {
            processor.on_emit(record, scope);
        }
    }
}

impl LoggerProviderInner {
    fn shutdown(&self, timeout: Duration) -> TelSdkResult {
        if self.shutdown_invoked.swap(true, Ordering::SeqCst) {
            return Err(TelSdkError::AlreadyShutdown);
        }
        tele_debug!(name: "LoggerProvider.ShutdownInvoked");
        let mut result = Ok(());
        for processor in &self.processors {
            if let Err(err) = processor.shutdown(timeout) {
                result = Err(err);
            }
        }
        result
    }
}

impl Drop for LoggerProviderInner {
    fn drop(&mut self) {
        if !self.shutdown_invoked.load(Ordering::SeqCst) {
            let _ = self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
        }
    }
}

impl fmt::Debug for SdkLoggerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkLoggerProvider")
            .field("processors", &self.inner.processors.len())
            .finish()
    }
}

/// Builder for [`SdkLoggerProvider`].
#[derive(Default)]
pub struct LoggerProviderBuilder {
    processors: Vec<Box<dyn LogProcessor>>,
}

impl LoggerProviderBuilder {
    /// Register a processor; processors run in registration order.
    pub fn with_log_processor(mut self, processor: impl LogProcessor + 'static) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Finish the provider.
    pub fn build(self) -> SdkLoggerProvider {
        SdkLoggerProvider {
            inner: Arc::new(LoggerProviderInner {
                processors: self.processors,
                shutdown_invoked: AtomicBool::new(false),
            }),
        }
    }
}

impl fmt::Debug for LoggerProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerProviderBuilder")
            .field("processors", &self.processors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::in_memory_exporter::InMemoryLogExporter;
    use crate::logs::log_processor::SimpleLogProcessor;
    use telemark::logs::Severity;
    use telemark::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
    use telemark::Context;

    #[test]
    fn emitted_records_reach_the_exporter() {
        let exporter = InMemoryLogExporter::default();
        let provider = SdkLoggerProvider::builder()
            .with_log_processor(SimpleLogProcessor::new(exporter.clone()))
            .build();
        let logger = provider.logger("app");

        let mut record = logger.create_log_record();
        record.set_severity_number(Severity::Error);
        record.set_body("boom".into());
        logger.emit(record);

        let logs = exporter.get_emitted_logs();
        assert_eq!(logs.len(), 1);
        let (record, scope) = &logs[0];
        assert_eq!(scope.name(), "app");
        assert_eq!(record.severity_number(), Some(Severity::Error));
        assert!(record.observed_timestamp().is_some());
    }

    #[test]
    fn ambient_trace_context_is_captured() {
        let exporter = InMemoryLogExporter::default();
        let provider = SdkLoggerProvider::builder()
            .with_log_processor(SimpleLogProcessor::new(exporter.clone()))
            .build();
        let logger = provider.logger("app");

        let span_context = SpanContext::new(
            TraceId::from_u128(0x99),
            SpanId::from_u64(0x7),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        );
        let _guard = Context::new().with_span_context(span_context).attach();
        logger.emit(logger.create_log_record());

        let logs = exporter.get_emitted_logs();
        let trace_context = logs[0].0.trace_context().expect("trace context captured");
        assert_eq!(trace_context.trace_id, TraceId::from_u128(0x99));
        assert_eq!(trace_context.span_id, SpanId::from_u64(0x7));
    }

    #[test]
    fn records_after_shutdown_are_no_ops() {
        let exporter = InMemoryLogExporter::default();
        let provider = SdkLoggerProvider::builder()
            .with_log_processor(SimpleLogProcessor::new(exporter.clone()))
            .build();
        let logger = provider.logger("app");
        provider.shutdown(Duration::from_secs(5)).unwrap();
        logger.emit(logger.create_log_record());
        assert!(exporter.get_emitted_logs().is_empty());
    }
}
