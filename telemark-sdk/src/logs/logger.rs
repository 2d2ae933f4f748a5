use std::fmt;

use telemark::trace::TraceContextExt;
use telemark::{Context, InstrumentationScope};

use crate::logs::logger_provider::SdkLoggerProvider;
use crate::logs::record::SdkLogRecord;

/// Emits log records scoped to one instrumentation library.
#[derive(Clone)]
pub struct SdkLogger {
    pub(crate) scope: InstrumentationScope,
    pub(crate) provider: SdkLoggerProvider,
}

impl SdkLogger {
    /// An empty record for the caller to fill.
    pub fn create_log_record(&self) -> SdkLogRecord {
        SdkLogRecord::new()
    }

    /// Hand a record to every processor.
    ///
    /// Fills the observed timestamp and, when the caller did not link a
    /// span explicitly, the trace context of the span active on this
    /// thread.
    pub fn emit(&self, mut record: SdkLogRecord) {
        if self.provider.is_shutdown() {
            return;
        }
        if record.observed_timestamp().is_none() {
            record.set_observed_timestamp(telemark::time::now());
        }
        if !record.trace_context_is_set() {
            Context::map_current(|cx| {
                if let Some(span_context) = cx.span_context().filter(|sc| sc.is_valid()) {
                    record.set_trace_context(span_context.into());
                }
            });
        }
        self.provider.on_emit(&mut record, &self.scope);
    }
}

impl fmt::Debug for SdkLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkLogger")
            .field("scope", &self.scope)
            .finish()
    }
}
