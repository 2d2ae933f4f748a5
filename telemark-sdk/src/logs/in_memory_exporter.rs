use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use telemark::InstrumentationScope;

use crate::export::{Batch, Exporter};
use crate::logs::log_processor::LogEnvelope;
use crate::logs::record::SdkLogRecord;
use crate::{TelSdkError, TelSdkResult};

/// An [`Exporter`] that keeps emitted log records in memory, for tests.
///
/// Clones share the buffer.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLogExporter {
    logs: Arc<Mutex<Vec<(SdkLogRecord, InstrumentationScope)>>>,
    shutdown_called: Arc<AtomicBool>,
}

impl InMemoryLogExporter {
    /// Every record exported so far, with its emitting scope.
    pub fn get_emitted_logs(&self) -> Vec<(SdkLogRecord, InstrumentationScope)> {
        self.logs.lock().map(|logs| logs.clone()).unwrap_or_default()
    }

    /// Drop everything recorded so far.
    pub fn reset(&self) {
        if let Ok(mut logs) = self.logs.lock() {
            logs.clear();
        }
    }

    /// Whether `shutdown` has been called.
    pub fn is_shutdown_called(&self) -> bool {
        self.shutdown_called.load(Ordering::Relaxed)
    }
}

impl Exporter<LogEnvelope> for InMemoryLogExporter {
    fn export(&mut self, batch: Batch<LogEnvelope>) -> BoxFuture<'static, TelSdkResult> {
        let logs = self.logs.clone();
        let items: Vec<(SdkLogRecord, InstrumentationScope)> =
            batch.into_iter().map(|envelope| *envelope).collect();
        Box::pin(async move {
            logs.lock()
                .map(|mut logs| logs.extend(items))
                .map_err(|_| TelSdkError::InternalFailure("exporter buffer poisoned".into()))
        })
    }

    fn shutdown(&mut self) -> TelSdkResult {
        self.shutdown_called.store(true, Ordering::Relaxed);
        Ok(())
    }
}
