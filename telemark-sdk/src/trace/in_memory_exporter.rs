use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use crate::export::{Batch, Exporter};
use crate::trace::span::SpanData;
use crate::{TelSdkError, TelSdkResult};

/// An [`Exporter`] that keeps finished spans in memory, for tests.
///
/// Clones share the buffer.
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    shutdown_called: Arc<AtomicBool>,
}

impl InMemorySpanExporter {
    /// Every span exported so far.
    pub fn get_finished_spans(&self) -> Vec<SpanData> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .unwrap_or_default()
    }

    /// Drop everything recorded so far.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }

    /// Whether `shutdown` has been called.
    pub fn is_shutdown_called(&self) -> bool {
        self.shutdown_called.load(Ordering::Relaxed)
    }
}

impl Exporter<SpanData> for InMemorySpanExporter {
    fn export(&mut self, batch: Batch<SpanData>) -> BoxFuture<'static, TelSdkResult> {
        let spans = self.spans.clone();
        let items: Vec<SpanData> = batch.into_iter().collect();
        Box::pin(async move {
            spans
                .lock()
                .map(|mut spans| spans.extend(items))
                .map_err(|_| TelSdkError::InternalFailure("exporter buffer poisoned".into()))
        })
    }

    fn shutdown(&mut self) -> TelSdkResult {
        self.shutdown_called.store(true, Ordering::Relaxed);
        Ok(())
    }
}
