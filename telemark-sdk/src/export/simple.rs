use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use telemark::tele_warn;

use crate::export::{Batch, Exporter};
use crate::{TelSdkError, TelSdkResult};

/// Exports each item synchronously as it finishes.
///
/// Every `on_end` call performs a full export on the calling thread, so
/// this processor is for tests and dev loops; production traffic belongs
/// on [`BatchExportProcessor`](crate::export::BatchExportProcessor).
pub struct SimpleExportProcessor<T> {
    exporter: Mutex<Box<dyn Exporter<T>>>,
    is_shutdown: AtomicBool,
}

impl<T: Send + 'static> SimpleExportProcessor<T> {
    /// Wrap an exporter.
    pub fn new<E>(exporter: E) -> Self
    where
        E: Exporter<T>,
    {
        SimpleExportProcessor {
            exporter: Mutex::new(Box::new(exporter)),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Export the item on the calling thread.
    pub fn on_end(&self, item: T) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }
        let result = self
            .exporter
            .lock()
            .map_err(|_| TelSdkError::InternalFailure("exporter lock poisoned".into()))
            .and_then(|mut exporter| {
                futures_executor::block_on(exporter.export(Batch::from(vec![item])))
            });
        if let Err(err) = result {
            tele_warn!(
                name: "SimpleExportProcessor.ExportFailed",
                error = format!("{err}")
            );
        }
    }

    /// Flush the wrapped exporter.
    pub fn force_flush(&self, _timeout: Duration) -> TelSdkResult {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TelSdkError::AlreadyShutdown);
        }
        match self.exporter.lock() {
            Ok(mut exporter) => exporter.force_flush(),
            Err(_) => Err(TelSdkError::InternalFailure(
                "exporter lock poisoned".into(),
            )),
        }
    }

    /// Shut the wrapped exporter down; later items are discarded.
    pub fn shutdown(&self, _timeout: Duration) -> TelSdkResult {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TelSdkError::AlreadyShutdown);
        }
        match self.exporter.lock() {
            Ok(mut exporter) => exporter.shutdown(),
            Err(_) => Err(TelSdkError::InternalFailure(
                "exporter lock poisoned".into(),
            )),
        }
    }
}

impl<T> std::fmt::Debug for SimpleExportProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleExportProcessor").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CountingExporter {
        exported: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Exporter<&'static str> for CountingExporter {
        fn export(&mut self, batch: Batch<&'static str>) -> BoxFuture<'static, TelSdkResult> {
            let exported = self.exported.clone();
            let items: Vec<_> = batch.into_iter().collect();
            Box::pin(async move {
                exported.lock().unwrap().extend(items);
                Ok(())
            })
        }
    }

    #[test]
    fn exports_inline_and_stops_after_shutdown() {
        let exporter = CountingExporter::default();
        let processor = SimpleExportProcessor::new(exporter.clone());

        processor.on_end("a");
        assert_eq!(*exporter.exported.lock().unwrap(), vec!["a"]);

        processor.shutdown(Duration::from_secs(1)).unwrap();
        processor.on_end("b");
        assert_eq!(*exporter.exported.lock().unwrap(), vec!["a"]);
    }
}
