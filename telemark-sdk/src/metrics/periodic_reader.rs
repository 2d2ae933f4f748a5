use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use futures_timer::Delay;
use futures_util::future::{self, Either};
use telemark::{tele_debug, tele_warn};

use crate::metrics::data::MetricsData;
use crate::metrics::exporter::PushMetricExporter;
use crate::metrics::pipeline::MetricPipeline;
use crate::metrics::reader::MetricReader;
use crate::metrics::TemporalityPreference;
use crate::{TelSdkError, TelSdkResult};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

enum Message {
    Flush(SyncSender<TelSdkResult>),
    Shutdown(SyncSender<TelSdkResult>),
}

/// Collects and pushes metrics to an exporter on a fixed interval, from a
/// dedicated worker thread.
///
/// `force_flush` short-circuits the next tick; `shutdown` performs a final
/// collection, shuts the exporter down, and stops the worker. Collection
/// is driven entirely by this reader; the exporter only ever sees
/// already-aggregated data.
#[derive(Clone)]
pub struct PeriodicReader {
    inner: Arc<PeriodicReaderInner>,
}

struct PeriodicReaderInner {
    exporter: Arc<dyn PushMetricExporter>,
    message_sender: Sender<Message>,
    pipeline: Mutex<Option<Weak<MetricPipeline>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    is_shutdown: AtomicBool,
    export_timeout: Duration,
}

impl PeriodicReader {
    /// Configuration entry point.
    pub fn builder<E>(exporter: E) -> PeriodicReaderBuilder<E>
    where
        E: PushMetricExporter,
    {
        PeriodicReaderBuilder {
            exporter,
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_EXPORT_TIMEOUT,
        }
    }

    fn new<E>(exporter: E, interval: Duration, timeout: Duration) -> Self
    where
        E: PushMetricExporter,
    {
        let (message_sender, message_receiver): (Sender<Message>, Receiver<Message>) =
            mpsc::channel();
        let reader = PeriodicReader {
            inner: Arc::new(PeriodicReaderInner {
                exporter: Arc::new(exporter),
                message_sender,
                pipeline: Mutex::new(None),
                handle: Mutex::new(None),
                is_shutdown: AtomicBool::new(false),
                export_timeout: timeout,
            }),
        };

        let worker = reader.clone();
        let handle = thread::Builder::new()
            .name("telemark-periodic-reader".to_string())
            .spawn(move || {
                tele_debug!(
                    name: "PeriodicReader.WorkerStarted",
                    interval_ms = interval.as_millis()
                );
                loop {
                    match message_receiver.recv_timeout(interval) {
                        Ok(Message::Flush(ack)) => {
                            let _ = ack.send(worker.collect_and_export());
                        }
                        Ok(Message::Shutdown(ack)) => {
                            let result = worker.collect_and_export();
                            let shutdown_result = worker.inner.exporter.shutdown();
                            let _ = ack.send(result.and(shutdown_result));
                            tele_debug!(name: "PeriodicReader.WorkerExiting", reason = "shutdown");
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(err) = worker.collect_and_export() {
                                tele_warn!(
                                    name: "PeriodicReader.ExportFailed",
                                    error = format!("{err}")
                                );
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            tele_debug!(
                                name: "PeriodicReader.WorkerExiting",
                                reason = "reader dropped"
                            );
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn periodic reader worker");
        if let Ok(mut slot) = reader.inner.handle.lock() {
            *slot = Some(handle);
        }

        reader
    }

    fn collect_and_export(&self) -> TelSdkResult {
        let mut data = MetricsData::default();
        self.collect_inner(&mut data)?;
        if data.scope_metrics.is_empty() {
            return Ok(());
        }

        let export = self.inner.exporter.export(&data);
        let deadline = Box::pin(Delay::new(self.inner.export_timeout));
        let result = match futures_executor::block_on(future::select(export, deadline)) {
            Either::Left((result, _)) => result,
            Either::Right(_) => Err(TelSdkError::Timeout(self.inner.export_timeout)),
        };
        result
    }

    fn collect_inner(&self, dest: &mut MetricsData) -> TelSdkResult {
        let pipeline = self
            .inner
            .pipeline
            .lock()
            .map_err(|_| TelSdkError::InternalFailure("reader lock poisoned".into()))?
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                TelSdkError::InternalFailure(
                    "reader is not registered with a meter provider, or the provider is gone"
                        .into(),
                )
            })?;
        pipeline.produce(dest)
    }
}

impl MetricReader for PeriodicReader {
    fn register_pipeline(&self, pipeline: Weak<MetricPipeline>) {
        if let Ok(mut slot) = self.inner.pipeline.lock() {
            *slot = Some(pipeline);
        }
    }

    fn collect(&self, dest: &mut MetricsData) -> TelSdkResult {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Err(TelSdkError::AlreadyShutdown);
        }
        self.collect_inner(dest)
    }

    fn force_flush(&self, timeout: Duration) -> TelSdkResult {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Err(TelSdkError::AlreadyShutdown);
        }
        let (ack_sender, ack_receiver) = mpsc::sync_channel(1);
        self.inner
            .message_sender
            .send(Message::Flush(ack_sender))
            .map_err(|_| TelSdkError::InternalFailure("reader worker has exited".into()))?;
        match ack_receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TelSdkError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(TelSdkError::InternalFailure(
                "reader worker exited before acknowledging".into(),
            )),
        }
    }

    fn shutdown(&self, timeout: Duration) -> TelSdkResult {
        if self.inner.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TelSdkError::AlreadyShutdown);
        }
        let (ack_sender, ack_receiver) = mpsc::sync_channel(1);
        self.inner
            .message_sender
            .send(Message::Shutdown(ack_sender))
            .map_err(|_| TelSdkError::InternalFailure("reader worker has exited".into()))?;
        let result = match ack_receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TelSdkError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(TelSdkError::InternalFailure(
                "reader worker exited before acknowledging".into(),
            )),
        };
        if result.is_ok() {
            if let Some(handle) = self.inner.handle.lock().ok().and_then(|mut h| h.take()) {
                let _ = handle.join();
            }
        }
        result
    }

    fn temporality(&self) -> TemporalityPreference {
        self.inner.exporter.temporality()
    }
}

impl fmt::Debug for PeriodicReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicReader").finish()
    }
}

/// Builder for [`PeriodicReader`].
#[derive(Debug)]
pub struct PeriodicReaderBuilder<E> {
    exporter: E,
    interval: Duration,
    timeout: Duration,
}

impl<E> PeriodicReaderBuilder<E>
where
    E: PushMetricExporter,
{
    /// Time between collections; 60 s by default. Zero is ignored.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Deadline for each export call; 30 s by default. Zero is ignored.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Spawn the worker and finish the reader.
    pub fn build(self) -> PeriodicReader {
        PeriodicReader::new(self.exporter, self.interval, self.timeout)
    }
}
