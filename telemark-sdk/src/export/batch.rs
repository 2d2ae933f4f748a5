use std::cmp::min;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use futures_timer::Delay;
use futures_util::future::{self, Either};
use telemark::{tele_debug, tele_error, tele_warn};

use crate::export::{Batch, ExportFilter, Exporter, FilterDecision};
use crate::{TelSdkError, TelSdkResult};

/// Default maximum number of queued items.
pub(crate) const DEFAULT_MAX_QUEUE_SIZE: usize = 2_048;
/// Default delay between two scheduled exports.
pub(crate) const DEFAULT_SCHEDULED_DELAY: Duration = Duration::from_millis(5_000);
/// Default maximum number of items per exported batch.
pub(crate) const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;
/// Default bound on a single export call.
pub(crate) const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Control messages sent from the handle to the worker thread.
enum ControlMessage {
    /// The queue crossed the eager-export watermark.
    ExportWake(Arc<AtomicBool>),
    /// Drain everything queued so far and acknowledge.
    ForceFlush(SyncSender<TelSdkResult>),
    /// Drain, shut the exporter down, acknowledge, and exit.
    Shutdown(SyncSender<TelSdkResult>),
}

/// Configuration for a [`BatchExportProcessor`].
#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub(crate) max_queue_size: usize,
    pub(crate) scheduled_delay: Duration,
    pub(crate) max_export_batch_size: usize,
    pub(crate) export_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

/// Builder for [`BatchConfig`].
#[derive(Clone, Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    export_timeout: Duration,
}

impl Default for BatchConfigBuilder {
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            scheduled_delay: DEFAULT_SCHEDULED_DELAY,
            max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
        }
    }
}

impl BatchConfigBuilder {
    /// Maximum number of items buffered for delayed processing. A full
    /// queue drops incoming items. Default 2048.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size.max(1);
        self
    }

    /// Interval between two scheduled exports. Default 5 s.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Maximum number of items per export call. Clamped to the queue size.
    /// Default 512.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size.max(1);
        self
    }

    /// Deadline applied to each export call. Default 30 s.
    pub fn with_export_timeout(mut self, export_timeout: Duration) -> Self {
        self.export_timeout = export_timeout;
        self
    }

    /// Finish the configuration, enforcing
    /// `max_export_batch_size <= max_queue_size`.
    pub fn build(self) -> BatchConfig {
        BatchConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size: min(self.max_export_batch_size, self.max_queue_size),
            export_timeout: self.export_timeout,
        }
    }
}

/// A bounded queue drained by a dedicated worker thread.
///
/// Producers enqueue finished items without ever blocking; the worker
/// exports FIFO batches when the scheduled delay elapses, when the queue
/// crosses the half-full watermark, and on flush or shutdown. Handoff to
/// the exporter is at-least-once per accepted item until the item is given
/// to exactly one `export` call; failed batches are dropped, not retried.
pub struct BatchExportProcessor<T: Send + 'static> {
    item_sender: SyncSender<T>,
    control_sender: SyncSender<ControlMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    filter: Option<ExportFilter<T>>,
    pending_count: Arc<AtomicUsize>,
    export_wake_sent: Arc<AtomicBool>,
    is_shutdown: AtomicBool,
    dropped_count: AtomicUsize,
    filtered_count: AtomicUsize,
    filter_panicked: AtomicBool,
    eager_watermark: usize,
}

impl<T: Send + 'static> BatchExportProcessor<T> {
    /// Spawn the worker thread and return the producer-side handle.
    ///
    /// `worker_name` names the thread for diagnostics.
    pub fn new<E>(worker_name: &str, exporter: E, config: BatchConfig) -> Self
    where
        E: Exporter<T>,
    {
        Self::with_filter(worker_name, exporter, config, None)
    }

    /// Like [`BatchExportProcessor::new`], with an export filter hook.
    pub fn with_filter<E>(
        worker_name: &str,
        exporter: E,
        config: BatchConfig,
        filter: Option<ExportFilter<T>>,
    ) -> Self
    where
        E: Exporter<T>,
    {
        let (item_sender, item_receiver) = mpsc::sync_channel::<T>(config.max_queue_size);
        let (control_sender, control_receiver) = mpsc::sync_channel::<ControlMessage>(64);
        let pending_count = Arc::new(AtomicUsize::new(0));
        let eager_watermark = (config.max_queue_size / 2).max(1);

        let worker_pending = pending_count.clone();
        let worker_config = config.clone();
        let handle = thread::Builder::new()
            .name(worker_name.to_string())
            .spawn(move || {
                run_worker(exporter, worker_config, item_receiver, control_receiver, worker_pending)
            })
            .expect("failed to spawn batch export worker");

        BatchExportProcessor {
            item_sender,
            control_sender,
            handle: Mutex::new(Some(handle)),
            filter,
            pending_count,
            export_wake_sent: Arc::new(AtomicBool::new(false)),
            is_shutdown: AtomicBool::new(false),
            dropped_count: AtomicUsize::new(0),
            filtered_count: AtomicUsize::new(0),
            filter_panicked: AtomicBool::new(false),
            eager_watermark,
        }
    }

    /// Enqueue a finished item. Never blocks; drops when the queue is full
    /// or the processor is shut down.
    pub fn on_end(&self, item: T) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }

        if let Some(filter) = &self.filter {
            match catch_unwind(AssertUnwindSafe(|| filter(&item))) {
                Ok(FilterDecision::Export) => {}
                Ok(FilterDecision::Ignore) => {
                    self.filtered_count.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(_) => {
                    // Fail open: a broken filter must not lose telemetry.
                    if !self.filter_panicked.swap(true, Ordering::Relaxed) {
                        tele_warn!(
                            name: "BatchExportProcessor.FilterPanicked",
                            message = "export filter panicked; items are exported unfiltered"
                        );
                    }
                }
            }
        }

        match self.item_sender.try_send(item) {
            Ok(()) => {
                let pending = self.pending_count.fetch_add(1, Ordering::Relaxed) + 1;
                if pending >= self.eager_watermark
                    && !self.export_wake_sent.load(Ordering::Relaxed)
                    && !self.export_wake_sent.swap(true, Ordering::Relaxed)
                {
                    let wake = self.export_wake_sent.clone();
                    if self
                        .control_sender
                        .try_send(ControlMessage::ExportWake(wake))
                        .is_err()
                    {
                        self.export_wake_sent.store(false, Ordering::Relaxed);
                    }
                }
            }
            Err(TrySendError::Full(_)) => {
                if self.dropped_count.fetch_add(1, Ordering::Relaxed) == 0 {
                    tele_warn!(
                        name: "BatchExportProcessor.QueueFull",
                        message = "item dropped because the export queue is full; subsequent drops are counted silently"
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                tele_warn!(
                    name: "BatchExportProcessor.WorkerGone",
                    message = "item dropped because the export worker has exited"
                );
            }
        }
    }

    /// Export everything enqueued before this call, waiting up to
    /// `timeout`. Idempotent.
    pub fn force_flush(&self, timeout: Duration) -> TelSdkResult {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TelSdkError::AlreadyShutdown);
        }
        let (ack_sender, ack_receiver) = mpsc::sync_channel(1);
        self.send_control(ControlMessage::ForceFlush(ack_sender))?;
        Self::await_ack(&ack_receiver, timeout)
    }

    /// Drain, shut the exporter down, and stop the worker. Subsequent
    /// [`on_end`](BatchExportProcessor::on_end) calls become no-ops.
    pub fn shutdown(&self, timeout: Duration) -> TelSdkResult {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TelSdkError::AlreadyShutdown);
        }

        let dropped = self.dropped_count.load(Ordering::Relaxed);
        if dropped > 0 {
            tele_warn!(
                name: "BatchExportProcessor.ItemsDropped",
                dropped_count = dropped,
                message = "items were dropped over the processor lifetime because the queue was full"
            );
        }

        let (ack_sender, ack_receiver) = mpsc::sync_channel(1);
        self.send_control(ControlMessage::Shutdown(ack_sender))?;
        let result = Self::await_ack(&ack_receiver, timeout);
        if result.is_ok() {
            if let Some(handle) = self.handle.lock().ok().and_then(|mut h| h.take()) {
                let _ = handle.join();
            }
        }
        result
    }

    /// Items dropped because the queue was full.
    pub fn dropped_count(&self) -> usize {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Items ignored by the export filter.
    pub fn filtered_count(&self) -> usize {
        self.filtered_count.load(Ordering::Relaxed)
    }

    fn send_control(&self, message: ControlMessage) -> TelSdkResult {
        match self.control_sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TelSdkError::InternalFailure(
                "control channel full; a previous flush or shutdown has not finished".into(),
            )),
            Err(TrySendError::Disconnected(_)) => Err(TelSdkError::AlreadyShutdown),
        }
    }

    fn await_ack(receiver: &Receiver<TelSdkResult>, timeout: Duration) -> TelSdkResult {
        match receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TelSdkError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(TelSdkError::InternalFailure(
                "export worker exited before acknowledging".into(),
            )),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for BatchExportProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExportProcessor")
            .field("eager_watermark", &self.eager_watermark)
            .field("dropped_count", &self.dropped_count)
            .field("filtered_count", &self.filtered_count)
            .finish()
    }
}

fn run_worker<T, E>(
    mut exporter: E,
    config: BatchConfig,
    items: Receiver<T>,
    control: Receiver<ControlMessage>,
    pending_count: Arc<AtomicUsize>,
) where
    T: Send + 'static,
    E: Exporter<T>,
{
    tele_debug!(
        name: "BatchExportProcessor.WorkerStarted",
        max_queue_size = config.max_queue_size,
        max_export_batch_size = config.max_export_batch_size,
        scheduled_delay_ms = config.scheduled_delay.as_millis()
    );

    let mut last_export = Instant::now();
    loop {
        let remaining = config
            .scheduled_delay
            .checked_sub(last_export.elapsed())
            .unwrap_or(Duration::ZERO);

        match control.recv_timeout(remaining) {
            Ok(ControlMessage::ExportWake(wake_sent)) => {
                wake_sent.store(false, Ordering::Relaxed);
                let _ = drain_and_export(
                    &mut exporter,
                    &config,
                    &items,
                    &pending_count,
                    &mut last_export,
                );
            }
            Ok(ControlMessage::ForceFlush(ack)) => {
                let result = drain_and_export(
                    &mut exporter,
                    &config,
                    &items,
                    &pending_count,
                    &mut last_export,
                );
                let flush_result = exporter.force_flush();
                let _ = ack.send(result.and(flush_result));
            }
            Ok(ControlMessage::Shutdown(ack)) => {
                let result = drain_and_export(
                    &mut exporter,
                    &config,
                    &items,
                    &pending_count,
                    &mut last_export,
                );
                let shutdown_result = exporter.shutdown();
                let _ = ack.send(result.and(shutdown_result));
                tele_debug!(name: "BatchExportProcessor.WorkerExiting", reason = "shutdown");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = drain_and_export(
                    &mut exporter,
                    &config,
                    &items,
                    &pending_count,
                    &mut last_export,
                );
            }
            Err(RecvTimeoutError::Disconnected) => {
                tele_debug!(name: "BatchExportProcessor.WorkerExiting", reason = "handle dropped");
                break;
            }
        }
    }
}

/// Drains the queue into batches of at most `max_export_batch_size` and
/// exports them one after another. Returns the last export error, if any.
fn drain_and_export<T, E>(
    exporter: &mut E,
    config: &BatchConfig,
    items: &Receiver<T>,
    pending_count: &AtomicUsize,
    last_export: &mut Instant,
) -> TelSdkResult
where
    T: Send + 'static,
    E: Exporter<T>,
{
    let mut result = Ok(());
    loop {
        let mut batch = Vec::with_capacity(config.max_export_batch_size);
        while let Ok(item) = items.try_recv() {
            batch.push(item);
            if batch.len() == config.max_export_batch_size {
                break;
            }
        }
        if batch.is_empty() {
            break;
        }
        pending_count.fetch_sub(batch.len(), Ordering::Relaxed);
        if let Err(err) = export_with_deadline(exporter, config, batch, last_export) {
            result = Err(err);
        }
    }
    result
}

fn export_with_deadline<T, E>(
    exporter: &mut E,
    config: &BatchConfig,
    batch: Vec<T>,
    last_export: &mut Instant,
) -> TelSdkResult
where
    T: Send + 'static,
    E: Exporter<T>,
{
    *last_export = Instant::now();

    let export = exporter.export(Batch::from(batch));
    let deadline = Box::pin(Delay::new(config.export_timeout));
    match futures_executor::block_on(future::select(export, deadline)) {
        Either::Left((Ok(()), _)) => Ok(()),
        Either::Left((Err(err), _)) => {
            tele_error!(
                name: "BatchExportProcessor.ExportFailed",
                error = format!("{err}")
            );
            Err(err)
        }
        Either::Right(_) => {
            tele_warn!(
                name: "BatchExportProcessor.ExportTimedOut",
                timeout_ms = config.export_timeout.as_millis()
            );
            Err(TelSdkError::Timeout(config.export_timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use std::sync::Mutex as StdMutex;

    #[derive(Clone, Default)]
    struct RecordingExporter {
        batches: Arc<StdMutex<Vec<Vec<u64>>>>,
        shutdown_called: Arc<AtomicBool>,
    }

    impl Exporter<u64> for RecordingExporter {
        fn export(&mut self, batch: Batch<u64>) -> BoxFuture<'static, TelSdkResult> {
            let batches = self.batches.clone();
            let items: Vec<u64> = batch.into_iter().collect();
            Box::pin(async move {
                batches.lock().unwrap().push(items);
                Ok(())
            })
        }

        fn shutdown(&mut self) -> TelSdkResult {
            self.shutdown_called.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn exported(exporter: &RecordingExporter) -> Vec<u64> {
        exporter
            .batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .copied()
            .collect()
    }

    fn quiet_config() -> BatchConfig {
        BatchConfigBuilder::default()
            .with_scheduled_delay(Duration::from_secs(3600))
            .build()
    }

    #[test]
    fn flush_exports_everything_enqueued_before_it() {
        let exporter = RecordingExporter::default();
        let processor = BatchExportProcessor::new("test-worker", exporter.clone(), quiet_config());

        for i in 0..5 {
            processor.on_end(i);
        }
        processor.force_flush(Duration::from_secs(5)).unwrap();

        assert_eq!(exported(&exporter), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn flush_is_idempotent() {
        let exporter = RecordingExporter::default();
        let processor = BatchExportProcessor::new("test-worker", exporter.clone(), quiet_config());
        processor.on_end(1);
        processor.force_flush(Duration::from_secs(5)).unwrap();
        processor.force_flush(Duration::from_secs(5)).unwrap();
        assert_eq!(exported(&exporter), vec![1]);
    }

    #[test]
    fn batches_respect_max_export_batch_size() {
        let exporter = RecordingExporter::default();
        let config = BatchConfigBuilder::default()
            .with_scheduled_delay(Duration::from_secs(3600))
            .with_max_export_batch_size(2)
            .build();
        let processor = BatchExportProcessor::new("test-worker", exporter.clone(), config);

        for i in 0..5 {
            processor.on_end(i);
        }
        processor.force_flush(Duration::from_secs(5)).unwrap();

        let batches = exporter.batches.lock().unwrap().clone();
        assert!(batches.iter().all(|b| b.len() <= 2));
        assert_eq!(batches.iter().flatten().count(), 5);
    }

    struct SlowExporter {
        delay: Duration,
        batches: Arc<StdMutex<Vec<Vec<u64>>>>,
    }

    impl Exporter<u64> for SlowExporter {
        fn export(&mut self, batch: Batch<u64>) -> BoxFuture<'static, TelSdkResult> {
            let batches = self.batches.clone();
            let items: Vec<u64> = batch.into_iter().collect();
            let delay = self.delay;
            Box::pin(async move {
                thread::sleep(delay);
                batches.lock().unwrap().push(items);
                Ok(())
            })
        }
    }

    #[test]
    fn full_queue_drops_incoming_items() {
        let batches = Arc::new(StdMutex::new(Vec::new()));
        let exporter = SlowExporter {
            delay: Duration::from_millis(200),
            batches: batches.clone(),
        };
        let config = BatchConfigBuilder::default()
            .with_max_queue_size(2)
            .with_scheduled_delay(Duration::from_secs(3600))
            .build();
        let processor = BatchExportProcessor::new("test-worker", exporter, config);

        // The first item wakes the worker into a slow export; everything
        // pushed while the tiny queue is full gets dropped.
        for i in 0..50 {
            processor.on_end(i);
        }
        assert!(processor.dropped_count() > 0);
        processor.shutdown(Duration::from_secs(5)).unwrap();
        let total: usize = batches.lock().unwrap().iter().map(Vec::len).sum();
        assert!(total < 50);
        assert_eq!(total + processor.dropped_count(), 50);
    }

    #[test]
    fn shutdown_is_final() {
        let exporter = RecordingExporter::default();
        let processor = BatchExportProcessor::new("test-worker", exporter.clone(), quiet_config());

        processor.on_end(7);
        processor.shutdown(Duration::from_secs(5)).unwrap();
        assert!(exporter.shutdown_called.load(Ordering::Relaxed));
        assert_eq!(exported(&exporter), vec![7]);

        // Later items go nowhere, and shutdown is reported as duplicate.
        processor.on_end(8);
        assert_eq!(exported(&exporter), vec![7]);
        assert!(matches!(
            processor.shutdown(Duration::from_secs(5)),
            Err(TelSdkError::AlreadyShutdown)
        ));
    }

    #[test]
    fn filter_ignores_and_fails_open_on_panic() {
        let exporter = RecordingExporter::default();
        let filter: ExportFilter<u64> = Box::new(|item| {
            if *item == 13 {
                panic!("unlucky");
            }
            if *item % 2 == 0 {
                FilterDecision::Ignore
            } else {
                FilterDecision::Export
            }
        });
        let processor = BatchExportProcessor::with_filter(
            "test-worker",
            exporter.clone(),
            quiet_config(),
            Some(filter),
        );

        for i in [1u64, 2, 3, 4, 13] {
            processor.on_end(i);
        }
        processor.force_flush(Duration::from_secs(5)).unwrap();

        // Evens filtered, 13 exported despite the panicking filter.
        assert_eq!(exported(&exporter), vec![1, 3, 13]);
        assert_eq!(processor.filtered_count(), 2);
    }

    #[test]
    fn eager_export_fires_at_half_queue() {
        let exporter = RecordingExporter::default();
        let config = BatchConfigBuilder::default()
            .with_max_queue_size(8)
            .with_scheduled_delay(Duration::from_secs(3600))
            .build();
        let processor = BatchExportProcessor::new("test-worker", exporter.clone(), config);

        for i in 0..4 {
            processor.on_end(i);
        }
        // The half-full wake should get the worker moving without a flush.
        let deadline = Instant::now() + Duration::from_secs(5);
        while exported(&exporter).len() < 4 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(exported(&exporter), vec![0, 1, 2, 3]);
    }
}
