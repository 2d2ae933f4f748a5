//! The log pipeline: records, emitters, and export.
//!
//! [`SdkLogger`]s stamp emitted records with observation time and the
//! active trace context, then fan them out to every registered
//! [`LogProcessor`]. The batching processor shares its queue/worker
//! machinery with the span side.
//!
//! ```
//! use telemark::logs::Severity;
//! use telemark_sdk::logs::{InMemoryLogExporter, SdkLoggerProvider, SimpleLogProcessor};
//!
//! let exporter = InMemoryLogExporter::default();
//! let provider = SdkLoggerProvider::builder()
//!     .with_log_processor(SimpleLogProcessor::new(exporter.clone()))
//!     .build();
//!
//! let logger = provider.logger("worker");
//! let mut record = logger.create_log_record();
//! record.set_severity_number(Severity::Info);
//! record.set_body("job finished".into());
//! logger.emit(record);
//!
//! assert_eq!(exporter.get_emitted_logs().len(), 1);
//! ```

mod in_memory_exporter;
mod log_processor;
mod logger;
mod logger_provider;
mod record;

pub use in_memory_exporter::InMemoryLogExporter;
pub use log_processor::{
    BatchLogProcessor, BatchLogProcessorBuilder, LogEnvelope, LogProcessor, SimpleLogProcessor,
};
pub use logger::SdkLogger;
pub use logger_provider::{LoggerProviderBuilder, SdkLoggerProvider};
pub use record::{LogTraceContext, SdkLogRecord};
