//! Telemark SDK
//!
//! The working half of the Telemark telemetry toolkit. Three signals share
//! two engines:
//!
//! * **Metrics** flow through instruments into per-stream aggregator
//!   stores: bounded-cardinality, lock-light maps from attribute sets to
//!   running aggregations (sums, gauges, explicit-bucket histograms,
//!   base-2 exponential histograms), snapshotted on demand or on a
//!   periodic schedule.
//! * **Spans** and **log records** flow through processors into the
//!   [`BatchExportProcessor`](export::BatchExportProcessor): a bounded
//!   queue drained by a dedicated worker thread that hands batches to an
//!   [`Exporter`](export::Exporter).
//!
//! Wire formats and transports are out of scope; exporters are the
//! boundary. The in-memory exporters shipped here exist for tests and
//! examples.

#![warn(unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod error;
pub mod export;
pub mod logs;
pub mod metrics;
pub mod trace;

pub use error::{TelSdkError, TelSdkResult};
