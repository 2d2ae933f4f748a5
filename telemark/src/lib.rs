//! Telemark API
//!
//! This crate holds the instrumentation-facing surface of the Telemark
//! telemetry toolkit: the value types shared by all signals, the
//! execution-scoped [`Context`], [`Baggage`](baggage::Baggage), the
//! propagation traits, and the identity types for traces and logs.
//!
//! The heavy lifting (aggregation, batching, export) lives in the
//! `telemark-sdk` crate; this crate is intentionally lightweight so that
//! libraries can depend on it without pulling in the SDK machinery.

#![warn(missing_docs, unreachable_pub, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod baggage;
mod common;
pub mod context;
mod internal_logging;
pub mod logs;
pub mod propagation;
pub mod time;
pub mod trace;

pub use common::{Array, InstrumentationScope, Key, KeyValue, StringValue, Value};
pub use context::{Context, ContextGuard};
