use thiserror::Error;

/// Errors raised while configuring or feeding the metrics engine.
///
/// Recording paths never surface these to instrumented code; they are
/// logged once per kind and counted instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricError {
    /// An attribute violated the data-model rules (empty key).
    #[error("invalid attribute: {0}")]
    InvalidAttribute(&'static str),

    /// A second instrument registration collides with an existing identity.
    /// Non-fatal; the stream is still created.
    #[error("duplicate instrument registration: {0}")]
    DuplicateInstrument(String),

    /// A view or stream configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}
