use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by SDK lifecycle operations (`force_flush`, `shutdown`)
/// and reported by exporters.
///
/// Recording paths never return these: invalid measurements are dropped
/// with a diagnostic instead of failing the caller.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelSdkError {
    /// Shutdown was already invoked on this component.
    ///
    /// Shutdown is idempotent; this error flags a duplicate call so the
    /// application can fix its lifecycle management.
    #[error("shutdown already invoked")]
    AlreadyShutdown,

    /// The operation did not complete inside the given bound.
    ///
    /// The work itself may still complete; in-flight exports are not
    /// interrupted.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The exporter rejected or failed a batch.
    #[error("export failed: {0}")]
    ExportFailed(String),

    /// An internal failure. The message is for logs only.
    #[error("operation failed: {0}")]
    InternalFailure(String),
}

/// Result alias for SDK lifecycle operations.
pub type TelSdkResult = Result<(), TelSdkError>;
