//! Diagnostic logging macros used inside Telemark components.
//!
//! These macros are for Telemark's own plumbing (processors, exporters,
//! stores) and for custom exporter authors. They deliberately bypass the
//! Telemark log pipeline to avoid telemetry-induced telemetry, emitting
//! plain `tracing` events instead.

/// Log an informational event from inside a Telemark component.
///
/// ```
/// use telemark::tele_info;
/// tele_info!(name: "MeterProvider.Started", pipeline_count = 1);
/// ```
#[macro_export]
macro_rules! tele_info {
    (name: $name:expr $(,)?) => {
        tracing::info!(name: $name, target: env!("CARGO_PKG_NAME"), "")
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::info!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value),+, "")
    };
}

/// Log a debug event from inside a Telemark component.
#[macro_export]
macro_rules! tele_debug {
    (name: $name:expr $(,)?) => {
        tracing::debug!(name: $name, target: env!("CARGO_PKG_NAME"), "")
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::debug!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value),+, "")
    };
}

/// Log a warning from inside a Telemark component.
#[macro_export]
macro_rules! tele_warn {
    (name: $name:expr $(,)?) => {
        tracing::warn!(name: $name, target: env!("CARGO_PKG_NAME"), "")
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::warn!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value),+, "")
    };
}

/// Log an error from inside a Telemark component.
#[macro_export]
macro_rules! tele_error {
    (name: $name:expr $(,)?) => {
        tracing::error!(name: $name, target: env!("CARGO_PKG_NAME"), "")
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::error!(name: $name, target: env!("CARGO_PKG_NAME"), $($key = $value),+, "")
    };
}
