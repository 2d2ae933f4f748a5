use futures_util::future::BoxFuture;

use crate::metrics::data::MetricsData;
use crate::metrics::TemporalityPreference;
use crate::TelSdkResult;

/// Receives collected metrics pushed by a [`PeriodicReader`].
///
/// [`PeriodicReader`]: crate::metrics::PeriodicReader
pub trait PushMetricExporter: Send + Sync + 'static {
    /// Export one collection. The reader enforces its export deadline
    /// around the returned future.
    fn export<'a>(&'a self, metrics: &'a MetricsData) -> BoxFuture<'a, TelSdkResult>;

    /// Flush exporter-internal buffers.
    fn force_flush(&self) -> TelSdkResult {
        Ok(())
    }

    /// Release exporter resources. No further calls follow.
    fn shutdown(&self) -> TelSdkResult {
        Ok(())
    }

    /// The temporality this exporter wants data aggregated at.
    fn temporality(&self) -> TemporalityPreference {
        TemporalityPreference::Cumulative
    }
}
