//! The exporter boundary shared by the span and log pipelines.
//!
//! Processors hand finished items to an [`Exporter`] in [`Batch`]es. The
//! batching processor lives in [`batch`], the synchronous pass-through
//! variant in [`simple`].

use futures_util::future::BoxFuture;

use crate::TelSdkResult;

mod batch;
mod simple;

pub use batch::{BatchConfig, BatchConfigBuilder, BatchExportProcessor};
pub use simple::SimpleExportProcessor;

/// A finite, known-length sequence of telemetry items, safe to iterate
/// exactly once.
#[derive(Debug)]
pub struct Batch<T> {
    items: Vec<T>,
}

impl<T> Batch<T> {
    /// Number of items in the batch.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch holds no items. Processors never export empty
    /// batches, so exporters should not observe this.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Borrow the items without consuming the batch.
    pub fn items(&self) -> &[T] {
        &self.items
    }
}

impl<T> From<Vec<T>> for Batch<T> {
    fn from(items: Vec<T>) -> Self {
        Batch { items }
    }
}

impl<T> IntoIterator for Batch<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Receives batches of finished telemetry items.
///
/// `export` returns a future so that exporters can do their I/O however
/// they like; the owning processor drives it to completion on its worker
/// thread and enforces the configured deadline. A failed batch is dropped;
/// retrying is the exporter's own business.
pub trait Exporter<T>: Send + 'static {
    /// Export a batch. Must not be called with an empty batch.
    fn export(&mut self, batch: Batch<T>) -> BoxFuture<'static, TelSdkResult>;

    /// Flush any exporter-internal buffers.
    fn force_flush(&mut self) -> TelSdkResult {
        Ok(())
    }

    /// Release exporter resources. No further calls follow.
    fn shutdown(&mut self) -> TelSdkResult {
        Ok(())
    }
}

/// Verdict returned by an export filter hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterDecision {
    /// Hand the item to the exporter.
    Export,
    /// Drop the item, counting it as filtered.
    Ignore,
}

/// A per-processor hook deciding whether an item is exported at all.
///
/// A panicking filter fails open: the item is exported.
pub type ExportFilter<T> = Box<dyn Fn(&T) -> FilterDecision + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_iterates_once_with_known_length() {
        let batch = Batch::from(vec![1, 2, 3]);
        assert_eq!(batch.len(), 3);
        assert!(!batch.is_empty());
        assert_eq!(batch.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
