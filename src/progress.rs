//! Progress-callback trait for per-page conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as a batch processes each page.
//!
//! # Example
//!
//! ```rust
//! use wiki2adoc::{ConversionProgressCallback, ConversionConfig, NormalizationWarning};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, title: &str, warnings: &[NormalizationWarning], asciidoc_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{title}: {asciidoc_len} bytes, {} warnings", warnings.len());
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::NormalizationWarning;
use std::sync::Arc;

/// Called by the batch runner as it processes each page.
///
/// Pages run concurrently, so every method may be called from several
/// tasks at once. All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, after subpage expansion, before any page starts.
    fn on_batch_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a page unit starts fetching.
    fn on_page_start(&self, reference: &str) {
        let _ = reference;
    }

    /// Called when a page converted (and was written, if a writer runs).
    ///
    /// # Arguments
    /// * `title`       : resolved page title
    /// * `warnings`    : every lossy rewrite the normaliser recorded
    /// * `asciidoc_len`: byte length of the final document
    fn on_page_complete(&self, title: &str, warnings: &[NormalizationWarning], asciidoc_len: usize) {
        let _ = (title, warnings, asciidoc_len);
    }

    /// Called when a page failed.
    fn on_page_error(&self, reference: &str, error: &str) {
        let _ = (reference, error);
    }

    /// Called once after every page has been attempted.
    fn on_batch_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WarningKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        warnings: AtomicUsize,
        started_total: AtomicUsize,
        completed_total: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total_pages: usize) {
            self.started_total.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_start(&self, _reference: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(
            &self,
            _title: &str,
            warnings: &[NormalizationWarning],
            _asciidoc_len: usize,
        ) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.warnings.fetch_add(warnings.len(), Ordering::SeqCst);
        }

        fn on_page_error(&self, _reference: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total_pages: usize, success_count: usize) {
            self.completed_total.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(5);
        cb.on_page_start("Intro");
        cb.on_page_complete("Intro", &[], 42);
        cb.on_page_error("Missing", "HTTP 404");
        cb.on_batch_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_batch_start(3);
        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 3);

        tracker.on_page_start("A");
        let warned = [NormalizationWarning::new(WarningKind::Template, "{{Stub}}")];
        tracker.on_page_complete("A", &warned, 100);
        tracker.on_page_start("B");
        tracker.on_page_complete("B", &[], 200);
        tracker.on_page_start("C");
        tracker.on_page_error("C", "engine timeout");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.warnings.load(Ordering::SeqCst), 1);

        tracker.on_batch_complete(3, 2);
        assert_eq!(tracker.completed_total.load(Ordering::SeqCst), 2);
    }
}
