//! Progress-callback trait for run, file and page events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::extract::Extractor::with_progress`] to receive events as the run
//! moves through files and pages. The CLI uses it to drive an `indicatif`
//! progress bar; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use ocr_extract::RunProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl RunProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, file: &str, provider: &str, _chars: usize) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}: {file} via {provider}");
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the extractor as it works. Every method defaults to a no-op.
///
/// Processing is sequential, so events arrive in order from one task, but
/// the trait is `Send + Sync` so it can be shared with the runtime.
pub trait RunProgressCallback: Send + Sync {
    /// Once, before the first file.
    ///
    /// * `total_jobs` — files × providers that will be attempted
    fn on_run_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Before a (file, provider) pair is processed.
    fn on_file_start(&self, file: &str, provider: &str) {
        let _ = (file, provider);
    }

    /// Before each page of a per-page submission.
    ///
    /// * `page_num`    — 1-indexed
    /// * `total_pages` — pages in this file
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// When one page of a per-page submission is lost. The file carries on
    /// and is still written without that page.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// When a pair produced output.
    ///
    /// * `text_len` — byte length of the merged text
    fn on_file_complete(&self, file: &str, provider: &str, text_len: usize) {
        let _ = (file, provider, text_len);
    }

    /// When a pair failed; `error` is human-readable.
    fn on_file_error(&self, file: &str, provider: &str, error: &str) {
        let _ = (file, provider, error);
    }

    /// Once, after every pair has been attempted.
    fn on_run_complete(&self, succeeded: usize, failed: usize) {
        let _ = (succeeded, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Shared handle stored by the extractor.
pub type ProgressCallback = Arc<dyn RunProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        pages: AtomicUsize,
        page_errors: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        total: AtomicUsize,
    }

    impl RunProgressCallback for TrackingCallback {
        fn on_run_start(&self, total_jobs: usize) {
            self.total.store(total_jobs, Ordering::SeqCst);
        }

        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.page_errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _file: &str, _provider: &str, _text_len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _file: &str, _provider: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2);
        cb.on_file_start("a.pdf", "azure");
        cb.on_page_start(1, 3);
        cb.on_page_error(2, 3, "HTTP 503");
        cb.on_file_complete("a.pdf", "azure", 42);
        cb.on_file_error("b.png", "azure", "HTTP 500");
        cb.on_run_complete(1, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = TrackingCallback::default();
        t.on_run_start(3);
        t.on_page_start(1, 2);
        t.on_page_start(2, 2);
        t.on_page_error(2, 2, "rate limited");
        t.on_file_complete("a.pdf", "openai", 10);
        t.on_file_error("b.pdf", "openai", "timeout");

        assert_eq!(t.total.load(Ordering::SeqCst), 3);
        assert_eq!(t.pages.load(Ordering::SeqCst), 2);
        assert_eq!(t.page_errors.load(Ordering::SeqCst), 1);
        assert_eq!(t.completes.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
        cb.on_file_start("x.png", "google");
    }
}
