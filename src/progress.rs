//! Progress-callback trait for per-document scan events.
//!
//! Inject an [`Arc<dyn ReconProgressCallback>`] via
//! [`crate::config::ReconConfigBuilder::progress_callback`] to receive events
//! as the assembler works through a statement folder.
//!
//! # Example
//!
//! ```rust
//! use statement_recon::{ReconConfig, ReconProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     parsed: AtomicUsize,
//! }
//!
//! impl ReconProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, index: usize, total: usize, metric_count: usize) {
//!         self.parsed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("statement {}/{}: {} metrics", index, total, metric_count);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { parsed: AtomicUsize::new(0) });
//!
//! let config = ReconConfig::builder()
//!     .progress_callback(counter as Arc<dyn ReconProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the assembler as it processes each statement document.
///
/// Documents are processed one at a time, but the callback is shared through
/// an `Arc` and may outlive the scan, so implementations must be
/// `Send + Sync`. All methods default to no-ops.
pub trait ReconProgressCallback: Send + Sync {
    /// Called once after the folder is listed.
    ///
    /// # Arguments
    /// * `total_documents` — number of matching documents that will be parsed
    fn on_scan_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before a document is opened.
    ///
    /// # Arguments
    /// * `index` — 1-based position in the scan
    /// * `total` — total documents in the scan
    /// * `path`  — the document being opened
    fn on_document_start(&self, index: usize, total: usize, path: &Path) {
        let _ = (index, total, path);
    }

    /// Called when a document yields a statement.
    fn on_document_complete(&self, index: usize, total: usize, metric_count: usize) {
        let _ = (index, total, metric_count);
    }

    /// Called when a document is skipped or rejected.
    ///
    /// # Arguments
    /// * `error` — human-readable reason
    fn on_document_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every document has been attempted.
    ///
    /// # Arguments
    /// * `total_documents` — documents attempted
    /// * `parsed`          — documents that contributed a statement
    fn on_scan_complete(&self, total_documents: usize, parsed: usize) {
        let _ = (total_documents, parsed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ReconProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ReconConfig`].
pub type ProgressCallback = Arc<dyn ReconProgressCallback>;
