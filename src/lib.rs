//! # statement-recon
//!
//! Extract financial metrics from PDF account statements and reconcile them
//! against a remote reporting API.
//!
//! ## Why this crate?
//!
//! Statement PDFs carry their numbers as free-floating text runs: a label
//! here, an amount there, sometimes a fraction of a point lower because the
//! generator drew them on different baselines. Generic PDF-to-text tools
//! flatten that into a stream in which rows no longer line up. This crate
//! instead rebuilds rows from fragment geometry, pairs each label with its
//! amount, and keys the result by the statement period, so it can be put
//! side by side with what the reporting API says about the same period.
//!
//! ## Pipeline Overview
//!
//! ```text
//! folder of PDFs
//!  │
//!  ├─ 1. Input      list *.pdf, skip ~lock files, sort by name
//!  ├─ 2. Extract    positioned text fragments via pdfium (spawn_blocking)
//!  ├─ 3. Period     "Account activity from … to …" → DateRange
//!  ├─ 4. Segment    group by y0, merge drifting singles, pair label/value
//!  ├─ 5. Assemble   period → metrics, conflicts per ConflictPolicy
//!  ├─ 6. Remote     request/poll/fetch one report per period, concurrently
//!  └─ 7. Reconcile  compare shared metric names within a tolerance
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use statement_recon::{fetch_remote_reports, parse_folder, reconcile, ReconConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ReconConfig::builder().api_token("…").build()?;
//!     let local = parse_folder("statements/", &config).await?;
//!     let remote = fetch_remote_reports(&config, "3", &local.periods()).await?;
//!     let result = reconcile(&local, &remote, &config);
//!     eprintln!("{} mismatches", result.mismatch_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfrecon` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! statement-recon = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod reconcile;
pub mod remote;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{
    parse_document, parse_document_bytes, parse_folder, parse_folder_sync, parse_folder_to_file,
    segment_document,
};
pub use config::{ConflictPolicy, PeriodFormat, ReconConfig, ReconConfigBuilder};
pub use error::{DocumentError, ReconError};
pub use output::{DocumentOutcome, MetricMap, ScanStats, StatementEntry, StatementSet};
pub use pipeline::extract::{FragmentSource, PdfiumSource};
pub use pipeline::fragment::{BBox, PageFragments, TextFragment};
pub use pipeline::period::DateRange;
pub use pipeline::segment::Segmenter;
pub use progress::{NoopProgressCallback, ProgressCallback, ReconProgressCallback};
pub use reconcile::{
    compare_metrics, reconcile, reformat_report, MetricDiff, PeriodReconciliation, Reconciliation,
};
pub use remote::{fetch_remote_reports, fetch_reports, HttpReportClient, RemoteReports, ReportApi};
pub use stream::{parse_folder_stream, StatementStream};
