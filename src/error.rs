//! Error types for the statement-recon library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReconError`]: **Fatal** for the operation that returned it. The scan
//!   cannot start (folder missing, pdfium not bindable, bad config), a remote
//!   call failed, or a single-document call could not produce a statement.
//!
//! * [`DocumentError`]: **Non-fatal** for a folder scan. One statement could
//!   not be read or dated, but the others are fine. Stored inside
//!   [`crate::output::DocumentOutcome`] so callers can see exactly which
//!   files were left out of the result.
//!
//! Ambiguous rows and lenient duplicate overwrites are policies, not errors,
//! and never show up here.

use crate::pipeline::period::DateRange;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the statement-recon library.
#[derive(Debug, Error)]
pub enum ReconError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Statement folder does not exist.
    #[error("Statement folder not found: '{path}'\nCheck the path exists and is readable.")]
    FolderNotFound { path: PathBuf },

    /// The statement path exists but is a file, not a folder.
    #[error("'{path}' is not a directory")]
    NotADirectory { path: PathBuf },

    /// Process does not have read permission on the path.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The bytes handed to the fragment source are not a PDF.
    #[error("Input is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    // ── Statement errors ──────────────────────────────────────────────────
    /// The statement-period marker is missing or its text does not match the
    /// expected layout.
    #[error("Unrecognised statement period {text:?}: {reason}")]
    DateFormat { text: String, reason: String },

    /// Two rows of one statement produced the same metric name under the
    /// strict conflict policy.
    #[error("Metric '{name}' appears more than once ({first} and {second})")]
    DuplicateMetric { name: String, first: f64, second: f64 },

    /// Some documents failed during a folder scan.
    ///
    /// Returned by [`crate::output::StatementSet::into_result`] when the
    /// caller wants to treat any document failure as an error.
    #[error("{failed}/{total} statements could not be parsed")]
    PartialFailure { parsed: usize, failed: usize, total: usize },

    // ── Remote report errors ──────────────────────────────────────────────
    /// The HTTP request itself failed (connect, TLS, decode).
    #[error("Report request for {period} failed: {reason}")]
    RemoteRequestFailed { period: DateRange, reason: String },

    /// The report API did not answer `201 Created` to the report request.
    #[error("Report API refused to create a report for {period}: HTTP {status}")]
    ReportNotCreated { period: DateRange, status: u16 },

    /// The report never reached `completed` within the polling window.
    #[error("Report for {period} not ready after {secs}s\nIncrease --timeout.")]
    RemoteTimeout { period: DateRange, secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading a statement file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Place libpdfium next to the binary or in the working directory.\n\
  • Install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReconError {
    /// `true` for errors that make every further document pointless too.
    pub fn is_fatal_for_scan(&self) -> bool {
        matches!(
            self,
            ReconError::PdfiumBindingFailed(_)
                | ReconError::InvalidConfig(_)
                | ReconError::Internal(_)
        )
    }
}

/// A non-fatal error for a single statement document.
///
/// Stored alongside [`crate::output::DocumentOutcome`] when a document is
/// skipped. The scan continues with the remaining files.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The fragment source could not read the document.
    #[error("{path}: unreadable: {detail}")]
    Unreadable { path: PathBuf, detail: String },

    /// No usable statement period; no metrics were extracted.
    #[error("{path}: no statement period: {detail}")]
    PeriodUnrecoverable { path: PathBuf, detail: String },

    /// Rejected by the strict conflict policy.
    #[error("{path}: conflict: {detail}")]
    Conflict { path: PathBuf, detail: String },
}

impl DocumentError {
    /// Classify a per-document [`ReconError`].
    pub fn from_recon(path: PathBuf, err: &ReconError) -> Self {
        let detail = err.to_string();
        match err {
            ReconError::DateFormat { .. } => DocumentError::PeriodUnrecoverable { path, detail },
            ReconError::DuplicateMetric { .. } => DocumentError::Conflict { path, detail },
            _ => DocumentError::Unreadable { path, detail },
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            DocumentError::Unreadable { path, .. }
            | DocumentError::PeriodUnrecoverable { path, .. }
            | DocumentError::Conflict { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn january() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    #[test]
    fn partial_failure_display() {
        let e = ReconError::PartialFailure {
            parsed: 9,
            failed: 1,
            total: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("1/10"), "got: {msg}");
    }

    #[test]
    fn remote_timeout_mentions_period() {
        let e = ReconError::RemoteTimeout {
            period: january(),
            secs: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("2024-01-01..2024-01-31"), "got: {msg}");
        assert!(msg.contains("10s"));
    }

    #[test]
    fn date_format_maps_to_period_unrecoverable() {
        let e = ReconError::DateFormat {
            text: "Statement".into(),
            reason: "too few words".into(),
        };
        let doc = DocumentError::from_recon(PathBuf::from("a.pdf"), &e);
        assert!(matches!(doc, DocumentError::PeriodUnrecoverable { .. }));
        assert_eq!(doc.path(), std::path::Path::new("a.pdf"));
    }

    #[test]
    fn duplicate_metric_maps_to_conflict() {
        let e = ReconError::DuplicateMetric {
            name: "Refunds".into(),
            first: 1.0,
            second: 2.0,
        };
        let doc = DocumentError::from_recon(PathBuf::from("b.pdf"), &e);
        assert!(matches!(doc, DocumentError::Conflict { .. }));
        assert!(doc.to_string().contains("Refunds"));
    }

    #[test]
    fn binding_failure_is_fatal_for_scan() {
        assert!(ReconError::PdfiumBindingFailed("nope".into()).is_fatal_for_scan());
        assert!(!ReconError::CorruptPdf { detail: "x".into() }.is_fatal_for_scan());
    }
}
