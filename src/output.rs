//! Result types produced by a statement scan.
//!
//! [`StatementSet`] is the assembled local view: one metric map per
//! statement period, plus the per-document outcomes and scan statistics
//! needed to explain what was (and was not) included.

use crate::error::{DocumentError, ReconError};
use crate::pipeline::period::DateRange;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Metric name → value for one statement.
pub type MetricMap = BTreeMap<String, f64>;

/// The parsed content of one statement document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementEntry {
    /// Source document (empty for in-memory input).
    pub path: PathBuf,
    pub period: DateRange,
    pub metrics: MetricMap,
}

/// What happened to one document during a folder scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub path: PathBuf,
    /// Statement period, when one could be parsed.
    pub period: Option<DateRange>,
    /// Number of metrics extracted (0 on failure).
    pub metric_count: usize,
    /// Wall-clock time spent on this document.
    pub duration_ms: u64,
    /// Set when the document was skipped or rejected.
    pub error: Option<DocumentError>,
}

/// Statistics for a completed scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    /// Matching documents found in the folder.
    pub total_documents: usize,
    /// Documents that contributed a statement.
    pub parsed_documents: usize,
    /// Documents skipped or rejected.
    pub failed_documents: usize,
    /// Statements replaced by a later document with the same period.
    pub overwritten_periods: usize,
    pub total_duration_ms: u64,
}

/// The assembled result of a folder scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementSet {
    /// Statement period → metrics.
    pub statements: BTreeMap<DateRange, MetricMap>,
    /// One entry per matching document, in scan order.
    pub documents: Vec<DocumentOutcome>,
    pub stats: ScanStats,
}

impl StatementSet {
    /// Periods in ascending order; the input for the remote fan-out.
    pub fn periods(&self) -> Vec<DateRange> {
        self.statements.keys().copied().collect()
    }

    pub fn metrics(&self, period: &DateRange) -> Option<&MetricMap> {
        self.statements.get(period)
    }

    /// Errors of every skipped or rejected document.
    pub fn failures(&self) -> impl Iterator<Item = &DocumentError> {
        self.documents.iter().filter_map(|d| d.error.as_ref())
    }

    /// Outcome for a given source path.
    pub fn outcome(&self, path: &Path) -> Option<&DocumentOutcome> {
        self.documents.iter().find(|d| d.path == path)
    }

    /// Treat any document failure as an error.
    pub fn into_result(self) -> Result<Self, ReconError> {
        if self.stats.failed_documents > 0 {
            return Err(ReconError::PartialFailure {
                parsed: self.stats.parsed_documents,
                failed: self.stats.failed_documents,
                total: self.stats.total_documents,
            });
        }
        Ok(self)
    }
}

/// Serialise `value` as pretty JSON and write it atomically
/// (temp file + rename) so readers never see a partial file.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ReconError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| ReconError::Internal(format!("JSON serialisation failed: {e}")))?;

    let write_err = |source| ReconError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
