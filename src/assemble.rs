//! Eager (whole-folder) statement assembly.
//!
//! Walks a statement folder one document at a time, runs each through
//! fragment extraction, period parsing and segmentation, and merges the
//! results into a single [`StatementSet`] keyed by statement period. Use
//! [`crate::stream::parse_folder_stream`] instead to consume statements as
//! they are parsed.
//!
//! A bad document never aborts the scan: it is logged, reported through the
//! progress callback and recorded as a [`DocumentError`] in its
//! [`DocumentOutcome`]. Only errors that would fail every document (pdfium
//! cannot be bound, invalid configuration) stop the scan early.

use crate::config::{ConflictPolicy, ReconConfig};
use crate::error::{DocumentError, ReconError};
use crate::output::{
    write_json, DocumentOutcome, MetricMap, ScanStats, StatementEntry, StatementSet,
};
use crate::pipeline::extract::{FragmentSource, PdfiumSource};
use crate::pipeline::fragment::TextFragment;
use crate::pipeline::input;
use crate::pipeline::period::{extract_period, DateRange};
use crate::pipeline::segment::Segmenter;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Parse every statement in `folder` into a [`StatementSet`].
///
/// # Returns
/// `Ok(StatementSet)` even when some documents failed; check
/// `set.stats.failed_documents` or call [`StatementSet::into_result`].
///
/// # Errors
/// Returns `Err(ReconError)` only for fatal errors:
/// - Folder not found, not a directory, not readable
/// - pdfium cannot be bound
/// - Invalid configuration
pub async fn parse_folder(
    folder: impl AsRef<Path>,
    config: &ReconConfig,
) -> Result<StatementSet, ReconError> {
    let scan_start = Instant::now();
    let folder = folder.as_ref();
    info!("Scanning statements in {}", folder.display());

    let files = input::list_statement_files(folder, config)?;
    let total = files.len();
    if total == 0 {
        warn!("No .{} statements found in {}", config.extension, folder.display());
    }
    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_start(total);
    }

    let mut set = StatementSet {
        stats: ScanStats {
            total_documents: total,
            ..Default::default()
        },
        ..Default::default()
    };

    for (i, path) in files.into_iter().enumerate() {
        let index = i + 1;
        if let Some(ref cb) = config.progress_callback {
            cb.on_document_start(index, total, &path);
        }

        let doc_start = Instant::now();
        let parsed = match parse_document(&path, config).await {
            Ok(entry) => Ok(entry),
            Err(e) if e.is_fatal_for_scan() => return Err(e),
            Err(e) => Err(DocumentError::from_recon(path.clone(), &e)),
        };

        let mut outcome = DocumentOutcome {
            path: path.clone(),
            period: None,
            metric_count: 0,
            duration_ms: 0,
            error: None,
        };

        let recorded = parsed.and_then(|entry| {
            outcome.period = Some(entry.period);
            outcome.metric_count = entry.metrics.len();
            insert_statement(&mut set, entry, config.conflict_policy)
        });

        match recorded {
            Ok(()) => {
                set.stats.parsed_documents += 1;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_complete(index, total, outcome.metric_count);
                }
            }
            Err(e) => {
                warn!("Skipping {}", e);
                set.stats.failed_documents += 1;
                outcome.metric_count = 0;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_error(index, total, &e.to_string());
                }
                outcome.error = Some(e);
            }
        }

        outcome.duration_ms = doc_start.elapsed().as_millis() as u64;
        set.documents.push(outcome);
    }

    set.stats.total_duration_ms = scan_start.elapsed().as_millis() as u64;
    info!(
        "Scan complete: {}/{} statements, {} periods, {}ms",
        set.stats.parsed_documents,
        total,
        set.statements.len(),
        set.stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_complete(total, set.stats.parsed_documents);
    }

    Ok(set)
}

/// Parse a folder and write the resulting [`StatementSet`] as JSON.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn parse_folder_to_file(
    folder: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ReconConfig,
) -> Result<ScanStats, ReconError> {
    let set = parse_folder(folder, config).await?;
    write_json(output_path.as_ref(), &set).await?;
    Ok(set.stats)
}

/// Synchronous wrapper around [`parse_folder`].
///
/// Creates a temporary tokio runtime internally.
pub fn parse_folder_sync(
    folder: impl AsRef<Path>,
    config: &ReconConfig,
) -> Result<StatementSet, ReconError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ReconError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(parse_folder(folder, config))
}

/// Parse a single statement file.
///
/// The file is opened inside the blocking extraction task and closed when
/// that task returns, on success and failure alike.
pub async fn parse_document(
    path: impl AsRef<Path>,
    config: &ReconConfig,
) -> Result<StatementEntry, ReconError> {
    let path = path.as_ref().to_path_buf();
    debug!("Parsing {}", path.display());

    let source = resolve_source(config);
    let task_path = path.clone();
    let fragments = run_blocking(move || {
        let mut file = std::fs::File::open(&task_path).map_err(|e| open_error(&task_path, e))?;
        extract_fragments(source.as_ref(), &mut file)
    })
    .await?;

    let (period, metrics) = segment_document(&fragments, config)?;
    debug!(
        "{}: {} → {} metrics",
        path.display(),
        period,
        metrics.len()
    );
    Ok(StatementEntry {
        path,
        period,
        metrics,
    })
}

/// Parse a statement already held in memory.
///
/// The returned entry has an empty `path`.
///
/// # Example
/// ```rust,no_run
/// use statement_recon::{parse_document_bytes, ReconConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("statement.pdf")?;
/// let entry = parse_document_bytes(&bytes, &ReconConfig::default()).await?;
/// println!("{}: {} metrics", entry.period, entry.metrics.len());
/// # Ok(())
/// # }
/// ```
pub async fn parse_document_bytes(
    bytes: &[u8],
    config: &ReconConfig,
) -> Result<StatementEntry, ReconError> {
    let source = resolve_source(config);
    let bytes = bytes.to_vec();
    let fragments = run_blocking(move || {
        let mut reader = bytes.as_slice();
        extract_fragments(source.as_ref(), &mut reader)
    })
    .await?;

    let (period, metrics) = segment_document(&fragments, config)?;
    Ok(StatementEntry {
        path: PathBuf::new(),
        period,
        metrics,
    })
}

/// The pure core: period and metrics from one document's fragments.
///
/// Fragments containing the period marker are excluded from segmentation.
///
/// # Errors
/// - [`ReconError::DateFormat`] when no fragment holds a parseable period
/// - [`ReconError::DuplicateMetric`] under [`ConflictPolicy::Strict`]
pub fn segment_document(
    fragments: &[TextFragment],
    config: &ReconConfig,
) -> Result<(DateRange, MetricMap), ReconError> {
    let (period, rest) = extract_period(fragments, &config.period_marker, config.period_format)?;
    let metrics = Segmenter::from_config(config).segment(rest)?;
    Ok((period, metrics))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Use the configured source, or a pdfium source with the configured password.
fn resolve_source(config: &ReconConfig) -> Arc<dyn FragmentSource> {
    match config.fragment_source {
        Some(ref source) => Arc::clone(source),
        None => Arc::new(PdfiumSource::new(config.password.clone())),
    }
}

/// Extract and flatten every page of one document.
fn extract_fragments(
    source: &dyn FragmentSource,
    reader: &mut dyn Read,
) -> Result<Vec<TextFragment>, ReconError> {
    let pages = source.extract(reader)?;
    Ok(pages.into_iter().flat_map(|p| p.fragments).collect())
}

async fn run_blocking<T, F>(f: F) -> Result<T, ReconError>
where
    F: FnOnce() -> Result<T, ReconError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ReconError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn open_error(path: &Path, e: std::io::Error) -> ReconError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        ReconError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        ReconError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    }
}

/// Merge one statement into the set under `policy`.
///
/// A repeated period is overwritten (and counted) with
/// [`ConflictPolicy::LastWriteWins`]; with [`ConflictPolicy::Strict`] the
/// earlier statement is kept and the new document is rejected.
fn insert_statement(
    set: &mut StatementSet,
    entry: StatementEntry,
    policy: ConflictPolicy,
) -> Result<(), DocumentError> {
    let StatementEntry {
        path,
        period,
        metrics,
    } = entry;

    match policy.insert(&mut set.statements, period, metrics) {
        Ok(None) => Ok(()),
        Ok(Some(_)) => {
            warn!(
                "{} repeats period {}; its statement replaces the earlier one",
                path.display(),
                period
            );
            set.stats.overwritten_periods += 1;
            Ok(())
        }
        Err((period, _, _)) => {
            let first = set
                .documents
                .iter()
                .find(|d| d.period == Some(period) && d.error.is_none())
                .map(|d| d.path.display().to_string())
                .unwrap_or_else(|| "an earlier document".to_string());
            Err(DocumentError::Conflict {
                path,
                detail: format!("period {} already read from {}", period, first),
            })
        }
    }
}
