//! End-to-end integration tests for statement-recon.
//!
//! Most tests drive the whole folder pipeline with an in-test
//! [`FragmentSource`] that reads fragments from JSON files, so they run
//! without pdfium. Tests that need real statement PDFs in `./test_cases/`
//! and a pdfium library are gated behind the `E2E_ENABLED` environment
//! variable.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture
//!
//! Including the pdfium-backed tests:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture

use futures::StreamExt;
use serde_json::{json, Value};
use statement_recon::{
    fetch_reports, parse_document, parse_folder, parse_folder_stream, parse_folder_sync,
    parse_folder_to_file, reconcile, BBox, ConflictPolicy, DateRange, DocumentError,
    FragmentSource, PageFragments, ReconConfig, ReconError, ReconProgressCallback, ReportApi,
    TextFragment,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

const JAN: &str = "Account activity from Jan 1, 2024 00:00 PST to Jan 31, 2024 23:59 PST";
const FEB: &str = "Account activity from Feb 1, 2024 00:00 PST to Feb 29, 2024 23:59 PST";

/// Reads a JSON array of [`TextFragment`]s instead of a PDF.
struct JsonSource;

impl FragmentSource for JsonSource {
    fn extract(&self, reader: &mut dyn Read) -> Result<Vec<PageFragments>, ReconError> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| ReconError::CorruptPdf {
                detail: e.to_string(),
            })?;
        let fragments: Vec<TextFragment> =
            serde_json::from_str(&text).map_err(|e| ReconError::CorruptPdf {
                detail: e.to_string(),
            })?;
        Ok(vec![PageFragments {
            page_index: 0,
            fragments,
        }])
    }
}

/// Always fails as if no pdfium library were installed.
struct UnboundSource;

impl FragmentSource for UnboundSource {
    fn extract(&self, _reader: &mut dyn Read) -> Result<Vec<PageFragments>, ReconError> {
        Err(ReconError::PdfiumBindingFailed("libpdfium.so: not found".into()))
    }
}

fn frag(x0: f64, y0: f64, x1: f64, y1: f64, text: &str) -> TextFragment {
    TextFragment::new(BBox::new(x0, y0, x1, y1), text)
}

/// A statement whose rows are label at x=0 and value at x=20.
fn statement(period: &str, rows: &[(f64, &str, &str)]) -> Vec<TextFragment> {
    let mut out = vec![frag(0.0, 50.0, 10.0, 60.0, period)];
    for &(y0, label, value) in rows {
        out.push(frag(0.0, y0, 10.0, y0 + 10.0, label));
        out.push(frag(20.0, y0, 30.0, y0 + 10.0, value));
    }
    out
}

fn write_statement(dir: &Path, name: &str, fragments: &[TextFragment]) {
    let json = serde_json::to_vec(fragments).unwrap();
    std::fs::write(dir.join(name), json).unwrap();
}

/// Route library logs to the test harness; `RUST_LOG=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn json_config() -> ReconConfig {
    init_tracing();
    ReconConfig::builder()
        .fragment_source(Arc::new(JsonSource))
        .build()
        .unwrap()
}

fn period(s: &str) -> DateRange {
    s.parse().unwrap()
}

fn jan() -> DateRange {
    period("2024-01-01..2024-01-31")
}

fn feb() -> DateRange {
    period("2024-02-01..2024-02-29")
}

// ── Folder pipeline ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_statement_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(
        dir.path(),
        "jan.pdf",
        &[
            frag(0.0, 100.0, 10.0, 110.0, "Total Revenue"),
            frag(20.0, 100.0, 30.0, 110.0, "10,500.00"),
            frag(0.0, 50.0, 10.0, 60.0, JAN),
        ],
    );

    let set = parse_folder(dir.path(), &json_config()).await.unwrap();

    assert_eq!(set.statements.len(), 1);
    let metrics = set.metrics(&jan()).expect("january statement");
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics["Total Revenue"], 10500.0);
    assert_eq!(set.stats.parsed_documents, 1);
    assert_eq!(set.stats.failed_documents, 0);
}

#[tokio::test]
async fn test_short_period_phrase_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(
        dir.path(),
        "jan.pdf",
        &statement(
            "Account activity from Jan 1, 2024 to Jan 31, 2024",
            &[(100.0, "Refunds", "-120.00")],
        ),
    );

    let set = parse_folder(dir.path(), &json_config()).await.unwrap();
    assert_eq!(set.metrics(&jan()).unwrap()["Refunds"], -120.0);
}

#[tokio::test]
async fn test_split_row_is_merged() {
    let dir = tempfile::tempdir().unwrap();
    let fragments = vec![
        frag(0.0, 50.0, 10.0, 60.0, JAN),
        frag(0.0, 200.0, 10.0, 210.0, "Selling fees"),
        frag(20.0, 200.9, 30.0, 210.9, "-1,250.40"),
    ];
    write_statement(dir.path(), "jan.pdf", &fragments);

    let set = parse_folder(dir.path(), &json_config()).await.unwrap();
    assert_eq!(set.metrics(&jan()).unwrap()["Selling fees"], -1250.40);
}

#[tokio::test]
async fn test_duplicate_metric_last_row_wins() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(
        dir.path(),
        "jan.pdf",
        &statement(JAN, &[(100.0, "Refunds", "10.00"), (200.0, "Refunds", "20.00")]),
    );

    let set = parse_folder(dir.path(), &json_config()).await.unwrap();
    assert_eq!(set.metrics(&jan()).unwrap()["Refunds"], 20.0);
    assert_eq!(set.stats.failed_documents, 0);
}

#[tokio::test]
async fn test_strict_rejects_duplicate_metric() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(
        dir.path(),
        "jan.pdf",
        &statement(JAN, &[(100.0, "Refunds", "10.00"), (200.0, "Refunds", "20.00")]),
    );
    write_statement(
        dir.path(),
        "feb.pdf",
        &statement(FEB, &[(100.0, "Refunds", "5.00")]),
    );

    let config = ReconConfig::builder()
        .fragment_source(Arc::new(JsonSource))
        .conflict_policy(ConflictPolicy::Strict)
        .build()
        .unwrap();
    let set = parse_folder(dir.path(), &config).await.unwrap();

    assert_eq!(set.periods(), vec![feb()]);
    let outcome = set.outcome(&dir.path().join("jan.pdf")).unwrap();
    assert!(matches!(outcome.error, Some(DocumentError::Conflict { .. })));
    assert_eq!(set.stats.failed_documents, 1);

    let err = set.into_result().unwrap_err();
    assert!(matches!(err, ReconError::PartialFailure { failed: 1, .. }));
}

#[tokio::test]
async fn test_repeated_period_later_file_wins() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(dir.path(), "a.pdf", &statement(JAN, &[(100.0, "Sales", "1.00")]));
    write_statement(dir.path(), "b.pdf", &statement(JAN, &[(100.0, "Sales", "2.00")]));

    let set = parse_folder(dir.path(), &json_config()).await.unwrap();
    assert_eq!(set.metrics(&jan()).unwrap()["Sales"], 2.0);
    assert_eq!(set.stats.overwritten_periods, 1);
    assert_eq!(set.stats.parsed_documents, 2);
}

#[tokio::test]
async fn test_strict_repeated_period_keeps_first_file() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(dir.path(), "a.pdf", &statement(JAN, &[(100.0, "Sales", "1.00")]));
    write_statement(dir.path(), "b.pdf", &statement(JAN, &[(100.0, "Sales", "2.00")]));

    let config = ReconConfig::builder()
        .fragment_source(Arc::new(JsonSource))
        .conflict_policy(ConflictPolicy::Strict)
        .build()
        .unwrap();
    let set = parse_folder(dir.path(), &config).await.unwrap();

    assert_eq!(set.metrics(&jan()).unwrap()["Sales"], 1.0);
    let rejected = set.outcome(&dir.path().join("b.pdf")).unwrap();
    assert!(matches!(rejected.error, Some(DocumentError::Conflict { .. })));
}

#[tokio::test]
async fn test_skip_rules() {
    let dir = tempfile::tempdir().unwrap();
    let doc = statement(JAN, &[(100.0, "Sales", "1.00")]);
    write_statement(dir.path(), "jan.PDF", &doc);
    write_statement(dir.path(), "~jan.pdf", &doc);
    write_statement(dir.path(), "jan.json", &doc);
    std::fs::create_dir(dir.path().join("archive.pdf")).unwrap();

    let set = parse_folder(dir.path(), &json_config()).await.unwrap();
    assert_eq!(set.stats.total_documents, 1);
    assert_eq!(set.documents[0].path, dir.path().join("jan.PDF"));
}

#[tokio::test]
async fn test_document_without_period_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(
        dir.path(),
        "a.pdf",
        &[
            frag(0.0, 100.0, 10.0, 110.0, "Total Revenue"),
            frag(20.0, 100.0, 30.0, 110.0, "10.00"),
        ],
    );
    write_statement(dir.path(), "b.pdf", &statement(FEB, &[(100.0, "Sales", "3.00")]));
    std::fs::write(dir.path().join("c.pdf"), b"not json at all").unwrap();

    let set = parse_folder(dir.path(), &json_config()).await.unwrap();

    assert_eq!(set.periods(), vec![feb()]);
    assert_eq!(set.stats.failed_documents, 2);
    let kinds: Vec<_> = set.documents.iter().map(|d| d.error.clone()).collect();
    assert!(matches!(kinds[0], Some(DocumentError::PeriodUnrecoverable { .. })));
    assert!(kinds[1].is_none());
    assert!(matches!(kinds[2], Some(DocumentError::Unreadable { .. })));
}

#[tokio::test]
async fn test_missing_folder_is_fatal() {
    let err = parse_folder("/definitely/not/a/folder", &json_config())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconError::FolderNotFound { .. }));
}

#[tokio::test]
async fn test_binding_failure_aborts_scan() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(dir.path(), "a.pdf", &statement(JAN, &[]));
    write_statement(dir.path(), "b.pdf", &statement(FEB, &[]));

    let config = ReconConfig::builder()
        .fragment_source(Arc::new(UnboundSource))
        .build()
        .unwrap();
    let err = parse_folder(dir.path(), &config).await.unwrap_err();
    assert!(matches!(err, ReconError::PdfiumBindingFailed(_)));
}

#[tokio::test]
async fn test_stop_list_hides_boilerplate() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(
        dir.path(),
        "jan.pdf",
        &statement(JAN, &[(100.0, "Page", "1"), (200.0, "Sales", "7.00")]),
    );

    let config = ReconConfig::builder()
        .fragment_source(Arc::new(JsonSource))
        .stop_item("Page")
        .build()
        .unwrap();
    let set = parse_folder(dir.path(), &config).await.unwrap();
    let metrics = set.metrics(&jan()).unwrap();
    assert!(!metrics.contains_key("Page"));
    assert_eq!(metrics["Sales"], 7.0);
}

#[tokio::test]
async fn test_parse_document_single_file() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(dir.path(), "jan.pdf", &statement(JAN, &[(100.0, "Sales", "1,000")]));

    let entry = parse_document(dir.path().join("jan.pdf"), &json_config())
        .await
        .unwrap();
    assert_eq!(entry.period, jan());
    assert_eq!(entry.metrics["Sales"], 1000.0);
    assert_eq!(entry.path, dir.path().join("jan.pdf"));
}

#[test]
fn test_parse_folder_sync() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(dir.path(), "jan.pdf", &statement(JAN, &[(100.0, "Sales", "1.00")]));

    let set = parse_folder_sync(dir.path(), &json_config()).unwrap();
    assert_eq!(set.periods(), vec![jan()]);
}

#[tokio::test]
async fn test_parse_folder_to_file_writes_json() {
    let dir = tempfile::tempdir().unwrap();
    let statements = dir.path().join("in");
    std::fs::create_dir(&statements).unwrap();
    write_statement(&statements, "jan.pdf", &statement(JAN, &[(100.0, "Sales", "1.50")]));

    let out = dir.path().join("out/statements.json");
    let stats = parse_folder_to_file(&statements, &out, &json_config())
        .await
        .unwrap();
    assert_eq!(stats.parsed_documents, 1);

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(
        written["statements"]["2024-01-01..2024-01-31"]["Sales"],
        json!(1.5)
    );
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stream_yields_documents_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(dir.path(), "2-feb.pdf", &statement(FEB, &[(100.0, "Sales", "2.00")]));
    write_statement(dir.path(), "1-jan.pdf", &statement(JAN, &[(100.0, "Sales", "1.00")]));
    std::fs::write(dir.path().join("3-bad.pdf"), b"[{").unwrap();

    let items: Vec<_> = parse_folder_stream(dir.path(), &json_config())
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_ref().unwrap().period, jan());
    assert_eq!(items[1].as_ref().unwrap().period, feb());
    let err = items[2].as_ref().unwrap_err();
    assert_eq!(err.path(), dir.path().join("3-bad.pdf"));
}

#[tokio::test]
async fn test_stream_ends_after_binding_failure() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(dir.path(), "a.pdf", &statement(JAN, &[]));
    write_statement(dir.path(), "b.pdf", &statement(FEB, &[]));
    write_statement(dir.path(), "c.pdf", &statement(FEB, &[]));

    let config = ReconConfig::builder()
        .fragment_source(Arc::new(UnboundSource))
        .build()
        .unwrap();
    let items: Vec<_> = parse_folder_stream(dir.path(), &config)
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 1);
    let err = items[0].as_ref().unwrap_err();
    assert_eq!(err.path(), dir.path().join("a.pdf"));
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    finished_with: AtomicUsize,
}

impl ReconProgressCallback for Counting {
    fn on_document_start(&self, _index: usize, _total: usize, _path: &Path) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_document_complete(&self, _index: usize, _total: usize, _metric_count: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_document_error(&self, _index: usize, _total: usize, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_scan_complete(&self, _total: usize, parsed: usize) {
        self.finished_with.store(parsed, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_progress_callback_sees_every_document() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(dir.path(), "a.pdf", &statement(JAN, &[(100.0, "Sales", "1.00")]));
    std::fs::write(dir.path().join("b.pdf"), b"garbage").unwrap();

    let counter = Arc::new(Counting::default());
    let config = ReconConfig::builder()
        .fragment_source(Arc::new(JsonSource))
        .progress_callback(counter.clone() as Arc<dyn ReconProgressCallback>)
        .build()
        .unwrap();
    parse_folder(dir.path(), &config).await.unwrap();

    assert_eq!(counter.started.load(Ordering::SeqCst), 2);
    assert_eq!(counter.completed.load(Ordering::SeqCst), 1);
    assert_eq!(counter.failed.load(Ordering::SeqCst), 1);
    assert_eq!(counter.finished_with.load(Ordering::SeqCst), 1);
}

#[test]
fn test_callback_and_config_are_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ReconConfig>();
    assert_send_sync::<Counting>();
}

// ── Reconciliation ───────────────────────────────────────────────────────────

/// Serves a canned report per period; periods without one fail.
struct CannedReports(Vec<(DateRange, Value)>);

#[async_trait::async_trait]
impl ReportApi for CannedReports {
    async fn fetch_report(
        &self,
        _marketplace_id: &str,
        period: &DateRange,
    ) -> Result<Value, ReconError> {
        self.0
            .iter()
            .find(|(p, _)| p == period)
            .map(|(_, report)| report.clone())
            .ok_or(ReconError::ReportNotCreated {
                period: *period,
                status: 404,
            })
    }
}

fn remote_report(revenue: f64, refunds: f64) -> Value {
    json!({
        "marketplaces": [{
            "data": {
                "Income": {
                    "Total Revenue": [{"value": revenue}],
                    "Refunds": [{"value": refunds}]
                },
                "Amazon Expenses": {
                    "FBA fees": [{"value": -10.0}]
                }
            }
        }]
    })
}

#[tokio::test]
async fn test_reconcile_against_remote_reports() {
    let dir = tempfile::tempdir().unwrap();
    write_statement(
        dir.path(),
        "jan.pdf",
        &statement(
            JAN,
            &[(100.0, "Total Revenue", "10,500.00"), (200.0, "Refunds", "-120.00")],
        ),
    );
    write_statement(
        dir.path(),
        "feb.pdf",
        &statement(FEB, &[(100.0, "Total Revenue", "900.00")]),
    );
    write_statement(
        dir.path(),
        "mar.pdf",
        &statement(
            "Account activity from Mar 1, 2024 00:00 PST to Mar 31, 2024 23:59 PST",
            &[(100.0, "Total Revenue", "1.00")],
        ),
    );

    let config = json_config();
    let local = parse_folder(dir.path(), &config).await.unwrap();
    assert_eq!(local.statements.len(), 3);

    let api = CannedReports(vec![
        (jan(), remote_report(10500.0, -120.001)),
        (feb(), remote_report(950.0, 0.0)),
    ]);
    let remote = fetch_reports(&api, "3", &local.periods()).await;
    assert_eq!(remote.reports.len(), 2);
    assert_eq!(remote.failures.len(), 1);

    let result = reconcile(&local, &remote, &config);
    assert_eq!(result.periods.len(), 3);

    let january = &result.periods[0];
    assert_eq!(january.period, jan());
    assert!(january.is_clean(), "{january:?}");
    assert_eq!(january.compared, 2);
    assert_eq!(january.remote_only, vec!["FBA fees"]);

    let february = &result.periods[1];
    assert_eq!(february.mismatches.len(), 1);
    assert_eq!(february.mismatches[0].name, "Total Revenue");
    assert_eq!(february.mismatches[0].difference(), -50.0);

    let march = &result.periods[2];
    assert!(!march.remote_available);

    assert!(!result.is_clean());
    assert_eq!(result.mismatch_count(), 1);
    assert_eq!(result.missing_reports().count(), 1);
}

// ── Real PDFs (pdfium) ───────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* nothing exists at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test statements not found: {}", p.display());
            return;
        }
        p
    }};
}

#[tokio::test]
async fn test_pdfium_statement_folder() {
    let folder = e2e_skip_unless_ready!(test_cases_dir());

    let set = parse_folder(&folder, &ReconConfig::default())
        .await
        .expect("scan should succeed when pdfium is available");

    for outcome in &set.documents {
        println!(
            "{}: {:?} {} metrics {}ms",
            outcome.path.display(),
            outcome.period.map(|p| p.to_string()),
            outcome.metric_count,
            outcome.duration_ms
        );
    }
    assert!(set.stats.parsed_documents > 0, "no statement parsed");
    for metrics in set.statements.values() {
        assert!(!metrics.is_empty(), "statement without metrics");
    }
}

#[tokio::test]
async fn test_pdfium_rejects_non_pdf() {
    let _ = e2e_skip_unless_ready!(test_cases_dir());

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("fake.pdf"), b"PK\x03\x04 zip archive").unwrap();
    let set = parse_folder(dir.path(), &ReconConfig::default()).await.unwrap();
    assert!(matches!(
        set.documents[0].error,
        Some(DocumentError::Unreadable { .. })
    ));
}
