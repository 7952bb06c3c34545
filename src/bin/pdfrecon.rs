//! CLI binary for statement-recon.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ReconConfig`, runs the scan (and the remote comparison when a
//! marketplace is given) and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use statement_recon::output::write_json;
use statement_recon::{
    fetch_remote_reports, parse_folder, reconcile, ConflictPolicy, PeriodFormat,
    ProgressCallback, ReconConfig, ReconProgressCallback, Reconciliation, RemoteReports,
    StatementSet,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a bar over the statement folder plus one log
/// line per document.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} statements  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Parsing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ReconProgressCallback for CliProgressCallback {
    fn on_scan_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Parsing {total_documents} statements…"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_message(name);
    }

    fn on_document_complete(&self, index: usize, total: usize, metric_count: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            index,
            total,
            dim(&format!("{metric_count:>3} metrics")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let first_line = error.lines().next().unwrap_or(error);
        let msg = if first_line.chars().count() > 100 {
            let cut: String = first_line.chars().take(99).collect();
            format!("{cut}\u{2026}")
        } else {
            first_line.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_scan_complete(&self, total_documents: usize, parsed: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} statements parsed",
                green("✔"),
                bold(&parsed.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} statements parsed  ({} skipped)",
                if parsed == 0 { red("✘") } else { yellow("⚠") },
                bold(&parsed.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse a folder of statements and print the metrics per period
  pdfrecon statements/ --local-only

  # Reconcile against the reporting API for marketplace 3
  RECON_API_TOKEN=eyJ... pdfrecon statements/ --marketplace 3

  # Strict mode: reject documents with repeated metrics or periods
  pdfrecon statements/ --marketplace 3 --strict

  # Ignore boilerplate fragments listed in a file (one per line)
  pdfrecon statements/ --stop-list boilerplate.txt --local-only

  # Machine-readable output
  pdfrecon statements/ --marketplace 3 --json > recon.json

EXIT STATUS:
  0  every period reconciled cleanly (or --local-only succeeded)
  1  mismatches, missing remote reports, or skipped statements in --strict mode

ENVIRONMENT VARIABLES:
  RECON_API_TOKEN     Token sent as "Authorization: JWT <token>"
  RECON_API_URL       Cached-reports endpoint (default: sellermetrix v2)
  RECON_MARKETPLACE   Marketplace id to reconcile against
  PDFIUM_LIB_PATH     Path to libpdfium (file or directory)
  RUST_LOG            Override log filter (e.g. statement_recon=debug)
"#;

/// Extract statement metrics from PDFs and reconcile them with remote reports.
#[derive(Parser, Debug)]
#[command(
    name = "pdfrecon",
    version,
    about = "Extract statement metrics from PDFs and reconcile them with remote reports",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder containing the statement PDFs.
    folder: PathBuf,

    /// Marketplace id used for the remote reports.
    #[arg(short, long, env = "RECON_MARKETPLACE")]
    marketplace: Option<String>,

    /// Only parse the statements; do not contact the reporting API.
    #[arg(long, env = "RECON_LOCAL_ONLY")]
    local_only: bool,

    /// Cached-reports endpoint (with trailing slash).
    #[arg(long, env = "RECON_API_URL")]
    api_url: Option<String>,

    /// API token, sent as `Authorization: JWT <token>`.
    #[arg(long, env = "RECON_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Per-request timeout and polling window in seconds.
    #[arg(long, env = "RECON_TIMEOUT", default_value_t = 10)]
    timeout: u64,

    /// Delay between report status polls in milliseconds.
    #[arg(long, env = "RECON_POLL_INTERVAL_MS", default_value_t = 200)]
    poll_interval_ms: u64,

    /// Absolute difference under which two values are equal.
    #[arg(long, env = "RECON_TOLERANCE", default_value_t = 0.005)]
    tolerance: f64,

    /// Max y0 distance (points) for joining single-fragment lines.
    #[arg(long, env = "RECON_MERGE_TOLERANCE", default_value_t = 1.15)]
    merge_tolerance: f64,

    /// Reject repeated metric names and repeated periods instead of
    /// letting the later one win.
    #[arg(long, env = "RECON_STRICT")]
    strict: bool,

    /// File with fragment texts to ignore, one per line.
    #[arg(long, env = "RECON_STOP_LIST")]
    stop_list: Option<PathBuf>,

    /// Text that marks the statement-period fragment.
    #[arg(long, env = "RECON_PERIOD_MARKER")]
    marker: Option<String>,

    /// Period parser: positional, pattern or auto.
    #[arg(long, env = "RECON_PERIOD_FORMAT", value_enum, default_value = "auto")]
    period_format: PeriodFormatArg,

    /// PDF user password for encrypted statements.
    #[arg(long, env = "RECON_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Output structured JSON instead of a text summary.
    #[arg(long, env = "RECON_JSON")]
    json: bool,

    /// Also write the JSON result to this file.
    #[arg(short, long, env = "RECON_OUTPUT")]
    output: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "RECON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RECON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RECON_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum PeriodFormatArg {
    Positional,
    Pattern,
    Auto,
}

impl From<PeriodFormatArg> for PeriodFormat {
    fn from(v: PeriodFormatArg) -> Self {
        match v {
            PeriodFormatArg::Positional => PeriodFormat::Positional,
            PeriodFormatArg::Pattern => PeriodFormat::Pattern,
            PeriodFormatArg::Auto => PeriodFormat::Auto,
        }
    }
}

/// Everything a run produced, as written by `--json` / `--output`.
#[derive(Serialize)]
struct RunReport<'a> {
    statements: &'a StatementSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote: Option<&'a RemoteReports>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reconciliation: Option<&'a Reconciliation>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ReconProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Parse statements ─────────────────────────────────────────────────
    let local = parse_folder(&cli.folder, &config)
        .await
        .context("Statement scan failed")?;

    let strict_failure = cli.strict && local.stats.failed_documents > 0;

    let marketplace = match (cli.local_only, cli.marketplace.as_deref()) {
        (false, Some(m)) => Some(m),
        (false, None) => {
            if !cli.quiet {
                eprintln!(
                    "{} no --marketplace given; showing local statements only",
                    yellow("⚠")
                );
            }
            None
        }
        (true, _) => None,
    };

    let Some(marketplace) = marketplace else {
        emit(&cli, &RunReport {
            statements: &local,
            remote: None,
            reconciliation: None,
        })
        .await?;
        if !cli.json && !cli.quiet {
            print_statements(&local);
        }
        return Ok(exit_code(!strict_failure));
    };

    // ── Remote reports + reconciliation ──────────────────────────────────
    let spinner = (!cli.quiet && show_progress).then(|| {
        let s = ProgressBar::new_spinner();
        s.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        s.set_prefix("Fetching");
        s.set_message(format!("{} remote reports…", local.statements.len()));
        s.enable_steady_tick(Duration::from_millis(80));
        s
    });

    let remote = fetch_remote_reports(&config, marketplace, &local.periods())
        .await
        .context("Could not set up the report client")?;
    if let Some(s) = spinner {
        s.finish_and_clear();
    }

    let result = reconcile(&local, &remote, &config);
    emit(&cli, &RunReport {
        statements: &local,
        remote: Some(&remote),
        reconciliation: Some(&result),
    })
    .await?;
    if !cli.json && !cli.quiet {
        print_reconciliation(&result, &remote);
    }

    Ok(exit_code(result.is_clean() && !strict_failure))
}

/// Map CLI args to `ReconConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ReconConfig> {
    let mut builder = ReconConfig::builder()
        .merge_tolerance(cli.merge_tolerance)
        .value_tolerance(cli.tolerance)
        .period_format(cli.period_format.clone().into())
        .api_timeout_secs(cli.timeout)
        .poll_interval_ms(cli.poll_interval_ms)
        .conflict_policy(if cli.strict {
            ConflictPolicy::Strict
        } else {
            ConflictPolicy::LastWriteWins
        });

    if let Some(ref path) = cli.stop_list {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read stop list from {:?}", path))?;
        builder = builder.stop_list(parse_stop_list(&text));
    }
    if let Some(ref marker) = cli.marker {
        builder = builder.period_marker(marker.clone());
    }
    if let Some(ref url) = cli.api_url {
        builder = builder.api_url(url.clone());
    }
    if let Some(ref token) = cli.api_token {
        builder = builder.api_token(token.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// One entry per non-empty line; surrounding whitespace is part of the entry
/// except for the line terminator.
fn parse_stop_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

async fn emit(cli: &Cli, report: &RunReport<'_>) -> Result<()> {
    if let Some(ref path) = cli.output {
        write_json(path, report)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    }
    if cli.json {
        let json = serde_json::to_string_pretty(report).context("Failed to serialise output")?;
        println!("{json}");
    }
    Ok(())
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_statements(set: &StatementSet) {
    for (period, metrics) in &set.statements {
        println!("{} {}", cyan("◆"), bold(&period.to_string()));
        let width = metrics.keys().map(|k| k.chars().count()).max().unwrap_or(0);
        for (name, value) in metrics {
            println!("  {:<width$}  {:>14.2}", name, value, width = width);
        }
    }
    for failure in set.failures() {
        println!("{} {}", red("✗"), failure);
    }
}

fn print_reconciliation(result: &Reconciliation, remote: &RemoteReports) {
    for period in &result.periods {
        let status = if !period.remote_available {
            red("no remote report")
        } else if period.mismatches.is_empty() {
            green("✓ clean")
        } else {
            red(&format!("✗ {} mismatches", period.mismatches.len()))
        };
        println!(
            "{} {}  {}  {}",
            cyan("◆"),
            bold(&period.period.to_string()),
            dim(&format!("{} compared", period.compared)),
            status
        );

        for diff in &period.mismatches {
            println!(
                "  {} {}  local {:.2}  remote {:.2}  {}",
                red("✗"),
                diff.name,
                diff.local,
                diff.remote,
                dim(&format!("Δ {:+.2}", diff.difference())),
            );
        }
        if !period.local_only.is_empty() {
            println!("  {} {}", dim("local only: "), period.local_only.join(", "));
        }
        if period.remote_available && !period.remote_only.is_empty() {
            println!("  {} {}", dim("remote only:"), period.remote_only.join(", "));
        }
    }

    for (period, reason) in &remote.failures {
        eprintln!("{} {}: {}", yellow("⚠"), period, reason.lines().next().unwrap_or(reason));
    }

    let mismatches = result.mismatch_count();
    let missing = result.missing_reports().count();
    if result.is_clean() {
        eprintln!("{} {} periods reconciled", green("✔"), result.periods.len());
    } else {
        eprintln!(
            "{} {} mismatches, {} periods without remote report",
            red("✘"),
            mismatches,
            missing
        );
    }
}
