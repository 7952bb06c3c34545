//! Configuration types for statement parsing and reconciliation.
//!
//! All behaviour is controlled through [`ReconConfig`], built via its
//! [`ReconConfigBuilder`]. One struct covers the folder scan, the segmenter
//! knobs and the remote report client, so a run can be logged and diffed as a
//! single value.

use crate::error::ReconError;
use crate::pipeline::extract::FragmentSource;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Maximum y0 distance (points) at which two single-fragment lines are
/// treated as one row split by baseline drift.
pub const DEFAULT_MERGE_TOLERANCE: f64 = 1.15;

/// Phrase that identifies the statement-period fragment.
pub const DEFAULT_PERIOD_MARKER: &str = "Account activity from";

/// Cached-reports endpoint of the remote reporting API.
pub const DEFAULT_REPORT_URL: &str = "https://sellermetrix.com/api/v2/cached-reports/";

/// Report categories whose metrics are compared.
pub const DEFAULT_REPORT_CATEGORIES: [&str; 3] = ["Income", "Expenses", "Amazon Expenses"];

/// Configuration for a statement scan and reconciliation.
///
/// Built via [`ReconConfig::builder()`] or using [`ReconConfig::default()`].
///
/// # Example
/// ```rust
/// use statement_recon::{ConflictPolicy, ReconConfig};
///
/// let config = ReconConfig::builder()
///     .merge_tolerance(1.5)
///     .conflict_policy(ConflictPolicy::Strict)
///     .stop_item("Page 1 of 2")
///     .build()
///     .unwrap();
/// assert!(config.stop_list.contains("Page 1 of 2"));
/// ```
#[derive(Clone)]
pub struct ReconConfig {
    /// File extension of statement documents, without the dot. Default: `pdf`.
    pub extension: String,

    /// Files whose name starts with this prefix are skipped. Default: `~`.
    ///
    /// Office suites and some sync clients leave `~name.pdf` lock/temp files
    /// next to the real statements.
    pub skip_prefix: String,

    /// Text that marks the statement-period fragment.
    pub period_marker: String,

    /// Which period parser to use. Default: [`PeriodFormat::Auto`].
    pub period_format: PeriodFormat,

    /// Exact fragment texts that are boilerplate, never metrics.
    pub stop_list: BTreeSet<String>,

    /// Line-merge tolerance in points. Default: [`DEFAULT_MERGE_TOLERANCE`].
    ///
    /// Compared against rounded y0 values in hundredths of a point, so 1.15
    /// merges `100.00` with `101.15` but not with `101.16`.
    pub merge_tolerance: f64,

    /// What to do when a metric name or statement period repeats.
    pub conflict_policy: ConflictPolicy,

    /// PDF user password for encrypted statements.
    pub password: Option<String>,

    /// Pre-constructed fragment source. If None, a pdfium source is used.
    pub fragment_source: Option<Arc<dyn FragmentSource>>,

    /// Per-document progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Base URL of the cached-reports endpoint (trailing slash expected).
    pub api_url: String,

    /// Token sent as `Authorization: JWT <token>`.
    pub api_token: Option<String>,

    /// Per-request timeout, also the polling window per report. Default: 10.
    pub api_timeout_secs: u64,

    /// Delay between report status polls. Default: 200.
    pub poll_interval_ms: u64,

    /// Remote report categories read by the reconciler.
    pub report_categories: Vec<String>,

    /// Absolute difference under which two values count as equal. Default: 0.005.
    pub value_tolerance: f64,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            extension: "pdf".to_string(),
            skip_prefix: "~".to_string(),
            period_marker: DEFAULT_PERIOD_MARKER.to_string(),
            period_format: PeriodFormat::default(),
            stop_list: BTreeSet::new(),
            merge_tolerance: DEFAULT_MERGE_TOLERANCE,
            conflict_policy: ConflictPolicy::default(),
            password: None,
            fragment_source: None,
            progress_callback: None,
            api_url: DEFAULT_REPORT_URL.to_string(),
            api_token: None,
            api_timeout_secs: 10,
            poll_interval_ms: 200,
            report_categories: DEFAULT_REPORT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            value_tolerance: 0.005,
        }
    }
}

impl fmt::Debug for ReconConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconConfig")
            .field("extension", &self.extension)
            .field("skip_prefix", &self.skip_prefix)
            .field("period_marker", &self.period_marker)
            .field("period_format", &self.period_format)
            .field("stop_list", &self.stop_list.len())
            .field("merge_tolerance", &self.merge_tolerance)
            .field("conflict_policy", &self.conflict_policy)
            .field(
                "fragment_source",
                &self.fragment_source.as_ref().map(|_| "<dyn FragmentSource>"),
            )
            .field("api_url", &self.api_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("report_categories", &self.report_categories)
            .field("value_tolerance", &self.value_tolerance)
            .finish()
    }
}

impl ReconConfig {
    /// Create a new builder for `ReconConfig`.
    pub fn builder() -> ReconConfigBuilder {
        ReconConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ReconConfig`].
#[derive(Debug)]
pub struct ReconConfigBuilder {
    config: ReconConfig,
}

impl ReconConfigBuilder {
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.config.extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn skip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.skip_prefix = prefix.into();
        self
    }

    pub fn period_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.period_marker = marker.into();
        self
    }

    pub fn period_format(mut self, format: PeriodFormat) -> Self {
        self.config.period_format = format;
        self
    }

    pub fn stop_list<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.stop_list = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn stop_item(mut self, item: impl Into<String>) -> Self {
        self.config.stop_list.insert(item.into());
        self
    }

    pub fn merge_tolerance(mut self, points: f64) -> Self {
        self.config.merge_tolerance = points;
        self
    }

    pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.config.conflict_policy = policy;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn fragment_source(mut self, source: Arc<dyn FragmentSource>) -> Self {
        self.config.fragment_source = Some(source);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.config.api_token = Some(token.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(10);
        self
    }

    pub fn report_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.report_categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn value_tolerance(mut self, tolerance: f64) -> Self {
        self.config.value_tolerance = tolerance;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ReconConfig, ReconError> {
        let c = &self.config;
        if !c.merge_tolerance.is_finite() || c.merge_tolerance < 0.0 {
            return Err(ReconError::InvalidConfig(format!(
                "Merge tolerance must be a finite number ≥ 0, got {}",
                c.merge_tolerance
            )));
        }
        if !c.value_tolerance.is_finite() || c.value_tolerance < 0.0 {
            return Err(ReconError::InvalidConfig(format!(
                "Value tolerance must be a finite number ≥ 0, got {}",
                c.value_tolerance
            )));
        }
        if c.extension.is_empty() {
            return Err(ReconError::InvalidConfig("Extension must not be empty".into()));
        }
        if c.period_marker.trim().is_empty() {
            return Err(ReconError::InvalidConfig("Period marker must not be empty".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(ReconError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which parser reads the statement-period phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PeriodFormat {
    /// Fixed word offsets (start at words 3–5, end at words 9–11).
    Positional,
    /// Regex over `<Mon> <Day>, <Year> … to <Mon> <Day>, <Year>`.
    Pattern,
    /// Positional first, pattern when that fails. (default)
    #[default]
    Auto,
}

/// How repeated keys are merged: metric names within one statement, and
/// statement periods across a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// The later value replaces the earlier one. (default)
    #[default]
    LastWriteWins,
    /// A repeated key is an error.
    Strict,
}

impl ConflictPolicy {
    /// Insert `key → value` according to the policy.
    ///
    /// Returns the displaced value under [`ConflictPolicy::LastWriteWins`].
    /// Under [`ConflictPolicy::Strict`] a repeated key leaves the map
    /// untouched and comes back as `Err((key, existing, rejected))`.
    pub fn insert<'m, K, V>(
        self,
        map: &'m mut BTreeMap<K, V>,
        key: K,
        value: V,
    ) -> Result<Option<V>, (K, &'m V, V)>
    where
        K: Ord + fmt::Debug,
    {
        if self == ConflictPolicy::Strict && map.contains_key(&key) {
            let existing = &map[&key];
            return Err((key, existing, value));
        }

        if map.contains_key(&key) {
            debug!("Overwriting repeated key {:?}", key);
        }
        Ok(map.insert(key, value))
    }
}
