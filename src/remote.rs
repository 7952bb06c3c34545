//! Remote report client: fetch the reporting API's view of each period.
//!
//! Reports are produced asynchronously by the API, so fetching one is a
//! three-step exchange:
//!
//! ```text
//! POST {url}        {"type":"profit-and-loss", "from", "to", …}  ──▶ 201, report id
//! GET  {url}        [{"id": …, "status": "completed"}, …]        (poll until ready)
//! GET  {url}{id}    report JSON
//! ```
//!
//! [`fetch_reports`] runs one such exchange per period, all concurrently over
//! a shared connection pool. A failing period is logged and recorded in
//! [`RemoteReports::failures`]; it never cancels the others.

use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::pipeline::period::DateRange;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Report type requested from the API.
const REPORT_TYPE: &str = "profit-and-loss";

/// Source of remote reports, one per (marketplace, period).
///
/// [`HttpReportClient`] is the real transport; tests and callers can
/// substitute their own.
#[async_trait]
pub trait ReportApi: Send + Sync {
    /// Fetch the finished report for `period`.
    async fn fetch_report(
        &self,
        marketplace_id: &str,
        period: &DateRange,
    ) -> Result<Value, ReconError>;
}

/// Reports fetched for a set of periods.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemoteReports {
    /// Period → raw report JSON.
    pub reports: BTreeMap<DateRange, Value>,
    /// Periods whose report could not be fetched, with the reason.
    pub failures: Vec<(DateRange, String)>,
}

impl RemoteReports {
    pub fn get(&self, period: &DateRange) -> Option<&Value> {
        self.reports.get(period)
    }
}

/// `reqwest`-backed [`ReportApi`].
#[derive(Debug, Clone)]
pub struct HttpReportClient {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    timeout: Duration,
    poll_interval: Duration,
}

/// One entry of the report status listing.
#[derive(Debug, Deserialize)]
struct ReportStatus {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    status: Option<String>,
}

impl HttpReportClient {
    /// Build a client from the `api_*` settings of `config`.
    ///
    /// The connection pool is shared by every request made through the
    /// returned client (and its clones).
    pub fn new(config: &ReconConfig) -> Result<Self, ReconError> {
        let timeout = Duration::from_secs(config.api_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReconError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.api_url.clone(),
            token: config.api_token.clone(),
            timeout,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(reqwest::header::ACCEPT, "application/json");
        match self.token {
            Some(ref token) => request.header(reqwest::header::AUTHORIZATION, format!("JWT {}", token)),
            None => request,
        }
    }

    fn request_error(&self, period: &DateRange, e: reqwest::Error) -> ReconError {
        if e.is_timeout() {
            ReconError::RemoteTimeout {
                period: *period,
                secs: self.timeout.as_secs(),
            }
        } else {
            ReconError::RemoteRequestFailed {
                period: *period,
                reason: e.to_string(),
            }
        }
    }

    /// Ask the API to build a report; returns its id.
    async fn request_report(
        &self,
        marketplace_id: &str,
        period: &DateRange,
    ) -> Result<String, ReconError> {
        let body = serde_json::json!({
            "type": REPORT_TYPE,
            "marketplace_id": marketplace_value(marketplace_id),
            "brandIds": "",
            "productIds": "",
            "parentIds": "",
            "name": "Name",
            "from": period.start_str(),
            "to": period.end_str(),
        });

        let response = self
            .authorized(self.client.post(&self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(period, e))?;

        if response.status() != StatusCode::CREATED {
            return Err(ReconError::ReportNotCreated {
                period: *period,
                status: response.status().as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.request_error(period, e))?;
        parse_report_id(&text).ok_or_else(|| ReconError::RemoteRequestFailed {
            period: *period,
            reason: format!("unexpected report id {:?}", text),
        })
    }

    /// Poll the status listing until report `id` is completed.
    async fn wait_until_completed(&self, id: &str, period: &DateRange) -> Result<(), ReconError> {
        let deadline = Instant::now() + self.timeout;
        let mut polls = 0u32;

        loop {
            polls += 1;
            let listing: Vec<ReportStatus> = self
                .authorized(self.client.get(&self.url))
                .send()
                .await
                .map_err(|e| self.request_error(period, e))?
                .json()
                .await
                .map_err(|e| self.request_error(period, e))?;

            if is_completed(&listing, id) {
                debug!("Report {} for {} ready after {} polls", id, period, polls);
                return Ok(());
            }

            if Instant::now() + self.poll_interval >= deadline {
                return Err(ReconError::RemoteTimeout {
                    period: *period,
                    secs: self.timeout.as_secs(),
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn download(&self, id: &str, period: &DateRange) -> Result<Value, ReconError> {
        let url = format!("{}{}", self.url, id);
        self.authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| self.request_error(period, e))?
            .json()
            .await
            .map_err(|e| self.request_error(period, e))
    }
}

#[async_trait]
impl ReportApi for HttpReportClient {
    async fn fetch_report(
        &self,
        marketplace_id: &str,
        period: &DateRange,
    ) -> Result<Value, ReconError> {
        let id = self.request_report(marketplace_id, period).await?;
        debug!("Requested report {} for {}", id, period);
        self.wait_until_completed(&id, period).await?;
        self.download(&id, period).await
    }
}

/// Fetch one report per period, all concurrently.
///
/// Always returns once every period has finished; failures are logged and
/// collected rather than propagated.
pub async fn fetch_reports(
    api: &dyn ReportApi,
    marketplace_id: &str,
    periods: &[DateRange],
) -> RemoteReports {
    info!(
        "Fetching {} remote reports for marketplace {}",
        periods.len(),
        marketplace_id
    );

    let results: Vec<(DateRange, Result<Value, ReconError>)> =
        stream::iter(periods.iter().copied())
            .map(move |period| async move { (period, api.fetch_report(marketplace_id, &period).await) })
            .buffer_unordered(periods.len().max(1))
            .collect()
            .await;

    let mut out = RemoteReports::default();
    for (period, result) in results {
        match result {
            Ok(report) => {
                out.reports.insert(period, report);
            }
            Err(e) => {
                warn!("Remote report for {} failed: {}", period, e);
                out.failures.push((period, e.to_string()));
            }
        }
    }
    out.failures.sort_by_key(|(period, _)| *period);

    info!(
        "Fetched {}/{} remote reports",
        out.reports.len(),
        periods.len()
    );
    out
}

/// [`fetch_reports`] over an [`HttpReportClient`] built from `config`.
pub async fn fetch_remote_reports(
    config: &ReconConfig,
    marketplace_id: &str,
    periods: &[DateRange],
) -> Result<RemoteReports, ReconError> {
    let client = HttpReportClient::new(config)?;
    Ok(fetch_reports(&client, marketplace_id, periods).await)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Numeric marketplace ids go out as JSON numbers, anything else as a string.
fn marketplace_value(marketplace_id: &str) -> Value {
    marketplace_id
        .trim()
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(marketplace_id))
}

/// The create call answers with a bare or JSON-quoted id.
fn parse_report_id(body: &str) -> Option<String> {
    let id = body.trim().trim_matches('"').trim();
    if id.is_empty() || id.contains(char::is_whitespace) {
        return None;
    }
    Some(id.to_string())
}

fn is_completed(listing: &[ReportStatus], id: &str) -> bool {
    listing
        .iter()
        .any(|entry| id_matches(&entry.id, id) && entry.status.as_deref() == Some("completed"))
}

fn id_matches(value: &Value, id: &str) -> bool {
    match value {
        Value::String(s) => s == id,
        Value::Number(n) => n.to_string() == id,
        _ => false,
    }
}
