//! Reconciliation: compare statement metrics with the remote reports.
//!
//! Remote reports nest their numbers as
//!
//! ```text
//! {"marketplaces": [{"data": {"Income": {"Sales": [{"total": 10500.0, …}], …}, …}}]}
//! ```
//!
//! [`reformat_report`] flattens the configured categories into a
//! [`MetricMap`], and [`reconcile`] diffs it against the local statement for
//! the same period. Only names present on both sides are compared; the rest
//! are listed so they can be mapped by hand.

use crate::config::ReconConfig;
use crate::output::{MetricMap, StatementSet};
use crate::pipeline::period::DateRange;
use crate::remote::RemoteReports;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

/// Local and remote value of one metric that disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDiff {
    pub name: String,
    pub local: f64,
    pub remote: f64,
}

impl MetricDiff {
    /// `local - remote`.
    pub fn difference(&self) -> f64 {
        self.local - self.remote
    }
}

/// Comparison result for one statement period.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodReconciliation {
    pub period: DateRange,
    /// `false` when no remote report could be fetched for this period.
    pub remote_available: bool,
    /// Number of metric names present on both sides.
    pub compared: usize,
    pub mismatches: Vec<MetricDiff>,
    /// Names only the statement has.
    pub local_only: Vec<String>,
    /// Names only the remote report has.
    pub remote_only: Vec<String>,
}

impl PeriodReconciliation {
    /// A remote report exists and every shared metric agrees.
    pub fn is_clean(&self) -> bool {
        self.remote_available && self.mismatches.is_empty()
    }
}

/// Comparison results for every local statement period, in period order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    pub periods: Vec<PeriodReconciliation>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.periods.iter().all(PeriodReconciliation::is_clean)
    }

    pub fn mismatch_count(&self) -> usize {
        self.periods.iter().map(|p| p.mismatches.len()).sum()
    }

    /// Periods without a remote report.
    pub fn missing_reports(&self) -> impl Iterator<Item = &DateRange> {
        self.periods
            .iter()
            .filter(|p| !p.remote_available)
            .map(|p| &p.period)
    }
}

/// Flatten a remote report into metric name → value.
///
/// Reads `marketplaces[0].data.<category>` for each category in order; a
/// name repeated in a later category overwrites the earlier value. A
/// metric's value is the first field of its first record. Metrics whose
/// first record is not an object count as `0.0`. A report without
/// marketplaces yields an empty map.
pub fn reformat_report(report: &Value, categories: &[String]) -> MetricMap {
    let mut metrics = MetricMap::new();
    let Some(data) = report
        .get("marketplaces")
        .and_then(|m| m.get(0))
        .and_then(|m| m.get("data"))
    else {
        return metrics;
    };

    for category in categories {
        let Some(entries) = data.get(category).and_then(Value::as_object) else {
            debug!("Report has no {:?} category", category);
            continue;
        };
        for (name, records) in entries {
            metrics.insert(name.clone(), first_record_value(records));
        }
    }
    metrics
}

/// Compare one period's metrics.
pub fn compare_metrics(
    period: DateRange,
    local: &MetricMap,
    remote: Option<&MetricMap>,
    tolerance: f64,
) -> PeriodReconciliation {
    let empty = MetricMap::new();
    let remote_available = remote.is_some();
    let remote = remote.unwrap_or(&empty);

    let mut compared = 0;
    let mut mismatches = Vec::new();
    let mut local_only = Vec::new();
    for (name, &local_value) in local {
        match remote.get(name) {
            Some(&remote_value) => {
                compared += 1;
                if !within(local_value, remote_value, tolerance) {
                    mismatches.push(MetricDiff {
                        name: name.clone(),
                        local: local_value,
                        remote: remote_value,
                    });
                }
            }
            None => local_only.push(name.clone()),
        }
    }
    let remote_only = remote
        .keys()
        .filter(|name| !local.contains_key(*name))
        .cloned()
        .collect();

    PeriodReconciliation {
        period,
        remote_available,
        compared,
        mismatches,
        local_only,
        remote_only,
    }
}

/// Compare every statement period of `local` with its remote report.
pub fn reconcile(
    local: &StatementSet,
    remote: &RemoteReports,
    config: &ReconConfig,
) -> Reconciliation {
    let periods: Vec<PeriodReconciliation> = local
        .statements
        .iter()
        .map(|(period, metrics)| {
            let remote_metrics = remote
                .get(period)
                .map(|report| reformat_report(report, &config.report_categories));
            compare_metrics(
                *period,
                metrics,
                remote_metrics.as_ref(),
                config.value_tolerance,
            )
        })
        .collect();

    let result = Reconciliation { periods };
    info!(
        "Reconciled {} periods: {} mismatches, {} without remote report",
        result.periods.len(),
        result.mismatch_count(),
        result.missing_reports().count()
    );
    result
}

fn within(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

fn first_record_value(records: &Value) -> f64 {
    let first_field = records
        .as_array()
        .and_then(|r| r.first())
        .and_then(Value::as_object)
        .and_then(|record| record.values().next());

    match first_field {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.replace(',', "").trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
