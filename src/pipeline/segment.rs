//! Fragment segmentation: recover label/value rows from scattered text.
//!
//! Statements lay out metrics as one column of `label … value` rows, but the
//! PDF only tells us where each text run sits. Rows are rebuilt from
//! geometry alone:
//!
//! ```text
//! fragments ──▶ index by bbox ──▶ group by y0 ──▶ merge drifting singles ──▶ pairs ──▶ metrics
//! ```
//!
//! 1. Fragments are keyed by their rounded bbox (identical keys: last one
//!    wins) and grouped into lines by exact rounded y0.
//! 2. Lines with two fragments are candidate rows as-is. Lines with one
//!    fragment are "singles": often half of a row whose label and value
//!    baselines differ by a fraction of a point.
//! 3. Consecutive singles (sorted by y0) whose y0 differ by at most the
//!    merge tolerance are joined into one merged group.
//! 4. Candidates are the merged groups with two fragments, followed by the
//!    original two-fragment lines, each in ascending y0 order.
//! 5. A candidate becomes a metric when exactly one cell is numeric
//!    (see [`crate::pipeline::classify`]).
//!
//! Repeated metric names are settled by the configured
//! [`ConflictPolicy`]; with the default, the later candidate wins.

use crate::config::{ConflictPolicy, ReconConfig};
use crate::error::ReconError;
use crate::output::MetricMap;
use crate::pipeline::classify::classify_pair;
use crate::pipeline::fragment::{to_hundredths, BBoxKey, TextFragment};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Fragments of one visual row, keyed by bbox so cells keep x-order.
type Row<'a> = BTreeMap<BBoxKey, &'a str>;

/// Groups fragments into rows and pairs them into metrics.
#[derive(Debug, Clone)]
pub struct Segmenter<'a> {
    tolerance: i64,
    policy: ConflictPolicy,
    stop_list: &'a BTreeSet<String>,
}

impl<'a> Segmenter<'a> {
    /// `tolerance` is in points; it is rounded to hundredths like the keys.
    pub fn new(tolerance: f64, policy: ConflictPolicy, stop_list: &'a BTreeSet<String>) -> Self {
        Self {
            tolerance: to_hundredths(tolerance),
            policy,
            stop_list,
        }
    }

    pub fn from_config(config: &'a ReconConfig) -> Self {
        Self::new(
            config.merge_tolerance,
            config.conflict_policy,
            &config.stop_list,
        )
    }

    /// Turn a document's non-period fragments into a metric map.
    ///
    /// Never fails on ambiguous data; only the strict conflict policy can
    /// return an error ([`ReconError::DuplicateMetric`]).
    pub fn segment<'f, I>(&self, fragments: I) -> Result<MetricMap, ReconError>
    where
        I: IntoIterator<Item = &'f TextFragment>,
    {
        let indexed = self.index(fragments);
        let lines = group_lines(&indexed);
        let merged = merge_singles(&lines, self.tolerance);
        debug!(
            "Segmenting {} fragments: {} lines, {} merged groups",
            indexed.len(),
            lines.len(),
            merged.len()
        );

        let candidates = merged
            .iter()
            .map(|(_, row)| row)
            .chain(lines.values())
            .filter(|row| row.len() == 2);

        let mut metrics = MetricMap::new();
        for row in candidates {
            let mut cells = row.values();
            let (Some(first), Some(second)) = (cells.next(), cells.next()) else {
                continue;
            };
            let Some((name, value)) = classify_pair(first, second) else {
                trace!("Ambiguous row dropped: {:?} / {:?}", first, second);
                continue;
            };
            if let Err((name, existing, rejected)) = self.policy.insert(&mut metrics, name, value) {
                return Err(ReconError::DuplicateMetric {
                    name,
                    first: *existing,
                    second: rejected,
                });
            }
        }

        Ok(metrics)
    }

    /// Key every fragment by its rounded bbox, dropping stop-list text.
    fn index<'f, I>(&self, fragments: I) -> BTreeMap<BBoxKey, &'f str>
    where
        I: IntoIterator<Item = &'f TextFragment>,
    {
        fragments
            .into_iter()
            .filter(|f| !self.stop_list.contains(&f.text))
            .map(|f| (f.bbox.key(), f.text.as_str()))
            .collect()
    }
}

/// Partition indexed fragments by exact rounded y0.
fn group_lines<'a>(indexed: &BTreeMap<BBoxKey, &'a str>) -> BTreeMap<i64, Row<'a>> {
    let mut lines: BTreeMap<i64, Row<'a>> = BTreeMap::new();
    for (key, text) in indexed {
        lines.entry(key.y0).or_default().insert(*key, *text);
    }
    lines
}

/// Join runs of consecutive single-fragment lines that sit within
/// `tolerance` hundredths of each other.
///
/// Each run is keyed by the y0 of its first line. Singles that do not join a
/// neighbour are not returned.
fn merge_singles<'a>(lines: &BTreeMap<i64, Row<'a>>, tolerance: i64) -> Vec<(i64, Row<'a>)> {
    let singles: Vec<(i64, &Row<'a>)> = lines
        .iter()
        .filter(|(_, row)| row.len() == 1)
        .map(|(y0, row)| (*y0, row))
        .collect();

    // Keys saturate at the i64 range, so distances are taken unsigned.
    let tolerance = u64::try_from(tolerance).unwrap_or(0);
    let mut merged = Vec::new();
    let mut run: Option<(i64, Row<'a>)> = None;

    for (i, (y0, row)) in singles.iter().enumerate() {
        let joins_next = singles
            .get(i + 1)
            .is_some_and(|(next_y0, _)| next_y0.abs_diff(*y0) <= tolerance);

        match run.as_mut() {
            Some((_, acc)) => acc.extend(row.iter().map(|(k, v)| (*k, *v))),
            None if joins_next => run = Some((*y0, (*row).clone())),
            None => {}
        }

        if !joins_next {
            if let Some(done) = run.take() {
                merged.push(done);
            }
        }
    }

    merged
}
