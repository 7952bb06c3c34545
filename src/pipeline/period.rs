//! Statement period extraction: find the marker fragment and turn its text
//! into a [`DateRange`].
//!
//! Statements print their period as a single phrase, e.g.
//!
//! ```text
//! Account activity from Jan 1, 2024 00:00 PST to Jan 31, 2024 23:59 PST
//! ```
//!
//! Two parsers read it. The positional parser takes the start date from
//! words 3–5 and the end date from words 9–11, which only holds for the exact
//! word count of that layout. The pattern parser looks for
//! `<Mon> <Day>, <Year>` before and after `to` and ignores everything else.
//! [`PeriodFormat::Auto`] tries them in that order.

use crate::config::PeriodFormat;
use crate::error::ReconError;
use crate::pipeline::fragment::TextFragment;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Word positions of the start month/day/year in the positional layout.
const START_WORDS: std::ops::Range<usize> = 3..6;
/// Word positions of the end month/day/year in the positional layout.
const END_WORDS: std::ops::Range<usize> = 9..12;

static PERIOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)\b([a-z]+)\.?\s+(\d{1,2}),?\s+(\d{4})\b.*?\bto\s+([a-z]+)\.?\s+(\d{1,2}),?\s+(\d{4})\b",
    )
    .expect("valid regex")
});

/// The (start, end) calendar-date pair identifying one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Start date as `YYYY-MM-DD`.
    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    /// End date as `YYYY-MM-DD`.
    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start_str(), self.end_str())
    }
}

impl FromStr for DateRange {
    type Err = String;

    /// Parse the `YYYY-MM-DD..YYYY-MM-DD` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once("..")
            .ok_or_else(|| format!("expected START..END, got {s:?}"))?;
        let parse = |d: &str| {
            NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").map_err(|e| format!("{d:?}: {e}"))
        };
        Ok(Self::new(parse(start)?, parse(end)?))
    }
}

impl Serialize for DateRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Locate the period fragment and parse it.
///
/// The first fragment whose text contains `marker` defines the period.
/// Returns the period together with every fragment that does *not* contain
/// the marker; those are the segmenter's input.
pub fn extract_period<'a>(
    fragments: &'a [TextFragment],
    marker: &str,
    format: PeriodFormat,
) -> Result<(DateRange, Vec<&'a TextFragment>), ReconError> {
    let (markers, rest): (Vec<&TextFragment>, Vec<&TextFragment>) =
        fragments.iter().partition(|f| f.text.contains(marker));

    let first = markers.first().ok_or_else(|| ReconError::DateFormat {
        text: String::new(),
        reason: format!("no text fragment contains {marker:?}"),
    })?;
    if markers.len() > 1 {
        debug!(
            "{} fragments contain the period marker; using the first",
            markers.len()
        );
    }

    let period = parse_period(&first.text, format)?;
    Ok((period, rest))
}

/// Parse a period phrase with the chosen parser.
pub fn parse_period(text: &str, format: PeriodFormat) -> Result<DateRange, ReconError> {
    match format {
        PeriodFormat::Positional => parse_positional(text),
        PeriodFormat::Pattern => parse_pattern(text),
        PeriodFormat::Auto => parse_positional(text).or_else(|e| {
            debug!("Positional period parse failed ({e}); trying pattern");
            parse_pattern(text)
        }),
    }
}

/// Fixed word-offset parser.
pub fn parse_positional(text: &str) -> Result<DateRange, ReconError> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < END_WORDS.end {
        return Err(date_error(
            text,
            format!(
                "expected at least {} words, found {}",
                END_WORDS.end,
                words.len()
            ),
        ));
    }

    let start = date_from_words(&words[START_WORDS]).map_err(|r| date_error(text, r))?;
    let end = date_from_words(&words[END_WORDS]).map_err(|r| date_error(text, r))?;
    Ok(DateRange::new(start, end))
}

/// Regex parser tolerant of extra words around the two dates.
pub fn parse_pattern(text: &str) -> Result<DateRange, ReconError> {
    let caps = PERIOD_RE
        .captures(text)
        .ok_or_else(|| date_error(text, "no '<Mon> <Day>, <Year> to <Mon> <Day>, <Year>' found"))?;

    let start = date_from_words(&[&caps[1], &caps[2], &caps[3]]).map_err(|r| date_error(text, r))?;
    let end = date_from_words(&[&caps[4], &caps[5], &caps[6]]).map_err(|r| date_error(text, r))?;
    Ok(DateRange::new(start, end))
}

/// Build a date from `[month, day, year]` words, commas ignored.
fn date_from_words(words: &[&str]) -> Result<NaiveDate, String> {
    let [month, day, year] = words else {
        return Err(format!("expected month, day and year, got {words:?}"));
    };
    let month = month.replace(',', "");
    let day = day.replace(',', "");
    let year = year.replace(',', "");

    let m = month_number(&month).ok_or_else(|| format!("unknown month {month:?}"))?;
    let d: u32 = day.parse().map_err(|_| format!("bad day {day:?}"))?;
    let y: i32 = year.parse().map_err(|_| format!("bad year {year:?}"))?;

    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| format!("{year}-{m:02}-{d:02} is not a calendar date"))
}

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Month number for an English month name or its three-letter abbreviation,
/// case-insensitive, with an optional trailing `.`.
fn month_number(word: &str) -> Option<u32> {
    let word = word.strip_suffix('.').unwrap_or(word).to_ascii_lowercase();
    let index = MONTHS
        .iter()
        .position(|name| *name == word || (word.len() == 3 && name.starts_with(word.as_str())))?;
    u32::try_from(index + 1).ok()
}

fn date_error(text: &str, reason: impl Into<String>) -> ReconError {
    ReconError::DateFormat {
        text: text.to_string(),
        reason: reason.into(),
    }
}
