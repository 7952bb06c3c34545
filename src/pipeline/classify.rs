//! Metric/value classification of a two-cell candidate row.
//!
//! The digit test and the value parse deliberately strip different
//! characters: the test ignores `,` `.` `-` so `"-1,234.56"` counts as
//! numeric, while the parse only drops thousands separators so the decimal
//! point and sign survive.

use tracing::debug;

/// `true` when `cell` is all ASCII digits once `,` `.` `-` are removed.
///
/// An empty remainder is not numeric (`"-"`, `"..."`).
pub fn is_numeric(cell: &str) -> bool {
    let mut digits = cell.chars().filter(|c| !matches!(c, ',' | '.' | '-')).peekable();
    digits.peek().is_some() && digits.all(|c| c.is_ascii_digit())
}

/// Parse a numeric cell as `f64`, dropping thousands separators only.
pub fn parse_value(cell: &str) -> Option<f64> {
    cell.replace(',', "").parse::<f64>().ok()
}

/// Classify a candidate row into `(metric name, value)`.
///
/// Returns `None` unless exactly one of the two cells is numeric.
pub fn classify_pair(first: &str, second: &str) -> Option<(String, f64)> {
    let (name, number) = match (is_numeric(first), is_numeric(second)) {
        (false, true) => (first, second),
        (true, false) => (second, first),
        _ => return None,
    };

    match parse_value(number) {
        Some(value) => Some((name.to_string(), value)),
        None => {
            debug!("Dropping row {:?}: value {:?} does not parse", name, number);
            None
        }
    }
}
