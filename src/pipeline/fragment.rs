//! Positioned text fragments and their exact grouping keys.
//!
//! Fragment coordinates come out of the PDF engine as floats. Grouping on
//! raw floats drifts (`100.899999` vs `100.9`), so every comparison the
//! segmenter makes goes through [`BBoxKey`]: the bbox rounded to two decimal
//! places and stored as integer hundredths.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in PDF document space (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Rounded, exactly comparable key for this box.
    pub fn key(&self) -> BBoxKey {
        BBoxKey {
            x0: to_hundredths(self.x0),
            y0: to_hundredths(self.y0),
            x1: to_hundredths(self.x1),
            y1: to_hundredths(self.y1),
        }
    }
}

/// A bbox rounded to 2 decimals, in hundredths of a point.
///
/// Field order matters: the derived `Ord` compares `x0`, then `y0`, then
/// `x1`, then `y1`, which is the fragment sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BBoxKey {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

/// One contiguous run of decoded text at a fixed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub bbox: BBox,
    pub text: String,
}

impl TextFragment {
    pub fn new(bbox: BBox, text: impl Into<String>) -> Self {
        Self {
            bbox,
            text: text.into(),
        }
    }
}

/// All fragments emitted for a single page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageFragments {
    /// 0-based page index.
    pub page_index: usize,
    pub fragments: Vec<TextFragment>,
}

/// Convert a coordinate to integer hundredths, rounding half away from zero.
pub fn to_hundredths(v: f64) -> i64 {
    (v * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_rounds_to_two_decimals() {
        let key = BBox::new(10.004, 100.899_999, 20.005, 110.0).key();
        assert_eq!(key.x0, 1000);
        assert_eq!(key.y0, 10090);
        assert_eq!(key.x1, 2001);
        assert_eq!(key.y1, 11000);
    }

    #[test]
    fn keys_sort_by_x0_first() {
        let left_low = BBox::new(0.0, 50.0, 10.0, 60.0).key();
        let left_high = BBox::new(0.0, 100.0, 10.0, 110.0).key();
        let right_low = BBox::new(20.0, 10.0, 30.0, 20.0).key();
        let mut keys = vec![right_low, left_high, left_low];
        keys.sort();
        assert_eq!(keys, vec![left_low, left_high, right_low]);
    }

    #[test]
    fn fragment_deserialises_from_json() {
        let f: TextFragment = serde_json::from_str(
            r#"{"bbox":{"x0":0.0,"y0":100.0,"x1":10.0,"y1":110.0},"text":"Total Revenue"}"#,
        )
        .expect("valid fragment json");
        assert_eq!(f.text, "Total Revenue");
        assert_eq!(f.bbox.key().y0, 10000);
    }
}
