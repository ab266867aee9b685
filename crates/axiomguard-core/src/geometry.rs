//! Axis-aligned geometry checks.
//!
//! Coordinates are y-up: `bottom < top`. Overlap is an open-interval test,
//! so rectangles that only share an edge or a corner do not overlap.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl Rect {
    #[must_use]
    pub const fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Build from the lower-left corner and a size.
    #[must_use]
    pub fn from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// True when both width and height are strictly positive.
    ///
    /// NaN extents compare false and are therefore rejected.
    #[must_use]
    pub fn has_positive_extent(&self) -> bool {
        self.width() > 0.0 && self.height() > 0.0
    }
}

/// Open-interval overlap test.
///
/// Both rectangles must have positive extent; a degenerate rectangle never
/// overlaps anything.
#[must_use]
pub fn rectangles_overlap(a: &Rect, b: &Rect) -> bool {
    if !a.has_positive_extent() || !b.has_positive_extent() {
        return false;
    }
    a.left < b.right && b.left < a.right && a.bottom < b.top && b.bottom < a.top
}

/// Rectangle tagged with the identifier of the entity that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRect {
    pub id: String,
    pub rect: Rect,
}

impl LabeledRect {
    #[must_use]
    pub fn new(id: impl Into<String>, rect: Rect) -> Self {
        Self {
            id: id.into(),
            rect,
        }
    }
}

/// First overlapping pair found by [`validate_non_overlap`].
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapViolation {
    pub first: String,
    pub second: String,
    pub message: String,
}

impl fmt::Display for OverlapViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for OverlapViolation {}

/// All-pairs scan over distinct indices. O(n²).
///
/// Returns the first offending pair in index order.
pub fn validate_non_overlap(rects: &[LabeledRect]) -> Result<(), OverlapViolation> {
    for (i, a) in rects.iter().enumerate() {
        for b in &rects[i + 1..] {
            if rectangles_overlap(&a.rect, &b.rect) {
                return Err(OverlapViolation {
                    first: a.id.clone(),
                    second: b.id.clone(),
                    message: format!(
                        "overlap between '{}' [{}, {}]x[{}, {}] and '{}' [{}, {}]x[{}, {}]",
                        a.id,
                        a.rect.left,
                        a.rect.right,
                        a.rect.bottom,
                        a.rect.top,
                        b.id,
                        b.rect.left,
                        b.rect.right,
                        b.rect.bottom,
                        b.rect.top,
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Line segment used by collision and navigation geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Segment {
    #[must_use]
    pub fn new(id: impl Into<String>, x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            id: id.into(),
            x0,
            y0,
            x1,
            y1,
        }
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        (self.x1 - self.x0).hypot(self.y1 - self.y0)
    }

    /// Zero-length or non-finite segments cannot take part in collision.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        let len = self.length();
        !len.is_finite() || len <= 0.0
    }
}
