// THEORY:
// A `Blob` is the spatial summary of one connected region of the motion mask for a
// single frame: its bounding rectangle, center of mass and mass, all normalized to
// the [0, 1] range of the frame so consumers never deal with pixel dimensions.
//
// Key architectural principles:
// 1.  **Snapshot, not history**: a `Blob` describes one frame. Identity across
//     frames lives in the `id` field, which the tracker fills in, and in the
//     creation stamp it carries forward when an identity is preserved.
// 2.  **Dumb data container**: geometry helpers only. All decisions (filtering,
//     rejection, tracking) are made by the `BlobTracker`.

use crate::core_modules::label_map::Label;
use crate::core_modules::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// Stable tracking identity of a blob.
pub type BlobId = u32;

/// A point in normalized frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormPoint {
    pub x: f64,
    pub y: f64,
}

impl NormPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &NormPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// An axis-aligned rectangle in normalized frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl NormRect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// True when `other` lies entirely inside (or on the edge of) this rectangle.
    pub fn contains(&self, other: &NormRect) -> bool {
        self.x <= other.x && self.y <= other.y && self.right() >= other.right() && self.bottom() >= other.bottom()
    }

    /// The four corners: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [NormPoint; 4] {
        [
            NormPoint::new(self.x, self.y),
            NormPoint::new(self.right(), self.y),
            NormPoint::new(self.right(), self.bottom()),
            NormPoint::new(self.x, self.bottom()),
        ]
    }
}

/// One connected region of motion in the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// Bounding rectangle of the region's pixels.
    pub rect: NormRect,
    /// Mean position of the region's pixels.
    pub mass_center: NormPoint,
    /// Pixel count divided by the frame's pixel count.
    pub mass: f64,
    /// Label of the region in this frame's `LabelMap`.
    pub raw_label: Label,
    /// Tracking identity. `None` only while the tracker is still resolving it.
    pub id: Option<BlobId>,
    /// When this identity was first seen.
    pub created: Timestamp,
    /// False once the identity has been carried over from a previous frame.
    pub is_new: bool,
    /// Ring of normalized points approximating the outline. Empty unless
    /// polygon approximation is enabled.
    pub polygon: Vec<NormPoint>,
}

impl Blob {
    pub fn new(rect: NormRect, mass_center: NormPoint, mass: f64, raw_label: Label, created: Timestamp) -> Self {
        Self {
            rect,
            mass_center,
            mass,
            raw_label,
            id: None,
            created,
            is_new: true,
            polygon: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_containment_includes_edges() {
        let outer = NormRect::new(0.1, 0.1, 0.5, 0.5);
        let inner = NormRect::new(0.2, 0.2, 0.1, 0.1);
        let touching = NormRect::new(0.1, 0.1, 0.5, 0.2);
        let overlapping = NormRect::new(0.5, 0.5, 0.3, 0.3);

        assert!(outer.contains(&inner));
        assert!(outer.contains(&touching));
        assert!(outer.contains(&outer));
        assert!(!inner.contains(&outer));
        assert!(!outer.contains(&overlapping));
    }

    #[test]
    fn distance_is_euclidean() {
        let a = NormPoint::new(0.1, 0.1);
        let b = NormPoint::new(0.4, 0.5);
        assert!((a.distance(&b) - 0.5).abs() < 1e-12);
    }
}
