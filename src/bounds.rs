//! Out-of-bounds gate: "look away to reset".
//!
//! The keyboard bounds are the union of every known key rectangle, grown
//! by a fixed margin. A smoothed point outside them resets all interest
//! and tracking for that frame; the engine skips the rest of the pipeline.

use super::geometry::{KeyGeometryCache, Point, Rect};

/// Where the smoothed point lies relative to the keyboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundsCheck {
    Inside,
    Outside,
    /// No key has geometry yet; nothing to compare against.
    NoGeometry,
}

#[derive(Debug, Clone)]
pub struct OutOfBoundsGate {
    /// Margin added on every side of the key bounds (px).
    pub margin: f64,
    outside: bool,
}

impl OutOfBoundsGate {
    pub fn new(margin: f64) -> Self {
        Self {
            margin,
            outside: false,
        }
    }

    /// Keyboard bounds including the margin.
    pub fn bounds(&self, geometry: &KeyGeometryCache) -> Option<Rect> {
        geometry.bounds().map(|b| b.expand(self.margin))
    }

    pub fn check(&self, point: Point, geometry: &KeyGeometryCache) -> BoundsCheck {
        match self.bounds(geometry) {
            None => BoundsCheck::NoGeometry,
            Some(b) if b.contains(point) => BoundsCheck::Inside,
            Some(_) => BoundsCheck::Outside,
        }
    }

    /// Check and track the outside episode. Returns the check result and
    /// whether this frame is the first one outside.
    pub fn update(&mut self, point: Point, geometry: &KeyGeometryCache) -> (BoundsCheck, bool) {
        let check = self.check(point, geometry);
        let entered = check == BoundsCheck::Outside && !self.outside;
        self.outside = check == BoundsCheck::Outside;
        (check, entered)
    }

    pub fn is_outside(&self) -> bool {
        self.outside
    }

    pub fn reset(&mut self) {
        self.outside = false;
    }
}

// ── Tests ───────────────────────────────────────────────────
