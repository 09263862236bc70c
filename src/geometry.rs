//! Key geometry cache: screen rectangles for every key, as last reported
//! by the renderer.
//!
//! The renderer refreshes rectangles roughly once per second and on resize.
//! The pipeline only reads them and tolerates stale or missing entries:
//! a key without a rectangle simply drops out of the frame's inference.

use std::collections::HashMap;
use tracing::{debug, info};

use super::layout::{KeyDefinition, KeyId};

// ── Point / Rect ────────────────────────────────────────────

/// A point in screen coordinates (pixels).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned screen rectangle (pixels, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether the point lies inside (edges inclusive).
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = (self.x + self.width).max(other.x + other.width);
        let bottom = (self.y + self.height).max(other.y + other.height);
        Rect::new(left, top, right - left, bottom - top)
    }

    /// Grow the rectangle by `margin` on every side.
    pub fn expand(&self, margin: f64) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }
}

// ── KeyGeometryCache ────────────────────────────────────────

/// Per-key cached rectangles plus the derived base sigma.
///
/// The base sigma comes from the reference key: the first ordinary,
/// non-wide key in layout order. It is re-derived whenever that key's
/// rectangle changes (resize), otherwise it stays fixed. Until the
/// reference has a rectangle, the first eligible key that gets one stands in.
#[derive(Debug, Clone)]
pub struct KeyGeometryCache {
    rects: Vec<Option<Rect>>,
    index: HashMap<KeyId, usize>,
    reference: Option<usize>,
    /// Keys that may stand in for the reference while it has no rectangle.
    eligible: Vec<bool>,
    sigma_ratio: f64,
    base_sigma: Option<f64>,
    /// Incremented on every change so consumers can notice refreshes.
    pub generation: u64,
}

impl KeyGeometryCache {
    pub fn new(keys: &[KeyDefinition], sigma_ratio: f64) -> Self {
        let index = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.id.clone(), i))
            .collect();
        let eligible: Vec<bool> = keys
            .iter()
            .map(|k| !k.is_special() && !k.wide && !k.full_width)
            .collect();
        let reference = eligible
            .iter()
            .position(|e| *e)
            .or(if keys.is_empty() { None } else { Some(0) });
        Self {
            rects: vec![None; keys.len()],
            index,
            reference,
            eligible,
            sigma_ratio,
            base_sigma: None,
            generation: 0,
        }
    }

    /// Number of keys the cache was built for.
    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Layout index of a key id.
    pub fn index_of(&self, id: &KeyId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Record a key's rectangle by id.
    pub fn set_rect(&mut self, id: &KeyId, rect: Rect) -> Result<(), String> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| format!("unknown key: {}", id))?;
        self.set_rect_at(idx, rect);
        Ok(())
    }

    /// Record a key's rectangle by layout index. Out-of-range indices are ignored.
    pub fn set_rect_at(&mut self, idx: usize, rect: Rect) {
        let Some(slot) = self.rects.get_mut(idx) else {
            return;
        };
        *slot = Some(rect);
        self.generation += 1;

        let reference_known = self.reference.and_then(|r| self.rect(r)).is_some();
        let provisional = self.base_sigma.is_none()
            && !reference_known
            && self.eligible.get(idx).copied().unwrap_or(false);
        if self.reference == Some(idx) || provisional {
            let size = rect.width.min(rect.height);
            let sigma = size * self.sigma_ratio;
            if self.base_sigma != Some(sigma) {
                info!(
                    "Base sigma derived from key {}: {:.1}px ({:.0}px x ratio {:.2})",
                    idx, sigma, size, self.sigma_ratio
                );
            }
            self.base_sigma = Some(sigma);
        }
    }

    /// Forget a key's rectangle (e.g. the key was hidden).
    pub fn clear_rect(&mut self, id: &KeyId) {
        if let Some(idx) = self.index_of(id) {
            self.rects[idx] = None;
            self.generation += 1;
            debug!("Geometry cleared for key {}", id);
        }
    }

    /// Replace every known rectangle from a renderer pass.
    ///
    /// Keys absent from `rects` keep their previous (possibly stale) rectangle.
    /// Returns the number of unknown ids that were skipped.
    pub fn refresh<'a, I>(&mut self, rects: I) -> usize
    where
        I: IntoIterator<Item = (&'a KeyId, Rect)>,
    {
        let mut unknown = 0;
        for (id, rect) in rects {
            match self.index_of(id) {
                Some(idx) => self.set_rect_at(idx, rect),
                None => unknown += 1,
            }
        }
        if unknown > 0 {
            debug!("Geometry refresh skipped {} unknown key(s)", unknown);
        }
        unknown
    }

    pub fn rect(&self, idx: usize) -> Option<Rect> {
        self.rects.get(idx).copied().flatten()
    }

    /// Spatial tolerance before any active-key expansion.
    pub fn base_sigma(&self) -> Option<f64> {
        self.base_sigma
    }

    /// Number of keys with a known rectangle.
    pub fn known_count(&self) -> usize {
        self.rects.iter().filter(|r| r.is_some()).count()
    }

    /// Bounding rectangle of all known keys (no margin).
    pub fn bounds(&self) -> Option<Rect> {
        self.rects
            .iter()
            .flatten()
            .copied()
            .reduce(|acc, r| acc.union(&r))
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{qwerty_layout, KeyRole};

    #[test]
    fn test_rect_center_and_contains() {
        let r = Rect::new(10.0, 20.0, 40.0, 30.0);
        assert_eq!(r.center(), Point::new(30.0, 35.0));
        assert!(r.contains(Point::new(10.0, 20.0)));
        assert!(r.contains(Point::new(50.0, 50.0)));
        assert!(!r.contains(Point::new(50.1, 50.0)));
    }

    #[test]
    fn test_rect_union_and_expand() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 5.0, 10.0, 20.0);
        let u = a.union(&b);
        assert_eq!(u, Rect::new(0.0, 0.0, 30.0, 25.0));
        assert_eq!(u.expand(5.0), Rect::new(-5.0, -5.0, 40.0, 35.0));
    }

    #[test]
    fn test_base_sigma_from_reference_key() {
        let keys = qwerty_layout();
        let mut cache = KeyGeometryCache::new(&keys, 0.5);
        assert!(cache.base_sigma().is_none());

        // Reference is the first ordinary key ("q")
        cache.set_rect(&KeyId::from("q"), Rect::new(0.0, 0.0, 60.0, 50.0)).unwrap();
        assert_eq!(cache.base_sigma(), Some(25.0));

        // Other keys do not affect sigma
        cache.set_rect(&KeyId::from("w"), Rect::new(60.0, 0.0, 100.0, 100.0)).unwrap();
        assert_eq!(cache.base_sigma(), Some(25.0));

        // Resize of the reference key re-derives it
        cache.set_rect(&KeyId::from("q"), Rect::new(0.0, 0.0, 80.0, 80.0)).unwrap();
        assert_eq!(cache.base_sigma(), Some(40.0));
    }

    #[test]
    fn test_reference_skips_special_keys() {
        let keys = vec![
            KeyDefinition::special("bksp", "⌫", KeyRole::Backspace),
            KeyDefinition::character("a"),
        ];
        let mut cache = KeyGeometryCache::new(&keys, 0.5);
        cache.set_rect_at(0, Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(cache.base_sigma().is_none());
        cache.set_rect_at(1, Rect::new(0.0, 0.0, 40.0, 40.0));
        assert_eq!(cache.base_sigma(), Some(20.0));
    }

    #[test]
    fn test_provisional_sigma_until_reference_known() {
        let keys = qwerty_layout();
        let mut cache = KeyGeometryCache::new(&keys, 0.5);
        cache.set_rect(&KeyId::from("g"), Rect::new(0.0, 0.0, 40.0, 40.0)).unwrap();
        assert_eq!(cache.base_sigma(), Some(20.0), "Stand-in key");
        cache.set_rect(&KeyId::from("h"), Rect::new(0.0, 0.0, 60.0, 60.0)).unwrap();
        assert_eq!(cache.base_sigma(), Some(20.0), "First stand-in sticks");
        cache.set_rect(&KeyId::from("q"), Rect::new(0.0, 0.0, 50.0, 50.0)).unwrap();
        assert_eq!(cache.base_sigma(), Some(25.0), "Reference takes over");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let keys = qwerty_layout();
        let mut cache = KeyGeometryCache::new(&keys, 0.5);
        let err = cache.set_rect(&KeyId::from("nope"), Rect::new(0.0, 0.0, 1.0, 1.0));
        assert!(err.is_err());
        assert_eq!(cache.known_count(), 0);
    }

    #[test]
    fn test_bounds_and_clear() {
        let keys = qwerty_layout();
        let mut cache = KeyGeometryCache::new(&keys, 0.5);
        assert!(cache.bounds().is_none());

        let q = KeyId::from("q");
        let p = KeyId::from("p");
        let skipped = cache.refresh(vec![
            (&q, Rect::new(0.0, 0.0, 50.0, 50.0)),
            (&p, Rect::new(450.0, 0.0, 50.0, 50.0)),
        ]);
        assert_eq!(skipped, 0);
        assert_eq!(cache.bounds(), Some(Rect::new(0.0, 0.0, 500.0, 50.0)));

        cache.clear_rect(&p);
        assert_eq!(cache.known_count(), 1);
        assert!(cache.rect(cache.index_of(&p).unwrap()).is_none());
    }
}
