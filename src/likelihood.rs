//! Spatial likelihood: Gaussian kernel over distance to each key's center.

use super::geometry::{KeyGeometryCache, Point};
use super::layout::KeyDefinition;

/// Computes per-key likelihoods from the smoothed gaze point.
#[derive(Debug, Clone)]
pub struct LikelihoodModel {
    /// Fixed multiplicative boost for special (non-character) keys.
    pub special_boost: f64,
    /// Sigma multiplier for the tracked key when expansion is enabled.
    pub active_expansion: f64,
}

impl LikelihoodModel {
    pub fn new(special_boost: f64, active_expansion: f64) -> Self {
        Self {
            special_boost,
            active_expansion,
        }
    }

    /// Gaussian kernel `exp(-d² / 2σ²)`.
    pub fn kernel(distance: f64, sigma: f64) -> f64 {
        (-(distance * distance) / (2.0 * sigma * sigma)).exp()
    }

    /// Fill `out` with one entry per key; `None` for keys without geometry.
    ///
    /// `active` is the currently tracked key; its sigma is widened only when
    /// `expand_active` is set.
    pub fn compute(
        &self,
        point: Point,
        keys: &[KeyDefinition],
        geometry: &KeyGeometryCache,
        base_sigma: f64,
        active: Option<usize>,
        expand_active: bool,
        out: &mut Vec<Option<f64>>,
    ) {
        out.clear();
        out.extend(keys.iter().enumerate().map(|(idx, key)| {
            let rect = geometry.rect(idx)?;
            let sigma = if expand_active && active == Some(idx) {
                base_sigma * self.active_expansion
            } else {
                base_sigma
            };
            let mut l = Self::kernel(point.distance(rect.center()), sigma);
            if key.is_special() {
                l *= self.special_boost;
            }
            Some(l)
        }));
    }
}

// ── Tests ───────────────────────────────────────────────────
