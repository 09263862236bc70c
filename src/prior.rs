//! Frequency prior: Dirichlet-style pseudocount update over selection counts.
//!
//! Priors start uniform and change only on selection events:
//! `prior_i = (k + count_i) / (k·N + Σ count_j)`. The selected key's count
//! is incremented before the recompute, so the new prior already includes
//! the selection being handled.

use tracing::debug;

use super::selection::KeyRuntimeState;

/// Maintains per-key priors stored in `KeyRuntimeState`.
#[derive(Debug, Clone)]
pub struct PriorModel {
    /// Pseudocount `k`; larger values adapt more slowly.
    pub pseudocount: f64,
    /// Floor applied to special keys' priors during weighting.
    pub special_min_prior: f64,
}

impl PriorModel {
    pub fn new(pseudocount: f64, special_min_prior: f64) -> Self {
        Self {
            pseudocount,
            special_min_prior,
        }
    }

    /// Reset counts and set every prior to 1/N.
    pub fn initialize(&self, keys: &mut [KeyRuntimeState]) {
        let n = keys.len();
        if n == 0 {
            return;
        }
        let uniform = 1.0 / n as f64;
        for k in keys.iter_mut() {
            k.selection_count = 0;
            k.prior = uniform;
        }
    }

    /// Count a selection of `idx` and recompute every prior.
    pub fn record_selection(&self, keys: &mut [KeyRuntimeState], idx: usize) {
        let Some(selected) = keys.get_mut(idx) else {
            return;
        };
        selected.selection_count += 1;
        self.recompute(keys);
        debug!(
            "Prior updated for key {}: {:.4} (count {})",
            idx, keys[idx].prior, keys[idx].selection_count
        );
    }

    /// Recompute every prior from the current counts.
    pub fn recompute(&self, keys: &mut [KeyRuntimeState]) {
        let n = keys.len() as f64;
        let total: f64 = keys.iter().map(|k| f64::from(k.selection_count)).sum();
        let denom = self.pseudocount * n + total;
        if denom <= 0.0 {
            return;
        }
        for k in keys.iter_mut() {
            k.prior = (self.pseudocount + f64::from(k.selection_count)) / denom;
        }
    }

    /// Prior used for weighting; special keys get a floor without mutating
    /// the stored prior.
    pub fn effective_prior(&self, key: &KeyRuntimeState, special: bool) -> f64 {
        if special {
            key.prior.max(self.special_min_prior)
        } else {
            key.prior
        }
    }
}

// ── Tests ───────────────────────────────────────────────────
