//! Posterior normalization: likelihood × effective prior over all keys
//! with geometry, renormalized every frame.

use super::layout::KeyDefinition;
use super::prior::PriorModel;
use super::selection::KeyRuntimeState;

/// One frame's posterior distribution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Posterior {
    /// Per-key posterior in layout order; 0 for keys excluded this frame.
    pub values: Vec<f64>,
    /// Highest posterior (lowest layout index wins ties).
    pub best: Option<usize>,
    pub second: Option<usize>,
    /// Keys that took part in this frame's computation.
    pub included: usize,
    /// Σ likelihood × prior before flooring.
    pub weighted_sum: f64,
}

impl Posterior {
    pub fn get(&self, idx: usize) -> f64 {
        self.values.get(idx).copied().unwrap_or(0.0)
    }

    pub fn best_value(&self) -> f64 {
        self.best.map(|i| self.get(i)).unwrap_or(0.0)
    }

    /// Margin of the best key over the runner-up.
    pub fn margin(&self) -> f64 {
        self.best_value() - self.second.map(|i| self.get(i)).unwrap_or(0.0)
    }
}

/// Normalizes weighted likelihoods into a posterior.
#[derive(Debug, Clone)]
pub struct PosteriorCalculator {
    /// Floor for the weighted sum.
    pub epsilon: f64,
}

impl PosteriorCalculator {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Compute the posterior and store it in each key's `last_posterior`.
    pub fn compute(
        &self,
        likelihoods: &[Option<f64>],
        defs: &[KeyDefinition],
        state: &mut [KeyRuntimeState],
        priors: &PriorModel,
    ) -> Posterior {
        let weighted: Vec<Option<f64>> = likelihoods
            .iter()
            .zip(defs.iter().zip(state.iter()))
            .map(|(l, (def, st))| l.map(|l| l * priors.effective_prior(st, def.is_special())))
            .collect();

        let weighted_sum: f64 = weighted.iter().flatten().sum();
        let denom = weighted_sum.max(self.epsilon);

        let mut post = Posterior {
            values: Vec::with_capacity(weighted.len()),
            weighted_sum,
            ..Posterior::default()
        };

        for (idx, w) in weighted.iter().enumerate() {
            let p = match w {
                Some(w) => {
                    post.included += 1;
                    w / denom
                }
                None => 0.0,
            };
            post.values.push(p);
            if let Some(st) = state.get_mut(idx) {
                st.last_posterior = p;
            }
            if w.is_none() {
                continue;
            }

            match post.best {
                None => post.best = Some(idx),
                Some(b) if p > post.values[b] => {
                    post.second = post.best;
                    post.best = Some(idx);
                }
                Some(_) => match post.second {
                    None => post.second = Some(idx),
                    Some(s) if p > post.values[s] => post.second = Some(idx),
                    Some(_) => {}
                },
            }
        }

        post
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{KeyGeometryCache, Point, Rect};
    use crate::layout::KeyDefinition;
    use crate::likelihood::LikelihoodModel;

    fn setup(n: usize) -> (Vec<KeyDefinition>, Vec<KeyRuntimeState>, PriorModel) {
        let defs: Vec<KeyDefinition> = (0..n)
            .map(|i| KeyDefinition::character(&((b'a' + i as u8) as char).to_string()))
            .collect();
        let priors = PriorModel::new(1.0, 0.05);
        let mut state = vec![KeyRuntimeState::default(); n];
        priors.initialize(&mut state);
        (defs, state, priors)
    }

    #[test]
    fn test_posterior_sums_to_one() {
        let (defs, mut state, priors) = setup(4);
        let l = vec![Some(0.9), Some(0.3), None, Some(0.01)];
        let post = PosteriorCalculator::new(1e-12).compute(&l, &defs, &mut state, &priors);
        let sum: f64 = post.values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "Sum {}", sum);
        assert_eq!(post.included, 3);
        assert_eq!(post.values[2], 0.0);
        assert_eq!(post.best, Some(0));
        assert_eq!(post.second, Some(1));
        assert!((state[1].last_posterior - post.values[1]).abs() < 1e-15);
    }

    #[test]
    fn test_three_sigma_scenario() {
        // A at distance 0, B at 3σ, uniform priors → posterior(A) > 0.95
        let (defs, mut state, priors) = setup(2);
        let mut geo = KeyGeometryCache::new(&defs, 0.5);
        geo.set_rect_at(0, Rect::new(0.0, 0.0, 40.0, 40.0));
        let sigma = geo.base_sigma().unwrap();
        geo.set_rect_at(1, Rect::new(3.0 * sigma, 0.0, 40.0, 40.0));

        let mut l = Vec::new();
        LikelihoodModel::new(1.0, 1.0).compute(
            Point::new(20.0, 20.0),
            &defs,
            &geo,
            sigma,
            None,
            false,
            &mut l,
        );
        let post = PosteriorCalculator::new(1e-12).compute(&l, &defs, &mut state, &priors);
        assert!(post.values[0] > 0.95, "posterior(A) = {}", post.values[0]);
        assert_eq!(post.best, Some(0));
    }

    #[test]
    fn test_ties_go_to_layout_order() {
        let (defs, mut state, priors) = setup(3);
        let l = vec![Some(0.2), Some(0.5), Some(0.5)];
        let post = PosteriorCalculator::new(1e-12).compute(&l, &defs, &mut state, &priors);
        assert_eq!(post.best, Some(1));
        assert_eq!(post.second, Some(2));
    }

    #[test]
    fn test_degenerate_sum_is_floored() {
        let (defs, mut state, priors) = setup(2);
        let l = vec![Some(0.0), Some(0.0)];
        let post = PosteriorCalculator::new(1e-12).compute(&l, &defs, &mut state, &priors);
        assert!(post.values.iter().all(|p| p.is_finite()));
        assert_eq!(post.weighted_sum, 0.0);
    }

    #[test]
    fn test_no_geometry_no_best() {
        let (defs, mut state, priors) = setup(2);
        let l = vec![None, None];
        let post = PosteriorCalculator::new(1e-12).compute(&l, &defs, &mut state, &priors);
        assert!(post.best.is_none());
        assert_eq!(post.included, 0);
    }

    #[test]
    fn test_margin() {
        let (defs, mut state, priors) = setup(2);
        let l = vec![Some(3.0), Some(1.0)];
        let post = PosteriorCalculator::new(1e-12).compute(&l, &defs, &mut state, &priors);
        assert!((post.margin() - 0.5).abs() < 1e-12);
    }
}
