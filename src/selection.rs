//! Selection state machine: active-key tracking with hysteresis and
//! minimum dwell, interest accumulation, and the selection trigger.
//!
//! The accumulation policy is a strategy object chosen at construction:
//! `ActiveKeyOnly` (enhanced) accumulates only on the tracked key while
//! fixating; `AllKeysProportional` (baseline) accumulates on every key every
//! frame and fires for any key that crosses the threshold, which reproduces
//! the Midas-touch flaw on purpose.

use std::fmt;
use tracing::{debug, info};

use super::config::AccumulationPolicy;
use super::posterior::Posterior;

// ── Per-key runtime state ───────────────────────────────────

/// Mutable per-key state, owned by the tick loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyRuntimeState {
    /// Accumulated dwell-weighted posterior mass (seconds-equivalent, ≥ 0).
    pub interest: f64,
    /// Times this key has been selected in the current run.
    pub selection_count: u32,
    /// Frequency prior; all priors sum to 1.
    pub prior: f64,
    /// Most recent normalized posterior (feedback only).
    pub last_posterior: f64,
}

/// Multiply every key's interest by `factor`.
pub fn scale_interest(keys: &mut [KeyRuntimeState], factor: f64) {
    for k in keys.iter_mut() {
        k.interest = (k.interest * factor).max(0.0);
    }
}

/// Zero every key's interest.
pub fn clear_interest(keys: &mut [KeyRuntimeState]) {
    for k in keys.iter_mut() {
        k.interest = 0.0;
    }
}

// ── Accumulation strategy ───────────────────────────────────

/// Policy-specific behavior of the state machine.
pub trait AccumulationStrategy: fmt::Debug + Send {
    fn policy(&self) -> AccumulationPolicy;

    /// Whether switches are gated by hysteresis and minimum dwell.
    fn applies_hysteresis(&self) -> bool;

    /// Whether the tracked key gets a widened sigma.
    fn expands_active_key(&self) -> bool;

    /// Whether the departed key's interest is dropped on a non-fixation switch.
    fn resets_departed_key(&self) -> bool;

    /// Whether per-key zoom feedback is exposed.
    fn shows_zoom(&self) -> bool;

    /// Add this frame's interest.
    fn accumulate(
        &self,
        keys: &mut [KeyRuntimeState],
        posterior: &Posterior,
        tracked: Option<usize>,
        fixating: bool,
        dt_s: f64,
    );

    /// Keys whose interest triggers a selection this frame, in firing order.
    fn crossings(
        &self,
        keys: &[KeyRuntimeState],
        tracked: Option<usize>,
        fixating: bool,
        threshold: f64,
    ) -> Vec<usize>;
}

/// Enhanced policy: only the tracked key accumulates, only while fixating.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveKeyOnly;

impl AccumulationStrategy for ActiveKeyOnly {
    fn policy(&self) -> AccumulationPolicy {
        AccumulationPolicy::ActiveKeyOnly
    }

    fn applies_hysteresis(&self) -> bool {
        true
    }

    fn expands_active_key(&self) -> bool {
        true
    }

    fn resets_departed_key(&self) -> bool {
        true
    }

    fn shows_zoom(&self) -> bool {
        true
    }

    fn accumulate(
        &self,
        keys: &mut [KeyRuntimeState],
        posterior: &Posterior,
        tracked: Option<usize>,
        fixating: bool,
        dt_s: f64,
    ) {
        if !fixating {
            return;
        }
        if let Some(idx) = tracked {
            if let Some(k) = keys.get_mut(idx) {
                k.interest += dt_s * posterior.get(idx);
            }
        }
    }

    fn crossings(
        &self,
        keys: &[KeyRuntimeState],
        tracked: Option<usize>,
        fixating: bool,
        threshold: f64,
    ) -> Vec<usize> {
        match tracked {
            Some(idx) if fixating && keys.get(idx).is_some_and(|k| k.interest >= threshold) => {
                vec![idx]
            }
            _ => Vec::new(),
        }
    }
}

/// Baseline policy: every key accumulates its posterior every frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllKeysProportional;

impl AccumulationStrategy for AllKeysProportional {
    fn policy(&self) -> AccumulationPolicy {
        AccumulationPolicy::AllKeysProportional
    }

    fn applies_hysteresis(&self) -> bool {
        false
    }

    fn expands_active_key(&self) -> bool {
        false
    }

    fn resets_departed_key(&self) -> bool {
        false
    }

    fn shows_zoom(&self) -> bool {
        false
    }

    fn accumulate(
        &self,
        keys: &mut [KeyRuntimeState],
        posterior: &Posterior,
        _tracked: Option<usize>,
        _fixating: bool,
        dt_s: f64,
    ) {
        for (idx, k) in keys.iter_mut().enumerate() {
            k.interest += dt_s * posterior.get(idx);
        }
    }

    fn crossings(
        &self,
        keys: &[KeyRuntimeState],
        _tracked: Option<usize>,
        _fixating: bool,
        threshold: f64,
    ) -> Vec<usize> {
        keys.iter()
            .enumerate()
            .filter(|(_, k)| k.interest >= threshold)
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Build the strategy for a policy.
pub fn strategy_for(policy: AccumulationPolicy) -> Box<dyn AccumulationStrategy> {
    match policy {
        AccumulationPolicy::ActiveKeyOnly => Box::new(ActiveKeyOnly),
        AccumulationPolicy::AllKeysProportional => Box::new(AllKeysProportional),
    }
}

// ── Tracker state ───────────────────────────────────────────

/// Active-key tracking state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerState {
    /// No tracked key.
    Idle,
    /// A key is tracked since `since_s`.
    Tracking { key: usize, since_s: f64 },
}

/// What happened during one state machine step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    /// Tracked key changed: (previous, new).
    pub switched: Option<(Option<usize>, usize)>,
    /// A different candidate was held back by hysteresis or dwell.
    pub switch_suppressed: bool,
    /// Selected keys in firing order. Their interest is already zeroed.
    pub selected: Vec<usize>,
}

// ── State machine ───────────────────────────────────────────

/// Decides the tracked key, accumulates interest and fires selections.
#[derive(Debug)]
pub struct SelectionStateMachine {
    strategy: Box<dyn AccumulationStrategy>,
    /// Posterior lead a candidate needs over the tracked key to take over.
    pub hysteresis_threshold: f64,
    /// Time the tracked key must be held before a switch (seconds).
    pub min_dwell_before_switch_s: f64,
    /// Interest required to select.
    pub selection_threshold: f64,
    /// Factor applied to other keys' interest after a selection.
    pub selection_damping: f64,
    state: TrackerState,
}

impl SelectionStateMachine {
    pub fn new(
        strategy: Box<dyn AccumulationStrategy>,
        hysteresis_threshold: f64,
        min_dwell_before_switch_s: f64,
        selection_threshold: f64,
        selection_damping: f64,
    ) -> Self {
        info!(
            "Selection state machine initialized ({})",
            strategy.policy().as_str()
        );
        Self {
            strategy,
            hysteresis_threshold,
            min_dwell_before_switch_s,
            selection_threshold,
            selection_damping,
            state: TrackerState::Idle,
        }
    }

    pub fn strategy(&self) -> &dyn AccumulationStrategy {
        self.strategy.as_ref()
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn tracked(&self) -> Option<usize> {
        match self.state {
            TrackerState::Idle => None,
            TrackerState::Tracking { key, .. } => Some(key),
        }
    }

    /// Forget the tracked key and dwell timer.
    pub fn reset(&mut self) {
        self.state = TrackerState::Idle;
    }

    /// Run one frame: tracking decision, accumulation, selection trigger.
    pub fn step(
        &mut self,
        posterior: &Posterior,
        keys: &mut [KeyRuntimeState],
        fixating: bool,
        now_s: f64,
        dt_s: f64,
    ) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        let Some(candidate) = posterior.best else {
            return outcome;
        };

        match self.state {
            TrackerState::Idle => {
                self.switch_to(None, candidate, keys, fixating, now_s);
                outcome.switched = Some((None, candidate));
            }
            TrackerState::Tracking { key, since_s } if key != candidate => {
                let allowed = if self.strategy.applies_hysteresis() {
                    let lead = posterior.get(candidate) - posterior.get(key);
                    let dwelled = now_s - since_s;
                    lead >= self.hysteresis_threshold && dwelled >= self.min_dwell_before_switch_s
                } else {
                    true
                };
                if allowed {
                    self.switch_to(Some(key), candidate, keys, fixating, now_s);
                    outcome.switched = Some((Some(key), candidate));
                } else {
                    outcome.switch_suppressed = true;
                }
            }
            TrackerState::Tracking { .. } => {}
        }

        let tracked = self.tracked();
        self.strategy
            .accumulate(keys, posterior, tracked, fixating, dt_s);

        let crossings = self
            .strategy
            .crossings(keys, tracked, fixating, self.selection_threshold);
        for idx in crossings {
            // An earlier firing's damping may have pulled this key back under
            if keys.get(idx).map_or(true, |k| k.interest < self.selection_threshold) {
                continue;
            }
            self.fire(idx, keys);
            outcome.selected.push(idx);
        }

        outcome
    }

    fn switch_to(
        &mut self,
        from: Option<usize>,
        to: usize,
        keys: &mut [KeyRuntimeState],
        fixating: bool,
        now_s: f64,
    ) {
        if !fixating {
            if let Some(k) = keys.get_mut(to) {
                k.interest = 0.0;
            }
            if self.strategy.resets_departed_key() {
                if let Some(k) = from.and_then(|f| keys.get_mut(f)) {
                    k.interest = 0.0;
                }
            }
        }
        debug!("Active key {:?} -> {} (fixating: {})", from, to, fixating);
        self.state = TrackerState::Tracking {
            key: to,
            since_s: now_s,
        };
    }

    fn fire(&mut self, idx: usize, keys: &mut [KeyRuntimeState]) {
        let interest = keys.get(idx).map(|k| k.interest).unwrap_or(0.0);
        for (i, k) in keys.iter_mut().enumerate() {
            if i == idx {
                k.interest = 0.0;
            } else {
                k.interest *= self.selection_damping;
            }
        }
        self.state = TrackerState::Idle;
        debug!("Selection fired for key {} at interest {:.3}", idx, interest);
    }

    /// Per-key magnification in [0, 1]; neutral (0) when the policy has no zoom.
    pub fn zoom(&self, key: &KeyRuntimeState) -> f64 {
        if !self.strategy.shows_zoom() || self.selection_threshold <= 0.0 {
            return 0.0;
        }
        (key.interest / self.selection_threshold).clamp(0.0, 1.0)
    }
}

// ── Tests ───────────────────────────────────────────────────
