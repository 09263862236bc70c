//! Gaze selection engine: owns all per-key state and runs the per-frame
//! pipeline:
//!
//! sample slot → smoothing → bounds gate → fixation → likelihood →
//! posterior → selection state machine → priors → snapshot.
//!
//! Ticks are synchronous and never fail. Invalid input degrades to "no
//! active key" and is reported through events and the snapshot.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::bounds::{BoundsCheck, OutOfBoundsGate};
use super::config::EngineConfig;
use super::event::{EngineEvent, SelectionEvent};
use super::fixation::FixationDetector;
use super::geometry::{KeyGeometryCache, Point, Rect};
use super::layout::{KeyDefinition, KeyId};
use super::likelihood::LikelihoodModel;
use super::posterior::{Posterior, PosteriorCalculator};
use super::prior::PriorModel;
use super::selection::{
    clear_interest, scale_interest, strategy_for, KeyRuntimeState, SelectionStateMachine,
};
use super::smoothing::GazeSmoother;
use super::snapshot::{EngineSnapshot, KeySnapshot, SnapshotPublisher};
use super::source::{GazeSample, SampleSlot};

// ── Lifecycle ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    /// Started, waiting for the tracker's calibration to finish.
    AwaitingCalibration,
    Running,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::AwaitingCalibration => "awaiting-calibration",
            Self::Running => "running",
        }
    }
}

// ── GazeEngine ──────────────────────────────────────────────

pub struct GazeEngine {
    config: EngineConfig,
    keys: Vec<KeyDefinition>,
    state: Vec<KeyRuntimeState>,
    geometry: KeyGeometryCache,
    smoother: GazeSmoother,
    fixation: FixationDetector,
    likelihood: LikelihoodModel,
    priors: PriorModel,
    posterior_calc: PosteriorCalculator,
    gate: OutOfBoundsGate,
    selection: SelectionStateMachine,
    slot: SampleSlot,
    publisher: SnapshotPublisher,
    lifecycle: EngineState,
    last_tick_s: Option<f64>,
    now_s: f64,
    fixating: bool,
    /// No usable sample since the last loss (or since start).
    tracking_lost: bool,
    likelihoods: Vec<Option<f64>>,
    posterior: Posterior,
    ticks: u64,
    selections: u64,
    discarded_samples: u64,
}

impl GazeEngine {
    pub fn new(keys: Vec<KeyDefinition>, config: EngineConfig) -> Self {
        let geometry = KeyGeometryCache::new(&keys, config.sigma_ratio);
        let priors = PriorModel::new(config.prior_pseudocount, config.special_key_min_prior);
        let mut state = vec![KeyRuntimeState::default(); keys.len()];
        priors.initialize(&mut state);

        let selection = SelectionStateMachine::new(
            strategy_for(config.accumulation_policy),
            config.hysteresis_threshold,
            config.min_dwell_before_switch,
            config.selection_threshold,
            config.selection_damping,
        );

        if let Err(e) = config.validate() {
            warn!("Gaze engine config out of range: {}", e);
        }

        info!(
            "Gaze engine initialized: {} keys, {} policy, velocity gating {}",
            keys.len(),
            config.accumulation_policy.as_str(),
            if config.use_velocity_gating { "on" } else { "off" }
        );

        Self {
            smoother: GazeSmoother::new(config.gaze_history_size, config.gaze_smoothing_alpha),
            fixation: FixationDetector::new(
                config.use_velocity_gating,
                config.velocity_threshold,
                config.velocity_smoothing_alpha,
                config.min_fixation_duration,
            ),
            likelihood: LikelihoodModel::new(
                config.special_key_likelihood_boost,
                config.active_key_sigma_expansion,
            ),
            posterior_calc: PosteriorCalculator::new(config.posterior_epsilon),
            gate: OutOfBoundsGate::new(config.bounds_margin),
            publisher: SnapshotPublisher::new(
                config.snapshot_min_interval,
                config.interest_feedback_delta,
            ),
            selection,
            priors,
            geometry,
            state,
            keys,
            config,
            slot: SampleSlot::new(),
            lifecycle: EngineState::Stopped,
            last_tick_s: None,
            now_s: 0.0,
            fixating: false,
            tracking_lost: true,
            likelihoods: Vec::new(),
            posterior: Posterior::default(),
            ticks: 0,
            selections: 0,
            discarded_samples: 0,
        }
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn keys(&self) -> &[KeyDefinition] {
        &self.keys
    }

    pub fn key_states(&self) -> &[KeyRuntimeState] {
        &self.state
    }

    pub fn key_state(&self, id: &KeyId) -> Option<&KeyRuntimeState> {
        self.geometry.index_of(id).and_then(|i| self.state.get(i))
    }

    pub fn lifecycle(&self) -> EngineState {
        self.lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == EngineState::Running
    }

    pub fn tracked_key(&self) -> Option<&KeyId> {
        self.selection.tracked().map(|i| &self.keys[i].id)
    }

    pub fn is_fixating(&self) -> bool {
        self.fixating
    }

    pub fn smoothed_point(&self) -> Option<Point> {
        self.smoother.current()
    }

    /// Posterior from the most recent tick that ran inference.
    pub fn last_posterior(&self) -> &Posterior {
        &self.posterior
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        self.publisher.latest()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn now_s(&self) -> f64 {
        self.now_s
    }

    // ── Geometry ────────────────────────────────────────────

    pub fn geometry(&self) -> &KeyGeometryCache {
        &self.geometry
    }

    pub fn geometry_mut(&mut self) -> &mut KeyGeometryCache {
        &mut self.geometry
    }

    pub fn set_key_rect(&mut self, id: &KeyId, rect: Rect) -> Result<(), String> {
        self.geometry.set_rect(id, rect)
    }

    /// Apply a renderer geometry pass. Returns the number of unknown ids.
    pub fn update_geometry<'a, I>(&mut self, rects: I) -> usize
    where
        I: IntoIterator<Item = (&'a KeyId, Rect)>,
    {
        self.geometry.refresh(rects)
    }

    // ── Tunables ────────────────────────────────────────────

    pub fn set_selection_threshold(&mut self, threshold: f64) {
        self.config.selection_threshold = threshold;
        self.selection.selection_threshold = threshold;
        info!("Selection threshold set to {:.2}", threshold);
    }

    pub fn set_hysteresis_threshold(&mut self, threshold: f64) {
        self.config.hysteresis_threshold = threshold;
        self.selection.hysteresis_threshold = threshold;
        info!("Hysteresis threshold set to {:.2}", threshold);
    }

    // ── Lifecycle ───────────────────────────────────────────

    /// Begin a run. Samples are ignored until calibration completes.
    pub fn start(&mut self) {
        if self.lifecycle != EngineState::Stopped {
            debug!("Gaze engine already started ({})", self.lifecycle.as_str());
            return;
        }
        self.reset_run();
        self.lifecycle = EngineState::AwaitingCalibration;
        info!("Gaze engine started, awaiting calibration");
    }

    pub fn calibration_complete(&mut self) {
        match self.lifecycle {
            EngineState::AwaitingCalibration => {
                self.lifecycle = EngineState::Running;
                info!("Calibration complete, gaze engine running");
            }
            EngineState::Running => debug!("Calibration complete while already running"),
            EngineState::Stopped => warn!("Calibration complete ignored: engine stopped"),
        }
    }

    /// Stop ticking and reset every piece of run state, priors included.
    pub fn stop(&mut self) {
        if self.lifecycle == EngineState::Stopped {
            return;
        }
        self.reset_run();
        self.lifecycle = EngineState::Stopped;
        info!(
            "Gaze engine stopped after {} ticks, {} selections",
            self.ticks, self.selections
        );
    }

    /// User-level reset: interest and tracking go, learned priors stay.
    pub fn clear(&mut self) {
        clear_interest(&mut self.state);
        self.reset_tracking();
        self.smoother.clear();
        self.slot.clear();
        self.tracking_lost = true;
        let keys = self.key_snapshots();
        self.publisher.reset(keys, self.now_s);
        info!("Gaze engine cleared");
    }

    fn reset_run(&mut self) {
        self.priors.initialize(&mut self.state);
        for k in self.state.iter_mut() {
            k.interest = 0.0;
            k.last_posterior = 0.0;
        }
        self.reset_tracking();
        self.smoother.clear();
        self.slot.clear();
        self.last_tick_s = None;
        self.tracking_lost = true;
        self.posterior = Posterior::default();
        let keys = self.key_snapshots();
        self.publisher.reset(keys, self.now_s);
    }

    fn reset_tracking(&mut self) {
        self.selection.reset();
        self.fixation.reset();
        self.gate.reset();
        self.fixating = false;
    }

    // ── Input ───────────────────────────────────────────────

    /// Store the latest tracker sample. Ignored unless running.
    pub fn push_sample(&mut self, sample: GazeSample) {
        if self.lifecycle != EngineState::Running {
            self.discarded_samples += 1;
            return;
        }
        self.slot.put(sample);
    }

    // ── Tick ────────────────────────────────────────────────

    /// Run one frame at `now_s`, deriving the delta from the previous tick.
    pub fn tick(&mut self, now_s: f64) -> Vec<EngineEvent> {
        let dt_s = match self.last_tick_s {
            Some(last) => now_s - last,
            None => self.config.frame_interval,
        };
        self.tick_with_delta(now_s, dt_s)
    }

    /// Run one frame with an explicit delta (clamped to `max_frame_dt`).
    pub fn tick_with_delta(&mut self, now_s: f64, dt_s: f64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.lifecycle != EngineState::Running {
            return events;
        }
        let dt_s = dt_s.max(0.0).min(self.config.max_frame_dt).max(0.0);
        self.last_tick_s = Some(now_s);
        self.now_s = now_s;
        self.ticks += 1;

        self.run_pipeline(now_s, dt_s, &mut events);

        let force = !events.is_empty();
        let candidate = self.build_snapshot(now_s);
        self.publisher.offer(candidate, force);
        events
    }

    fn run_pipeline(&mut self, now_s: f64, dt_s: f64, events: &mut Vec<EngineEvent>) {
        // ── Step 1: Latest sample + smoothing ──
        let raw = self
            .slot
            .read(now_s, self.config.sample_timeout)
            .and_then(|s| s.point());
        let Some(point) = self.smoother.update(raw) else {
            if !self.tracking_lost {
                self.tracking_lost = true;
                // The tracked key and its interest survive a blink
                self.fixation.clear_history();
                debug!("Tracking lost, active key and interest kept");
                events.push(EngineEvent::TrackingLost);
            }
            return;
        };
        self.tracking_lost = false;

        // ── Step 2: Geometry ──
        let Some(base_sigma) = self.geometry.base_sigma() else {
            return;
        };

        // ── Step 3: Out-of-bounds gate ──
        match self.gate.update(point, &self.geometry) {
            (BoundsCheck::NoGeometry, _) => return,
            (BoundsCheck::Outside, entered) => {
                clear_interest(&mut self.state);
                for k in self.state.iter_mut() {
                    k.last_posterior = 0.0;
                }
                self.selection.reset();
                self.fixation.reset();
                self.fixating = false;
                self.posterior = Posterior::default();
                if entered {
                    debug!("Gaze out of bounds at ({:.0}, {:.0}), interest reset", point.x, point.y);
                    events.push(EngineEvent::OutOfBounds {
                        x: point.x,
                        y: point.y,
                    });
                }
                return;
            }
            (BoundsCheck::Inside, _) => {}
        }

        // ── Step 4: Fixation ──
        let fix = self.fixation.update(point, dt_s, now_s);
        self.fixating = fix.fixating;
        if fix.scan_started {
            scale_interest(&mut self.state, self.config.scan_decay_factor);
            events.push(EngineEvent::ScanDetected {
                velocity: fix.velocity,
            });
        }
        if fix.fixation_started {
            events.push(EngineEvent::FixationStarted {
                x: point.x,
                y: point.y,
            });
        }

        // ── Step 5: Likelihood + posterior ──
        let tracked = self.selection.tracked();
        self.likelihood.compute(
            point,
            &self.keys,
            &self.geometry,
            base_sigma,
            tracked,
            self.selection.strategy().expands_active_key(),
            &mut self.likelihoods,
        );
        self.posterior =
            self.posterior_calc
                .compute(&self.likelihoods, &self.keys, &mut self.state, &self.priors);
        if self.posterior.included == 0 {
            return;
        }

        // ── Step 6: Tracking, accumulation, selection ──
        let outcome = self
            .selection
            .step(&self.posterior, &mut self.state, self.fixating, now_s, dt_s);

        if let Some((from, to)) = outcome.switched {
            events.push(EngineEvent::ActiveKeyChanged {
                from: from.map(|i| self.keys[i].id.clone()),
                to: self.keys[to].id.clone(),
                posterior: self.posterior.get(to),
            });
        }

        if outcome.selected.is_empty() {
            return;
        }

        // ── Step 7: Selection side effects ──
        for idx in outcome.selected {
            self.priors.record_selection(&mut self.state, idx);
            self.selections += 1;
            let key = &self.keys[idx];
            info!(
                "Key selected: {} (posterior {:.3}, prior {:.4})",
                key.id,
                self.posterior.get(idx),
                self.state[idx].prior
            );
            events.push(EngineEvent::KeySelected(SelectionEvent::from_key(key, now_s)));
        }
        self.fixation.reset();
        self.fixating = false;
    }

    // ── Snapshot ────────────────────────────────────────────

    fn key_snapshots(&self) -> Vec<KeySnapshot> {
        self.keys
            .iter()
            .zip(self.state.iter())
            .map(|(def, st)| KeySnapshot {
                id: def.id.clone(),
                posterior: st.last_posterior,
                interest: st.interest,
                zoom: self.selection.zoom(st),
                highlighted: st.last_posterior >= self.config.min_posterior_for_feedback
                    && st.last_posterior > 0.0,
            })
            .collect()
    }

    fn build_snapshot(&self, now_s: f64) -> EngineSnapshot {
        EngineSnapshot {
            active_key: self.tracked_key().cloned(),
            keys: self.key_snapshots(),
            is_fixating: self.fixating,
            gaze: self.smoother.current(),
            timestamp_s: now_s,
            sequence: 0,
        }
    }

    /// Status s-expression.
    pub fn status_sexp(&self) -> String {
        let active = self
            .tracked_key()
            .map(|k| format!("\"{}\"", k))
            .unwrap_or_else(|| "nil".to_string());
        let sigma = self
            .geometry
            .base_sigma()
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:state :{} :policy :{} :velocity-gating {} :active {} :fixating {} :tracking {} :velocity {:.0} :ticks {} :selections {} :geometry {} :keys {} :base-sigma {} :discarded-samples {} :overwritten-samples {})",
            self.lifecycle.as_str(),
            self.config.accumulation_policy.as_str(),
            super::sexp::sexp_bool(self.config.use_velocity_gating),
            active,
            super::sexp::sexp_bool(self.fixating),
            super::sexp::sexp_bool(!self.tracking_lost),
            self.fixation.velocity(),
            self.ticks,
            self.selections,
            self.geometry.known_count(),
            self.keys.len(),
            sigma,
            self.discarded_samples,
            self.slot.overwritten(),
        )
    }
}

// ── Tests ───────────────────────────────────────────────────
