//! Gaze sample input: the sample type, the single-slot latest-value cell
//! the tick loop reads from, and a deterministic synthetic source.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use tracing::{debug, warn};

use super::geometry::{Point, Rect};
use super::layout::{KeyDefinition, KeyId};

// ── GazeSample ──────────────────────────────────────────────

/// One observation from the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeSample {
    pub x: f64,
    pub y: f64,
    /// False when the tracker lost the eyes.
    pub valid: bool,
    /// Arrival time on the engine clock (seconds).
    pub timestamp_s: f64,
}

impl GazeSample {
    pub fn new(x: f64, y: f64, timestamp_s: f64) -> Self {
        Self {
            x,
            y,
            valid: true,
            timestamp_s,
        }
    }

    pub fn invalid(timestamp_s: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            valid: false,
            timestamp_s,
        }
    }

    /// The point, if the sample is valid and finite.
    pub fn point(&self) -> Option<Point> {
        if self.valid && self.x.is_finite() && self.y.is_finite() {
            Some(Point::new(self.x, self.y))
        } else {
            None
        }
    }
}

// ── SampleSlot ──────────────────────────────────────────────

/// Latest-value cell between the push-based source and the tick loop.
///
/// Writes overwrite; nothing is queued. A sample older than the timeout
/// reads as missing.
#[derive(Debug, Clone, Default)]
pub struct SampleSlot {
    latest: Option<GazeSample>,
    unread: bool,
    overwritten: u64,
}

impl SampleSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sample, replacing any unread one.
    pub fn put(&mut self, sample: GazeSample) {
        if self.unread {
            self.overwritten += 1;
        }
        self.latest = Some(sample);
        self.unread = true;
    }

    /// The most recent sample if it is no older than `timeout_s`.
    ///
    /// Reading does not consume. A tracker that stalls without reporting a
    /// loss has its last point held for up to `timeout_s`, so dwell keeps
    /// accumulating on it for that long; after that the sample reads as
    /// missing and the engine reports tracking loss.
    pub fn read(&mut self, now_s: f64, timeout_s: f64) -> Option<GazeSample> {
        self.unread = false;
        self.latest.filter(|s| now_s - s.timestamp_s <= timeout_s)
    }

    pub fn peek(&self) -> Option<GazeSample> {
        self.latest
    }

    /// Samples replaced before any tick read them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    pub fn clear(&mut self) {
        self.latest = None;
        self.unread = false;
    }
}

// ── SimulatedGaze ───────────────────────────────────────────

/// Synthetic eye-typing trace generator.
///
/// For each target key: a short linear saccade from the current point to
/// the key center, then a fixation with Gaussian jitter. Samples can be
/// randomly dropped to exercise tracking loss.
#[derive(Debug, Clone)]
pub struct SimulatedGaze {
    keys: Vec<(KeyDefinition, Rect)>,
    rng: Pcg64Mcg,
    pub sample_rate_hz: f64,
    /// Duration of each saccade (seconds).
    pub saccade_s: f64,
    /// Duration of the fixation on each target (seconds).
    pub fixation_s: f64,
    /// Standard deviation of fixation jitter (px).
    pub jitter_px: f64,
    /// Probability that a sample is reported invalid.
    pub dropout_probability: f64,
    position: Option<Point>,
    time_s: f64,
}

impl SimulatedGaze {
    /// Keys without a matching rectangle are never targeted.
    pub fn new(layout: &[KeyDefinition], geometry: &[(KeyId, Rect)], seed: u64) -> Self {
        let keys = layout
            .iter()
            .filter_map(|k| {
                geometry
                    .iter()
                    .find(|(id, _)| id == &k.id)
                    .map(|(_, r)| (k.clone(), *r))
            })
            .collect();
        Self {
            keys,
            rng: Pcg64Mcg::seed_from_u64(seed),
            sample_rate_hz: 60.0,
            saccade_s: 0.05,
            fixation_s: 1.0,
            jitter_px: 4.0,
            dropout_probability: 0.0,
            position: None,
            time_s: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter_px: f64) -> Self {
        self.jitter_px = jitter_px;
        self
    }

    pub fn with_fixation(mut self, fixation_s: f64) -> Self {
        self.fixation_s = fixation_s;
        self
    }

    pub fn with_dropouts(mut self, probability: f64) -> Self {
        self.dropout_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Current simulated clock.
    pub fn time_s(&self) -> f64 {
        self.time_s
    }

    fn interval(&self) -> f64 {
        1.0 / self.sample_rate_hz
    }

    /// Standard normal via Box-Muller.
    fn gaussian(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    fn emit(&mut self, p: Point, out: &mut Vec<GazeSample>) {
        self.time_s += self.interval();
        let sample = if self.dropout_probability > 0.0 && self.rng.gen_bool(self.dropout_probability) {
            GazeSample::invalid(self.time_s)
        } else {
            GazeSample::new(p.x, p.y, self.time_s)
        };
        out.push(sample);
    }

    /// The key that types `ch`, if the layout has one.
    pub fn key_for(&self, ch: char) -> Option<&KeyDefinition> {
        self.keys.iter().map(|(k, _)| k).find(|k| k.produces(ch))
    }

    /// Saccade to and fixate on one key.
    pub fn look_at(&mut self, id: &KeyId) -> Vec<GazeSample> {
        let Some(target) = self
            .keys
            .iter()
            .find(|(k, _)| &k.id == id)
            .map(|(_, r)| r.center())
        else {
            warn!("Simulated gaze: no geometry for key {}", id);
            return Vec::new();
        };

        let mut out = Vec::new();
        let saccade_steps = (self.saccade_s * self.sample_rate_hz).round() as usize;
        if let Some(from) = self.position {
            for step in 1..=saccade_steps {
                let t = step as f64 / saccade_steps as f64;
                let p = Point::new(
                    from.x + (target.x - from.x) * t,
                    from.y + (target.y - from.y) * t,
                );
                self.emit(p, &mut out);
            }
        }

        let fixation_steps = (self.fixation_s * self.sample_rate_hz).round() as usize;
        for _ in 0..fixation_steps {
            let jx = self.gaussian() * self.jitter_px;
            let jy = self.gaussian() * self.jitter_px;
            self.emit(Point::new(target.x + jx, target.y + jy), &mut out);
        }

        self.position = Some(target);
        out
    }

    /// Samples for typing `text`. Characters with no key are skipped.
    pub fn type_text(&mut self, text: &str) -> Vec<GazeSample> {
        let mut out = Vec::new();
        for ch in text.chars() {
            let Some(id) = self.key_for(ch).map(|k| k.id.clone()) else {
                warn!("Simulated gaze: no key types {:?}", ch);
                continue;
            };
            out.extend(self.look_at(&id));
        }
        debug!(
            "Simulated {} samples ({:.2}s) for {:?}",
            out.len(),
            self.time_s,
            text
        );
        out
    }

    /// Look at a fixed point, e.g. off the keyboard.
    pub fn look_away(&mut self, point: Point, duration_s: f64) -> Vec<GazeSample> {
        let mut out = Vec::new();
        let steps = (duration_s * self.sample_rate_hz).round() as usize;
        for _ in 0..steps {
            self.emit(point, &mut out);
        }
        self.position = Some(point);
        out
    }

    /// A run of invalid samples (eyes closed, tracker lost).
    pub fn tracking_gap(&mut self, duration_s: f64) -> Vec<GazeSample> {
        let steps = (duration_s * self.sample_rate_hz).round() as usize;
        (0..steps)
            .map(|_| {
                self.time_s += self.interval();
                GazeSample::invalid(self.time_s)
            })
            .collect()
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{qwerty_geometry, qwerty_layout};

    fn sim(seed: u64) -> SimulatedGaze {
        SimulatedGaze::new(&qwerty_layout(), &qwerty_geometry(0.0, 0.0, 60.0), seed)
    }

    #[test]
    fn test_sample_point() {
        assert_eq!(GazeSample::new(1.0, 2.0, 0.0).point(), Some(Point::new(1.0, 2.0)));
        assert_eq!(GazeSample::invalid(0.0).point(), None);
        assert_eq!(GazeSample::new(f64::NAN, 2.0, 0.0).point(), None);
    }

    #[test]
    fn test_slot_last_write_wins() {
        let mut slot = SampleSlot::new();
        slot.put(GazeSample::new(1.0, 1.0, 0.00));
        slot.put(GazeSample::new(2.0, 2.0, 0.01));
        assert_eq!(slot.overwritten(), 1);
        let s = slot.read(0.02, 0.25).unwrap();
        assert_eq!(s.x, 2.0);
        // Read does not consume; next put is not an overwrite
        slot.put(GazeSample::new(3.0, 3.0, 0.03));
        assert_eq!(slot.overwritten(), 1);
    }

    #[test]
    fn test_slot_timeout() {
        let mut slot = SampleSlot::new();
        assert!(slot.read(0.0, 0.25).is_none());
        slot.put(GazeSample::new(1.0, 1.0, 1.0));
        assert!(slot.read(1.2, 0.25).is_some());
        assert!(slot.read(1.3, 0.25).is_none(), "Stale sample reads as missing");
    }

    #[test]
    fn test_slot_holds_last_sample_until_timeout() {
        let mut slot = SampleSlot::new();
        let sample = GazeSample::new(5.0, 6.0, 2.0);
        slot.put(sample);
        for now in [2.0, 2.1, 2.2] {
            assert_eq!(slot.read(now, 0.25), Some(sample), "Held at {}", now);
        }
        assert_eq!(slot.read(2.3, 0.25), None);
        assert_eq!(slot.peek(), Some(sample), "Stale sample is still stored");
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let a = sim(7).type_text("hi");
        let b = sim(7).type_text("hi");
        assert_eq!(a, b);
        let c = sim(8).type_text("hi");
        assert_ne!(a, c);
    }

    #[test]
    fn test_fixation_centered_on_key() {
        let mut g = sim(1);
        let samples = g.look_at(&KeyId::from("g"));
        assert_eq!(samples.len(), 60, "No saccade for the first target");
        let rect = qwerty_geometry(0.0, 0.0, 60.0)
            .into_iter()
            .find(|(id, _)| id.as_str() == "g")
            .map(|(_, r)| r)
            .unwrap();
        let n = samples.len() as f64;
        let mx = samples.iter().map(|s| s.x).sum::<f64>() / n;
        let my = samples.iter().map(|s| s.y).sum::<f64>() / n;
        assert!(rect.center().distance(Point::new(mx, my)) < 3.0);
    }

    #[test]
    fn test_timestamps_monotonic() {
        let samples = sim(3).type_text("abc");
        assert!(samples.windows(2).all(|w| w[1].timestamp_s > w[0].timestamp_s));
        // 3 fixations + 2 saccades at 60 Hz
        assert_eq!(samples.len(), 3 * 60 + 2 * 3);
    }

    #[test]
    fn test_space_and_unknown_chars() {
        let mut g = sim(3);
        assert!(g.key_for(' ').is_some());
        assert!(g.key_for('A').is_some(), "Case-insensitive");
        assert!(g.type_text("?").is_empty());
    }

    #[test]
    fn test_dropouts() {
        let samples = sim(11).with_dropouts(0.5).type_text("e");
        let invalid = samples.iter().filter(|s| !s.valid).count();
        assert!(invalid > 5 && invalid < 55, "Got {} invalid", invalid);
    }
}
