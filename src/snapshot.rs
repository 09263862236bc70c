//! Read-only feedback snapshots.
//!
//! The tick loop mutates per-key state every frame; consumers only see an
//! immutable `EngineSnapshot` behind an `Arc`. `SnapshotPublisher` replaces
//! it when something visible changes (active key, fixation flag, highlight
//! set, an interest step of at least `interest_delta`) or when
//! `min_interval` has elapsed, so rendering is not tied to inference rate.

use std::sync::Arc;

use tracing::debug;

use super::geometry::Point;
use super::layout::KeyId;
use super::sexp::sexp_bool;

/// Feedback values for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySnapshot {
    pub id: KeyId,
    pub posterior: f64,
    pub interest: f64,
    /// Magnification in [0, 1]; always 0 under the baseline policy.
    pub zoom: f64,
    /// Posterior is at or above the feedback threshold.
    pub highlighted: bool,
}

/// Immutable view of the engine after a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSnapshot {
    pub active_key: Option<KeyId>,
    /// Layout order.
    pub keys: Vec<KeySnapshot>,
    pub is_fixating: bool,
    /// Smoothed gaze point, `None` while tracking is lost.
    pub gaze: Option<Point>,
    pub timestamp_s: f64,
    /// Incremented on every publication.
    pub sequence: u64,
}

impl EngineSnapshot {
    fn key(&self, id: &KeyId) -> Option<&KeySnapshot> {
        self.keys.iter().find(|k| &k.id == id)
    }

    pub fn posterior(&self, id: &KeyId) -> f64 {
        self.key(id).map(|k| k.posterior).unwrap_or(0.0)
    }

    pub fn interest(&self, id: &KeyId) -> f64 {
        self.key(id).map(|k| k.interest).unwrap_or(0.0)
    }

    pub fn zoom(&self, id: &KeyId) -> f64 {
        self.key(id).map(|k| k.zoom).unwrap_or(0.0)
    }

    pub fn posterior_by_key(&self) -> impl Iterator<Item = (&KeyId, f64)> {
        self.keys.iter().map(|k| (&k.id, k.posterior))
    }

    pub fn interest_by_key(&self) -> impl Iterator<Item = (&KeyId, f64)> {
        self.keys.iter().map(|k| (&k.id, k.interest))
    }

    pub fn zoom_by_key(&self) -> impl Iterator<Item = (&KeyId, f64)> {
        self.keys.iter().map(|k| (&k.id, k.zoom))
    }

    /// Keys whose posterior passes the feedback threshold.
    pub fn highlighted(&self) -> impl Iterator<Item = &KeyId> {
        self.keys.iter().filter(|k| k.highlighted).map(|k| &k.id)
    }

    pub fn status_sexp(&self) -> String {
        let active = self
            .active_key
            .as_ref()
            .map(|k| format!("\"{}\"", k))
            .unwrap_or_else(|| "nil".to_string());
        let gaze = self
            .gaze
            .map(|p| format!("({:.0} {:.0})", p.x, p.y))
            .unwrap_or_else(|| "nil".to_string());
        let highlighted: Vec<String> = self.highlighted().map(|k| format!("\"{}\"", k)).collect();
        format!(
            "(:active {} :fixating {} :gaze {} :highlighted ({}) :time {:.3} :sequence {})",
            active,
            sexp_bool(self.is_fixating),
            gaze,
            highlighted.join(" "),
            self.timestamp_s,
            self.sequence,
        )
    }
}

/// Rate- and threshold-limited snapshot publication.
#[derive(Debug)]
pub struct SnapshotPublisher {
    pub min_interval_s: f64,
    pub interest_delta: f64,
    latest: Arc<EngineSnapshot>,
    last_publish_s: Option<f64>,
    published: u64,
}

impl SnapshotPublisher {
    pub fn new(min_interval_s: f64, interest_delta: f64) -> Self {
        Self {
            min_interval_s,
            interest_delta,
            latest: Arc::new(EngineSnapshot::default()),
            last_publish_s: None,
            published: 0,
        }
    }

    /// Most recently published snapshot.
    pub fn latest(&self) -> Arc<EngineSnapshot> {
        Arc::clone(&self.latest)
    }

    pub fn published_count(&self) -> u64 {
        self.published
    }

    /// Whether `candidate` differs visibly from the published snapshot.
    fn visibly_changed(&self, candidate: &EngineSnapshot) -> bool {
        let prev = &self.latest;
        if prev.active_key != candidate.active_key
            || prev.is_fixating != candidate.is_fixating
            || prev.gaze.is_some() != candidate.gaze.is_some()
            || prev.keys.len() != candidate.keys.len()
        {
            return true;
        }
        prev.keys.iter().zip(candidate.keys.iter()).any(|(a, b)| {
            a.highlighted != b.highlighted
                || (a.interest - b.interest).abs() >= self.interest_delta
                // Interest reset to zero (selection, look-away) is always visible
                || (a.interest > 0.0 && b.interest == 0.0)
        })
    }

    /// Offer a freshly built snapshot. Returns true if it was published.
    pub fn offer(&mut self, mut candidate: EngineSnapshot, force: bool) -> bool {
        let due = match self.last_publish_s {
            None => true,
            Some(last) => candidate.timestamp_s - last >= self.min_interval_s,
        };
        if !(force || due || self.visibly_changed(&candidate)) {
            return false;
        }
        self.published += 1;
        candidate.sequence = self.published;
        self.last_publish_s = Some(candidate.timestamp_s);
        self.latest = Arc::new(candidate);
        debug!("Snapshot {} published", self.published);
        true
    }

    /// Publish an empty snapshot (engine stopped or cleared).
    pub fn reset(&mut self, keys: Vec<KeySnapshot>, now_s: f64) {
        self.offer(
            EngineSnapshot {
                keys,
                timestamp_s: now_s,
                ..EngineSnapshot::default()
            },
            true,
        );
    }
}

// ── Tests ───────────────────────────────────────────────────
