//! Session analytics for selection quality.
//!
//! Counts selections and the diagnostic transitions around them. When an
//! intended text is known (simulation, scripted trials) every selection is
//! scored against the next expected character; a mismatch is a Midas-touch
//! error and does not advance the cursor.

use std::collections::BTreeMap;

use super::event::{EngineEvent, SelectionEvent};
use super::layout::{KeyId, KeyRole};

/// Inter-selection intervals kept for the mean.
const INTERVAL_WINDOW: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct SelectionAnalytics {
    pub selections: u64,
    pub per_key: BTreeMap<KeyId, u64>,
    pub scans: u64,
    pub out_of_bounds: u64,
    pub tracking_losses: u64,
    pub active_key_changes: u64,
    /// Recent inter-selection intervals (seconds).
    pub intervals: Vec<f64>,
    pub session_start_s: f64,
    last_selection_s: Option<f64>,
    /// Text produced so far (backspace applied).
    pub typed: String,
    intended: Option<Vec<char>>,
    cursor: usize,
    pub correct: u64,
    pub errors: u64,
}

impl SelectionAnalytics {
    pub fn new(session_start_s: f64) -> Self {
        Self {
            session_start_s,
            ..Self::default()
        }
    }

    /// Score selections against `text`.
    pub fn with_intended(mut self, text: &str) -> Self {
        self.intended = Some(text.to_lowercase().chars().collect());
        self
    }

    pub fn record(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::KeySelected(sel) => self.record_selection(sel),
            EngineEvent::ActiveKeyChanged { .. } => self.active_key_changes += 1,
            EngineEvent::ScanDetected { .. } => self.scans += 1,
            EngineEvent::OutOfBounds { .. } => self.out_of_bounds += 1,
            EngineEvent::TrackingLost => self.tracking_losses += 1,
            EngineEvent::FixationStarted { .. } => {}
        }
    }

    pub fn record_all<'a>(&mut self, events: impl IntoIterator<Item = &'a EngineEvent>) {
        for ev in events {
            self.record(ev);
        }
    }

    fn record_selection(&mut self, sel: &SelectionEvent) {
        self.selections += 1;
        *self.per_key.entry(sel.key_id.clone()).or_insert(0) += 1;

        if let Some(last) = self.last_selection_s {
            if self.intervals.len() >= INTERVAL_WINDOW {
                self.intervals.remove(0);
            }
            self.intervals.push(sel.timestamp_s - last);
        }
        self.last_selection_s = Some(sel.timestamp_s);

        match sel.role {
            KeyRole::Backspace => {
                self.typed.pop();
            }
            _ => {
                if let Some(v) = &sel.value {
                    self.typed.push_str(v);
                }
            }
        }

        if let Some(intended) = &self.intended {
            let expected = intended.get(self.cursor).copied();
            let got = sel.value.as_deref().and_then(|v| v.chars().next());
            match (expected, got) {
                (Some(e), Some(g)) if e.eq_ignore_ascii_case(&g) => {
                    self.correct += 1;
                    self.cursor += 1;
                }
                _ => self.errors += 1,
            }
        }
    }

    pub fn count_for(&self, id: &KeyId) -> u64 {
        self.per_key.get(id).copied().unwrap_or(0)
    }

    pub fn selections_per_minute(&self, now_s: f64) -> f64 {
        let elapsed_min = (now_s - self.session_start_s) / 60.0;
        if elapsed_min <= 0.0 {
            return 0.0;
        }
        self.selections as f64 / elapsed_min
    }

    pub fn mean_interval_s(&self) -> f64 {
        if self.intervals.is_empty() {
            0.0
        } else {
            self.intervals.iter().sum::<f64>() / self.intervals.len() as f64
        }
    }

    /// Fraction of selections that matched the intended text.
    pub fn accuracy(&self) -> Option<f64> {
        self.intended.as_ref()?;
        let scored = self.correct + self.errors;
        if scored == 0 {
            return Some(0.0);
        }
        Some(self.correct as f64 / scored as f64)
    }

    /// Whether the whole intended text has been produced.
    pub fn completed(&self) -> bool {
        self.intended
            .as_ref()
            .is_some_and(|t| self.cursor >= t.len())
    }

    pub fn status_sexp(&self, now_s: f64) -> String {
        let accuracy = self
            .accuracy()
            .map(|a| format!("{:.3}", a))
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:selections {} :correct {} :errors {} :accuracy {} :per-minute {:.1} :mean-interval-s {:.3} :scans {} :out-of-bounds {} :tracking-losses {} :switches {} :typed \"{}\")",
            self.selections,
            self.correct,
            self.errors,
            accuracy,
            self.selections_per_minute(now_s),
            self.mean_interval_s(),
            self.scans,
            self.out_of_bounds,
            self.tracking_losses,
            self.active_key_changes,
            super::sexp::escape_string(&self.typed),
        )
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::KeyDefinition;

    fn selected(ch: &str, t: f64) -> EngineEvent {
        EngineEvent::KeySelected(SelectionEvent::from_key(&KeyDefinition::character(ch), t))
    }

    #[test]
    fn test_counts_and_rate() {
        let mut a = SelectionAnalytics::new(0.0);
        a.record(&selected("h", 1.0));
        a.record(&selected("i", 2.0));
        a.record(&selected("h", 4.0));
        assert_eq!(a.selections, 3);
        assert_eq!(a.count_for(&KeyId::from("h")), 2);
        assert_eq!(a.count_for(&KeyId::from("z")), 0);
        assert!((a.mean_interval_s() - 1.5).abs() < 1e-12);
        assert!((a.selections_per_minute(60.0) - 3.0).abs() < 1e-12);
        assert_eq!(a.selections_per_minute(0.0), 0.0);
        assert_eq!(a.typed, "hih");
    }

    #[test]
    fn test_accuracy_against_intended() {
        let mut a = SelectionAnalytics::new(0.0).with_intended("hi");
        a.record(&selected("h", 1.0));
        a.record(&selected("j", 2.0)); // Midas touch on a neighbour
        a.record(&selected("i", 3.0));
        assert_eq!(a.correct, 2);
        assert_eq!(a.errors, 1);
        assert!(a.completed());
        assert!((a.accuracy().unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_backspace_edits_typed() {
        let mut a = SelectionAnalytics::new(0.0);
        a.record(&selected("a", 1.0));
        a.record(&selected("b", 2.0));
        a.record(&EngineEvent::KeySelected(SelectionEvent::from_key(
            &KeyDefinition::special("backspace", "⌫", KeyRole::Backspace),
            3.0,
        )));
        assert_eq!(a.typed, "a");
    }

    #[test]
    fn test_diagnostic_counters() {
        let mut a = SelectionAnalytics::new(0.0);
        a.record_all(&[
            EngineEvent::TrackingLost,
            EngineEvent::ScanDetected { velocity: 900.0 },
            EngineEvent::OutOfBounds { x: 0.0, y: 0.0 },
        ]);
        assert_eq!(a.tracking_losses, 1);
        assert_eq!(a.scans, 1);
        assert_eq!(a.out_of_bounds, 1);
        assert_eq!(a.accuracy(), None);
    }

    #[test]
    fn test_status_sexp_parses() {
        let mut a = SelectionAnalytics::new(0.0).with_intended("a");
        a.record(&selected("a", 1.0));
        let s = a.status_sexp(2.0);
        assert!(s.contains(":selections 1"), "Got {}", s);
        assert!(s.contains(":accuracy 1.000"));
        assert!(lexpr::from_str(&s).is_ok());
    }
}
