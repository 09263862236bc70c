//! Engine output events.
//!
//! `SelectionEvent` is the output contract to the editing collaborator;
//! the remaining variants are diagnostic transitions for overlays and logs.

use super::layout::{KeyDefinition, KeyId, KeyRole};
use super::sexp::escape_string;

/// A key was selected.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionEvent {
    pub key_id: KeyId,
    pub label: String,
    /// Literal text the key produces, if any.
    pub value: Option<String>,
    pub role: KeyRole,
    /// Engine time of the selection (seconds).
    pub timestamp_s: f64,
}

impl SelectionEvent {
    pub fn from_key(key: &KeyDefinition, timestamp_s: f64) -> Self {
        Self {
            key_id: key.id.clone(),
            label: key.label.clone(),
            value: key.value.clone(),
            role: key.role,
            timestamp_s,
        }
    }

    pub fn to_sexp(&self) -> String {
        let value = match &self.value {
            Some(v) => format!("\"{}\"", escape_string(v)),
            None => "nil".to_string(),
        };
        format!(
            "(:type :event :event :key-selected :key \"{}\" :label \"{}\" :value {} :role :{} :time {:.3})",
            escape_string(self.key_id.as_str()),
            escape_string(&self.label),
            value,
            self.role.as_str(),
            self.timestamp_s,
        )
    }
}

/// Everything a tick can report.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    KeySelected(SelectionEvent),
    /// The tracked key changed.
    ActiveKeyChanged {
        from: Option<KeyId>,
        to: KeyId,
        posterior: f64,
    },
    /// A fixation was confirmed at the smoothed point.
    FixationStarted { x: f64, y: f64 },
    /// Velocity rose above the threshold; interest was decayed.
    ScanDetected { velocity: f64 },
    /// Gaze left the keyboard bounds; interest and tracking were reset.
    OutOfBounds { x: f64, y: f64 },
    /// The tracker reported an invalid sample or samples stopped arriving.
    TrackingLost,
}

impl EngineEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeySelected(_) => "key-selected",
            Self::ActiveKeyChanged { .. } => "active-key-changed",
            Self::FixationStarted { .. } => "fixation-started",
            Self::ScanDetected { .. } => "scan-detected",
            Self::OutOfBounds { .. } => "out-of-bounds",
            Self::TrackingLost => "tracking-lost",
        }
    }

    /// The selection carried by this event, if it is one.
    pub fn selection(&self) -> Option<&SelectionEvent> {
        match self {
            Self::KeySelected(sel) => Some(sel),
            _ => None,
        }
    }

    /// Convert the event to an s-expression.
    pub fn to_sexp(&self) -> String {
        match self {
            Self::KeySelected(sel) => sel.to_sexp(),
            Self::ActiveKeyChanged {
                from,
                to,
                posterior,
            } => {
                let from_str = from
                    .as_ref()
                    .map(|k| format!("\"{}\"", escape_string(k.as_str())))
                    .unwrap_or_else(|| "nil".to_string());
                format!(
                    "(:type :event :event :active-key-changed :from {} :to \"{}\" :posterior {:.3})",
                    from_str,
                    escape_string(to.as_str()),
                    posterior
                )
            }
            Self::FixationStarted { x, y } => {
                format!(
                    "(:type :event :event :fixation-started :x {:.0} :y {:.0})",
                    x, y
                )
            }
            Self::ScanDetected { velocity } => {
                format!(
                    "(:type :event :event :scan-detected :velocity {:.0})",
                    velocity
                )
            }
            Self::OutOfBounds { x, y } => {
                format!(
                    "(:type :event :event :out-of-bounds :x {:.0} :y {:.0})",
                    x, y
                )
            }
            Self::TrackingLost => "(:type :event :event :tracking-lost)".to_string(),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────
