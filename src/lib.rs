//! gaze-keys - Bayesian gaze-to-key selection for eye-typing keyboards.
//!
//! Turns a noisy stream of screen-space gaze samples into discrete key
//! selections: smoothing, velocity-gated fixation detection, a Gaussian
//! likelihood per key, a frequency prior learned from selections, and a
//! dwell/hysteresis state machine that fires when accumulated interest
//! crosses a threshold.
//!
//! The same engine runs two policies, chosen by `EngineConfig`:
//! `enhanced` (active-key-only accumulation, velocity gating, hysteresis)
//! and `baseline` (every key accumulates every frame).

pub mod analytics;
pub mod bounds;
pub mod config;
pub mod engine;
pub mod event;
pub mod fixation;
pub mod geometry;
pub mod layout;
pub mod likelihood;
pub mod posterior;
pub mod prior;
pub mod runtime;
pub mod selection;
pub mod sexp;
pub mod smoothing;
pub mod snapshot;
pub mod source;
pub mod trace;

pub use analytics::SelectionAnalytics;
pub use config::{AccumulationPolicy, ConfigError, EngineConfig};
pub use engine::{EngineState, GazeEngine};
pub use event::{EngineEvent, SelectionEvent};
pub use geometry::{KeyGeometryCache, Point, Rect};
pub use layout::{qwerty_geometry, qwerty_layout, KeyDefinition, KeyId, KeyRole};
pub use runtime::{replay, FrameLoop, LoopMessage};
pub use snapshot::EngineSnapshot;
pub use source::{GazeSample, SimulatedGaze};
pub use trace::{GazeTrace, TraceError};
