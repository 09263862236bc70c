//! Engine configuration: the full parameter set, the two presets, and
//! s-expression plist loading.
//!
//! A config file is a single plist with kebab-case keys:
//!
//! ```text
//! (:preset baseline :sigma-ratio 0.5 :selection-threshold 0.8)
//! ```
//!
//! `:preset` picks the starting point (`enhanced` by default); every other
//! key overrides one field. Unknown keys are rejected.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use super::sexp::{get_bool, get_float, get_int, get_keyword, plist_keys, sexp_bool};

// ── Errors ──────────────────────────────────────────────────

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config s-expression: {0}")]
    Parse(String),
    #[error("unknown preset: {0}")]
    UnknownPreset(String),
    #[error("unknown accumulation policy: {0}")]
    UnknownPolicy(String),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} out of range: {value} ({expected})")]
    OutOfRange {
        key: &'static str,
        value: f64,
        expected: &'static str,
    },
}

// ── Accumulation policy ─────────────────────────────────────

/// How interest is accumulated and selections are triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulationPolicy {
    /// Only the tracked key accumulates, only while fixating (enhanced).
    ActiveKeyOnly,
    /// Every key accumulates its posterior every frame (baseline).
    AllKeysProportional,
}

impl AccumulationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActiveKeyOnly => "active-key-only",
            Self::AllKeysProportional => "all-keys-proportional",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active-key-only" => Some(Self::ActiveKeyOnly),
            "all-keys-proportional" => Some(Self::AllKeysProportional),
            _ => None,
        }
    }
}

// ── EngineConfig ────────────────────────────────────────────

/// Process-wide engine parameters, fixed for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Likelihood sigma as a fraction of the reference key size.
    pub sigma_ratio: f64,
    /// Interest required to select a key (seconds-equivalent).
    pub selection_threshold: f64,
    /// Exponential factor applied after the moving average.
    pub gaze_smoothing_alpha: f64,
    /// Raw samples kept for the moving average.
    pub gaze_history_size: usize,
    /// Dirichlet pseudocount `k`.
    pub prior_pseudocount: f64,
    pub special_key_likelihood_boost: f64,
    pub special_key_min_prior: f64,
    /// Sigma multiplier for the tracked key (enhanced only).
    pub active_key_sigma_expansion: f64,
    /// Posterior lead a candidate needs to take over the tracked key.
    pub hysteresis_threshold: f64,
    /// Seconds the tracked key is held before a switch is allowed.
    pub min_dwell_before_switch: f64,
    /// Low-velocity threshold (px/s).
    pub velocity_threshold: f64,
    pub velocity_smoothing_alpha: f64,
    /// Seconds of continuous low velocity before a fixation is declared.
    pub min_fixation_duration: f64,
    /// Posterior above which a key is highlighted.
    pub min_posterior_for_feedback: f64,
    pub accumulation_policy: AccumulationPolicy,
    pub use_velocity_gating: bool,
    /// Interest multiplier applied to every key when a scan starts.
    pub scan_decay_factor: f64,
    /// Interest multiplier applied to the other keys after a selection.
    pub selection_damping: f64,
    /// Margin around the keyboard bounds before gaze counts as away (px).
    pub bounds_margin: f64,
    /// Upper clamp for the per-tick delta (s).
    pub max_frame_dt: f64,
    /// Nominal tick interval, used for the first tick of a run (s).
    pub frame_interval: f64,
    /// Samples older than this count as missing (s).
    pub sample_timeout: f64,
    /// Floor for the posterior normalizer.
    pub posterior_epsilon: f64,
    /// Minimum spacing between routine snapshot publications (s).
    pub snapshot_min_interval: f64,
    /// Interest change that forces a snapshot publication regardless of rate.
    pub interest_feedback_delta: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::enhanced()
    }
}

impl EngineConfig {
    /// Velocity-gated, hysteresis-guarded, active-key-only accumulation.
    pub fn enhanced() -> Self {
        Self {
            sigma_ratio: 0.45,
            selection_threshold: 0.6,
            gaze_smoothing_alpha: 0.35,
            gaze_history_size: 5,
            prior_pseudocount: 1.0,
            special_key_likelihood_boost: 1.2,
            special_key_min_prior: 0.05,
            active_key_sigma_expansion: 1.5,
            hysteresis_threshold: 0.15,
            min_dwell_before_switch: 0.15,
            velocity_threshold: 400.0,
            velocity_smoothing_alpha: 0.4,
            min_fixation_duration: 0.08,
            min_posterior_for_feedback: 0.1,
            accumulation_policy: AccumulationPolicy::ActiveKeyOnly,
            use_velocity_gating: true,
            scan_decay_factor: 0.3,
            selection_damping: 0.5,
            bounds_margin: 40.0,
            max_frame_dt: 0.1,
            frame_interval: 1.0 / 60.0,
            sample_timeout: 0.25,
            posterior_epsilon: 1e-12,
            snapshot_min_interval: 1.0 / 30.0,
            interest_feedback_delta: 0.05,
        }
    }

    /// The comparison baseline: no velocity gating, no hysteresis or zoom,
    /// accumulation on every key every frame.
    pub fn baseline() -> Self {
        Self {
            gaze_smoothing_alpha: 0.5,
            gaze_history_size: 3,
            accumulation_policy: AccumulationPolicy::AllKeysProportional,
            use_velocity_gating: false,
            ..Self::enhanced()
        }
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "enhanced" => Ok(Self::enhanced()),
            "baseline" => Ok(Self::baseline()),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }

    /// Name of the preset this config matches, if unchanged.
    pub fn preset_name(&self) -> Option<&'static str> {
        if *self == Self::enhanced() {
            Some("enhanced")
        } else if *self == Self::baseline() {
            Some("baseline")
        } else {
            None
        }
    }

    /// Parse a plist config, starting from its `:preset` (default enhanced).
    pub fn from_sexp(src: &str) -> Result<Self, ConfigError> {
        let value = lexpr::from_str(src).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut config = match get_keyword(&value, "preset") {
            Some(name) => Self::preset(&name)?,
            None => Self::enhanced(),
        };

        for key in plist_keys(&value) {
            config.apply(&value, &key)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_sexp(&src)?;
        info!(
            "Loaded engine config from {} ({})",
            path.display(),
            config.accumulation_policy.as_str()
        );
        Ok(config)
    }

    fn apply(&mut self, value: &lexpr::Value, key: &str) -> Result<(), ConfigError> {
        fn float(value: &lexpr::Value, key: &'static str) -> Result<f64, ConfigError> {
            get_float(value, key).ok_or_else(|| ConfigError::InvalidValue {
                key,
                value: get_keyword(value, key).unwrap_or_default(),
            })
        }

        match key {
            "preset" => {}
            "sigma-ratio" => self.sigma_ratio = float(value, "sigma-ratio")?,
            "selection-threshold" => self.selection_threshold = float(value, "selection-threshold")?,
            "gaze-smoothing-alpha" => {
                self.gaze_smoothing_alpha = float(value, "gaze-smoothing-alpha")?
            }
            "gaze-history-size" => {
                let n = get_int(value, "gaze-history-size")
                    .filter(|n| *n >= 0)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: "gaze-history-size",
                        value: get_keyword(value, "gaze-history-size").unwrap_or_default(),
                    })?;
                self.gaze_history_size = n as usize;
            }
            "prior-pseudocount" => self.prior_pseudocount = float(value, "prior-pseudocount")?,
            "special-key-likelihood-boost" => {
                self.special_key_likelihood_boost = float(value, "special-key-likelihood-boost")?
            }
            "special-key-min-prior" => {
                self.special_key_min_prior = float(value, "special-key-min-prior")?
            }
            "active-key-sigma-expansion" => {
                self.active_key_sigma_expansion = float(value, "active-key-sigma-expansion")?
            }
            "hysteresis-threshold" => {
                self.hysteresis_threshold = float(value, "hysteresis-threshold")?
            }
            "min-dwell-before-switch" => {
                self.min_dwell_before_switch = float(value, "min-dwell-before-switch")?
            }
            "velocity-threshold" => self.velocity_threshold = float(value, "velocity-threshold")?,
            "velocity-smoothing-alpha" => {
                self.velocity_smoothing_alpha = float(value, "velocity-smoothing-alpha")?
            }
            "min-fixation-duration" => {
                self.min_fixation_duration = float(value, "min-fixation-duration")?
            }
            "min-posterior-for-feedback" => {
                self.min_posterior_for_feedback = float(value, "min-posterior-for-feedback")?
            }
            "accumulation-policy" => {
                let name = get_keyword(value, "accumulation-policy").unwrap_or_default();
                self.accumulation_policy = AccumulationPolicy::from_str(&name)
                    .ok_or(ConfigError::UnknownPolicy(name))?;
            }
            "use-velocity-gating" => {
                self.use_velocity_gating = get_bool(value, "use-velocity-gating").ok_or_else(|| {
                    ConfigError::InvalidValue {
                        key: "use-velocity-gating",
                        value: get_keyword(value, "use-velocity-gating").unwrap_or_default(),
                    }
                })?
            }
            "scan-decay-factor" => self.scan_decay_factor = float(value, "scan-decay-factor")?,
            "selection-damping" => self.selection_damping = float(value, "selection-damping")?,
            "bounds-margin" => self.bounds_margin = float(value, "bounds-margin")?,
            "max-frame-dt" => self.max_frame_dt = float(value, "max-frame-dt")?,
            "frame-interval" => self.frame_interval = float(value, "frame-interval")?,
            "sample-timeout" => self.sample_timeout = float(value, "sample-timeout")?,
            "posterior-epsilon" => self.posterior_epsilon = float(value, "posterior-epsilon")?,
            "snapshot-min-interval" => {
                self.snapshot_min_interval = float(value, "snapshot-min-interval")?
            }
            "interest-feedback-delta" => {
                self.interest_feedback_delta = float(value, "interest-feedback-delta")?
            }
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Reject parameter values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange {
                    key,
                    value,
                    expected: "> 0",
                })
            }
        }
        fn non_negative(key: &'static str, value: f64) -> Result<(), ConfigError> {
            if value >= 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange {
                    key,
                    value,
                    expected: ">= 0",
                })
            }
        }
        fn alpha(key: &'static str, value: f64) -> Result<(), ConfigError> {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange {
                    key,
                    value,
                    expected: "in (0, 1]",
                })
            }
        }
        fn unit(key: &'static str, value: f64) -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange {
                    key,
                    value,
                    expected: "in [0, 1]",
                })
            }
        }

        positive("sigma-ratio", self.sigma_ratio)?;
        positive("selection-threshold", self.selection_threshold)?;
        alpha("gaze-smoothing-alpha", self.gaze_smoothing_alpha)?;
        if self.gaze_history_size == 0 {
            return Err(ConfigError::OutOfRange {
                key: "gaze-history-size",
                value: 0.0,
                expected: ">= 1",
            });
        }
        positive("prior-pseudocount", self.prior_pseudocount)?;
        positive("special-key-likelihood-boost", self.special_key_likelihood_boost)?;
        unit("special-key-min-prior", self.special_key_min_prior)?;
        positive("active-key-sigma-expansion", self.active_key_sigma_expansion)?;
        non_negative("hysteresis-threshold", self.hysteresis_threshold)?;
        non_negative("min-dwell-before-switch", self.min_dwell_before_switch)?;
        positive("velocity-threshold", self.velocity_threshold)?;
        alpha("velocity-smoothing-alpha", self.velocity_smoothing_alpha)?;
        non_negative("min-fixation-duration", self.min_fixation_duration)?;
        unit("min-posterior-for-feedback", self.min_posterior_for_feedback)?;
        unit("scan-decay-factor", self.scan_decay_factor)?;
        unit("selection-damping", self.selection_damping)?;
        non_negative("bounds-margin", self.bounds_margin)?;
        positive("max-frame-dt", self.max_frame_dt)?;
        positive("frame-interval", self.frame_interval)?;
        positive("sample-timeout", self.sample_timeout)?;
        positive("posterior-epsilon", self.posterior_epsilon)?;
        non_negative("snapshot-min-interval", self.snapshot_min_interval)?;
        positive("interest-feedback-delta", self.interest_feedback_delta)?;
        Ok(())
    }

    /// Render the effective configuration as a plist.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:accumulation-policy {} :use-velocity-gating {} :sigma-ratio {} :selection-threshold {} :gaze-smoothing-alpha {} :gaze-history-size {} :prior-pseudocount {} :special-key-likelihood-boost {} :special-key-min-prior {} :active-key-sigma-expansion {} :hysteresis-threshold {} :min-dwell-before-switch {} :velocity-threshold {} :velocity-smoothing-alpha {} :min-fixation-duration {} :min-posterior-for-feedback {} :scan-decay-factor {} :selection-damping {} :bounds-margin {} :max-frame-dt {} :frame-interval {} :sample-timeout {} :posterior-epsilon {:e} :snapshot-min-interval {} :interest-feedback-delta {})",
            self.accumulation_policy.as_str(),
            sexp_bool(self.use_velocity_gating),
            self.sigma_ratio,
            self.selection_threshold,
            self.gaze_smoothing_alpha,
            self.gaze_history_size,
            self.prior_pseudocount,
            self.special_key_likelihood_boost,
            self.special_key_min_prior,
            self.active_key_sigma_expansion,
            self.hysteresis_threshold,
            self.min_dwell_before_switch,
            self.velocity_threshold,
            self.velocity_smoothing_alpha,
            self.min_fixation_duration,
            self.min_posterior_for_feedback,
            self.scan_decay_factor,
            self.selection_damping,
            self.bounds_margin,
            self.max_frame_dt,
            self.frame_interval,
            self.sample_timeout,
            self.posterior_epsilon,
            self.snapshot_min_interval,
            self.interest_feedback_delta,
        )
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_differ_only_in_policy_and_smoothing() {
        let e = EngineConfig::enhanced();
        let b = EngineConfig::baseline();
        assert_eq!(e.accumulation_policy, AccumulationPolicy::ActiveKeyOnly);
        assert!(e.use_velocity_gating);
        assert_eq!(b.accumulation_policy, AccumulationPolicy::AllKeysProportional);
        assert!(!b.use_velocity_gating);
        assert_eq!(b.gaze_history_size, 3);
        assert_eq!(e.selection_threshold, b.selection_threshold);
        assert_eq!(EngineConfig::default(), e);
    }

    #[test]
    fn test_presets_validate() {
        assert!(EngineConfig::enhanced().validate().is_ok());
        assert!(EngineConfig::baseline().validate().is_ok());
    }

    #[test]
    fn test_preset_lookup() {
        assert_eq!(EngineConfig::preset("baseline").unwrap(), EngineConfig::baseline());
        assert!(matches!(
            EngineConfig::preset("turbo"),
            Err(ConfigError::UnknownPreset(_))
        ));
        assert_eq!(EngineConfig::baseline().preset_name(), Some("baseline"));
    }

    #[test]
    fn test_from_sexp_overrides() {
        let c = EngineConfig::from_sexp(
            "(:preset baseline :selection-threshold 0.8 :gaze-history-size 4 :use-velocity-gating t)",
        )
        .unwrap();
        assert_eq!(c.accumulation_policy, AccumulationPolicy::AllKeysProportional);
        assert!((c.selection_threshold - 0.8).abs() < 1e-12);
        assert_eq!(c.gaze_history_size, 4);
        assert!(c.use_velocity_gating);
        assert_eq!(c.preset_name(), None);
    }

    #[test]
    fn test_from_sexp_policy() {
        let c = EngineConfig::from_sexp("(:accumulation-policy all-keys-proportional)").unwrap();
        assert_eq!(c.accumulation_policy, AccumulationPolicy::AllKeysProportional);

        let err = EngineConfig::from_sexp("(:accumulation-policy sometimes)").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPolicy(_)));
    }

    #[test]
    fn test_from_sexp_rejects_unknown_key() {
        let err = EngineConfig::from_sexp("(:sigma 0.5)").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(ref k) if k == "sigma"));
    }

    #[test]
    fn test_from_sexp_rejects_bad_values() {
        let err = EngineConfig::from_sexp("(:sigma-ratio :wide)").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "sigma-ratio", .. }));

        let err = EngineConfig::from_sexp("(:gaze-smoothing-alpha 1.5)").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                key: "gaze-smoothing-alpha",
                ..
            }
        ));

        let err = EngineConfig::from_sexp("(:gaze-history-size 0)").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));

        for bad in ["false", "0", "yes"] {
            let src = format!("(:preset baseline :use-velocity-gating {})", bad);
            let err = EngineConfig::from_sexp(&src).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { key: "use-velocity-gating", .. }),
                "{} accepted: {:?}",
                bad,
                err
            );
        }
        let gated = EngineConfig::from_sexp("(:preset baseline :use-velocity-gating t)").unwrap();
        assert!(gated.use_velocity_gating);
        let plain = EngineConfig::from_sexp("(:use-velocity-gating nil)").unwrap();
        assert!(!plain.use_velocity_gating);
    }

    #[test]
    fn test_malformed_sexp() {
        assert!(matches!(
            EngineConfig::from_sexp("(:sigma-ratio"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_config_sexp_roundtrip() {
        let original = EngineConfig::baseline();
        let rendered = original.config_sexp();
        assert!(rendered.contains(":accumulation-policy all-keys-proportional"));
        assert!(rendered.contains(":use-velocity-gating nil"));
        let parsed = EngineConfig::from_sexp(&rendered).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_policy_roundtrip() {
        for p in [AccumulationPolicy::ActiveKeyOnly, AccumulationPolicy::AllKeysProportional] {
            assert_eq!(AccumulationPolicy::from_str(p.as_str()), Some(p));
        }
        assert_eq!(AccumulationPolicy::from_str("invalid"), None);
    }
}
