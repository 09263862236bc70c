//! Gaze trace files: one s-expression per line.
//!
//! ```text
//! ; comment
//! (:key "q" :x 0 :y 0 :w 60 :h 60)
//! (:t 0.017 :x 31.2 :y 28.9)
//! (:t 0.033 :valid nil)
//! ```
//!
//! `:key` lines carry key geometry (optional; replay falls back to the
//! built-in layout). `:t` lines are samples; `:valid` defaults to `t`.

use std::path::Path;

use thiserror::Error;

use super::geometry::Rect;
use super::layout::KeyId;
use super::sexp::{escape_string, get_bool, get_float, get_keyword};
use super::source::GazeSample;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to read trace {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: malformed s-expression: {message}")]
    Malformed { line: usize, message: String },
    #[error("line {line}: missing field :{field}")]
    MissingField { line: usize, field: &'static str },
    #[error("line {line}: neither a :key nor a :t entry")]
    UnknownEntry { line: usize },
}

/// A parsed trace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GazeTrace {
    pub geometry: Vec<(KeyId, Rect)>,
    pub samples: Vec<GazeSample>,
}

impl GazeTrace {
    pub fn new(geometry: Vec<(KeyId, Rect)>, samples: Vec<GazeSample>) -> Self {
        Self { geometry, samples }
    }

    pub fn duration_s(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(a), Some(b)) => b.timestamp_s - a.timestamp_s,
            _ => 0.0,
        }
    }

    pub fn parse(src: &str) -> Result<Self, TraceError> {
        let mut trace = Self::default();
        for (i, raw) in src.lines().enumerate() {
            let line = i + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with(';') {
                continue;
            }
            let value = lexpr::from_str(text).map_err(|e| TraceError::Malformed {
                line,
                message: e.to_string(),
            })?;

            let field = |name: &'static str| {
                get_float(&value, name).ok_or(TraceError::MissingField { line, field: name })
            };

            if let Some(key) = get_keyword(&value, "key") {
                let rect = Rect::new(field("x")?, field("y")?, field("w")?, field("h")?);
                trace.geometry.push((KeyId(key), rect));
            } else if get_keyword(&value, "t").is_some() {
                let t = field("t")?;
                let valid = match get_keyword(&value, "valid") {
                    None => true,
                    Some(raw) => get_bool(&value, "valid").ok_or(TraceError::Malformed {
                        line,
                        message: format!(":valid must be t or nil, got {}", raw),
                    })?,
                };
                let sample = if valid {
                    GazeSample::new(field("x")?, field("y")?, t)
                } else {
                    GazeSample::invalid(t)
                };
                trace.samples.push(sample);
            } else {
                return Err(TraceError::UnknownEntry { line });
            }
        }
        Ok(trace)
    }

    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let src = std::fs::read_to_string(path).map_err(|source| TraceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&src)
    }

    /// Render in the line format `parse` reads.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (id, r) in &self.geometry {
            out.push_str(&format!(
                "(:key \"{}\" :x {} :y {} :w {} :h {})\n",
                escape_string(id.as_str()),
                r.x,
                r.y,
                r.width,
                r.height
            ));
        }
        for s in &self.samples {
            if s.valid {
                out.push_str(&format!(
                    "(:t {:.4} :x {:.2} :y {:.2})\n",
                    s.timestamp_s, s.x, s.y
                ));
            } else {
                out.push_str(&format!("(:t {:.4} :valid nil)\n", s.timestamp_s));
            }
        }
        out
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_samples_and_geometry() {
        let src = "; recorded session\n\
                   (:key \"q\" :x 0 :y 0 :w 60 :h 60)\n\
                   \n\
                   (:t 0.0167 :x 31.5 :y 29)\n\
                   (:t 0.0333 :valid nil)\n";
        let trace = GazeTrace::parse(src).unwrap();
        assert_eq!(trace.geometry.len(), 1);
        assert_eq!(trace.geometry[0].0, KeyId::from("q"));
        assert_eq!(trace.geometry[0].1, Rect::new(0.0, 0.0, 60.0, 60.0));
        assert_eq!(trace.samples.len(), 2);
        assert!(trace.samples[0].valid);
        assert_eq!(trace.samples[0].x, 31.5);
        assert!(!trace.samples[1].valid);
        assert!((trace.duration_s() - 0.0166).abs() < 1e-9);
    }

    #[test]
    fn test_missing_field_reports_line() {
        let err = GazeTrace::parse("(:t 0.1 :x 5)\n").unwrap_err();
        assert!(
            matches!(err, TraceError::MissingField { line: 1, field: "y" }),
            "Got {:?}",
            err
        );
    }

    #[test]
    fn test_malformed_line() {
        let err = GazeTrace::parse("(:t 0.0 :x 1 :y 1)\n(:t 0.1 :x\n").unwrap_err();
        assert!(matches!(err, TraceError::Malformed { line: 2, .. }), "Got {:?}", err);
    }

    #[test]
    fn test_valid_flag_must_be_boolean() {
        let err = GazeTrace::parse("(:t 0.1 :x 1 :y 1 :valid false)\n").unwrap_err();
        assert!(matches!(err, TraceError::Malformed { line: 1, .. }), "Got {:?}", err);
        let trace = GazeTrace::parse("(:t 0.1 :x 1 :y 1 :valid t)\n").unwrap();
        assert!(trace.samples[0].valid);
    }

    #[test]
    fn test_unknown_entry() {
        let err = GazeTrace::parse("(:foo 1)").unwrap_err();
        assert!(matches!(err, TraceError::UnknownEntry { line: 1 }));
    }

    #[test]
    fn test_render_then_parse() {
        let trace = GazeTrace::new(
            vec![(KeyId::from("space"), Rect::new(0.0, 198.0, 654.0, 60.0))],
            vec![
                GazeSample::new(10.25, 20.5, 0.5),
                GazeSample::invalid(0.75),
            ],
        );
        let parsed = GazeTrace::parse(&trace.render()).unwrap();
        assert_eq!(parsed, trace);
    }
}
