//! Gaze smoothing: moving average over a short FIFO history followed by a
//! single-pole exponential filter.
//!
//! Lower alpha means more lag and more stability; it is the main
//! responsiveness/robustness knob. Losing tracking clears everything at
//! once so no stale point is ever extrapolated.

use std::collections::VecDeque;
use tracing::debug;

use super::geometry::Point;

/// Stabilizes raw gaze points into a smoothed estimate.
#[derive(Debug, Clone)]
pub struct GazeSmoother {
    /// Last `capacity` raw points, oldest first.
    history: VecDeque<Point>,
    capacity: usize,
    /// Exponential smoothing factor in (0, 1].
    pub alpha: f64,
    smoothed: Option<Point>,
}

impl GazeSmoother {
    pub fn new(capacity: usize, alpha: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity + 1),
            capacity,
            alpha,
            smoothed: None,
        }
    }

    /// Feed one frame's raw point (`None` = invalid or missing sample).
    ///
    /// Returns the new smoothed point, or `None` while there is no data.
    pub fn update(&mut self, raw: Option<Point>) -> Option<Point> {
        let Some(raw) = raw else {
            if self.smoothed.is_some() {
                debug!("Gaze smoother cleared: no valid sample");
            }
            self.clear();
            return None;
        };

        self.history.push_back(raw);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }

        let n = self.history.len() as f64;
        let (sx, sy) = self
            .history
            .iter()
            .fold((0.0, 0.0), |(ax, ay), p| (ax + p.x, ay + p.y));
        let mean = Point::new(sx / n, sy / n);

        let next = match self.smoothed {
            Some(prev) => Point::new(
                self.alpha * mean.x + (1.0 - self.alpha) * prev.x,
                self.alpha * mean.y + (1.0 - self.alpha) * prev.y,
            ),
            None => mean,
        };
        self.smoothed = Some(next);
        Some(next)
    }

    /// Current smoothed point, if any.
    pub fn current(&self) -> Option<Point> {
        self.smoothed
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop the history and the smoothed point.
    pub fn clear(&mut self) {
        self.history.clear();
        self.smoothed = None;
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_seeds_with_mean() {
        let mut s = GazeSmoother::new(3, 0.5);
        let p = s.update(Some(Point::new(100.0, 200.0))).unwrap();
        assert_eq!(p, Point::new(100.0, 200.0));
    }

    #[test]
    fn test_mean_then_exponential() {
        let mut s = GazeSmoother::new(3, 0.5);
        s.update(Some(Point::new(0.0, 0.0)));
        // mean of (0, 10) = 5; 0.5*5 + 0.5*0 = 2.5
        let p = s.update(Some(Point::new(10.0, 0.0))).unwrap();
        assert!((p.x - 2.5).abs() < 1e-9, "Expected 2.5, got {}", p.x);
        // mean of (0, 10, 20) = 10; 0.5*10 + 0.5*2.5 = 6.25
        let p = s.update(Some(Point::new(20.0, 0.0))).unwrap();
        assert!((p.x - 6.25).abs() < 1e-9, "Expected 6.25, got {}", p.x);
    }

    #[test]
    fn test_history_capacity_evicts_oldest() {
        let mut s = GazeSmoother::new(3, 1.0);
        for x in [0.0, 10.0, 20.0, 30.0] {
            s.update(Some(Point::new(x, 0.0)));
        }
        assert_eq!(s.history_len(), 3);
        // alpha 1.0 → pure moving average of (10, 20, 30)
        assert!((s.current().unwrap().x - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_sample_clears_immediately() {
        let mut s = GazeSmoother::new(8, 0.3);
        s.update(Some(Point::new(5.0, 5.0)));
        s.update(Some(Point::new(6.0, 6.0)));
        assert!(s.update(None).is_none());
        assert!(s.current().is_none());
        assert_eq!(s.history_len(), 0);

        // Next valid sample re-seeds without any memory of the old points
        let p = s.update(Some(Point::new(300.0, 300.0))).unwrap();
        assert_eq!(p, Point::new(300.0, 300.0));
    }

    #[test]
    fn test_lower_alpha_lags_more() {
        let mut fast = GazeSmoother::new(1, 0.9);
        let mut slow = GazeSmoother::new(1, 0.1);
        fast.update(Some(Point::new(0.0, 0.0)));
        slow.update(Some(Point::new(0.0, 0.0)));
        let f = fast.update(Some(Point::new(100.0, 0.0))).unwrap();
        let s = slow.update(Some(Point::new(100.0, 0.0))).unwrap();
        assert!(f.x > s.x, "fast {} should lead slow {}", f.x, s.x);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let s = GazeSmoother::new(0, 0.5);
        assert_eq!(s.capacity(), 1);
    }
}
