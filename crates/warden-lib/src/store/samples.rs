//! Bounded per-unit runtime sample window
//!
//! Keeps the most recent run durations in a FIFO capped at the configured
//! sample count. The moving average is deliberately 0 until the window is
//! full; callers must tolerate the warm-up phase.

use std::collections::VecDeque;

/// Recent run durations for one unit, in milliseconds
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<f64>,
    cap: usize,
    last: f64,
}

impl SampleWindow {
    pub fn new(cap: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(cap.min(256)),
            cap: cap.max(1),
            last: 0.0,
        }
    }

    /// Append a duration, evicting the oldest once the cap is exceeded.
    /// A changed cap (config update) takes effect on the next push.
    pub fn push(&mut self, duration_ms: f64, cap: usize) {
        self.cap = cap.max(1);
        while self.samples.len() >= self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(duration_ms);
        self.last = duration_ms;
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Moving average over the full window, 0 while warming up.
    ///
    /// The sum always divides by the window cap, never by a partial count.
    pub fn average(&self) -> f64 {
        if self.samples.len() < self.cap {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.cap as f64
    }

    /// Largest sample divided by the sample count.
    ///
    /// Callers depend on the count normalization; do not change this to
    /// return the raw maximum.
    pub fn peak(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let max = self
            .samples
            .iter()
            .copied()
            .fold(f64::MIN, f64::max);
        max / self.samples.len() as f64
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.last = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_is_zero_until_window_full() {
        let mut w = SampleWindow::new(4);
        for i in 0..3 {
            w.push(1.0 + i as f64, 4);
            assert_eq!(w.average(), 0.0);
        }
        w.push(4.0, 4);
        // (1 + 2 + 3 + 4) / 4
        assert!((w.average() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn average_tracks_most_recent_window() {
        let mut w = SampleWindow::new(3);
        for d in [1.0, 2.0, 3.0, 10.0] {
            w.push(d, 3);
        }
        // Window is now [2, 3, 10]
        assert!((w.average() - 5.0).abs() < 1e-9);
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn last_reflects_newest_sample() {
        let mut w = SampleWindow::new(2);
        w.push(0.5, 2);
        w.push(0.9, 2);
        assert!((w.last() - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn peak_divides_by_sample_count() {
        let mut w = SampleWindow::new(10);
        w.push(6.0, 10);
        w.push(2.0, 10);
        w.push(1.0, 10);
        // max 6.0 over 3 samples
        assert!((w.peak() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn peak_of_empty_window_is_zero() {
        let w = SampleWindow::new(5);
        assert_eq!(w.peak(), 0.0);
    }

    #[test]
    fn shrinking_cap_evicts_on_next_push() {
        let mut w = SampleWindow::new(5);
        for d in [1.0, 2.0, 3.0, 4.0, 5.0] {
            w.push(d, 5);
        }
        w.push(6.0, 3);
        assert_eq!(w.len(), 3);
        // Window is [4, 5, 6], full at the new cap
        assert!((w.average() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn clear_resets_samples_and_last() {
        let mut w = SampleWindow::new(2);
        w.push(1.0, 2);
        w.clear();
        assert!(w.is_empty());
        assert_eq!(w.last(), 0.0);
        assert_eq!(w.average(), 0.0);
    }
}
