use super::detectors::{BeatDetector, BeatEvent};
use crate::config::BpmConfig;

use serde::Serialize;
use std::collections::VecDeque;

/// Aggregate over every admitted instantaneous BPM since the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BpmStats {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub count: usize,
}

// BPM ESTIMATOR ---------------------------------------------------------------

/// Sliding per-beat average of instantaneous heart rate.
#[derive(Debug, Clone)]
pub struct BpmEstimator {
    capacity: usize,
    min_bpm: f64,
    max_bpm: f64,
    window: VecDeque<f64>,
    previous_beat: Option<f64>,
    current_bpm: Option<f64>,
    totals: Totals,
}

#[derive(Debug, Clone, Copy)]
struct Totals {
    sum: f64,
    count: usize,
    max: f64,
    min: f64,
}

impl Totals {
    fn new() -> Self {
        Self {
            sum: 0.0,
            count: 0,
            max: f64::MIN,
            min: f64::MAX,
        }
    }

    fn add(&mut self, bpm: f64) {
        self.sum += bpm;
        self.count += 1;
        self.max = self.max.max(bpm);
        self.min = self.min.min(bpm);
    }
}

impl BpmEstimator {
    pub fn new(capacity: usize, min_bpm: f64, max_bpm: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            min_bpm,
            max_bpm,
            window: VecDeque::with_capacity(capacity),
            previous_beat: None,
            current_bpm: None,
            totals: Totals::new(),
        }
    }

    pub fn from_config(config: &BpmConfig) -> Self {
        Self::new(config.window_capacity, config.min_bpm, config.max_bpm)
    }

    /// Feeds one beat. Returns the instantaneous BPM if it was admitted into
    /// the window.
    pub fn on_beat(&mut self, beat: BeatEvent) -> Option<f64> {
        let previous = self.previous_beat.replace(beat.timestamp)?;

        let interval = beat.timestamp - previous;
        if interval <= 0.0 {
            return None;
        }
        let instant_bpm = 60.0 / interval;

        if !(instant_bpm > self.min_bpm && instant_bpm < self.max_bpm) {
            log::debug!(
                "discarding implausible {:.1} BPM (interval {:.3}s)",
                instant_bpm,
                interval
            );
            return None;
        }

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(instant_bpm);
        self.totals.add(instant_bpm);
        self.current_bpm = Some(self.window.iter().sum::<f64>() / self.window.len() as f64);

        Some(instant_bpm)
    }

    /// Mean of the admitted window, `None` until a plausible interval has
    /// been seen.
    pub fn current_bpm(&self) -> Option<f64> {
        self.current_bpm
    }

    pub fn window(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }

    pub fn stats(&self) -> Option<BpmStats> {
        if self.totals.count == 0 {
            return None;
        }
        Some(BpmStats {
            mean: self.totals.sum / self.totals.count as f64,
            max: self.totals.max,
            min: self.totals.min,
            count: self.totals.count,
        })
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.previous_beat = None;
        self.current_bpm = None;
        self.totals = Totals::new();
    }
}

// RECOMPUTED BPM --------------------------------------------------------------

/// Re-detects beats over an already recorded signal and returns, for every
/// point, the instantaneous BPM of the two most recent beats (0.0 before the
/// second beat). No plausibility window is applied. The first point only
/// seeds the edge detector and is never a beat itself.
pub fn recompute_bpm(timestamps: &[f64], signal: &[f64], mut detector: BeatDetector) -> Vec<f64> {
    let mut last_two: (Option<f64>, Option<f64>) = (None, None);

    timestamps
        .iter()
        .zip(signal)
        .enumerate()
        .map(|(i, (&t, &value))| {
            if i == 0 {
                detector.prime(value);
            } else if let Some(beat) = detector.process_sample(t, value) {
                last_two = (last_two.1, Some(beat.timestamp));
            }
            match last_two {
                (Some(earlier), Some(later)) if later > earlier => 60.0 / (later - earlier),
                _ => 0.0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn beat(t: f64) -> BeatEvent {
        BeatEvent { timestamp: t }
    }

    #[test]
    fn no_data_until_second_beat() {
        let mut estimator = BpmEstimator::new(15, 40.0, 200.0);
        assert_eq!(estimator.on_beat(beat(0.0)), None);
        assert_eq!(estimator.current_bpm(), None);
        assert_eq!(estimator.stats(), None);

        assert_eq!(estimator.on_beat(beat(1.0)), Some(60.0));
        assert_eq!(estimator.current_bpm(), Some(60.0));
    }

    #[test]
    fn implausible_rates_leave_current_bpm_untouched() {
        let mut estimator = BpmEstimator::new(15, 40.0, 200.0);
        estimator.on_beat(beat(0.0));
        estimator.on_beat(beat(0.75)); // 80 BPM
        assert_eq!(estimator.on_beat(beat(0.875)), None); // 480 BPM
        assert_eq!(estimator.on_beat(beat(2.875)), None); // 30 BPM
        assert_eq!(estimator.current_bpm(), Some(80.0));

        // exactly 40 BPM is outside the exclusive range
        assert_eq!(estimator.on_beat(beat(4.375)), None);
        assert_eq!(estimator.window().count(), 1);
    }

    #[test]
    fn upper_bound_is_exclusive() {
        let mut estimator = BpmEstimator::new(15, 40.0, 120.0);
        estimator.on_beat(beat(0.0));
        assert_eq!(estimator.on_beat(beat(0.5)), None);
        assert_eq!(estimator.on_beat(beat(1.25)), Some(80.0));
    }

    #[test]
    fn window_holds_only_the_latest_values() {
        let mut estimator = BpmEstimator::new(3, 40.0, 200.0);
        let mut t = 0.0;
        estimator.on_beat(beat(t));
        for interval in [1.0, 0.5, 0.5, 0.5] {
            t += interval;
            estimator.on_beat(beat(t));
        }
        assert_eq!(estimator.window().collect::<Vec<_>>(), vec![120.0, 120.0, 120.0]);
        assert_eq!(estimator.current_bpm(), Some(120.0));

        let stats = estimator.stats().unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min, 60.0);
        assert_eq!(stats.max, 120.0);
        assert_eq!(stats.mean, 105.0);
    }

    #[test]
    fn window_content_stays_inside_plausible_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut estimator = BpmEstimator::new(15, 40.0, 200.0);
        let mut t = 0.0;
        for _ in 0..5000 {
            t += rng.gen_range(0.05..3.0);
            estimator.on_beat(beat(t));
            assert!(estimator.window().all(|bpm| bpm > 40.0 && bpm < 200.0));
            assert!(estimator.window().count() <= 15);
        }
    }

    #[test]
    fn reset_clears_window_and_stats() {
        let mut estimator = BpmEstimator::new(15, 40.0, 200.0);
        estimator.on_beat(beat(0.0));
        estimator.on_beat(beat(1.0));
        estimator.reset();
        assert_eq!(estimator.current_bpm(), None);
        assert_eq!(estimator.stats(), None);
        // the first beat after a reset has no interval to pair with
        assert_eq!(estimator.on_beat(beat(1.5)), None);
    }

    #[test]
    fn spaced_pulses_at_250_hz_give_100_bpm() {
        let fs = 250.0;
        let mut detector = BeatDetector::new(600.0, 0.25);
        let mut estimator = BpmEstimator::new(15, 40.0, 200.0);

        for i in 0..320 {
            let t = i as f64 / fs;
            let value = if i % 150 == 0 { 650.0 } else { 500.0 };
            if let Some(event) = detector.process_sample(t, value) {
                estimator.on_beat(event);
            }
        }

        let bpm = estimator.current_bpm().unwrap();
        assert!((bpm - 100.0).abs() < 1e-6, "got {}", bpm);
    }

    #[test]
    fn recompute_bpm_reports_latest_interval() {
        let timestamps: Vec<f64> = (0..8).map(|i| i as f64 * 0.25).collect();
        let signal = vec![0.0, 10.0, 0.0, 0.0, 10.0, 0.0, 10.0, 0.0];
        let bpm = recompute_bpm(&timestamps, &signal, BeatDetector::new(5.0, 0.1));

        assert_eq!(bpm.len(), 8);
        assert_eq!(&bpm[..4], &[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(bpm[4], 80.0); // beats at 0.25 and 1.0
        assert_eq!(bpm[6], 120.0); // beats at 1.0 and 1.5
        assert_eq!(bpm[7], 120.0);
    }

    #[test]
    fn recompute_bpm_ignores_a_leading_peak() {
        let timestamps: Vec<f64> = (0..5).map(|i| i as f64 * 0.25).collect();
        let signal = vec![10.0, 0.0, 10.0, 0.0, 10.0];
        let bpm = recompute_bpm(&timestamps, &signal, BeatDetector::new(5.0, 0.1));

        // beats at 0.5 and 1.0 only
        assert_eq!(&bpm[..4], &[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(bpm[4], 120.0);
    }
}
