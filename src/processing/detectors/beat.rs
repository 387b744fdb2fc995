use super::BeatEvent;
use crate::config::BeatConfig;

/// Rising-edge threshold detector with a refractory interval.
///
/// A beat fires when the signal crosses `threshold` upwards and more than
/// `refractory_secs` have passed since the previous beat. Crossings inside
/// the refractory interval are dropped and do not restart it.
#[derive(Debug, Clone)]
pub struct BeatDetector {
    threshold: f64,
    refractory_secs: f64,
    last_value: Option<f64>,
    last_beat: Option<f64>,
}

impl BeatDetector {
    pub fn new(threshold: f64, refractory_secs: f64) -> Self {
        Self {
            threshold,
            refractory_secs: refractory_secs.max(0.0),
            last_value: None,
            last_beat: None,
        }
    }

    pub fn from_config(config: &BeatConfig) -> Self {
        Self::new(config.threshold, config.refractory_secs)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn last_beat(&self) -> Option<f64> {
        self.last_beat
    }

    pub fn process_sample(&mut self, timestamp: f64, value: f64) -> Option<BeatEvent> {
        // No previous value counts as below threshold, so a signal that
        // starts above it still registers its first edge.
        let was_below = self.last_value.map_or(true, |prev| prev <= self.threshold);
        let rising_edge = value > self.threshold && was_below;
        self.last_value = Some(value);

        if !rising_edge {
            return None;
        }

        let refractory_elapsed = self
            .last_beat
            .map_or(true, |last| timestamp - last > self.refractory_secs);
        if !refractory_elapsed {
            log::trace!("edge at {:.3}s inside refractory interval", timestamp);
            return None;
        }

        self.last_beat = Some(timestamp);
        Some(BeatEvent { timestamp })
    }

    /// Records `value` as the previous sample without looking for an edge.
    pub fn prime(&mut self, value: f64) {
        self.last_value = Some(value);
    }

    pub fn reset(&mut self) {
        self.last_value = None;
        self.last_beat = None;
    }
}
