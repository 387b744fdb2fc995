// src/acquisition/simulated.rs

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::thread;
use std::time::{Duration, Instant};

use super::{Sample, SampleSource};
use crate::error::DeviceError;

// -----------------------------------------------------------------------------
// SETUP FOR THE SIMULATED SIGNAL
// -----------------------------------------------------------------------------

const BASELINE: f64 = 512.0;
const WANDER_AMPLITUDE: f64 = 15.0;
const WANDER_FREQ: f64 = 0.3;
const NOISE_AMPLITUDE: i32 = 10;

const QRS_WIDTH_SECS: f64 = 0.04;
const QRS_AMPLITUDE: f64 = 250.0;
const T_WAVE_ONSET_SECS: f64 = 0.2;
const T_WAVE_WIDTH_SECS: f64 = 0.16;
const T_WAVE_AMPLITUDE: f64 = 40.0;

/// Synthetic EKG: a wandering baseline with noise, a sharp QRS spike at
/// every beat and a small T wave after it.
pub struct SimulatedSource {
    rng: StdRng,
    sample_rate_hz: f64,
    beat_period_secs: f64,
    index: u64,
    started: Instant,
    paced: bool,
}

impl SimulatedSource {
    pub fn new(heart_rate_bpm: f64, sample_rate_hz: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            sample_rate_hz,
            beat_period_secs: 60.0 / heart_rate_bpm.max(1.0),
            index: 0,
            started: Instant::now(),
            paced: true,
        }
    }

    /// Produces samples as fast as they are pulled, timestamps stay on the
    /// nominal sample grid.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Next waveform value without timing information.
    pub fn next_value(&mut self) -> i32 {
        let time = self.index as f64 / self.sample_rate_hz;
        self.index += 1;

        let since_beat = time % self.beat_period_secs;
        let noise = self.rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE) as f64;
        let value = BASELINE
            + WANDER_AMPLITUDE * (2.0 * PI * WANDER_FREQ * time).sin()
            + qrs_complex(since_beat)
            + t_wave(since_beat)
            + noise;

        value.round() as i32
    }
}

fn qrs_complex(since_beat: f64) -> f64 {
    if since_beat >= QRS_WIDTH_SECS {
        return 0.0;
    }
    // triangular spike peaking halfway through the complex
    QRS_AMPLITUDE * (1.0 - (2.0 * since_beat / QRS_WIDTH_SECS - 1.0).abs())
}

fn t_wave(since_beat: f64) -> f64 {
    let offset = since_beat - T_WAVE_ONSET_SECS;
    if !(0.0..T_WAVE_WIDTH_SECS).contains(&offset) {
        return 0.0;
    }
    T_WAVE_AMPLITUDE * (PI * offset / T_WAVE_WIDTH_SECS).sin()
}

impl SampleSource for SimulatedSource {
    fn next_sample(&mut self) -> Result<Option<Sample>, DeviceError> {
        let due = self.started
            + Duration::from_secs_f64(self.index as f64 / self.sample_rate_hz);

        if self.paced {
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }

        let raw_value = self.next_value();
        Ok(Some(Sample {
            timestamp: due,
            raw_value,
        }))
    }
}
