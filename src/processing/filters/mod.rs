pub mod bandpass;
pub mod ema;
pub mod notch;
pub mod zero_phase;

use crate::config::{FilterConfig, FilterMode};
use crate::error::FilterError;
use bandpass::{BandPassFilter, BandPassFilterConfig};
use notch::{NotchFilter, NotchFilterConfig};

use std::f64::consts::PI;

/// A fixed-coefficient stage applied to a whole window at once.
pub trait FilterInstance: Send + Sync {
    fn id(&self) -> &str;

    fn sections(&self) -> &[SecondOrderSection];

    /// Total number of poles across all sections.
    fn order(&self) -> usize;

    /// Reflection padding used by the forward-backward pass. Windows not
    /// longer than this cannot be filtered stably.
    fn pad_len(&self) -> usize {
        3 * (self.order() + 1)
    }

    fn filter_window(&self, window: &[f64]) -> Option<Vec<f64>> {
        zero_phase::filtfilt(self.sections(), window, self.pad_len())
    }
}

// SECOND ORDER SECTION --------------------------------------------------------

/// Biquad with `a[0]` normalised to 1. First-order sections leave the
/// `b[2]`/`a[2]` taps at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondOrderSection {
    b: [f64; 3],
    a: [f64; 3],
}

impl SecondOrderSection {
    fn normalized(b: [f64; 3], a: [f64; 3]) -> Self {
        let a0 = a[0];
        SecondOrderSection {
            b: [b[0] / a0, b[1] / a0, b[2] / a0],
            a: [1.0, a[1] / a0, a[2] / a0],
        }
    }

    pub fn high_pass(f0: f64, fs: f64, q: f64) -> Self {
        let omega = 2.0 * PI * f0 / fs;
        let alpha = f64::sin(omega) / (2.0 * q);
        let cos = f64::cos(omega);

        Self::normalized(
            [(1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        )
    }

    pub fn low_pass(f0: f64, fs: f64, q: f64) -> Self {
        let omega = 2.0 * PI * f0 / fs;
        let alpha = f64::sin(omega) / (2.0 * q);
        let cos = f64::cos(omega);

        Self::normalized(
            [(1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        )
    }

    pub fn first_order_high_pass(f0: f64, fs: f64) -> Self {
        let k = (PI * f0 / fs).tan();
        Self::normalized([1.0, -1.0, 0.0], [1.0 + k, k - 1.0, 0.0])
    }

    pub fn first_order_low_pass(f0: f64, fs: f64) -> Self {
        let k = (PI * f0 / fs).tan();
        Self::normalized([k, k, 0.0], [1.0 + k, k - 1.0, 0.0])
    }

    /// Second-order IIR notch with bandwidth `f0 / q`.
    pub fn notch(f0: f64, fs: f64, q: f64) -> Self {
        let omega = 2.0 * PI * f0 / fs;
        let bandwidth = omega / q;
        let gain = 1.0 / (1.0 + (bandwidth / 2.0).tan());
        let cos = f64::cos(omega);

        Self::normalized(
            [gain, -2.0 * gain * cos, gain],
            [1.0, -2.0 * gain * cos, 2.0 * gain - 1.0],
        )
    }

    pub fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (self.a[0] + self.a[1] + self.a[2])
    }

    /// |H(e^jw)| at frequency `f` for sample rate `fs`.
    pub fn magnitude_at(&self, f: f64, fs: f64) -> f64 {
        let omega = 2.0 * PI * f / fs;
        let eval = |c: &[f64; 3]| {
            let re = c[0] + c[1] * omega.cos() + c[2] * (2.0 * omega).cos();
            let im = -(c[1] * omega.sin() + c[2] * (2.0 * omega).sin());
            (re * re + im * im).sqrt()
        };
        eval(&self.b) / eval(&self.a)
    }

    /// Delay-line state that holds the section at rest for a constant
    /// input of 1.0.
    fn steady_state(&self) -> [f64; 2] {
        let y = self.dc_gain();
        [y - self.b[0], self.b[2] - self.a[2] * y]
    }

    // Transposed direct form II
    fn step(&self, z: &mut [f64; 2], input: f64) -> f64 {
        let output = self.b[0] * input + z[0];
        z[0] = self.b[1] * input - self.a[1] * output + z[1];
        z[1] = self.b[2] * input - self.a[2] * output;
        output
    }
}

// SIGNAL FILTER ---------------------------------------------------------------

pub enum SignalFilter {
    Identity,
    Cascade(Vec<Box<dyn FilterInstance>>),
}

impl SignalFilter {
    pub fn cascade(
        bandpass: BandPassFilterConfig,
        notch: NotchFilterConfig,
        fs: f64,
    ) -> Result<Self, FilterError> {
        let bandpass = BandPassFilter::new(bandpass, fs)?;
        let notch = NotchFilter::new(notch, fs)?;
        Ok(SignalFilter::Cascade(vec![Box::new(bandpass), Box::new(notch)]))
    }

    pub fn from_config(config: &FilterConfig, fs: f64) -> Result<Self, FilterError> {
        match config.mode {
            FilterMode::Identity => Ok(SignalFilter::Identity),
            FilterMode::Cascade => Self::cascade(
                BandPassFilterConfig {
                    id: "bandpass".to_string(),
                    f_low: config.f_low,
                    f_high: config.f_high,
                    order: config.order,
                },
                NotchFilterConfig {
                    id: "notch".to_string(),
                    f_notch: config.notch_freq,
                    q: config.notch_q,
                },
                fs,
            ),
        }
    }

    /// Windows of this length or shorter come back unmodified.
    pub fn min_window_len(&self) -> usize {
        match self {
            SignalFilter::Identity => 0,
            SignalFilter::Cascade(stages) => {
                stages.iter().map(|s| s.pad_len()).max().unwrap_or(0)
            }
        }
    }

    /// Returns a filtered copy of `window`, time-aligned with the input.
    pub fn apply(&self, window: &[f64]) -> Vec<f64> {
        let stages = match self {
            SignalFilter::Identity => return window.to_vec(),
            SignalFilter::Cascade(stages) => stages,
        };

        if window.len() <= self.min_window_len() {
            log::trace!(
                "window of {} samples too short to filter, passing through",
                window.len()
            );
            return window.to_vec();
        }

        stages.iter().fold(window.to_vec(), |signal, stage| {
            stage.filter_window(&signal).unwrap_or(signal)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;

    const FS: f64 = 250.0;

    fn sine(freq: f64, len: usize, offset: f64) -> Vec<f64> {
        (0..len)
            .map(|i| offset + (2.0 * PI * freq * i as f64 / FS).sin())
            .collect()
    }

    fn rms(signal: &[f64]) -> f64 {
        (signal.iter().map(|x| x * x).sum::<f64>() / signal.len() as f64).sqrt()
    }

    fn cascade() -> SignalFilter {
        SignalFilter::from_config(&FilterConfig::default(), FS).unwrap()
    }

    #[test]
    fn identity_returns_input() {
        let input = vec![512.0, 530.0, 700.0, 505.0];
        assert_eq!(SignalFilter::Identity.apply(&input), input);
    }

    #[test]
    fn short_window_falls_back_to_input() {
        let filter = cascade();
        let input: Vec<f64> = (0..filter.min_window_len()).map(|i| i as f64).collect();
        assert_eq!(filter.apply(&input), input);
    }

    #[test]
    fn cascade_keeps_length_and_removes_offset() {
        let filter = cascade();
        let input = sine(10.0, 2500, 512.0);
        let output = filter.apply(&input);

        assert_eq!(output.len(), input.len());
        let middle = &output[500..2000];
        let mean = middle.iter().sum::<f64>() / middle.len() as f64;
        assert!(mean.abs() < 0.05, "residual offset {}", mean);
    }

    #[test]
    fn cascade_is_zero_phase_in_passband() {
        let filter = cascade();
        let input = sine(10.0, 2500, 0.0);
        let output = filter.apply(&input);

        let ratio = rms(&output[500..2000]) / rms(&input[500..2000]);
        assert!((ratio - 1.0).abs() < 0.05, "passband gain {}", ratio);

        // No lag: the filtered sine tracks the input sample for sample
        let max_err = output[500..2000]
            .iter()
            .zip(&input[500..2000])
            .map(|(y, x)| (y - x).abs())
            .fold(0.0, f64::max);
        assert!(max_err < 0.1, "max deviation {}", max_err);
    }

    #[test]
    fn cascade_rejects_mains_hum() {
        let filter = cascade();
        let input = sine(50.0, 2500, 0.0);
        let output = filter.apply(&input);

        let ratio = rms(&output[500..2000]) / rms(&input[500..2000]);
        assert!(ratio < 0.05, "50 Hz leaked through at {}", ratio);
    }

    #[test]
    fn notch_section_has_unity_dc_gain() {
        let section = SecondOrderSection::notch(50.0, FS, 30.0);
        assert!((section.dc_gain() - 1.0).abs() < 1e-12);
        assert!(section.magnitude_at(50.0, FS) < 1e-9);
    }
}
