use super::{FilterInstance, SecondOrderSection};
use crate::error::FilterError;

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BandPassFilterConfig {
    pub id: String,
    pub f_low: f64,
    pub f_high: f64,
    pub order: usize,
}

/// Butterworth band-pass built as a high-pass cascade at `f_low` followed by
/// a low-pass cascade at `f_high`, each of the configured order.
pub struct BandPassFilter {
    config: BandPassFilterConfig,
    sections: Vec<SecondOrderSection>,
}

impl BandPassFilter {
    pub fn new(config: BandPassFilterConfig, fs: f64) -> Result<Self, FilterError> {
        let nyquist = fs / 2.0;
        for cutoff in [config.f_low, config.f_high] {
            if !(cutoff > 0.0 && cutoff < nyquist) {
                return Err(FilterError::CutoffOutOfRange {
                    cutoff_hz: cutoff,
                    nyquist_hz: nyquist,
                });
            }
        }
        if config.f_low >= config.f_high {
            return Err(FilterError::InvertedBand {
                low_hz: config.f_low,
                high_hz: config.f_high,
            });
        }
        if config.order == 0 {
            return Err(FilterError::ZeroOrder);
        }

        let mut sections = butterworth_sections(config.f_low, fs, config.order, Pass::High);
        sections.extend(butterworth_sections(
            config.f_high,
            fs,
            config.order,
            Pass::Low,
        ));

        Ok(BandPassFilter { config, sections })
    }
}

impl FilterInstance for BandPassFilter {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn sections(&self) -> &[SecondOrderSection] {
        &self.sections
    }

    fn order(&self) -> usize {
        2 * self.config.order
    }
}

#[derive(Clone, Copy)]
enum Pass {
    High,
    Low,
}

// Butterworth of order n = n/2 biquads (+ one first-order section when n is odd).
// Pole pair k sits at angle pi * (n - 1 - 2k) / 2n from the negative real axis,
// which gives the section quality factor Q = 1 / (2 cos(angle)).
fn butterworth_sections(f0: f64, fs: f64, order: usize, pass: Pass) -> Vec<SecondOrderSection> {
    let n = order as f64;
    let mut sections: Vec<SecondOrderSection> = (0..order / 2)
        .map(|k| {
            let angle = PI * (n - 1.0 - 2.0 * k as f64) / (2.0 * n);
            let q = 1.0 / (2.0 * angle.cos());
            match pass {
                Pass::High => SecondOrderSection::high_pass(f0, fs, q),
                Pass::Low => SecondOrderSection::low_pass(f0, fs, q),
            }
        })
        .collect();

    if order % 2 == 1 {
        sections.push(match pass {
            Pass::High => SecondOrderSection::first_order_high_pass(f0, fs),
            Pass::Low => SecondOrderSection::first_order_low_pass(f0, fs),
        });
    }
    sections
}
