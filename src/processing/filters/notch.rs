use super::{FilterInstance, SecondOrderSection};
use crate::error::FilterError;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotchFilterConfig {
    pub id: String,
    pub f_notch: f64,
    pub q: f64,
}

/// Mains interference rejection.
pub struct NotchFilter {
    config: NotchFilterConfig,
    section: [SecondOrderSection; 1],
}

impl NotchFilter {
    pub fn new(config: NotchFilterConfig, fs: f64) -> Result<Self, FilterError> {
        let nyquist = fs / 2.0;
        if !(config.f_notch > 0.0 && config.f_notch < nyquist) {
            return Err(FilterError::CutoffOutOfRange {
                cutoff_hz: config.f_notch,
                nyquist_hz: nyquist,
            });
        }
        if !(config.q > 0.0) {
            return Err(FilterError::InvalidQuality(config.q));
        }

        let section = SecondOrderSection::notch(config.f_notch, fs, config.q);
        Ok(NotchFilter {
            config,
            section: [section],
        })
    }
}

impl FilterInstance for NotchFilter {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn sections(&self) -> &[SecondOrderSection] {
        &self.section
    }

    fn order(&self) -> usize {
        2
    }
}
