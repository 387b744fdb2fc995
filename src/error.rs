use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionState;

/// Connection-level failures of a sample source. Malformed lines never
/// surface here, they are skipped by the source itself.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("no sample source available at {target}: {source}")]
    Unavailable {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("sample source disconnected")]
    Disconnected,

    #[error("device read failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write export file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write config file: {0}")]
    Write(#[source] io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("cutoff {cutoff_hz} Hz must lie strictly between 0 and the Nyquist frequency {nyquist_hz} Hz")]
    CutoffOutOfRange { cutoff_hz: f64, nyquist_hz: f64 },

    #[error("band-pass low cutoff {low_hz} Hz must be below high cutoff {high_hz} Hz")]
    InvertedBand { low_hz: f64, high_hz: f64 },

    #[error("filter order must be at least 1")]
    ZeroOrder,

    #[error("notch quality factor must be positive, got {0}")]
    InvalidQuality(f64),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(#[source] DeviceError),

    #[error("device error during session: {0}")]
    Device(#[source] DeviceError),

    #[error("invalid subject metadata: {0}")]
    InvalidMetadata(String),

    #[error("cannot {operation} while session is {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },

    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
