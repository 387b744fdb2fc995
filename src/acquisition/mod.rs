// src/acquisition/mod.rs

pub mod simulated;
pub mod source;
pub mod worker;

use std::time::Instant;

use crate::error::DeviceError;

pub use simulated::SimulatedSource;
pub use source::{ConfiguredOpener, DeviceSource, LineSource, TcpSource};
pub use worker::{IngestionWorker, WorkerExit, WorkerHandle};

/// One raw reading with its arrival time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: Instant,
    pub raw_value: i32,
}

impl Sample {
    pub fn now(raw_value: i32) -> Self {
        Self {
            timestamp: Instant::now(),
            raw_value,
        }
    }
}

/// A stream of samples from a sensor.
///
/// `Ok(None)` means nothing complete arrived within the source's read
/// timeout; callers should check their own shutdown flags and poll again.
/// End of stream and connection failures are reported as `DeviceError`.
pub trait SampleSource: Send {
    fn next_sample(&mut self) -> Result<Option<Sample>, DeviceError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn next_sample(&mut self) -> Result<Option<Sample>, DeviceError> {
        (**self).next_sample()
    }
}

/// Opens a fresh source for every session start.
pub trait SourceOpener {
    fn open(&mut self) -> Result<Box<dyn SampleSource>, DeviceError>;
}

impl<F> SourceOpener for F
where
    F: FnMut() -> Result<Box<dyn SampleSource>, DeviceError>,
{
    fn open(&mut self) -> Result<Box<dyn SampleSource>, DeviceError> {
        self()
    }
}
