pub mod bpm;
pub mod detectors;
pub mod filters;
