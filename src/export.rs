// src/export.rs

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::ExportError;
use crate::history::HistoryPoint;
use crate::processing::bpm::recompute_bpm;
use crate::processing::detectors::BeatDetector;
use crate::processing::filters::SignalFilter;

/// Where a session was written and what went into it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    pub path: PathBuf,
    pub rows: usize,
    pub filtered: bool,
}

/// One parsed row of an export file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub time: f64,
    pub signal: i32,
    #[serde(default)]
    pub signal_filtered: Option<f64>,
    pub bpm: f64,
    #[serde(default)]
    pub bpm_filtered: Option<f64>,
}

/// Filtered signal plus the BPM re-detected on it, one value per point.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredColumns {
    pub signal: Vec<f64>,
    pub bpm: Vec<f64>,
}

impl FilteredColumns {
    pub fn compute(history: &[HistoryPoint], filter: &SignalFilter, detector: BeatDetector) -> Self {
        let timestamps: Vec<f64> = history.iter().map(|p| p.timestamp).collect();
        let raw: Vec<f64> = history.iter().map(|p| p.raw_value as f64).collect();

        let signal = filter.apply(&raw);
        let bpm = recompute_bpm(&timestamps, &signal, detector);
        Self { signal, bpm }
    }
}

// WRITING ---------------------------------------------------------------------

/// Writes `history` as CSV with columns
/// `time, signal[, signal_filtered], bpm[, bpm_filtered]`.
pub fn write_export(
    path: &Path,
    history: &[HistoryPoint],
    filtered: Option<&FilteredColumns>,
) -> Result<ExportResult, ExportError> {
    let io_error = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let file = File::create(path).map_err(io_error)?;
    let mut writer = csv::Writer::from_writer(file);

    let mut headers = vec!["time", "signal"];
    if filtered.is_some() {
        headers.push("signal_filtered");
    }
    headers.push("bpm");
    if filtered.is_some() {
        headers.push("bpm_filtered");
    }
    writer.write_record(&headers)?;

    for (i, point) in history.iter().enumerate() {
        let mut record = vec![point.timestamp.to_string(), point.raw_value.to_string()];
        if let Some(columns) = filtered {
            record.push(columns.signal.get(i).copied().unwrap_or(f64::NAN).to_string());
        }
        record.push(point.smoothed_bpm.to_string());
        if let Some(columns) = filtered {
            record.push(columns.bpm.get(i).copied().unwrap_or(0.0).to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush().map_err(io_error)?;

    log::info!(
        "exported {} rows to {}{}",
        history.len(),
        path.display(),
        if filtered.is_some() { " (with filtered columns)" } else { "" }
    );

    Ok(ExportResult {
        path: path.to_path_buf(),
        rows: history.len(),
        filtered: filtered.is_some(),
    })
}

// READING ---------------------------------------------------------------------

pub fn read_export(path: &Path) -> Result<Vec<ExportRow>, ExportError> {
    let file = File::open(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = csv::Reader::from_reader(file);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: ExportRow = result?;
        rows.push(row);
    }
    Ok(rows)
}
