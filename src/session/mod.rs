// src/session/mod.rs

mod snapshot;

pub use snapshot::{Snapshot, SnapshotReader};

use crossbeam_channel::{bounded, Receiver};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use crate::acquisition::{IngestionWorker, Sample, SourceOpener, WorkerExit, WorkerHandle};
use crate::config::Config;
use crate::error::{ExportError, SessionError};
use crate::export::{write_export, ExportResult, FilteredColumns};
use crate::history::{FilteredSample, HistoryPoint, RollingBuffer};
use crate::processing::bpm::BpmEstimator;
use crate::processing::detectors::BeatDetector;
use crate::processing::filters::SignalFilter;
use snapshot::{create_shared_snapshot, publish, SharedSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    Stopped,
}

// METADATA --------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectMetadata {
    pub label: String,
    pub gender: String,
    pub age: String,
    pub condition: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMetadata {
    pub subject: SubjectMetadata,
    /// Export destination written at `stop()`, none for an unrecorded session.
    pub export_path: Option<PathBuf>,
}

impl SessionMetadata {
    pub fn unrecorded() -> Self {
        Self::default()
    }

    pub fn recorded(subject: SubjectMetadata, export_path: impl Into<PathBuf>) -> Self {
        Self {
            subject,
            export_path: Some(export_path.into()),
        }
    }

    /// Recorded sessions need every subject field and a numeric age.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.export_path.is_none() {
            return Ok(());
        }

        let subject = &self.subject;
        for (name, value) in [
            ("label", &subject.label),
            ("gender", &subject.gender),
            ("age", &subject.age),
            ("condition", &subject.condition),
        ] {
            if value.trim().is_empty() {
                return Err(SessionError::InvalidMetadata(format!("{} is empty", name)));
            }
        }
        if subject.age.trim().parse::<u32>().is_err() {
            return Err(SessionError::InvalidMetadata(format!(
                "age '{}' is not a number",
                subject.age
            )));
        }
        Ok(())
    }
}

// STOP REPORT -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StopReport {
    pub export: Option<ExportResult>,
    pub worker: WorkerExit,
}

// CONTROLLER ------------------------------------------------------------------

/// Owns one acquisition session at a time: the worker, the processing chain
/// and the rolling history. Drive it with `tick()` on a fixed cadence.
pub struct SessionController {
    config: Config,
    opener: Box<dyn SourceOpener>,
    state: SessionState,
    metadata: SessionMetadata,

    detector: BeatDetector,
    estimator: BpmEstimator,
    buffer: RollingBuffer,
    filter: SignalFilter,
    filter_enabled: bool,

    receiver: Option<Receiver<Sample>>,
    worker: Option<WorkerHandle>,
    worker_exit: Option<WorkerExit>,
    dropped_samples: u64,
    /// Session clock zero, anchored at the first sample after start or reset.
    origin: Option<Instant>,

    shared: SharedSnapshot,
    last_publish: Option<Instant>,
}

impl SessionController {
    pub fn new(config: Config, opener: impl SourceOpener + 'static) -> Result<Self, SessionError> {
        config.validate()?;
        let filter = SignalFilter::from_config(&config.filter, config.acquisition.sample_rate_hz)
            .map_err(|e| crate::error::ConfigError::Invalid(e.to_string()))?;

        Ok(Self {
            detector: BeatDetector::from_config(&config.beat),
            estimator: BpmEstimator::from_config(&config.bpm),
            buffer: RollingBuffer::new(config.history_capacity()),
            filter,
            filter_enabled: false,
            opener: Box::new(opener),
            state: SessionState::Idle,
            metadata: SessionMetadata::default(),
            receiver: None,
            worker: None,
            worker_exit: None,
            dropped_samples: 0,
            origin: None,
            shared: create_shared_snapshot(),
            last_publish: None,
            config,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            operation,
            state: self.state,
        }
    }

    // LIFECYCLE ---------------------------------------------------------------

    pub fn start(&mut self, metadata: SessionMetadata) -> Result<(), SessionError> {
        if !matches!(self.state, SessionState::Idle | SessionState::Stopped) {
            return Err(self.invalid("start"));
        }
        metadata.validate()?;

        let source = self.opener.open().map_err(SessionError::DeviceUnavailable)?;

        self.clear_processing();
        self.dropped_samples = 0;
        self.worker_exit = None;

        let (sender, receiver) = bounded(self.config.acquisition.channel_capacity);
        let worker = IngestionWorker::spawn(source, sender, &receiver, &self.config.acquisition)
            .map_err(SessionError::Device)?;

        self.receiver = Some(receiver);
        self.worker = Some(worker);
        self.metadata = metadata;
        self.state = SessionState::Running;
        log::info!(
            "session started{}",
            match &self.metadata.export_path {
                Some(path) => format!(", recording to {}", path.display()),
                None => String::new(),
            }
        );

        self.publish_now();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Running {
            return Err(self.invalid("pause"));
        }
        if let Some(worker) = &self.worker {
            worker.set_paused(true);
        }
        // what already arrived belongs to the pre-pause history
        self.drain();
        self.state = SessionState::Paused;
        log::info!("session paused at {} points", self.buffer.len());

        self.publish_now();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Paused {
            return Err(self.invalid("resume"));
        }
        self.discard_pending();
        if let Some(worker) = &self.worker {
            worker.set_paused(false);
        }
        self.state = SessionState::Running;
        log::info!("session resumed");

        self.publish_now();
        Ok(())
    }

    /// Stops the worker and writes the export if one was requested. On an
    /// export failure the session still ends up stopped and the history is
    /// kept, so `export_to` can retry.
    pub fn stop(&mut self) -> Result<StopReport, SessionError> {
        if !matches!(self.state, SessionState::Running | SessionState::Paused) {
            return Err(self.invalid("stop"));
        }
        let was_running = self.state == SessionState::Running;

        let worker = match self.worker.take() {
            Some(handle) => {
                self.dropped_samples = handle.dropped_samples();
                handle.shutdown(self.config.acquisition.join_timeout())
            }
            None => self.worker_exit.clone().unwrap_or(WorkerExit::Clean),
        };
        if was_running {
            self.drain();
        }
        self.receiver = None;
        self.state = SessionState::Stopped;
        self.worker_exit = Some(worker.clone());
        log::info!("session stopped ({:?}) with {} points", worker, self.buffer.len());

        self.publish_now();

        let Some(path) = self.metadata.export_path.clone() else {
            return Ok(StopReport {
                export: None,
                worker,
            });
        };
        match self.export_to(&path) {
            Ok(export) => Ok(StopReport {
                export: Some(export),
                worker,
            }),
            Err(e) => {
                log::warn!("export to {} failed: {}", path.display(), e);
                Err(SessionError::Export(e))
            }
        }
    }

    /// Clears history and the BPM window and re-bases the session clock. The
    /// connection, if any, stays open.
    pub fn reset(&mut self) {
        self.discard_pending();
        self.clear_processing();
        log::info!("session reset");
        self.publish_now();
    }

    fn clear_processing(&mut self) {
        self.detector.reset();
        self.estimator.reset();
        self.buffer.clear();
        self.origin = None;
    }

    // PROCESSING --------------------------------------------------------------

    /// Drains the channel into the history and publishes a snapshot when the
    /// publish interval has passed. Returns the number of points appended.
    /// A worker that died since the last tick surfaces as `SessionError::Device`.
    pub fn tick(&mut self) -> Result<usize, SessionError> {
        let failure = match self.worker.as_mut().and_then(|w| w.try_finish()) {
            Some(Err(e)) => Some(e),
            Some(Ok(())) => {
                self.worker_exit = Some(WorkerExit::Clean);
                None
            }
            None => None,
        };
        if let Some(worker) = &self.worker {
            self.dropped_samples = worker.dropped_samples();
        }

        let appended = match self.state {
            SessionState::Running => self.drain(),
            SessionState::Paused => {
                self.discard_pending();
                0
            }
            SessionState::Idle | SessionState::Stopped => 0,
        };

        if let Some(e) = failure {
            if let Some(worker) = self.worker.take() {
                self.dropped_samples = worker.dropped_samples();
            }
            self.worker_exit = Some(WorkerExit::Failed(e.to_string()));
            self.publish_now();
            return Err(SessionError::Device(e));
        }

        self.maybe_publish();
        Ok(appended)
    }

    /// Calls `tick` every drain interval until `keep_running` returns false
    /// or the worker fails.
    pub fn run_until(
        &mut self,
        mut keep_running: impl FnMut(&Self) -> bool,
    ) -> Result<(), SessionError> {
        let interval = self.config.session.drain_interval();
        while keep_running(self) {
            self.tick()?;
            thread::sleep(interval);
        }
        Ok(())
    }

    fn drain(&mut self) -> usize {
        let Some(receiver) = self.receiver.clone() else {
            return 0;
        };
        let mut appended = 0;
        for sample in receiver.try_iter().take(self.config.acquisition.channel_capacity) {
            if self.ingest(sample) {
                appended += 1;
            }
        }
        appended
    }

    fn discard_pending(&mut self) {
        if let Some(receiver) = &self.receiver {
            let discarded = receiver.try_iter().count();
            if discarded > 0 {
                log::debug!("discarded {} queued samples", discarded);
            }
        }
    }

    fn ingest(&mut self, sample: Sample) -> bool {
        let origin = *self.origin.get_or_insert(sample.timestamp);
        let timestamp = sample
            .timestamp
            .saturating_duration_since(origin)
            .as_secs_f64();

        if let Some(beat) = self.detector.process_sample(timestamp, sample.raw_value as f64) {
            match self.estimator.on_beat(beat) {
                Some(bpm) => log::debug!("beat at {:.3}s, {:.1} BPM", beat.timestamp, bpm),
                None => log::debug!("beat at {:.3}s", beat.timestamp),
            }
        }

        self.buffer.push(HistoryPoint {
            timestamp,
            raw_value: sample.raw_value,
            smoothed_bpm: self.estimator.current_bpm().unwrap_or(0.0),
        })
    }

    // VIEWS -------------------------------------------------------------------

    pub fn set_filter_enabled(&mut self, enabled: bool) {
        if self.filter_enabled != enabled {
            log::info!("filtered view {}", if enabled { "enabled" } else { "disabled" });
        }
        self.filter_enabled = enabled;
    }

    pub fn filter_enabled(&self) -> bool {
        self.filter_enabled
    }

    /// The visible window of history run through the filter cascade when the
    /// filtered view is on, or passed through unchanged when it is off.
    pub fn filtered_view(&self) -> Vec<FilteredSample> {
        let window = self.buffer.window(self.config.history.window_secs);
        let raw: Vec<f64> = window.iter().map(|p| p.raw_value as f64).collect();

        let values = if self.filter_enabled {
            self.filter.apply(&raw)
        } else {
            raw
        };

        window
            .iter()
            .zip(values)
            .map(|(point, value)| FilteredSample {
                timestamp: point.timestamp,
                value,
            })
            .collect()
    }

    pub fn history(&self) -> &RollingBuffer {
        &self.buffer
    }

    pub fn current_bpm(&self) -> Option<f64> {
        self.estimator.current_bpm()
    }

    /// A fresh copy of the current state. Two calls without an append in
    /// between return equal snapshots.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            history: self.buffer.to_vec(),
            current_bpm: self.estimator.current_bpm(),
            stats: self.estimator.stats(),
            dropped_samples: self.dropped_samples,
            filter_enabled: self.filter_enabled,
        }
    }

    /// Handle for other threads to read the last published snapshot.
    pub fn snapshot_reader(&self) -> SnapshotReader {
        SnapshotReader::new(self.shared.clone())
    }

    fn maybe_publish(&mut self) {
        let due = self
            .last_publish
            .map_or(true, |at| at.elapsed() >= self.config.session.publish_interval());
        if due {
            self.publish_now();
        }
    }

    fn publish_now(&mut self) {
        publish(&self.shared, self.snapshot());
        self.last_publish = Some(Instant::now());
    }

    // EXPORT ------------------------------------------------------------------

    /// Writes the retained history to `path`, adding filtered columns when
    /// the filtered view is on.
    pub fn export_to(&self, path: &Path) -> Result<ExportResult, ExportError> {
        let history = self.buffer.to_vec();

        let filtered = self.filter_enabled.then(|| {
            let threshold = self
                .config
                .beat
                .filtered_threshold
                .unwrap_or(self.config.beat.threshold);
            FilteredColumns::compute(
                &history,
                &self.filter,
                BeatDetector::new(threshold, self.config.beat.refractory_secs),
            )
        });

        write_export(path, &history, filtered.as_ref())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown(self.config.acquisition.join_timeout());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> SubjectMetadata {
        SubjectMetadata {
            label: "S01".to_string(),
            gender: "F".to_string(),
            age: "34".to_string(),
            condition: "rest".to_string(),
        }
    }

    #[test]
    fn unrecorded_sessions_need_no_metadata() {
        SessionMetadata::unrecorded().validate().unwrap();
    }

    #[test]
    fn recorded_sessions_need_complete_metadata() {
        SessionMetadata::recorded(subject(), "out.csv").validate().unwrap();

        let mut missing = subject();
        missing.condition = "  ".to_string();
        let err = SessionMetadata::recorded(missing, "out.csv").validate();
        assert!(matches!(err, Err(SessionError::InvalidMetadata(_))));

        let mut bad_age = subject();
        bad_age.age = "thirty".to_string();
        let err = SessionMetadata::recorded(bad_age, "out.csv").validate();
        assert!(matches!(err, Err(SessionError::InvalidMetadata(_))));
    }
}
