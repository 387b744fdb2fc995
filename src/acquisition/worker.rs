// src/acquisition/worker.rs

use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{Sample, SampleSource};
use crate::config::{AcquisitionConfig, OverflowPolicy};
use crate::error::DeviceError;

/// How the ingestion thread ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerExit {
    /// Stopped on request.
    Clean,
    /// The source failed; carries the error message.
    Failed(String),
    /// Did not stop within the join timeout and was left detached.
    ShutdownTimeout,
}

#[derive(Debug, Default)]
struct WorkerFlags {
    stop: AtomicBool,
    paused: AtomicBool,
    dropped: AtomicU64,
}

/// Producer loop moving samples from a source into the bounded channel.
pub struct IngestionWorker {
    source: Box<dyn SampleSource>,
    sender: Sender<Sample>,
    // Only held under DropOldest, to evict the head of a full queue.
    evictor: Option<Receiver<Sample>>,
    flags: Arc<WorkerFlags>,
    poll_interval: Duration,
    pause_interval: Duration,
}

impl IngestionWorker {
    /// Starts the worker on its own thread. `receiver` must be the consumer
    /// end of `sender`'s channel.
    pub fn spawn(
        source: Box<dyn SampleSource>,
        sender: Sender<Sample>,
        receiver: &Receiver<Sample>,
        config: &AcquisitionConfig,
    ) -> Result<WorkerHandle, DeviceError> {
        let flags = Arc::new(WorkerFlags::default());
        let evictor = match config.overflow_policy {
            OverflowPolicy::DropNewest => None,
            OverflowPolicy::DropOldest => Some(receiver.clone()),
        };

        let worker = IngestionWorker {
            source,
            sender,
            evictor,
            flags: Arc::clone(&flags),
            poll_interval: config.worker_poll_interval(),
            pause_interval: config.pause_poll_interval(),
        };

        let handle = thread::Builder::new()
            .name("ekg-ingestion".to_string())
            .spawn(move || worker.run())?;

        Ok(WorkerHandle {
            flags,
            handle: Some(handle),
        })
    }

    fn run(mut self) -> Result<(), DeviceError> {
        log::debug!("ingestion worker started");

        while !self.flags.stop.load(Ordering::Acquire) {
            if self.flags.paused.load(Ordering::Acquire) {
                thread::sleep(self.pause_interval);
                continue;
            }

            match self.source.next_sample() {
                Ok(Some(sample)) => {
                    if !self.push(sample) {
                        log::debug!("sample channel closed, ingestion worker exiting");
                        return Ok(());
                    }
                }
                Ok(None) => thread::sleep(self.poll_interval),
                Err(e) => {
                    log::error!("ingestion worker stopped by device error: {}", e);
                    return Err(e);
                }
            }
        }

        log::debug!("ingestion worker stopped");
        Ok(())
    }

    /// Never blocks. Returns `false` once the consumer is gone.
    fn push(&self, sample: Sample) -> bool {
        let sample = match self.sender.try_send(sample) {
            Ok(()) => return true,
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(sample)) => sample,
        };

        if let Some(evictor) = &self.evictor {
            let _ = evictor.try_recv();
            if let Err(TrySendError::Disconnected(_)) = self.sender.try_send(sample) {
                return false;
            }
        }
        self.record_drop();
        true
    }

    fn record_drop(&self) {
        let dropped = self.flags.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped.is_power_of_two() {
            log::warn!("sample channel full, {} samples dropped so far", dropped);
        }
    }
}

// HANDLE ----------------------------------------------------------------------

/// Controller-side handle to a running worker.
pub struct WorkerHandle {
    flags: Arc<WorkerFlags>,
    handle: Option<JoinHandle<Result<(), DeviceError>>>,
}

impl WorkerHandle {
    pub fn set_paused(&self, paused: bool) {
        self.flags.paused.store(paused, Ordering::Release);
    }

    pub fn dropped_samples(&self) -> u64 {
        self.flags.dropped.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Joins the thread if it already ended on its own, without blocking.
    pub fn try_finish(&mut self) -> Option<Result<(), DeviceError>> {
        if !self.handle.as_ref()?.is_finished() {
            return None;
        }
        self.handle.take().map(join)
    }

    /// Signals stop and waits up to `timeout` for the thread to end. A
    /// thread still running after that is detached.
    pub fn shutdown(mut self, timeout: Duration) -> WorkerExit {
        self.flags.stop.store(true, Ordering::Release);

        let Some(handle) = self.handle.take() else {
            return WorkerExit::Clean;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                log::warn!(
                    "ingestion worker did not stop within {:?}, detaching it",
                    timeout
                );
                return WorkerExit::ShutdownTimeout;
            }
            thread::sleep(Duration::from_millis(1));
        }

        match join(handle) {
            Ok(()) => WorkerExit::Clean,
            Err(e) => WorkerExit::Failed(e.to_string()),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.flags.stop.store(true, Ordering::Release);
    }
}

fn join(handle: JoinHandle<Result<(), DeviceError>>) -> Result<(), DeviceError> {
    handle.join().unwrap_or_else(|_| {
        log::error!("ingestion worker panicked");
        Err(DeviceError::Disconnected)
    })
}
