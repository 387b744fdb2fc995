use rand::Rng;
use std::error::Error;
use std::io::{self, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::acquisition::SimulatedSource;
use crate::config::{Config, SourceConfig};
use crate::export::read_export;

// -----------------------------------------------------------------------------
// SETUP
// -----------------------------------------------------------------------------

const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";
const DEFAULT_HEART_RATE_BPM: f64 = 72.0;
/// Percent chance per sample of an extra lead-off line.
const LEAD_OFF_CHANCE: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorOptions {
    pub address: String,
    pub sample_rate_hz: f64,
    pub heart_rate_bpm: f64,
    pub sentinel: String,
    /// Export file whose `signal` column is replayed instead of synthesising.
    pub replay: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl SimulatorOptions {
    pub fn from_config(config: &Config) -> Self {
        let (address, heart_rate_bpm, seed) = match &config.source {
            SourceConfig::Tcp { address } => (address.clone(), DEFAULT_HEART_RATE_BPM, None),
            SourceConfig::Simulated {
                heart_rate_bpm,
                seed,
            } => (DEFAULT_ADDRESS.to_string(), *heart_rate_bpm, *seed),
            SourceConfig::Device { .. } => {
                (DEFAULT_ADDRESS.to_string(), DEFAULT_HEART_RATE_BPM, None)
            }
        };

        Self {
            address,
            sample_rate_hz: config.acquisition.sample_rate_hz,
            heart_rate_bpm,
            sentinel: config.acquisition.sentinel.clone(),
            replay: None,
            seed,
        }
    }
}

// -----------------------------------------------------------------------------
// RUN CODE
// -----------------------------------------------------------------------------

/// Serves the sensor line protocol to every client that connects.
pub fn run(options: &SimulatorOptions) -> Result<(), Box<dyn Error>> {
    let listener = TcpListener::bind(&options.address)?;
    log::info!("simulated sensor listening on {}", options.address);

    let replay = match &options.replay {
        Some(path) => {
            let signal: Vec<i32> = read_export(path)?.iter().map(|row| row.signal).collect();
            log::info!("replaying {} samples from {}", signal.len(), path.display());
            Some(Arc::new(signal))
        }
        None => None,
    };

    for stream in listener.incoming() {
        let stream = stream?;
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown peer".to_string());
        log::info!("client connected: {}", peer);

        let options = options.clone();
        let replay = replay.clone();
        thread::spawn(move || {
            let result = match replay {
                Some(signal) => send_replay(stream, &signal, &options),
                None => simulated_loop(stream, &options),
            };
            match result {
                Ok(()) => log::info!("finished streaming to {}", peer),
                Err(e) => log::info!("client {} disconnected: {}", peer, e),
            }
        });
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// STREAMING
// -----------------------------------------------------------------------------

/// Sleeps so that sample `index` goes out at its nominal time.
struct Pacer {
    started: Instant,
    period: Duration,
}

impl Pacer {
    fn new(sample_rate_hz: f64) -> Self {
        Self {
            started: Instant::now(),
            period: Duration::from_secs_f64(1.0 / sample_rate_hz),
        }
    }

    fn wait(&self, index: u32) {
        let due = self.started + self.period * index;
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }
}

fn simulated_loop(stream: TcpStream, options: &SimulatorOptions) -> io::Result<()> {
    let mut writer = BufWriter::new(stream);
    let mut source =
        SimulatedSource::new(options.heart_rate_bpm, options.sample_rate_hz, options.seed)
            .unpaced();
    let mut rng = rand::thread_rng();
    let pacer = Pacer::new(options.sample_rate_hz);

    for index in 0u32.. {
        if rng.gen_range(0..100) < LEAD_OFF_CHANCE {
            writeln!(writer, "{}", options.sentinel)?;
        }
        writeln!(writer, "{}", source.next_value())?;
        writer.flush()?;

        pacer.wait(index + 1);
    }
    Ok(())
}

fn send_replay(stream: TcpStream, signal: &[i32], options: &SimulatorOptions) -> io::Result<()> {
    let mut writer = BufWriter::new(stream);
    let pacer = Pacer::new(options.sample_rate_hz);

    for (index, value) in (1u32..).zip(signal) {
        writeln!(writer, "{}", value)?;
        writer.flush()?;
        pacer.wait(index);
    }
    Ok(())
}
