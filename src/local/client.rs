use colored::Colorize;
use crossbeam_channel::{unbounded, Receiver, TryRecvError};
use std::error::Error;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;

use crate::acquisition::{ConfiguredOpener, WorkerExit};
use crate::config::Config;
use crate::processing::filters::ema::ExponentialMovingAverage;
use crate::session::{SessionController, SessionMetadata, Snapshot, SnapshotReader, StopReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Pause,
    Resume,
    ToggleFilter,
    Reset,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "p" | "pause" => Some(Command::Pause),
        "r" | "resume" => Some(Command::Resume),
        "f" | "filter" => Some(Command::ToggleFilter),
        "x" | "reset" => Some(Command::Reset),
        "q" | "quit" | "stop" => Some(Command::Quit),
        _ => None,
    }
}

fn spawn_command_reader() -> Receiver<Command> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None => println!("{}", "commands: p(ause) r(esume) f(ilter) x(reset) q(uit)".yellow()),
            }
        }
    });
    rx
}

// DISPLAY ---------------------------------------------------------------------

/// Prints one line per published snapshot: BPM and how far the newest sample
/// sits above its slow baseline.
struct Display {
    reader: SnapshotReader,
    last: Option<Arc<Snapshot>>,
    last_timestamp: f64,
    baseline: ExponentialMovingAverage,
    threshold: f64,
}

impl Display {
    fn new(reader: SnapshotReader, threshold: f64) -> Self {
        Self {
            reader,
            last: None,
            last_timestamp: f64::NEG_INFINITY,
            baseline: ExponentialMovingAverage::default(),
            threshold,
        }
    }

    fn refresh(&mut self) {
        let snapshot = self.reader.latest();
        if self.last.as_ref().map_or(false, |last| Arc::ptr_eq(last, &snapshot)) {
            return;
        }

        let since = self.last_timestamp;
        let mut peak = None::<i32>;
        for point in snapshot.history.iter().filter(|p| p.timestamp > since) {
            self.baseline.update(point.raw_value as f64);
            peak = Some(peak.map_or(point.raw_value, |p| p.max(point.raw_value)));
        }
        if let Some(latest) = snapshot.latest() {
            self.last_timestamp = latest.timestamp;
        } else {
            // history was reset
            self.last_timestamp = f64::NEG_INFINITY;
            self.baseline.reset();
        }

        if let Some(peak) = peak {
            print!("{}", self.render(&snapshot, peak));
        }
        self.last = Some(snapshot);
    }

    fn render(&self, snapshot: &Snapshot, peak: i32) -> String {
        let bpm = match snapshot.current_bpm {
            Some(bpm) => format!("{:>6.1} BPM", bpm).green(),
            None => "  --.- BPM".white(),
        };

        // To ensure |repeat| doesn't overflow
        let max_len = 80;
        let deviation = (peak as f64 - self.baseline.value()).max(0.0) as usize;
        let bar = "|".repeat((deviation / 4).min(max_len));
        let bar = if (peak as f64) > self.threshold {
            bar.red()
        } else {
            bar.white()
        };

        let filter = if snapshot.filter_enabled { "F".cyan() } else { " ".white() };
        format!("{} {} {:>5} {}\n", bpm, filter, peak, bar)
    }
}

// RUN CODE --------------------------------------------------------------------

pub fn run(config: Config, metadata: SessionMetadata) -> Result<(), Box<dyn Error>> {
    let opener = ConfiguredOpener::new(config.source.clone(), config.acquisition.clone());
    let threshold = config.beat.threshold;
    let mut controller = SessionController::new(config, opener)?;

    controller.start(metadata)?;
    println!(
        "{}",
        "monitoring, commands: p(ause) r(esume) f(ilter) x(reset) q(uit)".yellow()
    );

    let commands = spawn_command_reader();
    let mut display = Display::new(controller.snapshot_reader(), threshold);
    let interval = controller.config().session.drain_interval();

    loop {
        match commands.try_recv() {
            Ok(Command::Quit) => break,
            Ok(command) => apply(&mut controller, command),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
        }

        if let Err(e) = controller.tick() {
            println!("{} {}", "session interrupted:".red(), e);
            break;
        }
        display.refresh();
        thread::sleep(interval);
    }

    let report = controller.stop()?;
    print_report(&report, &controller);
    Ok(())
}

fn apply(controller: &mut SessionController, command: Command) {
    let result = match command {
        Command::Pause => controller.pause(),
        Command::Resume => controller.resume(),
        Command::ToggleFilter => {
            let enabled = !controller.filter_enabled();
            controller.set_filter_enabled(enabled);
            Ok(())
        }
        Command::Reset => {
            controller.reset();
            Ok(())
        }
        Command::Quit => Ok(()),
    };
    if let Err(e) = result {
        println!("{}", e.to_string().yellow());
    }
}

fn print_report(report: &StopReport, controller: &SessionController) {
    match &report.worker {
        WorkerExit::Clean => {}
        WorkerExit::Failed(reason) => println!("{} {}", "device error:".red(), reason),
        WorkerExit::ShutdownTimeout => println!("{}", "reader thread did not stop in time".red()),
    }

    let snapshot = controller.snapshot();
    match snapshot.stats {
        Some(stats) => println!(
            "{} mean {:.1}  min {:.1}  max {:.1}  ({} intervals)",
            "BPM".green(),
            stats.mean,
            stats.min,
            stats.max,
            stats.count
        ),
        None => println!("{}", "no heartbeat detected".yellow()),
    }
    if snapshot.dropped_samples > 0 {
        println!("{} {}", "dropped samples:".yellow(), snapshot.dropped_samples);
    }
    if let Some(export) = &report.export {
        println!("saved {} rows to {}", export.rows, export.path.display());
    }
}
