// src/acquisition/source.rs

use serialport::SerialPort;
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use super::{Sample, SampleSource, SimulatedSource, SourceOpener};
use crate::config::{AcquisitionConfig, SourceConfig};
use crate::error::DeviceError;

pub type TcpSource = LineSource<BufReader<TcpStream>>;
pub type DeviceSource = LineSource<BufReader<Box<dyn SerialPort>>>;

/// Longest line kept while waiting for its newline. Well above any `i32`.
pub const MAX_LINE_LEN: usize = 32;

// LINE SOURCE -----------------------------------------------------------------

/// Reads newline-delimited ASCII integers. Partial lines are kept across
/// read timeouts and completed on the next call. A line that outgrows
/// `MAX_LINE_LEN` is dropped and reading resumes after its newline.
pub struct LineSource<R> {
    reader: R,
    line: Vec<u8>,
    overlong: bool,
    sentinel: String,
    skipped: u64,
}

impl<R: BufRead + Send> LineSource<R> {
    pub fn new(reader: R, sentinel: impl Into<String>) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(MAX_LINE_LEN),
            overlong: false,
            sentinel: sentinel.into(),
            skipped: 0,
        }
    }

    /// Number of lines discarded as malformed so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Moves buffered bytes into `line` until a newline is consumed.
    /// Returns `false` at end of stream.
    fn fill_line(&mut self) -> io::Result<bool> {
        loop {
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                return Ok(false);
            }
            let (chunk, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (&available[..=end], true),
                None => (available, false),
            };
            let used = chunk.len();

            if !self.overlong {
                if self.line.len() + used > MAX_LINE_LEN {
                    self.overlong = true;
                    self.line.clear();
                } else {
                    self.line.extend_from_slice(chunk);
                }
            }
            self.reader.consume(used);

            if complete {
                return Ok(true);
            }
        }
    }

    fn take_line(&mut self) -> Option<i32> {
        let value = if self.overlong {
            log::trace!("skipping line longer than {} bytes", MAX_LINE_LEN);
            None
        } else {
            parse_line(&self.line, &self.sentinel)
        };
        if value.is_none() {
            self.skipped += 1;
            if !self.overlong {
                log::trace!(
                    "skipping malformed line {:?}",
                    String::from_utf8_lossy(&self.line).trim_end()
                );
            }
        }
        self.overlong = false;
        self.line.clear();
        value
    }
}

impl<R: BufRead + Send> SampleSource for LineSource<R> {
    fn next_sample(&mut self) -> Result<Option<Sample>, DeviceError> {
        loop {
            match self.fill_line() {
                Ok(true) => {
                    if let Some(value) = self.take_line() {
                        return Ok(Some(Sample::now(value)));
                    }
                }
                Ok(false) => {
                    if self.line.is_empty() && !self.overlong {
                        return Err(DeviceError::Disconnected);
                    }
                    // unterminated last line
                    if let Some(value) = self.take_line() {
                        return Ok(Some(Sample::now(value)));
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(DeviceError::Io(e)),
            }
        }
    }
}

/// Parses one protocol line. Empty lines, the sentinel and anything that is
/// not an integer yield `None`.
pub fn parse_line(line: &[u8], sentinel: &str) -> Option<i32> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() || text == sentinel {
        return None;
    }
    text.parse().ok()
}

// CONNECTIONS -----------------------------------------------------------------

impl TcpSource {
    pub fn connect(
        address: &str,
        read_timeout: Duration,
        sentinel: &str,
    ) -> Result<Self, DeviceError> {
        let unavailable = |source| DeviceError::Unavailable {
            target: address.to_string(),
            source,
        };

        let stream = TcpStream::connect(address).map_err(unavailable)?;
        stream
            .set_read_timeout(Some(read_timeout))
            .map_err(unavailable)?;

        log::info!("connected to sample stream at {}", address);
        Ok(LineSource::new(BufReader::new(stream), sentinel))
    }
}

impl DeviceSource {
    /// Opens a serial port at `baud_rate`, 8N1. Reads give up after
    /// `read_timeout` so the worker keeps polling its stop flag.
    pub fn open(
        path: &Path,
        baud_rate: u32,
        read_timeout: Duration,
        sentinel: &str,
    ) -> Result<Self, DeviceError> {
        let target = path.display().to_string();
        let port = serialport::new(target.as_str(), baud_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| DeviceError::Unavailable {
                target: target.clone(),
                source: e.into(),
            })?;

        log::info!("opened serial device {} at {} baud", target, baud_rate);
        Ok(Self::from_port(port, sentinel))
    }

    pub fn from_port(port: Box<dyn SerialPort>, sentinel: &str) -> Self {
        LineSource::new(BufReader::new(port), sentinel)
    }
}

/// Opens whatever `source` describes.
pub fn open_source(
    source: &SourceConfig,
    acquisition: &AcquisitionConfig,
) -> Result<Box<dyn SampleSource>, DeviceError> {
    match source {
        SourceConfig::Tcp { address } => Ok(Box::new(TcpSource::connect(
            address,
            acquisition.read_timeout(),
            &acquisition.sentinel,
        )?)),
        SourceConfig::Device { path, baud_rate } => Ok(Box::new(DeviceSource::open(
            path,
            *baud_rate,
            acquisition.read_timeout(),
            &acquisition.sentinel,
        )?)),
        SourceConfig::Simulated {
            heart_rate_bpm,
            seed,
        } => Ok(Box::new(SimulatedSource::new(
            *heart_rate_bpm,
            acquisition.sample_rate_hz,
            *seed,
        ))),
    }
}

/// Opener built from configuration, used by the monitor binary.
#[derive(Debug, Clone)]
pub struct ConfiguredOpener {
    source: SourceConfig,
    acquisition: AcquisitionConfig,
}

impl ConfiguredOpener {
    pub fn new(source: SourceConfig, acquisition: AcquisitionConfig) -> Self {
        Self {
            source,
            acquisition,
        }
    }
}

impl SourceOpener for ConfiguredOpener {
    fn open(&mut self) -> Result<Box<dyn SampleSource>, DeviceError> {
        open_source(&self.source, &self.acquisition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor, Read};

    fn values(source: &mut impl SampleSource) -> Vec<i32> {
        let mut out = Vec::new();
        while let Ok(Some(sample)) = source.next_sample() {
            out.push(sample.raw_value);
        }
        out
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let input = "512\n\n!\nabc\n  530 \r\n-4\n1e3\n700\n";
        let mut source = LineSource::new(Cursor::new(input), "!");
        assert_eq!(values(&mut source), vec![512, 530, -4, 700]);
        assert_eq!(source.skipped(), 4);
    }

    #[test]
    fn end_of_stream_is_a_disconnect() {
        let mut source = LineSource::new(Cursor::new("1\n"), "!");
        assert!(source.next_sample().unwrap().is_some());
        assert!(matches!(
            source.next_sample(),
            Err(DeviceError::Disconnected)
        ));
    }

    /// Hands out its chunks one read at a time, timing out in between.
    struct Stuttering {
        chunks: Vec<&'static [u8]>,
        timed_out: bool,
    }

    impl Read for Stuttering {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.timed_out {
                self.timed_out = true;
                return Err(io::Error::new(ErrorKind::WouldBlock, "timeout"));
            }
            self.timed_out = false;
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn partial_line_survives_a_timeout() {
        let reader = Stuttering {
            chunks: vec![&b"6"[..], &b"42\n"[..]],
            timed_out: false,
        };
        let mut source = LineSource::new(BufReader::new(reader), "!");

        assert!(source.next_sample().unwrap().is_none());
        assert!(source.next_sample().unwrap().is_none());
        let sample = source.next_sample().unwrap().unwrap();
        assert_eq!(sample.raw_value, 642);
    }

    #[test]
    fn unreachable_tcp_address_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpSource::connect(&address, Duration::from_millis(10), "!");
        assert!(matches!(result, Err(DeviceError::Unavailable { .. })));
    }

    static NOISE: [u8; 1000] = [b'x'; 1000];

    #[test]
    fn overlong_line_is_dropped_and_reading_resyncs() {
        let reader = Stuttering {
            chunks: vec![&NOISE[..], &NOISE[..], &NOISE[..], &b"x\n512\n"[..]],
            timed_out: false,
        };
        let mut source = LineSource::new(BufReader::new(reader), "!");

        let mut received = None;
        for _ in 0..10 {
            match source.next_sample().unwrap() {
                Some(sample) => {
                    received = Some(sample.raw_value);
                    break;
                }
                None => assert!(source.line.len() <= MAX_LINE_LEN),
            }
        }
        assert_eq!(received, Some(512));
        assert_eq!(source.skipped(), 1);
    }

    #[test]
    fn unterminated_last_line_is_still_read() {
        let mut source = LineSource::new(Cursor::new("1\n2"), "!");
        assert_eq!(values(&mut source), vec![1, 2]);
    }

    #[test]
    fn missing_serial_device_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = DeviceSource::open(
            &dir.path().join("ttyMISSING0"),
            9600,
            Duration::from_millis(10),
            "!",
        );
        assert!(matches!(missing, Err(DeviceError::Unavailable { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn quiet_serial_line_times_out_instead_of_blocking() {
        use serialport::TTYPort;
        use std::io::Write;
        use std::time::Instant;

        let (mut host, mut device) = TTYPort::pair().unwrap();
        device.set_timeout(Duration::from_millis(20)).unwrap();
        let mut source = DeviceSource::from_port(Box::new(device), "!");

        let started = Instant::now();
        assert!(source.next_sample().unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(1));

        host.write_all(b"512\n").unwrap();
        let mut received = None;
        for _ in 0..50 {
            if let Some(sample) = source.next_sample().unwrap() {
                received = Some(sample.raw_value);
                break;
            }
        }
        assert_eq!(received, Some(512));
    }
}
