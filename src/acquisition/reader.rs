//! The acquisition producer: owns the device connection and fans parsed
//! samples into the shared buffers.
//!
//! Exactly one background worker exists per reader while connected. The
//! worker is the sole writer of sample data; the consumer side reads
//! snapshots and flips the recording flag. All three buffers and the flag
//! live under one mutex, so a snapshot never observes a structure
//! mid-mutation and the stop-recording hand-off is atomic with respect to
//! the append path.

use crate::acquisition::port::{LineSource, SerialLineSource};
use crate::acquisition::types::{RecordParseError, Sample};
use crate::core::buffers::{DisplayBuffer, SlidingWindowCache};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Connection parameters for the reader.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Baud rate of the ECG device
    pub baud_rate: u32,
    /// Bounded read timeout in milliseconds; also bounds worst-case
    /// shutdown delay
    pub read_timeout_ms: u64,
    /// Initial sliding-window retention in milliseconds of device time
    pub cache_limit_ms: f64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            baud_rate: 200,
            read_timeout_ms: 1000,
            cache_limit_ms: 30_000.0,
        }
    }
}

impl ReaderConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Errors reported by reader operations.
#[derive(Debug)]
pub enum ReaderError {
    /// The serial port could not be opened or configured
    Port(String),
    /// The operation requires an active connection
    NotConnected,
}

impl std::fmt::Display for ReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderError::Port(e) => write!(f, "serial port error: {e}"),
            ReaderError::NotConnected => write!(f, "not connected to a device"),
        }
    }
}

impl std::error::Error for ReaderError {}

/// Out-of-band notifications from the acquisition worker.
#[derive(Debug, Clone)]
pub enum ReaderEvent {
    Connected { port: String },
    RecordSkipped(RecordParseError),
    Disconnected { reason: String },
}

/// Counters maintained by the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    pub records_parsed: u64,
    pub records_skipped: u64,
}

/// All sample state shared between the worker and the consumer.
struct SharedBuffers {
    display: DisplayBuffer,
    cache: SlidingWindowCache,
    recording: Vec<Sample>,
    is_recording: bool,
}

impl SharedBuffers {
    fn push(&mut self, sample: Sample) {
        self.display.push(sample.value);
        self.cache.push(sample);
        if self.is_recording {
            // Recording privileges completeness: the cache is not
            // time-trimmed until the session ends.
            self.recording.push(sample);
        } else {
            self.cache.evict_over_limit();
        }
    }
}

/// The acquisition producer.
pub struct SerialReader {
    config: ReaderConfig,
    shared: Arc<Mutex<SharedBuffers>>,
    running: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    event_tx: Sender<ReaderEvent>,
    event_rx: Receiver<ReaderEvent>,
    records_parsed: Arc<AtomicU64>,
    records_skipped: Arc<AtomicU64>,
}

impl SerialReader {
    pub fn new(config: ReaderConfig) -> Self {
        let shared = SharedBuffers {
            display: DisplayBuffer::new(),
            cache: SlidingWindowCache::new(config.cache_limit_ms),
            recording: Vec::new(),
            is_recording: false,
        };
        let (event_tx, event_rx) = bounded(256);

        Self {
            config,
            shared: Arc::new(Mutex::new(shared)),
            running: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
            worker: None,
            event_tx,
            event_rx,
            records_parsed: Arc::new(AtomicU64::new(0)),
            records_skipped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open the named serial port and start the background worker.
    ///
    /// A no-op returning success when already connected. On failure no
    /// worker is spawned; retrying `connect` is the recovery path.
    pub fn connect(&mut self, port_name: &str) -> Result<(), ReaderError> {
        if self.is_connected() {
            return Ok(());
        }
        let source = SerialLineSource::open(
            port_name,
            self.config.baud_rate,
            self.config.read_timeout(),
        )
        .map_err(|e| ReaderError::Port(e.to_string()))?;
        self.spawn_worker(Box::new(source), port_name.to_string());
        Ok(())
    }

    /// Start the worker over an arbitrary line source (replay, tests).
    pub fn connect_source(&mut self, source: Box<dyn LineSource>) -> Result<(), ReaderError> {
        if self.is_connected() {
            return Ok(());
        }
        self.spawn_worker(source, "<memory>".to_string());
        Ok(())
    }

    fn spawn_worker(&mut self, source: Box<dyn LineSource>, port: String) {
        // Reap a worker that ended on its own (EOF, I/O error).
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }

        self.running.store(true, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.event_tx.try_send(ReaderEvent::Connected { port });

        let shared = self.shared.clone();
        let running = self.running.clone();
        let connected = self.connected.clone();
        let events = self.event_tx.clone();
        let parsed = self.records_parsed.clone();
        let skipped = self.records_skipped.clone();

        let handle = thread::spawn(move || {
            run_read_loop(source, &shared, &running, &events, &parsed, &skipped);
            connected.store(false, Ordering::SeqCst);
        });
        self.worker = Some(handle);
    }

    /// Cooperatively stop the worker and close the connection.
    ///
    /// Waits a grace period bounded by the read timeout for an in-flight
    /// blocked read to settle; a worker still blocked past the grace window
    /// is detached and exits on its next timeout.
    pub fn disconnect(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.worker.take() {
            let grace = self.config.read_timeout() + Duration::from_millis(500);
            let deadline = Instant::now() + grace;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(25));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                tracing::warn!("acquisition worker blocked past grace period, detaching");
            }
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Set the recording flag. Fails when disconnected; idempotent while
    /// already recording.
    pub fn start_recording(&self) -> Result<(), ReaderError> {
        if !self.is_connected() {
            return Err(ReaderError::NotConnected);
        }
        self.lock().is_recording = true;
        Ok(())
    }

    /// Clear the recording flag and take ownership of the recorded
    /// samples. Returns `None` when no recording is active. The flag flip
    /// and the buffer hand-off happen under one lock, so no sample is lost
    /// or duplicated across the transition.
    pub fn stop_recording(&self) -> Option<Vec<Sample>> {
        let mut buffers = self.lock();
        if !buffers.is_recording {
            return None;
        }
        buffers.is_recording = false;
        Some(std::mem::take(&mut buffers.recording))
    }

    pub fn is_recording(&self) -> bool {
        self.lock().is_recording
    }

    /// Copy of the display waveform values in arrival order.
    pub fn display_snapshot(&self) -> Vec<i32> {
        self.lock().display.snapshot()
    }

    /// Consistent copy of the sliding-window cache.
    pub fn cache_snapshot(&self) -> Vec<Sample> {
        self.lock().cache.snapshot()
    }

    pub fn cache_len(&self) -> usize {
        self.lock().cache.len()
    }

    /// Update the sliding-window retention limit.
    pub fn set_cache_limit_ms(&self, limit_ms: f64) {
        self.lock().cache.set_limit_ms(limit_ms);
    }

    /// Receiver for out-of-band worker events.
    pub fn events(&self) -> &Receiver<ReaderEvent> {
        &self.event_rx
    }

    pub fn stats(&self) -> ReaderStats {
        ReaderStats {
            records_parsed: self.records_parsed.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedBuffers> {
        // A poisoned lock only means a worker panicked mid-append; the
        // buffers remain structurally valid.
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SerialReader {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// The worker loop: read, parse, fan out. A malformed record is counted,
/// reported, and skipped; only a transport error ends the loop.
fn run_read_loop(
    mut source: Box<dyn LineSource>,
    shared: &Mutex<SharedBuffers>,
    running: &AtomicBool,
    events: &Sender<ReaderEvent>,
    parsed: &AtomicU64,
    skipped: &AtomicU64,
) {
    while running.load(Ordering::SeqCst) {
        match source.read_line() {
            Ok(Some(line)) => match Sample::parse_line(&line) {
                Ok(sample) => {
                    parsed.fetch_add(1, Ordering::Relaxed);
                    shared
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(sample);
                }
                Err(e) => {
                    skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, record = line.trim(), "skipping malformed record");
                    let _ = events.try_send(ReaderEvent::RecordSkipped(e));
                }
            },
            // Idle read timeout: re-check the stop flag and keep going.
            Ok(None) => continue,
            Err(e) => {
                tracing::info!(error = %e, "acquisition stream ended");
                let _ = events.try_send(ReaderEvent::Disconnected {
                    reason: e.to_string(),
                });
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::port::piped_source;

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn connected_reader() -> (SerialReader, crossbeam_channel::Sender<String>) {
        let mut reader = SerialReader::new(ReaderConfig {
            read_timeout_ms: 20,
            ..ReaderConfig::default()
        });
        let (source, sender) = piped_source(Duration::from_millis(20));
        reader.connect_source(Box::new(source)).unwrap();
        (reader, sender)
    }

    #[test]
    fn test_samples_fan_into_display_and_cache() {
        let (reader, sender) = connected_reader();
        for i in 0..5 {
            sender.send(format!("{}.0 {}\n", i * 10, i)).unwrap();
        }
        assert!(wait_until(Duration::from_secs(2), || {
            reader.stats().records_parsed == 5
        }));

        assert_eq!(reader.display_snapshot(), vec![0, 1, 2, 3, 4]);
        let cache = reader.cache_snapshot();
        assert_eq!(cache.len(), 5);
        assert_eq!(cache[0], Sample::new(0.0, 0));
        assert_eq!(cache[4], Sample::new(40.0, 4));
    }

    #[test]
    fn test_malformed_record_is_skipped_not_fatal() {
        let (reader, sender) = connected_reader();
        sender.send("100.0 1\n".to_string()).unwrap();
        sender.send("garbage line here\n".to_string()).unwrap();
        sender.send("200.0 2\n".to_string()).unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            reader.stats().records_parsed == 2
        }));
        assert_eq!(reader.stats().records_skipped, 1);
        assert!(reader.is_connected());

        let skipped = reader
            .events()
            .try_iter()
            .filter(|e| matches!(e, ReaderEvent::RecordSkipped(_)))
            .count();
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_stop_recording_without_start_returns_none() {
        let (reader, _sender) = connected_reader();
        assert!(reader.stop_recording().is_none());
        // Recording buffer untouched: a later session starts empty
        reader.start_recording().unwrap();
        assert_eq!(reader.stop_recording().unwrap(), Vec::new());
    }

    #[test]
    fn test_start_recording_requires_connection() {
        let reader = SerialReader::new(ReaderConfig::default());
        assert!(matches!(
            reader.start_recording(),
            Err(ReaderError::NotConnected)
        ));
    }

    #[test]
    fn test_recording_captures_and_hands_off_atomically() {
        let (reader, sender) = connected_reader();
        sender.send("0.0 1\n".to_string()).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            reader.stats().records_parsed == 1
        }));

        reader.start_recording().unwrap();
        // Idempotent while active
        reader.start_recording().unwrap();

        sender.send("10.0 2\n".to_string()).unwrap();
        sender.send("20.0 3\n".to_string()).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            reader.stats().records_parsed == 3
        }));

        let session = reader.stop_recording().unwrap();
        assert_eq!(session, vec![Sample::new(10.0, 2), Sample::new(20.0, 3)]);
        // Buffer was reset by the hand-off
        assert!(reader.stop_recording().is_none());
    }

    #[test]
    fn test_cache_not_trimmed_while_recording() {
        let (reader, sender) = connected_reader();
        reader.set_cache_limit_ms(50.0);

        sender.send("0.0 1\n".to_string()).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            reader.stats().records_parsed == 1
        }));
        reader.start_recording().unwrap();

        // Far beyond the 50 ms limit, but recording suppresses eviction
        for i in 1..=10 {
            sender.send(format!("{}.0 1\n", i * 100)).unwrap();
        }
        assert!(wait_until(Duration::from_secs(2), || {
            reader.stats().records_parsed == 11
        }));
        assert_eq!(reader.cache_len(), 11);
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (mut reader, _sender) = connected_reader();
        let (other, _other_sender) = piped_source(Duration::from_millis(20));
        // Second connect while active is a no-op success
        reader.connect_source(Box::new(other)).unwrap();
        assert!(reader.is_connected());
    }

    #[test]
    fn test_source_eof_disconnects() {
        let (reader, sender) = connected_reader();
        drop(sender);
        assert!(wait_until(Duration::from_secs(2), || !reader.is_connected()));
        let disconnected = reader
            .events()
            .try_iter()
            .any(|e| matches!(e, ReaderEvent::Disconnected { .. }));
        assert!(disconnected);
    }

    #[test]
    fn test_disconnect_joins_worker() {
        let (mut reader, _sender) = connected_reader();
        reader.disconnect();
        assert!(!reader.is_connected());
        assert!(reader.worker.is_none());
    }

    #[test]
    fn test_connect_bad_port_fails_without_worker() {
        let mut reader = SerialReader::new(ReaderConfig::default());
        let result = reader.connect("/dev/definitely-not-a-port");
        assert!(matches!(result, Err(ReaderError::Port(_))));
        assert!(!reader.is_connected());
        assert!(reader.worker.is_none());
    }
}
