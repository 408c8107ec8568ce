//! Line-oriented transport over the serial device.
//!
//! The acquisition worker reads through the [`LineSource`] trait so the
//! same loop runs against real hardware and against in-memory sources in
//! tests. The serial implementation applies a bounded read timeout; a
//! timeout is an idle cycle, not an error, which keeps cooperative
//! shutdown responsive.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::io::{self, BufRead, BufReader};
use std::time::Duration;

/// One newline-terminated record at a time from the device.
pub trait LineSource: Send {
    /// Read the next record. `Ok(None)` means the bounded read timeout
    /// elapsed without a complete record; the caller should check its stop
    /// flag and retry. An error ends the connection.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Serial-port-backed line source.
pub struct SerialLineSource {
    reader: BufReader<Box<dyn serialport::SerialPort>>,
    partial: String,
}

impl SerialLineSource {
    /// Open the named port at the given baud rate with a bounded read
    /// timeout.
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(read_timeout)
            .open()?;
        Ok(Self {
            reader: BufReader::new(port),
            partial: String::new(),
        })
    }
}

impl LineSource for SerialLineSource {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        // A timeout mid-record leaves the partial line accumulated for the
        // next call.
        match self.reader.read_line(&mut self.partial) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial port closed",
            )),
            Ok(_) => Ok(Some(std::mem::take(&mut self.partial))),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// In-memory line source fed through a channel.
///
/// Used by tests and replay tooling: the returned sender pushes records,
/// and dropping it ends the connection the same way a closed port does.
pub struct PipedLineSource {
    receiver: Receiver<String>,
    poll_interval: Duration,
}

/// Create a connected pair of line source and record sender.
pub fn piped_source(poll_interval: Duration) -> (PipedLineSource, Sender<String>) {
    let (sender, receiver) = bounded(1024);
    (
        PipedLineSource {
            receiver,
            poll_interval,
        },
        sender,
    )
}

impl LineSource for PipedLineSource {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        match self.receiver.recv_timeout(self.poll_interval) {
            Ok(line) => Ok(Some(line)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "record sender dropped",
            )),
        }
    }
}
