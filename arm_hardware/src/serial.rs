//! Bridge over a duplex byte stream speaking the controller line protocol.
//!
//! Any `Read + Write` stream works; with the `hardware` feature,
//! [`SerialBridge::open`] wraps a `serialport` handle.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::time::Duration;

use arm_traits::{BoxError, Bridge, Pose};
use tracing::{debug, info, trace, warn};

use crate::error::{HwError, Result};
use crate::protocol::{self, DONE, READ, READY};
use crate::util::wait_for_line;
use crate::{ANGLE_MAX, ANGLE_MIN, firmware_move_ms};

pub const DEFAULT_BAUD: u32 = 9600;
/// Per-reply budget for ACK lines.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Boot budget; the CH340 resets the board when the port opens.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);
/// Slack on top of a move's expected duration while waiting for DONE.
pub const DEFAULT_MOVE_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct SerialBridge<T: Read + Write> {
    port: Option<BufReader<T>>,
    name: String,
    line_buf: Vec<u8>,
    connected: bool,
    awaiting_done: bool,
    /// Expected duration of the unconfirmed move.
    pending_move: Duration,
    read_timeout: Duration,
    ready_timeout: Duration,
    move_timeout: Duration,
}

impl<T: Read + Write> SerialBridge<T> {
    /// Wrap an already-open stream. `name` is only used for logs and health.
    pub fn new(stream: T, name: impl Into<String>) -> Self {
        Self {
            port: Some(BufReader::new(stream)),
            name: name.into(),
            line_buf: Vec::with_capacity(64),
            connected: false,
            awaiting_done: false,
            pending_move: Duration::ZERO,
            read_timeout: DEFAULT_READ_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            move_timeout: DEFAULT_MOVE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, read: Duration, ready: Duration, moving: Duration) -> Self {
        self.read_timeout = read;
        self.ready_timeout = ready;
        self.move_timeout = moving;
        self
    }

    pub fn port_name(&self) -> &str {
        &self.name
    }

    /// Release the underlying stream, if the bridge still holds it.
    pub fn into_inner(self) -> Option<T> {
        self.port.map(BufReader::into_inner)
    }

    fn send(&mut self, cmd: &str) -> Result<()> {
        let port = self.port.as_mut().ok_or(HwError::Disconnected)?;
        trace!(port = %self.name, tx = cmd, "serial write");
        let stream = port.get_mut();
        stream.write_all(cmd.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()?;
        Ok(())
    }

    /// Wait up to `timeout` for the next non-empty line.
    fn recv(&mut self, timeout: Duration) -> Result<Option<String>> {
        let port = self.port.as_mut().ok_or(HwError::Disconnected)?;
        let buf = &mut self.line_buf;
        let line = wait_for_line(|| next_line(port, buf), timeout, POLL_INTERVAL)?;
        if let Some(l) = &line {
            trace!(port = %self.name, rx = %l, "serial read");
        }
        Ok(line)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(HwError::Disconnected)
        }
    }

    fn expect_ack(&mut self, what: &'static str) -> Result<Pose> {
        match self.recv(self.read_timeout)? {
            Some(line) => protocol::parse_ack(&line),
            None => Err(HwError::Timeout(what)),
        }
    }

    fn do_connect(&mut self) -> Result<()> {
        let deadline = std::time::Instant::now() + self.ready_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.recv(remaining)? {
                Some(line) if line == READY => break,
                Some(line) => debug!(port = %self.name, line = %line, "skipping boot line"),
                None => return Err(HwError::NotReady),
            }
        }
        self.connected = true;
        self.awaiting_done = false;
        info!(port = %self.name, "connected");
        Ok(())
    }

    fn do_send_move(&mut self, pose: Pose, speed_ms: u32) -> Result<Pose> {
        self.ensure_connected()?;
        if self.awaiting_done {
            // The previous move was never confirmed; its DONE precedes our ACK.
            self.do_wait_done()?;
        }
        self.send(&protocol::format_move(&pose, speed_ms))?;
        let before = self.expect_ack("MOVE acknowledgement")?;
        let target = pose.map(|a| a.clamp(ANGLE_MIN, ANGLE_MAX));
        self.pending_move = Duration::from_millis(firmware_move_ms(speed_ms, &before, &target));
        self.awaiting_done = true;
        Ok(before)
    }

    fn do_wait_done(&mut self) -> Result<()> {
        self.ensure_connected()?;
        if !self.awaiting_done {
            return Ok(());
        }
        let budget = self.pending_move.saturating_add(self.move_timeout);
        let line = self.recv(budget)?;
        self.awaiting_done = false;
        match line {
            Some(l) if l == DONE => Ok(()),
            Some(l) => Err(HwError::Protocol(format!("expected DONE, got {l:?}"))),
            None => Err(HwError::Timeout("move completion")),
        }
    }

    fn do_read(&mut self) -> Result<Pose> {
        self.ensure_connected()?;
        self.send(READ)?;
        self.expect_ack("READ reply")
    }
}

/// Read one newline-terminated line, keeping partial data across read timeouts.
fn next_line<R: BufRead>(port: &mut R, buf: &mut Vec<u8>) -> Result<Option<String>> {
    match port.read_until(b'\n', buf) {
        // read_until only stops short of the delimiter at end of stream
        Ok(_) if buf.is_empty() => Err(HwError::Disconnected),
        Ok(_) => {
            let line = String::from_utf8_lossy(buf).trim().to_string();
            buf.clear();
            Ok(Some(line))
        }
        Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(None),
        Err(e) if e.kind() == ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(HwError::Io(e)),
    }
}

impl<T: Read + Write> Bridge for SerialBridge<T> {
    fn connect(&mut self) -> std::result::Result<(), BoxError> {
        Ok(self.do_connect()?)
    }

    fn disconnect(&mut self) -> std::result::Result<(), BoxError> {
        if let Some(mut port) = self.port.take()
            && let Err(e) = port.get_mut().flush()
        {
            warn!(port = %self.name, error = %e, "flush on disconnect failed");
        }
        self.connected = false;
        self.awaiting_done = false;
        info!(port = %self.name, "disconnected");
        Ok(())
    }

    fn send_move(&mut self, pose: Pose, speed_ms: u32) -> std::result::Result<Pose, BoxError> {
        Ok(self.do_send_move(pose, speed_ms)?)
    }

    fn wait_move_done(&mut self) -> std::result::Result<(), BoxError> {
        Ok(self.do_wait_done()?)
    }

    fn read_angles(&mut self) -> std::result::Result<Pose, BoxError> {
        Ok(self.do_read()?)
    }

    fn ping(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        if self.awaiting_done {
            // A READ now would interleave with the pending DONE.
            return true;
        }
        match self.do_read() {
            Ok(_) => true,
            Err(e) => {
                debug!(port = %self.name, error = %e, "ping failed");
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn kind(&self) -> &'static str {
        "serial"
    }
}

#[cfg(feature = "hardware")]
impl SerialBridge<Box<dyn serialport::SerialPort>> {
    /// Open a physical serial port. Call `connect()` afterwards to wait for READY.
    ///
    /// `poll` bounds a single blocking read; reply budgets come from
    /// [`SerialBridge::with_timeouts`].
    pub fn open(path: &str, baud: u32, poll: Duration) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(poll)
            .open()
            .map_err(|e| HwError::Open(format!("{path}: {e}")))?;
        Ok(Self::new(port, path))
    }
}

/// Names of the serial ports visible to the OS.
#[cfg(feature = "hardware")]
pub fn list_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports()
        .map_err(|e| HwError::Open(format!("enumerate ports: {e}")))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
