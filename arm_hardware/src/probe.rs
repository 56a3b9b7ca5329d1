//! Standalone link check: watch boot chatter, send `READ`, report the reply.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use arm_traits::Pose;
use tracing::debug;

use crate::error::{HwError, Result};
use crate::protocol::{self, READ};

#[derive(Debug, Default, Clone)]
pub struct ProbeReport {
    /// Lines printed by the controller during the boot window.
    pub boot_lines: Vec<String>,
    /// Raw reply to `READ`, if any arrived.
    pub read_reply: Option<String>,
    /// Angles parsed from the reply when it was a valid ACK.
    pub angles: Option<Pose>,
}

impl ProbeReport {
    pub fn link_ok(&self) -> bool {
        self.angles.is_some()
    }
}

/// Probe an open stream. Reads boot lines for `boot_window`, then sends
/// `READ` and waits up to `reply_timeout` for one line.
pub fn probe_stream<T: Read + Write>(
    stream: T,
    boot_window: Duration,
    reply_timeout: Duration,
) -> Result<ProbeReport> {
    let mut port = BufReader::new(stream);
    let mut buf = Vec::with_capacity(64);
    let mut report = ProbeReport::default();

    let deadline = Instant::now() + boot_window;
    while Instant::now() < deadline {
        match read_one(&mut port, &mut buf)? {
            Some(line) if !line.is_empty() => {
                debug!(line = %line, "boot line");
                report.boot_lines.push(line);
            }
            Some(_) => {}
            None => break,
        }
    }

    let stream = port.get_mut();
    stream.write_all(READ.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;

    let deadline = Instant::now() + reply_timeout;
    while Instant::now() < deadline {
        match read_one(&mut port, &mut buf)? {
            Some(line) if !line.is_empty() => {
                report.angles = protocol::parse_ack(&line).ok();
                report.read_reply = Some(line);
                break;
            }
            Some(_) => {}
            None => break,
        }
    }
    Ok(report)
}

/// One line, `Some("")` on a read timeout, `None` at end of stream.
///
/// Bytes of a line cut by a read timeout stay in `buf` for the next call.
/// Invalid UTF-8 is replaced, not rejected.
fn read_one<R: BufRead>(port: &mut R, buf: &mut Vec<u8>) -> Result<Option<String>> {
    match port.read_until(b'\n', buf) {
        Ok(0) if buf.is_empty() => Ok(None),
        Ok(_) => {
            let line = String::from_utf8_lossy(buf).trim().to_string();
            buf.clear();
            Ok(Some(line))
        }
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ) =>
        {
            Ok(Some(String::new()))
        }
        Err(e) => Err(HwError::Io(e)),
    }
}

/// Open `path` and probe it.
#[cfg(feature = "hardware")]
pub fn probe_port(path: &str, baud: u32, boot_window: Duration) -> Result<ProbeReport> {
    let port = serialport::new(path, baud)
        .timeout(Duration::from_millis(200))
        .open()
        .map_err(|e| HwError::Open(format!("{path}: {e}")))?;
    probe_stream(port, boot_window, Duration::from_millis(1500))
}
