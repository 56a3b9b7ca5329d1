use std::time::{Duration, Instant};

use crate::error::Result;

/// Pull lines from `next_line` until a non-empty one arrives or `timeout`
/// expires.
///
/// `next_line` returns `Ok(None)` when the underlying read timed out without
/// data; that case is retried after `poll_interval`. Returns `Ok(None)` once
/// the deadline has passed.
pub fn wait_for_line(
    mut next_line: impl FnMut() -> Result<Option<String>>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Option<String>> {
    let deadline = Instant::now() + timeout;
    loop {
        match next_line()? {
            Some(line) if !line.is_empty() => return Ok(Some(line)),
            Some(_) => {}
            None => std::thread::sleep(poll_interval),
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
    }
}
