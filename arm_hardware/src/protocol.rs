//! Line protocol spoken by the arm controller sketch.
//!
//! Host → device: `MOVE,a1,a2,a3,a4,speed` and `READ`.
//! Device → host: `ACK,a1,a2,a3,a4`, `DONE`, and `READY` once after reset.
//! Every line is ASCII and newline-terminated.

use arm_traits::{Pose, SERVO_COUNT};

use crate::error::{HwError, Result};

pub const READY: &str = "READY";
pub const DONE: &str = "DONE";
pub const READ: &str = "READ";
const ACK_PREFIX: &str = "ACK,";

pub fn format_move(pose: &Pose, speed_ms: u32) -> String {
    format!(
        "MOVE,{},{},{},{},{}",
        pose[0], pose[1], pose[2], pose[3], speed_ms
    )
}

/// Parse `ACK,a1,a2,a3,a4` into a pose.
pub fn parse_ack(line: &str) -> Result<Pose> {
    let Some(body) = line.strip_prefix(ACK_PREFIX) else {
        return Err(HwError::Protocol(format!(
            "expected ACK response, got {line:?}"
        )));
    };
    let parts: Vec<&str> = body.split(',').collect();
    if parts.len() != SERVO_COUNT {
        return Err(HwError::Protocol(format!(
            "ACK must carry {SERVO_COUNT} angles, got {line:?}"
        )));
    }
    let mut pose = [0i32; SERVO_COUNT];
    for (slot, part) in pose.iter_mut().zip(parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|_| HwError::Protocol(format!("non-integer angle in {line:?}")))?;
    }
    Ok(pose)
}
