//! Bridge implementations: the serial line bridge and a simulated arm.
pub mod error;
pub mod probe;
pub mod protocol;
pub mod serial;
pub mod util;

use std::time::{Duration, Instant};

use arm_traits::{BoxError, Bridge, Clock, MonotonicClock, Pose};

pub use error::HwError;
pub use serial::SerialBridge;

/// Firmware safe range and timing constants, as compiled into the sketch.
const ANGLE_MIN: i32 = 10;
const ANGLE_MAX: i32 = 170;
const TICK_MAX: u64 = 180;
const HOLD_MULTIPLIER: u64 = 20;

/// Angles every servo holds after power-on.
pub const HOME_POSE: Pose = [90, 90, 90, 90];

/// Wall time the firmware spends on one move: one tick per degree of the
/// longest travel (capped at 180) plus the trailing settle delay.
fn firmware_move_ms(speed_ms: u32, from: &Pose, to: &Pose) -> u64 {
    let ticks = from
        .iter()
        .zip(to)
        .map(|(a, b)| u64::from(a.abs_diff(*b)))
        .max()
        .unwrap_or(0)
        .min(TICK_MAX);
    u64::from(speed_ms) * (ticks + HOLD_MULTIPLIER)
}

struct PendingMove {
    target: Pose,
    started: Instant,
    duration: Duration,
}

/// Simulated arm: moves take the same wall time the firmware would take and
/// land exactly on the clamped target.
pub struct SimulatedBridge<C: Clock = MonotonicClock> {
    clock: C,
    angles: Pose,
    connected: bool,
    pending: Option<PendingMove>,
}

impl SimulatedBridge<MonotonicClock> {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::new())
    }
}

impl Default for SimulatedBridge<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SimulatedBridge<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            angles: HOME_POSE,
            connected: false,
            pending: None,
        }
    }

    /// Start from `angles` instead of the home pose.
    pub fn with_angles(mut self, angles: Pose) -> Self {
        self.angles = angles;
        self
    }

    fn ensure_connected(&self) -> Result<(), HwError> {
        if self.connected {
            Ok(())
        } else {
            Err(HwError::Disconnected)
        }
    }
}

impl<C: Clock> Bridge for SimulatedBridge<C> {
    fn connect(&mut self) -> Result<(), BoxError> {
        self.connected = true;
        tracing::info!("simulated bridge connected (no hardware)");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BoxError> {
        self.connected = false;
        self.pending = None;
        Ok(())
    }

    fn send_move(&mut self, pose: Pose, speed_ms: u32) -> Result<Pose, BoxError> {
        self.ensure_connected()?;
        if let Some(prev) = self.pending.take() {
            self.angles = prev.target;
        }
        let before = self.angles;
        let target = pose.map(|a| a.clamp(ANGLE_MIN, ANGLE_MAX));
        let duration = Duration::from_millis(firmware_move_ms(speed_ms, &before, &target));
        self.pending = Some(PendingMove {
            target,
            started: self.clock.now(),
            duration,
        });
        tracing::trace!(?before, ?target, ?duration, "simulated move issued");
        Ok(before)
    }

    fn wait_move_done(&mut self) -> Result<(), BoxError> {
        self.ensure_connected()?;
        let Some(mv) = self.pending.take() else {
            return Ok(());
        };
        let spent = self.clock.now().saturating_duration_since(mv.started);
        if let Some(remaining) = mv.duration.checked_sub(spent) {
            self.clock.sleep(remaining);
        }
        self.angles = mv.target;
        Ok(())
    }

    fn read_angles(&mut self) -> Result<Pose, BoxError> {
        self.ensure_connected()?;
        Ok(self.angles)
    }

    fn ping(&mut self) -> bool {
        self.connected
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn kind(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arm_traits::clock::test_clock::TestClock;

    #[test]
    fn move_duration_matches_firmware_formula() {
        assert_eq!(firmware_move_ms(10, &HOME_POSE, &[120, 60, 90, 90]), 500);
        assert_eq!(firmware_move_ms(10, &HOME_POSE, &HOME_POSE), 200);
        assert_eq!(firmware_move_ms(1, &[-100, 0, 0, 0], &[170, 0, 0, 0]), 200);
    }

    #[test]
    fn send_move_returns_immediately_with_pre_move_pose() {
        let clock = TestClock::new();
        let mut bridge = SimulatedBridge::with_clock(clock.clone());
        bridge.connect().unwrap();
        let before = bridge.send_move([120, 60, 90, 45], 15).unwrap();
        assert_eq!(before, HOME_POSE);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn wait_move_done_sleeps_for_remaining_duration() {
        let clock = TestClock::new();
        let mut bridge = SimulatedBridge::with_clock(clock.clone());
        bridge.connect().unwrap();
        bridge.send_move([120, 60, 90, 45], 15).unwrap();
        clock.advance(Duration::from_millis(100));
        bridge.wait_move_done().unwrap();
        // 45 degrees of travel + 20 hold ticks at 15 ms
        assert_eq!(clock.elapsed(), Duration::from_millis(975));
        assert_eq!(bridge.read_angles().unwrap(), [120, 60, 90, 45]);
    }

    #[test]
    fn targets_outside_safe_range_are_clamped() {
        let mut bridge = SimulatedBridge::with_clock(TestClock::new());
        bridge.connect().unwrap();
        bridge.move_to([0, 180, 5, 175], 1).unwrap();
        assert_eq!(bridge.read_angles().unwrap(), [10, 170, 10, 170]);
    }

    #[test]
    fn requires_connection() {
        let mut bridge = SimulatedBridge::with_clock(TestClock::new());
        assert!(!bridge.ping());
        let err = bridge.read_angles().unwrap_err();
        assert!(err.to_string().contains("not connected"));
    }
}
