//! Hardware-facing abstractions for the arm test runner.
//!
//! Everything that talks to a device goes through [`Bridge`]; everything that
//! waits goes through [`Clock`].

pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Error type used at the trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Number of servos on the arm.
pub const SERVO_COUNT: usize = 4;

/// Servo angles in degrees, indexed servo1..servo4.
pub type Pose = [i32; SERVO_COUNT];

/// Capability set of an arm controller, real or simulated.
pub trait Bridge {
    /// Open the link and wait until the device reports it is usable.
    fn connect(&mut self) -> Result<(), BoxError>;

    fn disconnect(&mut self) -> Result<(), BoxError>;

    /// Issue a move and return the pose the device reported *before* moving.
    ///
    /// Must return as soon as the device acknowledges; it does not wait for
    /// the move to finish.
    fn send_move(&mut self, pose: Pose, speed_ms: u32) -> Result<Pose, BoxError>;

    /// Block until the device confirms the most recent move has completed.
    fn wait_move_done(&mut self) -> Result<(), BoxError>;

    /// `send_move` followed by `wait_move_done`.
    fn move_to(&mut self, pose: Pose, speed_ms: u32) -> Result<Pose, BoxError> {
        let before = self.send_move(pose, speed_ms)?;
        self.wait_move_done()?;
        Ok(before)
    }

    fn read_angles(&mut self) -> Result<Pose, BoxError>;

    /// Cheap liveness probe; never errors.
    fn ping(&mut self) -> bool;

    fn is_connected(&self) -> bool;

    /// Short name of the implementation, e.g. "serial" or "simulated".
    fn kind(&self) -> &'static str;
}

impl<B: Bridge + ?Sized> Bridge for Box<B> {
    fn connect(&mut self) -> Result<(), BoxError> {
        (**self).connect()
    }
    fn disconnect(&mut self) -> Result<(), BoxError> {
        (**self).disconnect()
    }
    fn send_move(&mut self, pose: Pose, speed_ms: u32) -> Result<Pose, BoxError> {
        (**self).send_move(pose, speed_ms)
    }
    fn wait_move_done(&mut self) -> Result<(), BoxError> {
        (**self).wait_move_done()
    }
    fn move_to(&mut self, pose: Pose, speed_ms: u32) -> Result<Pose, BoxError> {
        (**self).move_to(pose, speed_ms)
    }
    fn read_angles(&mut self) -> Result<Pose, BoxError> {
        (**self).read_angles()
    }
    fn ping(&mut self) -> bool {
        (**self).ping()
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}
