#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core arm test logic (hardware-agnostic).
//!
//! All device interaction goes through `arm_traits::Bridge`; all waiting goes
//! through `arm_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Interpolation**: per-tick mirror of the firmware stepping (`interpolation`)
//! - **Orchestration**: pausable, cancellable step sequencer (`runner`)
//! - **Metrics**: coverage, ergonomics, divergence, verdict, repeatability (`metrics`)
//! - **Events**: tagged messages streamed while a run progresses (`event`)

pub mod conversions;
pub mod error;
pub mod event;
pub mod hw_error;
pub mod interpolation;
pub mod metrics;
pub mod runner;
pub mod status;
pub mod types;

pub use error::{ArmError, Report, Result};
pub use event::Event;
pub use interpolation::{
    PoseSequence, clamp_angle, interpolate_poses, predict_angle_at_time, step_angle,
    total_duration_ms,
};
pub use runner::{Orchestrator, RunControl};
pub use status::RunState;
pub use types::{Step, StepResult, TestDefinition, TestResult, Verdict, pose_from_slice};
