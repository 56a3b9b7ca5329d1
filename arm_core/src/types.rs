//! Test definitions and the results a run produces.

use std::collections::BTreeMap;

use arm_traits::{Pose, SERVO_COUNT};
use serde::{Serialize, Serializer};

use crate::error::ArmError;

/// One scripted move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Unclamped target; the engine clamps it.
    pub target: Pose,
    pub hold_ms: u64,
    pub label: String,
}

/// A validated, runnable test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDefinition {
    pub name: String,
    /// Milliseconds per firmware tick.
    pub speed_ms: u32,
    pub repeat_count: u32,
    pub steps: Vec<Step>,
    /// Reference path, only used for divergence scoring.
    pub designed_path: Option<Vec<Pose>>,
}

impl TestDefinition {
    pub fn validate(&self) -> Result<(), ArmError> {
        if self.speed_ms == 0 {
            return Err(ArmError::InvalidDefinition("speed must be > 0".into()));
        }
        if self.repeat_count == 0 {
            return Err(ArmError::InvalidDefinition("repeat_count must be >= 1".into()));
        }
        Ok(())
    }
}

/// Turn a JSON angle list into a pose, rejecting any other arity.
pub fn pose_from_slice(angles: &[i32]) -> Result<Pose, ArmError> {
    Pose::try_from(angles).map_err(|_| {
        ArmError::InvalidPose(format!(
            "expected {SERVO_COUNT} angles, got {}",
            angles.len()
        ))
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[default]
    Pass,
    Warning,
    Fail,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pass => "pass",
            Self::Warning => "warning",
            Self::Fail => "fail",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub label: String,
    pub target_angles: Pose,
    pub actual_start_angles: Pose,
    pub actual_end_angles: Pose,
    /// Move duration plus hold.
    pub planned_duration_ms: u64,
    /// Measured wall time of the whole step.
    #[serde(serialize_with = "round1")]
    pub actual_duration_ms: f64,
    pub hold_ms: u64,
}

/// Outcome of one repeat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub test_name: String,
    pub repeat_index: u32,
    pub steps: Vec<StepResult>,
    /// "servo1".."servo4" to percent of the 0..180 range used.
    pub range_coverage: BTreeMap<String, f64>,
    /// Same value on every result of a run; only set once all repeats are done.
    pub repeatability: f64,
    #[serde(serialize_with = "round1")]
    pub total_time_ms: f64,
    #[serde(serialize_with = "round2")]
    pub path_divergence: f64,
    pub ergonomic_flags: Vec<String>,
    pub verdict: Verdict,
}

impl TestResult {
    pub fn new(test_name: impl Into<String>, repeat_index: u32) -> Self {
        Self {
            test_name: test_name.into(),
            repeat_index,
            steps: Vec::new(),
            range_coverage: BTreeMap::new(),
            repeatability: 0.0,
            total_time_ms: 0.0,
            path_divergence: 0.0,
            ergonomic_flags: Vec::new(),
            verdict: Verdict::Pass,
        }
    }
}

/// Round half away from zero to `decimals` places.
pub(crate) fn round_to(x: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (x * f).round() / f
}

fn round1<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_to(*v, 1))
}

fn round2<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round_to(*v, 2))
}
