//! Outbound messages produced while a test runs.
//!
//! Serialized as JSON objects tagged by `type`:
//!
//! ```json
//! {"type":"predicted_angles","angles":[91,89,91,89],"elapsed_ms":10,"step":0,"repeat":0}
//! ```

use arm_traits::Pose;
use serde::Serialize;

use crate::status::RunState;
use crate::types::TestResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    State {
        state: RunState,
        #[serde(skip_serializing_if = "Option::is_none")]
        test: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        repeat: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<Pose>,
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<u32>,
    },
    PredictedAngles {
        angles: Pose,
        elapsed_ms: u64,
        step: usize,
        repeat: u32,
    },
    StepComplete {
        step: usize,
        repeat: u32,
    },
    TestComplete {
        state: RunState,
        results: Vec<TestResult>,
    },
}

impl Event {
    /// Bare state change without run context.
    pub fn state(state: RunState) -> Self {
        Self::State {
            state,
            test: None,
            repeat: None,
            step: None,
            label: None,
            target: None,
            speed: None,
        }
    }

    /// Value of the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::State { .. } => "state",
            Self::PredictedAngles { .. } => "predicted_angles",
            Self::StepComplete { .. } => "step_complete",
            Self::TestComplete { .. } => "test_complete",
        }
    }
}
