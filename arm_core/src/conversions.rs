//! Conversions from `arm_config` file schemas to runnable `arm_core` types.
//!
//! All arity checks happen here, before any device I/O.

use arm_config::TestFile;

use crate::error::ArmError;
use crate::types::{Step, TestDefinition, pose_from_slice};

impl TryFrom<&TestFile> for TestDefinition {
    type Error = ArmError;

    fn try_from(file: &TestFile) -> Result<Self, Self::Error> {
        let steps = file
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let target = pose_from_slice(&s.angles).map_err(|e| prefixed(&format!("step {i}"), e))?;
                Ok(Step {
                    target,
                    hold_ms: s.hold_ms,
                    label: s.label.clone().unwrap_or_else(|| format!("step {i}")),
                })
            })
            .collect::<Result<Vec<_>, ArmError>>()?;

        let designed_path = file
            .designed_path
            .as_ref()
            .map(|path| {
                path.iter()
                    .enumerate()
                    .map(|(i, p)| {
                        pose_from_slice(p).map_err(|e| prefixed(&format!("designed_path[{i}]"), e))
                    })
                    .collect::<Result<Vec<_>, ArmError>>()
            })
            .transpose()?;

        let def = Self {
            name: file.name.clone(),
            speed_ms: file.speed,
            repeat_count: file.repeat_count,
            steps,
            designed_path,
        };
        def.validate()?;
        Ok(def)
    }
}

fn prefixed(at: &str, e: ArmError) -> ArmError {
    match e {
        ArmError::InvalidPose(msg) => ArmError::InvalidPose(format!("{at}: {msg}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arm_config::StepSpec;

    fn file(steps: Vec<StepSpec>) -> TestFile {
        TestFile {
            name: "t".into(),
            description: String::new(),
            speed: 15,
            repeat_count: 1,
            steps,
            designed_path: None,
        }
    }

    fn step(angles: Vec<i32>, label: Option<&str>) -> StepSpec {
        StepSpec {
            angles,
            hold_ms: 0,
            label: label.map(str::to_string),
        }
    }

    #[test]
    fn labels_default_to_step_index() {
        let f = file(vec![step(vec![1, 2, 3, 4], Some("reach")), step(vec![5, 6, 7, 8], None)]);
        let def = TestDefinition::try_from(&f).unwrap();
        assert_eq!(def.steps[0].label, "reach");
        assert_eq!(def.steps[1].label, "step 1");
        assert_eq!(def.steps[1].target, [5, 6, 7, 8]);
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let f = file(vec![step(vec![1, 2, 3, 4], None), step(vec![1, 2, 3], None)]);
        let err = TestDefinition::try_from(&f).unwrap_err();
        assert!(matches!(err, ArmError::InvalidPose(ref m) if m.starts_with("step 1")));
    }

    #[test]
    fn designed_path_arity_is_rejected() {
        let mut f = file(vec![step(vec![1, 2, 3, 4], None)]);
        f.designed_path = Some(vec![vec![1, 2, 3, 4], vec![1, 2, 3, 4, 5]]);
        let err = TestDefinition::try_from(&f).unwrap_err();
        assert!(matches!(err, ArmError::InvalidPose(ref m) if m.starts_with("designed_path[1]")));
    }

    #[test]
    fn zero_speed_is_rejected() {
        let mut f = file(vec![step(vec![1, 2, 3, 4], None)]);
        f.speed = 0;
        assert!(matches!(TestDefinition::try_from(&f), Err(ArmError::InvalidDefinition(_))));
    }
}
