//! Human-readable error descriptions and structured JSON error formatting.

use arm_core::ArmError;

fn find_arm_error(err: &eyre::Report) -> Option<&ArmError> {
    err.chain().find_map(|e| e.downcast_ref::<ArmError>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(ae) = find_arm_error(err) {
        return match ae {
            ArmError::InvalidPose(msg) => format!(
                "What happened: Invalid pose ({msg}).\nLikely causes: A step or command did not give exactly four angles.\nHow to fix: Pass four comma-separated angles, e.g. 90,120,60,45."
            ),
            ArmError::InvalidDefinition(msg) => format!(
                "What happened: The test definition is invalid ({msg}).\nLikely causes: speed or repeat_count set to 0, or a malformed steps list.\nHow to fix: Edit the test JSON, then rerun `armctl show <name>` to check it."
            ),
            ArmError::Protocol(msg) => format!(
                "What happened: The controller sent an unexpected reply ({msg}).\nLikely causes: Wrong baud rate, different firmware, or line noise.\nHow to fix: Check [serial] baud, then run `armctl probe` to see what the controller prints."
            ),
            ArmError::Timeout(what) => format!(
                "What happened: Timed out waiting for {what}.\nLikely causes: Controller not powered, still booting, or the move is slower than the budget.\nHow to fix: Check power and cabling; raise [serial] read_timeout_ms or move_timeout_ms if moves are long."
            ),
            ArmError::Disconnected => "What happened: The arm controller is not connected.\nLikely causes: USB cable unplugged or the port was closed.\nHow to fix: Reconnect the controller and check --port / [serial] port.".to_string(),
            ArmError::Hardware(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Port missing, busy, or insufficient permissions.\nHow to fix: Check the device path and that your user can open it (e.g. dialout group)."
            ),
            ArmError::State(msg) => format!(
                "What happened: {msg}.\nLikely causes: The command does not apply to the run's current state.\nHow to fix: Check the run state and try again."
            ),
        };
    }

    if err.chain().any(|e| e.downcast_ref::<toml::de::Error>().is_some()) {
        return format!(
            "What happened: The config file could not be parsed.\nLikely causes: TOML syntax error or a value of the wrong type.\nHow to fix: Fix the file and try again. Details: {err:#}"
        );
    }

    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("test not found") {
        return format!(
            "What happened: {msg}.\nLikely causes: Typo in the test name, or the test lives in a directory not listed in [store].\nHow to fix: Run `armctl list` to see available tests."
        );
    }

    if lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Empty port, zero baud, or a zero timeout.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("serial support not compiled in") {
        return format!(
            "What happened: {msg}.\nLikely causes: armctl was built without the `hardware` feature.\nHow to fix: Use --simulated, or rebuild with `cargo build --features hardware`."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 protocol, 3 timeout, 4 disconnected, 5 invalid input, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match find_arm_error(err) {
        Some(ArmError::Protocol(_)) => 2,
        Some(ArmError::Timeout(_)) => 3,
        Some(ArmError::Disconnected) => 4,
        Some(ArmError::InvalidPose(_) | ArmError::InvalidDefinition(_)) => 5,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match find_arm_error(err) {
        Some(ArmError::InvalidPose(_)) => "InvalidPose",
        Some(ArmError::InvalidDefinition(_)) => "InvalidDefinition",
        Some(ArmError::Protocol(_)) => "Protocol",
        Some(ArmError::Timeout(_)) => "Timeout",
        Some(ArmError::Hardware(_)) => "Hardware",
        Some(ArmError::Disconnected) => "Disconnected",
        Some(ArmError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "type": "error",
        "reason": reason_name(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    fn wrapped(e: ArmError) -> eyre::Report {
        Err::<(), _>(eyre::Report::new(e))
            .wrap_err("repeat 0, step 1 (reach)")
            .unwrap_err()
    }

    #[test]
    fn exit_codes_follow_category_through_context() {
        assert_eq!(exit_code_for_error(&wrapped(ArmError::Protocol("x".into()))), 2);
        assert_eq!(exit_code_for_error(&wrapped(ArmError::Timeout("DONE".into()))), 3);
        assert_eq!(exit_code_for_error(&wrapped(ArmError::Disconnected)), 4);
        assert_eq!(exit_code_for_error(&wrapped(ArmError::InvalidPose("x".into()))), 5);
        assert_eq!(exit_code_for_error(&eyre::eyre!("boom")), 1);
    }

    #[test]
    fn json_error_carries_reason() {
        let v: serde_json::Value =
            serde_json::from_str(&format_error_json(&wrapped(ArmError::Disconnected))).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["reason"], "Disconnected");
        assert!(v["message"].as_str().unwrap().starts_with("What happened"));
    }

    #[test]
    fn unknown_test_gets_a_hint() {
        let msg = humanize(&eyre::eyre!("test not found: nope"));
        assert!(msg.contains("armctl list"));
    }
}
