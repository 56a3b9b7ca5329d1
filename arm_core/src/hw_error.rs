//! Maps `Box<dyn Error>` from the bridge trait boundary to typed `ArmError`.
//!
//! `arm_traits::Bridge` reports `Box<dyn Error + Send + Sync>`; this module
//! converts those to our typed error enum, with an optional feature-gated
//! path for `arm_hardware::HwError` downcasting.

use crate::error::ArmError;

/// Map a trait-boundary error to a typed `ArmError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ArmError {
    #[cfg(feature = "hardware-errors")]
    {
        use arm_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Protocol(msg) => ArmError::Protocol(msg.clone()),
                HwError::Timeout(what) => ArmError::Timeout((*what).to_string()),
                HwError::NotReady => ArmError::Timeout("READY from controller".to_string()),
                HwError::Disconnected => ArmError::Disconnected,
                other => ArmError::Hardware(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        ArmError::Timeout(s)
    } else if lower.contains("not connected") || lower.contains("disconnected") {
        ArmError::Disconnected
    } else if lower.contains("protocol") {
        ArmError::Protocol(s)
    } else {
        ArmError::Hardware(s)
    }
}

/// Lift a bridge result into an `eyre` report carrying a typed `ArmError`.
pub(crate) fn bridge_result<T>(r: Result<T, arm_traits::BoxError>) -> crate::error::Result<T> {
    r.map_err(|e| eyre::Report::new(map_hw_error(e.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug)]
    struct Opaque(&'static str);

    impl std::fmt::Display for Opaque {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for Opaque {}

    #[rstest]
    #[case("read timeout on port", ArmError::Timeout("read timeout on port".into()))]
    #[case("device disconnected", ArmError::Disconnected)]
    #[case("protocol violation", ArmError::Protocol("protocol violation".into()))]
    #[case("brownout", ArmError::Hardware("brownout".into()))]
    fn string_fallback(#[case] msg: &'static str, #[case] want: ArmError) {
        assert_eq!(map_hw_error(&Opaque(msg)), want);
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn downcasts_hw_errors() {
        use arm_hardware::error::HwError;
        assert_eq!(
            map_hw_error(&HwError::Protocol("bad ack".into())),
            ArmError::Protocol("bad ack".into())
        );
        assert!(matches!(map_hw_error(&HwError::NotReady), ArmError::Timeout(_)));
        assert_eq!(map_hw_error(&HwError::Disconnected), ArmError::Disconnected);
        assert!(matches!(
            map_hw_error(&HwError::Open("/dev/ttyUSB9".into())),
            ArmError::Hardware(_)
        ));
    }
}
