//! Bridge selection: serial, simulated, or serial with simulated fallback.

use arm_config::{BridgeMode, Config};
use arm_core::hw_error::map_hw_error;
use arm_hardware::SimulatedBridge;
use arm_traits::Bridge;

pub type DynBridge = Box<dyn Bridge + Send>;

/// Where the bridge came from, for health output.
#[derive(Debug, Clone)]
pub struct BridgeInfo {
    pub kind: &'static str,
    pub port: Option<String>,
}

fn connect(mut bridge: DynBridge) -> eyre::Result<DynBridge> {
    bridge
        .connect()
        .map_err(|e| eyre::Report::new(map_hw_error(e.as_ref())))?;
    Ok(bridge)
}

fn simulated() -> eyre::Result<DynBridge> {
    connect(Box::new(SimulatedBridge::new()))
}

#[cfg(feature = "hardware")]
fn serial(cfg: &Config, port: &str) -> eyre::Result<DynBridge> {
    use arm_hardware::SerialBridge;
    use eyre::WrapErr;
    use std::time::Duration;

    let s = &cfg.serial;
    let bridge = SerialBridge::open(port, s.baud, Duration::from_millis(50))
        .map_err(|e| eyre::Report::new(map_hw_error(&e)))
        .wrap_err_with(|| format!("open serial port {port}"))?
        .with_timeouts(
            Duration::from_millis(s.read_timeout_ms),
            Duration::from_millis(s.ready_timeout_ms),
            Duration::from_millis(s.move_timeout_ms),
        );
    connect(Box::new(bridge)).wrap_err_with(|| format!("connect to controller on {port}"))
}

#[cfg(not(feature = "hardware"))]
fn serial(_cfg: &Config, port: &str) -> eyre::Result<DynBridge> {
    eyre::bail!("serial support not compiled in (port {port}); rebuild with --features hardware")
}

/// Open and connect the bridge chosen by config and flags.
pub fn open_bridge(cfg: &Config, port: Option<&str>, force_simulated: bool) -> eyre::Result<(DynBridge, BridgeInfo)> {
    let port = port.unwrap_or(&cfg.serial.port).to_string();
    let mode = if force_simulated {
        BridgeMode::Simulated
    } else {
        cfg.bridge.mode
    };

    let sim_info = BridgeInfo {
        kind: "simulated",
        port: None,
    };
    let serial_info = BridgeInfo {
        kind: "serial",
        port: Some(port.clone()),
    };

    match mode {
        BridgeMode::Simulated => Ok((simulated()?, sim_info)),
        BridgeMode::Serial => Ok((serial(cfg, &port)?, serial_info)),
        BridgeMode::Auto => match serial(cfg, &port) {
            Ok(b) => Ok((b, serial_info)),
            Err(e) => {
                tracing::warn!(port = %port, error = %format!("{e:#}"), "serial bridge unavailable; falling back to simulated arm");
                Ok((simulated()?, sim_info))
            }
        },
    }
}

/// Best-effort disconnect on the way out.
pub fn shutdown(bridge: &mut dyn Bridge) {
    if let Err(e) = bridge.disconnect() {
        tracing::warn!(error = %e, "disconnect failed");
    }
}
