#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and test-definition files for the arm test runner.
//!
//! - `Config` is deserialized from TOML and validated.
//! - `TestFile` is the JSON schema of a scripted test; `TestStore` lists,
//!   loads and saves them from a bundled and a custom directory.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod store;

pub use store::{TestMeta, TestSource, TestStore};

/// Speed applied when a test file omits `speed` (ms per firmware tick).
pub const DEFAULT_SPEED_MS: u32 = 15;

/// One step of a test file.
///
/// ```json
/// { "angles": [120, 60, 90, 45], "hold_ms": 500, "label": "reach" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Target angles for servo1..servo4. Arity is checked when the file is
    /// turned into a runnable definition.
    pub angles: Vec<i32>,
    #[serde(default)]
    pub hold_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A scripted arm test as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFile {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default = "default_speed")]
    pub speed: u32,
    #[serde(default = "default_repeat_count")]
    pub repeat_count: u32,
    pub steps: Vec<StepSpec>,
    /// Reference path used only for divergence scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designed_path: Option<Vec<Vec<i32>>>,
}

fn default_speed() -> u32 {
    DEFAULT_SPEED_MS
}

fn default_repeat_count() -> u32 {
    1
}

impl TestFile {
    pub fn from_json(s: &str) -> eyre::Result<Self> {
        let file: Self = serde_json::from_str(s)?;
        Ok(file)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.name.trim().is_empty() {
            eyre::bail!("test name must not be empty");
        }
        if self.speed == 0 {
            eyre::bail!("speed must be > 0");
        }
        if self.repeat_count == 0 {
            eyre::bail!("repeat_count must be >= 1");
        }
        if self.steps.is_empty() {
            eyre::bail!("test must contain at least one step");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SerialCfg {
    /// Device path, e.g. /dev/ttyUSB0 or /dev/cu.usbserial-2110.
    pub port: String,
    pub baud: u32,
    /// Budget for a single ACK reply (ms).
    pub read_timeout_ms: u64,
    /// Budget for the READY line after opening the port (ms).
    pub ready_timeout_ms: u64,
    /// Slack added to the expected move time while waiting for DONE (ms).
    pub move_timeout_ms: u64,
}

impl Default for SerialCfg {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            read_timeout_ms: 5000,
            ready_timeout_ms: 5000,
            move_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// Try the serial port, fall back to the simulator.
    #[default]
    Auto,
    Serial,
    Simulated,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BridgeCfg {
    pub mode: BridgeMode,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreCfg {
    pub bundled_dir: PathBuf,
    pub custom_dir: PathBuf,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            bundled_dir: PathBuf::from("tests/bundled"),
            custom_dir: PathBuf::from("tests/custom"),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub serial: SerialCfg,
    pub bridge: BridgeCfg,
    pub store: StoreCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.serial.port.trim().is_empty() {
            eyre::bail!("serial.port must not be empty");
        }
        if self.serial.baud == 0 {
            eyre::bail!("serial.baud must be > 0");
        }
        if self.serial.read_timeout_ms == 0 {
            eyre::bail!("serial.read_timeout_ms must be >= 1");
        }
        if self.serial.ready_timeout_ms == 0 {
            eyre::bail!("serial.ready_timeout_ms must be >= 1");
        }
        if self.serial.move_timeout_ms < self.serial.read_timeout_ms {
            eyre::bail!("serial.move_timeout_ms must be >= serial.read_timeout_ms");
        }
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }
        Ok(())
    }
}
