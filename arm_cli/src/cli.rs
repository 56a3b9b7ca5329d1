//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "armctl", version, about = "Servo arm test runner")]
pub struct Cli {
    /// Path to config TOML; defaults apply when the file is missing
    #[arg(long, value_name = "FILE", default_value = "etc/arm_config.toml")]
    pub config: PathBuf,

    /// Emit JSON lines (events, results, errors) instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging] level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Serial device; overrides [serial] port
    #[arg(long, value_name = "PATH", global = true)]
    pub port: Option<String>,

    /// Use the simulated arm regardless of [bridge] mode
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    pub simulated: bool,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List bundled and custom tests
    List,
    /// Print a test definition
    Show {
        /// File stem or test name
        name: String,
    },
    /// Copy a test JSON file into the custom test directory
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Run a test against the arm
    Run {
        /// File stem or test name
        name: String,
        /// Override the test's ms-per-tick speed
        #[arg(long, value_name = "MS")]
        speed: Option<u32>,
        /// Override the test's repeat count
        #[arg(long, value_name = "N")]
        repeat: Option<u32>,
        /// Read pause / resume / stop commands from stdin while running
        #[arg(long, action = ArgAction::SetTrue)]
        interactive: bool,
        /// Also print every predicted pose (text mode)
        #[arg(long, action = ArgAction::SetTrue)]
        predictions: bool,
    },
    /// Read the current servo angles
    Read,
    /// Move straight to a pose and report where the arm ended up
    Jog {
        /// Four comma-separated angles, e.g. 90,120,60,45
        #[arg(value_delimiter = ',', allow_negative_numbers = true, required = true)]
        angles: Vec<i32>,
        /// Milliseconds per tick
        #[arg(long, default_value_t = arm_config::DEFAULT_SPEED_MS)]
        speed: u32,
    },
    /// Bridge kind, connection and ping result
    Health,
    /// List serial ports and check a controller's boot output and READ reply
    Probe {
        /// How long to collect boot lines
        #[arg(long, value_name = "MS", default_value_t = 3000)]
        boot_ms: u64,
    },
    /// Predict a move's duration and the pose at a point in time
    Predict {
        /// Starting pose, comma-separated
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, default_values_t = [90, 90, 90, 90])]
        from: Vec<i32>,
        /// Target pose, comma-separated
        #[arg(long, value_delimiter = ',', required = true, allow_negative_numbers = true)]
        to: Vec<i32>,
        /// Milliseconds per tick
        #[arg(long, default_value_t = arm_config::DEFAULT_SPEED_MS)]
        speed: u32,
        /// Elapsed time into the move (ms)
        #[arg(long, value_name = "MS")]
        at: Option<f64>,
    },
}
