#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `armctl`: run scripted servo-arm tests from the command line.

mod bridge;
mod cli;
mod commands;
mod error_fmt;
mod logging;
mod run;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::run::{RunArgs, run_test};

/// Read and validate the config; a missing file means defaults.
fn load_config(path: &Path) -> eyre::Result<arm_config::Config> {
    let cfg = if path.exists() {
        let text =
            std::fs::read_to_string(path).wrap_err_with(|| format!("read config {}", path.display()))?;
        arm_config::load_toml(&text).wrap_err_with(|| format!("parse config {}", path.display()))?
    } else {
        arm_config::Config::default()
    };
    cfg.validate()
        .map_err(|e| eyre::eyre!("invalid configuration: {e}"))?;
    Ok(cfg)
}

fn dispatch(cli: &Cli, cfg: &arm_config::Config) -> eyre::Result<()> {
    let port = cli.port.as_deref();
    let json = cli.json;
    match &cli.cmd {
        Commands::List => commands::list(cfg, json),
        Commands::Show { name } => commands::show(cfg, name),
        Commands::Import { file } => commands::import(cfg, file, json),
        Commands::Run {
            name,
            speed,
            repeat,
            interactive,
            predictions,
        } => run_test(
            cfg,
            &RunArgs {
                name,
                speed: *speed,
                repeat: *repeat,
                interactive: *interactive,
                predictions: *predictions,
                json,
                port,
                simulated: cli.simulated,
            },
        ),
        Commands::Read => commands::read(cfg, port, cli.simulated, json),
        Commands::Jog { angles, speed } => {
            commands::jog(cfg, angles, *speed, port, cli.simulated, json)
        }
        Commands::Health => commands::health(cfg, port, cli.simulated, json),
        Commands::Probe { boot_ms } => commands::probe(cfg, port, *boot_ms, json),
        Commands::Predict { from, to, speed, at } => commands::predict(from, to, *speed, *at, json),
    }
}

fn real_main(cli: &Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    let level = cli
        .log_level
        .clone()
        .or_else(|| cfg.logging.level.clone())
        .unwrap_or_else(|| "warn".to_string());
    logging::init_logging(cli.json, &level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");
    dispatch(cli, &cfg)
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(e) = real_main(&cli) {
        tracing::error!(error = %format!("{e:#}"), "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}
