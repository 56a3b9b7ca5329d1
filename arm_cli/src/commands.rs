//! Handlers for the short-lived subcommands.

use std::fs;
use std::path::Path;

use arm_config::{Config, TestFile, TestStore};
use arm_core::hw_error::map_hw_error;
use arm_core::interpolation::clamp_pose;
use arm_core::{ArmError, TestDefinition, pose_from_slice, predict_angle_at_time, total_duration_ms};
use arm_traits::{BoxError, Bridge};
use eyre::WrapErr;
use serde_json::json;

use crate::bridge::{open_bridge, shutdown};

fn bridge_err(e: BoxError) -> eyre::Report {
    eyre::Report::new(map_hw_error(e.as_ref()))
}

fn pose_arg(angles: &[i32], what: &str) -> eyre::Result<arm_traits::Pose> {
    pose_from_slice(angles).map_err(|e| match e {
        ArmError::InvalidPose(msg) => eyre::Report::new(ArmError::InvalidPose(format!("{what}: {msg}"))),
        other => eyre::Report::new(other),
    })
}

pub fn list(cfg: &Config, json: bool) -> eyre::Result<()> {
    let tests = TestStore::from(&cfg.store).list()?;
    if json {
        println!("{}", serde_json::to_string(&tests)?);
        return Ok(());
    }
    if tests.is_empty() {
        println!("no tests found");
        return Ok(());
    }
    for t in &tests {
        let source = match t.source {
            arm_config::store::TestSource::Bundled => "bundled",
            arm_config::store::TestSource::Custom => "custom",
        };
        println!("{:<24} {:<8} {}", t.id, source, t.description);
    }
    Ok(())
}

pub fn show(cfg: &Config, name: &str) -> eyre::Result<()> {
    let test = TestStore::from(&cfg.store).load(name)?;
    println!("{}", serde_json::to_string_pretty(&test)?);
    Ok(())
}

pub fn import(cfg: &Config, file: &Path, json: bool) -> eyre::Result<()> {
    let text = fs::read_to_string(file).wrap_err_with(|| format!("read {}", file.display()))?;
    let test = TestFile::from_json(&text).wrap_err_with(|| format!("parse {}", file.display()))?;
    // arity errors surface here instead of at run time
    TestDefinition::try_from(&test).map_err(eyre::Report::new)?;
    let path = TestStore::from(&cfg.store).save(&test)?;
    if json {
        println!("{}", json!({ "type": "imported", "name": test.name, "file": path }));
    } else {
        println!("imported {} -> {}", test.name, path.display());
    }
    Ok(())
}

pub fn read(cfg: &Config, port: Option<&str>, simulated: bool, json: bool) -> eyre::Result<()> {
    let (mut bridge, _) = open_bridge(cfg, port, simulated)?;
    let angles = bridge.read_angles().map_err(bridge_err);
    shutdown(&mut bridge);
    let angles = angles?;
    if json {
        println!("{}", json!({ "type": "angles", "angles": angles }));
    } else {
        println!("angles: {angles:?}");
    }
    Ok(())
}

pub fn jog(
    cfg: &Config,
    angles: &[i32],
    speed: u32,
    port: Option<&str>,
    simulated: bool,
    json: bool,
) -> eyre::Result<()> {
    let target = clamp_pose(&pose_arg(angles, "jog target")?);
    let (mut bridge, _) = open_bridge(cfg, port, simulated)?;
    let outcome = bridge
        .move_to(target, speed)
        .and_then(|before| Ok((before, bridge.read_angles()?)))
        .map_err(bridge_err);
    shutdown(&mut bridge);
    let (before, after) = outcome?;
    if json {
        println!(
            "{}",
            json!({ "type": "jog", "target": target, "before": before, "after": after })
        );
    } else {
        println!("moved {before:?} -> {after:?} (target {target:?})");
    }
    Ok(())
}

pub fn health(cfg: &Config, port: Option<&str>, simulated: bool, json: bool) -> eyre::Result<()> {
    let (mut bridge, info) = open_bridge(cfg, port, simulated)?;
    let connected = bridge.is_connected();
    let ping = bridge.ping();
    shutdown(&mut bridge);
    if json {
        println!(
            "{}",
            json!({
                "type": "health",
                "bridge": info.kind,
                "port": info.port,
                "connected": connected,
                "ping": ping,
            })
        );
    } else {
        println!(
            "bridge={} port={} connected={connected} ping={}",
            info.kind,
            info.port.as_deref().unwrap_or("-"),
            if ping { "ok" } else { "no reply" }
        );
    }
    if !ping {
        return Err(eyre::Report::new(ArmError::Disconnected));
    }
    Ok(())
}

#[cfg(feature = "hardware")]
pub fn probe(cfg: &Config, port: Option<&str>, boot_ms: u64, json: bool) -> eyre::Result<()> {
    use std::time::Duration;

    let ports = arm_hardware::serial::list_ports().map_err(|e| eyre::Report::new(map_hw_error(&e)))?;
    let port = port.unwrap_or(&cfg.serial.port);
    let report = arm_hardware::probe::probe_port(port, cfg.serial.baud, Duration::from_millis(boot_ms))
        .map_err(|e| eyre::Report::new(map_hw_error(&e)))
        .wrap_err_with(|| format!("probe {port}"))?;
    if json {
        println!(
            "{}",
            json!({
                "type": "probe",
                "ports": ports,
                "port": port,
                "boot_lines": report.boot_lines,
                "read_reply": report.read_reply,
                "angles": report.angles,
                "link_ok": report.link_ok(),
            })
        );
    } else {
        println!("ports: {}", if ports.is_empty() { "-".to_string() } else { ports.join(", ") });
        println!("probing {port} at {} baud", cfg.serial.baud);
        for line in &report.boot_lines {
            println!("  boot: {line}");
        }
        match (&report.read_reply, report.angles) {
            (Some(_), Some(a)) => println!("READ -> {a:?}"),
            (Some(raw), None) => println!("READ -> unparsed reply {raw:?}"),
            (None, _) => println!("READ -> no reply"),
        }
    }
    if !report.link_ok() {
        return Err(eyre::Report::new(ArmError::Protocol(format!(
            "no valid READ reply from {port}"
        ))));
    }
    Ok(())
}

#[cfg(not(feature = "hardware"))]
pub fn probe(_cfg: &Config, _port: Option<&str>, _boot_ms: u64, _json: bool) -> eyre::Result<()> {
    eyre::bail!("serial support not compiled in; rebuild with --features hardware")
}

pub fn predict(from: &[i32], to: &[i32], speed: u32, at: Option<f64>, json: bool) -> eyre::Result<()> {
    let from = pose_arg(from, "--from")?;
    let to = pose_arg(to, "--to")?;
    let total_ms = total_duration_ms(speed, Some((&from, &to)));
    let predicted = at.map(|t| predict_angle_at_time(from, to, speed, t));
    if json {
        println!(
            "{}",
            json!({
                "type": "prediction",
                "from": from,
                "to": to,
                "speed": speed,
                "total_ms": total_ms,
                "at_ms": at,
                "angles": predicted,
            })
        );
    } else {
        println!("move {from:?} -> {to:?} at {speed} ms/tick takes {total_ms} ms");
        if let (Some(t), Some(p)) = (at, predicted) {
            println!("at {t} ms: {p:?}");
        }
    }
    Ok(())
}
