//! The `run` command: orchestrate a stored test and stream its events.

use std::io::BufRead;
use std::thread;

use arm_config::{Config, TestStore};
use arm_core::{Event, Orchestrator, RunControl, TestDefinition, TestResult};
use crossbeam_channel::{Receiver, select, unbounded};
use eyre::WrapErr;

use crate::bridge::{open_bridge, shutdown};

pub struct RunArgs<'a> {
    pub name: &'a str,
    pub speed: Option<u32>,
    pub repeat: Option<u32>,
    pub interactive: bool,
    pub predictions: bool,
    pub json: bool,
    pub port: Option<&'a str>,
    pub simulated: bool,
}

/// Load `name` from the store and apply CLI overrides.
pub fn load_definition(
    store: &TestStore,
    name: &str,
    speed: Option<u32>,
    repeat: Option<u32>,
) -> eyre::Result<TestDefinition> {
    let file = store.load(name)?;
    let mut def = TestDefinition::try_from(&file).map_err(eyre::Report::new)?;
    if let Some(s) = speed {
        def.speed_ms = s;
    }
    if let Some(r) = repeat {
        def.repeat_count = r;
    }
    def.validate().map_err(eyre::Report::new)?;
    Ok(def)
}

pub fn run_test(cfg: &Config, args: &RunArgs<'_>) -> eyre::Result<()> {
    let store = TestStore::from(&cfg.store);
    let def = load_definition(&store, args.name, args.speed, args.repeat)?;
    let (bridge, info) = open_bridge(cfg, args.port, args.simulated)?;
    tracing::info!(test = %def.name, bridge = info.kind, steps = def.steps.len(), repeats = def.repeat_count, "starting run");

    let (tx, rx) = unbounded::<Event>();
    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
    let mut orch = Orchestrator::new(bridge, Some(tx));
    let control = orch.control();

    {
        let control = control.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            if control.stop() {
                tracing::warn!("interrupt received; stopping after the current step");
            }
        }) {
            tracing::warn!(error = %e, "could not install Ctrl-C handler");
        }
    }
    if args.interactive {
        spawn_stdin_controls(control.clone(), args.json);
    }

    let json = args.json;
    let predictions = args.predictions;
    let steps = def.steps.len();
    let printer = thread::spawn(move || print_events(&rx, &done_rx, json, predictions, steps));

    let outcome = orch.run(&def);
    drop(done_tx);
    if printer.join().is_err() {
        tracing::warn!("event printer panicked");
    }

    let mut bridge = orch.into_bridge();
    shutdown(&mut bridge);

    let results = outcome.wrap_err_with(|| format!("run {}", def.name))?;
    if !json {
        print_summary(&results, control.state().as_str());
    }
    Ok(())
}

fn spawn_stdin_controls(control: RunControl, json: bool) {
    if !json {
        eprintln!("controls: p = pause, r = resume, s = stop");
    }
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let accepted = match line.trim() {
                "p" | "pause" => control.pause(),
                "r" | "resume" => control.resume(),
                "s" | "stop" => control.stop(),
                "" => continue,
                other => {
                    tracing::warn!(input = other, "unknown control command");
                    continue;
                }
            };
            if !accepted {
                tracing::warn!(input = line.trim(), state = %control.state(), "control ignored in current state");
            }
            if control.state().is_terminal() {
                break;
            }
        }
    });
}

/// Print events until the run finishes, then drain whatever is still queued.
fn print_events(rx: &Receiver<Event>, done: &Receiver<()>, json: bool, predictions: bool, steps: usize) {
    loop {
        select! {
            recv(rx) -> msg => match msg {
                Ok(ev) => print_event(&ev, json, predictions, steps),
                Err(_) => return,
            },
            recv(done) -> _ => {
                for ev in rx.try_iter() {
                    print_event(&ev, json, predictions, steps);
                }
                return;
            }
        }
    }
}

fn print_event(ev: &Event, json: bool, predictions: bool, steps: usize) {
    if json {
        match serde_json::to_string(ev) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, kind = ev.kind(), "could not serialize event"),
        }
        return;
    }
    match ev {
        Event::State {
            state,
            repeat: Some(r),
            step: Some(s),
            label,
            target,
            ..
        } => {
            let label = label.as_deref().unwrap_or("");
            let target = target.map(|t| format!("{t:?}")).unwrap_or_default();
            println!("[{state}] repeat {} step {}/{steps} {label} -> {target}", r + 1, s + 1);
        }
        Event::State { state, test, .. } => match test {
            Some(t) => println!("[{state}] {t}"),
            None => println!("[{state}]"),
        },
        Event::PredictedAngles {
            angles, elapsed_ms, ..
        } if predictions => println!("    {elapsed_ms:>6} ms  {angles:?}"),
        Event::PredictedAngles { .. } => {}
        Event::StepComplete { .. } => {}
        Event::TestComplete { state, results } => {
            println!("test {state}: {} repeat(s) recorded", results.len());
        }
    }
}

fn print_summary(results: &[TestResult], state: &str) {
    println!();
    for r in results {
        println!(
            "{} #{}  verdict={}  total={:.1} ms  divergence={:.2}%  repeatability={:.2}",
            r.test_name,
            r.repeat_index + 1,
            r.verdict,
            r.total_time_ms,
            r.path_divergence,
            r.repeatability
        );
        let coverage: Vec<String> = r
            .range_coverage
            .iter()
            .map(|(servo, pct)| format!("{servo} {pct:.1}%"))
            .collect();
        if !coverage.is_empty() {
            println!("  coverage: {}", coverage.join(", "));
        }
        for flag in &r.ergonomic_flags {
            println!("  flag: {flag}");
        }
        for s in &r.steps {
            println!(
                "  {:<16} target {:?}  end {:?}  planned {} ms  actual {:.1} ms",
                s.label, s.target_angles, s.actual_end_angles, s.planned_duration_ms, s.actual_duration_ms
            );
        }
    }
    println!("run {state}");
}
