//! Run orchestrator: sequences a test's steps on a bridge, streams predicted
//! poses paced to the clock, and scores each repeat.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arm_traits::clock::{Clock, MonotonicClock};
use arm_traits::{Bridge, Pose};
use crossbeam_channel::{Sender, TrySendError};
use eyre::WrapErr;

use crate::error::Result;
use crate::event::Event;
use crate::hw_error::bridge_result;
use crate::interpolation::{interpolate_poses, total_duration_ms};
use crate::metrics;
use crate::status::RunState;
use crate::types::{Step, StepResult, TestDefinition, TestResult};

/// State shared between the running orchestrator and its control handles.
#[derive(Debug)]
struct Shared {
    state: Mutex<RunState>,
    cancel: AtomicBool,
    /// `true` while steps may start.
    gate: Mutex<bool>,
    gate_cv: Condvar,
    events: Option<Sender<Event>>,
    sink_closed: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn new(events: Option<Sender<Event>>) -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
            cancel: AtomicBool::new(false),
            gate: Mutex::new(true),
            gate_cv: Condvar::new(),
            events,
            sink_closed: AtomicBool::new(false),
        }
    }

    fn set_gate(&self, open: bool) {
        *lock(&self.gate) = open;
        if open {
            self.gate_cv.notify_all();
        }
    }

    fn wait_gate(&self) {
        let mut open = lock(&self.gate);
        while !*open {
            open = self.gate_cv.wait(open).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn set_state(&self, state: RunState) {
        *lock(&self.state) = state;
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Best effort: a slow or vanished consumer never stalls a move.
    fn emit(&self, event: Event) {
        let Some(tx) = &self.events else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                tracing::warn!(event = ev.kind(), "event channel full; dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                if !self.sink_closed.swap(true, Ordering::Relaxed) {
                    tracing::warn!("event receiver dropped; discarding further events");
                }
            }
        }
    }
}

/// Cloneable handle for steering a run from other threads.
#[derive(Debug, Clone)]
pub struct RunControl {
    shared: Arc<Shared>,
}

impl RunControl {
    /// Hold the run at the next step boundary. Only valid while running.
    pub fn pause(&self) -> bool {
        {
            let mut state = lock(&self.shared.state);
            if *state != RunState::Running {
                return false;
            }
            *state = RunState::Paused;
            self.shared.set_gate(false);
            self.shared.emit(Event::state(RunState::Paused));
        }
        tracing::info!("run paused");
        true
    }

    /// Let a paused run continue.
    pub fn resume(&self) -> bool {
        {
            let mut state = lock(&self.shared.state);
            if *state != RunState::Paused {
                return false;
            }
            *state = RunState::Running;
            // announce before the run thread can emit anything new
            self.shared.emit(Event::state(RunState::Running));
            self.shared.set_gate(true);
        }
        tracing::info!("run resumed");
        true
    }

    /// Cancel the run; a paused run is released straight into cancellation.
    /// The current step still finishes its move.
    pub fn stop(&self) -> bool {
        {
            let state = lock(&self.shared.state);
            if !matches!(*state, RunState::Running | RunState::Paused) {
                return false;
            }
            self.shared.emit(Event::state(RunState::Stopped));
            self.shared.cancel.store(true, Ordering::Release);
            self.shared.set_gate(true);
        }
        tracing::info!("run stop requested");
        true
    }

    pub fn state(&self) -> RunState {
        *lock(&self.shared.state)
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled()
    }
}

/// Drives test definitions against one bridge.
///
/// ```no_run
/// # use arm_core::{Orchestrator, TestDefinition};
/// # fn demo(bridge: arm_hardware::SimulatedBridge, def: TestDefinition) -> eyre::Result<()> {
/// let (tx, rx) = crossbeam_channel::unbounded();
/// let mut orch = Orchestrator::new(bridge, Some(tx));
/// let control = orch.control();
/// std::thread::spawn(move || for ev in rx { println!("{}", ev.kind()) });
/// let results = orch.run(&def)?;
/// # let _ = (control, results); Ok(()) }
/// ```
pub struct Orchestrator<B: Bridge, C: Clock = MonotonicClock> {
    bridge: B,
    clock: C,
    shared: Arc<Shared>,
}

impl<B: Bridge> Orchestrator<B, MonotonicClock> {
    pub fn new(bridge: B, events: Option<Sender<Event>>) -> Self {
        Self::with_clock(bridge, MonotonicClock::new(), events)
    }
}

impl<B: Bridge, C: Clock> Orchestrator<B, C> {
    pub fn with_clock(bridge: B, clock: C, events: Option<Sender<Event>>) -> Self {
        Self {
            bridge,
            clock,
            shared: Arc::new(Shared::new(events)),
        }
    }

    pub fn control(&self) -> RunControl {
        RunControl {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> RunState {
        *lock(&self.shared.state)
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    pub fn into_bridge(self) -> B {
        self.bridge
    }

    /// Execute every repeat of `def` and return one result per repeat run.
    ///
    /// Bridge failures abort the run with a typed [`crate::ArmError`]; the
    /// state is then left as it was and no `test_complete` event is sent.
    pub fn run(&mut self, def: &TestDefinition) -> Result<Vec<TestResult>> {
        def.validate()?;
        {
            let mut state = lock(&self.shared.state);
            *state = RunState::Running;
            self.shared.cancel.store(false, Ordering::Release);
            self.shared.set_gate(true);
        }
        tracing::info!(
            test = %def.name,
            steps = def.steps.len(),
            repeats = def.repeat_count,
            speed_ms = def.speed_ms,
            bridge = self.bridge.kind(),
            "run started"
        );
        self.shared.emit(Event::State {
            state: RunState::Running,
            test: Some(def.name.clone()),
            repeat: None,
            step: None,
            label: None,
            target: None,
            speed: None,
        });

        let mut results = Vec::with_capacity(def.repeat_count as usize);
        for repeat in 0..def.repeat_count {
            if self.shared.cancelled() {
                break;
            }
            let result = self.run_repeat(def, repeat)?;
            tracing::info!(
                repeat,
                steps = result.steps.len(),
                verdict = %result.verdict,
                total_ms = result.total_time_ms,
                "repeat finished"
            );
            results.push(result);
        }

        let score = metrics::repeatability(&results);
        for r in &mut results {
            r.repeatability = score;
        }

        let final_state = if self.shared.cancelled() {
            RunState::Stopped
        } else {
            RunState::Complete
        };
        self.shared.set_state(final_state);
        tracing::info!(test = %def.name, state = %final_state, repeats = results.len(), "run finished");
        self.shared.emit(Event::TestComplete {
            state: final_state,
            results: results.clone(),
        });
        Ok(results)
    }

    fn run_repeat(&mut self, def: &TestDefinition, repeat: u32) -> Result<TestResult> {
        let mut result = TestResult::new(def.name.clone(), repeat);
        let started = self.clock.now();
        let mut current = bridge_result(self.bridge.read_angles())
            .wrap_err_with(|| format!("repeat {repeat}: reading start angles"))?;

        for (index, step) in def.steps.iter().enumerate() {
            if self.shared.cancelled() {
                break;
            }
            self.shared.wait_gate();
            if self.shared.cancelled() {
                break;
            }
            let record = self
                .run_step(def.speed_ms, repeat, index, step, current)
                .wrap_err_with(|| format!("repeat {repeat}, step {index} ({})", step.label))?;
            current = record.actual_end_angles;
            result.steps.push(record);
            self.shared.emit(Event::StepComplete { step: index, repeat });
        }

        result.total_time_ms = self.clock.ms_since_f64(started);
        metrics::compute_metrics(&mut result, def.designed_path.as_deref());
        Ok(result)
    }

    fn run_step(
        &mut self,
        speed_ms: u32,
        repeat: u32,
        index: usize,
        step: &Step,
        current: Pose,
    ) -> Result<StepResult> {
        self.shared.emit(Event::State {
            state: RunState::Running,
            test: None,
            repeat: Some(repeat),
            step: Some(index),
            label: Some(step.label.clone()),
            target: Some(step.target),
            speed: Some(speed_ms),
        });

        let step_start = self.clock.now();
        let start_angles = bridge_result(self.bridge.send_move(step.target, speed_ms))?;
        let move_ms = total_duration_ms(speed_ms, Some((&current, &step.target)));
        tracing::debug!(
            repeat,
            step = index,
            label = %step.label,
            target = ?step.target,
            ?start_angles,
            move_ms,
            "move issued"
        );

        self.stream_predictions(current, step.target, speed_ms, repeat, index);

        bridge_result(self.bridge.wait_move_done())?;
        if step.hold_ms > 0 && !self.shared.cancelled() {
            self.clock.sleep(Duration::from_millis(step.hold_ms));
        }
        let actual_ms = self.clock.ms_since_f64(step_start);
        let end_angles = bridge_result(self.bridge.read_angles())?;
        tracing::debug!(repeat, step = index, ?end_angles, actual_ms, "step finished");

        Ok(StepResult {
            label: step.label.clone(),
            target_angles: step.target,
            actual_start_angles: start_angles,
            actual_end_angles: end_angles,
            planned_duration_ms: move_ms + step.hold_ms,
            actual_duration_ms: actual_ms,
            hold_ms: step.hold_ms,
        })
    }

    /// Replay the engine's poses on the clock. The sleep before each pose is
    /// recomputed from the stream start so lateness never accumulates.
    fn stream_predictions(&self, from: Pose, to: Pose, speed_ms: u32, repeat: u32, step: usize) {
        let stream_start = self.clock.now();
        for (angles, elapsed_ms) in interpolate_poses(from, to, speed_ms) {
            if self.shared.cancelled() {
                tracing::debug!(repeat, step, elapsed_ms, "prediction stream cut short");
                break;
            }
            let actual = self.clock.now().saturating_duration_since(stream_start);
            if let Some(wait) = Duration::from_millis(elapsed_ms).checked_sub(actual)
                && !wait.is_zero()
            {
                self.clock.sleep(wait);
            }
            self.shared.emit(Event::PredictedAngles {
                angles,
                elapsed_ms,
                step,
                repeat,
            });
        }
    }
}
