//! The trampoline driving coroutines to completion, pause, or park.

use smol_str::SmolStr;

use crate::breakpoints::{PreDecision, LOG_POINT_TAG};
use crate::engine::{Engine, PausedRun, PausedWaiting, Task};
use crate::events::EngineEvent;
use crate::frames::{CallSite, FrameSnapshot};
use crate::value::{truthy, Value};

use super::machine::{self, Coroutine, StepEvent, Suspension};

/// Why execution is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Breakpoint,
    Exception,
}

/// The live pause payload published to listeners.
#[derive(Debug, Clone)]
pub struct PausedState {
    pub breakpoint_id: Option<u32>,
    pub reason: PauseReason,
    /// The thrown error for exception pauses.
    pub data: Option<Value>,
    pub unit: SmolStr,
    pub line: u32,
    pub column: u32,
    pub frames: Vec<FrameSnapshot>,
    pub source: String,
}

/// Result of driving one evaluation.
#[derive(Debug)]
pub enum DriveOutcome {
    /// Ran to completion with the unit's exports (or call result).
    Completed(Value),
    /// Stopped at a pause-worthy suspension point.
    Paused,
    /// Parked on an externally asynchronous wait.
    Pending,
    /// Deferred into the macro-task queue behind a live pause.
    Queued,
    /// Failed with an uncaught error (already published).
    Failed(Value),
}

/// Drives one coroutine per the scheduler contract.
pub(crate) fn drive(engine: &mut Engine, mut co: Coroutine) -> DriveOutcome {
    engine.set_sandbox(true);
    loop {
        match machine::run(engine, &mut co) {
            StepEvent::Done(value) => {
                engine.set_sandbox(false);
                engine.settle_hook(co.hook, Ok(value.clone()));
                engine.mark_toplevel_return();
                run_task_queue(engine);
                return DriveOutcome::Completed(value);
            }
            StepEvent::Failed(error) => {
                engine.set_sandbox(false);
                engine.surface_uncaught(&error);
                engine.settle_hook(co.hook, Err(error.clone()));
                engine.mark_toplevel_return();
                run_task_queue(engine);
                return DriveOutcome::Failed(error);
            }
            StepEvent::Suspend(Suspension::ExceptionPause(error)) => {
                engine.set_sandbox(false);
                let Some(state) = exception_pause_state(engine, &error) else {
                    // No recorded position to pause at: keep propagating.
                    co.resume = crate::exec::ResumeWith::Throw(error);
                    continue;
                };
                co.resume = crate::exec::ResumeWith::Throw(error);
                engine.paused = Some(PausedRun {
                    state: state.clone(),
                    waiting: PausedWaiting::Coroutine(co),
                });
                engine.emit(EngineEvent::Paused(state));
                return DriveOutcome::Paused;
            }
            StepEvent::Suspend(Suspension::Entry) => {
                engine.set_sandbox(false);
                engine.macro_tasks.push_back(Task::Drive(co));
                return DriveOutcome::Queued;
            }
            StepEvent::Suspend(Suspension::Check {
                bp,
                unit,
                line,
                col,
            }) => {
                if engine.is_paused() {
                    // Single flow: defer behind the live pause. The check
                    // instruction re-executes when the queue drains.
                    engine.set_sandbox(false);
                    let mut co = co;
                    if let Some(crate::exec::Frame::Script(frame)) = co.frames.last_mut() {
                        frame.pc = frame.pc.saturating_sub(1);
                    }
                    engine.macro_tasks.push_back(Task::Drive(co));
                    return DriveOutcome::Queued;
                }
                engine.frames.update_call_site(CallSite {
                    unit: unit.clone(),
                    line,
                    column: col,
                });
                let stepping = engine.resume_options;
                let current = engine.frames.current_id();
                let decision = engine.breakpoints.decide_pre(bp, stepping, current);
                let pause = match decision {
                    PreDecision::Run => false,
                    PreDecision::Pause => true,
                    PreDecision::Condition(expr) => {
                        let result = engine
                            .evaluate_in_frame(&expr, None)
                            .is_some_and(|value| truthy(&value));
                        result && !expr.starts_with(LOG_POINT_TAG)
                    }
                };
                if !pause {
                    continue;
                }
                engine.set_sandbox(false);
                let state = PausedState {
                    breakpoint_id: Some(bp),
                    reason: PauseReason::Breakpoint,
                    data: None,
                    unit: unit.clone(),
                    line,
                    column: col,
                    frames: engine.frames.snapshot(),
                    source: engine.script_content(&unit).unwrap_or_default(),
                };
                tracing::debug!(target: "stride::pause", unit = %unit, line, col, "paused");
                engine.paused = Some(PausedRun {
                    state: state.clone(),
                    waiting: PausedWaiting::Coroutine(co),
                });
                engine.emit(EngineEvent::Paused(state));
                return DriveOutcome::Paused;
            }
            StepEvent::Suspend(Suspension::Wait(deferred)) => {
                engine.waiters.push((deferred, co));
                run_task_queue(engine);
                return DriveOutcome::Pending;
            }
            StepEvent::Suspend(Suspension::Fetch(paths)) => {
                if engine.begin_fetches(&paths) {
                    continue;
                }
                engine.park_fetch_waiter(paths, co);
                return DriveOutcome::Pending;
            }
        }
    }
}

/// Drains queued continuations while no pause is live. Reentrant calls are
/// no-ops; the outermost drain loop picks up everything.
pub(crate) fn run_task_queue(engine: &mut Engine) {
    if engine.draining {
        return;
    }
    engine.draining = true;
    while !engine.is_paused() {
        let Some(task) = engine.macro_tasks.pop_front() else {
            break;
        };
        match task {
            Task::Drive(co) => {
                drive(engine, co);
            }
            Task::RunUnit(key) => {
                engine.run_unit_by_key(&key);
            }
            Task::DynamicImport { url, deferred } => {
                engine.perform_dynamic_import(url, deferred);
            }
        }
    }
    engine.draining = false;
}

/// Named frames with recorded positions, innermost first.
pub(crate) fn call_stack(frames: &[FrameSnapshot]) -> Vec<&FrameSnapshot> {
    frames
        .iter()
        .filter(|frame| frame.name.is_some() && frame.call_site.is_some())
        .rev()
        .collect()
}

fn exception_pause_state(engine: &mut Engine, error: &Value) -> Option<PausedState> {
    let frames = engine.frames.snapshot_with_last_popped();
    let innermost = call_stack(&frames).into_iter().next()?.clone();
    let site = innermost.call_site?;
    Some(PausedState {
        breakpoint_id: None,
        reason: PauseReason::Exception,
        data: Some(error.clone()),
        unit: site.unit.clone(),
        line: site.line,
        column: site.column,
        frames,
        source: engine.script_content(&site.unit).unwrap_or_default(),
    })
}
