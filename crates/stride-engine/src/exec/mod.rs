//! The execution scheduler and its stack machine.
//!
//! Each suspendable body runs as an explicit state machine (a stack of call
//! frames) producing tagged step results, driven by the scheduler's
//! trampoline. Nothing here relies on host coroutines or threads.

pub(crate) mod machine;
mod scheduler;

pub use machine::{
    CallFrame, Completion, Coroutine, Flavor, Frame, ResumeWith, StepEvent, Suspension,
};
pub use scheduler::{DriveOutcome, PauseReason, PausedState};
pub(crate) use scheduler::{drive, run_task_queue};
