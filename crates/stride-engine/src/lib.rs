//! `stride-engine` - instrumentation transform and steppable coroutine
//! execution engine for Stride scripts.
//!
//! The engine compiles an ordinary script into an instrumented instruction
//! program and executes it under a cooperative trampoline scheduler that
//! can suspend at statement and sub-expression granularity, inspect live
//! lexical state, and resume — including across deferred values, module
//! loads, and higher-order builtins invoking script callbacks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

/// Breakpoint registry and matching policy.
pub mod breakpoints;
/// Engine state and the public API surface.
pub mod engine;
/// Engine errors.
pub mod error;
/// Notifications published to listeners.
pub mod events;
/// The execution scheduler and stack machine.
pub mod exec;
/// Call-frame and scope tracking.
pub mod frames;
/// The instrumentation transform.
pub mod instrument;
/// Module table and loader hook.
pub mod modules;
/// Sandbox bridge for higher-order builtins.
pub mod sandbox;
/// Runtime values.
#[allow(missing_docs)]
pub mod value;

pub use breakpoints::{Breakpoint, Condition, StepMode, LOG_POINT_TAG};
pub use engine::{Engine, RunHandle, RunOutcome, PRECOMPILED_MARK};
pub use error::TransformError;
pub use events::EngineEvent;
pub use exec::{DriveOutcome, PauseReason, PausedState};
pub use frames::{CallSite, FrameSnapshot};
pub use modules::{ModuleFetch, ModuleRecord};
pub use value::{to_display_string, to_number, truthy, Value};
