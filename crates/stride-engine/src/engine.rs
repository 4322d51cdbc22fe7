//! Engine state and the public API surface.
//!
//! One `Engine` value owns every registry, the module table, the global
//! realm, the pause slot, and the macro-task queue — the process-scoped
//! state of the single-flow model, with an explicit lifecycle instead of
//! ambient globals.

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::mpsc::{Receiver, Sender};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::breakpoints::{
    Breakpoint, BreakpointRegistry, Condition, ResumeOptions, StepMode,
};
use crate::error::TransformError;
use crate::events::EngineEvent;
use crate::exec::machine::{push_call, push_unit_frame, run as machine_run, CompletionHook};
use crate::exec::{
    drive, run_task_queue, Coroutine, DriveOutcome, Frame, PausedState, ResumeWith, StepEvent,
    Suspension,
};
use crate::frames::{FrameRegistry, FrameSnapshot};
use crate::instrument::{compile_expression, compile_unit, Unit};
use crate::modules::{default_loader, ModuleFetch, ModuleLoader, ModuleRecord, ModuleTable};
use crate::value::{
    is_callable, truthy, DeferredState, ErrorKind, ObjectRef, Payload, Realm, ScriptFunction,
    Value,
};

/// Marker prefix of precompiled payloads.
pub const PRECOMPILED_MARK: &str = "/** STRIDE_PRECOMPILED */";

#[derive(Serialize, Deserialize)]
struct PrecompiledPayload {
    id: SmolStr,
    unit: Unit,
    conditions: Vec<(u32, Condition)>,
}

/// A loaded unit ready to run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    key: SmolStr,
}

impl RunHandle {
    /// The unit identity this handle runs.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.key
    }

    /// Begins execution (deferred into the macro-task queue while another
    /// evaluation is paused).
    pub fn run(&self, engine: &mut Engine) -> RunOutcome {
        engine.run_unit(&self.key)
    }
}

/// Outcome of starting a unit.
#[derive(Debug)]
pub enum RunOutcome {
    /// Ran to completion with the unit's exports object.
    Completed(Value),
    /// Stopped at a pause-worthy suspension point.
    Paused,
    /// Parked on an asynchronous wait; `pump` continues it.
    Pending,
    /// Queued behind a live pause.
    Queued,
    /// Failed with an uncaught error (already published as an event).
    Failed(Value),
}

pub(crate) struct PausedRun {
    pub state: PausedState,
    pub waiting: PausedWaiting,
}

pub(crate) enum PausedWaiting {
    /// The suspended coroutine to resume. For exception pauses the
    /// coroutine's resume slot already carries the re-throw.
    Coroutine(Coroutine),
}

/// Deferred work in the macro-task queue.
pub(crate) enum Task {
    Drive(Coroutine),
    RunUnit(SmolStr),
    DynamicImport { url: SmolStr, deferred: ObjectRef },
}

struct FetchWaiter {
    paths: Vec<SmolStr>,
    task: Task,
}

/// The steppable-script engine.
pub struct Engine {
    pub(crate) realm: Realm,
    pub(crate) frames: FrameRegistry,
    pub(crate) breakpoints: BreakpointRegistry,
    pub(crate) modules: ModuleTable,
    units: FxHashMap<SmolStr, Rc<Unit>>,
    pub(crate) skip: bool,
    pub(crate) sandbox_active: bool,
    pub(crate) paused: Option<PausedRun>,
    pub(crate) resume_options: Option<ResumeOptions>,
    pub(crate) macro_tasks: VecDeque<Task>,
    pub(crate) waiters: Vec<(ObjectRef, Coroutine)>,
    fetch_waiters: Vec<FetchWaiter>,
    pending_fetches: Vec<(SmolStr, Receiver<Result<String, String>>)>,
    failed_fetches: FxHashMap<SmolStr, String>,
    loader: ModuleLoader,
    events: Vec<Sender<EngineEvent>>,
    supported: bool,
    pub(crate) draining: bool,
    vm_counter: u32,
}

impl Engine {
    /// Builds an engine and probes the environment once; when the probe
    /// fails, every later load fails fast.
    #[must_use]
    pub fn new() -> Self {
        let mut engine = Self {
            realm: Realm::new(),
            frames: FrameRegistry::new(),
            breakpoints: BreakpointRegistry::new(),
            modules: ModuleTable::new(),
            units: FxHashMap::default(),
            skip: false,
            sandbox_active: false,
            paused: None,
            resume_options: None,
            macro_tasks: VecDeque::new(),
            waiters: Vec::new(),
            fetch_waiters: Vec::new(),
            pending_fetches: Vec::new(),
            failed_fetches: FxHashMap::default(),
            loader: Box::new(default_loader),
            events: Vec::new(),
            supported: true,
            draining: false,
            vm_counter: 0,
        };
        engine.supported = engine.probe();
        if !engine.supported {
            tracing::warn!(target: "stride", "current environment is unsupported");
        }
        engine
    }

    fn probe(&mut self) -> bool {
        let Ok(unit) = compile_expression("1 + 1") else {
            return false;
        };
        let mut co = Coroutine::new(CompletionHook::None);
        co.frames
            .push(Frame::Script(crate::exec::machine::CallFrame::for_eval(
                Rc::new(unit),
                crate::value::Env::child(&self.realm.global_env),
            )));
        matches!(self.run_sync(co), Ok(Value::Number(n)) if n == 2.0)
    }

    /// Engine version string.
    #[must_use]
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Transforms source (or decodes a precompiled payload) and returns a
    /// handle that begins execution.
    pub fn transform_and_load(
        &mut self,
        source: &str,
        unit_id: Option<&str>,
    ) -> Result<RunHandle, TransformError> {
        if !self.supported {
            tracing::warn!(target: "stride", "load rejected: environment unsupported");
            return Err(TransformError::EnvironmentUnsupported);
        }
        let unit = self.load_unit(source, unit_id)?;
        Ok(RunHandle { key: unit.id.clone() })
    }

    /// Transforms source into a serialized payload for later fast loading.
    /// Idempotent: an already precompiled payload passes through unchanged.
    pub fn precompile(
        &mut self,
        source: &str,
        unit_id: Option<&str>,
    ) -> Result<String, TransformError> {
        if !self.supported {
            return Err(TransformError::EnvironmentUnsupported);
        }
        if source.starts_with(PRECOMPILED_MARK) {
            return Ok(source.to_string());
        }
        let id = self.unit_id(unit_id);
        let (unit, conditions) = compile_unit(source, id.clone(), &mut self.breakpoints)?;
        let payload = PrecompiledPayload {
            id,
            unit,
            conditions,
        };
        let json = serde_json::to_string(&payload)
            .map_err(|err| TransformError::InvalidPayload(SmolStr::new(err.to_string())))?;
        Ok(format!("{PRECOMPILED_MARK}{json}"))
    }

    fn unit_id(&mut self, unit_id: Option<&str>) -> SmolStr {
        match unit_id {
            Some(id) if !id.is_empty() => SmolStr::new(id),
            _ => {
                self.vm_counter += 1;
                SmolStr::new(format!("VM{}", self.vm_counter))
            }
        }
    }

    fn load_unit(
        &mut self,
        source: &str,
        unit_id: Option<&str>,
    ) -> Result<Rc<Unit>, TransformError> {
        let unit = if let Some(payload) = source.strip_prefix(PRECOMPILED_MARK) {
            let payload: PrecompiledPayload = serde_json::from_str(payload)
                .map_err(|err| TransformError::InvalidPayload(SmolStr::new(err.to_string())))?;
            let mut max_id = 0;
            for columns in payload.unit.line_index.values() {
                for &id in columns.values() {
                    max_id = max_id.max(id);
                }
            }
            for (id, condition) in payload.conditions {
                max_id = max_id.max(id);
                self.breakpoints.register_if_absent(id, condition);
            }
            self.breakpoints.reserve_through(max_id);
            let mut unit = payload.unit;
            // The payload's recorded identity wins over the caller's.
            if unit.id.is_empty() {
                let id = self.unit_id(unit_id);
                unit.id = id;
            }
            unit
        } else {
            let id = self.unit_id(unit_id);
            let (unit, _) = compile_unit(source, id, &mut self.breakpoints)?;
            unit
        };
        let unit = Rc::new(unit);
        self.units.insert(unit.id.clone(), Rc::clone(&unit));
        Ok(unit)
    }

    /// Compiles a fetched module, surfacing transform failures as script
    /// errors inside the importing evaluation.
    pub(crate) fn load_module_unit(
        &mut self,
        source: &str,
        id: SmolStr,
    ) -> Result<Rc<Unit>, Value> {
        self.load_unit(source, Some(&id))
            .map_err(|err| self.make_error(ErrorKind::SyntaxError, &err.to_string()))
    }

    // =========================================================================
    // Execution
    // =========================================================================

    fn run_unit(&mut self, key: &str) -> RunOutcome {
        if self.is_paused() {
            self.macro_tasks.push_back(Task::RunUnit(SmolStr::new(key)));
            return RunOutcome::Queued;
        }
        let Some(unit) = self.units.get(key).cloned() else {
            return RunOutcome::Failed(
                self.make_error(ErrorKind::Error, &format!("unknown unit '{key}'")),
            );
        };
        let co = Coroutine::for_unit(self, &unit);
        match drive(self, co) {
            DriveOutcome::Completed(value) => RunOutcome::Completed(value),
            DriveOutcome::Paused => RunOutcome::Paused,
            DriveOutcome::Pending => RunOutcome::Pending,
            DriveOutcome::Queued => RunOutcome::Queued,
            DriveOutcome::Failed(error) => RunOutcome::Failed(error),
        }
    }

    pub(crate) fn run_unit_by_key(&mut self, key: &str) {
        let _ = self.run_unit(key);
    }

    /// True while a pause is live.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    /// Releases the live pause. With a step mode, records the stepping
    /// bookkeeping consulted by the matching policy.
    pub fn resume(&mut self, mode: Option<StepMode>) -> bool {
        let Some(run) = self.paused.take() else {
            return false;
        };
        self.resume_options = mode.map(|mode| ResumeOptions {
            mode,
            frame_id: self.frames.current_id(),
        });
        self.emit(EngineEvent::Resumed);
        tracing::debug!(target: "stride::pause", "resumed");
        match run.waiting {
            PausedWaiting::Coroutine(co) => {
                drive(self, co);
            }
        }
        true
    }

    /// Evaluates an expression against the identified frame's scope, or the
    /// innermost frame when absent.
    pub fn evaluate_in_frame(&mut self, expression: &str, frame_id: Option<u64>) -> Option<Value> {
        let env = self
            .frames
            .env_for(frame_id)
            .unwrap_or_else(|| crate::value::Env::child(&self.realm.global_env));
        let unit = compile_expression(expression).ok()?;
        let mut co = Coroutine::new(CompletionHook::None);
        co.frames
            .push(Frame::Script(crate::exec::machine::CallFrame::for_eval(
                Rc::new(unit),
                env,
            )));
        match self.run_sync(co) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::debug!(
                    target: "stride::eval",
                    "frame evaluation failed: {}",
                    crate::value::to_display_string(&error)
                );
                None
            }
        }
    }

    /// Drives a nested evaluation to completion with debugging skipped.
    /// Used by frame evaluators, condition expressions, and native builtins
    /// invoking script callbacks outside the bridge.
    pub(crate) fn run_sync(&mut self, mut co: Coroutine) -> Result<Value, Value> {
        let prev_skip = self.skip;
        self.skip = true;
        let result = loop {
            match machine_run(self, &mut co) {
                StepEvent::Done(value) => break Ok(value),
                StepEvent::Failed(error) => break Err(error),
                StepEvent::Suspend(Suspension::Check { .. } | Suspension::Entry) => {}
                StepEvent::Suspend(Suspension::Wait(deferred)) => {
                    // A synchronously driven callback cannot park.
                    let state = match &deferred.borrow().payload {
                        Payload::Deferred(state) => state.clone(),
                        _ => DeferredState::Pending,
                    };
                    match state {
                        DeferredState::Resolved(value) => co.resume = ResumeWith::Value(value),
                        DeferredState::Rejected(error) => co.resume = ResumeWith::Throw(error),
                        DeferredState::Pending => {
                            break Err(self.make_error(
                                ErrorKind::TypeError,
                                "cannot wait on a pending value in a synchronous callback",
                            ))
                        }
                    }
                }
                StepEvent::Suspend(Suspension::Fetch(_)) => {
                    break Err(self.make_error(
                        ErrorKind::Error,
                        "cannot load modules in a synchronous callback",
                    ))
                }
                // Unreachable while skipping, but keep the rethrow moving.
                StepEvent::Suspend(Suspension::ExceptionPause(error)) => {
                    co.resume = ResumeWith::Throw(error);
                }
            }
        };
        self.skip = prev_skip;
        result
    }

    /// Invokes a callable from native code through a nested drive.
    pub(crate) fn call_callback(
        &mut self,
        callee: Value,
        this: Value,
        args: &[Value],
    ) -> Result<Value, Value> {
        if !is_callable(&callee) {
            return Err(self.make_error(ErrorKind::TypeError, "callback is not a function"));
        }
        let mut co = Coroutine::new(CompletionHook::None);
        match push_call(
            self,
            &mut co,
            callee,
            this,
            args.to_vec(),
            Value::Undefined,
            crate::exec::Flavor::Plain,
        )? {
            crate::exec::machine::CallPush::Value(value) => Ok(value),
            crate::exec::machine::CallPush::Pushed => self.run_sync(co),
        }
    }

    /// Queues an async function body and returns its deferred result.
    pub(crate) fn spawn_async(
        &mut self,
        sf: &ScriptFunction,
        func: u32,
        this: Value,
        args: &[Value],
        new_target: Value,
    ) -> Value {
        let deferred = self.realm.new_deferred(DeferredState::Pending);
        let mut co = Coroutine::new(CompletionHook::Deferred(deferred.clone()));
        co.frames
            .push(Frame::Script(crate::exec::machine::make_call_frame(
                sf,
                func,
                this,
                args,
                new_target,
                crate::exec::Flavor::Plain,
            )));
        self.macro_tasks.push_back(Task::Drive(co));
        Value::Object(deferred)
    }

    /// Settles a coroutine's completion hook.
    pub(crate) fn settle_hook(&mut self, hook: CompletionHook, result: Result<Value, Value>) {
        match hook {
            CompletionHook::None => {}
            CompletionHook::Deferred(deferred) => self.settle_deferred(&deferred, result),
        }
    }

    /// Settles a deferred and queues every coroutine parked on it.
    pub(crate) fn settle_deferred(&mut self, deferred: &ObjectRef, result: Result<Value, Value>) {
        {
            let mut borrowed = deferred.borrow_mut();
            if let Payload::Deferred(state) = &mut borrowed.payload {
                if !matches!(state, DeferredState::Pending) {
                    return;
                }
                *state = match &result {
                    Ok(value) => DeferredState::Resolved(value.clone()),
                    Err(error) => DeferredState::Rejected(error.clone()),
                };
            }
        }
        let mut kept = Vec::new();
        for (waiting_on, mut co) in self.waiters.drain(..) {
            if waiting_on.ptr_eq(deferred) {
                co.resume = match &result {
                    Ok(value) => ResumeWith::Value(value.clone()),
                    Err(error) => ResumeWith::Throw(error.clone()),
                };
                self.macro_tasks.push_back(Task::Drive(co));
            } else {
                kept.push((waiting_on, co));
            }
        }
        self.waiters = kept;
    }

    /// Records the top-of-loop bookkeeping when a drive returns to the
    /// global scope: a pending step must stop in whatever runs next.
    pub(crate) fn mark_toplevel_return(&mut self) {
        if self.frames.depth() <= 1 {
            if let Some(options) = &mut self.resume_options {
                options.frame_id = u64::MAX;
            }
        }
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Replaces the module loader hook.
    pub fn set_module_loader(&mut self, loader: impl FnMut(&str) -> ModuleFetch + 'static) -> bool {
        self.loader = Box::new(loader);
        true
    }

    /// Starts fetches for the given canonical paths; true when everything
    /// is already available.
    pub(crate) fn begin_fetches(&mut self, paths: &[SmolStr]) -> bool {
        for path in paths {
            match self.modules.record(path) {
                None => {
                    self.modules.mark_pending(path.clone());
                    match (self.loader)(path) {
                        ModuleFetch::Ready(text) => {
                            self.modules.set_source(path.clone(), text);
                        }
                        ModuleFetch::Pending(rx) => {
                            self.pending_fetches.push((path.clone(), rx));
                        }
                        ModuleFetch::Failed(message) => {
                            self.failed_fetches.insert(path.clone(), message);
                        }
                    }
                }
                Some(_) => {}
            }
        }
        self.modules.all_available(paths)
    }

    pub(crate) fn park_fetch_waiter(&mut self, paths: Vec<SmolStr>, co: Coroutine) {
        self.fetch_waiters.push(FetchWaiter {
            paths,
            task: Task::Drive(co),
        });
    }

    /// Best-effort dynamic import: returns a deferred settled through the
    /// macro-task queue.
    pub(crate) fn begin_dynamic_import(&mut self, url: SmolStr) -> Value {
        if let Some(ModuleRecord::Exports(value) | ModuleRecord::Evaluating(value)) =
            self.modules.record(&url)
        {
            return Value::Object(self.realm.new_deferred(DeferredState::Resolved(value)));
        }
        let deferred = self.realm.new_deferred(DeferredState::Pending);
        self.macro_tasks.push_back(Task::DynamicImport {
            url,
            deferred: deferred.clone(),
        });
        Value::Object(deferred)
    }

    pub(crate) fn perform_dynamic_import(&mut self, url: SmolStr, deferred: ObjectRef) {
        match self.modules.record(&url) {
            Some(ModuleRecord::Exports(value) | ModuleRecord::Evaluating(value)) => {
                self.settle_deferred(&deferred, Ok(value));
            }
            Some(ModuleRecord::Source(text)) => match self.load_module_unit(&text, url) {
                Ok(unit) => {
                    let mut co = Coroutine::new(CompletionHook::Deferred(deferred));
                    push_unit_frame(self, &mut co, &unit);
                    drive(self, co);
                }
                Err(error) => self.settle_deferred(&deferred, Err(error)),
            },
            Some(ModuleRecord::Pending) | None => {
                if let Some(message) = self.failed_fetches.get(&url).cloned() {
                    let error = self.make_error(ErrorKind::Error, &message);
                    self.settle_deferred(&deferred, Err(error));
                    return;
                }
                let ready = self.begin_fetches(&[url.clone()]);
                if ready {
                    self.perform_dynamic_import(url, deferred);
                } else {
                    self.fetch_waiters.push(FetchWaiter {
                        paths: vec![url.clone()],
                        task: Task::DynamicImport { url, deferred },
                    });
                }
            }
        }
    }

    /// Polls outstanding fetches and drains ready continuations. Returns
    /// true when any progress was made.
    pub fn pump(&mut self) -> bool {
        let mut progressed = false;
        let mut still_pending = Vec::new();
        for (url, rx) in self.pending_fetches.drain(..) {
            match rx.try_recv() {
                Ok(Ok(text)) => {
                    self.modules.set_source(url, text);
                    progressed = true;
                }
                Ok(Err(message)) => {
                    self.failed_fetches.insert(url, message);
                    progressed = true;
                }
                Err(_) => still_pending.push((url, rx)),
            }
        }
        self.pending_fetches = still_pending;

        let mut waiting = Vec::new();
        for waiter in std::mem::take(&mut self.fetch_waiters) {
            let failed = waiter
                .paths
                .iter()
                .find_map(|path| self.failed_fetches.get(path).cloned());
            if let Some(message) = failed {
                progressed = true;
                let error = self.make_error(ErrorKind::Error, &message);
                match waiter.task {
                    Task::Drive(mut co) => {
                        co.resume = ResumeWith::Throw(error);
                        self.macro_tasks.push_back(Task::Drive(co));
                    }
                    Task::DynamicImport { deferred, .. } => {
                        self.settle_deferred(&deferred, Err(error));
                    }
                    Task::RunUnit(_) => {}
                }
            } else if self.modules.all_available(&waiter.paths) {
                progressed = true;
                self.macro_tasks.push_back(waiter.task);
            } else {
                waiting.push(waiter);
            }
        }
        self.fetch_waiters = waiting;

        if !self.macro_tasks.is_empty() && !self.is_paused() {
            progressed = true;
        }
        run_task_queue(self);
        progressed
    }

    // =========================================================================
    // Breakpoints
    // =========================================================================

    /// Registers a breakpoint near (line, column), searching forward up to
    /// 50 lines and 200 columns for the nearest instrumentation point.
    pub fn set_breakpoint(
        &mut self,
        unit: &str,
        line: u32,
        column: Option<u32>,
        condition: Option<&str>,
    ) -> Option<Breakpoint> {
        let index = self.units.get(unit).map(|unit| unit.line_index.clone())?;
        let hit = BreakpointRegistry::find_near(&index, line, column)?;
        let condition = match condition {
            Some(expr) => Condition::Expr(expr.to_string()),
            None => Condition::Always,
        };
        self.breakpoints.register(hit.id, condition);
        Some(hit)
    }

    /// Removes a breakpoint by id.
    pub fn remove_breakpoint(&mut self, id: u32) -> bool {
        self.breakpoints.remove(id)
    }

    /// Enables or disables all breakpoints.
    pub fn set_breakpoints_active(&mut self, active: bool) -> bool {
        self.breakpoints.set_active(active)
    }

    /// Arms or clears the single-shot pause on the next statement.
    pub fn set_pause_on_next(&mut self, pause: bool) -> bool {
        self.breakpoints.set_pause_next(pause)
    }

    /// Enables or disables converting uncaught throws into pauses.
    pub fn set_pause_on_exception(&mut self, pause: bool) -> bool {
        self.breakpoints.set_pause_on_exception(pause)
    }

    /// Every instrumentation point of a unit.
    #[must_use]
    pub fn possible_breakpoints(&self, unit: &str) -> Option<Vec<Breakpoint>> {
        let unit = self.units.get(unit)?;
        let mut out = Vec::new();
        for (&line, columns) in &unit.line_index {
            for (&column, &id) in columns {
                out.push(Breakpoint { id, line, column });
            }
        }
        Some(out)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// The live pause payload, if any.
    #[must_use]
    pub fn paused_info(&self) -> Option<&PausedState> {
        self.paused.as_ref().map(|run| &run.state)
    }

    /// Snapshot of the current scope chain, outermost first.
    #[must_use]
    pub fn scope_chain(&self) -> Vec<FrameSnapshot> {
        self.frames.snapshot()
    }

    /// Source text of a loaded unit.
    #[must_use]
    pub fn script_content(&self, unit: &str) -> Option<String> {
        self.units.get(unit).map(|unit| unit.source.clone())
    }

    // =========================================================================
    // Scoped overrides
    // =========================================================================

    /// Runs work with the sandbox bridge deactivated, restoring the
    /// previous state afterwards.
    pub fn run_in_native_env<T>(&mut self, work: impl FnOnce(&mut Self) -> T) -> T {
        let previous = self.sandbox_active;
        self.set_sandbox(false);
        let out = work(self);
        self.set_sandbox(previous);
        out
    }

    /// Runs work with every debugging concern skipped, restoring the
    /// previous state afterwards.
    pub fn run_skipping_debugger<T>(&mut self, work: impl FnOnce(&mut Self) -> T) -> T {
        let previous = self.skip;
        self.skip = true;
        let out = work(self);
        self.skip = previous;
        out
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Registers a notification listener.
    pub fn set_event_sender(&mut self, sender: Sender<EngineEvent>) {
        self.events.push(sender);
    }

    pub(crate) fn emit(&mut self, event: EngineEvent) {
        self.events.retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub(crate) fn set_sandbox(&mut self, active: bool) {
        if self.sandbox_active != active {
            self.sandbox_active = active;
            self.emit(EngineEvent::SandboxStateChanged(active));
        }
    }

    /// Builds an error value of the given kind.
    pub(crate) fn make_error(&mut self, kind: ErrorKind, message: &str) -> Value {
        self.realm.make_error(kind, message)
    }

    /// Reconstructs a call stack for an uncaught error, attaches the
    /// formatted stack trace, and publishes the `error` notification once
    /// (guarded by the surfaced marker on the error object).
    pub(crate) fn surface_uncaught(&mut self, error: &Value) -> bool {
        let Value::Object(obj) = error else {
            return false;
        };
        if obj.own(crate::value::K_SURFACED).is_some() {
            return false;
        }
        let frames = self.frames.snapshot_with_last_popped();
        let name = obj.get_data("name");
        let message = obj.get_data("message");
        if let Value::Str(name) = &name {
            let mut lines = vec![format!(
                "{name}: {}",
                crate::value::to_display_string(&message)
            )];
            for frame in frames
                .iter()
                .filter(|frame| frame.name.is_some() && frame.call_site.is_some())
                .rev()
            {
                let site = frame.call_site.clone().unwrap_or(crate::frames::CallSite {
                    unit: SmolStr::default(),
                    line: 0,
                    column: 0,
                });
                lines.push(format!(
                    "    at {} ({}:{}:{})",
                    frame.name.as_deref().unwrap_or("(anonymous)"),
                    site.unit,
                    site.line,
                    site.column
                ));
            }
            obj.set("stack", Value::str(lines.join("\n")));
        }
        obj.set(SmolStr::new(crate::value::K_SURFACED), Value::Bool(true));
        tracing::debug!(
            target: "stride::error",
            "uncaught: {}",
            crate::value::to_display_string(error)
        );
        self.emit(EngineEvent::Error {
            error: error.clone(),
            frames,
        });
        true
    }

    /// Truthiness of an expression evaluated in the current frame; used by
    /// breakpoint conditions.
    #[allow(dead_code)]
    pub(crate) fn eval_condition(&mut self, expression: &str) -> bool {
        self.evaluate_in_frame(expression, None)
            .is_some_and(|value| truthy(&value))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
