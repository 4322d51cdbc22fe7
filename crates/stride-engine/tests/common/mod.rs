#![allow(dead_code)]

use std::sync::mpsc::{channel, Receiver};

use stride_engine::{
    to_display_string, to_number, truthy, Engine, EngineEvent, PausedState, RunOutcome, Value,
};

/// Opt-in tracing for debugging test runs: set `STRIDE_TEST_LOG=1`.
fn init_tracing() {
    if std::env::var_os("STRIDE_TEST_LOG").is_some() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("stride=debug")
            .try_init();
    }
}

/// Engine plus a receiver for its notifications.
pub fn engine_with_events() -> (Engine, Receiver<EngineEvent>) {
    init_tracing();
    let mut engine = Engine::new();
    let (tx, rx) = channel();
    engine.set_event_sender(tx);
    (engine, rx)
}

/// Transforms and runs a script under the given unit id.
pub fn load_and_run(engine: &mut Engine, source: &str, id: &str) -> RunOutcome {
    let handle = engine
        .transform_and_load(source, Some(id))
        .expect("transform failed");
    handle.run(engine)
}

/// Evaluates an expression at top level and returns it as a number.
pub fn eval_number(engine: &mut Engine, expr: &str) -> f64 {
    let value = engine
        .evaluate_in_frame(expr, None)
        .unwrap_or_else(|| panic!("evaluation of '{expr}' failed"));
    to_number(&value)
}

/// Evaluates an expression at top level and returns its display string.
pub fn eval_string(engine: &mut Engine, expr: &str) -> String {
    let value = engine
        .evaluate_in_frame(expr, None)
        .unwrap_or_else(|| panic!("evaluation of '{expr}' failed"));
    to_display_string(&value)
}

/// Evaluates an expression at top level as a boolean.
pub fn eval_bool(engine: &mut Engine, expr: &str) -> bool {
    let value = engine
        .evaluate_in_frame(expr, None)
        .unwrap_or_else(|| panic!("evaluation of '{expr}' failed"));
    truthy(&value)
}

/// The current pause payload, cloned.
pub fn paused(engine: &Engine) -> PausedState {
    engine.paused_info().expect("expected a live pause").clone()
}

/// Unwraps a completed run's value.
pub fn completed(outcome: RunOutcome) -> Value {
    match outcome {
        RunOutcome::Completed(value) => value,
        other => panic!("expected completion, got {other:?}"),
    }
}

/// Drains every event received so far.
pub fn drain(rx: &Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
