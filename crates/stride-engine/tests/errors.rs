//! Uncaught-error surfacing, synthesized stacks, and exception pauses.

mod common;

use common::{completed, drain, engine_with_events, eval_number, eval_string, load_and_run, paused};
use stride_engine::{to_display_string, EngineEvent, PauseReason, RunOutcome, Value};

const NESTED: &str = r#"function inner() {
  missingName;
}
function outer() {
  inner();
}
outer();
"#;

fn error_events(events: &[EngineEvent]) -> Vec<(Value, usize)> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Error { error, frames } => Some((error.clone(), frames.len())),
            _ => None,
        })
        .collect()
}

#[test]
fn uncaught_errors_carry_a_reconstructed_stack() {
    let (mut engine, rx) = engine_with_events();
    let outcome = load_and_run(&mut engine, NESTED, "err.js");
    assert!(matches!(outcome, RunOutcome::Failed(_)));

    let events = drain(&rx);
    let errors = error_events(&events);
    assert_eq!(errors.len(), 1, "the error surfaces exactly once");

    let (error, frame_count) = &errors[0];
    assert!(*frame_count >= 2, "scope chain includes the popped frame");
    let stack = match error {
        Value::Object(obj) => to_display_string(&obj.get_data("stack")),
        other => panic!("expected an error object, got {other:?}"),
    };
    let lines: Vec<&str> = stack.lines().collect();
    assert_eq!(lines[0], "ReferenceError: missingName is not defined");
    assert!(lines[1].contains("at inner (err.js:2:"), "innermost first: {stack}");
    assert!(lines[2].contains("at outer (err.js:5:"), "then the caller: {stack}");
    assert!(lines[3].contains("at (global) (err.js:7:"), "then the top level: {stack}");
}

#[test]
fn script_caught_errors_do_not_surface() {
    let (mut engine, rx) = engine_with_events();
    let source = r#"
window.msg = '';
try {
  missingName;
} catch (err) {
  window.msg = err.name;
}
"#;
    completed(load_and_run(&mut engine, source, "caught.js"));
    assert_eq!(eval_string(&mut engine, "window.msg"), "ReferenceError");
    assert!(error_events(&drain(&rx)).is_empty());
}

#[test]
fn rethrown_errors_surface_only_once() {
    let (mut engine, rx) = engine_with_events();
    let source = r#"
function thrower() {
  throw new Error('once');
}
function relay() {
  thrower();
}
relay();
"#;
    let outcome = load_and_run(&mut engine, source, "once.js");
    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_eq!(error_events(&drain(&rx)).len(), 1);
}

#[test]
fn pause_on_exception_converts_the_throw_into_a_pause() {
    let (mut engine, rx) = engine_with_events();
    let source = "window.before = 1;\nmissingName;\nwindow.after = 2;";
    let handle = engine
        .transform_and_load(source, Some("exc.js"))
        .expect("transform failed");
    engine.set_pause_on_exception(true);

    let outcome = handle.run(&mut engine);
    assert!(matches!(outcome, RunOutcome::Paused));
    let state = paused(&engine);
    assert_eq!(state.reason, PauseReason::Exception);
    assert_eq!(state.unit.as_str(), "exc.js");
    assert_eq!(state.line, 2);
    assert!(state.data.is_some(), "the thrown error rides on the pause");
    // Effects before the throw are intact.
    assert_eq!(eval_number(&mut engine, "window.before"), 1.0);

    // Resuming re-throws rather than continuing.
    assert!(engine.resume(None));
    assert!(engine.paused_info().is_none());
    assert_eq!(eval_string(&mut engine, "typeof window.after"), "undefined");

    let events = drain(&rx);
    assert_eq!(error_events(&events).len(), 1);
    assert!(events
        .iter()
        .any(|event| matches!(event, EngineEvent::Paused(state) if state.reason == PauseReason::Exception)));
    engine.set_pause_on_exception(false);
}

#[test]
fn thrown_values_propagate_with_script_semantics() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
window.kinds = [];
function classify(thrown) {
  try {
    throw thrown;
  } catch (err) {
    window.kinds.push(typeof err);
  }
}
classify(1);
classify('text');
classify({ custom: true });
"#;
    completed(load_and_run(&mut engine, source, "kinds.js"));
    assert_eq!(
        eval_string(&mut engine, "window.kinds.join(',')"),
        "number,string,object"
    );
}

#[test]
fn finally_runs_during_unwinding() {
    let (mut engine, rx) = engine_with_events();
    let source = r#"
window.cleanup = 0;
function work() {
  try {
    throw new Error('stop');
  } finally {
    window.cleanup = window.cleanup + 1;
  }
}
work();
"#;
    let outcome = load_and_run(&mut engine, source, "cleanup.js");
    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_eq!(eval_number(&mut engine, "window.cleanup"), 1.0);
    assert_eq!(error_events(&drain(&rx)).len(), 1);
}

#[test]
fn transform_failures_abort_loading() {
    let (mut engine, _rx) = engine_with_events();
    assert!(engine
        .transform_and_load("export * from 'other.js';", Some("bad.js"))
        .is_err());
    assert!(engine.transform_and_load("let = ;", Some("bad2.js")).is_err());
}
