//! Precompiled payload round-trips.

mod common;

use common::{completed, engine_with_events, eval_number, load_and_run, paused};
use stride_engine::{Engine, RunOutcome, PRECOMPILED_MARK};

const SOURCE: &str = "window.x = 1;\nwindow.x = 2;\nwindow.x = 3;";

#[test]
fn payloads_carry_the_marker_and_are_idempotent() {
    let mut engine = Engine::new();
    let payload = engine
        .precompile(SOURCE, Some("pre.js"))
        .expect("precompile failed");
    assert!(payload.starts_with(PRECOMPILED_MARK));

    let again = engine
        .precompile(&payload, Some("ignored.js"))
        .expect("re-precompile failed");
    assert_eq!(payload, again);
}

#[test]
fn loading_a_payload_matches_live_transformation() {
    let (mut source_engine, _rx) = engine_with_events();
    let payload = source_engine
        .precompile(SOURCE, Some("pre.js"))
        .expect("precompile failed");

    // A fresh engine loads the payload and hits the same positions.
    let (mut engine, _rx) = engine_with_events();
    let handle = engine
        .transform_and_load(&payload, None)
        .expect("payload load failed");
    assert_eq!(handle.unit(), "pre.js", "the payload's identity wins");
    let hit = engine
        .set_breakpoint("pre.js", 2, None, None)
        .expect("breakpoint not resolved");
    assert_eq!(hit.line, 2);

    let outcome = handle.run(&mut engine);
    assert!(matches!(outcome, RunOutcome::Paused));
    let state = paused(&engine);
    assert_eq!(state.line, 2);
    assert_eq!(eval_number(&mut engine, "window.x"), 1.0);
    assert!(engine.resume(None));
    assert_eq!(eval_number(&mut engine, "window.x"), 3.0);
}

#[test]
fn payloads_preserve_registered_debugger_breakpoints() {
    let mut source_engine = Engine::new();
    let payload = source_engine
        .precompile("window.y = 1;\ndebugger;\nwindow.y = 2;", Some("dbg.js"))
        .expect("precompile failed");

    let (mut engine, _rx) = engine_with_events();
    let handle = engine
        .transform_and_load(&payload, None)
        .expect("payload load failed");
    let _ = handle.run(&mut engine);
    let state = paused(&engine);
    assert_eq!(state.line, 2, "the debugger statement still pauses");
    assert!(engine.resume(None));
    assert_eq!(eval_number(&mut engine, "window.y"), 2.0);
}

#[test]
fn fresh_ids_do_not_collide_with_payload_ids() {
    let mut source_engine = Engine::new();
    let payload = source_engine
        .precompile(SOURCE, Some("pre.js"))
        .expect("precompile failed");

    let (mut engine, _rx) = engine_with_events();
    engine
        .transform_and_load(&payload, None)
        .expect("payload load failed");
    // Transforming more source afterwards must allocate ids above the
    // payload's, so both stay addressable.
    engine
        .transform_and_load("window.z = 1;\nwindow.z = 2;", Some("later.js"))
        .expect("transform failed");
    let a = engine
        .possible_breakpoints("pre.js")
        .expect("unknown unit");
    let b = engine
        .possible_breakpoints("later.js")
        .expect("unknown unit");
    let max_a = a.iter().map(|bp| bp.id).max().unwrap_or(0);
    let min_b = b.iter().map(|bp| bp.id).min().unwrap_or(0);
    assert!(min_b > max_a, "fresh ids continue above payload ids");
}

#[test]
fn completed_payload_runs_produce_identical_state() {
    let (mut live, _rx) = engine_with_events();
    completed(load_and_run(&mut live, SOURCE, "live.js"));
    let live_x = eval_number(&mut live, "window.x");

    let mut precompiler = Engine::new();
    let payload = precompiler
        .precompile(SOURCE, Some("payload.js"))
        .expect("precompile failed");
    let (mut loaded, _rx) = engine_with_events();
    let handle = loaded
        .transform_and_load(&payload, None)
        .expect("payload load failed");
    completed(handle.run(&mut loaded));
    assert_eq!(eval_number(&mut loaded, "window.x"), live_x);
}
