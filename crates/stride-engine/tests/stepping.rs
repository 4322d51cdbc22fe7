//! Step-into / step-over / step-out semantics.

mod common;

use common::{engine_with_events, eval_number, paused};
use stride_engine::{RunOutcome, StepMode};

const SOURCE: &str = r#"function inc(v) {
  let r = v + 1;
  return r;
}
window.a = inc(1);
window.b = inc(window.a);
window.c = 3;
"#;

fn run_to_first_pause(engine: &mut stride_engine::Engine, line: u32) {
    let handle = engine
        .transform_and_load(SOURCE, Some("step.js"))
        .expect("transform failed");
    engine
        .set_breakpoint("step.js", line, None, None)
        .expect("breakpoint not resolved");
    let outcome = handle.run(engine);
    assert!(matches!(outcome, RunOutcome::Paused));
}

#[test]
fn step_into_pauses_on_the_callee_first_statement() {
    let (mut engine, _rx) = engine_with_events();
    run_to_first_pause(&mut engine, 5);
    assert_eq!(paused(&engine).line, 5);

    assert!(engine.resume(Some(StepMode::Into)));
    let state = paused(&engine);
    assert_eq!(state.line, 2, "expected to stop inside inc");
    // Callee locals are visible to the frame evaluator.
    assert_eq!(eval_number(&mut engine, "v"), 1.0);

    while engine.is_paused() {
        assert!(engine.resume(None));
    }
    assert_eq!(eval_number(&mut engine, "window.c"), 3.0);
}

#[test]
fn step_over_does_not_stop_inside_the_callee() {
    let (mut engine, _rx) = engine_with_events();
    run_to_first_pause(&mut engine, 5);

    assert!(engine.resume(Some(StepMode::Over)));
    let state = paused(&engine);
    assert_eq!(state.line, 6, "expected the next caller statement");
    assert_eq!(eval_number(&mut engine, "window.a"), 2.0);

    while engine.is_paused() {
        assert!(engine.resume(None));
    }
    assert_eq!(eval_number(&mut engine, "window.c"), 3.0);
}

#[test]
fn step_out_skips_the_rest_of_the_callee() {
    let (mut engine, _rx) = engine_with_events();
    run_to_first_pause(&mut engine, 2);
    let state = paused(&engine);
    assert_eq!(state.line, 2, "breakpoint inside inc");

    assert!(engine.resume(Some(StepMode::Out)));
    let state = paused(&engine);
    // Control returned to the caller before pausing again.
    assert_eq!(state.line, 6);
    assert_eq!(eval_number(&mut engine, "window.a"), 2.0);

    while engine.is_paused() {
        assert!(engine.resume(None));
    }
    assert_eq!(eval_number(&mut engine, "window.c"), 3.0);
}

#[test]
fn plain_resume_runs_to_the_next_breakpoint_only() {
    let (mut engine, _rx) = engine_with_events();
    let handle = engine
        .transform_and_load(SOURCE, Some("plain.js"))
        .expect("transform failed");
    engine
        .set_breakpoint("plain.js", 5, None, None)
        .expect("breakpoint not resolved");
    engine
        .set_breakpoint("plain.js", 7, None, None)
        .expect("breakpoint not resolved");

    let _ = handle.run(&mut engine);
    assert_eq!(paused(&engine).line, 5);
    assert!(engine.resume(None));
    assert_eq!(paused(&engine).line, 7);
    assert!(engine.resume(None));
    assert!(engine.paused_info().is_none());
}

#[test]
fn stepping_state_snapshots_use_increasing_frame_ids() {
    let (mut engine, _rx) = engine_with_events();
    run_to_first_pause(&mut engine, 2);
    let state = paused(&engine);
    let named: Vec<_> = state
        .frames
        .iter()
        .filter(|frame| frame.name.is_some())
        .collect();
    assert!(named.len() >= 2, "global frame plus inc frame");
    assert!(named.windows(2).all(|pair| pair[0].id < pair[1].id));
    while engine.is_paused() {
        assert!(engine.resume(None));
    }
}
