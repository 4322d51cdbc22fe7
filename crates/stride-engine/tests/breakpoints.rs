//! Breakpoint registration, matching, and pause payloads.

mod common;

use common::{completed, drain, engine_with_events, eval_number, eval_string, paused};
use stride_engine::{EngineEvent, PauseReason, RunOutcome};

#[test]
fn pauses_at_the_requested_line_with_prior_effects_applied() {
    let (mut engine, rx) = engine_with_events();
    let handle = engine
        .transform_and_load("window.x = 1;\nwindow.x = 2;\nwindow.x = 3;", Some("bp.js"))
        .expect("transform failed");
    let hit = engine
        .set_breakpoint("bp.js", 2, None, None)
        .expect("breakpoint not resolved");
    assert_eq!(hit.line, 2);

    let outcome = handle.run(&mut engine);
    assert!(matches!(outcome, RunOutcome::Paused));
    let state = paused(&engine);
    assert_eq!(state.line, 2);
    assert_eq!(state.unit.as_str(), "bp.js");
    assert_eq!(state.reason, PauseReason::Breakpoint);
    assert_eq!(state.breakpoint_id, Some(hit.id));
    assert!(state.source.contains("window.x = 2;"));
    assert!(!state.frames.is_empty());
    assert_eq!(eval_number(&mut engine, "window.x"), 1.0);

    assert!(engine.resume(None));
    assert!(engine.paused_info().is_none());
    assert_eq!(eval_number(&mut engine, "window.x"), 3.0);

    let events = drain(&rx);
    assert!(events
        .iter()
        .any(|event| matches!(event, EngineEvent::Paused(state) if state.line == 2)));
    assert!(events.iter().any(|event| matches!(event, EngineEvent::Resumed)));
}

#[test]
fn breakpoint_search_snaps_forward_to_the_next_statement() {
    let (mut engine, _rx) = engine_with_events();
    let source = "window.a = 1;\n\n// nothing on this line\n\nwindow.b = 2;";
    let handle = engine
        .transform_and_load(source, Some("snap.js"))
        .expect("transform failed");
    let hit = engine
        .set_breakpoint("snap.js", 2, None, None)
        .expect("breakpoint not resolved");
    assert_eq!(hit.line, 5);

    let _ = handle.run(&mut engine);
    assert_eq!(paused(&engine).line, 5);
    assert!(engine.resume(None));
}

#[test]
fn conditional_breakpoints_evaluate_in_the_paused_frame() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
window.hits = [];
for (let i = 0; i < 5; i++) {
  window.hits.push(i);
}
window.done = true;
"#;
    let handle = engine
        .transform_and_load(source, Some("cond.js"))
        .expect("transform failed");
    engine
        .set_breakpoint("cond.js", 4, None, Some("i === 3"))
        .expect("breakpoint not resolved");

    let _ = handle.run(&mut engine);
    let state = paused(&engine);
    assert_eq!(state.line, 4);
    // The loop variable is visible to the frame evaluator at the pause.
    assert_eq!(eval_number(&mut engine, "i"), 3.0);
    assert_eq!(eval_string(&mut engine, "window.hits.join(',')"), "0,1,2");
    assert!(engine.resume(None));
    assert_eq!(eval_string(&mut engine, "window.hits.join(',')"), "0,1,2,3,4");
}

#[test]
fn log_points_never_pause() {
    let (mut engine, _rx) = engine_with_events();
    let source = "window.n = 1;\nwindow.n = 2;";
    let handle = engine
        .transform_and_load(source, Some("log.js"))
        .expect("transform failed");
    let condition = format!("{}window.n", stride_engine::LOG_POINT_TAG);
    engine
        .set_breakpoint("log.js", 2, None, Some(&condition))
        .expect("breakpoint not resolved");
    completed(handle.run(&mut engine));
    assert_eq!(eval_number(&mut engine, "window.n"), 2.0);
}

#[test]
fn removed_and_disabled_breakpoints_do_not_pause() {
    let (mut engine, _rx) = engine_with_events();
    let source = "window.v = 1;\nwindow.v = 2;";
    let handle = engine
        .transform_and_load(source, Some("toggle.js"))
        .expect("transform failed");
    let hit = engine
        .set_breakpoint("toggle.js", 2, None, None)
        .expect("breakpoint not resolved");

    assert!(engine.remove_breakpoint(hit.id));
    assert!(!engine.remove_breakpoint(hit.id));
    completed(handle.run(&mut engine));

    let handle = engine
        .transform_and_load(source, Some("toggle2.js"))
        .expect("transform failed");
    engine
        .set_breakpoint("toggle2.js", 2, None, None)
        .expect("breakpoint not resolved");
    engine.set_breakpoints_active(false);
    completed(handle.run(&mut engine));
    engine.set_breakpoints_active(true);
}

#[test]
fn pause_on_next_statement_is_single_shot() {
    let (mut engine, _rx) = engine_with_events();
    let handle = engine
        .transform_and_load("window.p = 1;\nwindow.p = 2;", Some("next.js"))
        .expect("transform failed");
    engine.set_pause_on_next(true);
    let _ = handle.run(&mut engine);
    let state = paused(&engine);
    assert_eq!(state.line, 1);
    assert!(engine.resume(None));
    assert_eq!(eval_number(&mut engine, "window.p"), 2.0);
}

#[test]
fn debugger_statements_register_their_own_breakpoints() {
    let (mut engine, _rx) = engine_with_events();
    let source = "window.d = 1;\ndebugger;\nwindow.d = 2;";
    let handle = engine
        .transform_and_load(source, Some("dbg.js"))
        .expect("transform failed");
    let _ = handle.run(&mut engine);
    let state = paused(&engine);
    assert_eq!(state.line, 2);
    assert_eq!(eval_number(&mut engine, "window.d"), 1.0);
    assert!(engine.resume(None));
    assert_eq!(eval_number(&mut engine, "window.d"), 2.0);
}

#[test]
fn possible_breakpoints_lists_every_statement_position() {
    let (mut engine, _rx) = engine_with_events();
    engine
        .transform_and_load("window.a = 1;\nwindow.b = 2;", Some("list.js"))
        .expect("transform failed");
    let points = engine
        .possible_breakpoints("list.js")
        .expect("unknown unit");
    let lines: Vec<u32> = points.iter().map(|bp| bp.line).collect();
    assert!(lines.contains(&1));
    assert!(lines.contains(&2));
    assert!(engine.possible_breakpoints("nope.js").is_none());
}

#[test]
fn a_second_run_queues_behind_a_live_pause() {
    let (mut engine, _rx) = engine_with_events();
    let first = engine
        .transform_and_load("window.first = 1;\nwindow.first = 2;", Some("one.js"))
        .expect("transform failed");
    engine
        .set_breakpoint("one.js", 2, None, None)
        .expect("breakpoint not resolved");
    let second = engine
        .transform_and_load("window.second = true;", Some("two.js"))
        .expect("transform failed");

    assert!(matches!(first.run(&mut engine), RunOutcome::Paused));
    // The queued unit must not have evaluated yet.
    assert!(matches!(second.run(&mut engine), RunOutcome::Queued));
    assert_eq!(eval_string(&mut engine, "typeof window.second"), "undefined");

    assert!(engine.resume(None));
    assert_eq!(eval_number(&mut engine, "window.first"), 2.0);
    assert_eq!(eval_string(&mut engine, "window.second"), "true");
}

#[test]
fn resume_without_a_pause_returns_false() {
    let (mut engine, _rx) = engine_with_events();
    assert!(!engine.resume(None));
    assert!(engine.paused_info().is_none());
}
