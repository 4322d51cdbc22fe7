//! Higher-order builtins drive instrumented callbacks through the
//! scheduler while the bridge is active.

mod common;

use common::{completed, drain, engine_with_events, eval_number, eval_string, load_and_run, paused};
use stride_engine::{EngineEvent, RunOutcome};

#[test]
fn map_with_an_instrumented_callback_pauses_per_element() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"window.out = [1, 2, 3].map(function (v) {
  let d = v * 2;
  return d;
});
"#;
    let handle = engine
        .transform_and_load(source, Some("map.js"))
        .expect("transform failed");
    engine
        .set_breakpoint("map.js", 2, None, None)
        .expect("breakpoint not resolved");

    let outcome = handle.run(&mut engine);
    assert!(matches!(outcome, RunOutcome::Paused));

    let mut seen = Vec::new();
    while engine.is_paused() {
        assert_eq!(paused(&engine).line, 2);
        seen.push(eval_number(&mut engine, "v"));
        assert!(engine.resume(None));
    }
    assert_eq!(seen, vec![1.0, 2.0, 3.0], "one pause per element, in order");
    assert_eq!(eval_string(&mut engine, "window.out.join(',')"), "2,4,6");
}

#[test]
fn bridged_iteration_matches_native_results() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
const input = [1, 2, 3, 4];
window.mapped = input.map(function (v) { return v + 1; }).join(',');
window.filtered = input.filter(function (v) { return v % 2 === 0; }).join(',');
window.sum = input.reduce(function (acc, v) { return acc + v; }, 0);
window.sumNoInit = input.reduce(function (acc, v) { return acc + v; });
window.found = input.find(function (v) { return v > 2; });
window.foundAt = input.findIndex(function (v) { return v > 2; });
window.any = input.some(function (v) { return v === 4; });
window.all = input.every(function (v) { return v > 0; });
window.flat = [1, [2, 3]].flatMap(function (v) { return v; }).join(',');
window.each = 0;
input.forEach(function (v) { window.each = window.each + v; });
"#;
    completed(load_and_run(&mut engine, source, "iter.js"));
    assert_eq!(eval_string(&mut engine, "window.mapped"), "2,3,4,5");
    assert_eq!(eval_string(&mut engine, "window.filtered"), "2,4");
    assert_eq!(eval_number(&mut engine, "window.sum"), 10.0);
    assert_eq!(eval_number(&mut engine, "window.sumNoInit"), 10.0);
    assert_eq!(eval_number(&mut engine, "window.found"), 3.0);
    assert_eq!(eval_number(&mut engine, "window.foundAt"), 2.0);
    assert_eq!(eval_string(&mut engine, "window.any"), "true");
    assert_eq!(eval_string(&mut engine, "window.all"), "true");
    assert_eq!(eval_string(&mut engine, "window.flat"), "1,2,3");
    assert_eq!(eval_number(&mut engine, "window.each"), 10.0);
}

#[test]
fn sort_with_an_instrumented_comparator_is_stable_and_ordered() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
window.items = [
  { k: 3, tag: 'a' },
  { k: 1, tag: 'b' },
  { k: 3, tag: 'c' },
  { k: 2, tag: 'd' },
  { k: 1, tag: 'e' }
];
window.items.sort(function (x, y) { return x.k - y.k; });
window.order = window.items.map(function (it) { return it.tag; }).join('');
"#;
    completed(load_and_run(&mut engine, source, "sort.js"));
    // Equal keys keep their original relative order.
    assert_eq!(eval_string(&mut engine, "window.order"), "bedac");
}

#[test]
fn sort_remains_pausable_inside_the_comparator() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"window.arr = [4, 2, 5, 1, 3];
window.arr.sort(function (a, b) {
  let d = a - b;
  return d;
});
"#;
    let handle = engine
        .transform_and_load(source, Some("sortpause.js"))
        .expect("transform failed");
    engine
        .set_breakpoint("sortpause.js", 3, None, None)
        .expect("breakpoint not resolved");
    let _ = handle.run(&mut engine);
    let mut pauses = 0;
    while engine.is_paused() {
        pauses += 1;
        assert!(engine.resume(None));
        assert!(pauses < 64, "comparator pause never released");
    }
    assert!(pauses > 0, "expected comparator pauses");
    assert_eq!(eval_string(&mut engine, "window.arr.join(',')"), "1,2,3,4,5");
}

#[test]
fn replace_with_an_instrumented_callback() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
window.one = 'a-b-c'.replace('-', function (m, at) { return '[' + at + ']'; });
window.all = 'a-b-c'.replaceAll('-', function (m) { return '+'; });
"#;
    completed(load_and_run(&mut engine, source, "replace.js"));
    assert_eq!(eval_string(&mut engine, "window.one"), "a[1]b-c");
    assert_eq!(eval_string(&mut engine, "window.all"), "a+b+c");
}

#[test]
fn array_from_with_an_instrumented_mapper() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
window.doubled = Array.from([1, 2, 3], function (v) { return v * 2; }).join(',');
window.chars = Array.from('ab').join('-');
"#;
    completed(load_and_run(&mut engine, source, "from.js"));
    assert_eq!(eval_string(&mut engine, "window.doubled"), "2,4,6");
    assert_eq!(eval_string(&mut engine, "window.chars"), "a-b");
}

#[test]
fn native_callbacks_fall_through_to_the_native_builtin() {
    let (mut engine, _rx) = engine_with_events();
    let source = "window.floored = [1.5, 2.7].map(Math.floor).join(',');";
    completed(load_and_run(&mut engine, source, "native.js"));
    assert_eq!(eval_string(&mut engine, "window.floored"), "1,2");
}

#[test]
fn bridge_activation_is_published_around_execution() {
    let (mut engine, rx) = engine_with_events();
    completed(load_and_run(&mut engine, "window.z = 1;", "events.js"));
    let events = drain(&rx);
    let flips: Vec<bool> = events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::SandboxStateChanged(active) => Some(*active),
            _ => None,
        })
        .collect();
    assert!(flips.first() == Some(&true), "bridge activates at run start");
    assert!(flips.last() == Some(&false), "bridge deactivates at completion");
}

#[test]
fn run_in_native_env_deactivates_the_bridge_and_restores_it() {
    let (mut engine, rx) = engine_with_events();
    let out = engine.run_in_native_env(|engine| {
        completed(load_and_run(engine, "window.native = 1;", "nat.js"));
        true
    });
    assert!(out);
    assert_eq!(eval_number(&mut engine, "window.native"), 1.0);
    drop(rx);
}
