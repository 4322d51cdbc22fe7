//! Instrumented execution preserves the observable semantics of the
//! un-instrumented program.

mod common;

use common::{completed, engine_with_events, eval_bool, eval_number, eval_string, load_and_run};
use stride_engine::Engine;

#[test]
fn assignments_take_effect_in_order() {
    let (mut engine, _rx) = engine_with_events();
    let outcome = load_and_run(&mut engine, "window.x = 1;\nwindow.x = 2;\nwindow.x = 3;", "a.js");
    completed(outcome);
    assert_eq!(eval_number(&mut engine, "window.x"), 3.0);
}

#[test]
fn functions_closures_and_arguments() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
function makeCounter(start) {
  let count = start;
  return function () {
    count = count + 1;
    return count;
  };
}
const tick = makeCounter(10);
tick();
tick();
window.count = tick();
"#;
    completed(load_and_run(&mut engine, source, "counter.js"));
    assert_eq!(eval_number(&mut engine, "window.count"), 13.0);
}

#[test]
fn default_parameters_apply_only_when_missing() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
function pad(text, fill = '-') {
  return text + fill;
}
window.a = pad('x');
window.b = pad('x', '+');
"#;
    completed(load_and_run(&mut engine, source, "defaults.js"));
    assert_eq!(eval_string(&mut engine, "window.a"), "x-");
    assert_eq!(eval_string(&mut engine, "window.b"), "x+");
}

#[test]
fn loops_with_break_and_continue() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
let total = 0;
for (let i = 0; i < 10; i++) {
  if (i === 3) {
    continue;
  }
  if (i === 6) {
    break;
  }
  total = total + i;
}
window.total = total;
"#;
    completed(load_and_run(&mut engine, source, "loops.js"));
    // 0 + 1 + 2 + 4 + 5
    assert_eq!(eval_number(&mut engine, "window.total"), 12.0);
}

#[test]
fn while_and_do_while() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
let n = 0;
while (n < 5) {
  n++;
}
let m = 0;
do {
  m++;
} while (m < 3);
window.n = n;
window.m = m;
"#;
    completed(load_and_run(&mut engine, source, "while.js"));
    assert_eq!(eval_number(&mut engine, "window.n"), 5.0);
    assert_eq!(eval_number(&mut engine, "window.m"), 3.0);
}

#[test]
fn try_catch_finally_ordering() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
window.trace = [];
function risky(fail) {
  try {
    window.trace.push('try');
    if (fail) {
      throw new Error('boom');
    }
    return 'ok';
  } catch (err) {
    window.trace.push('catch');
    return 'caught';
  } finally {
    window.trace.push('finally');
  }
}
window.ok = risky(false);
window.bad = risky(true);
"#;
    completed(load_and_run(&mut engine, source, "try.js"));
    assert_eq!(eval_string(&mut engine, "window.ok"), "ok");
    assert_eq!(eval_string(&mut engine, "window.bad"), "caught");
    assert_eq!(
        eval_string(&mut engine, "window.trace.join(',')"),
        "try,finally,try,catch,finally"
    );
}

#[test]
fn classes_with_inheritance_and_super() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
class Shape {
  constructor(name) {
    this.name = name;
  }
  describe() {
    return this.name;
  }
}
class Circle extends Shape {
  constructor(radius) {
    super('circle');
    this.radius = radius;
  }
  area() {
    return 3 * this.radius * this.radius;
  }
}
const c = new Circle(2);
window.kind = c.describe();
window.area = c.area();
"#;
    completed(load_and_run(&mut engine, source, "classes.js"));
    assert_eq!(eval_string(&mut engine, "window.kind"), "circle");
    assert_eq!(eval_number(&mut engine, "window.area"), 12.0);
}

#[test]
fn constructor_return_override() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
function Box(v) {
  this.v = v;
  return { swapped: v };
}
function Plain(v) {
  this.v = v;
  return 42;
}
window.a = new Box(1).swapped;
window.b = new Plain(7).v;
"#;
    completed(load_and_run(&mut engine, source, "ctor.js"));
    assert_eq!(eval_number(&mut engine, "window.a"), 1.0);
    assert_eq!(eval_number(&mut engine, "window.b"), 7.0);
}

#[test]
fn update_and_compound_operators_on_members() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
window.o = { n: 1 };
window.first = window.o.n++;
window.o.n += 10;
++window.o.n;
window.arr = [5];
window.arr[0] *= 3;
"#;
    completed(load_and_run(&mut engine, source, "update.js"));
    assert_eq!(eval_number(&mut engine, "window.first"), 1.0);
    assert_eq!(eval_number(&mut engine, "window.o.n"), 13.0);
    assert_eq!(eval_number(&mut engine, "window.arr[0]"), 15.0);
}

#[test]
fn object_literals_delete_and_typeof() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
const key = 'dyn';
window.obj = { a: 1, 'b': 2, [key]: 3 };
delete window.obj.b;
window.hasB = typeof window.obj.b;
window.missing = typeof neverDeclared;
"#;
    completed(load_and_run(&mut engine, source, "objects.js"));
    assert_eq!(eval_number(&mut engine, "window.obj.a"), 1.0);
    assert_eq!(eval_number(&mut engine, "window.obj.dyn"), 3.0);
    assert_eq!(eval_string(&mut engine, "window.hasB"), "undefined");
    assert_eq!(eval_string(&mut engine, "window.missing"), "undefined");
}

#[test]
fn arrows_capture_this_lexically() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
window.host = {
  label: 'host',
  collect() {
    const grab = () => this.label;
    return grab();
  }
};
window.got = window.host.collect();
"#;
    completed(load_and_run(&mut engine, source, "arrows.js"));
    assert_eq!(eval_string(&mut engine, "window.got"), "host");
}

#[test]
fn inherited_setters_run_through_the_setter_routine() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
window.log = [];
const proto = {};
Object.defineProperty(proto, 'tracked', {
  get: function () { return this.backing; },
  set: function (v) { window.log.push(v); this.backing = v; }
});
const child = Object.create(proto);
child.tracked = 4;
child.tracked = 5;
window.result = child.tracked;
"#;
    completed(load_and_run(&mut engine, source, "setter.js"));
    assert_eq!(eval_string(&mut engine, "window.log.join(',')"), "4,5");
    assert_eq!(eval_number(&mut engine, "window.result"), 5.0);
}

#[test]
fn string_and_array_builtins() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
window.up = 'hello'.toUpperCase();
window.piece = 'one,two,three'.split(',')[1];
window.len = [1, 2, 3].length;
window.joined = [1, 2, 3].concat([4]).join('-');
window.found = 'abcdef'.indexOf('cd');
"#;
    completed(load_and_run(&mut engine, source, "builtins.js"));
    assert_eq!(eval_string(&mut engine, "window.up"), "HELLO");
    assert_eq!(eval_string(&mut engine, "window.piece"), "two");
    assert_eq!(eval_number(&mut engine, "window.len"), 3.0);
    assert_eq!(eval_string(&mut engine, "window.joined"), "1-2-3-4");
    assert_eq!(eval_number(&mut engine, "window.found"), 2.0);
}

#[test]
fn conditional_and_logical_operators_short_circuit() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
window.calls = 0;
function bump() {
  window.calls++;
  return true;
}
window.a = false && bump();
window.b = true || bump();
window.c = window.calls === 0 ? 'none' : 'some';
"#;
    completed(load_and_run(&mut engine, source, "logic.js"));
    assert!(!eval_bool(&mut engine, "window.a"));
    assert!(eval_bool(&mut engine, "window.b"));
    assert_eq!(eval_string(&mut engine, "window.c"), "none");
    assert_eq!(eval_number(&mut engine, "window.calls"), 0.0);
}

/// Differential property: a run that pauses and resumes along the way ends
/// in the same state as an undisturbed run of the same script.
#[test]
fn paused_and_resumed_run_matches_plain_run() {
    let source = r#"
window.acc = [];
function step(v) {
  window.acc.push(v * 2);
  return v * 2;
}
let total = 0;
for (let i = 1; i < 5; i++) {
  total = total + step(i);
}
window.total = total;
window.tag = window.acc.join(':');
"#;

    let (mut plain, _rx) = engine_with_events();
    completed(load_and_run(&mut plain, source, "diff.js"));
    let expected_total = eval_number(&mut plain, "window.total");
    let expected_tag = eval_string(&mut plain, "window.tag");

    let (mut debugged, _rx) = engine_with_events();
    let handle = debugged
        .transform_and_load(source, Some("diff.js"))
        .expect("transform failed");
    debugged
        .set_breakpoint("diff.js", 4, None, None)
        .expect("breakpoint not resolved");
    let _ = handle.run(&mut debugged);
    let mut pauses = 0;
    while debugged.is_paused() {
        pauses += 1;
        assert!(debugged.resume(None));
        if pauses > 32 {
            panic!("breakpoint never released");
        }
    }
    assert!(pauses >= 4, "expected one pause per loop iteration");
    assert_eq!(eval_number(&mut debugged, "window.total"), expected_total);
    assert_eq!(eval_string(&mut debugged, "window.tag"), expected_tag);
}

#[test]
fn skipping_debugger_override_restores_state() {
    let mut engine = Engine::new();
    let value = engine.run_skipping_debugger(|engine| {
        completed(load_and_run(engine, "window.q = 9;", "skip.js"));
        7
    });
    assert_eq!(value, 7);
    assert_eq!(eval_number(&mut engine, "window.q"), 9.0);
}

#[test]
fn engine_reports_a_version() {
    assert!(!Engine::version().is_empty());
}
