//! Module linkage: static imports, exports, dynamic import, loader hook.

mod common;

use std::sync::mpsc::channel;

use common::{completed, engine_with_events, eval_number, eval_string, load_and_run};
use stride_engine::{ModuleFetch, RunOutcome};

fn library_loader(url: &str) -> ModuleFetch {
    match url {
        "lib.js" => ModuleFetch::Ready(
            "export const two = 2;\nexport default function double(v) { return v * 2; }\n"
                .to_string(),
        ),
        "counter.js" => ModuleFetch::Ready(
            "window.loads = (window.loads || 0) + 1;\nexport const n = 1;\n".to_string(),
        ),
        "reexport.js" => {
            ModuleFetch::Ready("export { two as pair } from 'lib.js';\n".to_string())
        }
        "dir/relative.js" => ModuleFetch::Ready("export const here = 'dir';\n".to_string()),
        other => ModuleFetch::Failed(format!("unknown module '{other}'")),
    }
}

#[test]
fn static_imports_bind_default_and_named_exports() {
    let (mut engine, _rx) = engine_with_events();
    engine.set_module_loader(library_loader);
    let source = "import double, { two } from 'lib.js';\nwindow.r = double(two);";
    completed(load_and_run(&mut engine, source, "main.js"));
    assert_eq!(eval_number(&mut engine, "window.r"), 4.0);
}

#[test]
fn namespace_imports_expose_the_exports_object() {
    let (mut engine, _rx) = engine_with_events();
    engine.set_module_loader(library_loader);
    let source = "import * as lib from 'lib.js';\nwindow.r = lib.two;";
    completed(load_and_run(&mut engine, source, "ns.js"));
    assert_eq!(eval_number(&mut engine, "window.r"), 2.0);
}

#[test]
fn modules_evaluate_once_across_importers() {
    let (mut engine, _rx) = engine_with_events();
    engine.set_module_loader(library_loader);
    completed(load_and_run(
        &mut engine,
        "import { n } from 'counter.js';\nwindow.a = n;",
        "first.js",
    ));
    completed(load_and_run(
        &mut engine,
        "import { n } from 'counter.js';\nwindow.b = n;",
        "second.js",
    ));
    assert_eq!(eval_number(&mut engine, "window.loads"), 1.0);
    assert_eq!(eval_number(&mut engine, "window.a"), 1.0);
    assert_eq!(eval_number(&mut engine, "window.b"), 1.0);
}

#[test]
fn reexport_resolves_the_source_module_first() {
    let (mut engine, _rx) = engine_with_events();
    engine.set_module_loader(library_loader);
    let source = "import { pair } from 'reexport.js';\nwindow.p = pair;";
    completed(load_and_run(&mut engine, source, "re.js"));
    assert_eq!(eval_number(&mut engine, "window.p"), 2.0);
}

#[test]
fn relative_paths_resolve_against_the_importing_unit() {
    let (mut engine, _rx) = engine_with_events();
    engine.set_module_loader(library_loader);
    let source = "import { here } from './relative.js';\nwindow.w = here;";
    completed(load_and_run(&mut engine, source, "dir/main.js"));
    assert_eq!(eval_string(&mut engine, "window.w"), "dir");
}

#[test]
fn import_meta_carries_the_unit_identity() {
    let (mut engine, _rx) = engine_with_events();
    completed(load_and_run(
        &mut engine,
        "window.u = import.meta.url;",
        "meta.js",
    ));
    assert_eq!(eval_string(&mut engine, "window.u"), "meta.js");
}

#[test]
fn exports_of_declarations_reflect_final_values() {
    let (mut engine, _rx) = engine_with_events();
    engine.set_module_loader(|url| match url {
        "mut.js" => ModuleFetch::Ready(
            "export let v = 1;\nv = 2;\nexport function get() { return v; }\n".to_string(),
        ),
        other => ModuleFetch::Failed(format!("unknown module '{other}'")),
    });
    let source = "import { v, get } from 'mut.js';\nwindow.v = v;\nwindow.g = get();";
    completed(load_and_run(&mut engine, source, "mutmain.js"));
    assert_eq!(eval_number(&mut engine, "window.v"), 2.0);
    assert_eq!(eval_number(&mut engine, "window.g"), 2.0);
}

#[test]
fn dynamic_import_settles_through_the_task_queue() {
    let (mut engine, _rx) = engine_with_events();
    engine.set_module_loader(library_loader);
    let source = "window.m = await import('lib.js');\nwindow.after = window.m.two;";
    let outcome = load_and_run(&mut engine, source, "dyn.js");
    assert!(matches!(outcome, RunOutcome::Pending));
    // The queued continuation already ran before the drive returned.
    assert_eq!(eval_number(&mut engine, "window.after"), 2.0);
}

#[test]
fn await_of_async_functions_round_trips_values() {
    let (mut engine, _rx) = engine_with_events();
    let source = r#"
async function bump(v) {
  return v + 1;
}
window.r = await bump(41);
"#;
    let outcome = load_and_run(&mut engine, source, "async.js");
    assert!(matches!(outcome, RunOutcome::Pending));
    assert_eq!(eval_number(&mut engine, "window.r"), 42.0);
}

#[test]
fn pending_fetches_settle_via_pump() {
    let (mut engine, _rx) = engine_with_events();
    let (text_tx, text_rx) = channel();
    let mut slot = Some(text_rx);
    engine.set_module_loader(move |url| {
        assert_eq!(url, "slow.js");
        match slot.take() {
            Some(rx) => ModuleFetch::Pending(rx),
            None => ModuleFetch::Failed("already requested".to_string()),
        }
    });

    let source = "import { late } from 'slow.js';\nwindow.l = late;";
    let outcome = load_and_run(&mut engine, source, "slowmain.js");
    assert!(matches!(outcome, RunOutcome::Pending));
    assert_eq!(eval_string(&mut engine, "typeof window.l"), "undefined");

    text_tx
        .send(Ok("export const late = 'arrived';\n".to_string()))
        .expect("send failed");
    assert!(engine.pump());
    assert_eq!(eval_string(&mut engine, "window.l"), "arrived");
}

#[test]
fn module_breakpoints_pause_module_evaluation() {
    let (mut engine, _rx) = engine_with_events();
    engine.set_module_loader(|url| match url {
        "paused.js" => {
            ModuleFetch::Ready("export const a = 1;\nwindow.modmark = 2;\n".to_string())
        }
        other => ModuleFetch::Failed(format!("unknown module '{other}'")),
    });
    let source = "import { a } from 'paused.js';\nwindow.done = a;";
    let handle = engine
        .transform_and_load(source, Some("host.js"))
        .expect("transform failed");
    let outcome = handle.run(&mut engine);
    // The module is transformed on first import; a breakpoint can then be
    // registered against its own unit id on a later run of another host.
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    let hit = engine.set_breakpoint("paused.js", 2, None, None);
    assert!(hit.is_some(), "module unit is addressable after loading");
}
