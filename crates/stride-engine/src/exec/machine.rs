//! The stack machine executing instrumented units.

use std::rc::Rc;

use smol_str::SmolStr;

use crate::engine::Engine;
use crate::frames::CallSite;
use crate::instrument::{
    BinOp, Op, UnOp, Unit, HIDDEN_EXPORTS, HIDDEN_IMPORT_META, HIDDEN_NEW_TARGET, HIDDEN_SUPER,
    HIDDEN_THIS,
};
use crate::modules::ModuleRecord;
use crate::sandbox::{make_bridge_job, BridgeJob, BridgeStep};
use crate::value::{
    is_callable, is_instrumented_callable, loose_eq, number_to_string, strict_eq, to_display_string,
    to_number, truthy, type_of, DeferredState, Env, EnvRef, ErrorKind, Obj, ObjectRef, Payload,
    Property, ScriptFunction, Value, K_CONSTRUCT, K_DISPATCH,
};

const TMP_SLOTS: usize = 8;

/// Step result of one machine drive.
pub enum StepEvent {
    Done(Value),
    Suspend(Suspension),
    Failed(Value),
}

/// Why the machine handed control back to the scheduler.
pub enum Suspension {
    /// A statement-level suspension check.
    Check {
        bp: u32,
        unit: SmolStr,
        line: u32,
        col: u32,
    },
    /// A scope-boundary (blocker) check reached while a pause is live.
    Entry,
    /// Waiting on a pending deferred value.
    Wait(ObjectRef),
    /// Waiting on module fetches.
    Fetch(Vec<SmolStr>),
    /// An uncaught error was surfaced with pause-on-exception enabled;
    /// resuming re-throws into the remaining frames.
    ExceptionPause(Value),
}

/// Abrupt completion being unwound.
#[derive(Clone)]
pub enum Completion {
    Return(Value),
    Throw(Value),
    Break,
    Continue,
}

enum Block {
    Scope,
    Catch(u32),
    Finally(u32),
    FinallyRun {
        pending: Option<Completion>,
        resume_pc: u32,
    },
    Loop {
        break_pc: u32,
        continue_pc: u32,
    },
}

/// What a completed frame's value means to its caller.
pub enum Flavor {
    /// Push the value onto the caller's stack.
    Plain,
    /// Unit or module evaluation: record exports on completion.
    TopLevel { key: SmolStr },
    /// Constructor body: honor the return-value override.
    Construct { this: ObjectRef },
    /// Inherited setter invocation: the stored value is the result.
    Setter { value: Value },
    /// `super(...)` delegation: the expression result is undefined.
    Delegate,
}

/// One script call frame.
pub struct CallFrame {
    pub unit: Rc<Unit>,
    pub func: Option<u32>,
    pub pc: usize,
    stack: Vec<Value>,
    temps: Vec<Value>,
    pub env: EnvRef,
    blocks: Vec<Block>,
    flavor: Flavor,
}

impl CallFrame {
    /// A bare frame for expression evaluation against an existing scope.
    pub(crate) fn for_eval(unit: Rc<Unit>, env: EnvRef) -> Self {
        CallFrame::new(unit, None, env, Flavor::Plain)
    }

    fn new(unit: Rc<Unit>, func: Option<u32>, env: EnvRef, flavor: Flavor) -> Self {
        Self {
            unit,
            func,
            pc: 0,
            stack: Vec::new(),
            temps: vec![Value::Undefined; TMP_SLOTS],
            env,
            blocks: Vec::new(),
            flavor,
        }
    }
}

/// A frame on the coroutine: script code, or a cooperative bridge job.
pub enum Frame {
    Script(CallFrame),
    Bridge(BridgeJob),
}

/// Value or error injected when a parked coroutine resumes.
pub enum ResumeWith {
    Nothing,
    Value(Value),
    Throw(Value),
}

/// What to do with the coroutine's completion value.
pub enum CompletionHook {
    None,
    /// Settle this deferred with the result.
    Deferred(ObjectRef),
}

/// One suspendable execution: an explicit stack of frames plus resume state.
pub struct Coroutine {
    pub frames: Vec<Frame>,
    pub resume: ResumeWith,
    pub hook: CompletionHook,
}

impl Coroutine {
    #[must_use]
    pub fn new(hook: CompletionHook) -> Self {
        Self {
            frames: Vec::new(),
            resume: ResumeWith::Nothing,
            hook,
        }
    }

    /// Builds the coroutine for a unit's top-level evaluation and pushes its
    /// global frame.
    pub fn for_unit(engine: &mut Engine, unit: &Rc<Unit>) -> Self {
        let mut co = Self::new(CompletionHook::None);
        push_unit_frame(engine, &mut co, unit);
        co
    }

    /// Builds a coroutine for a single function invocation.
    #[must_use]
    pub fn for_call(
        sf: &ScriptFunction,
        func: u32,
        this: Value,
        args: &[Value],
        new_target: Value,
        hook: CompletionHook,
    ) -> Self {
        let mut co = Self::new(hook);
        co.frames.push(Frame::Script(make_call_frame(
            sf,
            func,
            this,
            args,
            new_target,
            Flavor::Plain,
        )));
        co
    }
}

/// Pushes the top-level frame for a unit: child environment of the global
/// scope with the synthetic exports / import.meta / this bindings, plus the
/// "(global)" frame record. The frame's scope block guarantees the record
/// pops on any exit.
pub(crate) fn push_unit_frame(engine: &mut Engine, co: &mut Coroutine, unit: &Rc<Unit>) {
    let env = Env::child(&engine.realm.global_env);
    let exports = Value::Object(engine.realm.new_object());
    let meta = engine.realm.new_object();
    meta.set("url", Value::str(unit.id.as_str()));
    Env::declare(&env, SmolStr::new(HIDDEN_EXPORTS), exports.clone(), false);
    Env::declare(&env, SmolStr::new(HIDDEN_IMPORT_META), Value::Object(meta), false);
    Env::declare(
        &env,
        SmolStr::new(HIDDEN_THIS),
        Value::Object(engine.realm.global_object.clone()),
        false,
    );
    engine
        .modules
        .set_evaluating(unit.id.clone(), exports.clone());
    engine
        .frames
        .push_named(SmolStr::new_static("(global)"), env.clone());
    let mut frame = CallFrame::new(
        Rc::clone(unit),
        None,
        env,
        Flavor::TopLevel {
            key: unit.id.clone(),
        },
    );
    frame.blocks.push(Block::Scope);
    co.frames.push(Frame::Script(frame));
}

/// Builds a call frame for a script function invocation.
pub(crate) fn make_call_frame(
    sf: &ScriptFunction,
    func: u32,
    this: Value,
    args: &[Value],
    new_target: Value,
    flavor: Flavor,
) -> CallFrame {
    let proto = &sf.unit.funcs[func as usize];
    let env = Env::child(&sf.env);
    for (i, param) in proto.params.iter().enumerate() {
        let value = args.get(i).cloned().unwrap_or(Value::Undefined);
        Env::declare(&env, param.clone(), value, true);
    }
    if !proto.is_arrow {
        Env::declare(&env, SmolStr::new(HIDDEN_THIS), this, false);
        Env::declare(&env, SmolStr::new(HIDDEN_NEW_TARGET), new_target, false);
    }
    CallFrame::new(Rc::clone(&sf.unit), Some(func), env, flavor)
}

fn parent_env(env: &EnvRef) -> EnvRef {
    let parent = env.borrow().parent.clone();
    parent.unwrap_or_else(|| env.clone())
}

fn top_frame<'a>(co: &'a mut Coroutine) -> Option<&'a mut CallFrame> {
    match co.frames.last_mut() {
        Some(Frame::Script(frame)) => Some(frame),
        _ => None,
    }
}

/// Outcome of reading a property: an immediate value, or a pushed accessor
/// frame whose return delivers the value.
enum Access {
    Value(Value),
    Pushed,
}

pub(crate) enum CallPush {
    Pushed,
    Value(Value),
}

/// Drives the coroutine until it completes, fails, or suspends.
pub fn run(engine: &mut Engine, co: &mut Coroutine) -> StepEvent {
    match std::mem::replace(&mut co.resume, ResumeWith::Nothing) {
        ResumeWith::Nothing => {}
        ResumeWith::Value(value) => match co.frames.last_mut() {
            Some(Frame::Script(frame)) => frame.stack.push(value),
            Some(Frame::Bridge(_)) => {
                if let Some(event) = advance_bridge(engine, co, value) {
                    return event;
                }
            }
            None => return StepEvent::Done(value),
        },
        ResumeWith::Throw(error) => {
            if let Some(event) = unwind(engine, co, Completion::Throw(error)) {
                return event;
            }
        }
    }

    loop {
        match co.frames.last_mut() {
            None => return StepEvent::Done(Value::Undefined),
            Some(Frame::Bridge(_)) => {
                if let Some(event) = advance_bridge(engine, co, Value::Undefined) {
                    return event;
                }
                continue;
            }
            Some(Frame::Script(_)) => {}
        }

        let op = {
            let Some(frame) = top_frame(co) else { continue };
            let code = frame.unit.code(frame.func);
            match code.get(frame.pc) {
                Some(op) => {
                    frame.pc += 1;
                    op.clone()
                }
                None => {
                    // Ran off the end: complete with undefined.
                    frame.pc = code.len();
                    if let Some(event) = unwind(engine, co, Completion::Return(Value::Undefined)) {
                        return event;
                    }
                    continue;
                }
            }
        };

        match exec_op(engine, co, op) {
            Ok(None) => {}
            Ok(Some(event)) => return event,
            Err(error) => {
                if let Some(event) = unwind(engine, co, Completion::Throw(error)) {
                    return event;
                }
            }
        }
    }
}

#[allow(clippy::too_many_lines)]
fn exec_op(engine: &mut Engine, co: &mut Coroutine, op: Op) -> Result<Option<StepEvent>, Value> {
    match op {
        Op::Check { bp, line, col } => {
            if engine.skip {
                return Ok(None);
            }
            let unit = match top_frame(co) {
                Some(frame) => frame.unit.id.clone(),
                None => SmolStr::default(),
            };
            return Ok(Some(StepEvent::Suspend(Suspension::Check {
                bp,
                unit,
                line,
                col,
            })));
        }
        Op::EnterFunction { name, .. } => {
            if !engine.skip && engine.is_paused() {
                // Blocker form: defer the whole evaluation while paused.
                if let Some(frame) = top_frame(co) {
                    frame.pc -= 1;
                }
                return Ok(Some(StepEvent::Suspend(Suspension::Entry)));
            }
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            let name = SmolStr::new(frame.unit.const_str(name));
            let env = frame.env.clone();
            frame.blocks.push(Block::Scope);
            engine.frames.push_named(name, env);
        }
        Op::EnterBlock => {
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            frame.env = Env::child(&frame.env);
            frame.blocks.push(Block::Scope);
            let env = frame.env.clone();
            engine.frames.push_block(env);
        }
        Op::ExitScope => {
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            // Pop blocks down to and including the innermost scope.
            while let Some(block) = frame.blocks.pop() {
                if matches!(block, Block::Scope) {
                    frame.env = parent_env(&frame.env);
                    engine.frames.pop();
                    break;
                }
            }
        }

        Op::Const(idx) => {
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            let value = match &frame.unit.consts[idx as usize] {
                crate::instrument::ConstEntry::Number(n) => Value::Number(*n),
                crate::instrument::ConstEntry::Str(s) => Value::str(s),
            };
            frame.stack.push(value);
        }
        Op::Undef => push(co, Value::Undefined),
        Op::Null => push(co, Value::Null),
        Op::True => push(co, Value::Bool(true)),
        Op::False => push(co, Value::Bool(false)),
        Op::MakeArray(n) => {
            let items = pop_n(co, n as usize);
            let array = engine.realm.new_array(items);
            push(co, array);
        }
        Op::MakeObject(n) => {
            let mut entries = pop_n(co, 2 * n as usize);
            let object = engine.realm.new_object();
            while entries.len() >= 2 {
                let key = entries.remove(0);
                let value = entries.remove(0);
                object.set(SmolStr::new(to_display_string(&key)), value);
            }
            push(co, Value::Object(object));
        }
        Op::Dup => {
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            let top = frame.stack.last().cloned().unwrap_or(Value::Undefined);
            frame.stack.push(top);
        }
        Op::Pop => {
            pop(co);
        }
        Op::StoreTmp(slot) => {
            let value = pop(co);
            if let Some(frame) = top_frame(co) {
                frame.temps[slot as usize] = value;
            }
        }
        Op::LoadTmp(slot) => {
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            let value = frame.temps[slot as usize].clone();
            frame.stack.push(value);
        }

        Op::Declare { name, mutable } => {
            let value = pop(co);
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            let name = SmolStr::new(frame.unit.const_str(name));
            Env::declare(&frame.env, name, value, mutable);
        }
        Op::Load(name) => {
            let (name, env) = match top_frame(co) {
                Some(frame) => (
                    SmolStr::new(frame.unit.const_str(name)),
                    frame.env.clone(),
                ),
                None => return Ok(None),
            };
            match Env::lookup(&env, &name) {
                Some(value) => push(co, value),
                None => {
                    let global = engine.realm.global_object.clone();
                    if global.lookup(&name).is_some() {
                        match read_property(engine, co, Value::Object(global), &name)? {
                            Access::Value(value) => push(co, value),
                            Access::Pushed => {}
                        }
                    } else {
                        return Err(engine.make_error(
                            ErrorKind::ReferenceError,
                            &format!("{name} is not defined"),
                        ));
                    }
                }
            }
        }
        Op::Store(name) => {
            let value = pop(co);
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            let name = SmolStr::new(frame.unit.const_str(name));
            match Env::assign(&frame.env, &name, value.clone()) {
                Some(true) => {}
                Some(false) => {
                    return Err(engine.make_error(
                        ErrorKind::TypeError,
                        "Assignment to constant variable.",
                    ))
                }
                // Assignment to an undeclared name lands on the global object.
                None => engine.realm.global_object.set(name, value.clone()),
            }
            push(co, value);
        }
        Op::TypeofName(name) => {
            let (name, env) = match top_frame(co) {
                Some(frame) => (
                    SmolStr::new(frame.unit.const_str(name)),
                    frame.env.clone(),
                ),
                None => return Ok(None),
            };
            let value = Env::lookup(&env, &name)
                .or_else(|| match engine.realm.global_object.lookup(&name) {
                    Some(Property::Data(value)) => Some(value),
                    Some(Property::Accessor { .. }) => Some(Value::Undefined),
                    None => None,
                });
            let out = match value {
                Some(value) => type_of(&value),
                None => "undefined",
            };
            push(co, Value::str(out));
        }

        Op::GetProp(name) => {
            let object = pop(co);
            let name = const_str(co, name);
            match read_property(engine, co, object, &name)? {
                Access::Value(value) => push(co, value),
                Access::Pushed => {}
            }
        }
        Op::GetIndex => {
            let key = pop(co);
            let object = pop(co);
            let key = property_key(&key);
            match read_property(engine, co, object, &key)? {
                Access::Value(value) => push(co, value),
                Access::Pushed => {}
            }
        }
        Op::GetMethod(name) => {
            let object = pop(co);
            let name = const_str(co, name);
            push(co, object.clone());
            match read_property(engine, co, object, &name)? {
                Access::Value(value) => push(co, value),
                Access::Pushed => {}
            }
        }
        Op::GetMethodIndex => {
            let key = pop(co);
            let object = pop(co);
            let key = property_key(&key);
            push(co, object.clone());
            match read_property(engine, co, object, &key)? {
                Access::Value(value) => push(co, value),
                Access::Pushed => {}
            }
        }
        Op::SetProp(name) => {
            let value = pop(co);
            let object = pop(co);
            let name = const_str(co, name);
            write_property(engine, co, object, &name, value)?;
        }
        Op::SetIndex => {
            let value = pop(co);
            let key = pop(co);
            let object = pop(co);
            let key = property_key(&key);
            write_property(engine, co, object, &key, value)?;
        }
        Op::DeleteProp(name) => {
            let object = pop(co);
            let name = const_str(co, name);
            delete_property(&object, &name);
            push(co, Value::Bool(true));
        }
        Op::DeleteIndex => {
            let key = pop(co);
            let object = pop(co);
            let key = property_key(&key);
            delete_property(&object, &key);
            push(co, Value::Bool(true));
        }

        Op::Call { argc, line, col } => {
            let args = pop_n(co, argc as usize);
            let callee = pop(co);
            record_site(engine, co, line, col);
            return dispatch_call(engine, co, callee, Value::Undefined, args);
        }
        Op::CallMethod { argc, line, col } => {
            let args = pop_n(co, argc as usize);
            let callee = pop(co);
            let this = pop(co);
            record_site(engine, co, line, col);
            return dispatch_call(engine, co, callee, this, args);
        }
        Op::CallSuper { argc, line, col } => {
            let args = pop_n(co, argc as usize);
            let superclass = pop(co);
            record_site(engine, co, line, col);
            return call_super(engine, co, superclass, args);
        }
        Op::New { argc, line, col } => {
            let args = pop_n(co, argc as usize);
            let target = pop(co);
            record_site(engine, co, line, col);
            match new_instance(engine, co, target, args, None)? {
                CallPush::Pushed => {}
                CallPush::Value(value) => push(co, value),
            }
        }
        Op::ConstructApply {
            alt_target,
            line,
            col,
        } => {
            let proto_target = if alt_target { Some(pop(co)) } else { None };
            let args_array = pop(co);
            let target = pop(co);
            record_site(engine, co, line, col);
            let args = crate::value::array_items_or_empty(&args_array);
            match new_instance(engine, co, target, args, proto_target)? {
                CallPush::Pushed => {}
                CallPush::Value(value) => push(co, value),
            }
        }

        Op::Binary(op) => {
            let right = pop(co);
            let left = pop(co);
            push(co, binary(engine, op, &left, &right)?);
        }
        Op::Unary(op) => {
            let operand = pop(co);
            let out = match op {
                UnOp::Neg => Value::Number(-to_number(&operand)),
                UnOp::Not => Value::Bool(!truthy(&operand)),
                UnOp::TypeOf => Value::str(type_of(&operand)),
                UnOp::ToNumber => Value::Number(to_number(&operand)),
            };
            push(co, out);
        }

        Op::Jump(target) => set_pc(co, target),
        Op::JumpIfFalse(target) => {
            let value = pop(co);
            if !truthy(&value) {
                set_pc(co, target);
            }
        }
        Op::JumpTrueKeep(target) => {
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            let keep = frame.stack.last().map_or(false, truthy);
            if keep {
                frame.pc = target as usize;
            }
        }
        Op::JumpFalseKeep(target) => {
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            let keep = frame.stack.last().map_or(false, |v| !truthy(v));
            if keep {
                frame.pc = target as usize;
            }
        }

        Op::MakeFunction(idx) => {
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            let sf = ScriptFunction {
                unit: Rc::clone(&frame.unit),
                func: Some(idx),
                env: frame.env.clone(),
                is_class: false,
            };
            let is_arrow = frame.unit.funcs[idx as usize].is_arrow;
            let func = ObjectRef::new(Obj::with_payload(
                Some(engine.realm.function_proto.clone()),
                Payload::Function(sf),
            ));
            if !is_arrow {
                let prototype = engine.realm.new_object();
                prototype.set("constructor", Value::Object(func.clone()));
                func.set("prototype", Value::Object(prototype));
            }
            frame.stack.push(Value::Object(func));
        }
        Op::MakeClass(idx) => {
            let superclass = pop(co);
            make_class(engine, co, idx, superclass)?;
        }

        Op::Return => {
            let value = pop(co);
            return Ok(unwind(engine, co, Completion::Return(value)));
        }
        Op::Throw => {
            let value = pop(co);
            return Ok(unwind(engine, co, Completion::Throw(value)));
        }
        Op::PushCatch(pc) => push_block(co, Block::Catch(pc)),
        Op::PushFinally(pc) => push_block(co, Block::Finally(pc)),
        Op::PopBlock => {
            if let Some(frame) = top_frame(co) {
                frame.blocks.pop();
            }
        }
        Op::RunFinally => {
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            // Pop the protecting finally block and run its body.
            if let Some(Block::Finally(pc)) = frame.blocks.pop() {
                let resume_pc = frame.pc as u32;
                frame.blocks.push(Block::FinallyRun {
                    pending: None,
                    resume_pc,
                });
                frame.pc = pc as usize;
            }
        }
        Op::EndFinally => {
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            if let Some(Block::FinallyRun { pending, resume_pc }) = frame.blocks.pop() {
                match pending {
                    None => frame.pc = resume_pc as usize,
                    Some(completion) => return Ok(unwind(engine, co, completion)),
                }
            }
        }
        Op::PushLoop {
            break_pc,
            continue_pc,
        } => push_block(
            co,
            Block::Loop {
                break_pc,
                continue_pc,
            },
        ),
        Op::PopLoop => {
            if let Some(frame) = top_frame(co) {
                frame.blocks.pop();
            }
        }
        Op::Break => return Ok(unwind(engine, co, Completion::Break)),
        Op::Continue => return Ok(unwind(engine, co, Completion::Continue)),

        Op::Await => {
            let value = pop(co);
            if let Value::Object(obj) = &value {
                let state = match &obj.borrow().payload {
                    Payload::Deferred(state) => Some(state.clone()),
                    _ => None,
                };
                match state {
                    Some(DeferredState::Pending) => {
                        return Ok(Some(StepEvent::Suspend(Suspension::Wait(obj.clone()))))
                    }
                    Some(DeferredState::Resolved(inner)) => {
                        push(co, inner);
                        return Ok(None);
                    }
                    Some(DeferredState::Rejected(error)) => return Err(error),
                    None => {}
                }
            }
            push(co, value);
        }
        Op::RequestModules => {
            let (imports, base) = match top_frame(co) {
                Some(frame) => (frame.unit.imports.clone(), frame.unit.id.clone()),
                None => return Ok(None),
            };
            let missing = engine.modules.unfetched(&imports, &base);
            if !missing.is_empty() {
                return Ok(Some(StepEvent::Suspend(Suspension::Fetch(missing))));
            }
        }
        Op::ImportStatic(path) => {
            let (path, base) = match top_frame(co) {
                Some(frame) => (
                    SmolStr::new(frame.unit.const_str(path)),
                    frame.unit.id.clone(),
                ),
                None => return Ok(None),
            };
            let key = crate::modules::resolve_url(&path, &base);
            match engine.modules.record(&key) {
                Some(ModuleRecord::Exports(value) | ModuleRecord::Evaluating(value)) => {
                    push(co, value);
                }
                Some(ModuleRecord::Source(text)) => {
                    let unit = engine.load_module_unit(&text, key)?;
                    push_unit_frame(engine, co, &unit);
                }
                _ => {
                    return Err(engine.make_error(
                        ErrorKind::Error,
                        &format!("module '{key}' is not available"),
                    ))
                }
            }
        }
        Op::ImportDynamic => {
            let path = pop(co);
            let base = match top_frame(co) {
                Some(frame) => frame.unit.id.clone(),
                None => SmolStr::default(),
            };
            let key = crate::modules::resolve_url(&to_display_string(&path), &base);
            let deferred = engine.begin_dynamic_import(key);
            push(co, deferred);
        }
        Op::BindExport(name) => {
            let value = pop(co);
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            let name = SmolStr::new(frame.unit.const_str(name));
            if let Some(Value::Object(exports)) = Env::lookup(&frame.env, HIDDEN_EXPORTS) {
                exports.set(name, value);
            }
        }
        Op::LoadExports => {
            let Some(frame) = top_frame(co) else {
                return Ok(None);
            };
            let exports = Env::lookup(&frame.env, HIDDEN_EXPORTS).unwrap_or(Value::Undefined);
            frame.stack.push(exports);
        }
    }
    Ok(None)
}

// =============================================================================
// Stack helpers
// =============================================================================

fn push(co: &mut Coroutine, value: Value) {
    if let Some(frame) = top_frame(co) {
        frame.stack.push(value);
    }
}

fn pop(co: &mut Coroutine) -> Value {
    top_frame(co)
        .and_then(|frame| frame.stack.pop())
        .unwrap_or(Value::Undefined)
}

fn pop_n(co: &mut Coroutine, n: usize) -> Vec<Value> {
    match top_frame(co) {
        Some(frame) => {
            let at = frame.stack.len().saturating_sub(n);
            frame.stack.split_off(at)
        }
        None => Vec::new(),
    }
}

fn set_pc(co: &mut Coroutine, target: u32) {
    if let Some(frame) = top_frame(co) {
        frame.pc = target as usize;
    }
}

fn push_block(co: &mut Coroutine, block: Block) {
    if let Some(frame) = top_frame(co) {
        frame.blocks.push(block);
    }
}

fn const_str(co: &mut Coroutine, idx: u32) -> SmolStr {
    top_frame(co)
        .map(|frame| SmolStr::new(frame.unit.const_str(idx)))
        .unwrap_or_default()
}

fn record_site(engine: &mut Engine, co: &mut Coroutine, line: u32, col: u32) {
    if let Some(frame) = top_frame(co) {
        engine.frames.update_call_site(CallSite {
            unit: frame.unit.id.clone(),
            line,
            column: col,
        });
    }
}

fn property_key(key: &Value) -> SmolStr {
    match key {
        Value::Number(n) => SmolStr::new(number_to_string(*n)),
        other => SmolStr::new(to_display_string(other)),
    }
}

// =============================================================================
// Properties
// =============================================================================

fn read_property(
    engine: &mut Engine,
    co: &mut Coroutine,
    receiver: Value,
    key: &str,
) -> Result<Access, Value> {
    match &receiver {
        Value::Undefined | Value::Null => Err(engine.make_error(
            ErrorKind::TypeError,
            &format!(
                "Cannot read properties of {} (reading '{key}')",
                to_display_string(&receiver)
            ),
        )),
        Value::Str(s) => {
            if key == "length" {
                return Ok(Access::Value(Value::Number(s.chars().count() as f64)));
            }
            if let Ok(idx) = key.parse::<usize>() {
                return Ok(Access::Value(
                    s.chars()
                        .nth(idx)
                        .map_or(Value::Undefined, |c| Value::str(c.to_string())),
                ));
            }
            match engine.realm.string_proto.lookup(key) {
                Some(Property::Data(value)) => Ok(Access::Value(value)),
                _ => Ok(Access::Value(Value::Undefined)),
            }
        }
        Value::Number(_) | Value::Bool(_) => Ok(Access::Value(Value::Undefined)),
        Value::Object(obj) => {
            // Virtual-dispatch objects answer the reserved marker key and
            // route reads through their `get` handler.
            let dispatch = match &obj.borrow().payload {
                Payload::Dispatch(table) => {
                    Some((table.target.clone(), table.handlers.clone()))
                }
                _ => None,
            };
            if let Some((target, handlers)) = dispatch {
                if key == K_DISPATCH {
                    return Ok(Access::Value(Value::Bool(true)));
                }
                if let Some(Property::Data(handler)) = handlers.lookup("get") {
                    if is_callable(&handler) {
                        let args = vec![target, Value::str(key)];
                        return apply_accessor(engine, co, handler, receiver.clone(), args, Flavor::Plain)
                            .map(|pushed| match pushed {
                                CallPush::Pushed => Access::Pushed,
                                CallPush::Value(value) => Access::Value(value),
                            });
                    }
                }
                return read_property(engine, co, target, key);
            }
            if let Payload::Array(items) = &obj.borrow().payload {
                if key == "length" {
                    return Ok(Access::Value(Value::Number(items.len() as f64)));
                }
                if let Ok(idx) = key.parse::<usize>() {
                    return Ok(Access::Value(
                        items.get(idx).cloned().unwrap_or(Value::Undefined),
                    ));
                }
            }
            match obj.lookup(key) {
                Some(Property::Data(value)) => Ok(Access::Value(value)),
                Some(Property::Accessor { get: Some(getter), .. }) => {
                    apply_accessor(engine, co, getter, receiver.clone(), Vec::new(), Flavor::Plain)
                        .map(|pushed| match pushed {
                            CallPush::Pushed => Access::Pushed,
                            CallPush::Value(value) => Access::Value(value),
                        })
                }
                Some(Property::Accessor { get: None, .. }) | None => {
                    Ok(Access::Value(Value::Undefined))
                }
            }
        }
    }
}

/// Assignment through property access: an inherited setter is invoked
/// directly so its effects are not reentered through the bridge.
fn write_property(
    engine: &mut Engine,
    co: &mut Coroutine,
    receiver: Value,
    key: &str,
    value: Value,
) -> Result<(), Value> {
    match &receiver {
        Value::Undefined | Value::Null => Err(engine.make_error(
            ErrorKind::TypeError,
            &format!(
                "Cannot set properties of {} (setting '{key}')",
                to_display_string(&receiver)
            ),
        )),
        Value::Object(obj) => {
            let dispatch = match &obj.borrow().payload {
                Payload::Dispatch(table) => {
                    Some((table.target.clone(), table.handlers.clone()))
                }
                _ => None,
            };
            if let Some((target, handlers)) = dispatch {
                if let Some(Property::Data(handler)) = handlers.lookup("set") {
                    if is_callable(&handler) {
                        let args = vec![target, Value::str(key), value.clone()];
                        match apply_accessor(
                            engine,
                            co,
                            handler,
                            receiver.clone(),
                            args,
                            Flavor::Setter { value },
                        )? {
                            CallPush::Value(stored) => push(co, stored),
                            CallPush::Pushed => {}
                        }
                        return Ok(());
                    }
                }
                return write_property(engine, co, target, key, value);
            }
            if let Some(Property::Accessor { set, .. }) = obj.lookup(key) {
                match set {
                    Some(setter) => {
                        match apply_accessor(
                            engine,
                            co,
                            setter,
                            receiver.clone(),
                            vec![value.clone()],
                            Flavor::Setter { value },
                        )? {
                            CallPush::Value(stored) => push(co, stored),
                            CallPush::Pushed => {}
                        }
                        return Ok(());
                    }
                    None => {
                        push(co, value);
                        return Ok(());
                    }
                }
            }
            {
                let mut borrowed = obj.borrow_mut();
                if let Payload::Array(items) = &mut borrowed.payload {
                    if let Ok(idx) = key.parse::<usize>() {
                        if idx >= items.len() {
                            items.resize(idx + 1, Value::Undefined);
                        }
                        items[idx] = value.clone();
                        drop(borrowed);
                        push(co, value);
                        return Ok(());
                    }
                    if key == "length" {
                        let len = to_number(&value).max(0.0) as usize;
                        items.resize(len, Value::Undefined);
                        drop(borrowed);
                        push(co, value);
                        return Ok(());
                    }
                }
            }
            obj.set(SmolStr::new(key), value.clone());
            push(co, value);
            Ok(())
        }
        // Property writes on primitives are silent no-ops.
        _ => {
            push(co, value);
            Ok(())
        }
    }
}

fn delete_property(object: &Value, key: &str) {
    if let Value::Object(obj) = object {
        let mut borrowed = obj.borrow_mut();
        if let Payload::Array(items) = &mut borrowed.payload {
            if let Ok(idx) = key.parse::<usize>() {
                if idx < items.len() {
                    items[idx] = Value::Undefined;
                }
                return;
            }
        }
        borrowed.props.shift_remove(key);
    }
}

/// Invokes an accessor or dispatch handler: script functions push a frame,
/// natives run to completion immediately.
fn apply_accessor(
    engine: &mut Engine,
    co: &mut Coroutine,
    callee: Value,
    this: Value,
    args: Vec<Value>,
    flavor: Flavor,
) -> Result<CallPush, Value> {
    push_call(engine, co, callee, this, args, Value::Undefined, flavor)
}

// =============================================================================
// Calls
// =============================================================================

/// Plain and method calls, including the sandbox-bridge consult for
/// registered higher-order builtins.
fn dispatch_call(
    engine: &mut Engine,
    co: &mut Coroutine,
    callee: Value,
    this: Value,
    args: Vec<Value>,
) -> Result<Option<StepEvent>, Value> {
    if engine.sandbox_active {
        let bridge = match &callee {
            Value::Object(obj) => match &obj.borrow().payload {
                Payload::Native(nf) => nf.bridge,
                _ => None,
            },
            _ => None,
        };
        if let Some(kind) = bridge {
            if args.iter().any(is_instrumented_callable) {
                if let Some(job) = make_bridge_job(engine, kind, &this, &args)? {
                    co.frames.push(Frame::Bridge(job));
                    return Ok(advance_bridge(engine, co, Value::Undefined));
                }
            }
        }
    }
    match push_call(engine, co, callee, this, args, Value::Undefined, Flavor::Plain)? {
        CallPush::Pushed => Ok(None),
        CallPush::Value(value) => {
            push(co, value);
            Ok(None)
        }
    }
}

pub(crate) fn push_call(
    engine: &mut Engine,
    co: &mut Coroutine,
    callee: Value,
    this: Value,
    args: Vec<Value>,
    new_target: Value,
    flavor: Flavor,
) -> Result<CallPush, Value> {
    let Value::Object(obj) = &callee else {
        return Err(engine.make_error(
            ErrorKind::TypeError,
            &format!("{} is not a function", to_display_string(&callee)),
        ));
    };
    enum Kind {
        Script(ScriptFunction),
        Native(crate::value::NativeFunction),
        Bound(crate::value::BoundFunction),
        Other,
    }
    let kind = match &obj.borrow().payload {
        Payload::Function(sf) => Kind::Script(sf.clone()),
        Payload::Native(nf) => Kind::Native(nf.clone()),
        Payload::Bound(bound) => Kind::Bound(bound.clone()),
        _ => Kind::Other,
    };
    match kind {
        Kind::Script(sf) => {
            if sf.is_class {
                return Err(engine.make_error(
                    ErrorKind::TypeError,
                    "Class constructor cannot be invoked without 'new'",
                ));
            }
            let Some(func) = sf.func else {
                return Err(engine.make_error(ErrorKind::TypeError, "function body is missing"));
            };
            if sf.unit.funcs[func as usize].is_async {
                return Ok(CallPush::Value(engine.spawn_async(
                    &sf, func, this, &args, new_target,
                )));
            }
            let frame = make_call_frame(&sf, func, this, &args, new_target, flavor);
            co.frames.push(Frame::Script(frame));
            Ok(CallPush::Pushed)
        }
        Kind::Native(nf) => {
            let result = (nf.func)(engine, this, &args)?;
            match flavor {
                Flavor::Setter { value } => Ok(CallPush::Value(value)),
                _ => Ok(CallPush::Value(result)),
            }
        }
        Kind::Bound(bound) => {
            let mut full = bound.args.clone();
            full.extend(args);
            push_call(engine, co, bound.target, bound.this, full, new_target, flavor)
        }
        Kind::Other => Err(engine.make_error(
            ErrorKind::TypeError,
            &format!("{} is not a function", to_display_string(&callee)),
        )),
    }
}

fn current_binding(co: &mut Coroutine, name: &str) -> Value {
    top_frame(co)
        .and_then(|frame| Env::lookup(&frame.env, name))
        .unwrap_or(Value::Undefined)
}

fn call_super(
    engine: &mut Engine,
    co: &mut Coroutine,
    superclass: Value,
    args: Vec<Value>,
) -> Result<Option<StepEvent>, Value> {
    let this = current_binding(co, HIDDEN_THIS);
    let new_target = current_binding(co, HIDDEN_NEW_TARGET);
    let Value::Object(obj) = &superclass else {
        return Err(engine.make_error(ErrorKind::TypeError, "class has no superclass"));
    };
    enum SupKind {
        Script(ScriptFunction),
        Native(crate::value::NativeFunction),
        Other,
    }
    let kind = match &obj.borrow().payload {
        Payload::Function(sf) => SupKind::Script(sf.clone()),
        Payload::Native(nf) => SupKind::Native(nf.clone()),
        _ => SupKind::Other,
    };
    match kind {
        SupKind::Script(sf) => {
            let ctor = if sf.is_class {
                class_constructor(&superclass)
            } else {
                Some((sf.clone(), sf.func))
            };
            match ctor {
                Some((ctor_sf, Some(func))) => {
                    let frame =
                        make_call_frame(&ctor_sf, func, this, &args, new_target, Flavor::Delegate);
                    co.frames.push(Frame::Script(frame));
                    Ok(None)
                }
                // No declared constructor anywhere up the chain.
                _ => {
                    push(co, Value::Undefined);
                    Ok(None)
                }
            }
        }
        SupKind::Native(nf) => {
            // Native superclass (e.g. Error): run it for effect.
            let _ = (nf.func)(engine, this, &args)?;
            push(co, Value::Undefined);
            Ok(None)
        }
        SupKind::Other => Err(engine.make_error(ErrorKind::TypeError, "class has no superclass")),
    }
}

/// Finds the extracted-constructor method through the class's prototype
/// chain (an undeclared subclass constructor inherits the superclass's).
fn class_constructor(class: &Value) -> Option<(ScriptFunction, Option<u32>)> {
    let Value::Object(class_obj) = class else {
        return None;
    };
    let prototype = match class_obj.lookup("prototype") {
        Some(Property::Data(Value::Object(proto))) => proto,
        _ => return None,
    };
    match prototype.lookup(K_CONSTRUCT) {
        Some(Property::Data(Value::Object(ctor))) => match &ctor.borrow().payload {
            Payload::Function(sf) => Some((sf.clone(), sf.func)),
            _ => None,
        },
        _ => None,
    }
}

// =============================================================================
// Instance creation
// =============================================================================

/// The instance-creation protocol: virtual-dispatch construction for the
/// proxy builtin, native construction otherwise, then the extracted
/// constructor driven with return-override semantics.
fn new_instance(
    engine: &mut Engine,
    co: &mut Coroutine,
    target: Value,
    args: Vec<Value>,
    proto_target: Option<Value>,
) -> Result<CallPush, Value> {
    let Value::Object(target_obj) = &target else {
        return Err(engine.make_error(
            ErrorKind::TypeError,
            &format!("{} is not a constructor", to_display_string(&target)),
        ));
    };
    if target_obj.ptr_eq(&engine.realm.proxy_ctor) {
        let inner = args.first().cloned().unwrap_or(Value::Undefined);
        let handlers = match args.get(1) {
            Some(Value::Object(handlers)) => handlers.clone(),
            _ => engine.realm.new_object(),
        };
        let proxy = ObjectRef::new(Obj::with_payload(
            Some(engine.realm.object_proto.clone()),
            Payload::Dispatch(crate::value::DispatchTable {
                target: inner,
                handlers,
            }),
        ));
        return Ok(CallPush::Value(Value::Object(proxy)));
    }

    enum Target {
        Script(ScriptFunction),
        Native(crate::value::NativeFunction),
        Other,
    }
    let kind = match &target_obj.borrow().payload {
        Payload::Function(sf) => Target::Script(sf.clone()),
        Payload::Native(nf) => Target::Native(nf.clone()),
        _ => Target::Other,
    };
    match kind {
        Target::Native(nf) => Ok(CallPush::Value((nf.func)(engine, Value::Undefined, &args)?)),
        Target::Script(sf) => {
            let proto_source = proto_target.as_ref().unwrap_or(&target);
            let prototype = match proto_source {
                Value::Object(obj) => match obj.lookup("prototype") {
                    Some(Property::Data(Value::Object(proto))) => Some(proto),
                    _ => None,
                },
                _ => None,
            };
            let this = ObjectRef::new(Obj::plain(
                prototype.or_else(|| Some(engine.realm.object_proto.clone())),
            ));
            if sf.is_class {
                match class_constructor(&target) {
                    Some((ctor_sf, Some(func))) => {
                        if sf.unit.funcs[func as usize].is_async {
                            return Err(engine
                                .make_error(ErrorKind::TypeError, "constructor cannot be async"));
                        }
                        let frame = make_call_frame(
                            &ctor_sf,
                            func,
                            Value::Object(this.clone()),
                            &args,
                            target.clone(),
                            Flavor::Construct { this },
                        );
                        co.frames.push(Frame::Script(frame));
                        Ok(CallPush::Pushed)
                    }
                    _ => Ok(CallPush::Value(Value::Object(this))),
                }
            } else {
                let Some(func) = sf.func else {
                    return Ok(CallPush::Value(Value::Object(this)));
                };
                if sf.unit.funcs[func as usize].is_arrow {
                    return Err(
                        engine.make_error(ErrorKind::TypeError, "arrow function is not a constructor")
                    );
                }
                let frame = make_call_frame(
                    &sf,
                    func,
                    Value::Object(this.clone()),
                    &args,
                    target.clone(),
                    Flavor::Construct { this },
                );
                co.frames.push(Frame::Script(frame));
                Ok(CallPush::Pushed)
            }
        }
        Target::Other => Err(engine.make_error(
            ErrorKind::TypeError,
            &format!("{} is not a constructor", to_display_string(&target)),
        )),
    }
}

fn make_class(
    engine: &mut Engine,
    co: &mut Coroutine,
    idx: u32,
    superclass: Value,
) -> Result<(), Value> {
    let Some(frame) = top_frame(co) else {
        return Ok(());
    };
    let unit = Rc::clone(&frame.unit);
    let class_proto = unit.classes[idx as usize].clone();
    let class_env = Env::child(&frame.env);
    Env::declare(&class_env, SmolStr::new(HIDDEN_SUPER), superclass.clone(), false);

    let proto_parent = match &superclass {
        Value::Object(sup) => match sup.lookup("prototype") {
            Some(Property::Data(Value::Object(proto))) => Some(proto),
            _ => {
                return Err(engine.make_error(
                    ErrorKind::TypeError,
                    "Class extends value is not a constructor",
                ))
            }
        },
        Value::Undefined => Some(engine.realm.object_proto.clone()),
        _ => {
            return Err(engine.make_error(
                ErrorKind::TypeError,
                "Class extends value is not a constructor",
            ))
        }
    };
    let prototype = ObjectRef::new(Obj::plain(proto_parent));
    let class_parent = match &superclass {
        Value::Object(sup) => sup.clone(),
        _ => engine.realm.function_proto.clone(),
    };
    let class_obj = ObjectRef::new(Obj::with_payload(
        Some(class_parent),
        Payload::Function(ScriptFunction {
            unit: Rc::clone(&unit),
            func: class_proto.ctor,
            env: class_env.clone(),
            is_class: true,
        }),
    ));
    class_obj.set("prototype", Value::Object(prototype.clone()));
    prototype.set("constructor", Value::Object(class_obj.clone()));
    for (name, func_idx) in &class_proto.methods {
        let method = ObjectRef::new(Obj::with_payload(
            Some(engine.realm.function_proto.clone()),
            Payload::Function(ScriptFunction {
                unit: Rc::clone(&unit),
                func: Some(*func_idx),
                env: class_env.clone(),
                is_class: false,
            }),
        ));
        prototype.set(name.clone(), Value::Object(method));
    }
    if let Some(ctor_idx) = class_proto.ctor {
        let ctor = ObjectRef::new(Obj::with_payload(
            Some(engine.realm.function_proto.clone()),
            Payload::Function(ScriptFunction {
                unit,
                func: Some(ctor_idx),
                env: class_env,
                is_class: false,
            }),
        ));
        prototype.set(SmolStr::new(K_CONSTRUCT), Value::Object(ctor));
    }
    push(co, Value::Object(class_obj));
    Ok(())
}

// =============================================================================
// Binary operators
// =============================================================================

fn binary(engine: &mut Engine, op: BinOp, left: &Value, right: &Value) -> Result<Value, Value> {
    let _ = engine;
    let out = match op {
        BinOp::Add => match (left, right) {
            (Value::Str(_), _) | (_, Value::Str(_)) | (Value::Object(_), _) | (_, Value::Object(_)) => {
                Value::str(format!(
                    "{}{}",
                    to_display_string(left),
                    to_display_string(right)
                ))
            }
            _ => Value::Number(to_number(left) + to_number(right)),
        },
        BinOp::Sub => Value::Number(to_number(left) - to_number(right)),
        BinOp::Mul => Value::Number(to_number(left) * to_number(right)),
        BinOp::Div => Value::Number(to_number(left) / to_number(right)),
        BinOp::Rem => Value::Number(to_number(left) % to_number(right)),
        BinOp::Eq => Value::Bool(loose_eq(left, right)),
        BinOp::NotEq => Value::Bool(!loose_eq(left, right)),
        BinOp::StrictEq => Value::Bool(strict_eq(left, right)),
        BinOp::StrictNotEq => Value::Bool(!strict_eq(left, right)),
        BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq => {
            compare(op, left, right)
        }
    };
    Ok(out)
}

fn compare(op: BinOp, left: &Value, right: &Value) -> Value {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        let out = match op {
            BinOp::Less => a < b,
            BinOp::LessEq => a <= b,
            BinOp::Greater => a > b,
            BinOp::GreaterEq => a >= b,
            _ => false,
        };
        return Value::Bool(out);
    }
    let (a, b) = (to_number(left), to_number(right));
    if a.is_nan() || b.is_nan() {
        return Value::Bool(false);
    }
    let out = match op {
        BinOp::Less => a < b,
        BinOp::LessEq => a <= b,
        BinOp::Greater => a > b,
        BinOp::GreaterEq => a >= b,
        _ => false,
    };
    Value::Bool(out)
}

// =============================================================================
// Unwinding and frame completion
// =============================================================================

/// Applies an abrupt completion: pops blocks (running finallys, landing in
/// catches and loop targets) and frames until handled; returns the
/// coroutine-level event when the completion escapes all frames.
pub(crate) fn unwind(
    engine: &mut Engine,
    co: &mut Coroutine,
    completion: Completion,
) -> Option<StepEvent> {
    let mut completion = completion;
    loop {
        let Some(top) = co.frames.last_mut() else {
            return Some(match completion {
                Completion::Return(value) => StepEvent::Done(value),
                Completion::Throw(error) => StepEvent::Failed(error),
                Completion::Break | Completion::Continue => StepEvent::Done(Value::Undefined),
            });
        };
        let Frame::Script(frame) = top else {
            // A callback failure aborts the bridge job outright.
            co.frames.pop();
            continue;
        };

        let mut handled = false;
        while let Some(block) = frame.blocks.pop() {
            match block {
                Block::Scope => {
                    frame.env = parent_env(&frame.env);
                    engine.frames.pop();
                }
                Block::Catch(pc) => {
                    if let Completion::Throw(error) = &completion {
                        frame.stack.push(error.clone());
                        frame.pc = pc as usize;
                        handled = true;
                        break;
                    }
                }
                Block::Finally(pc) => {
                    frame.blocks.push(Block::FinallyRun {
                        pending: Some(completion.clone()),
                        resume_pc: 0,
                    });
                    frame.pc = pc as usize;
                    handled = true;
                    break;
                }
                Block::FinallyRun { .. } => {}
                Block::Loop {
                    break_pc,
                    continue_pc,
                } => match completion {
                    Completion::Break => {
                        frame.pc = break_pc as usize;
                        handled = true;
                        break;
                    }
                    Completion::Continue => {
                        frame.blocks.push(Block::Loop {
                            break_pc,
                            continue_pc,
                        });
                        frame.pc = continue_pc as usize;
                        handled = true;
                        break;
                    }
                    _ => {}
                },
            }
        }
        if handled {
            return None;
        }

        // The frame is exhausted.
        let Some(Frame::Script(done)) = co.frames.pop() else {
            continue;
        };
        match completion {
            Completion::Return(value) => return complete_frame(engine, co, done.flavor, value),
            Completion::Throw(error) => {
                // Surface once, while the outer frames are still live; the
                // error keeps re-propagating through them afterwards.
                let pause = !engine.skip
                    && engine.surface_uncaught(&error)
                    && engine.breakpoints.pause_on_exception();
                if pause {
                    return Some(StepEvent::Suspend(Suspension::ExceptionPause(error)));
                }
                completion = Completion::Throw(error);
            }
            Completion::Break | Completion::Continue => {
                completion = Completion::Return(Value::Undefined);
            }
        }
    }
}

/// Delivers a completed frame's value to its caller per the frame's flavor.
fn complete_frame(
    engine: &mut Engine,
    co: &mut Coroutine,
    flavor: Flavor,
    value: Value,
) -> Option<StepEvent> {
    let out = match flavor {
        Flavor::Plain => value,
        Flavor::TopLevel { key } => {
            engine.modules.set_exports(key, value.clone());
            value
        }
        Flavor::Construct { this } => {
            if value.overrides_construction() {
                value
            } else {
                Value::Object(this)
            }
        }
        Flavor::Setter { value: stored } => stored,
        Flavor::Delegate => Value::Undefined,
    };
    match co.frames.last_mut() {
        None => Some(StepEvent::Done(out)),
        Some(Frame::Script(frame)) => {
            frame.stack.push(out);
            None
        }
        Some(Frame::Bridge(_)) => advance_bridge(engine, co, out),
    }
}

/// Advances the topmost bridge job with a callback result, pushing the next
/// callback call or delivering the job's final value.
fn advance_bridge(engine: &mut Engine, co: &mut Coroutine, input: Value) -> Option<StepEvent> {
    let mut input = input;
    loop {
        let step = {
            let Some(Frame::Bridge(job)) = co.frames.last_mut() else {
                return None;
            };
            job.step(engine, input)
        };
        match step {
            BridgeStep::Call { callee, this, args } => {
                match push_call(engine, co, callee, this, args, Value::Undefined, Flavor::Plain) {
                    Ok(CallPush::Pushed) => return None,
                    Ok(CallPush::Value(value)) => {
                        input = value;
                    }
                    Err(error) => {
                        co.frames.pop();
                        return unwind(engine, co, Completion::Throw(error));
                    }
                }
            }
            BridgeStep::Done(value) => {
                co.frames.pop();
                return complete_frame(engine, co, Flavor::Plain, value);
            }
            BridgeStep::Fail(error) => {
                co.frames.pop();
                return unwind(engine, co, Completion::Throw(error));
            }
        }
    }
}
