//! Global object, intrinsic prototypes, and host-native functions.

#![allow(clippy::unnecessary_wraps)]

use smol_str::SmolStr;

use crate::engine::Engine;
use crate::sandbox::BridgeKind;

use super::{
    is_callable, to_display_string, to_number, truthy, DeferredState, Env, EnvRef, ErrorKind,
    NativeFn, NativeFunction, Obj, ObjectRef, Payload, Property, Value,
};

/// The intrinsics one engine instance computes against.
pub struct Realm {
    pub global_env: EnvRef,
    pub global_object: ObjectRef,
    pub object_proto: ObjectRef,
    pub function_proto: ObjectRef,
    pub array_proto: ObjectRef,
    pub string_proto: ObjectRef,
    pub error_proto: ObjectRef,
    pub proxy_ctor: ObjectRef,
}

impl Realm {
    /// Builds the intrinsics and the global object.
    #[must_use]
    pub fn new() -> Self {
        let object_proto = ObjectRef::new(Obj::plain(None));
        let function_proto = ObjectRef::new(Obj::plain(Some(object_proto.clone())));
        let array_proto = ObjectRef::new(Obj::plain(Some(object_proto.clone())));
        let string_proto = ObjectRef::new(Obj::plain(Some(object_proto.clone())));
        let error_proto = ObjectRef::new(Obj::plain(Some(object_proto.clone())));
        error_proto.set("name", Value::str("Error"));
        error_proto.set("message", Value::str(""));

        let global_object = ObjectRef::new(Obj::plain(Some(object_proto.clone())));
        let proxy_ctor = native_obj(&function_proto, "Proxy", native_proxy, None);

        let realm = Self {
            global_env: Env::root(),
            global_object,
            object_proto,
            function_proto,
            array_proto,
            string_proto,
            error_proto,
            proxy_ctor,
        };
        realm.install();
        realm
    }

    fn install(&self) {
        self.install_function_proto();
        self.install_array_proto();
        self.install_string_proto();
        self.install_globals();
    }

    fn native(&self, name: &str, func: NativeFn) -> Value {
        Value::Object(native_obj(&self.function_proto, name, func, None))
    }

    fn bridged(&self, name: &str, func: NativeFn, bridge: BridgeKind) -> Value {
        Value::Object(native_obj(&self.function_proto, name, func, Some(bridge)))
    }

    fn install_function_proto(&self) {
        let proto = &self.function_proto;
        proto.set("call", self.native("call", native_fn_call));
        proto.set("apply", self.native("apply", native_fn_apply));
        proto.set("bind", self.native("bind", native_fn_bind));
    }

    fn install_array_proto(&self) {
        let proto = &self.array_proto;
        proto.set("push", self.native("push", native_array_push));
        proto.set("pop", self.native("pop", native_array_pop));
        proto.set("shift", self.native("shift", native_array_shift));
        proto.set("unshift", self.native("unshift", native_array_unshift));
        proto.set("indexOf", self.native("indexOf", native_array_index_of));
        proto.set("includes", self.native("includes", native_array_includes));
        proto.set("join", self.native("join", native_array_join));
        proto.set("slice", self.native("slice", native_array_slice));
        proto.set("concat", self.native("concat", native_array_concat));
        proto.set("reverse", self.native("reverse", native_array_reverse));
        proto.set("map", self.bridged("map", native_array_map, BridgeKind::Map));
        proto.set(
            "forEach",
            self.bridged("forEach", native_array_for_each, BridgeKind::ForEach),
        );
        proto.set(
            "filter",
            self.bridged("filter", native_array_filter, BridgeKind::Filter),
        );
        proto.set(
            "reduce",
            self.bridged("reduce", native_array_reduce, BridgeKind::Reduce),
        );
        proto.set(
            "reduceRight",
            self.bridged("reduceRight", native_array_reduce_right, BridgeKind::ReduceRight),
        );
        proto.set("find", self.bridged("find", native_array_find, BridgeKind::Find));
        proto.set(
            "findIndex",
            self.bridged("findIndex", native_array_find_index, BridgeKind::FindIndex),
        );
        proto.set("some", self.bridged("some", native_array_some, BridgeKind::Some));
        proto.set("every", self.bridged("every", native_array_every, BridgeKind::Every));
        proto.set(
            "flatMap",
            self.bridged("flatMap", native_array_flat_map, BridgeKind::FlatMap),
        );
        proto.set("sort", self.bridged("sort", native_array_sort, BridgeKind::Sort));
    }

    fn install_string_proto(&self) {
        let proto = &self.string_proto;
        proto.set("indexOf", self.native("indexOf", native_string_index_of));
        proto.set("includes", self.native("includes", native_string_includes));
        proto.set("startsWith", self.native("startsWith", native_string_starts_with));
        proto.set("endsWith", self.native("endsWith", native_string_ends_with));
        proto.set("slice", self.native("slice", native_string_slice));
        proto.set("substring", self.native("substring", native_string_slice));
        proto.set("split", self.native("split", native_string_split));
        proto.set("toUpperCase", self.native("toUpperCase", native_string_upper));
        proto.set("toLowerCase", self.native("toLowerCase", native_string_lower));
        proto.set("trim", self.native("trim", native_string_trim));
        proto.set("charAt", self.native("charAt", native_string_char_at));
        proto.set(
            "replace",
            self.bridged("replace", native_string_replace, BridgeKind::Replace),
        );
        proto.set(
            "replaceAll",
            self.bridged("replaceAll", native_string_replace_all, BridgeKind::ReplaceAll),
        );
    }

    fn install_globals(&self) {
        let global = &self.global_object;
        global.set("window", Value::Object(global.clone()));
        global.set("globalThis", Value::Object(global.clone()));

        let console = ObjectRef::new(Obj::plain(Some(self.object_proto.clone())));
        console.set("log", self.native("log", native_console_log));
        console.set("warn", self.native("warn", native_console_log));
        console.set("error", self.native("error", native_console_log));
        global.set("console", Value::Object(console));

        let math = ObjectRef::new(Obj::plain(Some(self.object_proto.clone())));
        math.set("floor", self.native("floor", native_math_floor));
        math.set("ceil", self.native("ceil", native_math_ceil));
        math.set("round", self.native("round", native_math_round));
        math.set("trunc", self.native("trunc", native_math_trunc));
        math.set("abs", self.native("abs", native_math_abs));
        math.set("sqrt", self.native("sqrt", native_math_sqrt));
        math.set("pow", self.native("pow", native_math_pow));
        math.set("max", self.native("max", native_math_max));
        math.set("min", self.native("min", native_math_min));
        global.set("Math", Value::Object(math));

        let object_ctor = native_obj(&self.function_proto, "Object", native_object_ctor, None);
        object_ctor.set("keys", self.native("keys", native_object_keys));
        object_ctor.set("values", self.native("values", native_object_values));
        object_ctor.set("assign", self.native("assign", native_object_assign));
        object_ctor.set("create", self.native("create", native_object_create));
        object_ctor.set(
            "defineProperty",
            self.native("defineProperty", native_object_define_property),
        );
        object_ctor.set(
            "getPrototypeOf",
            self.native("getPrototypeOf", native_object_get_prototype_of),
        );
        object_ctor.set("prototype", Value::Object(self.object_proto.clone()));
        global.set("Object", Value::Object(object_ctor));

        let array_ctor = native_obj(&self.function_proto, "Array", native_array_ctor, None);
        array_ctor.set("isArray", self.native("isArray", native_array_is_array));
        array_ctor.set(
            "from",
            self.bridged("from", native_array_from, BridgeKind::ArrayFrom),
        );
        array_ctor.set("prototype", Value::Object(self.array_proto.clone()));
        global.set("Array", Value::Object(array_ctor));

        global.set("Error", self.native("Error", native_error_ctor));
        global.set("TypeError", self.native("TypeError", native_type_error_ctor));
        global.set(
            "ReferenceError",
            self.native("ReferenceError", native_reference_error_ctor),
        );
        global.set("SyntaxError", self.native("SyntaxError", native_syntax_error_ctor));
        global.set("RangeError", self.native("RangeError", native_range_error_ctor));
        global.set("Proxy", Value::Object(self.proxy_ctor.clone()));
        global.set("isNaN", self.native("isNaN", native_is_nan));
        global.set("String", self.native("String", native_string_ctor));
        global.set("Number", self.native("Number", native_number_ctor));
        global.set("Boolean", self.native("Boolean", native_boolean_ctor));
    }

    /// A plain object with the default prototype.
    #[must_use]
    pub fn new_object(&self) -> ObjectRef {
        ObjectRef::new(Obj::plain(Some(self.object_proto.clone())))
    }

    /// An array value.
    #[must_use]
    pub fn new_array(&self, items: Vec<Value>) -> Value {
        Value::Object(ObjectRef::new(Obj::with_payload(
            Some(self.array_proto.clone()),
            Payload::Array(items),
        )))
    }

    /// A deferred value in the given state.
    #[must_use]
    pub fn new_deferred(&self, state: DeferredState) -> ObjectRef {
        ObjectRef::new(Obj::with_payload(
            Some(self.object_proto.clone()),
            Payload::Deferred(state),
        ))
    }

    /// An error object of the given kind.
    #[must_use]
    pub fn make_error(&self, kind: ErrorKind, message: &str) -> Value {
        let err = ObjectRef::new(Obj::plain(Some(self.error_proto.clone())));
        err.set("name", Value::str(kind.name()));
        err.set("message", Value::str(message));
        err.set("stack", Value::str(format!("{}: {message}", kind.name())));
        Value::Object(err)
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

fn native_obj(
    function_proto: &ObjectRef,
    name: &str,
    func: NativeFn,
    bridge: Option<BridgeKind>,
) -> ObjectRef {
    ObjectRef::new(Obj::with_payload(
        Some(function_proto.clone()),
        Payload::Native(NativeFunction {
            name: SmolStr::new(name),
            func,
            bridge,
        }),
    ))
}

fn arg(args: &[Value], idx: usize) -> Value {
    args.get(idx).cloned().unwrap_or(Value::Undefined)
}

fn array_items(this: &Value) -> Result<Vec<Value>, Value> {
    match this {
        Value::Object(obj) => match &obj.borrow().payload {
            Payload::Array(items) => Ok(items.clone()),
            _ => Err(Value::str("not an array")),
        },
        _ => Err(Value::str("not an array")),
    }
}

fn with_array_mut<T>(
    engine: &mut Engine,
    this: &Value,
    f: impl FnOnce(&mut Vec<Value>) -> T,
) -> Result<T, Value> {
    match this {
        Value::Object(obj) => {
            let mut borrowed = obj.borrow_mut();
            match &mut borrowed.payload {
                Payload::Array(items) => Ok(f(items)),
                _ => Err(engine.make_error(ErrorKind::TypeError, "not an array")),
            }
        }
        _ => Err(engine.make_error(ErrorKind::TypeError, "not an array")),
    }
}

// =============================================================================
// console / Math / conversions
// =============================================================================

fn native_console_log(_engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    let parts: Vec<String> = args.iter().map(to_display_string).collect();
    tracing::info!(target: "stride::console", "{}", parts.join(" "));
    Ok(Value::Undefined)
}

macro_rules! math_unary {
    ($name:ident, $method:ident) => {
        fn $name(_engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
            Ok(Value::Number(to_number(&arg(args, 0)).$method()))
        }
    };
}

math_unary!(native_math_floor, floor);
math_unary!(native_math_ceil, ceil);
math_unary!(native_math_round, round);
math_unary!(native_math_trunc, trunc);
math_unary!(native_math_abs, abs);
math_unary!(native_math_sqrt, sqrt);

fn native_math_pow(_engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    Ok(Value::Number(
        to_number(&arg(args, 0)).powf(to_number(&arg(args, 1))),
    ))
}

fn native_math_max(_engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    let mut best = f64::NEG_INFINITY;
    for value in args {
        let n = to_number(value);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        best = best.max(n);
    }
    Ok(Value::Number(best))
}

fn native_math_min(_engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    let mut best = f64::INFINITY;
    for value in args {
        let n = to_number(value);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        best = best.min(n);
    }
    Ok(Value::Number(best))
}

fn native_is_nan(_engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    Ok(Value::Bool(to_number(&arg(args, 0)).is_nan()))
}

fn native_string_ctor(_engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    Ok(Value::str(to_display_string(&arg(args, 0))))
}

fn native_number_ctor(_engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    Ok(Value::Number(to_number(&arg(args, 0))))
}

fn native_boolean_ctor(_engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    Ok(Value::Bool(truthy(&arg(args, 0))))
}

// =============================================================================
// Object
// =============================================================================

fn native_object_ctor(engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    match arg(args, 0) {
        Value::Undefined | Value::Null => Ok(Value::Object(engine.realm.new_object())),
        other => Ok(other),
    }
}

fn native_object_keys(engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    let Value::Object(obj) = arg(args, 0) else {
        return Ok(engine.realm.new_array(Vec::new()));
    };
    let keys: Vec<Value> = obj
        .borrow()
        .props
        .keys()
        .filter(|k| !k.starts_with('\u{0}'))
        .map(Value::str)
        .collect();
    Ok(engine.realm.new_array(keys))
}

fn native_object_values(engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    let Value::Object(obj) = arg(args, 0) else {
        return Ok(engine.realm.new_array(Vec::new()));
    };
    let values: Vec<Value> = obj
        .borrow()
        .props
        .iter()
        .filter(|(k, _)| !k.starts_with('\u{0}'))
        .map(|(_, slot)| match slot {
            Property::Data(value) => value.clone(),
            Property::Accessor { .. } => Value::Undefined,
        })
        .collect();
    Ok(engine.realm.new_array(values))
}

fn native_object_assign(_engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    let target = arg(args, 0);
    if let Value::Object(target_obj) = &target {
        for source in args.iter().skip(1) {
            if let Value::Object(source_obj) = source {
                let entries: Vec<(SmolStr, Property)> = source_obj
                    .borrow()
                    .props
                    .iter()
                    .filter(|(k, _)| !k.starts_with('\u{0}'))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for (key, slot) in entries {
                    if let Property::Data(value) = slot {
                        target_obj.set(key, value);
                    }
                }
            }
        }
    }
    Ok(target)
}

fn native_object_create(engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    let proto = match arg(args, 0) {
        Value::Object(obj) => Some(obj),
        Value::Null => None,
        _ => Some(engine.realm.object_proto.clone()),
    };
    Ok(Value::Object(ObjectRef::new(Obj::plain(proto))))
}

fn native_object_define_property(
    engine: &mut Engine,
    _this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    let target = arg(args, 0);
    let descriptor_value = arg(args, 2);
    let (Value::Object(obj), Value::Object(descriptor)) = (&target, &descriptor_value) else {
        return Err(engine.make_error(ErrorKind::TypeError, "invalid property descriptor"));
    };
    let key = SmolStr::new(to_display_string(&arg(args, 1)));
    let get = descriptor.own("get").and_then(|slot| match slot {
        Property::Data(value) if is_callable(&value) => Some(value),
        _ => None,
    });
    let set = descriptor.own("set").and_then(|slot| match slot {
        Property::Data(value) if is_callable(&value) => Some(value),
        _ => None,
    });
    if get.is_some() || set.is_some() {
        obj.borrow_mut()
            .props
            .insert(key, Property::Accessor { get, set });
    } else {
        let value = match descriptor.own("value") {
            Some(Property::Data(value)) => value,
            _ => Value::Undefined,
        };
        obj.set(key, value);
    }
    Ok(target)
}

fn native_object_get_prototype_of(
    _engine: &mut Engine,
    _this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    match arg(args, 0) {
        Value::Object(obj) => {
            let proto = obj.borrow().proto.clone();
            Ok(proto.map_or(Value::Null, Value::Object))
        }
        _ => Ok(Value::Null),
    }
}

// =============================================================================
// Array
// =============================================================================

fn native_array_ctor(engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    if args.len() == 1 {
        if let Value::Number(n) = args[0] {
            let len = n as usize;
            return Ok(engine.realm.new_array(vec![Value::Undefined; len]));
        }
    }
    Ok(engine.realm.new_array(args.to_vec()))
}

fn native_array_is_array(_engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    Ok(Value::Bool(array_items(&arg(args, 0)).is_ok()))
}

fn native_array_from(engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    let items = iterable_items(&arg(args, 0));
    let mapper = arg(args, 1);
    if !is_callable(&mapper) {
        return Ok(engine.realm.new_array(items));
    }
    let this_arg = arg(args, 2);
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        out.push(engine.call_callback(
            mapper.clone(),
            this_arg.clone(),
            &[item.clone(), Value::Number(i as f64)],
        )?);
    }
    Ok(engine.realm.new_array(out))
}

/// Items of an array-like: arrays and strings.
pub(crate) fn iterable_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Object(obj) => match &obj.borrow().payload {
            Payload::Array(items) => items.clone(),
            _ => Vec::new(),
        },
        Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
        _ => Vec::new(),
    }
}

fn native_array_push(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    with_array_mut(engine, &this, |items| {
        items.extend(args.iter().cloned());
        Value::Number(items.len() as f64)
    })
}

fn native_array_pop(engine: &mut Engine, this: Value, _args: &[Value]) -> Result<Value, Value> {
    with_array_mut(engine, &this, |items| {
        items.pop().unwrap_or(Value::Undefined)
    })
}

fn native_array_shift(engine: &mut Engine, this: Value, _args: &[Value]) -> Result<Value, Value> {
    with_array_mut(engine, &this, |items| {
        if items.is_empty() {
            Value::Undefined
        } else {
            items.remove(0)
        }
    })
}

fn native_array_unshift(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    with_array_mut(engine, &this, |items| {
        for (i, value) in args.iter().enumerate() {
            items.insert(i, value.clone());
        }
        Value::Number(items.len() as f64)
    })
}

fn native_array_index_of(_engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let items = array_items(&this)?;
    let needle = arg(args, 0);
    let idx = items
        .iter()
        .position(|item| super::strict_eq(item, &needle))
        .map_or(-1.0, |i| i as f64);
    Ok(Value::Number(idx))
}

fn native_array_includes(_engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let items = array_items(&this)?;
    let needle = arg(args, 0);
    Ok(Value::Bool(
        items.iter().any(|item| super::strict_eq(item, &needle)),
    ))
}

fn native_array_join(_engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let items = array_items(&this)?;
    let sep = match arg(args, 0) {
        Value::Undefined => ",".to_string(),
        other => to_display_string(&other),
    };
    let parts: Vec<String> = items
        .iter()
        .map(|item| match item {
            Value::Undefined | Value::Null => String::new(),
            other => to_display_string(other),
        })
        .collect();
    Ok(Value::str(parts.join(&sep)))
}

fn clamp_index(len: usize, raw: f64) -> usize {
    if raw.is_nan() {
        return 0;
    }
    if raw < 0.0 {
        let back = (-raw) as usize;
        len.saturating_sub(back)
    } else {
        (raw as usize).min(len)
    }
}

fn native_array_slice(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let items = array_items(&this)?;
    let start = clamp_index(items.len(), to_number(&arg(args, 0)));
    let end = match arg(args, 1) {
        Value::Undefined => items.len(),
        other => clamp_index(items.len(), to_number(&other)),
    };
    let out = if start < end {
        items[start..end].to_vec()
    } else {
        Vec::new()
    };
    Ok(engine.realm.new_array(out))
}

fn native_array_concat(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let mut out = array_items(&this)?;
    for value in args {
        match array_items(value) {
            Ok(items) => out.extend(items),
            Err(_) => out.push(value.clone()),
        }
    }
    Ok(engine.realm.new_array(out))
}

fn native_array_reverse(engine: &mut Engine, this: Value, _args: &[Value]) -> Result<Value, Value> {
    with_array_mut(engine, &this, |items| items.reverse())?;
    Ok(this)
}

fn native_array_map(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let items = array_items(&this)?;
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        out.push(engine.call_callback(
            callback.clone(),
            this_arg.clone(),
            &[item.clone(), Value::Number(i as f64), this.clone()],
        )?);
    }
    Ok(engine.realm.new_array(out))
}

fn native_array_for_each(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let items = array_items(&this)?;
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    for (i, item) in items.iter().enumerate() {
        engine.call_callback(
            callback.clone(),
            this_arg.clone(),
            &[item.clone(), Value::Number(i as f64), this.clone()],
        )?;
    }
    Ok(Value::Undefined)
}

fn native_array_filter(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let items = array_items(&this)?;
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let keep = engine.call_callback(
            callback.clone(),
            this_arg.clone(),
            &[item.clone(), Value::Number(i as f64), this.clone()],
        )?;
        if truthy(&keep) {
            out.push(item.clone());
        }
    }
    Ok(engine.realm.new_array(out))
}

fn reduce_impl(
    engine: &mut Engine,
    this: Value,
    args: &[Value],
    right: bool,
) -> Result<Value, Value> {
    let mut items = array_items(&this)?;
    if right {
        items.reverse();
    }
    let callback = arg(args, 0);
    let mut iter = items.into_iter();
    let mut acc = if args.len() > 1 {
        arg(args, 1)
    } else {
        match iter.next() {
            Some(first) => first,
            None => {
                return Err(
                    engine.make_error(ErrorKind::TypeError, "reduce of empty array with no initial value")
                )
            }
        }
    };
    for (i, item) in iter.enumerate() {
        acc = engine.call_callback(
            callback.clone(),
            Value::Undefined,
            &[acc, item, Value::Number(i as f64), this.clone()],
        )?;
    }
    Ok(acc)
}

fn native_array_reduce(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    reduce_impl(engine, this, args, false)
}

fn native_array_reduce_right(
    engine: &mut Engine,
    this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    reduce_impl(engine, this, args, true)
}

fn find_impl(engine: &mut Engine, this: &Value, args: &[Value]) -> Result<Option<usize>, Value> {
    let items = array_items(this)?;
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    for (i, item) in items.iter().enumerate() {
        let hit = engine.call_callback(
            callback.clone(),
            this_arg.clone(),
            &[item.clone(), Value::Number(i as f64), this.clone()],
        )?;
        if truthy(&hit) {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

fn native_array_find(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let idx = find_impl(engine, &this, args)?;
    let items = array_items(&this)?;
    Ok(idx.and_then(|i| items.get(i).cloned()).unwrap_or(Value::Undefined))
}

fn native_array_find_index(
    engine: &mut Engine,
    this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    let idx = find_impl(engine, &this, args)?;
    Ok(Value::Number(idx.map_or(-1.0, |i| i as f64)))
}

fn native_array_some(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    Ok(Value::Bool(find_impl(engine, &this, args)?.is_some()))
}

fn native_array_every(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let items = array_items(&this)?;
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    for (i, item) in items.iter().enumerate() {
        let hit = engine.call_callback(
            callback.clone(),
            this_arg.clone(),
            &[item.clone(), Value::Number(i as f64), this.clone()],
        )?;
        if !truthy(&hit) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn native_array_flat_map(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let items = array_items(&this)?;
    let callback = arg(args, 0);
    let this_arg = arg(args, 1);
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let mapped = engine.call_callback(
            callback.clone(),
            this_arg.clone(),
            &[item.clone(), Value::Number(i as f64), this.clone()],
        )?;
        match array_items(&mapped) {
            Ok(inner) => out.extend(inner),
            Err(_) => out.push(mapped),
        }
    }
    Ok(engine.realm.new_array(out))
}

fn native_array_sort(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let mut items = array_items(&this)?;
    let comparator = arg(args, 0);
    if is_callable(&comparator) {
        // Insertion sort keeps the native fall-through stable without
        // assuming the comparator is consistent.
        let mut i = 1;
        while i < items.len() {
            let mut j = i;
            while j > 0 {
                let res = engine.call_callback(
                    comparator.clone(),
                    Value::Undefined,
                    &[items[j - 1].clone(), items[j].clone()],
                )?;
                if to_number(&res) > 0.0 {
                    items.swap(j - 1, j);
                    j -= 1;
                } else {
                    break;
                }
            }
            i += 1;
        }
    } else {
        items.sort_by(|a, b| to_display_string(a).cmp(&to_display_string(b)));
    }
    with_array_mut(engine, &this, |slot| *slot = items)?;
    Ok(this)
}

// =============================================================================
// String
// =============================================================================

fn this_string(this: &Value) -> String {
    to_display_string(this)
}

fn native_string_index_of(_engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let haystack = this_string(&this);
    let needle = to_display_string(&arg(args, 0));
    let idx = haystack
        .find(&needle)
        .map_or(-1.0, |byte| haystack[..byte].chars().count() as f64);
    Ok(Value::Number(idx))
}

fn native_string_includes(_engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    Ok(Value::Bool(
        this_string(&this).contains(&to_display_string(&arg(args, 0))),
    ))
}

fn native_string_starts_with(
    _engine: &mut Engine,
    this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    Ok(Value::Bool(
        this_string(&this).starts_with(&to_display_string(&arg(args, 0))),
    ))
}

fn native_string_ends_with(
    _engine: &mut Engine,
    this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    Ok(Value::Bool(
        this_string(&this).ends_with(&to_display_string(&arg(args, 0))),
    ))
}

fn native_string_slice(_engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let chars: Vec<char> = this_string(&this).chars().collect();
    let start = clamp_index(chars.len(), to_number(&arg(args, 0)));
    let end = match arg(args, 1) {
        Value::Undefined => chars.len(),
        other => clamp_index(chars.len(), to_number(&other)),
    };
    let out: String = if start < end {
        chars[start..end].iter().collect()
    } else {
        String::new()
    };
    Ok(Value::str(out))
}

fn native_string_split(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let text = this_string(&this);
    let parts: Vec<Value> = match arg(args, 0) {
        Value::Undefined => vec![Value::str(text)],
        sep => {
            let sep = to_display_string(&sep);
            if sep.is_empty() {
                text.chars().map(|c| Value::str(c.to_string())).collect()
            } else {
                text.split(&sep).map(Value::str).collect()
            }
        }
    };
    Ok(engine.realm.new_array(parts))
}

fn native_string_upper(_engine: &mut Engine, this: Value, _args: &[Value]) -> Result<Value, Value> {
    Ok(Value::str(this_string(&this).to_uppercase()))
}

fn native_string_lower(_engine: &mut Engine, this: Value, _args: &[Value]) -> Result<Value, Value> {
    Ok(Value::str(this_string(&this).to_lowercase()))
}

fn native_string_trim(_engine: &mut Engine, this: Value, _args: &[Value]) -> Result<Value, Value> {
    Ok(Value::str(this_string(&this).trim()))
}

fn native_string_char_at(_engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let idx = to_number(&arg(args, 0));
    let text = this_string(&this);
    let ch = if idx >= 0.0 {
        text.chars().nth(idx as usize)
    } else {
        None
    };
    Ok(Value::str(ch.map(String::from).unwrap_or_default()))
}

fn replace_impl(
    engine: &mut Engine,
    this: Value,
    args: &[Value],
    all: bool,
) -> Result<Value, Value> {
    let text = this_string(&this);
    let pattern = to_display_string(&arg(args, 0));
    let replacer = arg(args, 1);
    if pattern.is_empty() {
        return Ok(Value::str(text));
    }
    let mut out = String::new();
    let mut rest = text.as_str();
    let mut offset = 0usize;
    loop {
        let Some(found) = rest.find(&pattern) else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..found]);
        if is_callable(&replacer) {
            let replaced = engine.call_callback(
                replacer.clone(),
                Value::Undefined,
                &[
                    Value::str(&pattern),
                    Value::Number((offset + found) as f64),
                    Value::str(&text),
                ],
            )?;
            out.push_str(&to_display_string(&replaced));
        } else {
            out.push_str(&to_display_string(&replacer));
        }
        rest = &rest[found + pattern.len()..];
        offset += found + pattern.len();
        if !all {
            out.push_str(rest);
            break;
        }
    }
    Ok(Value::str(out))
}

fn native_string_replace(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    replace_impl(engine, this, args, false)
}

fn native_string_replace_all(
    engine: &mut Engine,
    this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    replace_impl(engine, this, args, true)
}

// =============================================================================
// Function.prototype
// =============================================================================

fn native_fn_call(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let call_this = arg(args, 0);
    engine.call_callback(this, call_this, args.get(1..).unwrap_or(&[]))
}

fn native_fn_apply(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    let call_this = arg(args, 0);
    let call_args = match array_items(&arg(args, 1)) {
        Ok(items) => items,
        Err(_) => Vec::new(),
    };
    engine.call_callback(this, call_this, &call_args)
}

fn native_fn_bind(engine: &mut Engine, this: Value, args: &[Value]) -> Result<Value, Value> {
    Ok(Value::Object(ObjectRef::new(Obj::with_payload(
        Some(engine.realm.function_proto.clone()),
        Payload::Bound(super::BoundFunction {
            target: this,
            this: arg(args, 0),
            args: args.get(1..).unwrap_or(&[]).to_vec(),
        }),
    ))))
}

// =============================================================================
// Errors and Proxy
// =============================================================================

fn error_ctor_impl(engine: &mut Engine, args: &[Value], kind: ErrorKind) -> Result<Value, Value> {
    Ok(engine
        .realm
        .make_error(kind, &to_display_string(&arg(args, 0))))
}

fn native_error_ctor(engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    error_ctor_impl(engine, args, ErrorKind::Error)
}

fn native_type_error_ctor(engine: &mut Engine, _this: Value, args: &[Value]) -> Result<Value, Value> {
    error_ctor_impl(engine, args, ErrorKind::TypeError)
}

fn native_reference_error_ctor(
    engine: &mut Engine,
    _this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    error_ctor_impl(engine, args, ErrorKind::ReferenceError)
}

fn native_syntax_error_ctor(
    engine: &mut Engine,
    _this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    error_ctor_impl(engine, args, ErrorKind::SyntaxError)
}

fn native_range_error_ctor(
    engine: &mut Engine,
    _this: Value,
    args: &[Value],
) -> Result<Value, Value> {
    error_ctor_impl(engine, args, ErrorKind::RangeError)
}

/// `Proxy` must be constructed, not called; construction is handled by the
/// instance-creation protocol, which recognizes this builtin by identity.
fn native_proxy(engine: &mut Engine, _this: Value, _args: &[Value]) -> Result<Value, Value> {
    Err(engine.make_error(ErrorKind::TypeError, "Proxy must be constructed with 'new'"))
}
