//! Runtime values.
//!
//! The instrumented program computes over these values: primitives plus
//! ref-counted object cells with a prototype chain, insertion-ordered
//! property tables, and typed payloads for arrays, functions, deferred
//! values, and virtual-dispatch objects.

#![allow(missing_docs)]

mod env;
mod globals;

pub use env::{Binding, Env, EnvRef};
pub use globals::Realm;
pub(crate) use globals::iterable_items;

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::instrument::Unit;
use crate::sandbox::BridgeKind;

/// Reserved property key holding a class's extracted constructor body.
/// The leading NUL keeps it unreachable from script identifiers and string
/// literals produced by the lexer's grammar for property names.
pub const K_CONSTRUCT: &str = "\u{0}construct";
/// Reserved property key marking an error as already reported.
pub const K_SURFACED: &str = "\u{0}surfaced";
/// Reserved property key answered by virtual-dispatch objects.
pub const K_DISPATCH: &str = "\u{0}dispatch";

/// A script value.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(ObjectRef),
}

impl Value {
    #[must_use]
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    #[must_use]
    pub fn is_object_like(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// True for values a construction return override replaces `this` with.
    #[must_use]
    pub fn overrides_construction(&self) -> bool {
        self.is_object_like()
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Object(obj) => match &obj.borrow().payload {
                Payload::Array(items) => write!(f, "[array; {}]", items.len()),
                Payload::Function(_) | Payload::Native(_) | Payload::Bound(_) => {
                    write!(f, "[function]")
                }
                Payload::Deferred(_) => write!(f, "[deferred]"),
                _ => write!(f, "[object]"),
            },
        }
    }
}

/// Shared handle to an object cell.
#[derive(Clone)]
pub struct ObjectRef(pub Rc<RefCell<Obj>>);

impl ObjectRef {
    #[must_use]
    pub fn new(obj: Obj) -> Self {
        Self(Rc::new(RefCell::new(obj)))
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn borrow(&self) -> std::cell::Ref<'_, Obj> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> std::cell::RefMut<'_, Obj> {
        self.0.borrow_mut()
    }

    /// Reads an own property, without walking the prototype chain.
    #[must_use]
    pub fn own(&self, key: &str) -> Option<Property> {
        self.borrow().props.get(key).cloned()
    }

    /// Walks the prototype chain for a property slot.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<Property> {
        let mut cursor = self.clone();
        loop {
            if let Some(slot) = cursor.own(key) {
                return Some(slot);
            }
            let proto = cursor.borrow().proto.clone();
            match proto {
                Some(next) => cursor = next,
                None => return None,
            }
        }
    }

    /// Writes an own data property.
    pub fn set(&self, key: impl Into<SmolStr>, value: Value) {
        self.borrow_mut()
            .props
            .insert(key.into(), Property::Data(value));
    }

    /// Reads a data property through the chain, ignoring accessors.
    #[must_use]
    pub fn get_data(&self, key: &str) -> Value {
        match self.lookup(key) {
            Some(Property::Data(value)) => value,
            _ => Value::Undefined,
        }
    }
}

/// An object cell.
pub struct Obj {
    pub proto: Option<ObjectRef>,
    pub props: IndexMap<SmolStr, Property>,
    pub payload: Payload,
}

impl Obj {
    #[must_use]
    pub fn plain(proto: Option<ObjectRef>) -> Self {
        Self {
            proto,
            props: IndexMap::new(),
            payload: Payload::None,
        }
    }

    #[must_use]
    pub fn with_payload(proto: Option<ObjectRef>, payload: Payload) -> Self {
        Self {
            proto,
            props: IndexMap::new(),
            payload,
        }
    }
}

/// A property slot: plain data, or accessor functions.
#[derive(Clone)]
pub enum Property {
    Data(Value),
    Accessor {
        get: Option<Value>,
        set: Option<Value>,
    },
}

/// Typed object payloads.
pub enum Payload {
    None,
    Array(Vec<Value>),
    Function(ScriptFunction),
    Native(NativeFunction),
    Bound(BoundFunction),
    Deferred(DeferredState),
    Dispatch(DispatchTable),
}

/// An instrumented callable: the typed wrapper the sandbox bridge consults
/// instead of sniffing function source text.
#[derive(Clone)]
pub struct ScriptFunction {
    pub unit: Rc<Unit>,
    /// Index into the unit's function prototypes; `None` for a class with no
    /// declared constructor.
    pub func: Option<u32>,
    pub env: EnvRef,
    pub is_class: bool,
}

/// Host-native function signature. Natives receive the engine so they can
/// reach intrinsics and drive script callbacks through a nested drive.
pub type NativeFn = fn(&mut crate::engine::Engine, Value, &[Value]) -> Result<Value, Value>;

/// A host-native callable, optionally registered with the sandbox bridge.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: SmolStr,
    pub func: NativeFn,
    pub bridge: Option<BridgeKind>,
}

/// A callable produced by `Function.prototype.bind`.
#[derive(Clone)]
pub struct BoundFunction {
    pub target: Value,
    pub this: Value,
    pub args: Vec<Value>,
}

/// Settlement state of a deferred value.
#[derive(Clone)]
pub enum DeferredState {
    Pending,
    Resolved(Value),
    Rejected(Value),
}

/// Virtual-dispatch table standing in for reflective proxy construction:
/// get/set/has handlers bound to a target object identity.
pub struct DispatchTable {
    pub target: Value,
    pub handlers: ObjectRef,
}

/// Error categories the runtime synthesizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    ReferenceError,
    SyntaxError,
    RangeError,
}

impl ErrorKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::RangeError => "RangeError",
        }
    }
}

/// The elements of an array value, or an empty list for anything else.
#[must_use]
pub fn array_items_or_empty(value: &Value) -> Vec<Value> {
    match value {
        Value::Object(obj) => match &obj.borrow().payload {
            Payload::Array(items) => items.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// JS-style truthiness.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0 && !n.is_nan(),
        Value::Str(s) => !s.is_empty(),
        Value::Object(_) => true,
    }
}

/// `typeof` result.
#[must_use]
pub fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Null => "object",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::Str(_) => "string",
        Value::Object(obj) => match &obj.borrow().payload {
            Payload::Function(_) | Payload::Native(_) | Payload::Bound(_) => "function",
            _ => "object",
        },
    }
}

#[must_use]
pub fn is_callable(value: &Value) -> bool {
    match value {
        Value::Object(obj) => matches!(
            obj.borrow().payload,
            Payload::Function(_) | Payload::Native(_) | Payload::Bound(_)
        ),
        _ => false,
    }
}

/// True when the value is an instrumented (script-compiled) callable.
#[must_use]
pub fn is_instrumented_callable(value: &Value) -> bool {
    match value {
        Value::Object(obj) => matches!(obj.borrow().payload, Payload::Function(_)),
        _ => false,
    }
}

/// Strict equality.
#[must_use]
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        _ => false,
    }
}

/// Loose equality: strict within a type, `null == undefined`, numeric
/// coercion across number/string/bool. Object-to-primitive comparison uses
/// the object's string form.
#[must_use]
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Object(_), Value::Object(_)) => strict_eq(a, b),
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Object(_), _) => loose_eq(&Value::str(to_display_string(a)), b),
        (_, Value::Object(_)) => loose_eq(a, &Value::str(to_display_string(b))),
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        _ => {
            let (x, y) = (to_number(a), to_number(b));
            x == y
        }
    }
}

/// Numeric coercion.
#[must_use]
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Number(n) => *n,
        Value::Str(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Value::Object(obj) => match &obj.borrow().payload {
            Payload::Array(items) if items.is_empty() => 0.0,
            Payload::Array(items) if items.len() == 1 => to_number(&items[0]),
            _ => f64::NAN,
        },
    }
}

/// JS-style number formatting: integral values print without a fraction.
#[must_use]
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return format!("{}", n as i64);
    }
    format!("{n}")
}

/// String form used by concatenation and display.
#[must_use]
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::Str(s) => s.to_string(),
        Value::Object(obj) => {
            let borrowed = obj.borrow();
            match &borrowed.payload {
                Payload::Array(items) => {
                    let parts: Vec<String> = items
                        .iter()
                        .map(|item| match item {
                            Value::Undefined | Value::Null => String::new(),
                            other => to_display_string(other),
                        })
                        .collect();
                    parts.join(",")
                }
                Payload::Function(_) | Payload::Native(_) | Payload::Bound(_) => {
                    "function () { [instrumented] }".to_string()
                }
                _ => {
                    // Error objects stringify as "Name: message".
                    if let (Some(Property::Data(name)), Some(Property::Data(message))) =
                        (borrowed.props.get("name"), borrowed.props.get("message"))
                    {
                        if matches!(name, Value::Str(_)) {
                            return format!(
                                "{}: {}",
                                to_display_string(name),
                                to_display_string(message)
                            );
                        }
                    }
                    "[object Object]".to_string()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting_matches_script_conventions() {
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(-3.0), "-3");
        assert_eq!(number_to_string(f64::NAN), "NaN");
    }

    #[test]
    fn loose_equality_coerces() {
        assert!(loose_eq(&Value::Number(1.0), &Value::str("1")));
        assert!(loose_eq(&Value::Null, &Value::Undefined));
        assert!(!loose_eq(&Value::Null, &Value::Number(0.0)));
        assert!(!strict_eq(&Value::Number(1.0), &Value::str("1")));
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(&Value::str("")));
        assert!(truthy(&Value::str("0")));
        assert!(!truthy(&Value::Number(f64::NAN)));
    }
}
