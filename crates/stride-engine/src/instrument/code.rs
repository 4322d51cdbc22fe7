//! Instrumented executable units.
//!
//! The transform compiles a script into a flat instruction program per
//! function body. Suspension checks are explicit instructions; member
//! access, calls, updates, assignments, and instance creation are split
//! into read / bind / apply steps so the scheduler observes the read
//! before the use. Units serialize for precompiled payloads.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Constant-pool entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConstEntry {
    Number(f64),
    Str(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    TypeOf,
    /// Numeric coercion used by update expressions.
    ToNumber,
}

/// One instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Op {
    /// Statement-level suspension check: the scheduler decides whether to
    /// pause before the following statement executes.
    Check { bp: u32, line: u32, col: u32 },
    /// Scope-boundary suspension check at function entry, plus the named
    /// frame push. Blocker form: pauses only while a pause is pending.
    EnterFunction { bp: u32, line: u32, col: u32, name: u32 },
    /// Push a block scope (child environment + block frame record).
    EnterBlock,
    /// Pop the innermost scope pushed by `EnterBlock`/`EnterFunction`.
    ExitScope,

    Const(u32),
    Undef,
    Null,
    True,
    False,
    MakeArray(u32),
    MakeObject(u32),
    Dup,
    Pop,
    StoreTmp(u8),
    LoadTmp(u8),

    Declare { name: u32, mutable: bool },
    Load(u32),
    Store(u32),
    TypeofName(u32),

    GetProp(u32),
    GetIndex,
    /// Assignment through property access: routed through the setter lookup
    /// so inherited setters run directly. `[obj, value] -> [value]`.
    SetProp(u32),
    /// `[obj, key, value] -> [value]`.
    SetIndex,
    DeleteProp(u32),
    DeleteIndex,
    /// Read split for method calls: `[obj] -> [obj, fn]`.
    GetMethod(u32),
    /// `[obj, key] -> [obj, fn]`.
    GetMethodIndex,

    Call { argc: u32, line: u32, col: u32 },
    CallMethod { argc: u32, line: u32, col: u32 },
    CallSuper { argc: u32, line: u32, col: u32 },
    /// Instance creation: `[target, args..] -> [instance]`.
    New { argc: u32, line: u32, col: u32 },
    /// Reflective construction from a target and an argument array, with an
    /// optional alternate prototype target:
    /// `[target, args-array, (proto-target)] -> [instance]`.
    ConstructApply { alt_target: bool, line: u32, col: u32 },

    Binary(BinOp),
    Unary(UnOp),

    Jump(u32),
    JumpIfFalse(u32),
    /// Jump keeping the operand when it is truthy (for `||`).
    JumpTrueKeep(u32),
    /// Jump keeping the operand when it is falsy (for `&&`).
    JumpFalseKeep(u32),

    MakeFunction(u32),
    /// `[superclass-or-undefined] -> [class]`.
    MakeClass(u32),

    Return,
    Throw,
    PushCatch(u32),
    PushFinally(u32),
    PopBlock,
    /// Pop the protecting finally block and run its body with an empty
    /// pending completion.
    RunFinally,
    /// End of a finally body: re-applies the stashed completion.
    EndFinally,
    PushLoop { break_pc: u32, continue_pc: u32 },
    PopLoop,
    Break,
    Continue,

    Await,
    /// Request fetch of every module path the unit references; suspends
    /// until all are available.
    RequestModules,
    /// Resolve a statically imported module's exports. `-> [exports]`.
    ImportStatic(u32),
    /// Best-effort dynamic import. `[path] -> [deferred]`.
    ImportDynamic,
    /// Store into the unit's exports object. `[value] -> []`.
    BindExport(u32),
    /// Push the unit's exports object.
    LoadExports,
}

/// A compiled function body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionProto {
    /// Display name derived from the enclosing declaration.
    pub name: SmolStr,
    pub params: Vec<SmolStr>,
    pub code: Vec<Op>,
    pub is_async: bool,
    pub is_arrow: bool,
}

/// A compiled class body: the extracted constructor plus methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassProto {
    pub name: SmolStr,
    /// Function index of the extracted constructor, if one was declared.
    pub ctor: Option<u32>,
    pub methods: Vec<(SmolStr, u32)>,
}

/// One transformed, independently loadable script together with its
/// breakpoint index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: SmolStr,
    pub source: String,
    pub consts: Vec<ConstEntry>,
    pub funcs: Vec<FunctionProto>,
    pub classes: Vec<ClassProto>,
    /// Canonical-ized lazily at load; stored as written.
    pub imports: Vec<SmolStr>,
    /// Top-level program.
    pub body: Vec<Op>,
    /// Line number -> column number -> breakpoint id.
    pub line_index: IndexMap<u32, IndexMap<u32, u32>>,
}

impl Unit {
    /// Looks up a constant string by pool index.
    #[must_use]
    pub fn const_str(&self, idx: u32) -> &str {
        match &self.consts[idx as usize] {
            ConstEntry::Str(s) => s,
            ConstEntry::Number(_) => "",
        }
    }

    /// The code for a function index, or the top-level body.
    #[must_use]
    pub fn code(&self, func: Option<u32>) -> &[Op] {
        match func {
            Some(idx) => &self.funcs[idx as usize].code,
            None => &self.body,
        }
    }
}
