//! The instrumentation transform.
//!
//! Parses source through `stride-syntax` and compiles the AST into an
//! instrumented executable unit: suspension checks before every statement,
//! read/bind/apply splits for member access and calls, two-phase function
//! lowering, module import/export lowering, and the per-unit line
//! breakpoint index.

mod code;
mod compile;

pub use code::{BinOp, ClassProto, ConstEntry, FunctionProto, Op, UnOp, Unit};
pub use compile::{compile_expression, compile_unit};

/// Synthetic binding for the current `this`.
pub const HIDDEN_THIS: &str = "%this";
/// Synthetic binding for `new.target`.
pub const HIDDEN_NEW_TARGET: &str = "%new.target";
/// Synthetic binding holding a class's superclass for `super(...)`.
pub const HIDDEN_SUPER: &str = "%super";
/// Synthetic binding for the unit's exports object.
pub const HIDDEN_EXPORTS: &str = "%exports";
/// Synthetic binding for `import.meta`.
pub const HIDDEN_IMPORT_META: &str = "%import.meta";
