//! AST-to-instruction compiler.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use stride_syntax::ast::{
    AssignOp, CatchClause, ClassDecl, DeclKind, Expr, ExprKind, ExportDecl, FnBody, FunctionExpr,
    LogicalOp, MemberKey, Program, PropKey, Stmt, StmtKind, UnaryOp, UpdateOp,
};
use stride_syntax::{parse_expression, parse_program, Pos};

use crate::breakpoints::{BreakpointRegistry, Condition};
use crate::error::TransformError;

use super::code::{BinOp, ClassProto, ConstEntry, FunctionProto, Op, UnOp, Unit};
use super::{HIDDEN_EXPORTS, HIDDEN_IMPORT_META, HIDDEN_NEW_TARGET, HIDDEN_SUPER, HIDDEN_THIS};

const MAX_TMP: u8 = 8;

/// Compiles a full script into an instrumented unit, recording breakpoint
/// positions into the registry's id space.
pub fn compile_unit(
    source: &str,
    unit_id: SmolStr,
    registry: &mut BreakpointRegistry,
) -> Result<(Unit, Vec<(u32, Condition)>), TransformError> {
    let program = parse_program(source)?;
    let mut compiler = Compiler::new(unit_id, source.to_string(), Some(registry));
    compiler.program(&program)?;
    Ok(compiler.finish())
}

/// Compiles a bare expression with no suspension checks, for frame
/// evaluators and breakpoint conditions.
pub fn compile_expression(source: &str) -> Result<Unit, TransformError> {
    let expr = parse_expression(source)?;
    let mut compiler = Compiler::new(SmolStr::new_static("<eval>"), source.to_string(), None);
    let mut emitter = Emitter::new();
    compiler.expr(&mut emitter, &expr)?;
    emitter.push(Op::Return);
    compiler.body = emitter.code;
    let (unit, _) = compiler.finish();
    Ok(unit)
}

struct Emitter {
    code: Vec<Op>,
    tmp: u8,
    loop_depth: u32,
}

impl Emitter {
    fn new() -> Self {
        Self {
            code: Vec::new(),
            tmp: 0,
            loop_depth: 0,
        }
    }

    fn pc(&self) -> u32 {
        self.code.len() as u32
    }

    fn push(&mut self, op: Op) {
        self.code.push(op);
    }

    /// Emits a placeholder jump, returning its index for patching.
    fn jump_placeholder(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    fn patch_to_here(&mut self, at: usize) {
        let target = self.pc();
        self.patch(at, target);
    }

    fn patch(&mut self, at: usize, target: u32) {
        match &mut self.code[at] {
            Op::Jump(t)
            | Op::JumpIfFalse(t)
            | Op::JumpTrueKeep(t)
            | Op::JumpFalseKeep(t) => *t = target,
            Op::PushLoop { break_pc, .. } => *break_pc = target,
            _ => {}
        }
    }
}

struct Compiler<'r> {
    unit_id: SmolStr,
    source: String,
    registry: Option<&'r mut BreakpointRegistry>,
    consts: Vec<ConstEntry>,
    str_map: FxHashMap<SmolStr, u32>,
    num_map: FxHashMap<u64, u32>,
    funcs: Vec<FunctionProto>,
    classes: Vec<ClassProto>,
    imports: Vec<SmolStr>,
    body: Vec<Op>,
    line_index: IndexMap<u32, IndexMap<u32, u32>>,
    registered: Vec<(u32, Condition)>,
    /// (exported name, local name) bindings emitted at the end of the unit.
    deferred_exports: Vec<(SmolStr, SmolStr)>,
}

impl<'r> Compiler<'r> {
    fn new(unit_id: SmolStr, source: String, registry: Option<&'r mut BreakpointRegistry>) -> Self {
        Self {
            unit_id,
            source,
            registry,
            consts: Vec::new(),
            str_map: FxHashMap::default(),
            num_map: FxHashMap::default(),
            funcs: Vec::new(),
            classes: Vec::new(),
            imports: Vec::new(),
            body: Vec::new(),
            line_index: IndexMap::new(),
            registered: Vec::new(),
            deferred_exports: Vec::new(),
        }
    }

    fn finish(self) -> (Unit, Vec<(u32, Condition)>) {
        (
            Unit {
                id: self.unit_id,
                source: self.source,
                consts: self.consts,
                funcs: self.funcs,
                classes: self.classes,
                imports: self.imports,
                body: self.body,
                line_index: self.line_index,
            },
            self.registered,
        )
    }

    fn str_const(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.str_map.get(s) {
            return idx;
        }
        let idx = self.consts.len() as u32;
        self.consts.push(ConstEntry::Str(s.to_string()));
        self.str_map.insert(SmolStr::new(s), idx);
        idx
    }

    fn num_const(&mut self, n: f64) -> u32 {
        let bits = n.to_bits();
        if let Some(&idx) = self.num_map.get(&bits) {
            return idx;
        }
        let idx = self.consts.len() as u32;
        self.consts.push(ConstEntry::Number(n));
        self.num_map.insert(bits, idx);
        idx
    }

    /// Allocates a breakpoint id and records it in the line index.
    fn check(&mut self, e: &mut Emitter, pos: Pos) -> Option<u32> {
        let registry = self.registry.as_deref_mut()?;
        let bp = registry.allocate();
        self.line_index
            .entry(pos.line)
            .or_default()
            .insert(pos.column, bp);
        e.push(Op::Check {
            bp,
            line: pos.line,
            col: pos.column,
        });
        Some(bp)
    }

    /// Allocates a scope-boundary (blocker) id; not in the line index.
    fn entry_check(&mut self, e: &mut Emitter, pos: Pos, name: &str) {
        let name = self.str_const(name);
        let bp = match self.registry.as_deref_mut() {
            Some(registry) => registry.allocate(),
            None => 0,
        };
        e.push(Op::EnterFunction {
            bp,
            line: pos.line,
            col: pos.column,
            name,
        });
    }

    fn unsupported(what: &str, pos: Pos) -> TransformError {
        TransformError::Unsupported {
            what: SmolStr::new(what),
            line: pos.line,
            column: pos.column,
        }
    }

    // =========================================================================
    // Program
    // =========================================================================

    fn program(&mut self, program: &Program) -> Result<(), TransformError> {
        let mut e = Emitter::new();

        // Collect the module paths this unit references.
        for stmt in &program.body {
            match &stmt.kind {
                StmtKind::Import(decl) => self.imports.push(decl.source.clone()),
                StmtKind::Export(ExportDecl::Named {
                    source: Some(path), ..
                }) => self.imports.push(path.clone()),
                _ => {}
            }
        }
        if !self.imports.is_empty() {
            e.push(Op::RequestModules);
        }

        // Imports are hoisted ahead of all statements.
        for stmt in &program.body {
            if let StmtKind::Import(decl) = &stmt.kind {
                let path = self.str_const(&decl.source);
                e.push(Op::ImportStatic(path));
                if let Some(ns) = &decl.namespace {
                    e.push(Op::Dup);
                    let name = self.str_const(ns);
                    e.push(Op::Declare { name, mutable: false });
                }
                if let Some(local) = &decl.default {
                    e.push(Op::Dup);
                    let key = self.str_const("default");
                    e.push(Op::GetProp(key));
                    let name = self.str_const(local);
                    e.push(Op::Declare { name, mutable: false });
                }
                for (imported, local) in &decl.named {
                    e.push(Op::Dup);
                    let key = self.str_const(imported);
                    e.push(Op::GetProp(key));
                    let name = self.str_const(local);
                    e.push(Op::Declare { name, mutable: false });
                }
                e.push(Op::Pop);
            }
        }

        self.hoist_functions(&mut e, &program.body)?;
        for stmt in &program.body {
            self.top_statement(&mut e, stmt)?;
        }

        for (exported, local) in std::mem::take(&mut self.deferred_exports) {
            let name = self.str_const(&local);
            e.push(Op::Load(name));
            let key = self.str_const(&exported);
            e.push(Op::BindExport(key));
        }
        e.push(Op::LoadExports);
        e.push(Op::Return);
        self.body = e.code;
        Ok(())
    }

    /// Function declarations execute at scope entry regardless of position;
    /// their statement positions keep a suspension check only.
    fn hoist_functions(&mut self, e: &mut Emitter, stmts: &[Stmt]) -> Result<(), TransformError> {
        for stmt in stmts {
            let func = match &stmt.kind {
                StmtKind::FunctionDecl(func) => Some((func, None)),
                StmtKind::Export(ExportDecl::Decl(inner)) => match &inner.kind {
                    StmtKind::FunctionDecl(func) => {
                        let name = func.name.clone().unwrap_or_default();
                        Some((func, Some((name.clone(), name))))
                    }
                    _ => None,
                },
                StmtKind::Export(ExportDecl::DefaultDecl(inner)) => match &inner.kind {
                    StmtKind::FunctionDecl(func) if func.name.is_some() => {
                        let name = func.name.clone().unwrap_or_default();
                        Some((func, Some((SmolStr::new_static("default"), name))))
                    }
                    _ => None,
                },
                _ => None,
            };
            if let Some((func, export)) = func {
                let Some(name) = func.name.clone() else {
                    continue;
                };
                let idx = self.function(func, None)?;
                e.push(Op::MakeFunction(idx));
                let name_idx = self.str_const(&name);
                e.push(Op::Declare {
                    name: name_idx,
                    mutable: true,
                });
                if let Some(binding) = export {
                    self.deferred_exports.push(binding);
                }
            }
        }
        Ok(())
    }

    fn top_statement(&mut self, e: &mut Emitter, stmt: &Stmt) -> Result<(), TransformError> {
        match &stmt.kind {
            // Hoisted; the position keeps its check for stepping.
            StmtKind::Import(_) | StmtKind::FunctionDecl(_) => {
                self.check(e, stmt.pos);
                Ok(())
            }
            StmtKind::Export(decl) => {
                self.check(e, stmt.pos);
                self.export(e, decl, stmt.pos)
            }
            _ => {
                self.check(e, stmt.pos);
                self.statement(e, stmt)
            }
        }
    }

    fn export(&mut self, e: &mut Emitter, decl: &ExportDecl, pos: Pos) -> Result<(), TransformError> {
        match decl {
            ExportDecl::Named {
                specifiers,
                source: None,
            } => {
                for (local, exported) in specifiers {
                    let name = self.str_const(local);
                    e.push(Op::Load(name));
                    let key = self.str_const(exported);
                    e.push(Op::BindExport(key));
                }
                Ok(())
            }
            ExportDecl::Named {
                specifiers,
                source: Some(path),
            } => {
                let path = self.str_const(path);
                e.push(Op::ImportStatic(path));
                for (source_name, exported) in specifiers {
                    e.push(Op::Dup);
                    let key = self.str_const(source_name);
                    e.push(Op::GetProp(key));
                    let out = self.str_const(exported);
                    e.push(Op::BindExport(out));
                }
                e.push(Op::Pop);
                Ok(())
            }
            ExportDecl::Decl(inner) => match &inner.kind {
                StmtKind::VarDecl { decls, .. } => {
                    self.statement(e, inner)?;
                    for (name, _) in decls {
                        self.deferred_exports.push((name.clone(), name.clone()));
                    }
                    Ok(())
                }
                StmtKind::FunctionDecl(_) => Ok(()), // hoisted
                StmtKind::ClassDecl(class) => {
                    self.statement(e, inner)?;
                    if let Some(name) = &class.name {
                        self.deferred_exports.push((name.clone(), name.clone()));
                    }
                    Ok(())
                }
                _ => Err(Self::unsupported("export declaration", pos)),
            },
            ExportDecl::Default(expr) => {
                self.expr(e, expr)?;
                let key = self.str_const("default");
                e.push(Op::BindExport(key));
                Ok(())
            }
            ExportDecl::DefaultDecl(inner) => match &inner.kind {
                StmtKind::FunctionDecl(func) if func.name.is_some() => Ok(()), // hoisted
                StmtKind::FunctionDecl(func) => {
                    let idx = self.function(func, None)?;
                    e.push(Op::MakeFunction(idx));
                    let key = self.str_const("default");
                    e.push(Op::BindExport(key));
                    Ok(())
                }
                StmtKind::ClassDecl(class) => {
                    match &class.name {
                        Some(name) => {
                            self.statement(e, inner)?;
                            self.deferred_exports
                                .push((SmolStr::new_static("default"), name.clone()));
                        }
                        None => {
                            self.class_value(e, class)?;
                            let key = self.str_const("default");
                            e.push(Op::BindExport(key));
                        }
                    }
                    Ok(())
                }
                _ => Err(Self::unsupported("export declaration", pos)),
            },
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn block_body(&mut self, e: &mut Emitter, stmts: &[Stmt]) -> Result<(), TransformError> {
        self.hoist_functions(e, stmts)?;
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::FunctionDecl(_) => {
                    self.check(e, stmt.pos);
                }
                StmtKind::Import(_) | StmtKind::Export(_) => {
                    return Err(Self::unsupported("module declaration inside a block", stmt.pos))
                }
                _ => {
                    self.check(e, stmt.pos);
                    self.statement(e, stmt)?;
                }
            }
        }
        Ok(())
    }

    fn statement(&mut self, e: &mut Emitter, stmt: &Stmt) -> Result<(), TransformError> {
        match &stmt.kind {
            StmtKind::Empty | StmtKind::FunctionDecl(_) => Ok(()),
            StmtKind::Expr(expr) => {
                self.expr(e, expr)?;
                e.push(Op::Pop);
                Ok(())
            }
            StmtKind::VarDecl { kind, decls } => {
                for (name, init) in decls {
                    match init {
                        Some(expr) => self.expr(e, expr)?,
                        None => e.push(Op::Undef),
                    }
                    let name = self.str_const(name);
                    e.push(Op::Declare {
                        name,
                        mutable: *kind != DeclKind::Const,
                    });
                }
                Ok(())
            }
            StmtKind::ClassDecl(class) => {
                self.class_value(e, class)?;
                if let Some(name) = &class.name {
                    let name = self.str_const(name);
                    e.push(Op::Declare { name, mutable: true });
                }
                Ok(())
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.expr(e, expr)?,
                    None => e.push(Op::Undef),
                }
                e.push(Op::Return);
                Ok(())
            }
            StmtKind::Throw(expr) => {
                self.expr(e, expr)?;
                e.push(Op::Throw);
                Ok(())
            }
            StmtKind::If {
                test,
                then,
                otherwise,
            } => {
                self.expr(e, test)?;
                let to_else = e.jump_placeholder(Op::JumpIfFalse(0));
                self.statement(e, then)?;
                match otherwise {
                    Some(other) => {
                        let to_end = e.jump_placeholder(Op::Jump(0));
                        e.patch_to_here(to_else);
                        self.statement(e, other)?;
                        e.patch_to_here(to_end);
                    }
                    None => e.patch_to_here(to_else),
                }
                Ok(())
            }
            StmtKind::While { test, body } => {
                let push_loop = e.jump_placeholder(Op::PushLoop {
                    break_pc: 0,
                    continue_pc: 0,
                });
                let test_pc = e.pc();
                if let Op::PushLoop { continue_pc, .. } = &mut e.code[push_loop] {
                    *continue_pc = test_pc;
                }
                self.expr(e, test)?;
                let exit = e.jump_placeholder(Op::JumpIfFalse(0));
                e.loop_depth += 1;
                self.statement(e, body)?;
                e.loop_depth -= 1;
                e.push(Op::Jump(test_pc));
                e.patch_to_here(exit);
                e.push(Op::PopLoop);
                e.patch_to_here(push_loop); // break lands after PopLoop
                Ok(())
            }
            StmtKind::DoWhile { body, test } => {
                let push_loop = e.jump_placeholder(Op::PushLoop {
                    break_pc: 0,
                    continue_pc: 0,
                });
                let start = e.pc();
                e.loop_depth += 1;
                self.statement(e, body)?;
                e.loop_depth -= 1;
                let test_pc = e.pc();
                if let Op::PushLoop { continue_pc, .. } = &mut e.code[push_loop] {
                    *continue_pc = test_pc;
                }
                self.expr(e, test)?;
                let exit = e.jump_placeholder(Op::JumpIfFalse(0));
                e.push(Op::Jump(start));
                e.patch_to_here(exit);
                e.push(Op::PopLoop);
                e.patch_to_here(push_loop);
                Ok(())
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                e.push(Op::EnterBlock);
                if let Some(init) = init {
                    self.statement(e, init)?;
                }
                let push_loop = e.jump_placeholder(Op::PushLoop {
                    break_pc: 0,
                    continue_pc: 0,
                });
                let test_pc = e.pc();
                match test {
                    Some(expr) => {
                        self.expr(e, expr)?;
                    }
                    None => e.push(Op::True),
                }
                let exit = e.jump_placeholder(Op::JumpIfFalse(0));
                e.loop_depth += 1;
                self.statement(e, body)?;
                e.loop_depth -= 1;
                let update_pc = e.pc();
                if let Op::PushLoop { continue_pc, .. } = &mut e.code[push_loop] {
                    *continue_pc = update_pc;
                }
                if let Some(expr) = update {
                    self.expr(e, expr)?;
                    e.push(Op::Pop);
                }
                e.push(Op::Jump(test_pc));
                e.patch_to_here(exit);
                e.push(Op::PopLoop);
                e.patch_to_here(push_loop);
                e.push(Op::ExitScope);
                Ok(())
            }
            StmtKind::Break => {
                if e.loop_depth == 0 {
                    return Err(Self::unsupported("'break' outside of a loop", stmt.pos));
                }
                e.push(Op::Break);
                Ok(())
            }
            StmtKind::Continue => {
                if e.loop_depth == 0 {
                    return Err(Self::unsupported("'continue' outside of a loop", stmt.pos));
                }
                e.push(Op::Continue);
                Ok(())
            }
            StmtKind::Block(stmts) => {
                e.push(Op::EnterBlock);
                self.block_body(e, stmts)?;
                e.push(Op::ExitScope);
                Ok(())
            }
            StmtKind::Try {
                block,
                catch,
                finally,
            } => self.try_statement(e, block, catch.as_ref(), finally.as_deref()),
            StmtKind::Debugger => {
                if let Some(bp) = self.check(e, stmt.pos) {
                    if let Some(registry) = self.registry.as_deref_mut() {
                        registry.register(bp, Condition::Always);
                    }
                    self.registered.push((bp, Condition::Always));
                }
                Ok(())
            }
            StmtKind::Import(_) | StmtKind::Export(_) => {
                Err(Self::unsupported("module declaration inside a block", stmt.pos))
            }
        }
    }

    fn try_statement(
        &mut self,
        e: &mut Emitter,
        block: &[Stmt],
        catch: Option<&CatchClause>,
        finally: Option<&[Stmt]>,
    ) -> Result<(), TransformError> {
        let push_finally = finally.map(|_| e.jump_placeholder(Op::PushFinally(0)));
        let push_catch = catch.map(|_| e.jump_placeholder(Op::PushCatch(0)));

        e.push(Op::EnterBlock);
        self.block_body(e, block)?;
        e.push(Op::ExitScope);

        let mut to_after = Vec::new();
        if let Some(catch_at) = push_catch {
            e.push(Op::PopBlock);
            to_after.push(e.jump_placeholder(Op::Jump(0)));
            let catch_pc = e.pc();
            if let Op::PushCatch(t) = &mut e.code[catch_at] {
                *t = catch_pc;
            }
            let clause = catch.expect("catch clause present");
            e.push(Op::EnterBlock);
            match &clause.param {
                Some(name) => {
                    let name = self.str_const(name);
                    e.push(Op::Declare { name, mutable: true });
                }
                None => e.push(Op::Pop),
            }
            self.block_body(e, &clause.body)?;
            e.push(Op::ExitScope);
        }
        for at in to_after {
            e.patch_to_here(at);
        }

        if let Some(finally_at) = push_finally {
            e.push(Op::RunFinally);
            let finally_pc = e.pc();
            if let Op::PushFinally(t) = &mut e.code[finally_at] {
                *t = finally_pc;
            }
            e.push(Op::EnterBlock);
            self.block_body(e, finally.expect("finally present"))?;
            e.push(Op::ExitScope);
            e.push(Op::EndFinally);
        }
        Ok(())
    }

    // =========================================================================
    // Functions and classes
    // =========================================================================

    fn function(
        &mut self,
        func: &FunctionExpr,
        name_override: Option<SmolStr>,
    ) -> Result<u32, TransformError> {
        let display_name = name_override
            .or_else(|| func.name.clone())
            .unwrap_or_else(|| SmolStr::new_static("(anonymous)"));
        let mut e = Emitter::new();
        self.entry_check(&mut e, func.pos, &display_name);

        // Default parameter expressions are hoisted into explicit prologue
        // assignments so they stay observable to the frame evaluator.
        for param in &func.params {
            if let Some(default) = &param.default {
                let name = self.str_const(&param.name);
                e.push(Op::Load(name));
                e.push(Op::Undef);
                e.push(Op::Binary(BinOp::StrictEq));
                let skip = e.jump_placeholder(Op::JumpIfFalse(0));
                self.expr(&mut e, default)?;
                e.push(Op::Store(name));
                e.push(Op::Pop);
                e.patch_to_here(skip);
            }
        }

        match &func.body {
            FnBody::Block(stmts) => {
                self.block_body(&mut e, stmts)?;
                e.push(Op::Undef);
                e.push(Op::Return);
            }
            FnBody::Expr(expr) => {
                self.expr(&mut e, expr)?;
                e.push(Op::Return);
            }
        }

        let idx = self.funcs.len() as u32;
        self.funcs.push(FunctionProto {
            name: display_name,
            params: func.params.iter().map(|p| p.name.clone()).collect(),
            code: e.code,
            is_async: func.is_async,
            is_arrow: func.is_arrow,
        });
        Ok(idx)
    }

    /// Compiles a class body and emits `[superclass] -> [class]`.
    fn class_value(&mut self, e: &mut Emitter, class: &ClassDecl) -> Result<(), TransformError> {
        match &class.superclass {
            Some(expr) => self.expr(e, expr)?,
            None => e.push(Op::Undef),
        }
        let class_name = class
            .name
            .clone()
            .unwrap_or_else(|| SmolStr::new_static("(anonymous)"));
        let mut ctor = None;
        let mut methods = Vec::new();
        for member in &class.members {
            if member.is_constructor {
                // The declared constructor is extracted into a plain
                // suspendable method so construction can pause and delegate.
                let idx = self.function(&member.func, Some(class_name.clone()))?;
                ctor = Some(idx);
            } else {
                let idx = self.function(&member.func, Some(member.name.clone()))?;
                methods.push((member.name.clone(), idx));
            }
        }
        let class_idx = self.classes.len() as u32;
        self.classes.push(ClassProto {
            name: class_name,
            ctor,
            methods,
        });
        e.push(Op::MakeClass(class_idx));
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    #[allow(clippy::too_many_lines)]
    fn expr(&mut self, e: &mut Emitter, expr: &Expr) -> Result<(), TransformError> {
        match &expr.kind {
            ExprKind::Number(n) => {
                let idx = self.num_const(*n);
                e.push(Op::Const(idx));
            }
            ExprKind::Str(s) => {
                let idx = self.str_const(s);
                e.push(Op::Const(idx));
            }
            ExprKind::Bool(true) => e.push(Op::True),
            ExprKind::Bool(false) => e.push(Op::False),
            ExprKind::Null => e.push(Op::Null),
            ExprKind::Undefined => e.push(Op::Undef),
            ExprKind::Ident(name) => {
                let idx = self.str_const(name);
                e.push(Op::Load(idx));
            }
            ExprKind::This => {
                let idx = self.str_const(HIDDEN_THIS);
                e.push(Op::Load(idx));
            }
            ExprKind::ImportMeta => {
                let idx = self.str_const(HIDDEN_IMPORT_META);
                e.push(Op::Load(idx));
            }
            ExprKind::NewTarget => {
                let idx = self.str_const(HIDDEN_NEW_TARGET);
                e.push(Op::Load(idx));
            }
            ExprKind::Array(elements) => {
                for element in elements {
                    self.expr(e, element)?;
                }
                e.push(Op::MakeArray(elements.len() as u32));
            }
            ExprKind::Object(props) => {
                for (key, value) in props {
                    match key {
                        PropKey::Ident(name) => {
                            let idx = self.str_const(name);
                            e.push(Op::Const(idx));
                        }
                        PropKey::Str(s) => {
                            let idx = self.str_const(s);
                            e.push(Op::Const(idx));
                        }
                        PropKey::Computed(expr) => self.expr(e, expr)?,
                    }
                    self.expr(e, value)?;
                }
                e.push(Op::MakeObject(props.len() as u32));
            }
            ExprKind::Member { object, property } => {
                self.expr(e, object)?;
                match property {
                    MemberKey::Name(name) => {
                        let idx = self.str_const(name);
                        e.push(Op::GetProp(idx));
                    }
                    MemberKey::Index(index) => {
                        self.expr(e, index)?;
                        e.push(Op::GetIndex);
                    }
                }
            }
            ExprKind::Call { callee, args } => {
                self.call(e, expr.pos, callee, args)?;
            }
            ExprKind::SuperCall(args) => {
                let idx = self.str_const(HIDDEN_SUPER);
                e.push(Op::Load(idx));
                for arg in args {
                    self.expr(e, arg)?;
                }
                e.push(Op::CallSuper {
                    argc: args.len() as u32,
                    line: expr.pos.line,
                    col: expr.pos.column,
                });
            }
            ExprKind::New { callee, args } => {
                self.expr(e, callee)?;
                for arg in args {
                    self.expr(e, arg)?;
                }
                e.push(Op::New {
                    argc: args.len() as u32,
                    line: expr.pos.line,
                    col: expr.pos.column,
                });
            }
            ExprKind::Unary { op, expr: operand } => match op {
                UnaryOp::TypeOf => {
                    if let ExprKind::Ident(name) = &operand.kind {
                        let idx = self.str_const(name);
                        e.push(Op::TypeofName(idx));
                    } else {
                        self.expr(e, operand)?;
                        e.push(Op::Unary(UnOp::TypeOf));
                    }
                }
                UnaryOp::Neg => {
                    self.expr(e, operand)?;
                    e.push(Op::Unary(UnOp::Neg));
                }
                UnaryOp::Plus => {
                    self.expr(e, operand)?;
                    e.push(Op::Unary(UnOp::ToNumber));
                }
                UnaryOp::Not => {
                    self.expr(e, operand)?;
                    e.push(Op::Unary(UnOp::Not));
                }
            },
            ExprKind::Delete(target) => {
                let ExprKind::Member { object, property } = &target.kind else {
                    return Err(Self::unsupported("'delete' target", expr.pos));
                };
                self.expr(e, object)?;
                match property {
                    MemberKey::Name(name) => {
                        let idx = self.str_const(name);
                        e.push(Op::DeleteProp(idx));
                    }
                    MemberKey::Index(index) => {
                        self.expr(e, index)?;
                        e.push(Op::DeleteIndex);
                    }
                }
            }
            ExprKind::Binary { op, left, right } => {
                self.expr(e, left)?;
                self.expr(e, right)?;
                e.push(Op::Binary(bin_op(*op)));
            }
            ExprKind::Logical { op, left, right } => {
                self.expr(e, left)?;
                let short = e.jump_placeholder(match op {
                    LogicalOp::And => Op::JumpFalseKeep(0),
                    LogicalOp::Or => Op::JumpTrueKeep(0),
                });
                e.push(Op::Pop);
                self.expr(e, right)?;
                e.patch_to_here(short);
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(e, test)?;
                let to_alt = e.jump_placeholder(Op::JumpIfFalse(0));
                self.expr(e, consequent)?;
                let to_end = e.jump_placeholder(Op::Jump(0));
                e.patch_to_here(to_alt);
                self.expr(e, alternate)?;
                e.patch_to_here(to_end);
            }
            ExprKind::Assign { op, target, value } => {
                self.assignment(e, *op, target, value)?;
            }
            ExprKind::Update {
                op,
                prefix,
                target,
            } => {
                self.update(e, *op, *prefix, target, expr.pos)?;
            }
            ExprKind::Function(func) => {
                let idx = self.function(func, None)?;
                e.push(Op::MakeFunction(idx));
            }
            ExprKind::ClassExpr(class) => {
                self.class_value(e, class)?;
            }
            ExprKind::Await(operand) => {
                self.expr(e, operand)?;
                e.push(Op::Await);
            }
            ExprKind::ImportCall(path) => {
                self.expr(e, path)?;
                e.push(Op::ImportDynamic);
            }
        }
        Ok(())
    }

    /// Calls split the callee read from the application; method calls also
    /// make the `this` binding explicit before the arguments evaluate.
    fn call(
        &mut self,
        e: &mut Emitter,
        pos: Pos,
        callee: &Expr,
        args: &[Expr],
    ) -> Result<(), TransformError> {
        if let ExprKind::Member { object, property } = &callee.kind {
            // Reflective construction unifies with `new` through the
            // instance-creation protocol.
            if let (ExprKind::Ident(obj), MemberKey::Name(prop)) = (&object.kind, property) {
                if obj == "Reflect" && prop == "construct" && (args.len() == 2 || args.len() == 3) {
                    for arg in args {
                        self.expr(e, arg)?;
                    }
                    e.push(Op::ConstructApply {
                        alt_target: args.len() == 3,
                        line: pos.line,
                        col: pos.column,
                    });
                    return Ok(());
                }
            }
            self.expr(e, object)?;
            match property {
                MemberKey::Name(name) => {
                    let idx = self.str_const(name);
                    e.push(Op::GetMethod(idx));
                }
                MemberKey::Index(index) => {
                    self.expr(e, index)?;
                    e.push(Op::GetMethodIndex);
                }
            }
            for arg in args {
                self.expr(e, arg)?;
            }
            e.push(Op::CallMethod {
                argc: args.len() as u32,
                line: pos.line,
                col: pos.column,
            });
            return Ok(());
        }
        self.expr(e, callee)?;
        for arg in args {
            self.expr(e, arg)?;
        }
        e.push(Op::Call {
            argc: args.len() as u32,
            line: pos.line,
            col: pos.column,
        });
        Ok(())
    }

    fn assignment(
        &mut self,
        e: &mut Emitter,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
    ) -> Result<(), TransformError> {
        let arith = assign_bin_op(op);
        match &target.kind {
            ExprKind::Ident(name) => {
                let name = self.str_const(name);
                if let Some(bin) = arith {
                    e.push(Op::Load(name));
                    self.expr(e, value)?;
                    e.push(Op::Binary(bin));
                } else {
                    self.expr(e, value)?;
                }
                e.push(Op::Store(name));
            }
            ExprKind::Member { object, property } => match property {
                MemberKey::Name(prop) => {
                    let prop = self.str_const(prop);
                    self.expr(e, object)?;
                    if let Some(bin) = arith {
                        let tmp = self.alloc_tmp(e, target.pos)?;
                        e.push(Op::StoreTmp(tmp));
                        e.push(Op::LoadTmp(tmp));
                        e.push(Op::LoadTmp(tmp));
                        e.push(Op::GetProp(prop));
                        self.expr(e, value)?;
                        e.push(Op::Binary(bin));
                        self.free_tmp(e);
                    } else {
                        self.expr(e, value)?;
                    }
                    e.push(Op::SetProp(prop));
                }
                MemberKey::Index(index) => {
                    self.expr(e, object)?;
                    if let Some(bin) = arith {
                        let t_obj = self.alloc_tmp(e, target.pos)?;
                        e.push(Op::StoreTmp(t_obj));
                        self.expr(e, index)?;
                        let t_key = self.alloc_tmp(e, target.pos)?;
                        e.push(Op::StoreTmp(t_key));
                        e.push(Op::LoadTmp(t_obj));
                        e.push(Op::LoadTmp(t_key));
                        e.push(Op::LoadTmp(t_obj));
                        e.push(Op::LoadTmp(t_key));
                        e.push(Op::GetIndex);
                        self.expr(e, value)?;
                        e.push(Op::Binary(bin));
                        self.free_tmp(e);
                        self.free_tmp(e);
                    } else {
                        self.expr(e, index)?;
                        self.expr(e, value)?;
                    }
                    e.push(Op::SetIndex);
                }
            },
            _ => return Err(Self::unsupported("assignment target", target.pos)),
        }
        Ok(())
    }

    fn update(
        &mut self,
        e: &mut Emitter,
        op: UpdateOp,
        prefix: bool,
        target: &Expr,
        pos: Pos,
    ) -> Result<(), TransformError> {
        let bin = match op {
            UpdateOp::Inc => BinOp::Add,
            UpdateOp::Dec => BinOp::Sub,
        };
        let one = self.num_const(1.0);
        match &target.kind {
            ExprKind::Ident(name) => {
                let name = self.str_const(name);
                e.push(Op::Load(name));
                e.push(Op::Unary(UnOp::ToNumber));
                if prefix {
                    e.push(Op::Const(one));
                    e.push(Op::Binary(bin));
                    e.push(Op::Store(name));
                } else {
                    e.push(Op::Dup);
                    e.push(Op::Const(one));
                    e.push(Op::Binary(bin));
                    e.push(Op::Store(name));
                    e.push(Op::Pop);
                }
            }
            ExprKind::Member { object, property } => {
                let prop_idx = match property {
                    MemberKey::Name(name) => Some(self.str_const(name)),
                    MemberKey::Index(_) => None,
                };
                self.expr(e, object)?;
                let t_obj = self.alloc_tmp(e, pos)?;
                e.push(Op::StoreTmp(t_obj));
                let t_key = match property {
                    MemberKey::Index(index) => {
                        self.expr(e, index)?;
                        let t = self.alloc_tmp(e, pos)?;
                        e.push(Op::StoreTmp(t));
                        Some(t)
                    }
                    MemberKey::Name(_) => None,
                };
                // Read the current value.
                e.push(Op::LoadTmp(t_obj));
                if let Some(t) = t_key {
                    e.push(Op::LoadTmp(t));
                    e.push(Op::GetIndex);
                } else {
                    e.push(Op::GetProp(prop_idx.expect("named property")));
                }
                e.push(Op::Unary(UnOp::ToNumber));
                if prefix {
                    e.push(Op::Const(one));
                    e.push(Op::Binary(bin));
                    let t_new = self.alloc_tmp(e, pos)?;
                    e.push(Op::StoreTmp(t_new));
                    self.write_back(e, t_obj, t_key, prop_idx, t_new);
                    e.push(Op::Pop);
                    e.push(Op::LoadTmp(t_new));
                    self.free_tmp(e);
                } else {
                    let t_old = self.alloc_tmp(e, pos)?;
                    e.push(Op::StoreTmp(t_old));
                    e.push(Op::LoadTmp(t_old));
                    e.push(Op::Const(one));
                    e.push(Op::Binary(bin));
                    let t_new = self.alloc_tmp(e, pos)?;
                    e.push(Op::StoreTmp(t_new));
                    self.write_back(e, t_obj, t_key, prop_idx, t_new);
                    e.push(Op::Pop);
                    e.push(Op::LoadTmp(t_old));
                    self.free_tmp(e);
                    self.free_tmp(e);
                }
                if t_key.is_some() {
                    self.free_tmp(e);
                }
                self.free_tmp(e);
            }
            _ => return Err(Self::unsupported("update target", pos)),
        }
        Ok(())
    }

    /// `obj[key] = tmps[value]`, leaving the stored value on the stack.
    fn write_back(
        &mut self,
        e: &mut Emitter,
        t_obj: u8,
        t_key: Option<u8>,
        prop_idx: Option<u32>,
        t_value: u8,
    ) {
        e.push(Op::LoadTmp(t_obj));
        if let Some(t) = t_key {
            e.push(Op::LoadTmp(t));
            e.push(Op::LoadTmp(t_value));
            e.push(Op::SetIndex);
        } else {
            e.push(Op::LoadTmp(t_value));
            e.push(Op::SetProp(prop_idx.expect("named property")));
        }
    }

    fn alloc_tmp(&mut self, e: &mut Emitter, pos: Pos) -> Result<u8, TransformError> {
        if e.tmp >= MAX_TMP {
            return Err(Self::unsupported("expression nesting too deep", pos));
        }
        let t = e.tmp;
        e.tmp += 1;
        Ok(t)
    }

    #[allow(clippy::unused_self)]
    fn free_tmp(&mut self, e: &mut Emitter) {
        e.tmp = e.tmp.saturating_sub(1);
    }
}

fn bin_op(op: stride_syntax::ast::BinaryOp) -> BinOp {
    use stride_syntax::ast::BinaryOp as Ast;
    match op {
        Ast::Add => BinOp::Add,
        Ast::Sub => BinOp::Sub,
        Ast::Mul => BinOp::Mul,
        Ast::Div => BinOp::Div,
        Ast::Rem => BinOp::Rem,
        Ast::Eq => BinOp::Eq,
        Ast::NotEq => BinOp::NotEq,
        Ast::StrictEq => BinOp::StrictEq,
        Ast::StrictNotEq => BinOp::StrictNotEq,
        Ast::Less => BinOp::Less,
        Ast::LessEq => BinOp::LessEq,
        Ast::Greater => BinOp::Greater,
        Ast::GreaterEq => BinOp::GreaterEq,
    }
}

fn assign_bin_op(op: AssignOp) -> Option<BinOp> {
    match op {
        AssignOp::Assign => None,
        AssignOp::Add => Some(BinOp::Add),
        AssignOp::Sub => Some(BinOp::Sub),
        AssignOp::Mul => Some(BinOp::Mul),
        AssignOp::Div => Some(BinOp::Div),
        AssignOp::Rem => Some(BinOp::Rem),
    }
}
