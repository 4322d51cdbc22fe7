//! AST for the script language.
//!
//! Every node carries the position of its first token; the engine keys
//! breakpoints and call-frame bookkeeping off these positions.

use smol_str::SmolStr;

use crate::lexer::Pos;

/// An expression with its source position.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

/// Expression node.
#[derive(Debug, Clone)]
pub enum ExprKind {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Ident(SmolStr),
    This,
    Array(Vec<Expr>),
    Object(Vec<(PropKey, Expr)>),
    Member {
        object: Box<Expr>,
        property: MemberKey,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    SuperCall(Vec<Expr>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Function(Box<FunctionExpr>),
    ClassExpr(Box<ClassDecl>),
    Await(Box<Expr>),
    /// Dynamic `import(expr)`.
    ImportCall(Box<Expr>),
    ImportMeta,
    NewTarget,
    Delete(Box<Expr>),
}

/// Object literal property key.
#[derive(Debug, Clone)]
pub enum PropKey {
    Ident(SmolStr),
    Str(String),
    Computed(Box<Expr>),
}

/// Member access key.
#[derive(Debug, Clone)]
pub enum MemberKey {
    Name(SmolStr),
    Index(Box<Expr>),
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    TypeOf,
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
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

/// Short-circuiting logical operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Assignment operator (compound forms carry their arithmetic op).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Increment/decrement operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Inc,
    Dec,
}

/// Function parameter with an optional default expression.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: SmolStr,
    pub default: Option<Expr>,
}

/// Function body: a block, or an arrow's bare expression.
#[derive(Debug, Clone)]
pub enum FnBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

/// A function, arrow, or method.
#[derive(Debug, Clone)]
pub struct FunctionExpr {
    pub name: Option<SmolStr>,
    pub params: Vec<Param>,
    pub body: FnBody,
    pub is_arrow: bool,
    pub is_async: bool,
    pub pos: Pos,
}

/// A statement with its source position.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

/// Statement node.
#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    VarDecl {
        kind: DeclKind,
        decls: Vec<(SmolStr, Option<Expr>)>,
    },
    FunctionDecl(Box<FunctionExpr>),
    ClassDecl(Box<ClassDecl>),
    Return(Option<Expr>),
    If {
        test: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        catch: Option<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Block(Vec<Stmt>),
    Import(ImportDecl),
    Export(ExportDecl),
    Debugger,
    Empty,
}

/// Declaration keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

/// `catch` clause with an optional binding.
#[derive(Debug, Clone)]
pub struct CatchClause {
    pub param: Option<SmolStr>,
    pub body: Vec<Stmt>,
}

/// Class declaration or expression.
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: Option<SmolStr>,
    pub superclass: Option<Expr>,
    pub members: Vec<ClassMember>,
    pub pos: Pos,
}

/// One method in a class body.
#[derive(Debug, Clone)]
pub struct ClassMember {
    pub name: SmolStr,
    pub is_constructor: bool,
    pub func: FunctionExpr,
}

/// `import` declaration bindings.
#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub source: SmolStr,
    pub default: Option<SmolStr>,
    pub namespace: Option<SmolStr>,
    /// (imported name, local name) pairs.
    pub named: Vec<(SmolStr, SmolStr)>,
}

/// `export` declaration forms.
#[derive(Debug, Clone)]
pub enum ExportDecl {
    /// `export { a, b as c }` / `export { a } from 'mod'`.
    Named {
        /// (local or source-side name, exported name) pairs.
        specifiers: Vec<(SmolStr, SmolStr)>,
        source: Option<SmolStr>,
    },
    /// `export <declaration>`.
    Decl(Box<Stmt>),
    /// `export default <expression>`.
    Default(Expr),
    /// `export default <function or class declaration>`.
    DefaultDecl(Box<Stmt>),
}

/// A parsed program.
#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Stmt>,
}
