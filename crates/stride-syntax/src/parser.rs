//! Recursive-descent parser for the script language.
//!
//! Statements are parsed by construct; expressions use precedence climbing.
//! Semicolons are required except before `}`, at end of input, or when the
//! next token starts on a later line.

use smol_str::SmolStr;
use thiserror::Error;

use crate::ast::*;
use crate::lexer::{lex, unescape, LineMap, Pos, Token, TokenKind};

/// A parse failure with the position of the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at {pos}: {message}")]
pub struct ParseError {
    /// Human-readable description.
    pub message: String,
    /// Position of the offending token.
    pub pos: Pos,
}

/// Parses a full program.
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new(source);
    let mut body = Vec::new();
    while !parser.at_end() {
        body.push(parser.statement()?);
    }
    Ok(Program { body })
}

/// Parses a single expression (used by the frame evaluator).
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(source);
    let expr = parser.expression()?;
    if !parser.at_end() {
        return Err(parser.error_here("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    lines: LineMap,
    idx: usize,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            source,
            tokens: lex(source),
            lines: LineMap::new(source),
            idx: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.idx >= self.tokens.len()
    }

    fn peek(&self) -> Option<TokenKind> {
        self.tokens.get(self.idx).map(|t| t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.idx + offset).map(|t| t.kind)
    }

    fn pos(&self) -> Pos {
        match self.tokens.get(self.idx) {
            Some(t) => self.lines.pos(t.start),
            None => match self.tokens.last() {
                Some(t) => self.lines.pos(t.end),
                None => Pos::new(1, 0),
            },
        }
    }

    fn text(&self, token: Token) -> &'src str {
        &self.source[token.start as usize..token.end as usize]
    }

    fn error_here(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            pos: self.pos(),
        }
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.idx];
        self.idx += 1;
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.peek() == Some(kind) {
            Ok(self.bump())
        } else {
            Err(self.error_here(&format!("expected {what}")))
        }
    }

    fn ident(&mut self, what: &str) -> Result<SmolStr, ParseError> {
        let token = self.expect(TokenKind::Ident, what)?;
        Ok(SmolStr::new(self.text(token)))
    }

    fn string_literal(&mut self, what: &str) -> Result<String, ParseError> {
        let token = self.expect(TokenKind::Str, what)?;
        Ok(unescape(self.text(token)))
    }

    /// True when the current token starts on a later line than the previous
    /// token ended on.
    fn on_new_line(&self) -> bool {
        if self.idx == 0 || self.at_end() {
            return true;
        }
        let prev = self.lines.pos(self.tokens[self.idx - 1].end).line;
        let cur = self.lines.pos(self.tokens[self.idx].start).line;
        cur > prev
    }

    fn expect_semi(&mut self) -> Result<(), ParseError> {
        if self.eat(TokenKind::Semicolon) {
            return Ok(());
        }
        if self.at_end() || self.peek() == Some(TokenKind::RBrace) || self.on_new_line() {
            return Ok(());
        }
        Err(self.error_here("expected ';'"))
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.pos();
        let kind = match self.peek() {
            Some(TokenKind::Semicolon) => {
                self.bump();
                StmtKind::Empty
            }
            Some(TokenKind::LBrace) => StmtKind::Block(self.block()?),
            Some(TokenKind::KwLet | TokenKind::KwConst | TokenKind::KwVar) => {
                let stmt = self.var_decl()?;
                self.expect_semi()?;
                stmt
            }
            Some(TokenKind::KwFunction) => {
                StmtKind::FunctionDecl(Box::new(self.function(false, true)?))
            }
            Some(TokenKind::KwAsync) if self.peek_at(1) == Some(TokenKind::KwFunction) => {
                self.bump();
                StmtKind::FunctionDecl(Box::new(self.function(true, true)?))
            }
            Some(TokenKind::KwClass) => StmtKind::ClassDecl(Box::new(self.class(true)?)),
            Some(TokenKind::KwReturn) => {
                self.bump();
                let value = if self.at_end()
                    || self.peek() == Some(TokenKind::Semicolon)
                    || self.peek() == Some(TokenKind::RBrace)
                    || self.on_new_line()
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect_semi()?;
                StmtKind::Return(value)
            }
            Some(TokenKind::KwIf) => self.if_statement()?,
            Some(TokenKind::KwWhile) => {
                self.bump();
                self.expect(TokenKind::LParen, "'('")?;
                let test = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                let body = Box::new(self.statement()?);
                StmtKind::While { test, body }
            }
            Some(TokenKind::KwDo) => {
                self.bump();
                let body = Box::new(self.statement()?);
                self.expect(TokenKind::KwWhile, "'while'")?;
                self.expect(TokenKind::LParen, "'('")?;
                let test = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                self.expect_semi()?;
                StmtKind::DoWhile { body, test }
            }
            Some(TokenKind::KwFor) => self.for_statement()?,
            Some(TokenKind::KwBreak) => {
                self.bump();
                self.expect_semi()?;
                StmtKind::Break
            }
            Some(TokenKind::KwContinue) => {
                self.bump();
                self.expect_semi()?;
                StmtKind::Continue
            }
            Some(TokenKind::KwThrow) => {
                self.bump();
                let value = self.expression()?;
                self.expect_semi()?;
                StmtKind::Throw(value)
            }
            Some(TokenKind::KwTry) => self.try_statement()?,
            Some(TokenKind::KwImport)
                if matches!(
                    self.peek_at(1),
                    Some(
                        TokenKind::Str
                            | TokenKind::Ident
                            | TokenKind::Star
                            | TokenKind::LBrace
                            | TokenKind::KwDefault
                    )
                ) =>
            {
                let stmt = self.import_decl()?;
                self.expect_semi()?;
                stmt
            }
            Some(TokenKind::KwExport) => {
                let stmt = self.export_decl()?;
                self.expect_semi()?;
                stmt
            }
            Some(TokenKind::KwDebugger) => {
                self.bump();
                self.expect_semi()?;
                StmtKind::Debugger
            }
            Some(_) => {
                let expr = self.expression()?;
                self.expect_semi()?;
                StmtKind::Expr(expr)
            }
            None => return Err(self.error_here("unexpected end of input")),
        };
        Ok(Stmt { kind, pos })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut body = Vec::new();
        while self.peek() != Some(TokenKind::RBrace) {
            if self.at_end() {
                return Err(self.error_here("unterminated block"));
            }
            body.push(self.statement()?);
        }
        self.bump();
        Ok(body)
    }

    fn var_decl(&mut self) -> Result<StmtKind, ParseError> {
        let kind = match self.bump().kind {
            TokenKind::KwConst => DeclKind::Const,
            TokenKind::KwVar => DeclKind::Var,
            _ => DeclKind::Let,
        };
        let mut decls = Vec::new();
        loop {
            let name = self.ident("binding name")?;
            let init = if self.eat(TokenKind::Assign) {
                Some(self.assignment()?)
            } else {
                None
            };
            decls.push((name, init));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(StmtKind::VarDecl { kind, decls })
    }

    fn if_statement(&mut self) -> Result<StmtKind, ParseError> {
        self.bump();
        self.expect(TokenKind::LParen, "'('")?;
        let test = self.expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        let then = Box::new(self.statement()?);
        let otherwise = if self.eat(TokenKind::KwElse) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(StmtKind::If {
            test,
            then,
            otherwise,
        })
    }

    fn for_statement(&mut self) -> Result<StmtKind, ParseError> {
        self.bump();
        self.expect(TokenKind::LParen, "'('")?;
        let init = if self.eat(TokenKind::Semicolon) {
            None
        } else {
            let pos = self.pos();
            let kind = if matches!(
                self.peek(),
                Some(TokenKind::KwLet | TokenKind::KwConst | TokenKind::KwVar)
            ) {
                self.var_decl()?
            } else {
                StmtKind::Expr(self.expression()?)
            };
            self.expect(TokenKind::Semicolon, "';'")?;
            Some(Box::new(Stmt { kind, pos }))
        };
        let test = if self.peek() == Some(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Semicolon, "';'")?;
        let update = if self.peek() == Some(TokenKind::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::RParen, "')'")?;
        let body = Box::new(self.statement()?);
        Ok(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn try_statement(&mut self) -> Result<StmtKind, ParseError> {
        self.bump();
        let block = self.block()?;
        let catch = if self.eat(TokenKind::KwCatch) {
            let param = if self.eat(TokenKind::LParen) {
                let name = self.ident("catch binding")?;
                self.expect(TokenKind::RParen, "')'")?;
                Some(name)
            } else {
                None
            };
            Some(CatchClause {
                param,
                body: self.block()?,
            })
        } else {
            None
        };
        let finally = if self.eat(TokenKind::KwFinally) {
            Some(self.block()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            return Err(self.error_here("expected 'catch' or 'finally'"));
        }
        Ok(StmtKind::Try {
            block,
            catch,
            finally,
        })
    }

    fn import_decl(&mut self) -> Result<StmtKind, ParseError> {
        self.bump();
        let mut decl = ImportDecl {
            source: SmolStr::default(),
            default: None,
            namespace: None,
            named: Vec::new(),
        };
        if self.peek() == Some(TokenKind::Str) {
            decl.source = SmolStr::new(self.string_literal("module path")?);
            return Ok(StmtKind::Import(decl));
        }
        if self.peek() == Some(TokenKind::Ident) {
            decl.default = Some(self.ident("default import binding")?);
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::KwFrom, "'from'")?;
                decl.source = SmolStr::new(self.string_literal("module path")?);
                return Ok(StmtKind::Import(decl));
            }
        }
        if self.eat(TokenKind::Star) {
            self.expect(TokenKind::KwAs, "'as'")?;
            decl.namespace = Some(self.ident("namespace binding")?);
        } else {
            self.expect(TokenKind::LBrace, "'{'")?;
            while !self.eat(TokenKind::RBrace) {
                let imported = self.import_name()?;
                let local = if self.eat(TokenKind::KwAs) {
                    self.ident("import alias")?
                } else {
                    imported.clone()
                };
                decl.named.push((imported, local));
                if !self.eat(TokenKind::Comma) {
                    self.expect(TokenKind::RBrace, "'}'")?;
                    break;
                }
            }
        }
        self.expect(TokenKind::KwFrom, "'from'")?;
        decl.source = SmolStr::new(self.string_literal("module path")?);
        Ok(StmtKind::Import(decl))
    }

    fn import_name(&mut self) -> Result<SmolStr, ParseError> {
        if self.eat(TokenKind::KwDefault) {
            Ok(SmolStr::new_static("default"))
        } else {
            self.ident("import name")
        }
    }

    fn export_decl(&mut self) -> Result<StmtKind, ParseError> {
        self.bump();
        if self.peek() == Some(TokenKind::Star) {
            return Err(self.error_here("unsupported export form"));
        }
        if self.eat(TokenKind::KwDefault) {
            let decl = match self.peek() {
                Some(TokenKind::KwFunction) => Some(StmtKind::FunctionDecl(Box::new(
                    self.function(false, false)?,
                ))),
                Some(TokenKind::KwAsync) if self.peek_at(1) == Some(TokenKind::KwFunction) => {
                    self.bump();
                    Some(StmtKind::FunctionDecl(Box::new(self.function(true, false)?)))
                }
                Some(TokenKind::KwClass) => {
                    Some(StmtKind::ClassDecl(Box::new(self.class(false)?)))
                }
                _ => None,
            };
            let pos = self.pos();
            return Ok(StmtKind::Export(match decl {
                Some(kind) => ExportDecl::DefaultDecl(Box::new(Stmt { kind, pos })),
                None => ExportDecl::Default(self.assignment()?),
            }));
        }
        if self.peek() == Some(TokenKind::LBrace) {
            self.bump();
            let mut specifiers = Vec::new();
            while !self.eat(TokenKind::RBrace) {
                let local = self.import_name()?;
                let exported = if self.eat(TokenKind::KwAs) {
                    self.import_name()?
                } else {
                    local.clone()
                };
                specifiers.push((local, exported));
                if !self.eat(TokenKind::Comma) {
                    self.expect(TokenKind::RBrace, "'}'")?;
                    break;
                }
            }
            let source = if self.eat(TokenKind::KwFrom) {
                Some(SmolStr::new(self.string_literal("module path")?))
            } else {
                None
            };
            return Ok(StmtKind::Export(ExportDecl::Named { specifiers, source }));
        }
        let pos = self.pos();
        let kind = match self.peek() {
            Some(TokenKind::KwLet | TokenKind::KwConst | TokenKind::KwVar) => self.var_decl()?,
            Some(TokenKind::KwFunction) => {
                StmtKind::FunctionDecl(Box::new(self.function(false, true)?))
            }
            Some(TokenKind::KwAsync) if self.peek_at(1) == Some(TokenKind::KwFunction) => {
                self.bump();
                StmtKind::FunctionDecl(Box::new(self.function(true, true)?))
            }
            Some(TokenKind::KwClass) => StmtKind::ClassDecl(Box::new(self.class(true)?)),
            _ => return Err(self.error_here("unsupported export form")),
        };
        Ok(StmtKind::Export(ExportDecl::Decl(Box::new(Stmt {
            kind,
            pos,
        }))))
    }

    // =========================================================================
    // Functions and classes
    // =========================================================================

    fn function(&mut self, is_async: bool, require_name: bool) -> Result<FunctionExpr, ParseError> {
        let pos = self.pos();
        self.expect(TokenKind::KwFunction, "'function'")?;
        let name = if self.peek() == Some(TokenKind::Ident) {
            Some(self.ident("function name")?)
        } else if require_name {
            return Err(self.error_here("expected function name"));
        } else {
            None
        };
        let params = self.params()?;
        let body = FnBody::Block(self.block()?);
        Ok(FunctionExpr {
            name,
            params,
            body,
            is_arrow: false,
            is_async,
            pos,
        })
    }

    fn params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.eat(TokenKind::RParen) {
            let name = self.ident("parameter name")?;
            let default = if self.eat(TokenKind::Assign) {
                Some(self.assignment()?)
            } else {
                None
            };
            params.push(Param { name, default });
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::RParen, "')'")?;
                break;
            }
        }
        Ok(params)
    }

    fn class(&mut self, require_name: bool) -> Result<ClassDecl, ParseError> {
        let pos = self.pos();
        self.expect(TokenKind::KwClass, "'class'")?;
        let name = if self.peek() == Some(TokenKind::Ident) {
            Some(self.ident("class name")?)
        } else if require_name {
            return Err(self.error_here("expected class name"));
        } else {
            None
        };
        let superclass = if self.eat(TokenKind::KwExtends) {
            Some(self.unary()?)
        } else {
            None
        };
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut members = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            if self.eat(TokenKind::Semicolon) {
                continue;
            }
            let is_async = self.peek() == Some(TokenKind::KwAsync)
                && self.peek_at(1) == Some(TokenKind::Ident);
            if is_async {
                self.bump();
            }
            let method_pos = self.pos();
            let name = self.ident("method name")?;
            let params = self.params()?;
            let body = FnBody::Block(self.block()?);
            let is_constructor = name == "constructor";
            members.push(ClassMember {
                name: name.clone(),
                is_constructor,
                func: FunctionExpr {
                    name: Some(name),
                    params,
                    body,
                    is_arrow: false,
                    is_async,
                    pos: method_pos,
                },
            });
        }
        Ok(ClassDecl {
            name,
            superclass,
            members,
            pos,
        })
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        let target = self.conditional()?;
        let op = match self.peek() {
            Some(TokenKind::Assign) => AssignOp::Assign,
            Some(TokenKind::PlusAssign) => AssignOp::Add,
            Some(TokenKind::MinusAssign) => AssignOp::Sub,
            Some(TokenKind::StarAssign) => AssignOp::Mul,
            Some(TokenKind::SlashAssign) => AssignOp::Div,
            Some(TokenKind::PercentAssign) => AssignOp::Rem,
            _ => return Ok(target),
        };
        if !matches!(target.kind, ExprKind::Ident(_) | ExprKind::Member { .. }) {
            return Err(self.error_here("invalid assignment target"));
        }
        self.bump();
        let value = self.assignment()?;
        Ok(Expr {
            kind: ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            pos,
        })
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        let test = self.logical_or()?;
        if !self.eat(TokenKind::Question) {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect(TokenKind::Colon, "':'")?;
        let alternate = self.assignment()?;
        Ok(Expr {
            kind: ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            pos,
        })
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.logical_and()?;
        while self.peek() == Some(TokenKind::OrOr) {
            let pos = self.pos();
            self.bump();
            let right = self.logical_and()?;
            left = Expr {
                kind: ExprKind::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            };
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.equality()?;
        while self.peek() == Some(TokenKind::AndAnd) {
            let pos = self.pos();
            self.bump();
            let right = self.equality()?;
            left = Expr {
                kind: ExprKind::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::EqEq) => BinaryOp::Eq,
                Some(TokenKind::NotEq) => BinaryOp::NotEq,
                Some(TokenKind::StrictEq) => BinaryOp::StrictEq,
                Some(TokenKind::StrictNotEq) => BinaryOp::StrictNotEq,
                _ => return Ok(left),
            };
            let pos = self.pos();
            self.bump();
            let right = self.relational()?;
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            };
        }
    }

    fn relational(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Less) => BinaryOp::Less,
                Some(TokenKind::LessEq) => BinaryOp::LessEq,
                Some(TokenKind::Greater) => BinaryOp::Greater,
                Some(TokenKind::GreaterEq) => BinaryOp::GreaterEq,
                _ => return Ok(left),
            };
            let pos = self.pos();
            self.bump();
            let right = self.additive()?;
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            };
        }
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            let pos = self.pos();
            self.bump();
            let right = self.multiplicative()?;
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            let pos = self.pos();
            self.bump();
            let right = self.unary()?;
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        let kind = match self.peek() {
            Some(TokenKind::Minus) => {
                self.bump();
                ExprKind::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(self.unary()?),
                }
            }
            Some(TokenKind::Plus) => {
                self.bump();
                ExprKind::Unary {
                    op: UnaryOp::Plus,
                    expr: Box::new(self.unary()?),
                }
            }
            Some(TokenKind::Bang) => {
                self.bump();
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(self.unary()?),
                }
            }
            Some(TokenKind::KwTypeof) => {
                self.bump();
                ExprKind::Unary {
                    op: UnaryOp::TypeOf,
                    expr: Box::new(self.unary()?),
                }
            }
            Some(TokenKind::KwDelete) => {
                self.bump();
                let target = self.unary()?;
                if !matches!(target.kind, ExprKind::Member { .. }) {
                    return Err(self.error_here("'delete' requires a property access"));
                }
                ExprKind::Delete(Box::new(target))
            }
            Some(TokenKind::KwAwait) => {
                self.bump();
                ExprKind::Await(Box::new(self.unary()?))
            }
            Some(TokenKind::PlusPlus | TokenKind::MinusMinus) => {
                let op = if self.bump().kind == TokenKind::PlusPlus {
                    UpdateOp::Inc
                } else {
                    UpdateOp::Dec
                };
                let target = self.unary()?;
                if !matches!(target.kind, ExprKind::Ident(_) | ExprKind::Member { .. }) {
                    return Err(self.error_here("invalid update target"));
                }
                ExprKind::Update {
                    op,
                    prefix: true,
                    target: Box::new(target),
                }
            }
            _ => return self.postfix(),
        };
        Ok(Expr { kind, pos })
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        let expr = self.call_or_member()?;
        if matches!(self.peek(), Some(TokenKind::PlusPlus | TokenKind::MinusMinus))
            && !self.on_new_line()
        {
            if !matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Member { .. }) {
                return Err(self.error_here("invalid update target"));
            }
            let op = if self.bump().kind == TokenKind::PlusPlus {
                UpdateOp::Inc
            } else {
                UpdateOp::Dec
            };
            return Ok(Expr {
                kind: ExprKind::Update {
                    op,
                    prefix: false,
                    target: Box::new(expr),
                },
                pos,
            });
        }
        Ok(expr)
    }

    fn call_or_member(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            let pos = self.pos();
            match self.peek() {
                Some(TokenKind::Dot) => {
                    self.bump();
                    let name = self.member_name()?;
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberKey::Name(name),
                        },
                        pos,
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.bump();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberKey::Index(Box::new(index)),
                        },
                        pos,
                    };
                }
                Some(TokenKind::LParen) => {
                    let args = self.arguments()?;
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        pos,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Property names after `.` may be keywords (`obj.default`, `obj.from`).
    fn member_name(&mut self) -> Result<SmolStr, ParseError> {
        let token = match self.peek() {
            Some(TokenKind::Ident) => self.bump(),
            Some(kind) if keyword_text(kind).is_some() => self.bump(),
            _ => return Err(self.error_here("expected property name")),
        };
        match token.kind {
            TokenKind::Ident => Ok(SmolStr::new(self.text(token))),
            kind => Ok(SmolStr::new(keyword_text(kind).unwrap_or_default())),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        while !self.eat(TokenKind::RParen) {
            args.push(self.assignment()?);
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::RParen, "')'")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        let kind = match self.peek() {
            Some(TokenKind::Number) => {
                let token = self.bump();
                let value = self
                    .text(token)
                    .parse::<f64>()
                    .map_err(|_| self.error_here("invalid number literal"))?;
                ExprKind::Number(value)
            }
            Some(TokenKind::Str) => {
                let token = self.bump();
                ExprKind::Str(unescape(self.text(token)))
            }
            Some(TokenKind::KwTrue) => {
                self.bump();
                ExprKind::Bool(true)
            }
            Some(TokenKind::KwFalse) => {
                self.bump();
                ExprKind::Bool(false)
            }
            Some(TokenKind::KwNull) => {
                self.bump();
                ExprKind::Null
            }
            Some(TokenKind::KwUndefined) => {
                self.bump();
                ExprKind::Undefined
            }
            Some(TokenKind::KwThis) => {
                self.bump();
                ExprKind::This
            }
            Some(TokenKind::KwSuper) => {
                self.bump();
                if self.peek() == Some(TokenKind::LParen) {
                    ExprKind::SuperCall(self.arguments()?)
                } else {
                    return Err(self.error_here("'super' is only callable"));
                }
            }
            Some(TokenKind::KwNew) => {
                self.bump();
                if self.eat(TokenKind::Dot) {
                    let name = self.ident("'target'")?;
                    if name != "target" {
                        return Err(self.error_here("expected 'new.target'"));
                    }
                    ExprKind::NewTarget
                } else {
                    let callee = self.new_callee()?;
                    let args = if self.peek() == Some(TokenKind::LParen) {
                        self.arguments()?
                    } else {
                        Vec::new()
                    };
                    ExprKind::New {
                        callee: Box::new(callee),
                        args,
                    }
                }
            }
            Some(TokenKind::KwImport) => {
                self.bump();
                if self.eat(TokenKind::Dot) {
                    let name = self.ident("'meta'")?;
                    if name != "meta" {
                        return Err(self.error_here("expected 'import.meta'"));
                    }
                    ExprKind::ImportMeta
                } else {
                    self.expect(TokenKind::LParen, "'('")?;
                    let path = self.assignment()?;
                    self.expect(TokenKind::RParen, "')'")?;
                    ExprKind::ImportCall(Box::new(path))
                }
            }
            Some(TokenKind::KwFunction) => {
                ExprKind::Function(Box::new(self.function(false, false)?))
            }
            Some(TokenKind::KwAsync) => return self.async_expression(),
            Some(TokenKind::KwClass) => {
                let class = self.class(false)?;
                return class_expression(class, pos);
            }
            Some(TokenKind::LBracket) => {
                self.bump();
                let mut elements = Vec::new();
                while !self.eat(TokenKind::RBracket) {
                    elements.push(self.assignment()?);
                    if !self.eat(TokenKind::Comma) {
                        self.expect(TokenKind::RBracket, "']'")?;
                        break;
                    }
                }
                ExprKind::Array(elements)
            }
            Some(TokenKind::LBrace) => self.object_literal()?,
            Some(TokenKind::LParen) => {
                if let Some(arrow) = self.try_arrow(false)? {
                    return Ok(arrow);
                }
                self.bump();
                let expr = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                return Ok(expr);
            }
            Some(TokenKind::Ident) => {
                if self.peek_at(1) == Some(TokenKind::Arrow) {
                    return self.single_param_arrow(false);
                }
                let token = self.bump();
                ExprKind::Ident(SmolStr::new(self.text(token)))
            }
            _ => return Err(self.error_here("unexpected token")),
        };
        Ok(Expr { kind, pos })
    }

    /// `new` callee binds member accesses but not calls.
    fn new_callee(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            let pos = self.pos();
            match self.peek() {
                Some(TokenKind::Dot) => {
                    self.bump();
                    let name = self.member_name()?;
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberKey::Name(name),
                        },
                        pos,
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.bump();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberKey::Index(Box::new(index)),
                        },
                        pos,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn async_expression(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        match self.peek_at(1) {
            Some(TokenKind::KwFunction) => {
                self.bump();
                Ok(Expr {
                    kind: ExprKind::Function(Box::new(self.function(true, false)?)),
                    pos,
                })
            }
            Some(TokenKind::Ident) if self.peek_at(2) == Some(TokenKind::Arrow) => {
                self.bump();
                self.single_param_arrow(true)
            }
            Some(TokenKind::LParen) => {
                self.bump();
                match self.try_arrow(true)? {
                    Some(arrow) => Ok(arrow),
                    None => Err(self.error_here("expected async function or arrow")),
                }
            }
            _ => {
                // Plain identifier named `async`.
                self.bump();
                Ok(Expr {
                    kind: ExprKind::Ident(SmolStr::new_static("async")),
                    pos,
                })
            }
        }
    }

    fn single_param_arrow(&mut self, is_async: bool) -> Result<Expr, ParseError> {
        let pos = self.pos();
        let name = self.ident("parameter name")?;
        self.expect(TokenKind::Arrow, "'=>'")?;
        self.arrow_body(
            vec![Param {
                name,
                default: None,
            }],
            is_async,
            pos,
        )
    }

    /// If the parenthesized token run is followed by `=>`, parse an arrow
    /// function; otherwise leave the cursor untouched and return None.
    fn try_arrow(&mut self, is_async: bool) -> Result<Option<Expr>, ParseError> {
        let pos = self.pos();
        let mut depth = 0usize;
        let mut scan = self.idx;
        loop {
            let Some(token) = self.tokens.get(scan) else {
                return Ok(None);
            };
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            scan += 1;
        }
        if self.tokens.get(scan + 1).map(|t| t.kind) != Some(TokenKind::Arrow) {
            return Ok(None);
        }
        let params = self.params()?;
        self.expect(TokenKind::Arrow, "'=>'")?;
        Ok(Some(self.arrow_body(params, is_async, pos)?))
    }

    fn arrow_body(
        &mut self,
        params: Vec<Param>,
        is_async: bool,
        pos: Pos,
    ) -> Result<Expr, ParseError> {
        let body = if self.peek() == Some(TokenKind::LBrace) {
            FnBody::Block(self.block()?)
        } else {
            FnBody::Expr(Box::new(self.assignment()?))
        };
        Ok(Expr {
            kind: ExprKind::Function(Box::new(FunctionExpr {
                name: None,
                params,
                body,
                is_arrow: true,
                is_async,
                pos,
            })),
            pos,
        })
    }

    fn object_literal(&mut self) -> Result<ExprKind, ParseError> {
        self.bump();
        let mut props = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            let key = match self.peek() {
                Some(TokenKind::Str) => PropKey::Str(self.string_literal("property key")?),
                Some(TokenKind::Number) => {
                    let token = self.bump();
                    PropKey::Str(self.text(token).to_string())
                }
                Some(TokenKind::LBracket) => {
                    self.bump();
                    let expr = self.assignment()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    PropKey::Computed(Box::new(expr))
                }
                _ => PropKey::Ident(self.member_name()?),
            };
            let value = if self.eat(TokenKind::Colon) {
                self.assignment()?
            } else if self.peek() == Some(TokenKind::LParen) {
                // Shorthand method.
                let method_pos = self.pos();
                let name = match &key {
                    PropKey::Ident(name) => Some(name.clone()),
                    _ => None,
                };
                let params = self.params()?;
                let body = FnBody::Block(self.block()?);
                Expr {
                    kind: ExprKind::Function(Box::new(FunctionExpr {
                        name,
                        params,
                        body,
                        is_arrow: false,
                        is_async: false,
                        pos: method_pos,
                    })),
                    pos: method_pos,
                }
            } else {
                // Shorthand property.
                let PropKey::Ident(name) = &key else {
                    return Err(self.error_here("expected ':'"));
                };
                Expr {
                    kind: ExprKind::Ident(name.clone()),
                    pos: self.pos(),
                }
            };
            props.push((key, value));
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::RBrace, "'}'")?;
                break;
            }
        }
        Ok(ExprKind::Object(props))
    }
}

/// A class expression desugars to its declaration wrapped in an expression.
fn class_expression(class: ClassDecl, pos: Pos) -> Result<Expr, ParseError> {
    Ok(Expr {
        kind: ExprKind::ClassExpr(Box::new(class)),
        pos,
    })
}

fn keyword_text(kind: TokenKind) -> Option<&'static str> {
    Some(match kind {
        TokenKind::KwDefault => "default",
        TokenKind::KwFrom => "from",
        TokenKind::KwAs => "as",
        TokenKind::KwNew => "new",
        TokenKind::KwDelete => "delete",
        TokenKind::KwClass => "class",
        TokenKind::KwCatch => "catch",
        TokenKind::KwFinally => "finally",
        TokenKind::KwImport => "import",
        TokenKind::KwExport => "export",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> Stmt {
        let program = parse_program(source).expect("parse failed");
        assert_eq!(program.body.len(), 1, "expected one statement");
        program.body.into_iter().next().unwrap()
    }

    #[test]
    fn parses_member_assignment() {
        let stmt = parse_one("window.x = 1;");
        let StmtKind::Expr(expr) = stmt.kind else {
            panic!("expected expression statement");
        };
        assert!(matches!(expr.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn statement_positions_are_line_accurate() {
        let program = parse_program("a = 1;\nb = 2;\n  c = 3;").unwrap();
        let lines: Vec<u32> = program.body.iter().map(|s| s.pos.line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
        assert_eq!(program.body[2].pos.column, 2);
    }

    #[test]
    fn parses_arrow_functions() {
        let stmt = parse_one("const f = (a, b) => a + b;");
        let StmtKind::VarDecl { decls, .. } = stmt.kind else {
            panic!("expected declaration");
        };
        let init = decls[0].1.as_ref().unwrap();
        let ExprKind::Function(func) = &init.kind else {
            panic!("expected arrow function");
        };
        assert!(func.is_arrow);
        assert_eq!(func.params.len(), 2);
        assert!(matches!(func.body, FnBody::Expr(_)));
    }

    #[test]
    fn parses_class_with_constructor() {
        let stmt = parse_one("class A extends B { constructor(x) { super(x); } go() {} }");
        let StmtKind::ClassDecl(class) = stmt.kind else {
            panic!("expected class");
        };
        assert!(class.superclass.is_some());
        assert_eq!(class.members.len(), 2);
        assert!(class.members[0].is_constructor);
    }

    #[test]
    fn parses_imports_and_exports() {
        let program = parse_program(
            "import d, { a, b as c } from './m.js';\nexport const x = 1;\nexport { x as y };",
        )
        .unwrap();
        assert_eq!(program.body.len(), 3);
        let StmtKind::Import(import) = &program.body[0].kind else {
            panic!("expected import");
        };
        assert_eq!(import.default.as_deref(), Some("d"));
        assert_eq!(import.named.len(), 2);
    }

    #[test]
    fn rejects_export_star() {
        assert!(parse_program("export * from './m.js';").is_err());
    }

    #[test]
    fn parses_update_and_compound_assignment() {
        let program = parse_program("i++;\n--j;\nk += 2;").unwrap();
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn parses_try_catch_finally() {
        let stmt = parse_one("try { f(); } catch (e) { g(e); } finally { h(); }");
        let StmtKind::Try { catch, finally, .. } = stmt.kind else {
            panic!("expected try");
        };
        assert!(catch.is_some());
        assert!(finally.is_some());
    }

    #[test]
    fn parses_dynamic_import_and_meta() {
        let program = parse_program("const p = import('./m.js');\nconst u = import.meta.url;")
            .unwrap();
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn newline_terminates_statements_without_semicolons() {
        let program = parse_program("a = 1\nb = 2").unwrap();
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn reports_error_position() {
        let err = parse_program("a = ;").unwrap_err();
        assert_eq!(err.pos.line, 1);
    }

    #[test]
    fn error_messages_are_stable() {
        let err = parse_program("a = ;").unwrap_err();
        expect_test::expect!["syntax error at 1:4: unexpected token"].assert_eq(&err.to_string());
    }
}
