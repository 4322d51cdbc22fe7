//! Token definitions for the Stride script language.
//!
//! The token kinds are designed to work with the `logos` lexer generator.
//! Keywords are contextual only where the grammar demands it (`from`, `as`,
//! `of`); everything else is reserved.

use logos::Logos;

fn lex_block_comment(lex: &mut logos::Lexer<TokenKind>) -> bool {
    let bytes = lex.remainder().as_bytes();
    let mut i = 0usize;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            lex.bump(i + 2);
            return true;
        }
        i += 1;
    }
    lex.bump(bytes.len());
    false
}

fn lex_string(lex: &mut logos::Lexer<TokenKind>) -> bool {
    let quote = lex.slice().as_bytes()[0];
    let bytes = lex.remainder().as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => break,
            c if c == quote => {
                lex.bump(i + 1);
                return true;
            }
            _ => i += 1,
        }
    }
    lex.bump(i.min(bytes.len()));
    false
}

/// All token kinds in the script language.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // =========================================================================
    // TRIVIA
    // =========================================================================
    /// Whitespace (spaces, tabs, newlines)
    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    /// Single-line comment: // ...
    #[regex(r"//[^\r\n]*", allow_greedy = true)]
    LineComment,

    /// Block comment: /* ... */
    #[token("/*", lex_block_comment)]
    BlockComment,

    // =========================================================================
    // PUNCTUATION
    // =========================================================================
    /// `;`
    #[token(";")]
    Semicolon,

    /// `,`
    #[token(",")]
    Comma,

    /// `.`
    #[token(".")]
    Dot,

    /// `(`
    #[token("(")]
    LParen,

    /// `)`
    #[token(")")]
    RParen,

    /// `[`
    #[token("[")]
    LBracket,

    /// `]`
    #[token("]")]
    RBracket,

    /// `{`
    #[token("{")]
    LBrace,

    /// `}`
    #[token("}")]
    RBrace,

    /// `:`
    #[token(":")]
    Colon,

    /// `?`
    #[token("?")]
    Question,

    /// `=>`
    #[token("=>")]
    Arrow,

    // =========================================================================
    // OPERATORS
    // =========================================================================
    /// `=`
    #[token("=")]
    Assign,

    /// `+=`
    #[token("+=")]
    PlusAssign,

    /// `-=`
    #[token("-=")]
    MinusAssign,

    /// `*=`
    #[token("*=")]
    StarAssign,

    /// `/=`
    #[token("/=")]
    SlashAssign,

    /// `%=`
    #[token("%=")]
    PercentAssign,

    /// `++`
    #[token("++")]
    PlusPlus,

    /// `--`
    #[token("--")]
    MinusMinus,

    /// `+`
    #[token("+")]
    Plus,

    /// `-`
    #[token("-")]
    Minus,

    /// `*`
    #[token("*")]
    Star,

    /// `/`
    #[token("/")]
    Slash,

    /// `%`
    #[token("%")]
    Percent,

    /// `===`
    #[token("===")]
    StrictEq,

    /// `!==`
    #[token("!==")]
    StrictNotEq,

    /// `==`
    #[token("==")]
    EqEq,

    /// `!=`
    #[token("!=")]
    NotEq,

    /// `<=`
    #[token("<=")]
    LessEq,

    /// `>=`
    #[token(">=")]
    GreaterEq,

    /// `<`
    #[token("<")]
    Less,

    /// `>`
    #[token(">")]
    Greater,

    /// `&&`
    #[token("&&")]
    AndAnd,

    /// `||`
    #[token("||")]
    OrOr,

    /// `!`
    #[token("!")]
    Bang,

    // =========================================================================
    // KEYWORDS
    // =========================================================================
    /// `let`
    #[token("let")]
    KwLet,

    /// `const`
    #[token("const")]
    KwConst,

    /// `var`
    #[token("var")]
    KwVar,

    /// `function`
    #[token("function")]
    KwFunction,

    /// `return`
    #[token("return")]
    KwReturn,

    /// `if`
    #[token("if")]
    KwIf,

    /// `else`
    #[token("else")]
    KwElse,

    /// `while`
    #[token("while")]
    KwWhile,

    /// `do`
    #[token("do")]
    KwDo,

    /// `for`
    #[token("for")]
    KwFor,

    /// `break`
    #[token("break")]
    KwBreak,

    /// `continue`
    #[token("continue")]
    KwContinue,

    /// `new`
    #[token("new")]
    KwNew,

    /// `delete`
    #[token("delete")]
    KwDelete,

    /// `typeof`
    #[token("typeof")]
    KwTypeof,

    /// `this`
    #[token("this")]
    KwThis,

    /// `true`
    #[token("true")]
    KwTrue,

    /// `false`
    #[token("false")]
    KwFalse,

    /// `null`
    #[token("null")]
    KwNull,

    /// `undefined`
    #[token("undefined")]
    KwUndefined,

    /// `throw`
    #[token("throw")]
    KwThrow,

    /// `try`
    #[token("try")]
    KwTry,

    /// `catch`
    #[token("catch")]
    KwCatch,

    /// `finally`
    #[token("finally")]
    KwFinally,

    /// `class`
    #[token("class")]
    KwClass,

    /// `extends`
    #[token("extends")]
    KwExtends,

    /// `super`
    #[token("super")]
    KwSuper,

    /// `import`
    #[token("import")]
    KwImport,

    /// `export`
    #[token("export")]
    KwExport,

    /// `from`
    #[token("from")]
    KwFrom,

    /// `as`
    #[token("as")]
    KwAs,

    /// `default`
    #[token("default")]
    KwDefault,

    /// `async`
    #[token("async")]
    KwAsync,

    /// `await`
    #[token("await")]
    KwAwait,

    /// `debugger`
    #[token("debugger")]
    KwDebugger,

    // =========================================================================
    // LITERALS AND IDENTIFIERS
    // =========================================================================
    /// Number literal: `42`, `3.14`, `1e-3`
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
    Number,

    /// String literal, single or double quoted.
    #[token("\"", lex_string)]
    #[token("'", lex_string)]
    Str,

    /// Identifier.
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*")]
    Ident,

    /// Unrecognized input.
    Error,
}

impl TokenKind {
    /// Returns true for whitespace and comments.
    #[must_use]
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
        )
    }
}
