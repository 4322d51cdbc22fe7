//! Lexer for the Stride script language.
//!
//! Tokenizes source text into a stream of tokens carrying byte spans, and
//! provides a line map translating byte offsets into 1-based line / 0-based
//! column positions (the coordinate system breakpoints are addressed in).

mod tokens;

pub use tokens::TokenKind;

use logos::Logos;

/// A source position: 1-based line, 0-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pos {
    /// 1-based line number.
    pub line: u32,
    /// 0-based column number.
    pub column: u32,
}

impl Pos {
    /// Creates a position from line and column.
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// Byte offset where the token starts.
    pub start: u32,
    /// Byte offset just past the token.
    pub end: u32,
}

/// Maps byte offsets to line/column positions.
#[derive(Debug, Clone)]
pub struct LineMap {
    line_starts: Vec<u32>,
}

impl LineMap {
    /// Builds a line map for the given source.
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self { line_starts }
    }

    /// Converts a byte offset into a position.
    #[must_use]
    pub fn pos(&self, offset: u32) -> Pos {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        Pos::new(line as u32 + 1, offset - self.line_starts[line])
    }
}

/// Lex the entire source and return all non-trivia tokens.
#[must_use]
pub fn lex(source: &str) -> Vec<Token> {
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();
    while let Some(kind) = lexer.next() {
        let kind = kind.unwrap_or(TokenKind::Error);
        if kind.is_trivia() {
            continue;
        }
        let span = lexer.span();
        tokens.push(Token {
            kind,
            start: span.start as u32,
            end: span.end as u32,
        });
    }
    tokens
}

/// Decodes the contents of a string literal token (without its quotes),
/// resolving escape sequences.
#[must_use]
pub fn unescape(raw: &str) -> String {
    let body = &raw[1..raw.len().saturating_sub(1)];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_statement_tokens() {
        let tokens = lex("window.x = 1;");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn distinguishes_strict_equality() {
        let tokens = lex("a === b == c = d");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert!(kinds.contains(&TokenKind::StrictEq));
        assert!(kinds.contains(&TokenKind::EqEq));
        assert!(kinds.contains(&TokenKind::Assign));
    }

    #[test]
    fn line_map_positions() {
        let source = "a;\nbb;\n  c;";
        let map = LineMap::new(source);
        assert_eq!(map.pos(0), Pos::new(1, 0));
        assert_eq!(map.pos(3), Pos::new(2, 0));
        assert_eq!(map.pos(9), Pos::new(3, 2));
    }

    #[test]
    fn unescapes_strings() {
        assert_eq!(unescape(r#""a\nb""#), "a\nb");
        assert_eq!(unescape(r"'it\'s'"), "it's");
    }

    #[test]
    fn comments_are_trivia() {
        let tokens = lex("a; // trailing\n/* block */ b;");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Semicolon,
                TokenKind::Ident,
                TokenKind::Semicolon,
            ]
        );
    }
}
