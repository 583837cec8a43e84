//! Token definitions for patch scripts

use logos::Logos;

use crate::common::Span;

/// Token with its span inside the line
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Numeric literal and the width its spelling implies
///
/// `$12` is one byte and `$0012` two, so operands keep the size the author
/// wrote even when the value would fit in fewer bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Number {
    pub value: u32,
    pub width: u8,
}

impl Number {
    fn parse(digits: &str, radix: u32) -> Option<Self> {
        let value = u32::from_str_radix(digits, radix).ok()?;
        let width = match radix {
            16 => digits.len().div_ceil(2),
            2 => digits.len().div_ceil(8),
            _ => usize::from(byte_width(value)),
        };
        Some(Self {
            value,
            width: u8::try_from(width.clamp(1, 4)).ok()?,
        })
    }
}

/// Bytes needed to hold `value`
pub fn byte_width(value: u32) -> u8 {
    match value {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
pub enum TokenKind {
    #[regex(r"\$[0-9A-Fa-f]+", |lex| Number::parse(&lex.slice()[1..], 16))]
    #[regex(r"%[01]+", |lex| Number::parse(&lex.slice()[1..], 2))]
    #[regex(r"[0-9]+", |lex| Number::parse(lex.slice(), 10))]
    #[regex(r"'[^'\n]'", |lex| lex.slice().as_bytes().get(1).map(|&b| Number { value: u32::from(b), width: 1 }))]
    Number(Number),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[regex(r#""[^"\n]*""#, |lex| { let s = lex.slice(); s[1..s.len() - 1].to_string() })]
    String(String),

    #[token("#")]
    Hash,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("=")]
    Equals,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("<<")]
    LtLt,
    #[token(">>")]
    GtGt,

    /// End of line
    Eol,
}

impl TokenKind {
    /// Precedence of binary operators (higher binds tighter)
    pub fn binary_precedence(&self) -> Option<u8> {
        match self {
            TokenKind::Pipe => Some(1),
            TokenKind::Amp => Some(2),
            TokenKind::LtLt | TokenKind::GtGt => Some(3),
            TokenKind::Plus | TokenKind::Minus => Some(4),
            TokenKind::Star | TokenKind::Slash => Some(5),
            _ => None,
        }
    }

    /// Identifier text when it matches `word` case-insensitively
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, TokenKind::Identifier(s) if s.eq_ignore_ascii_case(word))
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number '{:#X}'", n.value),
            TokenKind::Identifier(s) => write!(f, "identifier '{}'", s),
            TokenKind::String(s) => write!(f, "string \"{}\"", s),
            TokenKind::Hash => write!(f, "'#'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::Equals => write!(f, "'='"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Amp => write!(f, "'&'"),
            TokenKind::Pipe => write!(f, "'|'"),
            TokenKind::LtLt => write!(f, "'<<'"),
            TokenKind::GtGt => write!(f, "'>>'"),
            TokenKind::Eol => write!(f, "end of line"),
        }
    }
}
