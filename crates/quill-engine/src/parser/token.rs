//! Token definitions for Quill scripts.
//!
//! Keywords, operators, and literals recognised by the lexer. Type names are
//! ordinary identifiers; the parser asks the whitelist which identifiers name
//! types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open byte range into the script source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Start offset (inclusive)
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A token in a Quill script.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    If,
    Else,
    While,
    Do,
    For,
    In,
    Continue,
    Break,
    Return,
    New,
    Try,
    Catch,
    Throw,
    This,
    Instanceof,

    // Literals
    /// Integer literal without suffix (range-checked by the parser)
    IntLiteral(u64),
    /// Integer literal with an `L` suffix
    LongLiteral(u64),
    DoubleLiteral(f64),
    StringLiteral(String),
    /// `/pattern/flags`
    RegexLiteral { pattern: String, flags: String },
    True,
    False,
    Null,

    Identifier(String),

    // Delimiters
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Dot,
    NullSafeDot,
    Comma,
    Semicolon,
    Question,
    Colon,
    Elvis,
    Arrow,
    DoubleColon,

    // Operators
    Bang,
    Tilde,
    Star,
    Slash,
    Percent,
    Plus,
    Minus,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    EqualEqual,
    EqualEqualEqual,
    BangEqual,
    BangEqualEqual,
    FindRegex,
    MatchRegex,
    Ampersand,
    Caret,
    Pipe,
    AmpAmp,
    PipePipe,
    Equal,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PercentEqual,
    AmpersandEqual,
    CaretEqual,
    PipeEqual,
    ShiftLeftEqual,
    ShiftRightEqual,
    UnsignedShiftRightEqual,
    PlusPlus,
    MinusMinus,

    Eof,
}

impl Token {
    /// Whether a `/` after this token is a division rather than a regex.
    pub fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::IntLiteral(_)
                | Token::LongLiteral(_)
                | Token::DoubleLiteral(_)
                | Token::StringLiteral(_)
                | Token::RegexLiteral { .. }
                | Token::True
                | Token::False
                | Token::Null
                | Token::This
                | Token::Identifier(_)
                | Token::RightParen
                | Token::RightBracket
                | Token::RightBrace
                | Token::PlusPlus
                | Token::MinusMinus
        )
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Token::If
                | Token::Else
                | Token::While
                | Token::Do
                | Token::For
                | Token::In
                | Token::Continue
                | Token::Break
                | Token::Return
                | Token::New
                | Token::Try
                | Token::Catch
                | Token::Throw
                | Token::This
                | Token::Instanceof
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::Do => "do",
            Token::For => "for",
            Token::In => "in",
            Token::Continue => "continue",
            Token::Break => "break",
            Token::Return => "return",
            Token::New => "new",
            Token::Try => "try",
            Token::Catch => "catch",
            Token::Throw => "throw",
            Token::This => "this",
            Token::Instanceof => "instanceof",
            Token::IntLiteral(v) | Token::LongLiteral(v) => return write!(f, "{}", v),
            Token::DoubleLiteral(v) => return write!(f, "{}", v),
            Token::StringLiteral(s) => return write!(f, "'{}'", s),
            Token::RegexLiteral { pattern, flags } => return write!(f, "/{}/{}", pattern, flags),
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::Identifier(name) => return write!(f, "{}", name),
            Token::LeftBrace => "{",
            Token::RightBrace => "}",
            Token::LeftBracket => "[",
            Token::RightBracket => "]",
            Token::LeftParen => "(",
            Token::RightParen => ")",
            Token::Dot => ".",
            Token::NullSafeDot => "?.",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Question => "?",
            Token::Colon => ":",
            Token::Elvis => "?:",
            Token::Arrow => "->",
            Token::DoubleColon => "::",
            Token::Bang => "!",
            Token::Tilde => "~",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::ShiftLeft => "<<",
            Token::ShiftRight => ">>",
            Token::UnsignedShiftRight => ">>>",
            Token::Less => "<",
            Token::LessEqual => "<=",
            Token::Greater => ">",
            Token::GreaterEqual => ">=",
            Token::EqualEqual => "==",
            Token::EqualEqualEqual => "===",
            Token::BangEqual => "!=",
            Token::BangEqualEqual => "!==",
            Token::FindRegex => "=~",
            Token::MatchRegex => "==~",
            Token::Ampersand => "&",
            Token::Caret => "^",
            Token::Pipe => "|",
            Token::AmpAmp => "&&",
            Token::PipePipe => "||",
            Token::Equal => "=",
            Token::PlusEqual => "+=",
            Token::MinusEqual => "-=",
            Token::StarEqual => "*=",
            Token::SlashEqual => "/=",
            Token::PercentEqual => "%=",
            Token::AmpersandEqual => "&=",
            Token::CaretEqual => "^=",
            Token::PipeEqual => "|=",
            Token::ShiftLeftEqual => "<<=",
            Token::ShiftRightEqual => ">>=",
            Token::UnsignedShiftRightEqual => ">>>=",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::Eof => "<EOF>",
        };
        f.write_str(text)
    }
}
