//! Lexer for Quill scripts.
//!
//! Tokenization is driven by logos. Regex literals are context sensitive
//! (`a / b` versus `/b/`), so the lexer loop scans them by hand whenever a
//! slash appears where an operand is expected.

use crate::parser::token::{Span, Token};
use logos::Logos;
use thiserror::Error;

/// Lexing failure with the offending source range.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

impl LexError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum LogosToken {
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
    BlockComment,

    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("continue")]
    Continue,
    #[token("break")]
    Break,
    #[token("return")]
    Return,
    #[token("new")]
    New,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("throw")]
    Throw,
    #[token("this")]
    This,
    #[token("instanceof")]
    Instanceof,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    #[regex(r"0[xX][0-9a-fA-F]+", |lex| u64::from_str_radix(&lex.slice()[2..], 16).ok())]
    Int(u64),

    #[regex(r"[0-9]+[lL]", |lex| {
        let text = lex.slice();
        text[..text.len() - 1].parse::<u64>().ok()
    })]
    #[regex(r"0[xX][0-9a-fA-F]+[lL]", |lex| {
        let text = lex.slice();
        u64::from_str_radix(&text[2..text.len() - 1], 16).ok()
    })]
    Long(u64),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?[dDfF]?", parse_double)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[dDfF]?", parse_double)]
    #[regex(r"[0-9]+[dDfF]", parse_double)]
    Double(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, unescape)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, unescape)]
    Str(String),

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token(".")]
    Dot,
    #[token("?.")]
    NullSafeDot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("?:")]
    Elvis,
    #[token("->")]
    Arrow,
    #[token("::")]
    DoubleColon,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("<<")]
    ShiftLeft,
    #[token(">>")]
    ShiftRight,
    #[token(">>>")]
    UnsignedShiftRight,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("==")]
    EqualEqual,
    #[token("===")]
    EqualEqualEqual,
    #[token("!=")]
    BangEqual,
    #[token("!==")]
    BangEqualEqual,
    #[token("=~")]
    FindRegex,
    #[token("==~")]
    MatchRegex,
    #[token("&")]
    Ampersand,
    #[token("^")]
    Caret,
    #[token("|")]
    Pipe,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("=")]
    Equal,
    #[token("+=")]
    PlusEqual,
    #[token("-=")]
    MinusEqual,
    #[token("*=")]
    StarEqual,
    #[token("/=")]
    SlashEqual,
    #[token("%=")]
    PercentEqual,
    #[token("&=")]
    AmpersandEqual,
    #[token("^=")]
    CaretEqual,
    #[token("|=")]
    PipeEqual,
    #[token("<<=")]
    ShiftLeftEqual,
    #[token(">>=")]
    ShiftRightEqual,
    #[token(">>>=")]
    UnsignedShiftRightEqual,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
}

fn parse_double(lex: &mut logos::Lexer<'_, LogosToken>) -> Option<f64> {
    let text = lex.slice().trim_end_matches(['d', 'D', 'f', 'F']);
    text.parse::<f64>().ok()
}

fn unescape(lex: &mut logos::Lexer<'_, LogosToken>) -> Option<String> {
    let raw = lex.slice();
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            _ => return None,
        }
    }
    Some(out)
}

impl LogosToken {
    fn into_token(self) -> Token {
        match self {
            LogosToken::If => Token::If,
            LogosToken::Else => Token::Else,
            LogosToken::While => Token::While,
            LogosToken::Do => Token::Do,
            LogosToken::For => Token::For,
            LogosToken::In => Token::In,
            LogosToken::Continue => Token::Continue,
            LogosToken::Break => Token::Break,
            LogosToken::Return => Token::Return,
            LogosToken::New => Token::New,
            LogosToken::Try => Token::Try,
            LogosToken::Catch => Token::Catch,
            LogosToken::Throw => Token::Throw,
            LogosToken::This => Token::This,
            LogosToken::Instanceof => Token::Instanceof,
            LogosToken::True => Token::True,
            LogosToken::False => Token::False,
            LogosToken::Null => Token::Null,
            LogosToken::Int(v) => Token::IntLiteral(v),
            LogosToken::Long(v) => Token::LongLiteral(v),
            LogosToken::Double(v) => Token::DoubleLiteral(v),
            LogosToken::Str(s) => Token::StringLiteral(s),
            LogosToken::Ident(s) => Token::Identifier(s),
            LogosToken::LeftBrace => Token::LeftBrace,
            LogosToken::RightBrace => Token::RightBrace,
            LogosToken::LeftBracket => Token::LeftBracket,
            LogosToken::RightBracket => Token::RightBracket,
            LogosToken::LeftParen => Token::LeftParen,
            LogosToken::RightParen => Token::RightParen,
            LogosToken::Dot => Token::Dot,
            LogosToken::NullSafeDot => Token::NullSafeDot,
            LogosToken::Comma => Token::Comma,
            LogosToken::Semicolon => Token::Semicolon,
            LogosToken::Question => Token::Question,
            LogosToken::Colon => Token::Colon,
            LogosToken::Elvis => Token::Elvis,
            LogosToken::Arrow => Token::Arrow,
            LogosToken::DoubleColon => Token::DoubleColon,
            LogosToken::Bang => Token::Bang,
            LogosToken::Tilde => Token::Tilde,
            LogosToken::Star => Token::Star,
            LogosToken::Slash => Token::Slash,
            LogosToken::Percent => Token::Percent,
            LogosToken::Plus => Token::Plus,
            LogosToken::Minus => Token::Minus,
            LogosToken::ShiftLeft => Token::ShiftLeft,
            LogosToken::ShiftRight => Token::ShiftRight,
            LogosToken::UnsignedShiftRight => Token::UnsignedShiftRight,
            LogosToken::Less => Token::Less,
            LogosToken::LessEqual => Token::LessEqual,
            LogosToken::Greater => Token::Greater,
            LogosToken::GreaterEqual => Token::GreaterEqual,
            LogosToken::EqualEqual => Token::EqualEqual,
            LogosToken::EqualEqualEqual => Token::EqualEqualEqual,
            LogosToken::BangEqual => Token::BangEqual,
            LogosToken::BangEqualEqual => Token::BangEqualEqual,
            LogosToken::FindRegex => Token::FindRegex,
            LogosToken::MatchRegex => Token::MatchRegex,
            LogosToken::Ampersand => Token::Ampersand,
            LogosToken::Caret => Token::Caret,
            LogosToken::Pipe => Token::Pipe,
            LogosToken::AmpAmp => Token::AmpAmp,
            LogosToken::PipePipe => Token::PipePipe,
            LogosToken::Equal => Token::Equal,
            LogosToken::PlusEqual => Token::PlusEqual,
            LogosToken::MinusEqual => Token::MinusEqual,
            LogosToken::StarEqual => Token::StarEqual,
            LogosToken::SlashEqual => Token::SlashEqual,
            LogosToken::PercentEqual => Token::PercentEqual,
            LogosToken::AmpersandEqual => Token::AmpersandEqual,
            LogosToken::CaretEqual => Token::CaretEqual,
            LogosToken::PipeEqual => Token::PipeEqual,
            LogosToken::ShiftLeftEqual => Token::ShiftLeftEqual,
            LogosToken::ShiftRightEqual => Token::ShiftRightEqual,
            LogosToken::UnsignedShiftRightEqual => Token::UnsignedShiftRightEqual,
            LogosToken::PlusPlus => Token::PlusPlus,
            LogosToken::MinusMinus => Token::MinusMinus,
            // skipped by logos, never produced
            LogosToken::LineComment | LogosToken::BlockComment => Token::Eof,
        }
    }
}

/// Converts script source into tokens with byte spans.
pub struct Lexer<'a> {
    source: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    /// Tokenize the whole source. The returned vector always ends in `Eof`.
    pub fn tokenize(self) -> Result<Vec<(Token, Span)>, LexError> {
        let mut lex = LogosToken::lexer(self.source);
        let mut tokens: Vec<(Token, Span)> = Vec::new();

        while let Some(next) = lex.next() {
            let range = lex.span();
            let span = Span::new(range.start, range.end);
            let token = match next {
                Ok(token) => token,
                Err(()) => {
                    return Err(LexError::new(
                        format!("unexpected character sequence '{}'", span.slice(self.source)),
                        span,
                    ))
                }
            };

            let regex_allowed = tokens.last().map_or(true, |(prev, _)| !prev.ends_operand());
            if regex_allowed && matches!(token, LogosToken::Slash | LogosToken::SlashEqual) {
                let (regex, end) = scan_regex(self.source, span.start)?;
                lex.bump(end - range.end);
                tokens.push((regex, Span::new(span.start, end)));
                continue;
            }

            tokens.push((token.into_token(), span));
        }

        let eof = self.source.len();
        tokens.push((Token::Eof, Span::new(eof, eof)));
        Ok(tokens)
    }
}

/// Scan `/pattern/flags` starting at the opening slash. Returns the token and
/// the offset one past the last flag character.
fn scan_regex(source: &str, start: usize) -> Result<(Token, usize), LexError> {
    let bytes = source.as_bytes();
    let mut pos = start + 1;
    let mut in_class = false;
    loop {
        match bytes.get(pos) {
            None | Some(b'\n') => {
                return Err(LexError::new(
                    "unterminated regex literal",
                    Span::new(start, pos),
                ))
            }
            Some(b'\\') => pos += 2,
            Some(b'[') => {
                in_class = true;
                pos += 1;
            }
            Some(b']') => {
                in_class = false;
                pos += 1;
            }
            Some(b'/') if !in_class => break,
            Some(_) => pos += 1,
        }
    }
    let pattern = source[start + 1..pos].to_string();
    if pattern.is_empty() {
        return Err(LexError::new("empty regex literal", Span::new(start, pos + 1)));
    }
    let flags_start = pos + 1;
    let mut end = flags_start;
    while bytes.get(end).is_some_and(|b| b.is_ascii_alphabetic()) {
        end += 1;
    }
    let flags = source[flags_start..end].to_string();
    Ok((Token::RegexLiteral { pattern, flags }, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_numbers_and_suffixes() {
        assert_eq!(
            kinds("42 0x1F 7L 1.5 2e3 3d"),
            vec![
                Token::IntLiteral(42),
                Token::IntLiteral(31),
                Token::LongLiteral(7),
                Token::DoubleLiteral(1.5),
                Token::DoubleLiteral(2000.0),
                Token::DoubleLiteral(3.0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\nb""#),
            vec![
                Token::StringLiteral("it's".to_string()),
                Token::StringLiteral("a\nb".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_regex_versus_division() {
        let tokens = kinds("x = a / b; y = /ab+c/i;");
        assert!(tokens.contains(&Token::Slash));
        assert!(tokens.contains(&Token::RegexLiteral {
            pattern: "ab+c".to_string(),
            flags: "i".to_string(),
        }));
    }

    #[test]
    fn test_regex_with_slash_in_class() {
        let tokens = kinds("/[/]x/");
        assert_eq!(
            tokens[0],
            Token::RegexLiteral {
                pattern: "[/]x".to_string(),
                flags: String::new(),
            }
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("1 // one\n/* two */ 2"),
            vec![Token::IntLiteral(1), Token::IntLiteral(2), Token::Eof]
        );
    }

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(
            kinds("a ==~ b >>>= c ?. d ?: e"),
            vec![
                Token::Identifier("a".into()),
                Token::MatchRegex,
                Token::Identifier("b".into()),
                Token::UnsignedShiftRightEqual,
                Token::Identifier("c".into()),
                Token::NullSafeDot,
                Token::Identifier("d".into()),
                Token::Elvis,
                Token::Identifier("e".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_invalid_character() {
        let err = Lexer::new("int x = #;").tokenize().unwrap_err();
        assert_eq!(err.span.start, 8);
    }
}
