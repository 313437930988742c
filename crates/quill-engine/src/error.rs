//! Compilation errors

use crate::parser::{ParseError, ParseErrorKind, Span};
use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

/// Broad category of a compile failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileErrorKind {
    /// Malformed source text
    Syntax,
    /// Unknown variable, function, type or member
    Unresolved,
    /// Illegal cast or operand type
    Type,
    /// Unreachable or extraneous code, missing returns, unused results
    Structure,
    /// A feature turned off by the compiler settings
    Disabled,
    /// The script is too large for the code unit format
    Limit,
    /// A bug in the compiler itself
    Internal,
}

/// A compile-time failure, pointing at the offending source range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
    /// Byte offset of the failure (start of `span`)
    pub offset: usize,
    pub span: Span,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            offset: span.start,
            span,
        }
    }

    pub fn unresolved(message: impl Into<String>, span: Span) -> Self {
        Self::new(CompileErrorKind::Unresolved, message, span)
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(CompileErrorKind::Type, message, span)
    }

    pub fn structure(message: impl Into<String>, span: Span) -> Self {
        Self::new(CompileErrorKind::Structure, message, span)
    }

    pub fn disabled(message: impl Into<String>, span: Span) -> Self {
        Self::new(CompileErrorKind::Disabled, message, span)
    }

    pub fn limit(message: impl Into<String>, span: Span) -> Self {
        Self::new(CompileErrorKind::Limit, message, span)
    }

    pub fn internal(message: impl Into<String>, span: Span) -> Self {
        Self::new(CompileErrorKind::Internal, message, span)
    }
}

impl From<ParseError> for CompileError {
    fn from(err: ParseError) -> Self {
        let kind = match err.kind {
            ParseErrorKind::LimitExceeded => CompileErrorKind::Limit,
            _ => CompileErrorKind::Syntax,
        };
        Self::new(kind, err.message, err.span)
    }
}
