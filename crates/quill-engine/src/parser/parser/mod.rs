//! Recursive descent parser for Quill scripts.
//!
//! Transforms the token stream from the lexer into an arena [`SyntaxTree`].
//! Identifiers that name types are recognised through a [`TypeNames`] oracle
//! (normally the whitelist), which is how casts and declarations are told
//! apart from ordinary expressions.

pub mod expr;
pub mod guards;
pub mod stmt;

use crate::parser::ast::{NodeId, NodeKind, SyntaxTree, TypeName};
use crate::parser::lexer::{LexError, Lexer};
use crate::parser::token::{Span, Token};
use guards::DepthCounter;
use thiserror::Error;

/// Primitive type keywords; always type names regardless of the whitelist.
pub const PRIMITIVE_TYPES: &[&str] = &["boolean", "int", "long", "double", "def", "void"];

/// Answers whether an identifier names a type.
pub trait TypeNames {
    fn is_type_name(&self, name: &str) -> bool;
}

impl<F> TypeNames for F
where
    F: Fn(&str) -> bool,
{
    fn is_type_name(&self, name: &str) -> bool {
        self(name)
    }
}

/// The kind of parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Invalid character or malformed token
    Lex,
    /// Unexpected token found
    UnexpectedToken,
    /// Unexpected end of input
    UnexpectedEof,
    /// Numeric literal outside its type's range
    InvalidLiteral,
    /// Left side of an assignment or increment cannot be assigned
    InvalidTarget,
    /// Parser exceeded its depth or iteration limit
    LimitExceeded,
}

/// A parse error with the span of the offending token.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }

    pub fn limit_exceeded(message: impl Into<String>, span: Span) -> Self {
        Self::new(ParseErrorKind::LimitExceeded, message, span)
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        Self::new(ParseErrorKind::Lex, err.message, err.span)
    }
}

/// Parser state: pre-tokenized input, a cursor, and the tree under construction.
pub struct Parser<'t> {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    pub(crate) depth: DepthCounter,
    pub(crate) tree: SyntaxTree,
    types: &'t dyn TypeNames,
}

impl<'t> Parser<'t> {
    pub fn new(source: &str, types: &'t dyn TypeNames) -> Result<Self, ParseError> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self {
            tokens,
            pos: 0,
            depth: DepthCounter::default(),
            tree: SyntaxTree::new(),
            types,
        })
    }

    /// Parse a whole script: function declarations followed by statements.
    pub fn parse(mut self) -> Result<SyntaxTree, ParseError> {
        let start = self.current_span();
        let mut functions = Vec::new();
        let mut guard = guards::LoopGuard::new("functions");
        while self.at_function_header() {
            guard.check(self.current_span())?;
            functions.push(stmt::parse_function(&mut self)?);
        }

        let mut statements = Vec::new();
        let mut guard = guards::LoopGuard::new("statements");
        while !self.at_eof() {
            guard.check(self.current_span())?;
            if self.at_function_header() {
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken,
                    "functions must be declared before the first statement",
                    self.current_span(),
                ));
            }
            statements.push(stmt::parse_statement(&mut self)?);
        }

        let span = Span::new(start.start, self.prev_end().max(start.start));
        let root = self.tree.push(
            NodeKind::Source {
                functions,
                statements,
            },
            span,
        );
        self.tree.set_root(root);
        Ok(self.tree)
    }

    // ========================================================================
    // Token Management
    // ========================================================================

    #[inline]
    pub fn current(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    #[inline]
    pub fn current_span(&self) -> Span {
        self.tokens[self.pos].1
    }

    /// Token `n` positions ahead of the cursor (Eof past the end).
    pub fn peek_at(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)].0
    }

    #[inline]
    pub fn peek(&self) -> &Token {
        self.peek_at(1)
    }

    /// End offset of the most recently consumed token.
    pub fn prev_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].1.end
        }
    }

    /// Span from `start` up to the most recently consumed token.
    pub fn span_from(&self, start: Span) -> Span {
        Span::new(start.start, self.prev_end().max(start.start))
    }

    pub fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].0.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    #[inline]
    pub fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(expected)
    }

    /// Consume the current token when it matches.
    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn at_eof(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    pub fn expect(&mut self, expected: Token) -> Result<Token, ParseError> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    pub fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    pub fn unexpected(&self, expected: &str) -> ParseError {
        let span = self.current_span();
        if self.at_eof() {
            ParseError::new(
                ParseErrorKind::UnexpectedEof,
                format!("unexpected end of script, expected {}", expected),
                span,
            )
        } else {
            ParseError::new(
                ParseErrorKind::UnexpectedToken,
                format!("unexpected token '{}', expected {}", self.current(), expected),
                span,
            )
        }
    }

    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.tree.push(kind, span)
    }

    // ========================================================================
    // Type names
    // ========================================================================

    pub fn is_type_name(&self, name: &str) -> bool {
        PRIMITIVE_TYPES.contains(&name) || self.types.is_type_name(name)
    }

    /// If a type starts at `offset` tokens ahead, the offset just past it.
    pub fn scan_type(&self, offset: usize) -> Option<usize> {
        match self.peek_at(offset) {
            Token::Identifier(name) if self.is_type_name(name) => {}
            _ => return None,
        }
        let mut at = offset + 1;
        while matches!(self.peek_at(at), Token::LeftBracket)
            && matches!(self.peek_at(at + 1), Token::RightBracket)
        {
            at += 2;
        }
        Some(at)
    }

    /// `Type name (` at the cursor.
    pub fn at_function_header(&self) -> bool {
        match self.scan_type(0) {
            Some(at) => {
                matches!(self.peek_at(at), Token::Identifier(_))
                    && matches!(self.peek_at(at + 1), Token::LeftParen)
            }
            None => false,
        }
    }

    /// `Type name` at the cursor, the start of a local declaration.
    pub fn at_declaration(&self) -> bool {
        match self.scan_type(0) {
            Some(at) => matches!(self.peek_at(at), Token::Identifier(_)),
            None => false,
        }
    }

    pub fn parse_type(&mut self) -> Result<TypeName, ParseError> {
        let span = self.current_span();
        let name = self.expect_identifier()?;
        if !self.is_type_name(&name) {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedToken,
                format!("unknown type [{}]", name),
                span,
            ));
        }
        let mut dims = 0u8;
        while self.check(&Token::LeftBracket) && matches!(self.peek(), Token::RightBracket) {
            self.advance();
            self.advance();
            dims = dims.saturating_add(1);
        }
        Ok(TypeName::new(name, dims))
    }
}

/// Parse `source` into a syntax tree, consulting `types` for type names.
pub fn parse(source: &str, types: &dyn TypeNames) -> Result<SyntaxTree, ParseError> {
    Parser::new(source, types)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::{BinaryOp, Literal};

    fn std_types(name: &str) -> bool {
        matches!(name, "String" | "List" | "Map" | "Math" | "Supplier" | "Integer")
    }

    fn parse_ok(source: &str) -> SyntaxTree {
        parse(source, &std_types).unwrap()
    }

    fn entry(tree: &SyntaxTree) -> Vec<NodeId> {
        tree.source_parts().1.to_vec()
    }

    fn expr_of(tree: &SyntaxTree, stmt: NodeId) -> NodeId {
        match tree.kind(stmt) {
            NodeKind::ExprStatement(e) => *e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let tree = parse_ok("1 + 2 * 3");
        let e = expr_of(&tree, entry(&tree)[0]);
        match tree.kind(e) {
            NodeKind::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(
                tree.kind(*right),
                NodeKind::Binary {
                    op: BinaryOp::Mul,
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_functions_then_statements() {
        let tree = parse_ok("int add(int a, int b) { return a + b; } add(1, 2)");
        let (functions, statements) = tree.source_parts();
        assert_eq!(functions.len(), 1);
        assert_eq!(statements.len(), 1);
        match tree.kind(functions[0]) {
            NodeKind::Function { name, params, .. } => {
                assert_eq!(name, "add");
                assert_eq!(params.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_declaration_versus_expression() {
        let tree = parse_ok("String s = 'a'; s.length();");
        let stmts = entry(&tree);
        assert!(matches!(tree.kind(stmts[0]), NodeKind::Declarations(_)));
        assert!(matches!(tree.kind(stmts[1]), NodeKind::ExprStatement(_)));
    }

    #[test]
    fn test_cast_versus_parenthesized() {
        let tree = parse_ok("int x = 1; (long) x; (x) + 1;");
        let stmts = entry(&tree);
        let cast = expr_of(&tree, stmts[1]);
        assert!(matches!(tree.kind(cast), NodeKind::Cast { .. }));
        let add = expr_of(&tree, stmts[2]);
        assert!(matches!(tree.kind(add), NodeKind::Binary { .. }));
    }

    #[test]
    fn test_min_int_literal() {
        let tree = parse_ok("-2147483648");
        let e = expr_of(&tree, entry(&tree)[0]);
        assert_eq!(tree.kind(e), &NodeKind::Literal(Literal::Int(i32::MIN)));
    }

    #[test]
    fn test_int_literal_out_of_range() {
        let err = parse("2147483648", &std_types).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidLiteral);
    }

    #[test]
    fn test_lambda_forms() {
        let tree = parse_ok("Supplier s = () -> 1; def f = (int a, b) -> { return a; }; def g = x -> x;");
        assert_eq!(entry(&tree).len(), 3);
        let lambdas = (0..tree.len() as u32)
            .filter(|i| matches!(tree.kind(NodeId(*i)), NodeKind::Lambda { .. }))
            .count();
        assert_eq!(lambdas, 3);
    }

    #[test]
    fn test_list_and_map_initializers() {
        let tree = parse_ok("def a = [1, 2]; def b = ['k': 1]; def c = [:]; def d = [];");
        let kinds: Vec<_> = (0..tree.len() as u32)
            .map(|i| tree.kind(NodeId(i)).describe())
            .collect();
        assert_eq!(kinds.iter().filter(|k| **k == "list initializer").count(), 2);
        assert_eq!(kinds.iter().filter(|k| **k == "map initializer").count(), 2);
    }

    #[test]
    fn test_for_each_forms() {
        let tree = parse_ok("List l = [1]; for (def x : l) { x; } for (y in l) { y; }");
        let stmts = entry(&tree);
        assert!(matches!(tree.kind(stmts[1]), NodeKind::ForEach { .. }));
        match tree.kind(stmts[2]) {
            NodeKind::ForEach { ty, .. } => assert_eq!(ty.name, "def"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse("1 = 2", &std_types).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidTarget);
    }

    #[test]
    fn test_function_after_statement_rejected() {
        let err = parse("int x = 1; int f() { return 1; }", &std_types).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let source = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse(&source, &std_types).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::LimitExceeded);
    }

    #[test]
    fn test_spans_cover_source() {
        let tree = parse_ok("return 1 + 2;");
        let stmt = entry(&tree)[0];
        assert_eq!(tree.span(stmt), Span::new(0, 13));
    }
}
