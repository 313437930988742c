//! Expression parsing
//!
//! One function per precedence level, lowest first. Binary levels share
//! [`parse_binary`], driven by [`binary_level`].

use super::guards::LoopGuard;
use super::{stmt, ParseError, ParseErrorKind, Parser};
use crate::parser::ast::{
    BinaryOp, CompareOp, LambdaParam, Literal, LogicalOp, NodeId, NodeKind, RefReceiver, RegexOp,
    TypeName, UnaryOp,
};
use crate::parser::token::{Span, Token};

/// Precedence level of binary operators (higher binds tighter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    LogicalOr = 0,
    LogicalAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseAnd,
    Equality,
    Relational,
    Shift,
    Additive,
    Multiplicative,
}

impl Level {
    fn next(self) -> Option<Level> {
        use Level::*;
        Some(match self {
            LogicalOr => LogicalAnd,
            LogicalAnd => BitwiseOr,
            BitwiseOr => BitwiseXor,
            BitwiseXor => BitwiseAnd,
            BitwiseAnd => Equality,
            Equality => Relational,
            Relational => Shift,
            Shift => Additive,
            Additive => Multiplicative,
            Multiplicative => return None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum BinaryForm {
    Arith(BinaryOp),
    Compare(CompareOp),
    Logical(LogicalOp),
    Regex(RegexOp),
    InstanceOf,
}

fn binary_level(token: &Token) -> Option<(Level, BinaryForm)> {
    use BinaryForm::*;
    Some(match token {
        Token::PipePipe => (Level::LogicalOr, Logical(LogicalOp::Or)),
        Token::AmpAmp => (Level::LogicalAnd, Logical(LogicalOp::And)),
        Token::Pipe => (Level::BitwiseOr, Arith(BinaryOp::BitOr)),
        Token::Caret => (Level::BitwiseXor, Arith(BinaryOp::BitXor)),
        Token::Ampersand => (Level::BitwiseAnd, Arith(BinaryOp::BitAnd)),
        Token::EqualEqual => (Level::Equality, Compare(CompareOp::Eq)),
        Token::BangEqual => (Level::Equality, Compare(CompareOp::Ne)),
        Token::EqualEqualEqual => (Level::Equality, Compare(CompareOp::RefEq)),
        Token::BangEqualEqual => (Level::Equality, Compare(CompareOp::RefNe)),
        Token::Less => (Level::Relational, Compare(CompareOp::Lt)),
        Token::LessEqual => (Level::Relational, Compare(CompareOp::Le)),
        Token::Greater => (Level::Relational, Compare(CompareOp::Gt)),
        Token::GreaterEqual => (Level::Relational, Compare(CompareOp::Ge)),
        Token::Instanceof => (Level::Relational, InstanceOf),
        Token::FindRegex => (Level::Relational, Regex(RegexOp::Find)),
        Token::MatchRegex => (Level::Relational, Regex(RegexOp::Match)),
        Token::ShiftLeft => (Level::Shift, Arith(BinaryOp::Shl)),
        Token::ShiftRight => (Level::Shift, Arith(BinaryOp::Shr)),
        Token::UnsignedShiftRight => (Level::Shift, Arith(BinaryOp::Ushr)),
        Token::Plus => (Level::Additive, Arith(BinaryOp::Add)),
        Token::Minus => (Level::Additive, Arith(BinaryOp::Sub)),
        Token::Star => (Level::Multiplicative, Arith(BinaryOp::Mul)),
        Token::Slash => (Level::Multiplicative, Arith(BinaryOp::Div)),
        Token::Percent => (Level::Multiplicative, Arith(BinaryOp::Rem)),
        _ => return None,
    })
}

fn compound_assign(token: &Token) -> Option<Option<BinaryOp>> {
    Some(match token {
        Token::Equal => None,
        Token::PlusEqual => Some(BinaryOp::Add),
        Token::MinusEqual => Some(BinaryOp::Sub),
        Token::StarEqual => Some(BinaryOp::Mul),
        Token::SlashEqual => Some(BinaryOp::Div),
        Token::PercentEqual => Some(BinaryOp::Rem),
        Token::AmpersandEqual => Some(BinaryOp::BitAnd),
        Token::CaretEqual => Some(BinaryOp::BitXor),
        Token::PipeEqual => Some(BinaryOp::BitOr),
        Token::ShiftLeftEqual => Some(BinaryOp::Shl),
        Token::ShiftRightEqual => Some(BinaryOp::Shr),
        Token::UnsignedShiftRightEqual => Some(BinaryOp::Ushr),
        _ => return None,
    })
}

/// Parse an expression.
pub fn parse_expression(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let span = parser.current_span();
    parser.depth.enter("expression", span)?;
    let result = parse_assignment(parser);
    parser.depth.leave();
    result
}

fn is_assignable(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Variable(_) | NodeKind::Field { .. } | NodeKind::Index { .. }
    )
}

fn parse_assignment(parser: &mut Parser) -> Result<NodeId, ParseError> {
    if at_lambda(parser) {
        return parse_lambda(parser);
    }
    let start = parser.current_span();
    let target = parse_conditional(parser)?;
    if let Some(op) = compound_assign(parser.current()) {
        if !is_assignable(parser.tree.kind(target)) {
            return Err(ParseError::new(
                ParseErrorKind::InvalidTarget,
                "invalid assignment target",
                parser.tree.span(target),
            ));
        }
        parser.advance();
        let value = parse_assignment(parser)?;
        let span = parser.span_from(start);
        return Ok(parser.push(NodeKind::Assign { target, op, value }, span));
    }
    Ok(target)
}

fn parse_conditional(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    let condition = parse_elvis(parser)?;
    if !parser.eat(&Token::Question) {
        return Ok(condition);
    }
    let then_value = parse_expression(parser)?;
    parser.expect(Token::Colon)?;
    let else_value = parse_assignment(parser)?;
    let span = parser.span_from(start);
    Ok(parser.push(
        NodeKind::Conditional {
            condition,
            then_value,
            else_value,
        },
        span,
    ))
}

fn parse_elvis(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    let value = parse_binary(parser, Level::LogicalOr)?;
    if !parser.eat(&Token::Elvis) {
        return Ok(value);
    }
    let fallback = parse_elvis(parser)?;
    let span = parser.span_from(start);
    Ok(parser.push(NodeKind::Elvis { value, fallback }, span))
}

fn parse_binary(parser: &mut Parser, level: Level) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    let mut left = parse_operand(parser, level)?;
    let mut guard = LoopGuard::new("binary operators");
    loop {
        guard.check(parser.current_span())?;
        let form = match binary_level(parser.current()) {
            Some((op_level, form)) if op_level == level => form,
            _ => break,
        };
        parser.advance();
        let kind = match form {
            BinaryForm::InstanceOf => {
                let ty = parser.parse_type()?;
                NodeKind::InstanceOf { value: left, ty }
            }
            BinaryForm::Arith(op) => NodeKind::Binary {
                op,
                left,
                right: parse_operand(parser, level)?,
            },
            BinaryForm::Compare(op) => NodeKind::Compare {
                op,
                left,
                right: parse_operand(parser, level)?,
            },
            BinaryForm::Logical(op) => NodeKind::Logical {
                op,
                left,
                right: parse_operand(parser, level)?,
            },
            BinaryForm::Regex(op) => NodeKind::RegexMatch {
                op,
                left,
                pattern: parse_operand(parser, level)?,
            },
        };
        let span = parser.span_from(start);
        left = parser.push(kind, span);
    }
    Ok(left)
}

/// Operand of a binary operator at `level`: the next tighter level.
fn parse_operand(parser: &mut Parser, level: Level) -> Result<NodeId, ParseError> {
    match level.next() {
        Some(next) => parse_binary(parser, next),
        None => parse_unary(parser),
    }
}

fn parse_unary(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    let op = match parser.current() {
        Token::Bang => Some(UnaryOp::Not),
        Token::Tilde => Some(UnaryOp::BitNot),
        Token::Plus => Some(UnaryOp::Plus),
        Token::Minus => Some(UnaryOp::Neg),
        _ => None,
    };

    if let Some(op) = op {
        parser.advance();
        if op == UnaryOp::Neg {
            if let Some(literal) = negative_literal(parser)? {
                return parse_postfix(parser, literal, start);
            }
        }
        let operand = parse_unary(parser)?;
        let span = parser.span_from(start);
        return Ok(parser.push(NodeKind::Unary { op, operand }, span));
    }

    if matches!(parser.current(), Token::PlusPlus | Token::MinusMinus) {
        let increment = matches!(parser.advance(), Token::PlusPlus);
        let target = parse_unary(parser)?;
        if !is_assignable(parser.tree.kind(target)) {
            return Err(ParseError::new(
                ParseErrorKind::InvalidTarget,
                "invalid increment target",
                parser.tree.span(target),
            ));
        }
        let span = parser.span_from(start);
        return Ok(parser.push(
            NodeKind::IncDec {
                target,
                increment,
                prefix: true,
            },
            span,
        ));
    }

    if at_cast(parser) {
        parser.advance();
        let ty = parser.parse_type()?;
        parser.expect(Token::RightParen)?;
        let value = parse_unary(parser)?;
        let span = parser.span_from(start);
        return Ok(parser.push(NodeKind::Cast { ty, value }, span));
    }

    let primary = parse_primary(parser)?;
    parse_postfix(parser, primary, start)
}

/// `(Type)` at the cursor.
fn at_cast(parser: &Parser) -> bool {
    if !parser.check(&Token::LeftParen) {
        return false;
    }
    match parser.scan_type(1) {
        Some(at) => matches!(parser.peek_at(at), Token::RightParen),
        None => false,
    }
}

/// A numeric literal directly after unary minus, negated in place so that
/// the minimum int and long values can be written.
fn negative_literal(parser: &mut Parser) -> Result<Option<NodeId>, ParseError> {
    let span = parser.current_span();
    let literal = match parser.current() {
        Token::IntLiteral(v) => {
            let v = *v;
            if v > i32::MAX as u64 + 1 {
                return Err(out_of_range("int", span));
            }
            Literal::Int((v as i64).wrapping_neg() as i32)
        }
        Token::LongLiteral(v) => {
            let v = *v;
            if v > i64::MAX as u64 + 1 {
                return Err(out_of_range("long", span));
            }
            Literal::Long((v as i64).wrapping_neg())
        }
        Token::DoubleLiteral(v) => Literal::Double(-*v),
        _ => return Ok(None),
    };
    parser.advance();
    Ok(Some(parser.push(NodeKind::Literal(literal), span)))
}

fn out_of_range(ty: &str, span: Span) -> ParseError {
    ParseError::new(
        ParseErrorKind::InvalidLiteral,
        format!("{} literal out of range", ty),
        span,
    )
}

fn parse_postfix(parser: &mut Parser, mut node: NodeId, start: Span) -> Result<NodeId, ParseError> {
    let mut guard = LoopGuard::new("postfix");
    loop {
        guard.check(parser.current_span())?;
        match parser.current() {
            Token::Dot | Token::NullSafeDot => {
                let null_safe = matches!(parser.advance(), Token::NullSafeDot);
                let name = parser.expect_identifier()?;
                let kind = if parser.check(&Token::LeftParen) {
                    let args = parse_arguments(parser)?;
                    NodeKind::MethodCall {
                        receiver: node,
                        name,
                        args,
                        null_safe,
                    }
                } else {
                    NodeKind::Field {
                        receiver: node,
                        name,
                        null_safe,
                    }
                };
                let span = parser.span_from(start);
                node = parser.push(kind, span);
            }
            Token::LeftBracket => {
                parser.advance();
                let index = parse_expression(parser)?;
                parser.expect(Token::RightBracket)?;
                let span = parser.span_from(start);
                node = parser.push(
                    NodeKind::Index {
                        receiver: node,
                        index,
                    },
                    span,
                );
            }
            Token::PlusPlus | Token::MinusMinus => {
                if !is_assignable(parser.tree.kind(node)) {
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidTarget,
                        "invalid increment target",
                        parser.tree.span(node),
                    ));
                }
                let increment = matches!(parser.advance(), Token::PlusPlus);
                let span = parser.span_from(start);
                return Ok(parser.push(
                    NodeKind::IncDec {
                        target: node,
                        increment,
                        prefix: false,
                    },
                    span,
                ));
            }
            _ => return Ok(node),
        }
    }
}

fn parse_arguments(parser: &mut Parser) -> Result<Vec<NodeId>, ParseError> {
    parser.expect(Token::LeftParen)?;
    let mut args = Vec::new();
    let mut guard = LoopGuard::new("arguments");
    while !parser.check(&Token::RightParen) {
        guard.check(parser.current_span())?;
        args.push(parse_expression(parser)?);
        if !parser.eat(&Token::Comma) {
            break;
        }
    }
    parser.expect(Token::RightParen)?;
    Ok(args)
}

fn parse_primary(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    let literal = match parser.current().clone() {
        Token::IntLiteral(v) => {
            if v > i32::MAX as u64 {
                return Err(out_of_range("int", start));
            }
            Some(Literal::Int(v as i32))
        }
        Token::LongLiteral(v) => {
            if v > i64::MAX as u64 {
                return Err(out_of_range("long", start));
            }
            Some(Literal::Long(v as i64))
        }
        Token::DoubleLiteral(v) => Some(Literal::Double(v)),
        Token::StringLiteral(s) => Some(Literal::String(s)),
        Token::True => Some(Literal::Bool(true)),
        Token::False => Some(Literal::Bool(false)),
        Token::Null => Some(Literal::Null),
        _ => None,
    };
    if let Some(literal) = literal {
        parser.advance();
        return Ok(parser.push(NodeKind::Literal(literal), start));
    }

    match parser.current().clone() {
        Token::RegexLiteral { pattern, flags } => {
            parser.advance();
            Ok(parser.push(NodeKind::Regex { pattern, flags }, start))
        }
        Token::LeftParen => {
            parser.advance();
            let inner = parse_expression(parser)?;
            parser.expect(Token::RightParen)?;
            Ok(inner)
        }
        Token::LeftBracket => parse_collection(parser),
        Token::New => parse_new(parser),
        Token::This => {
            parser.advance();
            parser.expect(Token::DoubleColon)?;
            let name = parser.expect_identifier()?;
            let span = parser.span_from(start);
            Ok(parser.push(
                NodeKind::FunctionRef {
                    receiver: RefReceiver::This,
                    name,
                },
                span,
            ))
        }
        Token::Identifier(name) => {
            if matches!(parser.peek(), Token::LeftParen) {
                parser.advance();
                let args = parse_arguments(parser)?;
                let span = parser.span_from(start);
                return Ok(parser.push(NodeKind::Call { name, args }, span));
            }
            if parser.is_type_name(&name) {
                let ty = parser.parse_type()?;
                if parser.eat(&Token::DoubleColon) {
                    let method = if parser.eat(&Token::New) {
                        "new".to_string()
                    } else {
                        parser.expect_identifier()?
                    };
                    let span = parser.span_from(start);
                    return Ok(parser.push(
                        NodeKind::FunctionRef {
                            receiver: RefReceiver::Type(ty),
                            name: method,
                        },
                        span,
                    ));
                }
                let span = parser.span_from(start);
                return Ok(parser.push(NodeKind::StaticType(ty), span));
            }
            parser.advance();
            Ok(parser.push(NodeKind::Variable(name), start))
        }
        _ => Err(parser.unexpected("an expression")),
    }
}

/// `[a, b]`, `[]`, `[k: v, ...]` or `[:]`.
fn parse_collection(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::LeftBracket)?;

    if parser.eat(&Token::Colon) {
        parser.expect(Token::RightBracket)?;
        let span = parser.span_from(start);
        return Ok(parser.push(
            NodeKind::MapInit {
                keys: Vec::new(),
                values: Vec::new(),
            },
            span,
        ));
    }
    if parser.eat(&Token::RightBracket) {
        let span = parser.span_from(start);
        return Ok(parser.push(NodeKind::ListInit(Vec::new()), span));
    }

    let first = parse_expression(parser)?;
    let is_map = parser.check(&Token::Colon);
    let mut keys = Vec::new();
    let mut values = Vec::new();
    if is_map {
        parser.advance();
        keys.push(first);
        values.push(parse_expression(parser)?);
    } else {
        values.push(first);
    }

    let mut guard = LoopGuard::new("initializer");
    while parser.eat(&Token::Comma) {
        guard.check(parser.current_span())?;
        let item = parse_expression(parser)?;
        if is_map {
            parser.expect(Token::Colon)?;
            keys.push(item);
            values.push(parse_expression(parser)?);
        } else {
            values.push(item);
        }
    }
    parser.expect(Token::RightBracket)?;
    let span = parser.span_from(start);
    let kind = if is_map {
        NodeKind::MapInit { keys, values }
    } else {
        NodeKind::ListInit(values)
    };
    Ok(parser.push(kind, span))
}

/// `new T(args)`, `new T[n]`, `new T[n][]...` or `new T[] { a, b }`.
fn parse_new(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::New)?;
    let ty_span = parser.current_span();
    let name = parser.expect_identifier()?;
    if !parser.is_type_name(&name) {
        return Err(ParseError::new(
            ParseErrorKind::UnexpectedToken,
            format!("unknown type [{}]", name),
            ty_span,
        ));
    }

    if parser.check(&Token::LeftParen) {
        let args = parse_arguments(parser)?;
        let span = parser.span_from(start);
        return Ok(parser.push(
            NodeKind::NewObject {
                ty: TypeName::new(name, 0),
                args,
            },
            span,
        ));
    }

    parser.expect(Token::LeftBracket)?;
    if parser.eat(&Token::RightBracket) {
        let mut dims = 0u8;
        while parser.check(&Token::LeftBracket) && matches!(parser.peek(), Token::RightBracket) {
            parser.advance();
            parser.advance();
            dims = dims.saturating_add(1);
        }
        parser.expect(Token::LeftBrace)?;
        let mut values = Vec::new();
        let mut guard = LoopGuard::new("array initializer");
        while !parser.check(&Token::RightBrace) {
            guard.check(parser.current_span())?;
            values.push(parse_expression(parser)?);
            if !parser.eat(&Token::Comma) {
                break;
            }
        }
        parser.expect(Token::RightBrace)?;
        let span = parser.span_from(start);
        return Ok(parser.push(
            NodeKind::NewArrayInit {
                element: TypeName::new(name, dims),
                values,
            },
            span,
        ));
    }

    let length = parse_expression(parser)?;
    parser.expect(Token::RightBracket)?;
    let mut dims = 0u8;
    while parser.check(&Token::LeftBracket) && matches!(parser.peek(), Token::RightBracket) {
        parser.advance();
        parser.advance();
        dims = dims.saturating_add(1);
    }
    let span = parser.span_from(start);
    Ok(parser.push(
        NodeKind::NewArray {
            element: TypeName::new(name, dims),
            length,
        },
        span,
    ))
}

/// `x ->` or a parenthesized parameter list followed by `->`.
fn at_lambda(parser: &Parser) -> bool {
    match parser.current() {
        Token::Identifier(_) => matches!(parser.peek(), Token::Arrow),
        Token::LeftParen => {
            let mut depth = 0usize;
            let mut at = 0usize;
            loop {
                match parser.peek_at(at) {
                    Token::LeftParen => depth += 1,
                    Token::RightParen => {
                        depth -= 1;
                        if depth == 0 {
                            return matches!(parser.peek_at(at + 1), Token::Arrow);
                        }
                    }
                    Token::Eof => return false,
                    _ => {}
                }
                at += 1;
            }
        }
        _ => false,
    }
}

fn parse_lambda(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    let mut params = Vec::new();
    if parser.eat(&Token::LeftParen) {
        let mut guard = LoopGuard::new("lambda parameters");
        while !parser.check(&Token::RightParen) {
            guard.check(parser.current_span())?;
            let param_start = parser.current_span();
            let ty = if parser.at_declaration() {
                Some(parser.parse_type()?)
            } else {
                None
            };
            let name = parser.expect_identifier()?;
            params.push(LambdaParam {
                ty,
                name,
                span: parser.span_from(param_start),
            });
            if !parser.eat(&Token::Comma) {
                break;
            }
        }
        parser.expect(Token::RightParen)?;
    } else {
        let name = parser.expect_identifier()?;
        params.push(LambdaParam {
            ty: None,
            name,
            span: parser.span_from(start),
        });
    }
    parser.expect(Token::Arrow)?;

    let body = if parser.check(&Token::LeftBrace) {
        stmt::parse_block(parser)?
    } else {
        parse_expression(parser)?
    };
    let span = parser.span_from(start);
    Ok(parser.push(NodeKind::Lambda { params, body }, span))
}
