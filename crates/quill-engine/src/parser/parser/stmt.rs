//! Statement parsing

use super::guards::LoopGuard;
use super::{expr, ParseError, ParseErrorKind, Parser};
use crate::parser::ast::{NodeId, NodeKind, Param, TypeName};
use crate::parser::token::{Span, Token};

/// Parse `Type name(params) { body }`.
pub fn parse_function(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    let return_type = parser.parse_type()?;
    let name = parser.expect_identifier()?;
    parser.expect(Token::LeftParen)?;

    let mut params = Vec::new();
    let mut guard = LoopGuard::new("parameters");
    while !parser.check(&Token::RightParen) {
        guard.check(parser.current_span())?;
        let param_start = parser.current_span();
        let ty = parser.parse_type()?;
        let param_name = parser.expect_identifier()?;
        params.push(Param {
            ty,
            name: param_name,
            span: parser.span_from(param_start),
        });
        if !parser.eat(&Token::Comma) {
            break;
        }
    }
    parser.expect(Token::RightParen)?;

    if !parser.check(&Token::LeftBrace) {
        return Err(parser.unexpected("a function body"));
    }
    let body = parse_block(parser)?;
    let span = parser.span_from(start);
    Ok(parser.push(
        NodeKind::Function {
            return_type,
            name,
            params,
            body,
        },
        span,
    ))
}

/// Parse a statement.
pub fn parse_statement(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let span = parser.current_span();
    parser.depth.enter("statement", span)?;
    // inner function so `?` can be used while the depth is always restored
    let result = parse_statement_inner(parser);
    parser.depth.leave();
    result
}

fn parse_statement_inner(parser: &mut Parser) -> Result<NodeId, ParseError> {
    match parser.current() {
        Token::LeftBrace => parse_block(parser),
        Token::If => parse_if(parser),
        Token::While => parse_while(parser),
        Token::Do => parse_do_while(parser),
        Token::For => parse_for(parser),
        Token::Try => parse_try(parser),
        Token::Return => parse_return(parser),
        Token::Throw => {
            let start = parser.current_span();
            parser.advance();
            let value = expr::parse_expression(parser)?;
            end_statement(parser)?;
            let span = parser.span_from(start);
            Ok(parser.push(NodeKind::Throw(value), span))
        }
        Token::Break | Token::Continue => {
            let start = parser.current_span();
            let kind = if matches!(parser.advance(), Token::Break) {
                NodeKind::Break
            } else {
                NodeKind::Continue
            };
            end_statement(parser)?;
            let span = parser.span_from(start);
            Ok(parser.push(kind, span))
        }
        Token::Semicolon => {
            let span = parser.current_span();
            parser.advance();
            Ok(parser.push(NodeKind::Empty, span))
        }
        _ if parser.at_declaration() => {
            let decl = parse_declarations(parser)?;
            end_statement(parser)?;
            Ok(decl)
        }
        _ => {
            let start = parser.current_span();
            let expression = expr::parse_expression(parser)?;
            end_statement(parser)?;
            let span = parser.span_from(start);
            Ok(parser.push(NodeKind::ExprStatement(expression), span))
        }
    }
}

/// A `;` terminates a statement; it may be left off before `}` or the end.
fn end_statement(parser: &mut Parser) -> Result<(), ParseError> {
    if parser.eat(&Token::Semicolon)
        || parser.check(&Token::RightBrace)
        || parser.at_eof()
    {
        Ok(())
    } else {
        Err(parser.unexpected("';'"))
    }
}

pub fn parse_block(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::LeftBrace)?;
    let mut statements = Vec::new();
    let mut guard = LoopGuard::new("block");
    while !parser.check(&Token::RightBrace) {
        guard.check(parser.current_span())?;
        if parser.at_eof() {
            return Err(parser.unexpected("'}'"));
        }
        statements.push(parse_statement(parser)?);
    }
    parser.advance();
    let span = parser.span_from(start);
    Ok(parser.push(NodeKind::Block(statements), span))
}

/// `Type a = e, b, c = f` without the terminating semicolon.
pub fn parse_declarations(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    let ty = parser.parse_type()?;
    let mut declarators = Vec::new();
    let mut guard = LoopGuard::new("declarators");
    loop {
        guard.check(parser.current_span())?;
        let decl_start = parser.current_span();
        let name = parser.expect_identifier()?;
        let init = if parser.eat(&Token::Equal) {
            Some(expr::parse_expression(parser)?)
        } else {
            None
        };
        let span = parser.span_from(decl_start);
        declarators.push(parser.push(
            NodeKind::Declaration {
                ty: ty.clone(),
                name,
                init,
            },
            span,
        ));
        if !parser.eat(&Token::Comma) {
            break;
        }
    }
    let span = parser.span_from(start);
    Ok(parser.push(NodeKind::Declarations(declarators), span))
}

fn parse_condition(parser: &mut Parser) -> Result<NodeId, ParseError> {
    parser.expect(Token::LeftParen)?;
    let condition = expr::parse_expression(parser)?;
    parser.expect(Token::RightParen)?;
    Ok(condition)
}

fn parse_if(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::If)?;
    let condition = parse_condition(parser)?;
    let then_branch = parse_statement(parser)?;
    let else_branch = if parser.eat(&Token::Else) {
        Some(parse_statement(parser)?)
    } else {
        None
    };
    let span = parser.span_from(start);
    Ok(parser.push(
        NodeKind::If {
            condition,
            then_branch,
            else_branch,
        },
        span,
    ))
}

/// Loop body; a lone `;` means no body.
fn parse_loop_body(parser: &mut Parser) -> Result<Option<NodeId>, ParseError> {
    if parser.eat(&Token::Semicolon) {
        Ok(None)
    } else {
        Ok(Some(parse_statement(parser)?))
    }
}

fn parse_while(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::While)?;
    let condition = parse_condition(parser)?;
    let body = parse_loop_body(parser)?;
    let span = parser.span_from(start);
    Ok(parser.push(NodeKind::While { condition, body }, span))
}

fn parse_do_while(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Do)?;
    if !parser.check(&Token::LeftBrace) {
        return Err(parser.unexpected("'{'"));
    }
    let body = parse_block(parser)?;
    parser.expect(Token::While)?;
    let condition = parse_condition(parser)?;
    end_statement(parser)?;
    let span = parser.span_from(start);
    Ok(parser.push(NodeKind::DoWhile { body, condition }, span))
}

fn parse_for(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::For)?;
    parser.expect(Token::LeftParen)?;

    // for (x in e)
    if matches!(parser.current(), Token::Identifier(_)) && matches!(parser.peek(), Token::In) {
        let name = parser.expect_identifier()?;
        parser.advance();
        return finish_for_each(parser, start, TypeName::def(), name);
    }

    // for (T x : e)
    if let Some(at) = parser.scan_type(0) {
        if matches!(parser.peek_at(at), Token::Identifier(_))
            && matches!(parser.peek_at(at + 1), Token::Colon)
        {
            let ty = parser.parse_type()?;
            let name = parser.expect_identifier()?;
            parser.expect(Token::Colon)?;
            return finish_for_each(parser, start, ty, name);
        }
    }

    let init = if parser.check(&Token::Semicolon) {
        None
    } else if parser.at_declaration() {
        Some(parse_declarations(parser)?)
    } else {
        Some(expr::parse_expression(parser)?)
    };
    parser.expect(Token::Semicolon)?;
    let condition = if parser.check(&Token::Semicolon) {
        None
    } else {
        Some(expr::parse_expression(parser)?)
    };
    parser.expect(Token::Semicolon)?;
    let update = if parser.check(&Token::RightParen) {
        None
    } else {
        Some(expr::parse_expression(parser)?)
    };
    parser.expect(Token::RightParen)?;
    let body = parse_loop_body(parser)?;
    let span = parser.span_from(start);
    Ok(parser.push(
        NodeKind::For {
            init,
            condition,
            update,
            body,
        },
        span,
    ))
}

fn finish_for_each(
    parser: &mut Parser,
    start: Span,
    ty: TypeName,
    name: String,
) -> Result<NodeId, ParseError> {
    let iterable = expr::parse_expression(parser)?;
    parser.expect(Token::RightParen)?;
    let body = parse_statement(parser)?;
    let span = parser.span_from(start);
    Ok(parser.push(
        NodeKind::ForEach {
            ty,
            name,
            iterable,
            body,
        },
        span,
    ))
}

fn parse_try(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Try)?;
    if !parser.check(&Token::LeftBrace) {
        return Err(parser.unexpected("'{'"));
    }
    let body = parse_block(parser)?;

    let mut catches = Vec::new();
    let mut guard = LoopGuard::new("catch clauses");
    while parser.check(&Token::Catch) {
        guard.check(parser.current_span())?;
        let catch_start = parser.current_span();
        parser.advance();
        parser.expect(Token::LeftParen)?;
        let ty = parser.parse_type()?;
        let name = parser.expect_identifier()?;
        parser.expect(Token::RightParen)?;
        if !parser.check(&Token::LeftBrace) {
            return Err(parser.unexpected("'{'"));
        }
        let catch_body = parse_block(parser)?;
        let span = parser.span_from(catch_start);
        catches.push(parser.push(
            NodeKind::Catch {
                ty,
                name,
                body: catch_body,
            },
            span,
        ));
    }
    if catches.is_empty() {
        return Err(ParseError::new(
            ParseErrorKind::UnexpectedToken,
            "try must be followed by at least one catch",
            parser.current_span(),
        ));
    }
    let span = parser.span_from(start);
    Ok(parser.push(NodeKind::Try { body, catches }, span))
}

fn parse_return(parser: &mut Parser) -> Result<NodeId, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Return)?;
    let value = if parser.check(&Token::Semicolon)
        || parser.check(&Token::RightBrace)
        || parser.at_eof()
    {
        None
    } else {
        Some(expr::parse_expression(parser)?)
    };
    end_statement(parser)?;
    let span = parser.span_from(start);
    Ok(parser.push(NodeKind::Return(value), span))
}
