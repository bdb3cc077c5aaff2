//! 表达式解析（Pratt）
//!
//! 每种能开始表达式的令牌对应一个前缀规则，每种能延续表达式的令牌
//! 对应一个中缀规则和固定的优先级。调用 `f(..)`、索引 `a[..]` 以及
//! 后缀 `++`/`--` 都作为高优先级的中缀规则处理。

use crate::ast::*;
use crate::error::lexer_error;
use crate::lexer::Token;
use super::{Parser, Precedence};

type PrefixRule = fn(&mut Parser) -> Option<Expr>;
type InfixRule = fn(&mut Parser, Expr) -> Option<Expr>;

fn prefix_rule(token: &Token) -> Option<PrefixRule> {
    let rule: PrefixRule = match token {
        Token::Identifier(_) => parse_identifier,
        Token::IntegerLiteral(_) => parse_integer_literal,
        Token::FloatLiteral(_) => parse_float_literal,
        Token::True | Token::False => parse_boolean_literal,
        Token::StringLiteral(_) => parse_string_literal,
        Token::Minus | Token::Bang => parse_prefix_expression,
        Token::LParen => parse_grouped_expression,
        Token::LBracket => parse_array_literal,
        Token::LBrace => parse_hash_literal,
        _ => return None,
    };
    Some(rule)
}

fn infix_rule(token: &Token) -> Option<InfixRule> {
    let rule: InfixRule = match token {
        Token::Plus
        | Token::Minus
        | Token::Star
        | Token::Slash
        | Token::Percent
        | Token::Caret
        | Token::EqEq
        | Token::NotEq
        | Token::Lt
        | Token::Le
        | Token::Gt
        | Token::Ge => parse_infix_expression,
        Token::LParen => parse_call_expression,
        Token::LBracket => parse_index_expression,
        Token::Inc | Token::Dec => parse_postfix_expression,
        _ => return None,
    };
    Some(rule)
}

/// 以 `precedence` 为下限解析表达式，返回时当前令牌是表达式的最后一个令牌
pub fn parse_expression(parser: &mut Parser, precedence: Precedence) -> Option<Expr> {
    let prefix = match prefix_rule(parser.current_token()) {
        Some(rule) => rule,
        None => {
            no_prefix_rule_error(parser);
            return None;
        }
    };
    let mut left = prefix(parser)?;

    while !parser.peek_is(&Token::Semicolon) && precedence < parser.peek_precedence() {
        let infix = match infix_rule(&parser.peek.token) {
            Some(rule) => rule,
            None => return Some(left),
        };
        parser.next_token();
        left = infix(parser, left)?;
    }

    Some(left)
}

fn no_prefix_rule_error(parser: &mut Parser) {
    let loc = parser.current_loc();
    match parser.current_token() {
        Token::Illegal(s) => {
            let err = lexer_error(loc, format!("Unexpected character: '{}'", s));
            parser.errors.push(err);
        }
        other => {
            let message = format!("No prefix parse rule for {}", other);
            parser.error_at_current(message);
        }
    }
}

fn parse_identifier(parser: &mut Parser) -> Option<Expr> {
    match parser.current_token() {
        Token::Identifier(name) => Some(Expr::Identifier(IdentifierExpr {
            name: name.clone(),
            loc: parser.current_loc(),
        })),
        _ => None,
    }
}

fn parse_integer_literal(parser: &mut Parser) -> Option<Expr> {
    let loc = parser.current_loc();
    match parser.current_token() {
        Token::IntegerLiteral(Some(v)) => Some(Expr::Literal(LiteralExpr {
            value: LiteralValue::Integer(*v),
            loc,
        })),
        _ => {
            parser.error_at_current("Integer literal is too large");
            None
        }
    }
}

fn parse_float_literal(parser: &mut Parser) -> Option<Expr> {
    let loc = parser.current_loc();
    match parser.current_token() {
        Token::FloatLiteral(Some(v)) => Some(Expr::Literal(LiteralExpr {
            value: LiteralValue::Float(*v),
            loc,
        })),
        _ => {
            parser.error_at_current("Could not parse float literal");
            None
        }
    }
}

fn parse_boolean_literal(parser: &mut Parser) -> Option<Expr> {
    Some(Expr::Literal(LiteralExpr {
        value: LiteralValue::Boolean(parser.current_is(&Token::True)),
        loc: parser.current_loc(),
    }))
}

fn parse_string_literal(parser: &mut Parser) -> Option<Expr> {
    match parser.current_token() {
        Token::StringLiteral(s) => Some(Expr::Literal(LiteralExpr {
            value: LiteralValue::String(s.clone()),
            loc: parser.current_loc(),
        })),
        _ => None,
    }
}

fn parse_prefix_expression(parser: &mut Parser) -> Option<Expr> {
    let loc = parser.current_loc();
    let op = if parser.current_is(&Token::Minus) {
        PrefixOp::Neg
    } else {
        PrefixOp::Not
    };
    parser.next_token();

    let operand = parse_expression(parser, Precedence::Prefix)?;
    Some(Expr::Prefix(PrefixExpr {
        op,
        operand: Box::new(operand),
        loc,
    }))
}

fn parse_grouped_expression(parser: &mut Parser) -> Option<Expr> {
    parser.next_token();
    let expr = parse_expression(parser, Precedence::Lowest)?;
    parser.expect_peek(&Token::RParen)?;
    Some(expr)
}

fn parse_array_literal(parser: &mut Parser) -> Option<Expr> {
    let loc = parser.current_loc();
    let elements = parse_expression_list(parser, &Token::RBracket)?;
    Some(Expr::Array(ArrayLiteral { elements, loc }))
}

/// `{ key: value, ... }`
fn parse_hash_literal(parser: &mut Parser) -> Option<Expr> {
    let loc = parser.current_loc();
    let mut pairs = Vec::new();

    while !parser.peek_is(&Token::RBrace) {
        parser.next_token();
        let key = parse_expression(parser, Precedence::Lowest)?;
        parser.expect_peek(&Token::Colon)?;
        parser.next_token();
        let value = parse_expression(parser, Precedence::Lowest)?;
        pairs.push((key, value));

        if !parser.peek_is(&Token::RBrace) {
            parser.expect_peek(&Token::Comma)?;
        }
    }
    parser.expect_peek(&Token::RBrace)?;

    Some(Expr::Hash(HashLiteral { pairs, loc }))
}

/// 逗号分隔的表达式列表，当前令牌为左括号
fn parse_expression_list(parser: &mut Parser, end: &Token) -> Option<Vec<Expr>> {
    let mut items = Vec::new();

    if parser.peek_is(end) {
        parser.next_token();
        return Some(items);
    }

    parser.next_token();
    items.push(parse_expression(parser, Precedence::Lowest)?);

    while parser.peek_is(&Token::Comma) {
        parser.next_token();
        parser.next_token();
        items.push(parse_expression(parser, Precedence::Lowest)?);
    }

    parser.expect_peek(end)?;
    Some(items)
}

fn parse_infix_expression(parser: &mut Parser, left: Expr) -> Option<Expr> {
    let loc = parser.current_loc();
    let op = match parser.current_token() {
        Token::Plus => InfixOp::Add,
        Token::Minus => InfixOp::Sub,
        Token::Star => InfixOp::Mul,
        Token::Slash => InfixOp::Div,
        Token::Percent => InfixOp::Mod,
        Token::Caret => InfixOp::Pow,
        Token::EqEq => InfixOp::Eq,
        Token::NotEq => InfixOp::NotEq,
        Token::Lt => InfixOp::Lt,
        Token::Le => InfixOp::Le,
        Token::Gt => InfixOp::Gt,
        Token::Ge => InfixOp::Ge,
        _ => return None,
    };
    let precedence = parser.current_precedence();
    parser.next_token();

    let right = parse_expression(parser, precedence)?;
    Some(Expr::Infix(InfixExpr {
        left: Box::new(left),
        op,
        right: Box::new(right),
        loc,
    }))
}

fn parse_call_expression(parser: &mut Parser, callee: Expr) -> Option<Expr> {
    let loc = callee.loc();
    let args = parse_expression_list(parser, &Token::RParen)?;
    Some(Expr::Call(CallExpr {
        callee: Box::new(callee),
        args,
        loc,
    }))
}

fn parse_index_expression(parser: &mut Parser, target: Expr) -> Option<Expr> {
    let loc = parser.current_loc();
    parser.next_token();
    let index = parse_expression(parser, Precedence::Lowest)?;
    parser.expect_peek(&Token::RBracket)?;

    Some(Expr::Index(IndexExpr {
        target: Box::new(target),
        index: Box::new(index),
        loc,
    }))
}

/// `i++` / `i--`：不消耗右操作数
fn parse_postfix_expression(parser: &mut Parser, operand: Expr) -> Option<Expr> {
    let op = if parser.current_is(&Token::Inc) {
        PostfixOp::Inc
    } else {
        PostfixOp::Dec
    };
    Some(Expr::Postfix(PostfixExpr {
        operand: Box::new(operand),
        op,
        loc: parser.current_loc(),
    }))
}
