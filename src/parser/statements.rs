//! 语句解析
//!
//! 约定：进入每个解析函数时当前令牌是该语句的第一个令牌，
//! 返回时当前令牌是该语句的最后一个令牌（通常是 `;` 或 `}`）。

use crate::ast::*;
use crate::lexer::Token;
use super::{Parser, Precedence};
use super::expressions::parse_expression;

/// 解析单个语句
pub fn parse_statement(parser: &mut Parser) -> Option<Stmt> {
    if matches!(parser.current_token(), Token::Identifier(_)) && parser.peek.token.is_assignment_op() {
        return parse_assign_statement(parser);
    }

    match parser.current_token() {
        Token::Let => parse_let_statement(parser).map(Stmt::Let),
        Token::Fn => parse_function_statement(parser).map(Stmt::Function),
        Token::Return => parse_return_statement(parser),
        Token::If => parse_if_statement(parser).map(Stmt::If),
        Token::While => parse_while_statement(parser),
        Token::For => parse_for_statement(parser),
        Token::Break => {
            let loc = parser.current_loc();
            parser.expect_peek(&Token::Semicolon)?;
            Some(Stmt::Break(loc))
        }
        Token::Continue => {
            let loc = parser.current_loc();
            parser.expect_peek(&Token::Semicolon)?;
            Some(Stmt::Continue(loc))
        }
        Token::Import => parse_import_statement(parser),
        Token::From => parse_import_from_statement(parser),
        Token::Export => {
            parser.error_at_current("'export' is only allowed at the top level");
            parser.next_token();
            parse_statement(parser)
        }
        Token::LBrace => parse_block(parser).map(Stmt::Block),
        _ => parse_expression_statement(parser),
    }
}

/// `export fn ...` 或 `export let ...`
pub fn parse_export(parser: &mut Parser) -> Option<Stmt> {
    match parser.peek.token {
        Token::Fn | Token::Let => {
            parser.next_token();
            parse_statement(parser)
        }
        _ => {
            parser.peek_error("'fn' or 'let' after 'export'");
            None
        }
    }
}

/// `let name: type = expr;`
pub fn parse_let_statement(parser: &mut Parser) -> Option<LetStmt> {
    let loc = parser.current_loc();
    let name = parser.expect_peek_identifier()?;
    parser.expect_peek(&Token::Colon)?;
    let declared_type = parser.expect_peek_type()?;
    parser.expect_peek(&Token::Assign)?;
    parser.next_token();

    let value = parse_expression(parser, Precedence::Lowest)?;
    parser.expect_peek(&Token::Semicolon)?;

    Some(LetStmt { name, declared_type, value, loc })
}

/// `fn name(a: int, b: int) int { ... }`
pub fn parse_function_statement(parser: &mut Parser) -> Option<FunctionStmt> {
    let loc = parser.current_loc();
    let name = parser.expect_peek_identifier()?;
    parser.expect_peek(&Token::LParen)?;
    let params = parse_function_parameters(parser)?;
    let return_type = parser.expect_peek_type()?;
    parser.expect_peek(&Token::LBrace)?;
    let body = parse_block(parser)?;

    Some(FunctionStmt { name, params, return_type, body, loc })
}

fn parse_function_parameters(parser: &mut Parser) -> Option<Vec<Param>> {
    let mut params = Vec::new();

    if parser.peek_is(&Token::RParen) {
        parser.next_token();
        return Some(params);
    }

    loop {
        let name = parser.expect_peek_identifier()?;
        let loc = parser.current_loc();
        parser.expect_peek(&Token::Colon)?;
        let param_type = parser.expect_peek_type()?;
        params.push(Param { name, param_type, loc });

        if !parser.peek_is(&Token::Comma) {
            break;
        }
        parser.next_token();
    }

    parser.expect_peek(&Token::RParen)?;
    Some(params)
}

/// `{ stmt* }`，返回时当前令牌为 `}`
pub fn parse_block(parser: &mut Parser) -> Option<Block> {
    let loc = parser.current_loc();
    let mut statements = Vec::new();
    parser.next_token();

    while !parser.current_is(&Token::RBrace) {
        if parser.current_is(&Token::Eof) {
            parser.error_at_current("Expected '}' before end of file");
            return None;
        }
        let reported = parser.errors.len();
        match parse_statement(parser) {
            Some(stmt) => statements.push(stmt),
            None if parser.errors.len() > reported && !parser.synchronize() => continue,
            None => {}
        }
        parser.next_token();
    }

    Some(Block { statements, loc })
}

fn parse_return_statement(parser: &mut Parser) -> Option<Stmt> {
    let loc = parser.current_loc();

    if parser.peek_is(&Token::Semicolon) {
        parser.next_token();
        return Some(Stmt::Return(ReturnStmt { value: None, loc }));
    }

    parser.next_token();
    let value = parse_expression(parser, Precedence::Lowest)?;
    parser.expect_peek(&Token::Semicolon)?;

    Some(Stmt::Return(ReturnStmt { value: Some(value), loc }))
}

/// 赋值主体（不含结尾的 `;`），`for` 的步进部分也使用它
fn parse_assignment(parser: &mut Parser) -> Option<AssignStmt> {
    let loc = parser.current_loc();
    let name = match parser.current_token() {
        Token::Identifier(name) => name.clone(),
        _ => return None,
    };
    parser.next_token();

    let op = match parser.current_token() {
        Token::Assign => AssignOp::Assign,
        Token::AddAssign => AssignOp::AddAssign,
        Token::SubAssign => AssignOp::SubAssign,
        Token::MulAssign => AssignOp::MulAssign,
        Token::DivAssign => AssignOp::DivAssign,
        _ => return None,
    };
    parser.next_token();

    let value = parse_expression(parser, Precedence::Lowest)?;
    Some(AssignStmt { name, op, value, loc })
}

fn parse_assign_statement(parser: &mut Parser) -> Option<Stmt> {
    let stmt = parse_assignment(parser)?;
    parser.expect_peek(&Token::Semicolon)?;
    Some(Stmt::Assign(stmt))
}

fn parse_if_statement(parser: &mut Parser) -> Option<IfStmt> {
    let loc = parser.current_loc();
    parser.next_token();

    let condition = parse_expression(parser, Precedence::Lowest)?;
    parser.expect_peek(&Token::LBrace)?;
    let consequence = parse_block(parser)?;

    let mut alternative = None;
    if parser.peek_is(&Token::Else) {
        parser.next_token();
        if parser.peek_is(&Token::If) {
            // else if 链：嵌套在 else 块中
            parser.next_token();
            let else_loc = parser.current_loc();
            let nested = parse_if_statement(parser)?;
            alternative = Some(Block {
                statements: vec![Stmt::If(nested)],
                loc: else_loc,
            });
        } else {
            parser.expect_peek(&Token::LBrace)?;
            alternative = Some(parse_block(parser)?);
        }
    }

    Some(IfStmt { condition, consequence, alternative, loc })
}

fn parse_while_statement(parser: &mut Parser) -> Option<Stmt> {
    let loc = parser.current_loc();
    parser.next_token();

    let condition = parse_expression(parser, Precedence::Lowest)?;
    parser.expect_peek(&Token::LBrace)?;
    let body = parse_block(parser)?;

    Some(Stmt::While(WhileStmt { condition, body, loc }))
}

/// `for (let i: int = 0; i < 10; i++) { ... }`
fn parse_for_statement(parser: &mut Parser) -> Option<Stmt> {
    let loc = parser.current_loc();
    parser.expect_peek(&Token::LParen)?;
    parser.expect_peek(&Token::Let)?;
    let init = parse_let_statement(parser)?;
    parser.next_token();

    let condition = parse_expression(parser, Precedence::Lowest)?;
    parser.expect_peek(&Token::Semicolon)?;
    parser.next_token();

    let action = if matches!(parser.current_token(), Token::Identifier(_)) && parser.peek.token.is_assignment_op() {
        Stmt::Assign(parse_assignment(parser)?)
    } else {
        Stmt::Expression(parse_expression(parser, Precedence::Lowest)?)
    };

    parser.expect_peek(&Token::RParen)?;
    parser.expect_peek(&Token::LBrace)?;
    let body = parse_block(parser)?;

    Some(Stmt::For(ForStmt {
        init,
        condition,
        action: Box::new(action),
        body,
        loc,
    }))
}

/// `import "name";`
fn parse_import_statement(parser: &mut Parser) -> Option<Stmt> {
    let loc = parser.current_loc();
    let module = match &parser.peek.token {
        Token::StringLiteral(s) => s.clone(),
        _ => {
            parser.peek_error("module name string");
            return None;
        }
    };
    parser.next_token();
    parser.expect_peek(&Token::Semicolon)?;

    Some(Stmt::Import(ImportStmt { module, loc }))
}

/// `from name import a, b;`
fn parse_import_from_statement(parser: &mut Parser) -> Option<Stmt> {
    let loc = parser.current_loc();
    let module = match &parser.peek.token {
        Token::Identifier(s) | Token::StringLiteral(s) => s.clone(),
        _ => {
            parser.peek_error("module name");
            return None;
        }
    };
    parser.next_token();
    parser.expect_peek(&Token::Import)?;

    let mut names = vec![parser.expect_peek_identifier()?];
    while parser.peek_is(&Token::Comma) {
        parser.next_token();
        names.push(parser.expect_peek_identifier()?);
    }
    parser.expect_peek(&Token::Semicolon)?;

    Some(Stmt::ImportFrom(ImportFromStmt { module, names, loc }))
}

fn parse_expression_statement(parser: &mut Parser) -> Option<Stmt> {
    let expr = parse_expression(parser, Precedence::Lowest)?;
    if parser.peek_is(&Token::Semicolon) {
        parser.next_token();
    }
    Some(Stmt::Expression(expr))
}
