//! ZynLang 语法分析器
//!
//! 从令牌源按需拉取令牌（当前令牌 + 一个前瞻令牌），构造 AST。
//! 表达式采用 Pratt（优先级爬升）解析，语句按关键字分派。
//! 出错时记录诊断并放弃当前结构，继续解析后续语句。

mod statements;
mod expressions;

use std::mem;
use crate::ast::Program;
use crate::error::{ZynError, SourceLocation, lexer_error, parser_error};
use crate::lexer::{Lexer, Token, TokenSource, TokenWithLocation, VecTokenSource};
use crate::types::Type;

/// 运算符绑定强度，从低到高
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest,
    /// `==`, `!=`
    Equals,
    /// `<`, `>`, `<=`, `>=`
    LessGreater,
    /// `+`, `-`
    Sum,
    /// `*`, `/`, `%`
    Product,
    /// `^`
    Exponent,
    /// `-x`, `!x`
    Prefix,
    /// `f(x)`
    Call,
    /// `a[i]`, `i++`, `i--`
    Index,
}

impl Precedence {
    pub fn of(token: &Token) -> Precedence {
        match token {
            Token::EqEq | Token::NotEq => Precedence::Equals,
            Token::Lt | Token::Gt | Token::Le | Token::Ge => Precedence::LessGreater,
            Token::Plus | Token::Minus => Precedence::Sum,
            Token::Star | Token::Slash | Token::Percent => Precedence::Product,
            Token::Caret => Precedence::Exponent,
            Token::LParen => Precedence::Call,
            Token::LBracket | Token::Inc | Token::Dec => Precedence::Index,
            _ => Precedence::Lowest,
        }
    }
}

/// 语法分析器
pub struct Parser<'a> {
    source: Box<dyn TokenSource + 'a>,
    current: TokenWithLocation,
    peek: TokenWithLocation,
    errors: Vec<ZynError>,
}

impl<'a> Parser<'a> {
    /// 创建语法分析器并预读两个令牌
    pub fn new(source: impl TokenSource + 'a) -> Self {
        let mut source: Box<dyn TokenSource + 'a> = Box::new(source);
        let current = source.next_token();
        let peek = source.next_token();
        Self {
            source,
            current,
            peek,
            errors: Vec::new(),
        }
    }

    /// 解析整个程序
    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::default();

        while !self.current_is(&Token::Eof) {
            let reported = self.errors.len();
            let stmt = if self.current_is(&Token::Export) {
                statements::parse_export(self).map(|stmt| {
                    program.exports.push(program.statements.len());
                    stmt
                })
            } else {
                statements::parse_statement(self)
            };
            match stmt {
                Some(stmt) => program.statements.push(stmt),
                // 顶层多余的 `}` 也一并跳过
                None if self.errors.len() > reported => {
                    self.synchronize();
                }
                None => {}
            }
            self.next_token();
        }

        program
    }

    pub fn errors(&self) -> &[ZynError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ZynError> {
        self.errors
    }

    /// 出错后跳过该语句剩余的令牌，停在 `;`、自身的 `}` 或外层 `}` 之前
    ///
    /// 当前令牌已是外层块的 `}` 或文件结尾时返回 false，调用方不应再前进。
    fn synchronize(&mut self) -> bool {
        let mut depth = 0usize;
        loop {
            match self.current_token() {
                Token::Eof => return false,
                Token::RBrace if depth == 0 => return false,
                Token::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return true;
                    }
                }
                Token::LBrace => depth += 1,
                Token::Semicolon if depth == 0 => return true,
                _ => {}
            }
            if depth == 0 && (self.peek_is(&Token::RBrace) || self.peek_is(&Token::Eof)) {
                return true;
            }
            self.next_token();
        }
    }

    // 辅助方法

    fn next_token(&mut self) {
        let next = self.source.next_token();
        self.current = mem::replace(&mut self.peek, next);
    }

    fn current_token(&self) -> &Token {
        &self.current.token
    }

    fn current_loc(&self) -> SourceLocation {
        self.current.loc
    }

    fn current_is(&self, token: &Token) -> bool {
        same_kind(&self.current.token, token)
    }

    fn peek_is(&self, token: &Token) -> bool {
        same_kind(&self.peek.token, token)
    }

    fn peek_precedence(&self) -> Precedence {
        Precedence::of(&self.peek.token)
    }

    fn current_precedence(&self) -> Precedence {
        Precedence::of(&self.current.token)
    }

    /// 前瞻令牌符合预期时前进，否则记录诊断
    fn expect_peek(&mut self, token: &Token) -> Option<()> {
        if self.peek_is(token) {
            self.next_token();
            Some(())
        } else {
            self.peek_error(&token.to_string());
            None
        }
    }

    fn expect_peek_identifier(&mut self) -> Option<String> {
        match &self.peek.token {
            Token::Identifier(name) => {
                let name = name.clone();
                self.next_token();
                Some(name)
            }
            _ => {
                self.peek_error("identifier");
                None
            }
        }
    }

    fn expect_peek_type(&mut self) -> Option<Type> {
        let ty = match &self.peek.token {
            Token::Type(name) => Type::from_name(name),
            _ => None,
        };
        match ty {
            Some(ty) => {
                self.next_token();
                Some(ty)
            }
            None => {
                self.peek_error("type name");
                None
            }
        }
    }

    fn peek_error(&mut self, expected: &str) {
        let loc = self.peek.loc;
        let message = match &self.peek.token {
            Token::Illegal(s) => {
                self.errors.push(lexer_error(loc, format!("Unexpected character: '{}'", s)));
                return;
            }
            found => format!("Expected {}, found {}", expected, found),
        };
        self.errors.push(parser_error(loc, message));
    }

    fn error_at_current(&mut self, message: impl Into<String>) {
        let loc = self.current.loc;
        self.errors.push(parser_error(loc, message));
    }
}

fn same_kind(a: &Token, b: &Token) -> bool {
    mem::discriminant(a) == mem::discriminant(b)
}

/// 解析源代码，返回（可能不完整的）程序和诊断列表
pub fn parse(source: &str) -> (Program, Vec<ZynError>) {
    let mut parser = Parser::new(Lexer::new(source));
    let program = parser.parse_program();
    (program, parser.into_errors())
}

/// 解析预先切分好的令牌序列
pub fn parse_tokens(tokens: Vec<TokenWithLocation>) -> (Program, Vec<ZynError>) {
    let mut parser = Parser::new(VecTokenSource::new(tokens));
    let program = parser.parse_program();
    (program, parser.into_errors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::lexer::lex;

    fn parse_ok(source: &str) -> Program {
        let (program, errors) = parse(source);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        program
    }

    fn expression(source: &str) -> Expr {
        let program = parse_ok(source);
        match program.statements.into_iter().next() {
            Some(Stmt::Expression(expr)) => expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_product_binds_tighter_than_sum() {
        let expr = expression("1 + 2 * 3;");
        assert_eq!(expr.to_string(), "(1 + (2 * 3))");
        match expr {
            Expr::Infix(InfixExpr { op: InfixOp::Add, right, .. }) => {
                assert!(matches!(*right, Expr::Infix(InfixExpr { op: InfixOp::Mul, .. })));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_grouping_overrides_precedence() {
        assert_eq!(expression("(1 + 2) * 3;").to_string(), "((1 + 2) * 3)");
    }

    #[test]
    fn test_operator_precedence_table() {
        let cases = [
            ("a + b - c;", "((a + b) - c)"),
            ("a * b / c % d;", "(((a * b) / c) % d)"),
            ("-a * b;", "((-a) * b)"),
            ("!a == b;", "((!a) == b)"),
            ("a < b == c > d;", "((a < b) == (c > d))"),
            ("a != b;", "(a != b)"),
            ("2 ^ 3 * 4;", "((2 ^ 3) * 4)"),
            ("a + b ^ c;", "(a + (b ^ c))"),
            ("a + f(b * c, d);", "(a + f((b * c), d))"),
            ("a * arr[1 + 2];", "(a * (arr[(1 + 2)]))"),
            ("i++ + 1;", "((i++) + 1)"),
            ("-i--;", "(-(i--))"),
            ("f(g(1))[0];", "(f(g(1))[0])"),
        ];
        for (source, expected) in cases {
            assert_eq!(expression(source).to_string(), expected, "source: {}", source);
        }
    }

    #[test]
    fn test_literals() {
        assert_eq!(expression("[1, 2, 3];").to_string(), "[1, 2, 3]");
        assert_eq!(expression("[];").to_string(), "[]");
        assert_eq!(expression("f({\"a\": 1, \"b\": 2});").to_string(), "f({\"a\": 1, \"b\": 2})");
        assert_eq!(expression("2.5;").node_type(), NodeType::FloatLiteral);
        assert_eq!(expression("true;").node_type(), NodeType::BooleanLiteral);
        assert_eq!(expression("\"hi\";").node_type(), NodeType::StringLiteral);
    }

    #[test]
    fn test_let_requires_declared_type() {
        let program = parse_ok("let x: float = 1.5;");
        match &program.statements[0] {
            Stmt::Let(stmt) => {
                assert_eq!(stmt.name, "x");
                assert_eq!(stmt.declared_type, Type::Float);
            }
            other => panic!("expected let, got {:?}", other),
        }

        let (_, errors) = parse("let x = 1;");
        assert!(!errors.is_empty());
        assert!(errors[0].message().contains("Expected ':'"), "{}", errors[0]);
    }

    #[test]
    fn test_assignment_dispatch() {
        let program = parse_ok("x = 1; y += 2; z -= 3; w *= 4; v /= 5; f(x);");
        let ops: Vec<_> = program.statements[..5]
            .iter()
            .map(|s| match s {
                Stmt::Assign(a) => a.op,
                other => panic!("expected assignment, got {:?}", other),
            })
            .collect();
        assert_eq!(
            ops,
            vec![AssignOp::Assign, AssignOp::AddAssign, AssignOp::SubAssign, AssignOp::MulAssign, AssignOp::DivAssign]
        );
        assert_eq!(program.statements[5].node_type(), NodeType::ExpressionStatement);
    }

    #[test]
    fn test_function_statement() {
        let program = parse_ok("fn add(a: int, b: int) int { return a + b; }");
        match &program.statements[0] {
            Stmt::Function(f) => {
                assert_eq!(f.name, "add");
                assert_eq!(f.params.len(), 2);
                assert_eq!(f.params[1].param_type, Type::Int);
                assert_eq!(f.params[0].node_type(), NodeType::FunctionParameter);
                assert_eq!(f.return_type, Type::Int);
                assert_eq!(f.body.statements.len(), 1);
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_for_statement_parts() {
        let program = parse_ok("fn main() void { for (let i: int = 0; i < 10; i++) { print(\"%d\", i); } }");
        let Stmt::Function(f) = &program.statements[0] else { panic!("expected function") };
        match &f.body.statements[0] {
            Stmt::For(stmt) => {
                assert_eq!(stmt.init.name, "i");
                assert_eq!(stmt.condition.to_string(), "(i < 10)");
                assert_eq!(stmt.action.node_type(), NodeType::ExpressionStatement);
                assert_eq!(stmt.body.statements.len(), 1);
            }
            other => panic!("expected for, got {:?}", other),
        }

        let program = parse_ok("fn main() void { for (let i: int = 0; i < 10; i += 2) { } }");
        let Stmt::Function(f) = &program.statements[0] else { panic!("expected function") };
        let Stmt::For(stmt) = &f.body.statements[0] else { panic!("expected for") };
        assert_eq!(stmt.action.node_type(), NodeType::AssignStatement);
    }

    #[test]
    fn test_if_else_if_chain() {
        let program = parse_ok("fn f(x: int) int { if x < 0 { return 0; } else if x < 10 { return 1; } else { return 2; } }");
        let Stmt::Function(f) = &program.statements[0] else { panic!("expected function") };
        let Stmt::If(stmt) = &f.body.statements[0] else { panic!("expected if") };
        let alternative = stmt.alternative.as_ref().unwrap();
        match &alternative.statements[0] {
            Stmt::If(nested) => assert!(nested.alternative.is_some()),
            other => panic!("expected nested if, got {:?}", other),
        }
    }

    #[test]
    fn test_exports_are_a_view_into_statements() {
        let program = parse_ok(
            "export fn add(a: int, b: int) int { return a + b; }\n\
             fn helper() int { return 1; }\n\
             export let answer: int = 42;",
        );
        assert_eq!(program.statements.len(), 3);
        assert_eq!(program.exports, vec![0, 2]);
        let names: Vec<_> = program.exported().filter_map(|s| s.declared_name()).collect();
        assert_eq!(names, vec!["add", "answer"]);
        assert!(program.find_export("helper").is_none());
    }

    #[test]
    fn test_export_requires_declaration() {
        let (_, errors) = parse("export x = 1;");
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_imports() {
        let program = parse_ok("import \"math\";\nfrom util import add, sub;\nfrom \"lib/io\" import write;");
        match &program.statements[0] {
            Stmt::Import(stmt) => assert_eq!(stmt.module, "math"),
            other => panic!("expected import, got {:?}", other),
        }
        match &program.statements[1] {
            Stmt::ImportFrom(stmt) => {
                assert_eq!(stmt.module, "util");
                assert_eq!(stmt.names, vec!["add", "sub"]);
            }
            other => panic!("expected from-import, got {:?}", other),
        }
        match &program.statements[2] {
            Stmt::ImportFrom(stmt) => assert_eq!(stmt.module, "lib/io"),
            other => panic!("expected from-import, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_prefix_rule_reports_and_continues() {
        let (program, errors) = parse("let a: int = ;\nlet b: int = 2;");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().contains("No prefix parse rule"), "{}", errors[0]);
        assert_eq!(errors[0].location(), Some(SourceLocation::new(1, 14)));
        assert!(program.statements.iter().any(|s| s.declared_name() == Some("b")));
    }

    #[test]
    fn test_failed_statement_is_skipped_as_a_whole() {
        let (program, errors) = parse("fn main() int {\n    let x int = 5;\n    return 0;\n}");
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].message().contains("Expected ':'"), "{}", errors[0]);
        let Stmt::Function(f) = &program.statements[0] else { panic!("expected function") };
        assert_eq!(f.body.statements.len(), 1);
        assert_eq!(f.body.statements[0].node_type(), NodeType::ReturnStatement);
    }

    #[test]
    fn test_recovery_stays_inside_the_enclosing_block() {
        let (program, errors) = parse("fn f() void { let y: int = (1 + ; }\nfn g() int { return 1; }");
        assert_eq!(errors.len(), 1, "{:?}", errors);
        let names: Vec<_> = program.statements.iter().filter_map(|s| s.declared_name()).collect();
        assert_eq!(names, vec!["f", "g"]);

        // 出错的语句带有自己的块时整体跳过
        let (program, errors) = parse("fn (x: int) int { return x; }\nlet a: int = 1;");
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert_eq!(program.statements.len(), 1);
        assert_eq!(program.statements[0].declared_name(), Some("a"));
    }

    #[test]
    fn test_stray_closing_brace_is_reported_once() {
        let (program, errors) = parse("}\nlet a: int = 1;");
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn test_multiple_errors_per_run() {
        let (_, errors) = parse("let a int = 1;\nlet b: int 2;\nfn () int {}");
        assert!(errors.len() >= 3, "{:?}", errors);
    }

    #[test]
    fn test_illegal_character_reported_as_lexer_error() {
        let (_, errors) = parse("let a: int = 1 $ 2;");
        assert!(errors.iter().any(|e| matches!(e, ZynError::Lexer { .. })), "{:?}", errors);
    }

    #[test]
    fn test_parse_from_token_vector() {
        let (program, errors) = parse_tokens(lex("1 + 2;"));
        assert!(errors.is_empty());
        assert_eq!(program.statements.len(), 1);
    }
}
