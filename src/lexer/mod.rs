//! ZynLang 词法分析器
//!
//! 基于 logos 的按需令牌源：语法分析器每次拉取一个令牌，
//! 输入结束后持续返回 `Eof` 哨兵。

use logos::Logos;
use std::collections::VecDeque;
use std::fmt;
use crate::error::SourceLocation;

fn type_name(lex: &mut logos::Lexer<Token>) -> String {
    lex.slice().to_string()
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // 关键字
    #[token("let")]
    Let,
    #[token("fn")]
    Fn,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("while")]
    While,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("for")]
    For,
    #[token("import")]
    Import,
    #[token("from")]
    From,
    #[token("export")]
    Export,

    // 类型关键字
    #[token("int", type_name)]
    #[token("float", type_name)]
    #[token("bool", type_name)]
    #[token("str", type_name)]
    #[token("void", type_name)]
    #[token("dict", type_name)]
    #[token("arr_int", type_name)]
    #[token("arr_float", type_name)]
    #[token("arr_bool", type_name)]
    #[token("arr_str", type_name)]
    Type(String),

    // 标识符
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    // 字面量（溢出时为 None，由语法分析器报告）
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    IntegerLiteral(Option<i64>),

    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    FloatLiteral(Option<f64>),

    // 原样保留转义序列，代码生成阶段再反转义
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| {
        let s = lex.slice();
        s[1..s.len()-1].to_string()
    })]
    StringLiteral(String),

    // 运算符
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,

    // 赋值运算符
    #[token("=")]
    Assign,
    #[token("+=")]
    AddAssign,
    #[token("-=")]
    SubAssign,
    #[token("*=")]
    MulAssign,
    #[token("/=")]
    DivAssign,

    // 自增自减
    #[token("++")]
    Inc,
    #[token("--")]
    Dec,

    // 分隔符
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,

    // 换行（用于跟踪行号）
    #[regex(r"\r?\n")]
    Newline,

    /// 无法识别的字符，由语法分析器报告
    Illegal(String),

    /// 输入结束哨兵
    Eof,
}

impl Token {
    pub fn is_assignment_op(&self) -> bool {
        matches!(
            self,
            Token::Assign | Token::AddAssign | Token::SubAssign | Token::MulAssign | Token::DivAssign
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Let => "let",
            Token::Fn => "fn",
            Token::Return => "return",
            Token::If => "if",
            Token::Else => "else",
            Token::True => "true",
            Token::False => "false",
            Token::While => "while",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::For => "for",
            Token::Import => "import",
            Token::From => "from",
            Token::Export => "export",
            Token::Type(name) => return write!(f, "type '{}'", name),
            Token::Identifier(name) => return write!(f, "identifier '{}'", name),
            Token::IntegerLiteral(Some(v)) => return write!(f, "integer {}", v),
            Token::IntegerLiteral(None) => "integer literal",
            Token::FloatLiteral(Some(v)) => return write!(f, "float {}", v),
            Token::FloatLiteral(None) => "float literal",
            Token::StringLiteral(s) => return write!(f, "string \"{}\"", s),
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Caret => "^",
            Token::Bang => "!",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::Assign => "=",
            Token::AddAssign => "+=",
            Token::SubAssign => "-=",
            Token::MulAssign => "*=",
            Token::DivAssign => "/=",
            Token::Inc => "++",
            Token::Dec => "--",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Semicolon => ";",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Newline => "newline",
            Token::Illegal(s) => return write!(f, "illegal character '{}'", s),
            Token::Eof => "end of file",
        };
        write!(f, "'{}'", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenWithLocation {
    pub token: Token,
    pub loc: SourceLocation,
    /// 令牌在源文件中的字节偏移
    pub offset: usize,
}

/// 按需产生令牌的来源，结束后持续返回 `Token::Eof`
pub trait TokenSource {
    fn next_token(&mut self) -> TokenWithLocation;
}

pub struct Lexer<'a> {
    source: &'a str,
    inner: logos::Lexer<'a, Token>,
    line: usize,
    line_start: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            inner: Token::lexer(source),
            line: 1,
            line_start: 0,
        }
    }

    fn location_of(&self, offset: usize) -> SourceLocation {
        SourceLocation::new(self.line, offset - self.line_start + 1)
    }

    /// 一次性读完全部令牌（包含末尾的 Eof）
    pub fn tokenize(&mut self) -> Vec<TokenWithLocation> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token();
            let done = t.token == Token::Eof;
            tokens.push(t);
            if done {
                return tokens;
            }
        }
    }
}

impl TokenSource for Lexer<'_> {
    fn next_token(&mut self) -> TokenWithLocation {
        while let Some(token_result) = self.inner.next() {
            let span = self.inner.span();
            let loc = self.location_of(span.start);
            let token = match token_result {
                Ok(Token::Newline) => {
                    self.line += 1;
                    self.line_start = span.end;
                    continue;
                }
                Ok(token) => token,
                Err(_) => Token::Illegal(self.source[span.clone()].to_string()),
            };
            return TokenWithLocation { token, loc, offset: span.start };
        }

        let end = self.source.len();
        TokenWithLocation {
            token: Token::Eof,
            loc: self.location_of(end),
            offset: end,
        }
    }
}

/// 预先构造好的令牌序列
pub struct VecTokenSource {
    tokens: VecDeque<TokenWithLocation>,
    last: SourceLocation,
}

impl VecTokenSource {
    pub fn new(tokens: Vec<TokenWithLocation>) -> Self {
        let last = tokens.last().map(|t| t.loc).unwrap_or_default();
        Self { tokens: tokens.into(), last }
    }
}

impl TokenSource for VecTokenSource {
    fn next_token(&mut self) -> TokenWithLocation {
        match self.tokens.pop_front() {
            Some(t) => t,
            None => TokenWithLocation {
                token: Token::Eof,
                loc: self.last,
                offset: 0,
            },
        }
    }
}

pub fn lex(source: &str) -> Vec<TokenWithLocation> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_let_statement_tokens() {
        assert_eq!(
            kinds("let x: int = 42;"),
            vec![
                Token::Let,
                Token::Identifier("x".to_string()),
                Token::Colon,
                Token::Type("int".to_string()),
                Token::Assign,
                Token::IntegerLiteral(Some(42)),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_type_keywords_beat_identifiers() {
        assert_eq!(kinds("arr_int")[0], Token::Type("arr_int".to_string()));
        assert_eq!(kinds("integer")[0], Token::Identifier("integer".to_string()));
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            kinds("+= -= *= /= ++ -- == != <= >="),
            vec![
                Token::AddAssign,
                Token::SubAssign,
                Token::MulAssign,
                Token::DivAssign,
                Token::Inc,
                Token::Dec,
                Token::EqEq,
                Token::NotEq,
                Token::Le,
                Token::Ge,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_locations_track_lines_and_columns() {
        let tokens = lex("let a\n  // comment\n   b");
        assert_eq!(tokens[0].loc, SourceLocation::new(1, 1));
        assert_eq!(tokens[1].loc, SourceLocation::new(1, 5));
        assert_eq!(tokens[2].loc, SourceLocation::new(3, 4));
        assert_eq!(tokens[2].offset, 22);
    }

    #[test]
    fn test_string_keeps_escapes_raw() {
        assert_eq!(kinds(r#""a\n\"b""#)[0], Token::StringLiteral(r#"a\n\"b"#.to_string()));
    }

    #[test]
    fn test_illegal_character_is_a_token() {
        assert_eq!(kinds("a $ b")[1], Token::Illegal("$".to_string()));
    }

    #[test]
    fn test_eof_repeats() {
        let mut lexer = Lexer::new("x");
        lexer.next_token();
        assert_eq!(lexer.next_token().token, Token::Eof);
        assert_eq!(lexer.next_token().token, Token::Eof);
    }

    #[test]
    fn test_integer_overflow_yields_none() {
        assert_eq!(kinds("99999999999999999999")[0], Token::IntegerLiteral(None));
    }
}
