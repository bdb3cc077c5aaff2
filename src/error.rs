use thiserror::Error;
use std::fmt;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ZynError {
    #[error("Lexer error at line {line}, column {column}: {message}")]
    Lexer { line: usize, column: usize, message: String },

    #[error("Parser error at line {line}, column {column}: {message}")]
    Parser { line: usize, column: usize, message: String },

    #[error("Semantic error at line {line}, column {column}: {message}")]
    Semantic { line: usize, column: usize, message: String },

    #[error("Code generation error at line {line}, column {column}: {message}")]
    CodeGen { line: usize, column: usize, message: String },

    #[error("Module error: {0}")]
    Module(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal compiler error: {0}")]
    Internal(String),

    #[error("{} error(s):\n{}", .0.len(), render_all(.0))]
    Diagnostics(Vec<ZynError>),
}

fn render_all(errors: &[ZynError]) -> String {
    errors
        .iter()
        .map(|e| format!("  {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

impl ZynError {
    /// 返回错误所在位置（聚合错误和无位置错误返回 None）
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            ZynError::Lexer { line, column, .. }
            | ZynError::Parser { line, column, .. }
            | ZynError::Semantic { line, column, .. }
            | ZynError::CodeGen { line, column, .. } => Some(SourceLocation {
                line: *line,
                column: *column,
            }),
            _ => None,
        }
    }

    /// 返回错误消息本体
    pub fn message(&self) -> String {
        match self {
            ZynError::Lexer { message, .. }
            | ZynError::Parser { message, .. }
            | ZynError::Semantic { message, .. }
            | ZynError::CodeGen { message, .. } => message.clone(),
            ZynError::Module(m) | ZynError::Io(m) | ZynError::Internal(m) => m.clone(),
            ZynError::Diagnostics(errors) => render_all(errors),
        }
    }

    /// 展开聚合错误
    pub fn flatten(self) -> Vec<ZynError> {
        match self {
            ZynError::Diagnostics(errors) => errors.into_iter().flat_map(|e| e.flatten()).collect(),
            other => vec![other],
        }
    }
}

pub type ZynResult<T> = Result<T, ZynError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

pub fn lexer_error(loc: SourceLocation, message: impl Into<String>) -> ZynError {
    ZynError::Lexer {
        line: loc.line,
        column: loc.column,
        message: message.into(),
    }
}

pub fn parser_error(loc: SourceLocation, message: impl Into<String>) -> ZynError {
    ZynError::Parser {
        line: loc.line,
        column: loc.column,
        message: message.into(),
    }
}

pub fn semantic_error(loc: SourceLocation, message: impl Into<String>) -> ZynError {
    ZynError::Semantic {
        line: loc.line,
        column: loc.column,
        message: message.into(),
    }
}

pub fn codegen_error(loc: SourceLocation, message: impl Into<String>) -> ZynError {
    ZynError::CodeGen {
        line: loc.line,
        column: loc.column,
        message: message.into(),
    }
}
