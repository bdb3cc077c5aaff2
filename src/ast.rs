use std::fmt;
use crate::types::Type;
use crate::error::SourceLocation;

/// 语法树节点的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Program,
    LetStatement,
    FunctionStatement,
    BlockStatement,
    ReturnStatement,
    AssignStatement,
    IfStatement,
    WhileStatement,
    ForStatement,
    BreakStatement,
    ContinueStatement,
    ImportStatement,
    ImportFromStatement,
    ExpressionStatement,
    InfixExpression,
    PrefixExpression,
    PostfixExpression,
    CallExpression,
    IndexExpression,
    IntegerLiteral,
    FloatLiteral,
    BooleanLiteral,
    StringLiteral,
    IdentifierLiteral,
    ArrayLiteral,
    HashLiteral,
    FunctionParameter,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
    /// 被 export 标记的顶层语句在 `statements` 中的下标
    pub exports: Vec<usize>,
}

impl Program {
    pub fn node_type(&self) -> NodeType {
        NodeType::Program
    }

    /// 按声明顺序遍历导出的语句
    pub fn exported(&self) -> impl Iterator<Item = &Stmt> {
        self.exports.iter().filter_map(|&i| self.statements.get(i))
    }

    /// 按名称查找导出的声明
    pub fn find_export(&self, name: &str) -> Option<&Stmt> {
        self.exported().find(|s| s.declared_name() == Some(name))
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Let(LetStmt),
    Function(FunctionStmt),
    Block(Block),
    Return(ReturnStmt),
    Assign(AssignStmt),
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    Break(SourceLocation),
    Continue(SourceLocation),
    Import(ImportStmt),
    ImportFrom(ImportFromStmt),
    Expression(Expr),
}

impl Stmt {
    pub fn node_type(&self) -> NodeType {
        match self {
            Stmt::Let(_) => NodeType::LetStatement,
            Stmt::Function(_) => NodeType::FunctionStatement,
            Stmt::Block(_) => NodeType::BlockStatement,
            Stmt::Return(_) => NodeType::ReturnStatement,
            Stmt::Assign(_) => NodeType::AssignStatement,
            Stmt::If(_) => NodeType::IfStatement,
            Stmt::While(_) => NodeType::WhileStatement,
            Stmt::For(_) => NodeType::ForStatement,
            Stmt::Break(_) => NodeType::BreakStatement,
            Stmt::Continue(_) => NodeType::ContinueStatement,
            Stmt::Import(_) => NodeType::ImportStatement,
            Stmt::ImportFrom(_) => NodeType::ImportFromStatement,
            Stmt::Expression(_) => NodeType::ExpressionStatement,
        }
    }

    pub fn loc(&self) -> SourceLocation {
        match self {
            Stmt::Let(s) => s.loc,
            Stmt::Function(s) => s.loc,
            Stmt::Block(s) => s.loc,
            Stmt::Return(s) => s.loc,
            Stmt::Assign(s) => s.loc,
            Stmt::If(s) => s.loc,
            Stmt::While(s) => s.loc,
            Stmt::For(s) => s.loc,
            Stmt::Break(loc) | Stmt::Continue(loc) => *loc,
            Stmt::Import(s) => s.loc,
            Stmt::ImportFrom(s) => s.loc,
            Stmt::Expression(e) => e.loc(),
        }
    }

    /// `let` 和 `fn` 声明的名称
    pub fn declared_name(&self) -> Option<&str> {
        match self {
            Stmt::Let(s) => Some(&s.name),
            Stmt::Function(s) => Some(&s.name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LetStmt {
    pub name: String,
    pub declared_type: Type,
    pub value: Expr,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub param_type: Type,
    pub loc: SourceLocation,
}

impl Param {
    pub fn node_type(&self) -> NodeType {
        NodeType::FunctionParameter
    }
}

#[derive(Debug, Clone)]
pub struct FunctionStmt {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: Block,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    /// 复合赋值对应的算术运算符
    pub fn arithmetic(self) -> Option<InfixOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(InfixOp::Add),
            AssignOp::SubAssign => Some(InfixOp::Sub),
            AssignOp::MulAssign => Some(InfixOp::Mul),
            AssignOp::DivAssign => Some(InfixOp::Div),
        }
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct AssignStmt {
    pub name: String,
    pub op: AssignOp,
    pub value: Expr,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub condition: Expr,
    pub consequence: Block,
    pub alternative: Option<Block>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Block,
    pub loc: SourceLocation,
}

/// `for (let init; condition; action) { body }`
#[derive(Debug, Clone)]
pub struct ForStmt {
    pub init: LetStmt,
    pub condition: Expr,
    /// 赋值语句或表达式语句
    pub action: Box<Stmt>,
    pub body: Block,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct ImportStmt {
    pub module: String,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct ImportFromStmt {
    pub module: String,
    pub names: Vec<String>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Infix(InfixExpr),
    Prefix(PrefixExpr),
    Postfix(PostfixExpr),
    Call(CallExpr),
    Index(IndexExpr),
    Literal(LiteralExpr),
    Identifier(IdentifierExpr),
    Array(ArrayLiteral),
    Hash(HashLiteral),
}

impl Expr {
    pub fn node_type(&self) -> NodeType {
        match self {
            Expr::Infix(_) => NodeType::InfixExpression,
            Expr::Prefix(_) => NodeType::PrefixExpression,
            Expr::Postfix(_) => NodeType::PostfixExpression,
            Expr::Call(_) => NodeType::CallExpression,
            Expr::Index(_) => NodeType::IndexExpression,
            Expr::Literal(lit) => match lit.value {
                LiteralValue::Integer(_) => NodeType::IntegerLiteral,
                LiteralValue::Float(_) => NodeType::FloatLiteral,
                LiteralValue::Boolean(_) => NodeType::BooleanLiteral,
                LiteralValue::String(_) => NodeType::StringLiteral,
            },
            Expr::Identifier(_) => NodeType::IdentifierLiteral,
            Expr::Array(_) => NodeType::ArrayLiteral,
            Expr::Hash(_) => NodeType::HashLiteral,
        }
    }

    pub fn loc(&self) -> SourceLocation {
        match self {
            Expr::Infix(e) => e.loc,
            Expr::Prefix(e) => e.loc,
            Expr::Postfix(e) => e.loc,
            Expr::Call(e) => e.loc,
            Expr::Index(e) => e.loc,
            Expr::Literal(e) => e.loc,
            Expr::Identifier(e) => e.loc,
            Expr::Array(e) => e.loc,
            Expr::Hash(e) => e.loc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl InfixOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            InfixOp::Eq | InfixOp::NotEq | InfixOp::Lt | InfixOp::Le | InfixOp::Gt | InfixOp::Ge
        )
    }
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Mod => "%",
            InfixOp::Pow => "^",
            InfixOp::Eq => "==",
            InfixOp::NotEq => "!=",
            InfixOp::Lt => "<",
            InfixOp::Le => "<=",
            InfixOp::Gt => ">",
            InfixOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone)]
pub struct InfixExpr {
    pub left: Box<Expr>,
    pub op: InfixOp,
    pub right: Box<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct PrefixExpr {
    pub op: PrefixOp,
    pub operand: Box<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct PostfixExpr {
    pub operand: Box<Expr>,
    pub op: PostfixOp,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: Box<Expr>,
    pub args: Vec<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct IndexExpr {
    pub target: Box<Expr>,
    pub index: Box<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

#[derive(Debug, Clone)]
pub struct LiteralExpr {
    pub value: LiteralValue,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct IdentifierExpr {
    pub name: String,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct ArrayLiteral {
    pub elements: Vec<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct HashLiteral {
    pub pairs: Vec<(Expr, Expr)>,
    pub loc: SourceLocation,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOp::Neg => write!(f, "-"),
            PrefixOp::Not => write!(f, "!"),
        }
    }
}

impl fmt::Display for PostfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostfixOp::Inc => write!(f, "++"),
            PostfixOp::Dec => write!(f, "--"),
        }
    }
}

// 完全加括号的形式，便于检查结合性
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Infix(e) => write!(f, "({} {} {})", e.left, e.op, e.right),
            Expr::Prefix(e) => write!(f, "({}{})", e.op, e.operand),
            Expr::Postfix(e) => write!(f, "({}{})", e.operand, e.op),
            Expr::Call(e) => {
                write!(f, "{}(", e.callee)?;
                write_list(f, &e.args)?;
                write!(f, ")")
            }
            Expr::Index(e) => write!(f, "({}[{}])", e.target, e.index),
            Expr::Literal(e) => match &e.value {
                LiteralValue::Integer(v) => write!(f, "{}", v),
                LiteralValue::Float(v) => write!(f, "{:?}", v),
                LiteralValue::Boolean(v) => write!(f, "{}", v),
                LiteralValue::String(s) => write!(f, "\"{}\"", s),
            },
            Expr::Identifier(e) => write!(f, "{}", e.name),
            Expr::Array(e) => {
                write!(f, "[")?;
                write_list(f, &e.elements)?;
                write!(f, "]")
            }
            Expr::Hash(e) => {
                write!(f, "{{")?;
                for (i, (k, v)) in e.pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}
