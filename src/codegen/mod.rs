//! ZynLang 代码生成器
//!
//! 将 AST 降低为基本块形式的 IR 模块。实现按关注点拆分为多个子模块，
//! 各子模块都为 `CodeGenerator` 增加方法。

pub mod context;
mod types;
mod expressions;
mod statements;
mod runtime;
mod generator;

pub use context::{Binding, CodeGenerator, Operand};
pub use runtime::internal_hash;
pub use types::ir_type;
