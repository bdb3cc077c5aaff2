//! 基本块结构的中间表示
//!
//! 代码生成器通过 `IrBuilder` 构造 `Module`，模块的 `Display`
//! 实现输出文本形式的 LLVM IR，交给外部后端（如 clang）处理。

mod types;
mod instr;
mod builder;
mod printer;

pub use types::{BasicBlock, BlockId, Constant, Function, Global, IrType, Module, TypedValue, VReg, Value};
pub use instr::{BinOp, CmpOp, Instruction, InstrKind, Terminator};
pub use builder::IrBuilder;
