//! IR 指令与终结指令

use super::types::{BlockId, IrType, TypedValue, VReg, Value};

#[derive(Debug, Clone)]
pub struct Instruction {
    /// 结果寄存器（无返回值的指令为 None）
    pub result: Option<VReg>,
    pub kind: InstrKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    URem,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl BinOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::SRem => "srem",
            BinOp::URem => "urem",
            BinOp::Xor => "xor",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
            BinOp::FRem => "frem",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// 有符号整数比较谓词
    pub fn int_predicate(&self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "slt",
            CmpOp::Le => "sle",
            CmpOp::Gt => "sgt",
            CmpOp::Ge => "sge",
        }
    }

    /// 有序浮点比较谓词
    pub fn float_predicate(&self) -> &'static str {
        match self {
            CmpOp::Eq => "oeq",
            CmpOp::Ne => "one",
            CmpOp::Lt => "olt",
            CmpOp::Le => "ole",
            CmpOp::Gt => "ogt",
            CmpOp::Ge => "oge",
        }
    }
}

#[derive(Debug, Clone)]
pub enum InstrKind {
    /// 栈上分配；`count` 为元素个数（数组）
    Alloca { ty: IrType, count: Option<u32> },
    Load { ty: IrType, ptr: Value },
    Store { value: TypedValue, ptr: Value },
    Binary { op: BinOp, ty: IrType, lhs: Value, rhs: Value },
    FNeg(Value),
    ICmp { op: CmpOp, ty: IrType, lhs: Value, rhs: Value },
    FCmp { op: CmpOp, lhs: Value, rhs: Value },
    ZExt { value: TypedValue, to: IrType },
    SExt { value: TypedValue, to: IrType },
    /// `getelementptr inbounds elem, ptr base, index`
    Gep { elem: IrType, ptr: Value, index: TypedValue },
    Call {
        ret: IrType,
        callee: String,
        args: Vec<TypedValue>,
        /// 变参函数的固定参数类型
        varargs: Option<Vec<IrType>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Ret(Option<TypedValue>),
    Br(BlockId),
    CondBr {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br(target) => vec![*target],
            Terminator::CondBr { then_block, else_block, .. } => vec![*then_block, *else_block],
            Terminator::Ret(_) | Terminator::Unreachable => Vec::new(),
        }
    }
}
