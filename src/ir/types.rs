//! IR 类型与数据结构

use std::collections::HashSet;
use std::fmt;

use super::instr::{Instruction, Terminator};

/// 函数内的虚拟寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VReg(pub u32);

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%t{}", self.0)
    }
}

/// 函数内基本块的编号（即其在 `Function::blocks` 中的下标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    Void,
    I1,
    I8,
    I32,
    I64,
    Double,
    /// 不透明指针
    Ptr,
}

impl IrType {
    /// 字节大小（64 位目标）
    pub fn size(&self) -> u32 {
        match self {
            IrType::Void => 0,
            IrType::I1 | IrType::I8 => 1,
            IrType::I32 => 4,
            IrType::I64 | IrType::Double | IrType::Ptr => 8,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IrType::Void => "void",
            IrType::I1 => "i1",
            IrType::I8 => "i8",
            IrType::I32 => "i32",
            IrType::I64 => "i64",
            IrType::Double => "double",
            IrType::Ptr => "ptr",
        };
        write!(f, "{}", s)
    }
}

/// 指令操作数
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Reg(VReg),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    Global(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Reg(r) => write!(f, "{}", r),
            Value::Int(v) => write!(f, "{}", v),
            // 十六进制形式保证精确
            Value::Float(v) => write!(f, "0x{:016X}", v.to_bits()),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Null => write!(f, "null"),
            Value::Global(name) => write!(f, "@{}", name),
        }
    }
}

/// 带类型的操作数，打印为 `i32 %t1`
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub ty: IrType,
    pub value: Value,
}

impl TypedValue {
    pub fn new(ty: IrType, value: Value) -> Self {
        Self { ty, value }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.value)
    }
}

/// 一个 IR 模块
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub target_triple: Option<String>,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    /// 名为 main 的函数
    pub entry_point: Option<String>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_triple: None,
            functions: Vec::new(),
            globals: Vec::new(),
            entry_point: None,
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<(VReg, IrType)>,
    pub ret_type: IrType,
    pub blocks: Vec<BasicBlock>,
    pub is_external: bool,
    pub is_vararg: bool,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<(VReg, IrType)>, ret_type: IrType) -> Self {
        Self {
            name: name.into(),
            params,
            ret_type,
            blocks: Vec::new(),
            is_external: false,
            is_vararg: false,
        }
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0 as usize)
    }

    /// 从入口块出发可到达的块
    pub fn reachable_blocks(&self) -> HashSet<BlockId> {
        let mut seen = HashSet::new();
        let mut stack = Vec::new();
        if !self.blocks.is_empty() {
            stack.push(BlockId(0));
        }
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(term) = self.block(id).and_then(|b| b.terminator.as_ref()) {
                stack.extend(term.successors());
            }
        }
        seen
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<Instruction>,
    /// `Some` 即该块已有终结指令
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn new(id: BlockId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            instructions: Vec::new(),
            terminator: None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }
}

/// 全局变量或常量
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub init: Constant,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(IrType, i64),
    Float(f64),
    /// 以 NUL 结尾的字节串
    Bytes(Vec<u8>),
    /// 指向另一个全局量的指针
    Ref(String),
    Null,
}
