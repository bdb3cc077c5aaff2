//! 将 IR 模块打印为文本形式的 LLVM IR

use std::fmt::{self, Write};

use super::instr::{InstrKind, Instruction, Terminator};
use super::types::{Constant, Function, Global, IrType, Module};

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        writeln!(f, "source_filename = \"{}\"", self.name)?;
        if let Some(triple) = &self.target_triple {
            writeln!(f, "target triple = \"{}\"", triple)?;
        }
        if let Some(entry) = &self.entry_point {
            writeln!(f, "; entry point: @{}", entry)?;
        }

        if !self.globals.is_empty() {
            writeln!(f)?;
            for global in &self.globals {
                write_global(f, global)?;
            }
        }

        let (externals, definitions): (Vec<&Function>, Vec<&Function>) =
            self.functions.iter().partition(|func| func.is_external);

        if !externals.is_empty() {
            writeln!(f)?;
            for func in externals {
                writeln!(f, "declare {} @{}({})", func.ret_type, func.name, param_types(func))?;
            }
        }

        for func in definitions {
            writeln!(f)?;
            write_function(f, func)?;
        }
        Ok(())
    }
}

fn param_types(func: &Function) -> String {
    let mut parts: Vec<String> = func.params.iter().map(|(_, ty)| ty.to_string()).collect();
    if func.is_vararg {
        parts.push("...".to_string());
    }
    parts.join(", ")
}

fn write_global(f: &mut fmt::Formatter<'_>, global: &Global) -> fmt::Result {
    let kind = if global.is_const { "constant" } else { "global" };
    match &global.init {
        Constant::Bytes(bytes) => writeln!(
            f,
            "@{} = private unnamed_addr constant [{} x i8] c\"{}\", align 1",
            global.name,
            bytes.len(),
            escape_bytes(bytes)
        ),
        Constant::Int(ty, v) => writeln!(f, "@{} = {} {} {}", global.name, kind, ty, v),
        Constant::Float(v) => writeln!(f, "@{} = {} double 0x{:016X}", global.name, kind, v.to_bits()),
        Constant::Ref(target) => writeln!(f, "@{} = {} ptr @{}", global.name, kind, target),
        Constant::Null => writeln!(f, "@{} = {} ptr null", global.name, kind),
    }
}

/// 可打印字符原样输出，其余字节输出为 `\XX`
fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (0x20..0x7f).contains(&b) && b != b'"' && b != b'\\' {
            out.push(b as char);
        } else {
            let _ = write!(out, "\\{:02X}", b);
        }
    }
    out
}

fn write_function(f: &mut fmt::Formatter<'_>, func: &Function) -> fmt::Result {
    let params: Vec<String> = func
        .params
        .iter()
        .map(|(reg, ty)| format!("{} {}", ty, reg))
        .collect();
    writeln!(f, "define {} @{}({}) {{", func.ret_type, func.name, params.join(", "))?;

    for (i, block) in func.blocks.iter().enumerate() {
        if i > 0 {
            writeln!(f)?;
        }
        writeln!(f, "{}:", block.label)?;
        for instr in &block.instructions {
            writeln!(f, "  {}", render_instruction(instr))?;
        }
        match &block.terminator {
            Some(term) => writeln!(f, "  {}", render_terminator(func, term))?,
            None => writeln!(f, "  ; <missing terminator>")?,
        }
    }

    writeln!(f, "}}")
}

fn render_instruction(instr: &Instruction) -> String {
    let body = match &instr.kind {
        InstrKind::Alloca { ty, count: None } => format!("alloca {}", ty),
        InstrKind::Alloca { ty, count: Some(n) } => format!("alloca {}, i32 {}", ty, n),
        InstrKind::Load { ty, ptr } => format!("load {}, ptr {}", ty, ptr),
        InstrKind::Store { value, ptr } => format!("store {}, ptr {}", value, ptr),
        InstrKind::Binary { op, ty, lhs, rhs } => format!("{} {} {}, {}", op.mnemonic(), ty, lhs, rhs),
        InstrKind::FNeg(v) => format!("fneg double {}", v),
        InstrKind::ICmp { op, ty, lhs, rhs } => format!("icmp {} {} {}, {}", op.int_predicate(), ty, lhs, rhs),
        InstrKind::FCmp { op, lhs, rhs } => format!("fcmp {} double {}, {}", op.float_predicate(), lhs, rhs),
        InstrKind::ZExt { value, to } => format!("zext {} to {}", value, to),
        InstrKind::SExt { value, to } => format!("sext {} to {}", value, to),
        InstrKind::Gep { elem, ptr, index } => format!("getelementptr inbounds {}, ptr {}, {}", elem, ptr, index),
        InstrKind::Call { ret, callee, args, varargs } => {
            let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            let signature = match varargs {
                Some(fixed) => {
                    let mut parts: Vec<String> = fixed.iter().map(IrType::to_string).collect();
                    parts.push("...".to_string());
                    format!("{} ({})", ret, parts.join(", "))
                }
                None => ret.to_string(),
            };
            format!("call {} @{}({})", signature, callee, args.join(", "))
        }
    };

    match instr.result {
        Some(reg) => format!("{} = {}", reg, body),
        None => body,
    }
}

fn render_terminator(func: &Function, term: &Terminator) -> String {
    let label = |id| {
        func.block(id)
            .map(|b| b.label.clone())
            .unwrap_or_else(|| "<unknown>".to_string())
    };
    match term {
        Terminator::Ret(None) => "ret void".to_string(),
        Terminator::Ret(Some(v)) => format!("ret {}", v),
        Terminator::Br(target) => format!("br label %{}", label(*target)),
        Terminator::CondBr { cond, then_block, else_block } => format!(
            "br i1 {}, label %{}, label %{}",
            cond,
            label(*then_block),
            label(*else_block)
        ),
        Terminator::Unreachable => "unreachable".to_string(),
    }
}
