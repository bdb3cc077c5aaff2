//! IR 构建器
//!
//! 维护正在构建的函数栈（支持在函数体内定义嵌套函数）、
//! 当前插入块以及模块级的字符串常量池。

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ZynError, ZynResult};
use super::instr::{BinOp, CmpOp, Instruction, InstrKind, Terminator};
use super::types::{BasicBlock, BlockId, Constant, Function, Global, IrType, Module, TypedValue, VReg, Value};

/// 一个正在构建中的函数
struct FunctionState {
    func: Function,
    current: BlockId,
    next_vreg: u32,
    /// 入口块开头已放置的 alloca 数量
    alloca_count: usize,
}

pub struct IrBuilder {
    module: Module,
    frames: Vec<FunctionState>,
    label_counter: u32,
    string_pool: HashMap<String, String>,
}

impl IrBuilder {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module: Module::new(module_name),
            frames: Vec::new(),
            label_counter: 0,
            string_pool: HashMap::new(),
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    /// 结束构建，返回模块
    pub fn finish(mut self) -> ZynResult<Module> {
        if !self.frames.is_empty() {
            return Err(ZynError::Internal(format!(
                "{} function(s) still under construction",
                self.frames.len()
            )));
        }
        self.module.functions.sort_by_key(|f| !f.is_external);
        Ok(self.module)
    }

    // ============ 函数 ============

    /// 开始构建新函数，并定位到其入口块；之前的函数被挂起
    pub fn start_function(&mut self, name: impl Into<String>, params: Vec<IrType>, ret_type: IrType) -> Vec<VReg> {
        let mut next_vreg = 0;
        let params: Vec<(VReg, IrType)> = params
            .into_iter()
            .map(|ty| {
                let reg = VReg(next_vreg);
                next_vreg += 1;
                (reg, ty)
            })
            .collect();
        let regs = params.iter().map(|(r, _)| *r).collect();

        let mut func = Function::new(name, params, ret_type);
        func.blocks.push(BasicBlock::new(BlockId(0), "entry"));

        self.frames.push(FunctionState {
            func,
            current: BlockId(0),
            next_vreg,
            alloca_count: 0,
        });
        regs
    }

    /// 封闭当前函数的所有未终结块，加入模块，并恢复被挂起的函数
    pub fn finish_function(&mut self) -> ZynResult<()> {
        let mut state = self
            .frames
            .pop()
            .ok_or_else(|| ZynError::Internal("finish_function without a function".to_string()))?;

        let seal = if state.func.ret_type == IrType::Void {
            Terminator::Ret(None)
        } else {
            Terminator::Unreachable
        };
        let mut sealed = 0;
        for block in state.func.blocks.iter_mut() {
            if block.terminator.is_none() {
                block.terminator = Some(seal.clone());
                sealed += 1;
            }
        }
        debug!(function = %state.func.name, blocks = state.func.blocks.len(), sealed, "finished function");

        self.module.functions.push(state.func);
        Ok(())
    }

    pub fn current_function(&self) -> Option<&Function> {
        self.frames.last().map(|s| &s.func)
    }

    /// 当前函数中可到达但没有终结指令的块的标签
    pub fn open_reachable_blocks(&self) -> Vec<String> {
        let Some(func) = self.current_function() else {
            return Vec::new();
        };
        let reachable = func.reachable_blocks();
        func.blocks
            .iter()
            .filter(|b| b.terminator.is_none() && reachable.contains(&b.id))
            .map(|b| b.label.clone())
            .collect()
    }

    /// 模块中是否已有同名函数（定义或声明）
    pub fn has_function(&self, name: &str) -> bool {
        self.module.function(name).is_some() || self.frames.iter().any(|s| s.func.name == name)
    }

    /// 声明外部函数，重复声明会被忽略
    pub fn declare_external(&mut self, name: &str, params: Vec<IrType>, ret_type: IrType, is_vararg: bool) {
        if self.has_function(name) {
            return;
        }
        let params = params.into_iter().map(|ty| (VReg(0), ty)).collect();
        let mut func = Function::new(name, params, ret_type);
        func.is_external = true;
        func.is_vararg = is_vararg;
        self.module.functions.push(func);
    }

    // ============ 全局量 ============

    /// 获取或创建字符串常量，返回其全局指针
    pub fn global_string(&mut self, contents: &str) -> Value {
        if let Some(name) = self.string_pool.get(contents) {
            return Value::Global(name.clone());
        }
        let name = format!(".str.{}", self.string_pool.len());
        let mut bytes = contents.as_bytes().to_vec();
        bytes.push(0);
        self.module.globals.push(Global {
            name: name.clone(),
            init: Constant::Bytes(bytes),
            is_const: true,
        });
        self.string_pool.insert(contents.to_string(), name.clone());
        Value::Global(name)
    }

    pub fn add_global(&mut self, name: impl Into<String>, init: Constant, is_const: bool) -> Value {
        let name = name.into();
        self.module.globals.push(Global {
            name: name.clone(),
            init,
            is_const,
        });
        Value::Global(name)
    }

    // ============ 基本块 ============

    /// 生成唯一标签 `{prefix}.{n}`
    pub fn new_label(&mut self, prefix: &str) -> String {
        let label = format!("{}.{}", prefix, self.label_counter);
        self.label_counter += 1;
        label
    }

    /// 在当前函数末尾追加新块（不改变插入位置）
    pub fn append_block(&mut self, prefix: &str) -> ZynResult<BlockId> {
        let label = self.new_label(prefix);
        let state = self.frame_mut()?;
        let id = BlockId(state.func.blocks.len() as u32);
        state.func.blocks.push(BasicBlock::new(id, label));
        Ok(id)
    }

    pub fn position_at_end(&mut self, block: BlockId) -> ZynResult<()> {
        let state = self.frame_mut()?;
        if state.func.block(block).is_none() {
            return Err(ZynError::Internal(format!("unknown block {:?}", block)));
        }
        state.current = block;
        Ok(())
    }

    /// 当前插入块是否已经终结
    pub fn has_terminator(&self) -> bool {
        self.frames
            .last()
            .and_then(|s| s.func.block(s.current))
            .map(|b| b.is_terminated())
            .unwrap_or(false)
    }

    /// 若当前块已终结，则转到一个新的不可达块，保证每块只有一条终结指令
    fn ensure_open(&mut self) -> ZynResult<()> {
        if self.has_terminator() {
            let dead = self.append_block("dead")?;
            self.position_at_end(dead)?;
        }
        Ok(())
    }

    fn frame_mut(&mut self) -> ZynResult<&mut FunctionState> {
        self.frames
            .last_mut()
            .ok_or_else(|| ZynError::Internal("no function is being built".to_string()))
    }

    fn current_block_mut(&mut self) -> ZynResult<&mut BasicBlock> {
        let state = self.frame_mut()?;
        let index = state.current.0 as usize;
        state
            .func
            .blocks
            .get_mut(index)
            .ok_or_else(|| ZynError::Internal("insertion block vanished".to_string()))
    }

    // ============ 指令 ============

    fn fresh_vreg(&mut self) -> ZynResult<VReg> {
        let state = self.frame_mut()?;
        let reg = VReg(state.next_vreg);
        state.next_vreg += 1;
        Ok(reg)
    }

    fn emit(&mut self, kind: InstrKind, has_result: bool) -> ZynResult<Option<VReg>> {
        self.ensure_open()?;
        let result = if has_result { Some(self.fresh_vreg()?) } else { None };
        self.current_block_mut()?.instructions.push(Instruction { result, kind });
        Ok(result)
    }

    fn emit_value(&mut self, kind: InstrKind) -> ZynResult<Value> {
        match self.emit(kind, true)? {
            Some(reg) => Ok(Value::Reg(reg)),
            None => Err(ZynError::Internal("instruction produced no value".to_string())),
        }
    }

    /// 在入口块开头分配栈空间，避免循环中重复分配
    pub fn build_alloca(&mut self, ty: IrType, count: Option<u32>) -> ZynResult<Value> {
        let reg = self.fresh_vreg()?;
        let state = self.frame_mut()?;
        let at = state.alloca_count;
        let entry = state
            .func
            .blocks
            .first_mut()
            .ok_or_else(|| ZynError::Internal("function has no entry block".to_string()))?;
        entry.instructions.insert(at, Instruction {
            result: Some(reg),
            kind: InstrKind::Alloca { ty, count },
        });
        state.alloca_count += 1;
        Ok(Value::Reg(reg))
    }

    pub fn build_load(&mut self, ty: IrType, ptr: Value) -> ZynResult<Value> {
        self.emit_value(InstrKind::Load { ty, ptr })
    }

    pub fn build_store(&mut self, value: TypedValue, ptr: Value) -> ZynResult<()> {
        self.emit(InstrKind::Store { value, ptr }, false)?;
        Ok(())
    }

    pub fn build_binary(&mut self, op: BinOp, ty: IrType, lhs: Value, rhs: Value) -> ZynResult<Value> {
        self.emit_value(InstrKind::Binary { op, ty, lhs, rhs })
    }

    pub fn build_fneg(&mut self, value: Value) -> ZynResult<Value> {
        self.emit_value(InstrKind::FNeg(value))
    }

    pub fn build_icmp(&mut self, op: CmpOp, ty: IrType, lhs: Value, rhs: Value) -> ZynResult<Value> {
        self.emit_value(InstrKind::ICmp { op, ty, lhs, rhs })
    }

    pub fn build_fcmp(&mut self, op: CmpOp, lhs: Value, rhs: Value) -> ZynResult<Value> {
        self.emit_value(InstrKind::FCmp { op, lhs, rhs })
    }

    pub fn build_zext(&mut self, value: TypedValue, to: IrType) -> ZynResult<Value> {
        self.emit_value(InstrKind::ZExt { value, to })
    }

    pub fn build_sext(&mut self, value: TypedValue, to: IrType) -> ZynResult<Value> {
        self.emit_value(InstrKind::SExt { value, to })
    }

    pub fn build_gep(&mut self, elem: IrType, ptr: Value, index: TypedValue) -> ZynResult<Value> {
        self.emit_value(InstrKind::Gep { elem, ptr, index })
    }

    /// 调用函数；返回 void 的调用没有结果值
    pub fn build_call(
        &mut self,
        ret: IrType,
        callee: &str,
        args: Vec<TypedValue>,
        varargs: Option<Vec<IrType>>,
    ) -> ZynResult<Option<Value>> {
        let has_result = ret != IrType::Void;
        let kind = InstrKind::Call {
            ret,
            callee: callee.to_string(),
            args,
            varargs,
        };
        Ok(self.emit(kind, has_result)?.map(Value::Reg))
    }

    // ============ 终结指令 ============

    fn terminate(&mut self, term: Terminator) -> ZynResult<()> {
        self.ensure_open()?;
        self.current_block_mut()?.terminator = Some(term);
        Ok(())
    }

    pub fn build_ret(&mut self, value: Option<TypedValue>) -> ZynResult<()> {
        self.terminate(Terminator::Ret(value))
    }

    pub fn build_br(&mut self, target: BlockId) -> ZynResult<()> {
        self.terminate(Terminator::Br(target))
    }

    pub fn build_cond_br(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) -> ZynResult<()> {
        self.terminate(Terminator::CondBr { cond, then_block, else_block })
    }

    pub fn build_unreachable(&mut self) -> ZynResult<()> {
        self.terminate(Terminator::Unreachable)
    }

    /// 仅当当前块尚未终结时跳转到 `target`
    pub fn build_fallthrough(&mut self, target: BlockId) -> ZynResult<()> {
        if !self.has_terminator() {
            self.build_br(target)?;
        }
        Ok(())
    }
}
