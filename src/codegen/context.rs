//! 代码生成器的状态与公共辅助方法

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::Program;
use crate::env::Environment;
use crate::error::{semantic_error, SourceLocation, ZynError, ZynResult};
use crate::ir::{BlockId, IrBuilder, Module, TypedValue, Value};
use crate::loader::ModuleLoader;
use crate::types::{FunctionType, Type};

use super::types::ir_type;

/// 表达式求值的结果：IR 值及其表层类型
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub value: Value,
    pub ty: Type,
}

impl Operand {
    pub fn new(value: Value, ty: Type) -> Self {
        Self { value, ty }
    }

    pub fn typed(&self) -> TypedValue {
        TypedValue::new(ir_type(&self.ty), self.value.clone())
    }
}

/// 环境中的名称绑定
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// 变量，`ptr` 指向其存储位置。数组变量的存储位置中保存首元素指针。
    /// `owner` 为定义它的函数编号，全局变量为 None。
    Variable {
        ptr: Value,
        ty: Type,
        owner: Option<usize>,
    },
    /// 内建函数，`symbol` 为 IR 中的函数名
    Builtin {
        symbol: String,
        signature: FunctionType,
    },
}

/// 模块级函数表中的一项
#[derive(Debug, Clone)]
pub(super) struct FunctionSig {
    pub(super) signature: FunctionType,
    pub(super) has_body: bool,
}

/// 正在生成的函数
#[derive(Debug, Clone)]
pub(super) struct FunctionContext {
    pub(super) id: usize,
    pub(super) name: String,
    pub(super) return_type: Type,
}

/// AST 到 IR 的代码生成器
///
/// 语义问题记录为诊断信息并跳过对应节点，继续生成以尽量多地报告问题；
/// 内部不变量被破坏时以 `Err` 中止。
pub struct CodeGenerator {
    pub(super) builder: IrBuilder,
    pub(super) env: Environment<Binding>,
    pub(super) functions: HashMap<String, FunctionSig>,
    pub(super) current_fn: Option<FunctionContext>,
    pub(super) next_fn_id: usize,
    pub(super) break_targets: Vec<BlockId>,
    pub(super) continue_targets: Vec<BlockId>,
    pub(super) errors: Vec<ZynError>,
    pub(super) loader: Option<Box<dyn ModuleLoader>>,
    /// 已解析的模块，按名称缓存
    pub(super) modules: HashMap<String, Rc<Program>>,
    /// 正在拼接的模块栈，用于发现循环导入
    pub(super) loading: Vec<String>,
    pub(super) spliced: HashSet<String>,
    pub(super) imported: HashSet<(String, String)>,
}

impl CodeGenerator {
    pub fn new(module_name: impl Into<String>) -> Self {
        let mut generator = Self {
            builder: IrBuilder::new(module_name),
            env: Environment::new(),
            functions: HashMap::new(),
            current_fn: None,
            next_fn_id: 0,
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            errors: Vec::new(),
            loader: None,
            modules: HashMap::new(),
            loading: Vec::new(),
            spliced: HashSet::new(),
            imported: HashSet::new(),
        };
        generator.declare_builtins();
        generator
    }

    pub fn with_target(mut self, target_triple: impl Into<String>) -> Self {
        self.builder.module_mut().target_triple = Some(target_triple.into());
        self
    }

    /// 设置导入语句使用的模块加载器
    pub fn with_loader(mut self, loader: Box<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// 取回加载器，供下一次编译复用
    pub fn take_loader(&mut self) -> Option<Box<dyn ModuleLoader>> {
        self.loader.take()
    }

    pub fn errors(&self) -> &[ZynError] {
        &self.errors
    }

    /// 取出模块；有任何诊断信息时返回聚合错误
    pub fn into_module(self) -> ZynResult<Module> {
        if !self.errors.is_empty() {
            return Err(ZynError::Diagnostics(self.errors));
        }
        self.builder.finish()
    }

    pub(super) fn report(&mut self, loc: SourceLocation, message: impl Into<String>) {
        self.errors.push(semantic_error(loc, message));
    }

    // ============ 循环 ============

    pub(super) fn enter_loop(&mut self, break_target: BlockId, continue_target: BlockId) {
        self.break_targets.push(break_target);
        self.continue_targets.push(continue_target);
    }

    pub(super) fn exit_loop(&mut self) {
        self.break_targets.pop();
        self.continue_targets.pop();
    }

    // ============ 名称解析 ============

    /// 查找变量，返回其存储位置与类型；失败时记录诊断信息
    pub(super) fn lookup_variable(&mut self, name: &str, loc: SourceLocation) -> Option<(Value, Type)> {
        match self.env.resolve(name).cloned() {
            Some(Binding::Variable { ptr, ty, owner }) => {
                let current = self.current_fn.as_ref().map(|f| f.id);
                if owner.is_some() && owner != current {
                    self.report(loc, format!("Cannot capture '{}' from an enclosing function", name));
                    return None;
                }
                Some((ptr, ty))
            }
            Some(Binding::Builtin { .. }) => {
                self.report(loc, format!("'{}' is a function, not a variable", name));
                None
            }
            None if self.functions.contains_key(name) => {
                self.report(loc, format!("Function '{}' cannot be used as a value", name));
                None
            }
            None => {
                self.report(loc, format!("Undeclared variable '{}'", name));
                None
            }
        }
    }

    /// 当前函数编号，顶层为 None
    pub(super) fn current_owner(&self) -> Option<usize> {
        self.current_fn.as_ref().map(|f| f.id)
    }
}
