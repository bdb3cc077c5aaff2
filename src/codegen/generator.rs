//! 代码生成主入口
//!
//! 处理顶层语句：函数定义、模块级全局变量以及两种导入语句。

use std::rc::Rc;

use tracing::{debug, info};

use crate::ast::{Expr, FunctionStmt, ImportFromStmt, ImportStmt, LetStmt, LiteralValue, PrefixOp, Program, Stmt};
use crate::error::{codegen_error, SourceLocation, ZynError, ZynResult};
use crate::ir::{Constant, IrType, TypedValue, Value};
use crate::types::{FunctionType, Type};

use super::context::{Binding, CodeGenerator, FunctionContext, FunctionSig};
use super::expressions::unescape;
use super::runtime::RESERVED_SYMBOLS;
use super::types::ir_type;

/// 模块级全局变量在 IR 中的符号名
fn global_symbol(name: &str) -> String {
    format!("g.{}", name)
}

fn signature_of(func: &FunctionStmt) -> FunctionType {
    FunctionType {
        params: func.params.iter().map(|p| p.param_type.clone()).collect(),
        return_type: func.return_type.clone(),
        variadic: false,
    }
}

impl CodeGenerator {
    /// 生成整个程序
    ///
    /// 语义问题记录在 `errors()` 中，函数重定义等硬错误以 `Err` 返回。
    pub fn generate(&mut self, program: &Program) -> ZynResult<()> {
        info!(statements = program.statements.len(), "generating module");
        let items: Vec<&Stmt> = program.statements.iter().collect();
        self.generate_items(&items)?;
        debug!(diagnostics = self.errors.len(), "generation finished");
        Ok(())
    }

    /// 将模块名压入加载栈，使导入自身被识别为循环导入
    pub fn with_root_module(mut self, name: impl Into<String>) -> Self {
        self.loading.push(name.into());
        self
    }

    /// 先登记所有函数签名以支持前向调用，再按顺序生成
    fn generate_items(&mut self, statements: &[&Stmt]) -> ZynResult<()> {
        for stmt in statements {
            if let Stmt::Function(func) = stmt {
                self.predeclare_function(func)?;
            }
        }
        for stmt in statements {
            self.generate_top_level(stmt)?;
        }
        Ok(())
    }

    fn generate_top_level(&mut self, stmt: &Stmt) -> ZynResult<()> {
        match stmt {
            Stmt::Function(func) => self.generate_function(func),
            Stmt::Let(stmt) => {
                self.generate_global(stmt);
                Ok(())
            }
            Stmt::Import(import) => self.generate_import(import),
            Stmt::ImportFrom(import) => self.generate_import_from(import),
            other => {
                self.report(
                    other.loc(),
                    format!("{:?} is not allowed at the top level", other.node_type()),
                );
                Ok(())
            }
        }
    }

    // ============ 函数 ============

    fn predeclare_function(&mut self, func: &FunctionStmt) -> ZynResult<()> {
        if self.is_reserved(&func.name) {
            return Ok(());
        }
        match self.functions.get(&func.name) {
            Some(existing) => check_arity(func, existing),
            None => {
                self.functions.insert(
                    func.name.clone(),
                    FunctionSig {
                        signature: signature_of(func),
                        has_body: false,
                    },
                );
                Ok(())
            }
        }
    }

    /// 运行时符号与内建函数名不能被用户函数使用
    fn is_reserved(&self, name: &str) -> bool {
        RESERVED_SYMBOLS.contains(&name) || matches!(self.env.resolve(name), Some(Binding::Builtin { .. }))
    }

    pub(super) fn generate_function(&mut self, func: &FunctionStmt) -> ZynResult<()> {
        if self.is_reserved(&func.name) {
            self.report(func.loc, format!("'{}' is a reserved function name", func.name));
            return Ok(());
        }
        if let Some(existing) = self.functions.get(&func.name) {
            if existing.has_body {
                return Err(codegen_error(
                    func.loc,
                    format!("Function '{}' is already defined", func.name),
                ));
            }
            check_arity(func, existing)?;
        }
        self.functions.insert(
            func.name.clone(),
            FunctionSig {
                signature: signature_of(func),
                has_body: true,
            },
        );

        let mut valid = true;
        if func.return_type.is_array() {
            self.report(func.loc, format!("Function '{}' cannot return an array", func.name));
            valid = false;
        }
        for param in &func.params {
            if param.param_type == Type::Void {
                self.report(param.loc, format!("Parameter '{}' cannot have type void", param.name));
                valid = false;
            }
        }
        if !valid {
            return Ok(());
        }

        debug!(function = %func.name, params = func.params.len(), "lowering function");
        let param_types = func.params.iter().map(|p| ir_type(&p.param_type)).collect();
        let regs = self
            .builder
            .start_function(func.name.as_str(), param_types, ir_type(&func.return_type));

        let id = self.next_fn_id;
        self.next_fn_id += 1;
        let outer_fn = self.current_fn.replace(FunctionContext {
            id,
            name: func.name.clone(),
            return_type: func.return_type.clone(),
        });
        // 循环目标不跨越函数边界
        let outer_breaks = std::mem::take(&mut self.break_targets);
        let outer_continues = std::mem::take(&mut self.continue_targets);
        self.env.push_scope();

        for (param, reg) in func.params.iter().zip(regs) {
            let ty = ir_type(&param.param_type);
            let slot = self.builder.build_alloca(ty, None)?;
            self.builder
                .build_store(TypedValue::new(ty, Value::Reg(reg)), slot.clone())?;
            let binding = Binding::Variable {
                ptr: slot,
                ty: param.param_type.clone(),
                owner: Some(id),
            };
            if self.env.define(param.name.as_str(), binding).is_some() {
                self.report(param.loc, format!("Duplicate parameter '{}'", param.name));
            }
        }

        self.generate_statements(&func.body.statements)?;

        if func.return_type != Type::Void && !self.builder.open_reachable_blocks().is_empty() {
            self.report(
                func.loc,
                format!(
                    "Function '{}' can reach its end without returning a value of type {}",
                    func.name, func.return_type
                ),
            );
        }

        self.env.pop_scope();
        self.builder.finish_function()?;
        self.break_targets = outer_breaks;
        self.continue_targets = outer_continues;
        let finished = self.current_fn.take().map(|f| f.name);
        self.current_fn = outer_fn;

        if finished.as_deref() == Some("main") {
            self.builder.module_mut().entry_point = Some("main".to_string());
        }
        Ok(())
    }

    // ============ 全局变量 ============

    fn generate_global(&mut self, stmt: &LetStmt) {
        let existing = self.env.resolve_local(&stmt.name).cloned();
        if let Some(Binding::Builtin { .. }) = existing {
            self.report(stmt.loc, format!("Cannot redefine builtin '{}'", stmt.name));
            return;
        }
        let Some((init, ty)) = self.constant_initializer(&stmt.value) else {
            self.report(
                stmt.value.loc(),
                format!("Top-level 'let {}' requires a literal initializer", stmt.name),
            );
            return;
        };
        if ty != stmt.declared_type {
            self.report(
                stmt.value.loc(),
                format!(
                    "Cannot initialize '{}' of type {} with a value of type {}",
                    stmt.name, stmt.declared_type, ty
                ),
            );
            return;
        }

        let symbol = global_symbol(&stmt.name);
        if let Some(Binding::Variable { ty: previous, .. }) = existing {
            // 重复声明只替换初始值
            if previous != ty {
                self.report(
                    stmt.loc,
                    format!("Cannot redeclare '{}' of type {} as {}", stmt.name, previous, ty),
                );
                return;
            }
            if let Some(global) = self
                .builder
                .module_mut()
                .globals
                .iter_mut()
                .find(|g| g.name == symbol)
            {
                global.init = init;
            }
            return;
        }

        debug!(global = %stmt.name, ty = %ty, "defining global");
        let ptr = self.builder.add_global(symbol, init, false);
        self.env.define(
            stmt.name.as_str(),
            Binding::Variable { ptr, ty, owner: None },
        );
    }

    /// 字面量（及取负的数值字面量）形式的初始值
    fn constant_initializer(&mut self, expr: &Expr) -> Option<(Constant, Type)> {
        match expr {
            Expr::Literal(lit) => match &lit.value {
                LiteralValue::Integer(v) => {
                    self.check_int_range(*v, lit.loc);
                    Some((Constant::Int(IrType::I32, *v), Type::Int))
                }
                LiteralValue::Float(v) => Some((Constant::Float(*v), Type::Float)),
                LiteralValue::Boolean(b) => Some((Constant::Int(IrType::I1, *b as i64), Type::Bool)),
                LiteralValue::String(raw) => match self.builder.global_string(&unescape(raw)) {
                    Value::Global(name) => Some((Constant::Ref(name), Type::Str)),
                    _ => None,
                },
            },
            Expr::Prefix(prefix) if prefix.op == PrefixOp::Neg => match prefix.operand.as_ref() {
                Expr::Literal(lit) => match &lit.value {
                    LiteralValue::Integer(v) => {
                        self.check_int_range(-*v, prefix.loc);
                        Some((Constant::Int(IrType::I32, -*v), Type::Int))
                    }
                    LiteralValue::Float(v) => Some((Constant::Float(-*v), Type::Float)),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        }
    }

    // ============ 导入 ============

    fn generate_import(&mut self, import: &ImportStmt) -> ZynResult<()> {
        if self.report_circular(&import.module, import.loc) {
            return Ok(());
        }
        if self.spliced.contains(&import.module) {
            debug!(module = %import.module, "module already imported");
            return Ok(());
        }
        let Some(program) = self.load_module(&import.module, import.loc) else {
            return Ok(());
        };

        // 先前 `from` 导入过的声明已经生成
        let fresh: Vec<&Stmt> = program
            .statements
            .iter()
            .filter(|stmt| match stmt.declared_name() {
                Some(name) => !self.imported.contains(&(import.module.clone(), name.to_string())),
                None => true,
            })
            .collect();
        if fresh.len() < program.statements.len() {
            debug!(
                module = %import.module,
                skipped = program.statements.len() - fresh.len(),
                "skipping declarations imported earlier"
            );
        }

        self.spliced.insert(import.module.clone());
        self.loading.push(import.module.clone());
        self.generate_items(&fresh)?;
        self.loading.pop();
        Ok(())
    }

    fn generate_import_from(&mut self, import: &ImportFromStmt) -> ZynResult<()> {
        if self.report_circular(&import.module, import.loc) {
            return Ok(());
        }
        if self.spliced.contains(&import.module) {
            debug!(module = %import.module, "module already spliced, names are in scope");
            return Ok(());
        }
        let Some(program) = self.load_module(&import.module, import.loc) else {
            return Ok(());
        };

        self.loading.push(import.module.clone());
        for name in &import.names {
            let key = (import.module.clone(), name.clone());
            if self.imported.contains(&key) {
                continue;
            }
            match program.find_export(name) {
                Some(stmt) => {
                    self.imported.insert(key);
                    if let Stmt::Function(func) = stmt {
                        self.predeclare_function(func)?;
                    }
                    self.generate_top_level(stmt)?;
                }
                None => self.report(
                    import.loc,
                    format!("Module '{}' does not export '{}'", import.module, name),
                ),
            }
        }
        self.loading.pop();
        Ok(())
    }

    fn report_circular(&mut self, module: &str, loc: SourceLocation) -> bool {
        if !self.loading.iter().any(|m| m == module) {
            return false;
        }
        let mut chain = self.loading.clone();
        chain.push(module.to_string());
        self.report(
            loc,
            format!("Circular import of module '{}' ({})", module, chain.join(" -> ")),
        );
        true
    }

    /// 通过加载器读取并解析模块，每个模块只加载一次
    fn load_module(&mut self, name: &str, loc: SourceLocation) -> Option<Rc<Program>> {
        if let Some(program) = self.modules.get(name) {
            debug!(module = name, "module cache hit");
            return Some(Rc::clone(program));
        }
        let Some(loader) = self.loader.as_mut() else {
            self.report(loc, format!("Cannot import '{}': no module loader configured", name));
            return None;
        };
        match loader.load(name) {
            Ok(program) => {
                info!(module = name, statements = program.statements.len(), "loaded module");
                let program = Rc::new(program);
                self.modules.insert(name.to_string(), Rc::clone(&program));
                Some(program)
            }
            Err(ZynError::Diagnostics(errors)) => {
                self.report(loc, format!("Module '{}' contains errors", name));
                self.errors.extend(errors);
                None
            }
            Err(err) => {
                self.report(loc, format!("Cannot import '{}': {}", name, err.message()));
                None
            }
        }
    }
}

fn check_arity(func: &FunctionStmt, existing: &FunctionSig) -> ZynResult<()> {
    let expected = existing.signature.params.len();
    if expected != func.params.len() {
        return Err(codegen_error(
            func.loc,
            format!(
                "Function '{}' redeclared with {} parameter(s), previously declared with {}",
                func.name,
                func.params.len(),
                expected
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Terminator;
    use crate::parser::parse;

    fn generate(source: &str) -> (CodeGenerator, ZynResult<()>) {
        let (program, errors) = parse(source);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        let mut generator = CodeGenerator::new("test");
        let result = generator.generate(&program);
        (generator, result)
    }

    fn messages(generator: &CodeGenerator) -> Vec<String> {
        generator.errors().iter().map(|e| e.message()).collect()
    }

    #[test]
    fn test_main_becomes_entry_point() {
        let (generator, result) = generate("fn main() int { return 0; }");
        result.unwrap();
        let module = generator.into_module().unwrap();
        assert_eq!(module.entry_point.as_deref(), Some("main"));
        let main = module.function("main").unwrap();
        assert_eq!(main.ret_type, IrType::I32);
        assert!(main.blocks.iter().all(|b| b.is_terminated()));
    }

    #[test]
    fn test_redefinition_is_a_hard_error() {
        let (_, result) = generate("fn f() int { return 1; }\nfn f() int { return 2; }");
        match result {
            Err(ZynError::CodeGen { line, message, .. }) => {
                assert_eq!(line, 2);
                assert!(message.contains("already defined"), "{}", message);
            }
            other => panic!("expected hard error, got {:?}", other),
        }
    }

    #[test]
    fn test_arity_conflict_is_a_hard_error() {
        let (_, result) = generate("fn f(a: int) int { return a; }\nfn f() int { return 1; }");
        assert!(matches!(result, Err(ZynError::CodeGen { .. })));
    }

    #[test]
    fn test_forward_calls_resolve() {
        let (generator, result) = generate(
            "fn main() int { return helper(2); }\nfn helper(x: int) int { return x * 2; }",
        );
        result.unwrap();
        assert!(generator.errors().is_empty(), "{:?}", messages(&generator));
    }

    #[test]
    fn test_missing_return_is_reported() {
        let (generator, result) = generate("fn f(x: int) int { if x > 0 { return 1; } }");
        result.unwrap();
        let errors = messages(&generator);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("without returning"));
    }

    #[test]
    fn test_returning_from_both_arms_is_enough() {
        let (generator, result) =
            generate("fn f(x: int) int { if x > 0 { return 1; } else { return 2; } }");
        result.unwrap();
        assert!(generator.errors().is_empty(), "{:?}", messages(&generator));
        let module = generator.into_module().unwrap();
        let f = module.function("f").unwrap();
        // 合并块不可达，由封闭逻辑补上 unreachable
        let merge = f.blocks.iter().find(|b| b.label.starts_with("if.end")).unwrap();
        assert_eq!(merge.terminator, Some(Terminator::Unreachable));
    }

    #[test]
    fn test_void_function_gets_implicit_return() {
        let (generator, result) = generate("fn f() void { let x: int = 1; }");
        result.unwrap();
        let module = generator.into_module().unwrap();
        let f = module.function("f").unwrap();
        assert_eq!(f.blocks[0].terminator, Some(Terminator::Ret(None)));
    }

    #[test]
    fn test_literal_globals() {
        let (generator, result) = generate(
            "let count: int = -3;\nlet ratio: float = 0.5;\nlet on: bool = true;\nlet name: str = \"zyn\";",
        );
        result.unwrap();
        let module = generator.into_module().unwrap();
        assert_eq!(module.global("g.count").unwrap().init, Constant::Int(IrType::I32, -3));
        assert_eq!(module.global("g.ratio").unwrap().init, Constant::Float(0.5));
        assert_eq!(module.global("g.on").unwrap().init, Constant::Int(IrType::I1, 1));
        assert_eq!(module.global("g.name").unwrap().init, Constant::Ref(".str.0".to_string()));
    }

    #[test]
    fn test_non_literal_global_is_reported() {
        let (generator, result) = generate("let x: int = 1 + 2;");
        result.unwrap();
        assert!(messages(&generator)[0].contains("literal initializer"));
    }

    #[test]
    fn test_top_level_statements_are_restricted() {
        let (generator, result) = generate("print(\"hi\");\nwhile true { }");
        result.unwrap();
        assert_eq!(generator.errors().len(), 2);
        assert!(messages(&generator)[0].contains("top level"));
    }

    #[test]
    fn test_nested_function_cannot_capture() {
        let (generator, result) = generate(
            "fn outer() int { let x: int = 1; fn inner() int { return x; } return inner(); }",
        );
        result.unwrap();
        let errors = messages(&generator);
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].contains("Cannot capture 'x'"));
    }

    #[test]
    fn test_locals_do_not_leak_between_functions() {
        let (generator, result) = generate(
            "fn a() int { let secret: int = 1; return secret; }\nfn b() int { return secret; }",
        );
        result.unwrap();
        let errors = messages(&generator);
        assert_eq!(errors, vec!["Undeclared variable 'secret'".to_string()]);
    }

    #[test]
    fn test_reserved_names_are_rejected() {
        let (generator, result) = generate("fn malloc(n: int) int { return n; }\nfn print() void { }");
        result.unwrap();
        assert_eq!(generator.errors().len(), 2);
    }

    #[test]
    fn test_imports_need_a_loader() {
        let (generator, result) = generate("import \"math\";");
        result.unwrap();
        assert!(messages(&generator)[0].contains("no module loader"));
    }
}
