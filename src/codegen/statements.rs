//! 语句代码生成

use crate::ast::{AssignStmt, Block, Expr, ForStmt, IfStmt, LetStmt, ReturnStmt, Stmt, WhileStmt};
use crate::error::{SourceLocation, ZynResult};
use crate::ir::{CmpOp, IrType, TypedValue, Value};
use crate::types::Type;

use super::context::{Binding, CodeGenerator, Operand};
use super::types::ir_type;

impl CodeGenerator {
    pub(super) fn generate_statements(&mut self, statements: &[Stmt]) -> ZynResult<()> {
        for stmt in statements {
            self.generate_statement(stmt)?;
        }
        Ok(())
    }

    /// 生成函数体内的单个语句
    pub(super) fn generate_statement(&mut self, stmt: &Stmt) -> ZynResult<()> {
        match stmt {
            Stmt::Expression(expr) => {
                self.generate_expression(expr)?;
                Ok(())
            }
            Stmt::Let(stmt) => self.generate_let(stmt),
            Stmt::Function(func) => self.generate_function(func),
            Stmt::Block(block) => self.generate_block(block),
            Stmt::Return(stmt) => self.generate_return(stmt),
            Stmt::Assign(stmt) => self.generate_assign(stmt),
            Stmt::If(stmt) => self.generate_if(stmt),
            Stmt::While(stmt) => self.generate_while(stmt),
            Stmt::For(stmt) => self.generate_for(stmt),
            Stmt::Break(loc) => self.generate_break(*loc),
            Stmt::Continue(loc) => self.generate_continue(*loc),
            Stmt::Import(_) | Stmt::ImportFrom(_) => {
                self.report(stmt.loc(), "Imports are only allowed at the top level");
                Ok(())
            }
        }
    }

    /// 块不引入新的作用域
    fn generate_block(&mut self, block: &Block) -> ZynResult<()> {
        self.generate_statements(&block.statements)
    }

    fn generate_let(&mut self, stmt: &LetStmt) -> ZynResult<()> {
        if stmt.declared_type == Type::Void {
            self.report(stmt.loc, format!("Variable '{}' cannot have type void", stmt.name));
            return Ok(());
        }
        let Some(value) = self.generate_expression_with_hint(&stmt.value, Some(&stmt.declared_type))? else {
            return Ok(());
        };
        if value.ty != stmt.declared_type {
            self.report(
                stmt.value.loc(),
                format!(
                    "Cannot initialize '{}' of type {} with a value of type {}",
                    stmt.name, stmt.declared_type, value.ty
                ),
            );
            return Ok(());
        }

        // 同一作用域内的重复声明就地更新
        if let Some(Binding::Variable { ptr, ty, .. }) = self.env.resolve_local(&stmt.name).cloned() {
            if ty != value.ty {
                self.report(
                    stmt.loc,
                    format!("Cannot redeclare '{}' of type {} as {}", stmt.name, ty, value.ty),
                );
                return Ok(());
            }
            return self.builder.build_store(value.typed(), ptr);
        }

        let slot = self.builder.build_alloca(ir_type(&value.ty), None)?;
        self.builder.build_store(value.typed(), slot.clone())?;
        let owner = self.current_owner();
        self.env.define(
            stmt.name.as_str(),
            Binding::Variable { ptr: slot, ty: value.ty, owner },
        );
        Ok(())
    }

    fn generate_assign(&mut self, stmt: &AssignStmt) -> ZynResult<()> {
        let Some((ptr, ty)) = self.lookup_variable(&stmt.name, stmt.loc) else {
            return Ok(());
        };
        let Some(rhs) = self.generate_expression_with_hint(&stmt.value, Some(&ty))? else {
            return Ok(());
        };

        let result = match stmt.op.arithmetic() {
            None => {
                if rhs.ty != ty {
                    self.report(
                        stmt.value.loc(),
                        format!("Cannot assign a value of type {} to '{}' of type {}", rhs.ty, stmt.name, ty),
                    );
                    return Ok(());
                }
                rhs
            }
            Some(op) => {
                if !ty.is_numeric() {
                    self.report(
                        stmt.loc,
                        format!("Operator '{}' requires a numeric variable, '{}' is {}", stmt.op, stmt.name, ty),
                    );
                    return Ok(());
                }
                let current = self.builder.build_load(ir_type(&ty), ptr.clone())?;
                let current = Operand::new(current, ty.clone());
                match self.generate_arithmetic(op, current, rhs, stmt.value.loc())? {
                    Some(result) => result,
                    None => return Ok(()),
                }
            }
        };
        self.builder.build_store(result.typed(), ptr)
    }

    fn generate_return(&mut self, stmt: &ReturnStmt) -> ZynResult<()> {
        let Some(return_type) = self.current_fn.as_ref().map(|f| f.return_type.clone()) else {
            self.report(stmt.loc, "'return' outside of a function");
            return Ok(());
        };

        match (&stmt.value, &return_type) {
            (None, Type::Void) => self.builder.build_ret(None),
            (None, expected) => {
                self.report(stmt.loc, format!("Missing return value of type {}", expected));
                self.builder.build_unreachable()
            }
            (Some(value), Type::Void) => {
                self.report(value.loc(), "A void function cannot return a value");
                self.builder.build_unreachable()
            }
            (Some(value), expected) => {
                let Some(result) = self.generate_expression_with_hint(value, Some(expected))? else {
                    // 值已报错，终结当前块以免再报缺少返回
                    return self.builder.build_unreachable();
                };
                if &result.ty != expected {
                    self.report(
                        value.loc(),
                        format!("Cannot return a value of type {} from a function returning {}", result.ty, expected),
                    );
                    return self.builder.build_unreachable();
                }
                self.builder.build_ret(Some(result.typed()))
            }
        }
    }

    /// 条件表达式求值为 i1；`int` 与 0 比较，其它类型报错后以 false 代替
    pub(super) fn generate_condition(&mut self, expr: &Expr) -> ZynResult<Value> {
        let Some(cond) = self.generate_expression(expr)? else {
            return Ok(Value::Bool(false));
        };
        match cond.ty {
            Type::Bool => Ok(cond.value),
            Type::Int => self
                .builder
                .build_icmp(CmpOp::Ne, IrType::I32, cond.value, Value::Int(0)),
            other => {
                self.report(expr.loc(), format!("Condition must be bool or int, found {}", other));
                Ok(Value::Bool(false))
            }
        }
    }

    fn generate_if(&mut self, stmt: &IfStmt) -> ZynResult<()> {
        let cond = self.generate_condition(&stmt.condition)?;

        let then_bb = self.builder.append_block("if.then")?;
        let else_bb = match stmt.alternative {
            Some(_) => Some(self.builder.append_block("if.else")?),
            None => None,
        };
        let merge_bb = self.builder.append_block("if.end")?;
        self.builder
            .build_cond_br(cond, then_bb, else_bb.unwrap_or(merge_bb))?;

        self.builder.position_at_end(then_bb)?;
        self.generate_block(&stmt.consequence)?;
        self.builder.build_fallthrough(merge_bb)?;

        if let (Some(else_bb), Some(alternative)) = (else_bb, &stmt.alternative) {
            self.builder.position_at_end(else_bb)?;
            self.generate_block(alternative)?;
            self.builder.build_fallthrough(merge_bb)?;
        }

        self.builder.position_at_end(merge_bb)
    }

    /// ```text
    /// while.cond: br cond, while.body, while.end
    /// while.body: ...; br while.cond
    /// while.end:
    /// ```
    fn generate_while(&mut self, stmt: &WhileStmt) -> ZynResult<()> {
        let cond_bb = self.builder.append_block("while.cond")?;
        let body_bb = self.builder.append_block("while.body")?;
        let end_bb = self.builder.append_block("while.end")?;
        self.builder.build_br(cond_bb)?;

        self.builder.position_at_end(cond_bb)?;
        let cond = self.generate_condition(&stmt.condition)?;
        self.builder.build_cond_br(cond, body_bb, end_bb)?;

        self.builder.position_at_end(body_bb)?;
        self.enter_loop(end_bb, cond_bb);
        self.generate_block(&stmt.body)?;
        self.exit_loop();
        self.builder.build_fallthrough(cond_bb)?;

        self.builder.position_at_end(end_bb)
    }

    /// 初始化语句的变量只在循环内可见；`continue` 跳到步进块
    fn generate_for(&mut self, stmt: &ForStmt) -> ZynResult<()> {
        self.env.push_scope();
        self.generate_let(&stmt.init)?;

        let cond_bb = self.builder.append_block("for.cond")?;
        let body_bb = self.builder.append_block("for.body")?;
        let step_bb = self.builder.append_block("for.step")?;
        let end_bb = self.builder.append_block("for.end")?;
        self.builder.build_br(cond_bb)?;

        self.builder.position_at_end(cond_bb)?;
        let cond = self.generate_condition(&stmt.condition)?;
        self.builder.build_cond_br(cond, body_bb, end_bb)?;

        self.builder.position_at_end(body_bb)?;
        self.enter_loop(end_bb, step_bb);
        self.generate_block(&stmt.body)?;
        self.exit_loop();
        self.builder.build_fallthrough(step_bb)?;

        self.builder.position_at_end(step_bb)?;
        self.generate_statement(&stmt.action)?;
        self.builder.build_fallthrough(cond_bb)?;

        self.builder.position_at_end(end_bb)?;
        self.env.pop_scope();
        Ok(())
    }

    fn generate_break(&mut self, loc: SourceLocation) -> ZynResult<()> {
        match self.break_targets.last().copied() {
            Some(target) => self.builder.build_br(target),
            None => {
                self.report(loc, "'break' outside of a loop");
                Ok(())
            }
        }
    }

    fn generate_continue(&mut self, loc: SourceLocation) -> ZynResult<()> {
        match self.continue_targets.last().copied() {
            Some(target) => self.builder.build_br(target),
            None => {
                self.report(loc, "'continue' outside of a loop");
                Ok(())
            }
        }
    }
}
