//! 表达式代码生成
//!
//! 每个生成函数返回 `Ok(None)` 表示问题已记录为诊断信息，调用方跳过该节点。

use std::collections::HashMap;

use tracing::warn;

use crate::ast::{
    ArrayLiteral, CallExpr, Expr, HashLiteral, IdentifierExpr, IndexExpr, InfixExpr, InfixOp,
    LiteralExpr, LiteralValue, PostfixExpr, PostfixOp, PrefixExpr, PrefixOp,
};
use crate::error::{SourceLocation, ZynError, ZynResult};
use crate::ir::{BinOp, CmpOp, IrType, TypedValue, Value};
use crate::types::{FunctionType, Type};

use super::context::{Binding, CodeGenerator, Operand};
use super::runtime::{internal_hash, HASH_FN, IPOW_FN, MALLOC_FN, POW_INTRINSIC};
use super::types::ir_type;

/// 字典字面量的槽位数
const MAP_CAPACITY: i64 = 16;
/// `{ptr keys, ptr values, i32 capacity}`
const MAP_HEADER_SIZE: i64 = 24;
const MAP_SLOT_SIZE: i64 = 8;

/// 处理字符串字面量中的转义序列，未知的转义原样保留
pub(super) fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn comparison(op: InfixOp) -> Option<CmpOp> {
    match op {
        InfixOp::Eq => Some(CmpOp::Eq),
        InfixOp::NotEq => Some(CmpOp::Ne),
        InfixOp::Lt => Some(CmpOp::Lt),
        InfixOp::Le => Some(CmpOp::Le),
        InfixOp::Gt => Some(CmpOp::Gt),
        InfixOp::Ge => Some(CmpOp::Ge),
        _ => None,
    }
}

fn int_binop(op: InfixOp) -> Option<BinOp> {
    match op {
        InfixOp::Add => Some(BinOp::Add),
        InfixOp::Sub => Some(BinOp::Sub),
        InfixOp::Mul => Some(BinOp::Mul),
        InfixOp::Div => Some(BinOp::SDiv),
        InfixOp::Mod => Some(BinOp::SRem),
        _ => None,
    }
}

fn float_binop(op: InfixOp) -> Option<BinOp> {
    match op {
        InfixOp::Add => Some(BinOp::FAdd),
        InfixOp::Sub => Some(BinOp::FSub),
        InfixOp::Mul => Some(BinOp::FMul),
        InfixOp::Div => Some(BinOp::FDiv),
        InfixOp::Mod => Some(BinOp::FRem),
        _ => None,
    }
}

impl CodeGenerator {
    pub(super) fn generate_expression(&mut self, expr: &Expr) -> ZynResult<Option<Operand>> {
        self.generate_expression_with_hint(expr, None)
    }

    /// `hint` 为上下文期望的类型，用于推断空数组字面量的元素类型
    pub(super) fn generate_expression_with_hint(
        &mut self,
        expr: &Expr,
        hint: Option<&Type>,
    ) -> ZynResult<Option<Operand>> {
        match expr {
            Expr::Literal(lit) => Ok(Some(self.generate_literal(lit))),
            Expr::Identifier(ident) => self.generate_identifier(ident),
            Expr::Infix(infix) => self.generate_infix(infix),
            Expr::Prefix(prefix) => self.generate_prefix(prefix),
            Expr::Postfix(postfix) => self.generate_postfix(postfix),
            Expr::Call(call) => self.generate_call(call),
            Expr::Index(index) => self.generate_index(index),
            Expr::Array(array) => self.generate_array_literal(array, hint),
            Expr::Hash(hash) => self.generate_hash_literal(hash),
        }
    }

    /// 整数字面量必须能放进 i32
    pub(super) fn check_int_range(&mut self, value: i64, loc: SourceLocation) {
        if i32::try_from(value).is_err() {
            self.report(loc, format!("Integer literal {} is out of range for int", value));
        }
    }

    /// 必定有返回值的调用
    fn call_value(&mut self, ret: IrType, callee: &str, args: Vec<TypedValue>) -> ZynResult<Value> {
        self.builder
            .build_call(ret, callee, args, None)?
            .ok_or_else(|| ZynError::Internal(format!("call to {} produced no value", callee)))
    }

    fn generate_literal(&mut self, lit: &LiteralExpr) -> Operand {
        match &lit.value {
            LiteralValue::Integer(v) => {
                self.check_int_range(*v, lit.loc);
                Operand::new(Value::Int(*v), Type::Int)
            }
            LiteralValue::Float(v) => Operand::new(Value::Float(*v), Type::Float),
            LiteralValue::Boolean(b) => Operand::new(Value::Bool(*b), Type::Bool),
            LiteralValue::String(raw) => {
                let ptr = self.builder.global_string(&unescape(raw));
                Operand::new(ptr, Type::Str)
            }
        }
    }

    fn generate_identifier(&mut self, ident: &IdentifierExpr) -> ZynResult<Option<Operand>> {
        let Some((ptr, ty)) = self.lookup_variable(&ident.name, ident.loc) else {
            return Ok(None);
        };
        let value = self.builder.build_load(ir_type(&ty), ptr)?;
        Ok(Some(Operand::new(value, ty)))
    }

    // ============ 运算符 ============

    fn generate_infix(&mut self, infix: &InfixExpr) -> ZynResult<Option<Operand>> {
        let left = self.generate_expression(&infix.left)?;
        let right = self.generate_expression(&infix.right)?;
        let (Some(left), Some(right)) = (left, right) else {
            return Ok(None);
        };
        if infix.op.is_comparison() {
            self.generate_comparison(infix.op, left, right, infix.loc)
        } else {
            self.generate_arithmetic(infix.op, left, right, infix.loc)
        }
    }

    /// 算术运算，两侧必须同为 int 或同为 float
    pub(super) fn generate_arithmetic(
        &mut self,
        op: InfixOp,
        left: Operand,
        right: Operand,
        loc: SourceLocation,
    ) -> ZynResult<Option<Operand>> {
        let result = match (&left.ty, &right.ty) {
            (Type::Int, Type::Int) if op == InfixOp::Pow => {
                self.ensure_ipow_function()?;
                let value = self.call_value(IrType::I32, IPOW_FN, vec![left.typed(), right.typed()])?;
                Operand::new(value, Type::Int)
            }
            (Type::Float, Type::Float) if op == InfixOp::Pow => {
                self.ensure_pow_intrinsic();
                let value = self.call_value(IrType::Double, POW_INTRINSIC, vec![left.typed(), right.typed()])?;
                Operand::new(value, Type::Float)
            }
            (Type::Int, Type::Int) => {
                let bin = int_binop(op)
                    .ok_or_else(|| ZynError::Internal(format!("'{}' is not an arithmetic operator", op)))?;
                let value = self.builder.build_binary(bin, IrType::I32, left.value, right.value)?;
                Operand::new(value, Type::Int)
            }
            (Type::Float, Type::Float) => {
                let bin = float_binop(op)
                    .ok_or_else(|| ZynError::Internal(format!("'{}' is not an arithmetic operator", op)))?;
                let value = self.builder.build_binary(bin, IrType::Double, left.value, right.value)?;
                Operand::new(value, Type::Float)
            }
            (Type::Str, Type::Str) if op == InfixOp::Add => {
                self.report(loc, "String concatenation is not supported");
                return Ok(None);
            }
            (l, r) => {
                self.report(loc, format!("Unsupported operand types for '{}': {} and {}", op, l, r));
                return Ok(None);
            }
        };
        Ok(Some(result))
    }

    fn generate_comparison(
        &mut self,
        op: InfixOp,
        left: Operand,
        right: Operand,
        loc: SourceLocation,
    ) -> ZynResult<Option<Operand>> {
        let cmp = comparison(op)
            .ok_or_else(|| ZynError::Internal(format!("'{}' is not a comparison", op)))?;
        let value = match (&left.ty, &right.ty) {
            (Type::Int, Type::Int) => self.builder.build_icmp(cmp, IrType::I32, left.value, right.value)?,
            (Type::Float, Type::Float) => self.builder.build_fcmp(cmp, left.value, right.value)?,
            (Type::Bool, Type::Bool) if matches!(cmp, CmpOp::Eq | CmpOp::Ne) => {
                self.builder.build_icmp(cmp, IrType::I1, left.value, right.value)?
            }
            (l, r) => {
                self.report(loc, format!("Cannot compare {} and {} with '{}'", l, r, op));
                return Ok(None);
            }
        };
        Ok(Some(Operand::new(value, Type::Bool)))
    }

    fn generate_prefix(&mut self, prefix: &PrefixExpr) -> ZynResult<Option<Operand>> {
        // 负数字面量直接折叠，使 -2147483648 可以表示
        if prefix.op == PrefixOp::Neg {
            if let Expr::Literal(lit) = prefix.operand.as_ref() {
                match lit.value {
                    LiteralValue::Integer(v) => {
                        self.check_int_range(-v, prefix.loc);
                        return Ok(Some(Operand::new(Value::Int(-v), Type::Int)));
                    }
                    LiteralValue::Float(v) => return Ok(Some(Operand::new(Value::Float(-v), Type::Float))),
                    _ => {}
                }
            }
        }

        let Some(operand) = self.generate_expression(&prefix.operand)? else {
            return Ok(None);
        };
        let result = match (prefix.op, &operand.ty) {
            (PrefixOp::Neg, Type::Int) => {
                let value = self.builder.build_binary(BinOp::Mul, IrType::I32, operand.value, Value::Int(-1))?;
                Operand::new(value, Type::Int)
            }
            (PrefixOp::Neg, Type::Float) => Operand::new(self.builder.build_fneg(operand.value)?, Type::Float),
            // 整数按位取反
            (PrefixOp::Not, Type::Int) => {
                let value = self.builder.build_binary(BinOp::Xor, IrType::I32, operand.value, Value::Int(-1))?;
                Operand::new(value, Type::Int)
            }
            (PrefixOp::Not, Type::Bool) => {
                let value = self.builder.build_binary(BinOp::Xor, IrType::I1, operand.value, Value::Bool(true))?;
                Operand::new(value, Type::Bool)
            }
            (PrefixOp::Not, Type::Float) => {
                let value = self.builder.build_fcmp(CmpOp::Eq, operand.value, Value::Float(0.0))?;
                Operand::new(value, Type::Bool)
            }
            (op, ty) => {
                self.report(prefix.loc, format!("Operator '{}' cannot be applied to {}", op, ty));
                return Ok(None);
            }
        };
        Ok(Some(result))
    }

    /// `x++` / `x--`：更新变量，结果为更新前的值
    fn generate_postfix(&mut self, postfix: &PostfixExpr) -> ZynResult<Option<Operand>> {
        let Expr::Identifier(ident) = postfix.operand.as_ref() else {
            self.report(postfix.loc, format!("Operator '{}' can only be applied to a variable", postfix.op));
            return Ok(None);
        };
        let Some((ptr, ty)) = self.lookup_variable(&ident.name, ident.loc) else {
            return Ok(None);
        };
        let (op, ir, one) = match (postfix.op, &ty) {
            (PostfixOp::Inc, Type::Int) => (BinOp::Add, IrType::I32, Value::Int(1)),
            (PostfixOp::Dec, Type::Int) => (BinOp::Sub, IrType::I32, Value::Int(1)),
            (PostfixOp::Inc, Type::Float) => (BinOp::FAdd, IrType::Double, Value::Float(1.0)),
            (PostfixOp::Dec, Type::Float) => (BinOp::FSub, IrType::Double, Value::Float(1.0)),
            (op, ty) => {
                self.report(
                    postfix.loc,
                    format!("Operator '{}' requires a numeric variable, '{}' is {}", op, ident.name, ty),
                );
                return Ok(None);
            }
        };
        let old = self.builder.build_load(ir, ptr.clone())?;
        let updated = self.builder.build_binary(op, ir, old.clone(), one)?;
        self.builder.build_store(TypedValue::new(ir, updated), ptr)?;
        Ok(Some(Operand::new(old, ty)))
    }

    // ============ 调用与索引 ============

    fn generate_call(&mut self, call: &CallExpr) -> ZynResult<Option<Operand>> {
        let Expr::Identifier(callee) = call.callee.as_ref() else {
            self.report(call.loc, "Only named functions can be called");
            return Ok(None);
        };
        if let Some(signature) = self.functions.get(&callee.name).map(|f| f.signature.clone()) {
            return self.generate_user_call(&callee.name, &signature, call);
        }
        match self.env.resolve(&callee.name).cloned() {
            Some(Binding::Builtin { symbol, signature }) => self.generate_builtin_call(&symbol, &signature, call),
            Some(Binding::Variable { ty, .. }) => {
                self.report(call.loc, format!("'{}' is a {}, not a function", callee.name, ty));
                Ok(None)
            }
            None => {
                self.report(call.loc, format!("Undefined function '{}'", callee.name));
                Ok(None)
            }
        }
    }

    fn generate_user_call(
        &mut self,
        name: &str,
        signature: &FunctionType,
        call: &CallExpr,
    ) -> ZynResult<Option<Operand>> {
        if call.args.len() != signature.params.len() {
            self.report(
                call.loc,
                format!(
                    "Function '{}' expects {} argument(s), got {}",
                    name,
                    signature.params.len(),
                    call.args.len()
                ),
            );
            return Ok(None);
        }

        let mut args = Vec::with_capacity(call.args.len());
        let mut valid = true;
        for (arg, expected) in call.args.iter().zip(&signature.params) {
            match self.generate_expression_with_hint(arg, Some(expected))? {
                Some(value) if &value.ty == expected => args.push(value.typed()),
                Some(value) => {
                    self.report(
                        arg.loc(),
                        format!("Argument of type {} does not match parameter type {}", value.ty, expected),
                    );
                    valid = false;
                }
                None => valid = false,
            }
        }
        if !valid {
            return Ok(None);
        }

        let value = self
            .builder
            .build_call(ir_type(&signature.return_type), name, args, None)?;
        Ok(Some(Operand::new(
            value.unwrap_or(Value::Null),
            signature.return_type.clone(),
        )))
    }

    /// 变参内建函数：固定参数按类型检查，变参中的 bool 扩展为 i32
    fn generate_builtin_call(
        &mut self,
        symbol: &str,
        signature: &FunctionType,
        call: &CallExpr,
    ) -> ZynResult<Option<Operand>> {
        let fixed = signature.params.len();
        let arity_ok = if signature.variadic {
            call.args.len() >= fixed
        } else {
            call.args.len() == fixed
        };
        if !arity_ok {
            self.report(
                call.loc,
                format!("Builtin '{}' expects at least {} argument(s), got {}", symbol, fixed, call.args.len()),
            );
            return Ok(None);
        }

        let mut args = Vec::with_capacity(call.args.len());
        let mut valid = true;
        for (i, arg) in call.args.iter().enumerate() {
            let Some(value) = self.generate_expression_with_hint(arg, signature.params.get(i))? else {
                valid = false;
                continue;
            };
            if let Some(expected) = signature.params.get(i) {
                if &value.ty != expected {
                    self.report(
                        arg.loc(),
                        format!("Argument of type {} does not match parameter type {}", value.ty, expected),
                    );
                    valid = false;
                }
                args.push(value.typed());
                continue;
            }
            match value.ty {
                Type::Void => {
                    self.report(arg.loc(), "Cannot pass a void value");
                    valid = false;
                }
                Type::Bool => {
                    let widened = self.builder.build_zext(value.typed(), IrType::I32)?;
                    args.push(TypedValue::new(IrType::I32, widened));
                }
                _ => args.push(value.typed()),
            }
        }
        if !valid {
            return Ok(None);
        }

        let fixed_types: Vec<IrType> = signature.params.iter().map(ir_type).collect();
        let varargs = signature.variadic.then_some(fixed_types);
        let value = self
            .builder
            .build_call(ir_type(&signature.return_type), symbol, args, varargs)?;
        Ok(Some(Operand::new(
            value.unwrap_or(Value::Null),
            signature.return_type.clone(),
        )))
    }

    /// 数组下标不做越界检查
    fn generate_index(&mut self, index: &IndexExpr) -> ZynResult<Option<Operand>> {
        let target = self.generate_expression(&index.target)?;
        let position = self.generate_expression(&index.index)?;
        let (Some(target), Some(position)) = (target, position) else {
            return Ok(None);
        };
        let Some(element) = target.ty.element_type().cloned() else {
            self.report(index.loc, format!("Cannot index a value of type {}", target.ty));
            return Ok(None);
        };
        if position.ty != Type::Int {
            self.report(index.index.loc(), format!("Array index must be int, found {}", position.ty));
            return Ok(None);
        }

        let elem_ir = ir_type(&element);
        let ptr = self
            .builder
            .build_gep(elem_ir, target.value, TypedValue::new(IrType::I32, position.value))?;
        let value = self.builder.build_load(elem_ir, ptr)?;
        Ok(Some(Operand::new(value, element)))
    }

    // ============ 复合字面量 ============

    /// 数组字面量在栈上分配定长存储，结果为指向首元素的指针
    fn generate_array_literal(
        &mut self,
        array: &ArrayLiteral,
        hint: Option<&Type>,
    ) -> ZynResult<Option<Operand>> {
        let mut elements = Vec::with_capacity(array.elements.len());
        let mut valid = true;
        for element in &array.elements {
            match self.generate_expression(element)? {
                Some(value) => elements.push((value, element.loc())),
                None => valid = false,
            }
        }
        if !valid {
            return Ok(None);
        }

        let element_type = match (hint.and_then(Type::element_type), elements.first()) {
            (Some(ty), _) => ty.clone(),
            (None, Some((first, _))) => first.ty.clone(),
            (None, None) => {
                self.report(array.loc, "Cannot infer the element type of an empty array");
                return Ok(None);
            }
        };
        if !matches!(element_type, Type::Int | Type::Float | Type::Bool | Type::Str) {
            self.report(array.loc, format!("Arrays of {} are not supported", element_type));
            return Ok(None);
        }
        for (value, loc) in &elements {
            if value.ty != element_type {
                self.report(
                    *loc,
                    format!("Array element of type {} does not match element type {}", value.ty, element_type),
                );
                valid = false;
            }
        }
        if !valid {
            return Ok(None);
        }

        let elem_ir = ir_type(&element_type);
        let storage = self
            .builder
            .build_alloca(elem_ir, Some(elements.len() as u32))?;
        for (i, (value, _)) in elements.into_iter().enumerate() {
            let slot = self.builder.build_gep(
                elem_ir,
                storage.clone(),
                TypedValue::new(IrType::I32, Value::Int(i as i64)),
            )?;
            self.builder.build_store(value.typed(), slot)?;
        }
        Ok(Some(Operand::new(storage, Type::array_of(element_type))))
    }

    /// 字典字面量：定长 16 槽的散列表，槽位冲突时后写入的值覆盖先前的值
    fn generate_hash_literal(&mut self, hash: &HashLiteral) -> ZynResult<Option<Operand>> {
        let mut pairs = Vec::with_capacity(hash.pairs.len());
        let mut valid = true;
        for (key_expr, value_expr) in &hash.pairs {
            let key = self.generate_expression(key_expr)?;
            let value = self.generate_expression(value_expr)?;
            let (Some(key), Some(value)) = (key, value) else {
                valid = false;
                continue;
            };
            if key.ty != Type::Str {
                self.report(key_expr.loc(), format!("Map keys must be str, found {}", key.ty));
                valid = false;
                continue;
            }
            pairs.push((key, value, value_expr.loc()));
        }

        let value_type = pairs.first().map(|(_, value, _)| value.ty.clone());
        if let Some(value_type) = &value_type {
            if !matches!(value_type, Type::Int | Type::Float | Type::Bool) {
                self.report(hash.loc, format!("Map values of type {} are not supported", value_type));
                valid = false;
            }
            for (_, value, loc) in &pairs {
                if &value.ty != value_type {
                    self.report(
                        *loc,
                        format!("Mixed value types in map literal: {} and {}", value_type, value.ty),
                    );
                    valid = false;
                }
            }
        }
        if !valid {
            return Ok(None);
        }
        self.warn_slot_collisions(hash);

        self.ensure_malloc();
        self.ensure_hash_function()?;
        let malloc = |size: i64| vec![TypedValue::new(IrType::I64, Value::Int(size))];
        let header = self.call_value(IrType::Ptr, MALLOC_FN, malloc(MAP_HEADER_SIZE))?;
        let keys = self.call_value(IrType::Ptr, MALLOC_FN, malloc(MAP_CAPACITY * MAP_SLOT_SIZE))?;
        let values = self.call_value(IrType::Ptr, MALLOC_FN, malloc(MAP_CAPACITY * MAP_SLOT_SIZE))?;

        self.builder
            .build_store(TypedValue::new(IrType::Ptr, keys.clone()), header.clone())?;
        let values_field = self.builder.build_gep(
            IrType::Ptr,
            header.clone(),
            TypedValue::new(IrType::I32, Value::Int(1)),
        )?;
        self.builder
            .build_store(TypedValue::new(IrType::Ptr, values.clone()), values_field)?;
        let capacity_field = self.builder.build_gep(
            IrType::Ptr,
            header.clone(),
            TypedValue::new(IrType::I32, Value::Int(2)),
        )?;
        self.builder.build_store(
            TypedValue::new(IrType::I32, Value::Int(MAP_CAPACITY)),
            capacity_field,
        )?;

        for (key, value, _) in pairs {
            let hashed = self.call_value(IrType::I32, HASH_FN, vec![key.typed()])?;
            let slot = self
                .builder
                .build_binary(BinOp::URem, IrType::I32, hashed, Value::Int(MAP_CAPACITY))?;

            let key_ptr = self.builder.build_gep(
                IrType::Ptr,
                keys.clone(),
                TypedValue::new(IrType::I32, slot.clone()),
            )?;
            self.builder.build_store(key.typed(), key_ptr)?;

            let stored = match value.ty {
                Type::Int => TypedValue::new(IrType::I64, self.builder.build_sext(value.typed(), IrType::I64)?),
                Type::Bool => TypedValue::new(IrType::I64, self.builder.build_zext(value.typed(), IrType::I64)?),
                _ => value.typed(),
            };
            let value_ptr = self.builder.build_gep(
                stored.ty,
                values.clone(),
                TypedValue::new(IrType::I32, slot),
            )?;
            self.builder.build_store(stored, value_ptr)?;
        }
        Ok(Some(Operand::new(header, Type::Dict)))
    }

    /// 字面量键在编译期即可算出槽位
    fn warn_slot_collisions(&self, hash: &HashLiteral) {
        let mut slots: HashMap<u32, String> = HashMap::new();
        for (key_expr, _) in &hash.pairs {
            let Expr::Literal(LiteralExpr { value: LiteralValue::String(raw), .. }) = key_expr else {
                continue;
            };
            let key = unescape(raw);
            let slot = internal_hash(&key) % MAP_CAPACITY as u32;
            if let Some(previous) = slots.insert(slot, key.clone()) {
                if previous != key {
                    warn!(slot, first = %previous, second = %key, "map literal keys share a slot, the later value wins");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, InstrKind, Module, VReg};
    use crate::parser::parse;

    fn generate(source: &str) -> CodeGenerator {
        let (program, errors) = parse(source);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        let mut generator = CodeGenerator::new("test");
        generator.generate(&program).unwrap();
        generator
    }

    fn compile(source: &str) -> Module {
        let generator = generate(source);
        let messages: Vec<String> = generator.errors().iter().map(|e| e.message()).collect();
        assert!(messages.is_empty(), "{:?}", messages);
        generator.into_module().unwrap()
    }

    fn diagnostics(source: &str) -> Vec<String> {
        generate(source).errors().iter().map(|e| e.message()).collect()
    }

    fn instructions(f: &Function) -> Vec<&InstrKind> {
        f.blocks.iter().flat_map(|b| b.instructions.iter().map(|i| &i.kind)).collect()
    }

    fn calls_to(f: &Function, callee: &str) -> usize {
        instructions(f)
            .into_iter()
            .filter(|k| matches!(k, InstrKind::Call { callee: c, .. } if c == callee))
            .count()
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#"a\nb\t\"c\"\\"#), "a\nb\t\"c\"\\");
        assert_eq!(unescape(r"\q"), r"\q");
    }

    #[test]
    fn test_precedence_drives_evaluation_order() {
        let module = compile("fn f() int { return 1 + 2 * 3; }");
        let ops: Vec<BinOp> = instructions(module.function("f").unwrap())
            .into_iter()
            .filter_map(|k| match k {
                InstrKind::Binary { op, .. } => Some(*op),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec![BinOp::Mul, BinOp::Add]);
    }

    #[test]
    fn test_integer_literal_range() {
        let errors = diagnostics(
            "fn f() void { let a: int = 3000000000; let b: int = -2147483648; let c: int = 2147483648; }",
        );
        assert_eq!(errors.len(), 2, "{:?}", errors);
        assert!(errors.iter().all(|e| e.contains("out of range")));
    }

    #[test]
    fn test_power_operators() {
        let module = compile(
            "fn i(a: int, b: int) int { return a ^ b; }\nfn d(a: float, b: float) float { return a ^ b; }",
        );
        assert_eq!(calls_to(module.function("i").unwrap(), IPOW_FN), 1);
        assert_eq!(calls_to(module.function("d").unwrap(), POW_INTRINSIC), 1);
        assert!(module.function(IPOW_FN).is_some_and(|f| !f.is_external));
        assert!(module.function(POW_INTRINSIC).is_some_and(|f| f.is_external));
    }

    #[test]
    fn test_mixed_arithmetic_is_reported() {
        let errors = diagnostics("fn f() float { return 1 + 2.0; }");
        assert_eq!(errors, vec!["Unsupported operand types for '+': int and float".to_string()]);
    }

    #[test]
    fn test_string_concatenation_is_reported() {
        let errors = diagnostics("fn f() str { return \"a\" + \"b\"; }");
        assert!(errors[0].contains("String concatenation"));
    }

    #[test]
    fn test_bool_comparisons() {
        compile("fn f(a: bool, b: bool) bool { return a != b; }");
        let errors = diagnostics("fn f(a: bool, b: bool) bool { return a < b; }");
        assert!(errors[0].contains("Cannot compare bool and bool"));
    }

    #[test]
    fn test_arity_mismatch_emits_no_call() {
        let generator = generate(
            "fn add(a: int, b: int) int { return a + b; }\nfn main() int { return add(1); }",
        );
        let messages: Vec<String> = generator.errors().iter().map(|e| e.message()).collect();
        assert_eq!(messages.len(), 1, "{:?}", messages);
        assert!(messages[0].contains("expects 2 argument(s), got 1"));
        let module = generator.builder.module().clone();
        assert_eq!(calls_to(module.function("main").unwrap(), "add"), 0);
    }

    #[test]
    fn test_argument_types_are_checked() {
        let errors = diagnostics(
            "fn sq(x: int) int { return x * x; }\nfn main() int { return sq(1.5); }",
        );
        assert!(errors[0].contains("Argument of type float does not match parameter type int"));
    }

    #[test]
    fn test_postfix_yields_previous_value() {
        let module = compile("fn f() int { let i: int = 0; let j: int = i++; return j; }");
        let f = module.function("f").unwrap();
        let kinds = instructions(f);
        let old = kinds
            .iter()
            .find_map(|k| match k {
                InstrKind::Binary { op: BinOp::Add, lhs, .. } => Some(lhs.clone()),
                _ => None,
            })
            .unwrap();
        let stores: Vec<&TypedValue> = kinds
            .iter()
            .filter_map(|k| match k {
                InstrKind::Store { value, .. } => Some(value),
                _ => None,
            })
            .collect();
        // i = 0, i = i + 1, j = 旧值
        assert_eq!(stores.len(), 3);
        assert_eq!(stores[2].value, old);
    }

    #[test]
    fn test_prefix_operators() {
        let module = compile("fn f(b: bool, x: float, n: int) bool { let m: int = !n; let y: float = -x; return !b; }");
        let kinds = instructions(module.function("f").unwrap());
        assert!(kinds.iter().any(|k| matches!(k, InstrKind::Binary { op: BinOp::Xor, ty: IrType::I32, rhs: Value::Int(-1), .. })));
        assert!(kinds.iter().any(|k| matches!(k, InstrKind::Binary { op: BinOp::Xor, ty: IrType::I1, rhs: Value::Bool(true), .. })));
        assert!(kinds.iter().any(|k| matches!(k, InstrKind::FNeg(_))));
    }

    #[test]
    fn test_array_literal_and_index() {
        let module = compile("fn f() int { let xs: arr_int = [10, 20, 30]; return xs[1]; }");
        let f = module.function("f").unwrap();
        assert!(f.blocks[0]
            .instructions
            .iter()
            .any(|i| matches!(i.kind, InstrKind::Alloca { ty: IrType::I32, count: Some(3) })));
        let geps = instructions(f)
            .into_iter()
            .filter(|k| matches!(k, InstrKind::Gep { elem: IrType::I32, .. }))
            .count();
        // 三次初始化加一次读取
        assert_eq!(geps, 4);
    }

    #[test]
    fn test_arrays_are_passed_by_pointer() {
        let module = compile(
            "fn first(xs: arr_float) float { return xs[0]; }\nfn main() int { let v: arr_float = [1.5]; first(v); return 0; }",
        );
        let first = module.function("first").unwrap();
        assert_eq!(first.params[0].1, IrType::Ptr);
    }

    #[test]
    fn test_array_diagnostics() {
        let errors = diagnostics(
            "fn f(n: int) void { let a: arr_int = [1, true]; let b: int = n[0]; print(\"%d\", []); }",
        );
        assert_eq!(errors.len(), 3, "{:?}", errors);
        assert!(errors[0].contains("does not match element type int"));
        assert!(errors[1].contains("Cannot index a value of type int"));
        assert!(errors[2].contains("empty array"));
    }

    #[test]
    fn test_empty_array_takes_declared_element_type() {
        compile("fn f() void { let xs: arr_str = []; }");
    }

    #[test]
    fn test_index_must_be_int() {
        let errors = diagnostics("fn f(xs: arr_int) int { return xs[true]; }");
        assert!(errors[0].contains("Array index must be int"));
    }

    #[test]
    fn test_print_widens_bool_varargs() {
        let module = compile("fn main() int { print(\"%d %s %f\\n\", true, \"x\", 1.5); return 0; }");
        let kinds = instructions(module.function("main").unwrap());
        assert!(kinds.iter().any(|k| matches!(k, InstrKind::ZExt { to: IrType::I32, .. })));
        let call = kinds
            .iter()
            .find_map(|k| match k {
                InstrKind::Call { callee, args, varargs, .. } if callee == "printf" => Some((args.clone(), varargs.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(call.1, Some(vec![IrType::Ptr]));
        let arg_types: Vec<IrType> = call.0.iter().map(|a| a.ty).collect();
        assert_eq!(arg_types, vec![IrType::Ptr, IrType::I32, IrType::Ptr, IrType::Double]);
    }

    #[test]
    fn test_map_literal_layout() {
        let module = compile("fn f() dict { return {\"a\": 1, \"q\": 2, \"z\": 3}; }");
        let f = module.function("f").unwrap();
        assert_eq!(calls_to(f, MALLOC_FN), 3);
        assert_eq!(calls_to(f, HASH_FN), 3);
        let kinds = instructions(f);
        let slots = kinds
            .iter()
            .filter(|k| matches!(k, InstrKind::Binary { op: BinOp::URem, rhs: Value::Int(16), .. }))
            .count();
        assert_eq!(slots, 3);
        assert!(kinds.iter().any(|k| matches!(k, InstrKind::SExt { to: IrType::I64, .. })));
        assert_eq!(module.functions.iter().filter(|f| f.name == HASH_FN).count(), 1);
        // "a" 与 "q" 落在同一槽位，后者覆盖前者
        assert_eq!(internal_hash("a") % 16, internal_hash("q") % 16);
    }

    #[test]
    fn test_repeated_map_key_overwrites_same_slot() {
        let module = compile("fn f() dict { return {\"a\": 1, \"a\": 2}; }");
        let f = module.function("f").unwrap();
        let defs: HashMap<VReg, &InstrKind> = f
            .blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .filter_map(|i| i.result.map(|r| (r, &i.kind)))
            .collect();
        let def = |value: &Value| match value {
            Value::Reg(r) => defs.get(r).copied(),
            _ => None,
        };

        // 每次写值：取回槽位所用的散列参数，以及被扩展的原始值
        let mut writes = Vec::new();
        for kind in instructions(f) {
            let InstrKind::Store { value, ptr } = kind else { continue };
            if value.ty != IrType::I64 {
                continue;
            }
            let Some(InstrKind::Gep { elem: IrType::I64, index, .. }) = def(ptr) else {
                panic!("value store without slot gep: {:?}", kind);
            };
            let Some(InstrKind::Binary { op: BinOp::URem, lhs, rhs: Value::Int(16), .. }) = def(&index.value) else {
                panic!("slot is not a urem of the hash: {:?}", index);
            };
            let Some(InstrKind::Call { callee, args, .. }) = def(lhs) else {
                panic!("slot does not come from a call");
            };
            assert_eq!(callee, HASH_FN);
            let Some(InstrKind::SExt { value: original, .. }) = def(&value.value) else {
                panic!("int value is not widened");
            };
            writes.push((args[0].value.clone(), original.value.clone()));
        }

        assert_eq!(writes.len(), 2);
        // 相同字面量共享同一个字符串常量，因此散列到同一槽位
        assert_eq!(writes[0].0, writes[1].0);
        assert!(matches!(writes[0].0, Value::Global(_)));
        assert_eq!(writes[0].1, Value::Int(1));
        assert_eq!(writes[1].1, Value::Int(2));
    }

    #[test]
    fn test_map_literal_diagnostics() {
        let errors = diagnostics("fn f() void { let m: dict = {\"a\": 1, \"b\": 2.5}; let n: dict = {1: 2}; }");
        assert_eq!(errors.len(), 2, "{:?}", errors);
        assert!(errors[0].contains("Mixed value types"));
        assert!(errors[1].contains("Map keys must be str"));
    }

    #[test]
    fn test_void_call_result_cannot_be_stored() {
        let errors = diagnostics("fn nothing() void { }\nfn f() void { let x: int = nothing(); }");
        assert!(errors[0].contains("of type void"));
    }

    #[test]
    fn test_calling_a_variable_is_reported() {
        let errors = diagnostics("fn f() void { let x: int = 1; x(); }");
        assert_eq!(errors, vec!["'x' is a int, not a function".to_string()]);
    }
}
