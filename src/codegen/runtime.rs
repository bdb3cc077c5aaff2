//! 运行时支持：内建函数、外部声明以及按需生成的辅助函数

use crate::error::ZynResult;
use crate::ir::{BinOp, CmpOp, IrType, TypedValue, Value};
use crate::types::{FunctionType, Type};

use super::context::{Binding, CodeGenerator};

pub(super) const HASH_FN: &str = "internal_hash";
pub(super) const IPOW_FN: &str = "internal_ipow";
pub(super) const POW_INTRINSIC: &str = "llvm.pow.f64";
pub(super) const MALLOC_FN: &str = "malloc";
pub(super) const PRINTF_FN: &str = "printf";

/// 用户函数不能使用的 IR 符号名
pub(super) const RESERVED_SYMBOLS: &[&str] = &[HASH_FN, IPOW_FN, MALLOC_FN, PRINTF_FN];

const HASH_SEED: u32 = 5381;

/// 与生成的 `internal_hash` 一致的 djb2 散列
pub fn internal_hash(key: &str) -> u32 {
    key.bytes()
        .take_while(|&b| b != 0)
        .fold(HASH_SEED, |h, b| h.wrapping_mul(33).wrapping_add(b as u32))
}

impl CodeGenerator {
    /// 在全局作用域绑定内建函数
    pub(super) fn declare_builtins(&mut self) {
        self.builder
            .declare_external(PRINTF_FN, vec![IrType::Ptr], IrType::I32, true);
        self.env.define(
            "print",
            Binding::Builtin {
                symbol: PRINTF_FN.to_string(),
                signature: FunctionType {
                    params: vec![Type::Str],
                    return_type: Type::Int,
                    variadic: true,
                },
            },
        );
    }

    pub(super) fn ensure_malloc(&mut self) {
        self.builder
            .declare_external(MALLOC_FN, vec![IrType::I64], IrType::Ptr, false);
    }

    pub(super) fn ensure_pow_intrinsic(&mut self) {
        self.builder.declare_external(
            POW_INTRINSIC,
            vec![IrType::Double, IrType::Double],
            IrType::Double,
            false,
        );
    }

    /// 生成 `i32 internal_hash(ptr)`：逐字节 `h = h * 33 + c`，直到遇到 NUL
    pub(super) fn ensure_hash_function(&mut self) -> ZynResult<()> {
        if self.builder.has_function(HASH_FN) {
            return Ok(());
        }
        let params = self.builder.start_function(HASH_FN, vec![IrType::Ptr], IrType::I32);
        let key = Value::Reg(params[0]);

        let hash = self.builder.build_alloca(IrType::I32, None)?;
        let index = self.builder.build_alloca(IrType::I32, None)?;
        self.builder
            .build_store(TypedValue::new(IrType::I32, Value::Int(HASH_SEED as i64)), hash.clone())?;
        self.builder
            .build_store(TypedValue::new(IrType::I32, Value::Int(0)), index.clone())?;

        let loop_bb = self.builder.append_block("hash.loop")?;
        let body_bb = self.builder.append_block("hash.body")?;
        let end_bb = self.builder.append_block("hash.end")?;
        self.builder.build_br(loop_bb)?;

        self.builder.position_at_end(loop_bb)?;
        let i = self.builder.build_load(IrType::I32, index.clone())?;
        let byte_ptr = self
            .builder
            .build_gep(IrType::I8, key, TypedValue::new(IrType::I32, i.clone()))?;
        let byte = self.builder.build_load(IrType::I8, byte_ptr)?;
        let at_end = self
            .builder
            .build_icmp(CmpOp::Eq, IrType::I8, byte.clone(), Value::Int(0))?;
        self.builder.build_cond_br(at_end, end_bb, body_bb)?;

        self.builder.position_at_end(body_bb)?;
        let h = self.builder.build_load(IrType::I32, hash.clone())?;
        let scaled = self.builder.build_binary(BinOp::Mul, IrType::I32, h, Value::Int(33))?;
        let widened = self
            .builder
            .build_zext(TypedValue::new(IrType::I8, byte), IrType::I32)?;
        let next = self.builder.build_binary(BinOp::Add, IrType::I32, scaled, widened)?;
        self.builder
            .build_store(TypedValue::new(IrType::I32, next), hash.clone())?;
        let next_i = self.builder.build_binary(BinOp::Add, IrType::I32, i, Value::Int(1))?;
        self.builder
            .build_store(TypedValue::new(IrType::I32, next_i), index)?;
        self.builder.build_br(loop_bb)?;

        self.builder.position_at_end(end_bb)?;
        let result = self.builder.build_load(IrType::I32, hash)?;
        self.builder
            .build_ret(Some(TypedValue::new(IrType::I32, result)))?;
        self.builder.finish_function()
    }

    /// 生成 `i32 internal_ipow(i32 base, i32 exp)`：重复相乘，负指数得 0
    pub(super) fn ensure_ipow_function(&mut self) -> ZynResult<()> {
        if self.builder.has_function(IPOW_FN) {
            return Ok(());
        }
        let params = self
            .builder
            .start_function(IPOW_FN, vec![IrType::I32, IrType::I32], IrType::I32);
        let base = Value::Reg(params[0]);
        let exp = Value::Reg(params[1]);

        let result = self.builder.build_alloca(IrType::I32, None)?;
        let remaining = self.builder.build_alloca(IrType::I32, None)?;
        self.builder
            .build_store(TypedValue::new(IrType::I32, Value::Int(1)), result.clone())?;
        self.builder
            .build_store(TypedValue::new(IrType::I32, exp.clone()), remaining.clone())?;

        let negative_bb = self.builder.append_block("ipow.neg")?;
        let cond_bb = self.builder.append_block("ipow.cond")?;
        let body_bb = self.builder.append_block("ipow.body")?;
        let end_bb = self.builder.append_block("ipow.end")?;
        let is_negative = self
            .builder
            .build_icmp(CmpOp::Lt, IrType::I32, exp, Value::Int(0))?;
        self.builder.build_cond_br(is_negative, negative_bb, cond_bb)?;

        self.builder.position_at_end(negative_bb)?;
        self.builder
            .build_ret(Some(TypedValue::new(IrType::I32, Value::Int(0))))?;

        self.builder.position_at_end(cond_bb)?;
        let n = self.builder.build_load(IrType::I32, remaining.clone())?;
        let more = self
            .builder
            .build_icmp(CmpOp::Gt, IrType::I32, n.clone(), Value::Int(0))?;
        self.builder.build_cond_br(more, body_bb, end_bb)?;

        self.builder.position_at_end(body_bb)?;
        let acc = self.builder.build_load(IrType::I32, result.clone())?;
        let product = self.builder.build_binary(BinOp::Mul, IrType::I32, acc, base)?;
        self.builder
            .build_store(TypedValue::new(IrType::I32, product), result.clone())?;
        let decremented = self.builder.build_binary(BinOp::Sub, IrType::I32, n, Value::Int(1))?;
        self.builder
            .build_store(TypedValue::new(IrType::I32, decremented), remaining)?;
        self.builder.build_br(cond_bb)?;

        self.builder.position_at_end(end_bb)?;
        let value = self.builder.build_load(IrType::I32, result)?;
        self.builder
            .build_ret(Some(TypedValue::new(IrType::I32, value)))?;
        self.builder.finish_function()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hash_of_known_keys() {
        assert_eq!(internal_hash(""), 5381);
        // 5381 * 33 + 'a'
        assert_eq!(internal_hash("a"), 177670);
        assert_eq!(internal_hash("a\0ignored"), internal_hash("a"));
    }

    #[test]
    fn test_helpers_are_emitted_once() {
        let mut generator = CodeGenerator::new("m");
        generator.ensure_hash_function().unwrap();
        generator.ensure_hash_function().unwrap();
        generator.ensure_ipow_function().unwrap();
        generator.ensure_malloc();
        generator.ensure_malloc();
        let module = generator.into_module().unwrap();
        let count = |name: &str| module.functions.iter().filter(|f| f.name == name).count();
        assert_eq!(count(HASH_FN), 1);
        assert_eq!(count(IPOW_FN), 1);
        assert_eq!(count(MALLOC_FN), 1);
        let hash = module.function(HASH_FN).unwrap();
        assert!(hash.blocks.iter().all(|b| b.is_terminated()));
    }

    proptest! {
        #[test]
        fn hash_matches_wrapping_i32_arithmetic(key in "[a-zA-Z0-9_]{0,24}") {
            let mut expected: i32 = 5381;
            for b in key.bytes() {
                expected = expected.wrapping_mul(33).wrapping_add(b as i32);
            }
            prop_assert_eq!(internal_hash(&key), expected as u32);
        }
    }
}
