//! 表层类型到 IR 类型的映射
use crate::ir::IrType;
use crate::types::Type;

/// 字符串、字典和数组都以指针表示
pub fn ir_type(ty: &Type) -> IrType {
    match ty {
        Type::Void => IrType::Void,
        Type::Int => IrType::I32,
        Type::Float => IrType::Double,
        Type::Bool => IrType::I1,
        Type::Str | Type::Dict | Type::Array(_) => IrType::Ptr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_types_map_to_ir() {
        assert_eq!(ir_type(&Type::Int), IrType::I32);
        assert_eq!(ir_type(&Type::Float), IrType::Double);
        assert_eq!(ir_type(&Type::Bool), IrType::I1);
        assert_eq!(ir_type(&Type::Str), IrType::Ptr);
        assert_eq!(ir_type(&Type::array_of(Type::Float)), IrType::Ptr);
        assert_eq!(ir_type(&Type::Dict), IrType::Ptr);
        assert_eq!(ir_type(&Type::Void), IrType::Void);
    }
}
