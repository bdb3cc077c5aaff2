use std::fmt;

/// ZynLang 的表层类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int,
    Float,
    Bool,
    Str,
    Dict,
    Array(Box<Type>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub return_type: Type,
    pub variadic: bool,
}

impl Type {
    /// 根据类型关键字解析类型，未知名称返回 None
    pub fn from_name(name: &str) -> Option<Type> {
        let ty = match name {
            "int" => Type::Int,
            "float" => Type::Float,
            "bool" => Type::Bool,
            "str" => Type::Str,
            "void" => Type::Void,
            "dict" => Type::Dict,
            "arr_int" => Type::Array(Box::new(Type::Int)),
            "arr_float" => Type::Array(Box::new(Type::Float)),
            "arr_bool" => Type::Array(Box::new(Type::Bool)),
            "arr_str" => Type::Array(Box::new(Type::Str)),
            _ => return None,
        };
        Some(ty)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn array_of(element: Type) -> Type {
        Type::Array(Box::new(element))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::Str => write!(f, "str"),
            Type::Dict => write!(f, "dict"),
            Type::Array(inner) => write!(f, "arr_{}", inner),
        }
    }
}
