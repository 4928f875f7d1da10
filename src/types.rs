use std::fmt;

use serde::Serialize;

/// Static type of an expression or declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Int,
    Float,
    Str,
    Bool,
    Array(Box<Type>),
    /// A matrix, with its shape when it is known statically.
    Matrix(Option<(usize, usize)>),
    Void,
    /// Produced after an error so that one mistake is reported once.
    Unknown,
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, Type::Matrix(_))
    }

    /// Element type for indexing, if the type can be indexed at all.
    pub fn element(&self) -> Option<Type> {
        match self {
            Type::Array(element) => Some((**element).clone()),
            Type::Matrix(_) => Some(Type::Float),
            Type::Unknown => Some(Type::Unknown),
            _ => None,
        }
    }

    /// Whether a value of type `source` may be stored where `self` is expected.
    /// The only implicit conversion is int to float.
    pub fn accepts(&self, source: &Type) -> bool {
        match (self, source) {
            (Type::Unknown, _) | (_, Type::Unknown) => true,
            (Type::Float, Type::Int) => true,
            (Type::Array(target), Type::Array(element)) => {
                target.is_unknown() || element.is_unknown() || target == element
            }
            (Type::Matrix(target), Type::Matrix(shape)) => {
                target.is_none() || shape.is_none() || target == shape
            }
            (target, source) => target == source,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Str => f.write_str("string"),
            Type::Bool => f.write_str("boolean"),
            Type::Array(element) if element.is_unknown() => f.write_str("array"),
            Type::Array(element) => write!(f, "array<{element}>"),
            Type::Matrix(Some((rows, cols))) => write!(f, "matrix[{rows}x{cols}]"),
            Type::Matrix(None) => f.write_str("matrix"),
            Type::Void => f.write_str("void"),
            Type::Unknown => f.write_str("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_widens_to_float_only() {
        assert!(Type::Float.accepts(&Type::Int));
        assert!(!Type::Int.accepts(&Type::Float));
        assert!(!Type::Str.accepts(&Type::Int));
    }

    #[test]
    fn unconstrained_containers_accept_any_shape() {
        let any_array = Type::Array(Box::new(Type::Unknown));
        assert!(any_array.accepts(&Type::Array(Box::new(Type::Int))));
        assert!(Type::Matrix(None).accepts(&Type::Matrix(Some((2, 2)))));
        assert!(!Type::Matrix(Some((2, 3))).accepts(&Type::Matrix(Some((3, 2)))));
        assert!(!Type::Array(Box::new(Type::Int)).accepts(&Type::Array(Box::new(Type::Str))));
    }

    #[test]
    fn renders_source_names() {
        assert_eq!(Type::Array(Box::new(Type::Float)).to_string(), "array<float>");
        assert_eq!(Type::Matrix(Some((2, 3))).to_string(), "matrix[2x3]");
        assert_eq!(Type::Bool.to_string(), "boolean");
    }
}
