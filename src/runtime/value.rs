use std::fmt;

use super::error::{RuntimeFault, RuntimeResult};
use super::matrix::{Matrix, checked_index};
use crate::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Array(Vec<Value>),
    Matrix(Matrix),
    Void,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Array(_) => "array",
            Value::Matrix(_) => "matrix",
            Value::Void => "void",
        }
    }

    pub fn as_int(&self) -> RuntimeResult<i64> {
        match self {
            Value::Int(value) => Ok(*value),
            other => Err(other.unexpected("int")),
        }
    }

    /// Numeric value as a float; ints convert.
    pub fn as_float(&self) -> RuntimeResult<f64> {
        match self {
            Value::Int(value) => Ok(*value as f64),
            Value::Float(value) => Ok(*value),
            other => Err(other.unexpected("number")),
        }
    }

    pub fn as_bool(&self) -> RuntimeResult<bool> {
        match self {
            Value::Bool(value) => Ok(*value),
            other => Err(other.unexpected("boolean")),
        }
    }

    pub fn as_array(&self) -> RuntimeResult<&[Value]> {
        match self {
            Value::Array(values) => Ok(values),
            other => Err(other.unexpected("array")),
        }
    }

    pub fn as_matrix(&self) -> RuntimeResult<&Matrix> {
        match self {
            Value::Matrix(matrix) => Ok(matrix),
            other => Err(other.unexpected("matrix")),
        }
    }

    fn unexpected(&self, expected: &'static str) -> RuntimeFault {
        RuntimeFault::UnexpectedValue {
            expected,
            found: self.type_name(),
        }
    }

    /// `self[row]` for arrays, `self[row][col]` for matrices.
    pub fn load_index(&self, row: i64, col: Option<i64>) -> RuntimeResult<Value> {
        match (self, col) {
            (Value::Array(values), None) => {
                let index = checked_index(row, values.len())?;
                Ok(values[index].clone())
            }
            (Value::Matrix(matrix), Some(col)) => Ok(Value::Float(matrix.get(row, col)?)),
            (Value::Matrix(_), None) => Err(RuntimeFault::UnexpectedValue {
                expected: "row and column index",
                found: "single index",
            }),
            (other, _) => Err(other.unexpected("array")),
        }
    }

    pub fn store_index(&mut self, row: i64, col: Option<i64>, value: Value) -> RuntimeResult<()> {
        match (self, col) {
            (Value::Array(values), None) => {
                let index = checked_index(row, values.len())?;
                values[index] = value;
                Ok(())
            }
            (Value::Matrix(matrix), Some(col)) => matrix.set(row, col, value.as_float()?),
            (Value::Matrix(_), None) => Err(RuntimeFault::UnexpectedValue {
                expected: "row and column index",
                found: "single index",
            }),
            (other, _) => Err(other.unexpected("array")),
        }
    }

    /// Converts one line of external input to the declared type of its target.
    pub fn parse_input(text: &str, ty: &Type) -> RuntimeResult<Value> {
        let trimmed = text.trim();
        let invalid = || RuntimeFault::InvalidInput {
            text: trimmed.to_string(),
            expected: ty.clone(),
        };
        match ty {
            Type::Int => trimmed.parse().map(Value::Int).map_err(|_| invalid()),
            Type::Float => trimmed.parse().map(Value::Float).map_err(|_| invalid()),
            Type::Bool => match trimmed {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
            Type::Str => Ok(Value::Str(text.trim_end_matches(['\r', '\n']).to_string())),
            _ => Err(invalid()),
        }
    }
}

/// Floats always show a fractional part so they read differently from ints.
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => f.write_str(&format_float(*value)),
            Value::Str(value) => f.write_str(value),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Array(values) => {
                let rendered = values
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{rendered}]")
            }
            Value::Matrix(matrix) => write!(f, "{matrix}"),
            Value::Void => f.write_str("void"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_values_for_output() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Float(-0.0).to_string(), "-0.0");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Str("a".to_string())]).to_string(),
            "[1, a]"
        );
    }

    #[test]
    fn parses_input_by_declared_type() {
        assert_eq!(Value::parse_input("42\n", &Type::Int), Ok(Value::Int(42)));
        assert_eq!(Value::parse_input(" 1.5 ", &Type::Float), Ok(Value::Float(1.5)));
        assert_eq!(
            Value::parse_input("hello world\n", &Type::Str),
            Ok(Value::Str("hello world".to_string()))
        );
        assert!(matches!(
            Value::parse_input("abc", &Type::Int),
            Err(RuntimeFault::InvalidInput { .. })
        ));
    }

    #[test]
    fn bounds_checks_array_access() {
        let mut array = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(array.load_index(1, None), Ok(Value::Int(2)));
        assert_eq!(
            array.store_index(2, None, Value::Int(3)),
            Err(RuntimeFault::IndexOutOfBounds { index: 2, len: 2 })
        );
    }
}
