//! Runtime values and the arithmetic shared by the VM and the constant folder.
//!
//! Both consumers go through [`binary`] and [`unary`], so a folded constant is
//! always the value the VM would have computed.
pub mod error;
pub mod matrix;
pub mod value;

pub use error::{RuntimeFault, RuntimeResult};
pub use matrix::Matrix;
pub use value::Value;

use crate::ast::BinaryOperator;
use crate::ir::UnaryOp;

pub fn binary(op: BinaryOperator, left: &Value, right: &Value) -> RuntimeResult<Value> {
    use BinaryOperator::*;

    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_binary(op, *a, *b),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            float_binary(op, left.as_float()?, right.as_float()?)
        }
        (Value::Str(a), Value::Str(b)) => match op {
            Add => Ok(Value::Str(format!("{a}{b}"))),
            Eq => Ok(Value::Bool(a == b)),
            Ne => Ok(Value::Bool(a != b)),
            Lt => Ok(Value::Bool(a < b)),
            Le => Ok(Value::Bool(a <= b)),
            Gt => Ok(Value::Bool(a > b)),
            Ge => Ok(Value::Bool(a >= b)),
            _ => Err(invalid_operands(op, left, right)),
        },
        (Value::Bool(a), Value::Bool(b)) => match op {
            And => Ok(Value::Bool(*a && *b)),
            Or => Ok(Value::Bool(*a || *b)),
            Eq => Ok(Value::Bool(a == b)),
            Ne => Ok(Value::Bool(a != b)),
            _ => Err(invalid_operands(op, left, right)),
        },
        (Value::Matrix(a), Value::Matrix(b)) => match op {
            Add => Ok(Value::Matrix(a.zip_with(b, "+", |x, y| x + y)?)),
            Sub => Ok(Value::Matrix(a.zip_with(b, "-", |x, y| x - y)?)),
            Mul => Ok(Value::Matrix(a.multiply(b)?)),
            _ => Err(invalid_operands(op, left, right)),
        },
        (Value::Matrix(m), Value::Int(_) | Value::Float(_)) => match op {
            Mul => {
                let k = right.as_float()?;
                Ok(Value::Matrix(m.map(|x| x * k)))
            }
            Div => {
                let k = right.as_float()?;
                if k == 0.0 {
                    return Err(RuntimeFault::DivisionByZero);
                }
                Ok(Value::Matrix(m.map(|x| x / k)))
            }
            Pow => Ok(Value::Matrix(m.power(right.as_int()?)?)),
            _ => Err(invalid_operands(op, left, right)),
        },
        (Value::Int(_) | Value::Float(_), Value::Matrix(m)) if op == Mul => {
            let k = left.as_float()?;
            Ok(Value::Matrix(m.map(|x| k * x)))
        }
        _ => Err(invalid_operands(op, left, right)),
    }
}

fn int_binary(op: BinaryOperator, a: i64, b: i64) -> RuntimeResult<Value> {
    use BinaryOperator::*;

    let value = match op {
        Add => Value::Int(a.wrapping_add(b)),
        Sub => Value::Int(a.wrapping_sub(b)),
        Mul => Value::Int(a.wrapping_mul(b)),
        Div => {
            if b == 0 {
                return Err(RuntimeFault::DivisionByZero);
            }
            Value::Int(a.wrapping_div(b))
        }
        Mod => {
            if b == 0 {
                return Err(RuntimeFault::ModuloByZero);
            }
            Value::Int(a.wrapping_rem(b))
        }
        Pow => {
            if b < 0 {
                return Err(RuntimeFault::NegativeExponent { exponent: b });
            }
            let exponent = u32::try_from(b).unwrap_or(u32::MAX);
            Value::Int(a.wrapping_pow(exponent))
        }
        Eq => Value::Bool(a == b),
        Ne => Value::Bool(a != b),
        Lt => Value::Bool(a < b),
        Le => Value::Bool(a <= b),
        Gt => Value::Bool(a > b),
        Ge => Value::Bool(a >= b),
        And | Or => {
            return Err(RuntimeFault::InvalidOperands {
                op: op.symbol(),
                left: "int",
                right: "int",
            });
        }
    };
    Ok(value)
}

fn float_binary(op: BinaryOperator, a: f64, b: f64) -> RuntimeResult<Value> {
    use BinaryOperator::*;

    let value = match op {
        Add => Value::Float(a + b),
        Sub => Value::Float(a - b),
        Mul => Value::Float(a * b),
        Div => {
            if b == 0.0 {
                return Err(RuntimeFault::DivisionByZero);
            }
            Value::Float(a / b)
        }
        Mod => {
            if b == 0.0 {
                return Err(RuntimeFault::ModuloByZero);
            }
            Value::Float(a % b)
        }
        Pow => Value::Float(a.powf(b)),
        Eq => Value::Bool(a == b),
        Ne => Value::Bool(a != b),
        Lt => Value::Bool(a < b),
        Le => Value::Bool(a <= b),
        Gt => Value::Bool(a > b),
        Ge => Value::Bool(a >= b),
        And | Or => {
            return Err(RuntimeFault::InvalidOperands {
                op: op.symbol(),
                left: "number",
                right: "number",
            });
        }
    };
    Ok(value)
}

pub fn unary(op: UnaryOp, operand: &Value) -> RuntimeResult<Value> {
    match (op, operand) {
        (UnaryOp::Neg, Value::Int(value)) => Ok(Value::Int(value.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(value)) => Ok(Value::Float(-value)),
        (UnaryOp::Neg, Value::Matrix(matrix)) => Ok(Value::Matrix(matrix.map(|x| -x))),
        (UnaryOp::Not, Value::Bool(value)) => Ok(Value::Bool(!value)),
        (UnaryOp::ToFloat, Value::Int(_) | Value::Float(_)) => {
            Ok(Value::Float(operand.as_float()?))
        }
        (UnaryOp::Transpose, Value::Matrix(matrix)) => Ok(Value::Matrix(matrix.transpose())),
        (op, other) => Err(RuntimeFault::UnexpectedValue {
            expected: op.operand_kind(),
            found: other.type_name(),
        }),
    }
}

/// Whether evaluating `op` on these operands could fault. Used to decide
/// which unused computations are safe to drop.
pub fn may_fault(op: BinaryOperator, left: &Value, right: &Value) -> bool {
    binary(op, left, right).is_err()
}

fn invalid_operands(op: BinaryOperator, left: &Value, right: &Value) -> RuntimeFault {
    RuntimeFault::InvalidOperands {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_truncates_and_wraps() {
        assert_eq!(
            binary(BinaryOperator::Div, &Value::Int(-7), &Value::Int(2)),
            Ok(Value::Int(-3))
        );
        assert_eq!(
            binary(BinaryOperator::Mod, &Value::Int(-7), &Value::Int(2)),
            Ok(Value::Int(-1))
        );
        assert_eq!(
            binary(BinaryOperator::Add, &Value::Int(i64::MAX), &Value::Int(1)),
            Ok(Value::Int(i64::MIN))
        );
    }

    #[test]
    fn mixed_operands_produce_floats() {
        assert_eq!(
            binary(BinaryOperator::Div, &Value::Int(7), &Value::Float(2.0)),
            Ok(Value::Float(3.5))
        );
        assert_eq!(
            binary(BinaryOperator::Lt, &Value::Int(1), &Value::Float(1.5)),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn zero_divisors_fault() {
        assert_eq!(
            binary(BinaryOperator::Div, &Value::Int(5), &Value::Int(0)),
            Err(RuntimeFault::DivisionByZero)
        );
        assert_eq!(
            binary(BinaryOperator::Mod, &Value::Float(5.0), &Value::Int(0)),
            Err(RuntimeFault::ModuloByZero)
        );
        assert!(may_fault(BinaryOperator::Pow, &Value::Int(2), &Value::Int(-1)));
    }

    #[test]
    fn matrix_operations() {
        let m = Value::Matrix(Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]));
        assert_eq!(
            binary(BinaryOperator::Mul, &Value::Int(2), &m).map(|v| v.to_string()),
            Ok("[[2.0, 4.0], [6.0, 8.0]]".to_string())
        );
        assert_eq!(
            unary(UnaryOp::Transpose, &m).map(|v| v.to_string()),
            Ok("[[1.0, 3.0], [2.0, 4.0]]".to_string())
        );
        assert_eq!(
            binary(BinaryOperator::Pow, &m, &Value::Int(2)).map(|v| v.to_string()),
            Ok("[[7.0, 10.0], [15.0, 22.0]]".to_string())
        );
    }
}
