use thiserror::Error;

use crate::types::Type;

/// A fatal fault raised while executing a program.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeFault {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Modulo by zero")]
    ModuloByZero,
    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("Maximum call depth of {limit} exceeded")]
    StackDepthExceeded { limit: usize },
    #[error("Cannot convert input '{text}' to {expected}")]
    InvalidInput { text: String, expected: Type },
    #[error("Operator '{op}' cannot be applied to {left} and {right}")]
    InvalidOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("Expected {expected}, got {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Matrix shapes {left} and {right} are incompatible for '{op}'")]
    MatrixShapeMismatch {
        op: &'static str,
        left: String,
        right: String,
    },
    #[error("Matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("Matrix is singular and cannot be inverted")]
    SingularMatrix,
    #[error("Argument {value} is outside the domain of {function}")]
    DomainError { function: &'static str, value: f64 },
    #[error("{function} of an empty array")]
    EmptyArray { function: &'static str },
    #[error("{function} needs at least {needed} values, got {found}")]
    TooFewValues {
        function: &'static str,
        needed: usize,
        found: usize,
    },
    #[error("Negative exponent {exponent} in integer power")]
    NegativeExponent { exponent: i64 },
    #[error("Function '{function}' ended without returning a value")]
    MissingReturn { function: String },
    #[error("Input cancelled")]
    InputCancelled,
    #[error("Step limit of {limit} instructions exceeded")]
    StepLimitExceeded { limit: u64 },
    #[error("Unknown label '{label}'")]
    UnknownLabel { label: String },
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Undefined function '{name}'")]
    UndefinedFunction { name: String },
    #[error("Function '{name}' expected {expected} arguments, got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
}

pub type RuntimeResult<T> = Result<T, RuntimeFault>;
