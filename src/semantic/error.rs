use thiserror::Error;

use crate::types::Type;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("'{name}' is already declared in this scope (line {previous_line})")]
    Redeclaration { name: String, previous_line: usize },
    #[error("Undeclared variable '{name}'")]
    UndeclaredVariable { name: String },
    #[error("Undeclared function '{name}'")]
    UndeclaredFunction { name: String },
    #[error("'{name}' is a function, not a variable")]
    NotAVariable { name: String },
    #[error("'{name}' is a variable, not a function")]
    NotAFunction { name: String },
    #[error("Functions can only be declared at the top level ('{name}')")]
    NestedFunction { name: String },
    #[error("Variable '{name}' cannot have type void")]
    VoidVariable { name: String },
    #[error("Operator '{op}' cannot be applied to {left} and {right}")]
    InvalidOperands {
        op: &'static str,
        left: Type,
        right: Type,
    },
    #[error("Operator '{op}' cannot be applied to {operand}")]
    InvalidOperand { op: &'static str, operand: Type },
    #[error("Cannot assign {found} to '{name}' of type {expected}")]
    AssignMismatch {
        name: String,
        expected: Type,
        found: Type,
    },
    #[error("Condition of '{construct}' must be boolean, found {found}")]
    ConditionNotBoolean {
        construct: &'static str,
        found: Type,
    },
    #[error("Repeat count must be int, found {found}")]
    RepeatCountNotInt { found: Type },
    #[error("Function '{name}' expects {expected} arguments, got {found}")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Argument {position} of '{name}' must be {expected}, found {found}")]
    ArgumentType {
        name: String,
        position: usize,
        expected: String,
        found: Type,
    },
    #[error("'return' outside of a function")]
    ReturnOutsideFunction,
    #[error("Function '{name}' must return {expected}, found {found}")]
    ReturnTypeMismatch {
        name: String,
        expected: Type,
        found: Type,
    },
    #[error("Function '{name}' must return a value of type {expected}")]
    MissingReturnValue { name: String, expected: Type },
    #[error("Function '{name}' returns void and cannot return a value")]
    UnexpectedReturnValue { name: String },
    #[error("'{keyword}' outside of a loop")]
    LoopControlOutsideLoop { keyword: &'static str },
    #[error("Cannot index into {found}")]
    NotIndexable { found: Type },
    #[error("Index must be int, found {found}")]
    IndexNotInt { found: Type },
    #[error("Matrix elements are accessed as m[row][col]")]
    MatrixIndexArity,
    #[error("Array elements take a single index")]
    ArrayIndexArity,
    #[error("Matrix literal rows must all have {expected} elements, row {row} has {found}")]
    RaggedMatrix {
        expected: usize,
        row: usize,
        found: usize,
    },
    #[error("Matrix elements must be numbers, found {found}")]
    NonNumericMatrixElement { found: Type },
    #[error("Array elements must share one type, found {expected} and {found}")]
    MixedArrayElements { expected: Type, found: Type },
    #[error("Cannot read input into '{name}' of type {found}")]
    InputTarget { name: String, found: Type },
    #[error("Expression has no value")]
    VoidValue,
    #[error("Variable '{name}' is declared but never used")]
    UnusedVariable { name: String },
}
