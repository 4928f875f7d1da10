//! Three-address code shared by lowering, the optimizer and the VM.
use std::fmt;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ast::{BinaryOperator, Storage};
use crate::builtins::BuiltinFunction;
use crate::runtime::Value;
use crate::types::Type;

pub mod lower;

pub use lower::lower;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("Label '{label}' is defined more than once")]
    DuplicateLabel { label: String },
    #[error("Jump to undefined label '{label}'")]
    UndefinedLabel { label: String },
    #[error("Name '{name}' on line {line} was never resolved")]
    Unresolved { name: String, line: usize },
    #[error("'{keyword}' on line {line} is outside of a loop")]
    LoopControlOutsideLoop { keyword: &'static str, line: usize },
    #[error("Call to '{name}' on line {line} produces no value")]
    VoidValue { name: String, line: usize },
    #[error("Unknown function '{name}' on line {line}")]
    UnknownFunction { name: String, line: usize },
}

impl IrError {
    /// Source line the error refers to, or 0 for whole-program errors.
    pub fn line(&self) -> usize {
        match self {
            IrError::DuplicateLabel { .. } | IrError::UndefinedLabel { .. } => 0,
            IrError::Unresolved { line, .. }
            | IrError::LoopControlOutsideLoop { line, .. }
            | IrError::VoidValue { line, .. }
            | IrError::UnknownFunction { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    /// Runtime slot name.
    pub name: String,
    pub storage: Storage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Constant {
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Int(value) => Value::Int(*value),
            Constant::Float(value) => Value::Float(*value),
            Constant::Str(value) => Value::Str(value.clone()),
            Constant::Bool(value) => Value::Bool(*value),
        }
    }

    /// Scalars only; containers are never materialized as literals.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(value) => Some(Constant::Int(*value)),
            Value::Float(value) => Some(Constant::Float(*value)),
            Value::Str(value) => Some(Constant::Str(value.clone())),
            Value::Bool(value) => Some(Constant::Bool(*value)),
            Value::Array(_) | Value::Matrix(_) | Value::Void => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Place {
    Temp(u32),
    Var(Variable),
}

impl Place {
    pub fn to_operand(&self) -> Operand {
        match self {
            Place::Temp(id) => Operand::Temp(*id),
            Place::Var(variable) => Operand::Var(variable.clone()),
        }
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Place::Temp(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Temp(u32),
    Var(Variable),
    Const(Constant),
    /// Value left by the most recent `return`.
    ReturnSlot,
}

impl Operand {
    pub fn as_const(&self) -> Option<&Constant> {
        match self {
            Operand::Const(constant) => Some(constant),
            _ => None,
        }
    }

    pub fn as_place(&self) -> Option<Place> {
        match self {
            Operand::Temp(id) => Some(Place::Temp(*id)),
            Operand::Var(variable) => Some(Place::Var(variable.clone())),
            Operand::Const(_) | Operand::ReturnSlot => None,
        }
    }

    pub fn is_place(&self, place: &Place) -> bool {
        match (self, place) {
            (Operand::Temp(a), Place::Temp(b)) => a == b,
            (Operand::Var(a), Place::Var(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    ToFloat,
    Transpose,
}

impl UnaryOp {
    pub fn operand_kind(self) -> &'static str {
        match self {
            UnaryOp::Neg => "number or matrix",
            UnaryOp::Not => "boolean",
            UnaryOp::ToFloat => "number",
            UnaryOp::Transpose => "matrix",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LabelId {
    Local(u32),
    Function(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    User(String),
    Builtin(BuiltinFunction),
}

impl CallTarget {
    pub fn name(&self) -> &str {
        match self {
            CallTarget::User(name) => name,
            CallTarget::Builtin(builtin) => builtin.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    Assign {
        dest: Place,
        value: Constant,
    },
    Copy {
        dest: Place,
        src: Operand,
    },
    Binary {
        dest: Place,
        op: BinaryOperator,
        left: Operand,
        right: Operand,
    },
    Unary {
        dest: Place,
        op: UnaryOp,
        operand: Operand,
    },
    Label(LabelId),
    Jump(LabelId),
    JumpIfFalse {
        cond: Operand,
        target: LabelId,
    },
    Param(Operand),
    Call {
        target: CallTarget,
        argc: usize,
    },
    Return(Option<Operand>),
    Print {
        value: Operand,
        newline: bool,
    },
    Input {
        dest: Place,
        ty: Type,
    },
    NewArray {
        dest: Place,
        len: usize,
    },
    NewMatrix {
        dest: Place,
        rows: usize,
        cols: usize,
    },
    LoadIndex {
        dest: Place,
        base: Operand,
        row: Operand,
        col: Option<Operand>,
    },
    StoreIndex {
        base: Place,
        row: Operand,
        col: Option<Operand>,
        value: Operand,
    },
    Halt,
}

impl Opcode {
    /// The place this instruction overwrites entirely.
    pub fn dest(&self) -> Option<&Place> {
        match self {
            Opcode::Assign { dest, .. }
            | Opcode::Copy { dest, .. }
            | Opcode::Binary { dest, .. }
            | Opcode::Unary { dest, .. }
            | Opcode::Input { dest, .. }
            | Opcode::NewArray { dest, .. }
            | Opcode::NewMatrix { dest, .. }
            | Opcode::LoadIndex { dest, .. } => Some(dest),
            _ => None,
        }
    }

    pub fn dest_mut(&mut self) -> Option<&mut Place> {
        match self {
            Opcode::Assign { dest, .. }
            | Opcode::Copy { dest, .. }
            | Opcode::Binary { dest, .. }
            | Opcode::Unary { dest, .. }
            | Opcode::Input { dest, .. }
            | Opcode::NewArray { dest, .. }
            | Opcode::NewMatrix { dest, .. }
            | Opcode::LoadIndex { dest, .. } => Some(dest),
            _ => None,
        }
    }

    /// Source operands, in evaluation order.
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Opcode::Copy { src, .. } => vec![src],
            Opcode::Binary { left, right, .. } => vec![left, right],
            Opcode::Unary { operand, .. } => vec![operand],
            Opcode::JumpIfFalse { cond, .. } => vec![cond],
            Opcode::Param(value) | Opcode::Print { value, .. } => vec![value],
            Opcode::Return(value) => value.iter().collect(),
            Opcode::LoadIndex { base, row, col, .. } => {
                let mut operands = vec![base, row];
                operands.extend(col);
                operands
            }
            Opcode::StoreIndex { row, col, value, .. } => {
                let mut operands = vec![row];
                operands.extend(col);
                operands.push(value);
                operands
            }
            _ => Vec::new(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Opcode::Copy { src, .. } => vec![src],
            Opcode::Binary { left, right, .. } => vec![left, right],
            Opcode::Unary { operand, .. } => vec![operand],
            Opcode::JumpIfFalse { cond, .. } => vec![cond],
            Opcode::Param(value) | Opcode::Print { value, .. } => vec![value],
            Opcode::Return(value) => value.iter_mut().collect(),
            Opcode::LoadIndex { base, row, col, .. } => {
                let mut operands = vec![base, row];
                operands.extend(col);
                operands
            }
            Opcode::StoreIndex { row, col, value, .. } => {
                let mut operands = vec![row];
                operands.extend(col);
                operands.push(value);
                operands
            }
            _ => Vec::new(),
        }
    }

    pub fn jump_target(&self) -> Option<&LabelId> {
        match self {
            Opcode::Jump(target) | Opcode::JumpIfFalse { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Control never falls through to the next instruction.
    pub fn ends_block(&self) -> bool {
        matches!(self, Opcode::Jump(_) | Opcode::Return(_) | Opcode::Halt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Opcode,
    pub line: usize,
}

impl Instruction {
    pub fn new(op: Opcode, line: usize) -> Self {
        Self { op, line }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    pub label: LabelId,
    pub params: Vec<Variable>,
    pub returns_value: bool,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub code: Vec<Instruction>,
    pub functions: Vec<FunctionInfo>,
}

impl Program {
    /// Maps every label to its instruction index, checking that each label
    /// is defined once and every jump target exists.
    pub fn resolve_labels(&self) -> Result<FxHashMap<LabelId, usize>, IrError> {
        let mut labels = FxHashMap::default();
        for (index, instruction) in self.code.iter().enumerate() {
            if let Opcode::Label(label) = &instruction.op
                && labels.insert(label.clone(), index).is_some()
            {
                return Err(IrError::DuplicateLabel {
                    label: label.to_string(),
                });
            }
        }
        for instruction in &self.code {
            if let Some(target) = instruction.op.jump_target()
                && !labels.contains_key(target)
            {
                return Err(IrError::UndefinedLabel {
                    label: target.to_string(),
                });
            }
        }
        for function in &self.functions {
            if !labels.contains_key(&function.label) {
                return Err(IrError::UndefinedLabel {
                    label: function.label.to_string(),
                });
            }
        }
        Ok(labels)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.iter().find(|function| function.name == name)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Str(value) => write!(f, "{value:?}"),
            other => write!(f, "{}", other.to_value()),
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Temp(id) => write!(f, "t{id}"),
            Place::Var(variable) => write!(f, "{variable}"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(id) => write!(f, "t{id}"),
            Operand::Var(variable) => write!(f, "{variable}"),
            Operand::Const(constant) => write!(f, "{constant}"),
            Operand::ReturnSlot => f.write_str("retval"),
        }
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelId::Local(id) => write!(f, "L{id}"),
            LabelId::Function(name) => write!(f, "fn_{name}"),
        }
    }
}

fn write_index(f: &mut fmt::Formatter<'_>, row: &Operand, col: &Option<Operand>) -> fmt::Result {
    write!(f, "[{row}]")?;
    if let Some(col) = col {
        write!(f, "[{col}]")?;
    }
    Ok(())
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Assign { dest, value } => write!(f, "{dest} = {value}"),
            Opcode::Copy { dest, src } => write!(f, "{dest} = {src}"),
            Opcode::Binary {
                dest,
                op,
                left,
                right,
            } => write!(f, "{dest} = {left} {} {right}", op.symbol()),
            Opcode::Unary { dest, op, operand } => match op {
                UnaryOp::Neg => write!(f, "{dest} = -{operand}"),
                UnaryOp::Not => write!(f, "{dest} = not {operand}"),
                UnaryOp::ToFloat => write!(f, "{dest} = to_float {operand}"),
                UnaryOp::Transpose => write!(f, "{dest} = {operand} ^t"),
            },
            Opcode::Label(label) => write!(f, "{label}:"),
            Opcode::Jump(label) => write!(f, "goto {label}"),
            Opcode::JumpIfFalse { cond, target } => write!(f, "if_false {cond} goto {target}"),
            Opcode::Param(value) => write!(f, "param {value}"),
            Opcode::Call { target, argc } => write!(f, "call {}, {argc}", target.name()),
            Opcode::Return(Some(value)) => write!(f, "return {value}"),
            Opcode::Return(None) => f.write_str("return"),
            Opcode::Print { value, newline } => {
                if *newline {
                    write!(f, "print {value}")
                } else {
                    write!(f, "print {value},")
                }
            }
            Opcode::Input { dest, ty } => write!(f, "input {dest} : {ty}"),
            Opcode::NewArray { dest, len } => write!(f, "{dest} = array[{len}]"),
            Opcode::NewMatrix { dest, rows, cols } => write!(f, "{dest} = matrix[{rows}x{cols}]"),
            Opcode::LoadIndex {
                dest,
                base,
                row,
                col,
            } => {
                write!(f, "{dest} = {base}")?;
                write_index(f, row, col)
            }
            Opcode::StoreIndex {
                base,
                row,
                col,
                value,
            } => {
                write!(f, "{base}")?;
                write_index(f, row, col)?;
                write!(f, " = {value}")
            }
            Opcode::Halt => f.write_str("halt"),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, instruction) in self.code.iter().enumerate() {
            if matches!(instruction.op, Opcode::Label(_)) {
                writeln!(f, "{}", instruction.op)?;
            } else {
                writeln!(f, "{index:4}  {}", instruction.op)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction(op: Opcode) -> Instruction {
        Instruction::new(op, 1)
    }

    #[test]
    fn resolves_labels_to_indices() {
        let program = Program {
            code: vec![
                instruction(Opcode::Jump(LabelId::Local(0))),
                instruction(Opcode::Label(LabelId::Local(0))),
                instruction(Opcode::Halt),
            ],
            functions: Vec::new(),
        };
        let labels = program.resolve_labels().expect("labels resolve");
        assert_eq!(labels.get(&LabelId::Local(0)), Some(&1));
    }

    #[test]
    fn rejects_missing_and_duplicate_labels() {
        let missing = Program {
            code: vec![instruction(Opcode::Jump(LabelId::Local(3)))],
            functions: Vec::new(),
        };
        assert_eq!(
            missing.resolve_labels(),
            Err(IrError::UndefinedLabel {
                label: "L3".to_string()
            })
        );

        let duplicate = Program {
            code: vec![
                instruction(Opcode::Label(LabelId::Function("f".to_string()))),
                instruction(Opcode::Label(LabelId::Function("f".to_string()))),
            ],
            functions: Vec::new(),
        };
        assert!(matches!(
            duplicate.resolve_labels(),
            Err(IrError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn renders_three_address_form() {
        let op = Opcode::Binary {
            dest: Place::Temp(3),
            op: BinaryOperator::Add,
            left: Operand::Var(Variable {
                name: "x".to_string(),
                storage: Storage::Global,
            }),
            right: Operand::Const(Constant::Float(2.0)),
        };
        assert_eq!(op.to_string(), "t3 = x + 2.0");
        let store = Opcode::StoreIndex {
            base: Place::Temp(1),
            row: Operand::Const(Constant::Int(0)),
            col: Some(Operand::Const(Constant::Int(1))),
            value: Operand::Const(Constant::Str("a".to_string())),
        };
        assert_eq!(store.to_string(), "t1[0][1] = \"a\"");
    }
}
