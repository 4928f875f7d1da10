//! Constant folding through the runtime's own arithmetic.
use tracing::trace;

use crate::ir::{Constant, Instruction, Opcode};
use crate::runtime::{self, RuntimeResult, Value};

/// Replaces every all-literal operation with its result. Operations that
/// would fault are left for the VM to report.
pub fn run(code: &mut [Instruction]) -> usize {
    let mut folds = 0;
    for instruction in code.iter_mut() {
        let result = match &instruction.op {
            Opcode::Binary {
                op, left, right, ..
            } => match (left.as_const(), right.as_const()) {
                (Some(left), Some(right)) => {
                    Some(runtime::binary(*op, &left.to_value(), &right.to_value()))
                }
                _ => None,
            },
            Opcode::Unary { op, operand, .. } => operand
                .as_const()
                .map(|operand| runtime::unary(*op, &operand.to_value())),
            _ => None,
        };
        let Some(value) = result.and_then(|result| fold_result(result, instruction.line)) else {
            continue;
        };
        let Some(dest) = instruction.op.dest().cloned() else {
            continue;
        };
        instruction.op = Opcode::Assign { dest, value };
        folds += 1;
    }
    folds
}

fn fold_result(result: RuntimeResult<Value>, line: usize) -> Option<Constant> {
    match result {
        Ok(value) => Constant::from_value(&value),
        Err(fault) => {
            trace!(line, %fault, "fold skipped");
            None
        }
    }
}
