//! Dead-code elimination.
use rustc_hash::FxHashSet;

use crate::ast::BinaryOperator;
use crate::ir::{Instruction, LabelId, Opcode, Place};
use crate::runtime;

use super::TempUsage;

pub fn run(code: &mut Vec<Instruction>) -> usize {
    remove_unreachable(code) + remove_unused_labels(code) + remove_dead_temps(code)
}

/// Drops instructions between an unconditional transfer and the next label.
fn remove_unreachable(code: &mut Vec<Instruction>) -> usize {
    let before = code.len();
    let mut reachable = true;
    code.retain(|instruction| {
        if matches!(instruction.op, Opcode::Label(_)) {
            reachable = true;
            return true;
        }
        let keep = reachable;
        if instruction.op.ends_block() {
            reachable = false;
        }
        keep
    });
    before - code.len()
}

fn remove_unused_labels(code: &mut Vec<Instruction>) -> usize {
    let targets: FxHashSet<LabelId> = code
        .iter()
        .filter_map(|instruction| instruction.op.jump_target().cloned())
        .collect();
    let before = code.len();
    code.retain(|instruction| match &instruction.op {
        Opcode::Label(label @ LabelId::Local(_)) => targets.contains(label),
        _ => true,
    });
    before - code.len()
}

/// Removes side-effect-free definitions of temporaries nobody reads, until
/// no more fire.
fn remove_dead_temps(code: &mut Vec<Instruction>) -> usize {
    let mut removed = 0;
    loop {
        let usage = TempUsage::scan(code);
        let before = code.len();
        code.retain(|instruction| match instruction.op.dest() {
            Some(Place::Temp(id)) => usage.reads(*id) > 0 || !is_pure(&instruction.op),
            _ => true,
        });
        let pass = before - code.len();
        if pass == 0 {
            return removed;
        }
        removed += pass;
    }
}

/// Whether dropping the instruction can change behavior only through its
/// destination. Operations that might fault stay unless their operands
/// rule the fault out.
fn is_pure(op: &Opcode) -> bool {
    use BinaryOperator::*;

    match op {
        Opcode::Assign { .. }
        | Opcode::Copy { .. }
        | Opcode::Unary { .. }
        | Opcode::NewArray { .. }
        | Opcode::NewMatrix { .. } => true,
        Opcode::Binary {
            op, left, right, ..
        } => match (left.as_const(), right.as_const()) {
            (Some(left), Some(right)) => {
                !runtime::may_fault(*op, &left.to_value(), &right.to_value())
            }
            _ => matches!(op, Eq | Ne | Lt | Le | Gt | Ge | And | Or),
        },
        _ => false,
    }
}
