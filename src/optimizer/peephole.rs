//! Local rewrites over short instruction windows.
use crate::ir::{Constant, Instruction, Opcode, Operand, Place};

use super::TempUsage;

pub fn run(code: &mut Vec<Instruction>) -> usize {
    constant_branches(code) + jumps_to_next(code) + self_copies(code) + collapse_copies(code)
}

/// `if_false true` never jumps; `if_false false` always does.
fn constant_branches(code: &mut Vec<Instruction>) -> usize {
    let mut rewrites = 0;
    code.retain_mut(|instruction| {
        let Opcode::JumpIfFalse {
            cond: Operand::Const(Constant::Bool(cond)),
            target,
        } = &instruction.op
        else {
            return true;
        };
        rewrites += 1;
        if *cond {
            return false;
        }
        instruction.op = Opcode::Jump(target.clone());
        true
    });
    rewrites
}

/// A jump whose target label follows it (possibly among other labels).
fn jumps_to_next(code: &mut Vec<Instruction>) -> usize {
    let redundant: Vec<usize> = (0..code.len())
        .filter(|&index| {
            let Opcode::Jump(target) = &code[index].op else {
                return false;
            };
            code[index + 1..]
                .iter()
                .map_while(|next| match &next.op {
                    Opcode::Label(label) => Some(label),
                    _ => None,
                })
                .any(|label| label == target)
        })
        .collect();
    remove_indices(code, &redundant)
}

fn self_copies(code: &mut Vec<Instruction>) -> usize {
    let before = code.len();
    code.retain(|instruction| {
        !matches!(&instruction.op, Opcode::Copy { dest, src } if src.is_place(dest))
    });
    before - code.len()
}

/// `t = <expr>; v = t` becomes `v = <expr>` when `t` is defined and read
/// exactly once.
fn collapse_copies(code: &mut Vec<Instruction>) -> usize {
    let usage = TempUsage::scan(code);
    let mut collapsed = Vec::new();
    let mut index = 0;
    while index + 1 < code.len() {
        let Some(&Place::Temp(temp)) = code[index].op.dest() else {
            index += 1;
            continue;
        };
        let Opcode::Copy {
            dest: dest @ Place::Var(_),
            src: Operand::Temp(src),
        } = &code[index + 1].op
        else {
            index += 1;
            continue;
        };
        if *src != temp || usage.defs(temp) != 1 || usage.reads(temp) != 1 {
            index += 1;
            continue;
        }
        let dest = dest.clone();
        if let Some(slot) = code[index].op.dest_mut() {
            *slot = dest;
        }
        collapsed.push(index + 1);
        index += 2;
    }
    remove_indices(code, &collapsed)
}

fn remove_indices(code: &mut Vec<Instruction>, indices: &[usize]) -> usize {
    let mut position = 0;
    let mut next = indices.iter().peekable();
    code.retain(|_| {
        let drop = next.peek().is_some_and(|&&index| index == position);
        if drop {
            next.next();
        }
        position += 1;
        !drop
    });
    indices.len()
}
