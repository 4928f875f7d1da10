//! Constant propagation within basic blocks.
use rustc_hash::FxHashMap;

use crate::ir::{Constant, Instruction, Opcode, Operand, Place};

/// Replaces reads of places holding a known literal. Facts never survive a
/// label, and variable facts are dropped at calls since the callee may
/// write globals.
pub fn run(code: &mut [Instruction]) -> usize {
    let mut facts: FxHashMap<Place, Constant> = FxHashMap::default();
    let mut rewrites = 0;

    for instruction in code.iter_mut() {
        if matches!(instruction.op, Opcode::Label(_)) {
            facts.clear();
            continue;
        }

        for operand in instruction.op.operands_mut() {
            let known = operand.as_place().and_then(|place| facts.get(&place));
            if let Some(constant) = known {
                *operand = Operand::Const(constant.clone());
                rewrites += 1;
            }
        }

        if let Opcode::Copy {
            dest,
            src: Operand::Const(value),
        } = &instruction.op
        {
            instruction.op = Opcode::Assign {
                dest: dest.clone(),
                value: value.clone(),
            };
            rewrites += 1;
        }

        match &instruction.op {
            Opcode::Assign { dest, value } => {
                facts.insert(dest.clone(), value.clone());
            }
            Opcode::StoreIndex { base, .. } => {
                facts.remove(base);
            }
            Opcode::Call { .. } => facts.retain(|place, _| place.is_temp()),
            op if op.ends_block() => facts.clear(),
            op => {
                if let Some(dest) = op.dest() {
                    facts.remove(dest);
                }
            }
        }
    }
    rewrites
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOperator, Storage};
    use crate::builtins::BuiltinFunction;
    use crate::ir::{CallTarget, LabelId, Variable};

    fn global(name: &str) -> Place {
        Place::Var(Variable {
            name: name.to_string(),
            storage: Storage::Global,
        })
    }

    fn at(op: Opcode) -> Instruction {
        Instruction::new(op, 1)
    }

    fn rendered(code: &[Instruction]) -> Vec<String> {
        code.iter().map(|i| i.op.to_string()).collect()
    }

    #[test]
    fn propagates_until_redefinition() {
        let x = global("x");
        let mut code = vec![
            at(Opcode::Assign {
                dest: x.clone(),
                value: Constant::Int(4),
            }),
            at(Opcode::Binary {
                dest: Place::Temp(0),
                op: BinaryOperator::Mul,
                left: x.to_operand(),
                right: x.to_operand(),
            }),
            at(Opcode::Input {
                dest: x.clone(),
                ty: crate::types::Type::Int,
            }),
            at(Opcode::Print {
                value: x.to_operand(),
                newline: true,
            }),
        ];
        assert_eq!(run(&mut code), 2);
        assert_eq!(
            rendered(&code),
            vec!["x = 4", "t0 = 4 * 4", "input x : int", "print x"]
        );
    }

    #[test]
    fn drops_facts_at_labels_and_calls() {
        let x = global("x");
        let mut code = vec![
            at(Opcode::Assign {
                dest: x.clone(),
                value: Constant::Int(1),
            }),
            at(Opcode::Assign {
                dest: Place::Temp(0),
                value: Constant::Int(2),
            }),
            at(Opcode::Call {
                target: CallTarget::Builtin(BuiltinFunction::Pi),
                argc: 0,
            }),
            at(Opcode::Param(x.to_operand())),
            at(Opcode::Param(Operand::Temp(0))),
            at(Opcode::Label(LabelId::Local(0))),
            at(Opcode::Param(Operand::Temp(0))),
        ];
        assert_eq!(run(&mut code), 1);
        assert_eq!(
            rendered(&code)[3..],
            ["param x", "param 2", "L0:", "param t0"]
        );
    }

    #[test]
    fn turns_constant_copies_into_assignments() {
        let mut code = vec![
            at(Opcode::Assign {
                dest: Place::Temp(0),
                value: Constant::Str("hi".to_string()),
            }),
            at(Opcode::Copy {
                dest: global("s"),
                src: Operand::Temp(0),
            }),
        ];
        assert_eq!(run(&mut code), 2);
        assert_eq!(
            code[1].op,
            Opcode::Assign {
                dest: global("s"),
                value: Constant::Str("hi".to_string()),
            }
        );
    }
}
