//! Strength reduction for operations with a cheaper identical form.
use rustc_hash::FxHashSet;

use crate::ast::BinaryOperator;
use crate::ir::{CallTarget, Constant, Instruction, Opcode, Operand, Place, UnaryOp};

pub fn run(code: &mut [Instruction]) -> usize {
    let mut scalars = Scalars::default();
    let mut reductions = 0;
    for instruction in code.iter_mut() {
        let reduced = match &instruction.op {
            Opcode::Binary {
                op, left, right, ..
            } if left.as_const().is_none() || right.as_const().is_none() => {
                reduce(*op, left, right, &scalars)
            }
            _ => None,
        };
        scalars.record(&instruction.op);
        let Some(reduced) = reduced else {
            continue;
        };
        let Opcode::Binary { dest, .. } = &instruction.op else {
            continue;
        };
        instruction.op = match reduced {
            Reduced::Copy(src) => Opcode::Copy {
                dest: dest.clone(),
                src,
            },
            Reduced::Binary(op, left, right) => Opcode::Binary {
                dest: dest.clone(),
                op,
                left,
                right,
            },
        };
        reductions += 1;
    }
    reductions
}

/// Places known to hold an int or float, tracked within a basic block.
/// Variable facts are dropped at calls since the callee may write globals.
#[derive(Debug, Default)]
struct Scalars {
    places: FxHashSet<Place>,
    return_slot: bool,
}

impl Scalars {
    fn holds(&self, operand: &Operand) -> bool {
        match operand {
            Operand::Const(constant) => matches!(constant, Constant::Int(_) | Constant::Float(_)),
            Operand::ReturnSlot => self.return_slot,
            other => other
                .as_place()
                .is_some_and(|place| self.places.contains(&place)),
        }
    }

    fn record(&mut self, op: &Opcode) {
        use BinaryOperator::*;

        let scalar = match op {
            Opcode::Label(_) => {
                self.places.clear();
                self.return_slot = false;
                return;
            }
            Opcode::Call { target, .. } => {
                self.places.retain(Place::is_temp);
                self.return_slot = match target {
                    CallTarget::Builtin(builtin) => builtin.return_type().is_numeric(),
                    CallTarget::User(_) => false,
                };
                return;
            }
            op if op.ends_block() => {
                self.places.clear();
                return;
            }
            Opcode::Assign { value, .. } => {
                matches!(value, Constant::Int(_) | Constant::Float(_))
            }
            Opcode::Copy { src, .. } => self.holds(src),
            Opcode::Input { ty, .. } => ty.is_numeric(),
            Opcode::Unary { op, operand, .. } => match op {
                UnaryOp::ToFloat => true,
                UnaryOp::Neg => self.holds(operand),
                UnaryOp::Not | UnaryOp::Transpose => false,
            },
            Opcode::Binary {
                op, left, right, ..
            } => {
                matches!(op, Add | Sub | Mul | Div | Mod | Pow)
                    && self.holds(left)
                    && self.holds(right)
            }
            Opcode::LoadIndex { col, .. } => col.is_some(),
            _ => false,
        };
        if let Some(dest) = op.dest() {
            if scalar {
                self.places.insert(dest.clone());
            } else {
                self.places.remove(dest);
            }
        } else if let Opcode::StoreIndex { base, .. } = op {
            self.places.remove(base);
        }
    }
}

enum Reduced {
    Copy(Operand),
    Binary(BinaryOperator, Operand, Operand),
}

fn is_int(operand: &Operand, value: i64) -> bool {
    matches!(operand.as_const(), Some(Constant::Int(v)) if *v == value)
}

/// `2^-k` for a float literal `2^k`, when both are exact.
fn reciprocal_power_of_two(operand: &Operand) -> Option<f64> {
    let Some(Constant::Float(value)) = operand.as_const() else {
        return None;
    };
    let exponent = value.log2();
    let exact = value.is_finite()
        && *value > 0.0
        && exponent.fract() == 0.0
        && exponent.abs() <= 64.0
        && 2f64.powi(exponent as i32) == *value;
    exact.then(|| 2f64.powi(-(exponent as i32)))
}

/// `x^2` on a matrix checks squareness first, so it is only reduced when
/// `x` is known to be a number.
fn reduce(
    op: BinaryOperator,
    left: &Operand,
    right: &Operand,
    scalars: &Scalars,
) -> Option<Reduced> {
    use BinaryOperator::*;

    match op {
        Mul if is_int(right, 1) => Some(Reduced::Copy(left.clone())),
        Mul if is_int(left, 1) => Some(Reduced::Copy(right.clone())),
        Div if is_int(right, 1) => Some(Reduced::Copy(left.clone())),
        Mul if is_int(right, 2) => Some(Reduced::Binary(Add, left.clone(), left.clone())),
        Mul if is_int(left, 2) => Some(Reduced::Binary(Add, right.clone(), right.clone())),
        Pow if is_int(right, 2) && scalars.holds(left) => {
            Some(Reduced::Binary(Mul, left.clone(), left.clone()))
        }
        Div => reciprocal_power_of_two(right).map(|factor| {
            Reduced::Binary(Mul, left.clone(), Operand::Const(Constant::Float(factor)))
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Place;

    fn binary(op: BinaryOperator, left: Operand, right: Operand) -> Instruction {
        Instruction::new(
            Opcode::Binary {
                dest: Place::Temp(9),
                op,
                left,
                right,
            },
            1,
        )
    }

    fn reduced(op: BinaryOperator, left: Operand, right: Operand) -> String {
        let mut code = vec![binary(op, left, right)];
        run(&mut code);
        code[0].op.to_string()
    }

    #[test]
    fn rewrites_cheaper_forms() {
        let x = Operand::Temp(0);
        let int = |v| Operand::Const(Constant::Int(v));
        let float = |v| Operand::Const(Constant::Float(v));
        assert_eq!(reduced(BinaryOperator::Mul, x.clone(), int(1)), "t9 = t0");
        assert_eq!(reduced(BinaryOperator::Mul, int(2), x.clone()), "t9 = t0 + t0");
        assert_eq!(reduced(BinaryOperator::Div, x.clone(), float(4.0)), "t9 = t0 * 0.25");
    }

    #[test]
    fn keeps_inexact_or_type_changing_forms() {
        let x = Operand::Temp(0);
        let float = |v| Operand::Const(Constant::Float(v));
        let mut code = vec![
            binary(BinaryOperator::Mul, x.clone(), Operand::Const(Constant::Int(0))),
            binary(BinaryOperator::Mul, x.clone(), float(1.0)),
            binary(BinaryOperator::Div, x.clone(), float(3.0)),
            binary(BinaryOperator::Div, x, Operand::Const(Constant::Int(4))),
        ];
        assert_eq!(run(&mut code), 0);
    }

    #[test]
    fn squares_only_known_numbers() {
        let define = |value| {
            Instruction::new(
                Opcode::Input {
                    dest: Place::Temp(0),
                    ty: value,
                },
                1,
            )
        };
        let square = || {
            binary(
                BinaryOperator::Pow,
                Operand::Temp(0),
                Operand::Const(Constant::Int(2)),
            )
        };

        let mut numbers = vec![define(crate::types::Type::Float), square()];
        assert_eq!(run(&mut numbers), 1);
        assert_eq!(numbers[1].op.to_string(), "t9 = t0 * t0");

        let mut unknown = vec![square()];
        assert_eq!(run(&mut unknown), 0);

        let mut matrix = vec![
            Instruction::new(
                Opcode::NewMatrix {
                    dest: Place::Temp(0),
                    rows: 1,
                    cols: 3,
                },
                1,
            ),
            square(),
        ];
        assert_eq!(run(&mut matrix), 0);
    }

    #[test]
    fn scalar_facts_end_at_labels() {
        let mut code = vec![
            Instruction::new(
                Opcode::Assign {
                    dest: Place::Temp(0),
                    value: Constant::Int(3),
                },
                1,
            ),
            Instruction::new(Opcode::Label(crate::ir::LabelId::Local(0)), 1),
            binary(
                BinaryOperator::Pow,
                Operand::Temp(0),
                Operand::Const(Constant::Int(2)),
            ),
        ];
        assert_eq!(run(&mut code), 0);
    }
}
