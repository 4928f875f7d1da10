//! Lowering of an analyzed AST into three-address code.
use rustc_hash::FxHashMap;

use crate::ast::{self, Expr, ExprKind, FunctionDecl, Name, Stmt, StmtKind, UnaryOperator};
use crate::builtins::BuiltinFunction;
use crate::types::Type;

use super::{
    CallTarget, Constant, FunctionInfo, Instruction, IrError, LabelId, Opcode, Operand, Place,
    Program, UnaryOp, Variable,
};

type LowerResult<T> = Result<T, IrError>;

/// Lowers a program whose names and expressions were annotated by the
/// analyzer. Top-level code comes first and ends in `halt`; each function
/// body follows under its `fn_<name>` label.
pub fn lower(program: &ast::Program) -> LowerResult<Program> {
    let mut lowerer = Lowerer::new(program);

    for statement in &program.statements {
        if !matches!(statement.kind, StmtKind::FunctionDecl(_)) {
            lowerer.statement(statement)?;
        }
    }
    lowerer.emit(Opcode::Halt);

    for (function, statement) in program.functions() {
        lowerer.function(function, statement.line)?;
    }

    Ok(Program {
        code: lowerer.code,
        functions: lowerer.functions,
    })
}

#[derive(Debug, Clone)]
struct LoopLabels {
    continue_label: LabelId,
    break_label: LabelId,
}

#[derive(Debug, Clone)]
struct Signature {
    params: Vec<Type>,
    returns: Type,
}

struct Lowerer {
    code: Vec<Instruction>,
    functions: Vec<FunctionInfo>,
    signatures: FxHashMap<String, Signature>,
    loops: Vec<LoopLabels>,
    return_type: Option<Type>,
    next_temp: u32,
    next_label: u32,
    line: usize,
}

impl Lowerer {
    fn new(program: &ast::Program) -> Self {
        let signatures = program
            .functions()
            .map(|(function, _)| {
                let signature = Signature {
                    params: function.params.iter().map(|param| param.ty.clone()).collect(),
                    returns: function.return_type.clone(),
                };
                (function.name.clone(), signature)
            })
            .collect();

        Self {
            code: Vec::new(),
            functions: Vec::new(),
            signatures,
            loops: Vec::new(),
            return_type: None,
            next_temp: 0,
            next_label: 0,
            line: 0,
        }
    }

    fn emit(&mut self, op: Opcode) {
        self.code.push(Instruction::new(op, self.line));
    }

    fn temp(&mut self) -> Place {
        let id = self.next_temp;
        self.next_temp += 1;
        Place::Temp(id)
    }

    fn label(&mut self) -> LabelId {
        let id = self.next_label;
        self.next_label += 1;
        LabelId::Local(id)
    }

    /// Writes an operand into a place, as a literal assignment when possible.
    fn store(&mut self, dest: Place, value: Operand) {
        match value {
            Operand::Const(value) => self.emit(Opcode::Assign { dest, value }),
            src => self.emit(Opcode::Copy { dest, src }),
        }
    }

    /// Applies the implicit int to float widening.
    fn coerce(&mut self, value: Operand, from: &Type, to: &Type) -> Operand {
        if *from != Type::Int || *to != Type::Float {
            return value;
        }
        match value {
            Operand::Const(Constant::Int(value)) => Operand::Const(Constant::Float(value as f64)),
            operand => {
                let dest = self.temp();
                self.emit(Opcode::Unary {
                    dest: dest.clone(),
                    op: UnaryOp::ToFloat,
                    operand,
                });
                dest.to_operand()
            }
        }
    }

    fn variable(&self, name: &Name) -> LowerResult<(Variable, Type)> {
        let binding = name.binding.get().ok_or_else(|| IrError::Unresolved {
            name: name.name.clone(),
            line: self.line,
        })?;
        let variable = Variable {
            name: binding.slot.clone(),
            storage: binding.storage,
        };
        Ok((variable, binding.ty.clone()))
    }

    fn function(&mut self, function: &FunctionDecl, line: usize) -> LowerResult<()> {
        self.line = line;
        let label = LabelId::Function(function.name.clone());
        self.emit(Opcode::Label(label.clone()));

        let params = function
            .params
            .iter()
            .map(|param| self.variable(&param.name).map(|(variable, _)| variable))
            .collect::<LowerResult<Vec<_>>>()?;
        self.functions.push(FunctionInfo {
            name: function.name.clone(),
            label,
            params,
            returns_value: function.return_type != Type::Void,
            line,
        });

        self.return_type = Some(function.return_type.clone());
        self.block(&function.body)?;
        self.line = line;
        self.emit(Opcode::Return(None));
        self.return_type = None;
        Ok(())
    }

    fn block(&mut self, statements: &[Stmt]) -> LowerResult<()> {
        for statement in statements {
            self.statement(statement)?;
        }
        Ok(())
    }

    fn loop_body(&mut self, labels: LoopLabels, body: &[Stmt]) -> LowerResult<()> {
        self.loops.push(labels);
        let result = self.block(body);
        self.loops.pop();
        result
    }

    fn statement(&mut self, statement: &Stmt) -> LowerResult<()> {
        self.line = statement.line;
        match &statement.kind {
            StmtKind::VarDecl { name, init, .. } => {
                let (variable, ty) = self.variable(name)?;
                let value = self.expr(init)?;
                let value = self.coerce(value, &init.resolved_type(), &ty);
                self.store(Place::Var(variable), value);
            }
            StmtKind::Assign { target, value } => {
                let (variable, ty) = self.variable(&target.name)?;
                let Some(row) = &target.row else {
                    let operand = self.expr(value)?;
                    let operand = self.coerce(operand, &value.resolved_type(), &ty);
                    self.store(Place::Var(variable), operand);
                    return Ok(());
                };
                let row = self.expr(row)?;
                let row = match &target.col {
                    Some(col) if contains_call(col) => self.pin(row),
                    _ => self.pin_before(row, value),
                };
                let col = target.col.as_ref().map(|col| self.expr(col)).transpose()?;
                let col = col.map(|col| self.pin_before(col, value));
                let operand = self.expr(value)?;
                let element = ty.element().unwrap_or(Type::Unknown);
                let operand = self.coerce(operand, &value.resolved_type(), &element);
                self.emit(Opcode::StoreIndex {
                    base: Place::Var(variable),
                    row,
                    col,
                    value: operand,
                });
            }
            // Function bodies are lowered after the top-level code.
            StmtKind::FunctionDecl(_) => {}
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                let cond = self.expr(condition)?;
                let end = self.label();
                match else_body {
                    None => {
                        self.emit(Opcode::JumpIfFalse {
                            cond,
                            target: end.clone(),
                        });
                        self.block(then_body)?;
                    }
                    Some(else_body) => {
                        let otherwise = self.label();
                        self.emit(Opcode::JumpIfFalse {
                            cond,
                            target: otherwise.clone(),
                        });
                        self.block(then_body)?;
                        self.emit(Opcode::Jump(end.clone()));
                        self.emit(Opcode::Label(otherwise));
                        self.block(else_body)?;
                    }
                }
                self.emit(Opcode::Label(end));
            }
            StmtKind::While { condition, body } => {
                let start = self.label();
                let end = self.label();
                self.emit(Opcode::Label(start.clone()));
                let cond = self.expr(condition)?;
                self.emit(Opcode::JumpIfFalse {
                    cond,
                    target: end.clone(),
                });
                let labels = LoopLabels {
                    continue_label: start.clone(),
                    break_label: end.clone(),
                };
                // The back edge keeps the last body line so the loop header
                // is entered once per iteration.
                self.loop_body(labels, body)?;
                self.emit(Opcode::Jump(start));
                self.emit(Opcode::Label(end));
            }
            StmtKind::Repeat { count, body } => {
                let limit = self.expr(count)?;
                let limit_temp = self.temp();
                self.store(limit_temp.clone(), limit);
                let counter = self.temp();
                self.store(counter.clone(), Operand::Const(Constant::Int(0)));

                let start = self.label();
                let next = self.label();
                let end = self.label();
                self.emit(Opcode::Label(start.clone()));
                let cond = self.temp();
                self.emit(Opcode::Binary {
                    dest: cond.clone(),
                    op: ast::BinaryOperator::Lt,
                    left: counter.to_operand(),
                    right: limit_temp.to_operand(),
                });
                self.emit(Opcode::JumpIfFalse {
                    cond: cond.to_operand(),
                    target: end.clone(),
                });
                let labels = LoopLabels {
                    continue_label: next.clone(),
                    break_label: end.clone(),
                };
                self.loop_body(labels, body)?;
                self.line = statement.line;
                self.emit(Opcode::Label(next));
                self.emit(Opcode::Binary {
                    dest: counter.clone(),
                    op: ast::BinaryOperator::Add,
                    left: counter.to_operand(),
                    right: Operand::Const(Constant::Int(1)),
                });
                self.emit(Opcode::Jump(start));
                self.emit(Opcode::Label(end));
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.statement(init)?;
                self.line = statement.line;
                let start = self.label();
                let next = self.label();
                let end = self.label();
                self.emit(Opcode::Label(start.clone()));
                let cond = self.expr(condition)?;
                self.emit(Opcode::JumpIfFalse {
                    cond,
                    target: end.clone(),
                });
                let labels = LoopLabels {
                    continue_label: next.clone(),
                    break_label: end.clone(),
                };
                self.loop_body(labels, body)?;
                self.line = statement.line;
                self.emit(Opcode::Label(next));
                self.statement(update)?;
                self.line = statement.line;
                self.emit(Opcode::Jump(start));
                self.emit(Opcode::Label(end));
            }
            StmtKind::Break | StmtKind::Continue => {
                let is_break = matches!(statement.kind, StmtKind::Break);
                let labels = self.loops.last().ok_or(IrError::LoopControlOutsideLoop {
                    keyword: if is_break { "break" } else { "continue" },
                    line: statement.line,
                })?;
                let target = if is_break {
                    labels.break_label.clone()
                } else {
                    labels.continue_label.clone()
                };
                self.emit(Opcode::Jump(target));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(value) => {
                        let operand = self.expr(value)?;
                        let returns = self.return_type.clone().unwrap_or(Type::Unknown);
                        Some(self.coerce(operand, &value.resolved_type(), &returns))
                    }
                    None => None,
                };
                self.emit(Opcode::Return(value));
            }
            StmtKind::Print(values) => {
                let last = values.len().saturating_sub(1);
                for (index, value) in values.iter().enumerate() {
                    let value = self.expr(value)?;
                    self.emit(Opcode::Print {
                        value,
                        newline: index == last,
                    });
                }
            }
            StmtKind::Input(name) => {
                let (variable, ty) = self.variable(name)?;
                self.emit(Opcode::Input {
                    dest: Place::Var(variable),
                    ty,
                });
            }
            StmtKind::Expr(expr) => match &expr.kind {
                ExprKind::Call { name, args } => {
                    self.call(name, args, false, expr.line)?;
                }
                _ => {
                    self.expr(expr)?;
                }
            },
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> LowerResult<Operand> {
        let operand = match &expr.kind {
            ExprKind::Integer(value) => Operand::Const(Constant::Int(*value)),
            ExprKind::Float(value) => Operand::Const(Constant::Float(*value)),
            ExprKind::String(value) => Operand::Const(Constant::Str(value.clone())),
            ExprKind::Boolean(value) => Operand::Const(Constant::Bool(*value)),
            ExprKind::Identifier(name) => Operand::Var(self.variable(name)?.0),
            ExprKind::Binary { op, left, right } => {
                let left = self.expr(left)?;
                let left = self.pin_before(left, right);
                let right = self.expr(right)?;
                let dest = self.temp();
                self.emit(Opcode::Binary {
                    dest: dest.clone(),
                    op: *op,
                    left,
                    right,
                });
                dest.to_operand()
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.expr(operand)?;
                let op = match op {
                    UnaryOperator::Neg => UnaryOp::Neg,
                    UnaryOperator::Not => UnaryOp::Not,
                    UnaryOperator::Transpose => UnaryOp::Transpose,
                };
                let dest = self.temp();
                self.emit(Opcode::Unary {
                    dest: dest.clone(),
                    op,
                    operand,
                });
                dest.to_operand()
            }
            ExprKind::Call { name, args } => {
                self.call(name, args, true, expr.line)?
                    .ok_or_else(|| IrError::VoidValue {
                        name: name.clone(),
                        line: expr.line,
                    })?
            }
            ExprKind::ArrayLiteral(elements) => {
                let element_ty = expr.resolved_type().element().unwrap_or(Type::Unknown);
                let dest = self.temp();
                self.emit(Opcode::NewArray {
                    dest: dest.clone(),
                    len: elements.len(),
                });
                for (index, element) in elements.iter().enumerate() {
                    let value = self.expr(element)?;
                    let value = self.coerce(value, &element.resolved_type(), &element_ty);
                    self.emit(Opcode::StoreIndex {
                        base: dest.clone(),
                        row: Operand::Const(Constant::Int(index as i64)),
                        col: None,
                        value,
                    });
                }
                dest.to_operand()
            }
            ExprKind::MatrixLiteral(rows) => {
                let cols = rows.first().map_or(0, Vec::len);
                let dest = self.temp();
                self.emit(Opcode::NewMatrix {
                    dest: dest.clone(),
                    rows: rows.len(),
                    cols,
                });
                for (r, row) in rows.iter().enumerate() {
                    for (c, element) in row.iter().enumerate() {
                        let value = self.expr(element)?;
                        let value = self.coerce(value, &element.resolved_type(), &Type::Float);
                        self.emit(Opcode::StoreIndex {
                            base: dest.clone(),
                            row: Operand::Const(Constant::Int(r as i64)),
                            col: Some(Operand::Const(Constant::Int(c as i64))),
                            value,
                        });
                    }
                }
                dest.to_operand()
            }
            ExprKind::Index { base, row, col } => {
                let base = self.expr(base)?;
                let base = match col.as_deref() {
                    Some(col) if contains_call(col) => self.pin(base),
                    _ => self.pin_before(base, row),
                };
                let row = self.expr(row)?;
                let row = match col.as_deref() {
                    Some(col) => self.pin_before(row, col),
                    None => row,
                };
                let col = col.as_deref().map(|col| self.expr(col)).transpose()?;
                let dest = self.temp();
                self.emit(Opcode::LoadIndex {
                    dest: dest.clone(),
                    base,
                    row,
                    col,
                });
                dest.to_operand()
            }
        };
        Ok(operand)
    }

    /// Copies a variable read into a temporary when `later` calls a
    /// function, which could reassign the variable before it is used.
    fn pin_before(&mut self, operand: Operand, later: &Expr) -> Operand {
        if contains_call(later) {
            self.pin(operand)
        } else {
            operand
        }
    }

    fn pin(&mut self, operand: Operand) -> Operand {
        if !matches!(operand, Operand::Var(_)) {
            return operand;
        }
        let dest = self.temp();
        self.emit(Opcode::Copy {
            dest: dest.clone(),
            src: operand,
        });
        dest.to_operand()
    }

    /// Pushes each argument as soon as it is evaluated, then calls. Returns the
    /// temporary holding the result when `want_value` is set and the callee
    /// produces one.
    fn call(
        &mut self,
        name: &str,
        args: &[Expr],
        want_value: bool,
        line: usize,
    ) -> LowerResult<Option<Operand>> {
        let (target, params, returns) = if let Some(signature) = self.signatures.get(name) {
            let signature = signature.clone();
            (
                CallTarget::User(name.to_string()),
                Some(signature.params),
                signature.returns,
            )
        } else if let Some(builtin) = BuiltinFunction::from_name(name) {
            (CallTarget::Builtin(builtin), None, builtin.return_type())
        } else {
            return Err(IrError::UnknownFunction {
                name: name.to_string(),
                line,
            });
        };

        for (index, arg) in args.iter().enumerate() {
            let operand = self.expr(arg)?;
            let operand = match params.as_ref().and_then(|params| params.get(index)) {
                Some(param) => self.coerce(operand, &arg.resolved_type(), param),
                None => operand,
            };
            self.emit(Opcode::Param(operand));
        }
        self.emit(Opcode::Call {
            target,
            argc: args.len(),
        });

        if !want_value || returns == Type::Void {
            return Ok(None);
        }
        let dest = self.temp();
        self.emit(Opcode::Copy {
            dest: dest.clone(),
            src: Operand::ReturnSlot,
        });
        Ok(Some(dest.to_operand()))
    }
}

fn contains_call(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call { .. } => true,
        ExprKind::Integer(_)
        | ExprKind::Float(_)
        | ExprKind::String(_)
        | ExprKind::Boolean(_)
        | ExprKind::Identifier(_) => false,
        ExprKind::Binary { left, right, .. } => contains_call(left) || contains_call(right),
        ExprKind::Unary { operand, .. } => contains_call(operand),
        ExprKind::ArrayLiteral(elements) => elements.iter().any(contains_call),
        ExprKind::MatrixLiteral(rows) => rows.iter().flatten().any(contains_call),
        ExprKind::Index { base, row, col } => {
            contains_call(base) || contains_call(row) || col.as_deref().is_some_and(contains_call)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::semantic::analyze;
    use indoc::indoc;

    fn lower_source(source: &str) -> Program {
        let (tokens, lex_errors) = tokenize(source);
        assert!(lex_errors.is_empty());
        let (program, diagnostics) = parse(&tokens);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        let analysis = analyze(&program);
        assert!(!analysis.diagnostics.has_errors(), "{:?}", analysis.diagnostics);
        lower(&program).expect("lowering succeeds")
    }

    fn listing(program: &Program) -> Vec<String> {
        program
            .code
            .iter()
            .map(|instruction| instruction.op.to_string())
            .collect()
    }

    #[test]
    fn lowers_expressions_with_fresh_temporaries() {
        let program = lower_source(indoc! {"
            int x = 2
            float y = x + 3 * 4
            print y
        "});
        assert_eq!(
            listing(&program),
            vec![
                "x = 2",
                "t0 = 3 * 4",
                "t1 = x + t0",
                "t2 = to_float t1",
                "y = t2",
                "print y",
                "halt",
            ]
        );
    }

    #[test]
    fn lowers_if_else_to_labels() {
        let program = lower_source(indoc! {"
            int x = 1
            if x > 0:
                print 1
            else:
                print 2
            end
        "});
        assert_eq!(
            listing(&program),
            vec![
                "x = 1",
                "t0 = x > 0",
                "if_false t0 goto L1",
                "print 1",
                "goto L0",
                "L1:",
                "print 2",
                "L0:",
                "halt",
            ]
        );
        program.resolve_labels().expect("labels are consistent");
    }

    #[test]
    fn for_continue_jumps_to_update() {
        let program = lower_source(indoc! {"
            for int i = 0; i < 3; i = i + 1:
                continue
            end
        "});
        let code = listing(&program);
        let update = code.iter().position(|line| line == "L1:").expect("update label");
        assert_eq!(code[update + 1], "t1 = i + 1");
        assert!(code.contains(&"goto L1".to_string()));
        assert!(code.contains(&"if_false t0 goto L2".to_string()));
    }

    #[test]
    fn lowers_calls_with_params_and_return_slot() {
        let program = lower_source(indoc! {"
            function float half(float v):
                return v / 2
            end
            print half(3)
        "});
        assert_eq!(
            listing(&program),
            vec![
                "param 3.0",
                "call half, 1",
                "t0 = retval",
                "print t0",
                "halt",
                "fn_half:",
                "t1 = v / 2",
                "return t1",
                "return",
            ]
        );
        let function = program.function("half").expect("function recorded");
        assert!(function.returns_value);
        assert_eq!(function.params[0].name, "v");
    }

    #[test]
    fn reads_variables_before_later_calls_run() {
        let program = lower_source(indoc! {"
            int x = 1
            function int bump():
                x = x + 10
                return 0
            end
            function int pair(int a, int b):
                return a
            end
            print pair(x, bump())
            int y = x + bump()
            print y
        "});
        let code = listing(&program);
        assert_eq!(
            code[..11],
            [
                "x = 1",
                "param x",
                "call bump, 0",
                "t0 = retval",
                "param t0",
                "call pair, 2",
                "t1 = retval",
                "print t1",
                "t2 = x",
                "call bump, 0",
                "t3 = retval",
            ]
        );
        assert_eq!(code[11], "t4 = t2 + t3");
    }

    #[test]
    fn keeps_direct_reads_without_calls() {
        let program = lower_source(indoc! {"
            int x = 1
            int y = x + 2
            print y
        "});
        assert!(!listing(&program).iter().any(|line| line == "t0 = x"));
    }

    #[test]
    fn lowers_indexed_access() {
        let program = lower_source(indoc! {"
            array a = [1, 2]
            a[0] = a[1]
            matrix m = [[1, 2], [3, 4]]
            m[1][0] = 7
        "});
        assert_eq!(
            listing(&program),
            vec![
                "t0 = array[2]",
                "t0[0] = 1",
                "t0[1] = 2",
                "a = t0",
                "t1 = a[1]",
                "a[0] = t1",
                "t2 = matrix[2x2]",
                "t2[0][0] = 1.0",
                "t2[0][1] = 2.0",
                "t2[1][0] = 3.0",
                "t2[1][1] = 4.0",
                "m = t2",
                "m[1][0] = 7.0",
                "halt",
            ]
        );
    }

    #[test]
    fn refuses_unanalyzed_programs() {
        let (tokens, _) = tokenize("int x = 1\n");
        let (program, _) = parse(&tokens);
        assert!(matches!(lower(&program), Err(IrError::Unresolved { .. })));
    }
}
