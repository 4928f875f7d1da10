//! Scope resolution and type checking.
//!
//! One depth-first pass annotates every expression with its type and every
//! name with its binding. Errors are collected and the pass always finishes.
use serde::Serialize;

use crate::ast::{
    BinaryOperator, Binding, Expr, ExprKind, FunctionDecl, Name, Program, Stmt, StmtKind, Storage,
    UnaryOperator,
};
use crate::builtins::BuiltinFunction;
use crate::config::SuggestionConfig;
use crate::diagnostics::{Diagnostic, Diagnostics, Phase};
use crate::types::Type;

pub mod error;
pub mod scope;
pub mod suggest;

pub use error::SemanticError;
pub use scope::{ScopeTree, Symbol, SymbolId, SymbolKind};

/// Every symbol declared during analysis, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SymbolTable {
    pub symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|symbol| symbol.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Symbol> {
        self.symbols.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub symbols: SymbolTable,
    pub diagnostics: Diagnostics,
}

pub fn analyze(program: &Program) -> Analysis {
    analyze_with(program, &SuggestionConfig::default())
}

pub fn analyze_with(program: &Program, suggestions: &SuggestionConfig) -> Analysis {
    Analyzer::new(suggestions).run(program)
}

#[derive(Debug, Clone)]
struct FunctionContext {
    name: String,
    return_type: Type,
}

struct Analyzer<'c> {
    scopes: ScopeTree,
    diagnostics: Diagnostics,
    suggestions: &'c SuggestionConfig,
    function: Option<FunctionContext>,
    loop_depth: usize,
    shadow_counter: usize,
}

/// Stores an annotation unless an earlier pass already wrote one.
fn annotate<T>(slot: &std::cell::OnceCell<T>, value: T) {
    let _ = slot.set(value);
}

impl<'c> Analyzer<'c> {
    fn new(suggestions: &'c SuggestionConfig) -> Self {
        Self {
            scopes: ScopeTree::new(),
            diagnostics: Diagnostics::new(),
            suggestions,
            function: None,
            loop_depth: 0,
            shadow_counter: 0,
        }
    }

    fn run(mut self, program: &Program) -> Analysis {
        self.hoist_functions(program);
        for statement in &program.statements {
            self.statement(statement, true);
        }
        self.report_unused();
        Analysis {
            symbols: SymbolTable {
                symbols: self.scopes.into_symbols(),
            },
            diagnostics: self.diagnostics,
        }
    }

    fn error(&mut self, error: SemanticError, line: usize, column: usize) {
        self.diagnostics
            .push(Diagnostic::error(Phase::Semantic, error.to_string(), line, column));
    }

    fn error_with_suggestions(
        &mut self,
        error: SemanticError,
        line: usize,
        column: usize,
        suggestions: Vec<String>,
    ) {
        self.diagnostics.push(
            Diagnostic::error(Phase::Semantic, error.to_string(), line, column)
                .with_suggestions(suggestions),
        );
    }

    fn suggest(&self, name: &str, candidates: Vec<&str>) -> Vec<String> {
        suggest::suggest(
            name,
            candidates,
            self.suggestions.max_distance,
            self.suggestions.max_candidates,
        )
    }

    /// Top-level functions are visible before their declaration.
    fn hoist_functions(&mut self, program: &Program) {
        for (function, statement) in program.functions() {
            let symbol = Symbol {
                name: function.name.clone(),
                kind: SymbolKind::Function {
                    params: function.params.iter().map(|param| param.ty.clone()).collect(),
                    returns: function.return_type.clone(),
                },
                ty: function.return_type.clone(),
                scope_depth: 0,
                line: statement.line,
                column: statement.column,
                initialized: true,
                used: false,
                slot: function.name.clone(),
                storage: Storage::Global,
            };
            if let Err(existing) = self.scopes.declare(symbol) {
                let previous_line = self.scopes.symbol(existing).line;
                self.error(
                    SemanticError::Redeclaration {
                        name: function.name.clone(),
                        previous_line,
                    },
                    statement.line,
                    statement.column,
                );
            }
        }
    }

    fn report_unused(&mut self) {
        let unused: Vec<_> = self
            .scopes
            .symbols()
            .iter()
            .filter(|symbol| matches!(symbol.kind, SymbolKind::Variable) && !symbol.used)
            .map(|symbol| (symbol.name.clone(), symbol.line, symbol.column))
            .collect();
        for (name, line, column) in unused {
            self.diagnostics.push(Diagnostic::warning(
                Phase::Semantic,
                SemanticError::UnusedVariable { name }.to_string(),
                line,
                column,
            ));
        }
    }

    fn block(&mut self, statements: &[Stmt]) {
        self.scopes.enter();
        for statement in statements {
            self.statement(statement, false);
        }
        self.scopes.exit();
    }

    fn loop_body(&mut self, statements: &[Stmt]) {
        self.loop_depth += 1;
        self.block(statements);
        self.loop_depth -= 1;
    }

    fn statement(&mut self, statement: &Stmt, top_level: bool) {
        let (line, column) = (statement.line, statement.column);
        match &statement.kind {
            StmtKind::VarDecl {
                name,
                declared,
                init,
            } => {
                let init_ty = self.expr(init);
                let ty = if *declared == Type::Void {
                    self.error(
                        SemanticError::VoidVariable {
                            name: name.name.clone(),
                        },
                        line,
                        column,
                    );
                    Type::Unknown
                } else if !declared.accepts(&init_ty) {
                    self.error(
                        SemanticError::AssignMismatch {
                            name: name.name.clone(),
                            expected: declared.clone(),
                            found: init_ty,
                        },
                        line,
                        column,
                    );
                    declared.clone()
                } else {
                    refine(declared, init_ty)
                };
                self.declare_variable(name, ty, SymbolKind::Variable, line, column);
            }
            StmtKind::Assign { target, value } => {
                let value_ty = self.expr(value);
                let Some(id) = self.resolve_variable(&target.name, line, column, false) else {
                    for index in target.row.iter().chain(&target.col) {
                        self.expr(index);
                    }
                    return;
                };
                let variable_ty = self.scopes.symbol(id).ty.clone();
                let target_ty = match &target.row {
                    Some(row) => {
                        self.scopes.symbol_mut(id).used = true;
                        self.index_type(&variable_ty, row, target.col.as_ref(), line, column)
                    }
                    None => variable_ty,
                };
                if !target_ty.accepts(&value_ty) {
                    self.error(
                        SemanticError::AssignMismatch {
                            name: target.name.name.clone(),
                            expected: target_ty,
                            found: value_ty,
                        },
                        line,
                        column,
                    );
                }
                self.scopes.symbol_mut(id).initialized = true;
            }
            StmtKind::FunctionDecl(function) => {
                if top_level {
                    self.function_decl(function);
                } else {
                    self.error(
                        SemanticError::NestedFunction {
                            name: function.name.clone(),
                        },
                        line,
                        column,
                    );
                }
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                self.condition(condition, "if");
                self.block(then_body);
                if let Some(else_body) = else_body {
                    self.block(else_body);
                }
            }
            StmtKind::While { condition, body } => {
                self.condition(condition, "while");
                self.loop_body(body);
            }
            StmtKind::Repeat { count, body } => {
                let found = self.expr(count);
                if !matches!(found, Type::Int | Type::Unknown) {
                    self.error(
                        SemanticError::RepeatCountNotInt { found },
                        count.line,
                        count.column,
                    );
                }
                self.loop_body(body);
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.scopes.enter();
                self.statement(init, false);
                self.condition(condition, "for");
                self.statement(update, false);
                self.loop_body(body);
                self.scopes.exit();
            }
            StmtKind::Break | StmtKind::Continue => {
                if self.loop_depth == 0 {
                    let keyword = if matches!(statement.kind, StmtKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    self.error(SemanticError::LoopControlOutsideLoop { keyword }, line, column);
                }
            }
            StmtKind::Return(value) => {
                let found = value.as_ref().map(|value| self.expr(value));
                let Some(context) = self.function.clone() else {
                    self.error(SemanticError::ReturnOutsideFunction, line, column);
                    return;
                };
                let error = match found {
                    None if context.return_type != Type::Void => {
                        Some(SemanticError::MissingReturnValue {
                            name: context.name,
                            expected: context.return_type,
                        })
                    }
                    Some(_) if context.return_type == Type::Void => {
                        Some(SemanticError::UnexpectedReturnValue { name: context.name })
                    }
                    Some(found) if !context.return_type.accepts(&found) => {
                        Some(SemanticError::ReturnTypeMismatch {
                            name: context.name,
                            expected: context.return_type,
                            found,
                        })
                    }
                    _ => None,
                };
                if let Some(error) = error {
                    self.error(error, line, column);
                }
            }
            StmtKind::Print(values) => {
                for value in values {
                    if self.expr(value) == Type::Void {
                        self.error(SemanticError::VoidValue, value.line, value.column);
                    }
                }
            }
            StmtKind::Input(name) => {
                let Some(id) = self.resolve_variable(name, line, column, false) else {
                    return;
                };
                let found = self.scopes.symbol(id).ty.clone();
                if !matches!(
                    found,
                    Type::Int | Type::Float | Type::Str | Type::Bool | Type::Unknown
                ) {
                    self.error(
                        SemanticError::InputTarget {
                            name: name.name.clone(),
                            found,
                        },
                        line,
                        column,
                    );
                }
                self.scopes.symbol_mut(id).initialized = true;
            }
            StmtKind::Expr(expr) => {
                self.expr(expr);
            }
        }
    }

    fn function_decl(&mut self, function: &FunctionDecl) {
        self.scopes.enter();
        for param in &function.params {
            let ty = if param.ty == Type::Void {
                self.error(
                    SemanticError::VoidVariable {
                        name: param.name.name.clone(),
                    },
                    param.line,
                    param.column,
                );
                Type::Unknown
            } else {
                param.ty.clone()
            };
            self.declare_variable(
                &param.name,
                ty,
                SymbolKind::Parameter,
                param.line,
                param.column,
            );
        }

        let previous = self.function.replace(FunctionContext {
            name: function.name.clone(),
            return_type: function.return_type.clone(),
        });
        let loop_depth = std::mem::take(&mut self.loop_depth);
        for statement in &function.body {
            self.statement(statement, false);
        }
        self.loop_depth = loop_depth;
        self.function = previous;
        self.scopes.exit();
    }

    fn declare_variable(
        &mut self,
        name: &Name,
        ty: Type,
        kind: SymbolKind,
        line: usize,
        column: usize,
    ) {
        let storage = if self.scopes.is_global() {
            Storage::Global
        } else {
            Storage::Local
        };
        let shadows_local = self.scopes.lookup(&name.name).is_some_and(|id| {
            let existing = self.scopes.symbol(id);
            existing.storage == Storage::Local && !existing.is_function()
        });
        let slot = if storage == Storage::Local && shadows_local {
            self.shadow_counter += 1;
            format!("{}#{}", name.name, self.shadow_counter)
        } else {
            name.name.clone()
        };

        let symbol = Symbol {
            name: name.name.clone(),
            kind,
            ty: ty.clone(),
            scope_depth: 0,
            line,
            column,
            initialized: true,
            used: false,
            slot: slot.clone(),
            storage,
        };
        match self.scopes.declare(symbol) {
            Ok(_) => annotate(&name.binding, Binding { slot, ty, storage }),
            Err(existing) => {
                let previous_line = self.scopes.symbol(existing).line;
                self.error(
                    SemanticError::Redeclaration {
                        name: name.name.clone(),
                        previous_line,
                    },
                    line,
                    column,
                );
            }
        }
    }

    /// Resolves a variable reference and records its binding. `read` marks
    /// the symbol as used.
    fn resolve_variable(
        &mut self,
        name: &Name,
        line: usize,
        column: usize,
        read: bool,
    ) -> Option<SymbolId> {
        let Some(id) = self.scopes.lookup(&name.name) else {
            let candidates = self.scopes.visible_names(|symbol| !symbol.is_function());
            let suggestions = self.suggest(&name.name, candidates);
            self.error_with_suggestions(
                SemanticError::UndeclaredVariable {
                    name: name.name.clone(),
                },
                line,
                column,
                suggestions,
            );
            return None;
        };

        let symbol = self.scopes.symbol_mut(id);
        if symbol.is_function() {
            self.error(
                SemanticError::NotAVariable {
                    name: name.name.clone(),
                },
                line,
                column,
            );
            return None;
        }
        if read {
            symbol.used = true;
        }
        let binding = Binding {
            slot: symbol.slot.clone(),
            ty: symbol.ty.clone(),
            storage: symbol.storage,
        };
        annotate(&name.binding, binding);
        Some(id)
    }

    fn condition(&mut self, condition: &Expr, construct: &'static str) {
        let found = self.expr(condition);
        if !matches!(found, Type::Bool | Type::Unknown) {
            self.error(
                SemanticError::ConditionNotBoolean { construct, found },
                condition.line,
                condition.column,
            );
        }
    }

    fn expr(&mut self, expr: &Expr) -> Type {
        let (line, column) = (expr.line, expr.column);
        let ty = match &expr.kind {
            ExprKind::Integer(_) => Type::Int,
            ExprKind::Float(_) => Type::Float,
            ExprKind::String(_) => Type::Str,
            ExprKind::Boolean(_) => Type::Bool,
            ExprKind::Identifier(name) => match self.resolve_variable(name, line, column, true) {
                Some(id) => self.scopes.symbol(id).ty.clone(),
                None => Type::Unknown,
            },
            ExprKind::Binary { op, left, right } => {
                let left = self.expr(left);
                let right = self.expr(right);
                if left.is_unknown() || right.is_unknown() {
                    Type::Unknown
                } else if let Some(ty) = binary_type(*op, &left, &right) {
                    ty
                } else {
                    self.error(
                        SemanticError::InvalidOperands {
                            op: op.symbol(),
                            left,
                            right,
                        },
                        line,
                        column,
                    );
                    Type::Unknown
                }
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.expr(operand);
                if operand.is_unknown() {
                    Type::Unknown
                } else if let Some(ty) = unary_type(*op, &operand) {
                    ty
                } else {
                    let symbol = match op {
                        UnaryOperator::Neg => "-",
                        UnaryOperator::Not => "not",
                        UnaryOperator::Transpose => "^t",
                    };
                    self.error(
                        SemanticError::InvalidOperand {
                            op: symbol,
                            operand,
                        },
                        line,
                        column,
                    );
                    Type::Unknown
                }
            }
            ExprKind::Call { name, args } => {
                let arg_types: Vec<Type> = args.iter().map(|arg| self.expr(arg)).collect();
                self.call_type(name, &arg_types, line, column)
            }
            ExprKind::ArrayLiteral(elements) => self.array_literal_type(elements),
            ExprKind::MatrixLiteral(rows) => self.matrix_literal_type(rows),
            ExprKind::Index { base, row, col } => {
                let base_ty = self.expr(base);
                self.index_type(&base_ty, row, col.as_deref(), line, column)
            }
        };
        annotate(&expr.ty, ty.clone());
        ty
    }

    fn call_type(&mut self, name: &str, args: &[Type], line: usize, column: usize) -> Type {
        if let Some(id) = self.scopes.lookup_global(name)
            && let SymbolKind::Function { params, returns } = self.scopes.symbol(id).kind.clone()
        {
            self.scopes.symbol_mut(id).used = true;
            if params.len() != args.len() {
                self.error(
                    SemanticError::ArgumentCount {
                        name: name.to_string(),
                        expected: params.len(),
                        found: args.len(),
                    },
                    line,
                    column,
                );
            } else {
                for (position, (param, arg)) in params.iter().zip(args).enumerate() {
                    if !param.accepts(arg) {
                        self.error(
                            SemanticError::ArgumentType {
                                name: name.to_string(),
                                position: position + 1,
                                expected: param.to_string(),
                                found: arg.clone(),
                            },
                            line,
                            column,
                        );
                    }
                }
            }
            return returns;
        }

        if let Some(builtin) = BuiltinFunction::from_name(name) {
            let params = builtin.params();
            if !builtin.accepts_arity(args.len()) {
                self.error(
                    SemanticError::ArgumentCount {
                        name: name.to_string(),
                        expected: params.len(),
                        found: args.len(),
                    },
                    line,
                    column,
                );
            } else {
                for (position, (param, arg)) in params.iter().zip(args).enumerate() {
                    if !param.accepts(arg) {
                        self.error(
                            SemanticError::ArgumentType {
                                name: name.to_string(),
                                position: position + 1,
                                expected: param.describe().to_string(),
                                found: arg.clone(),
                            },
                            line,
                            column,
                        );
                    }
                }
            }
            return builtin.return_type();
        }

        if self.scopes.lookup(name).is_some() {
            self.error(
                SemanticError::NotAFunction {
                    name: name.to_string(),
                },
                line,
                column,
            );
            return Type::Unknown;
        }

        let mut candidates = self.scopes.visible_names(Symbol::is_function);
        candidates.extend(BuiltinFunction::ALL.iter().map(|builtin| builtin.name()));
        let suggestions = self.suggest(name, candidates);
        self.error_with_suggestions(
            SemanticError::UndeclaredFunction {
                name: name.to_string(),
            },
            line,
            column,
            suggestions,
        );
        Type::Unknown
    }

    fn index_type(
        &mut self,
        base: &Type,
        row: &Expr,
        col: Option<&Expr>,
        line: usize,
        column: usize,
    ) -> Type {
        for index in std::iter::once(row).chain(col) {
            let found = self.expr(index);
            if !matches!(found, Type::Int | Type::Unknown) {
                self.error(SemanticError::IndexNotInt { found }, index.line, index.column);
            }
        }
        let error = match (base, col.is_some()) {
            (Type::Unknown, _) => return Type::Unknown,
            (Type::Array(element), false) => return (**element).clone(),
            (Type::Matrix(_), true) => return Type::Float,
            (Type::Array(_), true) => SemanticError::ArrayIndexArity,
            (Type::Matrix(_), false) => SemanticError::MatrixIndexArity,
            (other, _) => SemanticError::NotIndexable {
                found: other.clone(),
            },
        };
        self.error(error, line, column);
        Type::Unknown
    }

    fn array_literal_type(&mut self, elements: &[Expr]) -> Type {
        let mut element_ty = Type::Unknown;
        for element in elements {
            let found = self.expr(element);
            if found == Type::Void {
                self.error(SemanticError::VoidValue, element.line, element.column);
                continue;
            }
            if found.is_unknown() {
                continue;
            }
            element_ty = match (element_ty, found) {
                (Type::Unknown, found) => found,
                (Type::Int, Type::Float) | (Type::Float, Type::Int) => Type::Float,
                (expected, found) if expected == found => found,
                (expected, found) => {
                    self.error(
                        SemanticError::MixedArrayElements {
                            expected: expected.clone(),
                            found,
                        },
                        element.line,
                        element.column,
                    );
                    expected
                }
            };
        }
        Type::Array(Box::new(element_ty))
    }

    fn matrix_literal_type(&mut self, rows: &[Vec<Expr>]) -> Type {
        let cols = rows.first().map_or(0, Vec::len);
        for (index, row) in rows.iter().enumerate() {
            if row.len() != cols {
                let (line, column) = row.first().map_or((0, 0), |e| (e.line, e.column));
                self.error(
                    SemanticError::RaggedMatrix {
                        expected: cols,
                        row: index + 1,
                        found: row.len(),
                    },
                    line,
                    column,
                );
            }
            for element in row {
                let found = self.expr(element);
                if !found.is_numeric() && !found.is_unknown() {
                    self.error(
                        SemanticError::NonNumericMatrixElement { found },
                        element.line,
                        element.column,
                    );
                }
            }
        }
        Type::Matrix(Some((rows.len(), cols)))
    }
}

/// Declared `array` takes its element type from the initializer.
fn refine(declared: &Type, init: Type) -> Type {
    match (declared, &init) {
        (Type::Array(element), Type::Array(_)) if element.is_unknown() => init,
        _ => declared.clone(),
    }
}

fn binary_type(op: BinaryOperator, left: &Type, right: &Type) -> Option<Type> {
    use BinaryOperator::*;

    match op {
        Add | Sub | Mul | Div | Mod | Pow => arithmetic_type(op, left, right),
        Lt | Le | Gt | Ge => {
            let comparable = (left.is_numeric() && right.is_numeric())
                || (*left == Type::Str && *right == Type::Str);
            comparable.then_some(Type::Bool)
        }
        Eq | Ne => {
            let comparable = (left.is_numeric() && right.is_numeric())
                || (left == right && matches!(left, Type::Str | Type::Bool));
            comparable.then_some(Type::Bool)
        }
        And | Or => (*left == Type::Bool && *right == Type::Bool).then_some(Type::Bool),
    }
}

fn arithmetic_type(op: BinaryOperator, left: &Type, right: &Type) -> Option<Type> {
    use BinaryOperator::*;

    match (left, right) {
        (Type::Int, Type::Int) => Some(Type::Int),
        (l, r) if l.is_numeric() && r.is_numeric() => Some(Type::Float),
        (Type::Str, Type::Str) if op == Add => Some(Type::Str),
        (Type::Matrix(a), Type::Matrix(b)) => match op {
            Add | Sub => match (a, b) {
                (Some(a), Some(b)) if a != b => None,
                _ => Some(Type::Matrix(a.or(*b))),
            },
            Mul => match (a, b) {
                (Some(a), Some(b)) if a.1 != b.0 => None,
                (Some(a), Some(b)) => Some(Type::Matrix(Some((a.0, b.1)))),
                _ => Some(Type::Matrix(None)),
            },
            _ => None,
        },
        (Type::Matrix(shape), scalar) if scalar.is_numeric() => match op {
            Mul | Div => Some(Type::Matrix(*shape)),
            Pow if *scalar == Type::Int => match shape {
                Some((rows, cols)) if rows != cols => None,
                _ => Some(Type::Matrix(*shape)),
            },
            _ => None,
        },
        (scalar, Type::Matrix(shape)) if scalar.is_numeric() && op == Mul => {
            Some(Type::Matrix(*shape))
        }
        _ => None,
    }
}

fn unary_type(op: UnaryOperator, operand: &Type) -> Option<Type> {
    match (op, operand) {
        (UnaryOperator::Neg, ty) if ty.is_numeric() || ty.is_matrix() => Some(ty.clone()),
        (UnaryOperator::Not, Type::Bool) => Some(Type::Bool),
        (UnaryOperator::Transpose, Type::Matrix(shape)) => {
            Some(Type::Matrix(shape.map(|(rows, cols)| (cols, rows))))
        }
        _ => None,
    }
}
