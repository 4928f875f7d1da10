use std::cell::OnceCell;

use serde::Serialize;

use crate::types::Type;

/// Where a resolved variable lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Storage {
    Global,
    Local,
}

/// Resolution of a name, written once by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Runtime slot name; differs from the source name when a local shadows
    /// another local of the same function.
    pub slot: String,
    pub ty: Type,
    pub storage: Storage,
}

/// A variable name in the source together with its resolved binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Name {
    pub name: String,
    pub binding: OnceCell<Binding>,
}

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: OnceCell::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "^",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Not,
    /// Postfix `^t`.
    Transpose,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Identifier(Name),
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    ArrayLiteral(Vec<Expr>),
    MatrixLiteral(Vec<Vec<Expr>>),
    /// `base[row]` or `base[row][col]`.
    Index {
        base: Box<Expr>,
        row: Box<Expr>,
        col: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: usize,
    pub column: usize,
    /// Resolved type, written once by the analyzer.
    pub ty: OnceCell<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, line: usize, column: usize) -> Self {
        Self {
            kind,
            line,
            column,
            ty: OnceCell::new(),
        }
    }

    /// Type recorded by the analyzer, `Unknown` when analysis never reached it.
    pub fn resolved_type(&self) -> Type {
        self.ty.get().cloned().unwrap_or(Type::Unknown)
    }
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: Name,
    pub row: Option<Expr>,
    pub col: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Name,
    pub ty: Type,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    VarDecl {
        name: Name,
        declared: Type,
        init: Expr,
    },
    Assign {
        target: Target,
        value: Expr,
    },
    FunctionDecl(FunctionDecl),
    If {
        condition: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    Repeat {
        count: Expr,
        body: Vec<Stmt>,
    },
    For {
        init: Box<Stmt>,
        condition: Expr,
        update: Box<Stmt>,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Print(Vec<Expr>),
    Input(Name),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
    pub column: usize,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = (&FunctionDecl, &Stmt)> {
        self.statements.iter().filter_map(|statement| match &statement.kind {
            StmtKind::FunctionDecl(function) => Some((function, statement)),
            _ => None,
        })
    }
}
