use thiserror::Error;

use crate::diagnostics::{Diagnostic, Phase};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("Expected {expected}, found {found}")]
    Unexpected {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
    #[error("Variable '{name}' must be initialized when declared")]
    MissingInitializer {
        name: String,
        line: usize,
        column: usize,
    },
    #[error("Invalid escape sequence '\\{character}' in string literal")]
    InvalidEscape {
        character: char,
        line: usize,
        column: usize,
    },
}

pub type ParseResult<T> = Result<T, SyntaxError>;

impl SyntaxError {
    pub fn position(&self) -> (usize, usize) {
        match self {
            SyntaxError::Unexpected { line, column, .. }
            | SyntaxError::MissingInitializer { line, column, .. }
            | SyntaxError::InvalidEscape { line, column, .. } => (*line, *column),
        }
    }
}

impl From<SyntaxError> for Diagnostic {
    fn from(error: SyntaxError) -> Self {
        let (line, column) = error.position();
        Diagnostic::error(Phase::Syntax, error.to_string(), line, column)
    }
}
