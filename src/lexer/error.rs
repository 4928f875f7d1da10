use thiserror::Error;

use crate::diagnostics::{Diagnostic, Phase};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unexpected character '{character}'")]
    UnexpectedCharacter {
        character: char,
        line: usize,
        column: usize,
    },
    #[error("Invalid number literal '{literal}'")]
    InvalidNumberLiteral {
        literal: String,
        line: usize,
        column: usize,
    },
    #[error("Unterminated string literal")]
    UnterminatedString { line: usize, column: usize },
}

impl LexError {
    pub fn position(&self) -> (usize, usize) {
        match self {
            LexError::UnexpectedCharacter { line, column, .. }
            | LexError::InvalidNumberLiteral { line, column, .. }
            | LexError::UnterminatedString { line, column } => (*line, *column),
        }
    }
}

impl From<LexError> for Diagnostic {
    fn from(error: LexError) -> Self {
        let (line, column) = error.position();
        Diagnostic::error(Phase::Lexical, error.to_string(), line, column)
    }
}
