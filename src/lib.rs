pub mod ast;
pub mod builtins;
pub mod config;
pub mod diagnostics;
pub mod ir;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod pipeline;
pub mod runtime;
pub mod semantic;
pub mod token;
pub mod types;
pub mod vm;

pub use pipeline::{Compilation, RunOutcome, compile, compile_with, run};

#[cfg(test)]
mod harness;
