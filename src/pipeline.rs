//! Stage driver: source text in, tokens/AST/symbols/TAC and diagnostics out.
//!
//! Each stage only runs when every earlier stage finished without errors.
//! Diagnostics from all stages that ran are returned together.
use tracing::{debug, info_span};

use crate::ast;
use crate::config::{Config, VmConfig};
use crate::diagnostics::{Diagnostic, Diagnostics, Phase};
use crate::ir::{self, IrError};
use crate::lexer;
use crate::optimizer::{self, OptimizationStats};
use crate::parser;
use crate::semantic::{self, SymbolTable};
use crate::token::Token;
use crate::vm::{HaltReason, InputSource, Vm, VmState};

#[derive(Debug, Default)]
pub struct Compilation<'src> {
    pub tokens: Option<Vec<Token<'src>>>,
    pub ast: Option<ast::Program>,
    pub symbols: Option<SymbolTable>,
    pub ir: Option<ir::Program>,
    pub optimized_ir: Option<ir::Program>,
    pub stats: Option<OptimizationStats>,
    pub diagnostics: Diagnostics,
}

impl Compilation<'_> {
    pub fn succeeded(&self) -> bool {
        !self.diagnostics.has_errors() && self.optimized_ir.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub output: String,
    pub diagnostics: Diagnostics,
    pub state: VmState,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == VmState::Halted(HaltReason::Finished)
    }
}

pub fn compile(source: &str) -> Compilation<'_> {
    compile_with(source, &Config::default())
}

pub fn compile_with<'src>(source: &'src str, config: &Config) -> Compilation<'src> {
    let mut compilation = Compilation::default();
    run_stages(source, config, &mut compilation);
    compilation.diagnostics.attach_context(source);
    debug!(
        diagnostics = compilation.diagnostics.len(),
        succeeded = compilation.succeeded(),
        "compilation finished"
    );
    compilation
}

fn run_stages<'src>(source: &'src str, config: &Config, out: &mut Compilation<'src>) {
    let (tokens, lex_errors) = {
        let _span = info_span!("lex").entered();
        let (tokens, errors) = lexer::tokenize(source);
        debug!(tokens = tokens.len(), errors = errors.len(), "lexed");
        (tokens, errors)
    };
    if !lex_errors.is_empty() {
        out.tokens = Some(tokens);
        for error in lex_errors {
            out.diagnostics.push(error.into());
        }
        return;
    }

    let (program, parse_diagnostics) = {
        let _span = info_span!("parse").entered();
        let (program, diagnostics) = parser::parse(&tokens);
        debug!(
            statements = program.statements.len(),
            diagnostics = diagnostics.len(),
            "parsed"
        );
        (program, diagnostics)
    };
    out.tokens = Some(tokens);
    out.diagnostics.extend(parse_diagnostics);
    if out.diagnostics.has_errors() {
        return;
    }

    let analysis = {
        let _span = info_span!("analyze").entered();
        let analysis = semantic::analyze_with(&program, &config.suggestions);
        debug!(
            symbols = analysis.symbols.symbols.len(),
            diagnostics = analysis.diagnostics.len(),
            "analyzed"
        );
        analysis
    };
    out.diagnostics.extend(analysis.diagnostics);
    out.symbols = Some(analysis.symbols);
    let program = out.ast.insert(program);
    if out.diagnostics.has_errors() {
        return;
    }

    let lowered = {
        let _span = info_span!("lower").entered();
        let lowered = ir::lower(program);
        if let Ok(program) = &lowered {
            debug!(instructions = program.code.len(), "lowered");
        }
        lowered
    };
    let program = match lowered {
        Ok(program) => program,
        Err(error) => {
            out.diagnostics.push(lowering_diagnostic(&error));
            return;
        }
    };

    let (optimized, stats) = if config.optimize {
        optimizer::optimize_with(&program, &config.optimizer)
    } else {
        (program.clone(), OptimizationStats::default())
    };
    out.ir = Some(program);
    out.optimized_ir = Some(optimized);
    out.stats = Some(stats);
}

fn lowering_diagnostic(error: &IrError) -> Diagnostic {
    Diagnostic::error(Phase::Semantic, error.to_string(), error.line(), 1)
}

/// Runs `program` to completion, answering `input` requests from `input`.
/// An exhausted input source cancels the run.
pub fn run(program: &ir::Program, input: &mut dyn InputSource, config: &VmConfig) -> RunOutcome {
    let _span = info_span!("run").entered();
    let mut vm = match Vm::new(program, config.clone()) {
        Ok(vm) => vm,
        Err(error) => {
            let mut diagnostics = Diagnostics::new();
            diagnostics.push(Diagnostic::error(
                Phase::Runtime,
                error.to_string(),
                error.line(),
                1,
            ));
            return RunOutcome {
                output: String::new(),
                diagnostics,
                state: VmState::Halted(HaltReason::Fault),
            };
        }
    };

    let mut state = vm.resume();
    while !state.is_halted() {
        state = match state {
            VmState::AwaitingInput => match input.read_line() {
                Some(line) => vm.provide_input(&line),
                None => vm.cancel_input(),
            },
            _ => vm.resume(),
        };
    }
    debug!(?state, steps = vm.instructions_executed(), "run finished");

    let (output, diagnostics) = vm.into_parts();
    RunOutcome {
        output,
        diagnostics,
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::ScriptedInput;
    use indoc::indoc;

    fn run_source(source: &str, lines: &[&str]) -> RunOutcome {
        let compilation = compile(source);
        assert!(compilation.succeeded(), "{:?}", compilation.diagnostics);
        let program = compilation.optimized_ir.expect("optimized");
        let mut input = ScriptedInput::new(lines.iter().copied());
        run(&program, &mut input, &VmConfig::default())
    }

    #[test]
    fn stops_after_a_failing_stage() {
        let compilation = compile("int x = \nprint y\n");
        assert!(compilation.tokens.is_some());
        assert!(compilation.ast.is_none());
        assert!(compilation.symbols.is_none());
        assert!(compilation.ir.is_none());
        assert!(
            compilation
                .diagnostics
                .iter()
                .all(|d| d.phase == Phase::Syntax)
        );
    }

    #[test]
    fn semantic_errors_keep_symbols_but_skip_lowering() {
        let compilation = compile("int total = 1\nprint totl\n");
        assert!(compilation.symbols.is_some());
        assert!(compilation.ir.is_none());
        let error = compilation.diagnostics.errors().next().expect("error");
        assert_eq!(error.suggestions, vec!["total".to_string()]);
        assert_eq!(error.context_line.as_deref(), Some("print totl"));
    }

    #[test]
    fn warnings_do_not_block_execution() {
        let compilation = compile("int unused = 3\nprint 1\n");
        assert!(compilation.succeeded());
        assert_eq!(compilation.diagnostics.warnings().count(), 1);
    }

    #[test]
    fn disabled_optimizer_passes_code_through() {
        let config = Config {
            optimize: false,
            ..Config::default()
        };
        let compilation = compile_with("print 1 + 2\n", &config);
        assert_eq!(compilation.ir, compilation.optimized_ir);
        assert_eq!(compilation.stats, Some(OptimizationStats::default()));
    }

    #[test]
    fn answers_input_from_the_source() {
        let outcome = run_source(
            indoc! {"
                string name = \"\"
                int count = 0
                input name
                input count
                repeat count times:
                    print name
                end
            "},
            &["ada", "2"],
        );
        assert!(outcome.succeeded());
        assert_eq!(outcome.output, "ada\nada\n");
    }

    #[test]
    fn exhausted_input_cancels_the_run() {
        let outcome = run_source("int n = 0\nprint 1\ninput n\nprint n\n", &[]);
        assert_eq!(outcome.state, VmState::Halted(HaltReason::Cancelled));
        assert_eq!(outcome.output, "1\n");
        let messages: Vec<_> = outcome.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["Input cancelled"]);
    }
}
