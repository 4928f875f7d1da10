use anyhow::{Context, Result, ensure};
use std::path::Path;

use calcscript::config::VmConfig;
use calcscript::diagnostics::{Diagnostics, Phase};
use calcscript::vm::ScriptedInput;
use calcscript::{compile, run};
use test_support::{Case, CaseClass, load_cases, normalize_output};

fn check_diagnostics(case: &Case, diagnostics: &Diagnostics) -> Result<()> {
    for expected in &case.spec.expected.diagnostic_contains {
        ensure!(
            diagnostics
                .iter()
                .any(|diagnostic| diagnostic.message.contains(expected.as_str())),
            "Case {}: no diagnostic contains '{}', got {:?}",
            case.name,
            expected,
            diagnostics
        );
    }
    if !case.spec.expected.suggestions.is_empty() {
        let first = diagnostics
            .errors()
            .next()
            .with_context(|| format!("Case {} expected an error", case.name))?;
        ensure!(
            first.suggestions == case.spec.expected.suggestions,
            "Case {}: expected suggestions {:?}, got {:?}",
            case.name,
            case.spec.expected.suggestions,
            first.suggestions
        );
    }
    Ok(())
}

fn check_stdout(case: &Case, output: &str) -> Result<()> {
    if let Some(expected) = case.expected_stdout()? {
        assert_eq!(
            normalize_output(output),
            normalize_output(&expected),
            "Output mismatch for {}",
            case.name
        );
    }
    Ok(())
}

fn run_case(case: &Case) -> Result<()> {
    let source = case.source()?;
    let compilation = compile(&source);

    if case.spec.class == CaseClass::CompileError {
        ensure!(
            compilation.diagnostics.has_errors(),
            "Case {} was expected to fail compilation",
            case.name
        );
        ensure!(
            compilation.optimized_ir.is_none(),
            "Case {} produced code despite errors",
            case.name
        );
        return check_diagnostics(case, &compilation.diagnostics);
    }

    ensure!(
        compilation.succeeded(),
        "Case {} failed to compile: {:?}",
        case.name,
        compilation.diagnostics
    );
    let program = compilation
        .optimized_ir
        .as_ref()
        .with_context(|| format!("Case {} has no code", case.name))?;
    let mut input = ScriptedInput::new(case.spec.input.clone());
    let outcome = run(program, &mut input, &VmConfig::default());

    match case.spec.class {
        CaseClass::RuntimeSuccess => ensure!(
            outcome.succeeded(),
            "Case {} halted early: {:?}",
            case.name,
            outcome.diagnostics
        ),
        CaseClass::RuntimeError => {
            ensure!(
                outcome
                    .diagnostics
                    .errors()
                    .any(|diagnostic| diagnostic.phase == Phase::Runtime),
                "Case {} was expected to fault",
                case.name
            );
            check_diagnostics(case, &outcome.diagnostics)?;
        }
        CaseClass::CompileError => unreachable!("handled above"),
    }
    check_stdout(case, &outcome.output)
}

#[test]
fn runs_all_program_cases() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;
    for case in &cases {
        run_case(case)?;
    }
    Ok(())
}

#[test]
fn every_class_is_covered() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;
    for class in [
        CaseClass::RuntimeSuccess,
        CaseClass::CompileError,
        CaseClass::RuntimeError,
    ] {
        ensure!(
            cases.iter().any(|case| case.spec.class == class),
            "No case of class {class:?}"
        );
    }
    Ok(())
}
