use std::path::Path;

use anyhow::{Context, Result, ensure};
use test_support::{CaseClass, load_cases, normalize_output};

use crate::config::VmConfig;
use crate::pipeline::{compile, run};
use crate::vm::ScriptedInput;

#[test]
fn raw_and_optimized_code_agree() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;
    let mut checked = 0;

    for case in cases {
        if case.spec.class != CaseClass::RuntimeSuccess {
            continue;
        }
        let source = case.source()?;
        let compilation = compile(&source);
        ensure!(
            compilation.succeeded(),
            "Case {} failed to compile: {:?}",
            case.name,
            compilation.diagnostics
        );
        let raw = compilation
            .ir
            .as_ref()
            .with_context(|| format!("Case {} has no TAC", case.name))?;
        let optimized = compilation
            .optimized_ir
            .as_ref()
            .with_context(|| format!("Case {} has no optimized TAC", case.name))?;

        let config = VmConfig::default();
        let before = run(raw, &mut ScriptedInput::new(case.spec.input.clone()), &config);
        let after = run(
            optimized,
            &mut ScriptedInput::new(case.spec.input.clone()),
            &config,
        );
        ensure!(
            before.succeeded() && after.succeeded(),
            "Case {} did not finish: {:?} / {:?}",
            case.name,
            before.diagnostics,
            after.diagnostics
        );
        ensure!(
            normalize_output(&before.output) == normalize_output(&after.output),
            "Optimization changed the output of {}:\n--- raw\n{}\n--- optimized\n{}",
            case.name,
            before.output,
            after.output
        );
        checked += 1;
    }

    ensure!(checked > 0, "No runtime_success cases found");
    Ok(())
}
