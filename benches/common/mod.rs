#![allow(dead_code)]
use std::path::Path;

use calcscript::compile;
use calcscript::ir::Program;
use test_support::load_cases;

/// `(name, source)` for every fixture marked `bench: true`.
pub fn workloads() -> Vec<(String, String)> {
    let cases = load_cases(Path::new("tests/programs")).unwrap_or_else(|err| panic!("{err:#}"));
    cases
        .into_iter()
        .filter(|case| case.spec.bench)
        .map(|case| {
            let source = case.source().unwrap_or_else(|err| panic!("{err:#}"));
            (case.name, source)
        })
        .collect()
}

pub fn lowered(source: &str) -> Program {
    compile(source).ir.expect("program compiles")
}

pub fn optimized(source: &str) -> Program {
    compile(source).optimized_ir.expect("program compiles")
}
