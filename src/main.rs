use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use tracing_subscriber::EnvFilter;

use calcscript::config::Config;
use calcscript::diagnostics::Diagnostics;
use calcscript::vm::StdinInput;
use calcscript::{Compilation, compile_with, run};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emit {
    Tokens,
    Ast,
    Symbols,
    Tac,
    Optimized,
    Stats,
}

impl Emit {
    fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "tokens" => Emit::Tokens,
            "ast" => Emit::Ast,
            "symbols" => Emit::Symbols,
            "tac" => Emit::Tac,
            "optimized" => Emit::Optimized,
            "stats" => Emit::Stats,
            other => bail!("Unknown --emit target '{other}'"),
        })
    }
}

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    emit: Vec<Emit>,
    run: bool,
    input: Option<PathBuf>,
}

fn parse_args() -> Result<Options> {
    let mut args = std::env::args().skip(1);
    let mut options = Options {
        run: true,
        ..Options::default()
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing path after {arg}"))?;
                options.config = Some(path.into());
            }
            "--emit" | "-e" => {
                let target = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing target after {arg}"))?;
                options.emit.push(Emit::from_name(&target)?);
            }
            "--no-run" => options.run = false,
            _ => {
                if options.input.is_some() {
                    bail!("Only one input file is supported");
                }
                options.input = Some(arg.into());
            }
        }
    }
    Ok(options)
}

fn emit(compilation: &Compilation<'_>, target: Emit) -> Result<()> {
    match target {
        Emit::Tokens => {
            for token in compilation.tokens.iter().flatten() {
                println!("{}:{}\t{}", token.span.line, token.span.column, token.kind);
            }
        }
        Emit::Ast => {
            if let Some(ast) = &compilation.ast {
                println!("{ast:#?}");
            }
        }
        Emit::Symbols => {
            if let Some(symbols) = &compilation.symbols {
                print!(
                    "{}",
                    serde_yaml::to_string(symbols).context("Serializing symbols")?
                );
            }
        }
        Emit::Tac => {
            if let Some(ir) = &compilation.ir {
                print!("{ir}");
            }
        }
        Emit::Optimized => {
            if let Some(ir) = &compilation.optimized_ir {
                print!("{ir}");
            }
        }
        Emit::Stats => {
            if let Some(stats) = &compilation.stats {
                print!(
                    "{}",
                    serde_yaml::to_string(stats).context("Serializing statistics")?
                );
            }
        }
    }
    Ok(())
}

fn report(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics {
        eprintln!("{diagnostic}");
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let options = parse_args()?;
    let config = match &options.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let source = if let Some(path) = &options.input {
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let compilation = compile_with(&source, &config);
    for target in &options.emit {
        emit(&compilation, *target)?;
    }
    report(&compilation.diagnostics);
    if !compilation.succeeded() {
        return Ok(ExitCode::FAILURE);
    }
    if !options.run {
        return Ok(ExitCode::SUCCESS);
    }

    let Some(program) = &compilation.optimized_ir else {
        return Ok(ExitCode::FAILURE);
    };
    let mut outcome = run(program, &mut StdinInput, &config.vm);
    print!("{}", outcome.output);
    outcome.diagnostics.attach_context(&source);
    report(&outcome.diagnostics);

    Ok(if outcome.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
