//! TAC optimizer: an ordered set of passes repeated until nothing changes.
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info_span};

use crate::config::OptimizerConfig;
use crate::ir::{Instruction, Opcode, Operand, Place, Program};

pub mod dce;
pub mod fold;
pub mod peephole;
pub mod propagate;
pub mod strength;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationStats {
    pub constant_folds: usize,
    pub constant_propagations: usize,
    pub dead_code_removed: usize,
    pub peephole_rewrites: usize,
    pub strength_reductions: usize,
    /// Rounds of the pass set that changed the program.
    pub rounds: usize,
}

impl OptimizationStats {
    pub fn total_rewrites(&self) -> usize {
        self.constant_folds
            + self.constant_propagations
            + self.dead_code_removed
            + self.peephole_rewrites
            + self.strength_reductions
    }
}

pub fn optimize(program: &Program) -> (Program, OptimizationStats) {
    optimize_with(program, &OptimizerConfig::default())
}

pub fn optimize_with(program: &Program, config: &OptimizerConfig) -> (Program, OptimizationStats) {
    let _span = info_span!("optimize").entered();
    let mut code = program.code.clone();
    let mut stats = OptimizationStats::default();

    for round in 0..config.max_rounds {
        let folds = fold::run(&mut code);
        let propagations = propagate::run(&mut code);
        let removed = dce::run(&mut code);
        let peephole = peephole::run(&mut code);
        let reductions = strength::run(&mut code);
        debug!(
            round,
            folds, propagations, removed, peephole, reductions, "optimizer round"
        );

        stats.constant_folds += folds;
        stats.constant_propagations += propagations;
        stats.dead_code_removed += removed;
        stats.peephole_rewrites += peephole;
        stats.strength_reductions += reductions;
        if folds + propagations + removed + peephole + reductions == 0 {
            break;
        }
        stats.rounds += 1;
    }

    debug!(
        before = program.code.len(),
        after = code.len(),
        "optimization finished"
    );
    let optimized = Program {
        code,
        functions: program.functions.clone(),
    };
    (optimized, stats)
}

/// Per-temporary definition and read counts over the whole listing.
#[derive(Debug, Default)]
pub(crate) struct TempUsage {
    defs: FxHashMap<u32, usize>,
    reads: FxHashMap<u32, usize>,
}

impl TempUsage {
    pub(crate) fn scan(code: &[Instruction]) -> Self {
        let mut usage = Self::default();
        for instruction in code {
            if let Some(Place::Temp(id)) = instruction.op.dest() {
                *usage.defs.entry(*id).or_default() += 1;
            }
            if let Opcode::StoreIndex {
                base: Place::Temp(id),
                ..
            } = &instruction.op
            {
                *usage.reads.entry(*id).or_default() += 1;
            }
            for operand in instruction.op.operands() {
                if let Operand::Temp(id) = operand {
                    *usage.reads.entry(*id).or_default() += 1;
                }
            }
        }
        usage
    }

    pub(crate) fn defs(&self, temp: u32) -> usize {
        self.defs.get(&temp).copied().unwrap_or(0)
    }

    pub(crate) fn reads(&self, temp: u32) -> usize {
        self.reads.get(&temp).copied().unwrap_or(0)
    }
}
