//! Breakpoints, stepping and state inspection for a paused [`Vm`].
use std::iter;

use rustc_hash::FxHashMap;

use super::{Frame, Vm, VmState};
use crate::runtime::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// Pause at the next instruction, entering calls.
    Into,
    /// Pause at the next instruction in the current frame or a caller.
    Over,
    /// Pause once the current frame has returned.
    Out,
}

impl StepMode {
    pub(super) fn satisfied(self, depth: usize, start: usize) -> bool {
        match self {
            StepMode::Into => true,
            StepMode::Over => depth <= start,
            StepMode::Out => depth < start,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub function: String,
    pub entry_line: usize,
    /// The next line to run in the innermost frame; the calling line in the others.
    pub current_line: Option<usize>,
    /// Locals sorted by name.
    pub variables: Vec<(String, Value)>,
}

/// Copy of the VM's visible state. Temporaries are not included.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub globals: Vec<(String, Value)>,
    /// Outermost frame first.
    pub call_stack: Vec<FrameSnapshot>,
}

impl Snapshot {
    /// Looks a name up the way the running code would see it: innermost
    /// frame first, then globals.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        let local = self
            .call_stack
            .last()
            .and_then(|frame| find(&frame.variables, name));
        local.or_else(|| find(&self.globals, name))
    }

    pub fn depth(&self) -> usize {
        self.call_stack.len()
    }
}

fn find<'a>(variables: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    variables
        .iter()
        .find(|(slot, _)| slot == name)
        .map(|(_, value)| value)
}

fn sorted(store: &FxHashMap<String, Value>) -> Vec<(String, Value)> {
    let mut variables: Vec<_> = store
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    variables.sort_by(|a, b| a.0.cmp(&b.0));
    variables
}

impl Vm {
    /// Returns `false` if the breakpoint was already set.
    pub fn add_breakpoint(&mut self, line: usize) -> bool {
        self.breakpoints.insert(line)
    }

    pub fn remove_breakpoint(&mut self, line: usize) -> bool {
        self.breakpoints.remove(&line)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = usize> + '_ {
        self.breakpoints.iter().copied()
    }

    /// Requests a pause before the next instruction.
    pub fn pause(&mut self) {
        if !self.state.is_halted() {
            self.pause_requested = true;
        }
    }

    pub fn step_into(&mut self) -> VmState {
        self.step(StepMode::Into)
    }

    pub fn step_over(&mut self) -> VmState {
        self.step(StepMode::Over)
    }

    pub fn step_out(&mut self) -> VmState {
        self.step(StepMode::Out)
    }

    fn step(&mut self, mode: StepMode) -> VmState {
        if !matches!(self.state, VmState::Ready | VmState::Paused(_)) {
            return self.state;
        }
        self.step = Some((mode, self.depth()));
        self.resume_at = Some(self.pc);
        self.drive(None)
    }

    pub fn inspect(&self) -> Snapshot {
        let frames: Vec<&Frame> = iter::once(&self.main).chain(&self.calls).collect();
        let innermost = frames.len() - 1;
        let call_stack = frames
            .into_iter()
            .enumerate()
            .map(|(index, frame)| FrameSnapshot {
                function: frame.function.clone(),
                entry_line: frame.entry_line,
                current_line: if index == innermost && !self.state.is_halted() {
                    self.current_line()
                } else {
                    frame.line
                },
                variables: sorted(&frame.locals),
            })
            .collect();

        Snapshot {
            globals: sorted(&self.globals),
            call_stack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;
    use crate::pipeline::compile;
    use crate::vm::{HaltReason, MAIN_FRAME, PauseReason};
    use indoc::indoc;

    const PROGRAM: &str = indoc! {"
        function int double(int v):
            int r = v * 2
            return r
        end
        int total = 0
        for int i = 0; i < 3; i = i + 1:
            total = total + double(i)
        end
        print total
    "};

    fn vm(source: &str) -> Vm {
        let compilation = compile(source);
        let program = compilation.ir.expect("lowered");
        Vm::new(&program, VmConfig::default()).expect("labels resolve")
    }

    #[test]
    fn breakpoint_fires_once_per_loop_iteration() {
        let mut vm = vm(PROGRAM);
        vm.add_breakpoint(7);
        let mut hits = 0;
        while let VmState::Paused(PauseReason::Breakpoint(line)) = vm.resume() {
            assert_eq!(line, 7);
            hits += 1;
        }
        assert_eq!(hits, 3);
        assert_eq!(vm.state(), VmState::Halted(HaltReason::Finished));
        assert_eq!(vm.output(), "6\n");
    }

    #[test]
    fn inspects_frames_inside_a_call() {
        let mut vm = vm(PROGRAM);
        vm.add_breakpoint(3);
        assert_eq!(vm.resume(), VmState::Paused(PauseReason::Breakpoint(3)));

        let snapshot = vm.inspect();
        let functions: Vec<_> = snapshot
            .call_stack
            .iter()
            .map(|frame| frame.function.as_str())
            .collect();
        assert_eq!(functions, vec![MAIN_FRAME, "double"]);
        assert_eq!(snapshot.call_stack[1].entry_line, 1);
        assert_eq!(snapshot.call_stack[1].current_line, Some(3));
        assert_eq!(snapshot.call_stack[0].current_line, Some(7));
        assert_eq!(snapshot.variable("r"), Some(&Value::Int(0)));
        assert_eq!(snapshot.variable("v"), Some(&Value::Int(0)));
        assert_eq!(snapshot.variable("total"), Some(&Value::Int(0)));
        assert!(snapshot.variable("t0").is_none());
    }

    #[test]
    fn step_out_returns_to_the_caller() {
        let mut vm = vm(PROGRAM);
        vm.add_breakpoint(2);
        assert_eq!(vm.resume(), VmState::Paused(PauseReason::Breakpoint(2)));
        assert_eq!(vm.depth(), 2);
        vm.remove_breakpoint(2);

        assert_eq!(vm.step_out(), VmState::Paused(PauseReason::Step));
        assert_eq!(vm.depth(), 1);
        assert_eq!(vm.current_line(), Some(7));
    }

    #[test]
    fn step_over_skips_the_callee() {
        let mut vm = vm(PROGRAM);
        vm.add_breakpoint(7);
        assert_eq!(vm.resume(), VmState::Paused(PauseReason::Breakpoint(7)));
        vm.remove_breakpoint(7);

        for _ in 0..20 {
            match vm.step_over() {
                VmState::Paused(PauseReason::Step) => assert_eq!(vm.depth(), 1),
                other => {
                    assert_eq!(other, VmState::Halted(HaltReason::Finished));
                    break;
                }
            }
        }
    }

    #[test]
    fn step_into_enters_the_callee() {
        let mut vm = vm(PROGRAM);
        vm.add_breakpoint(7);
        vm.resume();
        let mut entered = false;
        for _ in 0..20 {
            vm.step_into();
            if vm.depth() == 2 {
                entered = true;
                break;
            }
        }
        assert!(entered);
        assert_eq!(vm.current_line(), Some(2));
    }

    #[test]
    fn pause_request_and_stop() {
        let mut vm = vm(PROGRAM);
        vm.pause();
        assert_eq!(vm.resume(), VmState::Paused(PauseReason::Requested));
        assert_eq!(vm.run_steps(2), VmState::Paused(PauseReason::Budget));
        assert_eq!(vm.stop(), VmState::Halted(HaltReason::Stopped));
        assert_eq!(vm.resume(), VmState::Halted(HaltReason::Stopped));
        assert_eq!(vm.output(), "");
    }

    #[test]
    fn breakpoints_are_listed_in_order() {
        let mut vm = vm(PROGRAM);
        assert!(vm.add_breakpoint(9));
        assert!(vm.add_breakpoint(2));
        assert!(!vm.add_breakpoint(9));
        assert_eq!(vm.breakpoints().collect::<Vec<_>>(), vec![2, 9]);
        assert!(vm.remove_breakpoint(9));
        assert_eq!(vm.breakpoints().collect::<Vec<_>>(), vec![2]);
    }
}
