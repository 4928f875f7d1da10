//! Interpreter for three-address code.
//!
//! The VM is an explicit state machine. Hosts drive it with [`Vm::resume`],
//! [`Vm::run_steps`] or one of the stepping controls; each call runs until the
//! program halts, pauses, or needs input, and then hands control back.
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::ast::Storage;
use crate::builtins::AngleMode;
use crate::config::VmConfig;
use crate::diagnostics::{Diagnostic, Diagnostics, Phase};
use crate::ir::{
    CallTarget, FunctionInfo, Instruction, IrError, LabelId, Opcode, Operand, Place, Program,
    Variable,
};
use crate::runtime::{self, Matrix, RuntimeFault, RuntimeResult, Value};
use crate::types::Type;

pub mod debugger;
pub mod io;

pub use debugger::{FrameSnapshot, Snapshot, StepMode};
pub use io::{InputSource, ScriptedInput, StdinInput};

/// Name of the frame running top-level code.
pub const MAIN_FRAME: &str = "<main>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    Breakpoint(usize),
    Step,
    Requested,
    /// The instruction budget given to [`Vm::run_steps`] ran out.
    Budget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    Finished,
    Fault,
    Stopped,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Ready,
    Running,
    Paused(PauseReason),
    AwaitingInput,
    Halted(HaltReason),
}

impl VmState {
    pub fn is_halted(self) -> bool {
        matches!(self, VmState::Halted(_))
    }
}

#[derive(Debug, Clone)]
struct Frame {
    function: String,
    entry_line: usize,
    /// Line of the instruction this frame last executed.
    line: Option<usize>,
    locals: FxHashMap<String, Value>,
    temps: FxHashMap<u32, Value>,
    return_address: usize,
    returns_value: bool,
}

impl Frame {
    fn new(function: &str, entry_line: usize, return_address: usize, returns_value: bool) -> Self {
        Self {
            function: function.to_string(),
            entry_line,
            line: None,
            locals: FxHashMap::default(),
            temps: FxHashMap::default(),
            return_address,
            returns_value,
        }
    }
}

enum Flow {
    Next,
    Jump(usize),
    Halt,
    AwaitInput,
}

pub struct Vm {
    code: Rc<[Instruction]>,
    functions: FxHashMap<String, Rc<FunctionInfo>>,
    labels: FxHashMap<LabelId, usize>,
    config: VmConfig,
    angle_mode: AngleMode,
    state: VmState,
    pc: usize,
    globals: FxHashMap<String, Value>,
    main: Frame,
    calls: Vec<Frame>,
    args: Vec<Value>,
    return_value: Option<Value>,
    pending_input: Option<(Place, Type)>,
    output: String,
    diagnostics: Diagnostics,
    breakpoints: BTreeSet<usize>,
    step: Option<(StepMode, usize)>,
    pause_requested: bool,
    /// Instruction the VM paused before; it runs without re-checking pause
    /// points when execution continues.
    resume_at: Option<usize>,
    executed: u64,
}

impl Vm {
    pub fn new(program: &Program, config: VmConfig) -> Result<Self, IrError> {
        let labels = program.resolve_labels()?;
        let functions = program
            .functions
            .iter()
            .map(|function| (function.name.clone(), Rc::new(function.clone())))
            .collect();
        let entry_line = program.code.first().map_or(0, |instruction| instruction.line);

        Ok(Self {
            code: program.code.clone().into(),
            functions,
            labels,
            angle_mode: config.angle_mode,
            config,
            state: VmState::Ready,
            pc: 0,
            globals: FxHashMap::default(),
            main: Frame::new(MAIN_FRAME, entry_line, 0, false),
            calls: Vec::new(),
            args: Vec::new(),
            return_value: None,
            pending_input: None,
            output: String::new(),
            diagnostics: Diagnostics::new(),
            breakpoints: BTreeSet::new(),
            step: None,
            pause_requested: false,
            resume_at: None,
            executed: 0,
        })
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (String, Diagnostics) {
        (self.output, self.diagnostics)
    }

    /// Source line of the next instruction to execute.
    pub fn current_line(&self) -> Option<usize> {
        self.code.get(self.pc).map(|instruction| instruction.line)
    }

    /// Number of active frames, including the top-level one.
    pub fn depth(&self) -> usize {
        self.calls.len() + 1
    }

    pub fn instructions_executed(&self) -> u64 {
        self.executed
    }

    /// Runs until the program halts, pauses or asks for input.
    pub fn resume(&mut self) -> VmState {
        self.drive(None)
    }

    /// Like [`Vm::resume`], but pauses after at most `budget` instructions.
    pub fn run_steps(&mut self, budget: u64) -> VmState {
        self.drive(Some(budget))
    }

    /// Answers a pending `input` and continues running.
    pub fn provide_input(&mut self, text: &str) -> VmState {
        if self.state != VmState::AwaitingInput {
            return self.state;
        }
        let Some((dest, ty)) = self.pending_input.take() else {
            return self.state;
        };
        match Value::parse_input(text, &ty) {
            Ok(value) => {
                self.write(&dest, value);
                self.pc += 1;
                self.transition(VmState::Running);
                self.drive(None)
            }
            Err(fault) => {
                self.fault(fault);
                self.state
            }
        }
    }

    /// Cancels a pending `input`, halting the run. Output produced so far is
    /// kept.
    pub fn cancel_input(&mut self) -> VmState {
        if self.state == VmState::AwaitingInput {
            self.pending_input = None;
            self.fault(RuntimeFault::InputCancelled);
            self.transition(VmState::Halted(HaltReason::Cancelled));
        }
        self.state
    }

    pub fn stop(&mut self) -> VmState {
        if !self.state.is_halted() {
            self.pending_input = None;
            self.transition(VmState::Halted(HaltReason::Stopped));
        }
        self.state
    }

    fn transition(&mut self, next: VmState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, pc = self.pc, "vm state");
            self.state = next;
        }
    }

    fn drive(&mut self, budget: Option<u64>) -> VmState {
        if !matches!(
            self.state,
            VmState::Ready | VmState::Running | VmState::Paused(_)
        ) {
            return self.state;
        }
        self.transition(VmState::Running);

        let code = Rc::clone(&self.code);
        let mut remaining = budget;
        loop {
            if remaining == Some(0) {
                self.transition(VmState::Paused(PauseReason::Budget));
                return self.state;
            }
            let Some(instruction) = code.get(self.pc) else {
                self.transition(VmState::Halted(HaltReason::Finished));
                return self.state;
            };

            let is_label = matches!(instruction.op, Opcode::Label(_));
            if !is_label
                && self.resume_at != Some(self.pc)
                && let Some(reason) = self.pause_reason(instruction.line)
            {
                self.step = None;
                self.pause_requested = false;
                self.resume_at = Some(self.pc);
                self.transition(VmState::Paused(reason));
                return self.state;
            }
            self.resume_at = None;

            match self.execute(instruction) {
                Ok(Flow::Next) => self.pc += 1,
                Ok(Flow::Jump(target)) => self.pc = target,
                Ok(Flow::Halt) => {
                    self.transition(VmState::Halted(HaltReason::Finished));
                    return self.state;
                }
                Ok(Flow::AwaitInput) => {
                    self.transition(VmState::AwaitingInput);
                    return self.state;
                }
                Err(fault) => {
                    self.fault(fault);
                    return self.state;
                }
            }
            if let Some(remaining) = remaining.as_mut() {
                *remaining -= 1;
            }
        }
    }

    fn pause_reason(&self, line: usize) -> Option<PauseReason> {
        if self.pause_requested {
            return Some(PauseReason::Requested);
        }
        let entering_line = self.frame().line != Some(line);
        if entering_line && self.breakpoints.contains(&line) {
            return Some(PauseReason::Breakpoint(line));
        }
        match self.step {
            Some((mode, depth)) if mode.satisfied(self.depth(), depth) => Some(PauseReason::Step),
            _ => None,
        }
    }

    fn fault(&mut self, fault: RuntimeFault) {
        let line = self.current_line().unwrap_or(0);
        debug!(line, %fault, "runtime fault");
        self.diagnostics.push(Diagnostic::error(
            Phase::Runtime,
            fault.to_string(),
            line,
            1,
        ));
        self.transition(VmState::Halted(HaltReason::Fault));
    }

    fn frame(&self) -> &Frame {
        self.calls.last().unwrap_or(&self.main)
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.calls.last_mut().unwrap_or(&mut self.main)
    }

    fn label(&self, label: &LabelId) -> RuntimeResult<usize> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| RuntimeFault::UnknownLabel {
                label: label.to_string(),
            })
    }

    fn temp(&self, id: u32) -> RuntimeResult<&Value> {
        self.frame()
            .temps
            .get(&id)
            .ok_or_else(|| RuntimeFault::UndefinedVariable {
                name: format!("t{id}"),
            })
    }

    fn variable(&self, variable: &Variable) -> RuntimeResult<&Value> {
        let store = match variable.storage {
            Storage::Global => &self.globals,
            Storage::Local => &self.frame().locals,
        };
        store
            .get(&variable.name)
            .ok_or_else(|| RuntimeFault::UndefinedVariable {
                name: variable.name.clone(),
            })
    }

    fn lookup_mut(&mut self, place: &Place) -> RuntimeResult<&mut Value> {
        let value = match place {
            Place::Temp(id) => self.frame_mut().temps.get_mut(id),
            Place::Var(variable) => match variable.storage {
                Storage::Global => self.globals.get_mut(&variable.name),
                Storage::Local => self.frame_mut().locals.get_mut(&variable.name),
            },
        };
        value.ok_or_else(|| RuntimeFault::UndefinedVariable {
            name: place.to_string(),
        })
    }

    fn write(&mut self, place: &Place, value: Value) {
        match place {
            Place::Temp(id) => {
                self.frame_mut().temps.insert(*id, value);
            }
            Place::Var(variable) => {
                let store = match variable.storage {
                    Storage::Global => &mut self.globals,
                    Storage::Local => &mut self.frame_mut().locals,
                };
                store.insert(variable.name.clone(), value);
            }
        }
    }

    fn operand(&self, operand: &Operand) -> RuntimeResult<Cow<'_, Value>> {
        match operand {
            Operand::Const(constant) => Ok(Cow::Owned(constant.to_value())),
            Operand::ReturnSlot => self.return_value.as_ref().map(Cow::Borrowed).ok_or(
                RuntimeFault::UnexpectedValue {
                    expected: "return value",
                    found: "void",
                },
            ),
            Operand::Temp(id) => self.temp(*id).map(Cow::Borrowed),
            Operand::Var(variable) => self.variable(variable).map(Cow::Borrowed),
        }
    }

    fn index(&self, operand: Option<&Operand>) -> RuntimeResult<Option<i64>> {
        operand
            .map(|operand| self.operand(operand)?.as_int())
            .transpose()
    }

    fn execute(&mut self, instruction: &Instruction) -> RuntimeResult<Flow> {
        if matches!(instruction.op, Opcode::Label(_)) {
            return Ok(Flow::Next);
        }
        self.executed += 1;
        if let Some(limit) = self.config.max_steps
            && self.executed > limit
        {
            return Err(RuntimeFault::StepLimitExceeded { limit });
        }
        self.frame_mut().line = Some(instruction.line);
        trace!(pc = self.pc, line = instruction.line, op = %instruction.op, "execute");

        match &instruction.op {
            Opcode::Assign { dest, value } => self.write(dest, value.to_value()),
            Opcode::Copy { dest, src } => {
                let value = self.operand(src)?.into_owned();
                self.write(dest, value);
            }
            Opcode::Binary {
                dest,
                op,
                left,
                right,
            } => {
                let value = runtime::binary(*op, &*self.operand(left)?, &*self.operand(right)?)?;
                self.write(dest, value);
            }
            Opcode::Unary { dest, op, operand } => {
                let value = runtime::unary(*op, &*self.operand(operand)?)?;
                self.write(dest, value);
            }
            Opcode::Label(_) => {}
            Opcode::Jump(target) => return Ok(Flow::Jump(self.label(target)?)),
            Opcode::JumpIfFalse { cond, target } => {
                if !self.operand(cond)?.as_bool()? {
                    return Ok(Flow::Jump(self.label(target)?));
                }
            }
            Opcode::Param(value) => {
                let value = self.operand(value)?.into_owned();
                self.args.push(value);
            }
            Opcode::Call { target, argc } => return self.call(target, *argc),
            Opcode::Return(value) => {
                let value = match value {
                    Some(value) => Some(self.operand(value)?.into_owned()),
                    None => None,
                };
                return self.return_from_call(value);
            }
            Opcode::Print { value, newline } => {
                let text = self.operand(value)?.to_string();
                self.output.push_str(&text);
                self.output.push(if *newline { '\n' } else { ' ' });
            }
            Opcode::Input { dest, ty } => {
                self.pending_input = Some((dest.clone(), ty.clone()));
                return Ok(Flow::AwaitInput);
            }
            Opcode::NewArray { dest, len } => self.write(dest, Value::Array(vec![Value::Void; *len])),
            Opcode::NewMatrix { dest, rows, cols } => {
                self.write(dest, Value::Matrix(Matrix::zeros(*rows, *cols)));
            }
            Opcode::LoadIndex {
                dest,
                base,
                row,
                col,
            } => {
                let row = self.operand(row)?.as_int()?;
                let col = self.index(col.as_ref())?;
                let value = self.operand(base)?.load_index(row, col)?;
                self.write(dest, value);
            }
            Opcode::StoreIndex {
                base,
                row,
                col,
                value,
            } => {
                let row = self.operand(row)?.as_int()?;
                let col = self.index(col.as_ref())?;
                let value = self.operand(value)?.into_owned();
                self.lookup_mut(base)?.store_index(row, col, value)?;
            }
            Opcode::Halt => return Ok(Flow::Halt),
        }
        Ok(Flow::Next)
    }

    fn call(&mut self, target: &CallTarget, argc: usize) -> RuntimeResult<Flow> {
        let start = self
            .args
            .len()
            .checked_sub(argc)
            .ok_or_else(|| RuntimeFault::ArityMismatch {
                name: target.name().to_string(),
                expected: argc,
                found: self.args.len(),
            })?;
        let args = self.args.split_off(start);

        let name = match target {
            CallTarget::Builtin(builtin) => {
                self.return_value = Some(builtin.call(&args, &mut self.angle_mode)?);
                return Ok(Flow::Next);
            }
            CallTarget::User(name) => name,
        };

        let function = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeFault::UndefinedFunction { name: name.clone() })?;
        if function.params.len() != args.len() {
            return Err(RuntimeFault::ArityMismatch {
                name: name.clone(),
                expected: function.params.len(),
                found: args.len(),
            });
        }
        if self.calls.len() >= self.config.max_call_depth {
            return Err(RuntimeFault::StackDepthExceeded {
                limit: self.config.max_call_depth,
            });
        }

        let entry = self.label(&function.label)?;
        let mut frame = Frame::new(
            &function.name,
            function.line,
            self.pc + 1,
            function.returns_value,
        );
        for (param, value) in function.params.iter().zip(args) {
            frame.locals.insert(param.name.clone(), value);
        }
        self.calls.push(frame);
        self.return_value = None;
        Ok(Flow::Jump(entry))
    }

    fn return_from_call(&mut self, value: Option<Value>) -> RuntimeResult<Flow> {
        if let Some(frame) = self.calls.last()
            && frame.returns_value
            && value.is_none()
        {
            return Err(RuntimeFault::MissingReturn {
                function: frame.function.clone(),
            });
        }
        let Some(frame) = self.calls.pop() else {
            return Ok(Flow::Halt);
        };
        self.return_value = value;
        Ok(Flow::Jump(frame.return_address))
    }
}
