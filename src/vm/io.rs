use std::collections::VecDeque;
use std::io::{self, BufRead};

/// Supplies lines for `input` statements. `None` means the source is
/// exhausted and the run is cancelled.
pub trait InputSource {
    fn read_line(&mut self) -> Option<String>;
}

/// Input lines fixed up front, as used by tests and batch runs.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl InputSource for ScriptedInput {
    fn read_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }
}

/// Reads lines from the process's standard input.
#[derive(Debug, Default)]
pub struct StdinInput;

impl InputSource for StdinInput {
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }
}
