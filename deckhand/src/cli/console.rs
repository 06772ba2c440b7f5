//! Line input for the session loop.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::VecDeque;
use std::io;

/// Result of one prompt read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// Ctrl-C: the current line is abandoned.
    Interrupted,
    /// Ctrl-D or closed input.
    Eof,
}

pub trait Console {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadOutcome>;

    fn add_history(&mut self, _line: &str) {}
}

/// Interactive console backed by rustyline.
pub struct ReadlineConsole {
    editor: DefaultEditor,
}

impl ReadlineConsole {
    pub fn new() -> io::Result<Self> {
        let editor = DefaultEditor::new().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Self { editor })
    }

    fn read_blocking(&mut self, prompt: &str) -> io::Result<ReadOutcome> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(ReadOutcome::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(ReadlineError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }
}

impl Console for ReadlineConsole {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadOutcome> {
        // Waiting on the terminal must not stall background watch tasks.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| self.read_blocking(prompt))
            }
            _ => self.read_blocking(prompt),
        }
    }

    fn add_history(&mut self, line: &str) {
        if !line.trim().is_empty() {
            let _ = self.editor.add_history_entry(line);
        }
    }
}

/// Replays a fixed list of outcomes, then reports end of input.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    outcomes: VecDeque<ReadOutcome>,
}

impl ScriptedConsole {
    pub fn new(outcomes: impl IntoIterator<Item = ReadOutcome>) -> Self {
        Self {
            outcomes: outcomes.into_iter().collect(),
        }
    }

    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(lines.into_iter().map(|l| ReadOutcome::Line(l.into())))
    }

    pub fn remaining(&self) -> usize {
        self.outcomes.len()
    }
}

impl Console for ScriptedConsole {
    fn read_line(&mut self, _prompt: &str) -> io::Result<ReadOutcome> {
        Ok(self.outcomes.pop_front().unwrap_or(ReadOutcome::Eof))
    }
}
