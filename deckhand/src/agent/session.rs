//! Session loop: successive queries, meta-commands and failure isolation.

use super::executor::{TurnError, TurnExecutor};
use super::memory::ConversationMemory;
use crate::capabilities::Inform;
use crate::cli::console::{Console, ReadOutcome};
use crate::cli::output::OutputFormatter;
use crate::text;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};

const EXIT_COMMANDS: &[&str] = &["exit", "quit"];
const ERROR_LOG_COMMAND: &str = "error_log";
const QUERY_PROMPT: &str = "> ";

/// What the session did with one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Blank line or comment.
    Skipped,
    Exit,
    /// Final answer of a turn; also appended to memory.
    Response(String),
    /// A gated action was rejected by the user.
    Rejected,
    /// The turn failed; the error is kept for `error_log`.
    Failure,
    /// Output of `error_log`.
    ErrorReport(String),
}

pub struct Session {
    executor: TurnExecutor,
    memory: ConversationMemory,
    last_error: Option<String>,
}

impl Session {
    pub fn new(executor: TurnExecutor, memory: ConversationMemory) -> Self {
        Self {
            executor,
            memory,
            last_error: None,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn executor(&self) -> &TurnExecutor {
        &self.executor
    }

    /// Handle one line of user input.
    pub async fn handle(&mut self, line: &str) -> SessionEvent {
        let query = line.trim();
        if query.is_empty() || query.starts_with('#') {
            return SessionEvent::Skipped;
        }
        if EXIT_COMMANDS.contains(&query) {
            return SessionEvent::Exit;
        }
        if query == ERROR_LOG_COMMAND {
            let report = self
                .last_error
                .clone()
                .unwrap_or_else(|| text::NO_ERROR.to_string());
            return SessionEvent::ErrorReport(report);
        }

        match self.executor.run(query, &self.memory).await {
            Ok(turn) => {
                info!("Turn finished after {} step(s)", turn.steps.len());
                self.memory.append(turn.query, turn.result.clone());
                SessionEvent::Response(turn.result)
            }
            Err(TurnError::ApprovalRejected { .. }) => SessionEvent::Rejected,
            Err(e) => {
                error!("Turn failed: {}", e);
                self.last_error = Some(e.to_string());
                SessionEvent::Failure
            }
        }
    }

    /// Drive the session from `console` until exit or end of input.
    pub async fn run<C: Console>(
        &mut self,
        console: &mut C,
        informs: &mut UnboundedReceiver<Inform>,
        output: &OutputFormatter,
    ) {
        output.welcome();
        loop {
            drain_informs(informs, output);
            let line = match console.read_line(QUERY_PROMPT) {
                Ok(ReadOutcome::Line(line)) => line,
                Ok(ReadOutcome::Interrupted) => continue,
                Ok(ReadOutcome::Eof) => break,
                Err(e) => {
                    error!("Reading input failed: {}", e);
                    break;
                }
            };
            console.add_history(&line);

            match self.handle(&line).await {
                SessionEvent::Skipped => {}
                SessionEvent::Exit => break,
                SessionEvent::Response(result) => output.response(&result),
                SessionEvent::Rejected => output.notice(text::REJECTED),
                SessionEvent::Failure => output.notice(text::ERROR_OCCURRED),
                SessionEvent::ErrorReport(report) => output.line(&report),
            }
        }
        output.line(text::GOODBYE);
    }
}

/// Print every notification that arrived since the last prompt.
pub fn drain_informs(informs: &mut UnboundedReceiver<Inform>, output: &OutputFormatter) -> usize {
    let mut count = 0;
    while let Ok(Inform(message)) = informs.try_recv() {
        output.inform(&message);
        count += 1;
    }
    count
}
