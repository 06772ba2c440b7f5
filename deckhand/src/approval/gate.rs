//! Human approval checkpoint for mutating capabilities.

use crate::capabilities::CapabilityDescriptor;
use crate::text;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

/// Outcome of one approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl ApprovalDecision {
    /// Case-insensitive "y"/"yes" approves; everything else rejects.
    pub fn from_response(response: &str) -> Self {
        match response.trim().to_lowercase().as_str() {
            "y" | "yes" => ApprovalDecision::Approved,
            _ => ApprovalDecision::Rejected,
        }
    }

    pub fn is_approved(self) -> bool {
        self == ApprovalDecision::Approved
    }
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval prompt interrupted")]
    Interrupted,
    #[error("approval prompt failed: {0}")]
    Io(String),
}

/// Asks a human whether a capability may run with the proposed input.
///
/// Implementations must not re-prompt: one call, one answer.
pub trait ApprovalGate: Send + Sync {
    fn authorize(
        &self,
        capability: &CapabilityDescriptor,
        proposed_input: &str,
    ) -> Result<ApprovalDecision, ApprovalError>;
}

/// Line-based console prompt.
#[derive(Debug, Default)]
pub struct ConsoleApprovalGate;

impl ConsoleApprovalGate {
    pub fn new() -> Self {
        Self
    }

    fn read_response(prompt: &str) -> Result<String, ApprovalError> {
        let mut editor = DefaultEditor::new().map_err(|e| ApprovalError::Io(e.to_string()))?;
        match editor.readline(prompt) {
            Ok(line) => Ok(line),
            Err(ReadlineError::Interrupted) => Err(ApprovalError::Interrupted),
            // Closed input cannot approve anything.
            Err(ReadlineError::Eof) => Ok(String::new()),
            Err(e) => Err(ApprovalError::Io(e.to_string())),
        }
    }
}

impl ApprovalGate for ConsoleApprovalGate {
    fn authorize(
        &self,
        capability: &CapabilityDescriptor,
        proposed_input: &str,
    ) -> Result<ApprovalDecision, ApprovalError> {
        let prompt = text::ask_approval(&capability.name, proposed_input);
        // The prompt blocks on stdin; keep the runtime's other tasks moving.
        let response = match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| Self::read_response(&prompt))
            }
            _ => Self::read_response(&prompt),
        }?;
        let decision = ApprovalDecision::from_response(&response);
        info!("Approval for {}: {:?}", capability.name, decision);
        Ok(decision)
    }
}

/// Approves everything. Used for unattended runs (`--yes`).
#[derive(Debug, Default)]
pub struct AutoApproveGate;

impl ApprovalGate for AutoApproveGate {
    fn authorize(
        &self,
        capability: &CapabilityDescriptor,
        _proposed_input: &str,
    ) -> Result<ApprovalDecision, ApprovalError> {
        warn!("Auto-approving {}", capability.name);
        Ok(ApprovalDecision::Approved)
    }
}

/// Replays canned responses in order and records every request.
///
/// An exhausted script behaves like an interrupted prompt.
#[derive(Debug, Default)]
pub struct ScriptedApprovalGate {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedApprovalGate {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `(capability, proposed_input)` pairs seen so far.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ApprovalGate for ScriptedApprovalGate {
    fn authorize(
        &self,
        capability: &CapabilityDescriptor,
        proposed_input: &str,
    ) -> Result<ApprovalDecision, ApprovalError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((capability.name.clone(), proposed_input.to_string()));
        }
        let next = self
            .responses
            .lock()
            .map_err(|e| ApprovalError::Io(e.to_string()))?
            .pop_front();
        match next {
            Some(response) => Ok(ApprovalDecision::from_response(&response)),
            None => Err(ApprovalError::Interrupted),
        }
    }
}
