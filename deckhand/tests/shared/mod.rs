//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use deckhand::agent::{ConversationMemory, Session, TurnExecutor, TurnObserver};
use deckhand::approval::{ApprovalGate, ScriptedApprovalGate};
use deckhand::capabilities::{
    CapabilityDescriptor, CapabilityError, CapabilityHandler, CapabilityRegistry, TextInput,
};
use deckhand::context::{Context, ContextStore};
use deckhand::llm::{LanguageModel, ModelError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays canned completions and records every prompt it was given.
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    repeat_last: bool,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            repeat_last: false,
        })
    }

    /// A model that answers every call with `response`.
    pub fn always(response: &str) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::from([response.to_string()])),
            prompts: Mutex::new(Vec::new()),
            repeat_last: true,
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut responses = self.responses.lock().unwrap();
        if self.repeat_last {
            return responses
                .front()
                .cloned()
                .ok_or_else(|| ModelError::Request("no scripted response".into()));
        }
        responses
            .pop_front()
            .ok_or_else(|| ModelError::Request("script exhausted".into()))
    }
}

/// Capability double that records its inputs and returns a fixed outcome.
#[derive(Clone)]
pub struct RecordingCapability {
    descriptor: CapabilityDescriptor,
    outcome: Result<String, String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingCapability {
    pub fn new(name: &str, output: &str) -> Self {
        Self {
            descriptor: CapabilityDescriptor::new(name, format!("Test capability {}.", name)),
            outcome: Ok(output.to_string()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            ..Self::new(name, "")
        }
    }

    pub fn gated(mut self) -> Self {
        self.descriptor = self.descriptor.with_approval();
        self
    }

    pub fn direct(mut self) -> Self {
        self.descriptor = self.descriptor.with_direct_output();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CapabilityHandler for RecordingCapability {
    type Input = TextInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        self.descriptor.clone()
    }

    async fn call(&self, input: TextInput, _context: &ContextStore) -> Result<String, CapabilityError> {
        self.calls.lock().unwrap().push(input.0);
        self.outcome.clone().map_err(CapabilityError::Failed)
    }
}

/// Collects reasoning strings forwarded by the executor.
#[derive(Default)]
pub struct ReasoningLog(pub Mutex<Vec<String>>);

impl TurnObserver for ReasoningLog {
    fn on_reasoning(&self, reasoning: &str) {
        self.0.lock().unwrap().push(reasoning.to_string());
    }
}

pub fn seeded_store() -> ContextStore {
    ContextStore::new(Context {
        project_id: "p1".into(),
        project_name: "default".into(),
        environment_id: "e1".into(),
        environment_name: "dev".into(),
    })
}

pub fn registry_of(capabilities: &[RecordingCapability]) -> Arc<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    for capability in capabilities {
        registry.register_handler(capability.clone()).unwrap();
    }
    Arc::new(registry)
}

pub fn executor(
    model: Arc<ScriptedModel>,
    registry: Arc<CapabilityRegistry>,
    gate: Arc<dyn ApprovalGate>,
) -> TurnExecutor {
    TurnExecutor::new(model, registry, gate, seeded_store())
}

pub fn session(
    model: Arc<ScriptedModel>,
    registry: Arc<CapabilityRegistry>,
    gate: Arc<dyn ApprovalGate>,
) -> Session {
    Session::new(executor(model, registry, gate), ConversationMemory::default())
}

pub fn no_approvals() -> Arc<ScriptedApprovalGate> {
    Arc::new(ScriptedApprovalGate::new(Vec::<String>::new()))
}

pub fn action(name: &str, input: &str, reason: &str) -> String {
    format!(
        "Thought: Do I need to use a tool? Yes\nAction: {}\nAction Input: {}\nReason: {}",
        name, input, reason
    )
}

pub fn answer(text: &str, reason: &str) -> String {
    format!(
        "Thought: Do I need to use a tool? No\nReason: {}\nAI: {}",
        reason, text
    )
}
