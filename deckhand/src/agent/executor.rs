//! Turn executor.
//!
//! One query runs as a loop of decide → (approve) → invoke → observe until the
//! model produces a final answer, a `direct_output` capability ends the turn,
//! or something fails. Capability failures and unknown capability names are
//! folded into observations so the model can recover; model, parse, approval
//! and budget failures end the turn.

use super::decision::{Decision, DecisionParser, ParseError};
use super::memory::ConversationMemory;
use super::prompt::PromptBuilder;
use crate::approval::{ApprovalDecision, ApprovalError, ApprovalGate};
use crate::capabilities::CapabilityRegistry;
use crate::context::ContextStore;
use crate::llm::{LanguageModel, ModelError};
use crate::utils::{redact_text_for_logs, truncate_for_log};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_TOOL_INVOCATIONS: usize = 10;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Could not parse LLM output ({source}): `{output}`")]
    Parse { source: ParseError, output: String },
    #[error("Action {capability} was rejected")]
    ApprovalRejected { capability: String },
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error("Stopped after {0} tool invocations without a final answer")]
    InvocationLimit(usize),
}

/// One capability decision and what came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub decision: Decision,
    pub observation: String,
}

/// A finished turn.
#[derive(Debug, Clone)]
pub struct Turn {
    pub query: String,
    pub steps: Vec<Step>,
    pub result: String,
}

/// Receives per-decision notifications while a turn runs.
pub trait TurnObserver: Send + Sync {
    fn on_reasoning(&self, reasoning: &str);

    fn on_step(&self, _step: &Step) {}
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl TurnObserver for NoopObserver {
    fn on_reasoning(&self, _reasoning: &str) {}
}

pub struct TurnExecutor {
    model: Arc<dyn LanguageModel>,
    registry: Arc<CapabilityRegistry>,
    gate: Arc<dyn ApprovalGate>,
    context: ContextStore,
    parser: DecisionParser,
    prompt: PromptBuilder,
    observer: Arc<dyn TurnObserver>,
    max_tool_invocations: usize,
    tools: String,
    tool_names: String,
}

impl TurnExecutor {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: Arc<CapabilityRegistry>,
        gate: Arc<dyn ApprovalGate>,
        context: ContextStore,
    ) -> Self {
        let tools = registry.render_for_prompt();
        let tool_names = registry.names().join(", ");
        Self {
            model,
            registry,
            gate,
            context,
            parser: DecisionParser::default(),
            prompt: PromptBuilder::default(),
            observer: Arc::new(NoopObserver),
            max_tool_invocations: DEFAULT_MAX_TOOL_INVOCATIONS,
            tools,
            tool_names,
        }
    }

    /// Use `prompt` for rendering; the parser follows its AI prefix.
    pub fn with_prompt(mut self, prompt: PromptBuilder) -> Self {
        self.parser = DecisionParser::new(prompt.ai_prefix());
        self.prompt = prompt;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_max_tool_invocations(mut self, max: usize) -> Self {
        self.max_tool_invocations = max;
        self
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    pub fn ai_prefix(&self) -> &str {
        self.prompt.ai_prefix()
    }

    /// Run one query to completion.
    ///
    /// Every tool decision counts against the invocation budget, including
    /// ones naming an unknown capability.
    pub async fn run(&self, query: &str, memory: &ConversationMemory) -> Result<Turn, TurnError> {
        let history = memory.render(self.prompt.ai_prefix());
        let mut steps: Vec<Step> = Vec::new();
        let mut invocations = 0usize;

        loop {
            let prompt = self
                .prompt
                .render(&self.tools, &self.tool_names, &history, query, &steps);
            let completion = self.model.complete(&prompt).await?;
            debug!(
                "LLM completion: {}",
                truncate_for_log(&redact_text_for_logs(&completion), 2000)
            );

            let decision = self
                .parser
                .parse(&completion)
                .map_err(|source| TurnError::Parse {
                    source,
                    output: completion.clone(),
                })?;
            if !decision.reasoning().is_empty() {
                self.observer.on_reasoning(decision.reasoning());
            }

            let (tool_name, tool_input) = match &decision {
                Decision::Finish { final_answer, .. } => {
                    return Ok(Turn {
                        query: query.to_string(),
                        steps,
                        result: final_answer.clone(),
                    });
                }
                Decision::UseTool {
                    tool_name,
                    tool_input,
                    ..
                } => (tool_name.clone(), tool_input.clone()),
            };

            if invocations >= self.max_tool_invocations {
                warn!(
                    "Invocation budget of {} exhausted; last requested {}",
                    self.max_tool_invocations, tool_name
                );
                return Err(TurnError::InvocationLimit(self.max_tool_invocations));
            }
            invocations += 1;

            let capability = match self.registry.resolve(&tool_name) {
                Ok(capability) => capability,
                Err(e) => {
                    debug!("Unknown capability requested: {}", tool_name);
                    self.record(&mut steps, decision, e.to_string());
                    continue;
                }
            };
            let descriptor = capability.descriptor();

            if descriptor.requires_approval {
                match self.gate.authorize(descriptor, &tool_input)? {
                    ApprovalDecision::Approved => {}
                    ApprovalDecision::Rejected => {
                        info!("Action {} rejected by user", descriptor.name);
                        return Err(TurnError::ApprovalRejected {
                            capability: descriptor.name.clone(),
                        });
                    }
                }
            }

            info!("Invoking capability {}", descriptor.name);
            let observation = match capability.invoke(&tool_input, &self.context).await {
                Ok(output) => output,
                Err(e) => {
                    warn!("Capability {} failed: {}", descriptor.name, e);
                    e.to_string()
                }
            };

            if descriptor.direct_output {
                let result = observation.clone();
                self.record(&mut steps, decision, observation);
                return Ok(Turn {
                    query: query.to_string(),
                    steps,
                    result,
                });
            }
            self.record(&mut steps, decision, observation);
        }
    }

    fn record(&self, steps: &mut Vec<Step>, decision: Decision, observation: String) {
        let step = Step {
            decision,
            observation,
        };
        self.observer.on_step(&step);
        steps.push(step);
    }
}
