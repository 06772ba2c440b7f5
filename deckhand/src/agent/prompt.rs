//! Decision prompt rendering.
//!
//! The prompt is rebuilt from scratch on every model call: fixed prefix,
//! capability list, format instructions, replayed history, the query and the
//! scratchpad of steps taken so far in this turn.

use super::decision::{Decision, DEFAULT_AI_PREFIX};
use super::executor::Step;

pub const PROMPT_PREFIX: &str = "You are an agent that assists with user queries against an application management platform API, like querying information or creating resources.
Some user queries can be resolved in a single API call, some require several API calls.
The ID of a platform object is a string that looks like a long number.
Always use a construct_service tool before creating or updating a service.";

pub const KUBERNETES_PROMPT_PREFIX: &str = "You are an agent that assists with user queries against a Kubernetes cluster, like querying resources or deploying applications.
Some user queries can be resolved in a single tool call, some require several tool calls.
Prefer helm charts when the user asks to deploy a well-known application.
Always construct resources or generate values before applying or upgrading them.";

const FORMAT_INSTRUCTIONS: &str = "To use a tool, please use the following format:

```
Thought: Do I need to use a tool? Yes
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Reason: the reason you use this tool (in {natural_language})
Observation: the result of the action
```

When you have a response to say to the Human, or if you do not need to use a tool, you MUST use the format:

```
Thought: Do I need to use a tool? No
Reason: the reason you do not need to use a tool
{ai_prefix}: [your response here]
```

In the response, don't show project ids and environment ids unless the user explicitly asks for them.
Use markdown format for the response. If the data is suitable to show in a table, use a markdown table.
Please print the response to the human in {natural_language}.";

/// Renders decision prompts. Cheap to clone; holds only configuration.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    prefix: String,
    natural_language: String,
    ai_prefix: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new("English")
    }
}

impl PromptBuilder {
    pub fn new(natural_language: impl Into<String>) -> Self {
        Self {
            prefix: PROMPT_PREFIX.to_string(),
            natural_language: natural_language.into(),
            ai_prefix: DEFAULT_AI_PREFIX.to_string(),
        }
    }

    /// Replace the fixed prefix that opens every prompt.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_ai_prefix(mut self, ai_prefix: impl Into<String>) -> Self {
        self.ai_prefix = ai_prefix.into();
        self
    }

    pub fn ai_prefix(&self) -> &str {
        &self.ai_prefix
    }

    pub fn natural_language(&self) -> &str {
        &self.natural_language
    }

    fn format_instructions(&self, tool_names: &str) -> String {
        FORMAT_INSTRUCTIONS
            .replace("{tool_names}", tool_names)
            .replace("{natural_language}", &self.natural_language)
            .replace("{ai_prefix}", &self.ai_prefix)
    }

    /// Full prompt for one model call.
    ///
    /// `tools` is the rendered capability list, `tool_names` the comma-joined
    /// names, `history` the replayed memory.
    pub fn render(
        &self,
        tools: &str,
        tool_names: &str,
        history: &str,
        query: &str,
        steps: &[Step],
    ) -> String {
        format!(
            "{prefix}\n\nTOOLS:\n------\n\nAssistant has access to the following tools:\n\n{tools}\n\n{instructions}\n\nBegin!\n\nPrevious conversation history:\n{history}\n\nNew input: {query}\n{scratchpad}",
            prefix = self.prefix,
            tools = tools,
            instructions = self.format_instructions(tool_names),
            history = history,
            query = query,
            scratchpad = render_scratchpad(steps),
        )
    }
}

/// Replays the steps of the current turn so the model continues after the
/// last observation.
pub fn render_scratchpad(steps: &[Step]) -> String {
    let mut out = String::new();
    for step in steps {
        if let Decision::UseTool {
            tool_name,
            tool_input,
            reasoning,
        } = &step.decision
        {
            out.push_str("Thought: Do I need to use a tool? Yes\n");
            out.push_str(&format!("Action: {}\nAction Input: {}\n", tool_name, tool_input));
            if !reasoning.is_empty() {
                out.push_str(&format!("Reason: {}\n", reasoning));
            }
            out.push_str(&format!("Observation: {}\n", step.observation));
        }
    }
    if !steps.is_empty() {
        out.push_str("Thought: ");
    }
    out
}
