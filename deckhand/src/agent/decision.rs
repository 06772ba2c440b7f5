//! Decision parsing.
//!
//! Turns one raw completion into a [`Decision`]. Two shapes are recognized:
//!
//! ```text
//! Thought: Do I need to use a tool? Yes
//! Action: list_projects
//! Action Input:
//! Reason: the user asked for projects
//! ```
//!
//! ```text
//! Thought: Do I need to use a tool? No
//! Reason: the observation already answers it
//! AI: There are two projects ...
//! ```
//!
//! Text around the markers is tolerated. When a marker repeats, the last
//! occurrence wins. A completion carrying both shapes is rejected, even when
//! the final answer follows an invented `Observation:`.

use thiserror::Error;

pub const DEFAULT_AI_PREFIX: &str = "AI";

const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const REASON: &str = "Reason:";
const OBSERVATION: &str = "Observation:";
const THOUGHT: &str = "Thought:";

/// Structured interpretation of one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Invoke `tool_name` with the opaque `tool_input`.
    UseTool {
        tool_name: String,
        tool_input: String,
        reasoning: String,
    },
    /// Reply to the user.
    Finish {
        final_answer: String,
        reasoning: String,
    },
}

impl Decision {
    pub fn needs_tool(&self) -> bool {
        matches!(self, Decision::UseTool { .. })
    }

    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Decision::UseTool { tool_name, .. } => Some(tool_name),
            Decision::Finish { .. } => None,
        }
    }

    pub fn tool_input(&self) -> Option<&str> {
        match self {
            Decision::UseTool { tool_input, .. } => Some(tool_input),
            Decision::Finish { .. } => None,
        }
    }

    pub fn final_answer(&self) -> Option<&str> {
        match self {
            Decision::Finish { final_answer, .. } => Some(final_answer),
            Decision::UseTool { .. } => None,
        }
    }

    /// Free-text justification; empty when the model gave none.
    pub fn reasoning(&self) -> &str {
        match self {
            Decision::UseTool { reasoning, .. } | Decision::Finish { reasoning, .. } => reasoning,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty completion")]
    Empty,
    #[error("completion contains both a tool action and a final answer")]
    Ambiguous,
    #[error("completion contains neither a tool action nor a final answer")]
    NoDecision,
    #[error("malformed action: {0}")]
    MalformedAction(String),
    #[error("final answer is empty")]
    EmptyAnswer,
}

/// Stateless parser; the AI prefix marks the final-answer line.
#[derive(Debug, Clone)]
pub struct DecisionParser {
    ai_marker: String,
}

impl Default for DecisionParser {
    fn default() -> Self {
        Self::new(DEFAULT_AI_PREFIX)
    }
}

impl DecisionParser {
    pub fn new(ai_prefix: &str) -> Self {
        Self {
            ai_marker: format!("{}:", ai_prefix),
        }
    }

    pub fn ai_prefix(&self) -> &str {
        self.ai_marker.trim_end_matches(':')
    }

    pub fn parse(&self, completion: &str) -> Result<Decision, ParseError> {
        if completion.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let lines: Vec<&str> = completion.lines().collect();

        let action_idx = last_marker(&lines, ACTION, lines.len());
        let answer_idx = last_marker(&lines, &self.ai_marker, lines.len());

        match (action_idx, answer_idx) {
            (Some(_), Some(_)) => Err(ParseError::Ambiguous),
            (None, None) => Err(ParseError::NoDecision),
            (Some(action_idx), None) => self.parse_action(&lines, action_idx),
            (None, Some(answer_idx)) => self.parse_answer(&lines, answer_idx),
        }
    }

    fn parse_action(&self, lines: &[&str], action_idx: usize) -> Result<Decision, ParseError> {
        let tool_name = clean_name(marker_value(lines[action_idx], ACTION));
        if tool_name.is_empty() {
            return Err(ParseError::MalformedAction("action name is empty".into()));
        }

        let input_idx = lines[action_idx + 1..]
            .iter()
            .position(|l| l.trim_start().starts_with(ACTION_INPUT))
            .map(|offset| action_idx + 1 + offset)
            .ok_or_else(|| {
                ParseError::MalformedAction(format!("no \"{}\" after action {}", ACTION_INPUT, tool_name))
            })?;

        let mut input_lines = vec![marker_value(lines[input_idx], ACTION_INPUT)];
        for line in &lines[input_idx + 1..] {
            if self.is_marker_line(line) {
                break;
            }
            input_lines.push(line);
        }
        let tool_input = input_lines.join("\n").trim().to_string();

        Ok(Decision::UseTool {
            tool_name,
            tool_input,
            reasoning: last_reason(lines, lines.len()),
        })
    }

    fn parse_answer(&self, lines: &[&str], answer_idx: usize) -> Result<Decision, ParseError> {
        let mut answer_lines = vec![marker_value(lines[answer_idx], &self.ai_marker)];
        answer_lines.extend_from_slice(&lines[answer_idx + 1..]);
        let final_answer = answer_lines.join("\n").trim().to_string();
        if final_answer.is_empty() {
            return Err(ParseError::EmptyAnswer);
        }
        Ok(Decision::Finish {
            final_answer,
            reasoning: last_reason(lines, answer_idx),
        })
    }

    fn is_marker_line(&self, line: &str) -> bool {
        let line = line.trim_start();
        [REASON, OBSERVATION, THOUGHT, ACTION, self.ai_marker.as_str()]
            .iter()
            .any(|marker| line.starts_with(marker))
    }
}

/// Index of the last line (before `end`) starting with `marker`.
/// `Action:` never matches `Action Input:` lines.
fn last_marker(lines: &[&str], marker: &str, end: usize) -> Option<usize> {
    lines[..end]
        .iter()
        .rposition(|l| l.trim_start().starts_with(marker))
}

fn marker_value<'a>(line: &'a str, marker: &str) -> &'a str {
    line.trim_start()
        .strip_prefix(marker)
        .unwrap_or_default()
        .trim()
}

fn last_reason(lines: &[&str], end: usize) -> String {
    last_marker(lines, REASON, end)
        .map(|idx| marker_value(lines[idx], REASON).to_string())
        .unwrap_or_default()
}

fn clean_name(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '`' || c == '"' || c == '\'' || c == '*' || c.is_whitespace())
        .to_string()
}
