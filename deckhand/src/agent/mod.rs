//! Turn-execution engine.
//!
//! - `decision`: completion text → [`Decision`]
//! - `prompt`: decision prompt rendering
//! - `memory`: replayed conversation history
//! - `executor`: one query → capability steps → final answer
//! - `session`: the interactive loop around the executor

pub mod decision;
pub mod executor;
pub mod memory;
pub mod prompt;
pub mod session;

pub use decision::{Decision, DecisionParser, ParseError};
pub use executor::{
    NoopObserver, Step, Turn, TurnError, TurnExecutor, TurnObserver,
    DEFAULT_MAX_TOOL_INVOCATIONS,
};
pub use memory::{ConversationMemory, Exchange, DEFAULT_MEMORY_WINDOW};
pub use prompt::{PromptBuilder, KUBERNETES_PROMPT_PREFIX};
pub use session::{drain_informs, Session, SessionEvent};
