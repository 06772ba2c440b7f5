//! Language model boundary.
//!
//! The engine only needs `complete(prompt) -> text`. Providers buffer any
//! streaming internally and hand back the full completion.

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

pub use openai::{OpenAiChatModel, OpenAiConfig};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },
    #[error("Invalid LLM response format: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce the completion for a fully rendered prompt.
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}
