//! deckhand: natural-language operator console for an application platform.
//!
//! A language model decides, turn by turn, whether to invoke a named
//! capability or to answer the user. The engine lives in [`agent`] and the
//! capabilities in [`capabilities`]. Capabilities reach the application
//! platform through [`platform`] or a Kubernetes cluster through
//! [`kubernetes`], depending on the configured toolkit.

pub mod agent;
pub mod approval;
pub mod capabilities;
pub mod cli;
pub mod config;
pub mod context;
pub mod kubernetes;
pub mod llm;
pub mod platform;
pub mod text;
pub mod utils;

pub use agent::{Session, SessionEvent, TurnError, TurnExecutor};
pub use capabilities::{CapabilityRegistry, Inform};
pub use context::{Context, ContextStore, ContextUpdate};
