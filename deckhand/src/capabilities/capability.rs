//! Capability interfaces.
//!
//! A capability is written as a [`CapabilityHandler`] with a typed input. The
//! registry wraps each handler into a [`Capability`] trait object that owns the
//! immutable descriptor and validates raw model input before the handler runs.

use crate::context::ContextStore;
use crate::kubernetes::KubeError;
use crate::llm::ModelError;
use crate::platform::PlatformError;
use crate::utils::{strip_code_fence, strip_wrapping_quotes};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Failure raised while running a capability. Always surfaced to the model as
/// an observation, never to the user directly.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Invalid input for {capability}: {message}")]
    InvalidInput { capability: String, message: String },
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Kubernetes(#[from] KubeError),
    #[error("Missing context: {0}")]
    MissingContext(String),
    #[error("{0}")]
    Failed(String),
}

/// Rejection produced by [`CapabilityInput::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputError(pub String);

/// Immutable metadata of a registered capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub requires_approval: bool,
    pub direct_output: bool,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            requires_approval: false,
            direct_output: false,
        }
    }

    /// Mark the capability as mutating; the approval gate runs before it.
    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Show the raw output to the user instead of letting the model summarize it.
    pub fn with_direct_output(mut self) -> Self {
        self.direct_output = true;
        self
    }
}

/// Shape of the input a capability accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSchema {
    /// Input is ignored.
    None,
    /// Free text.
    Text,
    /// JSON value validated against this schema.
    Json(Value),
}

impl InputSchema {
    /// One-line hint appended to the description shown to the model.
    pub fn prompt_hint(&self) -> Option<String> {
        match self {
            InputSchema::None | InputSchema::Text => None,
            InputSchema::Json(schema) => Some(format!("Input JSON schema: {}", schema)),
        }
    }
}

/// Typed input decoded from the raw action input.
pub trait CapabilityInput: Sized + Send {
    fn schema() -> InputSchema;
    fn parse(raw: &str) -> Result<Self, InputError>;
}

/// Input that carries nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoInput;

impl CapabilityInput for NoInput {
    fn schema() -> InputSchema {
        InputSchema::None
    }

    fn parse(_raw: &str) -> Result<Self, InputError> {
        Ok(NoInput)
    }
}

/// Free-text input, trimmed and unquoted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput(pub String);

impl TextInput {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl CapabilityInput for TextInput {
    fn schema() -> InputSchema {
        InputSchema::Text
    }

    fn parse(raw: &str) -> Result<Self, InputError> {
        Ok(TextInput(strip_wrapping_quotes(raw).to_string()))
    }
}

/// JSON input deserialized into `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonInput<T>(pub T);

impl<T> CapabilityInput for JsonInput<T>
where
    T: DeserializeOwned + JsonSchema + Send,
{
    fn schema() -> InputSchema {
        let root = schemars::schema_for!(T);
        let mut value = serde_json::to_value(&root).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("$schema");
            map.remove("title");
        }
        InputSchema::Json(value)
    }

    fn parse(raw: &str) -> Result<Self, InputError> {
        let text = strip_code_fence(raw);
        if text.is_empty() {
            return Err(InputError("expected JSON input, got nothing".to_string()));
        }
        serde_json::from_str(text)
            .map(JsonInput)
            .map_err(|e| InputError(format!("expected JSON matching the input schema: {}", e)))
    }
}

/// Implementation side of a capability.
#[async_trait]
pub trait CapabilityHandler: Send + Sync + 'static {
    type Input: CapabilityInput;

    fn descriptor(&self) -> CapabilityDescriptor;

    async fn call(
        &self,
        input: Self::Input,
        context: &ContextStore,
    ) -> Result<String, CapabilityError>;
}

/// Object-safe view the registry and the turn executor work with.
#[async_trait]
pub trait Capability: Send + Sync {
    fn descriptor(&self) -> &CapabilityDescriptor;

    fn input_schema(&self) -> &InputSchema;

    /// Validate the raw input and run the capability.
    async fn invoke(&self, raw_input: &str, context: &ContextStore)
        -> Result<String, CapabilityError>;
}

/// A handler frozen together with its descriptor and input schema.
pub struct Registered<H: CapabilityHandler> {
    descriptor: CapabilityDescriptor,
    schema: InputSchema,
    handler: H,
}

impl<H: CapabilityHandler> Registered<H> {
    pub fn new(handler: H) -> Self {
        Self {
            descriptor: handler.descriptor(),
            schema: H::Input::schema(),
            handler,
        }
    }
}

#[async_trait]
impl<H: CapabilityHandler> Capability for Registered<H> {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn input_schema(&self) -> &InputSchema {
        &self.schema
    }

    async fn invoke(
        &self,
        raw_input: &str,
        context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let input = H::Input::parse(raw_input).map_err(|InputError(message)| {
            CapabilityError::InvalidInput {
                capability: self.descriptor.name.clone(),
                message,
            }
        })?;
        self.handler.call(input, context).await
    }
}
