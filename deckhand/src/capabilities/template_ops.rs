//! Template capabilities. Matching a template to a task is delegated to the
//! language model.

use super::capability::{CapabilityDescriptor, CapabilityError, CapabilityHandler, TextInput};
use super::to_json;
use crate::context::ContextStore;
use crate::llm::LanguageModel;
use crate::platform::PlatformClient;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const FIND_TEMPLATE_PROMPT: &str = "Templates are predefined configuration to create a particular type of service.

You will be provided existing templates and a user query describing a deployment task.
Find a template that most likely can be used to accomplish the user query.
If you don't find any, say why.

Output the matched template name in quoted string.

TEMPLATES:
{templates}

User query: {query}
Output:";

pub(crate) fn find_template_prompt(templates: &str, query: &str) -> String {
    FIND_TEMPLATE_PROMPT
        .replace("{templates}", templates)
        .replace("{query}", query)
}

pub struct FindMatchingTemplate {
    client: PlatformClient,
    model: Arc<dyn LanguageModel>,
}

impl FindMatchingTemplate {
    pub fn new(client: PlatformClient, model: Arc<dyn LanguageModel>) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl CapabilityHandler for FindMatchingTemplate {
    type Input = TextInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "find_matching_template",
            "Find a matching template for a deploy/upgrade task. Input should be the description of the task; for an upgrade task, include the previous template info. Outputs the matching template name, or why none matches.",
        )
    }

    async fn call(&self, input: TextInput, _context: &ContextStore) -> Result<String, CapabilityError> {
        if input.is_empty() {
            return Err(CapabilityError::Failed("task description is empty".to_string()));
        }
        let templates = self.client.list_templates().await?;
        let prompt = find_template_prompt(&to_json(&templates)?, input.as_str());
        debug!("Matching template among {} candidates", templates.len());
        let answer = self.model.complete(&prompt).await?;
        Ok(answer.trim().to_string())
    }
}

pub struct GetTemplateSchema {
    client: PlatformClient,
}

impl GetTemplateSchema {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for GetTemplateSchema {
    type Input = TextInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "get_template_schema",
            "Get the latest template version and its schema. Input should be a template name or id.",
        )
    }

    async fn call(&self, input: TextInput, _context: &ContextStore) -> Result<String, CapabilityError> {
        if input.is_empty() {
            return Err(CapabilityError::Failed("template name is empty".to_string()));
        }
        let version = self.client.get_template_version(input.as_str()).await?;
        to_json(&version)
    }
}
