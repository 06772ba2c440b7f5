//! Environment capabilities.

use super::capability::{
    CapabilityDescriptor, CapabilityError, CapabilityHandler, JsonInput, TextInput,
};
use super::{fenced, project_scope, render_list};
use crate::context::{json_str, ContextStore};
use crate::platform::PlatformClient;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// Reference to a platform object as the model reports it back.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ObjectRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub(crate) fn ref_ids(refs: &[ObjectRef]) -> Result<Vec<String>, CapabilityError> {
    let ids: Vec<String> = refs
        .iter()
        .map(|r| r.id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Err(CapabilityError::Failed("no ids given".to_string()));
    }
    Ok(ids)
}

pub struct ListEnvironments {
    client: PlatformClient,
}

impl ListEnvironments {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for ListEnvironments {
    type Input = TextInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "list_environments",
            "List environments of a project. Input should be a project id or an empty string indicating the current project in the context.",
        )
    }

    async fn call(&self, input: TextInput, context: &ContextStore) -> Result<String, CapabilityError> {
        let project_id = if input.is_empty() {
            project_scope(&context.get())?
        } else {
            input.0
        };
        let environments = self.client.list_environments(&project_id).await?;
        render_list(&environments, "No environments found.")
    }
}

pub struct DeleteEnvironments {
    client: PlatformClient,
}

impl DeleteEnvironments {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for DeleteEnvironments {
    type Input = JsonInput<Vec<ObjectRef>>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "delete_environments",
            "Delete one or multiple environments. Input should be a list of objects, each with the \"id\" and \"name\" of an environment.",
        )
        .with_approval()
    }

    async fn call(
        &self,
        input: Self::Input,
        context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let project_id = project_scope(&context.get())?;
        let ids = ref_ids(&input.0)?;
        self.client.delete_environments(&project_id, &ids).await?;
        info!("Deleting environments {:?}", ids);
        Ok("Deletion started.".to_string())
    }
}

/// Input for clone_environment.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CloneEnvironmentInput {
    pub original_environment_name: String,
    pub target_environment_name: String,
}

pub struct CloneEnvironment {
    client: PlatformClient,
}

impl CloneEnvironment {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for CloneEnvironment {
    type Input = JsonInput<CloneEnvironmentInput>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new("clone_environment", "Clone an environment to a new one.")
            .with_approval()
    }

    async fn call(
        &self,
        input: Self::Input,
        context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        let target = request.target_environment_name.trim();
        if target.is_empty() {
            return Err(CapabilityError::Failed(
                "target_environment_name must not be empty".to_string(),
            ));
        }
        let project_id = project_scope(&context.get())?;

        let mut environment = self
            .client
            .get_environment(&project_id, &request.original_environment_name)
            .await?;
        let source_id = json_str(&environment, "id");
        let services = self.client.list_services(&project_id, &source_id).await?;

        if let Value::Object(map) = &mut environment {
            map.remove("id");
            map.insert("name".to_string(), Value::String(target.to_string()));
            map.insert("services".to_string(), Value::Array(services));
        }
        self.client
            .create_environment(&project_id, &environment)
            .await?;
        info!(
            "Cloned environment {} to {}",
            request.original_environment_name, target
        );
        Ok("Successfully cloned.".to_string())
    }
}

pub struct GetEnvironmentDependencyGraph {
    client: PlatformClient,
}

impl GetEnvironmentDependencyGraph {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for GetEnvironmentDependencyGraph {
    type Input = TextInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "get_environment_dependency_graph",
            "Get dependency graph of an environment. Input should be name or id of an environment, or empty for the current one.",
        )
        .with_direct_output()
    }

    async fn call(&self, input: TextInput, context: &ContextStore) -> Result<String, CapabilityError> {
        let ctx = context.get();
        let project_id = project_scope(&ctx)?;
        let environment = if input.is_empty() {
            ctx.environment_id
        } else {
            input.0
        };
        if environment.is_empty() {
            return Err(CapabilityError::MissingContext(
                "no environment is selected".to_string(),
            ));
        }
        let graph = self
            .client
            .get_environment_graph(&project_id, &environment)
            .await?;
        Ok(fenced("environment_graph", &graph))
    }
}
