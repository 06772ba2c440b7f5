//! Service capabilities.
//!
//! Everything here is scoped to the active environment of the context store.
//! The two `construct_service_*` capabilities ask the language model to draft
//! a service object; they never write to the platform themselves.

use super::capability::{
    CapabilityDescriptor, CapabilityError, CapabilityHandler, JsonInput, NoInput, TextInput,
};
use super::environment_ops::{ref_ids, ObjectRef};
use super::{environment_scope, fenced, project_scope, render_list, to_json};
use crate::context::ContextStore;
use crate::llm::LanguageModel;
use crate::platform::PlatformClient;
use crate::text;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

const DEFAULT_LOG_LINES: u32 = 100;

const CONSTRUCT_TO_CREATE_PROMPT: &str = "You are a planner that constructs the expected service object given a user query describing a deployment task.
For your reference, you will be provided existing services and the related template version if there's any in the environment. Choose a template and fill in the input variables for the service.

You should:
1) evaluate whether the service object can be constructed according to the user query. If no, say why.
2) if yes, output in the following format:

CONSTRUCTED SERVICE: <SERVICE_OBJECT_IN_ONE_LINE_JSON>

Strictly follow the above output format, do not add extra explanation or words.
Environment info is needed in any cases.
Service status is not needed in any cases.

Example:

CONSTRUCTED SERVICE: {\"name\":\"example\",\"template\":{\"name\":\"webservice\",\"version\":\"0.0.4\"},\"environment\":{\"id\":\"1234567\"},\"attributes\":{\"image\":\"nginx\",\"ports\":[80]}}

----

Context: {context}
User query: {query}

EXISTING SERVICES:
{existing}

RELATED TEMPLATE:
{template}
";

const CONSTRUCT_TO_UPDATE_PROMPT: &str = "You are a planner that constructs the expected service object given a user query describing an upgrade task.
For your reference, you will be provided the service about to upgrade and the related template version. Fill in the input variables for the service.

You should:
1) evaluate whether the service object can be constructed according to the user query. If no, say why.
2) if yes, output in the following format:

CONSTRUCTED SERVICE: <SERVICE_OBJECT_IN_ONE_LINE_JSON>

Strictly follow the above output format, do not add extra explanation or words.
Service id is required.
Environment info is required.
Service status is not needed.

Example:

CONSTRUCTED SERVICE: {\"id\":\"1234\",\"name\":\"example\",\"template\":{\"name\":\"webservice\",\"version\":\"0.0.4\"},\"environment\":{\"id\":\"1234567\"},\"attributes\":{\"image\":\"nginx\",\"ports\":[80]}}

----

Context: {context}
User query: {query}

CURRENT SERVICE:
{existing}

RELATED TEMPLATE:
{template}
";

fn render_construct_prompt(
    template: &str,
    context: &str,
    query: &str,
    existing: &str,
    related_template: &str,
) -> String {
    template
        .replace("{context}", context)
        .replace("{query}", query)
        .replace("{existing}", existing)
        .replace("{template}", related_template)
}

pub struct GetService {
    client: PlatformClient,
}

impl GetService {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for GetService {
    type Input = TextInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "get_service",
            "Get a service object. Input should be a service name or id.",
        )
    }

    async fn call(&self, input: TextInput, context: &ContextStore) -> Result<String, CapabilityError> {
        let (project_id, environment_id) = environment_scope(&context.get())?;
        let service = self
            .client
            .get_service(&project_id, &environment_id, input.as_str())
            .await?;
        to_json(&service)
    }
}

pub struct ListServices {
    client: PlatformClient,
}

impl ListServices {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for ListServices {
    type Input = NoInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new("list_services", "List services in the current environment.")
    }

    async fn call(&self, _input: NoInput, context: &ContextStore) -> Result<String, CapabilityError> {
        let (project_id, environment_id) = environment_scope(&context.get())?;
        let services = self.client.list_services(&project_id, &environment_id).await?;
        render_list(&services, "No services found.")
    }
}

pub struct ListServicesInAllEnvironments {
    client: PlatformClient,
}

impl ListServicesInAllEnvironments {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for ListServicesInAllEnvironments {
    type Input = NoInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "list_services_in_all_environments",
            "List services in all environments of the current project.",
        )
    }

    async fn call(&self, _input: NoInput, context: &ContextStore) -> Result<String, CapabilityError> {
        let project_id = project_scope(&context.get())?;
        let services = self
            .client
            .list_services_in_all_environments(&project_id)
            .await?;
        render_list(&services, "No services found.")
    }
}

pub struct CreateService {
    client: PlatformClient,
}

impl CreateService {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for CreateService {
    type Input = JsonInput<Map<String, Value>>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "create_service",
            "Create a service. Input should be a service object in JSON, as produced by construct_service_to_create.",
        )
        .with_approval()
    }

    async fn call(
        &self,
        input: Self::Input,
        context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let (project_id, environment_id) = environment_scope(&context.get())?;
        let service = Value::Object(input.0);
        self.client
            .create_service(&project_id, &environment_id, &service)
            .await?;
        let name = service.get("name").and_then(Value::as_str).unwrap_or_default();
        info!("Created service {}", name);
        Ok("Successfully created.".to_string())
    }
}

pub struct UpdateService {
    client: PlatformClient,
}

impl UpdateService {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for UpdateService {
    type Input = JsonInput<Map<String, Value>>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "update_service",
            "Update a service. Input should be a service object in JSON including its \"id\", as produced by construct_service_to_update.",
        )
        .with_approval()
    }

    async fn call(
        &self,
        input: Self::Input,
        context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let (project_id, environment_id) = environment_scope(&context.get())?;
        let service = Value::Object(input.0);
        self.client
            .update_service(&project_id, &environment_id, &service)
            .await?;
        Ok("Successfully updated.".to_string())
    }
}

pub struct DeleteServices {
    client: PlatformClient,
}

impl DeleteServices {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for DeleteServices {
    type Input = JsonInput<Vec<ObjectRef>>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "delete_services",
            "Delete one or multiple services. Input should be a list of objects, each with the \"id\" and \"name\" of a service.",
        )
        .with_approval()
    }

    async fn call(
        &self,
        input: Self::Input,
        context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let (project_id, environment_id) = environment_scope(&context.get())?;
        let ids = ref_ids(&input.0)?;
        self.client
            .delete_services(&project_id, &environment_id, &ids)
            .await?;
        info!("Deleted services {:?}", ids);
        Ok("Successfully deleted.".to_string())
    }
}

/// Input for construct_service_to_create.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ConstructCreateInput {
    /// Description of the deployment task.
    pub user_query: String,
    /// Name of the template related to the task.
    pub related_template_name: String,
}

pub struct ConstructServiceToCreate {
    client: PlatformClient,
    model: Arc<dyn LanguageModel>,
}

impl ConstructServiceToCreate {
    pub fn new(client: PlatformClient, model: Arc<dyn LanguageModel>) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl CapabilityHandler for ConstructServiceToCreate {
    type Input = JsonInput<ConstructCreateInput>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "construct_service_to_create",
            "Construct a service object for creation. Outputs a service object in JSON to be used by create_service.",
        )
    }

    async fn call(
        &self,
        input: Self::Input,
        context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        let ctx = context.get();
        let (project_id, environment_id) = environment_scope(&ctx)?;
        let existing = self.client.list_services(&project_id, &environment_id).await?;
        let template = self
            .client
            .get_template_version(&request.related_template_name)
            .await?;

        let prompt = render_construct_prompt(
            CONSTRUCT_TO_CREATE_PROMPT,
            &to_json(&ctx)?,
            &to_json(&request.user_query)?,
            &to_json(&existing)?,
            &to_json(&template)?,
        );
        Ok(self.model.complete(&prompt).await?.trim().to_string())
    }
}

/// Input for construct_service_to_update.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ConstructUpdateInput {
    /// Description of the upgrade task.
    pub user_query: String,
    /// Name of the service about to be updated.
    pub service_name: String,
    /// Name of the template related to the task.
    pub related_template_name: String,
}

pub struct ConstructServiceToUpdate {
    client: PlatformClient,
    model: Arc<dyn LanguageModel>,
}

impl ConstructServiceToUpdate {
    pub fn new(client: PlatformClient, model: Arc<dyn LanguageModel>) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl CapabilityHandler for ConstructServiceToUpdate {
    type Input = JsonInput<ConstructUpdateInput>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "construct_service_to_update",
            "Construct a service object for update. Outputs a service object in JSON to be used by update_service.",
        )
    }

    async fn call(
        &self,
        input: Self::Input,
        context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        let ctx = context.get();
        let (project_id, environment_id) = environment_scope(&ctx)?;
        let template = self
            .client
            .get_template_version(&request.related_template_name)
            .await?;
        let current = self
            .client
            .get_service(&project_id, &environment_id, &request.service_name)
            .await?;

        let prompt = render_construct_prompt(
            CONSTRUCT_TO_UPDATE_PROMPT,
            &to_json(&ctx)?,
            &to_json(&request.user_query)?,
            &to_json(&current)?,
            &to_json(&template)?,
        );
        Ok(self.model.complete(&prompt).await?.trim().to_string())
    }
}

pub struct GetServiceResources {
    client: PlatformClient,
}

impl GetServiceResources {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for GetServiceResources {
    type Input = TextInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "get_service_resources",
            "Get resources of a service: what resources it consists of and what status they are in. Input should be the id of a service.",
        )
    }

    async fn call(&self, input: TextInput, context: &ContextStore) -> Result<String, CapabilityError> {
        let (project_id, environment_id) = environment_scope(&context.get())?;
        let resources = self
            .client
            .list_service_resources(&project_id, &environment_id, input.as_str())
            .await?;
        render_list(&resources, "No resources found.")
    }
}

/// Input for get_service_resource_keys.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResourceKeysInput {
    pub service_id: String,
    pub service_resource_id: String,
}

pub struct GetServiceResourceKeys {
    client: PlatformClient,
}

impl GetServiceResourceKeys {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for GetServiceResourceKeys {
    type Input = JsonInput<ResourceKeysInput>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "get_service_resource_keys",
            "Get keys of a service resource. A key identifies a component of the resource and is needed to fetch its logs.",
        )
    }

    async fn call(
        &self,
        input: Self::Input,
        context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        let (project_id, environment_id) = environment_scope(&context.get())?;
        Ok(self
            .client
            .get_service_resource_keys(
                &project_id,
                &environment_id,
                &request.service_id,
                &request.service_resource_id,
            )
            .await?)
    }
}

/// Input for the resource log capabilities.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResourceLogsInput {
    pub service_id: String,
    pub service_resource_id: String,
    /// Component key of the resource, from get_service_resource_keys.
    pub key: String,
    /// Number of trailing lines to fetch. Defaults to 100.
    #[serde(default)]
    pub line_number: Option<u32>,
}

/// Shared body of the two log capabilities; they differ only in whether the
/// output goes straight to the user.
pub struct GetServiceResourceLogs {
    client: PlatformClient,
    direct: bool,
}

impl GetServiceResourceLogs {
    /// Logs handed back to the model for diagnosis.
    pub fn for_diagnose(client: PlatformClient) -> Self {
        Self {
            client,
            direct: false,
        }
    }

    /// Logs shown to the user verbatim.
    pub fn return_direct(client: PlatformClient) -> Self {
        Self {
            client,
            direct: true,
        }
    }
}

#[async_trait]
impl CapabilityHandler for GetServiceResourceLogs {
    type Input = JsonInput<ResourceLogsInput>;

    fn descriptor(&self) -> CapabilityDescriptor {
        if self.direct {
            CapabilityDescriptor::new(
                "get_service_resource_logs_return_direct",
                "Get logs of a service resource and show them to the user directly. Useful when the user wants to see logs. Get the keys of the resource first.",
            )
            .with_direct_output()
        } else {
            CapabilityDescriptor::new(
                "get_service_resource_logs_for_diagnose",
                "Get logs of a service resource. Use when you need to diagnose a service error with logs. Get the keys of the resource first.",
            )
        }
    }

    async fn call(
        &self,
        input: Self::Input,
        context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        let (project_id, environment_id) = environment_scope(&context.get())?;
        let log = self
            .client
            .get_service_resource_logs(
                &project_id,
                &environment_id,
                &request.service_id,
                &request.service_resource_id,
                &request.key,
                request.line_number.unwrap_or(DEFAULT_LOG_LINES),
            )
            .await?;
        Ok(format!("{}\n{}", text::RESOURCE_LOG_PREFIX, fenced("", &log)))
    }
}

pub struct GetServiceAccessEndpoints {
    client: PlatformClient,
}

impl GetServiceAccessEndpoints {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for GetServiceAccessEndpoints {
    type Input = TextInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "get_service_access_endpoints",
            "Get access endpoints of a service. Input should be the id of a service.",
        )
    }

    async fn call(&self, input: TextInput, context: &ContextStore) -> Result<String, CapabilityError> {
        let (project_id, environment_id) = environment_scope(&context.get())?;
        Ok(self
            .client
            .get_service_access_endpoints(&project_id, &environment_id, input.as_str())
            .await?)
    }
}

pub struct GetServiceDependencyGraph {
    client: PlatformClient,
}

impl GetServiceDependencyGraph {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for GetServiceDependencyGraph {
    type Input = TextInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "get_service_dependency_graph",
            "Get the dependency graph of a service. Input should be a service id. Output is JSON wrapped in triple backticks; return it to the user unchanged.",
        )
    }

    async fn call(&self, input: TextInput, context: &ContextStore) -> Result<String, CapabilityError> {
        let (project_id, environment_id) = environment_scope(&context.get())?;
        let graph = self
            .client
            .get_service_graph(&project_id, &environment_id, input.as_str())
            .await?;
        Ok(fenced("service_resource_graph", &graph))
    }
}
