//! Context capabilities: read and switch the active project/environment.

use super::capability::{
    CapabilityDescriptor, CapabilityError, CapabilityHandler, JsonInput, NoInput,
};
use super::to_json;
use crate::context::{json_str, ContextStore, ContextUpdate};
use crate::platform::PlatformClient;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

pub struct CurrentContext;

#[async_trait]
impl CapabilityHandler for CurrentContext {
    type Input = NoInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "current_context",
            "Get current project and environment context.",
        )
    }

    async fn call(&self, _input: NoInput, context: &ContextStore) -> Result<String, CapabilityError> {
        to_json(&context.get())
    }
}

/// Input for change_context. Omitted or empty names leave that scope as is.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ChangeContextInput {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub environment_name: Option<String>,
}

pub struct ChangeContext {
    client: PlatformClient,
}

impl ChangeContext {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CapabilityHandler for ChangeContext {
    type Input = JsonInput<ChangeContextInput>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "change_context",
            "Change project and environment context. If the user did not specify one of the two names, leave it empty.",
        )
    }

    async fn call(
        &self,
        input: Self::Input,
        context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        let project_name = request.project_name.filter(|n| !n.trim().is_empty());
        let environment_name = request.environment_name.filter(|n| !n.trim().is_empty());
        if project_name.is_none() && environment_name.is_none() {
            return Err(CapabilityError::InvalidInput {
                capability: "change_context".to_string(),
                message: "provide project_name, environment_name or both".to_string(),
            });
        }

        let mut update = ContextUpdate::default();
        let mut project_id = context.get().project_id;

        if let Some(name) = project_name {
            let project = self.client.get_project(&name).await?;
            project_id = json_str(&project, "id");
            update.project_id = Some(project_id.clone());
            update.project_name = Some(json_str(&project, "name"));
        }

        if let Some(name) = environment_name {
            if project_id.is_empty() {
                return Err(CapabilityError::MissingContext(
                    "an environment can only be selected within a project".to_string(),
                ));
            }
            let environment = self.client.get_environment(&project_id, &name).await?;
            update.environment_id = Some(json_str(&environment, "id"));
            update.environment_name = Some(json_str(&environment, "name"));
        }

        context.set(update);
        let current = context.get();
        info!(
            "Context changed: project={} environment={}",
            current.project_name, current.environment_name
        );
        Ok(format!("Context changed. Current context: {}", to_json(&current)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::capability::{Capability, Registered};
    use crate::context::Context;
    use crate::platform::PlatformConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store() -> ContextStore {
        ContextStore::new(Context {
            project_id: "p1".into(),
            project_name: "default".into(),
            environment_id: "e1".into(),
            environment_name: "dev".into(),
        })
    }

    #[tokio::test]
    async fn current_context_is_json() {
        let out = Registered::new(CurrentContext)
            .invoke("", &store())
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["environment_name"], "dev");
    }

    #[tokio::test]
    async fn switches_environment_within_current_project() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/p1/environments/staging"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "e2", "name": "staging"})))
            .expect(1)
            .mount(&server)
            .await;
        let client = PlatformClient::new(PlatformConfig::new(server.uri(), "k")).unwrap();
        let ctx = store();

        let out = Registered::new(ChangeContext::new(client))
            .invoke(r#"{"project_name": "", "environment_name": "staging"}"#, &ctx)
            .await
            .unwrap();

        assert!(out.starts_with("Context changed."));
        let current = ctx.get();
        assert_eq!(current.project_name, "default");
        assert_eq!(current.environment_id, "e2");
    }

    #[tokio::test]
    async fn unknown_environment_leaves_context_alone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/p1/environments/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;
        let client = PlatformClient::new(PlatformConfig::new(server.uri(), "k")).unwrap();
        let ctx = store();

        let err = Registered::new(ChangeContext::new(client))
            .invoke(r#"{"environment_name": "nope"}"#, &ctx)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("404"));
        assert_eq!(ctx.get().environment_name, "dev");
    }

    #[tokio::test]
    async fn empty_request_is_invalid() {
        let client = PlatformClient::new(PlatformConfig::new("http://127.0.0.1:9", "k")).unwrap();
        let err = Registered::new(ChangeContext::new(client))
            .invoke("{}", &store())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidInput { .. }));
    }
}
