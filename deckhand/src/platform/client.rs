//! HTTP client for the application platform REST API.

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use urlencoding::encode;

use crate::utils::redact_text_for_logs;

/// Fields of a template version that only add noise to prompts.
const TEMPLATE_VERSION_NOISE: &[&str] = &[
    "readme",
    "outputs",
    "requiredProviders",
    "createTime",
    "updateTime",
    "id",
    "source",
];

/// Upper bound for one watch stream; the client-wide timeout would cut it short.
const WATCH_STREAM_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

const TEMPLATE_NOISE: &[&str] = &["createTime", "updateTime", "status", "source"];

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{operation} failed with HTTP {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("{operation} failed: {message}")]
    Transport { operation: String, message: String },
    #[error("{operation} returned an unexpected payload: {message}")]
    Decode { operation: String, message: String },
    #[error("{0}")]
    NotFound(String),
}

impl PlatformError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            PlatformError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Connection settings for [`PlatformClient`].
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub api_url: String,
    pub api_key: String,
    pub skip_tls_verify: bool,
    pub timeout: Duration,
}

impl PlatformConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            skip_tls_verify: false,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Thin typed wrapper over the platform's `/v1` endpoints.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl PlatformClient {
    pub fn new(config: PlatformConfig) -> Result<Self, PlatformError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .build()
            .map_err(|e| PlatformError::Transport {
                operation: "build http client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            http,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/v1{}", self.base_url, path);
        debug!("{} {}", method, url);
        self.http
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
    }

    async fn send(
        &self,
        operation: &str,
        builder: RequestBuilder,
        expected: StatusCode,
    ) -> Result<String, PlatformError> {
        let response = builder.send().await.map_err(|e| PlatformError::Transport {
            operation: operation.to_string(),
            message: redact_text_for_logs(&e.to_string()),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| PlatformError::Transport {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;
        if status != expected {
            return Err(PlatformError::Status {
                operation: operation.to_string(),
                status: status.as_u16(),
                body: redact_text_for_logs(&body),
            });
        }
        Ok(body)
    }

    async fn send_json(
        &self,
        operation: &str,
        builder: RequestBuilder,
        expected: StatusCode,
    ) -> Result<Value, PlatformError> {
        let body = self.send(operation, builder, expected).await?;
        serde_json::from_str(&body).map_err(|e| PlatformError::Decode {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }

    async fn list_items(&self, operation: &str, path: &str) -> Result<Vec<Value>, PlatformError> {
        let builder = self
            .request(Method::GET, path)
            .query(&[("perPage", "-1")]);
        let value = self.send_json(operation, builder, StatusCode::OK).await?;
        items_of(operation, value)
    }

    // ── Projects ────────────────────────────────────────────────────────────

    pub async fn list_projects(&self) -> Result<Vec<Value>, PlatformError> {
        self.list_items("list projects", "/projects").await
    }

    /// Get a project by id or name.
    pub async fn get_project(&self, project: &str) -> Result<Value, PlatformError> {
        let path = format!("/projects/{}", encode(project));
        let op = format!("get project {}", project);
        self.send_json(&op, self.request(Method::GET, &path), StatusCode::OK)
            .await
    }

    // ── Environments ────────────────────────────────────────────────────────

    pub async fn list_environments(&self, project_id: &str) -> Result<Vec<Value>, PlatformError> {
        let path = format!("/projects/{}/environments", encode(project_id));
        self.list_items("list environments", &path).await
    }

    /// Get an environment by id or name.
    pub async fn get_environment(
        &self,
        project_id: &str,
        environment: &str,
    ) -> Result<Value, PlatformError> {
        let path = format!(
            "/projects/{}/environments/{}",
            encode(project_id),
            encode(environment)
        );
        let op = format!("get environment {}", environment);
        self.send_json(&op, self.request(Method::GET, &path), StatusCode::OK)
            .await
    }

    pub async fn create_environment(
        &self,
        project_id: &str,
        environment: &Value,
    ) -> Result<String, PlatformError> {
        let path = format!("/projects/{}/environments", encode(project_id));
        let builder = self.request(Method::POST, &path).json(environment);
        self.send("create environment", builder, StatusCode::CREATED)
            .await
    }

    pub async fn delete_environments(
        &self,
        project_id: &str,
        ids: &[String],
    ) -> Result<String, PlatformError> {
        let path = format!("/projects/{}/environments", encode(project_id));
        let builder = self.request(Method::DELETE, &path).json(&id_items(ids));
        self.send("delete environments", builder, StatusCode::OK)
            .await
    }

    pub async fn get_environment_graph(
        &self,
        project_id: &str,
        environment: &str,
    ) -> Result<String, PlatformError> {
        let path = format!(
            "/projects/{}/environments/{}/graph",
            encode(project_id),
            encode(environment)
        );
        self.send(
            "get environment dependency graph",
            self.request(Method::GET, &path),
            StatusCode::OK,
        )
        .await
    }

    // ── Services ────────────────────────────────────────────────────────────

    fn services_path(project_id: &str, environment_id: &str) -> String {
        format!(
            "/projects/{}/environments/{}/services",
            encode(project_id),
            encode(environment_id)
        )
    }

    pub async fn list_services(
        &self,
        project_id: &str,
        environment_id: &str,
    ) -> Result<Vec<Value>, PlatformError> {
        let path = Self::services_path(project_id, environment_id);
        self.list_items("list services", &path).await
    }

    pub async fn list_services_in_all_environments(
        &self,
        project_id: &str,
    ) -> Result<Vec<Value>, PlatformError> {
        let mut services = Vec::new();
        for env in self.list_environments(project_id).await? {
            let env_id = crate::context::json_str(&env, "id");
            services.extend(self.list_services(project_id, &env_id).await?);
        }
        Ok(services)
    }

    /// Get a service by id or name.
    pub async fn get_service(
        &self,
        project_id: &str,
        environment_id: &str,
        service: &str,
    ) -> Result<Value, PlatformError> {
        let path = format!(
            "{}/{}",
            Self::services_path(project_id, environment_id),
            encode(service)
        );
        let op = format!("get service {}", service);
        self.send_json(&op, self.request(Method::GET, &path), StatusCode::OK)
            .await
    }

    /// Stream change events of the services in an environment. `on_event`
    /// gets one call per non-empty line until the server closes the stream.
    pub async fn watch_services(
        &self,
        project_id: &str,
        environment_id: &str,
        mut on_event: impl FnMut(&str),
    ) -> Result<(), PlatformError> {
        const OPERATION: &str = "watch services";
        let transport = |e: reqwest::Error| PlatformError::Transport {
            operation: OPERATION.to_string(),
            message: redact_text_for_logs(&e.to_string()),
        };

        let path = Self::services_path(project_id, environment_id);
        let mut response = self
            .request(Method::GET, &path)
            .query(&[("watch", "true")])
            .timeout(WATCH_STREAM_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Status {
                operation: OPERATION.to_string(),
                status: status.as_u16(),
                body: redact_text_for_logs(&body),
            });
        }

        let mut pending = String::new();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            pending.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(end) = pending.find('\n') {
                let line: String = pending.drain(..=end).collect();
                emit_event_line(&line, &mut on_event);
            }
        }
        emit_event_line(&pending, &mut on_event);
        Ok(())
    }

    pub async fn create_service(
        &self,
        project_id: &str,
        environment_id: &str,
        service: &Value,
    ) -> Result<String, PlatformError> {
        let path = Self::services_path(project_id, environment_id);
        let builder = self.request(Method::POST, &path).json(service);
        self.send("create service", builder, StatusCode::CREATED).await
    }

    pub async fn update_service(
        &self,
        project_id: &str,
        environment_id: &str,
        service: &Value,
    ) -> Result<String, PlatformError> {
        let id = service
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PlatformError::Decode {
                operation: "update service".to_string(),
                message: "service object has no \"id\"".to_string(),
            })?;
        let path = format!(
            "{}/{}/upgrade",
            Self::services_path(project_id, environment_id),
            encode(id)
        );
        let builder = self.request(Method::PUT, &path).json(service);
        self.send("update service", builder, StatusCode::OK).await
    }

    pub async fn delete_services(
        &self,
        project_id: &str,
        environment_id: &str,
        ids: &[String],
    ) -> Result<String, PlatformError> {
        let path = Self::services_path(project_id, environment_id);
        let builder = self.request(Method::DELETE, &path).json(&id_items(ids));
        self.send("delete services", builder, StatusCode::OK).await
    }

    pub async fn get_service_access_endpoints(
        &self,
        project_id: &str,
        environment_id: &str,
        service_id: &str,
    ) -> Result<String, PlatformError> {
        let path = format!(
            "{}/{}/access-endpoints",
            Self::services_path(project_id, environment_id),
            encode(service_id)
        );
        self.send(
            "get service access endpoints",
            self.request(Method::GET, &path),
            StatusCode::OK,
        )
        .await
    }

    pub async fn get_service_graph(
        &self,
        project_id: &str,
        environment_id: &str,
        service_id: &str,
    ) -> Result<String, PlatformError> {
        let path = format!(
            "{}/{}/graph",
            Self::services_path(project_id, environment_id),
            encode(service_id)
        );
        self.send(
            "get service dependency graph",
            self.request(Method::GET, &path),
            StatusCode::OK,
        )
        .await
    }

    pub async fn list_service_resources(
        &self,
        project_id: &str,
        environment_id: &str,
        service_id: &str,
    ) -> Result<Vec<Value>, PlatformError> {
        let path = format!(
            "{}/{}/resources",
            Self::services_path(project_id, environment_id),
            encode(service_id)
        );
        self.list_items("list service resources", &path).await
    }

    pub async fn get_service_resource_keys(
        &self,
        project_id: &str,
        environment_id: &str,
        service_id: &str,
        resource_id: &str,
    ) -> Result<String, PlatformError> {
        let path = format!(
            "{}/{}/resources/{}/keys",
            Self::services_path(project_id, environment_id),
            encode(service_id),
            encode(resource_id)
        );
        self.send(
            "get service resource keys",
            self.request(Method::GET, &path),
            StatusCode::OK,
        )
        .await
    }

    pub async fn get_service_resource_logs(
        &self,
        project_id: &str,
        environment_id: &str,
        service_id: &str,
        resource_id: &str,
        key: &str,
        tail_lines: u32,
    ) -> Result<String, PlatformError> {
        let path = format!(
            "{}/{}/resources/{}/log",
            Self::services_path(project_id, environment_id),
            encode(service_id),
            encode(resource_id)
        );
        let builder = self
            .request(Method::GET, &path)
            .query(&[("key", key.to_string()), ("tailLines", tail_lines.to_string())]);
        self.send("get service resource logs", builder, StatusCode::OK)
            .await
    }

    // ── Templates ───────────────────────────────────────────────────────────

    pub async fn list_templates(&self) -> Result<Vec<Value>, PlatformError> {
        let mut templates = self.list_items("list templates", "/templates").await?;
        for template in &mut templates {
            strip_keys(template, TEMPLATE_NOISE);
        }
        Ok(templates)
    }

    /// Latest version of a template (by id or name), without prompt noise.
    pub async fn get_template_version(&self, template: &str) -> Result<Value, PlatformError> {
        let path = format!("/templates/{}/versions", encode(template));
        let mut versions = self.list_items("list template versions", &path).await?;
        if versions.is_empty() {
            return Err(PlatformError::NotFound(format!(
                "Template version not found for {}",
                template
            )));
        }
        let mut version = versions.swap_remove(0);
        strip_keys(&mut version, TEMPLATE_VERSION_NOISE);
        if let Some(schema) = version.get_mut("schema") {
            strip_keys(schema, TEMPLATE_VERSION_NOISE);
        }
        Ok(version)
    }
}

fn items_of(operation: &str, value: Value) -> Result<Vec<Value>, PlatformError> {
    match value {
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(PlatformError::Decode {
                operation: operation.to_string(),
                message: format!("\"items\" is not an array: {}", other),
            }),
        },
        Value::Array(items) => Ok(items),
        other => Err(PlatformError::Decode {
            operation: operation.to_string(),
            message: format!("expected an object with \"items\", got {}", other),
        }),
    }
}

/// Server-sent events carry a `data:` prefix; plain line streams do not.
fn emit_event_line(line: &str, on_event: &mut impl FnMut(&str)) {
    let line = line.trim();
    let line = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    if !line.is_empty() {
        on_event(line);
    }
}

fn id_items(ids: &[String]) -> Value {
    json!({ "items": ids.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>() })
}

fn strip_keys(value: &mut Value, keys: &[&str]) {
    if let Value::Object(map) = value {
        for key in keys {
            map.remove(*key);
        }
    }
}
