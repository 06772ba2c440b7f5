//! Active project/environment scope shared across capability invocations.
//!
//! The store is handed explicitly to every capability call. Only the
//! `change_context` capability writes to it; everything else reads.

use crate::platform::{PlatformClient, PlatformError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// The single active scope of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub project_id: String,
    pub project_name: String,
    pub environment_id: String,
    pub environment_name: String,
}

impl Context {
    pub fn has_project(&self) -> bool {
        !self.project_id.is_empty()
    }

    pub fn has_environment(&self) -> bool {
        !self.environment_id.is_empty()
    }
}

/// Partial context supplied to [`ContextStore::set`].
///
/// Fields are grouped in pairs: a pair is applied only when both of its
/// members are present and non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextUpdate {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub environment_id: Option<String>,
    #[serde(default)]
    pub environment_name: Option<String>,
}

impl ContextUpdate {
    pub fn project(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project_id: Some(id.into()),
            project_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn environment(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            environment_id: Some(id.into()),
            environment_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_environment(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.environment_id = Some(id.into());
        self.environment_name = Some(name.into());
        self
    }

    fn project_pair(&self) -> Option<(&str, &str)> {
        complete_pair(&self.project_id, &self.project_name)
    }

    fn environment_pair(&self) -> Option<(&str, &str)> {
        complete_pair(&self.environment_id, &self.environment_name)
    }
}

fn complete_pair<'a>(id: &'a Option<String>, name: &'a Option<String>) -> Option<(&'a str, &'a str)> {
    match (id.as_deref(), name.as_deref()) {
        (Some(id), Some(name)) if !id.is_empty() && !name.is_empty() => Some((id, name)),
        _ => None,
    }
}

/// Shared handle to the session context. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    inner: Arc<RwLock<Context>>,
}

impl ContextStore {
    pub fn new(initial: Context) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Snapshot of the current context.
    pub fn get(&self) -> Context {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply a field-group merge. Returns `true` if anything changed.
    pub fn set(&self, update: ContextUpdate) -> bool {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut changed = false;
        if let Some((id, name)) = update.project_pair() {
            guard.project_id = id.to_string();
            guard.project_name = name.to_string();
            changed = true;
        }
        if let Some((id, name)) = update.environment_pair() {
            guard.environment_id = id.to_string();
            guard.environment_name = name.to_string();
            changed = true;
        }
        changed
    }
}

/// Resolve the context a session starts with.
///
/// Explicit defaults win; otherwise the first project and its first
/// environment are used. A platform without projects leaves the context
/// empty rather than failing the session.
pub async fn resolve_initial_context(
    client: &PlatformClient,
    default_project: Option<&str>,
    default_environment: Option<&str>,
) -> Result<Context, PlatformError> {
    let mut context = Context::default();

    let project = match default_project.filter(|p| !p.is_empty()) {
        Some(name) => Some(client.get_project(name).await?),
        None => client.list_projects().await?.into_iter().next(),
    };
    let Some(project) = project else {
        warn!("No project available on the platform; starting with an empty context");
        return Ok(context);
    };
    context.project_id = json_str(&project, "id");
    context.project_name = json_str(&project, "name");

    let environment = match default_environment.filter(|e| !e.is_empty()) {
        Some(name) => Some(client.get_environment(&context.project_id, name).await?),
        None => client
            .list_environments(&context.project_id)
            .await?
            .into_iter()
            .next(),
    };
    match environment {
        Some(env) => {
            context.environment_id = json_str(&env, "id");
            context.environment_name = json_str(&env, "name");
        }
        None => warn!(
            "Project {} has no environment; environment scope left empty",
            context.project_name
        ),
    }

    info!(
        "Initial context: project={} environment={}",
        context.project_name, context.environment_name
    );
    Ok(context)
}

pub(crate) fn json_str(value: &serde_json::Value, key: &str) -> String {
    match value.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
