//! Capabilities: the actions the model can take.
//!
//! `capability` and `registry` define the interfaces. The remaining modules
//! implement the platform catalog registered by [`default_registry`] and the
//! Kubernetes catalog registered by [`kubernetes_registry`].

pub mod capability;
pub mod context_ops;
pub mod defaults;
pub mod environment_ops;
pub mod general;
pub mod helm_ops;
pub mod k8s_ops;
pub mod project_ops;
pub mod registry;
pub mod service_ops;
pub mod template_ops;
pub mod watch;

pub use capability::{
    Capability, CapabilityDescriptor, CapabilityError, CapabilityHandler, CapabilityInput,
    InputError, InputSchema, JsonInput, NoInput, Registered, TextInput,
};
pub use defaults::{default_registry, kubernetes_registry, CatalogDeps, KubernetesDeps};
pub use registry::{CapabilityRegistry, RegistryError};
pub use watch::{stdout_sink, EventSink, Inform, StopSignal};

use crate::context::Context;
use serde::Serialize;
use serde_json::Value;

/// Project id of the active context, or a `MissingContext` error.
pub(crate) fn project_scope(context: &Context) -> Result<String, CapabilityError> {
    if !context.has_project() {
        return Err(CapabilityError::MissingContext(
            "no project is selected; use change_context first".to_string(),
        ));
    }
    Ok(context.project_id.clone())
}

/// `(project_id, environment_id)` of the active context.
pub(crate) fn environment_scope(context: &Context) -> Result<(String, String), CapabilityError> {
    let project_id = project_scope(context)?;
    if !context.has_environment() {
        return Err(CapabilityError::MissingContext(
            "no environment is selected; use change_context first".to_string(),
        ));
    }
    Ok((project_id, context.environment_id.clone()))
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CapabilityError> {
    serde_json::to_string(value).map_err(|e| CapabilityError::Failed(e.to_string()))
}

/// JSON array of `items`, or `empty_message` when there are none.
pub(crate) fn render_list(items: &[Value], empty_message: &str) -> Result<String, CapabilityError> {
    if items.is_empty() {
        return Ok(empty_message.to_string());
    }
    to_json(items)
}

/// Wrap a raw payload in a fenced block tagged `tag`.
pub(crate) fn fenced(tag: &str, body: &str) -> String {
    format!("```{}\n{}\n```", tag, body.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_require_ids() {
        let mut ctx = Context::default();
        assert!(matches!(project_scope(&ctx), Err(CapabilityError::MissingContext(_))));
        ctx.project_id = "p1".into();
        assert_eq!(project_scope(&ctx).unwrap(), "p1");
        assert!(environment_scope(&ctx).is_err());
        ctx.environment_id = "e1".into();
        assert_eq!(
            environment_scope(&ctx).unwrap(),
            ("p1".to_string(), "e1".to_string())
        );
    }

    #[test]
    fn empty_lists_render_message() {
        assert_eq!(render_list(&[], "No services found.").unwrap(), "No services found.");
        let items = vec![serde_json::json!({"name": "web"})];
        assert_eq!(render_list(&items, "x").unwrap(), r#"[{"name":"web"}]"#);
    }
}
