//! Kubernetes resource capabilities.
//!
//! Namespaces left empty fall back to the kubeconfig's default namespace;
//! listing accepts `--all` for every namespace.

use super::capability::{
    CapabilityDescriptor, CapabilityError, CapabilityHandler, JsonInput, TextInput,
};
use super::watch::{stdout_sink, EventSink, StopSignal};
use super::{fenced, to_json};
use crate::context::ContextStore;
use crate::kubernetes::{parse_manifests, ClusterClient, ALL_NAMESPACES};
use crate::llm::LanguageModel;
use crate::text;
use async_trait::async_trait;
use kube::api::DynamicObject;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

const DEFAULT_POD_LOG_LINES: i64 = 50;

const CONSTRUCT_RESOURCES_PROMPT: &str = "You plan Kubernetes deployments. Given a user query describing a deployment task, write the Kubernetes resources that carry it out.

First decide whether the resources can be built from the query alone. If they cannot, explain what is missing.
Otherwise answer in exactly this format, with no extra words:

CONSTRUCTED RESOURCES:
<RESOURCES_AS_MULTI_DOCUMENT_YAML>

The answer will be applied to a cluster as is.

User query: {query}

CONSTRUCTED RESOURCES:
";

/// Kind plus namespace.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct KindInNamespace {
    /// Resource kind, e.g. `pods` or `deploy`.
    pub resource_kind: String,
    /// Namespace. Empty for the default one.
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NamedResource {
    /// Resource kind, e.g. `service`.
    pub resource_kind: String,
    pub resource_name: String,
    /// Namespace. Empty for the default one.
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NamespacedName {
    pub name: String,
    /// Namespace. Empty for the default one.
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PodLogsRequest {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Container to read from; optional for single-container pods.
    #[serde(default)]
    pub container_name: String,
    /// Number of trailing lines, 50 when omitted.
    #[serde(default)]
    pub line_number: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResourceQuery {
    /// Description of the deployment task.
    pub user_query: String,
}

/// Plain-text table of objects, kubectl style.
fn render_table(objects: &[DynamicObject], all_namespaces: bool) -> String {
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(objects.len() + 1);
    let mut header = vec!["NAME".to_string(), "CREATED".to_string()];
    if all_namespaces {
        header.insert(0, "NAMESPACE".to_string());
    }
    rows.push(header);
    for object in objects {
        let mut row = vec![
            object.metadata.name.clone().unwrap_or_default(),
            object
                .metadata
                .creation_timestamp
                .as_ref()
                .map(|t| t.0.to_rfc3339())
                .unwrap_or_default(),
        ];
        if all_namespaces {
            row.insert(0, object.metadata.namespace.clone().unwrap_or_default());
        }
        rows.push(row);
    }

    let columns = rows[0].len();
    let widths: Vec<usize> = (0..columns)
        .map(|c| rows.iter().map(|r| r[c].len()).max().unwrap_or(0))
        .collect();
    rows.iter()
        .map(|row| {
            row.iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                .collect::<Vec<_>>()
                .join("   ")
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ListKubernetesResources {
    cluster: ClusterClient,
}

impl ListKubernetesResources {
    pub fn new(cluster: ClusterClient) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl CapabilityHandler for ListKubernetesResources {
    type Input = JsonInput<KindInNamespace>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "list_kubernetes_resources",
            "List kubernetes resources of a kind. Set namespace to --all to list in all namespaces.",
        )
        .with_direct_output()
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        let objects = self
            .cluster
            .list(&request.resource_kind, &request.namespace)
            .await?;
        if objects.is_empty() {
            return Ok(format!("No {} found.", request.resource_kind));
        }
        let table = render_table(&objects, request.namespace.trim() == ALL_NAMESPACES);
        Ok(fenced("", &table))
    }
}

pub struct GetKubernetesResourceDetail {
    cluster: ClusterClient,
}

impl GetKubernetesResourceDetail {
    pub fn new(cluster: ClusterClient) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl CapabilityHandler for GetKubernetesResourceDetail {
    type Input = JsonInput<NamedResource>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "get_kubernetes_resource_detail",
            "Get detail of a kubernetes resource.",
        )
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        let resource = self
            .cluster
            .get(&request.resource_kind, &request.resource_name, &request.namespace)
            .await?;
        to_json(&resource)
    }
}

pub struct GetKubernetesServiceAccessEndpoints {
    cluster: ClusterClient,
}

impl GetKubernetesServiceAccessEndpoints {
    pub fn new(cluster: ClusterClient) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl CapabilityHandler for GetKubernetesServiceAccessEndpoints {
    type Input = JsonInput<NamespacedName>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "get_kubernetes_service_access_endpoints",
            "Get access endpoints of a kubernetes service.",
        )
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        let endpoints = self
            .cluster
            .service_endpoints(&request.name, &request.namespace)
            .await?;
        to_json(&endpoints)
    }
}

pub struct GetKubernetesIngressAccessEndpoints {
    cluster: ClusterClient,
}

impl GetKubernetesIngressAccessEndpoints {
    pub fn new(cluster: ClusterClient) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl CapabilityHandler for GetKubernetesIngressAccessEndpoints {
    type Input = JsonInput<NamespacedName>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "get_kubernetes_ingress_access_endpoints",
            "Get access endpoints of a kubernetes ingress.",
        )
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        let endpoints = self
            .cluster
            .ingress_endpoints(&request.name, &request.namespace)
            .await?;
        to_json(&endpoints)
    }
}

pub struct GetKubernetesPodLogs {
    cluster: ClusterClient,
}

impl GetKubernetesPodLogs {
    pub fn new(cluster: ClusterClient) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl CapabilityHandler for GetKubernetesPodLogs {
    type Input = JsonInput<PodLogsRequest>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new("get_kubernetes_pod_logs", "Get logs of a pod.")
            .with_direct_output()
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        let container = Some(request.container_name).filter(|c| !c.trim().is_empty());
        let log = self
            .cluster
            .pod_logs(
                &request.name,
                &request.namespace,
                container,
                request.line_number.unwrap_or(DEFAULT_POD_LOG_LINES),
            )
            .await?;
        Ok(fenced("", &log))
    }
}

/// Streams resource changes until interrupted.
pub struct WatchKubernetesResources {
    cluster: ClusterClient,
    output: EventSink,
    stop: StopSignal,
}

impl WatchKubernetesResources {
    pub fn new(cluster: ClusterClient) -> Self {
        Self {
            cluster,
            output: stdout_sink(),
            stop: StopSignal::CtrlC,
        }
    }

    pub fn with_output(mut self, output: EventSink) -> Self {
        self.output = output;
        self
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }
}

#[async_trait]
impl CapabilityHandler for WatchKubernetesResources {
    type Input = JsonInput<KindInNamespace>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new("watch_resources", "Watch resources changes in a namespace.")
            .with_direct_output()
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        (self.output)(text::WATCH_NOTE);
        let output = self.output.clone();
        let stream = self
            .cluster
            .watch(&request.resource_kind, &request.namespace, move |line| output(line));
        tokio::select! {
            result = stream => result?,
            _ = self.stop.wait() => info!("Resource watch halted"),
        }
        Ok(text::WATCH_ENDING.to_string())
    }
}

pub struct DeleteKubernetesResource {
    cluster: ClusterClient,
}

impl DeleteKubernetesResource {
    pub fn new(cluster: ClusterClient) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl CapabilityHandler for DeleteKubernetesResource {
    type Input = JsonInput<NamedResource>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "delete_a_kubernetes_resource",
            "Delete a kubernetes resource.",
        )
        .with_approval()
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        self.cluster
            .delete(&request.resource_kind, &request.resource_name, &request.namespace)
            .await?;
        Ok("Resource is being deleted.".to_string())
    }
}

pub struct ConstructKubernetesResources {
    model: Arc<dyn LanguageModel>,
}

impl ConstructKubernetesResources {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl CapabilityHandler for ConstructKubernetesResources {
    type Input = JsonInput<ResourceQuery>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "construct_kubernetes_resources",
            "Construct Kubernetes resources for a deployment task. The output is kubernetes resources in yaml format.",
        )
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let prompt = CONSTRUCT_RESOURCES_PROMPT.replace("{query}", &to_json(&input.0.user_query)?);
        Ok(self.model.complete(&prompt).await?.trim().to_string())
    }
}

pub struct ApplyKubernetesResources {
    cluster: ClusterClient,
}

impl ApplyKubernetesResources {
    pub fn new(cluster: ClusterClient) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl CapabilityHandler for ApplyKubernetesResources {
    type Input = TextInput;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "apply_kubernetes_resources",
            "Apply kubernetes resources to the cluster. Input should be complete kubernetes resources in yaml format; never empty.",
        )
        .with_approval()
    }

    async fn call(&self, input: TextInput, _context: &ContextStore) -> Result<String, CapabilityError> {
        let objects = parse_manifests(input.as_str())?;
        if objects.is_empty() {
            return Err(CapabilityError::InvalidInput {
                capability: "apply_kubernetes_resources".to_string(),
                message: "no resources in the input".to_string(),
            });
        }
        let applied = self.cluster.apply(&objects).await?;
        let summary: Vec<_> = applied
            .iter()
            .map(|(kind, name)| serde_json::json!({"kind": kind, "name": name}))
            .collect();
        Ok(format!("Applied the following resources: {}", to_json(&summary)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::capability::{Capability, Registered};
    use crate::kubernetes::testing::{cluster_for, mount_discovery, not_found};
    use crate::llm::ModelError;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct CannedModel {
        answer: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answer.clone())
        }
    }

    #[tokio::test]
    async fn list_renders_table_across_namespaces() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("GET"))
            .and(path("/apis/apps/v1/deployments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "apps/v1", "kind": "DeploymentList", "metadata": {},
                "items": [
                    {"metadata": {"name": "web", "namespace": "shop",
                                  "creationTimestamp": "2024-05-01T10:00:00Z"}},
                    {"metadata": {"name": "coredns", "namespace": "kube-system",
                                  "creationTimestamp": "2024-04-01T08:00:00Z"}}
                ]
            })))
            .mount(&server)
            .await;

        let cap = Registered::new(ListKubernetesResources::new(cluster_for(&server)));
        assert!(cap.descriptor().direct_output);
        let out = cap
            .invoke(r#"{"resource_kind": "deploy", "namespace": "--all"}"#, &ContextStore::default())
            .await
            .unwrap();

        assert_eq!(
            out,
            "```\n\
NAMESPACE     NAME      CREATED\n\
shop          web       2024-05-01T10:00:00+00:00\n\
kube-system   coredns   2024-04-01T08:00:00+00:00\n```"
        );
    }

    #[tokio::test]
    async fn empty_list_says_so() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/pods"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1", "kind": "PodList", "metadata": {}, "items": []
            })))
            .mount(&server)
            .await;

        let out = Registered::new(ListKubernetesResources::new(cluster_for(&server)))
            .invoke(r#"{"resource_kind": "pods"}"#, &ContextStore::default())
            .await
            .unwrap();
        assert_eq!(out, "No pods found.");
    }

    #[tokio::test]
    async fn unknown_kind_is_reported() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;

        let err = Registered::new(GetKubernetesResourceDetail::new(cluster_for(&server)))
            .invoke(
                r#"{"resource_kind": "widgets", "resource_name": "a"}"#,
                &ContextStore::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Resource widgets not found.");
    }

    #[tokio::test]
    async fn delete_is_gated_and_targets_namespace() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/namespaces/shop/services/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "Status", "apiVersion": "v1", "metadata": {},
                "status": "Success", "code": 200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cap = Registered::new(DeleteKubernetesResource::new(cluster_for(&server)));
        assert!(cap.descriptor().requires_approval);
        let out = cap
            .invoke(
                r#"{"resource_kind": "svc", "resource_name": "web", "namespace": "shop"}"#,
                &ContextStore::default(),
            )
            .await
            .unwrap();
        assert_eq!(out, "Resource is being deleted.");
    }

    #[tokio::test]
    async fn pod_logs_default_to_fifty_lines() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/pods/web-0/log"))
            .and(query_param("tailLines", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_string("GET / 200\n"))
            .expect(1)
            .mount(&server)
            .await;

        let out = Registered::new(GetKubernetesPodLogs::new(cluster_for(&server)))
            .invoke(r#"{"name": "web-0", "container_name": ""}"#, &ContextStore::default())
            .await
            .unwrap();
        assert_eq!(out, "```\nGET / 200\n```");
    }

    #[tokio::test]
    async fn apply_summarizes_what_was_created() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/services/web"))
            .respond_with(not_found("web"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/namespaces/default/services"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "apiVersion": "v1", "kind": "Service", "metadata": {"name": "web"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cap = Registered::new(ApplyKubernetesResources::new(cluster_for(&server)));
        assert!(cap.descriptor().requires_approval);
        let out = cap
            .invoke(
                "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\nspec:\n  ports:\n  - port: 80\n",
                &ContextStore::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            out,
            r#"Applied the following resources: [{"kind":"Service","name":"web"}]"#
        );
    }

    #[tokio::test]
    async fn apply_rejects_empty_manifests() {
        let server = MockServer::start().await;
        let err = Registered::new(ApplyKubernetesResources::new(cluster_for(&server)))
            .invoke("```yaml\n```", &ContextStore::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn construct_sends_query_to_model() {
        let model = Arc::new(CannedModel {
            answer: "CONSTRUCTED RESOURCES:\napiVersion: v1\nkind: Pod\n".to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let out = Registered::new(ConstructKubernetesResources::new(model.clone()))
            .invoke(r#"{"user_query": "run nginx"}"#, &ContextStore::default())
            .await
            .unwrap();

        assert!(out.starts_with("CONSTRUCTED RESOURCES:"));
        assert!(model.prompts.lock().unwrap()[0].contains("User query: \"run nginx\""));
    }

    #[tokio::test]
    async fn watch_halts_on_stop_signal() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/pods"))
            .and(query_param("watch", "true"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("")
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;
        let lines = Arc::new(Mutex::new(Vec::new()));
        let seen = lines.clone();
        let notify = Arc::new(Notify::new());
        notify.notify_one();

        let cap = Registered::new(
            WatchKubernetesResources::new(cluster_for(&server))
                .with_output(Arc::new(move |line: &str| seen.lock().unwrap().push(line.to_string())))
                .with_stop(StopSignal::Notify(notify)),
        );
        let out = tokio::time::timeout(
            Duration::from_secs(5),
            cap.invoke(r#"{"resource_kind": "pods"}"#, &ContextStore::default()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(out, text::WATCH_ENDING);
        assert_eq!(*lines.lock().unwrap(), vec![text::WATCH_NOTE.to_string()]);
    }
}
