//! Helm application capabilities: search, deploy, upgrade and inspect
//! releases.

use super::capability::{CapabilityDescriptor, CapabilityError, CapabilityHandler, JsonInput};
use super::to_json;
use crate::context::ContextStore;
use crate::kubernetes::{
    parse_manifests, recorded_chart_url, ArtifactHub, ClusterClient, Helm, KubeError, CHART_URL_KEY,
};
use crate::llm::LanguageModel;
use crate::utils::strip_code_fence;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const OVERRIDE_VALUES_PROMPT: &str = "Below are the default values of a helm chart and a user query describing a deployment task.

Write the values, in YAML, that override the defaults so that the installation satisfies the query. Answer with the YAML only.

USER QUERY:
{query}

DEFAULT VALUES:
{default_values}

OVERRIDE VALUES:
";

const UPGRADE_VALUES_PROMPT: &str = "Below are the default values of a helm chart, the values a release currently uses and a user query describing an upgrade.

Write the values, in YAML, for the upgrade. Carry over every current value the query does not change. Answer with the YAML only.

USER QUERY:
{query}

DEFAULT VALUES:
{default_values}

CURRENT VALUES:
{previous_values}

UPGRADE VALUES:
";

/// Kinds whose replicas count towards a release's readiness.
const WORKLOAD_KINDS: &[&str] = &["Deployment", "StatefulSet", "DaemonSet"];

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ChartQuery {
    /// Description of the deployment task.
    pub user_query: String,
    /// Keyword to search charts with.
    pub keyword: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeployRequest {
    #[serde(default)]
    pub namespace: String,
    /// Release name; pick a reasonable one when the user gave none.
    pub name: String,
    pub chart_url: String,
    /// Values overriding the chart defaults.
    #[serde(default)]
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpgradeQuery {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    /// Description of the upgrade.
    pub user_query: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpgradeRequest {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReleaseRef {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReleaseScope {
    /// Namespace; empty for the default one, `--all` for every namespace.
    #[serde(default)]
    pub namespace: String,
}

/// YAML values written by the model, as a JSON value.
fn parse_model_values(answer: &str) -> Result<Value, CapabilityError> {
    let yaml = strip_code_fence(answer);
    let values: Value = serde_yaml::from_str(yaml)
        .map_err(|e| CapabilityError::Failed(format!("model returned invalid YAML values: {}", e)))?;
    Ok(match values {
        Value::Null => Value::Object(Map::new()),
        other => other,
    })
}

fn int_at(object: &Value, pointer: &str) -> i64 {
    object.pointer(pointer).and_then(Value::as_i64).unwrap_or(0)
}

/// `(ready, desired)` replicas of a live workload object.
pub fn workload_replicas(kind: &str, object: &Value) -> (i64, i64) {
    match kind {
        "DaemonSet" => (
            int_at(object, "/status/numberReady"),
            int_at(object, "/status/desiredNumberScheduled"),
        ),
        _ => (
            int_at(object, "/status/readyReplicas"),
            int_at(object, "/spec/replicas"),
        ),
    }
}

pub struct SearchHelmChart {
    hub: ArtifactHub,
    helm: Helm,
    model: Arc<dyn LanguageModel>,
}

impl SearchHelmChart {
    pub fn new(hub: ArtifactHub, helm: Helm, model: Arc<dyn LanguageModel>) -> Self {
        Self { hub, helm, model }
    }
}

#[async_trait]
impl CapabilityHandler for SearchHelmChart {
    type Input = JsonInput<ChartQuery>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "search_helm_chart",
            "Search helm charts in Artifact Hub. Output a matching chart and overrided values for the helm deployment.",
        )
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let query = input.0;
        let chart = self.hub.search(&query.keyword).await?;
        let default_values = self.helm.show_values(&chart.content_url).await?;

        let prompt = OVERRIDE_VALUES_PROMPT
            .replace("{query}", &query.user_query)
            .replace("{default_values}", &default_values);
        let answer = self.model.complete(&prompt).await?;

        let mut output = serde_json::to_value(&chart).map_err(|e| CapabilityError::Failed(e.to_string()))?;
        if let Value::Object(map) = &mut output {
            map.insert("overrided_values".to_string(), parse_model_values(&answer)?);
        }
        to_json(&output)
    }
}

pub struct DeployApplication {
    helm: Helm,
}

impl DeployApplication {
    pub fn new(helm: Helm) -> Self {
        Self { helm }
    }
}

#[async_trait]
impl CapabilityHandler for DeployApplication {
    type Input = JsonInput<DeployRequest>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "deploy_application",
            "Deploy an application using a helm chart.",
        )
        .with_approval()
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        self.helm
            .install(&request.namespace, &request.name, &request.chart_url, &request.values)
            .await?;
        Ok(format!("application {} is deployed.", request.name))
    }
}

pub struct GenerateUpgradeApplicationValues {
    helm: Helm,
    model: Arc<dyn LanguageModel>,
}

impl GenerateUpgradeApplicationValues {
    pub fn new(helm: Helm, model: Arc<dyn LanguageModel>) -> Self {
        Self { helm, model }
    }
}

#[async_trait]
impl CapabilityHandler for GenerateUpgradeApplicationValues {
    type Input = JsonInput<UpgradeQuery>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "generate_upgrade_application_values",
            "Generate values for upgrading an application. Output overrided values for the helm upgrade.",
        )
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let query = input.0;
        let previous_values = self.helm.release_values(&query.namespace, &query.name).await?;
        let chart_url = recorded_chart_url(&previous_values)?;
        let default_values = self.helm.show_values(&chart_url).await?;

        let prompt = UPGRADE_VALUES_PROMPT
            .replace("{query}", &query.user_query)
            .replace("{default_values}", &default_values)
            .replace("{previous_values}", &previous_values);
        let mut values = parse_model_values(&self.model.complete(&prompt).await?)?;
        if let Value::Object(map) = &mut values {
            map.remove(CHART_URL_KEY);
        }
        to_json(&values)
    }
}

pub struct UpgradeApplication {
    helm: Helm,
}

impl UpgradeApplication {
    pub fn new(helm: Helm) -> Self {
        Self { helm }
    }
}

#[async_trait]
impl CapabilityHandler for UpgradeApplication {
    type Input = JsonInput<UpgradeRequest>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new("upgrade_application", "Upgrade an application.").with_approval()
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let request = input.0;
        self.helm
            .upgrade(&request.namespace, &request.name, &request.values)
            .await?;
        Ok(format!("application {} is upgraded.", request.name))
    }
}

/// Lists releases with a `ready` replica summary.
pub struct ListApplications {
    helm: Helm,
    cluster: ClusterClient,
}

impl ListApplications {
    pub fn new(helm: Helm, cluster: ClusterClient) -> Self {
        Self { helm, cluster }
    }

    async fn ready_status(&self, name: &str, namespace: &str) -> Result<String, KubeError> {
        let manifest = self.helm.manifest(namespace, name).await?;
        let (mut ready, mut desired) = (0, 0);
        for object in parse_manifests(&manifest)? {
            let Some(kind) = object.types.as_ref().map(|t| t.kind.clone()) else {
                continue;
            };
            if !WORKLOAD_KINDS.contains(&kind.as_str()) {
                continue;
            }
            let live = self.cluster.get_manifest_object(&object, namespace).await?;
            let (r, d) = workload_replicas(&kind, &live);
            ready += r;
            desired += d;
        }
        Ok(format!("{}/{}", ready, desired))
    }
}

#[async_trait]
impl CapabilityHandler for ListApplications {
    type Input = JsonInput<ReleaseScope>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "list_applications",
            "List applications. Namespace can be empty for the current namespace, or --all for all namespaces.",
        )
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let mut releases = self.helm.list(&input.0.namespace).await?;
        for release in releases.iter_mut() {
            let Value::Object(map) = release else {
                continue;
            };
            map.remove("chart");
            map.remove("app_version");
            let name = map.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
            let namespace = map
                .get("namespace")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let ready = match self.ready_status(&name, &namespace).await {
                Ok(ready) => ready,
                Err(e) => {
                    warn!("Cannot compute readiness of {}: {}", name, e);
                    "unknown".to_string()
                }
            };
            map.insert("ready".to_string(), Value::String(ready));
        }
        to_json(&releases)
    }
}

pub struct GetApplicationDetail {
    helm: Helm,
}

impl GetApplicationDetail {
    pub fn new(helm: Helm) -> Self {
        Self { helm }
    }
}

#[async_trait]
impl CapabilityHandler for GetApplicationDetail {
    type Input = JsonInput<ReleaseRef>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new("get_application_detail", "Get application detail.")
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let release = input.0;
        Ok(self.helm.status(&release.namespace, &release.name).await?)
    }
}

pub struct GetApplicationAccessEndpoints {
    helm: Helm,
    cluster: ClusterClient,
}

impl GetApplicationAccessEndpoints {
    pub fn new(helm: Helm, cluster: ClusterClient) -> Self {
        Self { helm, cluster }
    }
}

#[async_trait]
impl CapabilityHandler for GetApplicationAccessEndpoints {
    type Input = JsonInput<ReleaseRef>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new(
            "get_application_access_endpoints",
            "Get application access endpoints.",
        )
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let release = input.0;
        let manifest = self.helm.manifest(&release.namespace, &release.name).await?;
        let mut endpoints = Vec::new();
        for object in parse_manifests(&manifest)? {
            let name = object.metadata.name.clone().unwrap_or_default();
            match object.types.as_ref().map(|t| t.kind.as_str()) {
                Some("Service") => endpoints.extend(
                    self.cluster
                        .service_endpoints(&name, &release.namespace)
                        .await?,
                ),
                Some("Ingress") => endpoints.extend(
                    self.cluster
                        .ingress_endpoints(&name, &release.namespace)
                        .await?,
                ),
                _ => {}
            }
        }
        debug!("Found {} endpoints for {}", endpoints.len(), release.name);
        to_json(&endpoints)
    }
}

pub struct DeleteApplication {
    helm: Helm,
}

impl DeleteApplication {
    pub fn new(helm: Helm) -> Self {
        Self { helm }
    }
}

#[async_trait]
impl CapabilityHandler for DeleteApplication {
    type Input = JsonInput<ReleaseRef>;

    fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor::new("delete_application", "Delete an application.").with_approval()
    }

    async fn call(
        &self,
        input: Self::Input,
        _context: &ContextStore,
    ) -> Result<String, CapabilityError> {
        let release = input.0;
        self.helm.uninstall(&release.namespace, &release.name).await?;
        Ok("Application is deleted.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::capability::{Capability, Registered};
    use crate::kubernetes::testing::{cluster_for, mount_discovery};
    use crate::kubernetes::ScriptedRunner;
    use crate::llm::ModelError;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct CannedModel {
        answer: String,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedModel {
        fn new(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: answer.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answer.clone())
        }
    }

    fn helm_with(runner: &Arc<ScriptedRunner>) -> Helm {
        Helm::new("helm").with_runner(runner.clone())
    }

    const WEB_MANIFEST: &str = "---
# Source: web/templates/deployment.yaml
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
---
# Source: web/templates/service.yaml
apiVersion: v1
kind: Service
metadata:
  name: web
";

    #[test]
    fn daemonsets_count_scheduled_pods() {
        let daemonset = json!({"status": {"desiredNumberScheduled": 3, "numberReady": 2}});
        assert_eq!(workload_replicas("DaemonSet", &daemonset), (2, 3));
        let deployment = json!({"spec": {"replicas": 2}, "status": {}});
        assert_eq!(workload_replicas("Deployment", &deployment), (0, 2));
    }

    #[tokio::test]
    async fn search_attaches_values_from_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/packages/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "packages": [{"name": "redis", "version": "18.1.0", "repository": {"name": "bitnami"}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/packages/helm/bitnami/redis/18.1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "redis", "version": "18.1.0", "description": "Redis",
                "content_url": "https://charts.example.com/redis-18.1.0.tgz"
            })))
            .mount(&server)
            .await;
        let runner = Arc::new(ScriptedRunner::new(["# replicas\nreplica:\n  replicaCount: 3\n"]));
        let model = CannedModel::new("```yaml\nreplica:\n  replicaCount: 1\n```");

        let out = Registered::new(SearchHelmChart::new(
            ArtifactHub::new(server.uri()),
            helm_with(&runner),
            model.clone(),
        ))
        .invoke(
            r#"{"user_query": "a single redis", "keyword": "redis"}"#,
            &ContextStore::default(),
        )
        .await
        .unwrap();

        let chart: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(chart["content_url"], "https://charts.example.com/redis-18.1.0.tgz");
        assert_eq!(chart["overrided_values"], json!({"replica": {"replicaCount": 1}}));
        assert_eq!(
            runner.calls()[0],
            vec!["helm", "show", "values", "https://charts.example.com/redis-18.1.0.tgz"]
        );
        let prompt = &model.prompts.lock().unwrap()[0];
        assert!(prompt.contains("a single redis"));
        assert!(prompt.contains("replica:\n  replicaCount: 3"));
        assert!(!prompt.contains("# replicas"));
    }

    #[tokio::test]
    async fn deploy_is_gated() {
        let runner = Arc::new(ScriptedRunner::new(["deployed"]));
        let cap = Registered::new(DeployApplication::new(helm_with(&runner)));
        assert!(cap.descriptor().requires_approval);

        let out = cap
            .invoke(
                r#"{"namespace": "", "name": "cache", "chart_url": "oci://charts/redis"}"#,
                &ContextStore::default(),
            )
            .await
            .unwrap();
        assert_eq!(out, "application cache is deployed.");
        assert_eq!(runner.calls()[0], vec!["helm", "install", "cache", "oci://charts/redis"]);
    }

    #[tokio::test]
    async fn upgrade_values_drop_chart_marker() {
        let runner = Arc::new(ScriptedRunner::new([
            "metadata_chart_url: oci://charts/redis\nreplicaCount: 1\n",
            "replicaCount: 1\nimage:\n  tag: \"7\"\n",
        ]));
        let model = CannedModel::new("metadata_chart_url: oci://charts/redis\nreplicaCount: 3\n");

        let out = Registered::new(GenerateUpgradeApplicationValues::new(
            helm_with(&runner),
            model.clone(),
        ))
        .invoke(
            r#"{"namespace": "cache", "name": "redis", "user_query": "scale to 3"}"#,
            &ContextStore::default(),
        )
        .await
        .unwrap();

        assert_eq!(out, r#"{"replicaCount":3}"#);
        assert_eq!(runner.calls()[1], vec!["helm", "show", "values", "oci://charts/redis"]);
        assert!(model.prompts.lock().unwrap()[0].contains("CURRENT VALUES:\nmetadata_chart_url"));
    }

    #[tokio::test]
    async fn upgrade_values_need_recorded_chart() {
        let runner = Arc::new(ScriptedRunner::new(["replicaCount: 1\n"]));
        let err = Registered::new(GenerateUpgradeApplicationValues::new(
            helm_with(&runner),
            CannedModel::new(""),
        ))
        .invoke(r#"{"name": "redis", "user_query": "scale"}"#, &ContextStore::default())
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Missing chart_url metadata in previous release");
    }

    #[tokio::test]
    async fn upgrade_reports_release_name() {
        let runner = Arc::new(ScriptedRunner::new(["metadata_chart_url: oci://charts/redis\n", ""]));
        let cap = Registered::new(UpgradeApplication::new(helm_with(&runner)));
        assert!(cap.descriptor().requires_approval);

        let out = cap
            .invoke(r#"{"name": "redis"}"#, &ContextStore::default())
            .await
            .unwrap();
        assert_eq!(out, "application redis is upgraded.");
        assert_eq!(runner.calls()[1], vec!["helm", "upgrade", "redis", "oci://charts/redis"]);
    }

    #[tokio::test]
    async fn list_replaces_chart_fields_with_readiness() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("GET"))
            .and(path("/apis/apps/v1/namespaces/shop/deployments/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "apps/v1", "kind": "Deployment",
                "metadata": {"name": "web", "namespace": "shop"},
                "spec": {"replicas": 2},
                "status": {"readyReplicas": 1}
            })))
            .mount(&server)
            .await;
        let runner = Arc::new(ScriptedRunner::new([
            r#"[{"name":"web","namespace":"shop","chart":"web-1.0.0","app_version":"1.0","status":"deployed"}]"#,
            WEB_MANIFEST,
        ]));

        let out = Registered::new(ListApplications::new(helm_with(&runner), cluster_for(&server)))
            .invoke(r#"{"namespace": "--all"}"#, &ContextStore::default())
            .await
            .unwrap();

        let releases: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            releases,
            json!([{"name": "web", "namespace": "shop", "status": "deployed", "ready": "1/2"}])
        );
        assert_eq!(
            runner.calls()[1],
            vec!["helm", "get", "manifest", "web", "--namespace", "shop"]
        );
    }

    #[tokio::test]
    async fn endpoints_come_from_release_services() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/shop/services/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1", "kind": "Service",
                "metadata": {"name": "web", "namespace": "shop"},
                "spec": {"type": "LoadBalancer", "ports": [{"name": "http", "port": 80}]},
                "status": {"loadBalancer": {"ingress": [{"ip": "34.1.2.3"}]}}
            })))
            .mount(&server)
            .await;
        let runner = Arc::new(ScriptedRunner::new([WEB_MANIFEST]));

        let out = Registered::new(GetApplicationAccessEndpoints::new(
            helm_with(&runner),
            cluster_for(&server),
        ))
        .invoke(r#"{"name": "web", "namespace": "shop"}"#, &ContextStore::default())
        .await
        .unwrap();
        assert_eq!(out, r#"[{"name":"web","endpoint":"34.1.2.3"}]"#);
    }

    #[tokio::test]
    async fn detail_and_delete_wrap_helm() {
        let runner = Arc::new(ScriptedRunner::new(["NAME: web\nNOTES:\nhello\n", ""]));
        let ctx = ContextStore::default();

        let detail = Registered::new(GetApplicationDetail::new(helm_with(&runner)))
            .invoke(r#"{"name": "web"}"#, &ctx)
            .await
            .unwrap();
        assert_eq!(detail, "NAME: web\n");

        let delete = Registered::new(DeleteApplication::new(helm_with(&runner)));
        assert!(delete.descriptor().requires_approval);
        assert_eq!(
            delete.invoke(r#"{"name": "web"}"#, &ctx).await.unwrap(),
            "Application is deleted."
        );
        assert_eq!(runner.calls()[1], vec!["helm", "uninstall", "web"]);
    }
}
