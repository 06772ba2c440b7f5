//! Dynamic access to cluster resources.
//!
//! Resource kinds are resolved against the API server's discovery documents
//! the first time they are needed: the core `v1` group plus the preferred
//! version of every named group (namespaced kinds only). A kind matches by
//! plural, singular, kind name or short name.

use super::endpoints::{ingress_endpoints, needs_node_ip, node_address, service_endpoints, Endpoint};
use super::KubeError;
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResource;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, LogParams, Patch,
    PatchParams, PostParams, WatchEvent, WatchParams,
};
use kube::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Namespace argument meaning "every namespace".
pub const ALL_NAMESPACES: &str = "--all";

/// Metadata fields that only add noise to prompts.
const NOISY_METADATA: &[&str] = &["managedFields", "resourceVersion", "uid", "generation"];

/// A resource kind served by the cluster.
#[derive(Debug, Clone)]
pub struct KindEntry {
    pub resource: ApiResource,
    pub namespaced: bool,
    singular: String,
    short_names: Vec<String>,
}

impl KindEntry {
    fn new(group_version: &str, api: &APIResource) -> Self {
        let (group, version) = match group_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), group_version.to_string()),
        };
        Self {
            resource: ApiResource {
                group,
                version,
                api_version: group_version.to_string(),
                kind: api.kind.clone(),
                plural: api.name.clone(),
            },
            namespaced: api.namespaced,
            singular: api.singular_name.to_lowercase(),
            short_names: api.short_names.clone().unwrap_or_default(),
        }
    }

    fn matches(&self, kind: &str) -> bool {
        self.resource.plural.to_lowercase() == kind
            || self.singular == kind
            || self.resource.kind.to_lowercase() == kind
            || self.short_names.iter().any(|s| s == kind)
    }
}

/// Subresources such as `pods/log` carry no storage version hash.
fn is_stored(api: &APIResource) -> bool {
    api.storage_version_hash.is_some()
}

async fn discover_kinds(client: Client) -> Result<Vec<KindEntry>, KubeError> {
    let core = client.list_core_api_resources("v1").await?;
    let mut kinds: Vec<KindEntry> = core
        .resources
        .iter()
        .filter(|r| is_stored(r))
        .map(|r| KindEntry::new(&core.group_version, r))
        .collect();

    let groups = client.list_api_groups().await?;
    for group in groups.groups {
        let Some(preferred) = group.preferred_version else {
            continue;
        };
        let list = client
            .list_api_group_resources(&preferred.group_version)
            .await?;
        kinds.extend(
            list.resources
                .iter()
                .filter(|r| is_stored(r) && r.namespaced)
                .map(|r| KindEntry::new(&preferred.group_version, r)),
        );
    }
    debug!("Discovered {} resource kinds", kinds.len());
    Ok(kinds)
}

/// Remove bookkeeping metadata from a serialized object.
pub fn tidy_resource(resource: &mut Value) {
    if let Some(metadata) = resource.get_mut("metadata").and_then(Value::as_object_mut) {
        for key in NOISY_METADATA {
            metadata.remove(*key);
        }
    }
}

/// Split a multi-document YAML manifest into objects. Markdown fence lines
/// and empty documents are dropped.
pub fn parse_manifests(yaml: &str) -> Result<Vec<DynamicObject>, KubeError> {
    let cleaned: String = yaml
        .lines()
        .filter(|line| !line.starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&cleaned) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| KubeError::Manifest(e.to_string()))?;
        if value.is_null() {
            continue;
        }
        let json = serde_json::to_value(value).map_err(|e| KubeError::Manifest(e.to_string()))?;
        let object: DynamicObject =
            serde_json::from_value(json).map_err(|e| KubeError::Manifest(e.to_string()))?;
        if object.types.is_none() {
            return Err(KubeError::Manifest(
                "every document needs apiVersion and kind".to_string(),
            ));
        }
        if object.metadata.name.is_none() {
            return Err(KubeError::Manifest("every document needs metadata.name".to_string()));
        }
        objects.push(object);
    }
    Ok(objects)
}

/// Readable one-line form of a watch event; bookmarks are skipped.
fn describe_event(event: &WatchEvent<DynamicObject>) -> Option<String> {
    let (verb, object) = match event {
        WatchEvent::Added(o) => ("ADDED", o),
        WatchEvent::Modified(o) => ("MODIFIED", o),
        WatchEvent::Deleted(o) => ("DELETED", o),
        WatchEvent::Bookmark(_) => return None,
        WatchEvent::Error(e) => return Some(format!("ERROR {}", e.message)),
    };
    let name = object.metadata.name.as_deref().unwrap_or_default();
    Some(match object.metadata.namespace.as_deref() {
        Some(namespace) => format!("{} {}/{}", verb, namespace, name),
        None => format!("{} {}", verb, name),
    })
}

/// Cluster handle shared by the kubernetes capabilities.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
    kinds: Arc<OnceCell<Vec<KindEntry>>>,
}

impl ClusterClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            kinds: Arc::new(OnceCell::new()),
        }
    }

    /// Connect with the local kubeconfig or the in-cluster service account.
    pub async fn try_default() -> Result<Self, KubeError> {
        Ok(Self::new(Client::try_default().await?))
    }

    /// `namespace`, or the client's default when empty.
    pub fn namespace_or_default<'a>(&'a self, namespace: &'a str) -> &'a str {
        let namespace = namespace.trim();
        if namespace.is_empty() {
            self.client.default_namespace()
        } else {
            namespace
        }
    }

    pub async fn kinds(&self) -> Result<&[KindEntry], KubeError> {
        let client = self.client.clone();
        let kinds = self.kinds.get_or_try_init(|| discover_kinds(client)).await?;
        Ok(kinds.as_slice())
    }

    pub async fn resolve_kind(&self, kind: &str) -> Result<KindEntry, KubeError> {
        let wanted = kind.trim().to_lowercase();
        self.kinds()
            .await?
            .iter()
            .find(|entry| entry.matches(&wanted))
            .cloned()
            .ok_or_else(|| KubeError::UnknownKind(kind.to_string()))
    }

    /// Kind named by a manifest's `apiVersion` and `kind`. Kinds missing from
    /// discovery are assumed namespaced with a guessed plural.
    async fn resolve_manifest_kind(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<(ApiResource, bool), KubeError> {
        let discovered = self
            .kinds()
            .await?
            .iter()
            .find(|e| e.resource.api_version == api_version && e.resource.kind == kind)
            .map(|e| (e.resource.clone(), e.namespaced));
        if let Some(found) = discovered {
            return Ok(found);
        }
        let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));
        let gvk = GroupVersionKind::gvk(group, version, kind);
        Ok((ApiResource::from_gvk(&gvk), true))
    }

    fn dynamic_api(&self, resource: &ApiResource, namespaced: bool, namespace: &str) -> Api<DynamicObject> {
        if !namespaced || namespace == ALL_NAMESPACES {
            Api::all_with(self.client.clone(), resource)
        } else {
            Api::namespaced_with(self.client.clone(), self.namespace_or_default(namespace), resource)
        }
    }

    async fn api_for(&self, kind: &str, namespace: &str) -> Result<Api<DynamicObject>, KubeError> {
        let entry = self.resolve_kind(kind).await?;
        Ok(self.dynamic_api(&entry.resource, entry.namespaced, namespace))
    }

    pub async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<DynamicObject>, KubeError> {
        let api = self.api_for(kind, namespace).await?;
        Ok(api.list(&ListParams::default()).await?.items)
    }

    /// Serialized object with bookkeeping metadata removed.
    pub async fn get(&self, kind: &str, name: &str, namespace: &str) -> Result<Value, KubeError> {
        let api = self.api_for(kind, namespace).await?;
        let object = api.get(name).await?;
        let mut value =
            serde_json::to_value(&object).map_err(|e| KubeError::Manifest(e.to_string()))?;
        tidy_resource(&mut value);
        Ok(value)
    }

    /// Live state of an object named in a manifest.
    pub async fn get_manifest_object(
        &self,
        object: &DynamicObject,
        namespace: &str,
    ) -> Result<Value, KubeError> {
        let (api_version, kind) = object
            .types
            .as_ref()
            .map(|t| (t.api_version.as_str(), t.kind.as_str()))
            .ok_or_else(|| KubeError::Manifest("missing apiVersion and kind".to_string()))?;
        let (resource, namespaced) = self.resolve_manifest_kind(api_version, kind).await?;
        let api = self.dynamic_api(&resource, namespaced, namespace);
        let name = object.metadata.name.as_deref().unwrap_or_default();
        let live = api.get(name).await?;
        serde_json::to_value(&live).map_err(|e| KubeError::Manifest(e.to_string()))
    }

    pub async fn delete(&self, kind: &str, name: &str, namespace: &str) -> Result<(), KubeError> {
        let api = self.api_for(kind, namespace).await?;
        api.delete(name, &DeleteParams::default()).await?;
        info!("Deleting {} {}", kind, name);
        Ok(())
    }

    /// Create every object, or merge-patch the ones that already exist.
    /// Returns `(kind, name)` of each applied object.
    pub async fn apply(&self, objects: &[DynamicObject]) -> Result<Vec<(String, String)>, KubeError> {
        let mut applied = Vec::new();
        for object in objects {
            let (api_version, kind) = object
                .types
                .as_ref()
                .map(|t| (t.api_version.clone(), t.kind.clone()))
                .ok_or_else(|| KubeError::Manifest("missing apiVersion and kind".to_string()))?;
            let name = object.metadata.name.clone().unwrap_or_default();
            let namespace = object.metadata.namespace.clone().unwrap_or_default();

            let (resource, namespaced) = self.resolve_manifest_kind(&api_version, &kind).await?;
            let api = self.dynamic_api(&resource, namespaced, &namespace);
            if api.get_opt(&name).await?.is_some() {
                api.patch(&name, &PatchParams::default(), &Patch::Merge(object))
                    .await?;
                info!("Patched {} {}", kind, name);
            } else {
                api.create(&PostParams::default(), object).await?;
                info!("Created {} {}", kind, name);
            }
            applied.push((kind, name));
        }
        Ok(applied)
    }

    pub async fn pod_logs(
        &self,
        name: &str,
        namespace: &str,
        container: Option<String>,
        tail_lines: i64,
    ) -> Result<String, KubeError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), self.namespace_or_default(namespace));
        let params = LogParams {
            container,
            tail_lines: Some(tail_lines),
            ..LogParams::default()
        };
        Ok(pods.logs(name, &params).await?)
    }

    async fn node_ip(&self) -> Result<String, KubeError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await?;
        list.items
            .first()
            .and_then(node_address)
            .ok_or(KubeError::NoNode)
    }

    pub async fn service_endpoints(&self, name: &str, namespace: &str) -> Result<Vec<Endpoint>, KubeError> {
        let services: Api<Service> =
            Api::namespaced(self.client.clone(), self.namespace_or_default(namespace));
        let service = services.get(name).await?;
        let node_ip = if needs_node_ip(&service) {
            Some(self.node_ip().await?)
        } else {
            None
        };
        Ok(service_endpoints(&service, node_ip.as_deref()))
    }

    pub async fn ingress_endpoints(&self, name: &str, namespace: &str) -> Result<Vec<Endpoint>, KubeError> {
        let ingresses: Api<Ingress> =
            Api::namespaced(self.client.clone(), self.namespace_or_default(namespace));
        let ingress = ingresses.get(name).await?;
        Ok(ingress_endpoints(&ingress))
    }

    /// Stream change events of a kind, one line per event, until the server
    /// closes the watch.
    pub async fn watch(
        &self,
        kind: &str,
        namespace: &str,
        mut on_event: impl FnMut(&str),
    ) -> Result<(), KubeError> {
        let api = self.api_for(kind, namespace).await?;
        let events = api.watch(&WatchParams::default(), "0").await?;
        futures::pin_mut!(events);
        while let Some(event) = events.try_next().await? {
            if let Some(line) = describe_event(&event) {
                on_event(&line);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::testing::{cluster_for, mount_discovery, not_found};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn kinds_resolve_by_any_name() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        let cluster = cluster_for(&server);

        for alias in ["deploy", "Deployment", "deployments", "deployment"] {
            let entry = cluster.resolve_kind(alias).await.unwrap();
            assert_eq!(entry.resource.api_version, "apps/v1");
            assert_eq!(entry.resource.plural, "deployments");
        }
        assert_eq!(cluster.resolve_kind("svc").await.unwrap().resource.kind, "Service");
        assert!(!cluster.resolve_kind("no").await.unwrap().namespaced);
        assert!(matches!(
            cluster.resolve_kind("scale").await,
            Err(KubeError::UnknownKind(_))
        ));
    }

    #[tokio::test]
    async fn discovery_runs_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "APIResourceList", "apiVersion": "v1", "groupVersion": "v1", "resources": []
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/apis"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "APIGroupList", "apiVersion": "v1", "groups": []
            })))
            .expect(1)
            .mount(&server)
            .await;
        let cluster = cluster_for(&server);

        assert!(cluster.resolve_kind("pods").await.is_err());
        assert!(cluster.resolve_kind("pods").await.is_err());
    }

    #[tokio::test]
    async fn get_drops_bookkeeping_metadata() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("GET"))
            .and(path("/apis/apps/v1/namespaces/default/deployments/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {
                    "name": "web",
                    "namespace": "default",
                    "uid": "1234",
                    "resourceVersion": "99",
                    "generation": 3,
                    "managedFields": [{"manager": "kubectl"}],
                    "labels": {"app": "web"}
                },
                "spec": {"replicas": 2}
            })))
            .mount(&server)
            .await;

        let value = cluster_for(&server).get("deploy", "web", "").await.unwrap();
        assert_eq!(
            value["metadata"],
            json!({"name": "web", "namespace": "default", "labels": {"app": "web"}})
        );
        assert_eq!(value["spec"]["replicas"], 2);
    }

    #[tokio::test]
    async fn apply_creates_missing_and_patches_existing() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        Mock::given(method("GET"))
            .and(path("/apis/apps/v1/namespaces/shop/deployments/web"))
            .respond_with(not_found("web"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/apis/apps/v1/namespaces/shop/deployments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "apiVersion": "apps/v1", "kind": "Deployment",
                "metadata": {"name": "web", "namespace": "shop"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/shop/services/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1", "kind": "Service",
                "metadata": {"name": "web", "namespace": "shop"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/namespaces/shop/services/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1", "kind": "Service",
                "metadata": {"name": "web", "namespace": "shop"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let manifest = "```yaml
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: shop
spec:
  replicas: 1
---
apiVersion: v1
kind: Service
metadata:
  name: web
  namespace: shop
spec:
  ports:
  - port: 80
```";
        let objects = parse_manifests(manifest).unwrap();
        let applied = cluster_for(&server).apply(&objects).await.unwrap();
        assert_eq!(
            applied,
            vec![
                ("Deployment".to_string(), "web".to_string()),
                ("Service".to_string(), "web".to_string())
            ]
        );
    }

    #[test]
    fn manifests_need_kind_and_name() {
        assert!(parse_manifests("---\n---\n").unwrap().is_empty());
        assert!(matches!(
            parse_manifests("metadata:\n  name: web\n"),
            Err(KubeError::Manifest(_))
        ));
        assert!(matches!(
            parse_manifests("apiVersion: v1\nkind: ConfigMap\nmetadata: {}\n"),
            Err(KubeError::Manifest(_))
        ));
        assert!(matches!(parse_manifests("a: [1"), Err(KubeError::Manifest(_))));
    }

    #[tokio::test]
    async fn pod_logs_pass_container_and_tail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/pods/web-0/log"))
            .and(query_param("container", "app"))
            .and(query_param("tailLines", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ready\n"))
            .expect(1)
            .mount(&server)
            .await;

        let log = cluster_for(&server)
            .pod_logs("web-0", "", Some("app".to_string()), 20)
            .await
            .unwrap();
        assert_eq!(log, "ready\n");
    }

    #[tokio::test]
    async fn node_port_endpoints_use_first_node() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/services/web"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1", "kind": "Service",
                "metadata": {"name": "web", "namespace": "default"},
                "spec": {"type": "NodePort", "ports": [{"name": "http", "port": 80, "nodePort": 30080}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nodes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1", "kind": "NodeList", "metadata": {},
                "items": [{"metadata": {"name": "n1"},
                           "status": {"addresses": [{"type": "InternalIP", "address": "10.0.0.5"}]}}]
            })))
            .mount(&server)
            .await;

        let endpoints = cluster_for(&server).service_endpoints("web", "").await.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].endpoint, "10.0.0.5:30080");
    }

    #[tokio::test]
    async fn watch_reports_each_event() {
        let server = MockServer::start().await;
        mount_discovery(&server).await;
        let events = [
            json!({"type": "ADDED", "object": {"apiVersion": "v1", "kind": "Pod",
                   "metadata": {"name": "web-0", "namespace": "default"}}}),
            json!({"type": "BOOKMARK", "object": {"kind": "Pod", "apiVersion": "v1",
                   "metadata": {"resourceVersion": "12"}}}),
            json!({"type": "DELETED", "object": {"apiVersion": "v1", "kind": "Pod",
                   "metadata": {"name": "web-0", "namespace": "default"}}}),
        ];
        let body: String = events.iter().map(|e| format!("{}\n", e)).collect();
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/default/pods"))
            .and(query_param("watch", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let mut seen = Vec::new();
        cluster_for(&server)
            .watch("po", "default", |line| seen.push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["ADDED default/web-0", "DELETED default/web-0"]);
    }
}
