//! Kubernetes access for the kubernetes toolkit.
//!
//! [`ClusterClient`] talks to the API server through `kube`, [`Helm`] drives
//! the helm binary and [`ArtifactHub`] looks up public charts.

pub mod cluster;
pub mod endpoints;
pub mod helm;

pub use cluster::{parse_manifests, ClusterClient, KindEntry, ALL_NAMESPACES};
pub use endpoints::Endpoint;
pub use helm::{
    recorded_chart_url, ArtifactHub, ChartSummary, CommandRunner, Helm, ProcessRunner,
    ScriptedRunner, ARTIFACT_HUB_URL, CHART_URL_KEY,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KubeError {
    #[error(transparent)]
    Api(#[from] kube::Error),
    #[error("Resource {0} not found.")]
    UnknownKind(String),
    #[error("No node found.")]
    NoNode,
    #[error("Invalid manifest: {0}")]
    Manifest(String),
    #[error("{command} failed: {message}")]
    Helm { command: String, message: String },
    #[error("Missing chart_url metadata in previous release")]
    MissingChartUrl,
    #[error("Chart search failed: {0}")]
    Search(String),
}

/// Wiremock stand-ins for an API server.
#[cfg(test)]
pub(crate) mod testing {
    use super::ClusterClient;
    use kube::Client;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Core pods, services and nodes plus apps/v1 deployments.
    pub(crate) async fn mount_discovery(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "APIResourceList",
                "apiVersion": "v1",
                "groupVersion": "v1",
                "resources": [
                    {"name": "pods", "singularName": "pod", "namespaced": true, "kind": "Pod",
                     "verbs": ["get", "list", "watch", "delete"], "shortNames": ["po"],
                     "storageVersionHash": "xPOwRZ+Yhw8="},
                    {"name": "pods/log", "singularName": "", "namespaced": true, "kind": "Pod",
                     "verbs": ["get"]},
                    {"name": "services", "singularName": "service", "namespaced": true, "kind": "Service",
                     "verbs": ["get", "list", "create", "patch"], "shortNames": ["svc"],
                     "storageVersionHash": "0/CO1lhkEBI="},
                    {"name": "nodes", "singularName": "node", "namespaced": false, "kind": "Node",
                     "verbs": ["get", "list"], "shortNames": ["no"],
                     "storageVersionHash": "XwShjMxG9Fs="}
                ]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/apis"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "APIGroupList",
                "apiVersion": "v1",
                "groups": [{
                    "name": "apps",
                    "versions": [{"groupVersion": "apps/v1", "version": "v1"}],
                    "preferredVersion": {"groupVersion": "apps/v1", "version": "v1"}
                }]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/apis/apps/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "APIResourceList",
                "apiVersion": "v1",
                "groupVersion": "apps/v1",
                "resources": [
                    {"name": "deployments", "singularName": "deployment", "namespaced": true,
                     "kind": "Deployment", "verbs": ["get", "list", "create", "patch", "delete"],
                     "shortNames": ["deploy"], "storageVersionHash": "8aSe+NMegvE="},
                    {"name": "deployments/scale", "singularName": "", "namespaced": true,
                     "kind": "Scale", "verbs": ["get", "patch"]}
                ]
            })))
            .mount(server)
            .await;
    }

    pub(crate) fn cluster_for(server: &MockServer) -> ClusterClient {
        let config = kube::Config::new(server.uri().parse().unwrap());
        ClusterClient::new(Client::try_from(config).unwrap())
    }

    pub(crate) fn not_found(name: &str) -> ResponseTemplate {
        ResponseTemplate::new(404).set_body_json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": format!("\"{}\" not found", name),
            "reason": "NotFound",
            "code": 404
        }))
    }
}
