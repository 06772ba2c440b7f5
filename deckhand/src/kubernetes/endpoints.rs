//! Access endpoints derived from services, ingresses and nodes.

use k8s_openapi::api::core::v1::{Node, Service};
use k8s_openapi::api::networking::v1::Ingress;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub endpoint: String,
}

impl Endpoint {
    fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
        }
    }
}

fn service_type(service: &Service) -> &str {
    service
        .spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .unwrap_or("ClusterIP")
}

/// Load balancer addresses, hostname preferred over IP.
fn load_balancer_addresses(service: &Service) -> Vec<String> {
    service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingresses| {
            ingresses
                .iter()
                .filter_map(|i| {
                    i.hostname
                        .clone()
                        .filter(|h| !h.is_empty())
                        .or_else(|| i.ip.clone().filter(|ip| !ip.is_empty()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Whether [`service_endpoints`] needs a node address for this service.
pub fn needs_node_ip(service: &Service) -> bool {
    match service_type(service) {
        "NodePort" => true,
        "LoadBalancer" => load_balancer_addresses(service).is_empty(),
        _ => false,
    }
}

/// External address of a node, falling back to its internal one.
pub fn node_address(node: &Node) -> Option<String> {
    let addresses = node.status.as_ref()?.addresses.as_ref()?;
    let find = |kind: &str| {
        addresses
            .iter()
            .find(|a| a.type_ == kind)
            .map(|a| a.address.clone())
    };
    find("ExternalIP").or_else(|| find("InternalIP"))
}

fn node_port_endpoints(service: &Service, node_ip: &str) -> Vec<Endpoint> {
    let name = service.metadata.name.as_deref().unwrap_or_default();
    let ports = service.spec.as_ref().and_then(|s| s.ports.as_ref());
    ports
        .into_iter()
        .flatten()
        .filter_map(|port| {
            let node_port = port.node_port?;
            Some(Endpoint::new(
                format!("{}/{}", name, port.name.as_deref().unwrap_or_default()),
                format!("{}:{}", node_ip, node_port),
            ))
        })
        .collect()
}

/// Endpoints reachable from outside the cluster. Only NodePort and
/// LoadBalancer services have any; a load balancer without an address yet
/// falls back to its node ports.
pub fn service_endpoints(service: &Service, node_ip: Option<&str>) -> Vec<Endpoint> {
    let name = service.metadata.name.as_deref().unwrap_or_default();
    match service_type(service) {
        "LoadBalancer" => {
            let addresses = load_balancer_addresses(service);
            if addresses.is_empty() {
                return node_ip
                    .map(|ip| node_port_endpoints(service, ip))
                    .unwrap_or_default();
            }
            addresses
                .into_iter()
                .map(|address| Endpoint::new(name, address))
                .collect()
        }
        "NodePort" => node_ip
            .map(|ip| node_port_endpoints(service, ip))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// One endpoint per rule path. Rules without a host use the address the
/// ingress controller published.
pub fn ingress_endpoints(ingress: &Ingress) -> Vec<Endpoint> {
    let name = ingress.metadata.name.as_deref().unwrap_or_default();
    let Some(spec) = ingress.spec.as_ref() else {
        return Vec::new();
    };

    let published = ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|list| list.last())
        .and_then(|i| {
            i.hostname
                .clone()
                .filter(|h| !h.is_empty())
                .or_else(|| i.ip.clone())
        })
        .unwrap_or_default();

    let tls_hosts: Vec<&str> = spec
        .tls
        .iter()
        .flatten()
        .flat_map(|tls| tls.hosts.iter().flatten())
        .map(String::as_str)
        .collect();

    let mut endpoints = Vec::new();
    for rule in spec.rules.iter().flatten() {
        let host = rule
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .unwrap_or(published.as_str());
        if host.is_empty() {
            continue;
        }
        let scheme = if tls_hosts.contains(&host) { "https" } else { "http" };
        for path in rule.http.iter().flat_map(|http| http.paths.iter()) {
            match path.path.as_deref().filter(|p| !p.is_empty()) {
                Some(p) => endpoints.push(Endpoint::new(
                    format!("{}/{}", name, p.trim_start_matches('/')),
                    format!("{}://{}{}", scheme, host, p),
                )),
                None => endpoints.push(Endpoint::new(name, format!("{}://{}", scheme, host))),
            }
        }
    }
    endpoints
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn service(value: serde_json::Value) -> Service {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn node_port_service_uses_node_address() {
        let svc = service(json!({
            "metadata": {"name": "web"},
            "spec": {"type": "NodePort", "ports": [
                {"name": "http", "port": 80, "nodePort": 30080},
                {"name": "metrics", "port": 9090}
            ]}
        }));
        assert!(needs_node_ip(&svc));
        assert_eq!(
            service_endpoints(&svc, Some("10.0.0.5")),
            vec![Endpoint::new("web/http", "10.0.0.5:30080")]
        );
    }

    #[test]
    fn load_balancer_prefers_hostname() {
        let svc = service(json!({
            "metadata": {"name": "web"},
            "spec": {"type": "LoadBalancer", "ports": [{"name": "http", "port": 80, "nodePort": 31000}]},
            "status": {"loadBalancer": {"ingress": [
                {"hostname": "lb.example.com", "ip": "1.2.3.4"},
                {"ip": "5.6.7.8"}
            ]}}
        }));
        assert!(!needs_node_ip(&svc));
        assert_eq!(
            service_endpoints(&svc, None),
            vec![
                Endpoint::new("web", "lb.example.com"),
                Endpoint::new("web", "5.6.7.8")
            ]
        );
    }

    #[test]
    fn pending_load_balancer_falls_back_to_node_ports() {
        let svc = service(json!({
            "metadata": {"name": "web"},
            "spec": {"type": "LoadBalancer", "ports": [{"name": "http", "port": 80, "nodePort": 31000}]},
            "status": {"loadBalancer": {}}
        }));
        assert!(needs_node_ip(&svc));
        assert_eq!(
            service_endpoints(&svc, Some("192.168.1.2")),
            vec![Endpoint::new("web/http", "192.168.1.2:31000")]
        );
    }

    #[test]
    fn cluster_ip_has_no_endpoints() {
        let svc = service(json!({"metadata": {"name": "db"}, "spec": {"ports": [{"port": 5432}]}}));
        assert!(!needs_node_ip(&svc));
        assert!(service_endpoints(&svc, Some("10.0.0.1")).is_empty());
    }

    #[test]
    fn external_node_address_wins() {
        let node: Node = serde_json::from_value(json!({
            "metadata": {"name": "n1"},
            "status": {"addresses": [
                {"type": "InternalIP", "address": "10.0.0.5"},
                {"type": "ExternalIP", "address": "34.1.2.3"}
            ]}
        }))
        .unwrap();
        assert_eq!(node_address(&node).as_deref(), Some("34.1.2.3"));

        let internal_only: Node = serde_json::from_value(json!({
            "metadata": {"name": "n2"},
            "status": {"addresses": [{"type": "InternalIP", "address": "10.0.0.6"}]}
        }))
        .unwrap();
        assert_eq!(node_address(&internal_only).as_deref(), Some("10.0.0.6"));
    }

    #[test]
    fn ingress_paths_and_tls() {
        let ingress: Ingress = serde_json::from_value(json!({
            "metadata": {"name": "shop"},
            "spec": {
                "tls": [{"hosts": ["shop.example.com"]}],
                "rules": [
                    {"host": "shop.example.com", "http": {"paths": [
                        {"path": "/api", "pathType": "Prefix", "backend": {"service": {"name": "api", "port": {"number": 80}}}}
                    ]}},
                    {"http": {"paths": [
                        {"pathType": "Prefix", "backend": {"service": {"name": "web", "port": {"number": 80}}}}
                    ]}}
                ]
            },
            "status": {"loadBalancer": {"ingress": [{"ip": "9.9.9.9"}]}}
        }))
        .unwrap();

        assert_eq!(
            ingress_endpoints(&ingress),
            vec![
                Endpoint::new("shop/api", "https://shop.example.com/api"),
                Endpoint::new("shop", "http://9.9.9.9"),
            ]
        );
    }

    #[test]
    fn hostless_rules_without_address_are_skipped() {
        let ingress: Ingress = serde_json::from_value(json!({
            "metadata": {"name": "pending"},
            "spec": {"rules": [{"http": {"paths": [
                {"path": "/", "pathType": "Prefix", "backend": {"service": {"name": "web", "port": {"number": 80}}}}
            ]}}]}
        }))
        .unwrap();
        assert!(ingress_endpoints(&ingress).is_empty());
    }
}
