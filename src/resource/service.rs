//! Kubernetes services on a CCE cluster
//!
//! The one resource here that does not live under `cas/`: services are
//! created through the cluster-scoped Kubernetes API
//! (`api/v1/namespaces/{ns}/services`), so the wire format is the upstream
//! k8s object with its camelCase field names. The service's metadata name is
//! its identifier.

use super::wait::StateWaiter;
use super::{ResourceError, ValidationError};
use crate::huawei::client::KubeClient;
use crate::huawei::http::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Kubernetes Service object (create body and read shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default = "default_service_kind")]
    pub kind: String,
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
    /// Server-populated; never part of a create body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ServiceStatus>,
}

fn default_service_kind() -> String {
    "Service".to_string()
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(
        rename = "resourceVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
    /// Assigned by the cluster; immutable once set
    #[serde(rename = "clusterIP", default, skip_serializing_if = "Option::is_none")]
    pub cluster_ip: Option<String>,
    #[serde(rename = "type", default)]
    pub service_type: ServiceType,
    #[serde(rename = "externalIPs", default, skip_serializing_if = "Vec::is_empty")]
    pub external_ips: Vec<String>,
    #[serde(default)]
    pub session_affinity: SessionAffinity,
    #[serde(rename = "loadBalancerIP", default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_balancer_source_ranges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_traffic_policy: Option<ExternalTrafficPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_node_port: Option<i32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub publish_not_ready_addresses: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub protocol: Protocol,
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    #[default]
    #[serde(rename = "ClusterIP")]
    ClusterIp,
    NodePort,
    LoadBalancer,
    ExternalName,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionAffinity {
    #[default]
    None,
    #[serde(rename = "ClientIP")]
    ClientIp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExternalTrafficPolicy {
    Local,
    Cluster,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    #[serde(rename = "loadBalancer", default)]
    pub load_balancer: LoadBalancerStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerStatus {
    #[serde(default)]
    pub ingress: Vec<LoadBalancerIngress>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerIngress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl Service {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_dns_label("metadata.name", &self.metadata.name)?;
        validate_dns_label("metadata.namespace", &self.metadata.namespace)?;

        for port in &self.spec.ports {
            validate_port("spec.ports.port", port.port)?;
            if let Some(target) = port.target_port {
                validate_port("spec.ports.target_port", target)?;
            }
            if let Some(node) = port.node_port {
                validate_port("spec.ports.node_port", node)?;
            }
        }

        if self.spec.service_type == ServiceType::ExternalName && self.spec.external_name.is_none()
        {
            return Err(ValidationError::new(
                "spec.external_name",
                "required when type is ExternalName",
            ));
        }
        Ok(())
    }
}

/// Lowercase RFC 1123 label: alphanumerics and hyphens, 63 chars max,
/// must start and end alphanumeric
fn validate_dns_label(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    if value.len() > 63 {
        return Err(ValidationError::new(field, "must be at most 63 characters"));
    }
    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_ends = !value.starts_with('-') && !value.ends_with('-');
    if !valid_chars || !valid_ends {
        return Err(ValidationError::new(
            field,
            "must be a lowercase DNS label (alphanumerics and hyphens)",
        ));
    }
    Ok(())
}

fn validate_port(field: &str, port: i32) -> Result<(), ValidationError> {
    if !(1..=65535).contains(&port) {
        return Err(ValidationError::new(field, "must be in range 1-65535"));
    }
    Ok(())
}

/// Name-only update body, the one mutation the cluster accepts in place
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ServiceUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
    }
}

/// Create a service and wait until the cluster serves it back
pub async fn create(
    kube: &KubeClient,
    service: &Service,
    timeout: Duration,
) -> Result<Service, ResourceError> {
    service.validate()?;

    let namespace = service.metadata.namespace.clone();
    let name = service.metadata.name.clone();

    let body = serde_json::to_value(service)?;
    let response = kube.post(&kube.services_url(&namespace), Some(&body)).await?;
    let created: Service = serde_json::from_value(response)?;
    tracing::info!("Created service {}/{}", namespace, name);

    let waiter = StateWaiter::new(&["CREATING"], &["ACTIVE"]).timeout(timeout);
    let refreshed = waiter
        .wait(|| {
            let kube = kube.clone();
            let namespace = namespace.clone();
            let name = name.clone();
            async move { active_refresh(&kube, &namespace, &name).await }
        })
        .await
        .map_err(|e| ResourceError::Wait {
            id: name.clone(),
            source: e,
        })?;

    Ok(refreshed.unwrap_or(created))
}

/// Fetch a service; `Ok(None)` if it no longer exists
pub async fn get(
    kube: &KubeClient,
    namespace: &str,
    name: &str,
) -> Result<Option<Service>, ResourceError> {
    match kube.get(&kube.service_url(namespace, name)).await {
        Ok(value) => Ok(Some(serde_json::from_value(value)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Submit the changed fields, then re-read. An empty diff sends no request.
pub async fn update(
    kube: &KubeClient,
    namespace: &str,
    name: &str,
    update: &ServiceUpdate,
) -> Result<Option<Service>, ResourceError> {
    if !update.is_empty() {
        let body = serde_json::to_value(update)?;
        kube.put(&kube.service_url(namespace, name), Some(&body)).await?;
    }
    get(kube, namespace, name).await
}

/// Delete a service, polling until it is gone. Idempotent.
pub async fn delete(
    kube: &KubeClient,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<(), ResourceError> {
    let waiter = StateWaiter::new(&["ACTIVE"], &["DELETED"]).timeout(timeout);
    waiter
        .wait(|| {
            let kube = kube.clone();
            let namespace = namespace.to_string();
            let name = name.to_string();
            async move { delete_refresh(&kube, &namespace, &name).await }
        })
        .await
        .map_err(|e| ResourceError::Wait {
            id: name.to_string(),
            source: e,
        })?;
    Ok(())
}

async fn active_refresh(
    kube: &KubeClient,
    namespace: &str,
    name: &str,
) -> Result<(Option<Service>, String), ApiError> {
    let value = kube.get(&kube.service_url(namespace, name)).await?;
    let service: Service = serde_json::from_value(value)?;
    Ok((Some(service), "ACTIVE".to_string()))
}

async fn delete_refresh(
    kube: &KubeClient,
    namespace: &str,
    name: &str,
) -> Result<(Option<Service>, String), ApiError> {
    let url = kube.service_url(namespace, name);

    let current: Service = match kube.get(&url).await {
        Ok(value) => serde_json::from_value(value)?,
        Err(e) if e.is_not_found() => {
            tracing::info!("Successfully deleted service {}/{}", namespace, name);
            return Ok((None, "DELETED".to_string()));
        }
        Err(e) => return Err(e),
    };

    match kube.delete(&url).await {
        Ok(_) => Ok((Some(current), "ACTIVE".to_string())),
        Err(e) if e.is_not_found() => {
            tracing::info!("Successfully deleted service {}/{}", namespace, name);
            Ok((None, "DELETED".to_string()))
        }
        Err(e) if e.is_conflict() => {
            tracing::debug!("Service {}/{} still busy, retrying delete", namespace, name);
            Ok((Some(current), "ACTIVE".to_string()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> Service {
        Service {
            kind: default_service_kind(),
            api_version: default_api_version(),
            metadata: ObjectMeta {
                name: "web".to_string(),
                namespace: default_namespace(),
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
                uid: None,
                resource_version: None,
            },
            spec: ServiceSpec {
                ports: vec![ServicePort {
                    name: None,
                    protocol: Protocol::default(),
                    port: 80,
                    target_port: Some(8080),
                    node_port: None,
                }],
                selector: BTreeMap::from([("app".to_string(), "web".to_string())]),
                ..ServiceSpec::default()
            },
            status: None,
        }
    }

    #[test]
    fn default_port_protocol_is_tcp() {
        let body = serde_json::to_value(service()).unwrap();
        assert_eq!(
            body["spec"]["ports"][0],
            serde_json::json!({ "protocol": "TCP", "port": 80, "targetPort": 8080 })
        );
    }

    #[test]
    fn defaults_fill_in_on_parse() {
        let json = serde_json::json!({
            "metadata": { "name": "web" },
            "spec": { "ports": [ { "port": 80, "targetPort": 8080 } ] }
        });
        let parsed: Service = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.kind, "Service");
        assert_eq!(parsed.api_version, "v1");
        assert_eq!(parsed.metadata.namespace, "default");
        assert_eq!(parsed.spec.service_type, ServiceType::ClusterIp);
        assert_eq!(parsed.spec.session_affinity, SessionAffinity::None);
        assert_eq!(parsed.spec.ports[0].protocol, Protocol::Tcp);
    }

    #[test]
    fn wire_names_match_the_kubernetes_api() {
        let mut svc = service();
        svc.spec.cluster_ip = Some("10.0.0.1".to_string());
        svc.spec.external_ips = vec!["1.2.3.4".to_string()];
        svc.spec.load_balancer_ip = Some("5.6.7.8".to_string());
        svc.spec.service_type = ServiceType::LoadBalancer;

        let body = serde_json::to_value(&svc).unwrap();
        let spec = &body["spec"];
        assert_eq!(spec["clusterIP"], "10.0.0.1");
        assert_eq!(spec["externalIPs"][0], "1.2.3.4");
        assert_eq!(spec["loadBalancerIP"], "5.6.7.8");
        assert_eq!(spec["type"], "LoadBalancer");
        assert_eq!(spec["sessionAffinity"], "None");
    }

    #[test]
    fn invalid_names_and_ports_rejected() {
        let mut svc = service();
        svc.metadata.name = "Web".to_string();
        assert!(svc.validate().is_err());

        let mut svc = service();
        svc.spec.ports[0].port = 0;
        assert!(svc.validate().is_err());

        let mut svc = service();
        svc.spec.ports[0].target_port = Some(70000);
        assert!(svc.validate().is_err());
    }

    #[test]
    fn external_name_type_requires_external_name() {
        let mut svc = service();
        svc.spec.service_type = ServiceType::ExternalName;
        assert!(svc.validate().is_err());
        svc.spec.external_name = Some("db.example.com".to_string());
        assert!(svc.validate().is_ok());
    }

    #[test]
    fn status_parses_on_read() {
        let json = serde_json::json!({
            "metadata": { "name": "web" },
            "spec": {},
            "status": { "loadBalancer": { "ingress": [ { "ip": "9.9.9.9" } ] } }
        });
        let parsed: Service = serde_json::from_value(json).unwrap();
        let status = parsed.status.unwrap();
        assert_eq!(status.load_balancer.ingress[0].ip.as_deref(), Some("9.9.9.9"));
    }
}
