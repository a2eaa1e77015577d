//! ServiceStage component deployments
//!
//! A deployment (component instance) runs a component in an environment:
//! replica count, compute flavor, artifact image, environment variables, and
//! the infrastructure resources it references. Lives at
//! `cas/applications/{app}/components/{component}/instances`.

use super::wait::StateWaiter;
use super::{validate_name, ResourceError, ValidationError};
use crate::huawei::client::ServiceStageClient;
use crate::huawei::http::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Desired deployment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceSpec {
    pub name: String,
    /// Owning application; part of the URL, never of the request body
    #[serde(skip_serializing)]
    pub application_id: String,
    /// Deployed component; part of the URL, never of the request body
    #[serde(skip_serializing)]
    pub component_id: String,
    pub environment_id: String,
    pub replica: u32,
    pub flavor_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Container artifacts keyed by container name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, Artifact>,
    /// Environment variables; sent on the wire under `configuration.env`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_accesses: Vec<ExternalAccess>,
    pub refer_resources: Vec<ReferResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Artifact {
    pub storage: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalAccess {
    pub protocol: String,
    pub address: String,
    pub forward_port: u16,
}

/// Reference to an infrastructure resource the deployment uses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferResource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refer_alias: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl InstanceSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("instance name", &self.name)?;
        for (field, value) in [
            ("application_id", &self.application_id),
            ("component_id", &self.component_id),
            ("environment_id", &self.environment_id),
            ("flavor_id", &self.flavor_id),
            ("version", &self.version),
        ] {
            if value.is_empty() {
                return Err(ValidationError::new(field, "must not be empty"));
            }
        }
        if self.replica == 0 {
            return Err(ValidationError::new("replica", "must be at least 1"));
        }
        if self.refer_resources.is_empty() {
            return Err(ValidationError::new(
                "refer_resources",
                "at least one referenced resource is required",
            ));
        }
        if self.external_accesses.iter().any(|a| a.forward_port == 0) {
            return Err(ValidationError::new("external_accesses", "forward_port must be non-zero"));
        }
        Ok(())
    }

    /// Build the create request body. Env vars move under the API's
    /// `configuration.env` wrapper; path fields stay out.
    pub fn create_body(&self) -> Result<Value, serde_json::Error> {
        let mut body = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut body {
            if let Some(env) = map.remove("env") {
                map.insert("configuration".to_string(), json!({ "env": env }));
            }
        }
        Ok(body)
    }

    /// Fields that differ from the live resource. The API only accepts name
    /// and description here; replica, flavor and artifacts are fixed at
    /// create time (redeploy to change them).
    pub fn diff(&self, current: &Instance) -> InstanceUpdate {
        let mut update = InstanceUpdate::default();
        if Some(self.name.as_str()) != current.name.as_deref() {
            update.name = Some(self.name.clone());
        }
        if self.description.is_some() && self.description != current.description {
            update.description = self.description.clone();
        }
        update
    }
}

/// Deployment as reported by the API. The create response calls the id
/// `instance_id`; reads call it `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    #[serde(alias = "instance_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Asynchronous deployment job spawned by the create
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Partial update body; empty fields are not serialized
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstanceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InstanceUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Deploy a component instance and wait for it to become active
pub async fn create(
    client: &ServiceStageClient,
    spec: &InstanceSpec,
    timeout: Duration,
) -> Result<Instance, ResourceError> {
    spec.validate()?;

    let body = spec.create_body()?;
    let url = client.instances_url(&spec.application_id, &spec.component_id);
    let response = client.post(&url, Some(&body)).await?;
    let instance: Instance = serde_json::from_value(response)?;
    tracing::info!("Created deployment {} (job {:?})", instance.id, instance.job_id);

    let waiter = StateWaiter::new(&["CREATING"], &["ACTIVE"]).timeout(timeout);
    let refreshed = waiter
        .wait(|| {
            let client = client.clone();
            let application_id = spec.application_id.clone();
            let component_id = spec.component_id.clone();
            let id = instance.id.clone();
            async move { active_refresh(&client, &application_id, &component_id, &id).await }
        })
        .await
        .map_err(|e| ResourceError::Wait {
            id: instance.id.clone(),
            source: e,
        })?;

    Ok(refreshed.unwrap_or(instance))
}

/// Fetch a deployment; `Ok(None)` if it no longer exists
pub async fn get(
    client: &ServiceStageClient,
    application_id: &str,
    component_id: &str,
    id: &str,
) -> Result<Option<Instance>, ResourceError> {
    match client
        .get(&client.instance_url(application_id, component_id, id))
        .await
    {
        Ok(value) => Ok(Some(serde_json::from_value(value)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Submit the changed fields, then re-read. An empty diff sends no request.
pub async fn update(
    client: &ServiceStageClient,
    application_id: &str,
    component_id: &str,
    id: &str,
    update: &InstanceUpdate,
) -> Result<Option<Instance>, ResourceError> {
    if !update.is_empty() {
        let body = serde_json::to_value(update)?;
        client
            .put(
                &client.instance_url(application_id, component_id, id),
                Some(&body),
            )
            .await?;
    }
    get(client, application_id, component_id, id).await
}

/// Delete a deployment, polling until it is gone. Idempotent.
pub async fn delete(
    client: &ServiceStageClient,
    application_id: &str,
    component_id: &str,
    id: &str,
    timeout: Duration,
) -> Result<(), ResourceError> {
    let waiter = StateWaiter::new(&["ACTIVE"], &["DELETED"]).timeout(timeout);
    waiter
        .wait(|| {
            let client = client.clone();
            let application_id = application_id.to_string();
            let component_id = component_id.to_string();
            let id = id.to_string();
            async move { delete_refresh(&client, &application_id, &component_id, &id).await }
        })
        .await
        .map_err(|e| ResourceError::Wait {
            id: id.to_string(),
            source: e,
        })?;
    Ok(())
}

async fn active_refresh(
    client: &ServiceStageClient,
    application_id: &str,
    component_id: &str,
    id: &str,
) -> Result<(Option<Instance>, String), ApiError> {
    let value = client
        .get(&client.instance_url(application_id, component_id, id))
        .await?;
    let instance: Instance = serde_json::from_value(value)?;
    Ok((Some(instance), "ACTIVE".to_string()))
}

async fn delete_refresh(
    client: &ServiceStageClient,
    application_id: &str,
    component_id: &str,
    id: &str,
) -> Result<(Option<Instance>, String), ApiError> {
    let url = client.instance_url(application_id, component_id, id);

    let current: Instance = match client.get(&url).await {
        Ok(value) => serde_json::from_value(value)?,
        Err(e) if e.is_not_found() => {
            tracing::info!("Successfully deleted deployment {}", id);
            return Ok((None, "DELETED".to_string()));
        }
        Err(e) => return Err(e),
    };

    match client.delete(&url).await {
        Ok(_) => Ok((Some(current), "ACTIVE".to_string())),
        Err(e) if e.is_not_found() => {
            tracing::info!("Successfully deleted deployment {}", id);
            Ok((None, "DELETED".to_string()))
        }
        Err(e) if e.is_conflict() => {
            tracing::debug!("Deployment {} still busy, retrying delete", id);
            Ok((Some(current), "ACTIVE".to_string()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> InstanceSpec {
        InstanceSpec {
            name: "web-v1".to_string(),
            application_id: "app-1".to_string(),
            component_id: "comp-1".to_string(),
            environment_id: "env-1".to_string(),
            replica: 2,
            flavor_id: "MICRO-5G".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            artifacts: BTreeMap::from([(
                "web".to_string(),
                Artifact {
                    storage: "swr".to_string(),
                    kind: "image".to_string(),
                    url: "swr.cn-north-4.myhuaweicloud.com/acme/web:1.0".to_string(),
                    auth: Some("iam".to_string()),
                    version: None,
                },
            )]),
            env: vec![EnvVar {
                name: "LOG_LEVEL".to_string(),
                value: "info".to_string(),
            }],
            external_accesses: Vec::new(),
            refer_resources: vec![ReferResource {
                id: "cluster-1".to_string(),
                kind: "cce".to_string(),
                refer_alias: None,
                parameters: BTreeMap::from([("namespace".to_string(), "default".to_string())]),
            }],
        }
    }

    #[test]
    fn create_body_wraps_env_in_configuration() {
        let body = spec().create_body().unwrap();
        assert!(body.get("env").is_none());
        assert_eq!(
            body["configuration"]["env"][0],
            json!({ "name": "LOG_LEVEL", "value": "info" })
        );
    }

    #[test]
    fn create_body_excludes_path_ids() {
        let body = spec().create_body().unwrap();
        assert!(body.get("application_id").is_none());
        assert!(body.get("component_id").is_none());
        assert_eq!(body["environment_id"], "env-1");
        assert_eq!(body["replica"], 2);
        assert_eq!(body["artifacts"]["web"]["type"], "image");
    }

    #[test]
    fn id_parses_from_both_wire_names() {
        let created: Instance =
            serde_json::from_value(json!({ "instance_id": "i-1", "job_id": "j-1" })).unwrap();
        assert_eq!(created.id, "i-1");
        assert_eq!(created.job_id.as_deref(), Some("j-1"));

        let read: Instance = serde_json::from_value(json!({ "id": "i-1" })).unwrap();
        assert_eq!(read.id, "i-1");
    }

    #[test]
    fn zero_replica_fails_validation() {
        let mut spec = spec();
        spec.replica = 0;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn missing_refer_resources_fails_validation() {
        let mut spec = spec();
        spec.refer_resources.clear();
        assert!(spec.validate().is_err());
    }
}
