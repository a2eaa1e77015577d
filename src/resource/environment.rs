//! ServiceStage environments
//!
//! An environment binds a VPC and a set of infrastructure resources (CCE
//! clusters, ECS hosts, load balancers...) into a deployment target. Lives at
//! `cas/environments`.

use super::wait::StateWaiter;
use super::{validate_name, ResourceError, ValidationError};
use crate::huawei::client::ServiceStageClient;
use crate::huawei::http::ApiError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Desired environment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_project_id: Option<String>,
    pub vpc_id: String,
    /// At least one base resource is required by the API
    pub base_resources: Vec<ResourceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_resources: Vec<ResourceRef>,
}

/// Reference to an infrastructure resource by id and type (e.g. `cce`, `ecs`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceRef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl EnvironmentSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("environment name", &self.name)?;
        if self.vpc_id.is_empty() {
            return Err(ValidationError::new("vpc_id", "must not be empty"));
        }
        if self.base_resources.is_empty() {
            return Err(ValidationError::new(
                "base_resources",
                "at least one base resource is required",
            ));
        }
        for r in self.base_resources.iter().chain(&self.optional_resources) {
            if r.id.is_empty() || r.kind.is_empty() {
                return Err(ValidationError::new(
                    "resources",
                    "resource references need both id and type",
                ));
            }
        }
        Ok(())
    }

    /// Fields that differ from the live resource; only name and description
    /// are updatable
    pub fn diff(&self, current: &Environment) -> EnvironmentUpdate {
        let mut update = EnvironmentUpdate::default();
        if self.name != current.name {
            update.name = Some(self.name.clone());
        }
        if self.description.is_some() && self.description != current.description {
            update.description = self.description.clone();
        }
        update
    }
}

/// Environment as reported by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub vpc_id: Option<String>,
}

/// Partial update body; empty fields are not serialized
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnvironmentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EnvironmentUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Create an environment and wait for it to become active
pub async fn create(
    client: &ServiceStageClient,
    spec: &EnvironmentSpec,
    timeout: Duration,
) -> Result<Environment, ResourceError> {
    spec.validate()?;

    let body = serde_json::to_value(spec)?;
    let response = client.post(&client.environments_url(), Some(&body)).await?;
    let environment: Environment = serde_json::from_value(response)?;
    tracing::info!("Created environment {} ({})", environment.name, environment.id);

    let waiter = StateWaiter::new(&["CREATING"], &["ACTIVE"]).timeout(timeout);
    let refreshed = waiter
        .wait(|| {
            let client = client.clone();
            let id = environment.id.clone();
            async move { active_refresh(&client, &id).await }
        })
        .await
        .map_err(|e| ResourceError::Wait {
            id: environment.id.clone(),
            source: e,
        })?;

    Ok(refreshed.unwrap_or(environment))
}

/// Fetch an environment; `Ok(None)` if it no longer exists
pub async fn get(
    client: &ServiceStageClient,
    id: &str,
) -> Result<Option<Environment>, ResourceError> {
    match client.get(&client.environment_url(id)).await {
        Ok(value) => Ok(Some(serde_json::from_value(value)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Submit the changed fields, then re-read. An empty diff sends no request.
pub async fn update(
    client: &ServiceStageClient,
    id: &str,
    update: &EnvironmentUpdate,
) -> Result<Option<Environment>, ResourceError> {
    if !update.is_empty() {
        let body = serde_json::to_value(update)?;
        client.put(&client.environment_url(id), Some(&body)).await?;
    }
    get(client, id).await
}

/// Delete an environment, polling until it is gone. Idempotent.
pub async fn delete(
    client: &ServiceStageClient,
    id: &str,
    timeout: Duration,
) -> Result<(), ResourceError> {
    let waiter = StateWaiter::new(&["ACTIVE"], &["DELETED"]).timeout(timeout);
    waiter
        .wait(|| {
            let client = client.clone();
            let id = id.to_string();
            async move { delete_refresh(&client, &id).await }
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
    id: &str,
) -> Result<(Option<Environment>, String), ApiError> {
    let value = client.get(&client.environment_url(id)).await?;
    let environment: Environment = serde_json::from_value(value)?;
    Ok((Some(environment), "ACTIVE".to_string()))
}

async fn delete_refresh(
    client: &ServiceStageClient,
    id: &str,
) -> Result<(Option<Environment>, String), ApiError> {
    let url = client.environment_url(id);

    let current: Environment = match client.get(&url).await {
        Ok(value) => serde_json::from_value(value)?,
        Err(e) if e.is_not_found() => {
            tracing::info!("Successfully deleted environment {}", id);
            return Ok((None, "DELETED".to_string()));
        }
        Err(e) => return Err(e),
    };

    match client.delete(&url).await {
        Ok(_) => Ok((Some(current), "ACTIVE".to_string())),
        Err(e) if e.is_not_found() => {
            tracing::info!("Successfully deleted environment {}", id);
            Ok((None, "DELETED".to_string()))
        }
        Err(e) if e.is_conflict() => {
            tracing::debug!("Environment {} still busy, retrying delete", id);
            Ok((Some(current), "ACTIVE".to_string()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> EnvironmentSpec {
        EnvironmentSpec {
            name: "staging".to_string(),
            description: None,
            alias: None,
            charge_mode: None,
            enterprise_project_id: None,
            vpc_id: "vpc-1".to_string(),
            base_resources: vec![ResourceRef {
                id: "cluster-1".to_string(),
                kind: "cce".to_string(),
            }],
            optional_resources: Vec::new(),
        }
    }

    #[test]
    fn valid_spec_passes() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn empty_base_resources_rejected() {
        let mut spec = spec();
        spec.base_resources.clear();
        let err = spec.validate().unwrap_err();
        assert_eq!(err.field, "base_resources");
    }

    #[test]
    fn resource_ref_serializes_type_keyword() {
        let body = serde_json::to_value(spec()).unwrap();
        assert_eq!(
            body["base_resources"][0],
            serde_json::json!({ "id": "cluster-1", "type": "cce" })
        );
        // empty optional list is omitted entirely
        assert!(body.get("optional_resources").is_none());
    }
}
