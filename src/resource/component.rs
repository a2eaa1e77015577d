//! ServiceStage components
//!
//! A component is a buildable unit inside an application: a runtime, a
//! category, and where its code or artifact comes from. Lives at
//! `cas/applications/{app}/components`.

use super::wait::StateWaiter;
use super::{validate_name, ResourceError, ValidationError};
use crate::huawei::client::ServiceStageClient;
use crate::huawei::http::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Desired component configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    pub name: String,
    /// Owning application; part of the URL, never of the request body
    #[serde(skip_serializing)]
    pub application_id: String,
    pub runtime: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub build: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ComponentSource>,
}

/// Where the component's content comes from: a code repository or a
/// prebuilt artifact package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec", rename_all = "lowercase", deny_unknown_fields)]
pub enum ComponentSource {
    Code(CodeSource),
    Artifact(ArtifactSource),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeSource {
    pub repo_type: String,
    pub repo_url: String,
    pub repo_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_auth: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactSource {
    pub storage: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

impl ComponentSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("component name", &self.name)?;
        if self.application_id.is_empty() {
            return Err(ValidationError::new("application_id", "must not be empty"));
        }
        if self.runtime.is_empty() {
            return Err(ValidationError::new("runtime", "must not be empty"));
        }
        if self.category.is_empty() {
            return Err(ValidationError::new("category", "must not be empty"));
        }
        Ok(())
    }

    /// Fields that differ from the live resource; the API only accepts
    /// name and description on update (everything else forces a recreate)
    pub fn diff(&self, current: &Component) -> ComponentUpdate {
        let mut update = ComponentUpdate::default();
        if self.name != current.name {
            update.name = Some(self.name.clone());
        }
        if self.description.is_some() && self.description != current.description {
            update.description = self.description.clone();
        }
        update
    }
}

/// Component as reported by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub name: String,
    /// Numeric lifecycle status: 0 = normal, 1 = failed
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub application_id: Option<String>,
}

/// Partial update body; empty fields are not serialized
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComponentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ComponentUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Create a component and wait for it to become active
pub async fn create(
    client: &ServiceStageClient,
    spec: &ComponentSpec,
    timeout: Duration,
) -> Result<Component, ResourceError> {
    spec.validate()?;

    let body = serde_json::to_value(spec)?;
    let url = client.components_url(&spec.application_id);
    let response = client.post(&url, Some(&body)).await?;
    let component: Component = serde_json::from_value(response)?;
    tracing::info!("Created component {} ({})", component.name, component.id);

    let waiter = StateWaiter::new(&["CREATING"], &["ACTIVE"]).timeout(timeout);
    let refreshed = waiter
        .wait(|| {
            let client = client.clone();
            let application_id = spec.application_id.clone();
            let id = component.id.clone();
            async move { active_refresh(&client, &application_id, &id).await }
        })
        .await
        .map_err(|e| ResourceError::Wait {
            id: component.id.clone(),
            source: e,
        })?;

    Ok(refreshed.unwrap_or(component))
}

/// Fetch a component; `Ok(None)` if it no longer exists
pub async fn get(
    client: &ServiceStageClient,
    application_id: &str,
    id: &str,
) -> Result<Option<Component>, ResourceError> {
    match client.get(&client.component_url(application_id, id)).await {
        Ok(value) => Ok(Some(serde_json::from_value(value)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Submit the changed fields, then re-read. An empty diff sends no request.
pub async fn update(
    client: &ServiceStageClient,
    application_id: &str,
    id: &str,
    update: &ComponentUpdate,
) -> Result<Option<Component>, ResourceError> {
    if !update.is_empty() {
        let body = serde_json::to_value(update)?;
        client
            .put(&client.component_url(application_id, id), Some(&body))
            .await?;
    }
    get(client, application_id, id).await
}

/// Delete a component, polling until it is gone. Idempotent.
pub async fn delete(
    client: &ServiceStageClient,
    application_id: &str,
    id: &str,
    timeout: Duration,
) -> Result<(), ResourceError> {
    let waiter = StateWaiter::new(&["ACTIVE"], &["DELETED"]).timeout(timeout);
    waiter
        .wait(|| {
            let client = client.clone();
            let application_id = application_id.to_string();
            let id = id.to_string();
            async move { delete_refresh(&client, &application_id, &id).await }
        })
        .await
        .map_err(|e| ResourceError::Wait {
            id: id.to_string(),
            source: e,
        })?;
    Ok(())
}

/// Map the numeric component status onto the waiter's string states
async fn active_refresh(
    client: &ServiceStageClient,
    application_id: &str,
    id: &str,
) -> Result<(Option<Component>, String), ApiError> {
    let value = client.get(&client.component_url(application_id, id)).await?;
    let component: Component = serde_json::from_value(value)?;

    let state = match component.status {
        0 => "ACTIVE",
        1 => "FAILED",
        _ => "CREATING",
    };
    Ok((Some(component), state.to_string()))
}

async fn delete_refresh(
    client: &ServiceStageClient,
    application_id: &str,
    id: &str,
) -> Result<(Option<Component>, String), ApiError> {
    let url = client.component_url(application_id, id);

    let current: Component = match client.get(&url).await {
        Ok(value) => serde_json::from_value(value)?,
        Err(e) if e.is_not_found() => {
            tracing::info!("Successfully deleted component {}", id);
            return Ok((None, "DELETED".to_string()));
        }
        Err(e) => return Err(e),
    };

    match client.delete(&url).await {
        Ok(_) => Ok((Some(current), "ACTIVE".to_string())),
        Err(e) if e.is_not_found() => {
            tracing::info!("Successfully deleted component {}", id);
            Ok((None, "DELETED".to_string()))
        }
        Err(e) if e.is_conflict() => {
            tracing::debug!("Component {} still busy, retrying delete", id);
            Ok((Some(current), "ACTIVE".to_string()))
        }
        Err(e) => Err(e),
    }
}
