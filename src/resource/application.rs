//! ServiceStage applications
//!
//! An application is the top of the ServiceStage hierarchy; components and
//! deployments hang off it. Lives at `cas/applications`.

use super::wait::StateWaiter;
use super::{validate_name, ResourceError, ValidationError};
use crate::huawei::client::ServiceStageClient;
use crate::huawei::http::ApiError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Desired application configuration.
///
/// Serializes directly as the create request body: unset optional fields are
/// omitted, so `ApplicationSpec { name: "demo", .. }` posts `{"name":"demo"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_project_id: Option<String>,
}

impl ApplicationSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("application name", &self.name)
    }

    /// Fields that differ from the live resource. Only these are submitted
    /// on update; the API accepts nothing but name and description here.
    pub fn diff(&self, current: &Application) -> ApplicationUpdate {
        let mut update = ApplicationUpdate::default();
        if self.name != current.name {
            update.name = Some(self.name.clone());
        }
        if self.description.is_some() && self.description != current.description {
            update.description = self.description.clone();
        }
        update
    }
}

/// Application as reported by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update body; empty fields are not serialized
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplicationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ApplicationUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

/// Create an application and wait for it to become active
pub async fn create(
    client: &ServiceStageClient,
    spec: &ApplicationSpec,
    timeout: Duration,
) -> Result<Application, ResourceError> {
    spec.validate()?;

    let body = serde_json::to_value(spec)?;
    let response = client.post(&client.applications_url(), Some(&body)).await?;
    let application: Application = serde_json::from_value(response)?;
    tracing::info!("Created application {} ({})", application.name, application.id);

    let waiter = StateWaiter::new(&["CREATING"], &["ACTIVE"]).timeout(timeout);
    let refreshed = waiter
        .wait(|| {
            let client = client.clone();
            let id = application.id.clone();
            async move { active_refresh(&client, &id).await }
        })
        .await
        .map_err(|e| ResourceError::Wait {
            id: application.id.clone(),
            source: e,
        })?;

    Ok(refreshed.unwrap_or(application))
}

/// Fetch an application; `Ok(None)` if it no longer exists
pub async fn get(
    client: &ServiceStageClient,
    id: &str,
) -> Result<Option<Application>, ResourceError> {
    match client.get(&client.application_url(id)).await {
        Ok(value) => Ok(Some(serde_json::from_value(value)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Submit the changed fields, then re-read. An empty diff sends no request.
pub async fn update(
    client: &ServiceStageClient,
    id: &str,
    update: &ApplicationUpdate,
) -> Result<Option<Application>, ResourceError> {
    if !update.is_empty() {
        let body = serde_json::to_value(update)?;
        client.put(&client.application_url(id), Some(&body)).await?;
    }
    get(client, id).await
}

/// Delete an application, polling until it is gone. Idempotent.
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
) -> Result<(Option<Application>, String), ApiError> {
    let value = client.get(&client.application_url(id)).await?;
    let application: Application = serde_json::from_value(value)?;
    Ok((Some(application), "ACTIVE".to_string()))
}

/// One delete round: check existence, then request deletion.
/// 404 at either step means done; 409 on delete means busy, try again.
async fn delete_refresh(
    client: &ServiceStageClient,
    id: &str,
) -> Result<(Option<Application>, String), ApiError> {
    let url = client.application_url(id);

    let current: Application = match client.get(&url).await {
        Ok(value) => serde_json::from_value(value)?,
        Err(e) if e.is_not_found() => {
            tracing::info!("Successfully deleted application {}", id);
            return Ok((None, "DELETED".to_string()));
        }
        Err(e) => return Err(e),
    };

    match client.delete(&url).await {
        Ok(_) => Ok((Some(current), "ACTIVE".to_string())),
        Err(e) if e.is_not_found() => {
            tracing::info!("Successfully deleted application {}", id);
            Ok((None, "DELETED".to_string()))
        }
        Err(e) if e.is_conflict() => {
            tracing::debug!("Application {} still busy, retrying delete", id);
            Ok((Some(current), "ACTIVE".to_string()))
        }
        Err(e) => Err(e),
    }
}
