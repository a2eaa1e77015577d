//! CCE cluster lookup
//!
//! Read-only: lists the project's clusters and selects one by name or id.
//! Used to resolve the cluster that Kubernetes services are created in.

use super::{ResourceError, ValidationError};
use crate::huawei::client::CceClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cluster summary extracted from the CCE v3 list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub flavor: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl From<&Value> for Cluster {
    fn from(item: &Value) -> Self {
        let metadata = item.get("metadata").cloned().unwrap_or(Value::Null);
        let spec = item.get("spec").cloned().unwrap_or(Value::Null);
        Self {
            id: str_field(&metadata, "uid"),
            name: str_field(&metadata, "name"),
            status: item
                .get("status")
                .and_then(|s| s.get("phase"))
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown")
                .to_string(),
            flavor: spec.get("flavor").and_then(|v| v.as_str()).map(str::to_string),
            version: spec.get("version").and_then(|v| v.as_str()).map(str::to_string),
        }
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("-").to_string()
}

/// Selector for a single cluster; at least one of name/id must be set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl ClusterQuery {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_none() && self.id.is_none() {
            return Err(ValidationError::new("cluster", "either name or id is required"));
        }
        Ok(())
    }

    fn matches(&self, cluster: &Cluster) -> bool {
        if let Some(id) = &self.id {
            return cluster.id == *id;
        }
        if let Some(name) = &self.name {
            return cluster.name == *name;
        }
        false
    }
}

/// List all clusters in the project
pub async fn list(client: &CceClient) -> Result<Vec<Cluster>, ResourceError> {
    let response = client.get(&client.clusters_url()).await?;

    let clusters = response
        .get("items")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().map(Cluster::from).collect())
        .unwrap_or_default();

    Ok(clusters)
}

/// Find one cluster by the query; `Ok(None)` when nothing matches
pub async fn find(
    client: &CceClient,
    query: &ClusterQuery,
) -> Result<Option<Cluster>, ResourceError> {
    query.validate()?;

    let clusters = list(client).await?;
    Ok(clusters.into_iter().find(|c| query.matches(c)))
}
