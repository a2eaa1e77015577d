//! Local resource state store
//!
//! Maps manifest resource names to the server-assigned identifiers (plus the
//! path context needed to address them again later: owning application,
//! component, cluster, namespace). Stored as a small JSON file next to the
//! manifest so `apply`/`destroy` can find resources across runs. An entry is
//! removed when its resource is deleted or a read reports it gone.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Application,
    Environment,
    Component,
    Instance,
    Service,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Application => "application",
            ResourceKind::Environment => "environment",
            ResourceKind::Component => "component",
            ResourceKind::Instance => "instance",
            ResourceKind::Service => "service",
        };
        f.write_str(s)
    }
}

/// One tracked resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    pub kind: ResourceKind,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StateEntry {
    pub fn new(kind: ResourceKind, id: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
            application_id: None,
            component_id: None,
            cluster_id: None,
            namespace: None,
            created_at: Utc::now(),
        }
    }
}

/// The state file contents
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    resources: BTreeMap<String, StateEntry>,
}

impl State {
    /// Load state from disk; a missing or unreadable file is an empty state
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn get(&self, kind: ResourceKind, name: &str) -> Option<&StateEntry> {
        self.resources.get(&key(kind, name))
    }

    pub fn set(&mut self, name: &str, entry: StateEntry) {
        self.resources.insert(key(entry.kind, name), entry);
    }

    pub fn remove(&mut self, kind: ResourceKind, name: &str) -> Option<StateEntry> {
        self.resources.remove(&key(kind, name))
    }

    /// Tracked resources of one kind, as (name, entry) pairs
    pub fn of_kind(&self, kind: ResourceKind) -> Vec<(String, StateEntry)> {
        let prefix = format!("{kind}/");
        self.resources
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k[prefix.len()..].to_string(), v.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }
}

fn key(kind: ResourceKind, name: &str) -> String {
    format!("{kind}/{name}")
}
