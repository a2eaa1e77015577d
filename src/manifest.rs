//! Declarative resource manifest
//!
//! A manifest is a YAML (or JSON) document listing the resources to manage.
//! Everything is typed: unknown fields are rejected at parse time, and
//! [`Manifest::validate`] runs every spec's validation before any API call
//! is made.

use crate::resource::application::ApplicationSpec;
use crate::resource::component::ComponentSpec;
use crate::resource::environment::EnvironmentSpec;
use crate::resource::instance::InstanceSpec;
use crate::resource::service::Service;
use crate::resource::ValidationError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// The resources one `apply` manages, in dependency order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<ApplicationSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<EnvironmentSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<InstanceSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceEntry>,
}

/// A Kubernetes service plus the CCE cluster it is created in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceEntry {
    pub cluster_id: String,
    pub service: Service,
}

impl Manifest {
    /// Load a manifest from disk; format chosen by extension (`.json` is
    /// JSON, anything else YAML)
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;

        let manifest: Manifest = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON manifest {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML manifest {}", path.display()))?
        };

        Ok(manifest)
    }

    /// Validate every spec and reject duplicate names within a resource type
    pub fn validate(&self) -> Result<(), ValidationError> {
        for spec in &self.applications {
            spec.validate()?;
        }
        for spec in &self.environments {
            spec.validate()?;
        }
        for spec in &self.components {
            spec.validate()?;
        }
        for spec in &self.instances {
            spec.validate()?;
        }
        for entry in &self.services {
            if entry.cluster_id.is_empty() {
                return Err(ValidationError::new("cluster_id", "must not be empty"));
            }
            entry.service.validate()?;
        }

        unique_names("applications", self.applications.iter().map(|s| s.name.as_str()))?;
        unique_names("environments", self.environments.iter().map(|s| s.name.as_str()))?;
        unique_names("components", self.components.iter().map(|s| s.name.as_str()))?;
        unique_names("instances", self.instances.iter().map(|s| s.name.as_str()))?;
        unique_names(
            "services",
            self.services.iter().map(|e| e.service.metadata.name.as_str()),
        )?;

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
            && self.environments.is_empty()
            && self.components.is_empty()
            && self.instances.is_empty()
            && self.services.is_empty()
    }
}

fn unique_names<'a>(
    field: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ValidationError::new(field, format!("duplicate name {name:?}")));
        }
    }
    Ok(())
}
