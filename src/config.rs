//! Configuration Management
//!
//! Handles persistent configuration storage for hwstage.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Last used region
    #[serde(default)]
    pub region: Option<String>,
    /// Last used project ID
    #[serde(default)]
    pub project_id: Option<String>,
    /// Last used CCE cluster ID
    #[serde(default)]
    pub cluster_id: Option<String>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hwstage").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective region (CLI > env > config > default)
    pub fn effective_region(&self) -> String {
        std::env::var("HW_REGION")
            .ok()
            .or_else(|| self.region.clone())
            .unwrap_or_else(|| "cn-north-4".to_string())
    }

    /// Get effective project (CLI > env > config)
    pub fn effective_project(&self) -> String {
        std::env::var("HW_PROJECT_ID")
            .ok()
            .or_else(|| self.project_id.clone())
            .unwrap_or_default()
    }

    /// Get effective cluster (CLI > env > config)
    pub fn effective_cluster(&self) -> Option<String> {
        std::env::var("HW_CLUSTER_ID").ok().or_else(|| self.cluster_id.clone())
    }

    /// Set region and save
    pub fn set_region(&mut self, region: &str) -> Result<()> {
        self.region = Some(region.to_string());
        self.save()
    }

    /// Set project and save
    pub fn set_project(&mut self, project_id: &str) -> Result<()> {
        self.project_id = Some(project_id.to_string());
        self.save()
    }
}
