//! Huawei Cloud API interaction module
//!
//! This module provides the core functionality for talking to Huawei Cloud
//! APIs: authentication, the HTTP wrapper, and the per-service clients.
//!
//! # Module Structure
//!
//! - [`auth`] - IAM token authentication with caching
//! - [`client`] - ServiceStage, CCE, and cluster-scoped Kubernetes clients
//! - [`http`] - HTTP utilities and the typed API error
//!
//! # Example
//!
//! ```ignore
//! use crate::huawei::auth::Credentials;
//! use crate::huawei::client::ServiceStageClient;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let credentials = Credentials::from_env("cn-north-4", Some("my-project"))?;
//!     let client = ServiceStageClient::new(credentials, "cn-north-4", "my-project")?;
//!     let apps = client.get(&client.applications_url()).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
