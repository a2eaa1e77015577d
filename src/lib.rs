//! hwstage - declarative lifecycle manager for Huawei Cloud ServiceStage and
//! CCE Kubernetes resources.
//!
//! The library layers are:
//!
//! - [`huawei`] - authentication, HTTP, and the per-service API clients
//! - [`resource`] - typed specs and the create/get/update/delete lifecycle
//!   for applications, components, environments, deployments, Kubernetes
//!   services, and the CCE cluster lookup
//! - [`manifest`] - the declarative document listing resources to manage
//! - [`state`] - the local name-to-id state store
//! - [`config`] - persisted user defaults (region, project, cluster)
//!
//! The `hwstage` binary in `main.rs` is a thin CLI over these.

pub mod config;
pub mod huawei;
pub mod manifest;
pub mod resource;
pub mod state;
