//! Resource lifecycle layer
//!
//! One submodule per managed resource type, each exposing the same four
//! operations (create / get / update / delete) against its API, plus the
//! shared wait-for-state poller.
//!
//! # Architecture
//!
//! - [`wait`] - generic poll-until-target-state loop
//! - [`application`], [`component`], [`environment`], [`instance`] -
//!   ServiceStage resources under `cas/...`
//! - [`service`] - Kubernetes services on a CCE cluster
//! - [`cluster`] - read-only CCE cluster lookup
//!
//! All operations take the client explicitly; there is no shared global
//! configuration. Specs are typed and validated before any request is built.
//!
//! # Lifecycle
//!
//! Create POSTs the spec, adopts the server-assigned id, and polls until the
//! resource is active. Get returns `Ok(None)` for a vanished resource rather
//! than an error. Update sends only the changed fields (and nothing at all
//! for an empty diff). Delete polls: already-absent counts as deleted, a 409
//! means the resource is still busy and the delete is retried.

pub mod application;
pub mod cluster;
pub mod component;
pub mod environment;
pub mod instance;
pub mod service;
pub mod wait;

use crate::huawei::http::ApiError;
use thiserror::Error;
use wait::WaitError;

/// A spec field rejected at parse/validation time
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error surface of the lifecycle operations
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("resource {id}: {source}")]
    Wait {
        id: String,
        #[source]
        source: WaitError,
    },

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Validate a ServiceStage resource name: non-empty, at most 64 characters.
/// Counted in characters, not bytes - CJK names are allowed.
pub(crate) fn validate_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    if name.chars().count() > 64 {
        return Err(ValidationError::new(field, "must be at most 64 characters"));
    }
    Ok(())
}
