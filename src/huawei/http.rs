//! HTTP utilities for Huawei Cloud REST API calls

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        format!("{}... [truncated, {} bytes total]", &body[..MAX_LOG_BODY_LENGTH], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Error returned by the HTTP layer.
///
/// The lifecycle code branches on the 404/409 variants (a missing resource is
/// "already absent", a conflict means "busy, retry later"), so those statuses
/// get their own variants instead of being folded into a string.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("resource not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict(_))
    }
}

/// Extract the vendor error message from a Huawei Cloud error body.
///
/// ServiceStage reports `{"error_code": ..., "error_msg": ...}`; the CCE
/// Kubernetes endpoints report a k8s Status object with `message`.
fn vendor_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error_msg", "message"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    sanitize_for_log(body)
}

/// HTTP client wrapper for Huawei Cloud API calls
#[derive(Clone)]
pub struct HwcHttpClient {
    client: Client,
}

impl HwcHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("hwstage/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Make a GET request to a Huawei Cloud API
    pub async fn get(&self, url: &str, token: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, url, token, None).await
    }

    /// Make a POST request to a Huawei Cloud API
    pub async fn post(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        self.request(Method::POST, url, token, body).await
    }

    /// Make a PUT request to a Huawei Cloud API
    pub async fn put(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        self.request(Method::PUT, url, token, body).await
    }

    /// Make a DELETE request to a Huawei Cloud API
    pub async fn delete(&self, url: &str, token: &str) -> Result<Value, ApiError> {
        self.request(Method::DELETE, url, token, None).await
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .header("X-Auth-Token", token);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;

        let status = response.status();
        let response_body = response.text().await?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(match status {
                StatusCode::NOT_FOUND => ApiError::NotFound,
                StatusCode::CONFLICT => ApiError::Conflict(vendor_message(&response_body)),
                _ => ApiError::UnexpectedStatus {
                    status: status.as_u16(),
                    message: vendor_message(&response_body),
                },
            });
        }

        // Handle empty response
        if response_body.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&response_body)?)
    }
}
