//! Huawei Cloud authentication
//!
//! Handles authentication against the IAM v3 token endpoint, either from a
//! pre-issued token or from username/password credentials in the environment.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if the IAM response carries no usable expiry
/// (conservative: 30 minutes; issued tokens normally last 24 hours)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Huawei Cloud credentials holder with token caching
#[derive(Clone)]
pub struct Credentials {
    source: TokenSource,
    http: Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
enum TokenSource {
    /// A pre-issued token supplied directly (HW_ACCESS_TOKEN)
    Static(String),
    /// IAM username/password exchanged at `POST /v3/auth/tokens`
    Password {
        endpoint: String,
        username: String,
        password: String,
        domain: String,
        project_id: Option<String>,
    },
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    /// Check if this cached token is still valid
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl Credentials {
    /// Build credentials from the environment.
    ///
    /// `HW_ACCESS_TOKEN` wins; otherwise `HW_USERNAME` + `HW_PASSWORD`
    /// (+ `HW_DOMAIN_NAME`, defaulting to the username) are exchanged against
    /// the region's IAM endpoint, scoped to `project_id` when given.
    pub fn from_env(region: &str, project_id: Option<&str>) -> Result<Self> {
        if let Ok(token) = std::env::var("HW_ACCESS_TOKEN") {
            return Self::with_token(&token);
        }

        let username = std::env::var("HW_USERNAME").context(
            "No Huawei Cloud credentials found. Set HW_ACCESS_TOKEN, or HW_USERNAME and HW_PASSWORD",
        )?;
        let password =
            std::env::var("HW_PASSWORD").context("HW_USERNAME is set but HW_PASSWORD is not")?;
        let domain = std::env::var("HW_DOMAIN_NAME").unwrap_or_else(|_| username.clone());
        let endpoint = std::env::var("HW_IAM_ENDPOINT")
            .unwrap_or_else(|_| format!("https://iam.{region}.myhuaweicloud.com"));

        Ok(Self {
            source: TokenSource::Password {
                endpoint,
                username,
                password,
                domain,
                project_id: project_id.map(str::to_string),
            },
            http: iam_client()?,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Build credentials around a pre-issued token (no refresh possible)
    pub fn with_token(token: &str) -> Result<Self> {
        Ok(Self {
            source: TokenSource::Static(token.to_string()),
            http: iam_client()?,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Get an auth token for API calls
    /// Security: Checks token expiry before returning cached token
    pub async fn get_token(&self) -> Result<String> {
        if let TokenSource::Static(token) = &self.source {
            return Ok(token.clone());
        }

        // Check cache first - but only return if token is still valid
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let (token, expires_at) = self.fetch_token().await?;

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }

        Ok(token)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }

        self.get_token().await
    }

    /// Exchange username/password for a token at the IAM endpoint.
    /// The token itself is returned in the `X-Subject-Token` response header;
    /// the body only carries metadata such as the expiry timestamp.
    async fn fetch_token(&self) -> Result<(String, Instant)> {
        let TokenSource::Password {
            endpoint,
            username,
            password,
            domain,
            project_id,
        } = &self.source
        else {
            unreachable!("fetch_token is only called for password credentials");
        };

        let scope = match project_id {
            Some(id) => json!({ "project": { "id": id } }),
            None => json!({ "domain": { "name": domain } }),
        };
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": username,
                            "password": password,
                            "domain": { "name": domain }
                        }
                    }
                },
                "scope": scope
            }
        });

        let url = format!("{endpoint}/v3/auth/tokens");
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach the IAM endpoint")?;

        let status = response.status();
        if !status.is_success() {
            // Security: Never echo the request body here, it contains the password
            return Err(anyhow::anyhow!("IAM token request failed: {}", status));
        }

        let token = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .context("IAM response carried no X-Subject-Token header")?;

        let metadata: Value = response.json().await.unwrap_or(Value::Null);
        let ttl = token_ttl(&metadata).unwrap_or(DEFAULT_TOKEN_TTL);
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        tracing::debug!("New token cached, expires in ~{} minutes", ttl.as_secs() / 60);

        Ok((token, expires_at))
    }
}

fn iam_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("hwstage/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create IAM HTTP client")
}

/// Read the remaining lifetime out of the IAM token metadata body
fn token_ttl(metadata: &Value) -> Option<Duration> {
    let expires_at = metadata
        .get("token")
        .and_then(|t| t.get("expires_at"))
        .and_then(|v| v.as_str())?;
    let expires_at: DateTime<Utc> = expires_at.parse().ok()?;
    (expires_at - Utc::now()).to_std().ok()
}

/// Validate a Huawei Cloud region id (e.g. `cn-north-4`, `ap-southeast-1`)
/// Regions are lowercase letters, digits, and hyphens, with at least two parts
pub fn validate_region(region: &str) -> bool {
    if region.is_empty() || !region.contains('-') || region.ends_with('-') {
        return false;
    }
    let mut chars = region.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    region
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
