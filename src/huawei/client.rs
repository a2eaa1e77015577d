//! Huawei Cloud service clients
//!
//! Per-service clients combining authentication and HTTP functionality with
//! the URL layout of each API: ServiceStage (`cas/...`), CCE cluster
//! management, and the cluster-scoped Kubernetes API.

use super::auth::Credentials;
use super::http::{ApiError, HwcHttpClient};
use anyhow::{Context, Result};
use serde_json::Value;
use url::Url;

/// ServiceStage v2 client (applications, components, environments, instances)
#[derive(Clone)]
pub struct ServiceStageClient {
    pub credentials: Credentials,
    pub http: HwcHttpClient,
    pub region: String,
    pub project_id: String,
    endpoint: String,
}

impl ServiceStageClient {
    /// Create a new ServiceStage client for a region/project
    pub fn new(credentials: Credentials, region: &str, project_id: &str) -> Result<Self> {
        let endpoint = format!("https://servicestage.{region}.myhuaweicloud.com");
        Self::with_endpoint(credentials, region, project_id, &endpoint)
    }

    /// Create a client against an explicit endpoint (tests, private deployments)
    pub fn with_endpoint(
        credentials: Credentials,
        region: &str,
        project_id: &str,
        endpoint: &str,
    ) -> Result<Self> {
        let endpoint = parse_endpoint(endpoint)?;
        let http = HwcHttpClient::new().context("Failed to create HTTP client")?;

        Ok(Self {
            credentials,
            http,
            region: region.to_string(),
            project_id: project_id.to_string(),
            endpoint,
        })
    }

    /// Build a ServiceStage v2 API URL
    pub fn cas_url(&self, path: &str) -> String {
        format!("{}/v2/{}/{}", self.endpoint, self.project_id, path)
    }

    /// `cas/applications`
    pub fn applications_url(&self) -> String {
        self.cas_url("cas/applications")
    }

    /// `cas/applications/{id}`
    pub fn application_url(&self, id: &str) -> String {
        self.cas_url(&format!("cas/applications/{id}"))
    }

    /// `cas/applications/{app}/components`
    pub fn components_url(&self, application_id: &str) -> String {
        self.cas_url(&format!("cas/applications/{application_id}/components"))
    }

    /// `cas/applications/{app}/components/{id}`
    pub fn component_url(&self, application_id: &str, id: &str) -> String {
        self.cas_url(&format!("cas/applications/{application_id}/components/{id}"))
    }

    /// `cas/environments`
    pub fn environments_url(&self) -> String {
        self.cas_url("cas/environments")
    }

    /// `cas/environments/{id}`
    pub fn environment_url(&self, id: &str) -> String {
        self.cas_url(&format!("cas/environments/{id}"))
    }

    /// `cas/applications/{app}/components/{component}/instances`
    pub fn instances_url(&self, application_id: &str, component_id: &str) -> String {
        self.cas_url(&format!(
            "cas/applications/{application_id}/components/{component_id}/instances"
        ))
    }

    /// `cas/applications/{app}/components/{component}/instances/{id}`
    pub fn instance_url(&self, application_id: &str, component_id: &str, id: &str) -> String {
        self.cas_url(&format!(
            "cas/applications/{application_id}/components/{component_id}/instances/{id}"
        ))
    }

    /// Make a GET request with the current token
    pub async fn get(&self, url: &str) -> Result<Value, ApiError> {
        let token = self.token().await?;
        self.http.get(url, &token).await
    }

    /// Make a POST request with the current token
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let token = self.token().await?;
        self.http.post(url, &token, body).await
    }

    /// Make a PUT request with the current token
    pub async fn put(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let token = self.token().await?;
        self.http.put(url, &token, body).await
    }

    /// Make a DELETE request with the current token
    pub async fn delete(&self, url: &str) -> Result<Value, ApiError> {
        let token = self.token().await?;
        self.http.delete(url, &token).await
    }

    async fn token(&self) -> Result<String, ApiError> {
        self.credentials.get_token().await.map_err(|e| ApiError::Auth(e.to_string()))
    }
}

/// CCE cluster-management client (cluster listing and lookup)
#[derive(Clone)]
pub struct CceClient {
    pub credentials: Credentials,
    pub http: HwcHttpClient,
    pub region: String,
    pub project_id: String,
    endpoint: String,
}

impl CceClient {
    /// Create a new CCE client for a region/project
    pub fn new(credentials: Credentials, region: &str, project_id: &str) -> Result<Self> {
        let endpoint = format!("https://cce.{region}.myhuaweicloud.com");
        Self::with_endpoint(credentials, region, project_id, &endpoint)
    }

    /// Create a client against an explicit endpoint (tests, private deployments)
    pub fn with_endpoint(
        credentials: Credentials,
        region: &str,
        project_id: &str,
        endpoint: &str,
    ) -> Result<Self> {
        let endpoint = parse_endpoint(endpoint)?;
        let http = HwcHttpClient::new().context("Failed to create HTTP client")?;

        Ok(Self {
            credentials,
            http,
            region: region.to_string(),
            project_id: project_id.to_string(),
            endpoint,
        })
    }

    /// `api/v3/projects/{project}/clusters`
    pub fn clusters_url(&self) -> String {
        format!("{}/api/v3/projects/{}/clusters", self.endpoint, self.project_id)
    }

    /// `api/v3/projects/{project}/clusters/{id}`
    pub fn cluster_url(&self, id: &str) -> String {
        format!("{}/{}", self.clusters_url(), id)
    }

    /// Derive a Kubernetes API client scoped to one cluster.
    ///
    /// The per-cluster API lives on a cluster-id subdomain of the regional
    /// CCE endpoint (`https://{cluster_id}.cce.{region}.myhuaweicloud.com`).
    pub fn cluster_scoped(&self, cluster_id: &str) -> Result<KubeClient> {
        let rebased = match self.endpoint.strip_prefix("https://") {
            Some(host) => format!("https://{cluster_id}.{host}"),
            // Plain-http endpoints (mock servers) cannot be rebased by subdomain
            None => self.endpoint.clone(),
        };
        KubeClient::with_endpoint(self.credentials.clone(), &rebased)
    }

    /// Make a GET request with the current token
    pub async fn get(&self, url: &str) -> Result<Value, ApiError> {
        let token = self
            .credentials
            .get_token()
            .await
            .map_err(|e| ApiError::Auth(e.to_string()))?;
        self.http.get(url, &token).await
    }
}

/// Kubernetes API client bound to one CCE cluster
#[derive(Clone)]
pub struct KubeClient {
    pub credentials: Credentials,
    pub http: HwcHttpClient,
    endpoint: String,
}

impl KubeClient {
    /// Create a client against an explicit cluster endpoint
    pub fn with_endpoint(credentials: Credentials, endpoint: &str) -> Result<Self> {
        let endpoint = parse_endpoint(endpoint)?;
        let http = HwcHttpClient::new().context("Failed to create HTTP client")?;

        Ok(Self {
            credentials,
            http,
            endpoint,
        })
    }

    /// `api/v1/namespaces/{ns}/services`
    pub fn services_url(&self, namespace: &str) -> String {
        format!("{}/api/v1/namespaces/{}/services", self.endpoint, namespace)
    }

    /// `api/v1/namespaces/{ns}/services/{name}`
    pub fn service_url(&self, namespace: &str, name: &str) -> String {
        format!("{}/{}", self.services_url(namespace), name)
    }

    /// Make a GET request with the current token
    pub async fn get(&self, url: &str) -> Result<Value, ApiError> {
        let token = self.token().await?;
        self.http.get(url, &token).await
    }

    /// Make a POST request with the current token
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let token = self.token().await?;
        self.http.post(url, &token, body).await
    }

    /// Make a PUT request with the current token
    pub async fn put(&self, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let token = self.token().await?;
        self.http.put(url, &token, body).await
    }

    /// Make a DELETE request with the current token
    pub async fn delete(&self, url: &str) -> Result<Value, ApiError> {
        let token = self.token().await?;
        self.http.delete(url, &token).await
    }

    async fn token(&self) -> Result<String, ApiError> {
        self.credentials.get_token().await.map_err(|e| ApiError::Auth(e.to_string()))
    }
}

/// Validate an endpoint URL and normalize away any trailing slash
fn parse_endpoint(endpoint: &str) -> Result<String> {
    Url::parse(endpoint).with_context(|| format!("Invalid endpoint URL: {endpoint}"))?;
    Ok(endpoint.trim_end_matches('/').to_string())
}
