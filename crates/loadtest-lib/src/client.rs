//! Kubernetes REST access
//!
//! The load test talks to the API server through the [`KubeApi`] trait so
//! lifecycle, polling and sampling logic can run against a scripted fake.
//! Only transport failures surface as `Err`; every HTTP status, expected or
//! not, comes back as an [`ApiResponse`] for the caller to classify.

use crate::error::{LoadTestError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Status code and raw body of an API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is one of `accepted`
    pub fn status_in(&self, accepted: &[u16]) -> bool {
        accepted.contains(&self.status)
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Convert into a transport error carrying this response
    pub fn into_error(self) -> LoadTestError {
        LoadTestError::Transport {
            status: self.status,
            body: self.body,
        }
    }
}

/// Minimal REST surface the load test needs from the API server
#[async_trait]
pub trait KubeApi: Send + Sync {
    async fn get(&self, path: &str) -> Result<ApiResponse>;

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<ApiResponse>;

    async fn delete(&self, path: &str) -> Result<ApiResponse>;
}

/// Path builders for the resources the load test touches
pub mod paths {
    use crate::models::load_test_label_selector;

    /// API group and version serving DevWorkspaces
    pub const DEVWORKSPACE_API: &str = "/apis/workspace.devfile.io/v1alpha2";

    pub fn devworkspaces(namespace: &str) -> String {
        format!("{}/namespaces/{}/devworkspaces", DEVWORKSPACE_API, namespace)
    }

    pub fn devworkspace(namespace: &str, name: &str) -> String {
        format!("{}/{}", devworkspaces(namespace), name)
    }

    pub fn labeled_devworkspaces(namespace: &str) -> String {
        format!(
            "{}?labelSelector={}",
            devworkspaces(namespace),
            load_test_label_selector()
        )
    }

    pub fn pod_metrics(namespace: &str) -> String {
        format!("/apis/metrics.k8s.io/v1beta1/namespaces/{}/pods", namespace)
    }

    pub fn namespaces() -> String {
        "/api/v1/namespaces".to_string()
    }

    pub fn namespace(name: &str) -> String {
        format!("/api/v1/namespaces/{}", name)
    }

    pub fn labeled_namespaces() -> String {
        format!("/api/v1/namespaces?labelSelector={}", load_test_label_selector())
    }

    pub fn configmaps(namespace: &str) -> String {
        format!("/api/v1/namespaces/{}/configmaps", namespace)
    }

    pub fn configmap(namespace: &str, name: &str) -> String {
        format!("{}/{}", configmaps(namespace), name)
    }

    pub fn secrets(namespace: &str) -> String {
        format!("/api/v1/namespaces/{}/secrets", namespace)
    }

    pub fn secret(namespace: &str, name: &str) -> String {
        format!("{}/{}", secrets(namespace), name)
    }
}

/// [`KubeApi`] over HTTPS with a bearer token
pub struct HttpKubeClient {
    client: Client,
    base_url: String,
}

impl HttpKubeClient {
    /// Create a client for `base_url`, authenticating with `token`
    pub fn new(base_url: &str, token: &str, insecure_skip_tls_verify: bool) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| LoadTestError::Config(format!("invalid API endpoint {}: {}", base_url, e)))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| LoadTestError::Config("token contains invalid header characters".into()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .danger_accept_invalid_certs(insecure_skip_tls_verify)
            .build()?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        let full = format!("{}{}", self.base_url, path);
        Url::parse(&full).map_err(|e| LoadTestError::Parse(format!("invalid url {}: {}", full, e)))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse> {
        let url = self.url(path)?;
        debug!(method = %method, url = %url, "Sending API request");

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        Ok(ApiResponse { status, body })
    }

    /// Download the external DevWorkspace manifest (no API server auth)
    pub async fn fetch_external_manifest(&self, url: &str) -> Result<serde_json::Value> {
        let url = Url::parse(url).map_err(|e| LoadTestError::Config(format!("invalid url {}: {}", url, e)))?;

        // Build a bare request so the cluster token never leaks to third parties
        let response = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?
            .get(url)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if status != 200 {
            return Err(LoadTestError::Transport { status, body });
        }

        ApiResponse::new(status, body).json()
    }
}

#[async_trait]
impl KubeApi for HttpKubeClient {
    async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<ApiResponse> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(Method::DELETE, path, None).await
    }
}
