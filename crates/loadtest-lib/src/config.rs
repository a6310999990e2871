//! Load test configuration
//!
//! All settings come from environment variables so the same binary runs
//! from a laptop against a CRC cluster and as an in-cluster Job.

use crate::error::{LoadTestError, Result};
use crate::models::ResourceThresholds;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// API server address used when running inside the cluster
pub const IN_CLUSTER_API_SERVER: &str = "https://kubernetes.default.svc";

/// Service account token mounted into every pod
pub const IN_CLUSTER_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Load test configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoadTestConfig {
    /// Kubernetes API endpoint (`KUBE_API`)
    #[serde(default)]
    pub kube_api: Option<String>,

    /// Bearer token (`KUBE_TOKEN`)
    #[serde(default)]
    pub kube_token: Option<String>,

    /// Use the in-cluster endpoint and service account token
    #[serde(default)]
    pub in_cluster: bool,

    /// Create every DevWorkspace in its own namespace
    #[serde(default)]
    pub separate_namespaces: bool,

    /// Namespace where the DevWorkspace controller runs
    #[serde(default = "default_dwo_namespace")]
    pub dwo_namespace: String,

    /// URL of an external DevWorkspace manifest to use instead of the template
    #[serde(default)]
    pub devworkspace_link: Option<String>,

    /// Provision the automount ConfigMap and Secret before the ramp
    #[serde(default)]
    pub create_automount_resources: bool,

    /// Peak number of virtual users
    #[serde(default = "default_max_vus")]
    pub max_vus: u32,

    /// Readiness budget per DevWorkspace
    #[serde(default = "default_ready_timeout")]
    pub dev_workspace_ready_timeout_in_seconds: u64,

    /// Total ramp duration
    #[serde(default = "default_test_duration")]
    pub test_duration_in_minutes: u64,

    /// Shared namespace for DevWorkspaces and automount fixtures
    #[serde(default = "default_load_test_namespace")]
    pub load_test_namespace: String,

    /// Base64 payload of the automount Secret
    #[serde(default = "default_secret_value")]
    pub secret_value_base64: String,

    /// Controller CPU limit per sample
    #[serde(default = "default_max_cpu_millicores")]
    pub max_cpu_millicores: u64,

    /// Controller memory limit per sample
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: u64,

    /// Pause between readiness polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// How long in-flight iterations may finish after the last stage
    #[serde(default = "default_graceful_ramp_down")]
    pub graceful_ramp_down_seconds: u64,

    /// Accept self-signed API server certificates (CRC, kind)
    #[serde(default = "default_insecure_skip_tls_verify")]
    pub insecure_skip_tls_verify: bool,
}

fn default_dwo_namespace() -> String {
    "openshift-operators".to_string()
}

fn default_max_vus() -> u32 {
    50
}

fn default_ready_timeout() -> u64 {
    600
}

fn default_test_duration() -> u64 {
    25
}

fn default_load_test_namespace() -> String {
    "loadtest-devworkspaces".to_string()
}

fn default_secret_value() -> String {
    // base64 of "test"
    "dGVzdA==".to_string()
}

fn default_max_cpu_millicores() -> u64 {
    ResourceThresholds::default().max_cpu_millicores
}

fn default_max_memory_bytes() -> u64 {
    ResourceThresholds::default().max_memory_bytes
}

fn default_poll_interval() -> u64 {
    5
}

fn default_graceful_ramp_down() -> u64 {
    60
}

fn default_insecure_skip_tls_verify() -> bool {
    true
}

impl LoadTestConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::default())
    }

    /// Load configuration from an explicit variable map
    pub fn from_env_map(vars: config::Map<String, String>) -> Result<Self> {
        Self::from_environment(config::Environment::default().source(Some(vars)))
    }

    fn from_environment(env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(env.try_parsing(true))
            .build()?;

        let mut parsed: LoadTestConfig = config.try_deserialize()?;
        parsed.normalize();
        Ok(parsed)
    }

    /// Treat empty strings as unset
    fn normalize(&mut self) {
        for field in [
            &mut self.kube_api,
            &mut self.kube_token,
            &mut self.devworkspace_link,
        ] {
            if field.as_deref().map(str::trim).is_some_and(str::is_empty) {
                *field = None;
            }
        }
    }

    /// Check everything that must hold before any worker starts
    pub fn validate(&self) -> Result<()> {
        self.api_endpoint()?;
        self.bearer_token()?;

        if self.max_vus == 0 {
            return Err(LoadTestError::Config("MAX_VUS must be at least 1".into()));
        }
        if self.poll_interval_seconds == 0 {
            return Err(LoadTestError::Config(
                "POLL_INTERVAL_SECONDS must be at least 1".into(),
            ));
        }
        if self.load_test_namespace.trim().is_empty() {
            return Err(LoadTestError::Config(
                "LOAD_TEST_NAMESPACE must not be empty".into(),
            ));
        }
        if self.create_automount_resources {
            serde_json::from_value::<k8s_openapi::ByteString>(serde_json::Value::String(
                self.secret_value_base64.clone(),
            ))
            .map_err(|e| {
                LoadTestError::Config(format!("SECRET_VALUE_BASE64 is not valid base64: {}", e))
            })?;
        }

        Ok(())
    }

    /// API server base URL
    pub fn api_endpoint(&self) -> Result<String> {
        if self.in_cluster {
            return Ok(IN_CLUSTER_API_SERVER.to_string());
        }

        self.kube_api
            .clone()
            .ok_or_else(|| LoadTestError::Config("KUBE_API env var is required".into()))
    }

    /// Bearer token for the API server
    pub fn bearer_token(&self) -> Result<String> {
        if self.in_cluster {
            return read_token_file(Path::new(IN_CLUSTER_TOKEN_PATH));
        }

        self.kube_token
            .clone()
            .ok_or_else(|| LoadTestError::Config("KUBE_TOKEN env var is required".into()))
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.dev_workspace_ready_timeout_in_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn graceful_ramp_down(&self) -> Duration {
        Duration::from_secs(self.graceful_ramp_down_seconds)
    }

    pub fn thresholds(&self) -> ResourceThresholds {
        ResourceThresholds {
            max_cpu_millicores: self.max_cpu_millicores,
            max_memory_bytes: self.max_memory_bytes,
        }
    }
}

fn read_token_file(path: &Path) -> Result<String> {
    let token = std::fs::read_to_string(path).map_err(|e| {
        LoadTestError::Config(format!(
            "failed to read service account token {}: {}",
            path.display(),
            e
        ))
    })?;

    let token = token.trim();
    if token.is_empty() {
        return Err(LoadTestError::Config(format!(
            "service account token {} is empty",
            path.display()
        )));
    }

    Ok(token.to_string())
}
