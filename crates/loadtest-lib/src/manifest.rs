//! Resource manifests
//!
//! Builds the payloads the load test submits:
//! - DevWorkspaces, either from the built-in template or from an external
//!   manifest downloaded once at startup
//! - labeled Namespaces for isolated mode
//! - the automount ConfigMap and Secret fixtures
//!
//! Every payload carries the `load-test=test-type` label so final cleanup
//! by label selector finds all of them and nothing else.

use crate::client::HttpKubeClient;
use crate::error::{LoadTestError, Result};
use crate::models::{ResourceIdentity, LOAD_TEST_LABEL_KEY, LOAD_TEST_LABEL_VALUE};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

/// Name of the automount ConfigMap fixture
pub const AUTOMOUNT_CONFIGMAP_NAME: &str = "dwo-load-test-automount-configmap";

/// Name of the automount Secret fixture
pub const AUTOMOUNT_SECRET_NAME: &str = "dwo-load-test-automount-secret";

const WORKSPACE_IMAGE: &str = "registry.access.redhat.com/ubi9/ubi-micro:9.6-1752751762";

fn load_test_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        LOAD_TEST_LABEL_KEY.to_string(),
        LOAD_TEST_LABEL_VALUE.to_string(),
    )])
}

/// Where DevWorkspace payloads come from
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestSource {
    /// Small ephemeral workspace with one sleeping container
    Opinionated,
    /// Pre-fetched manifest cloned for every worker
    External(Value),
}

impl ManifestSource {
    /// Wrap an external manifest after checking its shape
    pub fn from_external(manifest: Value) -> Result<Self> {
        if !manifest.is_object() {
            return Err(LoadTestError::Parse(
                "external DevWorkspace manifest must be a JSON object".into(),
            ));
        }
        if !manifest.get("metadata").is_some_and(Value::is_object) {
            return Err(LoadTestError::Parse(
                "external DevWorkspace manifest needs a metadata object".into(),
            ));
        }
        Ok(ManifestSource::External(manifest))
    }

    /// Resolve the source once for the whole run
    pub async fn resolve(link: Option<&str>, client: &HttpKubeClient) -> Result<Self> {
        match link {
            Some(link) => {
                info!(link = %link, "Downloading external DevWorkspace manifest");
                let manifest = client.fetch_external_manifest(link).await?;
                Self::from_external(manifest)
            }
            None => Ok(ManifestSource::Opinionated),
        }
    }

    /// Build the payload for one identity
    ///
    /// Name, namespace and labels are always overwritten; any labels on an
    /// external manifest are replaced by the load test label.
    pub fn render(&self, identity: &ResourceIdentity) -> Value {
        let mut manifest = match self {
            ManifestSource::Opinionated => opinionated_devworkspace(),
            ManifestSource::External(manifest) => manifest.clone(),
        };

        let metadata = &mut manifest["metadata"];
        metadata["name"] = json!(identity.name);
        metadata["namespace"] = json!(identity.namespace);
        metadata["labels"] = json!(load_test_labels());

        manifest
    }
}

fn opinionated_devworkspace() -> Value {
    json!({
        "apiVersion": "workspace.devfile.io/v1alpha2",
        "kind": "DevWorkspace",
        "metadata": {},
        "spec": {
            "started": true,
            "template": {
                "attributes": {
                    "controller.devfile.io/storage-type": "ephemeral"
                },
                "components": [{
                    "name": "dev",
                    "container": {
                        "image": WORKSPACE_IMAGE,
                        "command": ["sleep", "3600"],
                        "imagePullPolicy": "IfNotPresent",
                        "memoryLimit": "64Mi",
                        "memoryRequest": "32Mi",
                        "cpuLimit": "200m",
                        "cpuRequest": "100m"
                    }
                }]
            }
        }
    })
}

/// Labeled namespace for isolated mode
pub fn namespace(name: &str) -> Result<Value> {
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(load_test_labels()),
            ..Default::default()
        },
        ..Default::default()
    };
    Ok(serde_json::to_value(namespace)?)
}

/// ConfigMap the controller mounts into every workspace
pub fn automount_configmap(namespace: &str) -> Result<Value> {
    let configmap = ConfigMap {
        metadata: ObjectMeta {
            name: Some(AUTOMOUNT_CONFIGMAP_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([
                (
                    "controller.devfile.io/mount-to-devworkspace".to_string(),
                    "true".to_string(),
                ),
                (
                    "controller.devfile.io/watch-configmap".to_string(),
                    "true".to_string(),
                ),
            ])),
            annotations: Some(BTreeMap::from([
                (
                    "controller.devfile.io/mount-path".to_string(),
                    "/etc/config/dwo-load-test-configmap".to_string(),
                ),
                (
                    "controller.devfile.io/mount-access-mode".to_string(),
                    "0644".to_string(),
                ),
                ("controller.devfile.io/mount-as".to_string(), "file".to_string()),
            ])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "test.key".to_string(),
            "test-value".to_string(),
        )])),
        ..Default::default()
    };
    Ok(serde_json::to_value(configmap)?)
}

/// Secret the controller mounts into every workspace
pub fn automount_secret(namespace: &str, value_base64: &str) -> Result<Value> {
    let value: ByteString = serde_json::from_value(Value::String(value_base64.to_string()))
        .map_err(|e| LoadTestError::Config(format!("invalid base64 secret value: {}", e)))?;

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(AUTOMOUNT_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([
                (
                    "controller.devfile.io/mount-to-devworkspace".to_string(),
                    "true".to_string(),
                ),
                (
                    "controller.devfile.io/watch-secret".to_string(),
                    "true".to_string(),
                ),
            ])),
            annotations: Some(BTreeMap::from([
                (
                    "controller.devfile.io/mount-path".to_string(),
                    "/etc/secret/dwo-load-test-secret".to_string(),
                ),
                ("controller.devfile.io/mount-as".to_string(), "file".to_string()),
            ])),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::from([("secret.key".to_string(), value)])),
        ..Default::default()
    };
    Ok(serde_json::to_value(secret)?)
}
