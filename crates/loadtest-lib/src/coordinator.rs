//! Run coordination: fixture setup, per-iteration dispatch and final cleanup
//!
//! Setup and cleanup never fail the run. Their failures are logged and the
//! summary's threshold evaluation stays the only pass/fail signal.

use crate::client::{paths, KubeApi};
use crate::config::LoadTestConfig;
use crate::error::Result;
use crate::executor::{ExecutorReport, RampingExecutor, VuWork};
use crate::lifecycle::{LifecycleDriver, CREATE_OK, DELETE_OK};
use crate::manifest::{self, AUTOMOUNT_CONFIGMAP_NAME, AUTOMOUNT_SECRET_NAME};
use crate::models::{CycleReport, ResourceIdentity};
use crate::observability::{LoadTestMetrics, StructuredLogger};
use async_trait::async_trait;
use serde::Deserialize;
use std::future::{pending, Future};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings the coordinator needs from the run configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub load_test_namespace: String,
    pub separate_namespaces: bool,
    pub create_automount_resources: bool,
    pub secret_value_base64: String,
}

impl From<&LoadTestConfig> for CoordinatorConfig {
    fn from(config: &LoadTestConfig) -> Self {
        Self {
            load_test_namespace: config.load_test_namespace.clone(),
            separate_namespaces: config.separate_namespaces,
            create_automount_resources: config.create_automount_resources,
            secret_value_base64: config.secret_value_base64.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NamespaceList {
    #[serde(default)]
    items: Vec<NamespaceItem>,
}

#[derive(Debug, Deserialize)]
struct NamespaceItem {
    metadata: NamespaceMeta,
}

#[derive(Debug, Deserialize)]
struct NamespaceMeta {
    name: String,
}

/// Owns the run-level phases around the ramp
pub struct RunCoordinator {
    api: Arc<dyn KubeApi>,
    driver: LifecycleDriver,
    metrics: LoadTestMetrics,
    logger: StructuredLogger,
    config: CoordinatorConfig,
}

impl RunCoordinator {
    pub fn new(
        api: Arc<dyn KubeApi>,
        driver: LifecycleDriver,
        metrics: LoadTestMetrics,
        logger: StructuredLogger,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            api,
            driver,
            metrics,
            logger,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Provision the automount fixtures when enabled
    pub async fn setup(&self) {
        if !self.config.create_automount_resources {
            return;
        }

        let namespace = &self.config.load_test_namespace;
        info!(namespace = %namespace, "Creating automount ConfigMap and Secret");

        match manifest::automount_configmap(namespace) {
            Ok(body) => {
                self.create_fixture("ConfigMap", AUTOMOUNT_CONFIGMAP_NAME, &paths::configmaps(namespace), &body)
                    .await
            }
            Err(e) => warn!(error = %e, "Failed to build automount ConfigMap"),
        }

        match manifest::automount_secret(namespace, &self.config.secret_value_base64) {
            Ok(body) => {
                self.create_fixture("Secret", AUTOMOUNT_SECRET_NAME, &paths::secrets(namespace), &body)
                    .await
            }
            Err(e) => warn!(error = %e, "Failed to build automount Secret"),
        }
    }

    async fn create_fixture(&self, kind: &str, name: &str, path: &str, body: &serde_json::Value) {
        match self.api.post(path, body).await {
            Ok(response) if response.status_in(CREATE_OK) => {
                debug!(kind = %kind, name = %name, status = response.status, "Fixture ready");
            }
            Ok(response) => {
                warn!(
                    kind = %kind,
                    name = %name,
                    status = response.status,
                    body = %response.body,
                    "Failed to create fixture"
                );
            }
            Err(e) => warn!(kind = %kind, name = %name, error = %e, "Failed to create fixture"),
        }
    }

    /// Identity for one iteration in the configured isolation mode
    pub fn identity(&self, vu: u32, iteration: u64) -> ResourceIdentity {
        if self.config.separate_namespaces {
            ResourceIdentity::isolated(vu, iteration)
        } else {
            ResourceIdentity::shared(vu, iteration, self.config.load_test_namespace.clone())
        }
    }

    /// Run one full cycle, creating the namespace first in isolated mode
    pub async fn run_iteration(&self, vu: u32, iteration: u64) -> Result<CycleReport> {
        let identity = self.identity(vu, iteration);

        if self.config.separate_namespaces {
            self.create_namespace(&identity.namespace).await?;
        }

        Ok(self.driver.run_cycle(&identity).await)
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        let body = manifest::namespace(name)?;
        let response = self.api.post(&paths::namespaces(), &body).await?;
        if response.status_in(CREATE_OK) {
            Ok(())
        } else {
            Err(response.into_error())
        }
    }

    /// Delete everything the run left behind
    pub async fn final_cleanup(&self) {
        if self.config.separate_namespaces {
            self.delete_labeled_namespaces().await;
        } else {
            self.delete_labeled_devworkspaces().await;
        }

        if self.config.create_automount_resources {
            let namespace = &self.config.load_test_namespace;
            self.delete_resource(
                "ConfigMap",
                AUTOMOUNT_CONFIGMAP_NAME,
                &paths::configmap(namespace, AUTOMOUNT_CONFIGMAP_NAME),
            )
            .await;
            self.delete_resource(
                "Secret",
                AUTOMOUNT_SECRET_NAME,
                &paths::secret(namespace, AUTOMOUNT_SECRET_NAME),
            )
            .await;
        }
    }

    async fn delete_labeled_devworkspaces(&self) {
        let namespace = &self.config.load_test_namespace;
        info!(namespace = %namespace, "Deleting all labeled DevWorkspaces");

        match self.api.delete(&paths::labeled_devworkspaces(namespace)).await {
            Ok(response) if response.status == 200 => {}
            Ok(response) => {
                self.logger
                    .log_cleanup_failure("DevWorkspaceCollection", namespace, Some(response.status))
            }
            Err(e) => {
                warn!(error = %e, "Bulk DevWorkspace delete failed");
                self.logger
                    .log_cleanup_failure("DevWorkspaceCollection", namespace, None)
            }
        }
    }

    async fn delete_labeled_namespaces(&self) {
        info!("Deleting all labeled namespaces");

        let names = match self.list_labeled_namespaces().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to list labeled namespaces");
                self.logger.log_cleanup_failure("NamespaceList", "", e.status());
                return;
            }
        };

        for name in names {
            self.delete_resource("Namespace", &name, &paths::namespace(&name))
                .await;
        }
    }

    async fn list_labeled_namespaces(&self) -> Result<Vec<String>> {
        let response = self.api.get(&paths::labeled_namespaces()).await?;
        if response.status != 200 {
            return Err(response.into_error());
        }
        let list: NamespaceList = response.json()?;
        Ok(list.items.into_iter().map(|item| item.metadata.name).collect())
    }

    async fn delete_resource(&self, kind: &str, name: &str, path: &str) {
        match self.api.delete(path).await {
            Ok(response) if response.status_in(DELETE_OK) => {
                debug!(kind = %kind, name = %name, "Deleted");
            }
            Ok(response) => self
                .logger
                .log_cleanup_failure(kind, name, Some(response.status)),
            Err(e) => {
                warn!(kind = %kind, name = %name, error = %e, "Delete request failed");
                self.logger.log_cleanup_failure(kind, name, None)
            }
        }
    }

    /// Setup, ramp and cleanup in order
    pub async fn run(self: Arc<Self>, executor: &RampingExecutor) -> ExecutorReport {
        self.run_until(executor, pending()).await
    }

    /// Like [`RunCoordinator::run`], but `stop` ends the ramp early
    ///
    /// Cleanup only starts once every VU has stopped, so nothing is created
    /// after the label-selector delete.
    pub async fn run_until<S>(self: Arc<Self>, executor: &RampingExecutor, stop: S) -> ExecutorReport
    where
        S: Future<Output = ()>,
    {
        self.setup().await;
        let report = executor.run_until(self.clone(), stop).await;
        if report.cancelled {
            warn!("Ramp stopped early, cleaning up");
        }
        self.final_cleanup().await;
        report
    }
}

#[async_trait]
impl VuWork for RunCoordinator {
    async fn iteration(&self, vu: u32, iteration: u64) {
        match self.run_iteration(vu, iteration).await {
            Ok(report) => {
                let failed = !report.terminal().is_some_and(|o| o.is_success());
                debug!(vu = vu, iteration = iteration, trail = ?report.trail, "Iteration finished");
                self.metrics.record_iteration(failed);
            }
            Err(e) => {
                self.logger
                    .log_iteration_failed(vu, iteration, &e.to_string());
                self.metrics.record_iteration(true);
            }
        }
    }
}
