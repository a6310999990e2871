//! DevWorkspace lifecycle driver
//!
//! One cycle is create -> poll until ready/failed/timeout -> delete, strictly
//! in that order. Creation accepts 201 and 409 so an at-least-once retry by
//! the network stack never fails the worker. Deletion accepts 200 and 404,
//! and is only attempted once creation succeeded.

use crate::client::{paths, KubeApi};
use crate::manifest::ManifestSource;
use crate::models::{CycleReport, LifecycleOutcome, ResourceIdentity};
use crate::observability::{CounterMetric, LoadTestMetrics, TrendMetric};
use crate::poller::ReadinessPoller;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Statuses that count as a successful create
pub const CREATE_OK: &[u16] = &[201, 409];

/// Statuses that count as a successful delete
pub const DELETE_OK: &[u16] = &[200, 404];

/// Runs full create/poll/delete cycles for workers
pub struct LifecycleDriver {
    api: Arc<dyn KubeApi>,
    poller: ReadinessPoller,
    metrics: LoadTestMetrics,
    manifest: Arc<ManifestSource>,
}

impl LifecycleDriver {
    pub fn new(
        api: Arc<dyn KubeApi>,
        poller: ReadinessPoller,
        metrics: LoadTestMetrics,
        manifest: Arc<ManifestSource>,
    ) -> Self {
        Self {
            api,
            poller,
            metrics,
            manifest,
        }
    }

    /// Run one cycle for `identity` and report every transition taken
    pub async fn run_cycle(&self, identity: &ResourceIdentity) -> CycleReport {
        let mut report = CycleReport::new(identity.clone());

        if !self.create(identity).await {
            report.record(LifecycleOutcome::CreateFailed);
            return report;
        }
        report.record(LifecycleOutcome::Created);

        let readiness = self.poller.wait_until_ready(identity).await;
        debug!(workspace = %identity, outcome = ?readiness, "Readiness polling finished");
        report.record(readiness.as_lifecycle());

        report.record(self.delete(identity).await);
        report
    }

    async fn create(&self, identity: &ResourceIdentity) -> bool {
        let manifest = self.manifest.render(identity);
        let start = Instant::now();

        let response = match self
            .api
            .post(&paths::devworkspaces(&identity.namespace), &manifest)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.metrics.check("DevWorkspace created", false);
                error!(vu = identity.vu, workspace = %identity, error = %e, "Failed to create DevWorkspace");
                return false;
            }
        };

        let created = self
            .metrics
            .check("DevWorkspace created", response.status_in(CREATE_OK));
        if !created {
            error!(
                vu = identity.vu,
                workspace = %identity,
                status = response.status,
                body = %response.body,
                "Failed to create DevWorkspace"
            );
            return false;
        }

        self.metrics.observe(
            TrendMetric::CreateDuration,
            start.elapsed().as_secs_f64() * 1000.0,
        );
        self.metrics.inc(CounterMetric::CreateCount);
        true
    }

    async fn delete(&self, identity: &ResourceIdentity) -> LifecycleOutcome {
        let start = Instant::now();
        let result = self
            .api
            .delete(&paths::devworkspace(&identity.namespace, &identity.name))
            .await;

        match result {
            Ok(response) => {
                self.metrics.observe(
                    TrendMetric::DeleteDuration,
                    start.elapsed().as_secs_f64() * 1000.0,
                );
                let deleted = self.metrics.check(
                    "DevWorkspace deleted or not found",
                    response.status_in(DELETE_OK),
                );
                if deleted {
                    LifecycleOutcome::Deleted
                } else {
                    warn!(workspace = %identity, status = response.status, "Failed to delete DevWorkspace");
                    LifecycleOutcome::DeleteFailed
                }
            }
            Err(e) => {
                self.metrics.check("DevWorkspace deleted or not found", false);
                warn!(workspace = %identity, error = %e, "Failed to delete DevWorkspace");
                LifecycleOutcome::DeleteFailed
            }
        }
    }
}
