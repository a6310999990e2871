//! DevWorkspace readiness polling
//!
//! Implements the `Polling -> {Ready, Failed, TimedOut}` state machine:
//! - GET the workspace and read `status.phase`
//! - `Ready`/`Running` ends in Ready, `Failing`/`Failed`/`Error` in Failed
//! - anything else, a non-200 status or an unreadable body keeps polling
//! - between attempts, sample the controller and sleep for the poll interval
//!
//! The attempt budget is `timeout / poll_interval`, rounded up.

use crate::client::{paths, KubeApi};
use crate::error::LoadTestError;
use crate::models::{ReadinessOutcome, ResourceIdentity};
use crate::observability::{CounterMetric, LoadTestMetrics, TrendMetric};
use crate::sampler::MetricsSampler;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Readiness budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessConfig {
    /// Total time allowed to reach a terminal phase
    pub timeout: Duration,
    /// Pause between attempts
    pub poll_interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl ReadinessConfig {
    /// Number of GET attempts before giving up
    pub fn max_attempts(&self) -> u32 {
        let interval = self.poll_interval.as_millis().max(1);
        let attempts = self.timeout.as_millis().div_ceil(interval);
        u32::try_from(attempts).unwrap_or(u32::MAX)
    }
}

/// What one poll cycle decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    Continue,
    Ready,
    Failed(String),
}

/// Map a reported phase to a state transition
pub fn classify_phase(phase: Option<&str>) -> PollDecision {
    match phase {
        Some("Ready") | Some("Running") => PollDecision::Ready,
        Some(failed @ ("Failing" | "Failed" | "Error")) => PollDecision::Failed(failed.to_string()),
        _ => PollDecision::Continue,
    }
}

#[derive(Debug, Deserialize)]
struct WorkspaceEnvelope {
    #[serde(default)]
    status: Option<WorkspaceStatus>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceStatus {
    #[serde(default)]
    phase: Option<String>,
}

/// Polls one DevWorkspace until it is ready, failed or out of budget
pub struct ReadinessPoller {
    api: Arc<dyn KubeApi>,
    sampler: Arc<MetricsSampler>,
    metrics: LoadTestMetrics,
    config: ReadinessConfig,
}

impl ReadinessPoller {
    pub fn new(
        api: Arc<dyn KubeApi>,
        sampler: Arc<MetricsSampler>,
        metrics: LoadTestMetrics,
        config: ReadinessConfig,
    ) -> Self {
        Self {
            api,
            sampler,
            metrics,
            config,
        }
    }

    /// Poll until a terminal transition and record its observations
    ///
    /// Ready emits a ready-duration sample and bumps the ready counter.
    /// Failed and TimedOut only bump the ready-failed counter.
    pub async fn wait_until_ready(&self, identity: &ResourceIdentity) -> ReadinessOutcome {
        let path = paths::devworkspace(&identity.namespace, &identity.name);
        let max_attempts = self.config.max_attempts();
        let start = Instant::now();

        for attempt in 1..=max_attempts {
            match self.poll_once(identity, &path).await {
                PollDecision::Ready => {
                    let elapsed = start.elapsed();
                    self.metrics.inc(CounterMetric::Ready);
                    self.metrics
                        .observe(TrendMetric::ReadyDuration, elapsed.as_secs_f64() * 1000.0);
                    return ReadinessOutcome::Ready {
                        elapsed,
                        attempts: attempt,
                    };
                }
                PollDecision::Failed(phase) => {
                    self.metrics.inc(CounterMetric::ReadyFailed);
                    warn!(
                        vu = identity.vu,
                        iteration = identity.iteration,
                        workspace = %identity,
                        phase = %phase,
                        "DevWorkspace entered a failed phase"
                    );
                    return ReadinessOutcome::Failed {
                        phase,
                        attempts: attempt,
                    };
                }
                PollDecision::Continue => {}
            }

            self.sampler.sample_and_check().await;
            sleep(self.config.poll_interval).await;
        }

        self.metrics.inc(CounterMetric::ReadyFailed);
        let err = LoadTestError::Timeout {
            attempts: max_attempts,
        };
        warn!(
            vu = identity.vu,
            iteration = identity.iteration,
            workspace = %identity,
            error = %err,
            "DevWorkspace did not become ready in time"
        );
        ReadinessOutcome::TimedOut {
            attempts: max_attempts,
        }
    }

    async fn poll_once(&self, identity: &ResourceIdentity, path: &str) -> PollDecision {
        let response = match self.api.get(path).await {
            Ok(response) => response,
            Err(e) => {
                debug!(workspace = %identity, error = %e, "Readiness GET failed, retrying");
                return PollDecision::Continue;
            }
        };

        if response.status != 200 {
            debug!(workspace = %identity, status = response.status, "Readiness GET not OK, retrying");
            return PollDecision::Continue;
        }

        match response.json::<WorkspaceEnvelope>() {
            Ok(envelope) => {
                let phase = envelope.status.and_then(|s| s.phase);
                classify_phase(phase.as_deref())
            }
            Err(e) => {
                warn!(
                    vu = identity.vu,
                    workspace = %identity,
                    error = %e,
                    "Failed to parse DevWorkspace from API"
                );
                PollDecision::Continue
            }
        }
    }
}
