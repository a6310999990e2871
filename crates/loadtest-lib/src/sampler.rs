//! Controller resource sampling and threshold monitoring
//!
//! Every polling worker calls [`MetricsSampler::sample_and_check`] once per
//! poll cycle. Samples are not deduplicated across workers, so sampling
//! density grows with load. A failed metrics query skips the cycle and
//! never affects the calling worker.

use crate::client::{paths, KubeApi};
use crate::error::{LoadTestError, Result};
use crate::models::{PodUsageSample, ResourceThresholds};
use crate::observability::{CounterMetric, LoadTestMetrics, StructuredLogger, TrendMetric};
use crate::quantity::{bytes_to_mib, parse_cpu, parse_memory};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Substring identifying controller pods in the operator namespace
pub const DEFAULT_CONTROLLER_NAME: &str = "devworkspace-controller";

/// Configuration for the metrics sampler
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Namespace the controller runs in
    pub operator_namespace: String,
    /// Pods whose name contains this are sampled
    pub controller_name: String,
    /// Static limits checked on every sample
    pub thresholds: ResourceThresholds,
}

impl SamplerConfig {
    pub fn new(operator_namespace: impl Into<String>, thresholds: ResourceThresholds) -> Self {
        Self {
            operator_namespace: operator_namespace.into(),
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            thresholds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PodMetricsList {
    #[serde(default)]
    items: Vec<PodMetrics>,
}

#[derive(Debug, Deserialize)]
struct PodMetrics {
    metadata: PodMetadata,
    #[serde(default)]
    containers: Vec<ContainerUsage>,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ContainerUsage {
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    cpu: String,
    memory: String,
}

/// Samples controller CPU and memory through the metrics API
pub struct MetricsSampler {
    api: Arc<dyn KubeApi>,
    metrics: LoadTestMetrics,
    logger: StructuredLogger,
    config: SamplerConfig,
}

impl MetricsSampler {
    pub fn new(
        api: Arc<dyn KubeApi>,
        metrics: LoadTestMetrics,
        logger: StructuredLogger,
        config: SamplerConfig,
    ) -> Self {
        Self {
            api,
            metrics,
            logger,
            config,
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Take one sample of every controller pod and record it
    ///
    /// Returns the accepted samples; an empty list when the cycle was
    /// skipped because the metrics API was unavailable.
    pub async fn sample_and_check(&self) -> Vec<PodUsageSample> {
        match self.fetch().await {
            Ok(list) => self.record(list),
            Err(e) => {
                warn!(
                    namespace = %self.config.operator_namespace,
                    error = %e,
                    "Unable to fetch DevWorkspace Operator metrics, skipping sample"
                );
                Vec::new()
            }
        }
    }

    async fn fetch(&self) -> Result<PodMetricsList> {
        let response = match self
            .api
            .get(&paths::pod_metrics(&self.config.operator_namespace))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.metrics.check("Fetched pod metrics successfully", false);
                return Err(e);
            }
        };

        let fetched = self
            .metrics
            .check("Fetched pod metrics successfully", response.status == 200);
        if !fetched {
            return Err(response.into_error());
        }

        response.json()
    }

    fn record(&self, list: PodMetricsList) -> Vec<PodUsageSample> {
        let thresholds = self.config.thresholds;
        let mut samples = Vec::new();

        for pod in list
            .items
            .into_iter()
            .filter(|p| p.metadata.name.contains(&self.config.controller_name))
        {
            // Controller pods run a single container
            let Some(container) = pod.containers.first() else {
                debug!(pod = %pod.metadata.name, "Controller pod reported no containers");
                continue;
            };

            let (cpu_millicores, memory_bytes) = match convert(&container.usage) {
                Ok(converted) => converted,
                Err(e) => {
                    warn!(pod = %pod.metadata.name, error = %e, "Skipping unparseable usage sample");
                    continue;
                }
            };

            self.metrics
                .observe(TrendMetric::OperatorCpu, cpu_millicores as f64);
            self.metrics
                .observe(TrendMetric::OperatorMemory, bytes_to_mib(memory_bytes));

            let cpu_violation = cpu_millicores > thresholds.max_cpu_millicores;
            let memory_violation = memory_bytes > thresholds.max_memory_bytes;

            if cpu_violation {
                self.metrics.inc(CounterMetric::CpuViolations);
                self.logger.log_resource_violation(
                    &pod.metadata.name,
                    "cpu_millicores",
                    cpu_millicores,
                    thresholds.max_cpu_millicores,
                );
            }
            if memory_violation {
                self.metrics.inc(CounterMetric::MemoryViolations);
                self.logger.log_resource_violation(
                    &pod.metadata.name,
                    "memory_bytes",
                    memory_bytes,
                    thresholds.max_memory_bytes,
                );
            }

            self.metrics.check(
                &format!(
                    "[{}] CPU < {}m",
                    pod.metadata.name, thresholds.max_cpu_millicores
                ),
                !cpu_violation,
            );
            self.metrics.check(
                &format!(
                    "[{}] Memory < {}Mi",
                    pod.metadata.name,
                    bytes_to_mib(thresholds.max_memory_bytes).round()
                ),
                !memory_violation,
            );

            samples.push(PodUsageSample {
                pod_name: pod.metadata.name,
                cpu_millicores,
                memory_bytes,
                cpu_violation,
                memory_violation,
            });
        }

        samples
    }
}

fn convert(usage: &Usage) -> std::result::Result<(u64, u64), LoadTestError> {
    Ok((parse_cpu(&usage.cpu)?, parse_memory(&usage.memory)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiResponse;
    use crate::testing::ScriptedApi;
    use serde_json::json;

    const METRICS_PATH: &str = "/apis/metrics.k8s.io/v1beta1/namespaces/openshift-operators/pods";

    fn sampler(api: Arc<ScriptedApi>, metrics: LoadTestMetrics) -> MetricsSampler {
        MetricsSampler::new(
            api,
            metrics,
            StructuredLogger::new("run-test"),
            SamplerConfig::new("openshift-operators", ResourceThresholds::default()),
        )
    }

    fn pod(name: &str, cpu: &str, memory: &str) -> serde_json::Value {
        json!({
            "metadata": {"name": name},
            "containers": [{"name": "manager", "usage": {"cpu": cpu, "memory": memory}}]
        })
    }

    #[tokio::test]
    async fn test_samples_only_controller_pods() {
        let api = Arc::new(ScriptedApi::new());
        api.script_get(
            METRICS_PATH,
            vec![ApiResponse::new(
                200,
                json!({"items": [
                    pod("devworkspace-controller-manager-7d9f", "12500000n", "64Mi"),
                    pod("devworkspace-webhook-server-1a2b", "900m", "1Gi"),
                ]})
                .to_string(),
            )],
        );
        let metrics = LoadTestMetrics::new();

        let samples = sampler(api, metrics.clone()).sample_and_check().await;

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].cpu_millicores, 13);
        assert_eq!(samples[0].memory_bytes, 67_108_864);
        assert_eq!(metrics.trend_values(TrendMetric::OperatorCpu), vec![13.0]);
        assert_eq!(metrics.trend_values(TrendMetric::OperatorMemory), vec![64.0]);
        assert_eq!(metrics.counter_value(CounterMetric::CpuViolations), 0);
        assert_eq!(metrics.checks(), (3, 0));
    }

    #[tokio::test]
    async fn test_violations_counted_independently() {
        let api = Arc::new(ScriptedApi::new());
        api.script_get(
            METRICS_PATH,
            vec![ApiResponse::new(
                200,
                json!({"items": [
                    pod("devworkspace-controller-manager-a", "300m", "100Mi"),
                    pod("devworkspace-controller-manager-b", "100m", "300Mi"),
                    pod("devworkspace-controller-manager-c", "251m", "201Mi"),
                ]})
                .to_string(),
            )],
        );
        let metrics = LoadTestMetrics::new();

        let samples = sampler(api, metrics.clone()).sample_and_check().await;

        assert_eq!(samples.len(), 3);
        assert_eq!(metrics.counter_value(CounterMetric::CpuViolations), 2);
        assert_eq!(metrics.counter_value(CounterMetric::MemoryViolations), 2);
        assert!(samples[0].cpu_violation && !samples[0].memory_violation);
        assert!(!samples[1].cpu_violation && samples[1].memory_violation);
    }

    #[tokio::test]
    async fn test_limit_itself_is_not_a_violation() {
        let api = Arc::new(ScriptedApi::new());
        api.script_get(
            METRICS_PATH,
            vec![ApiResponse::new(
                200,
                json!({"items": [pod("devworkspace-controller-manager-a", "250m", "200Mi")]})
                    .to_string(),
            )],
        );
        let metrics = LoadTestMetrics::new();

        sampler(api, metrics.clone()).sample_and_check().await;

        assert_eq!(metrics.counter_value(CounterMetric::CpuViolations), 0);
        assert_eq!(metrics.counter_value(CounterMetric::MemoryViolations), 0);
    }

    #[tokio::test]
    async fn test_failed_query_skips_cycle() {
        let api = Arc::new(ScriptedApi::new());
        api.script_get(METRICS_PATH, vec![ApiResponse::new(503, "unavailable")]);
        let metrics = LoadTestMetrics::new();

        let samples = sampler(api, metrics.clone()).sample_and_check().await;

        assert!(samples.is_empty());
        assert!(metrics.trend_values(TrendMetric::OperatorCpu).is_empty());
        assert_eq!(metrics.checks(), (0, 1));
    }

    #[tokio::test]
    async fn test_unreachable_metrics_api_fails_check() {
        let api = Arc::new(ScriptedApi::new());
        api.fail("GET", METRICS_PATH);
        let metrics = LoadTestMetrics::new();

        let samples = sampler(api, metrics.clone()).sample_and_check().await;

        assert!(samples.is_empty());
        assert_eq!(metrics.checks(), (0, 1));
    }

    #[tokio::test]
    async fn test_malformed_body_and_bad_quantities_are_absorbed() {
        let api = Arc::new(ScriptedApi::new());
        api.script_get(
            METRICS_PATH,
            vec![
                ApiResponse::new(200, "not json"),
                ApiResponse::new(
                    200,
                    json!({"items": [
                        pod("devworkspace-controller-manager-a", "lots", "64Mi"),
                        {"metadata": {"name": "devworkspace-controller-manager-b"}, "containers": []},
                        pod("devworkspace-controller-manager-c", "10m", "32Mi"),
                    ]})
                    .to_string(),
                ),
            ],
        );
        let metrics = LoadTestMetrics::new();
        let sampler = sampler(api, metrics.clone());

        assert!(sampler.sample_and_check().await.is_empty());

        let samples = sampler.sample_and_check().await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].pod_name, "devworkspace-controller-manager-c");
    }
}
