//! CLI command implementations

pub mod cleanup;
pub mod run;
pub mod stages;

use anyhow::{Context, Result};
use loadtest_lib::{
    lifecycle::LifecycleDriver,
    manifest::ManifestSource,
    poller::{ReadinessConfig, ReadinessPoller},
    sampler::{MetricsSampler, SamplerConfig},
    CoordinatorConfig, HttpKubeClient, KubeApi, LoadTestConfig, LoadTestMetrics, RunCoordinator,
    StructuredLogger,
};
use std::sync::Arc;
use tracing::info;

/// Everything a run needs, wired together from the environment
pub struct Harness {
    pub config: LoadTestConfig,
    pub endpoint: String,
    pub metrics: LoadTestMetrics,
    pub logger: StructuredLogger,
    pub coordinator: Arc<RunCoordinator>,
}

/// Load and validate configuration, then build every component
///
/// Configuration problems and an unreachable external manifest are fatal
/// here, before any worker starts.
pub async fn build_harness() -> Result<Harness> {
    let config = LoadTestConfig::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let endpoint = config.api_endpoint()?;
    let token = config.bearer_token()?;
    let client = Arc::new(
        HttpKubeClient::new(&endpoint, &token, config.insecure_skip_tls_verify)
            .context("Failed to build API client")?,
    );
    info!(api = %client.base_url(), "API client configured");

    let manifest = ManifestSource::resolve(config.devworkspace_link.as_deref(), &client)
        .await
        .context("Failed to load external DevWorkspace manifest")?;

    let api: Arc<dyn KubeApi> = client;
    let metrics = LoadTestMetrics::new();
    let logger = StructuredLogger::new(StructuredLogger::generate_run_id());

    let sampler = Arc::new(MetricsSampler::new(
        api.clone(),
        metrics.clone(),
        logger.clone(),
        SamplerConfig::new(config.dwo_namespace.clone(), config.thresholds()),
    ));
    let poller = ReadinessPoller::new(
        api.clone(),
        sampler,
        metrics.clone(),
        ReadinessConfig {
            timeout: config.readiness_timeout(),
            poll_interval: config.poll_interval(),
        },
    );
    let driver = LifecycleDriver::new(api.clone(), poller, metrics.clone(), Arc::new(manifest));
    let coordinator = Arc::new(RunCoordinator::new(
        api,
        driver,
        metrics.clone(),
        logger.clone(),
        CoordinatorConfig::from(&config),
    ));

    Ok(Harness {
        config,
        endpoint,
        metrics,
        logger,
        coordinator,
    })
}
