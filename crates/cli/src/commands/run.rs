//! The `run` command

use anyhow::Result;
use loadtest_lib::{
    build_stages, default_thresholds, exposition, ExecutorConfig, RampingExecutor, RunSummary,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, warn};

use super::build_harness;
use crate::output::{print_info, print_success, print_summary, OutputFormat};

/// Run the full load test and return the process exit code
pub async fn run_load_test(
    report: Option<PathBuf>,
    metrics_port: Option<u16>,
    format: OutputFormat,
) -> Result<i32> {
    let harness = build_harness().await?;
    let config = &harness.config;

    let stages = build_stages(config.test_duration_in_minutes, config.max_vus);
    let executor = RampingExecutor::new(
        stages,
        ExecutorConfig {
            tick: Duration::from_secs(1),
            graceful_ramp_down: config.graceful_ramp_down(),
        },
    );

    let exporter = metrics_port.map(|port| {
        let metrics = harness.metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = exposition::serve(port, metrics).await {
                error!(error = %e, "Metrics server stopped");
            }
        })
    });

    harness.logger.log_run_started(
        &harness.endpoint,
        config.max_vus,
        config.test_duration_in_minutes,
        config.separate_namespaces,
    );

    let stop = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        warn!("Interrupted, stopping workers");
    };
    let executor_report = harness
        .coordinator
        .clone()
        .run_until(&executor, stop)
        .await;

    let summary = RunSummary::collect(
        harness.logger.run_id(),
        &harness.metrics,
        &default_thresholds(),
    )
    .with_executor(&executor_report);

    if let Some(exporter) = exporter {
        exporter.abort();
    }

    harness.logger.log_run_finished(
        summary.passed(),
        summary.iterations.completed,
        summary.iterations.failed,
    );

    print_summary(&summary, format)?;

    if let Some(path) = report {
        summary.write_report(&path)?;
        if matches!(format, OutputFormat::Table) {
            print_success(&format!("Report written to {}", path.display()));
        }
    }

    if executor_report.cancelled {
        print_info("Run was interrupted before the ramp finished");
    }

    Ok(summary.exit_code())
}
