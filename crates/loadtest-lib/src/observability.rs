//! Observability infrastructure for the load test
//!
//! Provides:
//! - Run-scoped observation sinks (latency trends, counters, check tallies)
//!   backed by a per-run Prometheus registry
//! - Structured logging of run events with tracing

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

/// Histogram buckets for API latencies (in milliseconds)
const LATENCY_BUCKETS_MS: &[f64] = &[
    10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 15000.0, 30000.0,
    60000.0, 120000.0, 300000.0,
];

/// Histogram buckets for controller CPU usage (in millicores)
const CPU_BUCKETS_MILLICORES: &[f64] = &[5.0, 10.0, 25.0, 50.0, 100.0, 150.0, 200.0, 250.0, 500.0, 1000.0];

/// Histogram buckets for controller memory usage (in MiB)
const MEMORY_BUCKETS_MIB: &[f64] = &[16.0, 32.0, 64.0, 128.0, 160.0, 200.0, 256.0, 512.0, 1024.0];

/// Latency and usage distributions collected during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrendMetric {
    CreateDuration,
    DeleteDuration,
    ReadyDuration,
    OperatorCpu,
    OperatorMemory,
}

impl TrendMetric {
    pub const ALL: [TrendMetric; 5] = [
        TrendMetric::CreateDuration,
        TrendMetric::DeleteDuration,
        TrendMetric::ReadyDuration,
        TrendMetric::OperatorCpu,
        TrendMetric::OperatorMemory,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TrendMetric::CreateDuration => "devworkspace_create_duration",
            TrendMetric::DeleteDuration => "devworkspace_delete_duration",
            TrendMetric::ReadyDuration => "devworkspace_ready_duration",
            TrendMetric::OperatorCpu => "average_operator_cpu",
            TrendMetric::OperatorMemory => "average_operator_memory",
        }
    }

    /// Whether values are durations in milliseconds
    pub fn is_duration(&self) -> bool {
        matches!(
            self,
            TrendMetric::CreateDuration | TrendMetric::DeleteDuration | TrendMetric::ReadyDuration
        )
    }
}

/// Monotonic counters collected during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterMetric {
    CreateCount,
    Ready,
    ReadyFailed,
    CpuViolations,
    MemoryViolations,
}

impl CounterMetric {
    pub const ALL: [CounterMetric; 5] = [
        CounterMetric::CreateCount,
        CounterMetric::Ready,
        CounterMetric::ReadyFailed,
        CounterMetric::CpuViolations,
        CounterMetric::MemoryViolations,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CounterMetric::CreateCount => "devworkspace_create_count",
            CounterMetric::Ready => "devworkspace_ready",
            CounterMetric::ReadyFailed => "devworkspace_ready_failed",
            CounterMetric::CpuViolations => "operator_cpu_violations",
            CounterMetric::MemoryViolations => "operator_mem_violations",
        }
    }
}

/// Append-only distribution: a Prometheus histogram for exposition plus
/// the raw samples for exact percentiles at the end of the run.
struct Trend {
    histogram: Histogram,
    samples: Mutex<Vec<f64>>,
}

impl Trend {
    fn new(registry: &Registry, metric: TrendMetric, help: &str, buckets: &[f64]) -> Self {
        let histogram = Histogram::with_opts(
            HistogramOpts::new(metric.name(), help).buckets(buckets.to_vec()),
        )
        .expect("Failed to create trend histogram");
        registry
            .register(Box::new(histogram.clone()))
            .expect("Failed to register trend histogram");

        Self {
            histogram,
            samples: Mutex::new(Vec::new()),
        }
    }

    fn add(&self, value: f64) {
        self.histogram.observe(value);
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
    }

    fn values(&self) -> Vec<f64> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn register_counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("Failed to create counter");
    registry
        .register(Box::new(counter.clone()))
        .expect("Failed to register counter");
    counter
}

struct MetricsInner {
    registry: Registry,
    create_duration: Trend,
    delete_duration: Trend,
    ready_duration: Trend,
    operator_cpu: Trend,
    operator_memory: Trend,
    create_count: IntCounter,
    ready: IntCounter,
    ready_failed: IntCounter,
    cpu_violations: IntCounter,
    memory_violations: IntCounter,
    checks_passed: IntCounter,
    checks_failed: IntCounter,
    iterations: IntCounter,
    iterations_failed: IntCounter,
}

/// Observation sinks shared by every component of one run
///
/// Cloning yields another handle to the same sinks. Every write is an
/// append or an atomic increment, so concurrent workers never lose updates.
#[derive(Clone)]
pub struct LoadTestMetrics {
    inner: Arc<MetricsInner>,
}

impl Default for LoadTestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadTestMetrics {
    /// Create a fresh set of sinks with its own registry
    pub fn new() -> Self {
        let registry = Registry::new();

        let inner = MetricsInner {
            create_duration: Trend::new(
                &registry,
                TrendMetric::CreateDuration,
                "Time spent creating DevWorkspaces in milliseconds",
                LATENCY_BUCKETS_MS,
            ),
            delete_duration: Trend::new(
                &registry,
                TrendMetric::DeleteDuration,
                "Time spent deleting DevWorkspaces in milliseconds",
                LATENCY_BUCKETS_MS,
            ),
            ready_duration: Trend::new(
                &registry,
                TrendMetric::ReadyDuration,
                "Time until a DevWorkspace reported Ready or Running in milliseconds",
                LATENCY_BUCKETS_MS,
            ),
            operator_cpu: Trend::new(
                &registry,
                TrendMetric::OperatorCpu,
                "Sampled controller CPU usage in millicores",
                CPU_BUCKETS_MILLICORES,
            ),
            operator_memory: Trend::new(
                &registry,
                TrendMetric::OperatorMemory,
                "Sampled controller memory usage in MiB",
                MEMORY_BUCKETS_MIB,
            ),
            create_count: register_counter(
                &registry,
                CounterMetric::CreateCount.name(),
                "DevWorkspaces accepted by the API server",
            ),
            ready: register_counter(
                &registry,
                CounterMetric::Ready.name(),
                "DevWorkspaces that reached a ready phase",
            ),
            ready_failed: register_counter(
                &registry,
                CounterMetric::ReadyFailed.name(),
                "DevWorkspaces that failed or timed out before ready",
            ),
            cpu_violations: register_counter(
                &registry,
                CounterMetric::CpuViolations.name(),
                "Controller samples above the CPU limit",
            ),
            memory_violations: register_counter(
                &registry,
                CounterMetric::MemoryViolations.name(),
                "Controller samples above the memory limit",
            ),
            checks_passed: register_counter(&registry, "checks_passed", "Checks that passed"),
            checks_failed: register_counter(&registry, "checks_failed", "Checks that failed"),
            iterations: register_counter(&registry, "iterations", "Completed VU iterations"),
            iterations_failed: register_counter(
                &registry,
                "iterations_failed",
                "VU iterations that ended with an error",
            ),
            registry,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    fn trend(&self, metric: TrendMetric) -> &Trend {
        match metric {
            TrendMetric::CreateDuration => &self.inner.create_duration,
            TrendMetric::DeleteDuration => &self.inner.delete_duration,
            TrendMetric::ReadyDuration => &self.inner.ready_duration,
            TrendMetric::OperatorCpu => &self.inner.operator_cpu,
            TrendMetric::OperatorMemory => &self.inner.operator_memory,
        }
    }

    fn counter(&self, metric: CounterMetric) -> &IntCounter {
        match metric {
            CounterMetric::CreateCount => &self.inner.create_count,
            CounterMetric::Ready => &self.inner.ready,
            CounterMetric::ReadyFailed => &self.inner.ready_failed,
            CounterMetric::CpuViolations => &self.inner.cpu_violations,
            CounterMetric::MemoryViolations => &self.inner.memory_violations,
        }
    }

    /// Append one observation to a trend
    pub fn observe(&self, metric: TrendMetric, value: f64) {
        self.trend(metric).add(value);
    }

    /// Increment a counter by one
    pub fn inc(&self, metric: CounterMetric) {
        self.counter(metric).inc();
    }

    /// Record the result of a named check
    pub fn check(&self, name: &str, passed: bool) -> bool {
        if passed {
            self.inner.checks_passed.inc();
        } else {
            self.inner.checks_failed.inc();
            tracing::debug!(check = %name, "Check failed");
        }
        passed
    }

    /// Record the end of one VU iteration
    pub fn record_iteration(&self, failed: bool) {
        self.inner.iterations.inc();
        if failed {
            self.inner.iterations_failed.inc();
        }
    }

    /// Snapshot of the raw samples of a trend
    pub fn trend_values(&self, metric: TrendMetric) -> Vec<f64> {
        self.trend(metric).values()
    }

    /// Current value of a counter
    pub fn counter_value(&self, metric: CounterMetric) -> u64 {
        self.counter(metric).get()
    }

    /// (passed, failed) check tallies
    pub fn checks(&self) -> (u64, u64) {
        (self.inner.checks_passed.get(), self.inner.checks_failed.get())
    }

    /// (completed, failed) iteration tallies
    pub fn iterations(&self) -> (u64, u64) {
        (self.inner.iterations.get(), self.inner.iterations_failed.get())
    }

    /// Render the run registry in the Prometheus text format
    pub fn encode_text(&self) -> anyhow::Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for run events
///
/// Every record carries the run id so logs from parallel runs against the
/// same cluster can be told apart.
#[derive(Clone)]
pub struct StructuredLogger {
    run_id: String,
}

impl StructuredLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    /// Run id derived from the current UTC time
    pub fn generate_run_id() -> String {
        format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ"))
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Log run startup
    pub fn log_run_started(
        &self,
        api_endpoint: &str,
        max_vus: u32,
        duration_minutes: u64,
        separate_namespaces: bool,
    ) {
        info!(
            event = "run_started",
            run_id = %self.run_id,
            api_endpoint = %api_endpoint,
            max_vus = max_vus,
            duration_minutes = duration_minutes,
            separate_namespaces = separate_namespaces,
            "Load test started"
        );
    }

    /// Log an iteration that ended with an error
    pub fn log_iteration_failed(&self, vu: u32, iteration: u64, error: &str) {
        error!(
            event = "iteration_failed",
            run_id = %self.run_id,
            vu = vu,
            iteration = iteration,
            error = %error,
            "Load test iteration failed"
        );
    }

    /// Log a controller sample above a static limit
    pub fn log_resource_violation(&self, pod_name: &str, resource: &str, observed: u64, limit: u64) {
        warn!(
            event = "resource_threshold_violation",
            run_id = %self.run_id,
            pod_name = %pod_name,
            resource = %resource,
            observed = observed,
            limit = limit,
            "Controller exceeded resource limit"
        );
    }

    /// Log a cleanup request that did not succeed
    pub fn log_cleanup_failure(&self, kind: &str, name: &str, status: Option<u16>) {
        warn!(
            event = "cleanup_failed",
            run_id = %self.run_id,
            kind = %kind,
            name = %name,
            status = ?status,
            "Cleanup request failed"
        );
    }

    /// Log the final verdict
    pub fn log_run_finished(&self, passed: bool, iterations: u64, failed_iterations: u64) {
        if passed {
            info!(
                event = "run_finished",
                run_id = %self.run_id,
                passed = true,
                iterations = iterations,
                failed_iterations = failed_iterations,
                "Load test finished, all thresholds passed"
            );
        } else {
            warn!(
                event = "run_finished",
                run_id = %self.run_id,
                passed = false,
                iterations = iterations,
                failed_iterations = failed_iterations,
                "Load test finished with threshold failures"
            );
        }
    }
}
