//! End-of-run summary and threshold evaluation
//!
//! The summary is a snapshot of the run's observation sinks filtered to
//! the published metric set. Thresholds are evaluated against it once, and
//! their verdict decides the process exit code.

use crate::executor::ExecutorReport;
use crate::observability::{CounterMetric, LoadTestMetrics, TrendMetric};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Exit code when at least one threshold failed
pub const THRESHOLD_FAILED_EXIT_CODE: i32 = 99;

/// Name under which the check tally is reported
pub const CHECKS_METRIC: &str = "checks";

/// Distribution statistics of one trend
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendStats {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
}

impl TrendStats {
    /// Compute statistics from raw samples; empty input yields zeros
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Self {
            count: sorted.len(),
            avg: sorted.iter().sum::<f64>() / sorted.len() as f64,
            min: sorted[0],
            med: percentile(&sorted, 50.0),
            max: sorted[sorted.len() - 1],
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
        }
    }
}

/// Linear-interpolated percentile of sorted samples
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}

/// Which value of a metric a threshold inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    Rate,
    P95,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Less,
    Greater,
    Equal,
}

impl Comparison {
    fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Less => observed < bound,
            Comparison::Greater => observed > bound,
            Comparison::Equal => observed == bound,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Less => "<",
            Comparison::Greater => ">",
            Comparison::Equal => "==",
        }
    }
}

/// A pass/fail predicate on one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: String,
    pub aggregate: Aggregate,
    pub comparison: Comparison,
    pub bound: f64,
}

impl Threshold {
    pub fn new(metric: impl Into<String>, aggregate: Aggregate, comparison: Comparison, bound: f64) -> Self {
        Self {
            metric: metric.into(),
            aggregate,
            comparison,
            bound,
        }
    }

    /// Expression in the usual `p(95)<15000` notation
    pub fn expression(&self) -> String {
        let aggregate = match self.aggregate {
            Aggregate::Rate => "rate",
            Aggregate::P95 => "p(95)",
            Aggregate::Count => "count",
        };
        format!("{}{}{}", aggregate, self.comparison.symbol(), self.bound)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.expression())
    }
}

/// Thresholds every run is held to
pub fn default_thresholds() -> Vec<Threshold> {
    vec![
        Threshold::new(CHECKS_METRIC, Aggregate::Rate, Comparison::Greater, 0.95),
        Threshold::new(
            TrendMetric::CreateDuration.name(),
            Aggregate::P95,
            Comparison::Less,
            15000.0,
        ),
        Threshold::new(
            TrendMetric::DeleteDuration.name(),
            Aggregate::P95,
            Comparison::Less,
            10000.0,
        ),
        Threshold::new(
            TrendMetric::ReadyDuration.name(),
            Aggregate::P95,
            Comparison::Less,
            60000.0,
        ),
        Threshold::new(
            CounterMetric::ReadyFailed.name(),
            Aggregate::Count,
            Comparison::Less,
            5.0,
        ),
        Threshold::new(
            CounterMetric::CpuViolations.name(),
            Aggregate::Count,
            Comparison::Equal,
            0.0,
        ),
        Threshold::new(
            CounterMetric::MemoryViolations.name(),
            Aggregate::Count,
            Comparison::Equal,
            0.0,
        ),
    ]
}

/// Outcome of one threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckTally {
    pub passed: u64,
    pub failed: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationTally {
    pub completed: u64,
    pub failed: u64,
    pub peak_vus: u32,
    pub interrupted_vus: u32,
    pub cancelled: bool,
}

/// Snapshot of a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub trends: BTreeMap<String, TrendStats>,
    pub counters: BTreeMap<String, u64>,
    pub checks: CheckTally,
    pub iterations: IterationTally,
    pub thresholds: Vec<ThresholdResult>,
}

impl RunSummary {
    /// Snapshot the sinks and evaluate `thresholds` against them
    pub fn collect(run_id: &str, metrics: &LoadTestMetrics, thresholds: &[Threshold]) -> Self {
        let trends = TrendMetric::ALL
            .iter()
            .map(|m| {
                (
                    m.name().to_string(),
                    TrendStats::from_samples(&metrics.trend_values(*m)),
                )
            })
            .collect();

        let counters = CounterMetric::ALL
            .iter()
            .map(|m| (m.name().to_string(), metrics.counter_value(*m)))
            .collect();

        let (passed, failed) = metrics.checks();
        let total = passed + failed;
        let checks = CheckTally {
            passed,
            failed,
            rate: if total == 0 {
                0.0
            } else {
                passed as f64 / total as f64
            },
        };

        let (completed, failed_iterations) = metrics.iterations();

        let mut summary = Self {
            run_id: run_id.to_string(),
            generated_at: chrono::Utc::now(),
            trends,
            counters,
            checks,
            iterations: IterationTally {
                completed,
                failed: failed_iterations,
                ..Default::default()
            },
            thresholds: Vec::new(),
        };
        summary.thresholds = thresholds.iter().map(|t| summary.evaluate(t)).collect();
        summary
    }

    /// Attach what the executor observed
    pub fn with_executor(mut self, report: &ExecutorReport) -> Self {
        self.iterations.peak_vus = report.peak_vus;
        self.iterations.interrupted_vus = report.interrupted;
        self.iterations.cancelled = report.cancelled;
        self
    }

    fn observed(&self, threshold: &Threshold) -> Option<f64> {
        match threshold.aggregate {
            Aggregate::Rate if threshold.metric == CHECKS_METRIC => Some(self.checks.rate),
            Aggregate::Rate => None,
            Aggregate::P95 => self.trends.get(&threshold.metric).map(|s| s.p95),
            Aggregate::Count => self.counters.get(&threshold.metric).map(|c| *c as f64),
        }
    }

    /// Evaluate one threshold; unknown metrics fail
    pub fn evaluate(&self, threshold: &Threshold) -> ThresholdResult {
        let observed = self.observed(threshold);
        ThresholdResult {
            metric: threshold.metric.clone(),
            expression: threshold.expression(),
            observed,
            passed: observed.is_some_and(|v| threshold.comparison.holds(v, threshold.bound)),
        }
    }

    /// Whether every threshold passed
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.thresholds.iter().filter(|t| !t.passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            THRESHOLD_FAILED_EXIT_CODE
        }
    }

    /// Write the summary as pretty JSON
    pub fn write_report(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create report file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush report to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_trend_stats() {
        let stats = TrendStats::from_samples(&[40.0, 10.0, 30.0, 20.0, 50.0]);
        assert_eq!(stats.count, 5);
        assert!(approx(stats.avg, 30.0));
        assert!(approx(stats.min, 10.0));
        assert!(approx(stats.med, 30.0));
        assert!(approx(stats.max, 50.0));
        assert!(approx(stats.p90, 46.0));
        assert!(approx(stats.p95, 48.0));
    }

    #[test]
    fn test_percentile_edges() {
        assert_eq!(percentile(&[], 95.0), 0.0);
        assert_eq!(percentile(&[7.0], 95.0), 7.0);
        assert!(approx(percentile(&[1.0, 2.0], 50.0), 1.5));
        assert_eq!(TrendStats::from_samples(&[]), TrendStats::default());
    }

    #[test]
    fn test_threshold_expressions() {
        let expressions: Vec<String> = default_thresholds().iter().map(|t| t.to_string()).collect();
        assert_eq!(
            expressions,
            vec![
                "checks: rate>0.95",
                "devworkspace_create_duration: p(95)<15000",
                "devworkspace_delete_duration: p(95)<10000",
                "devworkspace_ready_duration: p(95)<60000",
                "devworkspace_ready_failed: count<5",
                "operator_cpu_violations: count==0",
                "operator_mem_violations: count==0",
            ]
        );
    }

    #[test]
    fn test_healthy_run_passes() {
        let metrics = LoadTestMetrics::new();
        for _ in 0..20 {
            metrics.check("DevWorkspace created", true);
            metrics.observe(TrendMetric::CreateDuration, 120.0);
            metrics.observe(TrendMetric::DeleteDuration, 80.0);
            metrics.observe(TrendMetric::ReadyDuration, 20000.0);
            metrics.inc(CounterMetric::CreateCount);
        }
        metrics.record_iteration(false);

        let summary = RunSummary::collect("run-1", &metrics, &default_thresholds())
            .with_executor(&ExecutorReport {
                iterations: 1,
                peak_vus: 4,
                interrupted: 0,
                cancelled: false,
            });

        assert!(summary.passed());
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.counters["devworkspace_create_count"], 20);
        assert_eq!(summary.trends.len(), 5);
        assert_eq!(summary.iterations.peak_vus, 4);
        assert!(approx(summary.checks.rate, 1.0));
    }

    #[test]
    fn test_violation_fails_run() {
        let metrics = LoadTestMetrics::new();
        metrics.check("DevWorkspace created", true);
        metrics.inc(CounterMetric::CpuViolations);

        let summary = RunSummary::collect("run-2", &metrics, &default_thresholds());

        assert!(!summary.passed());
        assert_eq!(summary.exit_code(), THRESHOLD_FAILED_EXIT_CODE);
        let failed: Vec<&str> = summary.failed_thresholds().map(|t| t.metric.as_str()).collect();
        assert_eq!(failed, vec!["operator_cpu_violations"]);
    }

    #[test]
    fn test_slow_ready_and_low_check_rate_fail() {
        let metrics = LoadTestMetrics::new();
        metrics.observe(TrendMetric::ReadyDuration, 90000.0);
        metrics.check("DevWorkspace created", true);
        metrics.check("DevWorkspace created", false);
        for _ in 0..5 {
            metrics.inc(CounterMetric::ReadyFailed);
        }

        let summary = RunSummary::collect("run-3", &metrics, &default_thresholds());
        let mut failed: Vec<&str> = summary.failed_thresholds().map(|t| t.metric.as_str()).collect();
        failed.sort();

        assert_eq!(
            failed,
            vec!["checks", "devworkspace_ready_duration", "devworkspace_ready_failed"]
        );
    }

    #[test]
    fn test_unknown_metric_fails() {
        let summary = RunSummary::collect("run-4", &LoadTestMetrics::new(), &[]);
        let result = summary.evaluate(&Threshold::new(
            "no_such_metric",
            Aggregate::Count,
            Comparison::Equal,
            0.0,
        ));
        assert_eq!(result.observed, None);
        assert!(!result.passed);
        assert!(summary.passed());
    }

    #[test]
    fn test_write_report() {
        let metrics = LoadTestMetrics::new();
        metrics.observe(TrendMetric::OperatorCpu, 42.0);
        let summary = RunSummary::collect("run-5", &metrics, &default_thresholds());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        summary.write_report(&path).unwrap();

        let written: RunSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.run_id, "run-5");
        assert_eq!(written.trends["average_operator_cpu"].max, 42.0);
        assert_eq!(written.thresholds.len(), 7);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_report_surfaces_buffered_write_errors() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        // Small enough to sit in the write buffer until flushed
        let summary = RunSummary::collect("run-7", &LoadTestMetrics::new(), &[]);
        assert!(summary.write_report(full).is_err());
    }

    #[test]
    fn test_write_report_to_missing_directory_fails() {
        let summary = RunSummary::collect("run-6", &LoadTestMetrics::new(), &[]);
        let dir = tempfile::tempdir().unwrap();
        assert!(summary
            .write_report(&dir.path().join("missing").join("report.json"))
            .is_err());
    }
}
