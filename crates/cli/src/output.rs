//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use loadtest_lib::summary::{RunSummary, TrendStats};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Row for the trends table
#[derive(Tabled)]
struct TrendRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Count")]
    count: usize,
    #[tabled(rename = "Avg")]
    avg: String,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Med")]
    med: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "p(90)")]
    p90: String,
    #[tabled(rename = "p(95)")]
    p95: String,
}

impl TrendRow {
    fn new(metric: &str, stats: &TrendStats) -> Self {
        let fmt: fn(f64) -> String = if metric.ends_with("_duration") {
            format_millis
        } else if metric.ends_with("_cpu") {
            format_millicores
        } else {
            format_mib
        };

        Self {
            metric: metric.to_string(),
            count: stats.count,
            avg: fmt(stats.avg),
            min: fmt(stats.min),
            med: fmt(stats.med),
            max: fmt(stats.max),
            p90: fmt(stats.p90),
            p95: fmt(stats.p95),
        }
    }
}

/// Row for the thresholds table
#[derive(Tabled)]
struct ThresholdRow {
    #[tabled(rename = "")]
    mark: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Threshold")]
    expression: String,
    #[tabled(rename = "Observed")]
    observed: String,
}

/// Print the end-of-run summary
pub fn print_summary(summary: &RunSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(summary)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!();
            println!("{}", "Load Test Summary".bold());
            println!("{}", "=".repeat(60));
            println!("Run:        {}", summary.run_id.cyan());
            println!(
                "Iterations: {} ({} failed)",
                summary.iterations.completed, summary.iterations.failed
            );
            println!("Peak VUs:   {}", summary.iterations.peak_vus);
            if summary.iterations.interrupted_vus > 0 {
                println!(
                    "Aborted:    {} VUs after graceful ramp-down",
                    summary.iterations.interrupted_vus.to_string().yellow()
                );
            }
            if summary.iterations.cancelled {
                println!("Stopped:    {}", "before the last stage ended".yellow());
            }
            println!(
                "Checks:     {} ({} passed, {} failed)",
                color_rate(summary.checks.rate),
                summary.checks.passed,
                summary.checks.failed
            );
            println!();

            let trends: Vec<TrendRow> = summary
                .trends
                .iter()
                .map(|(name, stats)| TrendRow::new(name, stats))
                .collect();
            println!("{}", Table::new(trends).with(Style::rounded()));
            println!();

            for (name, value) in &summary.counters {
                println!("{:<32} {}", name, value);
            }
            println!();

            let thresholds: Vec<ThresholdRow> = summary
                .thresholds
                .iter()
                .map(|t| ThresholdRow {
                    mark: if t.passed {
                        "✓".green().to_string()
                    } else {
                        "✗".red().to_string()
                    },
                    metric: t.metric.clone(),
                    expression: t.expression.clone(),
                    observed: t
                        .observed
                        .map(|v| format!("{:.2}", v))
                        .unwrap_or_else(|| "n/a".to_string()),
                })
                .collect();
            println!("{}", Table::new(thresholds).with(Style::rounded()));
            println!();

            if summary.passed() {
                print_success("All thresholds passed");
            } else {
                let failed = summary.failed_thresholds().count();
                println!(
                    "{} {} threshold(s) failed",
                    "✗".red().bold(),
                    failed.to_string().red()
                );
            }
        }
    }
    Ok(())
}

/// Format milliseconds the way durations are usually read
pub fn format_millis(ms: f64) -> String {
    if ms >= 60_000.0 {
        format!("{:.2}m", ms / 60_000.0)
    } else if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        format!("{:.2}ms", ms)
    }
}

/// Format millicores as human-readable string
pub fn format_millicores(millicores: f64) -> String {
    if millicores >= 1000.0 {
        format!("{:.2}", millicores / 1000.0)
    } else {
        format!("{:.0}m", millicores)
    }
}

/// Format MiB as human-readable string
pub fn format_mib(mib: f64) -> String {
    if mib >= 1024.0 {
        format!("{:.2}Gi", mib / 1024.0)
    } else {
        format!("{:.2}Mi", mib)
    }
}

/// Color the check rate based on value
pub fn color_rate(rate: f64) -> String {
    let formatted = format!("{:.2}%", rate * 100.0);
    if rate > 0.95 {
        formatted.green().to_string()
    } else if rate > 0.8 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(12.5), "12.50ms");
        assert_eq!(format_millis(1500.0), "1.50s");
        assert_eq!(format_millis(90_000.0), "1.50m");
    }

    #[test]
    fn test_format_millicores() {
        assert_eq!(format_millicores(250.0), "250m");
        assert_eq!(format_millicores(1500.0), "1.50");
    }

    #[test]
    fn test_format_mib() {
        assert_eq!(format_mib(200.0), "200.00Mi");
        assert_eq!(format_mib(2048.0), "2.00Gi");
    }

    #[test]
    fn test_trend_row_picks_unit_by_name() {
        let stats = TrendStats {
            count: 1,
            avg: 2000.0,
            min: 2000.0,
            med: 2000.0,
            max: 2000.0,
            p90: 2000.0,
            p95: 2000.0,
        };
        assert_eq!(TrendRow::new("devworkspace_ready_duration", &stats).p95, "2.00s");
        assert_eq!(TrendRow::new("average_operator_cpu", &stats).p95, "2.00");
        assert_eq!(TrendRow::new("average_operator_memory", &stats).p95, "1.95Gi");
    }
}
