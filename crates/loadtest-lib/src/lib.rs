//! DevWorkspace load testing library
//!
//! This crate provides the core functionality for:
//! - Driving DevWorkspace create/poll/delete cycles against an API server
//! - Sampling controller resource usage while workspaces start
//! - Ramping virtual users through a staged concurrency profile
//! - Summarising the run and evaluating thresholds

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod exposition;
pub mod lifecycle;
pub mod manifest;
pub mod models;
pub mod observability;
pub mod poller;
pub mod quantity;
pub mod ramp;
pub mod sampler;
pub mod summary;

#[cfg(test)]
mod testing;

pub use client::{ApiResponse, HttpKubeClient, KubeApi};
pub use config::LoadTestConfig;
pub use coordinator::{CoordinatorConfig, RunCoordinator};
pub use error::{LoadTestError, Result};
pub use executor::{ExecutorConfig, ExecutorReport, RampingExecutor, VuWork};
pub use models::*;
pub use observability::{LoadTestMetrics, StructuredLogger};
pub use ramp::{build_stages, RampStage};
pub use summary::{default_thresholds, RunSummary, THRESHOLD_FAILED_EXIT_CODE};
