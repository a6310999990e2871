//! Core data models for the load test

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Label key stamped on every resource the load test creates
pub const LOAD_TEST_LABEL_KEY: &str = "load-test";

/// Label value paired with [`LOAD_TEST_LABEL_KEY`]
pub const LOAD_TEST_LABEL_VALUE: &str = "test-type";

/// URL-encoded label selector matching every load test resource
pub fn load_test_label_selector() -> String {
    format!("{}%3D{}", LOAD_TEST_LABEL_KEY, LOAD_TEST_LABEL_VALUE)
}

/// Identity of one DevWorkspace created by one VU iteration
///
/// VU ids and per-VU iteration counters are unique for the run, so no two
/// concurrent workers ever compute the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub vu: u32,
    pub iteration: u64,
    pub name: String,
    pub namespace: String,
}

impl ResourceIdentity {
    /// Identity in the shared load test namespace
    pub fn shared(vu: u32, iteration: u64, namespace: impl Into<String>) -> Self {
        Self {
            vu,
            iteration,
            name: workspace_name(vu, iteration),
            namespace: namespace.into(),
        }
    }

    /// Identity in a dedicated namespace owned by this iteration
    pub fn isolated(vu: u32, iteration: u64) -> Self {
        Self {
            vu,
            iteration,
            name: workspace_name(vu, iteration),
            namespace: format!("load-test-ns-{}-{}", vu, iteration),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

fn workspace_name(vu: u32, iteration: u64) -> String {
    format!("dw-test-{}-{}", vu, iteration)
}

/// Lifecycle transitions recorded for one worker iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleOutcome {
    /// Creation returned 201 or 409
    Created,
    /// Creation returned any other status or never got a response
    CreateFailed,
    /// The workspace reported a Ready or Running phase
    ReadyObserved,
    /// The attempt budget ran out before a terminal phase
    ReadyTimedOut,
    /// The workspace reported a Failing, Failed or Error phase
    ReadyFailedPhase,
    /// Deletion returned 200 or 404
    Deleted,
    /// Deletion returned any other status or never got a response
    DeleteFailed,
}

impl LifecycleOutcome {
    /// Whether the iteration ended on the success path
    pub fn is_success(&self) -> bool {
        matches!(self, LifecycleOutcome::Deleted)
    }
}

/// Ordered record of what happened during one lifecycle cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub identity: ResourceIdentity,
    pub trail: Vec<LifecycleOutcome>,
}

impl CycleReport {
    pub fn new(identity: ResourceIdentity) -> Self {
        Self {
            identity,
            trail: Vec::with_capacity(3),
        }
    }

    pub fn record(&mut self, outcome: LifecycleOutcome) {
        self.trail.push(outcome);
    }

    /// Last recorded transition
    pub fn terminal(&self) -> Option<LifecycleOutcome> {
        self.trail.last().copied()
    }

    /// Readiness transition, if polling was reached
    pub fn readiness(&self) -> Option<LifecycleOutcome> {
        self.trail.iter().copied().find(|o| {
            matches!(
                o,
                LifecycleOutcome::ReadyObserved
                    | LifecycleOutcome::ReadyTimedOut
                    | LifecycleOutcome::ReadyFailedPhase
            )
        })
    }

    /// Whether a DELETE was issued during this cycle
    pub fn delete_attempted(&self) -> bool {
        self.trail.iter().any(|o| {
            matches!(
                o,
                LifecycleOutcome::Deleted | LifecycleOutcome::DeleteFailed
            )
        })
    }
}

/// Terminal state of the readiness poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready { elapsed: Duration, attempts: u32 },
    Failed { phase: String, attempts: u32 },
    TimedOut { attempts: u32 },
}

impl ReadinessOutcome {
    pub fn as_lifecycle(&self) -> LifecycleOutcome {
        match self {
            ReadinessOutcome::Ready { .. } => LifecycleOutcome::ReadyObserved,
            ReadinessOutcome::Failed { .. } => LifecycleOutcome::ReadyFailedPhase,
            ReadinessOutcome::TimedOut { .. } => LifecycleOutcome::ReadyTimedOut,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ReadinessOutcome::Ready { attempts, .. }
            | ReadinessOutcome::Failed { attempts, .. }
            | ReadinessOutcome::TimedOut { attempts } => *attempts,
        }
    }
}

/// Static resource limits for the controller pods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceThresholds {
    pub max_cpu_millicores: u64,
    pub max_memory_bytes: u64,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            max_cpu_millicores: 250,
            max_memory_bytes: 200 * 1024 * 1024,
        }
    }
}

/// One converted usage sample for a controller pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodUsageSample {
    pub pod_name: String,
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
    pub cpu_violation: bool,
    pub memory_violation: bool,
}
