//! Concurrency ramp profiles
//!
//! A profile is an ordered list of stages, each a fraction of the total run
//! and a fraction of peak concurrency. The standard profile ramps to 25%,
//! 50%, 75% and 100% of the VUs, backs off to 50% and drains to zero.

use crate::error::{LoadTestError, Result};
use std::time::Duration;

/// One segment of the run: reach `target` VUs over `duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampStage {
    pub duration: Duration,
    pub target: u32,
}

impl RampStage {
    pub fn duration_minutes(&self) -> u64 {
        self.duration.as_secs() / 60
    }
}

/// Stage definition relative to total duration and peak VUs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageShape {
    pub duration_fraction: f64,
    pub target_fraction: f64,
}

const fn shape(duration_fraction: f64, target_fraction: f64) -> StageShape {
    StageShape {
        duration_fraction,
        target_fraction,
    }
}

/// The default six-stage profile
pub const STANDARD_PROFILE: [StageShape; 6] = [
    shape(0.25, 0.25),
    shape(0.25, 0.50),
    shape(0.20, 0.75),
    shape(0.15, 1.00),
    shape(0.10, 0.50),
    shape(0.05, 0.00),
];

/// Validated ramp profile
#[derive(Debug, Clone, PartialEq)]
pub struct RampProfile {
    shapes: Vec<StageShape>,
}

impl Default for RampProfile {
    fn default() -> Self {
        Self::standard()
    }
}

impl RampProfile {
    pub fn standard() -> Self {
        Self {
            shapes: STANDARD_PROFILE.to_vec(),
        }
    }

    /// Build a custom profile
    ///
    /// Duration fractions must sum to 1, target fractions must lie in
    /// [0, 1] and the last stage must drain to zero.
    pub fn new(shapes: Vec<StageShape>) -> Result<Self> {
        let Some(last) = shapes.last() else {
            return Err(LoadTestError::Config("ramp profile has no stages".into()));
        };
        if last.target_fraction != 0.0 {
            return Err(LoadTestError::Config(
                "ramp profile must end at zero VUs".into(),
            ));
        }

        let total: f64 = shapes.iter().map(|s| s.duration_fraction).sum();
        if (total - 1.0).abs() > 1e-9 {
            return Err(LoadTestError::Config(format!(
                "ramp stage durations sum to {} instead of 1",
                total
            )));
        }

        for s in &shapes {
            if !(0.0..=1.0).contains(&s.duration_fraction)
                || !(0.0..=1.0).contains(&s.target_fraction)
            {
                return Err(LoadTestError::Config(format!(
                    "ramp stage fractions out of range: {:?}",
                    s
                )));
            }
        }

        Ok(Self { shapes })
    }

    pub fn shapes(&self) -> &[StageShape] {
        &self.shapes
    }

    /// Turn the profile into concrete stages
    ///
    /// Each stage lasts `round(total * fraction)` minutes; rounding error is
    /// not redistributed. Targets are floored.
    pub fn build(&self, total_duration_minutes: u64, max_vus: u32) -> Vec<RampStage> {
        self.shapes
            .iter()
            .map(|s| {
                let minutes = (total_duration_minutes as f64 * s.duration_fraction).round() as u64;
                let target = (max_vus as f64 * s.target_fraction).floor() as u32;
                RampStage {
                    duration: Duration::from_secs(minutes * 60),
                    target,
                }
            })
            .collect()
    }
}

/// Stages of the standard profile
pub fn build_stages(total_duration_minutes: u64, max_vus: u32) -> Vec<RampStage> {
    RampProfile::standard().build(total_duration_minutes, max_vus)
}

/// Sum of stage durations
pub fn total_duration(stages: &[RampStage]) -> Duration {
    stages.iter().map(|s| s.duration).sum()
}
