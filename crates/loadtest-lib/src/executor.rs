//! Ramping virtual-user executor
//!
//! Drives workers to follow a stage profile:
//! - starts at zero VUs and interpolates linearly towards each stage target
//! - re-evaluates the target on every control tick
//! - VUs above the target park after their current iteration and resume
//!   when the target grows again
//! - after the last stage, in-flight iterations get a graceful ramp-down
//!   window before they are aborted
//! - a stop signal, or dropping the run future, aborts every VU at once
//!
//! VU ids are 1-based and stable, and each VU counts its own iterations
//! from zero, so `(vu, iteration)` is unique for the whole run.

use crate::ramp::{total_duration, RampStage};
use async_trait::async_trait;
use std::future::{pending, Future};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Work performed by one VU iteration
#[async_trait]
pub trait VuWork: Send + Sync + 'static {
    async fn iteration(&self, vu: u32, iteration: u64);
}

/// Configuration for the ramping executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How often the VU target is re-evaluated
    pub tick: Duration,
    /// Time in-flight iterations may take to finish after the last stage
    pub graceful_ramp_down: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            graceful_ramp_down: Duration::from_secs(60),
        }
    }
}

/// What the executor did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorReport {
    /// Iterations that ran to completion
    pub iterations: u64,
    /// Highest number of active VUs
    pub peak_vus: u32,
    /// VUs aborted after the graceful ramp-down window or on stop
    pub interrupted: u32,
    /// Whether the run was stopped before the last stage ended
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VuSignal {
    active: u32,
    shutdown: bool,
}

/// VU task handles, aborted when dropped
#[derive(Default)]
struct VuPool {
    handles: Vec<JoinHandle<()>>,
}

impl VuPool {
    fn len(&self) -> u32 {
        self.handles.len() as u32
    }

    /// Abort every unfinished VU and wait until all have stopped
    async fn abort_all(&mut self) -> u32 {
        let mut interrupted = 0u32;
        for vu in self.handles.iter_mut() {
            if !vu.is_finished() {
                vu.abort();
                interrupted += 1;
            }
            let _ = vu.await;
        }
        self.handles.clear();
        interrupted
    }

    /// Give VUs until `deadline` to finish, then abort the rest
    ///
    /// Handles stay in the pool while awaited so a dropped run still aborts them.
    async fn drain(&mut self, deadline: Instant) -> u32 {
        let mut interrupted = 0u32;
        for vu in self.handles.iter_mut() {
            if timeout_at(deadline, &mut *vu).await.is_err() {
                vu.abort();
                let _ = vu.await;
                interrupted += 1;
            }
        }
        self.handles.clear();
        interrupted
    }
}

impl Drop for VuPool {
    fn drop(&mut self) {
        for vu in &self.handles {
            vu.abort();
        }
    }
}

/// Target VUs at `elapsed`, interpolating inside the current stage
pub fn target_at(stages: &[RampStage], elapsed: Duration) -> u32 {
    let mut from = 0u32;
    let mut stage_start = Duration::ZERO;

    for stage in stages {
        let stage_end = stage_start + stage.duration;
        if elapsed < stage_end {
            let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
            let value = from as f64 + (stage.target as f64 - from as f64) * progress;
            return value.floor().max(0.0) as u32;
        }
        from = stage.target;
        stage_start = stage_end;
    }

    stages.last().map(|s| s.target).unwrap_or(0)
}

/// Executes a ramp profile with a pool of VU tasks
pub struct RampingExecutor {
    stages: Vec<RampStage>,
    config: ExecutorConfig,
}

impl RampingExecutor {
    pub fn new(stages: Vec<RampStage>, config: ExecutorConfig) -> Self {
        Self { stages, config }
    }

    pub fn stages(&self) -> &[RampStage] {
        &self.stages
    }

    /// Run the whole profile and wait for the VUs to drain
    pub async fn run<W: VuWork>(&self, work: Arc<W>) -> ExecutorReport {
        self.run_until(work, pending()).await
    }

    /// Run the profile until it ends or `stop` resolves
    ///
    /// On stop every VU is aborted, and none is running when this returns.
    pub async fn run_until<W, S>(&self, work: Arc<W>, stop: S) -> ExecutorReport
    where
        W: VuWork,
        S: Future<Output = ()>,
    {
        let total = total_duration(&self.stages);
        let (signal_tx, signal_rx) = watch::channel(VuSignal {
            active: 0,
            shutdown: false,
        });
        let completed = Arc::new(AtomicU64::new(0));
        let mut pool = VuPool::default();
        let mut peak_vus = 0u32;
        let mut cancelled = false;

        info!(
            stages = self.stages.len(),
            total_secs = total.as_secs(),
            "Starting ramping executor"
        );

        let start = Instant::now();
        let mut ticker = interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut stop => {
                    cancelled = true;
                    break;
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= total {
                break;
            }

            let target = target_at(&self.stages, elapsed);
            while pool.len() < target {
                let vu = pool.len() + 1;
                pool.handles.push(tokio::spawn(run_vu(
                    vu,
                    work.clone(),
                    signal_rx.clone(),
                    completed.clone(),
                )));
            }

            signal_tx.send_if_modified(|signal| {
                if signal.active == target {
                    return false;
                }
                debug!(from = signal.active, to = target, "Adjusting active VUs");
                signal.active = target;
                true
            });
            peak_vus = peak_vus.max(target);
        }

        signal_tx.send_replace(VuSignal {
            active: 0,
            shutdown: true,
        });

        let interrupted = if cancelled {
            warn!("Executor stopped, aborting all VUs");
            pool.abort_all().await
        } else {
            pool.drain(Instant::now() + self.config.graceful_ramp_down)
                .await
        };

        if interrupted > 0 {
            warn!(interrupted = interrupted, "Aborted VUs still running");
        }

        ExecutorReport {
            iterations: completed.load(Ordering::SeqCst),
            peak_vus,
            interrupted,
            cancelled,
        }
    }
}

async fn run_vu<W: VuWork>(
    vu: u32,
    work: Arc<W>,
    mut signal: watch::Receiver<VuSignal>,
    completed: Arc<AtomicU64>,
) {
    let mut iteration = 0u64;

    loop {
        let current = *signal.borrow_and_update();
        if current.shutdown {
            break;
        }

        if vu <= current.active {
            work.iteration(vu, iteration).await;
            iteration += 1;
            completed.fetch_add(1, Ordering::SeqCst);
            continue;
        }

        if signal.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    fn stage(millis: u64, target: u32) -> RampStage {
        RampStage {
            duration: Duration::from_millis(millis),
            target,
        }
    }

    #[test]
    fn test_target_interpolates_within_stage() {
        let stages = vec![stage(100, 10), stage(100, 10), stage(100, 0)];

        assert_eq!(target_at(&stages, Duration::ZERO), 0);
        assert_eq!(target_at(&stages, Duration::from_millis(50)), 5);
        assert_eq!(target_at(&stages, Duration::from_millis(100)), 10);
        assert_eq!(target_at(&stages, Duration::from_millis(150)), 10);
        assert_eq!(target_at(&stages, Duration::from_millis(250)), 5);
        assert_eq!(target_at(&stages, Duration::from_millis(300)), 0);
        assert_eq!(target_at(&stages, Duration::from_secs(10)), 0);
    }

    #[test]
    fn test_zero_length_stage_jumps() {
        let stages = vec![stage(0, 8), stage(100, 8), stage(0, 0)];
        assert_eq!(target_at(&stages, Duration::ZERO), 8);
        assert_eq!(target_at(&stages, Duration::from_millis(99)), 8);
        assert_eq!(target_at(&[], Duration::ZERO), 0);
    }

    /// Records identities and tracks concurrency
    #[derive(Default)]
    struct RecordingWork {
        seen: Mutex<Vec<(u32, u64)>>,
        running: AtomicU32,
        peak: AtomicU32,
        pause: Duration,
    }

    #[async_trait]
    impl VuWork for RecordingWork {
        async fn iteration(&self, vu: u32, iteration: u64) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.seen.lock().unwrap().push((vu, iteration));
            tokio::time::sleep(self.pause).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_identities_unique_and_concurrency_bounded() {
        let work = Arc::new(RecordingWork {
            pause: Duration::from_millis(2),
            ..Default::default()
        });
        let executor = RampingExecutor::new(
            vec![stage(40, 2), stage(40, 4), stage(20, 0)],
            ExecutorConfig {
                tick: Duration::from_millis(1),
                graceful_ramp_down: Duration::from_secs(5),
            },
        );

        let report = executor.run(work.clone()).await;

        let seen = work.seen.lock().unwrap().clone();
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), seen.len());
        assert_eq!(report.iterations, seen.len() as u64);
        assert!(report.iterations > 0);
        assert!(report.peak_vus <= 4);
        assert!(work.peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(report.interrupted, 0);
        assert!(seen.iter().all(|(vu, _)| (1..=4).contains(vu)));
    }

    #[tokio::test]
    async fn test_iterations_per_vu_are_sequential() {
        let work = Arc::new(RecordingWork {
            pause: Duration::from_millis(1),
            ..Default::default()
        });
        let executor = RampingExecutor::new(
            vec![stage(0, 1), stage(50, 1), stage(0, 0)],
            ExecutorConfig {
                tick: Duration::from_millis(1),
                graceful_ramp_down: Duration::from_secs(5),
            },
        );

        executor.run(work.clone()).await;

        let seen = work.seen.lock().unwrap().clone();
        let iterations: Vec<u64> = seen.iter().map(|(_, i)| *i).collect();
        let expected: Vec<u64> = (0..iterations.len() as u64).collect();
        assert!(seen.iter().all(|(vu, _)| *vu == 1));
        assert_eq!(iterations, expected);
    }

    #[tokio::test]
    async fn test_stuck_iterations_are_aborted_after_ramp_down() {
        let work = Arc::new(RecordingWork {
            pause: Duration::from_secs(3600),
            ..Default::default()
        });
        let executor = RampingExecutor::new(
            vec![stage(0, 3), stage(50, 3), stage(0, 0)],
            ExecutorConfig {
                tick: Duration::from_millis(1),
                graceful_ramp_down: Duration::from_millis(10),
            },
        );

        let started = std::time::Instant::now();
        let report = executor.run(work).await;

        assert_eq!(report.interrupted, 3);
        assert_eq!(report.iterations, 0);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    fn seen_count(work: &RecordingWork) -> usize {
        work.seen.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_stop_signal_aborts_vus_before_returning() {
        let work = Arc::new(RecordingWork {
            pause: Duration::from_millis(1),
            ..Default::default()
        });
        let executor = RampingExecutor::new(
            vec![stage(0, 2), stage(60_000, 2), stage(0, 0)],
            ExecutorConfig {
                tick: Duration::from_millis(1),
                graceful_ramp_down: Duration::from_secs(60),
            },
        );

        let report = executor
            .run_until(work.clone(), tokio::time::sleep(Duration::from_millis(30)))
            .await;

        assert!(report.cancelled);
        assert!(report.iterations > 0);
        let stopped_at = seen_count(&work);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen_count(&work), stopped_at);
        assert_eq!(work.running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropping_run_stops_vus() {
        let work = Arc::new(RecordingWork {
            pause: Duration::from_millis(1),
            ..Default::default()
        });
        let executor = RampingExecutor::new(
            vec![stage(0, 2), stage(60_000, 2), stage(0, 0)],
            ExecutorConfig {
                tick: Duration::from_millis(1),
                graceful_ramp_down: Duration::from_secs(60),
            },
        );

        tokio::select! {
            _ = executor.run(work.clone()) => panic!("run should not finish"),
            _ = tokio::time::sleep(Duration::from_millis(30)) => {}
        }

        // Let the aborts land
        tokio::time::sleep(Duration::from_millis(5)).await;
        let dropped_at = seen_count(&work);
        assert!(dropped_at > 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen_count(&work), dropped_at);
    }
}
