use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::scoring::EngineError;

pub mod tasks;

pub type JobResult<T> = core::result::Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("job '{0}' is already running")]
    Busy(&'static str),

    #[error("job '{job}' abandoned after exceeding its {deadline:?} deadline")]
    DeadlineExceeded {
        job: &'static str,
        deadline: Duration,
    },
}

/// Counts summarising one run of a job across all of its events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub events: usize,
    pub failed_events: usize,
    pub items_ok: usize,
    pub items_failed: usize,
}

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Soft upper bound on one run; writes committed before it elapses stay committed.
    fn deadline(&self) -> Duration {
        self.interval()
    }

    async fn run_once(&self) -> JobResult<RunSummary>;
}

pub async fn run_with_deadline(job: &dyn Job) -> JobResult<RunSummary> {
    let deadline = job.deadline();
    match tokio::time::timeout(deadline, job.run_once()).await {
        Ok(res) => res,
        Err(_) => Err(JobError::DeadlineExceeded {
            job: job.name(),
            deadline,
        }),
    }
}

/// Drives each registered job on its own interval.
///
/// A job's run is awaited inside its tick loop, so one job never overlaps itself; ticks that
/// fall due during a long run are skipped rather than queued.
pub struct Scheduler {
    jobs: Vec<Arc<dyn Job>>,
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn register(&mut self, job: Arc<dyn Job>) -> &mut Self {
        self.jobs.push(job);
        self
    }

    pub fn start(&mut self) {
        for job in self.jobs.drain(..) {
            tracing::info!(job = job.name(), interval = ?job.interval(), "scheduling job");
            self.handles
                .push(tokio::spawn(run_loop(job, self.token.child_token())));
        }
    }

    /// Stops scheduling new runs and waits for in-flight runs to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = ?e, "job loop panicked");
            }
        }
    }
}

async fn run_loop(job: Arc<dyn Job>, token: CancellationToken) {
    let mut tick = tokio::time::interval(job.interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::info!(job = job.name(), "job loop stopped");
                break;
            }

            _ = tick.tick() => {
                let started = Instant::now();
                match run_with_deadline(job.as_ref()).await {
                    Ok(summary) => tracing::info!(
                        job = job.name(),
                        events = summary.events,
                        failed_events = summary.failed_events,
                        items_ok = summary.items_ok,
                        items_failed = summary.items_failed,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "job run complete"
                    ),
                    Err(e) => tracing::error!(job = job.name(), error = %e, "job run failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowJob {
        runtime: Duration,
        deadline: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        runs: AtomicUsize,
    }

    impl SlowJob {
        fn new(runtime: Duration, deadline: Duration) -> Self {
            Self {
                runtime,
                deadline,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                runs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Job for SlowJob {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(10)
        }

        fn deadline(&self) -> Duration {
            self.deadline
        }

        async fn run_once(&self) -> JobResult<RunSummary> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.runtime).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(RunSummary::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_never_overlap() {
        let job = Arc::new(SlowJob::new(Duration::from_secs(25), Duration::from_secs(60)));

        let mut scheduler = Scheduler::new();
        scheduler.register(job.clone());
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(100)).await;
        scheduler.shutdown().await;

        assert_eq!(job.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(job.runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_run() {
        let job = SlowJob::new(Duration::from_secs(30), Duration::from_secs(5));

        let res = run_with_deadline(&job).await;

        assert!(matches!(
            res,
            Err(JobError::DeadlineExceeded { job: "slow", .. })
        ));
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }
}
