use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::jobs::{Job, JobError, JobResult, RunSummary};
use crate::scoring::Engine;
use crate::scoring::report::BatchReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Poll,
    Refresh,
    Sync,
}

/// One of the engine's periodic passes over every eligible event.
pub struct EngineJob {
    kind: JobKind,
    engine: Arc<Engine>,
    interval: Duration,
    running: Mutex<()>,
}

impl EngineJob {
    pub fn new(kind: JobKind, engine: Arc<Engine>, interval: Duration) -> Self {
        Self {
            kind,
            engine,
            interval,
            running: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Job for EngineJob {
    fn name(&self) -> &'static str {
        match self.kind {
            JobKind::Poll => "poll",
            JobKind::Refresh => "refresh",
            JobKind::Sync => "aggregate-sync",
        }
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&self) -> JobResult<RunSummary> {
        let Ok(_guard) = self.running.try_lock() else {
            return Err(JobError::Busy(self.name()));
        };

        let summary = match self.kind {
            JobKind::Poll => summarise(self.engine.poll_all().await?, |r| {
                (r.created(), r.failed())
            }),
            JobKind::Refresh => summarise(self.engine.refresh_all().await?, |r| {
                (r.succeeded(), r.failed())
            }),
            JobKind::Sync => summarise(self.engine.sync_all().await?, |r| match r.published {
                true => (1, 0),
                false => (0, 1),
            }),
        };

        Ok(summary)
    }
}

fn summarise<R>(batch: BatchReport<R>, counts: impl Fn(&R) -> (usize, usize)) -> RunSummary {
    let mut summary = RunSummary {
        events: batch.completed.len() + batch.failed.len(),
        failed_events: batch.failed.len(),
        ..Default::default()
    };

    for report in &batch.completed {
        let (ok, failed) = counts(report);
        summary.items_ok += ok;
        summary.items_failed += failed;
    }

    summary
}
