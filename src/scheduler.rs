//! # Scheduler
//!
//! Drives the collect and clear jobs from their cron expressions. Each job
//! gets its own task; a tick that fires while the job's previous run is still
//! going is skipped.

use crate::{
    error::{
        Result,
        TrackerError,
    },
    tracker::Tracker,
};
use chrono::Utc;
use cron::Schedule;
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    time::{
        Duration,
        Instant,
    },
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type JobFn = fn(Tracker) -> JobFuture;

/// Elapsed time truncated to milliseconds for log output.
fn cost(start: Instant) -> String {
    humantime::format_duration(Duration::from_millis(start.elapsed().as_millis() as u64)).to_string()
}

/// One collection run under the configured deadline. Failures are logged,
/// the next tick retries.
async fn run_collect(tracker: Tracker) {
    let start = Instant::now();
    let lobby = tracker.lobby_config();
    match tracker
        .collect_with_deadline(lobby.concurrency, lobby.collect_timeout)
        .await
    {
        Ok(inserted) => info!(inserted, cost = %cost(start), "collect job finished"),
        Err(e) => error!(error = %e, cost = %cost(start), "collect job failed"),
    }
}

async fn run_clear(tracker: Tracker) {
    let start = Instant::now();
    let ttl = tracker.lobby_config().ttl;
    match tracker.clear_expired(ttl).await {
        Ok(summary) => info!(
            deleted = summary.deleted,
            remaining = summary.remaining,
            cost = %cost(start),
            "clear job finished"
        ),
        Err(e) => error!(error = %e, cost = %cost(start), "clear job failed"),
    }
}

fn collect_job(tracker: Tracker) -> JobFuture {
    Box::pin(run_collect(tracker))
}

fn clear_job(tracker: Tracker) -> JobFuture {
    Box::pin(run_clear(tracker))
}

/// Marks a job as running for as long as its permit lives.
#[derive(Clone, Default)]
struct RunGuard(Arc<AtomicBool>);

struct RunPermit(Arc<AtomicBool>);

impl RunGuard {
    fn try_start(&self) -> Option<RunPermit> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .ok()
            .map(|_| RunPermit(self.0.clone()))
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct ScheduledJob {
    pub name: &'static str,
    pub schedule: Schedule,
    pub run: JobFn,
    /// Shared by every clone, so scheduled and manual runs exclude each other.
    guard: RunGuard,
}

impl ScheduledJob {
    pub fn new(name: &'static str, schedule: Schedule, run: JobFn) -> Self {
        Self {
            name,
            schedule,
            run,
            guard: RunGuard::default(),
        }
    }
}

pub struct Scheduler {
    tracker: Tracker,
    jobs: Vec<ScheduledJob>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// The collect and clear jobs on the tracker's configured schedules.
    pub fn new(tracker: Tracker) -> Result<Self> {
        let lobby = tracker.lobby_config();
        let collect = lobby
            .collect_schedule()
            .map_err(|e| TrackerError::configuration(e.to_string()))?;
        let clear = lobby
            .clear_schedule()
            .map_err(|e| TrackerError::configuration(e.to_string()))?;

        let jobs = vec![
            ScheduledJob::new("collect", collect, collect_job),
            ScheduledJob::new("clear", clear, clear_job),
        ];
        Ok(Self::with_jobs(tracker, jobs))
    }

    pub fn with_jobs(tracker: Tracker, jobs: Vec<ScheduledJob>) -> Self {
        Self {
            tracker,
            jobs,
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        for job in &self.jobs {
            info!(job = job.name, schedule = %job.schedule, "scheduling job");
            let handle = tokio::spawn(drive(job.clone(), self.tracker.clone(), self.cancel.clone()));
            self.handles.push(handle);
        }
    }

    /// Runs the job `name` once on the calling task, unless a scheduled or
    /// manual run of it is in progress. Returns whether it ran.
    pub async fn run_now(&self, name: &str) -> bool {
        let Some(job) = self.jobs.iter().find(|job| job.name == name) else {
            warn!(job = name, "no such job");
            return false;
        };
        let Some(_permit) = job.guard.try_start() else {
            warn!(job = name, "previous run still in progress, skipping manual run");
            return false;
        };
        (job.run)(self.tracker.clone()).await;
        true
    }

    /// Stops scheduling and waits for runs already in progress.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "scheduler task ended abnormally");
            }
        }
        info!("scheduler stopped");
    }
}

async fn drive(job: ScheduledJob, tracker: Tracker, cancel: CancellationToken) {
    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        let Some(next) = job.schedule.upcoming(Utc).next() else {
            warn!(job = job.name, "schedule has no upcoming run");
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let Some(permit) = job.guard.try_start() else {
            warn!(job = job.name, "previous run still in progress, skipping tick");
            continue;
        };
        debug!(job = job.name, "running job");
        let run = (job.run)(tracker.clone());
        in_flight = Some(tokio::spawn(async move {
            run.await;
            drop(permit);
        }));
    }

    if let Some(handle) = in_flight {
        if let Err(e) = handle.await {
            error!(job = job.name, error = %e, "job run ended abnormally");
        }
    }
}
