//! Job scheduler for background work.
//!
//! Jobs are registered with a cron [`Schedule`]. The engine checks them once
//! a minute in UTC and sends each job that is due to a channel; whoever holds
//! the receiver runs the work, off the request path.

pub mod cron;

pub use cron::{Schedule, ScheduleError};

use chrono::{DateTime, Duration, DurationRound, Utc};
use diarist_config::SchedulerConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

/// What a job does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobKind {
    /// Derive a fresh profile for every user.
    ProfileSweep,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProfileSweep => "profile_sweep",
        }
    }
}

/// A scheduled job.
#[derive(Debug, Clone)]
pub struct Job {
    pub kind: JobKind,
    pub schedule: Schedule,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(kind: JobKind, schedule: &str) -> Result<Self, ScheduleError> {
        Ok(Self {
            kind,
            schedule: Schedule::parse(schedule)?,
            enabled: true,
            last_run: None,
        })
    }

    /// The next firing strictly after `after`, or `None` when disabled.
    pub fn next_run(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.enabled {
            return None;
        }
        self.schedule.next_after(after)
    }

    /// Due at `now` and not already fired in this minute.
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled || !self.schedule.matches(&now) {
            return false;
        }
        match self.last_run {
            Some(last) => minute_of(last) != minute_of(now),
            None => true,
        }
    }
}

fn minute_of(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.duration_trunc(Duration::minutes(1)).unwrap_or(dt)
}

/// A job that came due, ready to be run by the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredJob {
    pub kind: JobKind,
    pub fired_at: DateTime<Utc>,
}

/// Holds jobs and fires them on schedule.
#[derive(Clone, Default)]
pub struct JobEngine {
    jobs: Arc<RwLock<BTreeMap<JobKind, Job>>>,
}

impl JobEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the jobs enabled in configuration.
    pub async fn from_config(config: &SchedulerConfig) -> Result<Self, ScheduleError> {
        let engine = Self::new();
        let mut sweep = Job::new(JobKind::ProfileSweep, &config.profile_sweep.schedule)?;
        sweep.enabled = config.profile_sweep.enabled;
        engine.add_job(sweep).await;
        Ok(engine)
    }

    /// Add or replace the job of this kind.
    pub async fn add_job(&self, job: Job) {
        let next = job.next_run(Utc::now()).map(|at| at.to_rfc3339());
        info!(
            job = job.kind.as_str(),
            schedule = %job.schedule,
            enabled = job.enabled,
            next_run = next.as_deref().unwrap_or("never"),
            "Job registered"
        );
        self.jobs.write().await.insert(job.kind, job);
    }

    /// Mark and return every job due at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<TriggeredJob> {
        let mut jobs = self.jobs.write().await;
        let mut fired = Vec::new();
        for job in jobs.values_mut() {
            if job.is_due(now) {
                job.last_run = Some(now);
                info!(job = job.kind.as_str(), "Job triggered");
                fired.push(TriggeredJob {
                    kind: job.kind,
                    fired_at: now,
                });
            }
        }
        fired
    }

    /// Start checking jobs every `period` (a minute in production).
    ///
    /// Returns the receiver of triggered jobs and the loop's handle. The
    /// loop stops when the receiver is dropped.
    pub fn start(&self, period: std::time::Duration) -> (mpsc::Receiver<TriggeredJob>, tokio::task::JoinHandle<()>) {
        let engine = self.clone();
        let (tx, rx) = mpsc::channel::<TriggeredJob>(16);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                for job in engine.tick(Utc::now()).await {
                    if tx.send(job).await.is_err() {
                        debug!("Job receiver dropped, stopping scheduler loop");
                        return;
                    }
                }
            }
        });

        (rx, handle)
    }
}
