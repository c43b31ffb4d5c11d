//! Per-device job scheduler.
//!
//! The [`Scheduler`] admits one job per device at a time, runs admitted jobs
//! on a bounded worker pool, and hands every terminal outcome to a
//! [`Reporter`] exactly once before forgetting the job.
//!
//! # Lifecycle
//!
//! ```text
//! ┌─────────┐  start   ┌─────────┐  stop   ┌──────────┐  all jobs terminal  ┌─────────┐
//! │ Stopped ├──────────► Running ├─────────► Stopping ├─────────────────────► Stopped │
//! └─────────┘          └─────────┘         └──────────┘                     └─────────┘
//! ```
//!
//! Periodic task runs only happen while Running. Operators can back up a
//! single device or run a task while Stopped or Running; both are refused
//! while a stop is in progress. Lifecycle operations are serialized, so a
//! restart is never interleaved with another start or stop.

pub mod config;
mod inventory;
mod job;
mod reporter;


pub use config::{ScheduleEntry, SchedulerConfig};
pub use inventory::Inventory;
pub use job::{Job, JobId, JobOutcome, JobReport, JobState, JobTrigger};
pub use reporter::{ChannelReporter, LogReporter, ReportError, Reporter};

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use log::{debug, error, info, warn};
use serde::{Serialize, Serializer};
use tokio::sync::{Notify, Semaphore, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{Error, SchedulerError, TransportError};
use crate::script::{DeviceScript, ScriptRegistry};
use crate::session::{Artifact, FailureKind, SessionFailure, SessionRunner};
use crate::transport::{Connector, Device};

/// Slack past the job deadline before a session is abandoned outright.
const DEADLINE_GRACE: Duration = Duration::from_secs(1);

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    #[default]
    Stopped,
    Running,
    /// Waiting for in-flight jobs to become terminal.
    Stopping,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Stopped => f.write_str("stopped"),
            SchedulerState::Running => f.write_str("running"),
            SchedulerState::Stopping => f.write_str("stopping"),
        }
    }
}

/// Result of [`Scheduler::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Result of [`Scheduler::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

/// Cumulative job counters. They survive job eviction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounters {
    pub admitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
}

impl JobCounters {
    fn record(&mut self, state: JobState) {
        match state {
            JobState::Succeeded => self.succeeded += 1,
            JobState::Failed => self.failed += 1,
            JobState::TimedOut => self.timed_out += 1,
            JobState::Cancelled => self.cancelled += 1,
            JobState::Queued | JobState::Running => {}
        }
    }

    /// Jobs that reached a terminal state.
    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed + self.timed_out + self.cancelled
    }
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub workers: usize,
    pub queued: usize,
    pub running: usize,
    pub counters: JobCounters,
    pub devices: usize,
    pub tasks: usize,
}

/// A job admitted by [`Scheduler::run_task`].
#[derive(Debug, Clone, Serialize)]
pub struct AdmittedJob {
    pub device_id: String,
    pub job_id: JobId,
}

/// A task member that was not admitted.
#[derive(Debug, Serialize)]
pub struct RejectedDevice {
    pub device_id: String,
    #[serde(rename = "reason", serialize_with = "serialize_display")]
    pub error: SchedulerError,
}

/// Result of [`Scheduler::run_task`].
#[derive(Debug, Serialize)]
pub struct TaskAdmission {
    pub task: String,
    pub admitted: Vec<AdmittedJob>,
    pub rejected: Vec<RejectedDevice>,
}

fn serialize_display<T: fmt::Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Handle to a job scheduler. Cloning is cheap; all clones drive the same
/// scheduler.
pub struct Scheduler<C, R> {
    inner: Arc<Inner<C, R>>,
}

impl<C, R> Clone for Scheduler<C, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C, R> {
    config: SchedulerConfig,
    inventory: Inventory,
    scripts: ScriptRegistry,
    connector: C,
    reporter: R,

    /// One permit per worker; held for as long as a job owns a transport.
    permits: Arc<Semaphore>,

    /// Jobs, device index and counters. Never held across an await.
    table: Mutex<JobTable>,

    /// `true` while a stop is in progress.
    stop: watch::Sender<bool>,

    /// Signalled when the last in-flight job is evicted.
    idle: Notify,

    /// Serializes start/stop/restart.
    lifecycle: tokio::sync::Mutex<()>,

    next_id: AtomicU64,
}

#[derive(Default)]
struct JobTable {
    state: SchedulerState,
    jobs: HashMap<JobId, Job>,

    /// In-flight job per device.
    devices: HashMap<String, JobId>,

    /// Callers of `run_single_backup` waiting for their report.
    waiters: HashMap<JobId, oneshot::Sender<JobReport>>,

    counters: JobCounters,
    tickers: Vec<JoinHandle<()>>,
}

impl<C, R> Scheduler<C, R>
where
    C: Connector,
    R: Reporter,
{
    /// Create a stopped scheduler.
    pub fn new(
        config: SchedulerConfig,
        inventory: Inventory,
        scripts: ScriptRegistry,
        connector: C,
        reporter: R,
    ) -> Result<Self, SchedulerError> {
        if config.workers == 0 {
            return Err(SchedulerError::InvalidConfig {
                message: "workers must be at least 1".to_string(),
            });
        }
        for entry in &config.schedule {
            if inventory.task(&entry.task).is_none() {
                return Err(SchedulerError::UnknownTask {
                    task: entry.task.clone(),
                });
            }
            if entry.interval.is_zero() {
                return Err(SchedulerError::InvalidConfig {
                    message: format!("schedule interval for '{}' is zero", entry.task),
                });
            }
        }
        for device in inventory.devices() {
            if !scripts.contains(&device.script) {
                warn!("{}: script '{}' is not registered", device.id, device.script);
            }
        }

        let (stop, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(config.workers)),
                config,
                inventory,
                scripts,
                connector,
                reporter,
                table: Mutex::new(JobTable::default()),
                stop,
                idle: Notify::new(),
                lifecycle: tokio::sync::Mutex::new(()),
                next_id: AtomicU64::new(0),
            }),
        })
    }

    /// Start periodic task runs.
    pub async fn start(&self) -> Result<StartOutcome, SchedulerError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.start_locked()
    }

    /// Stop periodic runs, cancel queued jobs, ask running jobs to abort
    /// before their next step, and wait until every job is terminal.
    pub async fn stop(&self) -> Result<StopOutcome, SchedulerError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.stop_locked().await
    }

    /// Stop (if running) and start again, as one lifecycle operation.
    pub async fn restart(&self) -> Result<(), SchedulerError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.stop_locked().await?;
        self.start_locked()?;
        Ok(())
    }

    fn start_locked(&self) -> Result<StartOutcome, SchedulerError> {
        let mut table = self.inner.table();
        match table.state {
            SchedulerState::Running => return Ok(StartOutcome::AlreadyRunning),
            SchedulerState::Stopping => return Err(SchedulerError::Stopping),
            SchedulerState::Stopped => {}
        }

        table.state = SchedulerState::Running;
        table.tickers = self
            .inner
            .config
            .schedule
            .iter()
            .map(|entry| spawn_ticker(Arc::downgrade(&self.inner), entry.clone()))
            .collect();

        info!(
            "scheduler started ({} workers, {} scheduled task(s))",
            self.inner.config.workers,
            table.tickers.len()
        );
        Ok(StartOutcome::Started)
    }

    async fn stop_locked(&self) -> Result<StopOutcome, SchedulerError> {
        let in_flight = {
            let mut table = self.inner.table();
            match table.state {
                SchedulerState::Stopped => return Ok(StopOutcome::AlreadyStopped),
                SchedulerState::Stopping => return Err(SchedulerError::Stopping),
                SchedulerState::Running => {}
            }
            table.state = SchedulerState::Stopping;
            for ticker in table.tickers.drain(..) {
                ticker.abort();
            }
            table.jobs.len()
        };

        info!("scheduler stopping, {} job(s) in flight", in_flight);
        self.inner.stop.send_replace(true);
        self.wait_idle().await;

        self.inner.table().state = SchedulerState::Stopped;
        self.inner.stop.send_replace(false);
        info!("scheduler stopped");
        Ok(StopOutcome::Stopped)
    }

    /// Back up one device now and wait for the outcome.
    ///
    /// Works whether or not the scheduler is running.
    pub async fn run_single_backup(&self, device_id: &str) -> Result<JobReport, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        let job_id = self.inner.admit(device_id, JobTrigger::Single, Some(tx))?;
        rx.await.map_err(|_| SchedulerError::JobLost { job_id: job_id.0 })
    }

    /// Admit one job per device of `task`. Does not wait for the jobs.
    pub fn run_task(&self, task: &str) -> Result<TaskAdmission, SchedulerError> {
        let members = self
            .inner
            .inventory
            .task(task)
            .ok_or_else(|| SchedulerError::UnknownTask {
                task: task.to_string(),
            })?;

        let stopping = self.inner.table().state == SchedulerState::Stopping;
        if stopping {
            return Err(SchedulerError::SchedulerNotRunning);
        }

        let mut admission = TaskAdmission {
            task: task.to_string(),
            admitted: Vec::with_capacity(members.len()),
            rejected: Vec::new(),
        };
        for device_id in members {
            match self
                .inner
                .admit(device_id, JobTrigger::Task(task.to_string()), None)
            {
                Ok(job_id) => admission.admitted.push(AdmittedJob {
                    device_id: device_id.clone(),
                    job_id,
                }),
                Err(error) => admission.rejected.push(RejectedDevice {
                    device_id: device_id.clone(),
                    error,
                }),
            }
        }

        info!(
            "task '{}': {} job(s) admitted, {} rejected",
            task,
            admission.admitted.len(),
            admission.rejected.len()
        );
        Ok(admission)
    }

    /// Current state and counters.
    pub fn status(&self) -> SchedulerStatus {
        let table = self.inner.table();
        let running = table
            .jobs
            .values()
            .filter(|job| job.state == JobState::Running)
            .count();
        let queued = table
            .jobs
            .values()
            .filter(|job| job.state == JobState::Queued)
            .count();

        SchedulerStatus {
            state: table.state,
            workers: self.inner.config.workers,
            queued,
            running,
            counters: table.counters,
            devices: self.inner.inventory.len(),
            tasks: self.inner.inventory.task_names().count(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.table().state
    }

    /// Wait until no job is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let idle = self.inner.table().jobs.is_empty();
            if idle {
                return;
            }
            notified.await;
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inner.inventory
    }

    pub fn scripts(&self) -> &ScriptRegistry {
        &self.inner.scripts
    }
}

impl<C, R> Inner<C, R>
where
    C: Connector,
    R: Reporter,
{
    fn table(&self) -> MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a job for `device_id` and spawn its worker.
    fn admit(
        self: &Arc<Self>,
        device_id: &str,
        trigger: JobTrigger,
        waiter: Option<oneshot::Sender<JobReport>>,
    ) -> Result<JobId, SchedulerError> {
        let device = self
            .inventory
            .device(device_id)
            .ok_or_else(|| SchedulerError::UnknownDevice {
                device_id: device_id.to_string(),
            })?;
        let script = self
            .scripts
            .get(&device.script)
            .ok_or_else(|| SchedulerError::UnknownScript {
                device_id: device_id.to_string(),
                script: device.script.clone(),
            })?;

        let job_id = {
            let mut table = self.table();
            if table.state == SchedulerState::Stopping {
                return Err(SchedulerError::SchedulerNotRunning);
            }
            if table.devices.contains_key(device_id) {
                return Err(SchedulerError::DuplicateDeviceJob {
                    device_id: device_id.to_string(),
                });
            }

            let job_id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
            table
                .jobs
                .insert(job_id, Job::new(job_id, device_id, script.name(), trigger));
            table.devices.insert(device_id.to_string(), job_id);
            if let Some(waiter) = waiter {
                table.waiters.insert(job_id, waiter);
            }
            table.counters.admitted += 1;
            job_id
        };

        debug!("{}: job {} queued", device_id, job_id);
        let stop = self.stop.subscribe();
        tokio::spawn(Arc::clone(self).supervise(job_id, device.clone(), script, stop));
        Ok(job_id)
    }

    /// Run a job's worker and publish its outcome, whatever happens to it.
    async fn supervise(
        self: Arc<Self>,
        job_id: JobId,
        device: Device,
        script: Arc<DeviceScript>,
        stop: watch::Receiver<bool>,
    ) {
        let device_id = device.id.clone();
        let worker = tokio::spawn(Arc::clone(&self).execute(job_id, device, script, stop));

        let outcome = match worker.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}: job {} worker failed: {}", device_id, job_id, e);
                JobOutcome::Failed(SessionFailure::new(
                    device_id,
                    FailureKind::Internal,
                    format!("worker failed: {}", e),
                ))
            }
        };

        self.finish(job_id, outcome).await;
    }

    async fn execute(
        self: Arc<Self>,
        job_id: JobId,
        device: Device,
        script: Arc<DeviceScript>,
        mut stop: watch::Receiver<bool>,
    ) -> JobOutcome {
        let permit = tokio::select! {
            biased;
            _ = stop_requested(&mut stop) => {
                return cancelled(&device.id, "stopped while queued");
            }
            permit = Arc::clone(&self.permits).acquire_owned() => permit,
        };
        let Ok(_permit) = permit else {
            return cancelled(&device.id, "worker pool closed");
        };

        let deadline = Instant::now() + self.config.job_timeout;
        self.update(job_id, |job| {
            job.transition(JobState::Running);
        });
        info!("{}: job {} running", device.id, job_id);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.update(job_id, |job| job.attempts = attempt);

            let failure = match self.attempt(&device, &script, deadline, stop.clone()).await {
                Ok(artifact) => return JobOutcome::Succeeded(artifact),
                Err(failure) => failure,
            };

            let stopping = *stop.borrow();
            let resume = Instant::now() + self.config.retry_delay;
            if !failure.kind.is_transient()
                || attempt > self.config.job_retries
                || stopping
                || resume >= deadline
            {
                return JobOutcome::Failed(failure);
            }

            warn!(
                "{}: attempt {} failed ({}), retrying in {:?}",
                device.id, attempt, failure.kind, self.config.retry_delay
            );
            tokio::select! {
                biased;
                _ = stop_requested(&mut stop) => {
                    return cancelled(&device.id, "stopped between attempts");
                }
                _ = tokio::time::sleep_until(resume) => {}
            }
        }
    }

    /// One connection attempt: open a transport and run the script.
    async fn attempt(
        &self,
        device: &Device,
        script: &DeviceScript,
        deadline: Instant,
        stop: watch::Receiver<bool>,
    ) -> Result<Artifact, SessionFailure> {
        let connect_deadline = deadline.min(Instant::now() + self.config.connect_timeout);
        let transport =
            match tokio::time::timeout_at(connect_deadline, self.connector.connect(device)).await {
                Ok(Ok(transport)) => transport,
                Ok(Err(e)) => return Err(connect_failure(&device.id, e)),
                Err(_) if connect_deadline == deadline => {
                    return Err(SessionFailure::new(
                        device.id.as_str(),
                        FailureKind::JobTimeout,
                        "job deadline passed while connecting",
                    ));
                }
                Err(_) => {
                    return Err(SessionFailure::new(
                        device.id.as_str(),
                        FailureKind::Connect,
                        format!("connect timed out after {:?}", self.config.connect_timeout),
                    ));
                }
            };
        debug!("{}: transport open", device.id);

        let runner = SessionRunner::new(device, script)
            .with_deadline(deadline)
            .with_stop_signal(stop);
        let session = runner.run(transport, self.config.engine.clone());

        match tokio::time::timeout_at(deadline + DEADLINE_GRACE, session).await {
            Ok(result) => result,
            Err(_) => Err(SessionFailure::new(
                device.id.as_str(),
                FailureKind::JobTimeout,
                "session overran the job deadline",
            )),
        }
    }

    fn update(&self, job_id: JobId, f: impl FnOnce(&mut Job)) {
        if let Some(job) = self.table().jobs.get_mut(&job_id) {
            f(job);
        }
    }

    /// Record the terminal state, report it, then evict the job.
    async fn finish(&self, job_id: JobId, outcome: JobOutcome) {
        let report = {
            let mut table = self.table();
            let Some(job) = table.jobs.get_mut(&job_id) else {
                error!("job {} finished but is not tracked", job_id);
                return;
            };

            let state = outcome.state();
            job.transition(state);
            let report = JobReport {
                job_id,
                device_id: job.device_id.clone(),
                script: job.script.clone(),
                trigger: job.trigger.clone(),
                state,
                attempts: job.attempts,
                elapsed: job.queued_at.elapsed(),
                outcome,
            };
            table.counters.record(state);
            report
        };

        match &report.outcome {
            JobOutcome::Succeeded(_) => info!(
                "{}: job {} succeeded in {:?}",
                report.device_id, job_id, report.elapsed
            ),
            JobOutcome::Failed(failure) => warn!(
                "{}: job {} {:?}: {}",
                report.device_id, job_id, report.state, failure
            ),
        }

        match AssertUnwindSafe(self.reporter.report(&report))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{}: reporting job {} failed: {}", report.device_id, job_id, e),
            Err(_) => error!("{}: reporter panicked on job {}", report.device_id, job_id),
        }

        let (waiter, idle) = {
            let mut table = self.table();
            table.jobs.remove(&job_id);
            table.devices.remove(&report.device_id);
            (table.waiters.remove(&job_id), table.jobs.is_empty())
        };

        if let Some(waiter) = waiter {
            // The caller may have given up waiting; that is fine.
            let _ = waiter.send(report);
        }
        if idle {
            self.idle.notify_waiters();
        }
    }
}

/// Resolves once a stop has been requested.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopping| *stopping).await.is_err() {
        // Sender gone: no stop can ever be requested.
        std::future::pending::<()>().await;
    }
}

fn cancelled(device_id: &str, message: &str) -> JobOutcome {
    JobOutcome::Failed(SessionFailure::new(device_id, FailureKind::Cancelled, message))
}

fn connect_failure(device_id: &str, error: Error) -> SessionFailure {
    let kind = match &error {
        Error::Transport(TransportError::AuthenticationFailed { .. }) => {
            FailureKind::AuthenticationFailed
        }
        _ => FailureKind::Connect,
    };
    SessionFailure::new(device_id, kind, error.to_string())
}

/// Run `entry.task` every `entry.interval` until aborted or the scheduler
/// is dropped.
fn spawn_ticker<C, R>(inner: Weak<Inner<C, R>>, entry: ScheduleEntry) -> JoinHandle<()>
where
    C: Connector,
    R: Reporter,
{
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval_at(Instant::now() + entry.interval, entry.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticks.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let scheduler = Scheduler { inner };
            if scheduler.state() != SchedulerState::Running {
                continue;
            }

            match scheduler.run_task(&entry.task) {
                Ok(admission) => {
                    for rejected in &admission.rejected {
                        debug!(
                            "scheduled task '{}': {} not admitted: {}",
                            entry.task, rejected.device_id, rejected.error
                        );
                    }
                }
                Err(e) => warn!("scheduled task '{}' failed: {}", entry.task, e),
            }
        }
    })
}
