//! Jobs: one backup attempt of one device, and what came of it.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::session::{Artifact, FailureKind, SessionFailure};

/// Identifier of an admitted job, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a job. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Admitted, waiting for a worker.
    Queued,
    /// Holding a worker and talking to the device.
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Queued | JobState::Running)
    }
}

/// Why a job was admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "name")]
pub enum JobTrigger {
    /// An operator asked for this one device.
    Single,
    /// Part of a task run.
    Task(String),
}

impl JobTrigger {
    /// Task name, for task runs.
    pub fn task(&self) -> Option<&str> {
        match self {
            JobTrigger::Single => None,
            JobTrigger::Task(name) => Some(name),
        }
    }
}

/// A job tracked by the scheduler until its outcome has been reported.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub device_id: String,
    pub script: String,
    pub trigger: JobTrigger,
    pub state: JobState,
    pub queued_at: Instant,
    pub started_at: Option<Instant>,

    /// Connection attempts made so far.
    pub attempts: u32,
}

impl Job {
    pub(crate) fn new(id: JobId, device_id: &str, script: &str, trigger: JobTrigger) -> Self {
        Self {
            id,
            device_id: device_id.to_string(),
            script: script.to_string(),
            trigger,
            state: JobState::Queued,
            queued_at: Instant::now(),
            started_at: None,
            attempts: 0,
        }
    }

    /// Move to `state` unless the job is already terminal.
    ///
    /// Returns whether the state changed.
    pub(crate) fn transition(&mut self, state: JobState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if state == JobState::Running {
            self.started_at = Some(Instant::now());
        }
        self.state = state;
        true
    }
}

/// Terminal result of a job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum JobOutcome {
    Succeeded(Artifact),
    Failed(SessionFailure),
}

impl JobOutcome {
    /// The terminal state this outcome puts the job in.
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Succeeded(_) => JobState::Succeeded,
            JobOutcome::Failed(failure) => match failure.kind {
                FailureKind::JobTimeout => JobState::TimedOut,
                FailureKind::Cancelled => JobState::Cancelled,
                _ => JobState::Failed,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded(_))
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            JobOutcome::Succeeded(artifact) => Some(artifact),
            JobOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&SessionFailure> {
        match self {
            JobOutcome::Succeeded(_) => None,
            JobOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// What the reporter receives for every finished job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub device_id: String,
    pub script: String,
    pub trigger: JobTrigger,
    pub state: JobState,
    pub attempts: u32,

    /// Time from admission to the terminal state.
    #[serde(rename = "elapsed_ms", serialize_with = "crate::session::serialize_millis")]
    pub elapsed: Duration,

    pub outcome: JobOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_state_is_final() {
        let mut job = Job::new(JobId(1), "r1", "cisco_ios", JobTrigger::Single);
        assert_eq!(job.state, JobState::Queued);

        assert!(job.transition(JobState::Running));
        assert!(job.started_at.is_some());
        assert!(job.transition(JobState::Cancelled));
        assert!(!job.transition(JobState::Succeeded));
        assert_eq!(job.state, JobState::Cancelled);
    }

    #[test]
    fn test_outcome_state() {
        let failure = |kind| JobOutcome::Failed(SessionFailure::new("r1", kind, "x"));
        assert_eq!(failure(FailureKind::JobTimeout).state(), JobState::TimedOut);
        assert_eq!(failure(FailureKind::Cancelled).state(), JobState::Cancelled);
        assert_eq!(failure(FailureKind::Connect).state(), JobState::Failed);
        assert_eq!(
            failure(FailureKind::AuthenticationFailed).state(),
            JobState::Failed
        );
    }

    #[test]
    fn test_report_json() {
        let report = JobReport {
            job_id: JobId(7),
            device_id: "r1".to_string(),
            script: "cisco_ios".to_string(),
            trigger: JobTrigger::Task("core".to_string()),
            state: JobState::Failed,
            attempts: 2,
            elapsed: Duration::from_secs(3),
            outcome: JobOutcome::Failed(SessionFailure::new("r1", FailureKind::Connect, "refused")),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["job_id"], 7);
        assert_eq!(json["trigger"]["type"], "task");
        assert_eq!(json["trigger"]["name"], "core");
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["kind"], "connect");
        assert_eq!(json["elapsed_ms"], 3000);
    }
}
