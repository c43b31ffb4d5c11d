//! Where finished jobs go.

use std::error::Error as StdError;
use std::future::Future;

use log::{info, warn};
use tokio::sync::mpsc;

use super::job::{JobOutcome, JobReport};

/// Error returned by a reporter. Logged by the scheduler, never fatal.
pub type ReportError = Box<dyn StdError + Send + Sync>;

/// Receives the outcome of every terminal job, exactly once per job.
pub trait Reporter: Send + Sync + 'static {
    /// Deliver one report.
    fn report(&self, report: &JobReport) -> impl Future<Output = Result<(), ReportError>> + Send;
}

/// Writes a summary line per job to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    async fn report(&self, report: &JobReport) -> Result<(), ReportError> {
        match &report.outcome {
            JobOutcome::Succeeded(artifact) => info!(
                "{}: job {} succeeded after {} attempt(s), {} bytes captured",
                report.device_id,
                report.job_id,
                report.attempts,
                artifact.text.len()
            ),
            JobOutcome::Failed(failure) => warn!(
                "{}: job {} {:?}: {}",
                report.device_id, report.job_id, report.state, failure
            ),
        }
        Ok(())
    }
}

/// Forwards reports over a channel.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<JobReport>,
}

impl ChannelReporter {
    /// Create a reporter and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Reporter for ChannelReporter {
    async fn report(&self, report: &JobReport) -> Result<(), ReportError> {
        self.tx
            .send(report.clone())
            .map_err(|_| "report receiver dropped".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::{JobId, JobState, JobTrigger};
    use crate::session::{FailureKind, SessionFailure};
    use std::time::Duration;

    fn report() -> JobReport {
        JobReport {
            job_id: JobId(1),
            device_id: "r1".to_string(),
            script: "cisco_ios".to_string(),
            trigger: JobTrigger::Single,
            state: JobState::Failed,
            attempts: 1,
            elapsed: Duration::ZERO,
            outcome: JobOutcome::Failed(SessionFailure::new("r1", FailureKind::Connect, "refused")),
        }
    }

    #[tokio::test]
    async fn test_channel_reporter() {
        let (reporter, mut rx) = ChannelReporter::channel();
        reporter.report(&report()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.job_id, JobId(1));

        drop(rx);
        assert!(reporter.report(&report()).await.is_err());
    }

    #[tokio::test]
    async fn test_log_reporter_never_fails() {
        assert!(LogReporter.report(&report()).await.is_ok());
    }
}
