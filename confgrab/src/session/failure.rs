//! Typed session failures.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Why a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The device rejected the credentials.
    AuthenticationFailed,
    /// A step's pattern did not arrive in time.
    ExpectTimeout,
    /// The device closed the stream mid-script.
    UnexpectedEof,
    /// Writing to the device failed.
    TransportWrite,
    /// No transport could be opened.
    Connect,
    /// The whole-job deadline passed.
    JobTimeout,
    /// The scheduler asked the job to stop.
    Cancelled,
    /// The worker itself failed (panic, lost task).
    Internal,
}

impl FailureKind {
    /// Failures that may succeed on a fresh connection.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            FailureKind::Connect | FailureKind::UnexpectedEof | FailureKind::TransportWrite
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::AuthenticationFailed => "authentication failed",
            FailureKind::ExpectTimeout => "expect timeout",
            FailureKind::UnexpectedEof => "unexpected EOF",
            FailureKind::TransportWrite => "transport write failed",
            FailureKind::Connect => "connect failed",
            FailureKind::JobTimeout => "job timeout",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed session, as handed to the reporter.
#[derive(Error, Debug, Clone, Serialize)]
#[error("{device_id}: {kind}{}: {message}", step_suffix(.step_index))]
pub struct SessionFailure {
    pub device_id: String,

    /// Step that was running, if the failure happened inside one.
    pub step_index: Option<usize>,

    pub kind: FailureKind,

    /// Human-readable detail.
    pub message: String,

    /// Unconsumed output at the moment of failure.
    pub last_buffer: String,
}

impl SessionFailure {
    /// Create a failure outside any step.
    pub fn new(
        device_id: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            step_index: None,
            kind,
            message: message.into(),
            last_buffer: String::new(),
        }
    }

    /// Attach the step that was running.
    pub fn at_step(mut self, index: usize) -> Self {
        self.step_index = Some(index);
        self
    }

    /// Attach the unconsumed output.
    pub fn with_buffer(mut self, buffer: &[u8]) -> Self {
        self.last_buffer = String::from_utf8_lossy(buffer).into_owned();
        self
    }
}

fn step_suffix(step_index: &Option<usize>) -> String {
    step_index
        .map(|index| format!(" at step {}", index))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display() {
        let failure = SessionFailure::new("r1", FailureKind::ExpectTimeout, "no prompt within 2s")
            .at_step(3)
            .with_buffer(b"partial");
        assert_eq!(
            failure.to_string(),
            "r1: expect timeout at step 3: no prompt within 2s"
        );
        assert_eq!(failure.last_buffer, "partial");

        let failure = SessionFailure::new("r2", FailureKind::Connect, "refused");
        assert_eq!(failure.to_string(), "r2: connect failed: refused");
    }

    #[test]
    fn test_transient_kinds() {
        assert!(FailureKind::Connect.is_transient());
        assert!(FailureKind::UnexpectedEof.is_transient());
        assert!(!FailureKind::AuthenticationFailed.is_transient());
        assert!(!FailureKind::JobTimeout.is_transient());
    }

    #[test]
    fn test_failure_json() {
        let failure = SessionFailure::new("r1", FailureKind::AuthenticationFailed, "rejected");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "authentication_failed");
        assert_eq!(json["step_index"], serde_json::Value::Null);
    }
}
