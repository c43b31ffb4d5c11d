//! What a successful session produces.

use std::time::Duration;

use serde::{Serialize, Serializer};

/// Shown instead of credentials in logs and step records.
pub const MASK: &str = "********";

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step's pattern matched.
    Matched,
    /// The step's condition was false; nothing was sent.
    NotRun,
    /// The pattern never arrived and the step's policy was `Skip`.
    SoftFailed,
    /// The device closed the stream and the step accepts that.
    Eof,
}

/// Record of one processed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// Position of the step in its script.
    pub index: usize,

    /// Text sent, masked for hidden steps.
    pub input: Option<String>,

    /// Output received before the match.
    pub output: String,

    /// The matched text.
    pub matched: String,

    pub outcome: StepOutcome,

    /// Number of times the step was sent and expected.
    pub attempts: u32,

    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl StepRecord {
    pub(crate) fn not_run(index: usize) -> Self {
        Self {
            index,
            input: None,
            output: String::new(),
            matched: String::new(),
            outcome: StepOutcome::NotRun,
            attempts: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Captured output of a successful session.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub device_id: String,

    /// Name of the script that produced the capture.
    pub script: String,

    /// Output of the capture steps, in step order, with command echo
    /// removed and line endings normalised to `\n`.
    pub text: String,

    pub steps: Vec<StepRecord>,

    /// Indices of steps that timed out and were skipped.
    pub soft_failures: Vec<usize>,

    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl Artifact {
    /// Check if any step was skipped after a timeout.
    pub fn is_partial(&self) -> bool {
        !self.soft_failures.is_empty()
    }
}

/// Serialise a duration as whole milliseconds.
pub fn serialize_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Remove the echoed command line from the start of `output`.
///
/// Only a first line consisting of the command itself is removed; output
/// that merely starts with the same characters is left alone.
pub(crate) fn strip_echo<'a>(output: &'a str, sent: Option<&str>) -> &'a str {
    let Some(sent) = sent.map(str::trim).filter(|sent| !sent.is_empty()) else {
        return output;
    };

    let Some(rest) = output.trim_start_matches(['\r', '\n']).strip_prefix(sent) else {
        return output;
    };

    match rest.find('\n') {
        Some(end) if rest[..end].trim().is_empty() => &rest[end + 1..],
        None if rest.trim().is_empty() => "",
        _ => output,
    }
}

/// Normalise `\r\n` line endings to `\n`.
pub(crate) fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}
