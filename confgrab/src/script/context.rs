//! Read-only view of a running session, handed to step conditions and
//! generated sends.

use crate::session::{StepOutcome, StepRecord};
use crate::transport::Device;

/// What a script has seen so far on one device.
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'a> {
    device: &'a Device,
    records: &'a [StepRecord],
}

impl<'a> ScriptContext<'a> {
    /// Create a context over the records of the steps run so far.
    pub fn new(device: &'a Device, records: &'a [StepRecord]) -> Self {
        Self { device, records }
    }

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn username(&self) -> Option<&str> {
        self.device.credentials.username.as_deref()
    }

    pub fn has_enable_password(&self) -> bool {
        self.device.credentials.enable_password.is_some()
    }

    /// Records of every step processed so far, including skipped ones.
    pub fn records(&self) -> &[StepRecord] {
        self.records
    }

    /// Output (text before the match) of step `index`.
    pub fn output(&self, index: usize) -> Option<&str> {
        self.records
            .iter()
            .find(|record| record.index == index)
            .map(|record| record.output.as_str())
    }

    /// Text matched by the most recent step that matched.
    pub fn last_matched(&self) -> Option<&str> {
        self.last_match().map(|record| record.matched.as_str())
    }

    /// Output of the most recent step that matched.
    pub fn last_output(&self) -> Option<&str> {
        self.last_match().map(|record| record.output.as_str())
    }

    /// Whether `needle` appeared anywhere in the output seen so far.
    pub fn seen(&self, needle: &str) -> bool {
        self.records
            .iter()
            .any(|record| record.output.contains(needle) || record.matched.contains(needle))
    }

    fn last_match(&self) -> Option<&StepRecord> {
        self.records
            .iter()
            .rev()
            .find(|record| record.outcome == StepOutcome::Matched)
    }
}
