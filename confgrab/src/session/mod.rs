//! Running a device script end to end.
//!
//! A [`SessionRunner`] walks a script's steps over one expect engine and
//! turns the conversation into either an [`Artifact`] (the captured
//! configuration plus per-step records) or a [`SessionFailure`] saying what
//! went wrong, at which step, and what the device had said last.

mod artifact;
mod failure;
mod runner;

pub use artifact::{Artifact, MASK, StepOutcome, StepRecord, serialize_millis};
pub use failure::{FailureKind, SessionFailure};
pub use runner::SessionRunner;
