//! Device scripts: ordered send/expect steps describing how to log in to a
//! kind of device and capture its configuration.
//!
//! Scripts are data. A [`DeviceScript`] is built once with
//! [`ScriptBuilder`], registered in a [`ScriptRegistry`] under its name and
//! shared by every job for devices of that kind. Steps may depend on what
//! the device said earlier through a [`ScriptContext`]: a step can be
//! skipped by a condition, or its send text can be generated.

mod context;
mod definition;
mod registry;
mod step;
pub mod vendors;

pub use context::ScriptContext;
pub use definition::{DeviceScript, PendingStep, ScriptBuilder};
pub use registry::ScriptRegistry;
pub use step::{ExpectStep, SendFn, SendText, StepCondition, TimeoutPolicy};
