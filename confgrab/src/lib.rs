//! # Confgrab
//!
//! Async configuration backup for network devices.
//!
//! Confgrab logs in to routers, switches and firewalls over SSH or Telnet,
//! drives a scripted conversation with the device CLI and captures the
//! configuration it prints. Many devices are backed up concurrently on a
//! bounded worker pool, and every finished job is handed to a reporter.
//!
//! ## Features
//!
//! - Expect/send engine over any async byte stream, with an append-only
//!   buffer and a consumption cursor so output is never matched twice
//! - Device scripts as data, with builtin scripts for Cisco IOS, Arista EOS
//!   and Juniper Junos
//! - SSH via russh and a minimal Telnet client
//! - Per-device job scheduler: one job per device at a time, bounded
//!   concurrency, job deadlines, periodic task runs and graceful stop
//! - Operator console with text and JSON replies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use confgrab::{
//!     ConnectorConfig, Credentials, Device, Inventory, LogReporter, NetworkConnector, Scheduler,
//!     SchedulerConfig, ScriptRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), confgrab::Error> {
//!     let inventory = Inventory::new()
//!         .with_device(
//!             Device::new("core-1", "192.0.2.1", "cisco_ios")
//!                 .with_credentials(Credentials::new("admin", "secret")),
//!         )
//!         .with_task("nightly", ["core-1"]);
//!
//!     let scheduler = Scheduler::new(
//!         SchedulerConfig::new(10),
//!         inventory,
//!         ScriptRegistry::with_builtin()?,
//!         NetworkConnector::new(ConnectorConfig::default()),
//!         LogReporter,
//!     )?;
//!
//!     let report = scheduler.run_single_backup("core-1").await?;
//!     if let Some(artifact) = report.outcome.artifact() {
//!         println!("{}", artifact.text);
//!     }
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod console;
pub mod error;
pub mod scheduler;
pub mod script;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use channel::{EngineConfig, ExpectEngine, Pattern};
pub use console::{Command, Console};
pub use error::{Error, Result};
pub use scheduler::{
    ChannelReporter, Inventory, JobOutcome, JobReport, JobState, LogReporter, Reporter, Scheduler,
    SchedulerConfig, SchedulerStatus,
};
pub use script::{DeviceScript, ScriptBuilder, ScriptRegistry, TimeoutPolicy};
pub use session::{Artifact, FailureKind, SessionFailure, SessionRunner};
pub use transport::{
    Connector, ConnectorConfig, Credentials, Device, HostKeyVerification, NetworkConnector,
    Protocol,
};
