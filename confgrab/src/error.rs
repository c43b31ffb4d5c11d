//! Error types for confgrab.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Main error type for confgrab operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors (SSH/Telnet connection setup)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Expect engine errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Device script errors
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Scheduler admission and lifecycle errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Operator console parse errors
    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}

/// Transport layer errors (connection, SSH authentication, host keys).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host is not present in known_hosts and verification is strict
    #[error("Host key for {host}:{port} is not known")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Expect engine errors.
///
/// Timeout and EOF errors carry the unconsumed buffer at the moment of
/// failure so callers can tell a wrong pattern from a silent device.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Writing to the transport failed (closed stream, peer reset)
    #[error("Transport write failed: {0}")]
    Write(#[source] io::Error),

    /// Reading from the transport failed
    #[error("Transport read failed: {0}")]
    Read(#[source] io::Error),

    /// Pattern matching timed out
    #[error("Pattern not found within {timeout:?}")]
    Timeout { timeout: Duration, buffer: Bytes },

    /// Stream reached EOF before the pattern matched
    #[error("Unexpected EOF while waiting for pattern")]
    Eof { buffer: Bytes },

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

impl ChannelError {
    /// The buffer snapshot attached to the error, if any.
    pub fn buffer(&self) -> Option<&Bytes> {
        match self {
            ChannelError::Timeout { buffer, .. } | ChannelError::Eof { buffer } => Some(buffer),
            _ => None,
        }
    }
}

/// Device script definition errors.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Invalid script definition
    #[error("Invalid script definition: {message}")]
    InvalidDefinition { message: String },

    /// Script name not present in the registry
    #[error("Unknown script: {name}")]
    UnknownScript { name: String },

    /// Script name registered twice
    #[error("Script already registered: {name}")]
    AlreadyRegistered { name: String },

    /// A step or prompt pattern failed to compile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Scheduler admission errors.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The device already has a queued or running job
    #[error("Device '{device_id}' already has a job in flight")]
    DuplicateDeviceJob { device_id: String },

    /// Ad-hoc work is rejected while the scheduler is stopping
    #[error("Scheduler is not running, request rejected")]
    SchedulerNotRunning,

    /// A lifecycle change was requested while a stop is in progress
    #[error("Scheduler is stopping")]
    Stopping,

    /// Device id not present in the inventory
    #[error("Unknown device: {device_id}")]
    UnknownDevice { device_id: String },

    /// Task name not present in the inventory
    #[error("Unknown task: {task}")]
    UnknownTask { task: String },

    /// Device refers to a script that is not registered
    #[error("Device '{device_id}' uses unknown script '{script}'")]
    UnknownScript { device_id: String, script: String },

    /// Scheduler settings that cannot work
    #[error("Invalid scheduler configuration: {message}")]
    InvalidConfig { message: String },

    /// The worker for a job went away without reporting an outcome
    #[error("Job {job_id} ended without an outcome")]
    JobLost { job_id: u64 },
}

/// Operator command parse errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// First word is not a known command
    #[error("Unknown command '{0}', try 'help'")]
    UnknownCommand(String),

    /// A required argument was not given
    #[error("Command '{command}' requires <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    /// More arguments than the command takes
    #[error("Command '{command}' takes no argument '{extra}'")]
    UnexpectedArgument { command: &'static str, extra: String },
}

/// Result type alias using confgrab's Error.
pub type Result<T> = std::result::Result<T, Error>;
