//! Device connection configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

/// Remote shell protocol used to reach a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Ssh,
    Telnet,
}

impl Protocol {
    /// Well-known port for the protocol.
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Ssh => 22,
            Protocol::Telnet => 23,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ssh => f.write_str("ssh"),
            Protocol::Telnet => f.write_str("telnet"),
        }
    }
}

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For lab use only.
    Disabled,
}

/// Login material for a device.
///
/// Over SSH the username/password pair authenticates the transport itself;
/// over Telnet the device script types them at the login prompts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,

    /// Password for privileged mode (`enable`), when the script needs one.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub enable_password: Option<SecretString>,
}

impl Credentials {
    /// Credentials with a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(SecretString::from(password.into())),
            enable_password: None,
        }
    }

    /// Set the enable password.
    pub fn with_enable_password(mut self, password: impl Into<String>) -> Self {
        self.enable_password = Some(SecretString::from(password.into()));
        self
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// One managed device, as listed in the inventory.
#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    /// Stable identifier used by operators and the reporter.
    pub id: String,

    /// Hostname or IP address.
    pub host: String,

    /// Port override; defaults to the protocol's well-known port.
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub protocol: Protocol,

    /// Name of the device script in the script registry.
    pub script: String,

    #[serde(flatten)]
    pub credentials: Credentials,
}

impl Device {
    /// Create a device entry reached over SSH on the default port.
    pub fn new(id: impl Into<String>, host: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port: None,
            protocol: Protocol::Ssh,
            script: script.into(),
            credentials: Credentials::default(),
        }
    }

    /// Use a specific protocol.
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Use a non-default port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Attach credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Effective port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port())
    }
}

/// Settings for [`NetworkConnector`](super::NetworkConnector).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// TCP connect plus SSH handshake/authentication budget.
    #[serde(with = "crate::scheduler::config::secs")]
    pub connect_timeout: Duration,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file (defaults to the user's).
    pub known_hosts_path: Option<PathBuf>,

    /// Terminal width for the SSH PTY.
    pub terminal_width: u32,

    /// Terminal height for the SSH PTY.
    pub terminal_height: u32,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            terminal_width: 511,
            terminal_height: 24,
        }
    }
}
