//! Transport layer: byte streams to a device's command shell.
//!
//! Anything that is `AsyncRead + AsyncWrite + Send + Unpin` is a
//! [`Transport`]: an SSH shell channel, a Telnet connection, or an
//! in-memory stream in tests. The expect engine never looks past that
//! capability set.
//!
//! A [`Connector`] acquires a fresh, exclusively owned transport for one
//! device. The scheduler calls it once per job attempt; transports are never
//! pooled or shared.

pub mod config;
mod ssh;
mod telnet;

pub use config::{ConnectorConfig, Credentials, Device, HostKeyVerification, Protocol};
pub use ssh::{SshShell, SshTransport};
pub use telnet::TelnetStream;

use std::future::Future;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{Result, TransportError};

/// A live bidirectional byte stream to a device shell.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Type-erased transport, used where SSH and Telnet devices mix.
pub type BoxedTransport = Box<dyn Transport>;

/// Opens transports for devices.
pub trait Connector: Send + Sync + 'static {
    /// The transport type produced by this connector.
    type Transport: Transport + 'static;

    /// Open a new session to `device`.
    fn connect(&self, device: &Device) -> impl Future<Output = Result<Self::Transport>> + Send;
}

/// Connector for real devices over SSH or Telnet.
#[derive(Debug, Clone, Default)]
pub struct NetworkConnector {
    config: ConnectorConfig,
}

impl NetworkConnector {
    /// Create a connector with the given configuration.
    pub fn new(config: ConnectorConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    async fn connect_telnet(&self, device: &Device) -> Result<TelnetStream<TcpStream>> {
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect((device.host.as_str(), device.port())),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.config.connect_timeout))?
        .map_err(|source| TransportError::ConnectionFailed {
            host: device.host.clone(),
            port: device.port(),
            source,
        })?;

        // Prompts arrive in tiny writes; do not let Nagle hold back our replies.
        stream.set_nodelay(true).map_err(TransportError::Io)?;

        Ok(TelnetStream::new(stream))
    }
}

impl Connector for NetworkConnector {
    type Transport = BoxedTransport;

    async fn connect(&self, device: &Device) -> Result<BoxedTransport> {
        debug!(
            "{}: connecting to {} via {}",
            device.id,
            device.socket_addr(),
            device.protocol
        );

        let transport: BoxedTransport = match device.protocol {
            Protocol::Ssh => {
                let ssh = SshTransport::connect(device, &self.config).await?;
                Box::new(ssh.open_shell().await?)
            }
            Protocol::Telnet => Box::new(self.connect_telnet(device).await?),
        };

        Ok(transport)
    }
}
