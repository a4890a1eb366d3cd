//! Transport layer.
//!
//! A transport is the byte-level session primitive the channel drives. It
//! knows nothing about prompts; it opens, closes, writes bytes and returns
//! whatever bytes the device produced within its read timeout.
//!
//! Backends are selected explicitly through [`TransportKind`] when the driver
//! is built. Out-of-tree backends plug in with [`TransportKind::Custom`].

pub mod config;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod ssh;
mod telnet;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub use config::{AuthMethod, HostKeyVerification, TransportConfig};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockTransport;
pub use ssh::SshTransport;
pub use telnet::{TelnetNegotiator, TelnetTransport};

use crate::error::Result;

/// Which in-band login dialogue, if any, the channel must run after `open()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InChannelAuth {
    /// The transport authenticated before the channel existed.
    #[default]
    None,
    /// Answer ssh password/passphrase challenges on the channel.
    Ssh,
    /// Answer telnet username/password challenges on the channel.
    Telnet,
}

/// Byte-level session primitive consumed by [`Channel`](crate::channel::Channel).
///
/// `read` blocks for at most the configured timeout and fails with
/// [`TransportError::Timeout`](crate::error::TransportError::Timeout) when
/// nothing arrives, or
/// [`TransportError::Disconnected`](crate::error::TransportError::Disconnected)
/// once the session has ended. Calls made before `open` (or after `close`)
/// fail with [`TransportError::NotOpened`](crate::error::TransportError::NotOpened).
#[async_trait]
pub trait Transport: Send {
    /// Establish the session.
    async fn open(&mut self) -> Result<()>;

    /// Tear down the session.
    async fn close(&mut self) -> Result<()>;

    /// Write raw bytes to the session.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read the next chunk of bytes. May return an empty chunk.
    async fn read(&mut self) -> Result<Bytes>;

    /// Whether the session is still usable.
    fn is_alive(&self) -> bool;

    /// Current read timeout.
    fn timeout(&self) -> Duration;

    /// Change the read timeout for subsequent reads.
    fn set_timeout(&mut self, timeout: Duration);

    /// In-band login required after `open()`.
    fn in_channel_auth(&self) -> InChannelAuth {
        InChannelAuth::None
    }
}

/// Constructor for out-of-tree transports.
pub trait TransportFactory: Send + Sync {
    /// Build an unopened transport for the given connection settings.
    fn create(&self, config: &TransportConfig) -> Result<Box<dyn Transport>>;
}

impl<F> TransportFactory for F
where
    F: Fn(&TransportConfig) -> Result<Box<dyn Transport>> + Send + Sync,
{
    fn create(&self, config: &TransportConfig) -> Result<Box<dyn Transport>> {
        self(config)
    }
}

/// Transport backend selection.
#[derive(Clone, Default)]
pub enum TransportKind {
    /// SSH via russh; authentication happens in the protocol.
    #[default]
    Ssh,
    /// Plain telnet; authentication happens in-band on the channel.
    Telnet,
    /// Caller-supplied backend.
    Custom(Arc<dyn TransportFactory>),
}

impl TransportKind {
    /// Default port for this backend, if it has one.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            TransportKind::Ssh => Some(22),
            TransportKind::Telnet => Some(23),
            TransportKind::Custom(_) => None,
        }
    }

    /// Build an unopened transport.
    pub fn create(&self, config: &TransportConfig) -> Result<Box<dyn Transport>> {
        match self {
            TransportKind::Ssh => Ok(Box::new(SshTransport::new(config.clone()))),
            TransportKind::Telnet => Ok(Box::new(TelnetTransport::new(config.clone()))),
            TransportKind::Custom(factory) => factory.create(config),
        }
    }
}

impl fmt::Debug for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Ssh => f.write_str("Ssh"),
            TransportKind::Telnet => f.write_str("Telnet"),
            TransportKind::Custom(_) => f.write_str("Custom(<TransportFactory>)"),
        }
    }
}
