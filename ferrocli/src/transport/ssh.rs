//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, trace, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg};
use secrecy::ExposeSecret;

use super::Transport;
use super::config::{AuthMethod, HostKeyVerification, TransportConfig};
use crate::error::{Result, TransportError};

/// SSH transport wrapping a russh client session and one PTY shell channel.
pub struct SshTransport {
    /// Configuration used for this connection.
    config: TransportConfig,

    /// Current read timeout.
    timeout: Duration,

    /// The russh session handle (None until opened).
    session: Option<Handle<SshHandler>>,

    /// The interactive shell channel (None until opened).
    channel: Option<Channel<Msg>>,

    /// Set once the remote side sent EOF/close.
    eof: bool,
}

impl SshTransport {
    /// Create an unopened SSH transport.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            timeout: config.timeout_transport,
            config,
            session: None,
            channel: None,
            eof: false,
        }
    }

    /// Connect and authenticate, returning the session handle.
    async fn connect(config: &TransportConfig) -> Result<Handle<SshHandler>> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        let mut session = tokio::time::timeout(
            config.timeout_socket,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout_socket))?
        .map_err(|e| {
            // Prefer the detailed error recorded by check_server_key over
            // the generic russh::Error::UnknownKey.
            let stored = host_key_error
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take();
            stored.unwrap_or(TransportError::Ssh(e))
        })?;

        Self::authenticate(&mut session, config).await?;

        Ok(session)
    }

    /// Open a PTY shell channel on the session.
    async fn open_channel(&self, session: &Handle<SshHandler>) -> Result<Channel<Msg>> {
        let channel = session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(channel)
    }

    /// Authenticate with the server.
    async fn authenticate(session: &mut Handle<SshHandler>, config: &TransportConfig) -> Result<()> {
        let success = match &config.auth {
            AuthMethod::None => session
                .authenticate_none(&config.username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn open(&mut self) -> Result<()> {
        info!("opening ssh session to {}", self.config.socket_addr());
        let session = Self::connect(&self.config).await?;
        let channel = self.open_channel(&session).await?;
        self.session = Some(session);
        self.channel = Some(channel);
        self.eof = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!("ignoring channel close error: {}", e);
            }
        }
        if let Some(session) = self.session.take() {
            session
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
                .map_err(TransportError::Ssh)?;
        }
        info!("closed ssh session to {}", self.config.socket_addr());
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let channel = self.channel.as_ref().ok_or(TransportError::NotOpened)?;
        channel.data(data).await.map_err(TransportError::Ssh)?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Bytes> {
        let timeout = self.timeout;
        let channel = self.channel.as_mut().ok_or(TransportError::NotOpened)?;
        if self.eof {
            return Err(TransportError::Disconnected.into());
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let msg = tokio::time::timeout_at(deadline, channel.wait())
                .await
                .map_err(|_| TransportError::Timeout(timeout))?;

            match msg {
                Some(ChannelMsg::Data { data }) => return Ok(Bytes::copy_from_slice(&data)),
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    return Ok(Bytes::copy_from_slice(&data));
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    self.eof = true;
                    return Err(TransportError::Disconnected.into());
                }
                Some(other) => trace!("ignoring channel message: {:?}", other),
            }
        }
    }

    fn is_alive(&self) -> bool {
        !self.eof
            && self.channel.is_some()
            && self.session.as_ref().is_some_and(|s| !s.is_closed())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(
                "ssh transport to {} dropped without close()",
                self.config.socket_addr()
            );
        }
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Detailed host-key error surfaced by connect() instead of the
    /// generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(TransportError::HostKeyChanged)` if key changed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> bool {
        *self
            .host_key_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(error);
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.host_key_verification {
            HostKeyVerification::Disabled => Ok(true),

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    Ok(true)
                }
                Err(e) => Ok(self.reject(e)),
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => Ok(self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                })),
                Err(e) => Ok(self.reject(e)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unopened_transport_rejects_io() {
        let mut transport = SshTransport::new(TransportConfig::new("192.0.2.1", 22, "admin"));
        assert!(!transport.is_alive());

        let err = transport.write(b"show version").await.unwrap_err();
        assert!(err.is_not_opened());

        let err = transport.read().await.unwrap_err();
        assert!(err.is_not_opened());
    }

    #[test]
    fn test_timeout_follows_config_and_setter() {
        let mut config = TransportConfig::new("192.0.2.1", 22, "admin");
        config.timeout_transport = Duration::from_secs(7);
        let mut transport = SshTransport::new(config);
        assert_eq!(transport.timeout(), Duration::from_secs(7));

        transport.set_timeout(Duration::from_millis(250));
        assert_eq!(transport.timeout(), Duration::from_millis(250));
    }
}
