//! Telnet transport over a plain TCP stream.
//!
//! Option negotiation is handled in-stream by [`TelnetNegotiator`]: every
//! request is refused except suppress-go-ahead, and negotiation bytes never
//! reach the channel. Login happens in-band, so the transport reports
//! [`InChannelAuth::Telnet`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::{debug, info, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::config::TransportConfig;
use super::{InChannelAuth, Transport};
use crate::error::{Result, TransportError};

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;
const SGA: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Data,
    Iac,
    Option(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Incremental telnet command filter.
///
/// Keeps state across chunks so a command split over two reads is still
/// recognised.
#[derive(Debug, Default)]
pub struct TelnetNegotiator {
    state: State,
}

impl TelnetNegotiator {
    /// Create a negotiator in the data state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `input` into session data and the negotiation replies to send.
    pub fn process(&mut self, input: &[u8]) -> (BytesMut, Vec<u8>) {
        let mut data = BytesMut::with_capacity(input.len());
        let mut replies = Vec::new();

        for &byte in input {
            self.state = match self.state {
                State::Data if byte == IAC => State::Iac,
                State::Data => {
                    data.extend_from_slice(&[byte]);
                    State::Data
                }
                State::Iac => match byte {
                    IAC => {
                        data.extend_from_slice(&[IAC]);
                        State::Data
                    }
                    DO | DONT | WILL | WONT => State::Option(byte),
                    SB => State::Subnegotiation,
                    _ => State::Data,
                },
                State::Option(command) => {
                    let reply = match (command, byte) {
                        (DO, SGA) => WILL,
                        (DO | DONT, _) => WONT,
                        (WILL, _) => DO,
                        _ => DONT,
                    };
                    trace!("telnet negotiation {} {} -> {}", command, byte, reply);
                    replies.extend_from_slice(&[IAC, reply, byte]);
                    State::Data
                }
                State::Subnegotiation if byte == IAC => State::SubnegotiationIac,
                State::Subnegotiation => State::Subnegotiation,
                State::SubnegotiationIac if byte == SE => State::Data,
                State::SubnegotiationIac => State::Subnegotiation,
            };
        }

        (data, replies)
    }
}

/// Telnet transport.
pub struct TelnetTransport {
    config: TransportConfig,
    timeout: Duration,
    stream: Option<TcpStream>,
    negotiator: TelnetNegotiator,
    eof: bool,
}

impl TelnetTransport {
    /// Create an unopened telnet transport.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            timeout: config.timeout_transport,
            config,
            stream: None,
            negotiator: TelnetNegotiator::new(),
            eof: false,
        }
    }
}

#[async_trait]
impl Transport for TelnetTransport {
    async fn open(&mut self) -> Result<()> {
        info!("opening telnet session to {}", self.config.socket_addr());
        let stream = tokio::time::timeout(
            self.config.timeout_socket,
            TcpStream::connect((self.config.host.as_str(), self.config.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.config.timeout_socket))?
        .map_err(|source| TransportError::ConnectionFailed {
            host: self.config.host.clone(),
            port: self.config.port,
            source,
        })?;

        stream.set_nodelay(true).map_err(TransportError::Io)?;
        self.stream = Some(stream);
        self.negotiator = TelnetNegotiator::new();
        self.eof = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("ignoring telnet shutdown error: {}", e);
            }
            info!("closed telnet session to {}", self.config.socket_addr());
        }
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotOpened)?;
        stream.write_all(data).await.map_err(TransportError::Io)?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Bytes> {
        let timeout = self.timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::NotOpened)?;
        if self.eof {
            return Err(TransportError::Disconnected.into());
        }

        let mut buf = [0u8; 4096];
        let n = tokio::time::timeout(timeout, stream.read(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(TransportError::Io)?;

        if n == 0 {
            self.eof = true;
            return Err(TransportError::Disconnected.into());
        }

        let (data, replies) = self.negotiator.process(&buf[..n]);
        if !replies.is_empty() {
            stream.write_all(&replies).await.map_err(TransportError::Io)?;
        }

        Ok(data.freeze())
    }

    fn is_alive(&self) -> bool {
        self.stream.is_some() && !self.eof
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn in_channel_auth(&self) -> InChannelAuth {
        InChannelAuth::Telnet
    }
}
