//! Error types for ferrocli.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for ferrocli operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport errors (connection, SSH/Telnet protocol, transport auth)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Driver-level errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Privilege level errors
    #[error("Privilege error: {0}")]
    Privilege(#[from] PrivilegeError),

    /// Platform/vendor errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// A bounded operation did not complete in time.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },
}

impl Error {
    /// True for operation timeouts and transport read timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::Transport(TransportError::Timeout(_))
        )
    }

    /// True for in-band and transport-level authentication failures.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Error::Channel(ChannelError::AuthenticationFailed { .. })
                | Error::Transport(TransportError::AuthenticationFailed { .. })
        )
    }

    /// True when an operation was attempted without an open session.
    pub fn is_not_opened(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError::NotOpened) | Error::Driver(DriverError::NotConnected)
        )
    }
}

/// Transport layer errors (connection, protocol, transport authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Operation attempted before open() or after close()
    #[error("Transport not opened")]
    NotOpened,

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

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host not present in known_hosts under strict checking
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Read did not complete within the transport timeout
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (pattern matching, in-band login, input validation).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// In-band login failed or a challenge exceeded its retry budget
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Malformed input to a channel operation
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

/// Driver layer errors (connection state, configuration).
#[derive(Error, Debug)]
pub enum DriverError {
    /// Driver not connected
    #[error("Driver not connected - call open() first")]
    NotConnected,

    /// Driver already connected
    #[error("Driver already connected")]
    AlreadyConnected,

    /// A command the driver relies on reported a failure
    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Invalid configuration in the driver builder
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Privilege level errors.
#[derive(Error, Debug)]
pub enum PrivilegeError {
    /// No privilege level matches the prompt
    #[error("Unknown privilege level from prompt: '{prompt}'")]
    UnknownLevel { prompt: String },

    /// More than one privilege level matches the prompt
    #[error("Ambiguous privilege level from prompt '{prompt}': matches {candidates:?}")]
    AmbiguousLevel {
        prompt: String,
        candidates: Vec<String>,
    },

    /// No level with this name is defined
    #[error("Privilege level '{name}' is not defined")]
    UndefinedLevel { name: String },

    /// Hop budget exhausted before reaching the target
    #[error("Failed to acquire privilege level '{target}'")]
    AcquisitionFailed { target: String },

    /// The device kept reporting the same level after transition attempts
    #[error("No progress acquiring privilege level '{target}', device stayed at '{prompt}'")]
    NoProgress { target: String, prompt: String },

    /// No path found between privilege levels
    #[error("No path from privilege '{from}' to '{to}'")]
    NoPath { from: String, to: String },

    /// A level with this name already exists
    #[error("Privilege level '{name}' already exists")]
    DuplicateLevel { name: String },

    /// Graph structure is invalid (roots, dangling parents, missing commands)
    #[error("Invalid privilege graph: {message}")]
    InvalidGraph { message: String },
}

/// Platform/vendor definition errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// No built-in platform has this name
    #[error("Unknown platform: {name}")]
    UnknownPlatform { name: String },

    /// Invalid platform definition
    #[error("Invalid platform definition: {message}")]
    InvalidDefinition { message: String },
}

/// Result type alias using ferrocli's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_helpers() {
        let err: Error = TransportError::Timeout(Duration::from_secs(1)).into();
        assert!(err.is_timeout());
        assert!(!err.is_not_opened());

        let err = Error::Timeout {
            operation: "send_input",
            duration: Duration::from_secs(5),
        };
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Operation 'send_input' timed out after 5s"
        );

        let err: Error = ChannelError::AuthenticationFailed {
            message: "Host key verification failed".into(),
        }
        .into();
        assert!(err.is_authentication_failure());

        let err: Error = TransportError::NotOpened.into();
        assert!(err.is_not_opened());
        let err: Error = DriverError::NotConnected.into();
        assert!(err.is_not_opened());
    }

    #[test]
    fn test_privilege_error_messages() {
        let err = PrivilegeError::AmbiguousLevel {
            prompt: "router#".into(),
            candidates: vec!["a".into(), "b".into()],
        };
        assert!(err.to_string().contains("router#"));
        assert!(err.to_string().contains("\"a\""));
    }
}
