//! Transport connection configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For testing and lab use only.
    Disabled,
}

/// Connection settings shared by every transport backend.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// Port (22 for SSH, 23 for telnet by default).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Authentication method.
    pub auth: AuthMethod,

    /// Timeout for establishing the connection.
    pub timeout_socket: Duration,

    /// Read timeout for a single transport read.
    pub timeout_transport: Duration,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file.
    pub known_hosts_path: Option<PathBuf>,
}

impl TransportConfig {
    /// Settings with default timeouts and terminal size.
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth: AuthMethod::None,
            timeout_socket: Duration::from_secs(15),
            timeout_transport: Duration::from_secs(30),
            terminal_width: 511,
            terminal_height: 24,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Authentication method.
#[derive(Clone, Default)]
pub enum AuthMethod {
    /// No authentication.
    #[default]
    None,

    /// Password authentication.
    Password(SecretString),

    /// Private key authentication.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },
}

impl AuthMethod {
    /// The password, if this is password authentication.
    pub fn password(&self) -> Option<&SecretString> {
        match self {
            AuthMethod::Password(password) => Some(password),
            _ => None,
        }
    }

    /// The key passphrase, if one was given.
    pub fn passphrase(&self) -> Option<&SecretString> {
        match self {
            AuthMethod::PrivateKey { passphrase, .. } => passphrase.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::None => f.write_str("None"),
            AuthMethod::Password(_) => f.write_str("Password(<redacted>)"),
            AuthMethod::PrivateKey { path, passphrase } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr() {
        let config = TransportConfig::new("switch1", 2222, "admin");
        assert_eq!(config.socket_addr(), "switch1:2222");
    }

    #[test]
    fn test_auth_debug_hides_secrets() {
        let auth = AuthMethod::Password(SecretString::from("hunter2"));
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("hunter2"));

        let auth = AuthMethod::PrivateKey {
            path: PathBuf::from("/tmp/id_ed25519"),
            passphrase: Some(SecretString::from("open sesame")),
        };
        let rendered = format!("{auth:?}");
        assert!(rendered.contains("id_ed25519"));
        assert!(!rendered.contains("open sesame"));
        assert!(auth.passphrase().is_some());
        assert!(auth.password().is_none());
    }

    #[test]
    fn test_host_key_verification_serde() {
        let mode: HostKeyVerification = serde_json::from_str("\"strict\"").unwrap();
        assert_eq!(mode, HostKeyVerification::Strict);
        assert_eq!(
            serde_json::to_string(&HostKeyVerification::AcceptNew).unwrap(),
            "\"accept_new\""
        );
    }
}
