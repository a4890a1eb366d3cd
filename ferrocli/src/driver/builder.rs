//! Builder for creating device drivers.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use super::generic::GenericDriver;
use crate::channel::{ChannelConfig, LogMode};
use crate::error::{DriverError, Result};
use crate::platform::Platform;
use crate::transport::{AuthMethod, HostKeyVerification, TransportConfig, TransportKind};

/// Builder for constructing device drivers.
///
/// # Example
///
/// ```rust,no_run
/// use ferrocli::driver::{Driver, DriverBuilder};
/// use ferrocli::platform::Platform;
/// use ferrocli::transport::TransportKind;
///
/// # async fn example() -> Result<(), ferrocli::Error> {
/// let mut driver = DriverBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .auth_secondary("enable-secret")
///     .platform(Platform::CiscoIosxe)
///     .transport(TransportKind::Telnet)
///     .build()?;
/// driver.open().await?;
/// # Ok(())
/// # }
/// ```
pub struct DriverBuilder {
    host: String,
    port: Option<u16>,
    username: Option<String>,
    auth: AuthMethod,
    auth_secondary: Option<SecretString>,
    platform: Option<Platform>,
    transport: TransportKind,
    timeout_socket: Duration,
    timeout_transport: Duration,
    timeout_ops: Duration,
    terminal_size: Option<(u32, u32)>,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    channel_lock: bool,
    channel_log: Option<(PathBuf, LogMode)>,
    auto_expand: bool,
    strip_ansi: bool,
}

impl DriverBuilder {
    /// Create a new driver builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        let channel = ChannelConfig::default();
        Self {
            host: host.into(),
            port: None,
            username: None,
            auth: AuthMethod::None,
            auth_secondary: None,
            platform: None,
            transport: TransportKind::default(),
            timeout_socket: Duration::from_secs(15),
            timeout_transport: Duration::from_secs(30),
            timeout_ops: channel.timeout_ops,
            terminal_size: None,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            channel_lock: channel.channel_lock,
            channel_log: None,
            auto_expand: channel.auto_expand,
            strip_ansi: channel.strip_ansi,
        }
    }

    /// Set the port (default: 22 for SSH, 23 for telnet).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set password authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(SecretString::from(password.into()));
        self
    }

    /// Set private key authentication.
    pub fn private_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: None,
        };
        self
    }

    /// Set private key authentication with passphrase.
    pub fn private_key_with_passphrase(
        mut self,
        key_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
    ) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: key_path.into(),
            passphrase: Some(SecretString::from(passphrase.into())),
        };
        self
    }

    /// Secret sent when escalating into a level that asks for one.
    pub fn auth_secondary(mut self, secret: impl Into<String>) -> Self {
        self.auth_secondary = Some(SecretString::from(secret.into()));
        self
    }

    /// Set the platform (built-in or custom definition).
    pub fn platform(mut self, platform: impl Into<Platform>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// Select the transport backend (default: SSH).
    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Set the connection timeout.
    pub fn timeout_socket(mut self, timeout: Duration) -> Self {
        self.timeout_socket = timeout;
        self
    }

    /// Set the read timeout of a single transport read.
    pub fn timeout_transport(mut self, timeout: Duration) -> Self {
        self.timeout_transport = timeout;
        self
    }

    /// Set the bound on every channel operation. Zero disables it.
    pub fn timeout_ops(mut self, timeout: Duration) -> Self {
        self.timeout_ops = timeout;
        self
    }

    /// Set terminal dimensions (default: the platform's).
    pub fn terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_size = Some((width, height));
        self
    }

    /// Set the host key verification mode.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    /// Set a custom known_hosts file path.
    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Hold the channel exclusively for the whole of each operation.
    pub fn channel_lock(mut self, enabled: bool) -> Self {
        self.channel_lock = enabled;
        self
    }

    /// Mirror everything read from the device to a file.
    pub fn channel_log(mut self, path: impl Into<PathBuf>, mode: LogMode) -> Self {
        self.channel_log = Some((path.into(), mode));
        self
    }

    /// Accept echoes the CLI expanded from abbreviated commands.
    pub fn auto_expand(mut self, enabled: bool) -> Self {
        self.auto_expand = enabled;
        self
    }

    /// Strip ANSI escape sequences from device output.
    pub fn strip_ansi(mut self, enabled: bool) -> Self {
        self.strip_ansi = enabled;
        self
    }

    /// Build the driver.
    ///
    /// This creates the driver but does not connect. Call `open()` on the
    /// returned driver to establish the connection.
    pub fn build(self) -> Result<GenericDriver> {
        let username = self.username.ok_or_else(|| DriverError::InvalidConfig {
            message: "username is required".to_string(),
        })?;
        let platform = self.platform.ok_or_else(|| DriverError::InvalidConfig {
            message: "platform must be specified".to_string(),
        })?;
        let port = self
            .port
            .or_else(|| self.transport.default_port())
            .ok_or_else(|| DriverError::InvalidConfig {
                message: format!(
                    "{:?} transport has no default port, set one explicitly",
                    self.transport
                ),
            })?;

        let definition = platform.definition()?;
        let (terminal_width, terminal_height) = self
            .terminal_size
            .unwrap_or((definition.terminal_width, definition.terminal_height));

        let mut transport_config = TransportConfig::new(self.host, port, username);
        transport_config.auth = self.auth;
        transport_config.timeout_socket = self.timeout_socket;
        transport_config.timeout_transport = self.timeout_transport;
        transport_config.terminal_width = terminal_width;
        transport_config.terminal_height = terminal_height;
        transport_config.host_key_verification = self.host_key_verification;
        transport_config.known_hosts_path = self.known_hosts_path;

        let channel_config = ChannelConfig {
            timeout_ops: self.timeout_ops,
            channel_lock: self.channel_lock,
            auto_expand: self.auto_expand,
            strip_ansi: self.strip_ansi,
            ..ChannelConfig::default()
        };

        let mut driver =
            GenericDriver::new(transport_config, self.transport, channel_config, definition)?
                .with_auth_secondary(self.auth_secondary);
        if let Some((path, mode)) = self.channel_log {
            driver = driver.with_channel_log(path, mode);
        }
        Ok(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, PrivilegeError};
    use crate::platform::{PlatformDefinition, PrivilegeLevel};

    #[test]
    fn test_defaults_follow_transport_and_platform() {
        let driver = DriverBuilder::new("r1")
            .username("admin")
            .platform(Platform::CiscoIosxe)
            .build()
            .unwrap();
        assert_eq!(driver.transport_config().port, 22);
        assert_eq!(driver.platform().name, "cisco_iosxe");
        assert_eq!(
            driver.transport_config().terminal_width,
            driver.platform().terminal_width
        );

        let driver = DriverBuilder::new("r1")
            .username("admin")
            .platform(Platform::Linux)
            .transport(TransportKind::Telnet)
            .terminal_size(200, 50)
            .timeout_ops(Duration::from_secs(5))
            .strip_ansi(true)
            .build()
            .unwrap();
        assert_eq!(driver.transport_config().port, 23);
        assert_eq!(driver.transport_config().terminal_width, 200);
        assert_eq!(driver.channel_config().timeout_ops, Duration::from_secs(5));
        assert!(driver.channel_config().strip_ansi);
    }

    #[test]
    fn test_prompt_pattern_covers_every_level() {
        let driver = DriverBuilder::new("r1")
            .username("admin")
            .platform(Platform::AristaEos)
            .build()
            .unwrap();
        let pattern = &driver.channel_config().prompt_pattern;
        for level in driver.privilege_manager().levels().values() {
            assert!(pattern.contains(level.pattern_source()));
        }
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let err = DriverBuilder::new("r1")
            .platform(Platform::Linux)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Driver(DriverError::InvalidConfig { .. })));

        let err = DriverBuilder::new("r1").username("admin").build().unwrap_err();
        assert!(matches!(err, Error::Driver(DriverError::InvalidConfig { .. })));
    }

    #[test]
    fn test_custom_transport_requires_port() {
        let factory = |_: &TransportConfig| -> Result<Box<dyn crate::transport::Transport>> {
            Err(DriverError::NotConnected.into())
        };
        let builder = || {
            DriverBuilder::new("r1")
                .username("admin")
                .platform(Platform::Linux)
                .transport(TransportKind::Custom(std::sync::Arc::new(factory)))
        };
        assert!(builder().build().is_err());
        assert_eq!(builder().port(830).build().unwrap().transport_config().port, 830);
    }

    #[test]
    fn test_invalid_custom_platform() {
        let definition = PlatformDefinition::new("broken")
            .with_privilege(PrivilegeLevel::new("a", r">$").unwrap())
            .with_privilege(PrivilegeLevel::new("b", r"#$").unwrap())
            .with_default_privilege("a");
        let err = DriverBuilder::new("r1")
            .username("admin")
            .platform(definition)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Privilege(PrivilegeError::InvalidGraph { .. })
        ));
    }
}
