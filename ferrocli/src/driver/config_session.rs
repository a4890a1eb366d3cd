//! Configuration session traits and RAII guards.
//!
//! Config sessions are treated as **transactions** layered over the
//! privilege engine:
//! - The guard holds `&mut GenericDriver`, preventing concurrent driver use
//! - `commit()`/`abort()` consume the guard and return the device to the
//!   level it was at when the session started
//! - `detach()` releases the guard without ending the session
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrocli::{ConfigSession, Driver, DriverBuilder, Platform};
//!
//! # async fn example() -> Result<(), ferrocli::Error> {
//! let mut driver = DriverBuilder::new("192.168.1.1")
//!     .username("admin")
//!     .password("secret")
//!     .platform(Platform::CiscoIosxe)
//!     .build()?;
//! driver.open().await?;
//!
//! let mut session = driver.config_session().await?;
//! session.send_command("hostname edge1").await?;
//! session.commit().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use log::warn;

use super::Driver;
use super::generic::GenericDriver;
use super::response::Response;
use crate::error::Result;

/// Core configuration session trait.
///
/// `commit()`, `abort()` and `detach()` consume the session by value, so a
/// finished session cannot be used again.
pub trait ConfigSession: Send {
    /// Send a command within the configuration session.
    fn send_command(&mut self, cmd: &str) -> impl Future<Output = Result<Response>> + Send;

    /// Commit the configuration and leave the session.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    /// Discard the configuration and leave the session.
    fn abort(self) -> impl Future<Output = Result<()>> + Send;

    /// Release the guard without committing or aborting.
    ///
    /// The session remains active on the device. Call the vendor's
    /// session constructor again with the same name to re-attach.
    fn detach(self) -> Result<()>;
}

/// Sessions that support viewing uncommitted changes.
pub trait Diffable: ConfigSession {
    /// Show the diff of uncommitted changes.
    fn diff(&mut self) -> impl Future<Output = Result<String>> + Send;
}

/// Sessions that support confirmed commits with auto-rollback.
pub trait ConfirmableCommit: ConfigSession {
    /// Commit, rolling back automatically unless confirmed within `timeout`.
    fn commit_confirmed(&mut self, timeout: Duration) -> impl Future<Output = Result<()>> + Send;
}

/// Named configuration sessions.
pub trait NamedSession: ConfigSession {
    /// Get the session name.
    fn session_name(&self) -> &str;
}

/// The level a session returns to: where the driver was, else the default.
pub(crate) fn return_level(driver: &GenericDriver) -> String {
    driver
        .current_privilege()
        .map(str::to_string)
        .unwrap_or_else(|| driver.platform().default_privilege.clone())
}

/// RAII guard for a plain configuration mode session.
///
/// Works for any platform with a configuration privilege level. Changes
/// apply as they are entered, so `commit()` and `abort()` only leave the
/// mode. For vendor transactions use the vendor's session type instead
/// (e.g. `AristaConfigSession`).
pub struct GenericConfigSession<'a> {
    driver: &'a mut GenericDriver,
    original_privilege: String,
    consumed: bool,
}

impl<'a> GenericConfigSession<'a> {
    /// Enter the platform's configuration level.
    pub async fn new(driver: &'a mut GenericDriver) -> Result<Self> {
        let original_privilege = return_level(driver);
        let config_privilege = driver.configuration_privilege()?;
        driver.acquire_privilege(&config_privilege).await?;

        Ok(Self {
            driver,
            original_privilege,
            consumed: false,
        })
    }

    async fn leave(mut self) -> Result<()> {
        self.consumed = true;
        self.driver
            .acquire_privilege(&self.original_privilege)
            .await
    }
}

impl ConfigSession for GenericConfigSession<'_> {
    async fn send_command(&mut self, cmd: &str) -> Result<Response> {
        self.driver.send_command(cmd).await
    }

    async fn commit(self) -> Result<()> {
        self.leave().await
    }

    /// Leave configuration mode.
    ///
    /// Plain configuration mode has no candidate to discard: every command
    /// already sent is live in the running config, so this cannot roll
    /// anything back. Use a vendor session when a real abort is needed.
    async fn abort(self) -> Result<()> {
        warn!("configuration mode cannot discard applied changes, only leaving it");
        self.leave().await
    }

    fn detach(mut self) -> Result<()> {
        self.consumed = true;
        Ok(())
    }
}

impl Drop for GenericConfigSession<'_> {
    fn drop(&mut self) {
        if !self.consumed {
            warn!("GenericConfigSession dropped without explicit commit/abort/detach");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverBuilder;
    use crate::platform::Platform;
    use crate::transport::MockTransport;

    fn iosxe(mock: &MockTransport) -> GenericDriver {
        DriverBuilder::new("192.0.2.1")
            .username("admin")
            .platform(Platform::CiscoIosxe)
            .port(22)
            .transport(mock.transport_kind())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_returns_to_original_level() {
        let mock = MockTransport::new("edge1#");
        mock.transition("configure terminal", "edge1(config)#")
            .transition("end", "edge1#");
        let mut driver = iosxe(&mock);
        driver.open().await.unwrap();
        assert_eq!(driver.current_privilege(), Some("privilege_exec"));

        let mut session = driver.config_session().await.unwrap();
        let response = session.send_command("hostname edge1").await.unwrap();
        assert_eq!(response.prompt, "edge1(config)#");
        session.commit().await.unwrap();

        assert_eq!(driver.current_privilege(), Some("privilege_exec"));
        let sent: Vec<String> = mock.lines().into_iter().filter(|l| !l.is_empty()).collect();
        assert_eq!(
            sent,
            vec![
                "terminal length 0",
                "terminal width 512",
                "configure terminal",
                "hostname edge1",
                "end"
            ]
        );
    }

    #[tokio::test]
    async fn test_abort_only_leaves_config_mode() {
        let mock = MockTransport::new("edge1#");
        mock.transition("configure terminal", "edge1(config)#")
            .transition("end", "edge1#");
        let mut driver = iosxe(&mock);
        driver.open().await.unwrap();

        let mut session = driver.config_session().await.unwrap();
        session.send_command("hostname edge1").await.unwrap();
        session.abort().await.unwrap();

        assert_eq!(driver.current_privilege(), Some("privilege_exec"));
        let sent: Vec<String> = mock
            .lines()
            .into_iter()
            .filter(|l| !l.is_empty() && !l.starts_with("terminal "))
            .collect();
        assert_eq!(sent, vec!["configure terminal", "hostname edge1", "end"]);
    }

    #[tokio::test]
    async fn test_detach_leaves_device_in_config_mode() {
        let mock = MockTransport::new("edge1#");
        mock.transition("configure terminal", "edge1(config)#");
        let mut driver = iosxe(&mock);
        driver.open().await.unwrap();

        let session = driver.config_session().await.unwrap();
        session.detach().unwrap();
        assert_eq!(driver.current_privilege(), Some("configuration"));
    }
}
