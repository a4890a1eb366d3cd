//! Arista EOS named configuration session.
//!
//! Provides RAII-guarded access to Arista's `configure session` feature.
//! Named sessions provide an isolated candidate configuration that can be
//! committed, aborted, or detached for later re-attachment.
//!
//! # Example
//!
//! ```rust,no_run
//! use ferrocli::{ConfigSession, Driver, DriverBuilder, Platform};
//! use ferrocli::driver::Diffable;
//! use ferrocli::platform::vendors::arista::AristaConfigSession;
//!
//! # async fn example() -> Result<(), ferrocli::Error> {
//! let mut driver = DriverBuilder::new("switch.example.com")
//!     .username("admin")
//!     .password("secret")
//!     .platform(Platform::AristaEos)
//!     .build()?;
//! driver.open().await?;
//!
//! let mut session = AristaConfigSession::new(&mut driver, "my-changes").await?;
//! session.send_command("interface Ethernet1").await?;
//! session.send_command("description uplink").await?;
//!
//! let diff = session.diff().await?;
//! println!("Changes:\n{}", diff);
//!
//! session.commit().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use log::{debug, warn};

use super::platform::{PLATFORM_NAME, session_level, session_level_name};
use crate::driver::config_session::{
    ConfigSession, ConfirmableCommit, Diffable, NamedSession, return_level,
};
use crate::driver::{Driver, GenericDriver, Response};
use crate::error::{DriverError, Result};

/// Arista EOS named configuration session guard.
///
/// Holds `&mut GenericDriver` to prevent concurrent driver use.
///
/// # Re-attach
///
/// The session's privilege level stays registered after the guard is gone.
/// After [`detach()`](ConfigSession::detach), calling
/// `AristaConfigSession::new()` with the same name re-enters the session;
/// `configure session <name>` also re-enters one another program opened.
pub struct AristaConfigSession<'a> {
    driver: &'a mut GenericDriver,
    session_name: String,
    original_privilege: String,
    consumed: bool,
}

impl<'a> AristaConfigSession<'a> {
    /// Create or re-attach to a named configuration session.
    pub async fn new(
        driver: &'a mut GenericDriver,
        session_name: impl Into<String>,
    ) -> Result<Self> {
        let session_name = session_name.into();

        if driver.platform().name != PLATFORM_NAME {
            return Err(DriverError::InvalidConfig {
                message: format!(
                    "AristaConfigSession requires an Arista EOS platform, got '{}'",
                    driver.platform().name
                ),
            }
            .into());
        }

        let level_name = session_level_name(&session_name);
        let mut original_privilege = return_level(driver);
        // re-attaching from inside a session returns to its parent
        if let Some(parent) = driver
            .privilege_manager()
            .get(&original_privilege)
            .filter(|level| level.name.starts_with("config_session_"))
            .and_then(|level| level.previous_priv.clone())
        {
            original_privilege = parent;
        }

        if driver.privilege_manager().get(&level_name).is_none() {
            driver.register_dynamic_level(session_level(&session_name)?)?;
        } else {
            debug!("re-attaching to config session '{}'", session_name);
        }
        driver.acquire_privilege(&level_name).await?;

        Ok(Self {
            driver,
            session_name,
            original_privilege,
            consumed: false,
        })
    }

    /// End the session with `command`, then go back to where we started.
    async fn finish(mut self, command: &str) -> Result<()> {
        self.consumed = true;
        self.driver.send_command(command).await?.into_result()?;
        self.driver
            .acquire_privilege(&self.original_privilege)
            .await
    }
}

impl ConfigSession for AristaConfigSession<'_> {
    async fn send_command(&mut self, cmd: &str) -> Result<Response> {
        self.driver.send_command(cmd).await
    }

    async fn commit(self) -> Result<()> {
        self.finish("commit").await
    }

    async fn abort(self) -> Result<()> {
        self.finish("abort").await
    }

    fn detach(mut self) -> Result<()> {
        self.consumed = true;
        Ok(())
    }
}

impl Diffable for AristaConfigSession<'_> {
    async fn diff(&mut self) -> Result<String> {
        let response = self
            .driver
            .send_command("show session-config diffs")
            .await?;
        Ok(response.result)
    }
}

impl ConfirmableCommit for AristaConfigSession<'_> {
    async fn commit_confirmed(&mut self, timeout: Duration) -> Result<()> {
        let command = commit_timer_command(timeout)?;
        self.driver.send_command(&command).await?.into_result()?;
        Ok(())
    }
}

impl NamedSession for AristaConfigSession<'_> {
    fn session_name(&self) -> &str {
        &self.session_name
    }
}

impl Drop for AristaConfigSession<'_> {
    fn drop(&mut self) {
        if !self.consumed {
            warn!(
                "AristaConfigSession '{}' dropped without commit/abort/detach",
                self.session_name
            );
        }
    }
}

/// `commit timer hh:mm:ss`; EOS accepts no less than one minute.
fn commit_timer_command(timeout: Duration) -> Result<String> {
    let total = timeout.as_secs();
    if total < 60 {
        return Err(DriverError::InvalidConfig {
            message: format!("Arista commit timer minimum is 1 minute, got {total} seconds"),
        }
        .into());
    }
    Ok(format!(
        "commit timer {:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use crate::transport::MockTransport;
    use crate::driver::DriverBuilder;

    fn eos(mock: &MockTransport, platform: Platform) -> GenericDriver {
        DriverBuilder::new("192.0.2.10")
            .username("admin")
            .platform(platform)
            .port(22)
            .transport(mock.transport_kind())
            .build()
            .unwrap()
    }

    fn session_commands(mock: &MockTransport) -> Vec<String> {
        mock.lines()
            .into_iter()
            .filter(|l| !l.is_empty() && !l.starts_with("terminal "))
            .collect()
    }

    #[tokio::test]
    async fn test_commit_returns_to_privilege_exec() {
        let mock = MockTransport::new("switch#");
        mock.transition("configure session my-changes", "switch(config-s-my-cha)#")
            .respond("show session-config diffs", "+hostname edge1")
            .transition("commit", "switch#");
        let mut driver = eos(&mock, Platform::AristaEos);
        driver.open().await.unwrap();

        let mut session = AristaConfigSession::new(&mut driver, "my-changes")
            .await
            .unwrap();
        assert_eq!(session.session_name(), "my-changes");
        let response = session.send_command("hostname edge1").await.unwrap();
        assert_eq!(response.prompt, "switch(config-s-my-cha)#");
        assert_eq!(session.diff().await.unwrap(), "+hostname edge1");
        session.commit().await.unwrap();

        assert_eq!(driver.current_privilege(), Some("privilege_exec"));
        assert!(driver.privilege_manager().get("config_session_my-changes").is_some());
        assert_eq!(
            session_commands(&mock),
            vec![
                "configure session my-changes",
                "hostname edge1",
                "show session-config diffs",
                "commit"
            ]
        );
    }

    #[tokio::test]
    async fn test_detach_then_reattach() {
        let mock = MockTransport::new("switch#");
        mock.transition("configure session s1", "switch(config-s-s1)#")
            .transition("abort", "switch#");
        let mut driver = eos(&mock, Platform::AristaEos);
        driver.open().await.unwrap();

        let session = AristaConfigSession::new(&mut driver, "s1").await.unwrap();
        session.detach().unwrap();
        assert_eq!(driver.current_privilege(), Some("config_session_s1"));

        let session = AristaConfigSession::new(&mut driver, "s1").await.unwrap();
        session.abort().await.unwrap();
        assert_eq!(driver.current_privilege(), Some("privilege_exec"));
        assert_eq!(session_commands(&mock), vec!["configure session s1", "abort"]);
    }

    #[tokio::test]
    async fn test_rejected_commit_is_an_error() {
        let mock = MockTransport::new("switch#");
        mock.transition("configure session s2", "switch(config-s-s2)#")
            .respond("commit", "% Cannot commit session: conflict");
        let mut driver = eos(&mock, Platform::AristaEos);
        driver.open().await.unwrap();

        let session = AristaConfigSession::new(&mut driver, "s2").await.unwrap();
        let err = session.commit().await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Driver(DriverError::CommandFailed { .. })
        ));
        assert_eq!(driver.current_privilege(), Some("config_session_s2"));
    }

    #[tokio::test]
    async fn test_requires_arista_platform() {
        let mock = MockTransport::new("router#");
        let mut driver = eos(&mock, Platform::CiscoIosxe);
        driver.open().await.unwrap();

        let err = AristaConfigSession::new(&mut driver, "s1").await.err().unwrap();
        assert!(matches!(
            err,
            crate::Error::Driver(DriverError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_commit_timer_formatting() {
        for (secs, expected) in [
            (60, "commit timer 00:01:00"),
            (301, "commit timer 00:05:01"),
            (3661, "commit timer 01:01:01"),
            (86400, "commit timer 24:00:00"),
        ] {
            assert_eq!(commit_timer_command(Duration::from_secs(secs)).unwrap(), expected);
        }
        assert!(commit_timer_command(Duration::from_secs(59)).is_err());
    }
}
