//! Generic driver implementation that works with any platform.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use super::Driver;
use super::config_session::GenericConfigSession;
use super::privilege::{Direction, PrivilegeManager};
use super::response::Response;
use crate::channel::{Channel, ChannelConfig, ChannelOutput, FileChannelLog, InteractiveEvent, LogMode};
use crate::error::{DriverError, PrivilegeError, Result};
use crate::platform::{PlatformDefinition, PrivilegeLevel, VendorBehavior};
use crate::transport::{InChannelAuth, TransportConfig, TransportKind};

/// Generic driver that works with any platform definition.
///
/// This is the main driver implementation that handles:
/// - Transport creation and in-band login
/// - Command execution over a [`Channel`]
/// - Privilege level navigation, re-deriving the level from the live prompt
/// - Vendor-specific output post-processing
pub struct GenericDriver {
    /// Connection settings handed to the transport factory.
    transport_config: TransportConfig,

    /// Transport backend.
    transport_kind: TransportKind,

    /// Channel settings; the prompt pattern tracks the privilege levels.
    channel_config: ChannelConfig,

    /// Platform definition.
    platform: PlatformDefinition,

    /// Vendor behavior implementation.
    behavior: Arc<dyn VendorBehavior>,

    /// Open channel (None when disconnected).
    channel: Option<Channel>,

    /// Privilege level manager.
    privilege_manager: PrivilegeManager,

    /// Secret sent when escalation asks for one (e.g. `enable`).
    auth_secondary: Option<SecretString>,

    /// File the channel mirrors everything it reads to.
    channel_log: Option<(PathBuf, LogMode)>,
}

impl GenericDriver {
    /// Create a new generic driver.
    ///
    /// Validates the platform and its privilege graph; the channel prompt
    /// pattern is replaced by one matching every privilege level.
    pub fn new(
        transport_config: TransportConfig,
        transport_kind: TransportKind,
        mut channel_config: ChannelConfig,
        platform: PlatformDefinition,
    ) -> Result<Self> {
        platform.validate()?;
        let privilege_manager = PrivilegeManager::new(platform.privilege_levels.clone())?;
        channel_config.prompt_pattern = privilege_manager.combined_prompt_pattern();
        let behavior = platform.behavior();

        Ok(Self {
            transport_config,
            transport_kind,
            channel_config,
            platform,
            behavior,
            channel: None,
            privilege_manager,
            auth_secondary: None,
            channel_log: None,
        })
    }

    /// Set the secret sent when escalation asks for one.
    pub fn with_auth_secondary(mut self, secret: Option<SecretString>) -> Self {
        self.auth_secondary = secret;
        self
    }

    /// Mirror the session to `path` once opened.
    pub fn with_channel_log(mut self, path: impl Into<PathBuf>, mode: LogMode) -> Self {
        self.channel_log = Some((path.into(), mode));
        self
    }

    /// Get a reference to the platform definition.
    pub fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    /// Get the privilege manager.
    pub fn privilege_manager(&self) -> &PrivilegeManager {
        &self.privilege_manager
    }

    /// The open channel, if any.
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Connection settings.
    pub fn transport_config(&self) -> &TransportConfig {
        &self.transport_config
    }

    /// Channel settings used for the next `open()`.
    pub fn channel_config(&self) -> &ChannelConfig {
        &self.channel_config
    }

    /// Change the bound on every channel operation.
    pub fn set_timeout_ops(&mut self, timeout: Duration) {
        self.channel_config.timeout_ops = timeout;
        if let Some(channel) = &self.channel {
            channel.update_config(|config| config.timeout_ops = timeout);
        }
    }

    fn connected(&self) -> Result<&Channel> {
        self.channel
            .as_ref()
            .ok_or_else(|| DriverError::NotConnected.into())
    }

    /// Read the current prompt from the device.
    pub async fn get_prompt(&self) -> Result<String> {
        self.connected()?.get_prompt().await
    }

    /// Send a command whose read also stops on any of `outputs` or after
    /// `duration`, for commands that do not return to a prompt.
    pub async fn send_command_and_read(
        &mut self,
        command: &str,
        outputs: &[&str],
        duration: Option<Duration>,
    ) -> Result<Response> {
        let start = Instant::now();
        let channel = self.connected()?;
        let output = channel
            .send_input_and_read(command, true, outputs, duration)
            .await?;
        let prompt = last_prompt(channel, &output.raw)?;
        self.track_prompt(&prompt);
        Ok(self.build_response(command.to_string(), output, prompt, start.elapsed()))
    }

    /// Add a leaf privilege level at runtime and extend the prompt pattern
    /// to cover it.
    pub fn register_dynamic_level(&mut self, level: PrivilegeLevel) -> Result<()> {
        debug!(
            "registering dynamic privilege level '{}' under {:?}",
            level.name, level.previous_priv
        );
        self.privilege_manager.register_dynamic_level(level)?;
        self.rebuild_prompt_pattern();
        Ok(())
    }

    /// Push the combined prompt pattern of every level into the channel config.
    fn rebuild_prompt_pattern(&mut self) {
        let pattern = self.privilege_manager.combined_prompt_pattern();
        self.channel_config.prompt_pattern = pattern.clone();
        if let Some(channel) = &self.channel {
            channel.update_config(|config| config.prompt_pattern = pattern);
        }
    }

    /// Name of the level `send_config` works in.
    pub fn configuration_privilege(&self) -> Result<String> {
        if self.privilege_manager.get("configuration").is_some() {
            return Ok("configuration".to_string());
        }
        self.privilege_manager
            .level_names()
            .find(|name| name.to_lowercase().contains("config"))
            .cloned()
            .ok_or_else(|| {
                DriverError::InvalidConfig {
                    message: format!(
                        "platform '{}' has no configuration privilege level",
                        self.platform.name
                    ),
                }
                .into()
            })
    }

    /// Enter configuration mode as a [`GenericConfigSession`].
    pub async fn config_session(&mut self) -> Result<GenericConfigSession<'_>> {
        GenericConfigSession::new(self).await
    }

    /// Enter `target` from its parent with one transition.
    ///
    /// When `target` asks for authentication and a secondary secret is set,
    /// the reply to the command is read until either the prompt or the
    /// level's auth prompt. The secret is sent, hidden, only when the auth
    /// prompt showed. The result is not verified;
    /// [`acquire_privilege`](Driver::acquire_privilege) re-reads the prompt
    /// afterwards.
    pub async fn escalate(&self, target: &str) -> Result<()> {
        let level = self.level(target)?;
        let command = level.escalate_command.as_deref().ok_or_else(|| {
            PrivilegeError::InvalidGraph {
                message: format!("level '{target}' cannot be escalated to"),
            }
        })?;
        let channel = self.connected()?;
        debug!("escalating to '{}' with {:?}", target, command);

        if level.escalate_auth {
            match (&self.auth_secondary, level.escalate_prompt.as_deref()) {
                (Some(secret), Some(auth_prompt)) if !auth_prompt.is_empty() => {
                    channel.send_input(command, false, true).await?;
                    let (_, challenged) = channel.read_until_prompt_or_pattern(auth_prompt).await?;
                    if challenged {
                        channel
                            .send_inputs_interact(&[InteractiveEvent::hidden(
                                secret.expose_secret(),
                                "",
                            )])
                            .await?;
                    } else {
                        debug!("'{}' granted without an auth challenge", target);
                    }
                    return Ok(());
                }
                _ => warn!(
                    "level '{}' expects a secondary secret but none is set, sending {:?} without one",
                    target, command
                ),
            }
        }

        channel.send_input(command, true, false).await?;
        Ok(())
    }

    /// Leave `current` for its parent with one transition.
    pub async fn deescalate(&self, current: &str) -> Result<()> {
        let level = self.level(current)?;
        let command = level.deescalate_command.as_deref().ok_or_else(|| {
            PrivilegeError::InvalidGraph {
                message: format!("level '{current}' has no parent to return to"),
            }
        })?;
        debug!("deescalating from '{}' with {:?}", current, command);
        self.connected()?.send_input(command, true, false).await?;
        Ok(())
    }

    fn level(&self, name: &str) -> Result<&PrivilegeLevel> {
        self.privilege_manager.get(name).ok_or_else(|| {
            PrivilegeError::UndefinedLevel {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Record the level `prompt` identifies; forget it when none does.
    fn track_prompt(&mut self, prompt: &str) {
        let level_name = match self.privilege_manager.determine_from_prompt(prompt) {
            Ok(level) => level.name.clone(),
            Err(e) => {
                debug!("prompt does not identify a privilege level: {}", e);
                self.privilege_manager.clear_current();
                return;
            }
        };
        let _ = self.privilege_manager.set_current(&level_name);
    }

    fn build_response(
        &self,
        command: String,
        output: ChannelOutput,
        prompt: String,
        elapsed: Duration,
    ) -> Response {
        let result = self.behavior.post_process_output(&output.processed);
        let failure = self
            .behavior
            .detect_failure(&result, &self.platform.failed_when_contains);
        if let Some(ref pattern) = failure {
            debug!("{:?} output contains failure pattern {:?}", command, pattern);
        }
        Response::new(command, result, output.raw_str(), prompt, elapsed).with_failure(failure)
    }

    /// Open the channel and run whatever in-band login the transport needs.
    async fn establish(&self, channel: &Channel) -> Result<()> {
        channel.open().await?;
        let auth = &self.transport_config.auth;
        match channel.in_channel_auth() {
            InChannelAuth::None => Ok(()),
            InChannelAuth::Ssh => {
                channel
                    .authenticate_ssh(auth.password(), auth.passphrase())
                    .await
            }
            InChannelAuth::Telnet => {
                channel
                    .authenticate_telnet(&self.transport_config.username, auth.password())
                    .await
            }
        }
    }
}

/// The last prompt in `raw`, trimmed; empty when there is none.
fn last_prompt(channel: &Channel, raw: &[u8]) -> Result<String> {
    let pattern = channel.prompt_pattern()?;
    Ok(pattern
        .as_regex()
        .find_iter(raw)
        .last()
        .map(|m| String::from_utf8_lossy(m.as_bytes()).trim().to_string())
        .unwrap_or_default())
}

impl Driver for GenericDriver {
    async fn open(&mut self) -> Result<()> {
        if self.channel.is_some() {
            return Err(DriverError::AlreadyConnected.into());
        }

        info!(
            "opening {} session to {} via {:?}",
            self.platform.name,
            self.transport_config.socket_addr(),
            self.transport_kind
        );
        let transport = self.transport_kind.create(&self.transport_config)?;
        let channel = Channel::new(transport, self.channel_config.clone());
        if let Some((path, mode)) = &self.channel_log {
            let log = FileChannelLog::open(path, *mode).map_err(crate::error::TransportError::from)?;
            channel.set_log(Box::new(log));
        }

        if let Err(e) = self.establish(&channel).await {
            if let Err(close_err) = channel.close().await {
                debug!("close after failed open: {}", close_err);
            }
            return Err(e);
        }
        self.channel = Some(channel);

        let default_privilege = self.platform.default_privilege.clone();
        self.acquire_privilege(&default_privilege).await?;

        for command in self.platform.on_open_commands.clone() {
            self.send_command(&command).await?;
        }

        info!("session to {} ready", self.transport_config.socket_addr());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let Some(channel) = self.channel.take() else {
            return Ok(());
        };
        self.privilege_manager.clear_current();

        for command in &self.platform.on_close_commands {
            let sent = async {
                channel.write(command, false).await?;
                channel.send_return().await
            };
            if let Err(e) = sent.await {
                warn!("on-close command {:?} failed: {}", command, e);
                break;
            }
        }

        info!("closing session to {}", self.transport_config.socket_addr());
        channel.close().await
    }

    async fn send_command(&mut self, command: &str) -> Result<Response> {
        let start = Instant::now();
        let channel = self.connected()?;
        let output = channel.send_input(command, true, false).await?;
        let prompt = last_prompt(channel, &output.raw)?;
        self.track_prompt(&prompt);
        Ok(self.build_response(command.to_string(), output, prompt, start.elapsed()))
    }

    async fn send_interactive(&mut self, events: &[InteractiveEvent]) -> Result<Response> {
        let start = Instant::now();
        let channel = self.connected()?;
        let output = channel.send_inputs_interact(events).await?;
        let prompt = last_prompt(channel, &output.raw)?;
        self.track_prompt(&prompt);

        let command = events
            .iter()
            .map(InteractiveEvent::redacted_input)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(self.build_response(command, output, prompt, start.elapsed()))
    }

    async fn send_config(&mut self, commands: &[&str]) -> Result<Vec<Response>> {
        let original = match self.current_privilege() {
            Some(name) => name.to_string(),
            None => self.platform.default_privilege.clone(),
        };
        let configuration = self.configuration_privilege()?;

        self.acquire_privilege(&configuration).await?;
        let mut responses = Vec::with_capacity(commands.len());
        for command in commands {
            responses.push(self.send_command(command).await?);
        }
        self.acquire_privilege(&original).await?;

        Ok(responses)
    }

    async fn acquire_privilege(&mut self, target: &str) -> Result<()> {
        self.level(target)?;
        let budget = self.privilege_manager.hop_budget();
        let mut attempts = 0;
        let mut before_attempt: Option<String> = None;

        loop {
            let prompt = self.connected()?.get_prompt().await?;

            if self
                .privilege_manager
                .matching_levels(&prompt)
                .iter()
                .any(|level| level.name == target)
            {
                self.privilege_manager.set_current(target)?;
                debug!("at privilege level '{}'", target);
                return Ok(());
            }

            let current = self
                .privilege_manager
                .determine_from_prompt(&prompt)?
                .name
                .clone();
            self.privilege_manager.set_current(&current)?;

            let no_progress = before_attempt.as_deref() == Some(current.as_str());
            if no_progress {
                warn!(
                    "transition toward '{}' left the device at '{}' ({:?})",
                    target, current, prompt
                );
            }

            if attempts >= budget {
                return Err(if no_progress {
                    PrivilegeError::NoProgress {
                        target: target.to_string(),
                        prompt,
                    }
                } else {
                    PrivilegeError::AcquisitionFailed {
                        target: target.to_string(),
                    }
                }
                .into());
            }

            let next = self
                .privilege_manager
                .next_hop(&current, target)?
                .ok_or_else(|| PrivilegeError::NoPath {
                    from: current.clone(),
                    to: target.to_string(),
                })?;
            let transition = self
                .privilege_manager
                .get_transition(&current, &next)
                .ok_or_else(|| PrivilegeError::NoPath {
                    from: current.clone(),
                    to: next.clone(),
                })?;

            match transition.direction {
                Direction::Escalate => self.escalate(&next).await?,
                Direction::Deescalate => self.deescalate(&current).await?,
            }

            before_attempt = Some(current);
            attempts += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    fn is_alive(&self) -> bool {
        self.channel.as_ref().is_some_and(Channel::is_alive)
    }

    fn current_privilege(&self) -> Option<&str> {
        self.privilege_manager.current().map(|level| level.name.as_str())
    }
}

impl std::fmt::Debug for GenericDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericDriver")
            .field("host", &self.transport_config.host)
            .field("port", &self.transport_config.port)
            .field("transport", &self.transport_kind)
            .field("platform", &self.platform.name)
            .field("current_privilege", &self.current_privilege())
            .field("open", &self.channel.is_some())
            .finish_non_exhaustive()
    }
}
