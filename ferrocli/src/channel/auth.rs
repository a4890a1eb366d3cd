//! In-band authentication.
//!
//! Some transports hand the channel a session that still has to log in: a
//! system ssh process asking for a password or key passphrase, or a telnet
//! line presenting `Username:`/`Password:`. These routines answer the
//! challenges until the prompt shows, and turn the failure banners ssh
//! prints into readable errors.

use std::sync::LazyLock;
use std::time::Duration;

use log::{debug, trace, warn};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use super::buffer::PatternBuffer;
use super::config::ChannelConfig;
use super::pty::{Channel, TimeoutGuard};
use crate::error::{ChannelError, Error, Result, TransportError};
use crate::timeout::with_timeout;
use crate::transport::Transport;

/// A challenge may be answered this many times; one more occurrence fails.
const MAX_CHALLENGE_ATTEMPTS: u32 = 2;

/// Telnet nudge interval when `timeout_ops` is unbounded.
const DEFAULT_NUDGE_INTERVAL: Duration = Duration::from_secs(3);

static THEIR_OFFER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"their offer: ([a-z0-9\-,]*)").expect("valid regex literal")
});

static BAD_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"bad configuration option: ([a-z0-9+=,]*)").expect("valid regex literal")
});

/// Map lowercased ssh output to an authentication failure message.
pub fn classify_ssh_banner(output: &str) -> Option<String> {
    let lower = output.to_ascii_lowercase();

    if lower.contains("host key verification failed") {
        return Some("Host key verification failed".to_string());
    }
    if lower.contains("operation timed out") || lower.contains("connection timed out") {
        return Some("Timed out connecting to host".to_string());
    }
    if lower.contains("no route to host") {
        return Some("No route to host".to_string());
    }
    if lower.contains("no matching host key") {
        return Some(with_offer("No matching host key type found for host", &lower));
    }
    if lower.contains("no matching key exchange") {
        return Some(with_offer("No matching key exchange found for host", &lower));
    }
    if lower.contains("no matching cipher") {
        return Some(with_offer("No matching cipher found for host", &lower));
    }
    if lower.contains("bad configuration") {
        let mut message = "Bad SSH configuration option(s) for host".to_string();
        if let Some(option) = BAD_OPTION.captures(&lower).and_then(|c| c.get(1)) {
            message.push_str(&format!(", bad option: {}", option.as_str()));
        }
        return Some(message);
    }
    if lower.contains("warning: unprotected private key file") {
        return Some("Permissions for private key are too open, authentication failed!".to_string());
    }
    if lower.contains("could not resolve hostname") {
        return Some("Could not resolve address for host".to_string());
    }
    if lower.contains("permission denied") {
        return Some("Permission denied for host".to_string());
    }
    None
}

fn with_offer(message: &str, lower: &str) -> String {
    match THEIR_OFFER.captures(lower).and_then(|c| c.get(1)) {
        Some(offer) => format!("{message}, their offer: {}", offer.as_str()),
        None => message.to_string(),
    }
}

fn auth_failed(message: impl Into<String>) -> Error {
    ChannelError::AuthenticationFailed {
        message: message.into(),
    }
    .into()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|needle| !needle.is_empty() && haystack.contains(&needle.to_ascii_lowercase()))
}

/// Answer counter for one kind of challenge.
#[derive(Debug)]
struct Challenge {
    name: &'static str,
    seen: u32,
}

impl Challenge {
    fn new(name: &'static str) -> Self {
        Self { name, seen: 0 }
    }

    fn record(&mut self) -> Result<()> {
        self.seen += 1;
        if self.seen > MAX_CHALLENGE_ATTEMPTS {
            return Err(auth_failed(format!(
                "{} prompt seen {} times, giving up",
                self.name, self.seen
            )));
        }
        debug!("answering {} prompt (attempt {})", self.name, self.seen);
        Ok(())
    }
}

impl Channel {
    /// Log in over an ssh session that prompts in-band.
    ///
    /// Failure banners are reported as
    /// [`ChannelError::AuthenticationFailed`] carrying the vendor message.
    /// Password and key passphrase challenges are answered at most twice
    /// each. Succeeds once the prompt shows.
    pub async fn authenticate_ssh(
        &self,
        password: Option<&SecretString>,
        passphrase: Option<&SecretString>,
    ) -> Result<()> {
        let config = self.config();
        with_timeout("authenticate_ssh", config.timeout_ops, async {
            let _lock = self.lock_operation(&config).await;
            let prompt = self.patterns().get(&config.prompt_pattern, None)?;
            let mut password_challenge = Challenge::new("password");
            let mut passphrase_challenge = Challenge::new("passphrase");
            let mut buffer = PatternBuffer::new(config.prompt_search_depth);

            loop {
                let chunk = match self.read_chunk(true).await {
                    Ok(chunk) => chunk,
                    Err(Error::Transport(TransportError::Disconnected)) => {
                        let seen = buffer.as_str_lossy().into_owned();
                        return Err(auth_failed(classify_ssh_banner(&seen).unwrap_or_else(
                            || {
                                "Session closed during authentication, check host-key and \
                                 strict-key settings"
                                    .to_string()
                            },
                        )));
                    }
                    Err(e) => return Err(e),
                };
                buffer.extend(&chunk);

                let lower = buffer.as_str_lossy().to_ascii_lowercase();
                if let Some(message) = classify_ssh_banner(&lower) {
                    warn!("ssh authentication failed: {}", message);
                    return Err(auth_failed(message));
                }

                if contains_any(&lower, &config.passphrase_prompts) {
                    passphrase_challenge.record()?;
                    buffer.clear();
                    self.answer(&config, passphrase, "passphrase").await?;
                    continue;
                }

                if contains_any(&lower, &config.password_prompts) {
                    password_challenge.record()?;
                    buffer.clear();
                    self.answer(&config, password, "password").await?;
                    continue;
                }

                if buffer.tail_contains(prompt.as_regex()) {
                    debug!("ssh in-band authentication complete");
                    return Ok(());
                }
            }
        })
        .await
    }

    async fn answer(
        &self,
        config: &ChannelConfig,
        secret: Option<&SecretString>,
        what: &str,
    ) -> Result<()> {
        let secret = secret.ok_or_else(|| {
            auth_failed(format!("device asked for a {what} but none was configured"))
        })?;
        self.write_inner(secret.expose_secret(), true).await?;
        self.send_return_inner(config).await
    }

    /// Log in over a telnet session.
    ///
    /// Username and password prompts are matched case-insensitively against
    /// the configured substrings. When the line stays quiet for a tenth of
    /// `timeout_ops` a bare return is sent, repeating at that interval.
    pub async fn authenticate_telnet(
        &self,
        username: &str,
        password: Option<&SecretString>,
    ) -> Result<()> {
        let config = self.config();
        with_timeout("authenticate_telnet", config.timeout_ops, async {
            let _lock = self.lock_operation(&config).await;
            let prompt = self.patterns().get(&config.prompt_pattern, None)?;
            let interval = if config.timeout_ops.is_zero() {
                DEFAULT_NUDGE_INTERVAL
            } else {
                config.timeout_ops / 10
            };

            let mut username_challenge = Challenge::new("username");
            let mut password_challenge = Challenge::new("password");
            let mut buffer = PatternBuffer::new(config.prompt_search_depth);

            let mut transport = self.lock_transport().await;
            let mut guard = TimeoutGuard::narrow(&mut transport, interval);
            let mut last_output = Instant::now();

            loop {
                match guard.transport().read().await {
                    Ok(raw) if !raw.is_empty() => {
                        buffer.extend(&self.ingest(&raw, true));
                        last_output = Instant::now();
                    }
                    Ok(_) => {}
                    Err(e) if e.is_timeout() => {}
                    Err(e) => return Err(e),
                }

                if last_output.elapsed() >= interval {
                    trace!("telnet line quiet for {:?}, sending return", interval);
                    send_line(guard.transport(), "", false, &config).await?;
                    last_output = Instant::now();
                    continue;
                }

                let lower = buffer.as_str_lossy().to_ascii_lowercase();
                if contains_any(&lower, &config.username_prompts) {
                    username_challenge.record()?;
                    buffer.clear();
                    send_line(guard.transport(), username, false, &config).await?;
                    continue;
                }

                if contains_any(&lower, &config.password_prompts) {
                    password_challenge.record()?;
                    buffer.clear();
                    let password = password.ok_or_else(|| {
                        auth_failed("device asked for a password but none was configured")
                    })?;
                    send_line(guard.transport(), password.expose_secret(), true, &config).await?;
                    continue;
                }

                if buffer.tail_contains(prompt.as_regex()) {
                    debug!("telnet in-band authentication complete");
                    return Ok(());
                }
            }
        })
        .await
    }
}

async fn send_line(
    transport: &mut Box<dyn Transport>,
    input: &str,
    redacted: bool,
    config: &ChannelConfig,
) -> Result<()> {
    if redacted {
        debug!("write: <redacted>");
    } else {
        debug!("write: {:?}", input);
    }
    if !input.is_empty() {
        transport.write(input.as_bytes()).await?;
    }
    transport.write(config.return_char.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{InChannelAuth, MockTransport};

    fn config() -> ChannelConfig {
        ChannelConfig {
            prompt_pattern: r"^\S+[#>$]\s?$".to_string(),
            ..ChannelConfig::default()
        }
    }

    async fn open_channel(mock: &MockTransport, config: ChannelConfig) -> Channel {
        let _ = env_logger::builder().is_test(true).try_init();
        let channel = Channel::new(Box::new(mock.clone()), config);
        channel.open().await.unwrap();
        channel
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn test_banner_classification() {
        let cases = [
            ("Host key verification failed.", "Host key verification failed"),
            ("ssh: connect to host 10.0.0.1 port 22: Operation timed out", "Timed out"),
            ("ssh: connect to host 10.0.0.1 port 22: Connection timed out", "Timed out"),
            ("ssh: connect to host 10.0.0.1 port 22: No route to host", "No route to host"),
            ("ssh: Could not resolve hostname nope: Name or service not known", "Could not resolve"),
            ("WARNING: UNPROTECTED PRIVATE KEY FILE!", "too open"),
            ("admin@10.0.0.1: Permission denied (publickey,password).", "Permission denied"),
        ];
        for (banner, expected) in cases {
            let message = classify_ssh_banner(banner).unwrap();
            assert!(message.contains(expected), "{banner:?} -> {message:?}");
        }
        assert!(classify_ssh_banner("admin@10.0.0.1's password: ").is_none());
    }

    #[test]
    fn test_banner_detail_extraction() {
        let message = classify_ssh_banner(
            "Unable to negotiate with 10.0.0.1 port 22: no matching cipher found. \
             Their offer: aes128-cbc,3des-cbc\n",
        )
        .unwrap();
        assert_eq!(
            message,
            "No matching cipher found for host, their offer: aes128-cbc,3des-cbc"
        );

        let message = classify_ssh_banner(
            "Unable to negotiate with 10.0.0.1 port 22: no matching key exchange method found. \
             Their offer: diffie-hellman-group1-sha1",
        )
        .unwrap();
        assert!(message.ends_with("their offer: diffie-hellman-group1-sha1"));

        let message =
            classify_ssh_banner("/home/u/.ssh/config: line 3: Bad configuration option: ciphrs")
                .unwrap();
        assert!(message.ends_with("bad option: ciphrs"));
    }

    #[tokio::test]
    async fn test_ssh_password_challenge() {
        let mock = MockTransport::new("host$");
        mock.with_in_channel_auth(InChannelAuth::Ssh)
            .on_open("admin@host's password: ");
        let channel = open_channel(&mock, config()).await;
        assert_eq!(channel.in_channel_auth(), InChannelAuth::Ssh);

        channel
            .authenticate_ssh(Some(&secret("hunter2")), None)
            .await
            .unwrap();
        assert_eq!(mock.lines(), vec!["hunter2"]);
    }

    #[tokio::test]
    async fn test_ssh_passphrase_challenge() {
        let mock = MockTransport::new("host$");
        mock.on_open("Enter passphrase for key '/home/u/.ssh/id_ed25519': ");
        let channel = open_channel(&mock, config()).await;

        channel
            .authenticate_ssh(None, Some(&secret("phrase")))
            .await
            .unwrap();
        assert_eq!(mock.lines(), vec!["phrase"]);
    }

    #[tokio::test]
    async fn test_ssh_third_password_prompt_fails() {
        let mock = MockTransport::new("host$");
        mock.on_open("Password: ")
            .respond_raw("wrong", "\nPassword: ");
        let channel = open_channel(&mock, config()).await;

        let err = channel
            .authenticate_ssh(Some(&secret("wrong")), None)
            .await
            .unwrap_err();
        assert!(err.is_authentication_failure());
        assert!(err.to_string().contains("3 times"));
        assert_eq!(mock.lines(), vec!["wrong", "wrong"]);
    }

    #[tokio::test]
    async fn test_ssh_banner_fails_immediately() {
        let mock = MockTransport::new("host$");
        mock.on_open("Unable to negotiate with 10.0.0.1 port 22: no matching host key type found. Their offer: ssh-rsa\r\n");
        let channel = open_channel(&mock, config()).await;

        let err = channel.authenticate_ssh(None, None).await.unwrap_err();
        assert!(err.is_authentication_failure());
        assert!(err.to_string().contains("their offer: ssh-rsa"));
    }

    #[tokio::test]
    async fn test_ssh_disconnect_gives_hint() {
        let mock = MockTransport::new("host$");
        mock.on_open("connecting...\r\n").disconnect_when_drained();
        let channel = open_channel(&mock, config()).await;

        let err = channel.authenticate_ssh(None, None).await.unwrap_err();
        assert!(err.is_authentication_failure());
        assert!(err.to_string().contains("strict-key"));
    }

    #[tokio::test]
    async fn test_ssh_password_requested_without_secret() {
        let mock = MockTransport::new("host$");
        mock.on_open("Password: ");
        let channel = open_channel(&mock, config()).await;

        let err = channel.authenticate_ssh(None, None).await.unwrap_err();
        assert!(err.is_authentication_failure());
        assert!(mock.written().is_empty());
    }

    #[tokio::test]
    async fn test_ssh_ansi_in_login_output_is_stripped() {
        let mock = MockTransport::new("host$");
        mock.on_open("\x1b[1mPass\x1b[0mword: ");
        let channel = open_channel(&mock, config()).await;

        channel
            .authenticate_ssh(Some(&secret("hunter2")), None)
            .await
            .unwrap();
        assert_eq!(mock.lines(), vec!["hunter2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_telnet_nudge_and_login() {
        let mock = MockTransport::new("router>");
        mock.with_in_channel_auth(InChannelAuth::Telnet)
            .challenge("", "Username: ")
            .challenge("admin", "Password: ")
            .transition("secret", "router>");
        let channel = open_channel(
            &mock,
            ChannelConfig {
                timeout_ops: Duration::from_secs(1),
                ..config()
            },
        )
        .await;

        channel
            .authenticate_telnet("admin", Some(&secret("secret")))
            .await
            .unwrap();

        assert_eq!(mock.lines(), vec!["", "admin", "secret"]);
        assert_eq!(
            mock.timeout_history(),
            vec![Duration::from_millis(100), Duration::from_millis(50)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_telnet_repeated_login_fails() {
        let mock = MockTransport::new("router>");
        mock.on_open("login: ")
            .respond_raw("admin", "\nLogin incorrect\nlogin: ");
        let channel = open_channel(&mock, config()).await;

        let err = channel
            .authenticate_telnet("admin", Some(&secret("secret")))
            .await
            .unwrap_err();
        assert!(err.is_authentication_failure());
        assert_eq!(mock.lines(), vec!["admin", "admin"]);
    }
}
