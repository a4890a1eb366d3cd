//! PTY channel for interactive device sessions.
//!
//! [`Channel`] turns "run this command" into transport writes plus reads that
//! stop on the echoed input, the prompt, a literal string or a deadline. All
//! operations take `&self`; the transport sits behind an async mutex that is
//! held for one read, one write or one bounded read loop at a time. With
//! `channel_lock` set, a second mutex is held for the whole of each
//! operation so multi-step dialogues from different callers never
//! interleave.

use std::borrow::Cow;
use std::sync::{Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use super::ansi::AnsiStripper;
use super::buffer::PatternBuffer;
use super::config::ChannelConfig;
use super::interactive::{InteractiveEvent, validate_events};
use super::session_log::ChannelLog;
use super::normalize::{echo_observed, process_output, strip_carriage_returns};
use super::patterns::{PatternCache, PromptPattern};
use crate::error::{Error, Result};
use crate::timeout::with_timeout;
use crate::transport::{InChannelAuth, Transport};

/// Output of a channel operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOutput {
    /// Everything read, echo included, with carriage returns removed.
    pub raw: Vec<u8>,

    /// Output after normalization.
    pub processed: String,
}

impl ChannelOutput {
    /// Get the raw data as a string (lossy UTF-8).
    pub fn raw_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }
}

/// Narrows a transport's read timeout and restores the previous value on
/// drop, whether the read loop returned, failed or was cancelled.
pub(super) struct TimeoutGuard<'a> {
    transport: &'a mut Box<dyn Transport>,
    previous: Duration,
}

impl<'a> TimeoutGuard<'a> {
    pub(super) fn narrow(transport: &'a mut Box<dyn Transport>, timeout: Duration) -> Self {
        let previous = transport.timeout();
        transport.set_timeout(timeout);
        Self {
            transport,
            previous,
        }
    }

    pub(super) fn transport(&mut self) -> &mut Box<dyn Transport> {
        &mut *self.transport
    }
}

impl Drop for TimeoutGuard<'_> {
    fn drop(&mut self) {
        self.transport.set_timeout(self.previous);
    }
}

/// Prompt-aware session over a [`Transport`].
pub struct Channel {
    transport: Mutex<Box<dyn Transport>>,
    in_channel_auth: InChannelAuth,
    config: RwLock<ChannelConfig>,
    operation: Mutex<()>,
    patterns: PatternCache,
    ansi: StdMutex<AnsiStripper>,
    log: StdMutex<Option<Box<dyn ChannelLog>>>,
}

impl Channel {
    /// Create a channel over an unopened transport.
    pub fn new(transport: Box<dyn Transport>, config: ChannelConfig) -> Self {
        Self {
            in_channel_auth: transport.in_channel_auth(),
            transport: Mutex::new(transport),
            config: RwLock::new(config),
            operation: Mutex::new(()),
            patterns: PatternCache::new(),
            ansi: StdMutex::new(AnsiStripper::new()),
            log: StdMutex::new(None),
        }
    }

    /// Open the underlying transport.
    ///
    /// Bounded by the transport's own socket timeout, not `timeout_ops`.
    pub async fn open(&self) -> Result<()> {
        self.transport.lock().await.open().await
    }

    /// Close the underlying transport and the channel log.
    pub async fn close(&self) -> Result<()> {
        let result = self.transport.lock().await.close().await;
        if let Some(mut log) = self.take_log() {
            if let Err(e) = log.close() {
                warn!("failed to close channel log: {}", e);
            }
        }
        result
    }

    /// Whether the transport reports a usable session.
    ///
    /// A transport currently held by an operation counts as alive.
    pub fn is_alive(&self) -> bool {
        match self.transport.try_lock() {
            Ok(transport) => transport.is_alive(),
            Err(_) => true,
        }
    }

    /// In-band login the transport requires after `open`.
    pub fn in_channel_auth(&self) -> InChannelAuth {
        self.in_channel_auth
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> ChannelConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the configuration. Applies from the next operation on.
    pub fn update_config(&self, update: impl FnOnce(&mut ChannelConfig)) {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut config);
    }

    /// Attach a channel log, returning the one it replaces.
    pub fn set_log(&self, log: Box<dyn ChannelLog>) -> Option<Box<dyn ChannelLog>> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(log)
    }

    /// Detach the channel log.
    pub fn take_log(&self) -> Option<Box<dyn ChannelLog>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// The compiled configured prompt pattern.
    pub fn prompt_pattern(&self) -> Result<std::sync::Arc<PromptPattern>> {
        self.patterns.get(&self.config().prompt_pattern, None)
    }

    // ---- building blocks shared with the authentication routines ----

    pub(super) fn patterns(&self) -> &PatternCache {
        &self.patterns
    }

    pub(super) async fn lock_operation(&self, config: &ChannelConfig) -> Option<MutexGuard<'_, ()>> {
        if config.channel_lock {
            Some(self.operation.lock().await)
        } else {
            None
        }
    }

    pub(super) async fn lock_transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().await
    }

    /// Mirror raw bytes to the log, then drop carriage returns and, when
    /// `strip_ansi` is set, ANSI sequences.
    ///
    /// One stripper serves the whole byte stream, so a sequence split over
    /// two reads is still removed.
    pub(super) fn ingest(&self, raw: &[u8], strip_ansi: bool) -> Vec<u8> {
        trace!("read: {:?}", String::from_utf8_lossy(raw));
        if let Some(log) = self
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            if let Err(e) = log.write(raw) {
                warn!("channel log write failed: {}", e);
            }
        }

        let chunk = strip_carriage_returns(raw);
        if strip_ansi {
            self.ansi
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .strip(&chunk)
        } else {
            chunk.into_owned()
        }
    }

    pub(super) async fn read_chunk(&self, strip_ansi: bool) -> Result<Vec<u8>> {
        let raw = self.transport.lock().await.read().await?;
        Ok(self.ingest(&raw, strip_ansi))
    }

    pub(super) async fn write_inner(&self, input: &str, redacted: bool) -> Result<()> {
        if redacted {
            debug!("write: <redacted>");
        } else {
            debug!("write: {:?}", input);
        }
        self.transport.lock().await.write(input.as_bytes()).await
    }

    pub(super) async fn send_return_inner(&self, config: &ChannelConfig) -> Result<()> {
        self.write_inner(&config.return_char, false).await
    }

    async fn read_until_input_inner(&self, config: &ChannelConfig, input: &[u8]) -> Result<Vec<u8>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let mut buffer = PatternBuffer::new(config.prompt_search_depth);
        loop {
            let chunk = self.read_chunk(config.strip_ansi).await?;
            buffer.extend(&chunk);
            if echo_observed(buffer.as_slice(), input, config.auto_expand) {
                return Ok(buffer.take());
            }
        }
    }

    async fn read_until_prompt_inner(
        &self,
        config: &ChannelConfig,
        override_pattern: Option<&str>,
    ) -> Result<Vec<u8>> {
        let pattern = self.patterns.get(&config.prompt_pattern, override_pattern)?;
        let mut buffer = PatternBuffer::new(config.prompt_search_depth);
        loop {
            let chunk = self.read_chunk(config.strip_ansi).await?;
            buffer.extend(&chunk);
            if buffer.tail_contains(pattern.as_regex()) {
                return Ok(buffer.take());
            }
        }
    }

    async fn read_until_prompt_or_time_inner(
        &self,
        config: &ChannelConfig,
        outputs: &[&str],
        duration: Option<Duration>,
    ) -> Result<Vec<u8>> {
        let duration = duration.unwrap_or(config.timeout_ops);
        let pattern = self.patterns.get(&config.prompt_pattern, None)?;
        let mut buffer = PatternBuffer::new(config.prompt_search_depth);

        let mut transport = self.transport.lock().await;
        let narrowed = if duration.is_zero() {
            transport.timeout()
        } else {
            duration
        };
        let mut guard = TimeoutGuard::narrow(&mut transport, narrowed);
        let start = Instant::now();

        loop {
            match guard.transport().read().await {
                Ok(raw) => buffer.extend(&self.ingest(&raw, config.strip_ansi)),
                Err(e) if e.is_timeout() => trace!("quiet read while waiting for output"),
                Err(e) => return Err(e),
            }

            if !duration.is_zero() && start.elapsed() >= duration {
                debug!("read_until_prompt_or_time: {:?} elapsed", duration);
                break;
            }
            if outputs
                .iter()
                .any(|output| !output.is_empty() && buffer.contains_literal(output.as_bytes()))
            {
                break;
            }
            if buffer.tail_contains(pattern.as_regex()) {
                break;
            }
        }

        Ok(buffer.take())
    }

    fn finish(
        &self,
        config: &ChannelConfig,
        mut raw: Vec<u8>,
        reply: Vec<u8>,
        strip_prompt: bool,
    ) -> Result<ChannelOutput> {
        let prompt = self.patterns.get(&config.prompt_pattern, None)?;
        let processed = process_output(
            &reply,
            strip_prompt,
            Some(prompt.as_regex()),
            &config.return_char,
        );
        raw.extend_from_slice(&reply);
        Ok(ChannelOutput { raw, processed })
    }

    // ---- public operations ----

    /// Send `input` as-is. Redacted input is logged as `<redacted>`.
    pub async fn write(&self, input: &str, redacted: bool) -> Result<()> {
        let config = self.config();
        with_timeout("write", config.timeout_ops, async {
            let _lock = self.lock_operation(&config).await;
            self.write_inner(input, redacted).await
        })
        .await
    }

    /// Send the configured return character.
    pub async fn send_return(&self) -> Result<()> {
        let config = self.config();
        with_timeout("send_return", config.timeout_ops, async {
            let _lock = self.lock_operation(&config).await;
            self.send_return_inner(&config).await
        })
        .await
    }

    /// Read until the echo of `input` shows up.
    pub async fn read_until_input(&self, input: &[u8]) -> Result<Vec<u8>> {
        let config = self.config();
        with_timeout("read_until_input", config.timeout_ops, async {
            let _lock = self.lock_operation(&config).await;
            self.read_until_input_inner(&config, input).await
        })
        .await
    }

    /// Read until the prompt (or `override_pattern`) matches the buffer tail.
    pub async fn read_until_prompt(&self, override_pattern: Option<&str>) -> Result<Vec<u8>> {
        let config = self.config();
        with_timeout("read_until_prompt", config.timeout_ops, async {
            let _lock = self.lock_operation(&config).await;
            self.read_until_prompt_inner(&config, override_pattern).await
        })
        .await
    }

    /// Read until the prompt or `pattern` matches the buffer tail.
    ///
    /// `pattern` follows the override rules of
    /// [`read_until_prompt`](Self::read_until_prompt). The flag is true when
    /// `pattern`, not the prompt, ended the read.
    pub async fn read_until_prompt_or_pattern(&self, pattern: &str) -> Result<(Vec<u8>, bool)> {
        let config = self.config();
        with_timeout("read_until_prompt_or_pattern", config.timeout_ops, async {
            let _lock = self.lock_operation(&config).await;
            let prompt = self.patterns.get(&config.prompt_pattern, None)?;
            let wanted = self.patterns.get(&config.prompt_pattern, Some(pattern))?;
            let mut buffer = PatternBuffer::new(config.prompt_search_depth);
            loop {
                let chunk = self.read_chunk(config.strip_ansi).await?;
                buffer.extend(&chunk);
                if buffer.tail_contains(wanted.as_regex()) {
                    return Ok((buffer.take(), true));
                }
                if buffer.tail_contains(prompt.as_regex()) {
                    return Ok((buffer.take(), false));
                }
            }
        })
        .await
    }

    /// Read until the prompt matches, any of `outputs` appears, or
    /// `duration` (default `timeout_ops`) elapses.
    ///
    /// Running out of `duration` is a normal return with whatever was read.
    pub async fn read_until_prompt_or_time(
        &self,
        outputs: &[&str],
        duration: Option<Duration>,
    ) -> Result<Vec<u8>> {
        let config = self.config();
        let bound = or_time_bound(&config, duration);
        with_timeout("read_until_prompt_or_time", bound, async {
            let _lock = self.lock_operation(&config).await;
            self.read_until_prompt_or_time_inner(&config, outputs, duration)
                .await
        })
        .await
    }

    /// Send one line and read its output.
    ///
    /// Writes `input`, waits for its echo, sends a return and, unless
    /// `eager`, reads until the prompt. The processed output is built from
    /// what followed the return only.
    pub async fn send_input(&self, input: &str, strip_prompt: bool, eager: bool) -> Result<ChannelOutput> {
        let config = self.config();
        with_timeout("send_input", config.timeout_ops, async {
            let _lock = self.lock_operation(&config).await;
            debug!("send_input: {:?}", input);

            self.write_inner(input, false).await?;
            let raw = self.read_until_input_inner(&config, input.as_bytes()).await?;
            self.send_return_inner(&config).await?;
            let reply = if eager {
                Vec::new()
            } else {
                self.read_until_prompt_inner(&config, None).await?
            };

            self.finish(&config, raw, reply, strip_prompt)
        })
        .await
    }

    /// Like [`send_input`](Self::send_input) but the read also stops on any
    /// of `outputs` or after `duration`.
    ///
    /// Output that never reaches a prompt (a pager, a long `show tech`) is
    /// returned once `duration` runs out instead of failing the operation.
    pub async fn send_input_and_read(
        &self,
        input: &str,
        strip_prompt: bool,
        outputs: &[&str],
        duration: Option<Duration>,
    ) -> Result<ChannelOutput> {
        let config = self.config();
        let bound = or_time_bound(&config, duration);
        with_timeout("send_input_and_read", bound, async {
            let _lock = self.lock_operation(&config).await;
            debug!("send_input_and_read: {:?}", input);

            self.write_inner(input, false).await?;
            let raw = self.read_until_input_inner(&config, input.as_bytes()).await?;
            self.send_return_inner(&config).await?;
            let reply = self
                .read_until_prompt_or_time_inner(&config, outputs, duration)
                .await?;

            self.finish(&config, raw, reply, strip_prompt)
        })
        .await
    }

    /// Drive a multi-step dialogue.
    ///
    /// For each event the input is written. Its echo is awaited only when the
    /// event has a pattern and is not hidden. A return is always sent, then
    /// the read runs until the event's pattern (or the prompt, when empty).
    pub async fn send_inputs_interact(&self, events: &[InteractiveEvent]) -> Result<ChannelOutput> {
        validate_events(events)?;
        let config = self.config();
        with_timeout("send_inputs_interact", config.timeout_ops, async {
            let _lock = self.lock_operation(&config).await;
            let mut raw = Vec::new();

            for event in events {
                debug!("interactive step: {:?}", event.redacted_input());
                let step = async {
                    self.write_inner(&event.input, event.hidden).await?;
                    let mut step_raw = if !event.pattern.is_empty() && !event.hidden {
                        self.read_until_input_inner(&config, event.input.as_bytes())
                            .await?
                    } else {
                        Vec::new()
                    };
                    self.send_return_inner(&config).await?;
                    let reply = self
                        .read_until_prompt_inner(&config, Some(&event.pattern))
                        .await?;
                    step_raw.extend_from_slice(&reply);
                    Ok::<_, Error>(step_raw)
                };

                let step_raw = match event.timeout {
                    Some(timeout) => with_timeout("interactive step", timeout, step).await?,
                    None => step.await?,
                };
                raw.extend_from_slice(&step_raw);
            }

            self.finish(&config, Vec::new(), raw, false)
        })
        .await
    }

    /// Send a return and report the prompt the device shows.
    pub async fn get_prompt(&self) -> Result<String> {
        let config = self.config();
        with_timeout("get_prompt", config.timeout_ops, async {
            let _lock = self.lock_operation(&config).await;
            let pattern = self.patterns.get(&config.prompt_pattern, None)?;

            self.send_return_inner(&config).await?;
            let mut buffer = PatternBuffer::new(config.prompt_search_depth);
            loop {
                let chunk = self.read_chunk(config.strip_ansi).await?;
                buffer.extend(&chunk);
                if let Some(found) = pattern.as_regex().find_iter(buffer.tail()).last() {
                    let prompt = String::from_utf8_lossy(found.as_bytes()).trim().to_string();
                    debug!("get_prompt: {:?}", prompt);
                    return Ok(prompt);
                }
            }
        })
        .await
    }
}

/// Operation bound for reads that may end on a deadline.
///
/// `timeout_ops` covers the writes and echo, the read duration is added on
/// top so the read's own deadline always ends the read first.
fn or_time_bound(config: &ChannelConfig, duration: Option<Duration>) -> Duration {
    if config.timeout_ops.is_zero() {
        return Duration::ZERO;
    }
    config
        .timeout_ops
        .saturating_add(duration.unwrap_or(config.timeout_ops))
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("config", &self.config())
            .field("in_channel_auth", &self.in_channel_auth)
            .finish_non_exhaustive()
    }
}
