//! Scripted in-memory device for tests.
//!
//! [`MockTransport`] behaves like a terminal attached to a CLI:
//!
//! - bytes written without a newline are echoed back (unless the device is
//!   expecting hidden input, or an echo rewrite is configured);
//! - a newline completes the line, which is looked up in the reaction
//!   script; the first matching reaction queues its output;
//! - unmatched lines (including a bare return) answer with the current
//!   prompt on a new line.
//!
//! Each echo and each reaction is delivered as its own chunk. When nothing is
//! queued, `read` sleeps for the transport timeout and fails with
//! [`TransportError::Timeout`], like a real quiet line.
//!
//! Clones share state, so a test can keep a handle for inspection after the
//! transport has been boxed into a channel.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{InChannelAuth, Transport, TransportConfig, TransportKind};
use crate::error::{Result, TransportError};

#[derive(Debug, Clone)]
struct Reaction {
    line: String,
    output: String,
    next_prompt: Option<String>,
    hide_next_input: bool,
    once: bool,
}

#[derive(Debug)]
struct MockState {
    prompt: String,
    chunks: VecDeque<Bytes>,
    reactions: Vec<Reaction>,
    echo_rewrites: HashMap<String, String>,
    on_open: Vec<String>,
    line: Vec<u8>,
    hidden_pending: bool,
    echo: bool,
    written: Vec<u8>,
    lines: Vec<String>,
    timeout: Duration,
    timeout_history: Vec<Duration>,
    open: bool,
    auth: InChannelAuth,
    disconnect_when_drained: bool,
}

/// Scripted transport for channel and driver tests.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A device sitting at `prompt`.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                prompt: prompt.into(),
                chunks: VecDeque::new(),
                reactions: Vec::new(),
                echo_rewrites: HashMap::new(),
                on_open: Vec::new(),
                line: Vec::new(),
                hidden_pending: false,
                echo: true,
                written: Vec::new(),
                lines: Vec::new(),
                timeout: Duration::from_millis(50),
                timeout_history: Vec::new(),
                open: false,
                auth: InChannelAuth::None,
                disconnect_when_drained: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Answer `line` with `output` followed by a newline and the current prompt.
    pub fn respond(&self, line: impl Into<String>, output: impl Into<String>) -> &Self {
        let output = output.into();
        self.push_reaction(Reaction {
            line: line.into(),
            output: format!("\n{output}"),
            next_prompt: None,
            hide_next_input: false,
            once: false,
        })
    }

    /// Answer `line` with exactly `output`; no prompt is appended.
    pub fn respond_raw(&self, line: impl Into<String>, output: impl Into<String>) -> &Self {
        self.push_reaction(Reaction {
            line: line.into(),
            output: output.into(),
            next_prompt: Some(String::new()),
            hide_next_input: false,
            once: false,
        })
    }

    /// Answer `line` with a challenge (e.g. `"Password: "`); the next input is
    /// treated as hidden and not echoed. Used once.
    pub fn challenge(&self, line: impl Into<String>, challenge: impl Into<String>) -> &Self {
        self.push_reaction(Reaction {
            line: line.into(),
            output: format!("\n{}", challenge.into()),
            next_prompt: Some(String::new()),
            hide_next_input: true,
            once: true,
        })
    }

    /// Switch the device to `prompt` after `line`.
    pub fn transition(&self, line: impl Into<String>, prompt: impl Into<String>) -> &Self {
        self.push_reaction(Reaction {
            line: line.into(),
            output: String::new(),
            next_prompt: Some(prompt.into()),
            hide_next_input: false,
            once: false,
        })
    }

    /// Like [`transition`](Self::transition) but consumed after one use.
    pub fn transition_once(&self, line: impl Into<String>, prompt: impl Into<String>) -> &Self {
        self.push_reaction(Reaction {
            line: line.into(),
            output: String::new(),
            next_prompt: Some(prompt.into()),
            hide_next_input: false,
            once: true,
        })
    }

    fn push_reaction(&self, reaction: Reaction) -> &Self {
        self.state().reactions.push(reaction);
        self
    }

    /// Echo `rewritten` instead of `typed` (CLI auto-completion).
    pub fn rewrite_echo(&self, typed: impl Into<String>, rewritten: impl Into<String>) -> &Self {
        self.state()
            .echo_rewrites
            .insert(typed.into(), rewritten.into());
        self
    }

    /// Output produced as soon as the transport is opened.
    pub fn on_open(&self, output: impl Into<String>) -> &Self {
        self.state().on_open.push(output.into());
        self
    }

    /// Queue a chunk for the next read.
    pub fn push_output(&self, output: impl AsRef<[u8]>) -> &Self {
        self.state()
            .chunks
            .push_back(Bytes::copy_from_slice(output.as_ref()));
        self
    }

    /// Disable echo of typed input entirely.
    pub fn without_echo(&self) -> &Self {
        self.state().echo = false;
        self
    }

    /// Report this in-band login requirement.
    pub fn with_in_channel_auth(&self, auth: InChannelAuth) -> &Self {
        self.state().auth = auth;
        self
    }

    /// Fail reads with `Disconnected` once the queue is empty.
    pub fn disconnect_when_drained(&self) -> &Self {
        self.state().disconnect_when_drained = true;
        self
    }

    /// Set the current prompt.
    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.state().prompt = prompt.into();
    }

    /// Current prompt.
    pub fn prompt(&self) -> String {
        self.state().prompt.clone()
    }

    /// Everything written so far, lossily decoded.
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.state().written).into_owned()
    }

    /// Completed lines written so far, in order.
    pub fn lines(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    /// Every value passed to `set_timeout`, in order.
    pub fn timeout_history(&self) -> Vec<Duration> {
        self.state().timeout_history.clone()
    }

    /// Number of chunks still queued.
    pub fn pending_chunks(&self) -> usize {
        self.state().chunks.len()
    }

    /// A [`TransportKind::Custom`] that hands out clones of this mock.
    pub fn transport_kind(&self) -> TransportKind {
        let handle = self.clone();
        TransportKind::Custom(Arc::new(
            move |_: &TransportConfig| -> Result<Box<dyn Transport>> { Ok(Box::new(handle.clone())) },
        ))
    }
}

impl MockState {
    fn complete_line(&mut self) {
        let line = String::from_utf8_lossy(&std::mem::take(&mut self.line)).into_owned();
        self.lines.push(line.clone());
        self.hidden_pending = false;

        let position = self.reactions.iter().position(|r| r.line == line);
        let reaction = match position {
            Some(index) if self.reactions[index].once => Some(self.reactions.remove(index)),
            Some(index) => Some(self.reactions[index].clone()),
            None => None,
        };

        let Some(reaction) = reaction else {
            let output = format!("\n{}", self.prompt);
            self.chunks.push_back(Bytes::from(output));
            return;
        };

        let mut output = reaction.output;
        match reaction.next_prompt {
            Some(prompt) if prompt.is_empty() => {}
            Some(prompt) => {
                self.prompt = prompt;
                output.push('\n');
                output.push_str(&self.prompt);
            }
            None => {
                output.push('\n');
                output.push_str(&self.prompt);
            }
        }
        self.hidden_pending = reaction.hide_next_input;
        self.chunks.push_back(Bytes::from(output));
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> Result<()> {
        let mut state = self.state();
        state.open = true;
        let banners = std::mem::take(&mut state.on_open);
        for banner in banners {
            state.chunks.push_back(Bytes::from(banner));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.state().open = false;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        if !state.open {
            return Err(TransportError::NotOpened.into());
        }
        state.written.extend_from_slice(data);

        let mut echo = Vec::new();
        for &byte in data {
            if byte == b'\n' {
                state.complete_line();
            } else {
                state.line.push(byte);
                echo.push(byte);
            }
        }

        if !echo.is_empty() && state.echo && !state.hidden_pending {
            let typed = String::from_utf8_lossy(&echo).into_owned();
            let shown = state.echo_rewrites.get(&typed).cloned().unwrap_or(typed);
            state.chunks.push_back(Bytes::from(shown));
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<Bytes> {
        let timeout = {
            let mut state = self.state();
            if !state.open {
                return Err(TransportError::NotOpened.into());
            }
            if let Some(chunk) = state.chunks.pop_front() {
                return Ok(chunk);
            }
            if state.disconnect_when_drained {
                return Err(TransportError::Disconnected.into());
            }
            state.timeout
        };

        tokio::time::sleep(timeout).await;
        Err(TransportError::Timeout(timeout).into())
    }

    fn is_alive(&self) -> bool {
        self.state().open
    }

    fn timeout(&self) -> Duration {
        self.state().timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        let mut state = self.state();
        state.timeout = timeout;
        state.timeout_history.push(timeout);
    }

    fn in_channel_auth(&self) -> InChannelAuth {
        self.state().auth
    }
}
