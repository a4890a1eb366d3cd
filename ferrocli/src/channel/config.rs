//! Channel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prompt pattern used when nothing more specific is configured.
pub const DEFAULT_PROMPT_PATTERN: &str = r"^[a-z0-9.\-@()/:]{1,48}[#>$]\s*$";

/// Settings for a [`Channel`](super::Channel).
///
/// The channel snapshots this at the start of every operation, so changes
/// made through [`Channel::update_config`](super::Channel::update_config)
/// apply to the next operation and never to one already running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Regex matching every prompt the device can show. Compiled multi-line
    /// and case-insensitive.
    pub prompt_pattern: String,

    /// Character(s) sent to submit a line.
    pub return_char: String,

    /// Strip ANSI escape sequences from everything read.
    pub strip_ansi: bool,

    /// Accept an echo the CLI expanded from an abbreviated command.
    pub auto_expand: bool,

    /// Bytes from the end of the read buffer searched for the prompt.
    pub prompt_search_depth: usize,

    /// Bound on every public channel operation. Zero disables the bound.
    pub timeout_ops: Duration,

    /// Hold an exclusive lock for the whole of each channel operation.
    pub channel_lock: bool,

    /// Case-insensitive substrings announcing a telnet username challenge.
    pub username_prompts: Vec<String>,

    /// Case-insensitive substrings announcing a password challenge.
    pub password_prompts: Vec<String>,

    /// Case-insensitive substrings announcing an SSH key passphrase challenge.
    pub passphrase_prompts: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            prompt_pattern: DEFAULT_PROMPT_PATTERN.to_string(),
            return_char: "\n".to_string(),
            strip_ansi: false,
            auto_expand: false,
            prompt_search_depth: 1000,
            timeout_ops: Duration::from_secs(30),
            channel_lock: false,
            username_prompts: vec!["login:".to_string(), "username:".to_string()],
            password_prompts: vec!["password:".to_string()],
            passphrase_prompts: vec!["enter passphrase for key".to_string()],
        }
    }
}
