//! Channel layer for pattern matching and PTY operations.
//!
//! This module handles the interactive session management: prompt detection
//! over a tail window, echo tracking, output normalization, ANSI stripping,
//! multi-step dialogues and in-band login.

mod ansi;
mod auth;
mod buffer;
mod config;
mod interactive;
mod normalize;
mod patterns;
mod pty;
mod session_log;

pub use ansi::{AnsiStripper, strip_ansi};
pub use auth::classify_ssh_banner;
pub use buffer::PatternBuffer;
pub use config::{ChannelConfig, DEFAULT_PROMPT_PATTERN};
pub use interactive::{InteractiveBuilder, InteractiveBuilderWithInput, InteractiveEvent};
pub use normalize::{is_auto_expanded, process_output};
pub use patterns::{PatternCache, PromptPattern};
pub use pty::{Channel, ChannelOutput};
pub use session_log::{ChannelLog, FileChannelLog, LogMode, MemoryChannelLog};
