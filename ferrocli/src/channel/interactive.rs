//! Interactive command support for handling prompts that require user input.
//!
//! Many network device commands require confirmation or additional input:
//! - `reload` asks "Proceed with reload? [confirm]"
//! - `copy running-config startup-config` asks for confirmation
//! - `delete flash:file` asks "Delete filename [confirm]?"
//!
//! [`Channel::send_inputs_interact`](super::Channel::send_inputs_interact)
//! handles these by sending a sequence of inputs, each waiting for a
//! specific pattern before proceeding.

use std::time::Duration;

use crate::error::{ChannelError, Result};

/// An event in an interactive command sequence.
///
/// Each event consists of:
/// - `input`: The text to send (command or response like "y" or "n")
/// - `pattern`: What to wait for after sending the input. Empty means the
///   channel's configured prompt. Anchored patterns (`^...$`) are regexes,
///   anything else is matched literally.
/// - `hidden`: Whether the input is a secret; it is redacted in the session
///   log and its echo is not awaited
///
/// # Example
///
/// ```rust
/// use ferrocli::channel::InteractiveEvent;
///
/// // Handle a reload command that asks for confirmation
/// let events = vec![
///     InteractiveEvent::new("reload", "[confirm]"),
///     InteractiveEvent::new("y", ""),
/// ];
/// ```
#[derive(Debug, Clone)]
pub struct InteractiveEvent {
    /// The input to send (command or response).
    pub input: String,

    /// Pattern to wait for after sending input.
    pub pattern: String,

    /// Whether this input is a secret (e.g., passwords).
    pub hidden: bool,

    /// Optional timeout override for this specific event.
    pub timeout: Option<Duration>,
}

impl InteractiveEvent {
    /// Create a new interactive event.
    ///
    /// # Arguments
    ///
    /// * `input` - The text to send
    /// * `pattern` - What to wait for after sending; empty for the prompt
    pub fn new(input: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            pattern: pattern.into(),
            hidden: false,
            timeout: None,
        }
    }

    /// Create an event for hidden input (like passwords).
    ///
    /// The input will not be logged.
    pub fn hidden(input: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            pattern: pattern.into(),
            hidden: true,
            timeout: None,
        }
    }

    /// Set a custom timeout for this event.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark this event's input as hidden (for logging).
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Reject input that cannot be sent as a single line.
    pub fn validate(&self) -> Result<()> {
        if self.input.contains(['\n', '\r']) {
            return Err(ChannelError::InvalidInput {
                message: format!(
                    "interactive input must be a single line: {:?}",
                    self.redacted_input()
                ),
            }
            .into());
        }
        Ok(())
    }

    /// The input as it may appear in logs.
    pub fn redacted_input(&self) -> &str {
        if self.hidden { "********" } else { self.input.as_str() }
    }
}

/// Validate a whole event sequence.
pub fn validate_events(events: &[InteractiveEvent]) -> Result<()> {
    if events.is_empty() {
        return Err(ChannelError::InvalidInput {
            message: "interactive sequence has no events".to_string(),
        }
        .into());
    }
    events.iter().try_for_each(InteractiveEvent::validate)
}

/// Builder for creating interactive command sequences.
///
/// # Example
///
/// ```rust
/// use ferrocli::channel::InteractiveBuilder;
/// use std::time::Duration;
///
/// let events = InteractiveBuilder::new()
///     .send("copy running-config startup-config")
///     .expect("Destination filename")
///     .send("")  // Accept default filename
///     .expect("")
///     .with_timeout(Duration::from_secs(60))
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct InteractiveBuilder {
    events: Vec<InteractiveEvent>,
    default_timeout: Option<Duration>,
}

impl InteractiveBuilder {
    /// Create a new interactive builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input to send.
    ///
    /// Must be followed by `expect()` to specify what to wait for.
    pub fn send(self, input: impl Into<String>) -> InteractiveBuilderWithInput {
        InteractiveBuilderWithInput {
            builder: self,
            input: input.into(),
            hidden: false,
            timeout: None,
        }
    }

    /// Add a hidden input (like a password).
    pub fn send_hidden(self, input: impl Into<String>) -> InteractiveBuilderWithInput {
        InteractiveBuilderWithInput {
            builder: self,
            input: input.into(),
            hidden: true,
            timeout: None,
        }
    }

    /// Set the default timeout for all events.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Build the list of interactive events.
    pub fn build(self) -> Vec<InteractiveEvent> {
        self.events
    }
}

/// Intermediate state for the builder after `send()` is called.
#[derive(Debug)]
pub struct InteractiveBuilderWithInput {
    builder: InteractiveBuilder,
    input: String,
    hidden: bool,
    timeout: Option<Duration>,
}

impl InteractiveBuilderWithInput {
    /// Specify the pattern to wait for after sending the input.
    pub fn expect(mut self, pattern: impl Into<String>) -> InteractiveBuilder {
        let mut event = if self.hidden {
            InteractiveEvent::hidden(self.input, pattern)
        } else {
            InteractiveEvent::new(self.input, pattern)
        };

        if let Some(timeout) = self.timeout.or(self.builder.default_timeout) {
            event = event.with_timeout(timeout);
        }

        self.builder.events.push(event);
        self.builder
    }

    /// Set a custom timeout for this specific event.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactive_event_new() {
        let event = InteractiveEvent::new("reload", r"confirm");
        assert_eq!(event.input, "reload");
        assert!(!event.hidden);
        assert!(event.timeout.is_none());
    }

    #[test]
    fn test_interactive_event_hidden() {
        let event = InteractiveEvent::hidden("secret123", r"#");
        assert_eq!(event.input, "secret123");
        assert!(event.hidden);
    }

    #[test]
    fn test_interactive_builder() {
        let events = InteractiveBuilder::new()
            .send("reload")
            .expect(r"confirm")
            .send("y")
            .expect(r"#")
            .build();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].input, "reload");
        assert_eq!(events[1].input, "y");
    }

    #[test]
    fn test_interactive_builder_with_hidden() {
        let events = InteractiveBuilder::new()
            .send("enable")
            .expect(r"[Pp]assword")
            .send_hidden("secret")
            .expect(r"#")
            .build();

        assert_eq!(events.len(), 2);
        assert!(!events[0].hidden);
        assert!(events[1].hidden);
    }

    #[test]
    fn test_validation() {
        assert!(validate_events(&[]).is_err());
        assert!(validate_events(&[InteractiveEvent::new("reload", "[confirm]")]).is_ok());

        let err = InteractiveEvent::hidden("sec\nret", "").validate().unwrap_err();
        assert!(err.to_string().contains("********"));
        assert!(!err.to_string().contains("sec"));
    }

    #[test]
    fn test_builder_timeouts() {
        let events = InteractiveBuilder::new()
            .with_timeout(Duration::from_secs(60))
            .send("reload")
            .expect("[confirm]")
            .send("y")
            .with_timeout(Duration::from_secs(5))
            .expect("")
            .build();

        assert_eq!(events[0].timeout, Some(Duration::from_secs(60)));
        assert_eq!(events[1].timeout, Some(Duration::from_secs(5)));
        assert_eq!(events[1].pattern, "");
    }
}
