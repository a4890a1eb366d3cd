//! Privilege level definition.

use regex::bytes::Regex;

use crate::error::{ChannelError, Result};

/// A privilege level definition for a network device.
///
/// Privilege levels form a tree where each level but the root names a parent
/// (`previous_priv`) and carries the commands that move between the two.
#[derive(Debug, Clone)]
pub struct PrivilegeLevel {
    /// Name of this privilege level (e.g., "exec", "privilege_exec", "configuration").
    pub name: String,

    /// Regex matching the prompt of this level.
    pub pattern: Regex,

    /// Name of the parent privilege level (None for the root).
    pub previous_priv: Option<String>,

    /// Command that enters this level from the parent.
    pub escalate_command: Option<String>,

    /// Command that leaves this level for the parent.
    pub deescalate_command: Option<String>,

    /// Whether entering this level asks for the secondary secret.
    pub escalate_auth: bool,

    /// Prompt the device shows when asking for the secondary secret.
    ///
    /// Interpreted like any per-call prompt override: `^...$` patterns are
    /// regexes, anything else is matched literally.
    pub escalate_prompt: Option<String>,

    /// Strings that must NOT appear in the prompt for this level to match.
    /// Used for disambiguation (e.g., "#" matches both privileged and config modes).
    pub not_contains: Vec<String>,
}

impl PrivilegeLevel {
    /// Create a new privilege level with minimal required fields.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern).map_err(ChannelError::from)?,
            previous_priv: None,
            escalate_command: None,
            deescalate_command: None,
            escalate_auth: false,
            escalate_prompt: None,
            not_contains: vec![],
        })
    }

    /// Set the parent privilege level.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.previous_priv = Some(parent.into());
        self
    }

    /// Set the escalation command.
    pub fn with_escalate(mut self, command: impl Into<String>) -> Self {
        self.escalate_command = Some(command.into());
        self
    }

    /// Set the de-escalation command.
    pub fn with_deescalate(mut self, command: impl Into<String>) -> Self {
        self.deescalate_command = Some(command.into());
        self
    }

    /// Require the secondary secret when escalating, answered at `prompt`.
    pub fn with_auth(mut self, prompt: impl Into<String>) -> Self {
        self.escalate_auth = true;
        self.escalate_prompt = Some(prompt.into());
        self
    }

    /// Add a not_contains pattern.
    pub fn with_not_contains(mut self, pattern: impl Into<String>) -> Self {
        self.not_contains.push(pattern.into());
        self
    }

    /// The prompt regex source.
    pub fn pattern_source(&self) -> &str {
        self.pattern.as_str()
    }

    /// True for the level without a parent.
    pub fn is_root(&self) -> bool {
        self.previous_priv.is_none()
    }

    /// Check if this privilege level matches a prompt.
    pub fn matches(&self, prompt: &str) -> bool {
        if self.not_contains.iter().any(|nc| prompt.contains(nc.as_str())) {
            return false;
        }
        self.pattern.is_match(prompt.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_contains_filters_before_pattern() {
        let level = PrivilegeLevel::new("privilege_exec", r"(?m)^\S+#\s?$")
            .unwrap()
            .with_not_contains("(config");

        assert!(level.matches("router#"));
        assert!(!level.matches("router(config)#"));
        assert!(!level.matches("router>"));
    }

    #[test]
    fn test_with_auth_sets_prompt() {
        let level = PrivilegeLevel::new("privilege_exec", r"#\s?$")
            .unwrap()
            .with_parent("exec")
            .with_escalate("enable")
            .with_auth(r"(?i)^password:\s?$");

        assert!(level.escalate_auth);
        assert_eq!(level.escalate_prompt.as_deref(), Some(r"(?i)^password:\s?$"));
        assert!(!level.is_root());
        assert_eq!(level.pattern_source(), r"#\s?$");
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PrivilegeLevel::new("broken", r"(unclosed").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Channel(ChannelError::InvalidPattern(_))
        ));
    }
}
