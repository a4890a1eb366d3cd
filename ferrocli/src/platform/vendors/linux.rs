//! Linux platform definition.
//!
//! This is the simplest platform, supporting standard Linux/Unix shells
//! with `$` (user) and `#` (root) prompts.

use crate::error::Result;
use crate::platform::{PlatformDefinition, PrivilegeLevel};

/// Platform name for Linux.
pub const PLATFORM_NAME: &str = "linux";

/// Create the Linux platform definition.
pub fn platform() -> Result<PlatformDefinition> {
    let user = PrivilegeLevel::new("user", r"(?m)^[\w.\-@()/:~\[\] ]{0,64}\$\s?$")?;

    let root = PrivilegeLevel::new("root", r"(?m)^[\w.\-@()/:~\[\] ]{0,64}#\s?$")?
        .with_parent("user")
        .with_escalate("sudo -i")
        .with_deescalate("exit")
        .with_auth(r"(?mi)^.*password[^\n]*:\s?$");

    Ok(PlatformDefinition::new(PLATFORM_NAME)
        .with_privilege(user)
        .with_privilege(root)
        .with_default_privilege("user")
        .with_failure_pattern("command not found")
        .with_failure_pattern("No such file or directory")
        .with_failure_pattern("Permission denied")
        .with_failure_pattern("Operation not permitted")
        .with_terminal_size(511, 24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::PromptPattern;

    #[test]
    fn test_linux_platform() {
        let platform = platform().unwrap();
        assert_eq!(platform.name, "linux");
        assert_eq!(platform.privilege_levels.len(), 2);
        assert!(platform.privilege_levels.contains_key("user"));
        assert!(platform.privilege_levels.contains_key("root"));
    }

    #[test]
    fn test_user_prompt_match() {
        let platform = platform().unwrap();
        let user = platform.privilege_levels.get("user").unwrap();
        assert!(user.matches("user@host:~$ "));
        assert!(user.matches("[user@host ~]$"));
        assert!(user.matches("$ "));
        assert!(!user.matches("root@host:~# "));
    }

    #[test]
    fn test_root_prompt_match() {
        let platform = platform().unwrap();
        let root = platform.privilege_levels.get("root").unwrap();
        assert!(root.matches("root@host:~# "));
        assert!(root.matches("# "));
        assert!(!root.matches("user@host:~$ "));
    }

    #[test]
    fn test_sudo_prompt_is_a_regex_override() {
        let platform = platform().unwrap();
        let root = platform.privilege_levels.get("root").unwrap();
        let prompt = PromptPattern::from_override(root.escalate_prompt.as_deref().unwrap()).unwrap();
        assert!(!prompt.is_literal());
        assert!(prompt.is_match(b"sudo -i\n[sudo] password for admin: "));
        assert!(prompt.is_match(b"Password:"));
    }

    #[test]
    fn test_failed_when_contains() {
        let platform = platform().unwrap();
        assert!(
            platform
                .failed_when_contains
                .contains(&"command not found".to_string())
        );
        assert!(
            platform
                .failed_when_contains
                .contains(&"Permission denied".to_string())
        );
    }
}
