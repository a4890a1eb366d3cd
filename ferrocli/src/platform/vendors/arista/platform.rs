//! Arista EOS platform definition.
//!
//! Supports Arista devices running EOS with the following privilege levels:
//! - `exec` - User EXEC mode with `>` prompt
//! - `privilege_exec` - Privileged EXEC mode with `#` prompt
//! - `configuration` - Configuration mode with `(config*)#` prompt
//! - `config_session_<name>` - registered at runtime for named sessions
//!
//! Prompt patterns are adapted from [scrapli](https://github.com/carlmontanari/scrapli).
//!
//! # Prompt Examples
//!
//! ```text
//! switch>                            # exec mode
//! switch#                            # privilege_exec mode
//! switch(config)#                    # configuration mode
//! switch(config-if-Et1)#             # config sub-mode (interface)
//! switch(config-s-my_ses)#           # named config session
//! ```
//!
//! # Privilege Graph
//!
//! ```text
//! ┌──────┐  enable     ┌────────────────┐  configure terminal  ┌───────────────┐
//! │ exec ├──────────────► privilege_exec ├──────────────────────► configuration │
//! │  >   │   disable   │       #        │        end           │  (config*)#   │
//! └──────┘◄────────────┴───────┬────────┘◄─────────────────────┴───────────────┘
//!                              │ configure session <name>
//!                              ▼
//!                     ┌─────────────────────┐
//!                     │ config_session_name │
//!                     │  (config-s-name)#   │
//!                     └─────────────────────┘
//! ```

use crate::error::Result;
use crate::platform::{PlatformDefinition, PrivilegeLevel};

/// Platform name for Arista EOS.
pub const PLATFORM_NAME: &str = "arista_eos";

/// Create the Arista EOS platform definition.
///
/// Uses `(?mi)` flags for multiline (^ matches line start) and case-insensitive matching.
pub fn platform() -> Result<PlatformDefinition> {
    let exec = PrivilegeLevel::new("exec", r"(?mi)^[\w.\-@()/: ]{1,63}>\s?$")?;

    // not_contains "(config" keeps config and session prompts out
    let privilege_exec = PrivilegeLevel::new("privilege_exec", r"(?mi)^[\w.\-@()/: ]{1,63}#\s?$")?
        .with_parent("exec")
        .with_escalate("enable")
        .with_deescalate("disable")
        .with_auth(r"(?mi)^password:\s?$")
        .with_not_contains("(config");

    // not_contains "(config-s-" leaves named session prompts to their own level
    let configuration = PrivilegeLevel::new(
        "configuration",
        r"(?mi)^[\w.\-@()/: ]{1,63}\(config[\w.\-@/:+]{0,63}\)#\s?$",
    )?
    .with_parent("privilege_exec")
    .with_escalate("configure terminal")
    .with_deescalate("end")
    .with_not_contains("(config-s-");

    Ok(PlatformDefinition::new(PLATFORM_NAME)
        .with_privilege(exec)
        .with_privilege(privilege_exec)
        .with_privilege(configuration)
        .with_default_privilege("privilege_exec")
        .with_failure_pattern("% Ambiguous command")
        .with_failure_pattern("% Error")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("% Invalid input")
        .with_failure_pattern("% Cannot commit")
        .with_failure_pattern("% Unavailable command")
        .with_failure_pattern("% Duplicate sequence number")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 32767")
        .with_terminal_size(32767, 24))
}

/// Name of the dynamic privilege level for session `session_name`.
pub fn session_level_name(session_name: &str) -> String {
    format!("config_session_{session_name}")
}

/// Prompt regex for session `session_name`.
///
/// EOS shows only the first six characters of the session name in the
/// prompt, so longer names sharing that prefix match too.
pub fn session_prompt_pattern(session_name: &str) -> String {
    let first6: String = session_name.chars().take(6).collect();
    format!(
        r"(?mi)^[\w.\-@()/: ]{{1,63}}\(config\-s\-{}[\w.\-@/:+]{{0,64}}\)#\s?$",
        regex::escape(&first6)
    )
}

/// The dynamic privilege level for session `session_name`.
pub fn session_level(session_name: &str) -> Result<PrivilegeLevel> {
    Ok(PrivilegeLevel::new(
        session_level_name(session_name),
        &session_prompt_pattern(session_name),
    )?
    .with_parent("privilege_exec")
    .with_escalate(format!("configure session {session_name}"))
    .with_deescalate("end"))
}
