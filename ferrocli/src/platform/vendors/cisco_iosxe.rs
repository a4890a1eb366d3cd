//! Cisco IOS-XE platform definition.
//!
//! Prompt patterns are adapted from [scrapli](https://github.com/carlmontanari/scrapli).
//!
//! ```text
//! router>                 # exec
//! router#                 # privilege_exec
//! router(config)#         # configuration
//! router(config-if)#      # configuration sub-mode
//! ```

use crate::error::Result;
use crate::platform::{PlatformDefinition, PrivilegeLevel};

/// Platform name for Cisco IOS-XE.
pub const PLATFORM_NAME: &str = "cisco_iosxe";

/// Create the Cisco IOS-XE platform definition.
pub fn platform() -> Result<PlatformDefinition> {
    let exec = PrivilegeLevel::new("exec", r"(?mi)^[\w.\-@/:]{1,63}>\s?$")?;

    let privilege_exec = PrivilegeLevel::new("privilege_exec", r"(?mi)^[\w.\-@/:]{1,63}#\s?$")?
        .with_parent("exec")
        .with_escalate("enable")
        .with_deescalate("disable")
        .with_auth(r"(?mi)^(?:enable\s)?password:\s?$");

    let configuration = PrivilegeLevel::new(
        "configuration",
        r"(?mi)^[\w.\-@/:]{1,63}\(conf[\w.\-@/:+]{0,32}\)#\s?$",
    )?
    .with_parent("privilege_exec")
    .with_escalate("configure terminal")
    .with_deescalate("end")
    .with_not_contains("(tcl)");

    Ok(PlatformDefinition::new(PLATFORM_NAME)
        .with_privilege(exec)
        .with_privilege(privilege_exec)
        .with_privilege(configuration)
        .with_default_privilege("privilege_exec")
        .with_failure_pattern("% Ambiguous command")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("% Invalid input detected")
        .with_failure_pattern("% Unknown command")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 512")
        .with_terminal_size(511, 24))
}
