//! Juniper JUNOS platform definition.
//!
//! Supports Juniper devices running JUNOS with the following privilege levels:
//! - `exec` - Operational mode with `>` prompt
//! - `configuration` - Configuration mode with `#` prompt
//! - `shell` - Unix shell mode with `%` or `$` prompt
//!
//! Prompt patterns are adapted from [scrapli](https://github.com/carlmontanari/scrapli).
//!
//! # Prompt Examples
//!
//! ```text
//! user@router>              # exec mode
//! user@router#              # configuration mode
//! %                         # shell mode (vJunos-router)
//! user@router%              # shell mode
//! {master:0}                # routing-engine indicator (separate line)
//! user@router>              # exec prompt on next line
//! {master:0}[edit]          # config with routing-engine indicator
//! user@router#              # config prompt on next line
//! ```
//!
//! # Privilege Graph
//!
//! ```text
//! ┌──────┐  configure   ┌───────────────┐
//! │ exec ├──────────────► configuration │
//! │  >   │    exit      │      #        │
//! └──┬───┘◄─────────────┴───────────────┘
//!    │
//!    └─ start shell ──────► ┌──────┐
//!                           │shell │
//!                           │ %/$  │
//!                           └──────┘
//!                             exit
//! ```

use std::sync::Arc;

use crate::error::Result;
use crate::platform::{PlatformDefinition, PrivilegeLevel, VendorBehavior};

/// Platform name for Juniper JUNOS.
pub const PLATFORM_NAME: &str = "juniper_junos";

/// Create the Juniper JUNOS platform definition.
///
/// Uses `(?mi)` flags for multiline (^ matches line start) and case-insensitive matching.
pub fn platform() -> Result<PlatformDefinition> {
    let exec = PrivilegeLevel::new(
        "exec",
        r"(?mi)^(\{\w+(:(\w+)?\d)?\}\n)?[\w\-@()/:\.]{1,63}>\s?$",
    )?;

    let configuration = PrivilegeLevel::new(
        "configuration",
        r"(?mi)^(\{\w+(:(\w+)?\d)?\}\[edit\]\n)?[\w\-@()/:\.]{1,63}#\s?$",
    )?
    .with_parent("exec")
    .with_escalate("configure")
    .with_deescalate("exit configuration-mode");

    let shell = PrivilegeLevel::new("shell", r"(?mi)^[\w\-@()/:\.~ ]{0,63}[%$]\s?$")?
        .with_parent("exec")
        .with_escalate("start shell")
        .with_deescalate("exit");

    Ok(PlatformDefinition::new(PLATFORM_NAME)
        .with_privilege(exec)
        .with_privilege(configuration)
        .with_privilege(shell)
        .with_default_privilege("exec")
        .with_failure_pattern("unknown command")
        .with_failure_pattern("syntax error")
        .with_failure_pattern("error:")
        .with_failure_pattern("missing argument")
        .with_failure_pattern("is ambiguous")
        .with_failure_pattern("No valid completions")
        .with_failure_pattern("missing mandatory argument")
        .with_failure_pattern("invalid numeric value")
        .with_on_open_command("set cli screen-length 0")
        .with_on_open_command("set cli screen-width 511")
        .with_terminal_size(511, 24)
        .with_behavior(Arc::new(JuniperBehavior)))
}

/// Drops the `[edit ...]` context lines JUNOS prints in configuration mode.
pub struct JuniperBehavior;

impl VendorBehavior for JuniperBehavior {
    fn post_process_output(&self, output: &str) -> String {
        output
            .lines()
            .filter(|line| !line.trim().starts_with("[edit"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
