//! Platform definitions for multi-vendor support.
//!
//! A platform bundles a device family's privilege levels, failure strings,
//! on-open commands and optional output post-processing. Built-in platforms
//! are selected through [`Platform`]; anything else is a
//! [`Platform::Custom`] definition.

mod definition;
mod privilege_level;
pub mod vendors;

pub use definition::PlatformDefinition;
pub use privilege_level::PrivilegeLevel;

use std::fmt;
use std::str::FromStr;

use crate::error::{PlatformError, Result};

/// Vendor-specific output handling.
pub trait VendorBehavior: Send + Sync {
    /// Post-process the processed output of a command.
    fn post_process_output(&self, output: &str) -> String {
        output.to_string()
    }

    /// Detect command failure from output.
    ///
    /// Returns the first entry of `failed_when_contains` found in `output`.
    fn detect_failure(&self, output: &str, failed_when_contains: &[String]) -> Option<String> {
        failed_when_contains
            .iter()
            .find(|pattern| output.contains(pattern.as_str()))
            .cloned()
    }
}

/// Default vendor behavior: output passes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBehavior;

impl VendorBehavior for DefaultBehavior {}

/// Device platform selection.
#[derive(Debug, Clone)]
pub enum Platform {
    /// Linux/Unix shell.
    Linux,
    /// Cisco IOS-XE.
    CiscoIosxe,
    /// Arista EOS.
    AristaEos,
    /// Juniper JUNOS.
    JuniperJunos,
    /// A caller-supplied definition.
    Custom(PlatformDefinition),
}

impl Platform {
    /// Build the platform definition.
    pub fn definition(&self) -> Result<PlatformDefinition> {
        match self {
            Platform::Linux => vendors::linux::platform(),
            Platform::CiscoIosxe => vendors::cisco_iosxe::platform(),
            Platform::AristaEos => vendors::arista::platform(),
            Platform::JuniperJunos => vendors::juniper::platform(),
            Platform::Custom(definition) => Ok(definition.clone()),
        }
    }

    /// The platform name.
    pub fn name(&self) -> &str {
        match self {
            Platform::Linux => vendors::linux::PLATFORM_NAME,
            Platform::CiscoIosxe => vendors::cisco_iosxe::PLATFORM_NAME,
            Platform::AristaEos => vendors::arista::PLATFORM_NAME,
            Platform::JuniperJunos => vendors::juniper::PLATFORM_NAME,
            Platform::Custom(definition) => &definition.name,
        }
    }
}

impl From<PlatformDefinition> for Platform {
    fn from(definition: PlatformDefinition) -> Self {
        Platform::Custom(definition)
    }
}

impl FromStr for Platform {
    type Err = crate::Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            vendors::linux::PLATFORM_NAME => Ok(Platform::Linux),
            vendors::cisco_iosxe::PLATFORM_NAME => Ok(Platform::CiscoIosxe),
            vendors::arista::PLATFORM_NAME => Ok(Platform::AristaEos),
            vendors::juniper::PLATFORM_NAME => Ok(Platform::JuniperJunos),
            _ => Err(PlatformError::UnknownPlatform {
                name: name.to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::PrivilegeManager;

    #[test]
    fn test_builtin_platforms_build_valid_graphs() {
        for platform in [
            Platform::Linux,
            Platform::CiscoIosxe,
            Platform::AristaEos,
            Platform::JuniperJunos,
        ] {
            let definition = platform.definition().unwrap();
            assert_eq!(definition.name, platform.name());
            definition.validate().unwrap();
            PrivilegeManager::new(definition.privilege_levels.clone()).unwrap();
        }
    }

    #[test]
    fn test_platform_from_name() {
        let platform: Platform = "arista_eos".parse().unwrap();
        assert!(matches!(platform, Platform::AristaEos));
        assert_eq!(platform.to_string(), "arista_eos");

        let err = "nokia_sros".parse::<Platform>().unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Platform(PlatformError::UnknownPlatform { .. })
        ));
    }

    #[test]
    fn test_default_failure_detection() {
        let patterns = vec!["% Invalid input".to_string(), "% Error".to_string()];
        let behavior = DefaultBehavior;
        assert_eq!(
            behavior.detect_failure("foo\n% Error: bad", &patterns).as_deref(),
            Some("% Error")
        );
        assert_eq!(behavior.detect_failure("all good", &patterns), None);
        assert_eq!(behavior.post_process_output("out"), "out");
    }
}
