//! Juniper JUNOS platform support.

mod platform;

pub use platform::{JuniperBehavior, PLATFORM_NAME, platform};
