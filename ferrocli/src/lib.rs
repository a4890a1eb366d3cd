//! # ferrocli
//!
//! Async prompt-driven CLI automation for network devices.
//!
//! ferrocli drives interactive device CLIs over SSH or telnet the way an
//! operator would: it sends a line, waits for the echo, then reads until the
//! device shows a prompt again. On top of that channel it tracks the
//! device's privilege level from the live prompt and walks the privilege
//! graph (`exec` → `privilege_exec` → `configuration` and so on) on demand.
//!
//! ## Features
//!
//! - Prompt-driven [`Channel`] with bounded operations, in-band login and
//!   interactive dialogues
//! - SSH via russh, telnet over tokio, or any [`transport::Transport`]
//! - Privilege level management with graph-based navigation and
//!   runtime-registered levels
//! - Built-in platforms (Linux, Cisco IOS-XE, Arista EOS, Juniper JUNOS)
//!   plus custom definitions
//! - Named configuration sessions as consuming guards
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferrocli::{Driver, DriverBuilder, Platform};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ferrocli::Error> {
//!     let mut driver = DriverBuilder::new("192.168.1.1")
//!         .username("admin")
//!         .password("secret")
//!         .platform(Platform::Linux)
//!         .build()?;
//!
//!     driver.open().await?;
//!
//!     let response = driver.send_command("uname -a").await?;
//!     println!("{}", response.result);
//!
//!     driver.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod error;
pub mod platform;
pub mod timeout;
pub mod transport;

// Re-export main types for convenience
pub use channel::{Channel, ChannelConfig, InteractiveBuilder, InteractiveEvent};
pub use driver::{ConfigSession, Driver, DriverBuilder, GenericDriver, Response};
pub use error::{Error, Result};
pub use platform::{Platform, PlatformDefinition, PrivilegeLevel};
pub use transport::{AuthMethod, TransportConfig, TransportKind};
