//! Arista EOS platform support.

pub mod config_session;
mod platform;

pub use config_session::AristaConfigSession;
pub use platform::{
    PLATFORM_NAME, platform, session_level, session_level_name, session_prompt_pattern,
};
