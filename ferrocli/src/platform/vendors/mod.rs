//! Built-in vendor platforms.

pub mod arista;
pub mod cisco_iosxe;
pub mod juniper;
pub mod linux;
