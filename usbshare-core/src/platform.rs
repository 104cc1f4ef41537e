//! Provides platform-specific functionality.
//!
//! This module holds the concrete [`crate::system::System`] for the board
//! being provisioned: spawning external commands, reading the board model,
//! measuring free space and checking privileges.
//!
//! It uses conditional compilation (`#[cfg]`) to expose the implementation for
//! the target OS. The provisioner only makes sense on Linux (Raspberry Pi OS),
//! so that is the only implementation.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use self::linux::*;
