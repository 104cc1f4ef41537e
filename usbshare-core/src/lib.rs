//! The core, UI-agnostic library for the `usbshare` provisioner.
//!
//! `usbshare-core` turns a Raspberry Pi into a USB mass-storage gadget whose
//! backing image is also shared over Samba. It is designed to be driven by any
//! front-end: it never reads the terminal itself but asks an [`Operator`],
//! and it never spawns processes itself but goes through a [`System`].
//!
//! The library is structured into one module per provisioning step, plus the
//! plumbing they share:
//! - [`gate`]: checks the board model against the known-compatible list.
//! - [`packages`]: installs Samba and the watchdog's dependencies, with retry.
//! - [`gadget`]: enables the dwc2 USB peripheral driver at boot.
//! - [`storage`]: sizes and creates the FAT32 backing image.
//! - [`mount`]: picks the mount directory and registers it in fstab.
//! - [`share`]: publishes the mount directory as a Samba share.
//! - [`service`]: installs the watchdog script as a systemd service.
//! - [`driver`]: runs all of the above in order and offers a reboot.
//! - [`platform`]: the live Linux [`System`].
//!
//! ## Example: a full run on the live host
//!
//! ```rust,no_run
//! use usbshare_core::{driver, platform::LinuxSystem, Notice, Operator, RunConfig};
//! use std::io::{self, BufRead, Write};
//! use std::sync::{Arc, atomic::AtomicBool};
//! use anyhow::Result;
//!
//! struct Stdin;
//!
//! impl Operator for Stdin {
//!     fn ask(&mut self, question: &str) -> Result<String> {
//!         print!("{question} ");
//!         io::stdout().flush()?;
//!         let mut line = String::new();
//!         io::stdin().lock().read_line(&mut line)?;
//!         Ok(line)
//!     }
//!
//!     fn tell(&mut self, notice: Notice) {
//!         println!("{notice}");
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let config = RunConfig::new(std::env::current_dir()?);
//!     let mut system = LinuxSystem::new(Arc::new(AtomicBool::new(true)));
//!     let outcome = driver::provision(&config, &mut system, &mut Stdin)?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod files;
pub mod gadget;
pub mod gate;
pub mod mount;
pub mod packages;
pub mod platform;
pub mod prompt;
pub mod service;
pub mod share;
pub mod storage;
pub mod system;

#[cfg(test)]
mod testing;

pub use config::RunConfig;
pub use error::{ProvisionError, Stage};
pub use prompt::{Notice, Operator};
pub use system::{Exit, Invocation, System};
