//! Gadget mode enabler: turns on the dwc2 USB peripheral driver at boot.
//!
//! The edits are append-only and do not look for earlier copies, so running
//! this twice leaves two copies of every directive.
use crate::config::RunConfig;
use crate::files;
use crate::system::{self, Invocation, System};
use anyhow::Result;
use log::info;

pub const OVERLAY_DIRECTIVE: &str = "dtoverlay=dwc2";
pub const MODULE_NAME: &str = "dwc2";
pub const CMDLINE_FRAGMENT: &str = "modules-load=dwc2";

/// Apply the boot edits and switch off wireless power saving.
///
/// Returns whether power saving was switched off; that step is best effort.
pub fn enable(config: &RunConfig, system: &mut dyn System) -> Result<bool> {
    files::append_line(&config.host_path(&config.boot_config), OVERLAY_DIRECTIVE)?;
    files::append_line(&config.host_path(&config.modules_file), MODULE_NAME)?;
    files::extend_last_line(&config.host_path(&config.cmdline_file), CMDLINE_FRAGMENT)?;
    info!(
        "gadget mode enabled in {}, {} and {}",
        config.boot_config.display(),
        config.modules_file.display(),
        config.cmdline_file.display()
    );

    let power_save = Invocation::new("iw").args([
        config.wireless_interface.as_str(),
        "set",
        "power_save",
        "off",
    ]);
    Ok(system::best_effort(system, power_save))
}
