//! The orchestration driver: runs every component in order.
//!
//! ```text
//! gate -> packages -> gadget mode -> backing store -> mount -> share -> service -> reboot?
//! ```
//!
//! No step is skipped. A declined prompt or a fatal failure ends the run with
//! an error and nothing already changed on the host is rolled back.
use crate::config::{COMPATIBLE_MODELS, REQUIRED_PACKAGES, RunConfig};
use crate::error::{ProvisionError, Stage};
use crate::gate::{self, Compatibility};
use crate::mount::{self, MountDecision};
use crate::packages::{self, PackageSet};
use crate::prompt::{self, Notice, Operator};
use crate::storage::{self, Sizing};
use crate::system::{self, Invocation, System};
use crate::{gadget, service, share};
use anyhow::Result;
use log::info;
use std::path::{Path, PathBuf};

/// What a completed run set up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub model: Option<String>,
    pub compatibility: Compatibility,
    pub package_attempts: u32,
    pub power_save_disabled: bool,
    pub backing_store: Sizing,
    pub mount_dir: PathBuf,
    pub mount_decision: MountDecision,
    pub share_name: String,
    pub unit_path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The reboot command was issued.
    Rebooting,
    /// Setup finished and the operator chose not to reboot.
    Completed(Report),
}

/// Run the whole provisioning sequence.
pub fn provision(
    config: &RunConfig,
    system: &mut dyn System,
    operator: &mut dyn Operator,
) -> Result<Outcome> {
    let decision = gate::check(&*system, operator, COMPATIBLE_MODELS)?;
    if decision.outcome == Compatibility::Abort {
        return Err(ProvisionError::declined(Stage::Compatibility).into());
    }

    let mut packages = PackageSet::new(REQUIRED_PACKAGES);
    packages::provision(system, operator, &mut packages)?;

    let power_save_disabled = gadget::enable(config, system)?;
    if !power_save_disabled {
        operator.tell(Notice::Warning(format!(
            "Could not disable power saving on {}; continuing.",
            config.wireless_interface
        )));
    }
    operator.tell(Notice::Done("USB gadget mode enabled.".to_string()));

    let backing_store = storage::ensure(config, system, operator)?;

    let mount = mount::resolve(config, operator)?;
    mount::register(config, &mount, system)?;
    operator.tell(Notice::Done(format!(
        "{} mounted on {}.",
        config.backing_file.display(),
        mount.target.display()
    )));

    let stanza = share::publish(config, &mount.target, system)?;
    operator.tell(Notice::Done(format!(
        "Shared {} as [{}].",
        stanza.path.display(),
        stanza.name
    )));

    service::install(config, system)?;
    operator.tell(Notice::Done(format!("{} installed and started.", config.service_name)));

    if !decision.clean() {
        let model = decision.detected.as_deref().unwrap_or("unknown");
        operator.tell(Notice::Info(format!(
            "Setup worked on a board that is not on the compatible list: '{model}'. \
             Please report this identifier to the usbshare maintainers so it can be added."
        )));
    }

    if prompt::confirm(operator, "Reboot now to activate USB gadget mode? (y/n)")? {
        info!("rebooting");
        system::require(system, Invocation::new("reboot"))?;
        return Ok(Outcome::Rebooting);
    }

    operator.tell(Notice::Info(
        "Reboot later to activate USB gadget mode.".to_string(),
    ));
    Ok(Outcome::Completed(Report {
        model: decision.detected,
        compatibility: decision.outcome,
        package_attempts: packages.attempts,
        power_save_disabled,
        backing_store,
        mount_dir: mount.target,
        mount_decision: mount.decision,
        share_name: stanza.name,
        unit_path: config.unit_path(),
    }))
}

/// A read-only look at the host before setup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preflight {
    pub model: Option<String>,
    pub compatible: bool,
    /// `None` if free space could not be measured.
    pub available_mb: Option<u64>,
    pub backing_file_exists: bool,
    pub mount_dir_exists: bool,
    pub watchdog_present: bool,
}

impl Preflight {
    /// Whether the default image size would be created without negotiation.
    pub fn default_size_fits(&self, config: &RunConfig) -> bool {
        let mut spec = storage::BackingStoreSpec::new(config.default_size_mb);
        match self.available_mb {
            Some(available_mb) => {
                spec.available_mb = available_mb;
                spec.fits()
            }
            None => false,
        }
    }
}

/// Inspect the host without prompting or changing anything.
pub fn preflight(config: &RunConfig, system: &dyn System) -> Preflight {
    let model = system.hardware_model();
    let compatible = gate::is_known(model.as_deref(), COMPATIBLE_MODELS);
    let available_mb = system
        .available_space_mb(&config.host_path(Path::new("/")))
        .ok();

    Preflight {
        model,
        compatible,
        available_mb,
        backing_file_exists: config.host_path(&config.backing_file).exists(),
        mount_dir_exists: config.host_path(&config.mount_dir).is_dir(),
        watchdog_present: config.watchdog_source().is_file(),
    }
}
