//! Service installer: puts the watchdog script in place and runs it under systemd.
use crate::config::RunConfig;
use crate::error::ProvisionError;
use crate::files;
use crate::system::{self, Invocation, System};
use anyhow::{Context, Result};
use log::info;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A systemd service unit for the watchdog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceUnit {
    pub description: String,
    pub interpreter: PathBuf,
    pub executable: PathBuf,
    /// `Type=` of the service; `simple` is active as soon as it has started.
    pub kind: String,
    pub after: String,
    pub wanted_by: String,
}

impl ServiceUnit {
    pub fn watchdog(executable: &Path) -> Self {
        Self {
            description: "USB mass-storage share watchdog".to_string(),
            interpreter: PathBuf::from("/usr/bin/python3"),
            executable: executable.to_path_buf(),
            kind: "simple".to_string(),
            after: "multi-user.target".to_string(),
            wanted_by: "multi-user.target".to_string(),
        }
    }
}

impl fmt::Display for ServiceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Unit]")?;
        writeln!(f, "Description={}", self.description)?;
        writeln!(f, "After={}", self.after)?;
        writeln!(f)?;
        writeln!(f, "[Service]")?;
        writeln!(f, "Type={}", self.kind)?;
        writeln!(
            f,
            "ExecStart={} {}",
            self.interpreter.display(),
            self.executable.display()
        )?;
        writeln!(f)?;
        writeln!(f, "[Install]")?;
        writeln!(f, "WantedBy={}", self.wanted_by)
    }
}

/// Replace `path` with `content` in one rename, so a half-written unit is
/// never visible to systemd.
fn write_atomically(path: &Path, content: &str, mode: u32) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content.as_bytes())?;
    temp.flush()?;
    temp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    files::set_mode(path, mode)
}

/// Install the watchdog script and its unit, then enable and start it.
///
/// Fails with [`ProvisionError::MissingWatchdog`] before touching anything if
/// the script is not next to the provisioner.
pub fn install(config: &RunConfig, system: &mut dyn System) -> Result<ServiceUnit> {
    let source = config.watchdog_source();
    if !source.is_file() {
        return Err(ProvisionError::MissingWatchdog(source).into());
    }

    let target = config.watchdog_target();
    let host_target = config.host_path(&target);
    if let Some(parent) = host_target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(&source, &host_target).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            source.display(),
            host_target.display()
        )
    })?;
    files::set_mode(&host_target, 0o755)?;

    let unit = ServiceUnit::watchdog(&target);
    write_atomically(
        &config.host_path(&config.unit_path()),
        &unit.to_string(),
        0o644,
    )?;
    info!("wrote {}", config.unit_path().display());

    system::require(system, Invocation::new("systemctl").arg("daemon-reload"))?;
    system::require(
        system,
        Invocation::new("systemctl").args(["enable", config.service_name.as_str()]),
    )?;
    system::require(
        system,
        Invocation::new("systemctl").args(["start", config.service_name.as_str()]),
    )?;
    Ok(unit)
}
