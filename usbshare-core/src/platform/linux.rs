use crate::error::ProvisionError;
use crate::system::{Exit, Invocation, System};
use anyhow::{Context, Result, anyhow};
use log::{debug, trace};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Device-tree node holding the board's model string.
const MODEL_PATH: &str = "/proc/device-tree/model";

/// Strip the NUL terminator and whitespace the device tree leaves on strings.
fn clean_model(raw: &str) -> String {
    raw.trim_end_matches('\0').trim().to_string()
}

/// Find the mount point that holds `path`: the longest mount point that is a
/// prefix of it.
fn containing_mount<'a, I>(mount_points: I, path: &Path) -> Option<&'a Path>
where
    I: IntoIterator<Item = &'a Path>,
{
    mount_points
        .into_iter()
        .filter(|mp| path.starts_with(mp))
        .max_by_key(|mp| mp.as_os_str().len())
}

/// Free space from the mount table that `sysinfo` sees.
fn disks_space_mb(path: &Path) -> Result<u64> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let mount = containing_mount(disks.iter().map(|d| d.mount_point()), path)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("No mounted filesystem holds {}", path.display()))?;

    let disk = disks
        .iter()
        .find(|d| d.mount_point() == mount.as_path())
        .ok_or_else(|| anyhow!("Filesystem at {} disappeared", mount.display()))?;

    Ok(disk.available_space() / (1024 * 1024))
}

/// Free space straight from the filesystem, for roots `sysinfo` does not list
/// (an overlay root, for one).
fn statvfs_space_mb(path: &Path) -> Result<u64> {
    let stat = nix::sys::statvfs::statvfs(path)
        .with_context(|| format!("Failed to read free space on {}", path.display()))?;
    let bytes = stat.blocks_available() as u64 * stat.fragment_size() as u64;
    Ok(bytes / (1024 * 1024))
}

/// Fail with [`ProvisionError::NotRoot`] unless the effective user is root.
pub fn ensure_root() -> Result<()> {
    if nix::unistd::Uid::effective().is_root() {
        Ok(())
    } else {
        Err(ProvisionError::NotRoot.into())
    }
}

/// The live Linux host.
///
/// Commands run with stdin detached and their output captured; the captured
/// output is logged at `trace` level and stderr is carried in
/// [`Exit::Failure`].
pub struct LinuxSystem {
    running: Arc<AtomicBool>,
}

impl LinuxSystem {
    /// `running` is the shared cancellation flag; once it is `false`, no
    /// further commands are started.
    pub fn new(running: Arc<AtomicBool>) -> Self {
        Self { running }
    }
}

impl System for LinuxSystem {
    fn run(&mut self, invocation: &Invocation) -> Result<Exit> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(ProvisionError::Cancelled.into());
        }

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run `{invocation}`"))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            trace!("`{invocation}` stdout:\n{stdout}");
        }
        if !stderr.trim().is_empty() {
            trace!("`{invocation}` stderr:\n{stderr}");
        }

        if output.status.success() {
            Ok(Exit::Success)
        } else {
            Ok(Exit::Failure {
                code: output.status.code(),
                stderr: stderr.into_owned(),
            })
        }
    }

    fn available_space_mb(&self, path: &Path) -> Result<u64> {
        match disks_space_mb(path) {
            Ok(mb) => Ok(mb),
            Err(e) => {
                debug!("{e:#}; asking statvfs instead");
                statvfs_space_mb(path)
            }
        }
    }

    fn hardware_model(&self) -> Option<String> {
        fs::read_to_string(MODEL_PATH).ok().map(|raw| clean_model(&raw))
    }
}
