//! Share publisher: exposes the mount directory over Samba.
use crate::config::RunConfig;
use crate::files;
use crate::system::{self, Invocation, System};
use anyhow::Result;
use log::info;
use std::fmt;
use std::path::{Path, PathBuf};

/// A Samba share definition for `smb.conf`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareStanza {
    pub name: String,
    pub path: PathBuf,
    pub browseable: bool,
    pub guest_ok: bool,
    pub read_only: bool,
    pub create_mask: u32,
    pub directory_mask: u32,
}

impl ShareStanza {
    /// An open, writable, guest-accessible share of `path`.
    pub fn open(name: &str, path: &Path) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            browseable: true,
            guest_ok: true,
            read_only: false,
            create_mask: 0o777,
            directory_mask: 0o777,
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

impl fmt::Display for ShareStanza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}]", self.name)?;
        writeln!(f, "browseable = {}", yes_no(self.browseable))?;
        writeln!(f, "path = {}", self.path.display())?;
        writeln!(f, "guest ok = {}", yes_no(self.guest_ok))?;
        writeln!(f, "read only = {}", yes_no(self.read_only))?;
        writeln!(f, "create mask = {:o}", self.create_mask)?;
        writeln!(f, "directory mask = {:o}", self.directory_mask)
    }
}

/// Append the share for `mount_dir` to the Samba config and restart `smbd`.
///
/// An existing stanza with the same name is not looked for.
pub fn publish(config: &RunConfig, mount_dir: &Path, system: &mut dyn System) -> Result<ShareStanza> {
    let stanza = ShareStanza::open(&config.share_name, mount_dir);
    files::append_block(&config.host_path(&config.samba_config), &stanza.to_string())?;
    info!(
        "published [{}] -> {} in {}",
        stanza.name,
        mount_dir.display(),
        config.samba_config.display()
    );
    system::require(system, Invocation::new("systemctl").args(["restart", "smbd"]))?;
    Ok(stanza)
}
