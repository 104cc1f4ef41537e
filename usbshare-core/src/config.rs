//! The immutable run configuration threaded through every component.
use std::path::{Path, PathBuf};

/// Free space, in MB, that must remain on the root filesystem after the
/// backing image is created.
pub const RESERVED_BUFFER_MB: u64 = 1024;

/// Size of the backing image when the operator does not negotiate another.
pub const DEFAULT_SIZE_MB: u64 = 2048;

/// Board identifiers known to work, in the order they were verified.
pub const COMPATIBLE_MODELS: &[&str] = &[
    "Raspberry Pi Zero W Rev 1.1",
    "Raspberry Pi Zero 2 W Rev 1.0",
    "Raspberry Pi 4 Model B Rev 1.1",
    "Raspberry Pi 4 Model B Rev 1.2",
    "Raspberry Pi 4 Model B Rev 1.4",
];

/// Packages installed by the package provisioner: the Samba suite, its
/// winbind helper, and the interpreter plus inotify library the watchdog needs.
pub const REQUIRED_PACKAGES: &[&str] = &["samba", "winbind", "python3", "python3-watchdog"];

/// Where and how the provisioner mutates the host.
///
/// Every path is a *logical* host path: it is what gets written into the
/// mount table, the share stanza and the unit file. When the provisioner
/// itself touches the filesystem it goes through [`RunConfig::host_path`],
/// which places the path under [`RunConfig::sysroot`].
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Directory treated as `/` for all file mutations.
    pub sysroot: PathBuf,
    /// Directory searched for the watchdog script.
    pub source_dir: PathBuf,
    pub backing_file: PathBuf,
    pub default_size_mb: u64,
    pub mount_dir: PathBuf,
    pub boot_config: PathBuf,
    pub modules_file: PathBuf,
    pub cmdline_file: PathBuf,
    pub fstab: PathBuf,
    pub samba_config: PathBuf,
    pub watchdog_script: String,
    pub watchdog_install_dir: PathBuf,
    pub unit_dir: PathBuf,
    pub service_name: String,
    pub share_name: String,
    pub wireless_interface: String,
}

impl RunConfig {
    /// The production configuration, looking for the watchdog in `source_dir`.
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            sysroot: PathBuf::from("/"),
            source_dir: source_dir.into(),
            backing_file: PathBuf::from("/piusb.bin"),
            default_size_mb: DEFAULT_SIZE_MB,
            mount_dir: PathBuf::from("/mnt/usb_share"),
            boot_config: PathBuf::from("/boot/config.txt"),
            modules_file: PathBuf::from("/etc/modules"),
            cmdline_file: PathBuf::from("/boot/cmdline.txt"),
            fstab: PathBuf::from("/etc/fstab"),
            samba_config: PathBuf::from("/etc/samba/smb.conf"),
            watchdog_script: "usbshare.py".to_string(),
            watchdog_install_dir: PathBuf::from("/usr/local/share"),
            unit_dir: PathBuf::from("/etc/systemd/system"),
            service_name: "usbshare.service".to_string(),
            share_name: "usb".to_string(),
            wireless_interface: "wlan0".to_string(),
        }
    }

    /// Same configuration, with every file mutation redirected under `sysroot`.
    pub fn with_sysroot(mut self, sysroot: impl Into<PathBuf>) -> Self {
        self.sysroot = sysroot.into();
        self
    }

    /// Resolve a logical host path to the path actually touched on disk.
    pub fn host_path(&self, logical: &Path) -> PathBuf {
        let relative = logical.strip_prefix("/").unwrap_or(logical);
        self.sysroot.join(relative)
    }

    /// The watchdog script as shipped next to the provisioner.
    pub fn watchdog_source(&self) -> PathBuf {
        self.source_dir.join(&self.watchdog_script)
    }

    /// Logical path the watchdog script is installed to.
    pub fn watchdog_target(&self) -> PathBuf {
        self.watchdog_install_dir.join(&self.watchdog_script)
    }

    /// Logical path of the generated unit descriptor.
    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(&self.service_name)
    }
}
