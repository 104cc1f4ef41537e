//! Mount registrar: picks the mount directory, adds the fstab entry, mounts.
use crate::config::RunConfig;
use crate::error::{ProvisionError, Stage};
use crate::files;
use crate::prompt::{self, Notice, Operator};
use crate::system::{self, Invocation, System};
use anyhow::Result;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Mode for mount directories: anyone may write to the share.
pub const WORLD_WRITABLE: u32 = 0o777;

/// How the mount directory was settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MountDecision {
    /// No directory existed at the default path, so it was created.
    CreateDefault,
    Reuse,
    CreateAlternate,
    Abort,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountSpec {
    /// Logical path of the directory the image will be mounted on.
    pub target: PathBuf,
    /// Whether the default directory existed when resolution started.
    pub existed: bool,
    pub decision: MountDecision,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum MountState {
    OfferReuse,
    OfferAlternate,
    AskPath,
    Resolved(MountDecision, PathBuf),
}

/// The fstab line binding the backing image to `target`.
pub fn fstab_entry(backing_file: &Path, target: &Path) -> String {
    format!(
        "{} {} vfat users,umask=000 0 2",
        backing_file.display(),
        target.display()
    )
}

/// Why `path` cannot be used as a mount directory, if it cannot.
fn unusable_reason(path: &Path) -> Option<&'static str> {
    if !path.is_absolute() {
        return Some("is not an absolute path");
    }
    // `Path::components` drops interior `.` segments, so check the raw text.
    let text = path.to_string_lossy();
    if text.split('/').any(|segment| segment == "." || segment == "..") {
        return Some("must not contain '.' or '..'");
    }
    if path.parent().is_none() {
        return Some("is the root directory");
    }
    None
}

fn ask_path(operator: &mut dyn Operator) -> Result<Option<PathBuf>> {
    let answer = operator.ask("Path for the new mount directory")?;
    let path = PathBuf::from(answer.trim());
    match unusable_reason(&path) {
        None => Ok(Some(path)),
        Some(reason) => {
            operator.tell(Notice::Failure(format!("'{}' {reason}.", answer.trim())));
            Ok(None)
        }
    }
}

/// Settle on a mount directory and make sure it exists and is world-writable.
///
/// An existing default directory is offered for reuse; if that is declined,
/// the operator may name an alternate directory instead. Declining both
/// aborts the run.
pub fn resolve(config: &RunConfig, operator: &mut dyn Operator) -> Result<MountSpec> {
    let default = config.mount_dir.clone();
    let existed = config.host_path(&default).is_dir();

    let mut state = if existed {
        MountState::OfferReuse
    } else {
        MountState::Resolved(MountDecision::CreateDefault, default.clone())
    };

    let (decision, target) = loop {
        state = match state {
            MountState::OfferReuse => {
                let question = format!(
                    "{} already exists. Use it as the mount directory? (y/n)",
                    default.display()
                );
                if prompt::confirm(operator, &question)? {
                    MountState::Resolved(MountDecision::Reuse, default.clone())
                } else {
                    MountState::OfferAlternate
                }
            }
            MountState::OfferAlternate => {
                if prompt::confirm(operator, "Create a different mount directory? (y/n)")? {
                    MountState::AskPath
                } else {
                    MountState::Resolved(MountDecision::Abort, default.clone())
                }
            }
            MountState::AskPath => match ask_path(operator)? {
                Some(path) => MountState::Resolved(MountDecision::CreateAlternate, path),
                None => MountState::AskPath,
            },
            MountState::Resolved(decision, target) => break (decision, target),
        };
    };

    match decision {
        MountDecision::Abort => return Err(ProvisionError::declined(Stage::MountDirectory).into()),
        MountDecision::Reuse => {
            files::set_mode(&config.host_path(&target), WORLD_WRITABLE)?;
        }
        MountDecision::CreateDefault => {
            files::create_dir_with_mode(&config.host_path(&target), WORLD_WRITABLE)?;
        }
        MountDecision::CreateAlternate => {
            let host = config.host_path(&target);
            if host.exists() {
                warn!("alternate mount directory {} already exists", host.display());
                operator.tell(Notice::Warning(format!(
                    "{} already exists; it will be used and made world-writable.",
                    target.display()
                )));
            }
            files::create_dir_with_mode(&host, WORLD_WRITABLE)?;
        }
    }

    info!("mount directory: {} ({:?})", target.display(), decision);
    Ok(MountSpec {
        target,
        existed,
        decision,
    })
}

/// Add the fstab entry for `mount` and mount everything pending.
pub fn register(config: &RunConfig, mount: &MountSpec, system: &mut dyn System) -> Result<()> {
    let entry = fstab_entry(&config.backing_file, &mount.target);
    files::append_line(&config.host_path(&config.fstab), &entry)?;
    info!("added fstab entry: {entry}");
    system::require(system, Invocation::new("mount").arg("-a"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSystem, ScriptedOperator};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn setup() -> (TempDir, RunConfig) {
        let temp = TempDir::new().unwrap();
        let config = RunConfig::new("/home/pi").with_sysroot(temp.path());
        (temp, config)
    }

    fn mode(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn missing_default_is_created_without_prompt() {
        let (temp, config) = setup();
        let mut operator = ScriptedOperator::new(&[]);

        let spec = resolve(&config, &mut operator).unwrap();

        assert_eq!(spec.decision, MountDecision::CreateDefault);
        assert_eq!(spec.target, PathBuf::from("/mnt/usb_share"));
        assert!(!spec.existed);
        assert!(operator.questions.is_empty());
        assert_eq!(mode(&temp.path().join("mnt/usb_share")), 0o777);
    }

    #[test]
    fn existing_default_reused_on_yes() {
        let (temp, config) = setup();
        fs::create_dir_all(temp.path().join("mnt/usb_share")).unwrap();
        fs::set_permissions(
            temp.path().join("mnt/usb_share"),
            fs::Permissions::from_mode(0o755),
        )
        .unwrap();
        let mut operator = ScriptedOperator::new(&["y"]);

        let spec = resolve(&config, &mut operator).unwrap();

        assert_eq!(spec.decision, MountDecision::Reuse);
        assert_eq!(spec.target, PathBuf::from("/mnt/usb_share"));
        assert!(spec.existed);
        assert_eq!(mode(&temp.path().join("mnt/usb_share")), 0o777);
    }

    #[test]
    fn declined_reuse_then_alternate_uses_supplied_path() {
        let (temp, config) = setup();
        fs::create_dir_all(temp.path().join("mnt/usb_share")).unwrap();
        let mut operator = ScriptedOperator::new(&["n", "y", "/srv/gadget"]);

        let spec = resolve(&config, &mut operator).unwrap();

        assert_eq!(spec.decision, MountDecision::CreateAlternate);
        assert_eq!(spec.target, PathBuf::from("/srv/gadget"));
        assert!(temp.path().join("mnt/usb_share").is_dir());
        assert!(temp.path().join("srv/gadget").is_dir());
        assert_eq!(mode(&temp.path().join("srv/gadget")), 0o777);
    }

    #[test]
    fn relative_alternate_path_is_asked_again() {
        let (temp, config) = setup();
        fs::create_dir_all(temp.path().join("mnt/usb_share")).unwrap();
        let mut operator = ScriptedOperator::new(&["n", "yes", "gadget", "", "/mnt/other"]);

        let spec = resolve(&config, &mut operator).unwrap();

        assert_eq!(spec.target, PathBuf::from("/mnt/other"));
        assert!(operator.saw("'gadget' is not an absolute path"));
        assert_eq!(operator.remaining(), 0);
    }

    #[test]
    fn root_and_dotted_alternate_paths_are_asked_again() {
        let (temp, config) = setup();
        fs::create_dir_all(temp.path().join("mnt/usb_share")).unwrap();
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o755)).unwrap();
        let mut operator =
            ScriptedOperator::new(&["n", "y", "/", "/mnt/../usr", "/mnt/./x", "/mnt/gadget"]);

        let spec = resolve(&config, &mut operator).unwrap();

        assert_eq!(spec.target, PathBuf::from("/mnt/gadget"));
        assert!(operator.saw("'/' is the root directory"));
        assert!(operator.saw("'/mnt/../usr' must not contain"));
        assert!(operator.saw("'/mnt/./x' must not contain"));
        assert_eq!(operator.remaining(), 0);
        assert_eq!(mode(temp.path()), 0o755);
        assert!(!temp.path().join("usr").exists());
    }

    #[test]
    fn existing_alternate_is_flagged_and_reused() {
        let (temp, config) = setup();
        fs::create_dir_all(temp.path().join("mnt/usb_share")).unwrap();
        fs::create_dir_all(temp.path().join("mnt/other")).unwrap();
        fs::write(temp.path().join("mnt/other/keep.txt"), "keep").unwrap();
        let mut operator = ScriptedOperator::new(&["n", "y", "/mnt/other"]);

        let spec = resolve(&config, &mut operator).unwrap();

        assert_eq!(spec.decision, MountDecision::CreateAlternate);
        assert!(operator.saw("/mnt/other already exists"));
        assert!(temp.path().join("mnt/other/keep.txt").exists());
        assert_eq!(mode(&temp.path().join("mnt/other")), 0o777);
    }

    #[test]
    fn declining_both_aborts() {
        let (temp, config) = setup();
        fs::create_dir_all(temp.path().join("mnt/usb_share")).unwrap();
        let mut operator = ScriptedOperator::new(&["n", "n"]);

        let err = resolve(&config, &mut operator).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ProvisionError>(),
            Some(ProvisionError::Declined {
                stage: Stage::MountDirectory
            })
        ));
    }

    #[test]
    fn register_appends_entry_and_mounts() {
        let (temp, config) = setup();
        fs::create_dir_all(temp.path().join("etc")).unwrap();
        fs::write(temp.path().join("etc/fstab"), "proc /proc proc defaults 0 0\n").unwrap();
        let mut system = FakeSystem::new(4000);
        let spec = MountSpec {
            target: PathBuf::from("/mnt/usb_share"),
            existed: false,
            decision: MountDecision::CreateDefault,
        };

        register(&config, &spec, &mut system).unwrap();

        assert_eq!(
            fs::read_to_string(temp.path().join("etc/fstab")).unwrap(),
            "proc /proc proc defaults 0 0\n/piusb.bin /mnt/usb_share vfat users,umask=000 0 2\n"
        );
        assert_eq!(system.commands(), vec!["mount -a"]);
    }

    #[test]
    fn mount_failure_is_fatal() {
        let (_temp, config) = setup();
        let mut system = FakeSystem::new(4000);
        system.fail("mount", 1);
        let spec = MountSpec {
            target: PathBuf::from("/mnt/usb_share"),
            existed: false,
            decision: MountDecision::CreateDefault,
        };

        assert!(register(&config, &spec, &mut system).is_err());
    }
}
