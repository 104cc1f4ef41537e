//! Backing store sizer: decides how large the FAT32 image can be and creates it.
//!
//! The image is created once. If the file is already present it is left
//! alone, whatever its size and however much space is free.
//!
//! When the requested size plus [`RESERVED_BUFFER_MB`] does not fit on the
//! root filesystem, the operator is offered three choices:
//!
//! 1. create the largest image that still leaves the buffer free,
//! 2. enter a different size, which measures free space again,
//! 3. abort the run.
//!
//! Anything else is rejected and the same menu is shown again, without
//! measuring free space again.
use crate::config::{RESERVED_BUFFER_MB, RunConfig};
use crate::error::{ProvisionError, Stage};
use crate::prompt::{Notice, Operator};
use crate::system::{self, Invocation, System};
use anyhow::Result;
use log::{debug, info};
use std::path::Path;

/// Sizing state carried across negotiation rounds. All sizes are whole MB.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackingStoreSpec {
    pub requested_mb: u64,
    pub available_mb: u64,
    pub exists: bool,
}

impl BackingStoreSpec {
    pub fn new(requested_mb: u64) -> Self {
        Self {
            requested_mb,
            available_mb: 0,
            exists: false,
        }
    }

    pub fn required_mb(&self) -> u64 {
        self.requested_mb.saturating_add(RESERVED_BUFFER_MB)
    }

    pub fn fits(&self) -> bool {
        self.available_mb >= self.required_mb()
    }

    /// The largest image that leaves the buffer free, if any image fits at all.
    pub fn max_possible_mb(&self) -> Option<u64> {
        self.available_mb
            .checked_sub(RESERVED_BUFFER_MB)
            .filter(|&mb| mb > 0)
    }
}

/// An operator's answer to the insufficient-space menu.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeChoice {
    UseMaximum,
    EnterSize,
    Abort,
}

impl SizeChoice {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "1" => Some(SizeChoice::UseMaximum),
            "2" => Some(SizeChoice::EnterSize),
            "3" => Some(SizeChoice::Abort),
            _ => None,
        }
    }
}

/// What the sizer did about the backing store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sizing {
    Existing,
    Created { size_mb: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SizerState {
    Measuring,
    Prompting,
    Creating { size_mb: u64 },
    Aborted,
}

fn menu(spec: &BackingStoreSpec) -> String {
    let maximum = match spec.max_possible_mb() {
        Some(mb) => format!("{mb} MB"),
        None => "no space".to_string(),
    };
    format!(
        "Choose an option:\n  \
         1) Create the largest image that fits ({maximum})\n  \
         2) Enter a different size\n  \
         3) Abort setup\n\
         Choice (1-3)"
    )
}

fn ask_size(operator: &mut dyn Operator) -> Result<u64> {
    loop {
        let answer = operator.ask("New image size in MB")?;
        match answer.trim().parse::<u64>() {
            Ok(mb) if mb > 0 => return Ok(mb),
            _ => operator.tell(Notice::Failure(format!(
                "'{}' is not a positive whole number of MB.",
                answer.trim()
            ))),
        }
    }
}

/// Settle on an image size, or `None` if the operator aborts.
///
/// `root` is the filesystem the image will live on; it is measured on entry
/// and again after every manually entered size.
pub fn negotiate(
    spec: &mut BackingStoreSpec,
    system: &dyn System,
    operator: &mut dyn Operator,
    root: &Path,
) -> Result<Option<u64>> {
    let mut state = SizerState::Measuring;
    loop {
        state = match state {
            SizerState::Measuring => {
                spec.available_mb = system.available_space_mb(root)?;
                debug!(
                    "requested {} MB, required {} MB, available {} MB",
                    spec.requested_mb,
                    spec.required_mb(),
                    spec.available_mb
                );
                if spec.fits() {
                    SizerState::Creating {
                        size_mb: spec.requested_mb,
                    }
                } else {
                    operator.tell(Notice::Warning(format!(
                        "Not enough free space for a {} MB image: {} MB needed \
                         (including a {} MB buffer), {} MB available.",
                        spec.requested_mb,
                        spec.required_mb(),
                        RESERVED_BUFFER_MB,
                        spec.available_mb
                    )));
                    SizerState::Prompting
                }
            }
            SizerState::Prompting => {
                let answer = operator.ask(&menu(spec))?;
                match SizeChoice::parse(&answer) {
                    Some(SizeChoice::UseMaximum) => match spec.max_possible_mb() {
                        Some(size_mb) => SizerState::Creating { size_mb },
                        None => {
                            operator.tell(Notice::Failure(format!(
                                "Less than {RESERVED_BUFFER_MB} MB is free; no image fits."
                            )));
                            SizerState::Prompting
                        }
                    },
                    Some(SizeChoice::EnterSize) => {
                        spec.requested_mb = ask_size(operator)?;
                        SizerState::Measuring
                    }
                    Some(SizeChoice::Abort) => SizerState::Aborted,
                    None => {
                        operator.tell(Notice::Failure(format!(
                            "Invalid choice '{}'. Enter 1, 2 or 3.",
                            answer.trim()
                        )));
                        SizerState::Prompting
                    }
                }
            }
            SizerState::Creating { size_mb } => return Ok(Some(size_mb)),
            SizerState::Aborted => return Ok(None),
        };
    }
}

/// Write a zero-filled image of `size_mb` MB and format it FAT32.
pub fn create_image(system: &mut dyn System, path: &Path, size_mb: u64) -> Result<()> {
    system::require(
        system,
        Invocation::new("dd").args([
            "if=/dev/zero".to_string(),
            format!("of={}", path.display()),
            "bs=1M".to_string(),
            format!("count={size_mb}"),
        ]),
    )?;
    system::require(
        system,
        Invocation::new("mkdosfs")
            .arg_path(path)
            .args(["-F", "32", "-I"]),
    )
}

/// Make sure the backing store exists, creating it if needed.
pub fn ensure(
    config: &RunConfig,
    system: &mut dyn System,
    operator: &mut dyn Operator,
) -> Result<Sizing> {
    let image = config.host_path(&config.backing_file);
    let mut spec = BackingStoreSpec::new(config.default_size_mb);
    spec.exists = image.exists();

    if spec.exists {
        info!("{} already exists, leaving it untouched", image.display());
        operator.tell(Notice::Info(format!(
            "Backing store {} already exists; keeping it.",
            config.backing_file.display()
        )));
        return Ok(Sizing::Existing);
    }

    let root = config.host_path(Path::new("/"));
    let size_mb = match negotiate(&mut spec, &*system, operator, &root)? {
        Some(size_mb) => size_mb,
        None => return Err(ProvisionError::declined(Stage::BackingStore).into()),
    };

    operator.tell(Notice::Info(format!(
        "Creating a {size_mb} MB FAT32 image at {}...",
        config.backing_file.display()
    )));
    create_image(system, &image, size_mb)?;
    operator.tell(Notice::Done(format!("Backing store created ({size_mb} MB).")));
    Ok(Sizing::Created { size_mb })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSystem, ScriptedOperator};
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, RunConfig) {
        let temp = TempDir::new().unwrap();
        let config = RunConfig::new("/home/pi").with_sysroot(temp.path());
        (temp, config)
    }

    fn image_commands(temp: &TempDir, size_mb: u64) -> Vec<String> {
        let image = temp.path().join("piusb.bin");
        vec![
            format!(
                "dd if=/dev/zero of={} bs=1M count={size_mb}",
                image.display()
            ),
            format!("mkdosfs {} -F 32 -I", image.display()),
        ]
    }

    #[test]
    fn spec_arithmetic() {
        let mut spec = BackingStoreSpec::new(2048);
        spec.available_mb = 3072;
        assert_eq!(spec.required_mb(), 3072);
        assert!(spec.fits());
        spec.available_mb = 3071;
        assert!(!spec.fits());
        assert_eq!(spec.max_possible_mb(), Some(2047));
        spec.available_mb = 1024;
        assert_eq!(spec.max_possible_mb(), None);
    }

    #[test]
    fn choice_tokens() {
        assert_eq!(SizeChoice::parse("1"), Some(SizeChoice::UseMaximum));
        assert_eq!(SizeChoice::parse(" 2\n"), Some(SizeChoice::EnterSize));
        assert_eq!(SizeChoice::parse("3"), Some(SizeChoice::Abort));
        for token in ["", "0", "4", "one", "1 2", "y"] {
            assert_eq!(SizeChoice::parse(token), None);
        }
    }

    #[test]
    fn enough_space_creates_requested_size_without_prompt() {
        for (available, requested) in [(3072, 2048), (4000, 2048), (1025, 1), (100_000, 50_000)] {
            let (temp, mut config) = setup();
            config.default_size_mb = requested;
            let mut system = FakeSystem::new(available);
            let mut operator = ScriptedOperator::new(&[]);

            let sizing = ensure(&config, &mut system, &mut operator).unwrap();

            assert_eq!(sizing, Sizing::Created { size_mb: requested });
            assert_eq!(system.commands(), image_commands(&temp, requested));
            assert!(operator.questions.is_empty(), "({available}, {requested})");
        }
    }

    #[test]
    fn existing_image_is_never_recreated() {
        for available in [0, 500, 4000] {
            let (temp, config) = setup();
            fs::write(temp.path().join("piusb.bin"), b"data").unwrap();
            let mut system = FakeSystem::new(available);
            let mut operator = ScriptedOperator::new(&[]);

            let sizing = ensure(&config, &mut system, &mut operator).unwrap();

            assert_eq!(sizing, Sizing::Existing);
            assert!(system.invocations.is_empty());
            assert!(operator.questions.is_empty());
            assert_eq!(fs::read(temp.path().join("piusb.bin")).unwrap(), b"data");
        }
    }

    #[test]
    fn insufficient_space_offers_three_choices() {
        let (_temp, config) = setup();
        let mut system = FakeSystem::new(3000);
        let mut operator = ScriptedOperator::new(&["3"]);

        let _ = ensure(&config, &mut system, &mut operator);

        let menu = &operator.questions[0];
        assert!(menu.contains("1) Create the largest image that fits (1976 MB)"));
        assert!(menu.contains("2) Enter a different size"));
        assert!(menu.contains("3) Abort setup"));
        assert!(!menu.contains("4)"));
    }

    #[test]
    fn invalid_choice_reprompts_without_remeasuring() {
        let (temp, config) = setup();
        // A second probe would see plenty of space and change the maximum.
        let mut system = FakeSystem::new(0).with_space_readings(&[3000, 90_000]);
        let mut operator = ScriptedOperator::new(&["x", "", "4", "1"]);

        let sizing = ensure(&config, &mut system, &mut operator).unwrap();

        assert_eq!(sizing, Sizing::Created { size_mb: 1976 });
        assert_eq!(system.commands(), image_commands(&temp, 1976));
        assert_eq!(operator.questions.len(), 4);
        assert!(operator.questions.iter().all(|q| q == &operator.questions[0]));
        assert!(operator.saw("Invalid choice 'x'"));
    }

    #[test]
    fn entering_a_size_remeasures_and_retries() {
        let (temp, config) = setup();
        let mut system = FakeSystem::new(0).with_space_readings(&[2500, 2600]);
        let mut operator = ScriptedOperator::new(&["2", "lots", "0", "1500"]);

        let sizing = ensure(&config, &mut system, &mut operator).unwrap();

        assert_eq!(sizing, Sizing::Created { size_mb: 1500 });
        assert_eq!(system.commands(), image_commands(&temp, 1500));
        assert!(operator.saw("'lots' is not a positive whole number"));
        assert_eq!(operator.remaining(), 0);
    }

    #[test]
    fn entered_size_that_still_does_not_fit_shows_menu_again() {
        let (temp, config) = setup();
        let mut system = FakeSystem::new(2500);
        let mut operator = ScriptedOperator::new(&["2", "2000", "1"]);

        let sizing = ensure(&config, &mut system, &mut operator).unwrap();

        assert_eq!(sizing, Sizing::Created { size_mb: 1476 });
        assert_eq!(system.commands(), image_commands(&temp, 1476));
    }

    #[test]
    fn maximum_unavailable_below_buffer() {
        let (_temp, config) = setup();
        let mut system = FakeSystem::new(800);
        let mut operator = ScriptedOperator::new(&["1", "3"]);

        let err = ensure(&config, &mut system, &mut operator).unwrap_err();

        assert!(operator.saw("no image fits"));
        assert!(system.invocations.is_empty());
        assert!(matches!(
            err.downcast_ref::<ProvisionError>(),
            Some(ProvisionError::Declined {
                stage: Stage::BackingStore
            })
        ));
    }

    #[test]
    fn abort_choice_runs_nothing() {
        let (_temp, config) = setup();
        let mut system = FakeSystem::new(1500);
        let mut operator = ScriptedOperator::new(&["3"]);

        assert!(ensure(&config, &mut system, &mut operator).is_err());
        assert!(system.invocations.is_empty());
    }

    #[test]
    fn format_failure_is_fatal() {
        let (_temp, config) = setup();
        let mut system = FakeSystem::new(4000);
        system.fail("mkdosfs", 1);
        let mut operator = ScriptedOperator::new(&[]);

        let err = ensure(&config, &mut system, &mut operator).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ProvisionError>(),
            Some(ProvisionError::CommandFailed { .. })
        ));
    }
}
