//! Conditions that end a provisioning run.
//!
//! Everything fallible in this crate returns [`anyhow::Result`]. The variants
//! here are the ones a front-end needs to recognise (via
//! [`anyhow::Error::downcast_ref`]) to choose what to tell the operator.
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The interactive stage at which the operator chose to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Compatibility,
    Packages,
    BackingStore,
    MountDirectory,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Compatibility => "hardware compatibility check",
            Stage::Packages => "package installation",
            Stage::BackingStore => "backing store creation",
            Stage::MountDirectory => "mount directory selection",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("setup aborted at the {stage}")]
    Declined { stage: Stage },

    #[error("watchdog script not found at {}", .0.display())]
    MissingWatchdog(PathBuf),

    #[error("`{command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("setup must be run as root (try sudo)")]
    NotRoot,

    #[error("Operation cancelled by user")]
    Cancelled,
}

impl ProvisionError {
    pub(crate) fn declined(stage: Stage) -> Self {
        ProvisionError::Declined { stage }
    }
}
