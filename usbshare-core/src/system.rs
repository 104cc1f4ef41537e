//! The host seam: external commands and environment probes.
//!
//! Components never spawn processes or query the machine directly. They go
//! through a [`System`], which the front-end provides (normally
//! [`crate::platform::LinuxSystem`], possibly wrapped to draw a spinner) and
//! tests replace with a recording fake.
use crate::error::ProvisionError;
use anyhow::Result;
use log::{debug, warn};
use std::fmt;
use std::path::Path;

/// A single external command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How an external command finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Exit {
    Success,
    Failure { code: Option<i32>, stderr: String },
}

impl Exit {
    pub fn success(&self) -> bool {
        matches!(self, Exit::Success)
    }

    fn detail(&self) -> String {
        match self {
            Exit::Success => "succeeded".to_string(),
            Exit::Failure { code, stderr } => {
                let status = match code {
                    Some(code) => format!("exit status {code}"),
                    None => "terminated by signal".to_string(),
                };
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    status
                } else {
                    format!("{status}: {stderr}")
                }
            }
        }
    }
}

/// The machine being provisioned.
pub trait System {
    /// Run a command to completion. `Err` means it could not be run at all.
    fn run(&mut self, invocation: &Invocation) -> Result<Exit>;

    /// Free space, in whole MB, on the filesystem holding `path`.
    fn available_space_mb(&self, path: &Path) -> Result<u64>;

    /// The board identifier, or `None` if it cannot be read.
    fn hardware_model(&self) -> Option<String>;
}

/// Run a command whose failure ends the run.
pub fn require(system: &mut dyn System, invocation: Invocation) -> Result<()> {
    debug!("running `{invocation}`");
    match system.run(&invocation)? {
        Exit::Success => Ok(()),
        failure => Err(ProvisionError::CommandFailed {
            command: invocation.to_string(),
            detail: failure.detail(),
        }
        .into()),
    }
}

/// Run a command whose failure is logged and otherwise ignored.
pub fn best_effort(system: &mut dyn System, invocation: Invocation) -> bool {
    debug!("running `{invocation}` (best effort)");
    match system.run(&invocation) {
        Ok(Exit::Success) => true,
        Ok(failure) => {
            warn!("`{invocation}` failed ({}), continuing", failure.detail());
            false
        }
        Err(e) => {
            warn!("`{invocation}` could not be run ({e:#}), continuing");
            false
        }
    }
}

/// Run a command that may be retried, returning why it failed if it did.
///
/// A command that cannot be spawned counts as failed. Cancellation is the
/// only error passed through.
pub(crate) fn attempt(system: &mut dyn System, invocation: &Invocation) -> Result<Option<String>> {
    debug!("running `{invocation}`");
    match system.run(invocation) {
        Ok(Exit::Success) => Ok(None),
        Ok(failure) => Ok(Some(failure.detail())),
        Err(e) if matches!(e.downcast_ref(), Some(ProvisionError::Cancelled)) => Err(e),
        Err(e) => Ok(Some(format!("{e:#}"))),
    }
}
