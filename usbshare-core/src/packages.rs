//! Package provisioner: refresh, upgrade, install, with operator-driven retry.
//!
//! Each attempt runs all three steps from the beginning; nothing is
//! remembered between attempts. The loop ends when an attempt succeeds or the
//! operator declines to retry.
use crate::error::{ProvisionError, Stage};
use crate::prompt::{self, Notice, Operator};
use crate::system::{self, Invocation, System};
use anyhow::Result;
use log::{info, warn};

/// The packages to install and how many attempts have been made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageSet {
    pub names: Vec<String>,
    pub attempts: u32,
}

impl PackageSet {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            attempts: 0,
        }
    }

    /// The three commands of one attempt, in order.
    pub fn steps(&self) -> [Invocation; 3] {
        [
            Invocation::new("apt-get").arg("update"),
            Invocation::new("apt-get").args(["upgrade", "-y"]),
            Invocation::new("apt-get")
                .args(["install", "-y"])
                .args(self.names.iter().cloned()),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Phase {
    Attempting,
    Retrying { failed: String, detail: String },
    Resolved,
    Aborted,
}

/// Run one attempt, stopping at the first failed step.
fn attempt(system: &mut dyn System, set: &PackageSet) -> Result<Phase> {
    for step in set.steps() {
        if let Some(detail) = system::attempt(system, &step)? {
            warn!("`{step}` failed: {detail}");
            return Ok(Phase::Retrying {
                failed: step.to_string(),
                detail,
            });
        }
    }
    Ok(Phase::Resolved)
}

/// Bring the package set up to date, retrying for as long as the operator agrees.
pub fn provision(
    system: &mut dyn System,
    operator: &mut dyn Operator,
    set: &mut PackageSet,
) -> Result<()> {
    let mut phase = Phase::Attempting;
    loop {
        phase = match phase {
            Phase::Attempting => {
                set.attempts += 1;
                operator.tell(Notice::Info(format!(
                    "Installing packages: {}",
                    set.names.join(", ")
                )));
                attempt(system, set)?
            }
            Phase::Retrying { failed, detail } => {
                operator.tell(Notice::Failure(format!("`{failed}` failed: {detail}")));
                if prompt::confirm(operator, "Package installation failed. Retry? (y/n)")? {
                    Phase::Attempting
                } else {
                    Phase::Aborted
                }
            }
            Phase::Resolved => {
                info!("packages installed after {} attempt(s)", set.attempts);
                operator.tell(Notice::Done("Packages installed.".to_string()));
                return Ok(());
            }
            Phase::Aborted => return Err(ProvisionError::declined(Stage::Packages).into()),
        };
    }
}
