//! Hardware compatibility gate.
use crate::prompt::{self, Notice, Operator};
use crate::system::System;
use anyhow::Result;
use log::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compatibility {
    Proceed,
    ProceedWithWarning,
    Abort,
}

/// The result of checking the board against the allow-list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompatibilityDecision {
    /// `None` when the identifier could not be read.
    pub detected: Option<String>,
    pub known: Vec<String>,
    pub outcome: Compatibility,
}

impl CompatibilityDecision {
    /// Whether the board was on the allow-list, so no warning was needed.
    pub fn clean(&self) -> bool {
        self.outcome == Compatibility::Proceed
    }
}

/// Exact string match against the allow-list.
pub fn is_known(detected: Option<&str>, known: &[&str]) -> bool {
    detected.is_some_and(|model| known.contains(&model))
}

/// Check the board and, if it is not known, ask whether to continue.
///
/// An unreadable identifier takes the same path as an unknown one.
pub fn check(
    system: &dyn System,
    operator: &mut dyn Operator,
    known: &[&str],
) -> Result<CompatibilityDecision> {
    let detected = system.hardware_model();
    let known_list = known.iter().map(|m| m.to_string()).collect();

    if is_known(detected.as_deref(), known) {
        info!("board {:?} is on the compatible list", detected);
        return Ok(CompatibilityDecision {
            detected,
            known: known_list,
            outcome: Compatibility::Proceed,
        });
    }

    let shown = detected.as_deref().unwrap_or("unknown");
    operator.tell(Notice::Warning(format!(
        "This board ({shown}) has not been verified to work with usbshare."
    )));
    let outcome = if prompt::confirm(operator, "Continue anyway? (y/n)")? {
        Compatibility::ProceedWithWarning
    } else {
        Compatibility::Abort
    };

    Ok(CompatibilityDecision {
        detected,
        known: known_list,
        outcome,
    })
}
