//! The operator seam: questions in, free-form answers out.
use anyhow::Result;
use std::fmt;

/// A message for the operator, tagged with how the front-end should present it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Warning(String),
    Failure(String),
    Done(String),
}

impl Notice {
    pub fn text(&self) -> &str {
        match self {
            Notice::Info(s) | Notice::Warning(s) | Notice::Failure(s) | Notice::Done(s) => s,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// The human driving the run.
pub trait Operator {
    /// Ask a question and block until an answer is entered.
    fn ask(&mut self, question: &str) -> Result<String>;

    /// Show a message. Never blocks on input.
    fn tell(&mut self, notice: Notice);
}

/// `true` only for the exact tokens `y` and `yes`, surrounding whitespace aside.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "yes")
}

/// Ask a yes/no question; anything but an affirmative is a no.
pub fn confirm(operator: &mut dyn Operator, question: &str) -> Result<bool> {
    let answer = operator.ask(question)?;
    Ok(is_affirmative(&answer))
}
