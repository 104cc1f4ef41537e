//! Test doubles for the [`System`] and [`Operator`] seams.
use crate::error::ProvisionError;
use crate::prompt::{Notice, Operator};
use crate::system::{Exit, Invocation, System};
use anyhow::{Result, anyhow};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;

/// Records every command and answers probes from canned values.
pub(crate) struct FakeSystem {
    pub invocations: Vec<Invocation>,
    pub model: Option<String>,
    /// Successive free-space readings; the last one repeats.
    available_mb: RefCell<VecDeque<u64>>,
    failures: Vec<(String, usize)>,
    unspawnable: Vec<String>,
    /// Refuse every command, as after Ctrl+C.
    pub cancelled: bool,
}

impl FakeSystem {
    pub fn new(available_mb: u64) -> Self {
        Self {
            invocations: Vec::new(),
            model: None,
            available_mb: RefCell::new(VecDeque::from([available_mb])),
            failures: Vec::new(),
            unspawnable: Vec::new(),
            cancelled: false,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    /// Report these free-space readings on successive probes.
    pub fn with_space_readings(self, readings: &[u64]) -> Self {
        *self.available_mb.borrow_mut() = readings.iter().copied().collect();
        self
    }

    /// Fail the next `times` commands whose command line starts with `prefix`.
    pub fn fail(&mut self, prefix: &str, times: usize) {
        self.failures.push((prefix.to_string(), times));
    }

    /// Treat commands starting with `prefix` as impossible to spawn.
    pub fn unspawnable(&mut self, prefix: &str) {
        self.unspawnable.push(prefix.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.invocations.iter().map(|i| i.to_string()).collect()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.commands().iter().any(|c| c.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.commands().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl System for FakeSystem {
    fn run(&mut self, invocation: &Invocation) -> Result<Exit> {
        if self.cancelled {
            return Err(ProvisionError::Cancelled.into());
        }
        self.invocations.push(invocation.clone());
        let line = invocation.to_string();
        if self.unspawnable.iter().any(|p| line.starts_with(p.as_str())) {
            return Err(anyhow!("failed to spawn `{line}`"));
        }
        for (prefix, remaining) in self.failures.iter_mut() {
            if *remaining > 0 && line.starts_with(prefix.as_str()) {
                *remaining -= 1;
                return Ok(Exit::Failure {
                    code: Some(1),
                    stderr: format!("{prefix} failed"),
                });
            }
        }
        Ok(Exit::Success)
    }

    fn available_space_mb(&self, _path: &Path) -> Result<u64> {
        let mut readings = self.available_mb.borrow_mut();
        let reading = if readings.len() > 1 {
            readings.pop_front()
        } else {
            readings.front().copied()
        };
        reading.ok_or_else(|| anyhow!("no free-space reading configured"))
    }

    fn hardware_model(&self) -> Option<String> {
        self.model.clone()
    }
}

/// Replays scripted answers and records what was asked and shown.
pub(crate) struct ScriptedOperator {
    answers: VecDeque<String>,
    pub questions: Vec<String>,
    pub notices: Vec<Notice>,
}

impl ScriptedOperator {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            questions: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    pub fn saw(&self, fragment: &str) -> bool {
        self.notices.iter().any(|n| n.text().contains(fragment))
    }
}

impl Operator for ScriptedOperator {
    fn ask(&mut self, question: &str) -> Result<String> {
        self.questions.push(question.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| anyhow!("unexpected question: {question}"))
    }

    fn tell(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}
