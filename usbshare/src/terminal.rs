//! Terminal front-end for the core's [`Operator`] and [`System`] seams.
use anyhow::{Result, bail};
use console::style;
use dialoguer::{Input, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;
use std::time::Duration;
use usbshare_core::{Exit, Invocation, Notice, Operator, ProvisionError, System};

/// Asks questions on the terminal, or reads plain lines when stdin is piped.
pub struct TerminalOperator {
    theme: ColorfulTheme,
    interactive: bool,
}

impl TerminalOperator {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
            interactive: io::stdin().is_terminal(),
        }
    }
}

/// Print `question`, then read one line of answer from `input`.
fn read_answer(input: &mut impl BufRead, output: &mut impl Write, question: &str) -> Result<String> {
    write!(output, "{question} ")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("stdin closed while waiting for an answer to: {question}");
    }
    Ok(line)
}

impl Operator for TerminalOperator {
    fn ask(&mut self, question: &str) -> Result<String> {
        if !self.interactive {
            return read_answer(&mut io::stdin().lock(), &mut io::stdout(), question);
        }
        let answer = Input::<String>::with_theme(&self.theme)
            .with_prompt(question)
            .allow_empty(true)
            .interact_text();
        match answer {
            Ok(answer) => Ok(answer),
            Err(dialoguer::Error::IO(e)) if e.kind() == io::ErrorKind::Interrupted => {
                Err(ProvisionError::Cancelled.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn tell(&mut self, notice: Notice) {
        match notice {
            Notice::Info(text) => println!("{text}"),
            Notice::Warning(text) => println!("{} {text}", style("WARNING:").yellow().bold()),
            Notice::Failure(text) => println!("{} {text}", style("✘").red().bold()),
            Notice::Done(text) => println!("{} {text}", style("✔").green().bold()),
        }
    }
}

/// Wraps a [`System`] so every external command shows a spinner while it runs.
pub struct SpinnerSystem<S> {
    inner: S,
}

impl<S: System> SpinnerSystem<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: System> System for SpinnerSystem<S> {
    fn run(&mut self, invocation: &Invocation) -> Result<Exit> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_prefix("Running");
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{prefix:12} [{elapsed_precise}] {spinner:.blue} {msg}")?,
        );
        spinner.set_message(invocation.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        let result = self.inner.run(invocation);
        spinner.finish_and_clear();

        match &result {
            Ok(Exit::Success) => println!("  {} {}", style("✔").green(), style(invocation).dim()),
            _ => println!("  {} {}", style("✘").red(), invocation),
        }
        result
    }

    fn available_space_mb(&self, path: &Path) -> Result<u64> {
        self.inner.available_space_mb(path)
    }

    fn hardware_model(&self) -> Option<String> {
        self.inner.hardware_model()
    }
}
