mod terminal;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use log::debug;
use std::io::{IsTerminal, stdout};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use terminal::{SpinnerSystem, TerminalOperator};
use usbshare_core::driver::{self, Outcome, Preflight, Report};
use usbshare_core::platform::{self, LinuxSystem};
use usbshare_core::storage::Sizing;
use usbshare_core::{ProvisionError, RunConfig};

#[cfg(unix)]
use libc::ECHOCTL;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(unix)]
use termios::{TCSANOW, Termios, tcsetattr};

/// Exit status for a run stopped with Ctrl+C.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "usbshare")]
#[command(
    about = "Provision a Raspberry Pi as a USB mass-storage gadget shared over Samba",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log every external command (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive setup (the default)
    Setup,
    /// Report what setup would find, without changing anything
    Check,
}

/// A helper struct that, on Unix, disables `ECHOCTL` for the terminal.
///
/// `ECHOCTL` is the terminal flag that causes Ctrl+C to be printed as `^C`.
/// Disabling it keeps the cancellation message on a clean line.
/// The original terminal state is restored when this struct is dropped.
struct TermRestorer {
    #[cfg(unix)]
    original_termios: Option<Termios>,
}

impl TermRestorer {
    fn new() -> Self {
        #[cfg(unix)]
        {
            let fd = stdout().as_raw_fd();
            if !stdout().is_terminal() {
                return Self {
                    original_termios: None,
                };
            }

            let original_termios = Termios::from_fd(fd).ok().and_then(|original| {
                let mut quiet = original;
                quiet.c_lflag &= !ECHOCTL;
                tcsetattr(fd, TCSANOW, &quiet).ok().map(|_| original)
            });
            Self { original_termios }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }
}

/// Put back the terminal state captured by [`TermRestorer::new`].
#[cfg(unix)]
fn restore_terminal(original: Option<&Termios>) {
    if let Some(original_termios) = original {
        let fd = stdout().as_raw_fd();
        tcsetattr(fd, TCSANOW, original_termios).ok();
    }
}

impl Drop for TermRestorer {
    fn drop(&mut self) {
        #[cfg(unix)]
        restore_terminal(self.original_termios.as_ref());
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn yes_no(flag: bool) -> console::StyledObject<&'static str> {
    if flag {
        style("yes").green()
    } else {
        style("no").yellow()
    }
}

fn print_preflight(config: &RunConfig, report: &Preflight) {
    let model = report.model.as_deref().unwrap_or("(unreadable)");
    let space = match report.available_mb {
        Some(mb) => format!("{mb} MB"),
        None => "(unknown)".to_string(),
    };

    println!("  {:<24} {}", "Board", style(model).cyan());
    println!("  {:<24} {}", "Known compatible", yes_no(report.compatible));
    println!("  {:<24} {}", "Free space on /", space);
    println!(
        "  {:<24} {}",
        format!("{} MB image fits", config.default_size_mb),
        yes_no(report.default_size_fits(config))
    );
    println!(
        "  {:<24} {}",
        format!("{} exists", config.backing_file.display()),
        yes_no(report.backing_file_exists)
    );
    println!(
        "  {:<24} {}",
        format!("{} exists", config.mount_dir.display()),
        yes_no(report.mount_dir_exists)
    );
    println!(
        "  {:<24} {}",
        format!("{} present", config.watchdog_script),
        yes_no(report.watchdog_present)
    );
}

fn print_report(report: &Report) {
    let image = match report.backing_store {
        Sizing::Existing => "kept existing image".to_string(),
        Sizing::Created { size_mb } => format!("created {size_mb} MB"),
    };

    println!("\n✨ Setup complete.");
    println!(
        "  {:<14} {}",
        "Board",
        report.model.as_deref().unwrap_or("(unreadable)")
    );
    println!("  {:<14} {}", "Backing store", image);
    println!(
        "  {:<14} {}",
        "Mounted on",
        style(report.mount_dir.display()).cyan()
    );
    println!("  {:<14} [{}]", "Samba share", report.share_name);
    println!("  {:<14} {}", "Service", report.unit_path.display());
}

fn run(cli: Cli, running: Arc<AtomicBool>) -> Result<()> {
    let config = RunConfig::new(std::env::current_dir()?);
    debug!("run configuration: {config:?}");

    match cli.command.unwrap_or(Commands::Setup) {
        Commands::Check => {
            let system = LinuxSystem::new(running);
            print_preflight(&config, &driver::preflight(&config, &system));
        }
        Commands::Setup => {
            platform::ensure_root()?;

            let mut system = SpinnerSystem::new(LinuxSystem::new(running));
            let mut operator = TerminalOperator::new();

            match driver::provision(&config, &mut system, &mut operator)? {
                Outcome::Rebooting => {}
                Outcome::Completed(report) => print_report(&report),
            }
        }
    }

    Ok(())
}

fn report_error(err: &anyhow::Error) -> ExitCode {
    debug!("run failed: {err:?}");
    match err.downcast_ref::<ProvisionError>() {
        Some(ProvisionError::Cancelled) => {
            println!("\n{}", style("Setup cancelled.").yellow());
            ExitCode::from(EXIT_CANCELLED)
        }
        Some(ProvisionError::Declined { .. }) => {
            println!("{}", style(format!("{err}.")).yellow().bold());
            ExitCode::FAILURE
        }
        Some(ProvisionError::MissingWatchdog(_)) => {
            eprintln!("{} {err}", style("Error:").red().bold());
            eprintln!("Run usbshare from the directory that contains the watchdog script.");
            ExitCode::FAILURE
        }
        _ => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Handle one Ctrl+C. The first clears `running`; a later one restores the
/// terminal and returns `true`, meaning the process should exit now.
fn interrupt(running: &AtomicBool, restore: impl FnOnce()) -> bool {
    if running.swap(false, Ordering::SeqCst) {
        return false;
    }
    restore();
    true
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Restores the terminal when main() returns.
    let _term_restorer = TermRestorer::new();
    #[cfg(unix)]
    let original_termios = _term_restorer.original_termios;

    // Cleared by Ctrl+C; no further external commands start once it is false.
    // A second Ctrl+C exits at once, for when the run is blocked on a prompt.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        // process::exit skips the restorer's Drop, so restore by hand.
        let restore = || {
            #[cfg(unix)]
            restore_terminal(original_termios.as_ref());
        };
        if interrupt(&r, restore) {
            std::process::exit(EXIT_CANCELLED.into());
        }
    }) {
        eprintln!("{} {e}", style("Error:").red().bold());
        return ExitCode::FAILURE;
    }

    match run(cli, running) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(&e),
    }
}
