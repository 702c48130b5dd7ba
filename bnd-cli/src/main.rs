//! bnd: lab session data curator.
//!
//! # Usage
//!
//! ```text
//! bnd init --local <path> --remote <path> [--force]
//! bnd show-config [--json]
//! bnd validate-session <path> <subject> [--ignore-behavior] [--ignore-ephys] [--ignore-videos] [--json]
//! bnd validate-sessions <subject> [--ignore-...] [--json]
//! bnd rename-videos <path> <subject> [--dry-run]
//! bnd rename-extra-files <path> [--subject <name>] [--dry-run]
//! bnd up <path> <subject> [--ignore-...] [--no-extra] [--rename-videos] [--rename-extra]
//!        [--policy <policy>] [--on-integrity-failure keep|rollback] [--dry-run] [--json]
//! bnd dl <session> <subject> [--ignore-...] [--no-extra] [--policy <policy>] [--dry-run] [--json]
//! bnd last-session <subject> [--remote] [--json]
//! bnd sessions-on-day <YYYY-MM-DD> [--remote] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::{InitArgs, ShowConfigArgs},
    query::{LastSessionArgs, SessionsOnDayArgs},
    rename::{RenameExtraFilesArgs, RenameVideosArgs},
    transfer::{DlArgs, UpArgs},
    validate::{ValidateSessionArgs, ValidateSessionsArgs},
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "bnd",
    version,
    about = "Validate, rename and sync experimental session data",
    long_about = None,
)]
struct Cli {
    /// Log stage transitions and copies (same as RUST_LOG=info).
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create ~/.bnd/config.yaml with the local and remote roots.
    Init(InitArgs),

    /// Print the configuration.
    ShowConfig(ShowConfigArgs),

    /// Validate one session folder.
    ValidateSession(ValidateSessionArgs),

    /// Validate every local raw session of a subject.
    ValidateSessions(ValidateSessionsArgs),

    /// Move and rename a session's videos into convention.
    RenameVideos(RenameVideosArgs),

    /// Prefix a session's extra files with the session name.
    RenameExtraFiles(RenameExtraFilesArgs),

    /// Upload a local raw session to the remote root.
    Up(UpArgs),

    /// Download a raw session from the remote root.
    Dl(DlArgs),

    /// Show the latest session of a subject.
    LastSession(LastSessionArgs),

    /// List the sessions of all subjects recorded on a given day.
    SessionsOnDay(SessionsOnDayArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::ShowConfig(args) => args.run(),
        Commands::ValidateSession(args) => args.run(),
        Commands::ValidateSessions(args) => args.run(),
        Commands::RenameVideos(args) => args.run(),
        Commands::RenameExtraFiles(args) => args.run(),
        Commands::Up(args) => args.run(),
        Commands::Dl(args) => args.run(),
        Commands::LastSession(args) => args.run(),
        Commands::SessionsOnDay(args) => args.run(),
    }
}

/// Logs go to stderr; `-v` wins over `RUST_LOG`, which wins over `warn`.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
