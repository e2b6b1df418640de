use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pkgcycle_daemon::DEFAULT_RUNTIME_DIR;

mod command_flows;
mod completion;
mod dispatch;
mod render;

use completion::CliCompletionShell;
use dispatch::run_cli;

const DEFAULT_STATUS_LINES: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "pkgcycle")]
#[command(
    about = "Background service that installs and later removes random package batches",
    long_about = None
)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Directory holding the lock and log files.
    #[arg(
        long,
        global = true,
        env = "PKGCYCLE_RUNTIME_DIR",
        default_value = DEFAULT_RUNTIME_DIR
    )]
    runtime_dir: PathBuf,
    /// TOML file overriding schedule bounds and timeouts.
    #[arg(long, global = true, env = "PKGCYCLE_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the run summary, confirm, then start in the background.
    Start {
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
        /// Stay attached for an external supervisor.
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the running instance, forcing it after a grace period.
    Stop,
    /// Report whether an instance is running and show recent log lines.
    Status {
        #[arg(long, default_value_t = DEFAULT_STATUS_LINES)]
        lines: usize,
        #[arg(long)]
        json: bool,
    },
    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

fn main() -> Result<()> {
    run_cli(Cli::parse())
}
