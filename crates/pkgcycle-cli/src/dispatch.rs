use anyhow::Result;
use pkgcycle_daemon::RuntimeLayout;

use crate::command_flows::{
    load_schedule_config, run_start_command, run_status_command, run_stop_command, StartOptions,
};
use crate::completion::write_completions_script;
use crate::{Cli, Commands};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let layout = RuntimeLayout::new(cli.runtime_dir);

    match cli.command {
        Commands::Start { yes, foreground } => {
            let config = load_schedule_config(cli.config.as_deref())?;
            run_start_command(&layout, config, StartOptions { yes, foreground })
        }
        Commands::Stop => {
            let config = load_schedule_config(cli.config.as_deref())?;
            run_stop_command(&layout, &config)
        }
        Commands::Status { lines, json } => run_status_command(&layout, lines, json),
        Commands::Completions { shell } => {
            write_completions_script(shell, &mut std::io::stdout().lock())
        }
    }
}
