mod cli;
mod commands;
mod observability;
mod supervisor;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, MetricsCommands, SessionCommands, TrustCommands};
use std::path::Path;
use vectra_guard_core::config;
use vectra_guard_core::GuardConfig;

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("vectra-guard: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        // `init` must work before any config exists.
        Commands::Init { force, toml } => {
            observability::init_tracing("text");
            commands::init::cmd_init(force, toml)
        }
        command => {
            let cwd = std::env::current_dir()?;
            let config: GuardConfig = config::load(&cwd)?;
            observability::init_tracing(&config.logging.format);
            dispatch(command, &config, &cwd)
        }
    }
}

fn dispatch(command: Commands, config: &GuardConfig, cwd: &Path) -> Result<i32> {
    match command {
        Commands::Init { .. } => unreachable!("handled before config load"),
        Commands::Validate { script } => commands::analyze::cmd_validate(config, &script),
        Commands::Explain { script } => commands::analyze::cmd_explain(config, &script),
        Commands::Exec {
            interactive,
            session,
            command,
        } => supervisor::run(
            config,
            supervisor::ExecRequest {
                args: command,
                interactive,
                session_id: session,
                workspace: cwd.to_path_buf(),
            },
        ),
        Commands::Session { command } => match command {
            SessionCommands::Start { agent, workspace } => {
                commands::session::cmd_start(&agent, &workspace)
            }
            SessionCommands::End { id } => commands::session::cmd_end(cwd, &id),
            SessionCommands::List => commands::session::cmd_list(cwd),
            SessionCommands::Show { id } => commands::session::cmd_show(cwd, &id),
        },
        Commands::Trust { command } => match command {
            TrustCommands::List => commands::trust::cmd_list(config),
            TrustCommands::Add {
                command,
                note,
                duration,
            } => commands::trust::cmd_add(config, &command, note.as_deref(), duration.as_deref()),
            TrustCommands::Remove { command } => commands::trust::cmd_remove(config, &command),
            TrustCommands::Clean => commands::trust::cmd_clean(config),
        },
        Commands::Metrics { command } => match command {
            MetricsCommands::Show { json } => commands::metrics::cmd_show(config, json),
            MetricsCommands::Reset => commands::metrics::cmd_reset(config),
        },
        Commands::Version => {
            println!("vectra-guard {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}
