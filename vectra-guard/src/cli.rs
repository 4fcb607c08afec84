use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vectra Guard - a command-execution supervisor
#[derive(Parser, Debug)]
#[command(name = "vectra-guard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a default config file at the project root
    Init {
        /// Overwrite an existing config file
        #[arg(long, default_value = "false")]
        force: bool,

        /// Emit TOML instead of YAML
        #[arg(long, default_value = "false")]
        toml: bool,
    },

    /// Analyze a script and print findings (exit 2 on severity >= medium)
    Validate {
        /// Path to the script file
        #[arg(value_name = "SCRIPT")]
        script: String,
    },

    /// Analyze a script and print a human rationale for each finding
    Explain {
        /// Path to the script file
        #[arg(value_name = "SCRIPT")]
        script: String,
    },

    /// Run a command through the supervision pipeline
    Exec {
        /// Prompt for approval on risky commands
        #[arg(long, default_value = "false")]
        interactive: bool,

        /// Record into this session (overrides VECTRAGUARD_SESSION_ID)
        #[arg(long, value_name = "ID")]
        session: Option<String>,

        /// The command to run, after `--`
        #[arg(last = true, required = true, value_name = "CMD")]
        command: Vec<String>,
    },

    /// Session ledger operations
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Trust store operations
    Trust {
        #[command(subcommand)]
        command: TrustCommands,
    },

    /// Metrics sink operations
    Metrics {
        #[command(subcommand)]
        command: MetricsCommands,
    },

    /// Print version
    Version,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Start a new session and print its id
    Start {
        /// Agent name recorded in the session
        #[arg(long, value_name = "NAME")]
        agent: String,

        /// Workspace directory the session belongs to
        #[arg(long, value_name = "PATH")]
        workspace: PathBuf,
    },

    /// Mark a session ended
    End {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// List sessions in the current workspace
    List,

    /// Dump one session as JSON
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum TrustCommands {
    /// List trusted commands
    List,

    /// Trust a command
    Add {
        /// The command text to trust
        #[arg(value_name = "COMMAND")]
        command: String,

        /// Free-form note stored with the entry
        #[arg(long, value_name = "TEXT")]
        note: Option<String>,

        /// Expiry, e.g. 90s, 30m, 24h, 7d
        #[arg(long, value_name = "DURATION")]
        duration: Option<String>,
    },

    /// Remove a trusted command
    Remove {
        #[arg(value_name = "COMMAND")]
        command: String,
    },

    /// Drop all expired entries
    Clean,
}

#[derive(Subcommand, Debug)]
pub enum MetricsCommands {
    /// Print counters
    Show {
        /// Print as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Reset all counters
    Reset,
}
