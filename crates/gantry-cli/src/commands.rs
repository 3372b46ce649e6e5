//! CLI command definitions.

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a pipeline file
    Validate {
        /// Path to pipeline file
        #[arg(default_value = "gantry.yaml")]
        path: String,
    },

    /// Execute a pipeline locally
    Run(RunArgs),

    /// Manage stored artifacts
    Artifacts {
        #[command(subcommand)]
        command: ArtifactCommands,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to pipeline file
    #[arg(default_value = "gantry.yaml")]
    pub path: String,

    /// Event kind that starts the run
    #[arg(long, value_enum, default_value_t = EventKind::Manual)]
    pub event: EventKind,

    /// Branch for push and pull_request events
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Commit SHA for push events
    #[arg(long)]
    pub commit: Option<String>,

    /// Override the pipeline's job concurrency limit
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Directory for workspaces, artifacts and run records
    #[arg(long, default_value = ".gantry")]
    pub data_dir: PathBuf,

    /// Supply a secret directly, resolvable via `provider: cli`
    #[arg(long = "secret", value_name = "NAME=VALUE")]
    pub secrets: Vec<String>,

    /// Post the run summary to this webhook when the run finishes
    #[arg(long)]
    pub webhook: Option<String>,

    /// Start the run even when no trigger rule matches the event
    #[arg(long)]
    pub force: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EventKind {
    Push,
    PullRequest,
    Manual,
    Schedule,
}

#[derive(Subcommand)]
pub enum ArtifactCommands {
    /// List artifacts uploaded by a run
    List {
        /// Run ID
        run_id: String,

        #[arg(long, default_value = ".gantry")]
        data_dir: PathBuf,
    },

    /// Download an artifact into a directory
    Download {
        /// Run ID
        run_id: String,

        /// Artifact name
        name: String,

        /// Destination directory
        #[arg(default_value = ".")]
        dest: PathBuf,

        #[arg(long, default_value = ".gantry")]
        data_dir: PathBuf,
    },

    /// Delete artifacts past their retention window
    Sweep {
        #[arg(long, default_value = ".gantry")]
        data_dir: PathBuf,
    },
}
