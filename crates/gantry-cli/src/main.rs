//! Gantry CLI entrypoint.

use clap::Parser;

mod commands;
mod executor;
mod handlers;
mod output;

use commands::{ArtifactCommands, Commands};

#[derive(Parser)]
#[command(name = "gantry")]
#[command(author, version, about = "Gantry pipeline runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => handlers::validate(&path)?,
        Commands::Run(args) => {
            let code = handlers::run(args).await?;
            std::process::exit(code);
        }
        Commands::Artifacts { command } => match command {
            ArtifactCommands::List { run_id, data_dir } => {
                handlers::list_artifacts(&run_id, &data_dir).await?
            }
            ArtifactCommands::Download {
                run_id,
                name,
                dest,
                data_dir,
            } => handlers::download_artifact(&run_id, &name, &dest, &data_dir).await?,
            ArtifactCommands::Sweep { data_dir } => handlers::sweep_artifacts(&data_dir).await?,
        },
    }

    Ok(())
}
