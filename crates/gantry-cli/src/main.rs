//! Gantry CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod client;
mod commands;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Gantry CI CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "GANTRY_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and cancel jobs
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Validate a server configuration
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "gantry.kdl")]
        path: String,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// List recent jobs
    List {
        /// Number of jobs to skip
        #[arg(long, default_value = "0")]
        offset: i64,
        /// Maximum number of jobs to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Show a job and its command logs
    Show {
        /// Job ID
        id: i64,
    },
    /// Find jobs by branch or commit
    Search {
        /// Substring of a branch name or commit hash
        query: String,
    },
    /// Cancel a job
    Cancel {
        /// Job ID
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Jobs { command } => {
            let client = client::ApiClient::new(&cli.api_url);
            match command {
                JobCommands::List { offset, limit } => {
                    commands::jobs::list(&client, offset, limit).await?;
                }
                JobCommands::Show { id } => {
                    commands::jobs::show(&client, id).await?;
                }
                JobCommands::Search { query } => {
                    commands::jobs::search(&client, &query).await?;
                }
                JobCommands::Cancel { id } => {
                    commands::jobs::cancel(&client, id).await?;
                }
            }
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}
