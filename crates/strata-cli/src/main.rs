//! Strata CLI
//!
//! Runs the extract, transform and load stages from the command line.

use anyhow::Result;
use clap::{Parser, Subcommand};
use strata_runtime::{Command, Stage};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Strata - API to document store to relational table ETL
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Dataset preset name or path to a dataset YAML file (overrides DATASET)
    #[arg(short, long)]
    dataset: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch entities from the API into the document store
    Extract,

    /// Project stored documents into the intermediate CSV file
    Transform,

    /// Upsert the intermediate CSV file into the relational table
    Load,

    /// Run extract, transform and load in order
    Run,
}

impl From<Commands> for Command {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Extract => Command::Stage(Stage::Extract),
            Commands::Transform => Command::Stage(Stage::Transform),
            Commands::Load => Command::Stage(Stage::Load),
            Commands::Run => Command::Run,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    commands::run::run(cli.command.into(), cli.dataset.as_deref()).await
}
