//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{cache_cmd, resource_cmd};
use crate::storage::Project;

#[derive(Parser)]
#[command(name = "cardstore")]
#[command(author, version, about = "Flashcard dataset store with a derived JSON cache")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root (defaults to the enclosing project, then the user data dir)
    #[arg(long, global = true, env = "CARDSTORE_ROOT")]
    pub root: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new project
    Init {
        /// Path to initialize (defaults to --root, then the current directory)
        path: Option<PathBuf>,
    },

    /// Print a dataset projection, or the manifest for `cache`
    Read {
        /// phrases, vocabulary, kanji or cache
        resource: String,
    },

    /// Write a sheet from a .json sheet model or a .csv source
    Write {
        /// Input file
        file: PathBuf,

        /// Sheet name (defaults to the name in the file, or the file stem)
        #[arg(long)]
        name: Option<String>,
    },

    /// Print every dataset source as a sheet model
    Workbook,

    /// Inspect and repair the derived cache
    #[command(subcommand)]
    Cache(cache_cmd::CacheCommands),
}

/// Installs the stderr log subscriber; `RUST_LOG` overrides the default level
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "cardstore=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Main entry point for the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = Output::new(cli.format);

    debug!("cardstore starting");

    match cli.command {
        Commands::Init { path } => {
            let path = path.or(cli.root).unwrap_or_else(|| PathBuf::from("."));
            debug!(path = %path.display(), "initializing project");
            let project = Project::init(&path)?;
            output.success(&format!("Initialized cardstore project at {}", project.root().display()));
        }

        Commands::Read { resource } => {
            let project = Project::discover(cli.root)?;
            resource_cmd::read(&output, &project, &resource).await?
        }

        Commands::Write { file, name } => {
            let project = Project::discover(cli.root)?;
            resource_cmd::write(&output, &project, &file, name.as_deref()).await?
        }

        Commands::Workbook => {
            let project = Project::discover(cli.root)?;
            resource_cmd::workbook(&output, &project).await?
        }

        Commands::Cache(cmd) => {
            let project = Project::discover(cli.root)?;
            cache_cmd::run(cmd, &output, &project).await?
        }
    }

    debug!("command completed");
    Ok(())
}
