//! crosslink CLI - incremental, resumable model-assisted document categorization

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod discover;
mod handler;
mod logging;

use commands::{Project, RunArgs, cmd_config_init, cmd_config_show, cmd_health, cmd_reset, cmd_run, cmd_status};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "crosslink")]
#[command(about = "Categorize a document collection with a local model, incrementally and resumably")]
#[command(after_help = "\
QUICK START:
  crosslink config init           # Write .crosslink/config.toml
  crosslink health                # Check Ollama and the configured model
  crosslink run                   # Process new and changed documents
  crosslink run --resume          # Continue an interrupted run

STATE:
  .crosslink/state/tracker.json   # Content digests from the last run
  .crosslink/state/progress.json  # Checkpoint of the current run
  .crosslink/state/responses.json # Cached model responses
  .crosslink/state/results.jsonl  # One categorization per line")]
struct Cli {
  /// Project directory (default: current directory)
  #[arg(short, long, global = true)]
  dir: Option<PathBuf>,

  /// Write logs to a rolling file in the state directory
  #[arg(long, global = true)]
  log_file: bool,

  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `crosslink config`
#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show current effective configuration
  Show,
  /// Initialize project config file (.crosslink/config.toml)
  Init,
}

#[derive(Subcommand)]
enum Commands {
  /// Process new and changed documents
  Run {
    /// Skip documents completed by the interrupted run
    #[arg(long)]
    resume: bool,
    /// Process unchanged documents too (cached responses are reused)
    #[arg(long)]
    force: bool,
    /// Number of concurrent workers
    #[arg(short, long)]
    workers: Option<usize>,
    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
  },
  /// Show tracked documents, checkpoint and cache state
  Status {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Delete persisted state so everything is reprocessed
  Reset {
    /// Also delete the results file
    #[arg(long)]
    results: bool,
  },
  /// Check that Ollama and the configured model are available
  Health,
  /// Manage configuration
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let project = Project::open(cli.dir.as_deref())?;

  let to_file = cli.log_file || project.config.logging.file;
  let _guard = init_logging(&project.config.logging, &project.log_dir(), to_file);
  project.warn_skipped_configs();

  match cli.command {
    Commands::Run {
      resume,
      force,
      workers,
      json,
    } => {
      cmd_run(
        &project,
        RunArgs {
          resume,
          force,
          workers,
          json,
        },
      )
      .await
    }
    Commands::Status { json } => cmd_status(&project, json).await,
    Commands::Reset { results } => cmd_reset(&project, results).await,
    Commands::Health => cmd_health(&project).await,
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show(&project).await,
      ConfigCommand::Init => cmd_config_init(&project).await,
    },
  }
}
