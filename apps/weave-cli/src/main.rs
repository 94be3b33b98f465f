//! # weave-cli
//!
//! Command-line interface for weave.
//!
//! - `weave index` — bring the embedding store in line with the inventory
//! - `weave select <request>` — show the fragments closest to a request
//! - `weave modify <request>` — plan, edit, build and apply a change
//! - `weave apply <plan>` — finalize an existing apply plan
//! - `weave restore <backup>` — put backed-up originals back
//! - `weave quality <task>` — docstring or file-split proposals for review

mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use weave_engine::{QualityTask, StopAfter};

use crate::config::WeaveConfig;

/// weave — agent-driven changes to a code base, verified before they land.
#[derive(Parser)]
#[command(name = "weave", version, about)]
struct Cli {
    /// Configuration file.
    #[arg(long, default_value = "weave.toml")]
    config: PathBuf,

    /// Verbose logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Update the embedding store from the fragment inventory.
    Index {
        /// Delete the store first and embed every fragment again.
        #[arg(long)]
        force_rebuild: bool,
        /// Recompute code digests from the target project before updating.
        #[arg(long)]
        recompute_digests: bool,
    },
    /// Show the fragments most similar to a request.
    Select {
        request: String,
        #[arg(long)]
        top_k: Option<i64>,
        /// Maximum squared L2 distance.
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Run the full modification workflow for a request.
    Modify {
        request: String,
        /// Stop after: optimization, planning, workspace_prep or execution.
        #[arg(long)]
        stop_after: Option<StopAfter>,
        /// Use this plan file instead of calling the planner.
        #[arg(long)]
        plan: Option<PathBuf>,
    },
    /// Apply a previously generated apply plan to the target project.
    Apply {
        plan: PathBuf,
    },
    /// Copy files from a backup directory back into the target project.
    Restore {
        backup_dir: PathBuf,
        /// Restore only these relative paths.
        files: Vec<String>,
    },
    /// Ask quality agents for proposals and write a report.
    Quality {
        /// docstrings or filesplit.
        #[arg(required_unless_present = "retry_errors")]
        task: Option<QualityTask>,
        /// Only this fragment id (docstrings) or relative file path (filesplit).
        #[arg(long)]
        only: Option<String>,
        /// Analyse again the entries an earlier report marked as errors.
        #[arg(long, value_name = "REPORT", conflicts_with_all = ["task", "only"])]
        retry_errors: Option<PathBuf>,
    },
}

fn init_logging(debug: bool, format: LogFormat) {
    let default_filter = if debug { "weave=debug" } else { "weave=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Logs go to stderr; command results go to stdout.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match format {
        LogFormat::Text => builder.with_ansi(false).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(e) = result {
        eprintln!("warning: logging already initialised: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_format);

    let config = WeaveConfig::load_or_default(&cli.config)?.with_env_overrides();
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    let success = match cli.command {
        Commands::Index {
            force_rebuild,
            recompute_digests,
        } => commands::index::execute(&config, force_rebuild, recompute_digests).await?,
        Commands::Select {
            request,
            top_k,
            threshold,
        } => commands::select::execute(&config, &request, top_k, threshold).await?,
        Commands::Modify {
            request,
            stop_after,
            plan,
        } => commands::modify::execute(&config, &request, stop_after, plan).await?,
        Commands::Apply { plan } => commands::apply::execute(&config, &plan)?,
        Commands::Restore { backup_dir, files } => {
            commands::restore::execute(&config, &backup_dir, &files)?
        }
        Commands::Quality {
            task,
            only,
            retry_errors,
        } => {
            commands::quality::execute(&config, task, only.as_deref(), retry_errors.as_deref())
                .await?
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
