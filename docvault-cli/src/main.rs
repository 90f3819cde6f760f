use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{changes, diff, init, link, log, record, revert, rollback, status};

#[derive(Parser)]
#[command(name = "docvault")]
#[command(version, about = "Revertible history for a document collection", long_about = None)]
struct Cli {
    /// Repository working directory
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the repository (if needed) and the vault metadata
    Init,

    /// Commit the working copy and record the operation in the timeline
    Record(record::RecordArgs),

    /// Link a derived commit to an entry recorded earlier
    Link {
        /// Timeline entry id
        entry: String,

        /// Commit holding the derived artifacts
        commit: String,
    },

    /// Show the operation timeline
    Log(log::LogArgs),

    /// List revertible changes with their source/derived lineage
    Changes {
        /// Number of timeline entries to expand
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show what a commit changed
    Diff {
        /// Commit id (full or abbreviated)
        commit: String,

        /// Only this path
        path: Option<String>,
    },

    /// Show working copy status and timeline summary
    Status,

    /// Revert changes by file, change id or count
    Revert(revert::RevertArgs),

    /// Hard-reset the working copy to a commit
    Rollback {
        /// Commit id to roll back to
        commit: String,

        /// Actually perform the rollback (without this, just shows preview)
        #[arg(long)]
        execute: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init::run(&cli.repo)?;
        }
        Commands::Record(args) => {
            record::run(&cli.repo, args)?;
        }
        Commands::Link { entry, commit } => {
            link::run(&cli.repo, entry, commit)?;
        }
        Commands::Log(args) => {
            log::run(&cli.repo, args)?;
        }
        Commands::Changes { limit, json } => {
            changes::run(&cli.repo, limit, json)?;
        }
        Commands::Diff { commit, path } => {
            diff::run(&cli.repo, commit, path)?;
        }
        Commands::Status => {
            status::run(&cli.repo)?;
        }
        Commands::Revert(args) => {
            revert::run(&cli.repo, args)?;
        }
        Commands::Rollback {
            commit,
            execute,
            yes,
        } => {
            rollback::run(&cli.repo, commit, execute, yes)?;
        }
    }

    Ok(())
}
