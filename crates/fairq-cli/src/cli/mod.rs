//! CLI for the fairq task scheduler.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use fairq_core::config;
use std::path::PathBuf;

use commands::{run_completions, run_config, run_man, run_workload, RunOptions};

/// Top-level CLI for fairq.
#[derive(Debug, Parser)]
#[command(name = "fairq")]
#[command(about = "fairq: priority-weighted multi-queue task runner", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run every queue described in a workload file until all of them finish.
    Run {
        /// Path to the workload TOML file.
        workload: PathBuf,
        /// Use the simple FIFO manager (global semaphore, no priorities or retries).
        #[arg(long)]
        simple: bool,
        /// Override the global running-task limit (0 = unlimited).
        #[arg(long, value_name = "N")]
        max_tasks: Option<usize>,
        /// Override the running-queue limit (0 = unlimited).
        #[arg(long, value_name = "N")]
        max_queues: Option<usize>,
    },

    /// Print the effective configuration and where it is loaded from.
    Config,

    /// Generate shell completions on stdout.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Render the man page (roff) on stdout.
    Man,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Run {
                workload,
                simple,
                max_tasks,
                max_queues,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                let opts = RunOptions {
                    simple,
                    max_tasks,
                    max_queues,
                };
                run_workload(cfg, &workload, opts).await?;
            }
            CliCommand::Config => {
                let cfg = config::load_or_init()?;
                run_config(&cfg)?;
            }
            CliCommand::Completions { shell } => run_completions(shell)?,
            CliCommand::Man => run_man()?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
