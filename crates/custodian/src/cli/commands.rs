//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Custodian - data-subject request orchestration across data silos
#[derive(Parser, Debug)]
#[command(name = "custodian")]
#[command(about = "Data-subject request orchestration across data silos", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file, replacing the default locations
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute one request across its workspace and print the Job status
    Execute {
        /// Request to execute
        #[arg(long)]
        request: String,

        /// Job id to run under; re-running with the same id resumes it
        #[arg(long)]
        job: String,

        /// Workspace whose silos are targeted
        #[arg(long)]
        workspace: String,
    },

    /// Scan one silo for data source and property changes
    Discover {
        /// Silo definition to scan
        #[arg(long)]
        silo: String,

        /// Job id to run under
        #[arg(long)]
        job: String,

        /// Workspace owning the silo
        #[arg(long)]
        workspace: String,
    },

    /// Read newline-delimited JSON commands from stdin until it closes
    Worker,

    /// Load and validate configuration, then print it
    CheckConfig,
}
