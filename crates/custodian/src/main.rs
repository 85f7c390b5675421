//! Custodian CLI binary.
//!
//! Runs execution and discovery jobs one at a time, or as a worker fed
//! commands on stdin.

use clap::Parser;
use custodian::{CustodianConfig, init_telemetry};

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{Cli, Commands, check_config, run_discover, run_execute, run_worker};

    let cli = Cli::parse();

    let config = CustodianConfig::load(cli.config.as_deref())?;
    init_telemetry(*config.log_format(), cli.verbose)?;

    match cli.command {
        Commands::Execute {
            request,
            job,
            workspace,
        } => run_execute(&config, request, job, workspace).await?,

        Commands::Discover {
            silo,
            job,
            workspace,
        } => run_discover(&config, silo, job, workspace).await?,

        Commands::Worker => run_worker(&config).await?,

        Commands::CheckConfig => check_config(&config)?,
    }

    Ok(())
}
