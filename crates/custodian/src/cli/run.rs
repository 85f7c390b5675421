//! Command handlers.

use custodian::{
    CustodianConfig, CustodianResult, DiscoverSourcesArgs, ExecuteRequestArgs, build_engine,
    worker,
};
use tokio::io::BufReader;
use tracing::info;

/// Run one execution job to completion.
pub async fn run_execute(
    config: &CustodianConfig,
    request: String,
    job: String,
    workspace: String,
) -> CustodianResult<()> {
    let engine = build_engine(config).await?;
    let status = engine
        .execute_request(ExecuteRequestArgs::new(request, job, workspace))
        .await?;
    println!("{}", status);
    Ok(())
}

/// Run one discovery job.
pub async fn run_discover(
    config: &CustodianConfig,
    silo: String,
    job: String,
    workspace: String,
) -> CustodianResult<()> {
    let engine = build_engine(config).await?;
    let created = engine
        .discover_sources(DiscoverSourcesArgs::new(silo, workspace, job))
        .await?;
    println!("{} new discoveries", created);
    Ok(())
}

/// Serve commands from stdin.
pub async fn run_worker(config: &CustodianConfig) -> CustodianResult<()> {
    let engine = build_engine(config).await?;
    info!("Worker reading commands from stdin");
    let summary = worker::run(engine, BufReader::new(tokio::io::stdin())).await?;
    println!(
        "{} commands, {} rejected, {} jobs succeeded, {} failed",
        summary.accepted(),
        summary.rejected(),
        summary.jobs_succeeded(),
        summary.jobs_failed()
    );
    Ok(())
}

/// Print the effective configuration.
pub fn check_config(config: &CustodianConfig) -> CustodianResult<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
