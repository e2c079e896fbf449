//! Entrypoint for the data feed updater

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(unsafe_code)]
#![deny(clippy::uninlined_format_args)]

use clap::Parser;
use data_feed_updater::{
    api,
    chain::ProviderPool,
    cli::Cli,
    config::Config,
    error::{UpdaterError, UpdaterResult},
    scheduler::Scheduler,
    state::State,
};
use tracing::{error, info};

/// Main entrypoint for the data feed updater
#[tokio::main]
async fn main() -> UpdaterResult<()> {
    let cli = Cli::parse();
    cli.setup_logging();

    if let Err(e) = run(cli).await {
        error!("data feed updater exited with error: {e}");
        return Err(e);
    }

    Ok(())
}

/// Start the updater and run it until ctrl-c
async fn run(cli: Cli) -> UpdaterResult<()> {
    // Load the configuration and connect to every provider
    let config = Config::from_file(&cli.config_path)?;
    let providers = ProviderPool::connect(&config).await?;
    let state = State::new(config, providers);

    // Bind the observation API before any loop starts
    let server = if cli.disable_http {
        info!("HTTP API disabled");
        None
    } else {
        let (_, server) = api::bind(state.clone(), cli.http_port)?;
        Some(server)
    };

    // Start the gas oracle and update loops
    let mut scheduler = Scheduler::new(state.clone());
    if scheduler.start() == 0 {
        return Err(UpdaterError::config("no update loops could be started"));
    }
    let server = server.map(tokio::spawn);

    tokio::signal::ctrl_c().await.map_err(|e| UpdaterError::Shutdown(e.to_string()))?;
    info!("received shutdown signal, waiting for in-flight cycles");
    state.stop();
    scheduler.join().await;
    if let Some(server) = server {
        server.abort();
    }

    info!("data feed updater stopped");
    Ok(())
}
