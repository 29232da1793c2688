use std::sync::Arc;

use anyhow::{Error, Result};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use notification_worker::api::run_api_server;
use notification_worker::config::Config;
use notification_worker::tasks::Dependencies;
use notification_worker::worker::{WorkerPool, run_event_consumer};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting notification worker");

    let config = Config::load()?;
    let deps = Arc::new(Dependencies::build(config).await?);

    deps.queue.init().await?;

    let api_deps = deps.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = run_api_server(api_deps).await {
            error!(error = %e, "Health server exited");
        }
    });

    let consumer_deps = deps.clone();
    let consumer_handle = tokio::spawn(async move {
        if let Err(e) = run_event_consumer(consumer_deps).await {
            error!(error = %e, "Event consumer exited");
        }
    });

    let pool = WorkerPool::new(deps.clone());
    let pool_handle = tokio::spawn(async move {
        if let Err(e) = pool.run().await {
            error!(error = %e, "Worker pool exited");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    api_handle.abort();
    consumer_handle.abort();
    pool_handle.abort();

    deps.queue.close().await;
    info!("Notification worker stopped");

    Ok(())
}
