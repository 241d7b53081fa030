use std::sync::Arc;

use anyhow::Result;
use piwind_alerts::{
    DeliveryPool, DeliveryStatsSnapshot, FcmClient, InMemoryDirectory, MeteoUpdate,
    MeteoUpdatePipeline, PushGateway,
};
use piwind_core::{AppError, Config};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;

#[tokio::main]
async fn main() -> Result<()> {
    piwind_core::init()?;

    let (config, _validation) = Config::load_validated()?;

    match run(&config).await {
        Ok(stats) => {
            tracing::info!(
                enqueued = stats.enqueued,
                delivered = stats.delivered,
                failed = stats.failed,
                dropped = stats.dropped,
                "PiWind alert service stopped"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "{}", e.user_message());
            Err(e.into())
        }
    }
}

/// Read newline-delimited JSON updates from stdin until EOF.
async fn run(config: &Config) -> Result<DeliveryStatsSnapshot, AppError> {
    let directory = Arc::new(
        InMemoryDirectory::from_dev_config(&config.dev)
            .map_err(|e| AppError::Other(anyhow::anyhow!("Invalid dev seed data: {}", e)))?,
    );

    let client = Arc::new(FcmClient::new(&config.push)?);
    let gateway = if config.stations.refresh_metadata {
        PushGateway::with_directory(client, directory.clone())
    } else {
        PushGateway::new(client)
    };

    let (queue, pool) = DeliveryPool::spawn(&Handle::current(), gateway, &config.delivery);
    let pipeline = MeteoUpdatePipeline::new(config.messages.clone(), directory, queue);

    tracing::info!("PiWind alert service started, reading updates from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let update = match MeteoUpdate::from_json(&line) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected meteo update");
                continue;
            }
        };

        let report = pipeline.handle_update(update);
        tracing::debug!(
            enqueued = report.enqueued,
            dropped = report.dropped,
            listeners = report.publish.delivered,
            "Update processed"
        );
    }

    drop(pipeline);
    Ok(pool.join().await)
}
