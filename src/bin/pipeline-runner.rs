//! Pipeline Runner Binary
//!
//! Runs the submission pipeline against the simulated acceptance system.
//! Intake envelopes are read from stdin, one JSON document per line, and
//! outbound notification envelopes are written to stdout.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

use submission_pipeline::config::ConfigManager;
use submission_pipeline::messaging::{ChannelNotificationPublisher, IntakeConsumer};
use submission_pipeline::orchestration::{BootstrapConfig, PipelineCollaborators, PipelineSystem};
use submission_pipeline::transmission::SimulatedAcceptanceSystem;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_manager = ConfigManager::load().context("loading pipeline configuration")?;

    let (publisher, mut notifications) = ChannelNotificationPublisher::new();
    let collaborators = PipelineCollaborators::from_config(
        &config_manager.config().storage,
        Arc::new(SimulatedAcceptanceSystem::new()),
        Arc::new(publisher),
    );

    let handle = PipelineSystem::bootstrap(config_manager, collaborators, BootstrapConfig::default())
        .await
        .context("bootstrapping pipeline")?;

    let printer = tokio::spawn(async move {
        while let Some(envelope) = notifications.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to render notification envelope"),
            }
        }
    });

    let intake = handle.intake();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Reading intake envelopes from stdin");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => {
                match line.context("reading stdin")? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => {
                        let ack = intake.handle_message(line.as_bytes()).await;
                        info!(?ack, "Intake message handled");
                    }
                    None => {
                        info!("stdin closed");
                        break;
                    }
                }
            }
        }
    }

    let stats = handle.shutdown().await?;
    info!(processed = stats.processed, failed = stats.failed, "Pipeline runner stopped");
    printer.abort();
    Ok(())
}
