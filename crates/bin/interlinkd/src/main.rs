//! # interlinkd: interlink daemon
//!
//! Composition root that wires the module registry, runtime and telemetry
//! bus together, loads interaction definitions and runs until Ctrl-C.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Install the tracing subscriber
//! - Register the built-in module types
//! - Load every interaction from the definitions file
//! - Log telemetry as it flows
//! - Shut every module down on SIGINT
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;
mod interactions;

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing_subscriber::EnvFilter;

use interlink_app::registry::ModuleRegistry;
use interlink_app::runtime::Runtime;
use interlink_app::telemetry_bus::TelemetryBus;
use interlink_domain::telemetry::Telemetry;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Modules
    let mut registry = ModuleRegistry::new().with_lifecycle_timeout(config.lifecycle_timeout());
    interlink_adapter_modules::register_builtin(&mut registry);

    // Telemetry
    let bus = TelemetryBus::new(config.runtime.telemetry_capacity);
    let logger = tokio::spawn(log_telemetry(bus.subscribe()));

    // Runtime
    let runtime = Runtime::new(registry, Arc::new(bus));
    for interaction in interactions::read(&config.interactions.path)? {
        match runtime.load(&interaction).await {
            Ok(loaded) => tracing::info!(
                interaction_id = %loaded.id(),
                name = loaded.name(),
                modules = loaded.module_ids().len(),
                "interaction loaded"
            ),
            Err(err) => tracing::error!(
                interaction_id = %interaction.id,
                name = %interaction.name,
                %err,
                "failed to load interaction"
            ),
        }
    }

    tracing::info!("interlinkd running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down");
    runtime.shutdown().await;
    logger.abort();
    Ok(())
}

async fn log_telemetry(rx: broadcast::Receiver<Telemetry>) {
    let mut stream = BroadcastStream::new(rx);
    while let Some(item) = stream.next().await {
        match item {
            Ok(telemetry) => {
                tracing::debug!(module_id = %telemetry.module_id(), ?telemetry, "telemetry");
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "telemetry logger lagged, some events were dropped");
            }
        }
    }
}
