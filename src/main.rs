mod cleanup;
mod config;
mod coordinator;
mod engine;
mod error;
mod hierarchy;
mod host;
mod library;
mod macros;
mod parser;
mod scheduler;
mod triggers;

use crate::config::Configuration;
use crate::coordinator::CoordinatorBuilder;
use crate::error::MacroError;
use crate::host::SimulatedHost;
use std::sync::Arc;
use tracing::{info, Level};

fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}

#[tokio::main]
async fn main() -> Result<(), MacroError> {
    init_logging();
    let configuration = Configuration::load()
        .map_err(|e| MacroError::Setup(format!("Failed to load configuration: {}", e)))?;
    let mut coordinator = CoordinatorBuilder::new(configuration)
        .host(Arc::new(SimulatedHost::new()))
        .build()?;
    info!("Macro scheduler ready, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| MacroError::Setup(format!("Failed to wait for shutdown: {}", e)))?;
    coordinator.stop().await;
    Ok(())
}
