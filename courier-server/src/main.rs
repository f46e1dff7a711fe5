//! Courier server: WebSocket relay and HTTP gateway in one process.

mod config;

use std::error::Error;

use courier_gateway::{GatewayState, MemoryStore};
use courier_relay::RelayServer;
use log::info;
use tokio::net::TcpListener;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let dotenv_path = dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Some(path) = dotenv_path {
        info!("Loaded environment from {}", path.display());
    }

    info!("Starting Courier...");
    let config = ServerConfig::from_env()?;

    let store = match &config.user_seed {
        Some(path) => MemoryStore::load_seed(path).await?,
        None => MemoryStore::new(),
    };

    let relay = RelayServer::new(config.relay.clone());
    let gateway_listener = TcpListener::bind(&config.gateway.bind_addr).await?;
    let app = courier_gateway::router(GatewayState::new(store, config.gateway));

    tokio::select! {
        result = relay.run() => result?,
        result = courier_gateway::serve(gateway_listener, app) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
