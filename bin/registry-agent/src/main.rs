use anyhow::Result;
use registry_core::MemoryStore;
use registry_discovery::{RegistryClient, RegistryConfig, TcpTransport};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::fmt::init as tracing_init;

const SERVICE: &str = "chat";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    info!("Starting registry-agent...");

    // Local listener standing in for this process's RPC server; the
    // registration probe dials it before advertising.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local = listener.local_addr()?;
    tokio::spawn(accept_loop(listener));

    let config = RegistryConfig::default();
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(TcpTransport::new(config.dial_timeout));
    let client = Arc::new(RegistryClient::new(store, transport, config));

    client.create_root_nodes(&[SERVICE]).await?;
    client
        .register(SERVICE, &local.ip().to_string(), local.port())
        .await?;
    info!("Registered {} at {}", SERVICE, local);

    // Log the resolved snapshot every time the address set changes.
    let mut updates = client.watch_service(SERVICE).await?;
    let watcher = client.clone();
    tokio::spawn(async move {
        loop {
            match watcher.snapshot(SERVICE).await {
                Ok(snapshot) => match serde_json::to_string(&snapshot) {
                    Ok(json) => info!("Resolved: {}", json),
                    Err(e) => warn!("Snapshot serialization failed: {}", e),
                },
                Err(e) => warn!("Snapshot read failed: {}", e),
            }
            if updates.changed().await.is_err() {
                return;
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, unregistering...");
    client.unregister().await?;
    Ok(())
}

async fn accept_loop(listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((_stream, peer)) => info!("Accepted connection from {}", peer),
            Err(e) => {
                warn!("Accept failed: {}", e);
                return;
            }
        }
    }
}
