use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quadgate::config::Settings;
use quadgate::dispatch::{Dispatcher, Services};
use quadgate::engine::UnavailableEngine;
use quadgate::memory::MemoryStore;
use quadgate::registry::{Dataset, DatasetRegistry};
use quadgate::server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    let address = settings.bind_address();

    // An in-memory dataset at /ds with the usual endpoints.
    let dataset = Dataset::new("/ds", Arc::new(MemoryStore::new())).with_standard_endpoints();
    let datasets = DatasetRegistry::new().with_dataset(dataset);
    let services = Services::new(settings, datasets, Arc::new(UnavailableEngine));
    let dispatcher = Arc::new(Dispatcher::new(services));

    let listener = TcpListener::bind(&address).await?;
    info!(%address, "quadgate listening");
    axum::serve(listener, server::router(dispatcher)).await?;
    Ok(())
}
