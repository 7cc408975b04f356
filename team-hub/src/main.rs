use anyhow::Result;
use axum::{routing::get, Router};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use team_hub::api;
use team_hub_core::storage::Store;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "team-hub")]
#[command(about = "HR team dashboard backend")]
struct Cli {
    /// Listen address
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    addr: String,

    /// Path to the JSON database file
    #[arg(short, long, default_value = "data/db.json")]
    db: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let store = Arc::new(RwLock::new(Store::open(&cli.db)?));

    let app = Router::new()
        .merge(api::router(store))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(&cli.addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
