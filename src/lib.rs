pub mod cli;
pub mod data;
pub mod ingest;
pub mod server;
pub mod store;
pub mod table;

use std::env;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};

use crate::cli::Cli;
use crate::store::Store;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("loan_dashboard", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub async fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let store = Store::open(&cli.database)
        .with_context(|| format!("Opening store at {}", cli.database.display()))?;
    info!(
        "Store ready with {} collection(s), active: '{}'",
        store.collections().len(),
        store.active()
    );

    let shared = Arc::new(Mutex::new(store));
    let app = server::router(shared, cli.upload_limit_bytes());

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Binding {addr}"))?;
    info!("Listening on http://{addr}");
    axum::serve(listener, app).await.context("Serving HTTP")?;
    Ok(())
}
