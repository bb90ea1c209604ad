//! Classify server binary.
//!
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use classify_server::{config::Config, endpoints::router, AppContext};
use env_logger::{Env, TimestampPrecision};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Setup logger
    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level()))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    // Load the model and open the camera before binding, the service is useless without them
    let context = Arc::new(AppContext::from_config(&config)?);

    // Build HTTP server with endpoints
    let app = router(context);

    // Serve HTTP server
    let addr = config.socket_addr();
    log::info!("Listening on http://{}", addr);
    axum::Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
