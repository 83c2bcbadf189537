//! Runs the chat server, configured from the environment.

#[macro_use]
extern crate tracing;

use std::sync::Arc;

use anyhow::{Context, Result};
use keri_chat_server::{ServerConfig, serve};
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env()?;
    debug!("starting with {config:?}");

    let pipeline = Arc::new(config.build_pipeline());
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    serve(listener, pipeline, async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
        info!("shutting down");
    })
    .await?;

    Ok(())
}
