pub mod api;
pub mod converter;
pub mod core;
pub mod providers;

use crate::api::AppState;
use crate::core::config::AppConfig;
use crate::providers::BinanceRateSource;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

pub enum AppCommand {
    Serve { listen: Option<SocketAddr> },
    Convert { from: String, to: String, quantity: f64 },
    Rate { from: String, to: String },
    Currencies,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("btcfx starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let source = Arc::new(BinanceRateSource::from_config(&config));
    let state = AppState::from_config(&config, source.clone());

    let result = execute(command, state, &config).await;

    // The pool is released on every exit path, including errors.
    source.close().await;
    result
}

async fn execute(command: AppCommand, state: AppState, config: &AppConfig) -> Result<()> {
    match command {
        AppCommand::Serve { listen } => {
            let addr = listen.unwrap_or(config.server.listen_addr);
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;
            serve(listener, state, shutdown_signal()).await
        }
        AppCommand::Convert { from, to, quantity } => {
            let to = to.to_uppercase();
            let converted = state
                .converter
                .convert(&from.to_uppercase(), &to, quantity)
                .await?;
            println!("{converted:.2} {to}");
            Ok(())
        }
        AppCommand::Rate { from, to } => {
            let (from, to) = (from.to_uppercase(), to.to_uppercase());
            let rate = state.converter.get_exchange_rate(&from, &to).await?;
            println!("1 {from} = {rate:.6} {to}");
            Ok(())
        }
        AppCommand::Currencies => {
            for code in state.converter.supported_currencies().await {
                println!("{code}");
            }
            Ok(())
        }
    }
}

/// Serves the HTTP API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Listening on {}", listener.local_addr()?);
    let router = api::app_router(Arc::new(state));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;
    info!("Shutting down currency converter API");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
