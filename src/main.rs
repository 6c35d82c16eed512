//! Roundabout - Entry Point
//!
//! Discovers the proxy list from the upstream pool manager, runs one
//! verification sweep for a workload file, and reports the passing nodes.

use std::env;
use std::fs;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod fetch;
mod models;
mod pool;

use config::Config;
use models::{FetchMode, FilterWorkload};
use pool::ProxyPool;

#[tokio::main]
async fn main() -> error::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roundabout=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Roundabout");

    let config = Config::from_env()?;
    info!("Configuration loaded");

    let workload_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "workload.json".to_string());
    let workload: FilterWorkload = serde_json::from_str(&fs::read_to_string(&workload_path)?)?;
    info!(
        "Workload '{}' loaded from {} ({} page(s))",
        workload.key,
        workload_path,
        workload.pages.len()
    );

    let pool = Arc::new(ProxyPool::from_upstream(&config).await?);
    info!(
        "Pool ready: {} node(s), load balancer {}",
        pool.node_count(),
        pool.lb_http_url().unwrap_or("unknown")
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut sweep = {
        let pool = pool.clone();
        let workload = workload.clone();
        let workers = config.filter_workers;
        tokio::spawn(async move {
            pool.filter_with_cancel(&workload, workers, FetchMode::HttpOnly, cancel_rx)
                .await
        })
    };

    let outcome = tokio::select! {
        res = &mut sweep => match res {
            Ok(inner) => inner,
            Err(e) => {
                error!("Sweep task failed: {}", e);
                return Ok(());
            }
        },
        _ = shutdown_signal() => {
            info!("Shutdown signal received, cancelling sweep");
            let _ = cancel_tx.send(true);
            // In-flight page checks are allowed to finish.
            let _ = sweep.await;
            return Ok(());
        }
    };

    match outcome {
        Ok(()) => {
            let passing = pool.passing_indices(&workload.key).unwrap_or_default();
            info!(
                "{} node(s) passed workload '{}'",
                passing.len(),
                workload.key
            );
            for index in passing {
                let node = pool.node(index)?;
                info!("  [{}] {} via {}", node.index, node.name, node.http_endpoint);
            }
            Ok(())
        }
        Err(error::PoolError::EmptyFilterResult { key }) => {
            error!("No proxy in the pool satisfies workload '{}'", key);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
