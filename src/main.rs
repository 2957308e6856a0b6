use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::http::HttpServer;
use turnstile::ratelimit::{InMemoryCounterStore, RateLimiter, SweepWorker, SystemClock};

/// Per-client HTTP admission control
#[derive(Parser, Debug)]
#[command(name = "turnstile", version)]
struct Args {
    /// Configuration file (YAML); TURNSTILE__* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configured one
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Turnstile admission control");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    let limits = &config.rate_limiting;
    info!(
        listen_addr = %config.server.listen_addr,
        enabled = limits.enabled,
        default_window_ms = limits.default_policy.window_ms,
        default_limit = limits.default_policy.max_requests,
        endpoint_policies = limits.endpoints.len(),
        "Configuration loaded"
    );

    // One store for the process lifetime, shared by the limiter and the sweeper
    let clock = Arc::new(SystemClock::new());
    let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
    let (sweeps, worker) = SweepWorker::new(store.clone());
    let sweeper = match limits.sweep_interval() {
        Some(interval) => {
            let max_age_ms = limits.policy_set().max_window_ms().saturating_mul(2);
            worker.spawn_with_interval(interval, max_age_ms)
        }
        None => worker.spawn(),
    };

    let rate_limiter = Arc::new(RateLimiter::with_store(limits, store, sweeps, clock));
    info!("Rate limiter initialized");

    let server = HttpServer::new(config.server.listen_addr, rate_limiter);
    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.abort();

    info!("Turnstile stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
