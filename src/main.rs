//! ctfhub: real-time scoreboard notification server.
//!
//! Serves `GET /ws` and fans hub broadcasts out to every connected viewer.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ctfhub::{Hub, HubStats, LogWriter, Settings, Subscribe, server, wait_for_shutdown_signal};

#[derive(Parser, Debug)]
#[command(name = "ctfhub", version, about = "Real-time scoreboard notification hub")]
struct Cli {
    /// TOML settings file (CTFHUB__* environment variables override it).
    #[arg(short, long, env = "CTFHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides `bind` from settings.
    #[arg(short, long)]
    bind: Option<String>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if let Some(bind) = cli.bind {
        settings.bind = bind;
    }

    let stats = Arc::new(HubStats::new());
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter), stats.clone()];
    let hub = Hub::builder(settings.hub.clone())
        .with_subscribers(subs)
        .build();

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("binding {}", settings.bind))?;
    info!(addr = %settings.bind, "listening");

    // Closing viewers first lets the server drain without waiting on them.
    let stopping = hub.clone();
    let shutdown_signal = async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "failed to install signal handlers");
        }
        info!("shutdown signal received");
        stopping.shutdown().await;
    };

    axum::serve(listener, server::router(hub.clone()))
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("running server")?;

    let report = hub.shutdown().await;
    let totals = stats.snapshot();
    info!(
        closed = report.closed,
        forced = report.forced,
        elapsed_ms = report.elapsed.as_millis() as u64,
        registered = totals.registered,
        overflow_disconnects = totals.overflow_disconnects,
        broadcasts = totals.broadcasts,
        "shutdown complete"
    );
    Ok(())
}
