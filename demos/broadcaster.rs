//! # Example: broadcaster
//!
//! Drives a [`Broadcaster`] against two in-process viewers.
//!
//! Shows how to:
//! - Build a [`Hub`] with the [`LogWriter`] and [`HubStats`] subscribers.
//! - Attach viewers through the channel transport instead of WebSocket.
//! - Report solves, announcements and status changes via [`ScoreNotifier`].
//! - Shut down and read the [`ShutdownReport`](ctfhub::ShutdownReport).
//!
//! ## Flow
//! ```text
//! notify_solve(first_blood) ──► Broadcaster ──► Hub::broadcast_confirmed
//!                                                  ├─► outbox(alice) ──► write pump ──► Peer
//!                                                  └─► outbox(bob)   ──► write pump ──► Peer
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example broadcaster
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use ctfhub::transport::channel::{self, Peer};
use ctfhub::{
    Broadcaster, CompetitionStatus, Hub, HubConfig, HubStats, LogWriter, NoticeLevel,
    ScoreNotifier, Subscribe,
};
use tracing_subscriber::EnvFilter;

fn print_frames(name: &str, peer: &mut Peer) {
    for frame in peer.drain_frames() {
        println!("[{name}] {}", frame.as_str());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let stats = Arc::new(HubStats::new());
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter), stats.clone()];
    let hub = Hub::builder(HubConfig::default())
        .with_subscribers(subs)
        .build();

    let (alice_conn, mut alice) = channel::pair(32);
    let (bob_conn, mut bob) = channel::pair(32);
    hub.connect(alice_conn).await.context("alice refused")?;
    let bob_id = hub.connect(bob_conn).await.context("bob refused")?;

    let notifier = Broadcaster::new(hub.clone());
    notifier.notify_solve("team-rocket", "baby-rsa", 100, true).await;
    notifier
        .notify_notification("hint released for heap-2", NoticeLevel::Info)
        .await;

    // Bob leaves; only alice hears about the freeze.
    hub.unregister(bob_id).await;
    notifier
        .notify_competition_status(CompetitionStatus::new("running", false, true))
        .await;

    let report = hub.shutdown().await;

    // Shutdown waited for the write pumps, so every frame is buffered by now.
    print_frames("alice", &mut alice);
    print_frames("bob", &mut bob);

    println!(
        "closed={} forced={} graceful={} stats={:?}",
        report.closed,
        report.forced,
        report.is_graceful(),
        stats.snapshot()
    );
    Ok(())
}
