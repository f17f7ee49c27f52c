use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::timeout;

use ctfhub::transport::channel::{self, Peer};
use ctfhub::transport::Outbound;
use ctfhub::{
    Client, ClientId, CloseReason, Frame, Hub, HubConfig, HubEvent, HubEventKind, RegisterError,
};

fn quiet() -> HubConfig {
    HubConfig {
        greet_on_register: false,
        ping_interval: Duration::ZERO,
        pong_wait: Duration::ZERO,
        grace: Duration::from_secs(2),
        ..HubConfig::default()
    }
}

async fn within<F: Future>(fut: F) -> F::Output {
    timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

async fn join(hub: &Arc<Hub>, buffer: usize) -> (ClientId, Peer) {
    let (conn, peer) = channel::pair(buffer);
    let id = within(hub.connect(conn)).await.unwrap();
    (id, peer)
}

/// Waits for the first event of `kind` about `client`.
async fn wait_for(
    rx: &mut broadcast::Receiver<HubEvent>,
    kind: HubEventKind,
    client: ClientId,
) -> HubEvent {
    within(async {
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == kind && ev.client == Some(client) {
                return ev;
            }
        }
    })
    .await
}

fn drain_events(rx: &mut broadcast::Receiver<HubEvent>) -> Vec<HubEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test]
async fn test_unregistered_client_misses_later_events() {
    let hub = Hub::builder(quiet()).build();
    let (a, mut pa) = join(&hub, 8).await;
    let (b, mut pb) = join(&hub, 8).await;
    let (c, mut pc) = join(&hub, 8).await;

    assert_eq!(within(hub.broadcast_confirmed("e1")).await, Ok(3));
    for peer in [&mut pa, &mut pb, &mut pc] {
        assert_eq!(within(peer.next_frame()).await, Some(Frame::from("e1")));
    }

    hub.unregister(b).await;
    assert_eq!(within(hub.broadcast_confirmed("e2")).await, Ok(2));

    assert_eq!(within(pa.next_frame()).await, Some(Frame::from("e2")));
    assert_eq!(within(pc.next_frame()).await, Some(Frame::from("e2")));
    assert_eq!(within(pb.next_frame()).await, None);
    assert_eq!(pb.close_calls(), 1);

    let mut ids = vec![a, c];
    ids.sort();
    assert_eq!(hub.clients().await, ids);
    assert_eq!(hub.client_count(), 2);

    hub.shutdown().await;
}

#[tokio::test]
async fn test_three_viewers_scoreboard_then_pause() {
    let hub = Hub::builder(quiet()).build();
    let (_, mut pa) = join(&hub, 8).await;
    let (b, mut pb) = join(&hub, 8).await;
    let (_, mut pc) = join(&hub, 8).await;

    within(hub.broadcast_confirmed("solve:chal42")).await.unwrap();
    within(hub.broadcast_confirmed("scoreboard:v7")).await.unwrap();
    for peer in [&mut pa, &mut pb, &mut pc] {
        assert_eq!(within(peer.next_frame()).await, Some(Frame::from("solve:chal42")));
        assert_eq!(within(peer.next_frame()).await, Some(Frame::from("scoreboard:v7")));
    }

    hub.unregister(b).await;
    assert_eq!(within(hub.broadcast_confirmed("paused:true")).await, Ok(2));

    assert_eq!(within(pa.next_frame()).await, Some(Frame::from("paused:true")));
    assert_eq!(within(pc.next_frame()).await, Some(Frame::from("paused:true")));
    assert_eq!(within(pb.next_frame()).await, None);

    hub.shutdown().await;
}

#[tokio::test]
async fn test_broadcasts_arrive_in_order() {
    let hub = Hub::builder(quiet()).build();
    let (_, mut peer) = join(&hub, 128).await;

    for i in 0..100 {
        within(hub.broadcast(format!("m{i}"))).await.unwrap();
    }
    for i in 0..100 {
        let frame = within(peer.next_frame()).await.unwrap();
        assert_eq!(frame.as_str(), format!("m{i}"));
    }

    hub.shutdown().await;
}

#[tokio::test]
async fn test_slow_consumer_is_disconnected_alone() {
    let cfg = HubConfig {
        outbox_capacity: 2,
        ..quiet()
    };
    let hub = Hub::builder(cfg).build();
    let mut events = hub.bus().subscribe();

    let (fast, mut fast_peer) = join(&hub, 16).await;
    // Never read: one buffered write, one blocked write, then the outbox fills.
    let (slow, slow_peer) = join(&hub, 1).await;

    for i in 0..8 {
        let frame = format!("tick-{i}");
        within(hub.broadcast_confirmed(frame.clone())).await.unwrap();
        assert_eq!(within(fast_peer.next_frame()).await, Some(Frame::from(frame)));
    }

    let ev = wait_for(&mut events, HubEventKind::ClientUnregistered, slow).await;
    assert_eq!(ev.close, Some(CloseReason::Overflow));
    within(slow_peer.closed()).await;

    assert_eq!(hub.clients().await, vec![fast]);
    assert_eq!(within(hub.broadcast_confirmed("after")).await, Ok(1));

    hub.shutdown().await;
}

#[tokio::test]
async fn test_connection_failure_unregisters_and_closes_once() {
    let hub = Hub::builder(quiet()).build();
    let mut events = hub.bus().subscribe();
    let (id, peer) = join(&hub, 8).await;

    // Read and write paths fail together.
    peer.break_connection();
    let _ = hub.broadcast_confirmed("doomed").await;

    within(peer.closed()).await;
    hub.shutdown().await;

    let seen = drain_events(&mut events);
    let count = |kind: HubEventKind| {
        seen.iter()
            .filter(|e| e.kind == kind && e.client == Some(id))
            .count()
    };
    assert_eq!(count(HubEventKind::ClientUnregistered), 1);
    assert_eq!(count(HubEventKind::ConnectionClosed), 1);
    assert_eq!(peer.close_calls(), 1);
    assert_eq!(hub.client_count(), 0);
}

#[tokio::test]
async fn test_peer_hang_up_is_peer_closed() {
    let hub = Hub::builder(quiet()).build();
    let mut events = hub.bus().subscribe();
    let (id, mut peer) = join(&hub, 8).await;

    peer.hang_up();

    let ev = wait_for(&mut events, HubEventKind::ClientUnregistered, id).await;
    assert_eq!(ev.close, Some(CloseReason::PeerClosed));
    within(peer.closed()).await;
    assert!(hub.clients().await.is_empty());

    hub.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_every_client() {
    let hub = Hub::builder(quiet()).build();
    let mut peers = Vec::new();
    for _ in 0..5 {
        peers.push(join(&hub, 8).await.1);
    }

    let report = within(hub.shutdown()).await;
    assert_eq!(report.closed, 5);
    assert!(report.is_graceful());
    for peer in &peers {
        assert!(peer.is_closed());
        assert_eq!(peer.close_calls(), 1);
    }
    assert_eq!(hub.client_count(), 0);
    assert!(hub.clients().await.is_empty());

    // Idempotent.
    assert_eq!(hub.shutdown().await, report);
}

#[tokio::test]
async fn test_register_after_shutdown_is_refused() {
    let hub = Hub::builder(quiet()).build();
    hub.shutdown().await;

    let (conn, peer) = channel::pair(4);
    assert_eq!(hub.connect(conn).await, Err(RegisterError::ShuttingDown));
    assert!(peer.is_closed());
    assert_eq!(peer.close_calls(), 1);
    assert!(hub.broadcast("late").await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registration_racing_shutdown_never_leaks() {
    let hub = Hub::builder(quiet()).build();

    let mut joins = Vec::new();
    let mut peers = Vec::new();
    for _ in 0..32 {
        let (conn, peer) = channel::pair(4);
        peers.push(peer);
        let hub = hub.clone();
        joins.push(tokio::spawn(async move { hub.connect(conn).await }));
    }
    let report = within(hub.shutdown()).await;

    let mut accepted = 0;
    for j in joins {
        match within(j).await.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) => assert_eq!(err, RegisterError::ShuttingDown),
        }
    }
    assert!(report.closed <= accepted);
    for peer in &peers {
        within(peer.closed()).await;
        assert_eq!(peer.close_calls(), 1);
    }
    assert_eq!(hub.client_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_and_unregister() {
    let hub = Hub::builder(quiet()).build();

    let mut joins = Vec::new();
    for _ in 0..24 {
        let hub = hub.clone();
        joins.push(tokio::spawn(async move {
            let (conn, peer) = channel::pair(4);
            let id = hub.connect(conn).await.unwrap();
            hub.unregister(id).await;
            hub.unregister(id).await;
            peer.closed().await;
            peer.close_calls()
        }));
    }
    for j in joins {
        assert_eq!(within(j).await.unwrap(), 1);
    }

    assert!(hub.clients().await.is_empty());
    assert_eq!(hub.client_count(), 0);
    hub.shutdown().await;
}

#[tokio::test]
async fn test_abandoned_connect_still_runs_pumps() {
    let hub = Hub::builder(quiet()).build();
    let (conn, mut peer) = channel::pair(4);

    // The caller stops waiting right after the first poll.
    assert!(hub.connect(conn).now_or_never().is_none());

    let id = within(async {
        loop {
            if let Some(id) = hub.clients().await.first().copied() {
                return id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    assert_eq!(within(hub.broadcast_confirmed("still-here")).await, Ok(1));
    assert_eq!(within(peer.next_frame()).await, Some(Frame::from("still-here")));

    hub.unregister(id).await;
    within(peer.closed()).await;
    assert_eq!(peer.close_calls(), 1);

    let report = within(hub.shutdown()).await;
    assert_eq!(report.closed, 0);
    assert_eq!(peer.close_calls(), 1);
}

#[tokio::test]
async fn test_abandoned_register_is_rolled_back() {
    let hub = Hub::builder(quiet()).build();
    let mut events = hub.bus().subscribe();
    let (conn, _peer) = channel::pair(4);
    let client = Client::new(conn, 4);
    let handle = client.handle();

    // Queued, then dropped before the ack arrives.
    assert!(hub.register(client.handle()).now_or_never().is_none());

    assert!(hub.clients().await.is_empty());
    assert_eq!(hub.client_count(), 0);
    assert!(handle.is_closed());

    let ev = wait_for(&mut events, HubEventKind::ClientUnregistered, client.id()).await;
    assert_eq!(ev.close, Some(CloseReason::Requested));

    let report = within(hub.shutdown()).await;
    assert_eq!(report.closed, 0);
}

#[tokio::test]
async fn test_duplicate_id_is_rejected() {
    let hub = Hub::builder(quiet()).build();
    let id = ClientId::from_raw(900_001);
    let (c1, _p1) = channel::pair(4);
    let (c2, _p2) = channel::pair(4);
    let first = Client::with_id(id, c1, 4);
    let second = Client::with_id(id, c2, 4);

    assert_eq!(hub.register(first.handle()).await, Ok(()));
    assert_eq!(
        hub.register(second.handle()).await,
        Err(RegisterError::Duplicate { id })
    );
    assert_eq!(hub.clients().await, vec![id]);

    hub.shutdown().await;
}

#[tokio::test]
async fn test_greeting_is_sent_first() {
    let hub = Hub::builder(HubConfig {
        greet_on_register: true,
        ..quiet()
    })
    .build();
    let (_, mut peer) = join(&hub, 8).await;
    hub.broadcast_confirmed("next").await.unwrap();

    let hello = within(peer.next_frame()).await.unwrap();
    let v: Value = serde_json::from_str(hello.as_str()).unwrap();
    assert_eq!(v["type"], "connected");
    assert!(v["payload"].is_null());
    assert!(v["timestamp"].is_string());
    assert_eq!(within(peer.next_frame()).await, Some(Frame::from("next")));

    hub.shutdown().await;
}

#[tokio::test]
async fn test_pings_and_read_deadline() {
    let hub = Hub::builder(HubConfig {
        ping_interval: Duration::from_millis(20),
        pong_wait: Duration::from_millis(150),
        ..quiet()
    })
    .build();
    let mut events = hub.bus().subscribe();
    let (id, mut peer) = join(&hub, 64).await;

    assert_eq!(within(peer.recv()).await, Some(Outbound::Ping));

    // The peer never answers, so the read deadline expires.
    let ev = wait_for(&mut events, HubEventKind::ClientUnregistered, id).await;
    assert_eq!(ev.close, Some(CloseReason::ReadFailed));
    within(peer.closed()).await;

    hub.shutdown().await;
}

#[tokio::test]
async fn test_write_deadline_drops_client() {
    let hub = Hub::builder(HubConfig {
        write_timeout: Duration::from_millis(50),
        ..quiet()
    })
    .build();
    let mut events = hub.bus().subscribe();
    let (id, peer) = join(&hub, 8).await;

    peer.stall_writes(true);
    hub.broadcast_confirmed("stuck").await.unwrap();

    let ev = wait_for(&mut events, HubEventKind::ClientUnregistered, id).await;
    assert_eq!(ev.close, Some(CloseReason::WriteFailed));
    let closed = wait_for(&mut events, HubEventKind::ConnectionClosed, id).await;
    assert!(closed.reason.is_some());
    assert_eq!(peer.close_calls(), 1);

    hub.shutdown().await;
}

#[tokio::test]
async fn test_grace_exceeded_forces_close() {
    let hub = Hub::builder(HubConfig {
        grace: Duration::from_millis(100),
        write_timeout: Duration::ZERO,
        ..quiet()
    })
    .build();
    let mut events = hub.bus().subscribe();
    let (_, peer) = join(&hub, 8).await;
    peer.stall_writes(true);

    let report = within(hub.shutdown()).await;
    assert_eq!(report.closed, 1);
    assert_eq!(report.forced, 1);
    assert!(!report.is_graceful());
    assert_eq!(peer.close_calls(), 1);

    let kinds: Vec<HubEventKind> = drain_events(&mut events).into_iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&HubEventKind::GraceExceeded));
    assert!(!kinds.contains(&HubEventKind::AllClosedWithin));
}

#[tokio::test]
async fn test_full_broadcast_queue_is_reported() {
    let hub = Hub::builder(HubConfig {
        broadcast_capacity: 1,
        ..quiet()
    })
    .build();

    // The loop cannot run between these calls on a current-thread runtime.
    let first = hub.try_broadcast("a");
    let second = hub.try_broadcast("b");
    assert!(first.is_ok());
    assert_eq!(second, Err(ctfhub::PublishError::Full));

    hub.shutdown().await;
}
