use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use ctfhub::{Broadcaster, Hub, HubConfig, NoticeLevel, ScoreNotifier, server};

async fn serve(cfg: HubConfig) -> (Arc<Hub>, SocketAddr) {
    let hub = Hub::builder(cfg).build();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(hub.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (hub, addr)
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out")
            .expect("stream ended")
            .expect("read failed");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_viewer_receives_greeting_and_notifications() {
    let (hub, addr) = serve(HubConfig::default()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["type"], "connected");
    assert_eq!(hub.client_count(), 1);

    let notifier = Broadcaster::new(hub.clone());
    notifier
        .notify_notification("round two starts now", NoticeLevel::Info)
        .await;
    let note = next_json(&mut ws).await;
    assert_eq!(note["type"], "notification");
    assert_eq!(note["payload"]["message"], "round two starts now");
    assert_eq!(note["payload"]["level"], "info");

    notifier.notify_solve("team-7", "heap-1", 250, false).await;
    let solve = next_json(&mut ws).await;
    assert_eq!(solve["type"], "scoreboard_update");
    assert_eq!(solve["payload"]["type"], "solve");
    assert_eq!(solve["payload"]["team_id"], "team-7");
    assert_eq!(solve["payload"]["points"], 250);

    let report = hub.shutdown().await;
    assert_eq!(report.closed, 1);

    // The server closes the socket on shutdown.
    let rest = timeout(Duration::from_secs(5), async {
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    })
    .await;
    assert!(rest.is_ok());
}

#[tokio::test]
async fn test_foreign_origin_is_forbidden() {
    let cfg = HubConfig {
        allowed_origins: vec!["https://ctf.test".to_string()],
        ..HubConfig::default()
    };
    let (hub, addr) = serve(cfg).await;

    let mut req = format!("ws://{addr}/ws").into_client_request().unwrap();
    req.headers_mut()
        .insert("Origin", "https://evil.test".parse().unwrap());

    match tokio_tungstenite::connect_async(req).await {
        Err(WsError::Http(resp)) => assert_eq!(resp.status().as_u16(), 403),
        other => panic!("expected 403, handshake succeeded: {}", other.is_ok()),
    }
    assert_eq!(hub.client_count(), 0);

    let mut req = format!("ws://{addr}/ws").into_client_request().unwrap();
    req.headers_mut()
        .insert("Origin", "https://ctf.test".parse().unwrap());
    let (mut ws, _) = tokio_tungstenite::connect_async(req).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "connected");

    hub.shutdown().await;
}

#[tokio::test]
async fn test_zero_message_size_accepts_large_inbound_frames() {
    let cfg = HubConfig {
        max_message_size: 0,
        ..HubConfig::default()
    };
    let (hub, addr) = serve(cfg).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "connected");

    ws.send(WsMessage::text("x".repeat(64 * 1024))).await.unwrap();

    // Inbound text is ignored; the viewer must still be registered afterwards.
    Broadcaster::new(hub.clone())
        .notify_notification("still connected", NoticeLevel::Info)
        .await;
    let note = next_json(&mut ws).await;
    assert_eq!(note["payload"]["message"], "still connected");
    assert_eq!(hub.client_count(), 1);

    hub.shutdown().await;
}
