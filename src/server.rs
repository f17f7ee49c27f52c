//! # WebSocket upgrade endpoint.
//!
//! One route, `GET /ws`. The origin policy runs before the upgrade, so a
//! refused request never becomes a client:
//!
//! ```text
//! GET /ws ──► origin allowed? ──no──► 403
//!                  │ yes
//!                  ▼
//!          hub stopping? ──yes──► 503
//!                  │ no
//!                  ▼
//!          upgrade ──fail──► warn!, no client
//!                  │
//!                  ▼
//!          hub.connect(WsConnection)
//! ```
//!
//! ## Origin policy
//! - empty allow-list or one containing `*`: every origin is accepted
//! - requests without an `Origin` header (non-browser clients) are accepted
//! - otherwise the origin must equal an entry, or its host must
//!   (`https://ctf.example.org` matches both `https://ctf.example.org` and
//!   `ctf.example.org`)

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::config::HubConfig;
use crate::core::Hub;
use crate::transport::WsConnection;

/// Router serving `/ws` for `hub`.
pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

async fn ws_handler(
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if !origin_allowed(hub.config(), origin) {
        warn!(origin = origin.unwrap_or_default(), "rejecting websocket origin");
        return StatusCode::FORBIDDEN.into_response();
    }
    if hub.is_stopping() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            warn!(error = %rejection, "websocket handshake failed");
            return rejection.into_response();
        }
    };

    // axum has no "unlimited" value of its own.
    let limit = hub.config().inbound_limit();
    upgrade
        .max_message_size(limit.unwrap_or(usize::MAX))
        .on_failed_upgrade(|err| warn!(error = %err, "websocket upgrade failed"))
        .on_upgrade(move |socket| accept(hub, socket, limit))
}

async fn accept(hub: Arc<Hub>, socket: WebSocket, limit: Option<usize>) {
    match hub.connect(WsConnection::new(socket, limit)).await {
        Ok(id) => debug!(client = %id, "websocket client connected"),
        Err(err) => warn!(error = %err, label = err.as_label(), "websocket client refused"),
    }
}

/// Applies the allow-list in `cfg` to an `Origin` header value.
pub fn origin_allowed(cfg: &HubConfig, origin: Option<&str>) -> bool {
    if cfg.allows_any_origin() {
        return true;
    }
    let Some(origin) = origin else {
        return true;
    };
    let host = origin
        .split_once("://")
        .map_or(origin, |(_, rest)| rest)
        .trim_end_matches('/');

    cfg.allowed_origins
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(origin) || allowed.eq_ignore_ascii_case(host))
}
