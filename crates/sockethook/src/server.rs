//! HTTP / WebSocket server using Axum.
//!
//! Routing is by path prefix rather than by pattern, so every request goes
//! through a single fallback handler that resolves a [`Route`].

use crate::connection::{spawn_writer, WsConnection};
use crate::envelope::Envelope;
use crate::error::RelayError;
use crate::registry::{Subscriber, SubscriptionRegistry};
use crate::relay::Relay;
use crate::route::Route;
use axum::{
    body::{self, Body},
    extract::{
        ws::{Message, WebSocket},
        FromRequestParts, Request, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Largest hook body that will be read.
pub const MAX_HOOK_BODY_BYTES: usize = 16 * 1024 * 1024;

/// How often idle subscribers are pinged.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Silence after which a subscriber is treated as gone.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared application state.
pub struct AppState {
    pub relay: Relay,
    /// Keepalive ping period for subscriber sockets. Must be non-zero.
    pub ping_interval: Duration,
    /// A subscriber that sends nothing (not even a pong) for this long is dropped.
    pub pong_timeout: Duration,
}

impl AppState {
    /// State over a fresh, empty registry.
    pub fn new() -> Self {
        Self {
            relay: Relay::new(Arc::new(SubscriptionRegistry::new())),
            ping_interval: PING_INTERVAL,
            pong_timeout: PONG_TIMEOUT,
        }
    }

    /// Override the subscriber keepalive timings.
    pub fn with_keepalive(mut self, ping_interval: Duration, pong_timeout: Duration) -> Self {
        self.ping_interval = ping_interval;
        self.pong_timeout = pong_timeout;
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Resolve the request path and hand off to the matching handler.
async fn dispatch(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let route = Route::resolve(req.uri().path());
    match route {
        Route::Hook(endpoint) => hook_handler(state, endpoint, req).await.into_response(),
        Route::Socket(endpoint) => socket_handler(state, endpoint, req).await,
        Route::NotFound => {
            warn!(path = %req.uri().path(), "404 not found");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Build an envelope from the request and broadcast it.
///
/// Succeeds regardless of how many subscribers received the message.
async fn hook_handler(
    state: Arc<AppState>,
    endpoint: String,
    req: Request,
) -> Result<StatusCode, RelayError> {
    let (parts, body) = req.into_parts();

    let body = body::to_bytes(body, MAX_HOOK_BODY_BYTES).await.map_err(|e| {
        warn!(endpoint = %endpoint, error = %e, "failed to read hook body");
        RelayError::Body(e.to_string())
    })?;

    let envelope = Envelope::from_request(endpoint, &parts.headers, body);
    state.relay.broadcast(&envelope);

    Ok(StatusCode::OK)
}

/// Upgrade the request and subscribe the socket to `endpoint`.
async fn socket_handler(state: Arc<AppState>, endpoint: String, req: Request) -> Response {
    let (mut parts, _body) = req.into_parts();

    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(endpoint = %endpoint, error = %rejection, "websocket upgrade failed");
            return (StatusCode::UPGRADE_REQUIRED, Body::empty()).into_response();
        }
    };

    let failed_endpoint = endpoint.clone();
    ws.on_failed_upgrade(move |e| {
        warn!(endpoint = %failed_endpoint, error = %e, "websocket handshake failed");
    })
    .on_upgrade(move |socket| handle_socket(socket, endpoint, state))
}

/// Handle a subscriber connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, endpoint: String, state: Arc<AppState>) {
    let (ws_tx, mut ws_rx) = socket.split();

    let (conn, rx) = WsConnection::new(endpoint);
    let mut writer = spawn_writer(conn.clone(), ws_tx, rx);
    let mut writer_done = false;

    state.relay.admit(conn.endpoint(), conn.clone());

    let mut ping_interval = interval(state.ping_interval);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ping_interval.reset(); // Don't fire immediately
    let mut last_seen = Instant::now();

    // Subscribers only listen; inbound frames are drained to notice closes.
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(frame))) => {
                        debug!(endpoint = %conn.endpoint(), ?frame, "subscriber sent close");
                        break;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(_)) => {
                        last_seen = Instant::now();
                        debug!(endpoint = %conn.endpoint(), "ignoring inbound frame from subscriber");
                    }
                    Some(Err(e)) => {
                        debug!(endpoint = %conn.endpoint(), error = %e, "subscriber socket error");
                        break;
                    }
                    None => break,
                }
            }

            _ = ping_interval.tick() => {
                if last_seen.elapsed() > state.pong_timeout {
                    info!(endpoint = %conn.endpoint(), "subscriber unresponsive, disconnecting");
                    break;
                }
                if let Err(e) = conn.ping() {
                    debug!(endpoint = %conn.endpoint(), error = %e, "failed to queue ping");
                    break;
                }
            }

            _ = &mut writer => {
                // Closed by a broadcast, or the socket stopped accepting writes.
                writer_done = true;
                break;
            }
        }
    }

    // Cleanup
    state.relay.release(conn.endpoint(), conn.as_ref());
    conn.close();
    if !writer_done {
        let _ = writer.await;
    }

    info!(endpoint = %conn.endpoint(), "subscriber connection finished");
}
