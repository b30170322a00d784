//! WebSocket transport adapter.
//!
//! Each subscriber socket gets a bounded outbound queue drained by its own
//! writer task, so a broadcast only ever does a non-blocking `try_send`. A
//! slow or dead peer shows up as a failed send and gets pruned instead of
//! stalling the other subscribers.

use crate::error::{RelayError, Result};
use crate::registry::{Subscriber, SubscriberId};
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::SinkExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

/// Outbound queue depth per subscriber.
pub const CLIENT_CHANNEL_BUFFER_SIZE: usize = 1000;

/// Upper bound on a single socket write before the peer is considered hung.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Broadcast-facing half of a subscriber socket.
pub struct WsConnection {
    id: SubscriberId,
    endpoint: String,
    tx: mpsc::Sender<Message>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl WsConnection {
    /// Create a connection with a bounded outbound channel.
    ///
    /// The receiver must be handed to [`spawn_writer`].
    pub fn new(endpoint: impl Into<String>) -> (Arc<Self>, mpsc::Receiver<Message>) {
        Self::with_capacity(endpoint, CLIENT_CHANNEL_BUFFER_SIZE)
    }

    /// Create a connection with a custom queue depth.
    pub fn with_capacity(
        endpoint: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Arc::new(Self {
            id: SubscriberId::new(),
            endpoint: endpoint.into(),
            tx,
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        });
        (conn, rx)
    }

    /// Endpoint this connection is subscribed to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Queue a keepalive ping behind any pending frames.
    pub fn ping(&self) -> Result<()> {
        if self.is_closed() {
            return Err(RelayError::ConnectionClosed);
        }
        self.tx.try_send(Message::Ping(Bytes::new()))?;
        Ok(())
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once `close` has been called.
    pub async fn closed(&self) {
        let notified = self.shutdown.notified();
        if self.is_closed() {
            return;
        }
        notified.await;
    }
}

impl Subscriber for WsConnection {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn send(&self, frame: &Utf8Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(RelayError::ConnectionClosed);
        }
        self.tx.try_send(Message::Text(frame.clone()))?;
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(subscriber = %self.id, endpoint = %self.endpoint, "closing subscriber");
            self.shutdown.notify_waiters();
        }
    }
}

/// Spawn the task that drains a connection's queue into its socket.
///
/// The task exits when the connection is closed (after sending a close
/// frame), when every sender is gone, or when a write fails or exceeds
/// [`SEND_TIMEOUT`]. Once it has exited, further sends fail.
pub fn spawn_writer(
    conn: Arc<WsConnection>,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = conn.closed() => {
                    let _ = tokio::time::timeout(SEND_TIMEOUT, ws_tx.send(Message::Close(None))).await;
                    break;
                }

                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    match tokio::time::timeout(SEND_TIMEOUT, ws_tx.send(msg)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!(subscriber = %conn.id, error = %e, "socket write failed");
                            break;
                        }
                        Err(_) => {
                            debug!(subscriber = %conn.id, "socket write timed out");
                            break;
                        }
                    }
                }
            }
        }

        // Dropping the receiver makes every later `send` fail with `Closed`.
        rx.close();
        let _ = ws_tx.close().await;
    })
}
