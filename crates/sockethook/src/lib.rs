//! Relay that turns inbound webhooks into WebSocket messages.
//!
//! This service:
//! - Accepts webhook deliveries on `/hook/<endpoint>`
//! - Accepts subscriber WebSocket connections on `/socket/<endpoint>`
//! - Pushes every accepted delivery to all live subscribers of its endpoint
//! - Drops subscribers whose connection fails mid-delivery
//!
//! ## Architecture
//!
//! ```text
//! POST /hook/<endpoint>
//!         ↓
//! Envelope (headers, endpoint, data)
//!         ↓
//! Relay::broadcast ── snapshot ──> SubscriptionRegistry (DashMap)
//!         ↓                               ↑
//! WsConnection queues ── prune on failure ┘
//!         ↓
//! WebSocket subscribers  <── GET /socket/<endpoint> (upgrade, admit)
//! ```
//!
//! Delivery is best-effort: at most once per subscriber connected at the
//! time of the broadcast, with no persistence or replay.

pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod relay;
pub mod route;
pub mod server;

pub use config::Config;
pub use connection::WsConnection;
pub use envelope::{Envelope, Payload};
pub use error::{RelayError, Result};
pub use registry::{Subscriber, SubscriberId, SubscriptionRegistry};
pub use relay::Relay;
pub use route::Route;
pub use server::{create_router, AppState};
