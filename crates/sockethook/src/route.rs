//! Request path resolution.
//!
//! Paths are resolved by prefix:
//! - `/hook<endpoint>` delivers a webhook to every subscriber of `<endpoint>`
//! - `/socket<endpoint>` opens a subscriber connection for `<endpoint>`
//!
//! Trailing slashes are stripped from the whole path before the prefix is
//! tested, so `/hook/order/created/` and `/socket/order/created` both resolve
//! to the endpoint `/order/created`.
//!
//! The path is percent-decoded first, so `/hook/a%20b` is the endpoint `/a b`.

use percent_encoding::percent_decode_str;

/// Path prefix for webhook deliveries.
pub const HOOK_PREFIX: &str = "/hook";

/// Path prefix for subscriber sockets.
pub const SOCKET_PREFIX: &str = "/socket";

/// Where an inbound request should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Broadcast the request to the named endpoint.
    Hook(String),
    /// Upgrade the request and subscribe it to the named endpoint.
    Socket(String),
    /// Neither prefix matched.
    NotFound,
}

impl Route {
    /// Resolve a raw (possibly percent-encoded) request path into a route.
    pub fn resolve(path: &str) -> Self {
        let decoded = percent_decode_str(path).decode_utf8_lossy();
        let path = decoded.trim_end_matches('/');

        if let Some(endpoint) = path.strip_prefix(HOOK_PREFIX) {
            Route::Hook(endpoint.to_string())
        } else if let Some(endpoint) = path.strip_prefix(SOCKET_PREFIX) {
            Route::Socket(endpoint.to_string())
        } else {
            Route::NotFound
        }
    }
}
