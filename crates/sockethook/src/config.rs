//! Process configuration from command-line flags or environment.

use clap::Parser;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 1234;

/// Webhook to WebSocket relay.
#[derive(Debug, Clone, Parser)]
#[command(name = "sockethook", version, about)]
pub struct Config {
    /// Address to bind to. Empty means all interfaces.
    #[arg(long, env = "SOCKETHOOK_ADDRESS", default_value = "")]
    pub address: String,

    /// Port to bind to.
    #[arg(long, env = "SOCKETHOOK_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Serve Prometheus metrics on this port. Disabled when unset.
    #[arg(long, env = "SOCKETHOOK_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl Config {
    /// `host:port` string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        let host = self.address.trim();
        if host.is_empty() {
            format!("0.0.0.0:{}", self.port)
        } else if host.contains(':') && !host.starts_with('[') {
            // Bare IPv6 literal
            format!("[{}]:{}", host, self.port)
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: DEFAULT_PORT,
            metrics_port: None,
        }
    }
}
