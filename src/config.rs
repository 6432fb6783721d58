//! src/config.rs
//!
//! Defines the strongly-typed `Config` struct for all runtime parameters,
//! loaded from files and environment variables via `figment`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Top-level struct holding all application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub broker: BrokerConfig,
    pub window: WindowConfig,
}

/// Settings for the shared relay process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub bind_addr: SocketAddr,
    /// Per-participant delivery queue. A full queue drops the message for that
    /// participant only.
    pub channel_capacity: usize,
}

/// Settings for a single participating window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub broker_url: String,
    /// How long a `Ping` may go unanswered before the session returns to idle.
    /// Zero disables the timeout.
    pub handshake_timeout_ms: u64,
    pub enable_edge_dock: bool,
    pub edge_rect_length: f64,
    pub edge_rect_width: f64,
    pub vertical_bounds: VerticalBounds,
    pub outbox_capacity: usize,
}

/// How the receiving window tests the Y coordinate of an incoming pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalBounds {
    /// `y > top || y < bottom`. Accepts nearly any Y value.
    #[default]
    Permissive,
    /// `top <= y <= bottom`. The peer's Y is window-relative and the bounds
    /// are screen-absolute, so this is only meaningful when every window
    /// shares the same `screen_y`.
    Strict,
}

impl Config {
    /// Loads configuration from `drag-relay.toml` and environment variables.
    /// It uses the `Default` implementation as a base layer.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("drag-relay.toml"))
            .merge(Env::prefixed("DRAG_RELAY_").split("__"))
    }
}

impl WindowConfig {
    pub fn handshake_timeout(&self) -> Option<Duration> {
        (self.handshake_timeout_ms > 0).then(|| Duration::from_millis(self.handshake_timeout_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            window: WindowConfig::default(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 7878),
            channel_capacity: 64,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            broker_url: "ws://127.0.0.1:7878/ws".to_string(),
            handshake_timeout_ms: 1500,
            enable_edge_dock: true,
            edge_rect_length: 100.0,
            edge_rect_width: 10.0,
            vertical_bounds: VerticalBounds::Permissive,
            outbox_capacity: 64,
        }
    }
}
