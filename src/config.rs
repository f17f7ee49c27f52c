//! # Hub runtime configuration.
//!
//! Provides [`HubConfig`], the centralized settings for the hub, its clients
//! and the event source adapter, plus [`Settings`] for the binary.
//!
//! ## Sentinel values
//! - `ping_interval = 0s` → no keepalive pings
//! - `pong_wait = 0s` → no read deadline (a silent peer is never timed out)
//! - `write_timeout = 0s` → writes are unbounded
//! - `grace = 0s` → shutdown does not wait; remaining pumps are forced at once
//! - `max_message_size = 0` → inbound frames have no size limit
//!
//! ## Loading
//! [`Settings::load`] layers an optional TOML file under `CTFHUB__*`
//! environment variables (`__` separates nesting levels):
//! ```text
//! CTFHUB__BIND=0.0.0.0:8080
//! CTFHUB__HUB__OUTBOX_CAPACITY=64
//! CTFHUB__HUB__ALLOWED_ORIGINS=https://ctf.example.org,https://admin.example.org
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for the hub runtime.
///
/// ## Field semantics
/// - `grace`: Maximum wait for client pumps to exit on shutdown
/// - `control_capacity`: Register/unregister queue size (min 1)
/// - `broadcast_capacity`: Broadcast queue size (min 1)
/// - `outbox_capacity`: Per-client outbox size (min 1); overflow disconnects the client
/// - `bus_capacity`: Lifecycle event bus ring buffer size (min 1)
/// - `write_timeout`: Deadline for one outbound write
/// - `ping_interval`: Keepalive ping period
/// - `pong_wait`: Longest tolerated read silence
/// - `max_message_size`: Largest accepted inbound frame, in bytes
/// - `enqueue_timeout`: How long a publisher waits for room in the broadcast queue
/// - `delivery_timeout`: How long a publisher waits for fan-out confirmation
/// - `greet_on_register`: Enqueue a `connected` frame for each new client
/// - `allowed_origins`: Origins accepted by the upgrade endpoint (empty or `*` = any)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    #[serde(rename = "grace_ms", with = "millis")]
    pub grace: Duration,

    pub control_capacity: usize,
    pub broadcast_capacity: usize,
    pub outbox_capacity: usize,
    pub bus_capacity: usize,

    #[serde(rename = "write_timeout_ms", with = "millis")]
    pub write_timeout: Duration,

    #[serde(rename = "ping_interval_ms", with = "millis")]
    pub ping_interval: Duration,

    #[serde(rename = "pong_wait_ms", with = "millis")]
    pub pong_wait: Duration,

    pub max_message_size: usize,

    #[serde(rename = "enqueue_timeout_ms", with = "millis")]
    pub enqueue_timeout: Duration,

    #[serde(rename = "delivery_timeout_ms", with = "millis")]
    pub delivery_timeout: Duration,

    pub greet_on_register: bool,
    pub allowed_origins: Vec<String>,
}

impl HubConfig {
    /// Keepalive period, `None` when disabled.
    #[inline]
    pub fn ping_every(&self) -> Option<Duration> {
        non_zero(self.ping_interval)
    }

    /// Read deadline, `None` when disabled.
    #[inline]
    pub fn read_deadline(&self) -> Option<Duration> {
        non_zero(self.pong_wait)
    }

    /// Write deadline, `None` when disabled.
    #[inline]
    pub fn write_deadline(&self) -> Option<Duration> {
        non_zero(self.write_timeout)
    }

    /// Inbound frame size limit in bytes, `None` when unlimited.
    #[inline]
    pub fn inbound_limit(&self) -> Option<usize> {
        (self.max_message_size > 0).then_some(self.max_message_size)
    }

    #[inline]
    pub fn control_capacity_clamped(&self) -> usize {
        self.control_capacity.max(1)
    }

    #[inline]
    pub fn broadcast_capacity_clamped(&self) -> usize {
        self.broadcast_capacity.max(1)
    }

    #[inline]
    pub fn outbox_capacity_clamped(&self) -> usize {
        self.outbox_capacity.max(1)
    }

    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns true if every origin is accepted.
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }
}

impl Default for HubConfig {
    /// Default configuration:
    ///
    /// - `grace = 10s`
    /// - `control_capacity = 64`, `broadcast_capacity = 256`, `outbox_capacity = 256`
    /// - `bus_capacity = 1024`
    /// - `write_timeout = 10s`, `ping_interval = 54s`, `pong_wait = 60s`
    /// - `max_message_size = 512`
    /// - `enqueue_timeout = 100ms`, `delivery_timeout = 5s`
    /// - `greet_on_register = true`, `allowed_origins = []` (any)
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
            control_capacity: 64,
            broadcast_capacity: 256,
            outbox_capacity: 256,
            bus_capacity: 1024,
            write_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            max_message_size: 512,
            enqueue_timeout: Duration::from_millis(100),
            delivery_timeout: Duration::from_secs(5),
            greet_on_register: true,
            allowed_origins: Vec::new(),
        }
    }
}

/// Settings for the `ctfhub` binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Socket address the upgrade endpoint listens on.
    pub bind: String,
    /// Hub runtime settings.
    pub hub: HubConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            hub: HubConfig::default(),
        }
    }
}

impl Settings {
    /// Loads settings from an optional TOML file, then `CTFHUB__*` env vars.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let cfg = builder
            .add_source(
                config::Environment::with_prefix("CTFHUB")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("hub.allowed_origins")
                    .try_parsing(true),
            )
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    if d == Duration::ZERO { None } else { Some(d) }
}

/// Durations as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_durations_disable_deadlines() {
        let cfg = HubConfig {
            ping_interval: Duration::ZERO,
            pong_wait: Duration::ZERO,
            write_timeout: Duration::ZERO,
            ..HubConfig::default()
        };
        assert_eq!(cfg.ping_every(), None);
        assert_eq!(cfg.read_deadline(), None);
        assert_eq!(cfg.write_deadline(), None);

        let cfg = HubConfig::default();
        assert_eq!(cfg.ping_every(), Some(Duration::from_secs(54)));
        assert_eq!(cfg.read_deadline(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_message_size_is_unlimited() {
        let cfg = HubConfig {
            max_message_size: 0,
            ..HubConfig::default()
        };
        assert_eq!(cfg.inbound_limit(), None);
        assert_eq!(HubConfig::default().inbound_limit(), Some(512));
    }

    #[test]
    fn test_capacities_are_clamped() {
        let cfg = HubConfig {
            control_capacity: 0,
            broadcast_capacity: 0,
            outbox_capacity: 0,
            bus_capacity: 0,
            ..HubConfig::default()
        };
        assert_eq!(cfg.control_capacity_clamped(), 1);
        assert_eq!(cfg.broadcast_capacity_clamped(), 1);
        assert_eq!(cfg.outbox_capacity_clamped(), 1);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }

    #[test]
    fn test_origin_wildcard() {
        let mut cfg = HubConfig::default();
        assert!(cfg.allows_any_origin());

        cfg.allowed_origins = vec!["https://ctf.example.org".into()];
        assert!(!cfg.allows_any_origin());

        cfg.allowed_origins.push("*".into());
        assert!(cfg.allows_any_origin());
    }

    #[test]
    fn test_settings_deserialize_millis() {
        let raw = r#"{"bind":"0.0.0.0:9000","hub":{"grace_ms":2500,"outbox_capacity":8}}"#;
        let s: Settings = serde_json::from_str(raw).unwrap();
        assert_eq!(s.bind, "0.0.0.0:9000");
        assert_eq!(s.hub.grace, Duration::from_millis(2500));
        assert_eq!(s.hub.outbox_capacity, 8);
        assert_eq!(s.hub.broadcast_capacity, 256);
    }
}
