//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.
//! Only `AIS_API_KEY` is required. Malformed numbers fall back to their
//! defaults; a malformed bounding box list or an empty message type filter
//! is rejected, since either would produce a useless subscription.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::domain::geo::BoundingBox;
use crate::domain::vessel::POSITION_REPORT;
use crate::infrastructure::aisstream::{ApiKey, DEFAULT_STREAM_URL, SubscriptionRequest};

/// Upstream feed settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// AISStream WebSocket endpoint.
    pub url: String,
    /// Regions to subscribe to.
    pub bounding_boxes: Vec<BoundingBox>,
    /// Message types to subscribe to.
    pub filter_message_types: Vec<String>,
    /// Capacity of the client to relay service event channel.
    pub event_channel_capacity: usize,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            bounding_boxes: vec![BoundingBox::nyc_harbor()],
            filter_message_types: vec![POSITION_REPORT.to_string()],
            event_channel_capacity: 1024,
        }
    }
}

/// Upstream reconnection settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Initial reconnection delay.
    pub delay_initial: Duration,
    /// Maximum reconnection delay.
    pub delay_max: Duration,
    /// Reconnection delay multiplier (1.0 = fixed delay).
    pub multiplier: f64,
    /// Random spread applied to each delay, as a fraction in [0, 1].
    pub jitter: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_secs(3),
            delay_max: Duration::from_secs(3),
            multiplier: 1.0,
            jitter: 0.0,
            max_attempts: 0, // Unlimited
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Address both listeners bind to.
    pub bind_host: IpAddr,
    /// Viewer WebSocket port.
    pub relay_port: u16,
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            relay_port: 8081,
            health_port: 8082,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// AISStream credential.
    pub api_key: ApiKey,
    /// Upstream feed settings.
    pub upstream: UpstreamSettings,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Listener settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create a configuration with defaults for everything but the key.
    #[must_use]
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            api_key,
            upstream: UpstreamSettings::default(),
            reconnect: ReconnectSettings::default(),
            server: ServerSettings::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `AIS_API_KEY` is missing or empty, or if a
    /// structured value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`RelayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvSource(lookup);

        let api_key = env
            .get("AIS_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("AIS_API_KEY".to_string()))?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::EmptyValue("AIS_API_KEY".to_string()));
        }

        let defaults = Self::new(ApiKey::new(api_key));

        let url = env
            .get("AISSTREAM_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.upstream.url);

        let bounding_boxes = match env.get("AIS_BOUNDING_BOXES") {
            Some(raw) => parse_bounding_boxes(&raw)?,
            None => defaults.upstream.bounding_boxes,
        };

        let filter_message_types = match env.get("AIS_FILTER_MESSAGE_TYPES") {
            Some(raw) => parse_message_types(&raw)?,
            None => defaults.upstream.filter_message_types,
        };

        let upstream = UpstreamSettings {
            url,
            bounding_boxes,
            filter_message_types,
            event_channel_capacity: env
                .parse_usize(
                    "RELAY_EVENT_CHANNEL_CAPACITY",
                    defaults.upstream.event_channel_capacity,
                )
                .max(1),
        };

        let delay_initial =
            env.parse_duration_millis("RELAY_RECONNECT_DELAY_MS", defaults.reconnect.delay_initial);
        // The cap never undercuts the initial delay
        let delay_max = env
            .parse_duration_millis("RELAY_RECONNECT_DELAY_MAX_MS", delay_initial)
            .max(delay_initial);

        let reconnect = ReconnectSettings {
            delay_initial,
            delay_max,
            multiplier: env.parse_f64("RELAY_RECONNECT_MULTIPLIER", defaults.reconnect.multiplier),
            jitter: env.parse_fraction("RELAY_RECONNECT_JITTER", defaults.reconnect.jitter),
            max_attempts: env.parse_u32(
                "RELAY_MAX_RECONNECT_ATTEMPTS",
                defaults.reconnect.max_attempts,
            ),
        };

        let bind_host = match env.get("RELAY_BIND_HOST") {
            Some(raw) => raw
                .trim()
                .parse::<IpAddr>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "RELAY_BIND_HOST".to_string(),
                    reason: e.to_string(),
                })?,
            None => defaults.server.bind_host,
        };

        let server = ServerSettings {
            bind_host,
            relay_port: env.parse_u16("RELAY_PORT", defaults.server.relay_port),
            health_port: env.parse_u16("RELAY_HEALTH_PORT", defaults.server.health_port),
        };

        Ok(Self {
            api_key: defaults.api_key,
            upstream,
            reconnect,
            server,
        })
    }

    /// Address of the viewer listener.
    #[must_use]
    pub const fn relay_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind_host, self.server.relay_port)
    }

    /// Address of the health listener, if enabled.
    #[must_use]
    pub const fn health_addr(&self) -> Option<SocketAddr> {
        if self.server.health_port == 0 {
            None
        } else {
            Some(SocketAddr::new(self.server.bind_host, self.server.health_port))
        }
    }

    /// Build the subscription request sent on every upstream connection.
    #[must_use]
    pub fn subscription(&self) -> SubscriptionRequest {
        SubscriptionRequest::position_reports(
            self.api_key.clone(),
            self.upstream.bounding_boxes.clone(),
        )
        .with_message_types(self.upstream.filter_message_types.clone())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Parse failure.
        reason: String,
    },
}

fn parse_bounding_boxes(raw: &str) -> Result<Vec<BoundingBox>, ConfigError> {
    let boxes: Vec<BoundingBox> =
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            key: "AIS_BOUNDING_BOXES".to_string(),
            reason: e.to_string(),
        })?;

    if boxes.is_empty() {
        return Err(ConfigError::EmptyValue("AIS_BOUNDING_BOXES".to_string()));
    }
    Ok(boxes)
}

fn parse_message_types(raw: &str) -> Result<Vec<String>, ConfigError> {
    let types: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect();

    if types.is_empty() {
        return Err(ConfigError::EmptyValue(
            "AIS_FILTER_MESSAGE_TYPES".to_string(),
        ));
    }
    Ok(types)
}

struct EnvSource<F>(F);

impl<F: Fn(&str) -> Option<String>> EnvSource<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse_u16(&self, key: &str, default: u16) -> u16 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn parse_u32(&self, key: &str, default: u32) -> u32 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn parse_usize(&self, key: &str, default: usize) -> usize {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn parse_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .filter(|v: &f64| v.is_finite() && *v >= 1.0)
            .unwrap_or(default)
    }

    fn parse_fraction(&self, key: &str, default: f64) -> f64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .filter(|v: &f64| (0.0..=1.0).contains(v))
            .unwrap_or(default)
    }

    fn parse_duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|&millis| millis > 0)
            .map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;
    use crate::infrastructure::aisstream::{ReconnectConfig, ReconnectPolicy};

    fn config_from(vars: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RelayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn missing_api_key() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "AIS_API_KEY"));
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "whitespace")]
    fn empty_api_key(value: &str) {
        let err = config_from(&[("AIS_API_KEY", value)]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(ref k) if k == "AIS_API_KEY"));
    }

    #[test]
    fn defaults() {
        let config = config_from(&[("AIS_API_KEY", "key")]).unwrap();

        assert_eq!(config.api_key.expose(), "key");
        assert_eq!(config.upstream.url, DEFAULT_STREAM_URL);
        assert_eq!(config.upstream.bounding_boxes, vec![BoundingBox::nyc_harbor()]);
        assert_eq!(config.upstream.filter_message_types, vec!["PositionReport"]);
        assert_eq!(config.upstream.event_channel_capacity, 1024);
        assert_eq!(config.reconnect.delay_initial, Duration::from_secs(3));
        assert_eq!(config.reconnect.delay_max, Duration::from_secs(3));
        assert!((config.reconnect.multiplier - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.reconnect.max_attempts, 0);
        assert_eq!(config.relay_addr(), "0.0.0.0:8081".parse().unwrap());
        assert_eq!(config.health_addr(), Some("0.0.0.0:8082".parse().unwrap()));
    }

    #[test]
    fn overrides() {
        let config = config_from(&[
            ("AIS_API_KEY", "key"),
            ("AISSTREAM_URL", "ws://127.0.0.1:9000"),
            ("AIS_BOUNDING_BOXES", "[[[0, 0], [1, 1]], [[10, 20], [11, 21]]]"),
            ("AIS_FILTER_MESSAGE_TYPES", "PositionReport, ShipStaticData"),
            ("RELAY_BIND_HOST", "127.0.0.1"),
            ("RELAY_PORT", "9001"),
            ("RELAY_HEALTH_PORT", "0"),
            ("RELAY_RECONNECT_DELAY_MS", "250"),
            ("RELAY_RECONNECT_DELAY_MAX_MS", "5000"),
            ("RELAY_RECONNECT_MULTIPLIER", "2.0"),
            ("RELAY_MAX_RECONNECT_ATTEMPTS", "7"),
        ])
        .unwrap();

        assert_eq!(config.upstream.url, "ws://127.0.0.1:9000");
        assert_eq!(config.upstream.bounding_boxes.len(), 2);
        assert_eq!(
            config.upstream.filter_message_types,
            vec!["PositionReport", "ShipStaticData"]
        );
        assert_eq!(config.relay_addr(), "127.0.0.1:9001".parse().unwrap());
        assert_eq!(config.health_addr(), None);
        assert_eq!(config.reconnect.delay_initial, Duration::from_millis(250));
        assert_eq!(config.reconnect.delay_max, Duration::from_secs(5));
        assert!((config.reconnect.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.reconnect.max_attempts, 7);
    }

    #[test_case("RELAY_PORT", "not-a-port" ; "port")]
    #[test_case("RELAY_RECONNECT_DELAY_MS", "-5" ; "negative delay")]
    #[test_case("RELAY_RECONNECT_DELAY_MS", "0" ; "zero delay")]
    #[test_case("RELAY_RECONNECT_JITTER", "1.5" ; "jitter above one")]
    #[test_case("RELAY_RECONNECT_MULTIPLIER", "0.5" ; "shrinking multiplier")]
    fn malformed_numbers_fall_back(key: &str, value: &str) {
        let config = config_from(&[("AIS_API_KEY", "key"), (key, value)]).unwrap();
        assert_eq!(config.server.relay_port, 8081);
        assert_eq!(config.reconnect.delay_initial, Duration::from_secs(3));
        assert!((config.reconnect.multiplier - 1.0).abs() < f64::EPSILON);
        assert!(config.reconnect.jitter.abs() < f64::EPSILON);
    }

    #[test_case(&[("RELAY_RECONNECT_DELAY_MS", "5000")], 5000, 5000 ; "raised delay lifts default cap")]
    #[test_case(&[("RELAY_RECONNECT_DELAY_MS", "500")], 500, 500 ; "lowered delay lowers default cap")]
    #[test_case(&[("RELAY_RECONNECT_DELAY_MS", "5000"), ("RELAY_RECONNECT_DELAY_MAX_MS", "1000")], 5000, 5000 ; "cap below delay is raised")]
    #[test_case(&[("RELAY_RECONNECT_DELAY_MS", "1000"), ("RELAY_RECONNECT_DELAY_MAX_MS", "8000")], 1000, 8000 ; "explicit cap above delay")]
    #[test_case(&[("RELAY_RECONNECT_DELAY_MAX_MS", "0")], 3000, 3000 ; "zero cap")]
    fn reconnect_cap_never_below_delay(vars: &[(&str, &str)], initial_ms: u64, max_ms: u64) {
        let mut all = vec![("AIS_API_KEY", "key")];
        all.extend_from_slice(vars);
        let config = config_from(&all).unwrap();

        assert_eq!(config.reconnect.delay_initial, Duration::from_millis(initial_ms));
        assert_eq!(config.reconnect.delay_max, Duration::from_millis(max_ms));
    }

    #[test]
    fn raised_delay_holds_for_every_retry() {
        let config = config_from(&[
            ("AIS_API_KEY", "key"),
            ("RELAY_RECONNECT_DELAY_MS", "5000"),
        ])
        .unwrap();
        let mut policy = ReconnectPolicy::new(ReconnectConfig::from_settings(&config.reconnect));

        let delays: Vec<_> = (0..3).map(|_| policy.next_delay().unwrap()).collect();
        assert_eq!(delays, vec![Duration::from_millis(5000); 3]);
    }

    #[test]
    fn jitter_setting() {
        let config = config_from(&[("AIS_API_KEY", "key"), ("RELAY_RECONNECT_JITTER", "0.25")])
            .unwrap();
        assert!((config.reconnect.jitter - 0.25).abs() < f64::EPSILON);
        assert!(
            (ReconnectConfig::from_settings(&config.reconnect).jitter_factor - 0.25).abs()
                < f64::EPSILON
        );
    }

    #[test_case("AIS_BOUNDING_BOXES", "not json" ; "boxes not json")]
    #[test_case("AIS_BOUNDING_BOXES", "[[[95, 0], [1, 1]]]" ; "latitude out of range")]
    #[test_case("RELAY_BIND_HOST", "localhost:80" ; "bind host")]
    fn invalid_values(key: &str, value: &str) {
        let err = config_from(&[("AIS_API_KEY", "key"), (key, value)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ref k, .. } if k == key));
    }

    #[test_case("AIS_BOUNDING_BOXES", "[]" ; "no boxes")]
    #[test_case("AIS_FILTER_MESSAGE_TYPES", " , " ; "no message types")]
    fn empty_lists(key: &str, value: &str) {
        let err = config_from(&[("AIS_API_KEY", "key"), (key, value)]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(ref k) if k == key));
    }

    #[test]
    fn subscription_uses_configured_filter() {
        let config = config_from(&[
            ("AIS_API_KEY", "key"),
            ("AIS_FILTER_MESSAGE_TYPES", "ShipStaticData"),
        ])
        .unwrap();

        let request = config.subscription();
        assert_eq!(request.api_key.expose(), "key");
        assert_eq!(request.bounding_boxes, vec![BoundingBox::nyc_harbor()]);
        assert_eq!(request.filter_message_types, vec!["ShipStaticData"]);
    }

    #[test]
    fn api_key_redacted_debug() {
        let config = config_from(&[("AIS_API_KEY", "key123")]).unwrap();
        assert!(!format!("{config:?}").contains("key123"));
    }
}
