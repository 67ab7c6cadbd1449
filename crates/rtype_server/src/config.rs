//! # Server Configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! bind_address = "0.0.0.0"
//! tcp_port = 4242
//! udp_port = 4243
//! tick_rate = 64
//! snapshot_rate = 60
//!
//! [compression]
//! enabled = true
//! min_size = 128
//! min_gain = 0.10
//! ```

use std::path::Path;

use rtype_protocol::{CompressionConfig, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use serde::Deserialize;

use crate::error::{ServerError, ServerResult};

/// Compression table of the config file.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionSettings {
    /// Global toggle.
    pub enabled: bool,
    /// Payloads below this size are sent raw.
    pub min_size: usize,
    /// Required reduction for the compressed form to be kept.
    pub min_gain: f32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        let defaults = CompressionConfig::default();
        Self {
            enabled: defaults.enabled,
            min_size: defaults.min_size,
            min_gain: defaults.min_gain,
        }
    }
}

impl From<CompressionSettings> for CompressionConfig {
    fn from(settings: CompressionSettings) -> Self {
        Self {
            enabled: settings.enabled,
            min_size: settings.min_size,
            min_gain: settings.min_gain,
        }
    }
}

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface both sockets bind to.
    pub bind_address: String,
    /// Reliable channel port.
    pub tcp_port: u16,
    /// Unreliable channel port.
    pub udp_port: u16,
    /// Simulation rate in Hz.
    pub tick_rate: u32,
    /// Snapshot broadcasts per second; at most `tick_rate`.
    pub snapshot_rate: u32,
    /// Players per match, reported in ACCEPT.
    pub max_players: u8,
    /// Concurrent connected players.
    pub max_clients: usize,
    /// Default map.
    pub map_id: u16,
    /// Lobby and room countdown length.
    pub countdown_seconds: u8,
    /// Compression thresholds.
    pub compression: CompressionSettings,
    /// Send DELTA_SNAPSHOT between keyframes.
    pub delta_snapshots: bool,
    /// Every n-th snapshot is a full one.
    pub keyframe_interval: u32,
    /// Match length before TIMEOUT.
    pub session_time_limit_seconds: u32,
    /// Admin password hash; admin commands are disabled when absent.
    pub admin_password_hash: Option<String>,
    /// Status log period.
    pub stats_interval_seconds: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            tick_rate: 64,
            snapshot_rate: 60,
            max_players: 4,
            max_clients: 16,
            map_id: 1,
            countdown_seconds: 5,
            compression: CompressionSettings::default(),
            delta_snapshots: true,
            keyframe_interval: 60,
            session_time_limit_seconds: 600,
            admin_password_hash: None,
            stats_interval_seconds: 5,
        }
    }
}

impl ServerConfig {
    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|err| ServerError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| ServerError::InvalidConfig(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Rejects configurations the server cannot run with.
    pub fn validate(&self) -> ServerResult<()> {
        let fail = |msg: String| Err(ServerError::InvalidConfig(msg));

        if self.tick_rate == 0 || self.tick_rate > u32::from(u8::MAX) {
            return fail(format!("tick_rate must be within 1..=255, got {}", self.tick_rate));
        }
        if self.snapshot_rate == 0 || self.snapshot_rate > self.tick_rate {
            return fail(format!(
                "snapshot_rate must be within 1..={}, got {}",
                self.tick_rate, self.snapshot_rate
            ));
        }
        if self.tcp_port == self.udp_port {
            return fail(format!("tcp_port and udp_port are both {}", self.tcp_port));
        }
        if !(1..=4).contains(&self.max_players) {
            return fail(format!("max_players must be within 1..=4, got {}", self.max_players));
        }
        if self.max_clients == 0 {
            return fail("max_clients must be positive".to_string());
        }
        if self.countdown_seconds == 0 {
            return fail("countdown_seconds must be positive".to_string());
        }
        if !(self.compression.min_gain > 0.0 && self.compression.min_gain < 1.0) {
            return fail(format!(
                "compression.min_gain must be within (0, 1), got {}",
                self.compression.min_gain
            ));
        }
        if self.keyframe_interval == 0 {
            return fail("keyframe_interval must be positive".to_string());
        }
        if self.session_time_limit_seconds == 0 {
            return fail("session_time_limit_seconds must be positive".to_string());
        }
        Ok(())
    }

    /// `host:port` of the reliable listener.
    #[must_use]
    pub fn tcp_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.tcp_port)
    }

    /// `host:port` of the unreliable socket.
    #[must_use]
    pub fn udp_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.udp_port)
    }

    /// Countdown length in ticks.
    #[must_use]
    pub fn countdown_ticks(&self) -> u32 {
        u32::from(self.countdown_seconds) * self.tick_rate
    }

    /// Match length limit in ticks.
    #[must_use]
    pub fn session_time_limit_ticks(&self) -> u64 {
        u64::from(self.session_time_limit_seconds) * u64::from(self.tick_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tcp_port, 4242);
        assert_eq!(config.udp_port, 4243);
        assert_eq!(config.countdown_ticks(), 5 * 64);
        assert_eq!(config.tcp_address(), "0.0.0.0:4242");
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(ServerConfig::from_toml_str("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = ServerConfig::from_toml_str(
            r#"
            tcp_port = 5000
            udp_port = 5001
            admin_password_hash = "abc"

            [compression]
            min_size = 256
            "#,
        )
        .unwrap();
        assert_eq!(config.tcp_port, 5000);
        assert_eq!(config.compression.min_size, 256);
        assert!(config.compression.enabled);
        assert_eq!(config.admin_password_hash.as_deref(), Some("abc"));

        let compression: CompressionConfig = config.compression.into();
        assert_eq!(compression.min_size, 256);
    }

    #[test]
    fn test_rejects_invalid() {
        let cases = [
            "tick_rate = 0",
            "snapshot_rate = 100",
            "tcp_port = 4243",
            "max_players = 5",
            "[compression]\nmin_gain = 1.5",
            "unknown_field = 1",
        ];
        for case in cases {
            let err = ServerConfig::from_toml_str(case).unwrap_err();
            assert!(matches!(err, ServerError::InvalidConfig(_)), "{case}");
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServerConfig::load("/nonexistent/rtype.toml").unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfig(_)));
    }
}
