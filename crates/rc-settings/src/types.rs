//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every section is `#[serde(default)]`,
//! so a settings file only needs the values it changes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// HTTP/WebSocket listener.
    pub server: ServerSettings,
    /// Engine execution context.
    pub engine: EngineSettings,
    /// Preset storage.
    pub presets: PresetSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Network listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// WebSocket upgrades beyond this count are refused.
    pub max_connections: usize,
    /// Ping interval.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a client silent for this long.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
    /// Per-session outbound queue bound.
    pub outbound_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 30010,
            max_connections: 64,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 16 * 1024 * 1024,
            outbound_queue_capacity: 256,
        }
    }
}

/// Engine execution context settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Time allowed for a marshaled job before the caller gets `TIMEOUT`.
    pub request_timeout_ms: u64,
    /// Simulation tick period on the engine thread.
    pub tick_interval_ms: u64,
    /// How often throttled subscriptions are flushed.
    pub throttle_flush_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            tick_interval_ms: 16,
            throttle_flush_interval_ms: 10,
        }
    }
}

impl EngineSettings {
    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Tick period as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Throttle flush period as a [`Duration`].
    pub fn throttle_flush_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_flush_interval_ms.max(1))
    }
}

/// Preset storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresetSettings {
    /// Preset directory. Relative paths are under `~/.rc-bridge`.
    pub directory: String,
    /// Write each preset to disk after every edit.
    pub autosave: bool,
}

impl Default for PresetSettings {
    fn default() -> Self {
        Self {
            directory: "presets".to_string(),
            autosave: true,
        }
    }
}

impl PresetSettings {
    /// Absolute preset directory.
    pub fn resolved_directory(&self) -> PathBuf {
        let dir = PathBuf::from(&self.directory);
        if dir.is_absolute() {
            dir
        } else {
            crate::loader::data_dir().join(dir)
        }
    }
}

/// Minimum log level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug.
    Debug,
    /// Info (default).
    #[default]
    Info,
    /// Warnings.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Filter directive for `tracing-subscriber`.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parse a level name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`RUST_LOG` takes precedence).
    pub level: LogLevel,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_on_disk() {
        let json = serde_json::to_value(BridgeSettings::default()).unwrap();
        assert_eq!(json["server"]["outboundQueueCapacity"], 256);
        assert_eq!(json["engine"]["requestTimeoutMs"], 10_000);
        assert_eq!(json["logging"]["level"], "info");
    }

    #[test]
    fn partial_section_keeps_defaults() {
        let s: BridgeSettings = serde_json::from_str(r#"{"engine": {"tickIntervalMs": 8}}"#).unwrap();
        assert_eq!(s.engine.tick_interval_ms, 8);
        assert_eq!(s.engine.request_timeout_ms, 10_000);
        assert_eq!(s.server.port, 30010);
    }

    #[test]
    fn durations() {
        let e = EngineSettings {
            request_timeout_ms: 250,
            tick_interval_ms: 16,
            throttle_flush_interval_ms: 0,
        };
        assert_eq!(e.request_timeout(), Duration::from_millis(250));
        assert_eq!(e.throttle_flush_interval(), Duration::from_millis(1));
    }

    #[test]
    fn absolute_preset_dir_kept() {
        let p = PresetSettings {
            directory: "/srv/presets".into(),
            autosave: true,
        };
        assert_eq!(p.resolved_directory(), PathBuf::from("/srv/presets"));
    }

    #[test]
    fn relative_preset_dir_under_data_dir() {
        let p = PresetSettings::default();
        assert!(p.resolved_directory().ends_with(".rc-bridge/presets"));
    }

    #[test]
    fn log_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
        assert_eq!(LogLevel::Warn.as_filter_str(), "warn");
    }
}
