//! Configuration for the streaming server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use inkstream_core::{DeviceModel, ScannerConfig, SessionConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP settings.
    pub http: HttpConfig,
    /// Device selection.
    pub device: DeviceConfig,
    /// Capture cadence and encoding.
    pub capture: CaptureConfig,
    /// Input device paths.
    pub input: InputConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// HTTP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address to bind, e.g. `0.0.0.0:2001`.
    pub bind: String,
    /// Ceiling on concurrent (or queued) streaming sessions.
    pub max_streams: usize,
}

/// Device selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Hardware generation: "small" or "large".
    pub model: String,
    /// File carrying the firmware version (first line, `major.minor.…`).
    pub version_file: String,
}

/// Capture cadence and encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Milliseconds between captures while the user is active.
    pub tick_ms: u64,
    /// Milliseconds of input silence before capture pauses.
    pub idle_timeout_ms: u64,
    /// Change ratio above which a full frame is sent instead of a delta.
    pub threshold: f64,
}

/// Input device paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub pen_device: String,
    pub touch_device: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            device: DeviceConfig::default(),
            capture: CaptureConfig::default(),
            input: InputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:2001".into(),
            max_streams: 1,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            model: "small".into(),
            version_file: "/etc/version".into(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            tick_ms: defaults.tick.as_millis() as u64,
            idle_timeout_ms: defaults.idle_timeout.as_millis() as u64,
            threshold: defaults.threshold,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        let defaults = ScannerConfig::default();
        Self {
            pen_device: defaults.pen_device.display().to_string(),
            touch_device: defaults.touch_device.display().to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

// ── Loading and conversions ──────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Per-session timing and encoding knobs.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tick: Duration::from_millis(self.capture.tick_ms.max(1)),
            idle_timeout: Duration::from_millis(self.capture.idle_timeout_ms.max(1)),
            threshold: self.capture.threshold.clamp(0.01, 1.0),
        }
    }
}

impl DeviceConfig {
    /// Parse the configured model name.
    pub fn model(&self) -> Result<DeviceModel, String> {
        match self.model.to_ascii_lowercase().as_str() {
            "small" => Ok(DeviceModel::Small),
            "large" => Ok(DeviceModel::Large),
            other => Err(format!("unknown device model {other:?} (expected small or large)")),
        }
    }
}

impl InputConfig {
    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            pen_device: PathBuf::from(&self.pen_device),
            touch_device: PathBuf::from(&self.touch_device),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ServerConfig::default()).unwrap();
        assert!(text.contains("bind"));
        assert!(text.contains("tick_ms"));
        assert!(text.contains("pen_device"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ServerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.http.bind, "0.0.0.0:2001");
        assert_eq!(parsed.http.max_streams, 1);
        assert_eq!(parsed.capture.tick_ms, 200);
        assert_eq!(parsed.capture.idle_timeout_ms, 2000);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let parsed: ServerConfig = toml::from_str("[capture]\ntick_ms = 100\n").unwrap();
        assert_eq!(parsed.capture.tick_ms, 100);
        assert_eq!(parsed.capture.idle_timeout_ms, 2000);
        assert_eq!(parsed.device.model, "small");
    }

    #[test]
    fn model_names_parse() {
        let mut device = DeviceConfig::default();
        assert_eq!(device.model().unwrap(), DeviceModel::Small);
        device.model = "Large".into();
        assert_eq!(device.model().unwrap(), DeviceModel::Large);
        device.model = "tablet".into();
        assert!(device.model().is_err());
    }

    #[test]
    fn session_config_clamps_degenerate_values() {
        let mut cfg = ServerConfig::default();
        cfg.capture.tick_ms = 0;
        cfg.capture.threshold = 7.5;
        let session = cfg.session_config();
        assert_eq!(session.tick, Duration::from_millis(1));
        assert_eq!(session.threshold, 1.0);
    }
}
