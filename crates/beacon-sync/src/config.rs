//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BEACON_BROKER_MODE=in_process                                      │
//! │     BEACON_DEVICE_ID=abc-123                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/beacon/sync.toml (Linux)                                 │
//! │     ~/Library/Application Support/io.beacon.sync/sync.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     BrokerMode::Auto, auto-generated device_id                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Laptop"
//!
//! [broker]
//! mode = "auto"  # auto | force_external | force_in_process
//! redis_url = "redis://127.0.0.1:6379"
//! probe_timeout_ms = 750
//! heartbeat_interval_secs = 30
//!
//! [session]
//! hub_url = "ws://hub.internal:8080/sync"
//! catch_up_limit = 500
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Broker Mode
// =============================================================================

/// How the delivery broker is chosen at startup.
///
/// ## Mode Selection
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                        Broker Mode Behavior                             │
/// │                                                                         │
/// │  AUTO (Default)                                                        │
/// │  ──────────────                                                        │
/// │  • Probes the external broker with a bounded timeout                   │
/// │  • Probe answers in time → external broker                             │
/// │  • Probe fails or times out → in-process broker (logged warning)       │
/// │  • Best for most deployments                                           │
/// │                                                                         │
/// │  FORCE_EXTERNAL                                                        │
/// │  ──────────────                                                        │
/// │  • Requires a reachable Redis; startup fails otherwise                 │
/// │  • Use when cross-instance fan-out is mandatory                        │
/// │                                                                         │
/// │  FORCE_IN_PROCESS                                                      │
/// │  ────────────────                                                      │
/// │  • Never touches the network; broadcast channels only                  │
/// │  • Events reach only devices connected to THIS instance               │
/// │  • Use for tests and single-instance deployments                       │
/// │                                                                         │
/// │  The choice is resolved ONCE at startup and is sticky until restart.   │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerMode {
    /// Probe the external broker, fall back to in-process.
    #[default]
    Auto,

    /// Require the external broker; fail startup if unreachable.
    ForceExternal,

    /// Never probe; always use the in-process broker.
    ForceInProcess,
}

impl BrokerMode {
    /// Returns true if this mode may end up on the external broker.
    pub fn may_use_external(&self) -> bool {
        matches!(self, BrokerMode::Auto | BrokerMode::ForceExternal)
    }
}

impl std::fmt::Display for BrokerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerMode::Auto => write!(f, "auto"),
            BrokerMode::ForceExternal => write!(f, "force_external"),
            BrokerMode::ForceInProcess => write!(f, "force_in_process"),
        }
    }
}

impl std::str::FromStr for BrokerMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(BrokerMode::Auto),
            "force_external" | "external" | "redis" => Ok(BrokerMode::ForceExternal),
            "force_in_process" | "in_process" | "local" => Ok(BrokerMode::ForceInProcess),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown broker mode: '{}'. Valid options: auto, force_external, force_in_process",
                other
            ))),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name (e.g., "Laptop", "Studio Mac").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Broker Settings
// =============================================================================

/// Settings controlling broker selection and liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Broker selection mode.
    #[serde(default)]
    pub mode: BrokerMode,

    /// External broker URL (Redis). Required for ForceExternal; used by
    /// Auto when present.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Upper bound on the Auto-mode probe (milliseconds).
    /// Startup waits at most this long before falling back.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Client heartbeat period when the external broker is active (seconds).
    /// The effective value a session sees is derived from the RESOLVED
    /// broker: in-process advertises 0 regardless of this setting.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

fn default_probe_timeout_ms() -> u64 {
    750
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl Default for BrokerSettings {
    fn default() -> Self {
        BrokerSettings {
            mode: BrokerMode::default(),
            redis_url: None,
            probe_timeout_ms: default_probe_timeout_ms(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

// =============================================================================
// Session Settings
// =============================================================================

/// Client session behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// WebSocket URL of the hub (if known).
    #[serde(default)]
    pub hub_url: Option<String>,

    /// Number of events to request per catch-up page.
    #[serde(default = "default_catch_up_limit")]
    pub catch_up_limit: i64,
}

fn default_catch_up_limit() -> i64 {
    beacon_core::DEFAULT_CATCHUP_LIMIT
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            hub_url: None,
            catch_up_limit: default_catch_up_limit(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
///
/// ## Example Config File
/// ```toml
/// [device]
/// id = "550e8400-e29b-41d4-a716-446655440000"
/// name = "Laptop"
///
/// [broker]
/// mode = "auto"
/// redis_url = "redis://127.0.0.1:6379"
/// probe_timeout_ms = 750
/// heartbeat_interval_secs = 30
///
/// [session]
/// hub_url = "ws://hub.internal:8080/sync"
/// catch_up_limit = 500
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Device-specific configuration.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Broker selection settings.
    #[serde(default)]
    pub broker: BrokerSettings,

    /// Client session settings.
    #[serde(default)]
    pub session: SessionSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        // ForceExternal without a broker URL can never succeed
        if self.broker.mode == BrokerMode::ForceExternal && self.broker.redis_url.is_none() {
            return Err(SyncError::InvalidConfig(
                "broker.mode = force_external requires broker.redis_url".into(),
            ));
        }

        if let Some(ref url) = self.session.hub_url {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(SyncError::InvalidUrl(format!(
                    "Hub URL must start with ws:// or wss://, got: {}",
                    url
                )));
            }
        }

        if self.broker.probe_timeout_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "broker.probe_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.broker.heartbeat_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "broker.heartbeat_interval_secs must be greater than 0 \
                 (the in-process broker disables heartbeats on its own)"
                    .into(),
            ));
        }

        if self.session.catch_up_limit <= 0 {
            return Err(SyncError::InvalidConfig(
                "session.catch_up_limit must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("BEACON_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(name) = std::env::var("BEACON_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Ok(mode) = std::env::var("BEACON_BROKER_MODE") {
            if let Ok(parsed) = mode.parse() {
                debug!(mode = %mode, "Overriding broker mode from environment");
                self.broker.mode = parsed;
            }
        }

        if let Ok(url) = std::env::var("BEACON_REDIS_URL") {
            debug!("Overriding Redis URL from environment");
            self.broker.redis_url = Some(url);
        }

        if let Ok(ms) = std::env::var("BEACON_PROBE_TIMEOUT_MS") {
            if let Ok(parsed) = ms.parse::<u64>() {
                self.broker.probe_timeout_ms = parsed;
            }
        }

        if let Ok(secs) = std::env::var("BEACON_HEARTBEAT_SECS") {
            if let Ok(parsed) = secs.parse::<u64>() {
                self.broker.heartbeat_interval_secs = parsed;
            }
        }

        if let Ok(url) = std::env::var("BEACON_HUB_URL") {
            debug!(url = %url, "Overriding hub URL from environment");
            self.session.hub_url = Some(url);
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "beacon", "sync").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("sync.toml")
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Returns the broker mode.
    pub fn broker_mode(&self) -> BrokerMode {
        self.broker.mode
    }

    /// Returns the probe timeout as a Duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.probe_timeout_ms)
    }

    /// Returns the hub URL if configured.
    pub fn hub_url(&self) -> Option<&str> {
        self.session.hub_url.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_mode_parsing() {
        assert_eq!("auto".parse::<BrokerMode>().unwrap(), BrokerMode::Auto);
        assert_eq!(
            "force_external".parse::<BrokerMode>().unwrap(),
            BrokerMode::ForceExternal
        );
        assert_eq!(
            "redis".parse::<BrokerMode>().unwrap(),
            BrokerMode::ForceExternal
        );
        assert_eq!(
            "in_process".parse::<BrokerMode>().unwrap(),
            BrokerMode::ForceInProcess
        );
        assert!("invalid".parse::<BrokerMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.device.id.is_empty()); // Auto-generated
        assert_eq!(config.broker.mode, BrokerMode::Auto);
        assert_eq!(config.broker.probe_timeout_ms, 750);
        assert_eq!(config.broker.heartbeat_interval_secs, 30);
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        // Empty device ID should fail
        config.device.id = String::new();
        assert!(config.validate().is_err());
        config.device.id = "test".to_string();

        // ForceExternal without redis_url should fail
        config.broker.mode = BrokerMode::ForceExternal;
        assert!(config.validate().is_err());
        config.broker.redis_url = Some("redis://127.0.0.1:6379".to_string());
        assert!(config.validate().is_ok());

        // Invalid hub URL should fail
        config.session.hub_url = Some("http://invalid".to_string());
        assert!(config.validate().is_err());
        config.session.hub_url = Some("ws://localhost:8080".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[broker]"));
        assert!(toml_str.contains("[session]"));
    }
}
