//! Hub server configuration, loaded from the environment.
//!
//! The hub is deployed as a container or a systemd unit, so configuration is
//! env-first here; the sync engine's own settings (broker mode, probe
//! timeout, heartbeat) load through [`beacon_sync::SyncConfig`], which layers
//! its TOML file under the same BEACON_* overrides.

use tracing::warn;

use beacon_sync::SyncConfig;

use crate::error::HubError;

/// Default HTTP/WebSocket port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default consumed-row retention, in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Hub server configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Bind address (default 0.0.0.0).
    pub bind_addr: String,

    /// Listen port.
    pub port: u16,

    /// SQLite database path.
    pub database_path: String,

    /// Shared secret for JWT validation.
    pub jwt_secret: String,

    /// Access token lifetime for dev-issued tokens (seconds).
    pub jwt_lifetime_secs: i64,

    /// Days to keep consumed events before deletion.
    pub retention_days: u32,

    /// Presence sweep period (seconds).
    pub sweep_interval_secs: u64,

    /// Consumed-marking period (seconds).
    pub housekeeping_interval_secs: u64,

    /// Sync engine settings (broker mode, probe timeout, heartbeat).
    pub sync: SyncConfig,
}

impl HubConfig {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, HubError> {
        let jwt_secret = match std::env::var("BEACON_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("BEACON_JWT_SECRET not set, using an insecure development secret");
                "beacon-dev-secret".to_string()
            }
        };

        let sync = SyncConfig::load(None).map_err(|e| HubError::Config(e.to_string()))?;

        Ok(HubConfig {
            bind_addr: env_or("BEACON_BIND_ADDR", "0.0.0.0"),
            port: env_parsed("BEACON_HUB_PORT", DEFAULT_PORT)?,
            database_path: env_or("BEACON_DB_PATH", "beacon.db"),
            jwt_secret,
            jwt_lifetime_secs: env_parsed("BEACON_JWT_LIFETIME_SECS", 3600i64)?,
            retention_days: env_parsed("BEACON_RETENTION_DAYS", DEFAULT_RETENTION_DAYS)?,
            sweep_interval_secs: env_parsed("BEACON_SWEEP_INTERVAL_SECS", 30u64)?,
            housekeeping_interval_secs: env_parsed("BEACON_HOUSEKEEPING_INTERVAL_SECS", 60u64)?,
            sync,
        })
    }

    /// Full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, HubError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| HubError::Config(format!("Invalid value for {}: {}", name, value))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let config = HubConfig {
            bind_addr: "127.0.0.1".into(),
            port: 9090,
            database_path: "test.db".into(),
            jwt_secret: "secret".into(),
            jwt_lifetime_secs: 3600,
            retention_days: 30,
            sweep_interval_secs: 30,
            housekeeping_interval_secs: 60,
            sync: SyncConfig::default(),
        };
        assert_eq!(config.bind_address(), "127.0.0.1:9090");
    }
}
