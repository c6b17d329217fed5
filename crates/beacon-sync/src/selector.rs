//! # Broker Selector
//!
//! Resolves the configured [`BrokerMode`] into a concrete [`Broker`] exactly
//! once, at startup.
//!
//! ## Resolution Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Broker Resolution (startup)                         │
//! │                                                                         │
//! │  BrokerMode::ForceInProcess ──────────────────► Broker::InProcess      │
//! │                                                                         │
//! │  BrokerMode::ForceExternal ───► connect ──ok──► Broker::External       │
//! │                                    │                                    │
//! │                                    └──err──► startup FAILS              │
//! │                                                                         │
//! │  BrokerMode::Auto ───► probe (PING, bounded timeout, default 750 ms)   │
//! │                           │                                             │
//! │            ┌──────ok──────┴──────timeout/err──────┐                     │
//! │            ▼                                      ▼                     │
//! │     Broker::External                       Broker::InProcess            │
//! │                                         (warn: this-instance-only)      │
//! │                                                                         │
//! │  The result is STICKY: it never changes until the process restarts.    │
//! │  A Redis that comes back later is picked up on the next restart, not   │
//! │  by live migration of open sessions.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Heartbeat Mapping
//! The resolved flavor fixes the heartbeat interval the hub advertises:
//! in-process ⇒ 0 (disabled, socket liveness suffices), external ⇒ the
//! configured positive interval. The two are not independently tunable;
//! that coupling is what keeps presence behavior consistent with delivery
//! behavior.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::broker::Broker;
use crate::config::{BrokerMode, SyncConfig};
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Resolved Broker
// =============================================================================

/// The outcome of broker selection, immutable for the process lifetime.
#[derive(Clone)]
pub struct ResolvedBroker {
    broker: Broker,
    configured_mode: BrokerMode,
    heartbeat_interval_secs: u64,
}

impl ResolvedBroker {
    /// Returns the broker.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Returns the mode that was configured (not necessarily what resolved).
    pub fn configured_mode(&self) -> BrokerMode {
        self.configured_mode
    }

    /// Returns the resolved flavor name.
    pub fn flavor(&self) -> &'static str {
        self.broker.flavor()
    }

    /// Returns the heartbeat interval sessions must honor.
    ///
    /// 0 means heartbeats are disabled (in-process broker).
    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval_secs
    }

    /// Returns the presence expiry window: 3 missed heartbeats.
    ///
    /// `None` when heartbeats are disabled - sessions then live exactly as
    /// long as their socket.
    pub fn presence_expiry(&self) -> Option<Duration> {
        if self.heartbeat_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.heartbeat_interval_secs * 3))
        }
    }
}

// =============================================================================
// Broker Selector
// =============================================================================

/// Startup-time broker selection.
pub struct BrokerSelector {
    mode: BrokerMode,
    redis_url: Option<String>,
    probe_timeout: Duration,
    heartbeat_interval_secs: u64,
}

impl BrokerSelector {
    /// Creates a selector from configuration.
    pub fn new(config: &SyncConfig) -> Self {
        BrokerSelector {
            mode: config.broker.mode,
            redis_url: config.broker.redis_url.clone(),
            probe_timeout: config.probe_timeout(),
            heartbeat_interval_secs: config.broker.heartbeat_interval_secs,
        }
    }

    /// Resolves the broker. Called once; the result is held for the whole
    /// process lifetime.
    pub async fn resolve(&self) -> SyncResult<ResolvedBroker> {
        let broker = match self.mode {
            BrokerMode::ForceInProcess => {
                info!(mode = %self.mode, "Using in-process broker");
                Broker::in_process()
            }

            BrokerMode::ForceExternal => {
                let url = self.redis_url.as_deref().ok_or_else(|| {
                    SyncError::InvalidConfig(
                        "force_external requires broker.redis_url".into(),
                    )
                })?;
                // Forced mode: an unreachable broker is a startup failure,
                // not a fallback
                let broker = Broker::external(url).await?;
                info!(mode = %self.mode, "Connected to external broker");
                broker
            }

            BrokerMode::Auto => self.resolve_auto().await,
        };

        let heartbeat_interval_secs = if broker.is_external() {
            self.heartbeat_interval_secs
        } else {
            0
        };

        info!(
            flavor = broker.flavor(),
            heartbeat_interval_secs, "Broker resolved"
        );

        Ok(ResolvedBroker {
            broker,
            configured_mode: self.mode,
            heartbeat_interval_secs,
        })
    }

    /// Auto mode: probe the external broker, fall back in-process.
    ///
    /// Probe failure is an expected outcome, not an error - the whole point
    /// of Auto is that a dev laptop without Redis still starts.
    async fn resolve_auto(&self) -> Broker {
        let Some(url) = self.redis_url.as_deref() else {
            info!("No external broker configured, using in-process broker");
            return Broker::in_process();
        };

        match timeout(self.probe_timeout, probe_external(url)).await {
            Ok(Ok(())) => match Broker::external(url).await {
                Ok(broker) => {
                    info!("External broker probe succeeded");
                    broker
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "External broker answered probe but connection failed; \
                         falling back to in-process broker (events only reach \
                         devices connected to this instance)"
                    );
                    Broker::in_process()
                }
            },
            Ok(Err(e)) => {
                warn!(
                    error = %e,
                    "External broker unreachable; falling back to in-process \
                     broker (events only reach devices connected to this instance)"
                );
                Broker::in_process()
            }
            Err(_) => {
                warn!(
                    probe_timeout_ms = self.probe_timeout.as_millis() as u64,
                    "External broker probe timed out; falling back to in-process \
                     broker (events only reach devices connected to this instance)"
                );
                Broker::in_process()
            }
        }
    }
}

/// One PING round-trip against the external broker.
async fn probe_external(url: &str) -> SyncResult<()> {
    let client = redis::Client::open(url)
        .map_err(|e| SyncError::BrokerFailed(format!("Invalid Redis URL: {e}")))?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let pong: String = redis::cmd("PING").query_async(&mut conn).await?;

    if pong == "PONG" {
        Ok(())
    } else {
        Err(SyncError::BrokerFailed(format!(
            "Unexpected probe response: {pong}"
        )))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(mode: BrokerMode, redis_url: Option<&str>, probe_ms: u64) -> SyncConfig {
        let mut config = SyncConfig::default();
        config.broker.mode = mode;
        config.broker.redis_url = redis_url.map(String::from);
        config.broker.probe_timeout_ms = probe_ms;
        config
    }

    #[tokio::test]
    async fn test_force_in_process() {
        let config = config_with(BrokerMode::ForceInProcess, None, 750);
        let resolved = BrokerSelector::new(&config).resolve().await.unwrap();

        assert_eq!(resolved.flavor(), "in_process");
        assert_eq!(resolved.heartbeat_interval_secs(), 0);
        assert!(resolved.presence_expiry().is_none());
    }

    #[tokio::test]
    async fn test_auto_without_url_falls_back() {
        let config = config_with(BrokerMode::Auto, None, 750);
        let resolved = BrokerSelector::new(&config).resolve().await.unwrap();

        assert_eq!(resolved.flavor(), "in_process");
        assert_eq!(resolved.configured_mode(), BrokerMode::Auto);
    }

    #[tokio::test]
    async fn test_auto_with_unreachable_broker_falls_back_within_bound() {
        // Port 1 refuses connections immediately on any sane machine;
        // the probe timeout caps the worst case either way
        let config = config_with(BrokerMode::Auto, Some("redis://127.0.0.1:1"), 200);

        let started = std::time::Instant::now();
        let resolved = BrokerSelector::new(&config).resolve().await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(resolved.flavor(), "in_process");
        assert!(
            elapsed < Duration::from_secs(2),
            "fallback took too long: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_force_external_unreachable_fails_startup() {
        let config = config_with(
            BrokerMode::ForceExternal,
            Some("redis://127.0.0.1:1"),
            200,
        );
        let result = BrokerSelector::new(&config).resolve().await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_external_heartbeat_mapping_is_fixed() {
        // The mapping is derived, not configurable: whatever heartbeat value
        // is configured, in-process resolution pins it to 0
        let mut config = config_with(BrokerMode::ForceInProcess, None, 750);
        config.broker.heartbeat_interval_secs = 45;

        let resolved = BrokerSelector::new(&config).resolve().await.unwrap();
        assert_eq!(resolved.heartbeat_interval_secs(), 0);
    }
}
