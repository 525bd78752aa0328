//! Gateway configuration.
//!
//! Loaded from `TOLLGATE_`-prefixed environment variables with `__` as the
//! nesting separator (`TOLLGATE_AUDIT__QUEUE_CAPACITY=4096`), falling back
//! to defaults for anything unset.

use serde::Deserialize;
use std::time::Duration;
use tollgate_audit::AuditConfig;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Audit logger settings.
    pub audit: AuditConfig,
    /// Seconds between health probes per connector.
    pub probe_interval_secs: u64,
    /// Default downstream timeout for dispatches that do not set their own.
    pub dispatch_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            audit: AuditConfig::default(),
            probe_interval_secs: 30,
            dispatch_timeout_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a set variable cannot be parsed into its field.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("TOLLGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// The probe interval as a duration.
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// The default dispatch timeout as a duration.
    #[must_use]
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}
