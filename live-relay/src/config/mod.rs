//! Relay configuration.
//!
//! All tunables live here. The core components receive derived, already
//! validated settings and never read the environment themselves.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::admission::AdmissionConfig;
use crate::monitor::ReconciliationConfig;
use crate::{Error, Result};

/// Probe timeouts and the optional status API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Timeout of the fast probe step.
    pub fast_timeout_ms: u64,
    /// Timeout of the thorough probe step.
    pub thorough_timeout_ms: u64,
    /// Status API URL template containing `{handle}`.
    pub status_api_url: Option<String>,
    /// Field holding the live flag in the status API response.
    pub status_field: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            fast_timeout_ms: 5_000,
            thorough_timeout_ms: 15_000,
            status_api_url: None,
            status_field: "is_live".to_string(),
        }
    }
}

/// Top-level relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Admission pool size.
    pub max_concurrent_connections: usize,
    pub reconciliation_interval_ms: u64,
    pub queue_drain_interval_ms: u64,
    pub connect_timeout_ms: u64,
    /// Probes in flight during one sweep.
    pub max_concurrent_probes: usize,
    pub probe: ProbeConfig,
    /// Event stream URL template containing `{handle}`.
    pub event_stream_url: Option<String>,
    pub database_url: String,
    pub log_dir: String,
    pub log_retention_days: i64,
    /// Buffered events per stream and per observer channel.
    pub event_channel_capacity: usize,
    /// Handles tracked at startup when not already tracked.
    pub initial_handles: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_concurrent_connections: 10,
            reconciliation_interval_ms: 300_000,
            queue_drain_interval_ms: 30_000,
            connect_timeout_ms: 15_000,
            max_concurrent_probes: 4,
            probe: ProbeConfig::default(),
            event_stream_url: None,
            database_url: "sqlite:live-relay.db?mode=rwc".to_string(),
            log_dir: "logs".to_string(),
            log_retention_days: 7,
            event_channel_capacity: 256,
            initial_handles: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `LIVE_RELAY_*` and `DATABASE_URL` environment variables.
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns.
    ///
    /// Unparseable values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = get("LIVE_RELAY_MAX_CONNECTIONS")
            && let Ok(parsed) = value.parse()
        {
            config.max_concurrent_connections = parsed;
        }
        if let Some(value) = get("LIVE_RELAY_RECONCILE_INTERVAL_MS")
            && let Ok(parsed) = value.parse()
        {
            config.reconciliation_interval_ms = parsed;
        }
        if let Some(value) = get("LIVE_RELAY_DRAIN_INTERVAL_MS")
            && let Ok(parsed) = value.parse()
        {
            config.queue_drain_interval_ms = parsed;
        }
        if let Some(value) = get("LIVE_RELAY_CONNECT_TIMEOUT_MS")
            && let Ok(parsed) = value.parse()
        {
            config.connect_timeout_ms = parsed;
        }
        if let Some(value) = get("LIVE_RELAY_MAX_CONCURRENT_PROBES")
            && let Ok(parsed) = value.parse()
        {
            config.max_concurrent_probes = parsed;
        }
        if let Some(value) = get("LIVE_RELAY_FAST_PROBE_TIMEOUT_MS")
            && let Ok(parsed) = value.parse()
        {
            config.probe.fast_timeout_ms = parsed;
        }
        if let Some(value) = get("LIVE_RELAY_THOROUGH_PROBE_TIMEOUT_MS")
            && let Ok(parsed) = value.parse()
        {
            config.probe.thorough_timeout_ms = parsed;
        }
        if let Some(value) = get("LIVE_RELAY_STATUS_API_URL") {
            config.probe.status_api_url = Some(value);
        }
        if let Some(value) = get("LIVE_RELAY_STATUS_FIELD") {
            config.probe.status_field = value;
        }
        if let Some(value) = get("LIVE_RELAY_EVENT_STREAM_URL") {
            config.event_stream_url = Some(value);
        }
        if let Some(value) = get("DATABASE_URL") {
            config.database_url = value;
        }
        if let Some(value) = get("LIVE_RELAY_LOG_DIR") {
            config.log_dir = value;
        }
        if let Some(value) = get("LIVE_RELAY_LOG_RETENTION_DAYS")
            && let Ok(parsed) = value.parse()
        {
            config.log_retention_days = parsed;
        }
        if let Some(value) = get("LIVE_RELAY_EVENT_CAPACITY")
            && let Ok(parsed) = value.parse()
        {
            config.event_channel_capacity = parsed;
        }
        if let Some(value) = get("LIVE_RELAY_HANDLES") {
            config.initial_handles = value
                .split(',')
                .map(str::trim)
                .filter(|handle| !handle.is_empty())
                .map(str::to_string)
                .collect();
        }

        config
    }

    /// Reject settings the core cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_concurrent_connections", self.max_concurrent_connections as u64),
            ("reconciliation_interval_ms", self.reconciliation_interval_ms),
            ("queue_drain_interval_ms", self.queue_drain_interval_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("max_concurrent_probes", self.max_concurrent_probes as u64),
            ("probe.fast_timeout_ms", self.probe.fast_timeout_ms),
            ("probe.thorough_timeout_ms", self.probe.thorough_timeout_ms),
            ("event_channel_capacity", self.event_channel_capacity as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(Error::config(format!("{} must be greater than 0", name)));
        }

        if self.log_retention_days < 1 {
            return Err(Error::config("log_retention_days must be at least 1"));
        }

        for (name, template) in [
            ("probe.status_api_url", &self.probe.status_api_url),
            ("event_stream_url", &self.event_stream_url),
        ] {
            if let Some(template) = template
                && !template.contains("{handle}")
            {
                return Err(Error::config(format!("{} must contain {{handle}}", name)));
            }
        }

        Ok(())
    }

    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_millis(self.reconciliation_interval_ms)
    }

    pub fn queue_drain_interval(&self) -> Duration {
        Duration::from_millis(self.queue_drain_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn fast_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe.fast_timeout_ms)
    }

    pub fn thorough_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe.thorough_timeout_ms)
    }

    pub fn admission(&self) -> AdmissionConfig {
        AdmissionConfig {
            max_concurrent: self.max_concurrent_connections,
            connect_timeout: self.connect_timeout(),
            drain_interval: self.queue_drain_interval(),
        }
    }

    pub fn reconciliation(&self) -> ReconciliationConfig {
        ReconciliationConfig {
            interval: self.reconciliation_interval(),
            max_concurrent_probes: self.max_concurrent_probes,
        }
    }
}
