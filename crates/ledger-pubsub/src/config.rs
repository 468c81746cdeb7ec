use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

use crate::logging::LogConfig;

/// Settings for one subscription session.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ClientConfig {
    /// WebSocket endpoint, `ws://` or `wss://`.
    pub ws_url: String,
    /// How long the session waits for a pong before declaring the peer dead.
    pub pong_wait_secs: u64,
    /// Upper bound for a single frame write.
    pub write_wait_secs: u64,
    pub handshake_timeout_secs: u64,
    /// Per-subscription result queue bound.
    pub result_capacity: usize,
    /// Per-subscription error queue bound. Must be below `result_capacity`.
    pub error_capacity: usize,
    /// Draw request ids from 31 bits instead of 63, for servers that reject
    /// large ids.
    pub short_id: bool,
    pub log: LogConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8900".to_string(),
            pong_wait_secs: 60,
            write_wait_secs: 10,
            handshake_timeout_secs: 45,
            result_capacity: 200_000,
            error_capacity: 100_000,
            short_id: false,
            log: LogConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Default settings pointed at `ws_url`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Self::default()
        }
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Keepalive interval: 90% of the pong wait.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.pong_wait_secs > 0, "pong-wait-secs must be positive");
        ensure!(self.write_wait_secs > 0, "write-wait-secs must be positive");
        ensure!(self.result_capacity > 0, "result-capacity must be positive");
        ensure!(self.error_capacity > 0, "error-capacity must be positive");
        ensure!(
            self.error_capacity < self.result_capacity,
            "error-capacity ({}) must be smaller than result-capacity ({})",
            self.error_capacity,
            self.result_capacity
        );
        Ok(())
    }
}

/// Load a [`ClientConfig`] from a TOML file, overridden by `LEDGER__*`
/// environment variables (`LEDGER__PONG_WAIT_SECS=30`).
pub fn load_config(path: &str) -> Result<ClientConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(
            config::Environment::with_prefix("LEDGER")
                .separator("__")
                .convert_case(config::Case::Kebab),
        );

    let settings: ClientConfig = builder
        .build()
        .with_context(|| format!("failed to build configuration from '{path}'"))?
        .try_deserialize()
        .context("failed to deserialize configuration")?;

    settings.validate()?;
    Ok(settings)
}
