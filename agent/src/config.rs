//! # Agent Configuration
//!
//! Loaded from the environment in the same layered fashion as the server:
//! `.env` file, defaults, `AGENT_*` overrides, plus the three bare
//! variables the node-create endpoint emits in its `envFile`
//! (`NODE_ID`, `NODE_TOKEN`, `API_BASE_URL`).
//!
//! ## Cadences
//!
//! | Setting | Default | Purpose |
//! |---------|---------|---------|
//! | `publish_interval_ms` | 5 s | metrics sample cadence |
//! | `system_info_check_interval_ms` | 10 min | inventory re-collection |
//! | `system_info_republish_interval_ms` | 24 h | inventory freshness bound |
//! | `exchange_interval_ms` | 15 min | broker credential re-exchange |
//! | `reconnect_delay_ms` | 3 s | outer-loop backoff between sessions |
//! | `connect_timeout_ms` | 8 s | broker connect deadline |

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Agent process configuration. Immutable after load.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node id issued at registration
    pub node_id: String,

    /// Long-lived node bearer issued at registration
    pub node_token: String,

    /// Base URL of the server's HTTP surface, e.g. `http://statix:8080`
    pub api_base_url: String,

    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    #[serde(default = "default_system_info_check_interval_ms")]
    pub system_info_check_interval_ms: u64,

    #[serde(default = "default_system_info_republish_interval_ms")]
    pub system_info_republish_interval_ms: u64,

    #[serde(default = "default_exchange_interval_ms")]
    pub exchange_interval_ms: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// JSON log output when true
    #[serde(default)]
    pub production: bool,
}

impl AgentConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when `NODE_ID`, `NODE_TOKEN` or `API_BASE_URL`
    /// are missing: the agent cannot run without its identity. This is the
    /// only fatal error class in the agent; everything after startup
    /// retries.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            .set_default("publish_interval_ms", default_publish_interval_ms())?
            .set_default(
                "system_info_check_interval_ms",
                default_system_info_check_interval_ms(),
            )?
            .set_default(
                "system_info_republish_interval_ms",
                default_system_info_republish_interval_ms(),
            )?
            .set_default("exchange_interval_ms", default_exchange_interval_ms())?
            .set_default("reconnect_delay_ms", default_reconnect_delay_ms())?
            .set_default("connect_timeout_ms", default_connect_timeout_ms())?
            .set_default("production", false)?
            .add_source(Environment::with_prefix("AGENT").try_parsing(true))
            // The env-file variables from the node-create response
            .set_override_option("node_id", std::env::var("NODE_ID").ok())?
            .set_override_option("node_token", std::env::var("NODE_TOKEN").ok())?
            .set_override_option("api_base_url", std::env::var("API_BASE_URL").ok())?
            .build()?;

        config.try_deserialize()
    }
}

fn default_publish_interval_ms() -> u64 {
    5_000
}

fn default_system_info_check_interval_ms() -> u64 {
    600_000 // 10 minutes
}

fn default_system_info_republish_interval_ms() -> u64 {
    86_400_000 // 24 hours
}

fn default_exchange_interval_ms() -> u64 {
    900_000 // 15 minutes
}

fn default_reconnect_delay_ms() -> u64 {
    3_000
}

fn default_connect_timeout_ms() -> u64 {
    8_000
}
