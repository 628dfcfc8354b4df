use serde::{Deserialize, Serialize};

/// Telegram transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub token: String,
    /// Long-poll timeout passed to getUpdates.
    #[serde(default = "default_poll_timeout", rename = "pollTimeoutSecs")]
    pub poll_timeout_secs: u64,
    /// Per-request timeout for outbound API calls. On timeout the action is
    /// abandoned, not retried.
    #[serde(default = "default_request_timeout", rename = "requestTimeoutSecs")]
    pub request_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            poll_timeout_secs: default_poll_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    5
}

/// Admin HTTP API settings. Authentication is handled by the web surface in
/// front of this process; the API itself binds to loopback by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_admin_host")]
    pub host: String,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

impl Default for AdminApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_admin_host(),
            port: default_admin_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_admin_host() -> String {
    "127.0.0.1".to_string()
}

fn default_admin_port() -> u16 {
    8390
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Path to the sqlite database. Defaults to `<home>/rollcall.db`.
    #[serde(default, rename = "dbPath")]
    pub db_path: Option<String>,
}

/// Periodic expiration sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryConfig {
    #[serde(default = "default_sweep_interval", rename = "sweepIntervalSecs")]
    pub sweep_interval_secs: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    300
}

/// Process-level configuration. Per-tenant behavior lives in the database and
/// is resolved by [`crate::config::tenant::TenantSettings`] on every dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub admin: AdminApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub expiry: ExpiryConfig,
}
