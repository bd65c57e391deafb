use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Counsel
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// SQLite storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upstream AI relay configuration
    #[serde(default)]
    pub relay: RelayConfig,
    /// Session/token configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}

/// SQLite storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all storage data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// Full path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("counsel.db")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".counsel"))
        .unwrap_or_else(|| PathBuf::from(".counsel"))
}

/// Upstream AI relay configuration
///
/// The credential and endpoint are read-only after startup; handlers receive
/// them through [`crate::relay::RelayClient`], never from ambient globals.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Upstream chat-completions endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Upstream API key (optional - the relay degrades to a fixed mock
    /// response when no credential is available)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Wall-clock ceiling for one upstream exchange, streaming included
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RelayConfig {
    /// Resolve the upstream credential: explicit config value first, then the
    /// configured environment variable. Empty strings count as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.deepseek.com/v1/chat/completions".to_string()
}

fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Session/token configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Bearer token lifetime in minutes
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_minutes: default_token_ttl_minutes(),
        }
    }
}

fn default_token_ttl_minutes() -> i64 {
    30
}
