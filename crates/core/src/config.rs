use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `OPS_CONSOLE__` and TOML config files.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub authority: AuthorityConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Session lifecycle tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Deadline for a single remote validation call.
    #[serde(default = "default_validate_timeout_secs")]
    pub validate_timeout_secs: u64,
    /// Absolute session lifetime, enforced independent of activity.
    #[serde(default = "default_absolute_expiry_hours")]
    pub absolute_expiry_hours: u64,
    /// Interval of the expiry poll; bounds how stale an expired session can be.
    #[serde(default = "default_expiry_poll_secs")]
    pub expiry_poll_secs: u64,
}

/// Remote session authority endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    #[serde(default = "default_authority_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Push channel (NATS) for out-of-band revocation.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    #[serde(default = "default_push_max_reconnects")]
    pub max_reconnects: usize,
}

/// Durable key/value medium for persisted credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

// Default functions
fn default_node_id() -> String {
    "console-01".to_string()
}
fn default_validate_timeout_secs() -> u64 {
    10
}
fn default_absolute_expiry_hours() -> u64 {
    12
}
fn default_expiry_poll_secs() -> u64 {
    30
}
fn default_authority_url() -> String {
    "http://localhost:8088".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_push_urls() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}
fn default_subject_prefix() -> String {
    "console.identity".to_string()
}
fn default_push_max_reconnects() -> usize {
    60
}
fn default_data_dir() -> String {
    ".ops-console/credentials".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            session: SessionConfig::default(),
            authority: AuthorityConfig::default(),
            push: PushConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            validate_timeout_secs: default_validate_timeout_secs(),
            absolute_expiry_hours: default_absolute_expiry_hours(),
            expiry_poll_secs: default_expiry_poll_secs(),
        }
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: default_authority_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            urls: default_push_urls(),
            subject_prefix: default_subject_prefix(),
            max_reconnects: default_push_max_reconnects(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("OPS_CONSOLE")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
