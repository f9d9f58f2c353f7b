use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub sync: SyncConfig,
    /// Time budget for recursive folder delete/copy.
    pub bulk_operation_timeout: Duration,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory of the content store; blobs live under `<root>/<owner_id>/`
    pub upload_dir: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time after which an HTTP session is invalidated
    pub inactivity_timeout: Duration,
    /// Idle time after which a real-time connect attempt is refused
    pub socket_inactivity_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on items returned by one catch-up or event-log query
    pub page_size: usize,
    /// Outbound buffer per live connection; events beyond it are dropped
    pub channel_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: "./uploads".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(30 * 60),
            socket_inactivity_timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            channel_capacity: 256,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let max_upload_size =
            env_parse("MAX_UPLOAD_SIZE").unwrap_or(10 * 1024 * 1024 * 1024); // 10GB

        let session_defaults = SessionConfig::default();
        let inactivity_timeout = env_parse("SESSION_INACTIVITY_SECS")
            .map(Duration::from_secs)
            .unwrap_or(session_defaults.inactivity_timeout);
        let socket_inactivity_timeout = env_parse("SOCKET_INACTIVITY_SECS")
            .map(Duration::from_secs)
            .unwrap_or(session_defaults.socket_inactivity_timeout);

        let sync_defaults = SyncConfig::default();
        let page_size = env_parse("SYNC_PAGE_SIZE").unwrap_or(sync_defaults.page_size);
        let channel_capacity =
            env_parse("SYNC_CHANNEL_CAPACITY").unwrap_or(sync_defaults.channel_capacity);

        let bulk_operation_timeout = Duration::from_secs(
            env_parse("BULK_OPERATION_TIMEOUT_SECS").unwrap_or(300),
        );

        let config = Config {
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            storage: StorageConfig { upload_dir },
            session: SessionConfig {
                inactivity_timeout,
                socket_inactivity_timeout,
            },
            sync: SyncConfig {
                page_size,
                channel_capacity,
            },
            bulk_operation_timeout,
            test_mode,
            max_upload_size,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.upload_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "UPLOAD_DIR cannot be empty".to_string(),
            ));
        }

        if self.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.sync.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "SYNC_PAGE_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.sync.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "SYNC_CHANNEL_CAPACITY must be greater than 0".to_string(),
            ));
        }

        if self.session.socket_inactivity_timeout > self.session.inactivity_timeout {
            tracing::warn!(
                "Socket inactivity timeout ({:?}) exceeds the HTTP session timeout ({:?}); \
                 idle sessions will be rejected over HTTP first.",
                self.session.socket_inactivity_timeout,
                self.session.inactivity_timeout
            );
        }

        Ok(())
    }
}
