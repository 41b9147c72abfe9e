//! Engine configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of failed attempts before a mutation is dead-lettered.
pub const MAX_RETRIES: u32 = 5;

/// Storage key holding the pending mutation array.
pub const QUEUE_KEY: &str = "@fieldsync/mutation_queue";

/// Storage key holding the append-only dead-letter array.
pub const DEAD_LETTER_KEY: &str = "@fieldsync/dead_letters";

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Sync engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Attempts allowed before a mutation moves to dead-letter storage
    pub max_retries: u32,
    /// Upper bound for any single network call during a drain; `None` waits forever
    pub call_timeout: Option<Duration>,
    /// Directory used by [`FileStorage`](crate::storage::FileStorage)
    pub storage_dir: PathBuf,
    /// Key of the pending mutation log
    pub queue_key: String,
    /// Key of the dead-letter log
    pub dead_letter_key: String,
    /// Base URL of the document server used by the HTTP adapters
    pub remote_base_url: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            storage_dir: PathBuf::from(".fieldsync"),
            queue_key: QUEUE_KEY.to_string(),
            dead_letter_key: DEAD_LETTER_KEY.to_string(),
            remote_base_url: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from `FIELDSYNC_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("FIELDSYNC_MAX_RETRIES") {
            let retries: u32 = raw.parse().map_err(|_| ConfigError::InvalidMaxRetries)?;
            if retries == 0 {
                return Err(ConfigError::InvalidMaxRetries);
            }
            config.max_retries = retries;
        }

        if let Some(raw) = lookup("FIELDSYNC_CALL_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidTimeout)?;
            config.call_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(dir) = lookup("FIELDSYNC_DATA_DIR") {
            config.storage_dir = PathBuf::from(dir);
        }

        config.remote_base_url = lookup("FIELDSYNC_REMOTE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("FIELDSYNC_MAX_RETRIES must be a positive integer")]
    InvalidMaxRetries,

    #[error("FIELDSYNC_CALL_TIMEOUT_SECS must be a non-negative integer")]
    InvalidTimeout,
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err.to_string())
    }
}
