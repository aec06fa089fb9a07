//! Key lifecycle policy and manager settings
//!
//! A [`ConvoConfig`] is handed to the manager once, at build time, and never
//! changes afterwards. Values are validated, never clamped: an out-of-range
//! setting is an error the operator has to fix.

use std::fs;
use std::path::Path;
use std::time::Duration;

use convo_storage_traits::Timestamp;
use serde::{Deserialize, Serialize};

use crate::constant::{
    MAX_PAST_EPOCHS_LIMIT, MAX_RETENTION_DAYS, PRESET_DEFAULT, PRESET_MAX_FORWARD_SECRECY,
};

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No preset with this name
    #[error("unknown preset: {0}")]
    UnknownPreset(String),
    /// A numeric setting exceeds its upper bound
    #[error("{field} out of range: {value} (max {max})")]
    OutOfRange {
        /// Setting name
        field: &'static str,
        /// Rejected value
        value: u64,
        /// Largest accepted value
        max: u64,
    },
    /// A setting that must be positive is zero
    #[error("{0} must not be zero")]
    Zero(&'static str),
    /// The identity the manager acts as is not a did
    #[error("invalid own did: {0}")]
    InvalidOwnDid(String),
    /// Reading the config file failed
    #[error("failed to read config: {0}")]
    Io(String),
    /// The config document is malformed
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Settings for calls to the coordination service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    /// Per-attempt timeout in milliseconds
    ///
    /// Default: 10000
    pub request_timeout_ms: u64,
    /// Extra attempts for timeouts and server errors
    ///
    /// Default: 2
    pub max_retries: u32,
    /// Backoff unit in milliseconds; attempt `n` sleeps `n` units
    ///
    /// Default: 500
    pub retry_backoff_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl RemoteConfig {
    /// Timeout of a single attempt
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Sleep before the retry that follows failed attempt `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Manager configuration, including the key lifecycle policy
///
/// # Examples
///
/// ```rust
/// use convo_core::ConvoConfig;
///
/// let config = ConvoConfig {
///     max_past_epochs: 5,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvoConfig {
    /// Number of prior-epoch keys kept next to the current one.
    ///
    /// `0` erases the previous epoch key as soon as the epoch advances.
    ///
    /// Default: 2
    pub max_past_epochs: u32,

    /// Days a message key is kept before it is erased.
    ///
    /// Default: 30
    pub message_key_retention_days: u32,

    /// Trim epoch keys on every epoch advance.
    ///
    /// When false, cleanup only happens when the caller asks for it.
    ///
    /// Default: true
    pub enable_automatic_cleanup: bool,

    /// Past message secrets kept per sender for out-of-order delivery.
    ///
    /// Default: 10
    pub out_of_order_tolerance: u32,

    /// Messages a sender ratchet may skip before decryption fails.
    ///
    /// Default: 2000
    pub maximum_forward_distance: u32,

    /// Key packages to hold on the server after replenishment.
    ///
    /// Default: 100
    pub key_package_target: u32,

    /// Validity window of freshly generated key packages, in days.
    ///
    /// Default: 90
    pub key_package_lifetime_days: u32,

    /// Queue a membership operation behind one already in flight for the same
    /// conversation instead of failing it with `Conflict`.
    ///
    /// Default: false
    pub queue_concurrent_operations: bool,

    /// Coordination service settings
    pub remote: RemoteConfig,
}

impl Default for ConvoConfig {
    fn default() -> Self {
        Self {
            max_past_epochs: 2,
            message_key_retention_days: 30,
            enable_automatic_cleanup: true,
            out_of_order_tolerance: 10,
            maximum_forward_distance: 2000,
            key_package_target: 100,
            key_package_lifetime_days: 90,
            queue_concurrent_operations: false,
            remote: RemoteConfig::default(),
        }
    }
}

impl ConvoConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep no past epoch keys and erase message keys after a week
    pub fn max_forward_secrecy() -> Self {
        Self {
            max_past_epochs: 0,
            message_key_retention_days: 7,
            enable_automatic_cleanup: true,
            ..Self::default()
        }
    }

    /// Resolve a named preset
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            PRESET_DEFAULT => Ok(Self::default()),
            PRESET_MAX_FORWARD_SECRECY | "max_forward_secrecy" => Ok(Self::max_forward_secrecy()),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_slice(bytes).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn from_json_file<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config = Self::from_json_slice(&bytes)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Check every setting against its accepted range
    pub fn validate(&self) -> Result<(), ConfigError> {
        let result = self.check_ranges();
        if let Err(e) = &result {
            tracing::error!(error = %e, "Invalid configuration");
        }
        result
    }

    fn check_ranges(&self) -> Result<(), ConfigError> {
        if self.max_past_epochs > MAX_PAST_EPOCHS_LIMIT {
            return Err(ConfigError::OutOfRange {
                field: "max_past_epochs",
                value: u64::from(self.max_past_epochs),
                max: u64::from(MAX_PAST_EPOCHS_LIMIT),
            });
        }
        if self.message_key_retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::OutOfRange {
                field: "message_key_retention_days",
                value: u64::from(self.message_key_retention_days),
                max: u64::from(MAX_RETENTION_DAYS),
            });
        }
        if self.remote.request_timeout_ms == 0 {
            return Err(ConfigError::Zero("remote.request_timeout_ms"));
        }
        if self.key_package_target == 0 {
            return Err(ConfigError::Zero("key_package_target"));
        }
        Ok(())
    }

    /// Messages older than the returned time are due for erasure
    pub fn message_key_cleanup_threshold(&self, now: Timestamp) -> Timestamp {
        now.sub_days(u64::from(self.message_key_retention_days))
    }

    /// Active epoch keys kept per conversation: the current one plus the past ones
    pub fn retained_epoch_keys(&self) -> usize {
        usize::try_from(self.max_past_epochs)
            .unwrap_or(usize::MAX)
            .saturating_add(1)
    }
}
