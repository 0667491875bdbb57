//! # Pipeline Configuration System
//!
//! Environment-aware configuration for the batching and dispatch pipeline.
//!
//! ## Architecture
//!
//! - **Layered Sources**: base `pipeline.toml`, then `pipeline.{env}.toml`, then
//!   `PIPELINE__SECTION__FIELD` environment variables
//! - **Serde Defaults**: every section has defaults so partial files load
//! - **Explicit Validation**: invalid values fail at load, never at first use
//!
//! ## Usage
//!
//! ```rust,no_run
//! use submission_pipeline::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let max = manager.config().batching.max_batch_size;
//! let timeout = manager.config().batching.batch_timeout();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::serde::{deserialize_optional_count, deserialize_optional_year};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/pipeline.toml`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Application instance id; batches live under this prefix
    pub application_id: String,

    /// Rotation thresholds
    pub batching: BatchingConfig,

    /// Control-year policy
    pub control_year: ControlYearConfig,

    /// Object store backend and layout root
    pub storage: StorageConfig,

    /// Acceptance-system session and health probing
    pub transmission: TransmissionConfig,

    /// Outbound confirmation/failure publishing
    pub notifications: NotificationConfig,

    /// Artifact deletion after confirmations
    pub cleanup: CleanupConfig,

    /// Bounded fan-out for bulk artifact I/O
    pub worker_pool: WorkerPoolConfig,

    /// Structured logging
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            application_id: "submit-pipeline".to_string(),
            batching: BatchingConfig::default(),
            control_year: ControlYearConfig::default(),
            storage: StorageConfig::default(),
            transmission: TransmissionConfig::default(),
            notifications: NotificationConfig::default(),
            cleanup: CleanupConfig::default(),
            worker_pool: WorkerPoolConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Member count at which the writable batch closes
    pub max_batch_size: usize,
    /// Age (since the oldest member landed) at which the writable batch closes
    pub batch_timeout_seconds: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            batch_timeout_seconds: 600,
        }
    }
}

impl BatchingConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlYearConfig {
    /// Years subtracted from the current calendar year
    pub offset: i32,
    /// Pin every batch to this year instead
    #[serde(deserialize_with = "deserialize_optional_year")]
    pub fixed: Option<i32>,
}

impl Default for ControlYearConfig {
    fn default() -> Self {
        Self {
            offset: 1,
            fixed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    LocalFs,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Key prefix under which `{applicationId}/{controlYear}/...` is laid out
    pub submissions_root: String,
    /// Filesystem root for the `local_fs` backend
    pub local_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            submissions_root: "submissions".to_string(),
            local_root: PathBuf::from("data/object-store"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransmissionConfig {
    /// Interval between login/logout health probes
    pub health_check_interval_seconds: u64,
    /// Attempts for a bundle whose submit failed with a retryable error
    pub max_submit_attempts: u32,
    /// Upper bound on one login round trip
    pub login_timeout_seconds: u64,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            health_check_interval_seconds: 30,
            max_submit_attempts: 3,
            login_timeout_seconds: 20,
        }
    }
}

impl TransmissionConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub publish_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            publish_attempts: 3,
            retry_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub delete_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            delete_attempts: 3,
            retry_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Explicit pool size; derived from core count when unset
    #[serde(deserialize_with = "deserialize_optional_count")]
    pub size: Option<usize>,
    /// Expected I/O wait time over service time for artifact operations
    pub io_wait_ratio: f64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            size: None,
            io_wait_ratio: 4.0,
        }
    }
}

impl WorkerPoolConfig {
    /// `size` when configured, otherwise `cores * (1 + io_wait_ratio)`.
    pub fn effective_size(&self) -> usize {
        if let Some(size) = self.size {
            return size.max(1);
        }
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let sized = (cores as f64 * (1.0 + self.io_wait_ratio.max(0.0))).round() as usize;
        sized.max(1)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Overrides the environment default (`debug` outside production)
    pub level: Option<String>,
    /// Also write JSON lines to a file under `directory`
    pub json_file: bool,
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            json_file: false,
            directory: PathBuf::from("log"),
        }
    }
}

impl PipelineConfig {
    /// Validate the loaded configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.application_id.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "application_id",
                "pipeline configuration",
            ));
        }
        if self.application_id.contains('/') {
            return Err(ConfigurationError::invalid_value(
                "application_id",
                &self.application_id,
                "application id is a single key segment and cannot contain '/'",
            ));
        }
        if self.batching.max_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "batching.max_batch_size",
                "0",
                "batch size must be greater than 0",
            ));
        }
        if self.batching.batch_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "batching.batch_timeout_seconds",
                "0",
                "batch timeout must be greater than 0",
            ));
        }
        if self.storage.submissions_root.trim_matches('/').is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "storage.submissions_root",
                "storage configuration",
            ));
        }
        if self.transmission.health_check_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "transmission.health_check_interval_seconds",
                "0",
                "offline mode is only cleared by the health probe, so the interval must be greater than 0",
            ));
        }
        if self.transmission.max_submit_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "transmission.max_submit_attempts",
                "0",
                "at least one submit attempt is required",
            ));
        }
        if self.notifications.publish_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "notifications.publish_attempts",
                "0",
                "at least one publish attempt is required",
            ));
        }
        if self.cleanup.delete_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "cleanup.delete_attempts",
                "0",
                "at least one delete attempt is required",
            ));
        }
        if self.worker_pool.size == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "worker_pool.size",
                "0",
                "pool size must be greater than 0 when set",
            ));
        }
        if !self.worker_pool.io_wait_ratio.is_finite() || self.worker_pool.io_wait_ratio < 0.0 {
            return Err(ConfigurationError::invalid_value(
                "worker_pool.io_wait_ratio",
                self.worker_pool.io_wait_ratio.to_string(),
                "ratio must be a finite, non-negative number",
            ));
        }
        Ok(())
    }
}
