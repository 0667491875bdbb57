//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles environment detection,
//! layering of the base and per-environment TOML files with environment
//! variable overrides, validation, and sanitized rendering for logs.

use super::error::{ConfigResult, ConfigurationError};
use super::PipelineConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE: &str = "pipeline.toml";
const ENV_PREFIX: &str = "PIPELINE";
const ENV_SEPARATOR: &str = "__";
const KNOWN_ENVIRONMENTS: [&str; 3] = ["development", "test", "production"];

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: PipelineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with an explicit environment.
    /// Environment-variable overrides still apply.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_layers(config_dir, environment, true)
    }

    /// Load only the files in `config_dir`, ignoring `PIPELINE__*` variables.
    pub fn load_files_only(config_dir: PathBuf, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_layers(Some(config_dir), environment, false)
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: PipelineConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    fn load_layers(
        config_dir: Option<PathBuf>,
        environment: &str,
        include_env_vars: bool,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let explicit = config_dir.is_some();
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        if explicit && !config_directory.is_dir() {
            return Err(ConfigurationError::directory_not_found(config_directory));
        }
        if !KNOWN_ENVIRONMENTS.contains(&environment) {
            debug!(environment = %environment, "Loading configuration for a custom environment name");
        }

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::build_config(&config_directory, environment, include_env_vars)?;
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = %environment,
            application_id = %config.application_id,
            max_batch_size = config.batching.max_batch_size,
            batch_timeout_seconds = config.batching.batch_timeout_seconds,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    fn build_config(
        config_directory: &Path,
        environment: &str,
        include_env_vars: bool,
    ) -> ConfigResult<PipelineConfig> {
        let base_path = config_directory.join(BASE_FILE);
        let env_path = config_directory.join(format!("pipeline.{environment}.toml"));

        let mut builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(env_path).required(false));

        if include_env_vars {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            );
        }

        let settings = builder
            .build()
            .map_err(|e| ConfigurationError::load_error(config_directory.display().to_string(), e))?;

        settings
            .try_deserialize::<PipelineConfig>()
            .map_err(ConfigurationError::deserialization_error)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Sanitized configuration for debugging/logging with sensitive fields masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// `PIPELINE_ENV`, then `APP_ENV`, default `development`
    pub fn detect_environment() -> String {
        env::var("PIPELINE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("PIPELINE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn sanitize_config_for_logging(config: &PipelineConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "key", "token", "credential"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        let masked = match &*val {
                            serde_json::Value::String(s) if s.is_empty() => "[EMPTY]".to_string(),
                            serde_json::Value::String(s) if s.is_ascii() && s.len() > 4 => {
                                format!("[MASKED: {}***{}]", &s[..2], &s[s.len() - 2..])
                            }
                            _ => "[MASKED]".to_string(),
                        };
                        *val = serde_json::Value::String(masked);
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}
