//! Configuration Loader
//!
//! Layers configuration sources with the `config` crate:
//!
//! 1. built-in defaults (`BatchlineConfig::default()`)
//! 2. a YAML file, `config/batchline.yaml` unless a path is given
//! 3. environment variables, `BATCHLINE__STORE__BACKEND=search_index` style
//!
//! The merged result is validated before it is returned.

use std::env;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::BatchlineConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/batchline.yaml";
pub const ENV_PREFIX: &str = "BATCHLINE";
/// Explicit config file location
pub const CONFIG_PATH_VAR: &str = "BATCHLINE_CONFIG_PATH";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Detect environment from BATCHLINE_ENV, then APP_ENV, default "development"
    pub fn detect_environment() -> String {
        env::var("BATCHLINE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    /// Load from `BATCHLINE_CONFIG_PATH` if set, otherwise the default path.
    /// The default file is optional; an explicit path must exist.
    pub fn load() -> ConfigResult<BatchlineConfig> {
        match env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::load_from_path(Path::new(&path)),
            Err(_) => Self::load_layers(Path::new(DEFAULT_CONFIG_PATH), false, ENV_PREFIX),
        }
    }

    /// Load with an explicit YAML file, which must exist
    pub fn load_from_path(path: &Path) -> ConfigResult<BatchlineConfig> {
        Self::load_layers(path, true, ENV_PREFIX)
    }

    /// Load with a custom environment prefix; used to isolate tests from the
    /// process environment.
    pub fn load_with_env_prefix(
        path: Option<&Path>,
        env_prefix: &str,
    ) -> ConfigResult<BatchlineConfig> {
        match path {
            Some(path) => Self::load_layers(path, true, env_prefix),
            None => Self::load_layers(Path::new(DEFAULT_CONFIG_PATH), false, env_prefix),
        }
    }

    fn load_layers(path: &Path, required: bool, env_prefix: &str) -> ConfigResult<BatchlineConfig> {
        if required && !path.is_file() {
            return Err(ConfigurationError::config_file_not_found(PathBuf::from(path)));
        }

        debug!(
            path = %path.display(),
            required,
            env_prefix,
            "Loading configuration"
        );

        let defaults = Config::try_from(&BatchlineConfig::default())
            .map_err(ConfigurationError::load_error)?;

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(
                File::from(path)
                    .format(FileFormat::Yaml)
                    .required(required),
            )
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(ConfigurationError::load_error)?;

        let config: BatchlineConfig = merged
            .try_deserialize()
            .map_err(ConfigurationError::deserialize_error)?;

        config.validate()?;

        info!(
            environment = %Self::detect_environment(),
            store_backend = ?config.store.backend,
            notification_provider = ?config.notifications.provider,
            compensation_max_attempts = config.compensation.max_attempts,
            "Configuration loaded successfully"
        );

        Ok(config)
    }
}
