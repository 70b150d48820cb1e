//! Configuration Loader
//!
//! Layers configuration sources with the `config` crate:
//!
//! 1. compiled-in defaults
//! 2. an optional TOML file
//! 3. environment variables, `EXCHANGE_SET_` prefix and `__` between sections
//!    (e.g. `EXCHANGE_SET_MONITOR__POLL_INTERVAL_MS=2000`)
//!
//! The merged result is validated before it is returned.

use super::error::{ConfigResult, ConfigurationError};
use super::OrchestratorConfig;
use config::{Config, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

pub const ENV_PREFIX: &str = "EXCHANGE_SET";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load defaults, the optional file at `path`, then environment overrides
    pub fn load(path: Option<impl AsRef<Path>>) -> ConfigResult<OrchestratorConfig> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Like [`load`](Self::load) with a custom environment prefix
    pub fn load_with_prefix(
        path: Option<impl AsRef<Path>>,
        env_prefix: &str,
    ) -> ConfigResult<OrchestratorConfig> {
        let defaults = Config::try_from(&OrchestratorConfig::default())
            .map_err(|e| ConfigurationError::validation_error(format!("defaults: {e}")))?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = &path {
            let path = path.as_ref();
            debug!(path = %path.display(), "Adding configuration file source");
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let merged = builder.build().map_err(|e| {
            let file_path = path
                .as_ref()
                .map(|p| p.as_ref().display().to_string())
                .unwrap_or_else(|| "<none>".to_string());
            ConfigurationError::invalid_toml(file_path, e)
        })?;

        let config: OrchestratorConfig = merged
            .try_deserialize()
            .map_err(ConfigurationError::validation_error)?;

        config.validate()?;
        debug!(
            backend = ?config.storage.backend,
            poll_mode = ?config.monitor.poll_mode,
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults, without environment overrides
    pub fn from_toml_str(contents: &str) -> ConfigResult<OrchestratorConfig> {
        let defaults = Config::try_from(&OrchestratorConfig::default())
            .map_err(|e| ConfigurationError::validation_error(format!("defaults: {e}")))?;

        let config: OrchestratorConfig = Config::builder()
            .add_source(defaults)
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigurationError::invalid_toml("<inline>", e))?
            .try_deserialize()
            .map_err(ConfigurationError::validation_error)?;

        config.validate()?;
        Ok(config)
    }
}
