//! Configuration Loader
//!
//! Environment-aware layering with the `config` crate. Later sources win:
//!
//! 1. Built-in defaults (serde defaults on every section)
//! 2. `{config_dir}/router.toml`
//! 3. `{config_dir}/{environment}.toml`
//! 4. `BASKET_ROUTER__SECTION__FIELD` environment variables
//!
//! `DATABASE_URL` fills `database.url` unless the prefixed variable is set.

use super::RouterConfig;
use crate::constants::env as env_keys;
use crate::error::Result;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: RouterConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> Result<Self> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> Result<Self> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load from a specific directory with an explicit environment, without
    /// touching process-wide environment detection
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> Result<Self> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading router configuration"
        );

        let base_layer = Self::layer_path(&config_directory, "router");
        let environment_layer = Self::layer_path(&config_directory, environment);
        let mut config: RouterConfig = Config::builder()
            .add_source(File::with_name(&base_layer).required(false))
            .add_source(File::with_name(&environment_layer).required(false))
            .add_source(
                Environment::with_prefix(env_keys::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        let prefixed_url = format!("{}__DATABASE__URL", env_keys::ENV_PREFIX);
        if env::var(&prefixed_url).is_err() {
            if let Ok(url) = env::var(env_keys::DATABASE_URL) {
                config.database.url = url;
            }
        }

        config.validate()?;

        info!(
            environment = %environment,
            baskets = config.baskets.len(),
            batch_size = config.aging.batch_size,
            aging_enabled = config.aging.enabled,
            "Configuration loaded successfully"
        );

        Ok(Self {
            config,
            environment: environment.to_string(),
            config_directory,
        })
    }

    pub fn detect_environment() -> String {
        env::var(env_keys::ENVIRONMENT)
            .or_else(|_| env::var(env_keys::FALLBACK_ENVIRONMENT))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var(env_keys::CONFIG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn layer_path(directory: &Path, name: &str) -> String {
        directory.join(name).to_string_lossy().into_owned()
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    pub fn into_config(self) -> RouterConfig {
        self.config
    }

    /// Configuration as JSON with the database password masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null);
        if let Some(url) = value.pointer_mut("/database/url") {
            if let Some(raw) = url.as_str() {
                *url = serde_json::Value::String(mask_password(raw));
            }
        }
        value
    }
}

fn mask_password(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
