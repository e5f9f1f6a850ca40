//! Load - config loading from file and environment variables.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use super::model::EngineConfig;

pub const CONFIG_PATH_VAR: &str = "INGEST_CONFIG_FILE";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ingest/ingest.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl EngineConfig {
    /// Load configuration from file, then apply environment overrides.
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            Self::from_file(&config_path)?
        } else {
            tracing::info!("Config file not found at {}, using defaults", config_path);
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_string(),
            source,
        })
    }

    /// Apply `INGEST_*` overrides; unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_with(&var, "INGEST_STORE_CAPACITY", &mut self.store_capacity);
        override_with(&var, "INGEST_ERROR_RING_CAPACITY", &mut self.error_ring_capacity);
        override_with(&var, "INGEST_SEARCH_WINDOW", &mut self.search_window);
        override_with(&var, "INGEST_MAX_MESSAGE_LEN", &mut self.max_message_len);
        override_with(&var, "INGEST_STATS_INTERVAL", &mut self.stats_interval_secs);
        override_with(&var, "INGEST_EXPORT_ON_EXIT", &mut self.export_on_exit);
    }

    /// Check configuration values are sane
    pub fn validate(&self) -> Result<(), String> {
        if self.store_capacity == 0 {
            return Err("store_capacity must be > 0".to_string());
        }
        if self.error_ring_capacity == 0 {
            return Err("error_ring_capacity must be > 0".to_string());
        }
        if self.search_window == 0 {
            return Err("search_window must be > 0".to_string());
        }
        if self.max_message_len == 0 {
            return Err("max_message_len must be > 0".to_string());
        }
        if self.stats_interval_secs == 0 {
            return Err("stats_interval_secs must be > 0".to_string());
        }
        self.thresholds.validate()?;

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.trim()) {
                return Err(format!("source id '{}' is declared more than once", source.id));
            }
        }
        Ok(())
    }
}

fn override_with<F, T>(var: &F, name: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = var(name) {
        match value.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!("Ignoring {}: cannot parse '{}'", name, value),
        }
    }
}
