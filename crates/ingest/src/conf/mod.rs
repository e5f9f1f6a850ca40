//! Conf module - engine configuration model and loading.

pub mod load;
pub mod model;

pub use load::{ConfigError, CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH};
pub use model::EngineConfig;
