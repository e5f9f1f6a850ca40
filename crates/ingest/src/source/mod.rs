//! Log source declarations and the registry that owns them.

pub mod model;
pub mod registry;

pub use model::{CollectionMethod, LogSource, SourceCategory, SourceConfig, SourceSnapshot};
pub use registry::{RegistryError, SourceRegistry};
