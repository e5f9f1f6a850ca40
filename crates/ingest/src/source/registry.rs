use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::info;

use crate::filter::{FilterEngine, FilterError};

use super::model::{LogSource, SourceConfig};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Source declaration has no id")]
    MissingId,

    #[error("Source '{0}' declares no format")]
    MissingFormat(String),

    #[error("Source '{0}' is already registered")]
    DuplicateId(String),

    #[error("Source '{id}' has an invalid exclusion pattern: {source}")]
    InvalidFilter {
        id: String,
        #[source]
        source: FilterError,
    },

    #[error("Source not found: {0}")]
    NotFound(String),
}

/// Registered sources, keyed by id.
///
/// Sources are never removed while the process runs; `disable` keeps their
/// history and counters.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: DashMap<String, Arc<LogSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, config: SourceConfig) -> Result<Arc<LogSource>, RegistryError> {
        let id = config.id.trim().to_string();
        if id.is_empty() {
            return Err(RegistryError::MissingId);
        }
        if config.format.is_blank() {
            return Err(RegistryError::MissingFormat(id));
        }

        let filter = if config.exclude.is_empty() {
            None
        } else {
            let filter = FilterEngine::exclude_any(config.exclude.as_slice(), config.exclude_case_sensitive)
                .map_err(|source| RegistryError::InvalidFilter {
                    id: id.clone(),
                    source,
                })?;
            Some(filter)
        };

        match self.sources.entry(id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateId(id)),
            Entry::Vacant(slot) => {
                let config = SourceConfig { id: id.clone(), ..config };
                let source = Arc::new(LogSource::new(config, filter));
                slot.insert(Arc::clone(&source));
                info!(
                    source_id = %id,
                    format = %source.format(),
                    enabled = source.is_enabled(),
                    "Registered log source"
                );
                Ok(source)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<LogSource>> {
        self.sources.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn enable(&self, id: &str) -> Result<(), RegistryError> {
        self.set_enabled(id, true)
    }

    pub fn disable(&self, id: &str) -> Result<(), RegistryError> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), RegistryError> {
        let source = self
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        source.set_enabled(enabled);
        info!(source_id = %id, enabled, "Source toggled");
        Ok(())
    }

    /// All sources, ordered by id.
    pub fn list(&self) -> Vec<Arc<LogSource>> {
        let mut sources: Vec<_> = self
            .sources
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        sources.sort_by(|a, b| a.id().cmp(b.id()));
        sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.sources
            .iter()
            .filter(|entry| entry.value().is_enabled())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LogFormat;

    #[test]
    fn test_register_and_get() {
        let registry = SourceRegistry::new();
        let source = registry
            .register(SourceConfig::new("fw-1", LogFormat::Cef))
            .unwrap();
        assert_eq!(source.id(), "fw-1");
        assert!(registry.get("fw-1").is_some());
        assert!(registry.get("fw-2").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_malformed_declarations() {
        let registry = SourceRegistry::new();
        assert_eq!(
            registry.register(SourceConfig::new("  ", LogFormat::Json)).unwrap_err(),
            RegistryError::MissingId
        );
        assert_eq!(
            registry
                .register(SourceConfig::new("a", LogFormat::Other(String::new())))
                .unwrap_err(),
            RegistryError::MissingFormat("a".into())
        );
        assert!(matches!(
            registry.register(SourceConfig::new("b", LogFormat::Json).with_exclude("(unclosed")),
            Err(RegistryError::InvalidFilter { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_id() {
        let registry = SourceRegistry::new();
        registry.register(SourceConfig::new("a", LogFormat::Json)).unwrap();
        assert_eq!(
            registry.register(SourceConfig::new("a", LogFormat::Syslog)).unwrap_err(),
            RegistryError::DuplicateId("a".into())
        );
        assert_eq!(registry.get("a").unwrap().format(), &LogFormat::Json);
    }

    #[test]
    fn test_enable_disable() {
        let registry = SourceRegistry::new();
        registry.register(SourceConfig::new("a", LogFormat::Json)).unwrap();
        registry.register(SourceConfig::new("b", LogFormat::Json)).unwrap();
        assert_eq!(registry.active_count(), 2);

        registry.disable("a").unwrap();
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.len(), 2);
        registry.enable("a").unwrap();
        assert_eq!(registry.active_count(), 2);

        assert_eq!(
            registry.disable("zzz").unwrap_err(),
            RegistryError::NotFound("zzz".into())
        );
    }

    #[test]
    fn test_list_is_sorted() {
        let registry = SourceRegistry::new();
        for id in ["c", "a", "b"] {
            registry.register(SourceConfig::new(id, LogFormat::Json)).unwrap();
        }
        let ids: Vec<_> = registry.list().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
