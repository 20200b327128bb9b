//! Backend registry for resolving storagers by type name.

use std::collections::HashMap;
use std::sync::Arc;

use polystore_common::{ConfigErrorKind, Error, Result};

use crate::config::StorageConfig;
use crate::cos;
use crate::fs;
use crate::pairs::Pair;
use crate::storager::Storager;

/// Builds a storager from construction pairs.
pub type StoragerFactory = Box<dyn Fn(Vec<Pair>) -> Result<Arc<dyn Storager>> + Send + Sync>;

/// Storager factories keyed by backend type.
pub struct Registry {
    factories: HashMap<String, StoragerFactory>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the `fs` backend.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .factories
            .insert(fs::TYPE.to_string(), Box::new(new_fs));
        registry
    }

    /// Register a factory.
    ///
    /// # Preconditions
    /// - `name` must be unique within the registry
    ///
    /// # Errors
    /// - `AlreadyRegistered` if the name is taken
    pub fn register(&mut self, name: impl Into<String>, factory: StoragerFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::config(name, ConfigErrorKind::AlreadyRegistered));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Register the `cos` backend on top of `connector`.
    pub fn register_cos(&mut self, connector: Arc<dyn cos::Connector>) -> Result<()> {
        self.register(
            cos::TYPE,
            Box::new(move |pairs: Vec<Pair>| -> Result<Arc<dyn Storager>> {
                let (_, storage) = cos::new(connector.clone(), pairs)?;
                Ok(Arc::new(storage))
            }),
        )
    }

    /// Build a storager of type `name`.
    ///
    /// # Errors
    /// - `UnsupportedType` if nothing is registered under `name`
    /// - whatever the backend's constructor reports
    pub fn resolve(&self, name: &str, pairs: Vec<Pair>) -> Result<Arc<dyn Storager>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::config(name, ConfigErrorKind::UnsupportedType))?;
        factory(pairs)
    }

    /// Build the storager a config describes.
    pub fn open(&self, config: &StorageConfig) -> Result<Arc<dyn Storager>> {
        self.resolve(&config.backend, config.to_pairs()?)
    }

    /// Registered backend types, sorted.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a factory is registered under `name`.
    pub fn has_backend(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

fn new_fs(pairs: Vec<Pair>) -> Result<Arc<dyn Storager>> {
    Ok(Arc::new(fs::Storage::new(pairs)?))
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairs::{with_location, with_work_dir};
    use tempfile::TempDir;

    #[test]
    fn test_defaults_have_fs() {
        let registry = Registry::with_defaults();
        assert!(registry.has_backend("fs"));
        assert!(!registry.has_backend("cos"));
    }

    #[test]
    fn test_resolve_unknown_type() {
        let registry = Registry::with_defaults();
        let err = registry.resolve("ftp", vec![]).unwrap_err();
        assert!(matches!(
            err,
            Error::Config {
                kind: ConfigErrorKind::UnsupportedType,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = Registry::with_defaults();
        let err = registry
            .register("fs", Box::new(new_fs))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config {
                kind: ConfigErrorKind::AlreadyRegistered,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_open_fs_config() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = StorageConfig::new("fs");
        cfg.work_dir = Some(tmp.path().to_string_lossy().into_owned());

        let s = Registry::with_defaults().open(&cfg).unwrap();
        let meta = s.metadata(vec![]).await.unwrap();
        assert_eq!(meta.work_dir, tmp.path().to_string_lossy());
    }

    #[tokio::test]
    async fn test_cos_through_registry() {
        let mut registry = Registry::with_defaults();
        let connector = cos::MemoryConnector::new()
            .with_bucket("b", "ap-guangzhou")
            .unwrap();
        registry.register_cos(Arc::new(connector)).unwrap();
        assert_eq!(registry.backends(), vec!["cos".to_string(), "fs".to_string()]);

        let mut cfg = StorageConfig::new("cos");
        cfg.credential = Some("hmac:id:key".to_string());
        cfg.name = Some("b".to_string());
        cfg.location = Some("ap-guangzhou".to_string());

        let s = registry.open(&cfg).unwrap();
        assert_eq!(s.to_string(), "Storager cos {Name: b, WorkDir: /}");

        // Construction ignores pairs meant for other backends.
        let s = registry.resolve("fs", vec![with_work_dir("/x"), with_location("l")]);
        assert!(s.is_ok());
    }
}
