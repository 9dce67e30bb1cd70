//! Registry of pipelines keyed by (instrument code, frequency).
//!
//! Pipelines are independent; the store only serialises their creation and
//! removal. Each pipeline guards its own writes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::structure::NativeBackend;
use crate::{ChanConfig, ChanEngine, EngineBuilder, Result, StructureBackend};

type Key = (String, String);

/// Shared pipelines, created on first use with one configuration and backend.
pub struct ChanStore<B: StructureBackend + Clone = NativeBackend> {
    config: ChanConfig,
    backend: B,
    engines: RwLock<HashMap<Key, Arc<ChanEngine<B>>>>,
}

impl ChanStore<NativeBackend> {
    pub fn new(config: ChanConfig) -> Result<Self> {
        Self::with_backend(config, NativeBackend)
    }
}

impl<B: StructureBackend + Clone> ChanStore<B> {
    /// Fails if `config` is invalid or `backend` cannot run here.
    pub fn with_backend(config: ChanConfig, backend: B) -> Result<Self> {
        config.validate()?;
        backend.ensure_available()?;
        Ok(Self {
            config,
            backend,
            engines: RwLock::new(HashMap::new()),
        })
    }

    #[inline]
    pub fn config(&self) -> &ChanConfig {
        &self.config
    }

    /// The pipeline for `(code, frequency)`, created if absent.
    pub fn get_or_create(&self, code: &str, frequency: &str) -> Result<Arc<ChanEngine<B>>> {
        let key = (code.to_string(), frequency.to_string());
        if let Some(engine) = self.engines.read().get(&key) {
            return Ok(Arc::clone(engine));
        }

        let mut engines = self.engines.write();
        if let Some(engine) = engines.get(&key) {
            return Ok(Arc::clone(engine));
        }
        let engine = Arc::new(
            EngineBuilder::new(code, frequency)
                .backend(self.backend.clone())
                .config(self.config)
                .build()?,
        );
        info!(code, frequency, backend = self.backend.name(), "created pipeline");
        engines.insert(key, Arc::clone(&engine));
        Ok(engine)
    }

    pub fn get(&self, code: &str, frequency: &str) -> Option<Arc<ChanEngine<B>>> {
        self.engines
            .read()
            .get(&(code.to_string(), frequency.to_string()))
            .cloned()
    }

    /// Drop a pipeline. Holders of its `Arc` keep a working engine.
    pub fn remove(&self, code: &str, frequency: &str) -> Option<Arc<ChanEngine<B>>> {
        let removed = self
            .engines
            .write()
            .remove(&(code.to_string(), frequency.to_string()));
        if removed.is_some() {
            info!(code, frequency, "removed pipeline");
        }
        removed
    }

    pub fn clear(&self) {
        let mut engines = self.engines.write();
        let count = engines.len();
        engines.clear();
        info!(count, "cleared pipelines");
    }

    pub fn len(&self) -> usize {
        self.engines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.read().is_empty()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<(String, String)> {
        let mut keys: Vec<Key> = self.engines.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;

    fn bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let p = 10.0 + i as f64;
                Bar::new(i as i64, p, p + 0.5, p - 0.5, p, 1.0)
            })
            .collect()
    }

    #[test]
    fn test_get_or_create_shares_engine() {
        let store = ChanStore::new(ChanConfig::default()).unwrap();
        let a = store.get_or_create("000001", "d").unwrap();
        let b = store.get_or_create("000001", "d").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = store.get_or_create("000001", "30m").unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_pipelines_are_isolated() {
        let store = ChanStore::new(ChanConfig::default()).unwrap();
        store.get_or_create("a", "d").unwrap().process(&bars(5)).unwrap();
        store.get_or_create("b", "d").unwrap().process(&bars(3)).unwrap();

        assert_eq!(store.get("a", "d").map(|e| e.get_bars().len()), Some(5));
        assert_eq!(store.get("b", "d").map(|e| e.get_bars().len()), Some(3));
        assert!(store.get("c", "d").is_none());
    }

    #[test]
    fn test_remove_and_clear() {
        let store = ChanStore::new(ChanConfig::default()).unwrap();
        let held = store.get_or_create("a", "d").unwrap();
        store.get_or_create("b", "w").unwrap();
        assert_eq!(
            store.keys(),
            vec![("a".to_string(), "d".to_string()), ("b".to_string(), "w".to_string())]
        );

        assert!(store.remove("a", "d").is_some());
        assert!(store.remove("a", "d").is_none());
        assert!(held.process(&bars(2)).is_ok());

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_creation_yields_one_engine() {
        let store = ChanStore::new(ChanConfig::default()).unwrap();
        let engines: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| store.get_or_create("x", "d").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(store.len(), 1);
        assert!(engines.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ChanConfig {
            min_stroke_gap: crate::Period::new_const(1),
            ..ChanConfig::default()
        };
        assert!(ChanStore::new(config).is_err());
    }
}
