//! Explicit registry of available algorithms.
//!
//! The registry is a plain value built once at process start and passed by
//! reference into the components that resolve algorithm names (configuration
//! loading, service construction). Dispatch is a closed set of registered
//! factories, not open reflection.

use super::AlgorithmFactory;
use std::collections::HashMap;
use std::sync::Arc;

/// A registered algorithm: its factory plus the metadata services expose.
#[derive(Clone)]
pub struct AlgorithmEntry {
    pub name: String,
    pub description: String,
    pub factory: Arc<dyn AlgorithmFactory>,
}

/// Maps registry keys to algorithm factories.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    entries: HashMap<String, AlgorithmEntry>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an algorithm under a key, replacing any previous entry.
    pub fn register(
        &mut self,
        key: impl Into<String>,
        description: impl Into<String>,
        factory: Arc<dyn AlgorithmFactory>,
    ) -> &mut Self {
        let key = key.into();
        self.entries.insert(
            key.clone(),
            AlgorithmEntry {
                name: key,
                description: description.into(),
                factory,
            },
        );
        self
    }

    pub fn get(&self, key: &str) -> Option<&AlgorithmEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the registered keys in unspecified order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
