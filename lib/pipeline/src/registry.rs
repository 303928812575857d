use ahash::AHashMap;
use mediax_core::{Analyser, Error, Result};
use std::sync::Arc;

use crate::features::{AverageColor, Caption, DenseEmbedding, FileSourceMetadata};

/// Analysers keyed by the name used as `factory` in schema configurations.
pub struct AnalyserRegistry {
    analysers: AHashMap<String, Arc<dyn Analyser>>,
}

impl AnalyserRegistry {
    pub fn new() -> Self {
        Self {
            analysers: AHashMap::new(),
        }
    }

    /// A registry with every reference analyser.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AverageColor));
        registry.register(Arc::new(Caption));
        registry.register(Arc::new(DenseEmbedding));
        registry.register(Arc::new(FileSourceMetadata));
        registry
    }

    /// Registers an analyser, replacing one of the same name.
    pub fn register(&mut self, analyser: Arc<dyn Analyser>) {
        self.analysers.insert(analyser.name().to_string(), analyser);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Analyser>> {
        self.analysers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::AnalyserNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.analysers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for AnalyserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registry = AnalyserRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec!["AverageColor", "Caption", "DenseEmbedding", "FileSourceMetadata"]
        );
        assert_eq!(registry.get("AverageColor").unwrap().name(), "AverageColor");
        assert!(matches!(registry.get("Sift"), Err(Error::AnalyserNotFound(_))));
    }

    #[test]
    fn test_register_custom() {
        let mut registry = AnalyserRegistry::new();
        assert!(registry.names().is_empty());
        registry.register(Arc::new(crate::testing::CountingAnalyser));
        assert!(registry.get("Counting").is_ok());
    }
}
