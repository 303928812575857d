use ahash::AHashMap;
use mediax_core::{Connection, Error, Parameters, Result};
use std::sync::Arc;
use tracing::info;

/// Opens connections for one backend.
///
/// Providers connect lazily, so opening never blocks on the network.
pub trait ConnectionProvider: Send + Sync {
    /// Identifier used as `database` in the schema configuration.
    fn database_name(&self) -> &'static str;

    fn open_connection(&self, schema: &str, parameters: &Parameters) -> Result<Arc<dyn Connection>>;
}

/// Backends keyed by their identifier.
pub struct ConnectionRegistry {
    providers: AHashMap<&'static str, Arc<dyn ConnectionProvider>>,
}

impl ConnectionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            providers: AHashMap::new(),
        }
    }

    /// A registry with the `memory`, `grpc` and `pgvector` backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::memory::MemoryConnectionProvider));
        registry.register(Arc::new(crate::grpc::GrpcConnectionProvider));
        registry.register(Arc::new(crate::pgvector::PgVectorConnectionProvider));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn ConnectionProvider>) {
        self.providers.insert(provider.database_name(), provider);
    }

    pub fn get(&self, database: &str) -> Option<&Arc<dyn ConnectionProvider>> {
        self.providers.get(database)
    }

    pub fn databases(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.providers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn open(&self, database: &str, schema: &str, parameters: &Parameters) -> Result<Arc<dyn Connection>> {
        let provider = self
            .get(database)
            .ok_or_else(|| Error::UnknownBackend(database.to_string()))?;
        let connection = provider.open_connection(schema, parameters)?;
        info!("Opened {} connection: {}", database, connection.description());
        Ok(connection)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Reads a required string parameter.
pub(crate) fn required<'a>(parameters: &'a Parameters, component: &str, key: &str) -> Result<&'a str> {
    parameters
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::MissingParameter {
            component: component.to_string(),
            key: key.to_string(),
        })
}

/// Reads and parses an optional parameter, falling back to `default`.
pub(crate) fn parsed<T: std::str::FromStr>(parameters: &Parameters, key: &str, default: T) -> Result<T> {
    match parameters.get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("invalid value '{}' for parameter '{}'", raw, key))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_known_and_unknown_backends() {
        let registry = ConnectionRegistry::with_defaults();
        assert_eq!(registry.databases(), vec!["grpc", "memory", "pgvector"]);
        let connection = registry.open("memory", "test", &Parameters::new()).unwrap();
        assert_eq!(connection.backend(), "memory");
        assert!(matches!(
            registry.open("cassandra", "test", &Parameters::new()),
            Err(Error::UnknownBackend(_))
        ));
    }

    struct Renamed;

    impl ConnectionProvider for Renamed {
        fn database_name(&self) -> &'static str {
            "memory"
        }

        fn open_connection(&self, _schema: &str, _parameters: &Parameters) -> Result<Arc<dyn Connection>> {
            Ok(Arc::new(crate::memory::MemoryConnection::new("renamed")))
        }
    }

    #[tokio::test]
    async fn test_register_replaces_same_database() {
        let mut registry = ConnectionRegistry::with_defaults();
        registry.register(Arc::new(Renamed));
        assert_eq!(registry.databases(), vec!["grpc", "memory", "pgvector"]);
        let connection = registry.open("memory", "test", &Parameters::new()).unwrap();
        assert!(connection.description().contains("renamed"));
        assert!(ConnectionRegistry::new().databases().is_empty());
    }

    #[test]
    fn test_parameter_helpers() {
        let mut parameters = Parameters::new();
        parameters.insert("port".into(), "1865".into());
        assert_eq!(parsed(&parameters, "port", 0u16).unwrap(), 1865);
        assert_eq!(parsed(&parameters, "missing", 7u16).unwrap(), 7);
        assert!(required(&parameters, "grpc", "host").is_err());
        parameters.insert("port".into(), "x".into());
        assert!(parsed(&parameters, "port", 0u16).is_err());
    }
}
