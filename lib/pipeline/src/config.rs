//! Schema configuration.
//!
//! A schema is described by a JSON document:
//!
//! ```json
//! {
//!   "name": "media",
//!   "connection": { "database": "pgvector", "parameters": { "database": "mediax" } },
//!   "fields": [
//!     { "name": "averagecolor", "factory": "AverageColor" },
//!     { "name": "file", "factory": "FileSourceMetadata" }
//!   ],
//!   "ingest": { "decoder": "text", "fields": ["file"], "parallelism": 2 }
//! }
//! ```

use mediax_core::{MediaType, Parameters, Schema};
use mediax_storage::ConnectionRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::registry::AnalyserRegistry;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid schema: {0}")]
    Schema(#[from] mediax_core::Error),

    #[error("Ingest pipeline references unknown field '{0}'")]
    UnknownField(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Backend identifier, e.g. `memory`, `grpc` or `pgvector`.
    pub database: String,
    #[serde(default)]
    pub parameters: Parameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    /// Name of the analyser in the [`AnalyserRegistry`].
    pub factory: String,
    #[serde(default)]
    pub parameters: Parameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    Text,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumeratorConfig {
    #[serde(default)]
    pub depth: Option<usize>,
    /// Empty means every known media type.
    #[serde(default)]
    pub media_types: Vec<MediaType>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn default_parallelism() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub enumerator: EnumeratorConfig,
    #[serde(default)]
    pub decoder: Option<DecoderKind>,
    /// Fields to extract, in pipeline order. Empty means every field.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Number of pipelines the execution server runs at once.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enumerator: EnumeratorConfig::default(),
            decoder: None,
            fields: Vec::new(),
            parallelism: default_parallelism(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub name: String,
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub ingest: Option<IngestConfig>,
}

impl SchemaConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks references between sections; field parameters are checked by
    /// their analysers when the schema is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ingest) = &self.ingest {
            for name in &ingest.fields {
                if !self.fields.iter().any(|f| &f.name == name) {
                    return Err(ConfigError::UnknownField(name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Opens the schema with the default backends and analysers.
    pub fn open(&self) -> Result<Arc<Schema>, ConfigError> {
        self.open_with(&ConnectionRegistry::with_defaults(), &AnalyserRegistry::with_defaults())
    }

    pub fn open_with(
        &self,
        connections: &ConnectionRegistry,
        analysers: &AnalyserRegistry,
    ) -> Result<Arc<Schema>, ConfigError> {
        let connection = connections.open(&self.connection.database, &self.name, &self.connection.parameters)?;
        let mut schema = Schema::new(&self.name, connection)?;
        for field in &self.fields {
            let analyser = analysers.get(&field.factory)?;
            schema.add_field(&field.name, analyser, field.parameters.clone())?;
        }
        info!("Opened schema '{}' with {} fields", self.name, self.fields.len());
        Ok(Arc::new(schema))
    }

    pub fn ingest(&self) -> IngestConfig {
        self.ingest.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const CONFIG: &str = r#"{
        "name": "media",
        "connection": { "database": "memory" },
        "fields": [
            { "name": "averagecolor", "factory": "AverageColor" },
            { "name": "file", "factory": "FileSourceMetadata" },
            { "name": "clip", "factory": "DenseEmbedding", "parameters": { "model": "clip", "length": "512" } }
        ],
        "ingest": { "decoder": "text", "fields": ["file"], "enumerator": { "depth": 2, "media_types": ["image"] } }
    }"#;

    #[test]
    fn test_load_and_open() {
        let mut file = NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, CONFIG.as_bytes()).unwrap();
        let config = SchemaConfig::load(file.path()).unwrap();
        assert_eq!(config.connection.database, "memory");
        let ingest = config.ingest();
        assert_eq!(ingest.decoder, Some(DecoderKind::Text));
        assert_eq!(ingest.parallelism, 1);
        assert_eq!(ingest.enumerator.media_types, vec![MediaType::Image]);

        let schema = config.open().unwrap();
        assert_eq!(schema.name(), "media");
        assert_eq!(schema.fields().len(), 3);
        assert_eq!(schema.field("clip").unwrap().layout().len(), 1);
    }

    #[test]
    fn test_unknown_components() {
        let mut config: SchemaConfig = serde_json::from_str(CONFIG).unwrap();
        config.fields[0].factory = "Sift".into();
        assert!(matches!(
            config.open(),
            Err(ConfigError::Schema(mediax_core::Error::AnalyserNotFound(_)))
        ));

        let mut config: SchemaConfig = serde_json::from_str(CONFIG).unwrap();
        config.connection.database = "cassandra".into();
        assert!(matches!(
            config.open(),
            Err(ConfigError::Schema(mediax_core::Error::UnknownBackend(_)))
        ));

        let mut config: SchemaConfig = serde_json::from_str(CONFIG).unwrap();
        config.ingest.as_mut().unwrap().fields.push("missing".into());
        assert!(matches!(config.validate(), Err(ConfigError::UnknownField(_))));
    }

    #[test]
    fn test_invalid_field_parameters() {
        let mut config: SchemaConfig = serde_json::from_str(CONFIG).unwrap();
        config.fields[2].parameters.remove("length");
        assert!(matches!(
            config.open(),
            Err(ConfigError::Schema(mediax_core::Error::MissingParameter { .. }))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SchemaConfig::load("/no/such/schema.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
