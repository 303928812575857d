//! Builders assembling operators into ingest and query pipelines.

use mediax_core::{
    stage, Content, ContentElement, Context, Descriptor, Field, Operator, Query, Result, Schema, Value,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::{DecoderKind, IngestConfig};
use crate::decode::TextDecoder;
use crate::enumerate::FileSystemEnumerator;
use crate::persist::RetrievablePersister;
use crate::retrieve::QueryRetriever;
use crate::transform::{LimitTransformer, MergeTransformer, TimeBenchmark};

pub const ENUMERATOR: &str = "enumerator";
pub const DECODER: &str = "decoder";
pub const PERSISTER: &str = "persister";
pub const MERGE: &str = "merge";
pub const OUTPUT: &str = "output";

fn extraction_fields(schema: &Schema, config: &IngestConfig) -> Result<Vec<Arc<Field>>> {
    if config.fields.is_empty() {
        return Ok(schema.fields().to_vec());
    }
    config
        .fields
        .iter()
        .map(|name| schema.field(name).map(Arc::clone))
        .collect()
}

/// Builds `enumerator -> decoder? -> extractors -> persister` over `root`.
///
/// Extractors only attach descriptors; the persister writes the retrievable
/// row before its descriptors, so backends enforcing foreign keys accept them.
pub fn ingest_pipeline(
    schema: &Arc<Schema>,
    config: &IngestConfig,
    root: impl Into<PathBuf>,
    context: &Context,
) -> Result<Box<dyn Operator>> {
    let mut enumerator = FileSystemEnumerator::new(ENUMERATOR, root)
        .with_media_types(config.enumerator.media_types.clone())
        .with_skip(config.enumerator.skip);
    if let Some(depth) = config.enumerator.depth {
        enumerator = enumerator.with_depth(depth);
    }
    if let Some(limit) = config.enumerator.limit {
        enumerator = enumerator.with_limit(limit);
    }

    let mut operator: Box<dyn Operator> = Box::new(enumerator);
    if let Some(DecoderKind::Text) = config.decoder {
        operator = Box::new(TextDecoder::new(DECODER, operator));
    }
    let fields = extraction_fields(schema, config)?;
    for field in &fields {
        debug!("Ingest pipeline extracting field '{}'", field.name());
        operator = stage(field.get_extractor(operator, context, false)?);
    }
    let persister = RetrievablePersister::new(PERSISTER, Arc::clone(schema)).with_fields(fields);
    Ok(Box::new(persister.into_sink(operator)))
}

/// One input of a query pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryInput {
    /// Text content analysed by the field's analyser.
    Text { field: String, text: String },
    /// A raw feature vector of the field.
    Vector { field: String, vector: Vec<f32> },
    /// A backend query run as is.
    Query { field: String, query: Query },
}

impl QueryInput {
    pub fn field(&self) -> &str {
        match self {
            QueryInput::Text { field, .. } | QueryInput::Vector { field, .. } | QueryInput::Query { field, .. } => field,
        }
    }

    fn retriever(self, field: &Arc<Field>, context: &Context) -> Result<Box<dyn Operator>> {
        let retriever: Box<dyn Operator> = match self {
            QueryInput::Text { text, .. } => {
                stage(field.get_retriever_for_content(vec![ContentElement::new(Content::Text(text))], context)?)
            }
            QueryInput::Vector { vector, .. } => {
                let descriptor = Descriptor::vector(
                    Uuid::new_v4(),
                    None,
                    Value::FloatVector(vector),
                    Some(field.name().to_string()),
                );
                stage(field.get_retriever_for_descriptors(vec![descriptor], context)?)
            }
            QueryInput::Query { query, .. } => Box::new(QueryRetriever::new(Arc::clone(field), query)?),
        };
        Ok(retriever)
    }
}

/// Builds `retrievers -> merge? -> limit -> benchmark?`.
///
/// Several inputs are merged by id. `context[output, "limit"]` bounds the
/// output, and `context[output, "logfile"]` enables a time benchmark.
pub fn query_pipeline(schema: &Schema, inputs: Vec<QueryInput>, context: &Context) -> Result<Box<dyn Operator>> {
    if inputs.is_empty() {
        return Err(mediax_core::Error::InvalidArgument("a query needs at least one input".into()));
    }
    let mut retrievers = Vec::with_capacity(inputs.len());
    for input in inputs {
        let field = schema.field(input.field())?;
        retrievers.push(input.retriever(&Arc::clone(field), context)?);
    }
    let mut operator: Box<dyn Operator> = if retrievers.len() == 1 {
        retrievers.remove(0)
    } else {
        Box::new(MergeTransformer::new(MERGE, retrievers))
    };
    operator = Box::new(LimitTransformer::from_context(
        OUTPUT,
        operator,
        context,
        mediax_core::DEFAULT_LIMIT as usize,
    ));
    if context.get(OUTPUT, "logfile").is_some() {
        operator = Box::new(TimeBenchmark::from_context(OUTPUT, operator, context));
    }
    Ok(operator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{AverageColor, FileSourceMetadata};
    use futures::StreamExt;
    use mediax_core::{ComparisonOperator, Parameters, SimpleBooleanQuery};
    use mediax_storage::MemoryConnection;
    use tempfile::TempDir;

    async fn schema() -> Arc<Schema> {
        let mut schema = Schema::new("test", Arc::new(MemoryConnection::new("test"))).unwrap();
        schema.add_field("file", Arc::new(FileSourceMetadata), Parameters::new()).unwrap();
        schema.add_field("averagecolor", Arc::new(AverageColor), Parameters::new()).unwrap();
        schema.initialize().await.unwrap();
        Arc::new(schema)
    }

    #[tokio::test]
    async fn test_ingest_then_query() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "first").unwrap();
        std::fs::write(dir.path().join("b.txt"), "second").unwrap();
        let schema = schema().await;
        let config = IngestConfig {
            decoder: Some(DecoderKind::Text),
            fields: vec!["file".into()],
            ..IngestConfig::default()
        };
        let context = Context::new("test");
        let pipeline = ingest_pipeline(&schema, &config, dir.path(), &context).unwrap();
        let ingested: Vec<_> = pipeline.into_stream().collect().await;
        assert_eq!(ingested.len(), 2);
        assert!(ingested.iter().all(|r| r.descriptors().len() == 1));
        assert_eq!(schema.connection().retrievable_reader().count().await, 2);

        let query = SimpleBooleanQuery::new(Some("path".into()), ComparisonOperator::Like, Value::from("%b.txt"));
        let inputs = vec![QueryInput::Query {
            field: "file".into(),
            query: query.into(),
        }];
        let results: Vec<_> = query_pipeline(&schema, inputs, &context)
            .unwrap()
            .into_stream()
            .collect()
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), ingested[1].id());
    }

    #[tokio::test]
    async fn test_ingest_job_reports_failed_writes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "first").unwrap();
        std::fs::write(dir.path().join("b.txt"), "second").unwrap();
        let schema = schema().await;
        let file = schema.field("file").unwrap();
        file.get_initializer().unwrap().deinitialize().await.unwrap();
        let config = IngestConfig {
            decoder: Some(DecoderKind::Text),
            fields: vec!["file".into()],
            ..IngestConfig::default()
        };

        let server = crate::execution::ExecutionServer::new(1);
        let pipeline = ingest_pipeline(&schema, &config, dir.path(), &Context::new("test")).unwrap();
        let info = server.wait(server.submit(pipeline)).await.unwrap();
        assert_eq!(info.status, crate::execution::JobStatus::Completed);
        assert_eq!(info.processed, 2);
        assert_eq!(info.failed, 2);
        assert_eq!(schema.connection().retrievable_reader().count().await, 2);
    }

    #[tokio::test]
    async fn test_query_validation() {
        let schema = schema().await;
        let context = Context::new("test");
        assert!(query_pipeline(&schema, vec![], &context).is_err());
        let unknown = vec![QueryInput::Text {
            field: "caption".into(),
            text: "cat".into(),
        }];
        assert!(matches!(
            query_pipeline(&schema, unknown, &context).err().unwrap(),
            mediax_core::Error::FieldNotFound(_)
        ));
        let wrong_dims = vec![QueryInput::Vector {
            field: "averagecolor".into(),
            vector: vec![1.0, 0.0],
        }];
        assert!(query_pipeline(&schema, wrong_dims, &context).is_err());
    }

    #[tokio::test]
    async fn test_merged_vector_queries_with_limit() {
        let schema = schema().await;
        let field = schema.field("averagecolor").unwrap();
        let writer = field.get_writer().unwrap();
        let retrievables = schema.connection().retrievable_writer();
        for color in [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] {
            let r = mediax_core::Retrievable::new(Some("IMAGE".into()));
            assert!(retrievables.add(&r).await.unwrap());
            let d = Descriptor::vector(Uuid::new_v4(), Some(r.id()), Value::FloatVector(color.to_vec()), None);
            assert!(writer.add(&d).await.unwrap());
        }
        let inputs = vec![
            QueryInput::Vector {
                field: "averagecolor".into(),
                vector: vec![1.0, 0.0, 0.0],
            },
            QueryInput::Vector {
                field: "averagecolor".into(),
                vector: vec![0.0, 1.0, 0.0],
            },
        ];
        let context = Context::new("test").with(OUTPUT, "limit", "2");
        let results: Vec<_> = query_pipeline(&schema, inputs, &context)
            .unwrap()
            .into_stream()
            .collect()
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].distance(), Some(0.0));
        assert_eq!(results[1].distance(), Some(0.0));
    }
}
