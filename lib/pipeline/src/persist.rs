use futures::StreamExt;
use mediax_core::{
    Descriptor, Error, Field, Operator, Result, Retrievable, RetrievableAttribute, RetrievableStream, Schema,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Name under which the retrievable row appears in partial-write reports.
pub const RETRIEVABLE_PART: &str = "retrievable";

/// Name under which relationships appear in partial-write reports.
pub const RELATIONSHIPS_PART: &str = "relationships";

/// Writes retrievables, the descriptors of selected fields and relationships.
///
/// Writes are not transactional across entities: every part is attempted and
/// failures are reported together as [`Error::PartialWrite`]. Descriptor
/// writes are upserts, so persisting a retrievable twice is harmless.
pub struct RetrievablePersister {
    name: String,
    schema: Arc<Schema>,
    fields: Vec<Arc<Field>>,
}

impl RetrievablePersister {
    pub fn new(name: impl Into<String>, schema: Arc<Schema>) -> Self {
        Self {
            name: name.into(),
            schema,
            fields: Vec::new(),
        }
    }

    /// Fields whose attached descriptors this persister writes, typically
    /// those whose extractors do not persist.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<Arc<Field>>) -> Self {
        self.fields = fields;
        self
    }

    /// Turns this persister into the sink stage of a pipeline.
    pub fn into_sink(self, input: Box<dyn Operator>) -> PersistingSink {
        PersistingSink {
            persister: self,
            input,
        }
    }

    /// Writes one retrievable. Transient retrievables are ignored.
    pub async fn persist(&self, retrievable: &Retrievable) -> Result<()> {
        if retrievable.is_transient() {
            debug!("{} ignoring transient retrievable {}", self.name, retrievable.id());
            return Ok(());
        }
        let writer = self.schema.connection().retrievable_writer();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();

        let mut record = |part: &str, outcome: Result<bool>| match outcome {
            Ok(true) => succeeded.push(part.to_string()),
            Ok(false) => failed.push(part.to_string()),
            Err(e) => {
                error!("{} cannot write {} of {}: {}", self.name, part, retrievable.id(), e);
                failed.push(part.to_string());
            }
        };

        record(RETRIEVABLE_PART, writer.update(retrievable).await);
        for field in &self.fields {
            let descriptors: Vec<_> = retrievable.descriptors_for(field.name()).cloned().collect();
            if descriptors.is_empty() {
                continue;
            }
            record(field.name(), write_descriptors(field, &descriptors).await);
        }
        if !retrievable.relationships().is_empty() {
            record(RELATIONSHIPS_PART, writer.connect_all(retrievable.relationships()).await);
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::PartialWrite {
                retrievable: retrievable.id(),
                succeeded,
                failed,
            })
        }
    }
}

async fn write_descriptors(field: &Field, descriptors: &[Descriptor]) -> Result<bool> {
    let writer = field.get_writer()?;
    for descriptor in descriptors {
        if !writer.update(descriptor).await? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Pipeline stage persisting every retrievable it passes through.
///
/// The retrievable is still emitted after a failed write, carrying a
/// [`RetrievableAttribute::WriteFailed`] with the parts that were lost.
pub struct PersistingSink {
    persister: RetrievablePersister,
    input: Box<dyn Operator>,
}

impl Operator for PersistingSink {
    fn name(&self) -> &str {
        &self.persister.name
    }

    fn into_stream(self: Box<Self>) -> RetrievableStream {
        let PersistingSink { persister, input } = *self;
        Box::pin(async_stream::stream! {
            let mut input = input.into_stream();
            while let Some(mut retrievable) = input.next().await {
                match persister.persist(&retrievable).await {
                    Ok(()) => {}
                    Err(Error::PartialWrite { failed, .. }) => {
                        error!("{}: {} lost {}", persister.name, retrievable.id(), failed.join(", "));
                        retrievable.add_attribute(RetrievableAttribute::WriteFailed(failed));
                    }
                    Err(e) => {
                        error!("{}: {}", persister.name, e);
                        retrievable.add_attribute(RetrievableAttribute::WriteFailed(vec![RETRIEVABLE_PART.to_string()]));
                    }
                }
                yield retrievable;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::ListEnumerator;
    use crate::testing::counting_schema;
    use mediax_core::{Relationship, Value};
    use uuid::Uuid;

    fn with_length(n: i32) -> Retrievable {
        let mut r = Retrievable::new(Some("TEXT".into()));
        r.add_descriptor(Descriptor::scalar(Uuid::new_v4(), None, Value::Int(n), Some("length".into())));
        r
    }

    #[tokio::test]
    async fn test_persist_writes_all_parts() {
        let (schema, field) = counting_schema().await;
        let schema = Arc::new(schema);
        let persister = RetrievablePersister::new("persist", Arc::clone(&schema)).with_fields(vec![Arc::clone(&field)]);

        let target = with_length(1);
        persister.persist(&target).await.unwrap();
        let mut source = with_length(2);
        source.add_relationship(Relationship::new(source.id(), "partOf", target.id()));
        persister.persist(&source).await.unwrap();
        // Persisting again upserts instead of duplicating.
        persister.persist(&source).await.unwrap();

        let reader = schema.connection().retrievable_reader();
        assert_eq!(reader.count().await, 2);
        assert_eq!(reader.get(source.id()).await.unwrap().kind(), Some("TEXT"));
        assert_eq!(field.get_reader().unwrap().count().await, 2);
        let edges: Vec<_> = reader
            .get_relationships(vec![source.id()], vec![], vec![])
            .collect()
            .await;
        assert_eq!(edges, vec![Relationship::new(source.id(), "partOf", target.id())]);
    }

    #[tokio::test]
    async fn test_transient_is_ignored() {
        let (schema, _field) = counting_schema().await;
        let schema = Arc::new(schema);
        let persister = RetrievablePersister::new("persist", Arc::clone(&schema));
        persister.persist(&Retrievable::transient(None)).await.unwrap();
        assert_eq!(schema.connection().retrievable_reader().count().await, 0);
    }

    #[tokio::test]
    async fn test_partial_write_is_reported() {
        let (schema, field) = counting_schema().await;
        field.get_initializer().unwrap().deinitialize().await.unwrap();
        let schema = Arc::new(schema);
        let persister = RetrievablePersister::new("persist", Arc::clone(&schema)).with_fields(vec![field]);
        let r = with_length(4);
        match persister.persist(&r).await {
            Err(Error::PartialWrite { retrievable, succeeded, failed }) => {
                assert_eq!(retrievable, r.id());
                assert_eq!(succeeded, vec![RETRIEVABLE_PART.to_string()]);
                assert_eq!(failed, vec!["length".to_string()]);
            }
            other => panic!("expected partial write, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sink_passes_items_through() {
        let (schema, _field) = counting_schema().await;
        let schema = Arc::new(schema);
        let items = vec![with_length(1), Retrievable::transient(None), with_length(3)];
        let sink = RetrievablePersister::new("persist", Arc::clone(&schema))
            .into_sink(Box::new(ListEnumerator::new("list", items)));
        let out: Vec<_> = Box::new(sink).into_stream().collect().await;
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|r| r.failed_writes().is_empty()));
        assert_eq!(schema.connection().retrievable_reader().count().await, 2);
    }

    #[tokio::test]
    async fn test_sink_marks_failed_writes() {
        let (schema, field) = counting_schema().await;
        field.get_initializer().unwrap().deinitialize().await.unwrap();
        let schema = Arc::new(schema);
        let sink = RetrievablePersister::new("persist", Arc::clone(&schema))
            .with_fields(vec![field])
            .into_sink(Box::new(ListEnumerator::new("list", vec![with_length(5)])));
        let out: Vec<_> = Box::new(sink).into_stream().collect().await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].failed_writes(), vec!["length"]);
    }
}
