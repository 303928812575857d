//! In-process backend.
//!
//! Keeps every entity in memory behind `parking_lot` locks. Similarity metrics
//! and BM25 fulltext scoring are computed here, since there is no engine to
//! delegate them to.

mod bm25;
mod descriptor;
mod filter;
mod metric;
mod retrievable;
mod store;

use async_trait::async_trait;
use mediax_core::{
    descriptor_entity, Connection, DescriptorReader, DescriptorWriter, Initializer, Layout,
    Parameters, Result, RetrievableReader, RetrievableWriter,
};
use std::sync::Arc;
use tracing::info;

pub use bm25::Bm25Index;
pub use descriptor::{MemoryDescriptorInitializer, MemoryDescriptorReader, MemoryDescriptorWriter};
pub use retrievable::{MemoryRetrievableInitializer, MemoryRetrievableReader, MemoryRetrievableWriter};

use crate::registry::ConnectionProvider;
use store::Store;

pub const BACKEND_NAME: &str = "memory";

pub struct MemoryConnection {
    schema: String,
    store: Arc<Store>,
}

impl MemoryConnection {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            store: Arc::new(Store::default()),
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn backend(&self) -> &'static str {
        BACKEND_NAME
    }

    fn schema_name(&self) -> &str {
        &self.schema
    }

    fn description(&self) -> String {
        format!("memory://{}", self.schema)
    }

    fn descriptor_initializer(&self, field: &str, layout: &Layout) -> Result<Box<dyn Initializer>> {
        Ok(Box::new(MemoryDescriptorInitializer {
            entity: descriptor_entity(field),
            layout: layout.clone(),
            store: Arc::clone(&self.store),
        }))
    }

    fn descriptor_reader(&self, field: &str, layout: &Layout) -> Result<Box<dyn DescriptorReader>> {
        Ok(Box::new(MemoryDescriptorReader {
            field: field.to_string(),
            entity: descriptor_entity(field),
            layout: layout.clone(),
            store: Arc::clone(&self.store),
        }))
    }

    fn descriptor_writer(&self, field: &str, layout: &Layout) -> Result<Box<dyn DescriptorWriter>> {
        Ok(Box::new(MemoryDescriptorWriter {
            field: field.to_string(),
            entity: descriptor_entity(field),
            layout: layout.clone(),
            store: Arc::clone(&self.store),
        }))
    }

    fn retrievable_initializer(&self) -> Box<dyn Initializer> {
        Box::new(MemoryRetrievableInitializer {
            store: Arc::clone(&self.store),
        })
    }

    fn retrievable_reader(&self) -> Box<dyn RetrievableReader> {
        Box::new(MemoryRetrievableReader {
            store: Arc::clone(&self.store),
        })
    }

    fn retrievable_writer(&self) -> Box<dyn RetrievableWriter> {
        Box::new(MemoryRetrievableWriter {
            store: Arc::clone(&self.store),
        })
    }

    async fn close(&self) {
        info!("Closing memory connection for schema '{}'", self.schema);
        self.store.clear();
    }
}

/// Registers the in-process backend under `memory`. Takes no parameters.
pub struct MemoryConnectionProvider;

impl ConnectionProvider for MemoryConnectionProvider {
    fn database_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn open_connection(&self, schema: &str, _parameters: &Parameters) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(MemoryConnection::new(schema)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use mediax_core::{
        Attribute, ComparisonOperator, Descriptor, Distance, ProximityQuery, Query, Relationship,
        Retrievable, SimpleBooleanQuery, SimpleFulltextQuery, Type, Value,
    };
    use uuid::Uuid;

    fn vector_layout() -> Layout {
        Layout::vector(Type::FloatVector(3)).unwrap()
    }

    fn metadata_layout() -> Layout {
        Layout::structure(vec![
            Attribute::new("path", Type::String),
            Attribute::new("size", Type::Long),
            Attribute::new("caption", Type::Text).nullable(),
        ])
        .unwrap()
    }

    fn vector(retrievable: Uuid, v: Vec<f32>) -> Descriptor {
        Descriptor::vector(Uuid::new_v4(), Some(retrievable), Value::FloatVector(v), Some("avgcolor".into()))
    }

    fn metadata(retrievable: Uuid, path: &str, size: i64, caption: Option<&str>) -> Descriptor {
        Descriptor::structured(
            Uuid::new_v4(),
            Some(retrievable),
            vec![
                ("path".into(), Some(Value::from(path))),
                ("size".into(), Some(Value::Long(size))),
                ("caption".into(), caption.map(|c| Value::Text(c.into()))),
            ],
            Some("file".into()),
        )
    }

    async fn setup(layout: &Layout, field: &str) -> MemoryConnection {
        let connection = MemoryConnection::new("test");
        connection.retrievable_initializer().initialize().await.unwrap();
        connection
            .descriptor_initializer(field, layout)
            .unwrap()
            .initialize()
            .await
            .unwrap();
        connection
    }

    #[tokio::test]
    async fn test_add_then_get_roundtrip() {
        let layout = vector_layout();
        let connection = setup(&layout, "avgcolor").await;
        let writer = connection.descriptor_writer("avgcolor", &layout).unwrap();
        let reader = connection.descriptor_reader("avgcolor", &layout).unwrap();

        let d = vector(Uuid::new_v4(), vec![0.1, 0.2, 0.3]);
        assert!(writer.add(&d).await.unwrap());
        assert_eq!(reader.get(d.id()).await, Some(d.clone()));
        assert!(reader.exists(d.id()).await);
        assert!(!writer.add(&d).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_all_and_get_all_by_ids() {
        let layout = vector_layout();
        let connection = setup(&layout, "avgcolor").await;
        let writer = connection.descriptor_writer("avgcolor", &layout).unwrap();
        let reader = connection.descriptor_reader("avgcolor", &layout).unwrap();

        let items: Vec<Descriptor> = (0..5)
            .map(|i| vector(Uuid::new_v4(), vec![i as f32, 0.0, 0.0]))
            .collect();
        let before = reader.count().await;
        assert!(writer.add_all(&items).await.unwrap());
        assert_eq!(reader.count().await, before + 5);

        let wanted = vec![items[1].id(), items[3].id(), items[3].id(), Uuid::new_v4()];
        let mut found: Vec<_> = reader.get_all_by_ids(wanted).map(|d| d.id()).collect().await;
        found.sort();
        let mut expected = vec![items[1].id(), items[3].id()];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn test_writer_rejects_layout_violation() {
        let layout = vector_layout();
        let connection = setup(&layout, "avgcolor").await;
        let writer = connection.descriptor_writer("avgcolor", &layout).unwrap();
        let wrong = vector(Uuid::new_v4(), vec![1.0, 0.0]);
        assert!(writer.add(&wrong).await.is_err());
        let orphan = Descriptor::vector(Uuid::new_v4(), None, Value::FloatVector(vec![1.0, 0.0, 0.0]), None);
        assert!(writer.add(&orphan).await.is_err());
    }

    #[tokio::test]
    async fn test_uninitialized_entity_is_a_soft_failure() {
        let layout = vector_layout();
        let connection = MemoryConnection::new("test");
        let writer = connection.descriptor_writer("avgcolor", &layout).unwrap();
        let reader = connection.descriptor_reader("avgcolor", &layout).unwrap();
        assert!(!writer.add(&vector(Uuid::new_v4(), vec![1.0, 0.0, 0.0])).await.unwrap());
        assert_eq!(reader.count().await, 0);
        assert_eq!(reader.get_all().count().await, 0);
    }

    #[tokio::test]
    async fn test_initialize_twice_and_truncate_empty() {
        let layout = vector_layout();
        let connection = setup(&layout, "avgcolor").await;
        let initializer = connection.descriptor_initializer("avgcolor", &layout).unwrap();
        assert!(initializer.initialize().await.is_ok());
        assert!(initializer.truncate().await.is_ok());
        assert!(initializer.is_initialized().await);
        assert!(initializer.deinitialize().await.is_ok());
        assert!(initializer.deinitialize().await.is_ok());
        assert!(!initializer.is_initialized().await);
    }

    #[tokio::test]
    async fn test_proximity_returns_stored_vector_first() {
        let layout = vector_layout();
        let connection = setup(&layout, "avgcolor").await;
        let writer = connection.descriptor_writer("avgcolor", &layout).unwrap();
        let reader = connection.descriptor_reader("avgcolor", &layout).unwrap();

        let r1 = Uuid::new_v4();
        writer.add(&vector(r1, vec![1.0, 0.0, 0.0])).await.unwrap();
        writer.add(&vector(Uuid::new_v4(), vec![0.0, 1.0, 0.0])).await.unwrap();
        writer.add(&vector(Uuid::new_v4(), vec![0.5, 0.5, 0.0])).await.unwrap();

        let query = Query::from(
            ProximityQuery::new(Value::FloatVector(vec![1.0, 0.0, 0.0]), Distance::Euclidean).with_limit(1),
        );
        let results: Vec<_> = reader.query(&query).unwrap().collect().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), r1);
        assert_eq!(results[0].distance(), Some(0.0));
        assert!(results[0].descriptors().is_empty());

        let fetching = Query::from(
            ProximityQuery::new(Value::FloatVector(vec![1.0, 0.0, 0.0]), Distance::Cosine).fetching_vector(),
        );
        let results: Vec<_> = reader.query(&fetching).unwrap().collect().await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].descriptors().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_limit_returns_default_bound() {
        let layout = vector_layout();
        let connection = setup(&layout, "avgcolor").await;
        let writer = connection.descriptor_writer("avgcolor", &layout).unwrap();
        let reader = connection.descriptor_reader("avgcolor", &layout).unwrap();
        for _ in 0..3 {
            writer.add(&vector(Uuid::new_v4(), vec![1.0, 0.0, 0.0])).await.unwrap();
        }

        let mut raw = ProximityQuery::new(Value::FloatVector(vec![1.0, 0.0, 0.0]), Distance::Euclidean);
        raw.limit = 0;
        let built = raw.clone().with_limit(0);
        for query in [Query::from(raw), Query::from(built)] {
            let results: Vec<_> = reader.query(&query).unwrap().collect().await;
            assert_eq!(results.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_proximity_dimension_mismatch_fails_before_io() {
        let layout = vector_layout();
        let connection = MemoryConnection::new("test");
        let reader = connection.descriptor_reader("avgcolor", &layout).unwrap();
        let query = Query::from(ProximityQuery::new(Value::FloatVector(vec![1.0]), Distance::Euclidean));
        assert!(reader.query(&query).is_err());
    }

    #[tokio::test]
    async fn test_boolean_operators() {
        let layout = metadata_layout();
        let connection = setup(&layout, "file").await;
        let writer = connection.descriptor_writer("file", &layout).unwrap();
        let reader = connection.descriptor_reader("file", &layout).unwrap();
        writer
            .add_all(&[
                metadata(Uuid::new_v4(), "/a.png", 10, None),
                metadata(Uuid::new_v4(), "/b.jpg", 20, None),
                metadata(Uuid::new_v4(), "/c.png", 30, None),
            ])
            .await
            .unwrap();

        let count = |op, value| {
            let query = Query::from(SimpleBooleanQuery::new(Some("size".into()), op, value));
            let stream = reader.query(&query).unwrap();
            async move { stream.count().await }
        };
        assert_eq!(count(ComparisonOperator::Eq, Value::Long(20)).await, 1);
        assert_eq!(count(ComparisonOperator::Neq, Value::Long(20)).await, 2);
        assert_eq!(count(ComparisonOperator::Lt, Value::Long(20)).await, 1);
        assert_eq!(count(ComparisonOperator::Gt, Value::Long(20)).await, 1);
        assert_eq!(count(ComparisonOperator::Leq, Value::Long(20)).await, 2);
        assert_eq!(count(ComparisonOperator::Geq, Value::Long(20)).await, 2);

        let like = Query::from(SimpleBooleanQuery::new(
            Some("path".into()),
            ComparisonOperator::Like,
            Value::from("%.png"),
        ));
        assert_eq!(reader.query(&like).unwrap().count().await, 2);

        let limited = Query::from(
            SimpleBooleanQuery::new(Some("size".into()), ComparisonOperator::Geq, Value::Long(0)).with_limit(2),
        );
        assert_eq!(reader.query(&limited).unwrap().count().await, 2);

        let like_on_long = Query::from(SimpleBooleanQuery::new(
            Some("size".into()),
            ComparisonOperator::Like,
            Value::Long(1),
        ));
        assert!(reader.query(&like_on_long).is_err());
    }

    #[tokio::test]
    async fn test_fulltext_scores_matches() {
        let layout = metadata_layout();
        let connection = setup(&layout, "file").await;
        let writer = connection.descriptor_writer("file", &layout).unwrap();
        let reader = connection.descriptor_reader("file", &layout).unwrap();
        let cat = Uuid::new_v4();
        writer.add(&metadata(cat, "/a.png", 1, Some("a black cat sleeping"))).await.unwrap();
        writer.add(&metadata(Uuid::new_v4(), "/b.png", 2, Some("a red car"))).await.unwrap();
        writer.add(&metadata(Uuid::new_v4(), "/c.png", 3, None)).await.unwrap();

        let query = Query::from(SimpleFulltextQuery::new(Some("caption".into()), "cat"));
        let results: Vec<_> = reader.query(&query).unwrap().collect().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), cat);
        assert!(results[0].score().unwrap() > 0.0);

        let on_string = Query::from(SimpleFulltextQuery::new(Some("path".into()), "png"));
        assert!(reader.query(&on_string).is_err());
    }

    #[tokio::test]
    async fn test_update_and_delete_are_idempotent() {
        let layout = metadata_layout();
        let connection = setup(&layout, "file").await;
        let writer = connection.descriptor_writer("file", &layout).unwrap();
        let reader = connection.descriptor_reader("file", &layout).unwrap();
        let d = metadata(Uuid::new_v4(), "/a.png", 1, None);
        assert!(writer.update(&d).await.unwrap());
        assert_eq!(reader.count().await, 1);
        assert!(writer.delete(&d).await.unwrap());
        assert!(writer.delete(&d).await.unwrap());
        assert_eq!(reader.count().await, 0);
    }

    #[tokio::test]
    async fn test_relationships_and_cascade() {
        let layout = vector_layout();
        let connection = setup(&layout, "avgcolor").await;
        let writer = connection.retrievable_writer();
        let reader = connection.retrievable_reader();
        let descriptors = connection.descriptor_writer("avgcolor", &layout).unwrap();

        let video = Retrievable::new(Some("SOURCE".into()));
        let segment = Retrievable::new(Some("SEGMENT".into()));
        assert!(writer.add_all(&[video.clone(), segment.clone()]).await.unwrap());
        let part_of = Relationship::new(segment.id(), "partOf", video.id());
        assert!(writer.connect(&part_of).await.unwrap());
        assert!(writer.connect(&part_of).await.unwrap());
        assert!(!writer
            .connect(&Relationship::new(segment.id(), "partOf", Uuid::new_v4()))
            .await
            .unwrap());

        let found: Vec<_> = reader
            .get_relationships(vec![], vec!["partOf".into()], vec![video.id()])
            .collect()
            .await;
        assert_eq!(found, vec![part_of.clone()]);
        assert_eq!(reader.get(segment.id()).await.unwrap().kind(), Some("SEGMENT"));

        descriptors.add(&vector(segment.id(), vec![1.0, 0.0, 0.0])).await.unwrap();
        assert!(writer.delete(&segment).await.unwrap());
        assert_eq!(reader.count().await, 1);
        assert_eq!(reader.get_relationships(vec![], vec![], vec![]).count().await, 0);
        let d_reader = connection.descriptor_reader("avgcolor", &layout).unwrap();
        assert_eq!(d_reader.count().await, 0);
    }
}
