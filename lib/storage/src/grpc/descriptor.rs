use async_trait::async_trait;
use futures::StreamExt;
use mediax_core::descriptor::{DESCRIPTOR_ID_COLUMN, RETRIEVABLE_ID_COLUMN};
use mediax_core::{
    Descriptor, DescriptorId, DescriptorReader, DescriptorStream, DescriptorWriter, Initializer,
    Layout, Query, Result, Retrievable, RetrievableAttribute, RetrievableId, RetrievableStream,
};
use tracing::{debug, warn};

use super::translate::{self, RowView, DISTANCE_COLUMN, SCORE_COLUMN};
use super::{acknowledged, create_schema, proto, tolerate, Entity};
use crate::check_writable;

pub struct GrpcDescriptorInitializer {
    pub(crate) entity: Entity,
    pub(crate) layout: Layout,
}

#[async_trait]
impl Initializer for GrpcDescriptorInitializer {
    async fn initialize(&self) -> Result<()> {
        create_schema(&self.entity.client, &self.entity.schema).await?;
        let request = proto::CreateEntityRequest {
            entity: Some(self.entity.name()),
            columns: translate::descriptor_columns(&self.layout),
            if_not_exists: true,
        };
        tolerate(
            self.entity.client().create_entity(request).await,
            tonic::Code::AlreadyExists,
            &format!("create entity {}", self.entity.name),
        )?;
        self.entity
            .create_index(RETRIEVABLE_ID_COLUMN, proto::IndexType::Btree)
            .await?;
        for attribute in self.layout.attributes() {
            self.entity
                .create_index(&attribute.name, translate::index_type(&attribute.ty))
                .await?;
        }
        debug!("Initialized entity '{}'", self.entity.name);
        Ok(())
    }

    async fn deinitialize(&self) -> Result<()> {
        self.entity.drop_entity().await
    }

    async fn truncate(&self) -> Result<()> {
        self.entity.truncate().await
    }

    async fn is_initialized(&self) -> bool {
        self.entity.exists().await
    }
}

pub struct GrpcDescriptorReader {
    pub(crate) field: String,
    pub(crate) entity: Entity,
    pub(crate) layout: Layout,
}

impl GrpcDescriptorReader {
    fn select(&self, predicate: Option<proto::Predicate>, limit: u64) -> DescriptorStream {
        let request = proto::QueryRequest {
            entity: Some(self.entity.name()),
            projection: translate::descriptor_projection(&self.layout),
            r#where: predicate,
            limit,
            ..Default::default()
        };
        let layout = self.layout.clone();
        let field = self.field.clone();
        let entity = self.entity.name.clone();
        Box::pin(self.entity.rows(request).filter_map(move |(columns, row)| {
            let view = RowView { columns: &columns, row: &row };
            let descriptor = match view.descriptor(&layout, &field) {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!("Skipping malformed row of '{}': {}", entity, e);
                    None
                }
            };
            futures::future::ready(descriptor)
        }))
    }
}

#[async_trait]
impl DescriptorReader for GrpcDescriptorReader {
    fn field(&self) -> &str {
        &self.field
    }

    fn layout(&self) -> &Layout {
        &self.layout
    }

    async fn get(&self, id: DescriptorId) -> Option<Descriptor> {
        self.select(Some(translate::id_equals(DESCRIPTOR_ID_COLUMN, id)), 1)
            .next()
            .await
    }

    async fn exists(&self, id: DescriptorId) -> bool {
        self.entity
            .count(Some(translate::id_equals(DESCRIPTOR_ID_COLUMN, id)))
            .await
            > 0
    }

    fn get_all(&self) -> DescriptorStream {
        self.select(None, 0)
    }

    fn get_all_by_ids(&self, ids: Vec<DescriptorId>) -> DescriptorStream {
        if ids.is_empty() {
            return Box::pin(futures::stream::empty());
        }
        self.select(Some(translate::id_in(DESCRIPTOR_ID_COLUMN, &ids)), 0)
    }

    fn get_all_for_retrievables(&self, ids: Vec<RetrievableId>) -> DescriptorStream {
        if ids.is_empty() {
            return Box::pin(futures::stream::empty());
        }
        self.select(Some(translate::id_in(RETRIEVABLE_ID_COLUMN, &ids)), 0)
    }

    async fn count(&self) -> u64 {
        self.entity.count(None).await
    }

    fn query(&self, query: &Query) -> Result<RetrievableStream> {
        let attribute = query.validate(&self.layout)?;
        let request = translate::query_request(self.entity.name(), &self.layout, &attribute, query);
        let with_descriptor = match query {
            Query::Proximity(q) => q.fetch_vector,
            Query::Boolean(_) | Query::Fulltext(_) => true,
        };
        let layout = self.layout.clone();
        let field = self.field.clone();
        let entity = self.entity.name.clone();
        Ok(Box::pin(self.entity.rows(request).filter_map(move |(columns, row)| {
            let view = RowView { columns: &columns, row: &row };
            let result = to_result(&view, &layout, &field, with_descriptor);
            if let Err(e) = &result {
                warn!("Skipping malformed result of '{}': {}", entity, e);
            }
            futures::future::ready(result.ok())
        })))
    }
}

fn to_result(view: &RowView<'_>, layout: &Layout, field: &str, with_descriptor: bool) -> Result<Retrievable> {
    let mut retrievable = Retrievable::with_identity(view.uuid(RETRIEVABLE_ID_COLUMN)?, None, false);
    if with_descriptor {
        retrievable.add_descriptor(view.descriptor(layout, field)?);
    }
    if let Some(distance) = view.float(DISTANCE_COLUMN) {
        retrievable.add_attribute(RetrievableAttribute::Distance(distance));
    }
    if let Some(score) = view.float(SCORE_COLUMN) {
        retrievable.add_attribute(RetrievableAttribute::Score(score));
    }
    Ok(retrievable)
}

pub struct GrpcDescriptorWriter {
    pub(crate) field: String,
    pub(crate) entity: Entity,
    pub(crate) layout: Layout,
}

impl GrpcDescriptorWriter {
    fn action(&self, verb: &str) -> String {
        format!("{} descriptors of '{}'", verb, self.field)
    }
}

#[async_trait]
impl DescriptorWriter for GrpcDescriptorWriter {
    async fn add(&self, item: &Descriptor) -> Result<bool> {
        check_writable(&self.layout, item)?;
        let request = proto::InsertRequest {
            entity: Some(self.entity.name()),
            values: translate::descriptor_values(item),
        };
        Ok(acknowledged(
            self.entity.client().insert(request).await,
            &self.action("insert"),
        ))
    }

    async fn add_all(&self, items: &[Descriptor]) -> Result<bool> {
        for item in items {
            check_writable(&self.layout, item)?;
        }
        if items.is_empty() {
            return Ok(true);
        }
        let rows = items
            .iter()
            .map(|item| proto::Row {
                values: translate::descriptor_values(item)
                    .into_iter()
                    .map(|c| c.value.unwrap_or_default())
                    .collect(),
            })
            .collect();
        let request = proto::BatchInsertRequest {
            entity: Some(self.entity.name()),
            columns: translate::descriptor_projection(&self.layout),
            rows,
        };
        Ok(acknowledged(
            self.entity.client().batch_insert(request).await,
            &self.action("batch insert"),
        ))
    }

    async fn update(&self, item: &Descriptor) -> Result<bool> {
        check_writable(&self.layout, item)?;
        let request = proto::UpdateRequest {
            entity: Some(self.entity.name()),
            r#where: Some(translate::id_equals(DESCRIPTOR_ID_COLUMN, item.id())),
            values: translate::descriptor_values(item),
            upsert: true,
        };
        Ok(acknowledged(
            self.entity.client().update(request).await,
            &self.action("update"),
        ))
    }

    async fn delete(&self, item: &Descriptor) -> Result<bool> {
        self.delete_all(std::slice::from_ref(item)).await
    }

    async fn delete_all(&self, items: &[Descriptor]) -> Result<bool> {
        if items.is_empty() {
            return Ok(true);
        }
        let ids: Vec<DescriptorId> = items.iter().map(Descriptor::id).collect();
        let request = proto::DeleteRequest {
            entity: Some(self.entity.name()),
            r#where: Some(translate::id_in(DESCRIPTOR_ID_COLUMN, &ids)),
        };
        Ok(acknowledged(
            self.entity.client().delete(request).await,
            &self.action("delete"),
        ))
    }
}
