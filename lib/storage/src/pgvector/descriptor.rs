use async_trait::async_trait;
use futures::StreamExt;
use mediax_core::descriptor::{DESCRIPTOR_ID_COLUMN, RETRIEVABLE_ID_COLUMN};
use mediax_core::{
    Descriptor, DescriptorId, DescriptorReader, DescriptorStream, DescriptorWriter, Initializer,
    Layout, Query, Result, Retrievable, RetrievableAttribute, RetrievableId, RetrievableStream,
};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::warn;
use uuid::Uuid;

use super::sql::{self, DISTANCE_COLUMN, SCORE_COLUMN};
use super::{bind, Database};
use crate::check_writable;

pub struct PgDescriptorInitializer {
    pub(crate) database: Database,
    pub(crate) entity: String,
    pub(crate) layout: Layout,
}

#[async_trait]
impl Initializer for PgDescriptorInitializer {
    async fn initialize(&self) -> Result<()> {
        self.database.create_schema().await?;
        let statements = sql::create_descriptor_table(&self.database.schema, &self.entity, &self.layout);
        self.database
            .run_ddl(statements, &format!("create table '{}'", self.entity))
            .await
    }

    async fn deinitialize(&self) -> Result<()> {
        self.database
            .run_ddl(
                vec![sql::drop_table(&self.database.schema, &self.entity)],
                &format!("drop table '{}'", self.entity),
            )
            .await
    }

    async fn truncate(&self) -> Result<()> {
        if !self.database.table_exists(&self.entity).await {
            return Ok(());
        }
        self.database
            .run_ddl(
                vec![sql::truncate_table(&self.database.schema, &self.entity)],
                &format!("truncate table '{}'", self.entity),
            )
            .await
    }

    async fn is_initialized(&self) -> bool {
        self.database.table_exists(&self.entity).await
    }
}

pub struct PgDescriptorReader {
    pub(crate) database: Database,
    pub(crate) field: String,
    pub(crate) entity: String,
    pub(crate) layout: Layout,
}

impl PgDescriptorReader {
    fn select(&self, filter: Option<(&str, Vec<Uuid>)>) -> DescriptorStream {
        let statement = sql::select_descriptors(&self.database.schema, &self.entity, &self.layout, filter);
        let layout = self.layout.clone();
        let field = self.field.clone();
        Box::pin(self.database.fetch(statement).filter_map(move |row| {
            let descriptor = match bind::descriptor(&row, &layout, &field) {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!("Skipping malformed row of field '{}': {}", field, e);
                    None
                }
            };
            futures::future::ready(descriptor)
        }))
    }
}

#[async_trait]
impl DescriptorReader for PgDescriptorReader {
    fn field(&self) -> &str {
        &self.field
    }

    fn layout(&self) -> &Layout {
        &self.layout
    }

    async fn get(&self, id: DescriptorId) -> Option<Descriptor> {
        self.select(Some((DESCRIPTOR_ID_COLUMN, vec![id]))).next().await
    }

    async fn exists(&self, id: DescriptorId) -> bool {
        self.get(id).await.is_some()
    }

    fn get_all(&self) -> DescriptorStream {
        self.select(None)
    }

    fn get_all_by_ids(&self, ids: Vec<DescriptorId>) -> DescriptorStream {
        if ids.is_empty() {
            return Box::pin(futures::stream::empty());
        }
        self.select(Some((DESCRIPTOR_ID_COLUMN, ids)))
    }

    fn get_all_for_retrievables(&self, ids: Vec<RetrievableId>) -> DescriptorStream {
        if ids.is_empty() {
            return Box::pin(futures::stream::empty());
        }
        self.select(Some((RETRIEVABLE_ID_COLUMN, ids)))
    }

    async fn count(&self) -> u64 {
        self.database.count(&self.entity).await
    }

    fn query(&self, query: &Query) -> Result<RetrievableStream> {
        let attribute = query.validate(&self.layout)?;
        let statement = sql::query(&self.database.schema, &self.entity, &self.layout, &attribute, query)?;
        let (with_descriptor, distance, score) = match query {
            Query::Proximity(q) => (q.fetch_vector, true, false),
            Query::Boolean(_) => (true, false, false),
            Query::Fulltext(_) => (true, false, true),
        };
        let layout = self.layout.clone();
        let field = self.field.clone();
        Ok(Box::pin(self.database.fetch(statement).filter_map(move |row| {
            let result = to_result(&row, &layout, &field, with_descriptor, distance, score);
            if let Err(e) = &result {
                warn!("Skipping malformed result of field '{}': {}", field, e);
            }
            futures::future::ready(result.ok())
        })))
    }
}

fn to_result(
    row: &PgRow,
    layout: &Layout,
    field: &str,
    with_descriptor: bool,
    distance: bool,
    score: bool,
) -> Result<Retrievable> {
    let mut retrievable = Retrievable::with_identity(bind::uuid(row, RETRIEVABLE_ID_COLUMN)?, None, false);
    if with_descriptor {
        retrievable.add_descriptor(bind::descriptor(row, layout, field)?);
    }
    if distance {
        if let Ok(d) = row.try_get::<f64, _>(DISTANCE_COLUMN) {
            retrievable.add_attribute(RetrievableAttribute::Distance(d as f32));
        }
    }
    if score {
        if let Ok(s) = row.try_get::<f64, _>(SCORE_COLUMN) {
            retrievable.add_attribute(RetrievableAttribute::Score(s as f32));
        }
    }
    Ok(retrievable)
}

pub struct PgDescriptorWriter {
    pub(crate) database: Database,
    pub(crate) field: String,
    pub(crate) entity: String,
    pub(crate) layout: Layout,
}

impl PgDescriptorWriter {
    fn action(&self, verb: &str) -> String {
        format!("{} descriptors of '{}'", verb, self.field)
    }
}

#[async_trait]
impl DescriptorWriter for PgDescriptorWriter {
    async fn add(&self, item: &Descriptor) -> Result<bool> {
        self.add_all(std::slice::from_ref(item)).await
    }

    async fn add_all(&self, items: &[Descriptor]) -> Result<bool> {
        for item in items {
            check_writable(&self.layout, item)?;
        }
        if items.is_empty() {
            return Ok(true);
        }
        let statements = sql::insert_descriptors(&self.database.schema, &self.entity, &self.layout, items);
        Ok(self.database.write(statements, &self.action("insert")).await)
    }

    async fn update(&self, item: &Descriptor) -> Result<bool> {
        check_writable(&self.layout, item)?;
        let statement = sql::upsert_descriptor(&self.database.schema, &self.entity, &self.layout, item);
        Ok(self.database.write(vec![statement], &self.action("update")).await)
    }

    async fn delete(&self, item: &Descriptor) -> Result<bool> {
        self.delete_all(std::slice::from_ref(item)).await
    }

    async fn delete_all(&self, items: &[Descriptor]) -> Result<bool> {
        if items.is_empty() {
            return Ok(true);
        }
        let ids = items.iter().map(Descriptor::id).collect();
        let statement = sql::delete_by_ids(&self.database.schema, &self.entity, DESCRIPTOR_ID_COLUMN, ids);
        Ok(self.database.write(vec![statement], &self.action("delete")).await)
    }
}
