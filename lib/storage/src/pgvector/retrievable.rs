use async_trait::async_trait;
use futures::StreamExt;
use mediax_core::database::{
    OBJECT_COLUMN, PREDICATE_COLUMN, RELATIONSHIP_ENTITY, RETRIEVABLE_ENTITY, SUBJECT_COLUMN,
    TYPE_COLUMN,
};
use mediax_core::descriptor::RETRIEVABLE_ID_COLUMN;
use mediax_core::{
    Initializer, Relationship, RelationshipStream, Result, Retrievable, RetrievableId,
    RetrievableReader, RetrievableStream, RetrievableWriter,
};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::warn;

use super::{bind, sql, Database};

pub struct PgRetrievableInitializer {
    pub(crate) database: Database,
}

#[async_trait]
impl Initializer for PgRetrievableInitializer {
    async fn initialize(&self) -> Result<()> {
        self.database.create_schema().await?;
        self.database
            .run_ddl(
                sql::create_retrievable_table(&self.database.schema),
                "create retrievable tables",
            )
            .await
    }

    async fn deinitialize(&self) -> Result<()> {
        self.database
            .run_ddl(
                vec![
                    sql::drop_table(&self.database.schema, RELATIONSHIP_ENTITY),
                    sql::drop_table(&self.database.schema, RETRIEVABLE_ENTITY),
                ],
                "drop retrievable tables",
            )
            .await
    }

    async fn truncate(&self) -> Result<()> {
        if !self.is_initialized().await {
            return Ok(());
        }
        self.database
            .run_ddl(
                vec![
                    sql::truncate_table(&self.database.schema, RELATIONSHIP_ENTITY),
                    sql::truncate_table(&self.database.schema, RETRIEVABLE_ENTITY),
                ],
                "truncate retrievable tables",
            )
            .await
    }

    async fn is_initialized(&self) -> bool {
        self.database.table_exists(RETRIEVABLE_ENTITY).await
            && self.database.table_exists(RELATIONSHIP_ENTITY).await
    }
}

pub struct PgRetrievableReader {
    pub(crate) database: Database,
}

fn read_retrievable(row: &PgRow) -> Result<Retrievable> {
    let id = bind::uuid(row, RETRIEVABLE_ID_COLUMN)?;
    let kind = row.try_get::<Option<String>, _>(TYPE_COLUMN).ok().flatten();
    Ok(Retrievable::with_identity(id, kind, false))
}

fn read_relationship(row: &PgRow) -> Result<Relationship> {
    let predicate = row
        .try_get::<String, _>(PREDICATE_COLUMN)
        .map_err(|e| mediax_core::Error::Backend(format!("cannot decode predicate: {}", e)))?;
    Ok(Relationship::new(
        bind::uuid(row, SUBJECT_COLUMN)?,
        predicate,
        bind::uuid(row, OBJECT_COLUMN)?,
    ))
}

impl PgRetrievableReader {
    fn select(&self, ids: Option<Vec<RetrievableId>>) -> RetrievableStream {
        let statement = sql::select_retrievables(&self.database.schema, ids);
        Box::pin(self.database.fetch(statement).filter_map(|row| {
            let retrievable = match read_retrievable(&row) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!("Skipping malformed retrievable row: {}", e);
                    None
                }
            };
            futures::future::ready(retrievable)
        }))
    }
}

#[async_trait]
impl RetrievableReader for PgRetrievableReader {
    async fn get(&self, id: RetrievableId) -> Option<Retrievable> {
        self.select(Some(vec![id])).next().await
    }

    async fn exists(&self, id: RetrievableId) -> bool {
        self.get(id).await.is_some()
    }

    fn get_all(&self) -> RetrievableStream {
        self.select(None)
    }

    fn get_all_by_ids(&self, ids: Vec<RetrievableId>) -> RetrievableStream {
        if ids.is_empty() {
            return Box::pin(futures::stream::empty());
        }
        self.select(Some(ids))
    }

    async fn count(&self) -> u64 {
        self.database.count(RETRIEVABLE_ENTITY).await
    }

    fn get_relationships(
        &self,
        subjects: Vec<RetrievableId>,
        predicates: Vec<String>,
        objects: Vec<RetrievableId>,
    ) -> RelationshipStream {
        let statement = sql::select_relationships(&self.database.schema, subjects, predicates, objects);
        Box::pin(self.database.fetch(statement).filter_map(|row| {
            let relationship = match read_relationship(&row) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!("Skipping malformed relationship row: {}", e);
                    None
                }
            };
            futures::future::ready(relationship)
        }))
    }
}

pub struct PgRetrievableWriter {
    pub(crate) database: Database,
}

fn rows(items: &[Retrievable]) -> Vec<(RetrievableId, Option<String>)> {
    items
        .iter()
        .map(|r| (r.id(), r.kind().map(str::to_string)))
        .collect()
}

#[async_trait]
impl RetrievableWriter for PgRetrievableWriter {
    async fn add(&self, item: &Retrievable) -> Result<bool> {
        self.add_all(std::slice::from_ref(item)).await
    }

    async fn add_all(&self, items: &[Retrievable]) -> Result<bool> {
        if items.is_empty() {
            return Ok(true);
        }
        let statements = sql::insert_retrievables(&self.database.schema, &rows(items), false);
        Ok(self.database.write(statements, "insert retrievables").await)
    }

    async fn update(&self, item: &Retrievable) -> Result<bool> {
        let statements = sql::insert_retrievables(&self.database.schema, &rows(std::slice::from_ref(item)), true);
        Ok(self.database.write(statements, "update retrievable").await)
    }

    /// Relationships and descriptors go with the row through `ON DELETE CASCADE`.
    async fn delete(&self, item: &Retrievable) -> Result<bool> {
        let statement = sql::delete_by_ids(
            &self.database.schema,
            RETRIEVABLE_ENTITY,
            RETRIEVABLE_ID_COLUMN,
            vec![item.id()],
        );
        Ok(self.database.write(vec![statement], "delete retrievable").await)
    }

    async fn connect(&self, relationship: &Relationship) -> Result<bool> {
        self.connect_all(std::slice::from_ref(relationship)).await
    }

    async fn connect_all(&self, relationships: &[Relationship]) -> Result<bool> {
        if relationships.is_empty() {
            return Ok(true);
        }
        let rows: Vec<_> = relationships
            .iter()
            .map(|r| (r.subject, r.predicate.clone(), r.object))
            .collect();
        let statements = sql::insert_relationships(&self.database.schema, &rows);
        Ok(self.database.write(statements, "insert relationships").await)
    }

    async fn disconnect(&self, relationship: &Relationship) -> Result<bool> {
        let statement = sql::delete_relationship(
            &self.database.schema,
            relationship.subject,
            &relationship.predicate,
            relationship.object,
        );
        Ok(self.database.write(vec![statement], "delete relationship").await)
    }
}
