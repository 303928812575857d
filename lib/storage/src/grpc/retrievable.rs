use async_trait::async_trait;
use futures::StreamExt;
use mediax_core::database::{
    DESCRIPTOR_ENTITY_PREFIX, OBJECT_COLUMN, PREDICATE_COLUMN, RELATIONSHIP_ENTITY,
    RETRIEVABLE_ENTITY, SUBJECT_COLUMN, TYPE_COLUMN,
};
use mediax_core::descriptor::RETRIEVABLE_ID_COLUMN;
use mediax_core::{
    Initializer, Relationship, RelationshipStream, Result, Retrievable, RetrievableId,
    RetrievableReader, RetrievableStream, RetrievableWriter, Type, Value,
};
use tracing::{debug, warn};

use super::translate::{self, RowView};
use super::{acknowledged, create_schema, list_entities, proto, tolerate, Entity, StoreClient};

fn retrievable_columns() -> Vec<proto::ColumnDefinition> {
    vec![
        translate::column(RETRIEVABLE_ID_COLUMN, &Type::Uuid, false, true),
        translate::column(TYPE_COLUMN, &Type::String, true, false),
    ]
}

fn relationship_columns() -> Vec<proto::ColumnDefinition> {
    vec![
        translate::column(SUBJECT_COLUMN, &Type::Uuid, false, false),
        translate::column(PREDICATE_COLUMN, &Type::String, false, false),
        translate::column(OBJECT_COLUMN, &Type::Uuid, false, false),
    ]
}

fn kind_literal(item: &Retrievable) -> proto::Literal {
    translate::optional_literal(item.kind().map(Value::from).as_ref())
}

fn relationship_row(r: &Relationship) -> proto::Row {
    proto::Row {
        values: vec![
            translate::literal(&Value::Uuid(r.subject)),
            translate::literal(&Value::String(r.predicate.clone())),
            translate::literal(&Value::Uuid(r.object)),
        ],
    }
}

fn relationship_predicate(r: &Relationship) -> Option<proto::Predicate> {
    translate::and(vec![
        translate::id_equals(SUBJECT_COLUMN, r.subject),
        translate::compare(
            PREDICATE_COLUMN,
            proto::CompareOperator::Equal,
            &Value::String(r.predicate.clone()),
        ),
        translate::id_equals(OBJECT_COLUMN, r.object),
    ])
}

pub struct GrpcRetrievableInitializer {
    retrievables: Entity,
    relationships: Entity,
}

impl GrpcRetrievableInitializer {
    pub(crate) fn new(client: &StoreClient, schema: &str) -> Self {
        Self {
            retrievables: Entity::new(client, schema, RETRIEVABLE_ENTITY),
            relationships: Entity::new(client, schema, RELATIONSHIP_ENTITY),
        }
    }

    async fn create(&self, entity: &Entity, columns: Vec<proto::ColumnDefinition>) -> Result<()> {
        let request = proto::CreateEntityRequest {
            entity: Some(entity.name()),
            columns,
            if_not_exists: true,
        };
        tolerate(
            entity.client().create_entity(request).await,
            tonic::Code::AlreadyExists,
            &format!("create entity {}", entity.name),
        )
    }
}

#[async_trait]
impl Initializer for GrpcRetrievableInitializer {
    async fn initialize(&self) -> Result<()> {
        create_schema(&self.retrievables.client, &self.retrievables.schema).await?;

        self.create(&self.retrievables, retrievable_columns()).await?;
        self.retrievables
            .create_index(TYPE_COLUMN, proto::IndexType::Btree)
            .await?;

        self.create(&self.relationships, relationship_columns()).await?;
        for column in [SUBJECT_COLUMN, PREDICATE_COLUMN, OBJECT_COLUMN] {
            self.relationships
                .create_index(column, proto::IndexType::Btree)
                .await?;
        }
        debug!("Initialized retrievable entities of '{}'", self.retrievables.schema);
        Ok(())
    }

    async fn deinitialize(&self) -> Result<()> {
        self.relationships.drop_entity().await?;
        self.retrievables.drop_entity().await
    }

    async fn truncate(&self) -> Result<()> {
        self.relationships.truncate().await?;
        self.retrievables.truncate().await
    }

    async fn is_initialized(&self) -> bool {
        match list_entities(&self.retrievables.client, &self.retrievables.schema).await {
            Some(names) => {
                names.iter().any(|n| n == RETRIEVABLE_ENTITY) && names.iter().any(|n| n == RELATIONSHIP_ENTITY)
            }
            None => false,
        }
    }
}

pub struct GrpcRetrievableReader {
    retrievables: Entity,
    relationships: Entity,
}

impl GrpcRetrievableReader {
    pub(crate) fn new(client: &StoreClient, schema: &str) -> Self {
        Self {
            retrievables: Entity::new(client, schema, RETRIEVABLE_ENTITY),
            relationships: Entity::new(client, schema, RELATIONSHIP_ENTITY),
        }
    }

    fn select(&self, predicate: Option<proto::Predicate>, limit: u64) -> RetrievableStream {
        let request = proto::QueryRequest {
            entity: Some(self.retrievables.name()),
            projection: vec![RETRIEVABLE_ID_COLUMN.to_string(), TYPE_COLUMN.to_string()],
            r#where: predicate,
            limit,
            ..Default::default()
        };
        Box::pin(self.retrievables.rows(request).filter_map(|(columns, row)| {
            let view = RowView { columns: &columns, row: &row };
            let retrievable = match read_retrievable(&view) {
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

fn read_retrievable(view: &RowView<'_>) -> Result<Retrievable> {
    let id = view.uuid(RETRIEVABLE_ID_COLUMN)?;
    let kind = match view.get(TYPE_COLUMN) {
        Some(literal) => translate::value(literal, &Type::String)?.and_then(|v| v.as_str().map(str::to_string)),
        None => None,
    };
    Ok(Retrievable::with_identity(id, kind, false))
}

fn read_relationship(view: &RowView<'_>) -> Result<Relationship> {
    let predicate = view
        .get(PREDICATE_COLUMN)
        .map(|literal| translate::value(literal, &Type::String))
        .transpose()?
        .flatten()
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| mediax_core::Error::Backend("relationship without predicate".into()))?;
    Ok(Relationship::new(
        view.uuid(SUBJECT_COLUMN)?,
        predicate,
        view.uuid(OBJECT_COLUMN)?,
    ))
}

#[async_trait]
impl RetrievableReader for GrpcRetrievableReader {
    async fn get(&self, id: RetrievableId) -> Option<Retrievable> {
        self.select(Some(translate::id_equals(RETRIEVABLE_ID_COLUMN, id)), 1)
            .next()
            .await
    }

    async fn exists(&self, id: RetrievableId) -> bool {
        self.retrievables
            .count(Some(translate::id_equals(RETRIEVABLE_ID_COLUMN, id)))
            .await
            > 0
    }

    fn get_all(&self) -> RetrievableStream {
        self.select(None, 0)
    }

    fn get_all_by_ids(&self, ids: Vec<RetrievableId>) -> RetrievableStream {
        if ids.is_empty() {
            return Box::pin(futures::stream::empty());
        }
        self.select(Some(translate::id_in(RETRIEVABLE_ID_COLUMN, &ids)), 0)
    }

    async fn count(&self) -> u64 {
        self.retrievables.count(None).await
    }

    fn get_relationships(
        &self,
        subjects: Vec<RetrievableId>,
        predicates: Vec<String>,
        objects: Vec<RetrievableId>,
    ) -> RelationshipStream {
        let mut filters = Vec::new();
        if !subjects.is_empty() {
            filters.push(translate::id_in(SUBJECT_COLUMN, &subjects));
        }
        if !predicates.is_empty() {
            filters.push(translate::one_of(
                PREDICATE_COLUMN,
                predicates.into_iter().map(Value::String),
            ));
        }
        if !objects.is_empty() {
            filters.push(translate::id_in(OBJECT_COLUMN, &objects));
        }
        let request = proto::QueryRequest {
            entity: Some(self.relationships.name()),
            projection: vec![
                SUBJECT_COLUMN.to_string(),
                PREDICATE_COLUMN.to_string(),
                OBJECT_COLUMN.to_string(),
            ],
            r#where: translate::and(filters),
            ..Default::default()
        };
        Box::pin(self.relationships.rows(request).filter_map(|(columns, row)| {
            let view = RowView { columns: &columns, row: &row };
            let relationship = match read_relationship(&view) {
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

pub struct GrpcRetrievableWriter {
    retrievables: Entity,
    relationships: Entity,
}

impl GrpcRetrievableWriter {
    pub(crate) fn new(client: &StoreClient, schema: &str) -> Self {
        Self {
            retrievables: Entity::new(client, schema, RETRIEVABLE_ENTITY),
            relationships: Entity::new(client, schema, RELATIONSHIP_ENTITY),
        }
    }

    async fn delete_where(&self, entity: &Entity, predicate: proto::Predicate) -> bool {
        let request = proto::DeleteRequest {
            entity: Some(entity.name()),
            r#where: Some(predicate),
        };
        acknowledged(
            entity.client().delete(request).await,
            &format!("delete from {}", entity.name),
        )
    }
}

#[async_trait]
impl RetrievableWriter for GrpcRetrievableWriter {
    async fn add(&self, item: &Retrievable) -> Result<bool> {
        self.add_all(std::slice::from_ref(item)).await
    }

    async fn add_all(&self, items: &[Retrievable]) -> Result<bool> {
        if items.is_empty() {
            return Ok(true);
        }
        let request = proto::BatchInsertRequest {
            entity: Some(self.retrievables.name()),
            columns: vec![RETRIEVABLE_ID_COLUMN.to_string(), TYPE_COLUMN.to_string()],
            rows: items
                .iter()
                .map(|item| proto::Row {
                    values: vec![translate::literal(&Value::Uuid(item.id())), kind_literal(item)],
                })
                .collect(),
        };
        Ok(acknowledged(
            self.retrievables.client().batch_insert(request).await,
            "insert retrievables",
        ))
    }

    async fn update(&self, item: &Retrievable) -> Result<bool> {
        let request = proto::UpdateRequest {
            entity: Some(self.retrievables.name()),
            r#where: Some(translate::id_equals(RETRIEVABLE_ID_COLUMN, item.id())),
            values: vec![
                proto::ColumnValue {
                    column: RETRIEVABLE_ID_COLUMN.to_string(),
                    value: Some(translate::literal(&Value::Uuid(item.id()))),
                },
                proto::ColumnValue {
                    column: TYPE_COLUMN.to_string(),
                    value: Some(kind_literal(item)),
                },
            ],
            upsert: true,
        };
        Ok(acknowledged(
            self.retrievables.client().update(request).await,
            "update retrievable",
        ))
    }

    /// Removes the retrievable, the relationships it takes part in and the
    /// descriptors of every field that reference it.
    async fn delete(&self, item: &Retrievable) -> Result<bool> {
        let id = item.id();
        let mut ok = self
            .delete_where(&self.relationships, translate::id_equals(SUBJECT_COLUMN, id))
            .await;
        ok &= self
            .delete_where(&self.relationships, translate::id_equals(OBJECT_COLUMN, id))
            .await;

        let prefix = format!("{}_", DESCRIPTOR_ENTITY_PREFIX);
        let entities = list_entities(&self.retrievables.client, &self.retrievables.schema)
            .await
            .unwrap_or_default();
        for name in entities.into_iter().filter(|n| n.starts_with(&prefix)) {
            let entity = Entity::new(&self.retrievables.client, &self.retrievables.schema, name);
            ok &= self
                .delete_where(&entity, translate::id_equals(RETRIEVABLE_ID_COLUMN, id))
                .await;
        }

        ok &= self
            .delete_where(&self.retrievables, translate::id_equals(RETRIEVABLE_ID_COLUMN, id))
            .await;
        Ok(ok)
    }

    async fn connect(&self, relationship: &Relationship) -> Result<bool> {
        self.connect_all(std::slice::from_ref(relationship)).await
    }

    async fn connect_all(&self, relationships: &[Relationship]) -> Result<bool> {
        if relationships.is_empty() {
            return Ok(true);
        }
        let request = proto::BatchInsertRequest {
            entity: Some(self.relationships.name()),
            columns: vec![
                SUBJECT_COLUMN.to_string(),
                PREDICATE_COLUMN.to_string(),
                OBJECT_COLUMN.to_string(),
            ],
            rows: relationships.iter().map(relationship_row).collect(),
        };
        Ok(acknowledged(
            self.relationships.client().batch_insert(request).await,
            "insert relationships",
        ))
    }

    async fn disconnect(&self, relationship: &Relationship) -> Result<bool> {
        let Some(predicate) = relationship_predicate(relationship) else {
            return Ok(true);
        };
        Ok(self.delete_where(&self.relationships, predicate).await)
    }
}
