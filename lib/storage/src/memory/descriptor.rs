use async_stream::stream;
use async_trait::async_trait;
use mediax_core::{
    effective_limit, Attribute, Descriptor, DescriptorId, DescriptorReader, DescriptorStream, DescriptorWriter,
    Initializer, Layout, ProximityQuery, Query, Result, Retrievable, RetrievableAttribute,
    RetrievableId, RetrievableStream, SimpleBooleanQuery, SimpleFulltextQuery, SortOrder,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::store::{DescriptorTable, Store};
use super::{filter, metric};
use crate::check_writable;

pub struct MemoryDescriptorInitializer {
    pub(crate) entity: String,
    pub(crate) layout: Layout,
    pub(crate) store: Arc<Store>,
}

#[async_trait]
impl Initializer for MemoryDescriptorInitializer {
    async fn initialize(&self) -> Result<()> {
        self.store.create_table(&self.entity, &self.layout)?;
        debug!("Initialized entity '{}'", self.entity);
        Ok(())
    }

    async fn deinitialize(&self) -> Result<()> {
        if !self.store.drop_table(&self.entity) {
            debug!("Entity '{}' was not initialized", self.entity);
        }
        Ok(())
    }

    async fn truncate(&self) -> Result<()> {
        if let Some(table) = self.store.table(&self.entity) {
            table.clear();
        }
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        self.store.table(&self.entity).is_some()
    }
}

/// A matching row of a query.
struct Hit {
    retrievable_id: RetrievableId,
    descriptor: Option<Descriptor>,
    attribute: Option<RetrievableAttribute>,
}

pub struct MemoryDescriptorReader {
    pub(crate) field: String,
    pub(crate) entity: String,
    pub(crate) layout: Layout,
    pub(crate) store: Arc<Store>,
}

impl MemoryDescriptorReader {
    fn table(&self) -> Option<Arc<DescriptorTable>> {
        let table = self.store.table(&self.entity);
        if table.is_none() {
            warn!("Entity '{}' is not initialized", self.entity);
        }
        table
    }

    fn scan<F>(&self, predicate: F) -> DescriptorStream
    where
        F: Fn(&Descriptor) -> bool + Send + 'static,
    {
        let table = self.table();
        Box::pin(stream! {
            let Some(table) = table else { return };
            let rows: Vec<Descriptor> = table
                .rows
                .read()
                .values()
                .filter(|d| predicate(d))
                .cloned()
                .collect();
            for row in rows {
                yield row;
            }
        })
    }
}

#[async_trait]
impl DescriptorReader for MemoryDescriptorReader {
    fn field(&self) -> &str {
        &self.field
    }

    fn layout(&self) -> &Layout {
        &self.layout
    }

    async fn get(&self, id: DescriptorId) -> Option<Descriptor> {
        self.table()?.rows.read().get(&id).cloned()
    }

    async fn exists(&self, id: DescriptorId) -> bool {
        self.table()
            .map(|t| t.rows.read().contains_key(&id))
            .unwrap_or(false)
    }

    fn get_all(&self) -> DescriptorStream {
        self.scan(|_| true)
    }

    fn get_all_by_ids(&self, ids: Vec<DescriptorId>) -> DescriptorStream {
        let ids: ahash::AHashSet<DescriptorId> = ids.into_iter().collect();
        self.scan(move |d| ids.contains(&d.id()))
    }

    fn get_all_for_retrievables(&self, ids: Vec<RetrievableId>) -> DescriptorStream {
        let ids: ahash::AHashSet<RetrievableId> = ids.into_iter().collect();
        self.scan(move |d| d.retrievable_id().map_or(false, |r| ids.contains(&r)))
    }

    async fn count(&self) -> u64 {
        self.table().map(|t| t.rows.read().len() as u64).unwrap_or(0)
    }

    fn query(&self, query: &Query) -> Result<RetrievableStream> {
        let attribute = query.validate(&self.layout)?;
        let table = self.table();
        let store = Arc::clone(&self.store);
        let query = query.clone();
        Ok(Box::pin(stream! {
            let Some(table) = table else { return };
            let hits = match &query {
                Query::Proximity(q) => proximity(&table, &attribute, q),
                Query::Boolean(q) => boolean(&table, &attribute, q),
                Query::Fulltext(q) => fulltext(&table, &attribute, q),
            };
            for hit in hits {
                yield to_result(&store, hit);
            }
        }))
    }
}

fn proximity(table: &DescriptorTable, attribute: &Attribute, query: &ProximityQuery) -> Vec<Hit> {
    let Some(reference) = query.value.as_f64_vector() else {
        return Vec::new();
    };
    let rows = table.rows.read();
    let mut scored: Vec<(f64, &Descriptor)> = rows
        .values()
        .filter_map(|d| {
            let vector = d.value(&attribute.name)?.as_f64_vector()?;
            Some((metric::distance(query.distance, &vector, &reference), d))
        })
        .collect();
    scored.sort_by(|a, b| {
        let ordering = a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal);
        match query.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    scored
        .into_iter()
        .take(effective_limit(query.limit) as usize)
        .filter_map(|(distance, d)| {
            Some(Hit {
                retrievable_id: d.retrievable_id()?,
                descriptor: query.fetch_vector.then(|| d.clone()),
                attribute: Some(RetrievableAttribute::Distance(distance as f32)),
            })
        })
        .collect()
}

fn boolean(table: &DescriptorTable, attribute: &Attribute, query: &SimpleBooleanQuery) -> Vec<Hit> {
    table
        .rows
        .read()
        .values()
        .filter(|d| filter::matches(query.comparison, d.value(&attribute.name), &query.value))
        .filter_map(|d| {
            Some(Hit {
                retrievable_id: d.retrievable_id()?,
                descriptor: Some(d.clone()),
                attribute: None,
            })
        })
        .take(effective_limit(query.limit) as usize)
        .collect()
}

fn fulltext(table: &DescriptorTable, attribute: &Attribute, query: &SimpleFulltextQuery) -> Vec<Hit> {
    let scores = match table.fulltext.read().get(&attribute.name) {
        Some(index) => index.search(&query.text, effective_limit(query.limit) as usize),
        None => return Vec::new(),
    };
    let rows = table.rows.read();
    scores
        .into_iter()
        .filter_map(|(key, score)| {
            let id: DescriptorId = key.parse().ok()?;
            let d = rows.get(&id)?;
            Some(Hit {
                retrievable_id: d.retrievable_id()?,
                descriptor: Some(d.clone()),
                attribute: Some(RetrievableAttribute::Score(score)),
            })
        })
        .collect()
}

fn to_result(store: &Store, hit: Hit) -> Retrievable {
    let kind = store
        .retrievables
        .read()
        .as_ref()
        .and_then(|t| t.rows.get(&hit.retrievable_id).cloned())
        .flatten();
    let mut retrievable = Retrievable::with_identity(hit.retrievable_id, kind, false);
    if let Some(descriptor) = hit.descriptor {
        retrievable.add_descriptor(descriptor);
    }
    if let Some(attribute) = hit.attribute {
        retrievable.add_attribute(attribute);
    }
    retrievable
}

pub struct MemoryDescriptorWriter {
    pub(crate) field: String,
    pub(crate) entity: String,
    pub(crate) layout: Layout,
    pub(crate) store: Arc<Store>,
}

impl MemoryDescriptorWriter {
    fn table(&self) -> Option<Arc<DescriptorTable>> {
        let table = self.store.table(&self.entity);
        if table.is_none() {
            error!("Cannot write to entity '{}': not initialized", self.entity);
        }
        table
    }

    fn prepare(&self, item: &Descriptor) -> Result<Descriptor> {
        check_writable(&self.layout, item)?;
        Ok(item.clone().with_field(self.field.clone()))
    }
}

#[async_trait]
impl DescriptorWriter for MemoryDescriptorWriter {
    async fn add(&self, item: &Descriptor) -> Result<bool> {
        self.add_all(std::slice::from_ref(item)).await
    }

    async fn add_all(&self, items: &[Descriptor]) -> Result<bool> {
        let prepared = items
            .iter()
            .map(|d| self.prepare(d))
            .collect::<Result<Vec<_>>>()?;
        let Some(table) = self.table() else {
            return Ok(false);
        };
        {
            let rows = table.rows.read();
            if let Some(duplicate) = prepared.iter().find(|d| rows.contains_key(&d.id())) {
                error!(
                    "Failed to insert into '{}': duplicate descriptor id {}",
                    self.entity,
                    duplicate.id()
                );
                return Ok(false);
            }
        }
        for descriptor in prepared {
            table.upsert(descriptor);
        }
        Ok(true)
    }

    async fn update(&self, item: &Descriptor) -> Result<bool> {
        let descriptor = self.prepare(item)?;
        let Some(table) = self.table() else {
            return Ok(false);
        };
        table.upsert(descriptor);
        Ok(true)
    }

    async fn delete(&self, item: &Descriptor) -> Result<bool> {
        self.delete_all(std::slice::from_ref(item)).await
    }

    async fn delete_all(&self, items: &[Descriptor]) -> Result<bool> {
        let Some(table) = self.table() else {
            return Ok(false);
        };
        for item in items {
            table.remove(item.id());
        }
        Ok(true)
    }
}
