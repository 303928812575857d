use async_stream::stream;
use async_trait::async_trait;
use mediax_core::{
    Initializer, Relationship, RelationshipStream, Result, Retrievable, RetrievableId,
    RetrievableReader, RetrievableStream, RetrievableWriter,
};
use std::sync::Arc;
use tracing::{error, warn};

use super::store::{RetrievableTable, Store};

pub struct MemoryRetrievableInitializer {
    pub(crate) store: Arc<Store>,
}

#[async_trait]
impl Initializer for MemoryRetrievableInitializer {
    async fn initialize(&self) -> Result<()> {
        let mut retrievables = self.store.retrievables.write();
        if retrievables.is_none() {
            *retrievables = Some(RetrievableTable::default());
        }
        Ok(())
    }

    async fn deinitialize(&self) -> Result<()> {
        *self.store.retrievables.write() = None;
        Ok(())
    }

    async fn truncate(&self) -> Result<()> {
        if let Some(table) = self.store.retrievables.write().as_mut() {
            table.rows.clear();
            table.relationships.clear();
        }
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        self.store.retrievables.read().is_some()
    }
}

pub struct MemoryRetrievableReader {
    pub(crate) store: Arc<Store>,
}

impl MemoryRetrievableReader {
    fn scan<F>(&self, predicate: F) -> RetrievableStream
    where
        F: Fn(&RetrievableId) -> bool + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        Box::pin(stream! {
            let rows: Vec<Retrievable> = match store.retrievables.read().as_ref() {
                Some(table) => table
                    .rows
                    .iter()
                    .filter(|(id, _)| predicate(id))
                    .map(|(id, kind)| Retrievable::with_identity(*id, kind.clone(), false))
                    .collect(),
                None => {
                    warn!("Retrievable entity is not initialized");
                    Vec::new()
                }
            };
            for row in rows {
                yield row;
            }
        })
    }
}

#[async_trait]
impl RetrievableReader for MemoryRetrievableReader {
    async fn get(&self, id: RetrievableId) -> Option<Retrievable> {
        let guard = self.store.retrievables.read();
        let kind = guard.as_ref()?.rows.get(&id)?.clone();
        Some(Retrievable::with_identity(id, kind, false))
    }

    async fn exists(&self, id: RetrievableId) -> bool {
        self.store
            .retrievables
            .read()
            .as_ref()
            .map_or(false, |t| t.rows.contains_key(&id))
    }

    fn get_all(&self) -> RetrievableStream {
        self.scan(|_| true)
    }

    fn get_all_by_ids(&self, ids: Vec<RetrievableId>) -> RetrievableStream {
        let ids: ahash::AHashSet<RetrievableId> = ids.into_iter().collect();
        self.scan(move |id| ids.contains(id))
    }

    async fn count(&self) -> u64 {
        self.store
            .retrievables
            .read()
            .as_ref()
            .map_or(0, |t| t.rows.len() as u64)
    }

    fn get_relationships(
        &self,
        subjects: Vec<RetrievableId>,
        predicates: Vec<String>,
        objects: Vec<RetrievableId>,
    ) -> RelationshipStream {
        let store = Arc::clone(&self.store);
        Box::pin(stream! {
            let matching: Vec<Relationship> = store
                .retrievables
                .read()
                .as_ref()
                .map(|t| {
                    t.relationships
                        .iter()
                        .filter(|r| subjects.is_empty() || subjects.contains(&r.subject))
                        .filter(|r| predicates.is_empty() || predicates.contains(&r.predicate))
                        .filter(|r| objects.is_empty() || objects.contains(&r.object))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            for relationship in matching {
                yield relationship;
            }
        })
    }
}

pub struct MemoryRetrievableWriter {
    pub(crate) store: Arc<Store>,
}

impl MemoryRetrievableWriter {
    fn with_table<T>(&self, f: impl FnOnce(&mut RetrievableTable) -> T) -> Option<T> {
        let mut guard = self.store.retrievables.write();
        match guard.as_mut() {
            Some(table) => Some(f(table)),
            None => {
                error!("Cannot write retrievables: entity not initialized");
                None
            }
        }
    }
}

#[async_trait]
impl RetrievableWriter for MemoryRetrievableWriter {
    async fn add(&self, item: &Retrievable) -> Result<bool> {
        self.add_all(std::slice::from_ref(item)).await
    }

    async fn add_all(&self, items: &[Retrievable]) -> Result<bool> {
        Ok(self
            .with_table(|table| {
                if let Some(duplicate) = items.iter().find(|r| table.rows.contains_key(&r.id())) {
                    error!("Failed to insert retrievable: duplicate id {}", duplicate.id());
                    return false;
                }
                for item in items {
                    table.rows.insert(item.id(), item.kind().map(str::to_string));
                }
                true
            })
            .unwrap_or(false))
    }

    async fn update(&self, item: &Retrievable) -> Result<bool> {
        Ok(self
            .with_table(|table| {
                table.rows.insert(item.id(), item.kind().map(str::to_string));
            })
            .is_some())
    }

    async fn delete(&self, item: &Retrievable) -> Result<bool> {
        let id = item.id();
        let deleted = self
            .with_table(|table| {
                table.rows.remove(&id);
                table.relationships.retain(|r| r.subject != id && r.object != id);
            })
            .is_some();
        if deleted {
            for table in self.store.tables() {
                table.remove_for_retrievable(id);
            }
        }
        Ok(deleted)
    }

    async fn connect(&self, relationship: &Relationship) -> Result<bool> {
        self.connect_all(std::slice::from_ref(relationship)).await
    }

    async fn connect_all(&self, relationships: &[Relationship]) -> Result<bool> {
        Ok(self
            .with_table(|table| {
                for r in relationships {
                    if !table.rows.contains_key(&r.subject) || !table.rows.contains_key(&r.object) {
                        error!(
                            "Cannot connect {} -[{}]-> {}: unknown retrievable",
                            r.subject, r.predicate, r.object
                        );
                        return false;
                    }
                }
                for r in relationships {
                    if !table.relationships.contains(r) {
                        table.relationships.push(r.clone());
                    }
                }
                true
            })
            .unwrap_or(false))
    }

    async fn disconnect(&self, relationship: &Relationship) -> Result<bool> {
        Ok(self
            .with_table(|table| table.relationships.retain(|r| r != relationship))
            .is_some())
    }
}
