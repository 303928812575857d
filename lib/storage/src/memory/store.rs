use ahash::AHashMap;
use mediax_core::{
    Descriptor, DescriptorId, Layout, Relationship, Result, RetrievableId, Type,
};
use parking_lot::RwLock;
use std::sync::Arc;

use super::bm25::Bm25Index;

/// Rows of one field, plus a fulltext index per `TEXT` attribute.
pub(crate) struct DescriptorTable {
    pub layout: Layout,
    pub rows: RwLock<AHashMap<DescriptorId, Descriptor>>,
    pub fulltext: RwLock<AHashMap<String, Bm25Index>>,
}

impl DescriptorTable {
    fn new(layout: Layout) -> Self {
        let fulltext = layout
            .attributes()
            .into_iter()
            .filter(|a| a.ty == Type::Text)
            .map(|a| (a.name, Bm25Index::new()))
            .collect();
        Self {
            layout,
            rows: RwLock::new(AHashMap::new()),
            fulltext: RwLock::new(fulltext),
        }
    }

    /// Inserts or replaces a row, keeping the fulltext indexes in sync.
    pub fn upsert(&self, descriptor: Descriptor) {
        let key = descriptor.id().to_string();
        {
            let mut fulltext = self.fulltext.write();
            for (attribute, index) in fulltext.iter_mut() {
                match descriptor.value(attribute).and_then(|v| v.as_str()) {
                    Some(text) => index.insert_doc(&key, text),
                    None => index.delete_doc(&key),
                }
            }
        }
        self.rows.write().insert(descriptor.id(), descriptor);
    }

    pub fn remove(&self, id: DescriptorId) -> bool {
        let key = id.to_string();
        for index in self.fulltext.write().values_mut() {
            index.delete_doc(&key);
        }
        self.rows.write().remove(&id).is_some()
    }

    pub fn remove_for_retrievable(&self, retrievable: RetrievableId) {
        let ids: Vec<DescriptorId> = self
            .rows
            .read()
            .values()
            .filter(|d| d.retrievable_id() == Some(retrievable))
            .map(|d| d.id())
            .collect();
        for id in ids {
            self.remove(id);
        }
    }

    pub fn clear(&self) {
        self.rows.write().clear();
        for index in self.fulltext.write().values_mut() {
            *index = Bm25Index::new();
        }
    }
}

#[derive(Default)]
pub(crate) struct RetrievableTable {
    pub rows: AHashMap<RetrievableId, Option<String>>,
    pub relationships: Vec<Relationship>,
}

/// Process-local storage shared by every reader and writer of a connection.
#[derive(Default)]
pub(crate) struct Store {
    tables: RwLock<AHashMap<String, Arc<DescriptorTable>>>,
    pub retrievables: RwLock<Option<RetrievableTable>>,
}

impl Store {
    pub fn table(&self, entity: &str) -> Option<Arc<DescriptorTable>> {
        self.tables.read().get(entity).cloned()
    }

    /// Creates the table if absent. An existing table with another layout is an error.
    pub fn create_table(&self, entity: &str, layout: &Layout) -> Result<()> {
        let mut tables = self.tables.write();
        if let Some(existing) = tables.get(entity) {
            if &existing.layout != layout {
                return Err(mediax_core::Error::LayoutMismatch(format!(
                    "entity '{}' already exists with a different layout",
                    entity
                )));
            }
            return Ok(());
        }
        tables.insert(entity.to_string(), Arc::new(DescriptorTable::new(layout.clone())));
        Ok(())
    }

    pub fn drop_table(&self, entity: &str) -> bool {
        self.tables.write().remove(entity).is_some()
    }

    pub fn tables(&self) -> Vec<Arc<DescriptorTable>> {
        self.tables.read().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.tables.write().clear();
        *self.retrievables.write() = None;
    }
}
