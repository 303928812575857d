//! Persistence contracts implemented by every storage backend.
//!
//! Transport faults never escape these traits as errors: implementations log
//! them and fall back to an empty stream, `0`, `None` or `false`. Argument errors
//! are returned before any backend call.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::descriptor::{Descriptor, DescriptorId, Layout};
use crate::error::Result;
use crate::query::Query;
use crate::retrievable::{Relationship, Retrievable, RetrievableId};

/// Name of the shared retrievable table.
pub const RETRIEVABLE_ENTITY: &str = "retrievable";

/// Name of the shared relationship table.
pub const RELATIONSHIP_ENTITY: &str = "relationships";

/// Prefix of per-field descriptor tables.
pub const DESCRIPTOR_ENTITY_PREFIX: &str = "descriptor";

/// Column of the retrievable table holding the type tag.
pub const TYPE_COLUMN: &str = "type";

/// Columns of the relationship table.
pub const SUBJECT_COLUMN: &str = "subject_id";
pub const PREDICATE_COLUMN: &str = "predicate";
pub const OBJECT_COLUMN: &str = "object_id";

/// Name of the table or entity storing the descriptors of a field.
pub fn descriptor_entity(field: &str) -> String {
    format!("{}_{}", DESCRIPTOR_ENTITY_PREFIX, field.to_lowercase())
}

pub type DescriptorStream = BoxStream<'static, Descriptor>;
pub type RetrievableStream = BoxStream<'static, Retrievable>;
pub type RelationshipStream = BoxStream<'static, Relationship>;

/// Provisions and tears down the storage of one entity.
///
/// All operations are idempotent: creating what exists or dropping what is
/// absent succeeds.
#[async_trait]
pub trait Initializer: Send + Sync {
    /// Creates tables and indexes if absent. Returns an error only for fatal
    /// conditions (unsupported types, invalid parameters, unreachable backend).
    async fn initialize(&self) -> Result<()>;

    async fn deinitialize(&self) -> Result<()>;

    /// Deletes all rows, keeping the schema.
    async fn truncate(&self) -> Result<()>;

    async fn is_initialized(&self) -> bool;
}

/// Reads descriptors of one field.
#[async_trait]
pub trait DescriptorReader: Send + Sync {
    fn field(&self) -> &str;

    fn layout(&self) -> &Layout;

    async fn get(&self, id: DescriptorId) -> Option<Descriptor>;

    async fn exists(&self, id: DescriptorId) -> bool;

    /// Lazily streams every descriptor of the field.
    fn get_all(&self) -> DescriptorStream;

    /// Streams the stored subset of `ids`, using one membership filter.
    fn get_all_by_ids(&self, ids: Vec<DescriptorId>) -> DescriptorStream;

    fn get_all_for_retrievables(&self, ids: Vec<RetrievableId>) -> DescriptorStream;

    async fn count(&self) -> u64;

    /// Validates and translates `query`, returning a lazy stream of results.
    ///
    /// Each result carries the matched descriptor; proximity results also carry
    /// a distance attribute.
    fn query(&self, query: &Query) -> Result<RetrievableStream>;
}

/// Writes descriptors of one field.
///
/// Returns `Err` for argument errors and `Ok(false)` when the backend rejected
/// or failed the write.
#[async_trait]
pub trait DescriptorWriter: Send + Sync {
    async fn add(&self, item: &Descriptor) -> Result<bool>;

    /// Inserts all items in one batched round trip.
    async fn add_all(&self, items: &[Descriptor]) -> Result<bool>;

    /// Upserts by id.
    async fn update(&self, item: &Descriptor) -> Result<bool>;

    /// Deletes by id; deleting an absent descriptor succeeds.
    async fn delete(&self, item: &Descriptor) -> Result<bool>;

    async fn delete_all(&self, items: &[Descriptor]) -> Result<bool>;
}

/// Reads the shared retrievable and relationship tables.
#[async_trait]
pub trait RetrievableReader: Send + Sync {
    async fn get(&self, id: RetrievableId) -> Option<Retrievable>;

    async fn exists(&self, id: RetrievableId) -> bool;

    fn get_all(&self) -> RetrievableStream;

    fn get_all_by_ids(&self, ids: Vec<RetrievableId>) -> RetrievableStream;

    async fn count(&self) -> u64;

    /// Streams relationships matching all non-empty filters.
    fn get_relationships(
        &self,
        subjects: Vec<RetrievableId>,
        predicates: Vec<String>,
        objects: Vec<RetrievableId>,
    ) -> RelationshipStream;
}

#[async_trait]
pub trait RetrievableWriter: Send + Sync {
    async fn add(&self, item: &Retrievable) -> Result<bool>;

    async fn add_all(&self, items: &[Retrievable]) -> Result<bool>;

    async fn update(&self, item: &Retrievable) -> Result<bool>;

    /// Deletes the retrievable together with its relationships.
    async fn delete(&self, item: &Retrievable) -> Result<bool>;

    async fn connect(&self, relationship: &Relationship) -> Result<bool>;

    async fn connect_all(&self, relationships: &[Relationship]) -> Result<bool>;

    async fn disconnect(&self, relationship: &Relationship) -> Result<bool>;
}

/// A live connection to a storage backend, shared by every field of a schema.
///
/// Backends choose the table implementation by the layout kind.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identifier under which the backend is registered.
    fn backend(&self) -> &'static str;

    fn schema_name(&self) -> &str;

    fn description(&self) -> String;

    fn descriptor_initializer(&self, field: &str, layout: &Layout) -> Result<Box<dyn Initializer>>;

    fn descriptor_reader(&self, field: &str, layout: &Layout) -> Result<Box<dyn DescriptorReader>>;

    fn descriptor_writer(&self, field: &str, layout: &Layout) -> Result<Box<dyn DescriptorWriter>>;

    fn retrievable_initializer(&self) -> Box<dyn Initializer>;

    fn retrievable_reader(&self) -> Box<dyn RetrievableReader>;

    fn retrievable_writer(&self) -> Box<dyn RetrievableWriter>;

    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_entity_name() {
        assert_eq!(descriptor_entity("AvgColor"), "descriptor_avgcolor");
    }
}
