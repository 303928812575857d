//! Reference analysers.
//!
//! - [`AverageColor`]: mean RGB of an image as a 3-d float vector
//! - [`DenseEmbedding`]: text or image embedding computed by the FES
//! - [`FileSourceMetadata`]: path and size of the enumerated file
//! - [`Caption`]: text content, retrievable by fulltext search

mod averagecolor;
mod caption;
mod dense;
mod metadata;

pub use averagecolor::{AverageColor, AverageColorExtraction};
pub use caption::{Caption, CaptionExtraction};
pub use dense::{DenseEmbedding, DenseEmbeddingExtraction};
pub use metadata::{FileSourceMetadata, FileSourceMetadataExtraction};

use mediax_core::{Context, Distance, Field, ProximityQuery, Value, DEFAULT_LIMIT};

/// Result limit of a retriever, from `context[field, "limit"]`.
pub(crate) fn limit(field: &Field, context: &Context) -> u64 {
    context.get_parsed(field.name(), "limit").unwrap_or(DEFAULT_LIMIT)
}

/// Proximity query configured from `context[field, "distance"]`, `"limit"`
/// and `"fetch_vector"`.
pub(crate) fn proximity(field: &Field, value: Value, context: &Context) -> ProximityQuery {
    let distance = context.get_parsed(field.name(), "distance").unwrap_or(Distance::Euclidean);
    let query = ProximityQuery::new(value, distance).with_limit(limit(field, context));
    if context.get_parsed(field.name(), "fetch_vector").unwrap_or(false) {
        query.fetching_vector()
    } else {
        query
    }
}
