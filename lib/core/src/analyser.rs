use std::collections::HashMap;
use std::sync::Arc;

use crate::content::{ContentElement, ContentType};
use crate::context::Context;
use crate::descriptor::{Descriptor, Layout};
use crate::error::Result;
use crate::operators::{Extractor, Operator, Retriever};
use crate::schema::Field;

/// String parameters of a field, as given in the schema configuration.
pub type Parameters = HashMap<String, String>;

/// A feature algorithm bound to a field.
///
/// The analyser is the only component that constructs concrete descriptors of
/// its field. It declares the layout it produces and the content it consumes,
/// and builds the extractors and retrievers that work on that layout.
pub trait Analyser: Send + Sync {
    fn name(&self) -> &str;

    fn content_types(&self) -> &[ContentType];

    /// Layout of the descriptors produced for the given field parameters.
    fn layout(&self, parameters: &Parameters) -> Result<Layout>;

    fn new_extractor(
        &self,
        field: Arc<Field>,
        input: Box<dyn Operator>,
        context: &Context,
        persisting: bool,
    ) -> Result<Box<dyn Extractor>>;

    fn new_retriever_for_descriptors(
        &self,
        field: Arc<Field>,
        descriptors: Vec<Descriptor>,
        context: &Context,
    ) -> Result<Box<dyn Retriever>>;

    /// Builds a retriever for raw query content. Content is analysed lazily
    /// when the retriever's stream is first polled.
    fn new_retriever_for_content(
        &self,
        field: Arc<Field>,
        content: Vec<ContentElement>,
        context: &Context,
    ) -> Result<Box<dyn Retriever>>;
}
