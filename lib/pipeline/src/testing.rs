//! Fixtures shared by the unit tests of this crate.

use async_trait::async_trait;
use mediax_core::{
    Analyser, ContentElement, ContentType, Context, Descriptor, Error, Extractor, Field, Layout, Operator,
    Parameters, Result, Retrievable, Retriever, Schema, Type, Value,
};
use mediax_storage::MemoryConnection;
use std::sync::Arc;
use uuid::Uuid;

use crate::extract::{Extraction, FieldExtractor};
use crate::retrieve::QueryRetriever;

/// One `INT` descriptor per text element holding its length in characters.
pub struct CountingExtraction;

#[async_trait]
impl Extraction for CountingExtraction {
    async fn extract(&self, field: &Field, retrievable: &Retrievable) -> Result<Vec<Descriptor>> {
        Ok(retrievable
            .content()
            .iter()
            .filter_map(ContentElement::as_text)
            .map(|text| {
                Descriptor::scalar(
                    Uuid::new_v4(),
                    Some(retrievable.id()),
                    Value::Int(text.chars().count() as i32),
                    Some(field.name().to_string()),
                )
            })
            .collect())
    }
}

pub struct CountingAnalyser;

impl Analyser for CountingAnalyser {
    fn name(&self) -> &str {
        "Counting"
    }

    fn content_types(&self) -> &[ContentType] {
        &[ContentType::Text]
    }

    fn layout(&self, _parameters: &Parameters) -> Result<Layout> {
        Layout::scalar(Type::Int)
    }

    fn new_extractor(
        &self,
        field: Arc<Field>,
        input: Box<dyn Operator>,
        _context: &Context,
        persisting: bool,
    ) -> Result<Box<dyn Extractor>> {
        Ok(Box::new(FieldExtractor::new(field, input, Arc::new(CountingExtraction), persisting)))
    }

    fn new_retriever_for_descriptors(
        &self,
        field: Arc<Field>,
        descriptors: Vec<Descriptor>,
        _context: &Context,
    ) -> Result<Box<dyn Retriever>> {
        let value = descriptors
            .first()
            .and_then(|d| d.value(mediax_core::descriptor::VALUE_ATTRIBUTE).cloned())
            .ok_or_else(|| Error::InvalidArgument("no descriptor given".into()))?;
        let query = mediax_core::SimpleBooleanQuery::new(None, mediax_core::ComparisonOperator::Eq, value);
        Ok(Box::new(QueryRetriever::new(field, query.into())?))
    }

    fn new_retriever_for_content(
        &self,
        _field: Arc<Field>,
        _content: Vec<ContentElement>,
        _context: &Context,
    ) -> Result<Box<dyn Retriever>> {
        Err(Error::InvalidArgument("counting retrieval needs descriptors".into()))
    }
}

/// A memory schema with one initialized field using `analyser`.
pub async fn schema_with(name: &str, analyser: Arc<dyn Analyser>) -> (Schema, Arc<Field>) {
    schema_with_parameters(name, analyser, Parameters::new()).await
}

pub async fn schema_with_parameters(
    name: &str,
    analyser: Arc<dyn Analyser>,
    parameters: Parameters,
) -> (Schema, Arc<Field>) {
    let mut schema = Schema::new("test", Arc::new(MemoryConnection::new("test"))).unwrap();
    let field = schema.add_field(name, analyser, parameters).unwrap();
    schema.initialize().await.unwrap();
    (schema, field)
}

/// A memory schema with one initialized `length` field.
pub async fn counting_schema() -> (Schema, Arc<Field>) {
    schema_with("length", Arc::new(CountingAnalyser)).await
}
