use async_trait::async_trait;
use mediax_core::descriptor::VALUE_ATTRIBUTE;
use mediax_core::{
    Analyser, ContentElement, ContentType, Context, Descriptor, Error, Extractor, Field, Layout, Operator,
    Parameters, Result, Retrievable, Retriever, SimpleFulltextQuery, Type, Value,
};
use std::sync::Arc;
use uuid::Uuid;

use super::limit;
use crate::extract::{Extraction, FieldExtractor};
use crate::retrieve::QueryRetriever;

/// Stores text content verbatim for fulltext retrieval.
pub struct Caption;

impl Caption {
    pub const NAME: &'static str = "Caption";

    fn retriever(field: Arc<Field>, text: String, context: &Context) -> Result<Box<dyn Retriever>> {
        let query = SimpleFulltextQuery::new(None, text).with_limit(limit(&field, context));
        Ok(Box::new(QueryRetriever::new(field, query.into())?))
    }
}

pub struct CaptionExtraction;

#[async_trait]
impl Extraction for CaptionExtraction {
    async fn extract(&self, field: &Field, retrievable: &Retrievable) -> Result<Vec<Descriptor>> {
        Ok(retrievable
            .content()
            .iter()
            .filter_map(ContentElement::as_text)
            .filter(|text| !text.trim().is_empty())
            .map(|text| {
                Descriptor::scalar(
                    Uuid::new_v4(),
                    Some(retrievable.id()),
                    Value::Text(text.to_string()),
                    Some(field.name().to_string()),
                )
            })
            .collect())
    }
}

impl Analyser for Caption {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn content_types(&self) -> &[ContentType] {
        &[ContentType::Text]
    }

    fn layout(&self, _parameters: &Parameters) -> Result<Layout> {
        Layout::scalar(Type::Text)
    }

    fn new_extractor(
        &self,
        field: Arc<Field>,
        input: Box<dyn Operator>,
        _context: &Context,
        persisting: bool,
    ) -> Result<Box<dyn Extractor>> {
        Ok(Box::new(FieldExtractor::new(field, input, Arc::new(CaptionExtraction), persisting)))
    }

    fn new_retriever_for_descriptors(
        &self,
        field: Arc<Field>,
        descriptors: Vec<Descriptor>,
        context: &Context,
    ) -> Result<Box<dyn Retriever>> {
        let text = descriptors
            .first()
            .and_then(|d| d.value(VALUE_ATTRIBUTE))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidArgument("caption retrieval needs a text descriptor".into()))?
            .to_string();
        Self::retriever(field, text, context)
    }

    fn new_retriever_for_content(
        &self,
        field: Arc<Field>,
        content: Vec<ContentElement>,
        context: &Context,
    ) -> Result<Box<dyn Retriever>> {
        let text = content
            .iter()
            .filter_map(ContentElement::as_text)
            .collect::<Vec<_>>()
            .join(" ");
        Self::retriever(field, text, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediax_core::Content;

    #[tokio::test]
    async fn test_extracts_non_blank_text() {
        let mut r = Retrievable::new(None);
        r.add_content(ContentElement::new(Content::Text("a red car".into())));
        r.add_content(ContentElement::new(Content::Text("  ".into())));
        let (_schema, field) = crate::testing::schema_with(Caption::NAME, Arc::new(Caption)).await;
        let descriptors = CaptionExtraction.extract(&field, &r).await.unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].value(VALUE_ATTRIBUTE), Some(&Value::Text("a red car".into())));
    }

    #[tokio::test]
    async fn test_blank_content_query_fails_fast() {
        let (_schema, field) = crate::testing::schema_with(Caption::NAME, Arc::new(Caption)).await;
        let content = vec![ContentElement::new(Content::Text(" ".into()))];
        let err = field.get_retriever_for_content(content, &Context::new("test")).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
