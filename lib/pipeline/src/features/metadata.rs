use async_trait::async_trait;
use mediax_core::{
    Analyser, Attribute, ComparisonOperator, ContentElement, ContentType, Context, Descriptor, Error, Extractor,
    Field, Layout, Operator, Parameters, Result, Retrievable, Retriever, SimpleBooleanQuery, SourceLocation, Type,
    Value,
};
use std::sync::Arc;
use uuid::Uuid;

use super::limit;
use crate::extract::{Extraction, FieldExtractor};
use crate::retrieve::QueryRetriever;

pub const PATH_ATTRIBUTE: &str = "path";
pub const SIZE_ATTRIBUTE: &str = "size";

/// Path and size in bytes of the file a retrievable was enumerated from.
pub struct FileSourceMetadata;

impl FileSourceMetadata {
    pub const NAME: &'static str = "FileSourceMetadata";

    /// Looks up stored metadata by path. `%` and `_` in the pattern make it a
    /// `LIKE` match, otherwise the path must be equal.
    fn retriever(field: Arc<Field>, path: &str, context: &Context) -> Result<Box<dyn Retriever>> {
        let comparison = if path.contains(|c: char| c == '%' || c == '_') {
            ComparisonOperator::Like
        } else {
            ComparisonOperator::Eq
        };
        let query = SimpleBooleanQuery::new(Some(PATH_ATTRIBUTE.into()), comparison, Value::from(path))
            .with_limit(limit(&field, context));
        Ok(Box::new(QueryRetriever::new(field, query.into())?))
    }
}

pub struct FileSourceMetadataExtraction;

#[async_trait]
impl Extraction for FileSourceMetadataExtraction {
    async fn extract(&self, field: &Field, retrievable: &Retrievable) -> Result<Vec<Descriptor>> {
        let Some(source) = retrievable.source() else {
            return Ok(Vec::new());
        };
        let path = match &source.location {
            SourceLocation::Path(path) => path.to_string_lossy().into_owned(),
            SourceLocation::Inline(_) => source.name.clone(),
        };
        let size = source.size().and_then(|s| i64::try_from(s).ok());
        Ok(vec![Descriptor::structured(
            Uuid::new_v4(),
            Some(retrievable.id()),
            vec![
                (PATH_ATTRIBUTE.to_string(), Some(Value::String(path))),
                (SIZE_ATTRIBUTE.to_string(), size.map(Value::Long)),
            ],
            Some(field.name().to_string()),
        )])
    }
}

impl Analyser for FileSourceMetadata {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn content_types(&self) -> &[ContentType] {
        &[]
    }

    fn layout(&self, _parameters: &Parameters) -> Result<Layout> {
        Layout::structure(vec![
            Attribute::new(PATH_ATTRIBUTE, Type::String),
            Attribute::new(SIZE_ATTRIBUTE, Type::Long).nullable(),
        ])
    }

    fn new_extractor(
        &self,
        field: Arc<Field>,
        input: Box<dyn Operator>,
        _context: &Context,
        persisting: bool,
    ) -> Result<Box<dyn Extractor>> {
        Ok(Box::new(FieldExtractor::new(
            field,
            input,
            Arc::new(FileSourceMetadataExtraction),
            persisting,
        )))
    }

    fn new_retriever_for_descriptors(
        &self,
        field: Arc<Field>,
        descriptors: Vec<Descriptor>,
        context: &Context,
    ) -> Result<Box<dyn Retriever>> {
        let path = descriptors
            .first()
            .and_then(|d| d.value(PATH_ATTRIBUTE))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidArgument("file metadata retrieval needs a path".into()))?
            .to_string();
        Self::retriever(field, &path, context)
    }

    /// Text content is taken as the path or path pattern to look up.
    fn new_retriever_for_content(
        &self,
        field: Arc<Field>,
        content: Vec<ContentElement>,
        context: &Context,
    ) -> Result<Box<dyn Retriever>> {
        let path = content
            .iter()
            .find_map(ContentElement::as_text)
            .ok_or_else(|| Error::InvalidArgument("file metadata retrieval needs a text path".into()))?
            .to_string();
        Self::retriever(field, &path, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::source_retrievable;
    use futures::StreamExt;
    use mediax_core::{MediaType, Source};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extracts_path_and_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "twelve bytes").unwrap();
        let (_schema, field) = crate::testing::schema_with(FileSourceMetadata::NAME, Arc::new(FileSourceMetadata)).await;

        let r = source_retrievable(Source::from_path(path.clone()));
        let descriptors = FileSourceMetadataExtraction.extract(&field, &r).await.unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(
            descriptors[0].value(PATH_ATTRIBUTE),
            Some(&Value::String(path.to_string_lossy().into_owned()))
        );
        assert_eq!(descriptors[0].value(SIZE_ATTRIBUTE), Some(&Value::Long(12)));
        field.layout().check(&descriptors[0]).unwrap();

        let plain = Retrievable::new(None);
        assert!(FileSourceMetadataExtraction.extract(&field, &plain).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_by_path_pattern() {
        let (_schema, field) = crate::testing::schema_with(FileSourceMetadata::NAME, Arc::new(FileSourceMetadata)).await;
        let writer = field.get_writer().unwrap();
        for name in ["cat.png", "dog.png", "cat.txt"] {
            let r = source_retrievable(Source::inline(name, MediaType::Image, vec![0; 4]));
            let descriptors = FileSourceMetadataExtraction.extract(&field, &r).await.unwrap();
            assert!(writer.add_all(&descriptors).await.unwrap());
        }
        let context = Context::new("test");
        let content = vec![ContentElement::new(mediax_core::Content::Text("cat%".into()))];
        let retriever = field.get_retriever_for_content(content, &context).unwrap();
        assert_eq!(retriever.into_stream().count().await, 2);

        let content = vec![ContentElement::new(mediax_core::Content::Text("dog.png".into()))];
        let retriever = field.get_retriever_for_content(content, &context).unwrap();
        assert_eq!(retriever.into_stream().count().await, 1);
    }
}
