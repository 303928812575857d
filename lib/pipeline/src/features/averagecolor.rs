use async_trait::async_trait;
use mediax_core::descriptor::VECTOR_ATTRIBUTE;
use mediax_core::{
    Analyser, Content, ContentElement, ContentType, Context, Descriptor, Error, Extractor, Field, Layout,
    Operator, Parameters, Result, Retrievable, Retriever, Type, Value,
};
use std::sync::Arc;
use uuid::Uuid;

use super::proximity;
use crate::extract::{Extraction, FieldExtractor};
use crate::retrieve::QueryRetriever;

/// Mean colour of an image, as RGB in `[0, 1]`.
pub struct AverageColor;

impl AverageColor {
    pub const NAME: &'static str = "AverageColor";

    /// Averages the pixels of an image; empty images are black.
    pub fn average(pixels: &[[u8; 3]]) -> Vec<f32> {
        if pixels.is_empty() {
            return vec![0.0; 3];
        }
        let mut sums = [0u64; 3];
        for pixel in pixels {
            for (sum, channel) in sums.iter_mut().zip(pixel) {
                *sum += u64::from(*channel);
            }
        }
        let n = pixels.len() as f64 * 255.0;
        sums.iter().map(|s| (*s as f64 / n) as f32).collect()
    }

    fn analyse(element: &ContentElement) -> Option<Value> {
        match &element.content {
            Content::Image { pixels, .. } => Some(Value::FloatVector(Self::average(pixels))),
            _ => None,
        }
    }
}

pub struct AverageColorExtraction;

#[async_trait]
impl Extraction for AverageColorExtraction {
    async fn extract(&self, field: &Field, retrievable: &Retrievable) -> Result<Vec<Descriptor>> {
        Ok(retrievable
            .content()
            .iter()
            .filter_map(AverageColor::analyse)
            .map(|value| Descriptor::vector(Uuid::new_v4(), Some(retrievable.id()), value, Some(field.name().to_string())))
            .collect())
    }
}

impl Analyser for AverageColor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn content_types(&self) -> &[ContentType] {
        &[ContentType::Image]
    }

    fn layout(&self, _parameters: &Parameters) -> Result<Layout> {
        Layout::vector(Type::FloatVector(3))
    }

    fn new_extractor(
        &self,
        field: Arc<Field>,
        input: Box<dyn Operator>,
        _context: &Context,
        persisting: bool,
    ) -> Result<Box<dyn Extractor>> {
        Ok(Box::new(FieldExtractor::new(field, input, Arc::new(AverageColorExtraction), persisting)))
    }

    fn new_retriever_for_descriptors(
        &self,
        field: Arc<Field>,
        descriptors: Vec<Descriptor>,
        context: &Context,
    ) -> Result<Box<dyn Retriever>> {
        let value = descriptors
            .first()
            .and_then(|d| d.value(VECTOR_ATTRIBUTE).cloned())
            .ok_or_else(|| Error::InvalidArgument("average colour retrieval needs a descriptor".into()))?;
        let query = proximity(&field, value, context);
        Ok(Box::new(QueryRetriever::new(field, query.into())?))
    }

    fn new_retriever_for_content(
        &self,
        field: Arc<Field>,
        content: Vec<ContentElement>,
        context: &Context,
    ) -> Result<Box<dyn Retriever>> {
        let value = content
            .iter()
            .find_map(AverageColor::analyse)
            .ok_or_else(|| Error::InvalidArgument("average colour retrieval needs image content".into()))?;
        let query = proximity(&field, value, context);
        Ok(Box::new(QueryRetriever::new(field, query.into())?))
    }
}
