use async_trait::async_trait;
use futures::FutureExt;
use mediax_core::descriptor::VECTOR_ATTRIBUTE;
use mediax_core::{
    Analyser, ContentElement, ContentType, Context, Descriptor, Error, Extractor, Field, Layout, Operator,
    Parameters, Query, Result, Retrievable, Retriever, Type, Value,
};
use std::sync::Arc;
use uuid::Uuid;

use super::proximity;
use crate::extract::{BatchedExtractor, Extraction, DEFAULT_BATCH_SIZE};
use crate::fes::{FesClient, FesInput, FesParameters};
use crate::retrieve::QueryRetriever;

pub const TEXT_EMBEDDING_TASK: &str = "text_embedding";
pub const IMAGE_EMBEDDING_TASK: &str = "image_embedding";

/// Dense text and image embeddings computed by the external feature service.
///
/// Field parameters: `model` and `length` (embedding dimensions) are
/// required; `host`, `timeout_ms`, `polling_interval_ms` and `retries`
/// configure the service client.
pub struct DenseEmbedding;

impl DenseEmbedding {
    pub const NAME: &'static str = "DenseEmbedding";

    fn required<'a>(parameters: &'a Parameters, key: &str) -> Result<&'a str> {
        parameters
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::MissingParameter {
                component: Self::NAME.to_string(),
                key: key.to_string(),
            })
    }

    fn dimensions(parameters: &Parameters) -> Result<usize> {
        let raw = Self::required(parameters, "length")?;
        match raw.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(Error::InvalidArgument(format!("invalid embedding length '{}'", raw))),
        }
    }
}

fn task(element: &ContentElement) -> Option<&'static str> {
    match element.content_type() {
        ContentType::Text => Some(TEXT_EMBEDDING_TASK),
        ContentType::Image => Some(IMAGE_EMBEDDING_TASK),
        ContentType::Audio | ContentType::Binary => None,
    }
}

pub struct DenseEmbeddingExtraction {
    client: Arc<FesClient>,
    model: String,
    dimensions: usize,
}

impl DenseEmbeddingExtraction {
    pub fn for_field(field: &Field) -> Result<Self> {
        let parameters = field.parameters();
        Ok(Self {
            client: Arc::new(FesClient::new(FesParameters::from_parameters(parameters)?)?),
            model: DenseEmbedding::required(parameters, "model")?.to_string(),
            dimensions: DenseEmbedding::dimensions(parameters)?,
        })
    }

    /// Embeds inputs of one task, checking the dimensions of every result.
    async fn embed(&self, task: &str, inputs: &[FesInput]) -> Result<Vec<Vec<f32>>> {
        let vectors: Vec<Vec<f32>> = self.client.analyse_batched(task, &self.model, inputs).await?;
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: v.len(),
            });
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Extraction for DenseEmbeddingExtraction {
    async fn extract(&self, field: &Field, retrievable: &Retrievable) -> Result<Vec<Descriptor>> {
        let mut results = self.extract_batch(field, std::slice::from_ref(retrievable)).await?;
        Ok(results.pop().unwrap_or_default())
    }

    /// Sends all text of the batch in one job and all images in another,
    /// then assigns each embedding back to the retrievable it came from.
    async fn extract_batch(&self, field: &Field, batch: &[Retrievable]) -> Result<Vec<Vec<Descriptor>>> {
        let mut results: Vec<Vec<Descriptor>> = vec![Vec::new(); batch.len()];
        for wanted in [TEXT_EMBEDDING_TASK, IMAGE_EMBEDDING_TASK] {
            let (positions, inputs): (Vec<usize>, Vec<FesInput>) = batch
                .iter()
                .enumerate()
                .flat_map(|(i, r)| r.content().iter().map(move |c| (i, c)))
                .filter(|(_, c)| task(c) == Some(wanted))
                .filter_map(|(i, c)| FesInput::from_content(c).map(|input| (i, input)))
                .unzip();
            if inputs.is_empty() {
                continue;
            }
            let vectors = self.embed(wanted, &inputs).await?;
            for (i, vector) in positions.into_iter().zip(vectors) {
                results[i].push(Descriptor::vector(
                    Uuid::new_v4(),
                    Some(batch[i].id()),
                    Value::FloatVector(vector),
                    Some(field.name().to_string()),
                ));
            }
        }
        Ok(results)
    }
}

impl Analyser for DenseEmbedding {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn content_types(&self) -> &[ContentType] {
        &[ContentType::Text, ContentType::Image]
    }

    fn layout(&self, parameters: &Parameters) -> Result<Layout> {
        Self::required(parameters, "model")?;
        Layout::vector(Type::FloatVector(Self::dimensions(parameters)?))
    }

    fn new_extractor(
        &self,
        field: Arc<Field>,
        input: Box<dyn Operator>,
        context: &Context,
        persisting: bool,
    ) -> Result<Box<dyn Extractor>> {
        let extraction = Arc::new(DenseEmbeddingExtraction::for_field(&field)?);
        let batch_size = context.get_parsed(field.name(), "batch_size").unwrap_or(DEFAULT_BATCH_SIZE);
        Ok(Box::new(BatchedExtractor::new(field, input, extraction, persisting, batch_size)))
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
            .ok_or_else(|| Error::InvalidArgument("embedding retrieval needs a descriptor".into()))?;
        let query = proximity(&field, value, context);
        Ok(Box::new(QueryRetriever::new(field, query.into())?))
    }

    /// The first text or image element is embedded when the retriever's
    /// stream is first polled.
    fn new_retriever_for_content(
        &self,
        field: Arc<Field>,
        content: Vec<ContentElement>,
        context: &Context,
    ) -> Result<Box<dyn Retriever>> {
        let extraction = DenseEmbeddingExtraction::for_field(&field)?;
        let (wanted, input) = content
            .iter()
            .find_map(|c| Some((task(c)?, FesInput::from_content(c)?)))
            .ok_or_else(|| Error::InvalidArgument("embedding retrieval needs text or image content".into()))?;
        let mut template = proximity(&field, Value::FloatVector(Vec::new()), context);
        let pending = async move {
            let vector = extraction
                .embed(wanted, std::slice::from_ref(&input))
                .await?
                .pop()
                .ok_or_else(|| Error::Backend("feature service returned no embedding".into()))?;
            template.value = Value::FloatVector(vector);
            Ok::<Query, Error>(template.into())
        };
        Ok(Box::new(QueryRetriever::deferred(field, pending.boxed())))
    }
}
