//! Extractor framework.
//!
//! An [`Extraction`] computes the descriptors of one field; [`FieldExtractor`]
//! and [`BatchedExtractor`] drive it over a stream, attach the results and
//! optionally persist them through the field's writer.

use async_trait::async_trait;
use futures::StreamExt;
use mediax_core::{
    Descriptor, DescriptorWriter, Extractor, Field, Operator, Result, Retrievable, RetrievableAttribute,
    RetrievableStream,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Default number of retrievables handed to one batched extraction call.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// The feature computation of an analyser.
#[async_trait]
pub trait Extraction: Send + Sync {
    /// Descriptors of one retrievable; empty when none of its content applies.
    async fn extract(&self, field: &Field, retrievable: &Retrievable) -> Result<Vec<Descriptor>>;

    /// One descriptor list per input, in input order.
    async fn extract_batch(&self, field: &Field, batch: &[Retrievable]) -> Result<Vec<Vec<Descriptor>>> {
        let mut results = Vec::with_capacity(batch.len());
        for retrievable in batch {
            results.push(self.extract(field, retrievable).await?);
        }
        Ok(results)
    }
}

fn open_writer(field: &Field, persisting: bool) -> Option<Box<dyn DescriptorWriter>> {
    if !persisting {
        return None;
    }
    match field.get_writer() {
        Ok(writer) => Some(writer),
        Err(e) => {
            error!("Cannot open writer of field '{}', descriptors will not be persisted: {}", field.name(), e);
            None
        }
    }
}

/// Binds descriptors to the retrievable and field, persists them if a writer
/// is given and attaches them.
async fn attach(
    field: &Field,
    writer: Option<&dyn DescriptorWriter>,
    retrievable: &mut Retrievable,
    descriptors: Vec<Descriptor>,
) {
    if descriptors.is_empty() {
        return;
    }
    let descriptors: Vec<Descriptor> = descriptors
        .into_iter()
        .map(|d| d.with_retrievable_id(retrievable.id()).with_field(field.name()))
        .collect();
    if let Some(writer) = writer {
        if retrievable.is_transient() {
            debug!("Not persisting descriptors of transient retrievable {}", retrievable.id());
        } else {
            let written = match writer.add_all(&descriptors).await {
                Ok(true) => true,
                Ok(false) => {
                    error!(
                        "Backend rejected {} descriptors of field '{}' for {}",
                        descriptors.len(),
                        field.name(),
                        retrievable.id()
                    );
                    false
                }
                Err(e) => {
                    error!("Invalid descriptors of field '{}' for {}: {}", field.name(), retrievable.id(), e);
                    false
                }
            };
            if !written {
                retrievable.add_attribute(RetrievableAttribute::WriteFailed(vec![field.name().to_string()]));
            }
        }
    }
    for descriptor in descriptors {
        retrievable.add_descriptor(descriptor);
    }
}

/// Runs an extraction on every retrievable, one at a time.
pub struct FieldExtractor {
    field: Arc<Field>,
    input: Box<dyn Operator>,
    extraction: Arc<dyn Extraction>,
    persisting: bool,
}

impl FieldExtractor {
    pub fn new(field: Arc<Field>, input: Box<dyn Operator>, extraction: Arc<dyn Extraction>, persisting: bool) -> Self {
        Self {
            field,
            input,
            extraction,
            persisting,
        }
    }
}

impl Operator for FieldExtractor {
    fn name(&self) -> &str {
        self.field.name()
    }

    fn into_stream(self: Box<Self>) -> RetrievableStream {
        let FieldExtractor {
            field,
            input,
            extraction,
            persisting,
        } = *self;
        Box::pin(async_stream::stream! {
            let writer = open_writer(&field, persisting);
            let mut input = input.into_stream();
            while let Some(mut retrievable) = input.next().await {
                match extraction.extract(&field, &retrievable).await {
                    Ok(descriptors) => attach(&field, writer.as_deref(), &mut retrievable, descriptors).await,
                    Err(e) => warn!("Extraction of field '{}' failed for {}: {}", field.name(), retrievable.id(), e),
                }
                yield retrievable;
            }
        })
    }
}

impl Extractor for FieldExtractor {
    fn field(&self) -> &Arc<Field> {
        &self.field
    }

    fn persisting(&self) -> bool {
        self.persisting
    }
}

/// Runs an extraction on groups of up to `batch_size` retrievables.
///
/// Results are redistributed by position, so output order and length equal
/// the input. A failed batch passes its retrievables through unchanged.
pub struct BatchedExtractor {
    field: Arc<Field>,
    input: Box<dyn Operator>,
    extraction: Arc<dyn Extraction>,
    persisting: bool,
    batch_size: usize,
}

impl BatchedExtractor {
    pub fn new(
        field: Arc<Field>,
        input: Box<dyn Operator>,
        extraction: Arc<dyn Extraction>,
        persisting: bool,
        batch_size: usize,
    ) -> Self {
        Self {
            field,
            input,
            extraction,
            persisting,
            batch_size: batch_size.max(1),
        }
    }
}

async fn process_batch(
    field: &Field,
    extraction: &dyn Extraction,
    writer: Option<&dyn DescriptorWriter>,
    mut batch: Vec<Retrievable>,
) -> Vec<Retrievable> {
    match extraction.extract_batch(field, &batch).await {
        Ok(results) if results.len() == batch.len() => {
            for (retrievable, descriptors) in batch.iter_mut().zip(results) {
                attach(field, writer, retrievable, descriptors).await;
            }
        }
        Ok(results) => error!(
            "Extraction of field '{}' returned {} results for {} inputs, batch left unchanged",
            field.name(),
            results.len(),
            batch.len()
        ),
        Err(e) => warn!("Batched extraction of field '{}' failed: {}", field.name(), e),
    }
    batch
}

impl Operator for BatchedExtractor {
    fn name(&self) -> &str {
        self.field.name()
    }

    fn into_stream(self: Box<Self>) -> RetrievableStream {
        let BatchedExtractor {
            field,
            input,
            extraction,
            persisting,
            batch_size,
        } = *self;
        Box::pin(async_stream::stream! {
            let writer = open_writer(&field, persisting);
            let mut input = input.into_stream().chunks(batch_size);
            while let Some(batch) = input.next().await {
                debug!("Field '{}' extracting batch of {}", field.name(), batch.len());
                for retrievable in process_batch(&field, extraction.as_ref(), writer.as_deref(), batch).await {
                    yield retrievable;
                }
            }
        })
    }
}

impl Extractor for BatchedExtractor {
    fn field(&self) -> &Arc<Field> {
        &self.field
    }

    fn persisting(&self) -> bool {
        self.persisting
    }
}
