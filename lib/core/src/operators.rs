//! Streaming operator contracts.
//!
//! An operator is built once, turned into a stream exactly once by
//! [`Operator::into_stream`], and closed when that stream is dropped or
//! exhausted. Streams are pull-based so a consumer that stops early also stops
//! every upstream stage and the backend cursors they hold.

use std::sync::Arc;

use crate::content::MediaType;
use crate::database::RetrievableStream;
use crate::schema::Field;

pub trait Operator: Send {
    /// Name used for logging and for [`Context`](crate::context::Context) lookups.
    fn name(&self) -> &str;

    fn into_stream(self: Box<Self>) -> RetrievableStream;
}

/// Produces source retrievables from some listing.
pub trait Enumerator: Operator {}

/// Turns source retrievables into retrievables carrying decoded content.
///
/// Sources of unsupported media types are skipped.
pub trait Decoder: Operator {
    fn supports(&self, media_type: MediaType) -> bool;
}

/// Computes descriptors for a field and attaches them to each retrievable.
pub trait Extractor: Operator {
    fn field(&self) -> &Arc<Field>;

    /// Whether descriptors are written through the field's writer.
    fn persisting(&self) -> bool;
}

/// Produces result retrievables for a field, typically from a backend query.
pub trait Retriever: Operator {
    fn field(&self) -> &Arc<Field>;
}

/// Reshapes a stream of retrievables (merge, limit, benchmark, ...).
pub trait Transformer: Operator {}

/// Wraps an operator of any role as a plain [`Operator`], so that stages of
/// different roles can be chained behind one `Box<dyn Operator>`.
pub struct Stage<T: ?Sized + Operator>(Box<T>);

impl<T: ?Sized + Operator> Operator for Stage<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn into_stream(self: Box<Self>) -> RetrievableStream {
        let Stage(inner) = *self;
        inner.into_stream()
    }
}

pub fn stage<T: ?Sized + Operator + 'static>(operator: Box<T>) -> Box<dyn Operator> {
    Box::new(Stage(operator))
}
