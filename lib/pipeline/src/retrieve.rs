use futures::future::BoxFuture;
use futures::StreamExt;
use mediax_core::{Field, Operator, Query, Result, Retriever, RetrievableStream};
use std::sync::Arc;
use tracing::{debug, error};

enum PendingQuery {
    Ready(Query),
    /// Resolved when the stream is first polled, e.g. after a remote analysis.
    Deferred(BoxFuture<'static, Result<Query>>),
}

/// Runs one backend query against a field's reader.
pub struct QueryRetriever {
    field: Arc<Field>,
    query: PendingQuery,
}

impl QueryRetriever {
    /// Validates the query against the field layout before anything runs.
    pub fn new(field: Arc<Field>, query: Query) -> Result<Self> {
        query.validate(field.layout())?;
        Ok(Self {
            field,
            query: PendingQuery::Ready(query),
        })
    }

    /// A retriever whose query is produced lazily. Validation happens once the
    /// query is available; an invalid query yields an empty stream.
    pub fn deferred(field: Arc<Field>, query: BoxFuture<'static, Result<Query>>) -> Self {
        Self {
            field,
            query: PendingQuery::Deferred(query),
        }
    }
}

impl Operator for QueryRetriever {
    fn name(&self) -> &str {
        self.field.name()
    }

    fn into_stream(self: Box<Self>) -> RetrievableStream {
        let QueryRetriever { field, query } = *self;
        Box::pin(async_stream::stream! {
            let query = match query {
                PendingQuery::Ready(query) => query,
                PendingQuery::Deferred(pending) => match pending.await {
                    Ok(query) => query,
                    Err(e) => {
                        error!("Cannot build query for field '{}': {}", field.name(), e);
                        return;
                    }
                },
            };
            let reader = match field.get_reader() {
                Ok(reader) => reader,
                Err(e) => {
                    error!("Cannot open reader of field '{}': {}", field.name(), e);
                    return;
                }
            };
            let mut results = match reader.query(&query) {
                Ok(results) => results,
                Err(e) => {
                    error!("Query on field '{}' rejected: {}", field.name(), e);
                    return;
                }
            };
            debug!("Field '{}' running {:?} query, limit {}", field.name(), query_kind(&query), query.limit());
            while let Some(retrievable) = results.next().await {
                yield retrievable;
            }
        })
    }
}

impl Retriever for QueryRetriever {
    fn field(&self) -> &Arc<Field> {
        &self.field
    }
}

fn query_kind(query: &Query) -> &'static str {
    match query {
        Query::Proximity(_) => "proximity",
        Query::Boolean(_) => "boolean",
        Query::Fulltext(_) => "fulltext",
    }
}
