//! # mediax
//!
//! A multimedia indexing and retrieval engine.
//!
//! mediax turns media files into typed descriptors, stores them in a
//! pluggable backend and answers proximity, boolean and fulltext queries over
//! them through streaming operator pipelines.
//!
//! ## Quick Start
//!
//! ### As a CLI
//!
//! ```bash
//! cargo install mediax
//! mediax --config schema.json init
//! mediax --config schema.json ingest ./media
//! mediax --config schema.json query --field averagecolor --vector 1,0,0 --limit 5
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use mediax::prelude::*;
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn run() -> mediax::Result<()> {
//! let connection = Arc::new(MemoryConnection::new("media"));
//! let mut schema = Schema::new("media", connection)?;
//! schema.add_field("averagecolor", Arc::new(AverageColor), Parameters::new())?;
//! schema.initialize().await?;
//!
//! let inputs = vec![QueryInput::Vector {
//!     field: "averagecolor".to_string(),
//!     vector: vec![1.0, 0.0, 0.0],
//! }];
//! let results: Vec<Retrievable> = query_pipeline(&schema, inputs, &Context::new("media"))?
//!     .into_stream()
//!     .collect()
//!     .await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Structure
//!
//! mediax is composed of several crates:
//!
//! - [`mediax-core`](https://docs.rs/mediax-core) - Values, descriptors, retrievables, queries, schema and contracts
//! - [`mediax-storage`](https://docs.rs/mediax-storage) - Memory, gRPC and pgvector backends
//! - [`mediax-pipeline`](https://docs.rs/mediax-pipeline) - Operators, analysers, configuration and execution
//!
//! ## Features
//!
//! - **Typed descriptors**: scalar, vector and struct layouts checked on write
//! - **Three query kinds**: proximity, boolean comparison and fulltext
//! - **Pluggable backends**: in-memory, gRPC vector store, PostgreSQL/pgvector
//! - **Streaming pipelines**: batched extraction, cancellation and partial-failure reporting

// Re-export core types
pub use mediax_core::{
    Analyser, Attribute, ComparisonOperator, Connection, Content, ContentElement, ContentType, Context,
    Descriptor, DescriptorReader, DescriptorWriter, Distance, Error, Field, Layout, MediaType, Operator,
    Parameters, ProximityQuery, Query, Relationship, Result, Retrievable, RetrievableAttribute,
    RetrievableReader, RetrievableWriter, Schema, SimpleBooleanQuery, SimpleFulltextQuery, Source, Type,
    Value, DEFAULT_LIMIT,
};

// Re-export storage
pub use mediax_storage::{
    ConnectionRegistry, GrpcConnection, MemoryConnection, PgVectorConnection,
};

// Re-export pipeline
pub use mediax_pipeline::features::{AverageColor, Caption, DenseEmbedding, FileSourceMetadata};
pub use mediax_pipeline::{
    ingest_pipeline, query_pipeline, AnalyserRegistry, ConfigError, ExecutionServer, JobInfo, JobStatus,
    QueryInput, SchemaConfig,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ingest_pipeline, query_pipeline, AnalyserRegistry, AverageColor, Caption, ComparisonOperator,
        Connection, ConnectionRegistry, Context, DenseEmbedding, Descriptor, DescriptorReader,
        DescriptorWriter, Distance, Error, ExecutionServer, FileSourceMetadata, MemoryConnection, Operator,
        Parameters, ProximityQuery, Query, QueryInput, Result, Retrievable, RetrievableReader,
        RetrievableWriter, Schema, SchemaConfig, SimpleBooleanQuery, SimpleFulltextQuery, Value,
    };
}
