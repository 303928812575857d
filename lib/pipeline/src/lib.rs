//! # mediax Pipeline
//!
//! Streaming operators and the machinery to run them:
//!
//! - enumerators and decoders turning files into retrievables with content
//! - the extractor framework, single and batched, with optional persistence
//! - query retrievers and result transformers (merge, limit, benchmark)
//! - the persister sink writing retrievables, descriptors and relationships
//! - reference analysers and their registry
//! - schema configuration, pipeline builders and the execution server

pub mod config;
pub mod decode;
pub mod enumerate;
pub mod execution;
pub mod extract;
pub mod features;
pub mod fes;
pub mod persist;
pub mod pipeline;
pub mod registry;
pub mod retrieve;
pub mod transform;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, SchemaConfig};
pub use execution::{ExecutionServer, JobId, JobInfo, JobStatus};
pub use extract::{BatchedExtractor, Extraction, FieldExtractor};
pub use pipeline::{ingest_pipeline, query_pipeline, QueryInput};
pub use registry::AnalyserRegistry;
pub use retrieve::QueryRetriever;
