//! # mediax Core
//!
//! Metamodel and contracts of the mediax multimedia retrieval engine.
//!
//! - [`Value`] and [`Type`] - the closed set of attribute kinds
//! - [`Descriptor`] and [`Layout`] - typed feature records and their shape
//! - [`Retrievable`] - the unit of ingestion and retrieval
//! - [`Schema`] and [`Field`] - the field registry and factory for operators and storage access
//! - [`Connection`], [`Initializer`], [`DescriptorReader`], [`DescriptorWriter`] - what a backend implements
//! - [`Query`] - backend-neutral proximity, boolean and fulltext queries
//! - [`Operator`] - the streaming pipeline contract
//!
//! ## Example
//!
//! ```rust
//! use mediax_core::{Attribute, Layout, Type, Value};
//! use uuid::Uuid;
//!
//! let layout = Layout::structure(vec![
//!     Attribute::new("path", Type::String),
//!     Attribute::new("size", Type::Long),
//! ])
//! .unwrap();
//!
//! let descriptor = layout
//!     .build(
//!         Uuid::new_v4(),
//!         None,
//!         Some("file".to_string()),
//!         vec![Some(Value::from("/media/a.png")), Some(Value::Long(1024))],
//!     )
//!     .unwrap();
//! assert_eq!(descriptor.value("size"), Some(&Value::Long(1024)));
//! ```

pub mod analyser;
pub mod content;
pub mod context;
pub mod database;
pub mod descriptor;
pub mod error;
pub mod operators;
pub mod query;
pub mod retrievable;
pub mod schema;
pub mod types;
pub mod value;

pub use analyser::{Analyser, Parameters};
pub use content::{Content, ContentElement, ContentId, ContentType, MediaType, Source, SourceLocation};
pub use context::Context;
pub use database::{
    descriptor_entity, Connection, DescriptorReader, DescriptorStream, DescriptorWriter, Initializer,
    RelationshipStream, RetrievableReader, RetrievableStream, RetrievableWriter,
};
pub use descriptor::{Attribute, AttributeName, Descriptor, DescriptorData, DescriptorId, Layout};
pub use error::{Error, Result};
pub use operators::{stage, Decoder, Enumerator, Extractor, Operator, Retriever, Stage, Transformer};
pub use query::{
    ComparisonOperator, Distance, ProximityQuery, Query, SimpleBooleanQuery, SimpleFulltextQuery,
    SortOrder, effective_limit, DEFAULT_LIMIT,
};
pub use retrievable::{Relationship, Retrievable, RetrievableAttribute, RetrievableId};
pub use schema::{Field, FieldName, Schema};
pub use types::Type;
pub use value::Value;
