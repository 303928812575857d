//! Backend-neutral query model.
//!
//! Queries are validated against the target field's [`Layout`] before a backend
//! translates them, so argument errors never cost a round trip.

use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::descriptor::{Attribute, AttributeName, Layout};
use crate::error::{Error, Result};
use crate::types::Type;
use crate::value::Value;

/// Result bound applied when the caller does not supply a limit.
pub const DEFAULT_LIMIT: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComparisonOperator {
    Eq,
    Neq,
    Lt,
    Gt,
    Leq,
    Geq,
    Like,
}

impl ComparisonOperator {
    /// Whether this operator is meaningful for attributes of the given type.
    pub fn supports(&self, ty: &Type) -> bool {
        match self {
            ComparisonOperator::Eq | ComparisonOperator::Neq => !ty.is_vector(),
            ComparisonOperator::Lt
            | ComparisonOperator::Gt
            | ComparisonOperator::Leq
            | ComparisonOperator::Geq => {
                ty.is_numeric() || ty.is_textual() || *ty == Type::DateTime
            }
            ComparisonOperator::Like => ty.is_textual(),
        }
    }
}

/// Distance metric of a proximity query. The metric is computed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Distance {
    #[default]
    Euclidean,
    Manhattan,
    Cosine,
    /// Negated inner product, so that smaller is closer
    InnerProduct,
}

impl FromStr for Distance {
    type Err = Error;

    /// Parses a metric name case-insensitively, e.g. `cosine` or `INNERPRODUCT`.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace(|c: char| c == '_' || c == '-', "").as_str() {
            "EUCLIDEAN" | "L2" => Ok(Distance::Euclidean),
            "MANHATTAN" | "L1" => Ok(Distance::Manhattan),
            "COSINE" => Ok(Distance::Cosine),
            "INNERPRODUCT" | "IP" | "DOT" => Ok(Distance::InnerProduct),
            _ => Err(Error::InvalidArgument(format!("unknown distance '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// k-nearest-neighbour query over a vector attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityQuery {
    pub attribute: Option<AttributeName>,
    pub value: Value,
    #[serde(default)]
    pub distance: Distance,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default = "default_limit", deserialize_with = "deserialize_limit")]
    pub limit: u64,
    /// Whether result descriptors should carry the stored vector.
    #[serde(default)]
    pub fetch_vector: bool,
}

impl ProximityQuery {
    #[must_use]
    pub fn new(value: Value, distance: Distance) -> Self {
        Self {
            attribute: None,
            value,
            distance,
            order: SortOrder::Asc,
            limit: DEFAULT_LIMIT,
            fetch_vector: false,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = effective_limit(limit);
        self
    }

    #[must_use]
    pub fn fetching_vector(mut self) -> Self {
        self.fetch_vector = true;
        self
    }
}

/// Binary comparison of one attribute against a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleBooleanQuery {
    pub attribute: Option<AttributeName>,
    pub comparison: ComparisonOperator,
    pub value: Value,
    #[serde(default = "default_limit", deserialize_with = "deserialize_limit")]
    pub limit: u64,
}

impl SimpleBooleanQuery {
    #[must_use]
    pub fn new(attribute: Option<AttributeName>, comparison: ComparisonOperator, value: Value) -> Self {
        Self {
            attribute,
            comparison,
            value,
            limit: DEFAULT_LIMIT,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = effective_limit(limit);
        self
    }
}

/// Fulltext match of a text attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleFulltextQuery {
    pub attribute: Option<AttributeName>,
    pub text: String,
    #[serde(default = "default_limit", deserialize_with = "deserialize_limit")]
    pub limit: u64,
}

impl SimpleFulltextQuery {
    #[must_use]
    pub fn new(attribute: Option<AttributeName>, text: impl Into<String>) -> Self {
        Self {
            attribute,
            text: text.into(),
            limit: DEFAULT_LIMIT,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = effective_limit(limit);
        self
    }
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

/// Maps a zero limit to [`DEFAULT_LIMIT`].
pub fn effective_limit(limit: u64) -> u64 {
    if limit == 0 {
        DEFAULT_LIMIT
    } else {
        limit
    }
}

fn deserialize_limit<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(effective_limit)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Query {
    Proximity(ProximityQuery),
    Boolean(SimpleBooleanQuery),
    Fulltext(SimpleFulltextQuery),
}

impl Query {
    /// The result bound backends apply; zero means [`DEFAULT_LIMIT`].
    pub fn limit(&self) -> u64 {
        let limit = match self {
            Query::Proximity(q) => q.limit,
            Query::Boolean(q) => q.limit,
            Query::Fulltext(q) => q.limit,
        };
        effective_limit(limit)
    }

    /// Replaces the limit; zero means [`DEFAULT_LIMIT`].
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        let limit = effective_limit(limit);
        match &mut self {
            Query::Proximity(q) => q.limit = limit,
            Query::Boolean(q) => q.limit = limit,
            Query::Fulltext(q) => q.limit = limit,
        }
        self
    }

    /// Validates this query against a layout and returns the targeted attribute.
    pub fn validate(&self, layout: &Layout) -> Result<Attribute> {
        match self {
            Query::Proximity(q) => validate_proximity(layout, q),
            Query::Boolean(q) => validate_boolean(layout, q),
            Query::Fulltext(q) => validate_fulltext(layout, q),
        }
    }
}

impl From<ProximityQuery> for Query {
    fn from(q: ProximityQuery) -> Self {
        Query::Proximity(q)
    }
}

impl From<SimpleBooleanQuery> for Query {
    fn from(q: SimpleBooleanQuery) -> Self {
        Query::Boolean(q)
    }
}

impl From<SimpleFulltextQuery> for Query {
    fn from(q: SimpleFulltextQuery) -> Self {
        Query::Fulltext(q)
    }
}

pub fn validate_boolean(layout: &Layout, query: &SimpleBooleanQuery) -> Result<Attribute> {
    let attribute = layout.attribute(query.attribute.as_deref())?;
    if !query.comparison.supports(&attribute.ty) {
        return Err(Error::UnsupportedOperator {
            operator: query.comparison,
            ty: attribute.ty,
        });
    }
    let literal = query.value.value_type();
    if !attribute.ty.accepts(&literal) {
        return Err(Error::InvalidArgument(format!(
            "literal of type {} cannot be compared with attribute '{}' of type {}",
            literal, attribute.name, attribute.ty
        )));
    }
    Ok(attribute)
}

pub fn validate_fulltext(layout: &Layout, query: &SimpleFulltextQuery) -> Result<Attribute> {
    let attribute = layout.attribute(query.attribute.as_deref())?;
    if attribute.ty != Type::Text {
        return Err(Error::InvalidArgument(format!(
            "fulltext queries require a TEXT attribute, '{}' is {}",
            attribute.name, attribute.ty
        )));
    }
    if query.text.trim().is_empty() {
        return Err(Error::InvalidArgument("fulltext query text must not be empty".into()));
    }
    Ok(attribute)
}

pub fn validate_proximity(layout: &Layout, query: &ProximityQuery) -> Result<Attribute> {
    let attribute = layout.attribute(query.attribute.as_deref())?;
    let expected = match attribute.ty {
        Type::BooleanVector(_) => None,
        ty => ty.dimensions(),
    }
    .ok_or_else(|| {
        Error::InvalidArgument(format!(
            "proximity queries require a numeric vector attribute, '{}' is {}",
            attribute.name, attribute.ty
        ))
    })?;
    let actual = query.value.value_type().dimensions().ok_or_else(|| {
        Error::InvalidArgument("proximity query value must be a vector".into())
    })?;
    if expected != actual {
        return Err(Error::DimensionMismatch { expected, actual });
    }
    Ok(attribute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Attribute;

    fn struct_layout() -> Layout {
        Layout::structure(vec![
            Attribute::new("path", Type::String),
            Attribute::new("size", Type::Long),
            Attribute::new("caption", Type::Text),
            Attribute::new("embedding", Type::FloatVector(3)),
            Attribute::new("flag", Type::Boolean),
        ])
        .unwrap()
    }

    #[test]
    fn test_distance_from_str() {
        assert_eq!("cosine".parse::<Distance>().unwrap(), Distance::Cosine);
        assert_eq!("inner_product".parse::<Distance>().unwrap(), Distance::InnerProduct);
        assert_eq!("L2".parse::<Distance>().unwrap(), Distance::Euclidean);
        assert!("hamming".parse::<Distance>().is_err());
    }

    #[test]
    fn test_operator_support_table() {
        assert!(ComparisonOperator::Like.supports(&Type::String));
        assert!(!ComparisonOperator::Like.supports(&Type::Int));
        assert!(!ComparisonOperator::Eq.supports(&Type::FloatVector(3)));
        assert!(!ComparisonOperator::Lt.supports(&Type::Boolean));
        assert!(!ComparisonOperator::Geq.supports(&Type::Uuid));
        assert!(ComparisonOperator::Leq.supports(&Type::DateTime));
    }

    #[test]
    fn test_like_on_vector_fails_fast() {
        let q = SimpleBooleanQuery::new(
            Some("embedding".into()),
            ComparisonOperator::Like,
            Value::FloatVector(vec![1.0, 0.0, 0.0]),
        );
        assert!(matches!(
            validate_boolean(&struct_layout(), &q),
            Err(Error::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn test_literal_type_must_match() {
        let q = SimpleBooleanQuery::new(Some("size".into()), ComparisonOperator::Leq, Value::Int(3));
        assert!(validate_boolean(&struct_layout(), &q).is_err());
        let q = SimpleBooleanQuery::new(Some("size".into()), ComparisonOperator::Leq, Value::Long(3));
        assert_eq!(validate_boolean(&struct_layout(), &q).unwrap().name, "size");
    }

    #[test]
    fn test_fulltext_requires_text() {
        let ok = SimpleFulltextQuery::new(Some("caption".into()), "cat");
        assert!(validate_fulltext(&struct_layout(), &ok).is_ok());
        let bad = SimpleFulltextQuery::new(Some("path".into()), "cat");
        assert!(validate_fulltext(&struct_layout(), &bad).is_err());
    }

    #[test]
    fn test_proximity_dimension_mismatch() {
        let layout = Layout::vector(Type::FloatVector(3)).unwrap();
        let q = ProximityQuery::new(Value::FloatVector(vec![1.0, 0.0]), Distance::Euclidean);
        assert!(matches!(
            validate_proximity(&layout, &q),
            Err(Error::DimensionMismatch { expected: 3, actual: 2 })
        ));
        let scalar = Layout::scalar(Type::Float).unwrap();
        let q = ProximityQuery::new(Value::FloatVector(vec![1.0]), Distance::Euclidean);
        assert!(validate_proximity(&scalar, &q).is_err());
    }

    #[test]
    fn test_with_limit_zero_uses_default() {
        let q: Query = SimpleFulltextQuery::new(None, "x").with_limit(5).into();
        assert_eq!(q.limit(), 5);
        assert_eq!(q.with_limit(0).limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn test_zero_limit_means_default_everywhere() {
        let q = ProximityQuery::new(Value::FloatVector(vec![1.0]), Distance::Cosine).with_limit(0);
        assert_eq!(q.limit, DEFAULT_LIMIT);
        assert_eq!(SimpleBooleanQuery::new(None, ComparisonOperator::Eq, Value::Long(1)).with_limit(0).limit, DEFAULT_LIMIT);
        assert_eq!(SimpleFulltextQuery::new(None, "x").with_limit(0).limit, DEFAULT_LIMIT);

        let json = r#"{"type":"fulltext","text":"cat","limit":0}"#;
        let q: Query = serde_json::from_str(json).unwrap();
        assert!(matches!(&q, Query::Fulltext(f) if f.limit == DEFAULT_LIMIT));

        let mut raw = SimpleFulltextQuery::new(None, "x");
        raw.limit = 0;
        assert_eq!(Query::from(raw).limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn test_proximity_on_boolean_vector_is_rejected() {
        let layout = Layout::vector(Type::BooleanVector(3)).unwrap();
        let q = ProximityQuery::new(Value::BooleanVector(vec![true, false, true]), Distance::Euclidean);
        assert!(matches!(validate_proximity(&layout, &q), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_query_serde() {
        let json = r#"{"type":"boolean","attribute":"size","comparison":"GEQ","value":{"Long":10}}"#;
        let q: Query = serde_json::from_str(json).unwrap();
        assert_eq!(q.limit(), DEFAULT_LIMIT);
        assert!(matches!(q, Query::Boolean(SimpleBooleanQuery { comparison: ComparisonOperator::Geq, .. })));
    }
}
