//! Descriptors and their layouts.
//!
//! A [`Layout`] declares the shape of every descriptor stored under a field. It is
//! also the builder that turns an ordered list of attribute values (for example a
//! database row) back into a [`Descriptor`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::retrievable::RetrievableId;
use crate::schema::FieldName;
use crate::types::Type;
use crate::value::Value;

pub type DescriptorId = Uuid;
pub type AttributeName = String;

/// Attribute name of the single column of a scalar layout.
pub const VALUE_ATTRIBUTE: &str = "value";

/// Attribute name of the single column of a vector layout.
pub const VECTOR_ATTRIBUTE: &str = "vector";

/// Column names reserved for descriptor identity.
pub const DESCRIPTOR_ID_COLUMN: &str = "descriptor_id";
pub const RETRIEVABLE_ID_COLUMN: &str = "retrievable_id";

/// A named, typed attribute of a descriptor layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: AttributeName,
    #[serde(rename = "type")]
    pub ty: Type,
    #[serde(default)]
    pub nullable: bool,
}

impl Attribute {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<AttributeName>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// The declared shape of the descriptors of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Layout {
    /// A single scalar value, stored in the `value` attribute
    Scalar(Type),
    /// A single vector value, stored in the `vector` attribute
    Vector(Type),
    /// An ordered record of named attributes
    Struct(Vec<Attribute>),
}

impl Layout {
    pub fn scalar(ty: Type) -> Result<Self> {
        if ty.is_vector() {
            return Err(Error::LayoutMismatch(format!("{} is not a scalar type", ty)));
        }
        Ok(Layout::Scalar(ty))
    }

    pub fn vector(ty: Type) -> Result<Self> {
        match ty.dimensions() {
            Some(0) => Err(Error::LayoutMismatch("vector layouts need at least one dimension".into())),
            Some(_) => Ok(Layout::Vector(ty)),
            None => Err(Error::LayoutMismatch(format!("{} is not a vector type", ty))),
        }
    }

    pub fn structure(attributes: Vec<Attribute>) -> Result<Self> {
        if attributes.is_empty() {
            return Err(Error::LayoutMismatch("struct layouts need at least one attribute".into()));
        }
        for (i, attribute) in attributes.iter().enumerate() {
            if attribute.name.is_empty() {
                return Err(Error::LayoutMismatch("attribute names must not be empty".into()));
            }
            if attribute.name == DESCRIPTOR_ID_COLUMN || attribute.name == RETRIEVABLE_ID_COLUMN {
                return Err(Error::LayoutMismatch(format!(
                    "attribute name '{}' is reserved",
                    attribute.name
                )));
            }
            if attributes[..i].iter().any(|a| a.name == attribute.name) {
                return Err(Error::LayoutMismatch(format!(
                    "duplicate attribute '{}'",
                    attribute.name
                )));
            }
        }
        Ok(Layout::Struct(attributes))
    }

    /// The attributes of this layout in declaration order.
    pub fn attributes(&self) -> Vec<Attribute> {
        match self {
            Layout::Scalar(ty) => vec![Attribute::new(VALUE_ATTRIBUTE, *ty)],
            Layout::Vector(ty) => vec![Attribute::new(VECTOR_ATTRIBUTE, *ty)],
            Layout::Struct(attributes) => attributes.clone(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Layout::Scalar(_) | Layout::Vector(_) => 1,
            Layout::Struct(attributes) => attributes.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves the attribute a query targets.
    ///
    /// Scalar and vector layouts resolve `None` to their only attribute; struct
    /// layouts require a name.
    pub fn attribute(&self, name: Option<&str>) -> Result<Attribute> {
        let attributes = self.attributes();
        match (name, self) {
            (None, Layout::Struct(_)) => Err(Error::InvalidArgument(
                "an attribute name is required to query a struct descriptor".into(),
            )),
            (None, _) => Ok(attributes[0].clone()),
            (Some(name), _) => attributes
                .into_iter()
                .find(|a| a.name == name)
                .ok_or_else(|| Error::InvalidArgument(format!("unknown attribute '{}'", name))),
        }
    }

    /// Builds a descriptor from values given in layout order.
    ///
    /// Rejects a value count that differs from the layout, values of the wrong
    /// type and missing values for non-nullable attributes.
    pub fn build(
        &self,
        id: DescriptorId,
        retrievable_id: Option<RetrievableId>,
        field: Option<FieldName>,
        values: Vec<Option<Value>>,
    ) -> Result<Descriptor> {
        let attributes = self.attributes();
        if values.len() != attributes.len() {
            return Err(Error::LayoutMismatch(format!(
                "expected {} values, got {}",
                attributes.len(),
                values.len()
            )));
        }

        let mut checked = Vec::with_capacity(values.len());
        for (attribute, value) in attributes.iter().zip(values) {
            checked.push(coerce(attribute, value)?);
        }

        let data = match self {
            Layout::Scalar(_) | Layout::Vector(_) => {
                let value = checked
                    .pop()
                    .flatten()
                    .ok_or_else(|| Error::LayoutMismatch("missing descriptor value".into()))?;
                if matches!(self, Layout::Scalar(_)) {
                    DescriptorData::Scalar(value)
                } else {
                    DescriptorData::Vector(value)
                }
            }
            Layout::Struct(_) => DescriptorData::Struct(
                attributes
                    .into_iter()
                    .map(|a| a.name)
                    .zip(checked)
                    .collect(),
            ),
        };

        Ok(Descriptor {
            id,
            retrievable_id,
            field,
            data,
        })
    }

    /// Checks that a descriptor matches this layout exactly.
    pub fn check(&self, descriptor: &Descriptor) -> Result<()> {
        match (self, &descriptor.data) {
            (Layout::Scalar(_), DescriptorData::Scalar(_))
            | (Layout::Vector(_), DescriptorData::Vector(_))
            | (Layout::Struct(_), DescriptorData::Struct(_)) => {}
            _ => {
                return Err(Error::LayoutMismatch(format!(
                    "descriptor {} does not have the form of layout {:?}",
                    descriptor.id, self
                )))
            }
        }
        let values = descriptor.values();
        let attributes = self.attributes();
        if values.len() != attributes.len() {
            return Err(Error::LayoutMismatch(format!(
                "descriptor {} has {} attributes, layout declares {}",
                descriptor.id,
                values.len(),
                attributes.len()
            )));
        }
        for (attribute, (name, value)) in attributes.iter().zip(values) {
            if attribute.name != name {
                return Err(Error::LayoutMismatch(format!(
                    "expected attribute '{}', found '{}'",
                    attribute.name, name
                )));
            }
            coerce(attribute, value)?;
        }
        Ok(())
    }
}

fn coerce(attribute: &Attribute, value: Option<Value>) -> Result<Option<Value>> {
    let value = match value {
        Some(value) => value,
        None if attribute.nullable => return Ok(None),
        None => {
            return Err(Error::LayoutMismatch(format!(
                "attribute '{}' is not nullable",
                attribute.name
            )))
        }
    };
    let actual = value.value_type();
    if actual == attribute.ty {
        return Ok(Some(value));
    }
    match (attribute.ty, value) {
        (Type::Text, Value::String(s)) => Ok(Some(Value::Text(s))),
        (Type::String, Value::Text(s)) => Ok(Some(Value::String(s))),
        (expected, _) => match (expected.dimensions(), actual.dimensions()) {
            (Some(e), Some(a)) if e != a => Err(Error::DimensionMismatch {
                expected: e,
                actual: a,
            }),
            _ => Err(Error::LayoutMismatch(format!(
                "attribute '{}' expects {}, got {}",
                attribute.name, expected, actual
            ))),
        },
    }
}

/// The payload of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DescriptorData {
    Scalar(Value),
    Vector(Value),
    Struct(Vec<(AttributeName, Option<Value>)>),
}

/// A typed, field-scoped feature value attached to a retrievable.
///
/// Descriptors are read-only; a new value means a new descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    id: DescriptorId,
    retrievable_id: Option<RetrievableId>,
    field: Option<FieldName>,
    data: DescriptorData,
}

impl Descriptor {
    #[inline]
    #[must_use]
    pub fn scalar(id: DescriptorId, retrievable_id: Option<RetrievableId>, value: Value, field: Option<FieldName>) -> Self {
        Self {
            id,
            retrievable_id,
            field,
            data: DescriptorData::Scalar(value),
        }
    }

    #[inline]
    #[must_use]
    pub fn vector(id: DescriptorId, retrievable_id: Option<RetrievableId>, value: Value, field: Option<FieldName>) -> Self {
        Self {
            id,
            retrievable_id,
            field,
            data: DescriptorData::Vector(value),
        }
    }

    #[inline]
    #[must_use]
    pub fn structured(
        id: DescriptorId,
        retrievable_id: Option<RetrievableId>,
        values: Vec<(AttributeName, Option<Value>)>,
        field: Option<FieldName>,
    ) -> Self {
        Self {
            id,
            retrievable_id,
            field,
            data: DescriptorData::Struct(values),
        }
    }

    #[inline]
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    #[inline]
    pub fn retrievable_id(&self) -> Option<RetrievableId> {
        self.retrievable_id
    }

    #[inline]
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    #[inline]
    pub fn data(&self) -> &DescriptorData {
        &self.data
    }

    /// Attribute values in layout order.
    pub fn values(&self) -> Vec<(AttributeName, Option<Value>)> {
        match &self.data {
            DescriptorData::Scalar(v) => vec![(VALUE_ATTRIBUTE.to_string(), Some(v.clone()))],
            DescriptorData::Vector(v) => vec![(VECTOR_ATTRIBUTE.to_string(), Some(v.clone()))],
            DescriptorData::Struct(values) => values.clone(),
        }
    }

    /// Looks up a single attribute value by name.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match &self.data {
            DescriptorData::Scalar(v) if name == VALUE_ATTRIBUTE => Some(v),
            DescriptorData::Vector(v) if name == VECTOR_ATTRIBUTE => Some(v),
            DescriptorData::Struct(values) => values
                .iter()
                .find(|(n, _)| n == name)
                .and_then(|(_, v)| v.as_ref()),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_retrievable_id(mut self, retrievable_id: RetrievableId) -> Self {
        self.retrievable_id = Some(retrievable_id);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_field(mut self, field: impl Into<FieldName>) -> Self {
        self.field = Some(field.into());
        self
    }
}
