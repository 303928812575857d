use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The type of a descriptor attribute.
///
/// Vector types carry their dimensionality. Every backend maps each variant to
/// exactly one native column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "dimensions", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Type {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Bounded string (identifiers, paths, labels)
    String,
    /// Unbounded, fulltext-searchable text
    Text,
    DateTime,
    Uuid,
    BooleanVector(usize),
    IntVector(usize),
    LongVector(usize),
    FloatVector(usize),
    DoubleVector(usize),
}

impl Type {
    /// All scalar types, in declaration order.
    pub const SCALARS: [Type; 11] = [
        Type::Boolean,
        Type::Byte,
        Type::Short,
        Type::Int,
        Type::Long,
        Type::Float,
        Type::Double,
        Type::String,
        Type::Text,
        Type::DateTime,
        Type::Uuid,
    ];

    #[inline]
    pub fn dimensions(&self) -> Option<usize> {
        match self {
            Type::BooleanVector(d)
            | Type::IntVector(d)
            | Type::LongVector(d)
            | Type::FloatVector(d)
            | Type::DoubleVector(d) => Some(*d),
            _ => None,
        }
    }

    #[inline]
    pub fn is_vector(&self) -> bool {
        self.dimensions().is_some()
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Byte | Type::Short | Type::Int | Type::Long | Type::Float | Type::Double
        )
    }

    #[inline]
    pub fn is_textual(&self) -> bool {
        matches!(self, Type::String | Type::Text)
    }

    /// Whether two types are compatible for comparison purposes.
    pub fn accepts(&self, other: &Type) -> bool {
        self == other || (self.is_textual() && other.is_textual())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => write!(f, "BOOLEAN"),
            Type::Byte => write!(f, "BYTE"),
            Type::Short => write!(f, "SHORT"),
            Type::Int => write!(f, "INT"),
            Type::Long => write!(f, "LONG"),
            Type::Float => write!(f, "FLOAT"),
            Type::Double => write!(f, "DOUBLE"),
            Type::String => write!(f, "STRING"),
            Type::Text => write!(f, "TEXT"),
            Type::DateTime => write!(f, "DATETIME"),
            Type::Uuid => write!(f, "UUID"),
            Type::BooleanVector(d) => write!(f, "BOOLEAN_VECTOR({})", d),
            Type::IntVector(d) => write!(f, "INT_VECTOR({})", d),
            Type::LongVector(d) => write!(f, "LONG_VECTOR({})", d),
            Type::FloatVector(d) => write!(f, "FLOAT_VECTOR({})", d),
            Type::DoubleVector(d) => write!(f, "DOUBLE_VECTOR({})", d),
        }
    }
}

impl FromStr for Type {
    type Err = Error;

    /// Parses the representation produced by `Display`, e.g. `LONG` or `FLOAT_VECTOR(512)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();
        if let Some((name, rest)) = s.split_once('(') {
            let dim: usize = rest
                .trim_end_matches(')')
                .trim()
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("Invalid vector dimension in '{}'", s)))?;
            return match name {
                "BOOLEAN_VECTOR" => Ok(Type::BooleanVector(dim)),
                "INT_VECTOR" => Ok(Type::IntVector(dim)),
                "LONG_VECTOR" => Ok(Type::LongVector(dim)),
                "FLOAT_VECTOR" => Ok(Type::FloatVector(dim)),
                "DOUBLE_VECTOR" => Ok(Type::DoubleVector(dim)),
                _ => Err(Error::InvalidArgument(format!("Unknown vector type '{}'", name))),
            };
        }
        Type::SCALARS
            .iter()
            .find(|t| t.to_string() == s)
            .copied()
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown type '{}'", s)))
    }
}
