//! Translation between the metamodel and `mediax.store` messages.

use chrono::{DateTime, TimeZone, Utc};
use mediax_core::descriptor::{DESCRIPTOR_ID_COLUMN, RETRIEVABLE_ID_COLUMN};
use mediax_core::{
    Attribute, ComparisonOperator, Descriptor, Distance, Error, Layout, Query, Result, SortOrder,
    Type, Value,
};
use uuid::Uuid;

use super::proto::{self, literal::Data, predicate::Kind};

/// Name of the projected distance column of nearest-neighbour queries.
pub const DISTANCE_COLUMN: &str = "distance";

/// Name of the projected score column of fulltext queries.
pub const SCORE_COLUMN: &str = "score";

pub fn entity_name(schema: &str, entity: &str) -> proto::EntityName {
    proto::EntityName {
        schema: schema.to_string(),
        name: entity.to_string(),
    }
}

/// Maps a [`Type`] to its column type and length.
pub fn column_type(ty: &Type) -> (proto::ColumnType, u32) {
    match ty {
        Type::Boolean => (proto::ColumnType::Boolean, 0),
        Type::Byte => (proto::ColumnType::Byte, 0),
        Type::Short => (proto::ColumnType::Short, 0),
        Type::Int => (proto::ColumnType::Int, 0),
        Type::Long => (proto::ColumnType::Long, 0),
        Type::Float => (proto::ColumnType::Float, 0),
        Type::Double => (proto::ColumnType::Double, 0),
        Type::String => (proto::ColumnType::String, 0),
        Type::Text => (proto::ColumnType::Text, 0),
        Type::DateTime => (proto::ColumnType::Date, 0),
        Type::Uuid => (proto::ColumnType::Uuid, 0),
        Type::BooleanVector(d) => (proto::ColumnType::BooleanVector, *d as u32),
        Type::IntVector(d) => (proto::ColumnType::IntVector, *d as u32),
        Type::LongVector(d) => (proto::ColumnType::LongVector, *d as u32),
        Type::FloatVector(d) => (proto::ColumnType::FloatVector, *d as u32),
        Type::DoubleVector(d) => (proto::ColumnType::DoubleVector, *d as u32),
    }
}

pub fn column(name: &str, ty: &Type, nullable: bool, primary_key: bool) -> proto::ColumnDefinition {
    let (column_type, length) = column_type(ty);
    proto::ColumnDefinition {
        name: name.to_string(),
        r#type: column_type as i32,
        length,
        nullable,
        primary_key,
    }
}

/// Column definitions of a descriptor entity: the two id columns followed by
/// the layout's attributes.
pub fn descriptor_columns(layout: &Layout) -> Vec<proto::ColumnDefinition> {
    let mut columns = vec![
        column(DESCRIPTOR_ID_COLUMN, &Type::Uuid, false, true),
        column(RETRIEVABLE_ID_COLUMN, &Type::Uuid, false, false),
    ];
    columns.extend(
        layout
            .attributes()
            .iter()
            .map(|a| column(&a.name, &a.ty, a.nullable, false)),
    );
    columns
}

/// Index strategy per attribute type.
pub fn index_type(ty: &Type) -> proto::IndexType {
    match ty {
        Type::Text => proto::IndexType::Fulltext,
        Type::FloatVector(_) | Type::DoubleVector(_) => proto::IndexType::Ann,
        Type::Boolean
        | Type::Byte
        | Type::Short
        | Type::Int
        | Type::Long
        | Type::Float
        | Type::Double
        | Type::String
        | Type::DateTime
        | Type::Uuid
        | Type::BooleanVector(_)
        | Type::IntVector(_)
        | Type::LongVector(_) => proto::IndexType::Btree,
    }
}

pub fn literal(value: &Value) -> proto::Literal {
    let data = match value {
        Value::Boolean(v) => Data::BooleanData(*v),
        Value::Byte(v) => Data::IntData(*v as i32),
        Value::Short(v) => Data::IntData(*v as i32),
        Value::Int(v) => Data::IntData(*v),
        Value::Long(v) => Data::LongData(*v),
        Value::Float(v) => Data::FloatData(*v),
        Value::Double(v) => Data::DoubleData(*v),
        Value::String(v) | Value::Text(v) => Data::StringData(v.clone()),
        Value::DateTime(v) => Data::DateData(prost_types::Timestamp {
            seconds: v.timestamp(),
            nanos: v.timestamp_subsec_nanos() as i32,
        }),
        Value::Uuid(v) => Data::UuidData(v.to_string()),
        Value::BooleanVector(v) => Data::BoolVectorData(proto::BoolVector { vector: v.clone() }),
        Value::IntVector(v) => Data::IntVectorData(proto::IntVector { vector: v.clone() }),
        Value::LongVector(v) => Data::LongVectorData(proto::LongVector { vector: v.clone() }),
        Value::FloatVector(v) => Data::FloatVectorData(proto::FloatVector { vector: v.clone() }),
        Value::DoubleVector(v) => Data::DoubleVectorData(proto::DoubleVector { vector: v.clone() }),
    };
    proto::Literal { data: Some(data) }
}

pub fn optional_literal(value: Option<&Value>) -> proto::Literal {
    value.map(literal).unwrap_or_default()
}

fn mismatch(ty: &Type, data: &Data) -> Error {
    Error::Backend(format!("cannot read {:?} as {}", data, ty))
}

/// Reads a literal as a value of the given type. Absent data is NULL.
pub fn value(literal: &proto::Literal, ty: &Type) -> Result<Option<Value>> {
    let Some(data) = &literal.data else {
        return Ok(None);
    };
    let value = match (ty, data) {
        (Type::Boolean, Data::BooleanData(v)) => Value::Boolean(*v),
        (Type::Byte, Data::IntData(v)) => {
            Value::Byte(i8::try_from(*v).map_err(|_| mismatch(ty, data))?)
        }
        (Type::Short, Data::IntData(v)) => {
            Value::Short(i16::try_from(*v).map_err(|_| mismatch(ty, data))?)
        }
        (Type::Int, Data::IntData(v)) => Value::Int(*v),
        (Type::Long, Data::LongData(v)) => Value::Long(*v),
        (Type::Float, Data::FloatData(v)) => Value::Float(*v),
        (Type::Double, Data::DoubleData(v)) => Value::Double(*v),
        (Type::String, Data::StringData(v)) => Value::String(v.clone()),
        (Type::Text, Data::StringData(v)) => Value::Text(v.clone()),
        (Type::DateTime, Data::DateData(ts)) => Value::DateTime(timestamp(ts)?),
        (Type::Uuid, Data::UuidData(v)) => Value::Uuid(uuid(v)?),
        (Type::BooleanVector(_), Data::BoolVectorData(v)) => Value::BooleanVector(v.vector.clone()),
        (Type::IntVector(_), Data::IntVectorData(v)) => Value::IntVector(v.vector.clone()),
        (Type::LongVector(_), Data::LongVectorData(v)) => Value::LongVector(v.vector.clone()),
        (Type::FloatVector(_), Data::FloatVectorData(v)) => Value::FloatVector(v.vector.clone()),
        (Type::DoubleVector(_), Data::DoubleVectorData(v)) => Value::DoubleVector(v.vector.clone()),
        _ => return Err(mismatch(ty, data)),
    };
    Ok(Some(value))
}

fn timestamp(ts: &prost_types::Timestamp) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(ts.seconds, ts.nanos.max(0) as u32)
        .single()
        .ok_or_else(|| Error::Backend(format!("invalid timestamp {:?}", ts)))
}

fn uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Backend(format!("invalid uuid '{}': {}", raw, e)))
}

/// Reads a non-null UUID literal.
pub fn uuid_value(literal: &proto::Literal) -> Result<Uuid> {
    match value(literal, &Type::Uuid)? {
        Some(Value::Uuid(id)) => Ok(id),
        _ => Err(Error::Backend("expected a non-null UUID".into())),
    }
}

pub fn compare_operator(operator: ComparisonOperator) -> proto::CompareOperator {
    match operator {
        ComparisonOperator::Eq => proto::CompareOperator::Equal,
        ComparisonOperator::Neq => proto::CompareOperator::NotEqual,
        ComparisonOperator::Lt => proto::CompareOperator::Less,
        ComparisonOperator::Gt => proto::CompareOperator::Greater,
        ComparisonOperator::Leq => proto::CompareOperator::LessEqual,
        ComparisonOperator::Geq => proto::CompareOperator::GreaterEqual,
        ComparisonOperator::Like => proto::CompareOperator::Like,
    }
}

pub fn distance_function(distance: Distance) -> proto::DistanceFunction {
    match distance {
        Distance::Euclidean => proto::DistanceFunction::Euclidean,
        Distance::Manhattan => proto::DistanceFunction::Manhattan,
        Distance::Cosine => proto::DistanceFunction::Cosine,
        Distance::InnerProduct => proto::DistanceFunction::InnerProduct,
    }
}

pub fn compare(column: &str, operator: proto::CompareOperator, value: &Value) -> proto::Predicate {
    proto::Predicate {
        kind: Some(Kind::Compare(proto::Compare {
            column: column.to_string(),
            operator: operator as i32,
            value: Some(literal(value)),
        })),
    }
}

/// Equality on a UUID column.
pub fn id_equals(column: &str, id: Uuid) -> proto::Predicate {
    compare(column, proto::CompareOperator::Equal, &Value::Uuid(id))
}

/// Membership of a column in a set of values.
pub fn one_of(column: &str, values: impl IntoIterator<Item = Value>) -> proto::Predicate {
    proto::Predicate {
        kind: Some(Kind::In(proto::In {
            column: column.to_string(),
            values: values.into_iter().map(|v| literal(&v)).collect(),
        })),
    }
}

pub fn id_in(column: &str, ids: &[Uuid]) -> proto::Predicate {
    one_of(column, ids.iter().map(|id| Value::Uuid(*id)))
}

pub fn and(predicates: Vec<proto::Predicate>) -> Option<proto::Predicate> {
    match predicates.len() {
        0 => None,
        1 => predicates.into_iter().next(),
        _ => Some(proto::Predicate {
            kind: Some(Kind::And(proto::And { predicates })),
        }),
    }
}

/// Columns holding the full descriptor of a layout, in layout order.
pub fn descriptor_projection(layout: &Layout) -> Vec<String> {
    let mut projection = vec![DESCRIPTOR_ID_COLUMN.to_string(), RETRIEVABLE_ID_COLUMN.to_string()];
    projection.extend(layout.attributes().into_iter().map(|a| a.name));
    projection
}

/// Translates a validated query against the resolved attribute.
pub fn query_request(
    entity: proto::EntityName,
    layout: &Layout,
    attribute: &Attribute,
    query: &Query,
) -> proto::QueryRequest {
    let mut request = proto::QueryRequest {
        entity: Some(entity),
        limit: query.limit(),
        ..Default::default()
    };
    match query {
        Query::Proximity(q) => {
            request.projection = if q.fetch_vector {
                descriptor_projection(layout)
            } else {
                vec![DESCRIPTOR_ID_COLUMN.to_string(), RETRIEVABLE_ID_COLUMN.to_string()]
            };
            request.projection.push(DISTANCE_COLUMN.to_string());
            request.nns = Some(proto::NearestNeighbour {
                column: attribute.name.clone(),
                reference: Some(literal(&q.value)),
                distance: distance_function(q.distance) as i32,
                alias: DISTANCE_COLUMN.to_string(),
            });
            request.order = match q.order {
                SortOrder::Asc => proto::Direction::Asc,
                SortOrder::Desc => proto::Direction::Desc,
            } as i32;
        }
        Query::Boolean(q) => {
            request.projection = descriptor_projection(layout);
            request.r#where = Some(compare(
                &attribute.name,
                compare_operator(q.comparison),
                &q.value,
            ));
        }
        Query::Fulltext(q) => {
            request.projection = descriptor_projection(layout);
            request.projection.push(SCORE_COLUMN.to_string());
            request.r#where = Some(proto::Predicate {
                kind: Some(Kind::Fulltext(proto::Fulltext {
                    column: attribute.name.clone(),
                    text: q.text.clone(),
                })),
            });
            request.order = proto::Direction::Desc as i32;
        }
    }
    request
}

/// Column values of a descriptor row, in projection order.
pub fn descriptor_values(descriptor: &Descriptor) -> Vec<proto::ColumnValue> {
    let mut values = vec![
        proto::ColumnValue {
            column: DESCRIPTOR_ID_COLUMN.to_string(),
            value: Some(literal(&Value::Uuid(descriptor.id()))),
        },
        proto::ColumnValue {
            column: RETRIEVABLE_ID_COLUMN.to_string(),
            value: Some(optional_literal(descriptor.retrievable_id().map(Value::Uuid).as_ref())),
        },
    ];
    values.extend(descriptor.values().into_iter().map(|(name, value)| proto::ColumnValue {
        column: name,
        value: Some(optional_literal(value.as_ref())),
    }));
    values
}

/// A result row addressed by column name.
pub struct RowView<'a> {
    pub columns: &'a [String],
    pub row: &'a proto::Row,
}

impl<'a> RowView<'a> {
    pub fn get(&self, column: &str) -> Option<&'a proto::Literal> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.row.values.get(index)
    }

    pub fn uuid(&self, column: &str) -> Result<Uuid> {
        let literal = self
            .get(column)
            .ok_or_else(|| Error::Backend(format!("missing column '{}'", column)))?;
        uuid_value(literal)
    }

    pub fn float(&self, column: &str) -> Option<f32> {
        match self.get(column)?.data.as_ref()? {
            Data::FloatData(v) => Some(*v),
            Data::DoubleData(v) => Some(*v as f32),
            _ => None,
        }
    }

    /// Builds a descriptor from the row, reading attributes in layout order.
    pub fn descriptor(&self, layout: &Layout, field: &str) -> Result<Descriptor> {
        if self.row.values.len() != self.columns.len() {
            return Err(Error::LayoutMismatch(format!(
                "row has {} values for {} columns",
                self.row.values.len(),
                self.columns.len()
            )));
        }
        let id = self.uuid(DESCRIPTOR_ID_COLUMN)?;
        let retrievable_id = self.uuid(RETRIEVABLE_ID_COLUMN)?;
        let values = layout
            .attributes()
            .iter()
            .map(|a| {
                let literal = self.get(&a.name).ok_or_else(|| {
                    Error::LayoutMismatch(format!("row is missing attribute '{}'", a.name))
                })?;
                value(literal, &a.ty)
            })
            .collect::<Result<Vec<_>>>()?;
        layout.build(id, Some(retrievable_id), Some(field.to_string()), values)
    }
}
