//! Conversion between [`Value`]s and Postgres parameters and columns.

use chrono::{DateTime, Utc};
use mediax_core::descriptor::{DESCRIPTOR_ID_COLUMN, RETRIEVABLE_ID_COLUMN};
use mediax_core::{Descriptor, Error, Layout, Result, Type, Value};
use pgvector::Vector;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use uuid::Uuid;

use super::sql::{Param, SqlStatement};

pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Prepares a statement with all of its parameters bound.
pub fn prepare(statement: &SqlStatement) -> PgQuery<'_> {
    statement
        .params
        .iter()
        .fold(sqlx::query(&statement.sql), |query, param| bind(query, param))
}

fn bind<'q>(query: PgQuery<'q>, param: &Param) -> PgQuery<'q> {
    match param {
        Param::Value(value) => bind_value(query, value),
        Param::Null(ty) => bind_null(query, ty),
        Param::Uuids(ids) => query.bind(ids.clone()),
        Param::Strings(strings) => query.bind(strings.clone()),
    }
}

fn bind_value<'q>(query: PgQuery<'q>, value: &Value) -> PgQuery<'q> {
    match value {
        Value::Boolean(v) => query.bind(*v),
        Value::Byte(v) => query.bind(i16::from(*v)),
        Value::Short(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Long(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Double(v) => query.bind(*v),
        Value::String(v) | Value::Text(v) => query.bind(v.clone()),
        Value::DateTime(v) => query.bind(*v),
        Value::Uuid(v) => query.bind(*v),
        Value::BooleanVector(v) => query.bind(v.clone()),
        Value::IntVector(v) => query.bind(v.clone()),
        Value::LongVector(v) => query.bind(v.clone()),
        Value::FloatVector(v) => query.bind(Vector::from(v.clone())),
        Value::DoubleVector(v) => query.bind(v.clone()),
    }
}

fn bind_null<'q>(query: PgQuery<'q>, ty: &Type) -> PgQuery<'q> {
    match ty {
        Type::Boolean => query.bind(None::<bool>),
        Type::Byte | Type::Short => query.bind(None::<i16>),
        Type::Int => query.bind(None::<i32>),
        Type::Long => query.bind(None::<i64>),
        Type::Float => query.bind(None::<f32>),
        Type::Double => query.bind(None::<f64>),
        Type::String | Type::Text => query.bind(None::<String>),
        Type::DateTime => query.bind(None::<DateTime<Utc>>),
        Type::Uuid => query.bind(None::<Uuid>),
        Type::BooleanVector(_) => query.bind(None::<Vec<bool>>),
        Type::IntVector(_) => query.bind(None::<Vec<i32>>),
        Type::LongVector(_) => query.bind(None::<Vec<i64>>),
        Type::FloatVector(_) => query.bind(None::<Vector>),
        Type::DoubleVector(_) => query.bind(None::<Vec<f64>>),
    }
}

fn decode_error(column: &str, e: sqlx::Error) -> Error {
    Error::Backend(format!("cannot decode column '{}': {}", column, e))
}

/// Reads one column as a value of the given type.
pub fn decode(row: &PgRow, column: &str, ty: &Type) -> Result<Option<Value>> {
    let err = |e| decode_error(column, e);
    let value = match ty {
        Type::Boolean => row.try_get::<Option<bool>, _>(column).map_err(err)?.map(Value::Boolean),
        Type::Byte => match row.try_get::<Option<i16>, _>(column).map_err(err)? {
            Some(v) => Some(Value::Byte(i8::try_from(v).map_err(|_| {
                Error::Backend(format!("value {} of column '{}' overflows BYTE", v, column))
            })?)),
            None => None,
        },
        Type::Short => row.try_get::<Option<i16>, _>(column).map_err(err)?.map(Value::Short),
        Type::Int => row.try_get::<Option<i32>, _>(column).map_err(err)?.map(Value::Int),
        Type::Long => row.try_get::<Option<i64>, _>(column).map_err(err)?.map(Value::Long),
        Type::Float => row.try_get::<Option<f32>, _>(column).map_err(err)?.map(Value::Float),
        Type::Double => row.try_get::<Option<f64>, _>(column).map_err(err)?.map(Value::Double),
        Type::String => row.try_get::<Option<String>, _>(column).map_err(err)?.map(Value::String),
        Type::Text => row.try_get::<Option<String>, _>(column).map_err(err)?.map(Value::Text),
        Type::DateTime => row
            .try_get::<Option<DateTime<Utc>>, _>(column)
            .map_err(err)?
            .map(Value::DateTime),
        Type::Uuid => row.try_get::<Option<Uuid>, _>(column).map_err(err)?.map(Value::Uuid),
        Type::BooleanVector(_) => row
            .try_get::<Option<Vec<bool>>, _>(column)
            .map_err(err)?
            .map(Value::BooleanVector),
        Type::IntVector(_) => row
            .try_get::<Option<Vec<i32>>, _>(column)
            .map_err(err)?
            .map(Value::IntVector),
        Type::LongVector(_) => row
            .try_get::<Option<Vec<i64>>, _>(column)
            .map_err(err)?
            .map(Value::LongVector),
        Type::FloatVector(_) => row
            .try_get::<Option<Vector>, _>(column)
            .map_err(err)?
            .map(|v| Value::FloatVector(v.to_vec())),
        Type::DoubleVector(_) => row
            .try_get::<Option<Vec<f64>>, _>(column)
            .map_err(err)?
            .map(Value::DoubleVector),
    };
    Ok(value)
}

pub fn uuid(row: &PgRow, column: &str) -> Result<Uuid> {
    row.try_get::<Uuid, _>(column).map_err(|e| decode_error(column, e))
}

/// Builds a descriptor from a row holding the id columns and every attribute.
pub fn descriptor(row: &PgRow, layout: &Layout, field: &str) -> Result<Descriptor> {
    let values = layout
        .attributes()
        .iter()
        .map(|a| decode(row, &a.name, &a.ty))
        .collect::<Result<Vec<_>>>()?;
    layout.build(
        uuid(row, DESCRIPTOR_ID_COLUMN)?,
        Some(uuid(row, RETRIEVABLE_ID_COLUMN)?),
        Some(field.to_string()),
        values,
    )
}
