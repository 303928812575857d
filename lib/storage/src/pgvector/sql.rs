//! SQL generation for the pgvector backend.
//!
//! Statements are plain data so that they can be inspected without a database;
//! [`super::bind`] turns them into executable queries.

use mediax_core::database::{
    OBJECT_COLUMN, PREDICATE_COLUMN, RELATIONSHIP_ENTITY, RETRIEVABLE_ENTITY, SUBJECT_COLUMN,
    TYPE_COLUMN,
};
use mediax_core::descriptor::{DESCRIPTOR_ID_COLUMN, RETRIEVABLE_ID_COLUMN};
use mediax_core::{
    Attribute, ComparisonOperator, Descriptor, Distance, Error, Layout, Query, Result, SortOrder,
    Type, Value,
};
use uuid::Uuid;

use super::BACKEND_NAME;

/// Projected distance column of proximity queries.
pub const DISTANCE_COLUMN: &str = "distance";

/// Projected score column of fulltext queries.
pub const SCORE_COLUMN: &str = "score";

/// Text search configuration shared by fulltext indexes and queries.
pub const TEXT_SEARCH_CONFIG: &str = "english";

/// pgvector refuses HNSW indexes above this dimensionality.
pub const HNSW_MAX_DIMENSIONS: usize = 2000;

/// Postgres caps the number of bind parameters per statement.
pub const MAX_PARAMETERS: usize = u16::MAX as usize;

/// A bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(Value),
    /// NULL typed after the column it is bound to
    Null(Type),
    Uuids(Vec<Uuid>),
    Strings(Vec<String>),
}

impl Param {
    pub fn optional(value: Option<&Value>, ty: Type) -> Self {
        match value {
            Some(v) => Param::Value(v.clone()),
            None => Param::Null(ty),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl SqlStatement {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Appends a parameter and returns its placeholder.
    fn bind(&mut self, param: Param) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }
}

/// Quotes an identifier, doubling embedded quotes.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

pub fn table(schema: &str, entity: &str) -> String {
    format!("{}.{}", quote(schema), quote(entity))
}

/// Column type of an attribute.
pub fn column_type(ty: &Type) -> String {
    match ty {
        Type::Boolean => "BOOLEAN".into(),
        Type::Byte | Type::Short => "SMALLINT".into(),
        Type::Int => "INTEGER".into(),
        Type::Long => "BIGINT".into(),
        Type::Float => "REAL".into(),
        Type::Double => "DOUBLE PRECISION".into(),
        Type::String => "VARCHAR(255)".into(),
        Type::Text => "TEXT".into(),
        Type::DateTime => "TIMESTAMPTZ".into(),
        Type::Uuid => "UUID".into(),
        Type::BooleanVector(_) => "BOOLEAN[]".into(),
        Type::IntVector(_) => "INTEGER[]".into(),
        Type::LongVector(_) => "BIGINT[]".into(),
        Type::FloatVector(d) => format!("vector({})", d),
        Type::DoubleVector(_) => "DOUBLE PRECISION[]".into(),
    }
}

pub fn create_extension() -> SqlStatement {
    SqlStatement::new("CREATE EXTENSION IF NOT EXISTS vector")
}

pub fn create_schema(schema: &str) -> SqlStatement {
    SqlStatement::new(format!("CREATE SCHEMA IF NOT EXISTS {}", quote(schema)))
}

pub fn table_exists(schema: &str, entity: &str) -> SqlStatement {
    let mut statement = SqlStatement::new("");
    let s = statement.bind(Param::Value(Value::String(schema.to_string())));
    let e = statement.bind(Param::Value(Value::String(entity.to_string())));
    statement.sql = format!(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = {} AND table_name = {})",
        s, e
    );
    statement
}

pub fn drop_table(schema: &str, entity: &str) -> SqlStatement {
    SqlStatement::new(format!("DROP TABLE IF EXISTS {} CASCADE", table(schema, entity)))
}

pub fn truncate_table(schema: &str, entity: &str) -> SqlStatement {
    SqlStatement::new(format!("TRUNCATE TABLE {} CASCADE", table(schema, entity)))
}

pub fn create_retrievable_table(schema: &str) -> Vec<SqlStatement> {
    let retrievables = table(schema, RETRIEVABLE_ENTITY);
    let relationships = table(schema, RELATIONSHIP_ENTITY);
    vec![
        SqlStatement::new(format!(
            "CREATE TABLE IF NOT EXISTS {} ({} UUID PRIMARY KEY, {} VARCHAR(100))",
            retrievables,
            quote(RETRIEVABLE_ID_COLUMN),
            quote(TYPE_COLUMN)
        )),
        create_index(schema, RETRIEVABLE_ENTITY, TYPE_COLUMN, "btree", &quote(TYPE_COLUMN)),
        SqlStatement::new(format!(
            "CREATE TABLE IF NOT EXISTS {rel} (\
             {s} UUID NOT NULL REFERENCES {ret} ({id}) ON DELETE CASCADE, \
             {p} VARCHAR(100) NOT NULL, \
             {o} UUID NOT NULL REFERENCES {ret} ({id}) ON DELETE CASCADE, \
             PRIMARY KEY ({s}, {p}, {o}))",
            rel = relationships,
            ret = retrievables,
            id = quote(RETRIEVABLE_ID_COLUMN),
            s = quote(SUBJECT_COLUMN),
            p = quote(PREDICATE_COLUMN),
            o = quote(OBJECT_COLUMN),
        )),
        create_index(schema, RELATIONSHIP_ENTITY, SUBJECT_COLUMN, "btree", &quote(SUBJECT_COLUMN)),
        create_index(schema, RELATIONSHIP_ENTITY, PREDICATE_COLUMN, "btree", &quote(PREDICATE_COLUMN)),
        create_index(schema, RELATIONSHIP_ENTITY, OBJECT_COLUMN, "btree", &quote(OBJECT_COLUMN)),
    ]
}

fn create_index(schema: &str, entity: &str, column: &str, method: &str, expression: &str) -> SqlStatement {
    SqlStatement::new(format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} USING {} ({})",
        quote(&format!("{}_{}_idx", entity, column)),
        table(schema, entity),
        method,
        expression
    ))
}

fn tsvector(column: &str) -> String {
    format!("to_tsvector('{}', {})", TEXT_SEARCH_CONFIG, quote(column))
}

/// Index for one attribute, if its type has one.
fn attribute_index(schema: &str, entity: &str, attribute: &Attribute) -> Option<SqlStatement> {
    let column = quote(&attribute.name);
    match attribute.ty {
        Type::Text => Some(create_index(schema, entity, &attribute.name, "gin", &tsvector(&attribute.name))),
        Type::FloatVector(d) if d <= HNSW_MAX_DIMENSIONS => Some(create_index(
            schema,
            entity,
            &attribute.name,
            "hnsw",
            &format!("{} vector_l2_ops", column),
        )),
        Type::FloatVector(_)
        | Type::BooleanVector(_)
        | Type::IntVector(_)
        | Type::LongVector(_)
        | Type::DoubleVector(_) => None,
        Type::Boolean
        | Type::Byte
        | Type::Short
        | Type::Int
        | Type::Long
        | Type::Float
        | Type::Double
        | Type::String
        | Type::DateTime
        | Type::Uuid => Some(create_index(schema, entity, &attribute.name, "btree", &column)),
    }
}

/// Table and index statements of a descriptor entity.
pub fn create_descriptor_table(schema: &str, entity: &str, layout: &Layout) -> Vec<SqlStatement> {
    let mut columns = vec![
        format!("{} UUID PRIMARY KEY", quote(DESCRIPTOR_ID_COLUMN)),
        format!(
            "{} UUID NOT NULL REFERENCES {} ({}) ON DELETE CASCADE",
            quote(RETRIEVABLE_ID_COLUMN),
            table(schema, RETRIEVABLE_ENTITY),
            quote(RETRIEVABLE_ID_COLUMN)
        ),
    ];
    let attributes = layout.attributes();
    for attribute in &attributes {
        let mut column = format!("{} {}", quote(&attribute.name), column_type(&attribute.ty));
        if !attribute.nullable {
            column.push_str(" NOT NULL");
        }
        columns.push(column);
    }
    let mut statements = vec![
        SqlStatement::new(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            table(schema, entity),
            columns.join(", ")
        )),
        create_index(schema, entity, RETRIEVABLE_ID_COLUMN, "btree", &quote(RETRIEVABLE_ID_COLUMN)),
    ];
    statements.extend(attributes.iter().filter_map(|a| attribute_index(schema, entity, a)));
    statements
}

fn descriptor_columns(layout: &Layout) -> Vec<String> {
    let mut columns = vec![quote(DESCRIPTOR_ID_COLUMN), quote(RETRIEVABLE_ID_COLUMN)];
    columns.extend(layout.attributes().iter().map(|a| quote(&a.name)));
    columns
}

/// Selects full descriptors, optionally restricted to ids of one id column.
pub fn select_descriptors(schema: &str, entity: &str, layout: &Layout, filter: Option<(&str, Vec<Uuid>)>) -> SqlStatement {
    let mut statement = SqlStatement::new("");
    let mut sql = format!("SELECT {} FROM {}", descriptor_columns(layout).join(", "), table(schema, entity));
    if let Some((column, ids)) = filter {
        let placeholder = statement.bind(Param::Uuids(ids));
        sql.push_str(&format!(" WHERE {} = ANY({})", quote(column), placeholder));
    }
    statement.sql = sql;
    statement
}

pub fn count(schema: &str, entity: &str) -> SqlStatement {
    SqlStatement::new(format!("SELECT COUNT(*) FROM {}", table(schema, entity)))
}

fn comparison(operator: ComparisonOperator) -> &'static str {
    match operator {
        ComparisonOperator::Eq => "=",
        ComparisonOperator::Neq => "<>",
        ComparisonOperator::Lt => "<",
        ComparisonOperator::Gt => ">",
        ComparisonOperator::Leq => "<=",
        ComparisonOperator::Geq => ">=",
        ComparisonOperator::Like => "LIKE",
    }
}

fn distance_operator(distance: Distance) -> &'static str {
    match distance {
        Distance::Euclidean => "<->",
        Distance::Manhattan => "<+>",
        Distance::Cosine => "<=>",
        Distance::InnerProduct => "<#>",
    }
}

/// Expression reading a vector column as a pgvector `vector`.
fn vector_expression(attribute: &Attribute) -> Result<String> {
    let column = quote(&attribute.name);
    match attribute.ty {
        Type::FloatVector(_) => Ok(column),
        Type::IntVector(_) | Type::LongVector(_) | Type::DoubleVector(_) => {
            Ok(format!("CAST(CAST({} AS DOUBLE PRECISION[]) AS vector)", column))
        }
        ty => Err(Error::UnsupportedType {
            ty,
            backend: BACKEND_NAME,
        }),
    }
}

/// Translates a validated query against the resolved attribute.
pub fn query(schema: &str, entity: &str, layout: &Layout, attribute: &Attribute, query: &Query) -> Result<SqlStatement> {
    let mut statement = SqlStatement::new("");
    let from = table(schema, entity);
    let column = quote(&attribute.name);
    let sql = match query {
        Query::Proximity(q) => {
            let vector = vector_expression(attribute)?;
            let reference = q
                .value
                .as_f32_vector()
                .ok_or_else(|| Error::InvalidArgument("proximity queries need a numeric vector".into()))?;
            let placeholder = statement.bind(Param::Value(Value::FloatVector(reference)));
            let projection = if q.fetch_vector {
                descriptor_columns(layout)
            } else {
                vec![quote(DESCRIPTOR_ID_COLUMN), quote(RETRIEVABLE_ID_COLUMN)]
            };
            let order = match q.order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            let limit = statement.bind(Param::Value(Value::Long(limit(query))));
            format!(
                "SELECT {}, CAST(({} {} {}) AS DOUBLE PRECISION) AS {} FROM {} ORDER BY {} {} LIMIT {}",
                projection.join(", "),
                vector,
                distance_operator(q.distance),
                placeholder,
                DISTANCE_COLUMN,
                from,
                DISTANCE_COLUMN,
                order,
                limit
            )
        }
        Query::Boolean(q) => {
            let value = statement.bind(Param::Value(q.value.clone()));
            let limit = statement.bind(Param::Value(Value::Long(limit(query))));
            format!(
                "SELECT {} FROM {} WHERE {} {} {} LIMIT {}",
                descriptor_columns(layout).join(", "),
                from,
                column,
                comparison(q.comparison),
                value,
                limit
            )
        }
        Query::Fulltext(q) => {
            let text = statement.bind(Param::Value(Value::Text(q.text.clone())));
            let limit = statement.bind(Param::Value(Value::Long(limit(query))));
            let tsquery = format!("plainto_tsquery('{}', {})", TEXT_SEARCH_CONFIG, text);
            format!(
                "SELECT {}, CAST(ts_rank({}, {}) AS DOUBLE PRECISION) AS {} FROM {} WHERE {} @@ {} ORDER BY {} DESC LIMIT {}",
                descriptor_columns(layout).join(", "),
                tsvector(&attribute.name),
                tsquery,
                SCORE_COLUMN,
                from,
                tsvector(&attribute.name),
                tsquery,
                SCORE_COLUMN,
                limit
            )
        }
    };
    statement.sql = sql;
    Ok(statement)
}

fn limit(query: &Query) -> i64 {
    i64::try_from(query.limit()).unwrap_or(i64::MAX)
}

fn descriptor_params(layout: &Layout, descriptor: &Descriptor) -> Vec<Param> {
    let mut params = vec![
        Param::Value(Value::Uuid(descriptor.id())),
        Param::optional(descriptor.retrievable_id().map(Value::Uuid).as_ref(), Type::Uuid),
    ];
    params.extend(
        layout
            .attributes()
            .iter()
            .zip(descriptor.values())
            .map(|(attribute, (_, value))| Param::optional(value.as_ref(), attribute.ty)),
    );
    params
}

/// Multi-row inserts, split so that no statement exceeds the parameter cap.
pub fn insert_descriptors(schema: &str, entity: &str, layout: &Layout, descriptors: &[Descriptor]) -> Vec<SqlStatement> {
    let width = layout.len() + 2;
    let rows_per_statement = (MAX_PARAMETERS / width).max(1);
    descriptors
        .chunks(rows_per_statement)
        .map(|chunk| {
            let mut statement = SqlStatement::new("");
            let rows: Vec<String> = chunk
                .iter()
                .map(|d| {
                    let placeholders: Vec<String> = descriptor_params(layout, d)
                        .into_iter()
                        .map(|p| statement.bind(p))
                        .collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();
            statement.sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                table(schema, entity),
                descriptor_columns(layout).join(", "),
                rows.join(", ")
            );
            statement
        })
        .collect()
}

/// Inserts or replaces one descriptor by id.
pub fn upsert_descriptor(schema: &str, entity: &str, layout: &Layout, descriptor: &Descriptor) -> SqlStatement {
    let mut statement = SqlStatement::new("");
    let placeholders: Vec<String> = descriptor_params(layout, descriptor)
        .into_iter()
        .map(|p| statement.bind(p))
        .collect();
    let columns = descriptor_columns(layout);
    let assignments: Vec<String> = columns[1..]
        .iter()
        .map(|c| format!("{} = EXCLUDED.{}", c, c))
        .collect();
    statement.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
        table(schema, entity),
        columns.join(", "),
        placeholders.join(", "),
        quote(DESCRIPTOR_ID_COLUMN),
        assignments.join(", ")
    );
    statement
}

/// Deletes the rows whose `column` is one of `ids`.
pub fn delete_by_ids(schema: &str, entity: &str, column: &str, ids: Vec<Uuid>) -> SqlStatement {
    let mut statement = SqlStatement::new("");
    let placeholder = statement.bind(Param::Uuids(ids));
    statement.sql = format!(
        "DELETE FROM {} WHERE {} = ANY({})",
        table(schema, entity),
        quote(column),
        placeholder
    );
    statement
}

pub fn select_retrievables(schema: &str, ids: Option<Vec<Uuid>>) -> SqlStatement {
    let mut statement = SqlStatement::new("");
    let mut sql = format!(
        "SELECT {}, {} FROM {}",
        quote(RETRIEVABLE_ID_COLUMN),
        quote(TYPE_COLUMN),
        table(schema, RETRIEVABLE_ENTITY)
    );
    if let Some(ids) = ids {
        let placeholder = statement.bind(Param::Uuids(ids));
        sql.push_str(&format!(" WHERE {} = ANY({})", quote(RETRIEVABLE_ID_COLUMN), placeholder));
    }
    statement.sql = sql;
    statement
}

/// Inserts retrievables; `upsert` replaces the type of existing rows.
pub fn insert_retrievables(schema: &str, items: &[(Uuid, Option<String>)], upsert: bool) -> Vec<SqlStatement> {
    items
        .chunks(MAX_PARAMETERS / 2)
        .map(|chunk| {
            let mut statement = SqlStatement::new("");
            let rows: Vec<String> = chunk
                .iter()
                .map(|(id, kind)| {
                    let id = statement.bind(Param::Value(Value::Uuid(*id)));
                    let kind = statement.bind(Param::optional(
                        kind.as_ref().map(|k| Value::String(k.clone())).as_ref(),
                        Type::String,
                    ));
                    format!("({}, {})", id, kind)
                })
                .collect();
            let conflict = if upsert {
                format!(" ON CONFLICT ({}) DO UPDATE SET {} = EXCLUDED.{}", quote(RETRIEVABLE_ID_COLUMN), quote(TYPE_COLUMN), quote(TYPE_COLUMN))
            } else {
                String::new()
            };
            statement.sql = format!(
                "INSERT INTO {} ({}, {}) VALUES {}{}",
                table(schema, RETRIEVABLE_ENTITY),
                quote(RETRIEVABLE_ID_COLUMN),
                quote(TYPE_COLUMN),
                rows.join(", "),
                conflict
            );
            statement
        })
        .collect()
}

/// Inserts relationships, ignoring ones that already exist.
pub fn insert_relationships(schema: &str, relationships: &[(Uuid, String, Uuid)]) -> Vec<SqlStatement> {
    relationships
        .chunks(MAX_PARAMETERS / 3)
        .map(|chunk| {
            let mut statement = SqlStatement::new("");
            let rows: Vec<String> = chunk
                .iter()
                .map(|(s, p, o)| {
                    let s = statement.bind(Param::Value(Value::Uuid(*s)));
                    let p = statement.bind(Param::Value(Value::String(p.clone())));
                    let o = statement.bind(Param::Value(Value::Uuid(*o)));
                    format!("({}, {}, {})", s, p, o)
                })
                .collect();
            statement.sql = format!(
                "INSERT INTO {} ({}, {}, {}) VALUES {} ON CONFLICT DO NOTHING",
                table(schema, RELATIONSHIP_ENTITY),
                quote(SUBJECT_COLUMN),
                quote(PREDICATE_COLUMN),
                quote(OBJECT_COLUMN),
                rows.join(", ")
            );
            statement
        })
        .collect()
}

pub fn delete_relationship(schema: &str, subject: Uuid, predicate: &str, object: Uuid) -> SqlStatement {
    let mut statement = SqlStatement::new("");
    let s = statement.bind(Param::Value(Value::Uuid(subject)));
    let p = statement.bind(Param::Value(Value::String(predicate.to_string())));
    let o = statement.bind(Param::Value(Value::Uuid(object)));
    statement.sql = format!(
        "DELETE FROM {} WHERE {} = {} AND {} = {} AND {} = {}",
        table(schema, RELATIONSHIP_ENTITY),
        quote(SUBJECT_COLUMN),
        s,
        quote(PREDICATE_COLUMN),
        p,
        quote(OBJECT_COLUMN),
        o
    );
    statement
}

/// Selects relationships matching every non-empty filter.
pub fn select_relationships(
    schema: &str,
    subjects: Vec<Uuid>,
    predicates: Vec<String>,
    objects: Vec<Uuid>,
) -> SqlStatement {
    let mut statement = SqlStatement::new("");
    let mut conditions = Vec::new();
    if !subjects.is_empty() {
        let placeholder = statement.bind(Param::Uuids(subjects));
        conditions.push(format!("{} = ANY({})", quote(SUBJECT_COLUMN), placeholder));
    }
    if !predicates.is_empty() {
        let placeholder = statement.bind(Param::Strings(predicates));
        conditions.push(format!("{} = ANY({})", quote(PREDICATE_COLUMN), placeholder));
    }
    if !objects.is_empty() {
        let placeholder = statement.bind(Param::Uuids(objects));
        conditions.push(format!("{} = ANY({})", quote(OBJECT_COLUMN), placeholder));
    }
    let mut sql = format!(
        "SELECT {}, {}, {} FROM {}",
        quote(SUBJECT_COLUMN),
        quote(PREDICATE_COLUMN),
        quote(OBJECT_COLUMN),
        table(schema, RELATIONSHIP_ENTITY)
    );
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    statement.sql = sql;
    statement
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediax_core::{ProximityQuery, SimpleBooleanQuery, SimpleFulltextQuery};

    fn layout() -> Layout {
        Layout::structure(vec![
            Attribute::new("path", Type::String),
            Attribute::new("size", Type::Long),
            Attribute::new("caption", Type::Text).nullable(),
        ])
        .unwrap()
    }

    #[test]
    fn test_column_types() {
        assert_eq!(column_type(&Type::String), "VARCHAR(255)");
        assert_eq!(column_type(&Type::Text), "TEXT");
        assert_eq!(column_type(&Type::FloatVector(512)), "vector(512)");
        assert_eq!(column_type(&Type::Byte), "SMALLINT");
        assert_eq!(column_type(&Type::DateTime), "TIMESTAMPTZ");
    }

    #[test]
    fn test_descriptor_table_ddl() {
        let statements = create_descriptor_table("mediax", "descriptor_file", &layout());
        let create = &statements[0].sql;
        assert!(create.starts_with("CREATE TABLE IF NOT EXISTS \"mediax\".\"descriptor_file\""));
        assert!(create.contains("\"descriptor_id\" UUID PRIMARY KEY"));
        assert!(create.contains("\"size\" BIGINT NOT NULL"));
        assert!(create.contains("\"caption\" TEXT,") || create.ends_with("\"caption\" TEXT)"));
        assert!(statements.iter().any(|s| s.sql.contains("USING gin (to_tsvector('english', \"caption\"))")));
        assert_eq!(statements.len(), 5);
    }

    #[test]
    fn test_vector_index_respects_hnsw_limit() {
        let small = create_descriptor_table("s", "d", &Layout::vector(Type::FloatVector(512)).unwrap());
        assert!(small.iter().any(|s| s.sql.contains("USING hnsw")));
        let large = create_descriptor_table("s", "d", &Layout::vector(Type::FloatVector(4096)).unwrap());
        assert!(!large.iter().any(|s| s.sql.contains("USING hnsw")));
    }

    #[test]
    fn test_boolean_query_binds_value_and_limit() {
        let layout = layout();
        let query = Query::from(
            SimpleBooleanQuery::new(Some("size".into()), ComparisonOperator::Geq, Value::Long(10)).with_limit(5),
        );
        let attribute = query.validate(&layout).unwrap();
        let statement = super::query("s", "d", &layout, &attribute, &query).unwrap();
        assert!(statement.sql.contains("WHERE \"size\" >= $1 LIMIT $2"));
        assert_eq!(
            statement.params,
            vec![Param::Value(Value::Long(10)), Param::Value(Value::Long(5))]
        );
    }

    #[test]
    fn test_like_and_fulltext_queries() {
        let layout = layout();
        let like = Query::from(SimpleBooleanQuery::new(
            Some("path".into()),
            ComparisonOperator::Like,
            Value::from("%.png"),
        ));
        let attribute = like.validate(&layout).unwrap();
        assert!(super::query("s", "d", &layout, &attribute, &like)
            .unwrap()
            .sql
            .contains("\"path\" LIKE $1"));

        let fulltext = Query::from(SimpleFulltextQuery::new(Some("caption".into()), "red car"));
        let attribute = fulltext.validate(&layout).unwrap();
        let statement = super::query("s", "d", &layout, &attribute, &fulltext).unwrap();
        assert!(statement.sql.contains("@@ plainto_tsquery('english', $1)"));
        assert!(statement.sql.contains("ORDER BY score DESC"));
        assert_eq!(statement.params[1], Param::Value(Value::Long(1000)));
    }

    #[test]
    fn test_proximity_operators() {
        let layout = Layout::vector(Type::FloatVector(3)).unwrap();
        for (distance, operator) in [
            (Distance::Euclidean, "<->"),
            (Distance::Manhattan, "<+>"),
            (Distance::Cosine, "<=>"),
            (Distance::InnerProduct, "<#>"),
        ] {
            let query = Query::from(ProximityQuery::new(Value::FloatVector(vec![1.0, 0.0, 0.0]), distance));
            let attribute = query.validate(&layout).unwrap();
            let statement = super::query("s", "d", &layout, &attribute, &query).unwrap();
            assert!(statement.sql.contains(&format!("(\"vector\" {} $1)", operator)));
            assert!(statement.sql.contains("ORDER BY distance ASC"));
            assert!(!statement.sql.contains("\"vector\","));
        }
    }

    #[test]
    fn test_boolean_vector_proximity_is_rejected() {
        let layout = Layout::vector(Type::BooleanVector(3)).unwrap();
        let query = Query::from(ProximityQuery::new(
            Value::BooleanVector(vec![true, false, true]),
            Distance::Euclidean,
        ));
        assert!(matches!(query.validate(&layout), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_insert_binds_typed_nulls() {
        let layout = layout();
        let d = Descriptor::structured(
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            vec![
                ("path".into(), Some(Value::from("/a"))),
                ("size".into(), Some(Value::Long(1))),
                ("caption".into(), None),
            ],
            None,
        );
        let statements = insert_descriptors("s", "d", &layout, &[d.clone(), d]);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].sql.ends_with("VALUES ($1, $2, $3, $4, $5), ($6, $7, $8, $9, $10)"));
        assert_eq!(statements[0].params[4], Param::Null(Type::Text));
    }

    #[test]
    fn test_relationship_filters() {
        let all = select_relationships("s", vec![], vec![], vec![]);
        assert!(!all.sql.contains("WHERE"));
        let some = select_relationships("s", vec![Uuid::new_v4()], vec!["partOf".into()], vec![]);
        assert!(some.sql.ends_with("WHERE \"subject_id\" = ANY($1) AND \"predicate\" = ANY($2)"));
        assert_eq!(some.params.len(), 2);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    }
}
