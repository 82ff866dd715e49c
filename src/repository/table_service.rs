//! Keyed JSON CRUD over the tenant tables.
//!
//! Rows travel as `serde_json::Value` (`row_to_json` out, `jsonb_populate_record`
//! in) and every statement is pinned to the owning host through the table's
//! owner column.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Executor, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::{db::map_db_error, error::AppError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableSpec {
    name: &'static str,
    owner_column: &'static str,
    touches_updated_at: bool,
}

const ALLOWED_TABLES: &[TableSpec] = &[
    TableSpec {
        name: "hosts",
        owner_column: "id",
        touches_updated_at: true,
    },
    TableSpec {
        name: "reservations",
        owner_column: "host_id",
        touches_updated_at: true,
    },
    TableSpec {
        name: "building_codes",
        owner_column: "host_id",
        touches_updated_at: false,
    },
];

pub struct ListOptions<'a> {
    pub filters: Option<&'a Map<String, Value>>,
    pub limit: i64,
    pub offset: i64,
    pub order_by: &'a str,
    pub ascending: bool,
}

pub async fn list_rows<'e, E>(
    executor: E,
    table: &str,
    host_id: Uuid,
    options: ListOptions<'_>,
) -> Result<Vec<Value>, AppError>
where
    E: Executor<'e, Database = Postgres>,
{
    let spec = validate_table(table)?;
    let order_name = if options.order_by.trim().is_empty() {
        "created_at"
    } else {
        validate_identifier(options.order_by)?
    };

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(spec.name).push(" t WHERE ");
    push_owner_scope(&mut query, spec, host_id);

    if let Some(filter_map) = options.filters {
        for (key, value) in filter_map {
            push_filter_clause(&mut query, key, value)?;
        }
    }

    query.push(" ORDER BY t.").push(order_name);
    query.push(if options.ascending { " ASC" } else { " DESC" });
    query
        .push(" LIMIT ")
        .push_bind(options.limit.clamp(1, 1000))
        .push(" OFFSET ")
        .push_bind(options.offset.max(0));

    let rows = query
        .build()
        .fetch_all(executor)
        .await
        .map_err(map_db_error)?;
    Ok(read_rows(rows))
}

pub async fn get_row<'e, E>(
    executor: E,
    table: &str,
    host_id: Uuid,
    row_id: Uuid,
) -> Result<Value, AppError>
where
    E: Executor<'e, Database = Postgres>,
{
    let spec = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(spec.name).push(" t WHERE ");
    push_owner_scope(&mut query, spec, host_id);
    query.push(" AND t.id = ").push_bind(row_id).push(" LIMIT 1");

    let row = query
        .build()
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;
    read_single(row, spec)
}

/// Inserts `payload` as a new row owned by `host_id`.
pub async fn create_row<'e, E>(
    executor: E,
    table: &str,
    host_id: Uuid,
    payload: &Map<String, Value>,
) -> Result<Value, AppError>
where
    E: Executor<'e, Database = Postgres>,
{
    let spec = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Could not create {} record.",
            spec.name
        )));
    }

    let mut owned = payload.clone();
    owned.insert(
        spec.owner_column.to_string(),
        Value::String(host_id.to_string()),
    );
    let keys = sorted_keys(&owned)?;

    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
    query.push(spec.name).push(" (");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(*key);
        }
    }
    query.push(") SELECT ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push("r.");
            separated.push_unseparated(*key);
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(spec.name)
        .push(", ");
    query.push_bind(Value::Object(owned.clone()));
    query
        .push(") r RETURNING row_to_json(")
        .push(spec.name)
        .push(".*) AS row");

    let row = query
        .build()
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::Internal(format!("Could not create {} record.", spec.name)))
}

pub async fn update_row<'e, E>(
    executor: E,
    table: &str,
    host_id: Uuid,
    row_id: Uuid,
    payload: &Map<String, Value>,
) -> Result<Value, AppError>
where
    E: Executor<'e, Database = Postgres>,
{
    let spec = validate_table(table)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let keys = sorted_keys(payload)?;
    if keys
        .iter()
        .any(|key| *key == "id" || *key == spec.owner_column)
    {
        return Err(AppError::BadRequest(
            "Record ownership cannot be changed.".to_string(),
        ));
    }

    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query.push(spec.name).push(" t SET ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(*key);
            separated.push_unseparated(" = r.");
            separated.push_unseparated(*key);
        }
        if spec.touches_updated_at && !keys.contains(&"updated_at") {
            separated.push("updated_at = now()");
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(spec.name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query.push(") r WHERE ");
    push_owner_scope(&mut query, spec, host_id);
    query.push(" AND t.id = ").push_bind(row_id);
    query.push(" RETURNING row_to_json(t) AS row");

    let row = query
        .build()
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;
    read_single(row, spec)
}

/// Deletes a row and returns it as it was.
pub async fn delete_row<'e, E>(
    executor: E,
    table: &str,
    host_id: Uuid,
    row_id: Uuid,
) -> Result<Value, AppError>
where
    E: Executor<'e, Database = Postgres>,
{
    let spec = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query.push(spec.name).push(" t WHERE ");
    push_owner_scope(&mut query, spec, host_id);
    query.push(" AND t.id = ").push_bind(row_id);
    query.push(" RETURNING row_to_json(t) AS row");

    let row = query
        .build()
        .fetch_optional(executor)
        .await
        .map_err(map_db_error)?;
    read_single(row, spec)
}

fn push_owner_scope(query: &mut QueryBuilder<Postgres>, spec: TableSpec, host_id: Uuid) {
    query
        .push("t.")
        .push(spec.owner_column)
        .push(" = ")
        .push_bind(host_id);
}

fn read_rows(rows: Vec<PgRow>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .collect()
}

fn read_single(row: Option<PgRow>, spec: TableSpec) -> Result<Value, AppError> {
    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::NotFound(format!("{} record not found.", spec.name)))
}

fn sorted_keys(payload: &Map<String, Value>) -> Result<Vec<&str>, AppError> {
    let mut keys = payload
        .keys()
        .map(|key| validate_identifier(key))
        .collect::<Result<Vec<_>, _>>()?;
    keys.sort_unstable();
    Ok(keys)
}

fn validate_table(table: &str) -> Result<TableSpec, AppError> {
    let normalized = validate_identifier(table)?;
    ALLOWED_TABLES
        .iter()
        .copied()
        .find(|spec| spec.name == normalized)
        .ok_or_else(|| AppError::Forbidden(format!("Table '{normalized}' is not allowed.")))
}

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(
            "Identifier cannot be empty.".to_string(),
        ));
    }
    if !trimmed.chars().all(|character| {
        character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
    }) || trimmed
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_digit())
    {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone, PartialEq)]
enum ScalarFilter {
    Text(String),
    Uuid(Uuid),
    Bool(bool),
    I64(i64),
    F64(f64),
    Date(NaiveDate),
    Timestamp(DateTime<FixedOffset>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOperator {
    Eq,
    Gte,
    Lte,
    IsNull,
}

fn parse_filter_key(filter_key: &str) -> Result<(&str, FilterOperator), AppError> {
    let (column, operator) = match filter_key.rsplit_once("__") {
        Some((column, "gte")) => (column, FilterOperator::Gte),
        Some((column, "lte")) => (column, FilterOperator::Lte),
        Some((column, "is_null")) => (column, FilterOperator::IsNull),
        _ => (filter_key, FilterOperator::Eq),
    };
    Ok((validate_identifier(column)?, operator))
}

fn parse_bool_filter_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => *flag,
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "t" | "1" | "yes" | "y"
        ),
        _ => false,
    }
}

fn push_filter_clause(
    query: &mut QueryBuilder<Postgres>,
    filter_key: &str,
    value: &Value,
) -> Result<(), AppError> {
    let (column, operator) = parse_filter_key(filter_key)?;

    if operator == FilterOperator::IsNull {
        query.push(" AND t.").push(column);
        if parse_bool_filter_value(value) {
            query.push(" IS NULL");
        } else {
            query.push(" IS NOT NULL");
        }
        return Ok(());
    }

    match value {
        Value::Null => Ok(()),
        Value::Array(_) | Value::Object(_) => Err(AppError::BadRequest(format!(
            "Filter '{filter_key}' expects a scalar value."
        ))),
        _ => {
            query.push(" AND t.").push(column);
            let sql_operator = match operator {
                FilterOperator::Gte => " >= ",
                FilterOperator::Lte => " <= ",
                FilterOperator::Eq | FilterOperator::IsNull => " = ",
            };
            match infer_scalar_filter(column, value) {
                ScalarFilter::Text(text) => {
                    query.push("::text").push(sql_operator).push_bind(text);
                }
                ScalarFilter::Uuid(id) => {
                    query.push(sql_operator).push_bind(id);
                }
                ScalarFilter::Bool(flag) => {
                    query.push(sql_operator).push_bind(flag);
                }
                ScalarFilter::I64(number) => {
                    query.push(sql_operator).push_bind(number);
                }
                ScalarFilter::F64(number) => {
                    query.push(sql_operator).push_bind(number);
                }
                ScalarFilter::Date(date) => {
                    query.push(sql_operator).push_bind(date);
                }
                ScalarFilter::Timestamp(timestamp) => {
                    query.push(sql_operator).push_bind(timestamp);
                }
            }
            Ok(())
        }
    }
}

fn infer_scalar_filter(column: &str, value: &Value) -> ScalarFilter {
    match value {
        Value::Bool(flag) => ScalarFilter::Bool(*flag),
        Value::Number(number) => number
            .as_i64()
            .map(ScalarFilter::I64)
            .or_else(|| number.as_f64().map(ScalarFilter::F64))
            .unwrap_or_else(|| ScalarFilter::Text(number.to_string())),
        Value::String(text) => {
            let trimmed = text.trim();
            if column == "id" || column.ends_with("_id") {
                if let Ok(parsed) = Uuid::parse_str(trimmed) {
                    return ScalarFilter::Uuid(parsed);
                }
            }
            if column.ends_with("_at") {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
                    return ScalarFilter::Timestamp(parsed);
                }
            }
            if column.ends_with("_date") {
                if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
                    return ScalarFilter::Date(parsed);
                }
            }
            ScalarFilter::Text(text.clone())
        }
        _ => ScalarFilter::Text(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use sqlx::{Postgres, QueryBuilder};
    use uuid::Uuid;

    use super::{
        infer_scalar_filter, parse_filter_key, push_filter_clause, push_owner_scope,
        validate_table, FilterOperator, ScalarFilter,
    };
    use crate::error::AppError;

    #[test]
    fn only_tenant_tables_are_reachable() {
        assert_eq!(validate_table("building_codes").map(|spec| spec.owner_column).ok(), Some("host_id"));
        assert_eq!(validate_table("hosts").map(|spec| spec.owner_column).ok(), Some("id"));
        assert!(matches!(
            validate_table("invoice_versions"),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            validate_table("reservations; drop"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn filter_keys_carry_operators() {
        assert_eq!(
            parse_filter_key("checkin_date__gte").ok(),
            Some(("checkin_date", FilterOperator::Gte))
        );
        assert_eq!(
            parse_filter_key("invoice_number__is_null").ok(),
            Some(("invoice_number", FilterOperator::IsNull))
        );
        assert_eq!(
            parse_filter_key("is_active").ok(),
            Some(("is_active", FilterOperator::Eq))
        );
    }

    #[test]
    fn infers_filter_types_from_column_names() {
        let id = Uuid::new_v4();
        assert_eq!(
            infer_scalar_filter("host_id", &Value::String(id.to_string())),
            ScalarFilter::Uuid(id)
        );
        assert_eq!(
            infer_scalar_filter("checkout_date", &json!("2025-03-04")),
            ScalarFilter::Date(NaiveDate::from_ymd_opt(2025, 3, 4).expect("valid date"))
        );
        assert_eq!(infer_scalar_filter("room_number", &json!(3)), ScalarFilter::I64(3));
        assert_eq!(
            infer_scalar_filter("reservation_number", &json!("DEMO-001")),
            ScalarFilter::Text("DEMO-001".to_string())
        );
    }

    #[test]
    fn queries_are_scoped_to_owner() {
        let spec = validate_table("reservations").expect("allowed");
        let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM reservations t WHERE ");
        push_owner_scope(&mut query, spec, Uuid::nil());
        push_filter_clause(&mut query, "guest_submitted_at__is_null", &json!(false))
            .expect("filter");
        push_filter_clause(&mut query, "checkin_date__gte", &json!("2025-01-01")).expect("filter");

        let sql = query.sql();
        assert!(sql.contains("t.host_id = $1"), "unexpected SQL: {sql}");
        assert!(sql.contains("t.guest_submitted_at IS NOT NULL"), "unexpected SQL: {sql}");
        assert!(sql.contains("t.checkin_date >= $2"), "unexpected SQL: {sql}");
    }

    #[test]
    fn insert_sql_uses_jsonb_populate_record() {
        let mut query = QueryBuilder::<Postgres>::new("INSERT INTO building_codes (code, host_id, name) SELECT ");
        {
            let mut separated = query.separated(", ");
            for key in ["code", "host_id", "name"] {
                separated.push("r.");
                separated.push_unseparated(key);
            }
        }
        query.push(" FROM jsonb_populate_record(NULL::building_codes, ");
        query.push_bind(json!({"name": "Main gate", "code": "4521"}));
        query.push(") r");

        let sql = query.sql();
        assert!(sql.contains("SELECT r.code, r.host_id, r.name"), "unexpected SQL: {sql}");
        assert!(sql.contains("jsonb_populate_record(NULL::building_codes, $1)"));
    }

    #[test]
    fn array_filters_are_rejected() {
        let mut query = QueryBuilder::<Postgres>::new("SELECT 1 FROM reservations t WHERE 1=1");
        assert!(matches!(
            push_filter_clause(&mut query, "room_number", &json!([1, 2])),
            Err(AppError::BadRequest(_))
        ));
    }
}
