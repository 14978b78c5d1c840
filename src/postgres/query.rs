use std::sync::Arc;

use bb8::Pool;
use chrono::NaiveDateTime;
use serde_json::Value;
use tokio_postgres::Statement;

use super::config::PgManager;
use super::params::Params;
use crate::error::DriverError;
use crate::results::ResultSet;
use crate::statement::BoundStatement;
use crate::translation::{PlaceholderStyle, number_placeholders};
use crate::types::RowValues;

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `DriverError::PostgresError` if the column cannot be retrieved.
pub fn postgres_extract_value(row: &tokio_postgres::Row, idx: usize) -> Result<RowValues, DriverError> {
    let type_info = row.columns()[idx].type_();

    match type_info.name() {
        "int2" => {
            let val: Option<i16> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Int))
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v))))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Float))
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Bool))
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Timestamp))
        }
        "timestamptz" => {
            let val: Option<chrono::DateTime<chrono::Utc>> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc())))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::JSON))
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Blob))
        }
        _ => {
            let val: Option<String> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Text))
        }
    }
}

/// Build a result set using statement metadata for column names.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn build_result_set_from_statement(
    stmt: &Statement,
    rows: &[tokio_postgres::Row],
) -> Result<ResultSet, DriverError> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let column_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(rows.len());
    result_set.set_column_names(Arc::new(column_names));

    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Rewrite the call escape `{? = call f(...)}` into `select * from f(...)`,
/// dropping the result-set out placeholder.
///
/// ```rust
/// use reactive_query_loader::postgres::callable_to_select;
///
/// assert_eq!(
///     callable_to_select("{? = call find_users(?, ?)}").as_deref(),
///     Some("select * from find_users(?, ?)")
/// );
/// assert_eq!(callable_to_select("select 1"), None);
/// ```
#[must_use]
pub fn callable_to_select(sql: &str) -> Option<String> {
    let inner = sql.trim().strip_prefix('{')?.strip_suffix('}')?.trim();
    let (out, call) = inner.split_once('=')?;
    if out.trim() != "?" {
        return None;
    }
    let call = call.trim_start();
    let target = call
        .get(..4)
        .filter(|kw| kw.eq_ignore_ascii_case("call"))
        .map(|_| call[4..].trim_start())?;
    Some(format!("select * from {target}"))
}

/// Execute `statement` on a pooled client.
///
/// # Errors
/// Returns pool or Postgres failures.
pub async fn execute_select(
    pool: &Pool<PgManager>,
    statement: &BoundStatement,
) -> Result<ResultSet, DriverError> {
    let sql = if statement.is_callable() {
        callable_to_select(statement.sql()).ok_or_else(|| {
            DriverError::Parameter(format!(
                "callable statement must use the {{? = call ...}} form: {}",
                statement.sql()
            ))
        })?
    } else {
        statement.sql().to_string()
    };
    let sql = number_placeholders(&sql, PlaceholderStyle::Postgres).into_owned();
    let values = statement
        .parameters()
        .map_err(|e| DriverError::Parameter(e.to_string()))?;

    let conn = pool.get().await?;
    let stmt = conn.prepare(&sql).await?;
    let rows = conn.query(&stmt, Params::convert(&values).as_refs()).await?;
    build_result_set_from_statement(&stmt, &rows)
}

/// Run one or more statements without parameters.
///
/// # Errors
/// Returns pool or Postgres failures.
pub async fn execute_batch(pool: &Pool<PgManager>, sql: &str) -> Result<(), DriverError> {
    let conn = pool.get().await?;
    conn.batch_execute(sql).await?;
    Ok(())
}
