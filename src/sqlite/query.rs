use std::sync::Arc;

use bb8::Pool;
use rusqlite::Statement;
use rusqlite::types::Value;

use super::config::SqliteManager;
use super::params::Params;
use crate::error::DriverError;
use crate::results::ResultSet;
use crate::statement::BoundStatement;
use crate::translation::{PlaceholderStyle, number_placeholders};
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns `DriverError::SqliteError` if the value cannot be read.
pub fn sqlite_extract_value_sync(row: &rusqlite::Row, idx: usize) -> Result<RowValues, DriverError> {
    let value: Value = row.get(idx)?;
    match value {
        Value::Null => Ok(RowValues::Null),
        Value::Integer(i) => Ok(RowValues::Int(i)),
        Value::Real(f) => Ok(RowValues::Float(f)),
        Value::Text(s) => Ok(RowValues::Text(s)),
        Value::Blob(b) => Ok(RowValues::Blob(b)),
    }
}

/// Run a prepared statement and collect every row.
///
/// Reading stops once `max_rows` rows were collected.
///
/// # Errors
/// Returns `DriverError::SqliteError` if execution or value extraction fails.
pub fn build_result_set(
    stmt: &mut Statement,
    params: &Params,
    max_rows: Option<usize>,
) -> Result<ResultSet, DriverError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows_iter = stmt.query(params.as_refs().as_slice())?;
    while let Some(row) = rows_iter.next()? {
        if max_rows.is_some_and(|max| result_set.len() >= max) {
            break;
        }
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Execute `statement` on a pooled connection.
///
/// The connection is checked out as an owned guard and moved into the
/// blocking task, so it returns to the pool when the task finishes even if
/// the caller stopped waiting.
///
/// # Errors
/// Returns pool, `SQLite` or task failures.
pub async fn execute_select(
    pool: &Pool<SqliteManager>,
    statement: &BoundStatement,
) -> Result<ResultSet, DriverError> {
    let sql = number_placeholders(statement.sql(), PlaceholderStyle::Sqlite).into_owned();
    let values = statement
        .parameters()
        .map_err(|e| DriverError::Parameter(e.to_string()))?;
    let params = Params::convert(&values);
    let max_rows = statement.max_rows();

    let conn = pool.get_owned().await?;
    tokio::task::spawn_blocking(move || {
        let mut stmt = conn.prepare(&sql)?;
        build_result_set(&mut stmt, &params, max_rows)
    })
    .await?
}

/// Run one or more statements without parameters, e.g. schema setup.
///
/// # Errors
/// Returns pool, `SQLite` or task failures.
pub async fn execute_batch(pool: &Pool<SqliteManager>, sql: &str) -> Result<(), DriverError> {
    let sql = sql.to_string();
    let conn = pool.get_owned().await?;
    tokio::task::spawn_blocking(move || conn.execute_batch(&sql).map_err(DriverError::from)).await?
}
