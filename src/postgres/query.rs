use chrono::{NaiveDate, NaiveDateTime};
use futures_util::{TryStreamExt, pin_mut};
use serde_json::Value;
use tokio_postgres::Client;
use tokio_postgres::types::{FromSql, ToSql, Type};

use crate::error::SqlDriverError;
use crate::parameterize::Statement;
use crate::results::{QueryResult, command_tag};
use crate::types::{Row, RowValues};

/// Run a parameterized statement with the extended protocol and collect its
/// rows, affected-row count and command tag.
///
/// # Errors
/// Returns `SqlDriverError::PostgresError` from preparation, binding or the
/// row stream.
pub async fn run_statement(
    client: &Client,
    statement: &Statement,
) -> Result<QueryResult, SqlDriverError> {
    let params = statement
        .values
        .iter()
        .map(|v| v as &(dyn ToSql + Sync));
    let stream = client.query_raw(statement.text.as_str(), params).await?;
    pin_mut!(stream);

    let mut rows = Vec::new();
    while let Some(row) = stream.try_next().await? {
        rows.push(build_row(&row)?);
    }
    // Statements without a result set report no count through the stream.
    let rows_affected = stream.rows_affected().unwrap_or(rows.len() as u64);

    Ok(QueryResult::new(
        rows,
        rows_affected,
        command_tag(&statement.text),
    ))
}

/// Convert one `tokio_postgres` row into a [`Row`], keeping column order.
///
/// # Errors
/// Returns `SqlDriverError` if a column cannot be read.
pub fn build_row(row: &tokio_postgres::Row) -> Result<Row, SqlDriverError> {
    let columns = row.columns();
    let mut out = Row::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        out.set(column.name(), postgres_extract_value(row, idx)?);
    }
    Ok(out)
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `SqlDriverError` if the column cannot be retrieved.
pub fn postgres_extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<RowValues, SqlDriverError> {
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
        "date" => {
            let val: Option<NaiveDate> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Date))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::JSON))
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Blob))
        }
        _ if <String as FromSql>::accepts(type_info) => {
            let val: Option<String> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Text))
        }
        _ => Err(unsupported_column(row.columns()[idx].name(), type_info)),
    }
}

/// Error for a result column whose type has no `RowValues` mapping.
fn unsupported_column(name: &str, ty: &Type) -> SqlDriverError {
    SqlDriverError::ExecutionError(format!(
        "column \"{name}\" has unsupported type {ty}; cast it in the query (`::text`)"
    ))
}
