use std::fmt::Write as _;

use crate::error::SqlDriverError;
use crate::insert::InsertRequest;
use crate::query::{Arg, Query};
use crate::types::RowValues;

/// Postgres caps the number of bind parameters in one statement at 65535.
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// Final SQL text with `$1..$n` placeholders and the values bound to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub values: Vec<RowValues>,
}

impl Statement {
    /// A statement without parameters.
    #[must_use]
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            values: Vec::new(),
        }
    }
}

/// Quote an identifier, doubling any embedded double quotes.
#[must_use]
pub fn escape_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified name (`schema.table`) part by part.
#[must_use]
pub fn escape_qualified_identifier(name: &str) -> String {
    name.split('.')
        .map(escape_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// Turn a query template into a [`Statement`].
///
/// Scalar arguments become one `$n` each. Insert requests expand in place to
/// `("a", "b") values ($1, $2), ($3, $4)`, consuming one placeholder per
/// column per row. Values are never written into the SQL text.
///
/// # Errors
/// `EmptyInsert` for an insert request without rows, `ParameterError` when the
/// statement would need more than [`MAX_BIND_PARAMS`] parameters.
pub fn parameterize(query: Query) -> Result<Statement, SqlDriverError> {
    let (fragments, args) = query.into_parts();

    let total: usize = args
        .iter()
        .map(|arg| match arg {
            Arg::Value(_) => 1,
            Arg::Insert(request) => request.value_count(),
        })
        .sum();
    if total > MAX_BIND_PARAMS {
        return Err(SqlDriverError::ParameterError(format!(
            "statement needs {total} bind parameters, at most {MAX_BIND_PARAMS} are allowed"
        )));
    }

    let mut text = String::with_capacity(fragments.iter().map(String::len).sum::<usize>());
    let mut values = Vec::with_capacity(total);
    let mut fragments = fragments.into_iter();

    for arg in args {
        if let Some(fragment) = fragments.next() {
            text.push_str(&fragment);
        }
        match arg {
            Arg::Value(value) => {
                values.push(value);
                let _ = write!(text, "${}", values.len());
            }
            Arg::Insert(request) => expand_insert(request, &mut text, &mut values)?,
        }
    }
    for fragment in fragments {
        text.push_str(&fragment);
    }

    Ok(Statement { text, values })
}

fn expand_insert(
    request: InsertRequest,
    text: &mut String,
    values: &mut Vec<RowValues>,
) -> Result<(), SqlDriverError> {
    if request.rows().is_empty() {
        return Err(SqlDriverError::EmptyInsert);
    }

    let columns = request
        .columns()
        .iter()
        .map(|column| escape_identifier(column))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = write!(text, "({columns}) values ");

    let width = request.columns().len();
    for row_index in 0..request.rows().len() {
        if row_index > 0 {
            text.push_str(", ");
        }
        text.push('(');
        for col_index in 0..width {
            if col_index > 0 {
                text.push_str(", ");
            }
            let _ = write!(text, "${}", values.len() + row_index * width + col_index + 1);
        }
        text.push(')');
    }
    values.extend(request.into_values());
    Ok(())
}
