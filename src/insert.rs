use crate::error::SqlDriverError;
use crate::types::{Row, RowValues};

/// One or many rows handed to [`insert`]; a single row is treated as a batch of one.
#[derive(Debug, Clone, Default)]
pub struct Rows(Vec<Row>);

impl Rows {
    #[must_use]
    pub fn into_vec(self) -> Vec<Row> {
        self.0
    }
}

impl From<Row> for Rows {
    fn from(row: Row) -> Self {
        Rows(vec![row])
    }
}

impl From<Vec<Row>> for Rows {
    fn from(rows: Vec<Row>) -> Self {
        Rows(rows)
    }
}

impl From<&[Row]> for Rows {
    fn from(rows: &[Row]) -> Self {
        Rows(rows.to_vec())
    }
}

impl<const N: usize> From<[Row; N]> for Rows {
    fn from(rows: [Row; N]) -> Self {
        Rows(rows.into())
    }
}

/// Rows plus the fixed column order they are inserted under.
///
/// Only [`insert`] builds one, so every row is known to carry a value for every
/// column. Bind it into a [`Query`](crate::Query) where the column list and
/// `values` tuples belong.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    rows: Vec<Row>,
    columns: Vec<String>,
}

impl InsertRequest {
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of bind parameters the request expands to.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.rows.len() * self.columns.len()
    }

    /// Values in row-major, column order.
    pub(crate) fn into_values(self) -> impl Iterator<Item = RowValues> {
        let columns = self.columns;
        self.rows.into_iter().flat_map(move |row| {
            columns
                .iter()
                .map(|column| row.get(column).cloned().unwrap_or(RowValues::Null))
                .collect::<Vec<_>>()
        })
    }
}

/// Normalize rows into an [`InsertRequest`].
///
/// With no explicit columns the first row's key order is used and every later
/// row must have exactly those keys. With explicit columns every row must supply
/// each of them; other keys are ignored.
///
/// # Errors
/// `EmptyInsert` for zero rows, `ParameterError` when no columns can be
/// determined, `MissingColumn` / `UnexpectedColumn` for rows that do not match.
pub fn insert<I, S>(rows: impl Into<Rows>, columns: I) -> Result<InsertRequest, SqlDriverError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let rows = rows.into().into_vec();
    let Some(first) = rows.first() else {
        return Err(SqlDriverError::EmptyInsert);
    };

    let explicit: Vec<String> = columns.into_iter().map(Into::into).collect();
    let inferred = explicit.is_empty();
    let columns = if inferred {
        first.columns().map(str::to_string).collect()
    } else {
        explicit
    };
    if columns.is_empty() {
        return Err(SqlDriverError::ParameterError(
            "insert needs at least one column".to_string(),
        ));
    }

    for (index, row) in rows.iter().enumerate() {
        if let Some(missing) = columns.iter().find(|column| !row.contains(column)) {
            return Err(SqlDriverError::MissingColumn {
                row: index,
                column: missing.clone(),
            });
        }
        if inferred && row.len() != columns.len() {
            let extra = row
                .columns()
                .find(|column| !columns.iter().any(|c| c == column))
                .unwrap_or_default();
            return Err(SqlDriverError::UnexpectedColumn {
                row: index,
                column: extra.to_string(),
            });
        }
    }

    Ok(InsertRequest { rows, columns })
}
