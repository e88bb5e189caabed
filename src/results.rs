use std::ops::Deref;

use crate::types::Row;

/// Rows returned by a statement together with its metadata.
///
/// Derefs to the row slice, so callers that only care about rows can index or
/// iterate the result directly:
/// ```rust
/// use sql_driver::{QueryResult, row};
///
/// let result = QueryResult::new(vec![row! { "id" => 1 }], 1, "SELECT");
/// let [first] = &result[..] else { unreachable!() };
/// assert_eq!(first.get("id").and_then(|v| v.as_int()), Some(&1));
/// assert_eq!(result.command, "SELECT");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// The rows returned by the statement
    pub rows: Vec<Row>,
    /// Rows returned or affected, as reported by the server
    pub rows_affected: u64,
    /// Command tag of the statement (`SELECT`, `INSERT`, ...), derived from
    /// its text by [`command_tag`]. A `WITH ... INSERT` reports `INSERT`.
    pub command: String,
}

impl QueryResult {
    #[must_use]
    pub fn new(rows: Vec<Row>, rows_affected: u64, command: impl Into<String>) -> Self {
        Self {
            rows,
            rows_affected,
            command: command.into(),
        }
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl Deref for QueryResult {
    type Target = [Row];

    fn deref(&self) -> &Self::Target {
        &self.rows
    }
}

impl IntoIterator for QueryResult {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

const CTE_BODIES: [&str; 6] = ["SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "VALUES"];

/// Command tag of a statement: its leading keyword, upper-cased. A statement
/// opening with a `WITH` list is tagged by the first top-level `SELECT`,
/// `INSERT`, `UPDATE`, `DELETE`, `MERGE` or `VALUES` after it.
#[must_use]
pub fn command_tag(sql: &str) -> String {
    let mut words = top_level_words(sql).into_iter();
    match words.next() {
        Some(first) if first == "WITH" => words
            .find(|word| CTE_BODIES.contains(&word.as_str()))
            .unwrap_or(first),
        Some(first) => first,
        None => String::new(),
    }
}

/// Upper-cased alphabetic words outside parentheses and quotes, in order.
fn top_level_words(sql: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote = None;
    for c in sql.chars() {
        if let Some(open) = quote {
            if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && c.is_ascii_alphabetic() => {
                current.push(c.to_ascii_uppercase());
                continue;
            }
            _ => {}
        }
        if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
