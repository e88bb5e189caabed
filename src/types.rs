use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde::ser::SerializeMap;
use serde_json::Value as JsonValue;

/// Values that can be bound as query parameters or read back from a result row.
///
/// The set is closed: composite data has to be serialized into [`RowValues::JSON`]
/// explicitly before it can be bound.
/// ```rust
/// use sql_driver::RowValues;
///
/// let params: Vec<RowValues> = vec![1.into(), "alice".into(), true.into(), None::<i64>.into()];
/// assert!(params[3].is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// Calendar date value
    Date(NaiveDate),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RowValues::Date(value) => Some(*value),
            RowValues::Timestamp(value) => Some(value.date()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let RowValues::JSON(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

macro_rules! row_values_from {
    ($($ty:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl From<$ty> for RowValues {
                fn from($v: $ty) -> Self {
                    $body
                }
            }
        )*
    };
}

row_values_from! {
    i64 => |v| RowValues::Int(v),
    i32 => |v| RowValues::Int(i64::from(v)),
    i16 => |v| RowValues::Int(i64::from(v)),
    u32 => |v| RowValues::Int(i64::from(v)),
    f64 => |v| RowValues::Float(v),
    f32 => |v| RowValues::Float(f64::from(v)),
    bool => |v| RowValues::Bool(v),
    String => |v| RowValues::Text(v),
    &str => |v| RowValues::Text(v.to_string()),
    NaiveDateTime => |v| RowValues::Timestamp(v),
    NaiveDate => |v| RowValues::Date(v),
    JsonValue => |v| RowValues::JSON(v),
    Vec<u8> => |v| RowValues::Blob(v),
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// An ordered mapping from column name to value.
///
/// Keys are unique: setting a column that is already present replaces the value
/// in place. Equality ignores column order.
#[derive(Debug, Clone, Default)]
pub struct Row {
    entries: Vec<(String, RowValues)>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Builder form of [`Row::set`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<RowValues>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((column, value)),
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&RowValues> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(column, value)| other.get(column) == Some(value))
    }
}

impl<K: Into<String>, V: Into<RowValues>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, value) in &self.entries {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Build a [`Row`] from `column => value` pairs.
///
/// ```rust
/// use sql_driver::row;
///
/// let user = row! { "username" => "foo", "age" => 42 };
/// assert_eq!(user.columns().collect::<Vec<_>>(), vec!["username", "age"]);
/// ```
#[macro_export]
macro_rules! row {
    () => {
        $crate::Row::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::Row::new();
        $( row.set($column, $value); )+
        row
    }};
}
