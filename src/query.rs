use crate::error::SqlDriverError;
use crate::insert::InsertRequest;
use crate::types::RowValues;

/// Something that fills an argument slot of a [`Query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Bound to exactly one `$n` placeholder.
    Value(RowValues),
    /// Expanded into `(columns) values (...), (...)`.
    Insert(InsertRequest),
}

macro_rules! arg_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Value(value.into())
                }
            }
        )*
    };
}

arg_from_value!(
    RowValues,
    i64,
    i32,
    i16,
    u32,
    f64,
    f32,
    bool,
    String,
    &str,
    chrono::NaiveDateTime,
    chrono::NaiveDate,
    serde_json::Value,
    Vec<u8>,
);

impl<T: Into<RowValues>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        Arg::Value(value.into())
    }
}

impl From<InsertRequest> for Arg {
    fn from(request: InsertRequest) -> Self {
        Arg::Insert(request)
    }
}

/// A query template: literal SQL fragments interleaved with argument slots.
///
/// There is always one more fragment than there are arguments; the builder
/// methods keep it that way.
/// ```rust
/// use sql_driver::Query;
///
/// let query = Query::new("select * from users where username = ")
///     .bind("foo")
///     .push(" and active = ")
///     .bind(true);
/// assert_eq!(query.args().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    fragments: Vec<String>,
    args: Vec<Arg>,
}

impl Query {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            fragments: vec![text.into()],
            args: Vec::new(),
        }
    }

    /// Append literal SQL to the current fragment.
    #[must_use]
    pub fn push(mut self, text: &str) -> Self {
        if let Some(last) = self.fragments.last_mut() {
            last.push_str(text);
        }
        self
    }

    /// Append an argument slot.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self.fragments.push(String::new());
        self
    }

    /// Append a scalar argument slot.
    #[must_use]
    pub fn bind(self, value: impl Into<RowValues>) -> Self {
        self.arg(Arg::Value(value.into()))
    }

    /// Append a bulk-insert slot.
    #[must_use]
    pub fn insert(self, request: InsertRequest) -> Self {
        self.arg(Arg::Insert(request))
    }

    /// Split `template` on `{}` holes and pair them with `args`.
    ///
    /// `{{` and `}}` stand for literal braces.
    ///
    /// # Errors
    /// `TemplateMismatch` when the number of holes differs from `args.len()`.
    pub fn from_template(template: &str, args: Vec<Arg>) -> Result<Self, SqlDriverError> {
        let mut fragments = vec![String::new()];
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            match (c, chars.peek().copied()) {
                ('{', Some('}')) => {
                    chars.next();
                    fragments.push(String::new());
                }
                ('{', Some('{')) | ('}', Some('}')) => {
                    chars.next();
                    push_char(&mut fragments, c);
                }
                _ => push_char(&mut fragments, c),
            }
        }

        let placeholders = fragments.len() - 1;
        if placeholders != args.len() {
            return Err(SqlDriverError::TemplateMismatch {
                placeholders,
                args: args.len(),
            });
        }
        Ok(Self { fragments, args })
    }

    #[must_use]
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    #[must_use]
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<Arg>) {
        (self.fragments, self.args)
    }
}

fn push_char(fragments: &mut [String], c: char) {
    if let Some(last) = fragments.last_mut() {
        last.push(c);
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::new(text)
    }
}

/// Build a [`Query`] from a template with `{}` holes, one per argument.
///
/// Evaluates to `Result<Query, SqlDriverError>`.
/// ```rust
/// use sql_driver::{insert, row, sql};
///
/// let users = insert(vec![row! { "username" => "foo" }], None::<&str>)?;
/// let query = sql!("insert into users {} returning *", users)?;
/// let lookup = sql!("select * from users where username = {}", "foo")?;
/// # let _ = (query, lookup);
/// # Ok::<(), sql_driver::SqlDriverError>(())
/// ```
#[macro_export]
macro_rules! sql {
    ($template:expr $(,)?) => {
        $crate::Query::from_template($template, ::std::vec::Vec::new())
    };
    ($template:expr, $($arg:expr),+ $(,)?) => {
        $crate::Query::from_template($template, vec![$($crate::Arg::from($arg)),+])
    };
}
