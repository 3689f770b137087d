//! Query text with named parameters.

use std::{borrow::Cow, collections::BTreeMap};

use sqlx::types::chrono::{DateTime, NaiveDate, Utc};

use crate::DbError;

/// A value bound to a named query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// SQL `NULL`, sent as a text-typed null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Double precision float.
    Float(f64),
    /// Text value.
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Timestamp with time zone.
    Timestamp(DateTime<Utc>),
}

impl From<bool> for Param {
    fn from(value: bool) -> Self {
        Param::Bool(value)
    }
}

impl From<i32> for Param {
    fn from(value: i32) -> Self {
        Param::Int(i64::from(value))
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<f64> for Param {
    fn from(value: f64) -> Self {
        Param::Float(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl From<NaiveDate> for Param {
    fn from(value: NaiveDate) -> Self {
        Param::Date(value)
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(value: DateTime<Utc>) -> Self {
        Param::Timestamp(value)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Param::Null, Into::into)
    }
}

/// SQL text using `:name` placeholders, together with the values bound to those names.
///
/// ```
/// use db_pool::Query;
///
/// let query = Query::new("SELECT SUM(amount) AS total FROM payments WHERE service = :service")
///     .bind("service", "hosting");
///
/// assert_eq!(query.params().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    sql: Cow<'static, str>,
    params: BTreeMap<String, Param>,
}

/// A query rewritten to positional `$n` placeholders, with values in position order.
#[derive(Debug)]
pub struct PositionalQuery<'a> {
    /// SQL text with `$1`, `$2`, ... placeholders.
    pub sql: String,
    /// Values for the placeholders, `params[0]` binds `$1`.
    pub params: Vec<&'a Param>,
}

impl Query {
    /// Create a query without parameters.
    pub fn new(sql: impl Into<Cow<'static, str>>) -> Self {
        Self {
            sql: sql.into(),
            params: BTreeMap::new(),
        }
    }

    /// Bind a value to `:name`. Binding the same name twice keeps the last value.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Param>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// The query text as written by the caller.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The bound parameters.
    pub fn params(&self) -> &BTreeMap<String, Param> {
        &self.params
    }

    /// Rewrite `:name` placeholders to positional `$n` placeholders.
    ///
    /// Repeated names share one position. `::` casts, quoted literals and identifiers, and
    /// `--` comments are copied untouched. Values bound to names that never appear in the
    /// text are ignored.
    pub fn to_positional(&self) -> Result<PositionalQuery<'_>, DbError> {
        let text: &str = &self.sql;
        let mut sql = String::with_capacity(text.len() + 8);
        let mut names: Vec<&str> = Vec::new();
        let mut params = Vec::new();
        let mut chars = text.char_indices().peekable();

        while let Some((start, c)) = chars.next() {
            match c {
                '\'' | '"' => {
                    sql.push(c);

                    for (_, next) in chars.by_ref() {
                        sql.push(next);

                        if next == c {
                            break;
                        }
                    }
                }
                '-' if matches!(chars.peek(), Some(&(_, '-'))) => {
                    sql.push(c);

                    for (_, next) in chars.by_ref() {
                        sql.push(next);

                        if next == '\n' {
                            break;
                        }
                    }
                }
                ':' if matches!(chars.peek(), Some(&(_, ':'))) => {
                    chars.next();
                    sql.push_str("::");
                }
                ':' if matches!(chars.peek(), Some(&(_, next)) if next.is_ascii_alphabetic() || next == '_') => {
                    let mut end = start + 1;

                    while let Some(&(i, next)) = chars.peek() {
                        if !(next.is_ascii_alphanumeric() || next == '_') {
                            break;
                        }

                        end = i + next.len_utf8();
                        chars.next();
                    }

                    let name = &text[start + 1..end];

                    let Some(value) = self.params.get(name) else {
                        return Err(DbError::query(format!("Query parameter '{name}' is not bound")));
                    };

                    let position = match names.iter().position(|known| *known == name) {
                        Some(index) => index + 1,
                        None => {
                            names.push(name);
                            params.push(value);
                            names.len()
                        }
                    };

                    sql.push('$');
                    sql.push_str(&position.to_string());
                }
                _ => sql.push(c),
            }
        }

        Ok(PositionalQuery { sql, params })
    }
}
