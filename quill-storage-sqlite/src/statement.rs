//! Statement preparation
//!
//! Two kinds of statements reach SQLite:
//!
//! - raw SQL text with `:name` placeholders, bound from [`Params`] and passed
//!   through otherwise untouched
//! - typed [`Mutation`]s, rendered to SQL with `?N` placeholders
//!
//! Both end up as SQL text plus an ordered list of [`Value`]s.

use std::fmt;

use quill_core::{
    Error, Value,
    error::StorageError,
    mutation::{Assignment, Mutation, Operation},
};
use sqlx::{Sqlite, query::Query, sqlite::SqliteArguments};

/// Parameter names containing any of these are never written to logs.
const SECRET_MARKERS: [&str; 3] = ["password", "token", "secret"];

/// Named parameters for [`Database::query`](crate::Database::query).
///
/// ```rust
/// use quill_storage_sqlite::Params;
///
/// let params = Params::new().bind("owner", 7).bind(":status", "draft");
/// assert_eq!(params.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, Value)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` to `:name`. The leading colon is optional. Binding a
    /// name twice replaces the earlier value.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        let name = name.trim_start_matches(':').to_string();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// SQL text ready for sqlx, with its values in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Prepared {
    pub sql: String,
    /// Parameter names, for logging. Parallel to `values`.
    pub names: Vec<String>,
    pub values: Vec<Value>,
}

impl Prepared {
    /// Parameters rendered for a log line, with secrets masked.
    pub fn describe(&self) -> ParamsDisplay<'_> {
        ParamsDisplay(self)
    }

    pub fn bind(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        self.values
            .iter()
            .fold(sqlx::query(&self.sql), |query, value| match value {
                Value::Integer(v) => query.bind(*v),
                Value::Text(v) => query.bind(v.as_str()),
                Value::Null => query.bind(None::<i64>),
            })
    }
}

pub(crate) struct ParamsDisplay<'a>(&'a Prepared);

impl fmt::Display for ParamsDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.0.names.iter().zip(&self.0.values).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if is_secret(name) {
                write!(f, "{name}: [REDACTED]")?;
            } else {
                match value {
                    Value::Integer(v) => write!(f, "{name}: {v}")?,
                    Value::Text(v) => write!(f, "{name}: {v:?}")?,
                    Value::Null => write!(f, "{name}: NULL")?,
                }
            }
        }
        f.write_str("}")
    }
}

fn is_secret(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SECRET_MARKERS.iter().any(|marker| name.contains(marker))
}

/// Replace `:name` placeholders in `sql` with `?N` and collect their values.
///
/// A name used more than once maps to the same index. Text inside single or
/// double quotes and after `--` on a line is copied verbatim, so literals such
/// as `'12:30'` are left alone. Any placeholder without a bound value fails.
pub(crate) fn expand_named(sql: &str, params: &Params) -> Result<Prepared, Error> {
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut values = Vec::new();

    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;
    let mut in_comment = false;

    while let Some((i, c)) = chars.next() {
        if in_comment {
            out.push(c);
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }

        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '-' if sql[i + 1..].starts_with('-') => {
                in_comment = true;
                out.push(c);
            }
            ':' if chars
                .peek()
                .is_some_and(|(_, next)| next.is_ascii_alphabetic() || *next == '_') =>
            {
                let start = i + 1;
                let mut end = start;
                while let Some((j, next)) = chars.peek().copied() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        end = j + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let name = &sql[start..end];

                let index = match names.iter().position(|n| n == name) {
                    Some(pos) => pos + 1,
                    None => {
                        let value = params.get(name).ok_or_else(|| {
                            StorageError::Query(format!("No value bound for parameter :{name}"))
                        })?;
                        names.push(name.to_string());
                        values.push(value.clone());
                        names.len()
                    }
                };
                out.push('?');
                out.push_str(&index.to_string());
            }
            _ => out.push(c),
        }
    }

    Ok(Prepared {
        sql: out,
        names,
        values,
    })
}

/// Render a (stamped) mutation to SQL.
pub(crate) fn render(mutation: &Mutation) -> Result<Prepared, Error> {
    let table = mutation.table().name();
    let mut names = Vec::new();
    let mut values = Vec::new();

    let sql = match mutation.operation() {
        Operation::Insert { values: columns } if columns.is_empty() => {
            format!("INSERT INTO {table} DEFAULT VALUES")
        }
        Operation::Insert { values: columns } => {
            let mut placeholders = Vec::with_capacity(columns.len());
            for (column, value) in columns {
                names.push(column.to_string());
                values.push(value.clone());
                placeholders.push(format!("?{}", values.len()));
            }
            let columns: Vec<&str> = columns.iter().map(|(c, _)| *c).collect();
            format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            )
        }
        Operation::Update { assignments, .. } if assignments.is_empty() => {
            return Err(StorageError::Query(format!("UPDATE of {table} assigns nothing")).into());
        }
        Operation::Update {
            assignments,
            filter,
        } => {
            let mut set = Vec::with_capacity(assignments.len());
            for (column, assignment) in assignments {
                names.push(column.to_string());
                match assignment {
                    Assignment::Value(value) => {
                        values.push(value.clone());
                        set.push(format!("{column} = ?{}", values.len()));
                    }
                    Assignment::Increment(delta) => {
                        values.push(Value::Integer(*delta));
                        set.push(format!("{column} = {column} + ?{}", values.len()));
                    }
                }
            }
            let mut sql = format!("UPDATE {table} SET {}", set.join(", "));
            push_where(&mut sql, filter.conditions(), &mut names, &mut values);
            sql
        }
        Operation::Delete { filter } => {
            let mut sql = format!("DELETE FROM {table}");
            push_where(&mut sql, filter.conditions(), &mut names, &mut values);
            sql
        }
    };

    Ok(Prepared { sql, names, values })
}

fn push_where(
    sql: &mut String,
    conditions: &[(&'static str, Value)],
    names: &mut Vec<String>,
    values: &mut Vec<Value>,
) {
    if conditions.is_empty() {
        return;
    }

    let clauses: Vec<String> = conditions
        .iter()
        .map(|(column, value)| {
            if value.is_null() {
                format!("{column} IS NULL")
            } else {
                names.push(column.to_string());
                values.push(value.clone());
                format!("{column} = ?{}", values.len())
            }
        })
        .collect();

    sql.push_str(" WHERE ");
    sql.push_str(&clauses.join(" AND "));
}
