//! Typed mutating statements
//!
//! A [`Mutation`] describes an INSERT, UPDATE or DELETE against one [`Table`] as
//! data: column/value pairs, assignments and equality filters. Storage backends
//! render it to SQL; nothing here ever parses or rewrites statement text.
//!
//! Audit attribution is applied by [`Mutation::stamped`] according to the
//! table's declared [`AuditColumns`](crate::audit::AuditColumns), unless the
//! mutation was built with [`Mutation::without_audit`].
//!
//! ```rust
//! use quill_core::audit::{AuditContext, Table};
//! use quill_core::mutation::Mutation;
//!
//! let ctx = AuditContext::now("alice");
//! let update = Mutation::update(Table::Posts)
//!     .set("title", "Hello")
//!     .filter("id", 1)
//!     .stamped(&ctx);
//!
//! assert!(update.assigns("updated_by"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditContext, Table};

pub const CREATED_BY: &str = "created_by";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_BY: &str = "updated_by";
pub const UPDATED_AT: &str = "updated_at";

/// A bindable value. Statements bind integers and text; `Null` clears nullable columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Text(String),
    Null,
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

/// Timestamps are stored as unix seconds.
impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Integer(v.timestamp())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

macro_rules! impl_value_from_id {
    ($($id:ty),*) => {
        $(impl From<$id> for Value {
            fn from(v: $id) -> Self {
                Value::Integer(v.as_i64())
            }
        })*
    };
}

impl_value_from_id!(crate::id::AccountId, crate::id::PostId, crate::id::CategoryId);

/// Right-hand side of an UPDATE assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// `column = value`
    Value(Value),
    /// `column = column + delta`, evaluated by the datastore
    Increment(i64),
}

/// Equality conditions joined with AND. An empty filter matches every row.
///
/// A [`Value::Null`] condition matches rows where the column IS NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter(Vec<(&'static str, Value)>);

impl Filter {
    pub fn conditions(&self) -> &[(&'static str, Value)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Insert {
        values: Vec<(&'static str, Value)>,
    },
    Update {
        assignments: Vec<(&'static str, Assignment)>,
        filter: Filter,
    },
    Delete {
        filter: Filter,
    },
}

/// A typed INSERT, UPDATE or DELETE carrying its own audit requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    table: Table,
    operation: Operation,
    audit: bool,
}

impl Mutation {
    pub fn insert(table: Table) -> Self {
        Self {
            table,
            operation: Operation::Insert { values: Vec::new() },
            audit: true,
        }
    }

    pub fn update(table: Table) -> Self {
        Self {
            table,
            operation: Operation::Update {
                assignments: Vec::new(),
                filter: Filter::default(),
            },
            audit: true,
        }
    }

    pub fn delete(table: Table) -> Self {
        Self {
            table,
            operation: Operation::Delete {
                filter: Filter::default(),
            },
            audit: true,
        }
    }

    /// Add an inserted column. Ignored for UPDATE and DELETE.
    pub fn value(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        if let Operation::Insert { values } = &mut self.operation {
            values.push((column, value.into()));
        }
        self
    }

    /// Add an UPDATE assignment. Ignored for INSERT and DELETE.
    pub fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        if let Operation::Update { assignments, .. } = &mut self.operation {
            assignments.push((column, Assignment::Value(value.into())));
        }
        self
    }

    /// Add `column = column + delta` to an UPDATE. Ignored for INSERT and DELETE.
    pub fn increment(mut self, column: &'static str, delta: i64) -> Self {
        if let Operation::Update { assignments, .. } = &mut self.operation {
            assignments.push((column, Assignment::Increment(delta)));
        }
        self
    }

    /// Add an equality condition to an UPDATE or DELETE. Ignored for INSERT.
    pub fn filter(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        match &mut self.operation {
            Operation::Update { filter, .. } | Operation::Delete { filter } => {
                filter.0.push((column, value.into()));
            }
            Operation::Insert { .. } => {}
        }
        self
    }

    /// Disable audit attribution for this mutation.
    ///
    /// Used for system-driven bookkeeping such as lockout counters. A mutation
    /// without audit is never partially stamped.
    pub fn without_audit(mut self) -> Self {
        self.audit = false;
        self
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn is_audited(&self) -> bool {
        self.audit
    }

    /// Whether an INSERT supplies `column`.
    pub fn supplies(&self, column: &str) -> bool {
        match &self.operation {
            Operation::Insert { values } => {
                values.iter().any(|(c, _)| c.eq_ignore_ascii_case(column))
            }
            _ => false,
        }
    }

    /// Whether an UPDATE assigns `column`.
    pub fn assigns(&self, column: &str) -> bool {
        match &self.operation {
            Operation::Update { assignments, .. } => assignments
                .iter()
                .any(|(c, _)| c.eq_ignore_ascii_case(column)),
            _ => false,
        }
    }

    /// Apply audit attribution from `ctx`.
    ///
    /// - INSERT into a table declaring `created_by`/`created_at`: both are added
    ///   unless the caller already supplied either of them.
    /// - UPDATE of a table declaring `updated_by`/`updated_at`: both are assigned
    ///   unless the caller already assigns either of them.
    /// - DELETE, unaudited tables and mutations built with
    ///   [`without_audit`](Self::without_audit) are returned unchanged.
    ///
    /// Stamping an already stamped mutation is a no-op.
    pub fn stamped(mut self, ctx: &AuditContext) -> Self {
        if !self.audit {
            return self;
        }

        let columns = self.table.audit_columns();
        let already_created = self.supplies(CREATED_BY) || self.supplies(CREATED_AT);
        let already_updated = self.assigns(UPDATED_BY) || self.assigns(UPDATED_AT);

        match &mut self.operation {
            Operation::Insert { values } if columns.created && !already_created => {
                values.push((CREATED_BY, Value::from(ctx.actor())));
                values.push((CREATED_AT, Value::from(ctx.timestamp())));
            }
            Operation::Update { assignments, .. } if columns.updated && !already_updated => {
                assignments.push((UPDATED_BY, Assignment::Value(Value::from(ctx.actor()))));
                assignments.push((
                    UPDATED_AT,
                    Assignment::Value(Value::from(ctx.timestamp())),
                ));
            }
            _ => {}
        }

        self
    }
}
