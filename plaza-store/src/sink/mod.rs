//! The bulk row sink every generator stage writes through.
//!
//! Two write paths exist: `insert_batch` loads many rows with one prepared
//! statement in one transaction, `insert_row` writes a single row and is meant
//! for callers that need a unit of rows to commit or roll back together.

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::ErrorCode;
use std::ops::Range;
use thiserror::Error;

use crate::db::schema::{
    COMMENT_COLUMNS, FOLLOW_COLUMNS, LIKE_COLUMNS, MEDIA_COLUMNS, MESSAGE_COLUMNS, POST_COLUMNS,
    POST_MEDIA_COLUMNS, REPLY_COLUMNS, USER_COLUMNS,
};

mod memory;
mod sqlite;

pub use memory::MemorySink;
pub use sqlite::SqliteLoader;

/// Physical tables the generator writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Users,
    Follows,
    Posts,
    Media,
    PostMedia,
    PostLikes,
    Comments,
    CommentReplies,
    Messages,
}

impl Table {
    /// All tables, parents before children.
    pub const ALL: [Table; 9] = [
        Table::Users,
        Table::Follows,
        Table::Posts,
        Table::Media,
        Table::PostMedia,
        Table::PostLikes,
        Table::Comments,
        Table::CommentReplies,
        Table::Messages,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Follows => "follows",
            Table::Posts => "posts",
            Table::Media => "media",
            Table::PostMedia => "post_media",
            Table::PostLikes => "post_likes",
            Table::Comments => "comments",
            Table::CommentReplies => "comment_replies",
            Table::Messages => "messages",
        }
    }

    /// Full column list in insert order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Users => USER_COLUMNS,
            Table::Follows => FOLLOW_COLUMNS,
            Table::Posts => POST_COLUMNS,
            Table::Media => MEDIA_COLUMNS,
            Table::PostMedia => POST_MEDIA_COLUMNS,
            Table::PostLikes => LIKE_COLUMNS,
            Table::Comments => COMMENT_COLUMNS,
            Table::CommentReplies => REPLY_COLUMNS,
            Table::Messages => MESSAGE_COLUMNS,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single field value on its way to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Field values in the order of the column list they are written with.
pub type Row = Vec<Value>;

#[derive(Error, Debug)]
pub enum LoadError {
    /// A uniqueness, check or content rule rejected the write. Recoverable:
    /// roll back the unit and move on.
    #[error("constraint violation on {table}: {message}")]
    Constraint { table: String, message: String },

    #[error("{table} expects {expected} values per row, got {got}")]
    Arity {
        table: Table,
        expected: usize,
        got: usize,
    },

    #[error("transaction state error: {0}")]
    Transaction(String),

    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(#[source] rusqlite::Error),
}

impl LoadError {
    pub fn constraint(table: impl Into<String>, message: impl Into<String>) -> Self {
        LoadError::Constraint {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether the failed unit can be rolled back and skipped
    pub fn is_constraint(&self) -> bool {
        matches!(self, LoadError::Constraint { .. })
    }

    /// Classify a driver error raised while writing to `table`
    pub fn from_sqlite(table: &str, err: rusqlite::Error) -> Self {
        if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
            LoadError::constraint(table, err.to_string())
        } else {
            LoadError::Storage(err)
        }
    }
}

impl From<rusqlite::Error> for LoadError {
    fn from(err: rusqlite::Error) -> Self {
        LoadError::from_sqlite("unknown", err)
    }
}

/// Storage boundary consumed by every generator stage.
pub trait BulkSink {
    /// Write one row. Used where a unit of rows must commit or roll back together.
    fn insert_row(&mut self, table: Table, columns: &[&str], values: &[Value]) -> Result<(), LoadError>;

    /// Write many rows in one round trip. Returns the number of rows written.
    fn insert_batch(&mut self, table: Table, columns: &[&str], rows: &[Row]) -> Result<usize, LoadError>;

    fn begin_transaction(&mut self) -> Result<(), LoadError>;

    /// Commit the open transaction. On error the transaction is still open and
    /// the caller must roll back.
    fn commit(&mut self) -> Result<(), LoadError>;

    fn rollback(&mut self) -> Result<(), LoadError>;

    /// Reserve `count` consecutive fresh ids from a named sequence.
    fn reserve_ids(&mut self, sequence: &str, count: u64) -> Result<Range<i64>, LoadError>;

    /// Fresh id from a named sequence
    fn next_id(&mut self, sequence: &str) -> Result<i64, LoadError> {
        Ok(self.reserve_ids(sequence, 1)?.start)
    }
}

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`, including
/// a failed commit.
pub fn with_transaction<S, T, F>(sink: &mut S, f: F) -> Result<T, LoadError>
where
    S: BulkSink + ?Sized,
    F: FnOnce(&mut S) -> Result<T, LoadError>,
{
    sink.begin_transaction()?;

    let result = f(sink).and_then(|value| sink.commit().map(|_| value));

    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            // A rollback failure means the sink itself is gone; report that instead
            sink.rollback()?;
            Err(err)
        }
    }
}

/// Check a row against its column list
pub(crate) fn check_arity(table: Table, columns: &[&str], values: &[Value]) -> Result<(), LoadError> {
    if columns.len() != values.len() {
        return Err(LoadError::Arity {
            table,
            expected: columns.len(),
            got: values.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_columns_match_schema_order() {
        assert_eq!(Table::Users.columns()[0], "email");
        assert_eq!(Table::CommentReplies.columns(), &["child_id", "parent_id"]);
        assert_eq!(Table::ALL.len(), 9);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(5i64), Value::Integer(5));
        assert_eq!(Value::from("x"), Value::Text("x".to_string()));
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some("bio".to_string())).as_text(), Some("bio"));
    }

    #[test]
    fn test_constraint_errors_are_classified() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);").unwrap();
        conn.execute("INSERT INTO t (id) VALUES (1)", []).unwrap();
        let err = conn.execute("INSERT INTO t (id) VALUES (1)", []).unwrap_err();

        let classified = LoadError::from_sqlite("t", err);
        assert!(classified.is_constraint());
    }

    #[test]
    fn test_with_transaction_rolls_back_on_error() {
        let mut sink = MemorySink::new();
        let result: Result<(), LoadError> = with_transaction(&mut sink, |s| {
            s.insert_row(Table::Follows, Table::Follows.columns(), &["a".into(), "b".into()])?;
            Err(LoadError::constraint("follows", "forced"))
        });

        assert!(result.is_err());
        assert_eq!(sink.count(Table::Follows), 0);
        assert!(!sink.in_transaction());
    }
}
