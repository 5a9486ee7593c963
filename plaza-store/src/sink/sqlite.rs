use anyhow::{Context, Result};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::ops::Range;

use super::{check_arity, BulkSink, LoadError, Row, Table, Value};
use crate::db::schema::{CLEAR_PENDING_POSTS, CONTENT_GUARD, DROP_CONTENT_GUARD, PENDING_POST_WITHOUT_MEDIA};
use crate::db::DbConnection;

/// Bulk loader over a single pooled SQLite connection.
///
/// The connection is held for the whole run: the content guard and the
/// tuning PRAGMAs are connection-scoped.
pub struct SqliteLoader {
    conn: DbConnection,
    content_guard: bool,
}

impl SqliteLoader {
    /// Wrap a connection whose schema is already initialized
    pub fn new(conn: DbConnection) -> Result<Self> {
        let mut loader = Self {
            conn,
            content_guard: false,
        };
        loader
            .install_content_guard()
            .context("Failed to install post content guard")?;
        Ok(loader)
    }

    /// Borrow the underlying connection (queries, verification)
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    pub fn content_guard_enabled(&self) -> bool {
        self.content_guard
    }

    pub(crate) fn install_content_guard(&mut self) -> Result<(), LoadError> {
        self.conn.execute_batch(CONTENT_GUARD)?;
        self.content_guard = true;
        Ok(())
    }

    pub(crate) fn drop_content_guard(&mut self) -> Result<(), LoadError> {
        self.conn.execute_batch(DROP_CONTENT_GUARD)?;
        self.content_guard = false;
        Ok(())
    }

    /// Every post inserted in the current transaction must have a media row
    fn check_content_invariant(&self) -> Result<(), LoadError> {
        if !self.content_guard {
            return Ok(());
        }

        let orphan: Option<i64> = self
            .conn
            .query_row(PENDING_POST_WITHOUT_MEDIA, [], |row| row.get(0))
            .optional()?;

        if let Some(post_id) = orphan {
            return Err(LoadError::constraint(
                Table::Posts.name(),
                format!("post {} has no media at commit", post_id),
            ));
        }

        self.conn.execute(CLEAR_PENDING_POSTS, [])?;
        Ok(())
    }

    fn finish_commit(&mut self) -> Result<(), LoadError> {
        self.check_content_invariant()?;
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| LoadError::from_sqlite("commit", e))
    }

    fn write_rows<'r, I>(&self, table: Table, columns: &[&str], rows: I) -> Result<usize, LoadError>
    where
        I: IntoIterator<Item = &'r [Value]>,
    {
        let mut stmt = self.conn.prepare_cached(&insert_sql(table, columns))?;
        let mut written = 0;

        for values in rows {
            check_arity(table, columns, values)?;
            stmt.execute(params_from_iter(values.iter()))
                .map_err(|e| LoadError::from_sqlite(table.name(), e))?;
            written += 1;
        }

        Ok(written)
    }

    /// Write inside the open transaction, or inside a transaction of our own
    fn write_atomically<'r, I>(&mut self, table: Table, columns: &[&str], rows: I) -> Result<usize, LoadError>
    where
        I: IntoIterator<Item = &'r [Value]>,
    {
        if self.in_transaction() {
            return self.write_rows(table, columns, rows);
        }

        self.conn.execute_batch("BEGIN")?;
        let result = self
            .write_rows(table, columns, rows)
            .and_then(|written| self.finish_commit().map(|_| written));

        if result.is_err() && self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        result
    }
}

impl BulkSink for SqliteLoader {
    fn insert_row(&mut self, table: Table, columns: &[&str], values: &[Value]) -> Result<(), LoadError> {
        self.write_atomically(table, columns, std::iter::once(values))
            .map(|_| ())
    }

    fn insert_batch(&mut self, table: Table, columns: &[&str], rows: &[Row]) -> Result<usize, LoadError> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.write_atomically(table, columns, rows.iter().map(|row| row.as_slice()))
    }

    fn begin_transaction(&mut self) -> Result<(), LoadError> {
        if self.in_transaction() {
            return Err(LoadError::Transaction("transaction already open".to_string()));
        }
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), LoadError> {
        if !self.in_transaction() {
            return Err(LoadError::Transaction("no transaction to commit".to_string()));
        }
        self.finish_commit()
    }

    fn rollback(&mut self) -> Result<(), LoadError> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn reserve_ids(&mut self, sequence: &str, count: u64) -> Result<Range<i64>, LoadError> {
        let count = count as i64;
        if count == 0 {
            let current = self.current_sequence_value(sequence)?;
            return Ok(current + 1..current + 1);
        }

        self.conn.execute(
            "INSERT INTO sequences (name, value) VALUES (?, 0) ON CONFLICT(name) DO NOTHING",
            [sequence],
        )?;
        let last: i64 = self.conn.query_row(
            "UPDATE sequences SET value = value + ?2 WHERE name = ?1 RETURNING value",
            (sequence, count),
            |row| row.get(0),
        )?;

        Ok(last - count + 1..last + 1)
    }
}

impl SqliteLoader {
    fn current_sequence_value(&self, sequence: &str) -> Result<i64, LoadError> {
        let value = self
            .conn
            .query_row("SELECT value FROM sequences WHERE name = ?", [sequence], |row| row.get(0))
            .optional()?;
        Ok(value.unwrap_or(0))
    }
}

fn insert_sql(table: Table, columns: &[&str]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name(),
        columns.join(", "),
        placeholders
    )
}
