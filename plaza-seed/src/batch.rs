use plaza_store::{BulkSink, LoadError, Row, Table};

use crate::report::Progress;

/// Accumulates rows for one table and flushes them through `insert_batch`
/// every `batch_size` rows, bounding memory on large runs.
pub struct BatchWriter<'s, S: BulkSink + ?Sized> {
    sink: &'s mut S,
    table: Table,
    batch_size: usize,
    rows: Vec<Row>,
    written: usize,
    progress: Progress,
}

impl<'s, S: BulkSink + ?Sized> BatchWriter<'s, S> {
    pub fn new(sink: &'s mut S, table: Table, batch_size: usize, progress: Progress) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            table,
            batch_size,
            rows: Vec::with_capacity(batch_size.min(1 << 16)),
            written: 0,
            progress,
        }
    }

    pub fn push(&mut self, row: Row) -> Result<(), LoadError> {
        self.rows.push(row);
        if self.rows.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Rows currently buffered
    pub fn pending(&self) -> usize {
        self.rows.len()
    }

    pub fn flush(&mut self) -> Result<(), LoadError> {
        if self.rows.is_empty() {
            return Ok(());
        }
        let written = self
            .sink
            .insert_batch(self.table, self.table.columns(), &self.rows)?;
        self.written += written;
        self.rows.clear();
        self.progress.advance(written);
        Ok(())
    }

    /// Flush what is left and return the total number of rows written
    pub fn finish(mut self) -> Result<usize, LoadError> {
        self.flush()?;
        Ok(self.written)
    }
}
