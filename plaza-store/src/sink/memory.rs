use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use super::{check_arity, BulkSink, LoadError, Row, Table, Value};
use crate::tuner::EnvironmentTuner;

/// In-memory sink with transactional staging.
///
/// Rows written outside a transaction land immediately; rows written inside
/// one are staged and only become visible on commit. Like the SQLite loader,
/// a commit that would leave a staged post without a staged media link is
/// refused unless integrity is relaxed, and a rollback also returns any ids
/// reserved since the transaction began. A counting sink keeps per-table
/// totals and drops the rows themselves.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: BTreeMap<Table, Vec<Row>>,
    counts: BTreeMap<Table, usize>,
    staged: Option<Vec<(Table, Row)>>,
    sequences: HashMap<String, i64>,
    sequences_at_begin: Option<HashMap<String, i64>>,
    keep_rows: bool,
    relaxed: bool,
}

impl MemorySink {
    /// Sink that keeps every row
    pub fn new() -> Self {
        Self {
            keep_rows: true,
            ..Default::default()
        }
    }

    /// Sink that only counts rows, for dry runs of large configurations
    pub fn counting() -> Self {
        Self::default()
    }

    pub fn rows(&self, table: Table) -> &[Row] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, table: Table) -> usize {
        self.counts.get(&table).copied().unwrap_or(0)
    }

    pub fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    /// Whether integrity is currently relaxed by the tuner
    pub fn is_relaxed(&self) -> bool {
        self.relaxed
    }

    fn land(&mut self, table: Table, row: Row) {
        *self.counts.entry(table).or_insert(0) += 1;
        if self.keep_rows {
            self.tables.entry(table).or_default().push(row);
        }
    }

    /// Every post staged in the open transaction must be staged with a media link
    fn check_content_invariant(&self, staged: &[(Table, Row)]) -> Result<(), LoadError> {
        if self.relaxed {
            return Ok(());
        }

        let linked: HashSet<i64> = staged
            .iter()
            .filter(|(table, _)| *table == Table::PostMedia)
            .filter_map(|(_, row)| row.get(1).and_then(Value::as_integer))
            .collect();

        let orphan = staged
            .iter()
            .filter(|(table, _)| *table == Table::Posts)
            .filter_map(|(_, row)| row.first().and_then(Value::as_integer))
            .find(|post_id| !linked.contains(post_id));

        match orphan {
            Some(post_id) => Err(LoadError::constraint(
                Table::Posts.name(),
                format!("post {} has no media at commit", post_id),
            )),
            None => Ok(()),
        }
    }

    fn write(&mut self, table: Table, row: Row) {
        match self.staged.as_mut() {
            Some(staged) => staged.push((table, row)),
            None => self.land(table, row),
        }
    }
}

impl BulkSink for MemorySink {
    fn insert_row(&mut self, table: Table, columns: &[&str], values: &[Value]) -> Result<(), LoadError> {
        check_arity(table, columns, values)?;
        self.write(table, values.to_vec());
        Ok(())
    }

    fn insert_batch(&mut self, table: Table, columns: &[&str], rows: &[Row]) -> Result<usize, LoadError> {
        // Validate the whole batch first so a bad row leaves nothing behind
        for row in rows {
            check_arity(table, columns, row)?;
        }
        for row in rows {
            self.write(table, row.clone());
        }
        Ok(rows.len())
    }

    fn begin_transaction(&mut self) -> Result<(), LoadError> {
        if self.staged.is_some() {
            return Err(LoadError::Transaction("transaction already open".to_string()));
        }
        self.staged = Some(Vec::new());
        self.sequences_at_begin = Some(self.sequences.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), LoadError> {
        let staged = self
            .staged
            .as_deref()
            .ok_or_else(|| LoadError::Transaction("no transaction to commit".to_string()))?;
        // A refused commit leaves the transaction open for the caller to roll back
        self.check_content_invariant(staged)?;

        self.sequences_at_begin = None;
        for (table, row) in self.staged.take().unwrap_or_default() {
            self.land(table, row);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), LoadError> {
        self.staged = None;
        if let Some(sequences) = self.sequences_at_begin.take() {
            self.sequences = sequences;
        }
        Ok(())
    }

    fn reserve_ids(&mut self, sequence: &str, count: u64) -> Result<Range<i64>, LoadError> {
        let last = self.sequences.entry(sequence.to_string()).or_insert(0);
        let start = *last + 1;
        *last += count as i64;
        Ok(start..*last + 1)
    }
}

impl EnvironmentTuner for MemorySink {
    fn relax_integrity(&mut self) -> Result<(), LoadError> {
        self.relaxed = true;
        Ok(())
    }

    fn restore_integrity(&mut self) -> Result<(), LoadError> {
        self.relaxed = false;
        Ok(())
    }
}
