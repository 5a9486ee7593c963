use anyhow::{Context, Result};

use crate::sink::{LoadError, SqliteLoader};

/// Brackets a run: trade integrity checking and durability for throughput,
/// then put both back.
pub trait EnvironmentTuner {
    fn relax_integrity(&mut self) -> Result<(), LoadError>;

    /// Re-enable checks and durability, then refresh planner statistics.
    fn restore_integrity(&mut self) -> Result<(), LoadError>;
}

impl EnvironmentTuner for SqliteLoader {
    fn relax_integrity(&mut self) -> Result<(), LoadError> {
        if self.in_transaction() {
            return Err(LoadError::Transaction(
                "cannot relax integrity inside a transaction".to_string(),
            ));
        }

        let conn = self.connection();
        conn.pragma_update(None, "foreign_keys", false)?;
        conn.pragma_update(None, "synchronous", 0)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "MEMORY", |row| row.get(0))?;
        conn.pragma_update(None, "cache_size", -262_144)?;
        log::debug!("Relaxed integrity (journal_mode={})", mode);

        self.drop_content_guard()
    }

    fn restore_integrity(&mut self) -> Result<(), LoadError> {
        if self.in_transaction() {
            log::warn!("Rolling back a dangling transaction before restoring integrity");
            self.connection().execute_batch("ROLLBACK")?;
        }

        let conn = self.connection();
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.pragma_update(None, "synchronous", 2)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "DELETE", |row| row.get(0))?;
        log::debug!("Restored integrity (journal_mode={})", mode);

        self.install_content_guard()?;
        self.connection().execute_batch("ANALYZE")?;
        Ok(())
    }
}

/// Run `f` with integrity relaxed, restoring it on every exit path.
///
/// A failure inside `f` wins over a failure to restore; the latter is logged.
pub fn with_relaxed_integrity<S, T, F>(target: &mut S, f: F) -> Result<T>
where
    S: EnvironmentTuner,
    F: FnOnce(&mut S) -> Result<T>,
{
    if let Err(err) = target.relax_integrity() {
        if let Err(restore_err) = target.restore_integrity() {
            log::warn!("Failed to restore integrity after a failed relax: {}", restore_err);
        }
        return Err(err).context("Failed to relax integrity");
    }

    let outcome = f(target);
    let restored = target.restore_integrity();

    match (outcome, restored) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err).context("Failed to restore integrity"),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(restore_err)) => {
            log::warn!("Failed to restore integrity after a failed run: {}", restore_err);
            Err(err)
        }
    }
}
