// Storage boundary for the generator pipeline.
// Everything that touches SQLite lives here; the generator only sees `BulkSink`.

pub mod config;
pub mod db;
pub mod sink;
pub mod tuner;

pub use sink::{with_transaction, BulkSink, LoadError, MemorySink, Row, SqliteLoader, Table, Value};
pub use tuner::{with_relaxed_integrity, EnvironmentTuner};
