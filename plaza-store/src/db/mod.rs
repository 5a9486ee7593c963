pub mod connection;
pub mod maintenance;
pub mod schema;

pub use connection::{Database, DbConnection, DbPool};
pub use maintenance::{reset_generated_data, verify_store, VerificationReport, Violation};
