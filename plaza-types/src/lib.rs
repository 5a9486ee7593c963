pub mod config;
pub mod enums;
pub mod models;

pub use config::*;
pub use enums::*;
pub use models::*;
