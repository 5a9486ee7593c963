//! Six-stage synthetic dataset generator.
//!
//! Stages run strictly in order (users, follows, posts with media, likes,
//! comments, replies) and write through a [`plaza_store::BulkSink`].

pub mod batch;
pub mod pipeline;
pub mod report;
pub mod sampling;
pub mod stages;
pub mod text;

pub use pipeline::Pipeline;
pub use report::{RunSummary, Stage, StageReport};
pub use sampling::{fill_best_effort, Sampler};
pub use text::{TextPool, TextPools};
