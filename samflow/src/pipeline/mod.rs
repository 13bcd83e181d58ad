//! The batched, concurrent filter pipeline: the engine that drives a
//! [`Source`](crate::source::Source) through a chain of fused
//! parallel/sequential/ordered stages.
//!
//! Grounded on `pipeline.cpp`/`node.cpp`/`filter_pipeline.cpp`.

pub mod batch;
pub mod node;
pub mod runner;

pub use batch::Batch;
pub use node::{NodeKind, Stage};
pub use runner::{run, NodeSpec};
