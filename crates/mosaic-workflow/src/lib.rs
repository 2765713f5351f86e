//! Mosaic Workflow
//!
//! The dependency graph induced by a workflow's `depends_on` lists, plus the
//! routing edges of `if`/`switch` jobs. Used by validation, schema analysis
//! and the runner's scheduler.

mod error;
mod graph;

pub use error::WorkflowError;
pub use graph::JobGraph;
